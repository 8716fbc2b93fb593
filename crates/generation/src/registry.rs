/// In-flight streaming request registry
///
/// One cancellation handle per caller-supplied request id. Entries are
/// removed when a stream ends for any reason, so the map never grows
/// unbounded.
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
pub struct RequestRegistry {
    inner: Mutex<HashMap<String, CancellationToken>>,
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new request under `request_id`, returning its token. A
    /// stale entry under the same id is cancelled and replaced.
    pub fn register(&self, request_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        if let Some(stale) = self
            .inner
            .lock()
            .insert(request_id.to_string(), token.clone())
        {
            stale.cancel();
        }
        token
    }

    /// Cancel a tracked request. Returns whether a live request was
    /// found; an unknown or already-finished id is a no-op.
    pub fn cancel(&self, request_id: &str) -> bool {
        match self.inner.lock().remove(request_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Drop tracking for a request that ended on its own.
    pub fn remove(&self, request_id: &str) {
        self.inner.lock().remove(request_id);
    }

    pub fn tracked(&self) -> usize {
        self.inner.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_cancel_removes_entry() {
        let registry = RequestRegistry::new();
        let token = registry.register("req-1");
        assert_eq!(registry.tracked(), 1);

        assert!(registry.cancel("req-1"));
        assert!(token.is_cancelled());
        assert_eq!(registry.tracked(), 0);
    }

    #[test]
    fn test_cancel_unknown_id_reports_not_found() {
        let registry = RequestRegistry::new();
        assert!(!registry.cancel("never-registered"));

        registry.register("req-1");
        registry.remove("req-1");
        assert!(!registry.cancel("req-1"));
    }

    #[test]
    fn test_reregistering_an_id_cancels_the_stale_handle() {
        let registry = RequestRegistry::new();
        let stale = registry.register("req-1");
        let fresh = registry.register("req-1");

        assert!(stale.is_cancelled());
        assert!(!fresh.is_cancelled());
        assert_eq!(registry.tracked(), 1);
    }

    #[test]
    fn test_natural_end_cleanup_is_idempotent() {
        let registry = RequestRegistry::new();
        registry.register("req-1");
        registry.remove("req-1");
        registry.remove("req-1");
        assert_eq!(registry.tracked(), 0);
    }
}
