/// Asset reference resolution
///
/// Turns a reference string into a file path servable to the UI. The
/// containment check against the projects root is the sole
/// access-control boundary: comparison is per path component and
/// case-insensitive, so neither `..` traversal nor a `root-evil`
/// sibling directory sharing the root's string prefix can escape.
///
/// Normalization is lexical only; symlinks are not resolved.
use percent_encoding::percent_decode_str;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::warn;

pub const SCHEME_PREFIX: &str = "story-asset://";

#[derive(Debug, Error)]
pub enum AssetError {
    /// Reference resolves outside the projects root. 403-equivalent.
    #[error("asset path escapes the projects root")]
    Forbidden,
    /// Resolved file does not exist. 404-equivalent.
    #[error("asset not found")]
    NotFound,
    #[error("asset read failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAsset {
    pub path: PathBuf,
    pub content_type: &'static str,
}

#[derive(Debug, Clone)]
pub struct AssetResolver {
    root: PathBuf,
}

impl AssetResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: normalize(&root.into()),
        }
    }

    /// Resolve a reference to an absolute path under the root. Accepts
    /// bare relative references (`<project-id>/avatars/<file>`),
    /// absolute paths already under the root, and fully-qualified
    /// `story-asset://` locators; stray `file://` prefixes and percent
    /// escapes are cleaned up first.
    pub fn resolve(&self, reference: &str) -> Result<ResolvedAsset, AssetError> {
        let stripped = reference
            .trim_start_matches(SCHEME_PREFIX)
            .trim_start_matches("file://");
        let decoded = percent_decode_str(stripped).decode_utf8_lossy();

        let requested = Path::new(decoded.as_ref());
        let absolute = if requested.is_absolute() {
            normalize(requested)
        } else {
            normalize(&self.root.join(requested))
        };

        if !is_contained(&self.root, &absolute) {
            warn!(reference, resolved = %absolute.display(), "forbidden asset path");
            return Err(AssetError::Forbidden);
        }

        Ok(ResolvedAsset {
            content_type: content_type_for(&absolute),
            path: absolute,
        })
    }

    /// Resolve and read the file bytes.
    pub async fn read(&self, reference: &str) -> Result<(Vec<u8>, &'static str), AssetError> {
        let asset = self.resolve(reference)?;
        match tokio::fs::read(&asset.path).await {
            Ok(bytes) => Ok((bytes, asset.content_type)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(AssetError::NotFound),
            Err(err) => Err(err.into()),
        }
    }
}

/// Fold `.` and `..` components without touching the filesystem. A
/// `..` at the top simply drops (it can only point further outside,
/// which the containment check rejects anyway).
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// Component-wise, case-insensitive prefix check. Comparing whole
/// components keeps `/data/proj1-evil` from matching root
/// `/data/proj1`.
fn is_contained(root: &Path, candidate: &Path) -> bool {
    let root: Vec<String> = path_keys(root);
    let candidate: Vec<String> = path_keys(candidate);
    candidate.len() >= root.len() && candidate[..root.len()] == root[..]
}

fn path_keys(path: &Path) -> Vec<String> {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().to_ascii_lowercase())
        .collect()
}

pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}
