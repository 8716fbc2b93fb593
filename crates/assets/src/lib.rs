/// Local asset handling for StoryBuilder
///
/// Resolves `story-asset://` references to files confined to the
/// projects root, and imports uploaded images into a project's
/// `avatars/` directory.
pub mod resolver;
pub mod upload;

pub use resolver::{AssetError, AssetResolver, ResolvedAsset};
pub use upload::import_image;
