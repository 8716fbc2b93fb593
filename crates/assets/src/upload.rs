/// Image import for project avatars
///
/// Uploaded images are re-encoded as PNG, capped at 1024px wide, and
/// stored under the project's `avatars/` directory.
use anyhow::{Context, Result};
use image::imageops::FilterType;
use std::io::Cursor;
use std::path::Path;
use uuid::Uuid;

const MAX_WIDTH: u32 = 1024;

/// Import a local image file into `<root>/<project-id>/avatars/`,
/// returning the project-relative asset reference.
pub async fn import_image(
    root: &Path,
    project_id: &str,
    source: &Path,
) -> Result<String> {
    let mut img = image::open(source)
        .with_context(|| format!("failed to decode image {}", source.display()))?;

    if img.width() > MAX_WIDTH {
        let scaled_height =
            ((img.height() as u64 * MAX_WIDTH as u64) / img.width() as u64).max(1) as u32;
        img = img.resize(MAX_WIDTH, scaled_height, FilterType::Lanczos3);
    }

    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .context("failed to encode avatar as PNG")?;

    let avatars_dir = root.join(project_id).join("avatars");
    tokio::fs::create_dir_all(&avatars_dir).await?;

    let file_name = format!("{}.png", Uuid::new_v4());
    tokio::fs::write(avatars_dir.join(&file_name), bytes).await?;

    Ok(format!("{project_id}/avatars/{file_name}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::DynamicImage;

    fn write_source(dir: &Path, width: u32, height: u32) -> std::path::PathBuf {
        let source = dir.join("source.png");
        DynamicImage::new_rgb8(width, height).save(&source).unwrap();
        source
    }

    #[tokio::test]
    async fn test_wide_images_are_downscaled_to_max_width() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_source(dir.path(), 2048, 512);

        let reference = import_image(dir.path(), "proj", &source).await.unwrap();
        assert!(reference.starts_with("proj/avatars/"));
        assert!(reference.ends_with(".png"));

        let written = image::open(dir.path().join(&reference)).unwrap();
        assert_eq!(written.width(), 1024);
        assert_eq!(written.height(), 256);
    }

    #[tokio::test]
    async fn test_small_images_keep_their_size() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_source(dir.path(), 640, 480);

        let reference = import_image(dir.path(), "proj", &source).await.unwrap();
        let written = image::open(dir.path().join(&reference)).unwrap();
        assert_eq!((written.width(), written.height()), (640, 480));
    }

    #[tokio::test]
    async fn test_unreadable_source_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("not-an-image.png");
        std::fs::write(&bogus, b"plain text").unwrap();
        assert!(import_image(dir.path(), "proj", &bogus).await.is_err());
    }
}
