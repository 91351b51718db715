use crate::core::error::InputError;
use crate::core::state::InlineImage;
use std::path::Path;

/// Reads a reference image from disk, enforcing the size limit and sniffing the format.
pub async fn load_reference_image(path: &Path, max_bytes: u64) -> Result<InlineImage, InputError> {
    let unreadable = |source| InputError::Unreadable {
        path: path.display().to_string(),
        source,
    };

    let metadata = tokio::fs::metadata(path).await.map_err(unreadable)?;
    if metadata.len() > max_bytes {
        return Err(InputError::TooLarge {
            size: metadata.len(),
            limit: max_bytes,
        });
    }

    let data = tokio::fs::read(path).await.map_err(unreadable)?;
    reference_image_from_bytes(data, &path.display().to_string())
}

/// Accepts only bytes recognised as an image; the mime type comes from the content, not the name.
pub fn reference_image_from_bytes(data: Vec<u8>, label: &str) -> Result<InlineImage, InputError> {
    let format =
        image::guess_format(&data).map_err(|_| InputError::NotAnImage(label.to_string()))?;
    Ok(InlineImage::new(format.to_mime_type(), data))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
    const JPEG_MAGIC: &[u8] = b"\xff\xd8\xff\xe0\0\x10JFIF\0";

    #[tokio::test]
    async fn test_loads_png_with_sniffed_mime() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("john.dat");
        std::fs::write(&path, PNG_MAGIC)?;

        let image = load_reference_image(&path, 2 * 1024 * 1024).await?;
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.data, PNG_MAGIC);
        Ok(())
    }

    #[tokio::test]
    async fn test_rejects_oversized_file() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("big.png");
        let mut data = PNG_MAGIC.to_vec();
        data.resize(1024, 0);
        std::fs::write(&path, &data)?;

        match load_reference_image(&path, 512).await {
            Err(InputError::TooLarge { size, limit }) => {
                assert_eq!(size, 1024);
                assert_eq!(limit, 512);
            }
            other => panic!("unexpected: {:?}", other.map(|i| i.mime_type)),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_rejects_missing_and_non_image_files() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let missing = temp_dir.path().join("nope.png");
        assert!(matches!(
            load_reference_image(&missing, 1024).await,
            Err(InputError::Unreadable { .. })
        ));

        let text = temp_dir.path().join("notes.png");
        std::fs::write(&text, "JOHN: Hi")?;
        assert!(matches!(
            load_reference_image(&text, 1024).await,
            Err(InputError::NotAnImage(_))
        ));
        Ok(())
    }

    #[test]
    fn test_jpeg_bytes() {
        let image = reference_image_from_bytes(JPEG_MAGIC.to_vec(), "x").unwrap();
        assert_eq!(image.mime_type, "image/jpeg");
    }
}
