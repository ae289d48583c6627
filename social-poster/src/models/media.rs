use std::path::Path;
use tempfile::NamedTempFile;

/// An uploaded image staged in a temporary file.
///
/// The file is removed when the value is dropped, so whoever owns it last
/// (normally the publish call) cleans up on every return path.
#[derive(Debug)]
pub struct StagedImage {
    file: NamedTempFile,
    pub file_name: String,
    pub content_type: String,
}

impl StagedImage {
    pub async fn stage(
        bytes: &[u8],
        file_name: impl Into<String>,
        content_type: impl Into<String>,
    ) -> std::io::Result<Self> {
        let file = tempfile::Builder::new()
            .prefix("social-poster-upload-")
            .tempfile()?;
        tokio::fs::write(file.path(), bytes).await?;

        Ok(Self {
            file,
            file_name: file_name.into(),
            content_type: content_type.into(),
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub async fn read(&self) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(self.path()).await
    }
}
