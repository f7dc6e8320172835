use std::path::{Component, Path, PathBuf};

use anyhow::{Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

use campus_types::api::{AttachmentUpload, CleanupOutcome};

use crate::error::ApiError;

/// Public prefix of every attachment reference.
pub const REFERENCE_PREFIX: &str = "/uploads/";

/// On-disk store for grade and diploma attachments.
///
/// Each upload is a flat file `{dir}/{uuid}{ext}`; callers only ever see the
/// opaque reference `/uploads/{uuid}{ext}`.
pub struct AttachmentStore {
    dir: PathBuf,
    max_bytes: usize,
}

impl AttachmentStore {
    pub async fn new(dir: PathBuf, max_bytes: usize) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Attachment directory: {}", dir.display());
        Ok(Self { dir, max_bytes })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Decode and size-check an inline upload. Runs before any durable write.
    pub fn decode(&self, upload: &AttachmentUpload) -> Result<Vec<u8>, ApiError> {
        let bytes = B64
            .decode(upload.data.as_bytes())
            .map_err(|_| ApiError::Validation("attachment data is not valid base64".into()))?;

        if bytes.is_empty() {
            return Err(ApiError::Validation("attachment is empty".into()));
        }
        if bytes.len() > self.max_bytes {
            return Err(ApiError::Validation(format!(
                "attachment exceeds {} bytes",
                self.max_bytes
            )));
        }
        Ok(bytes)
    }

    /// Write `bytes` under a fresh name and return its reference.
    pub async fn save(&self, filename: &str, bytes: &[u8]) -> Result<String> {
        let name = format!("{}{}", Uuid::new_v4(), extension_of(filename));
        let path = self.dir.join(&name);

        let mut file = fs::File::create(&path).await?;
        file.write_all(bytes).await?;
        file.flush().await?;

        info!("Stored attachment {} ({} bytes)", name, bytes.len());
        Ok(format!("{}{}", REFERENCE_PREFIX, name))
    }

    /// Delete the file behind `reference`. A file that is already gone counts
    /// as deleted.
    pub async fn delete(&self, reference: &str) -> Result<()> {
        let path = self
            .resolve(reference)
            .ok_or_else(|| anyhow!("reference '{}' is outside the attachment store", reference))?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted attachment {}", reference);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Attachment {} already gone", reference);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Best-effort cleanup after the owning row was deleted. Never fails;
    /// problems are logged and reported in the outcome.
    pub async fn cleanup(&self, reference: Option<&str>) -> CleanupOutcome {
        let Some(reference) = reference else {
            return CleanupOutcome::NoAttachment;
        };
        match self.delete(reference).await {
            Ok(()) => CleanupOutcome::Removed,
            Err(e) => {
                warn!("Attachment cleanup failed for {}: {}", reference, e);
                CleanupOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Map a reference back to a path inside the store. Only a single plain
    /// file name after the prefix is accepted.
    fn resolve(&self, reference: &str) -> Option<PathBuf> {
        let name = reference.strip_prefix(REFERENCE_PREFIX)?;
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(file)), None) => Some(self.dir.join(file)),
            _ => None,
        }
    }
}

/// ".ext" lowercased when the name carries a short alphanumeric extension.
fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 10 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store(max_bytes: usize) -> AttachmentStore {
        let dir = std::env::temp_dir().join(format!("campus-attachments-{}", Uuid::new_v4()));
        AttachmentStore::new(dir, max_bytes).await.unwrap()
    }

    fn upload(data: &[u8]) -> AttachmentUpload {
        AttachmentUpload {
            filename: "report.PDF".into(),
            data: B64.encode(data),
        }
    }

    #[test]
    fn extension_is_sanitised() {
        assert_eq!(extension_of("report.PDF"), ".pdf");
        assert_eq!(extension_of("archive.tar.gz"), ".gz");
        assert_eq!(extension_of("noext"), "");
        assert_eq!(extension_of("weird.p$f"), "");
    }

    #[tokio::test]
    async fn decode_rejects_bad_or_oversized_uploads() {
        let store = store(4).await;
        assert_eq!(store.decode(&upload(b"abcd")).unwrap(), b"abcd");
        assert!(matches!(store.decode(&upload(b"abcde")), Err(ApiError::Validation(_))));
        assert!(matches!(store.decode(&upload(b"")), Err(ApiError::Validation(_))));

        let garbage = AttachmentUpload {
            filename: "x".into(),
            data: "***".into(),
        };
        assert!(matches!(store.decode(&garbage), Err(ApiError::Validation(_))));
    }

    #[tokio::test]
    async fn save_then_delete() {
        let store = store(1024).await;
        let reference = store.save("scan.png", b"png bytes").await.unwrap();
        assert!(reference.starts_with(REFERENCE_PREFIX));
        assert!(reference.ends_with(".png"));

        let path = store.resolve(&reference).unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"png bytes");

        assert_eq!(store.cleanup(Some(&reference)).await, CleanupOutcome::Removed);
        assert!(!path.exists());
        // Second removal finds nothing and still succeeds.
        assert_eq!(store.cleanup(Some(&reference)).await, CleanupOutcome::Removed);
    }

    #[tokio::test]
    async fn references_cannot_escape_the_store() {
        let store = store(1024).await;
        assert!(store.resolve("/uploads/../secret").is_none());
        assert!(store.resolve("/uploads/a/b").is_none());
        assert!(store.resolve("/etc/passwd").is_none());

        let outcome = store.cleanup(Some("/uploads/../secret")).await;
        assert!(matches!(outcome, CleanupOutcome::Failed { .. }));
        assert_eq!(store.cleanup(None).await, CleanupOutcome::NoAttachment);
    }
}
