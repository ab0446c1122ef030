use anyhow::Result;
use std::path::{Path, PathBuf};
use tokio::fs;

/// On-disk layout for uploaded files and converted slide images, rooted at
/// the configured data directory:
///
/// ```text
/// <data_dir>/slides/<deck_id>/<index>.png
/// <data_dir>/uploads/<session_id>/<file_id>_<name>
/// ```
#[derive(Clone)]
pub struct FileStorage {
    base_path: PathBuf,
}

impl FileStorage {
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    /// Directory holding the converted images of a deck
    pub fn deck_dir(&self, deck_id: &str) -> PathBuf {
        self.base_path.join("slides").join(deck_id)
    }

    /// Path of one converted slide image
    pub fn slide_path(&self, deck_id: &str, slide_index: i64) -> PathBuf {
        self.deck_dir(deck_id).join(format!("{}.png", slide_index))
    }

    pub async fn read_slide(&self, deck_id: &str, slide_index: i64) -> Result<Vec<u8>> {
        let bytes = fs::read(self.slide_path(deck_id, slide_index)).await?;
        Ok(bytes)
    }

    /// Move a fully converted image set into place. The staging directory is
    /// renamed in as one unit so viewers never observe a partial deck.
    pub async fn publish_deck(&self, deck_id: &str, staging_dir: &Path) -> Result<()> {
        let target = self.deck_dir(deck_id);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        if target.exists() {
            fs::remove_dir_all(&target).await?;
        }
        fs::rename(staging_dir, &target).await?;
        Ok(())
    }

    pub async fn delete_deck(&self, deck_id: &str) -> Result<()> {
        let dir = self.deck_dir(deck_id);
        if dir.exists() {
            fs::remove_dir_all(&dir).await?;
        }
        Ok(())
    }

    /// Persist an uploaded file (assignment attachment, material) and return
    /// its storage path relative to the data directory.
    pub async fn save_upload(
        &self,
        session_id: &str,
        file_id: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<String> {
        let safe_name = sanitize_file_name(file_name);
        let rel = format!("uploads/{}/{}_{}", session_id, file_id, safe_name);
        let path = self.base_path.join(&rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, bytes).await?;
        Ok(rel)
    }

    pub async fn read_upload(&self, rel_path: &str) -> Result<Vec<u8>> {
        let bytes = fs::read(self.base_path.join(rel_path)).await?;
        Ok(bytes)
    }

    /// Scratch space for a conversion run
    pub fn staging_dir(&self, deck_id: &str) -> PathBuf {
        self.base_path.join("staging").join(deck_id)
    }
}

/// Uploaded names pass through as path components; strip anything that could
/// escape the upload directory.
fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim_matches('.').trim();
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slide_paths() {
        let storage = FileStorage::new("/data");
        assert_eq!(
            storage.slide_path("deck-1", 3),
            PathBuf::from("/data/slides/deck-1/3.png")
        );
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("report.pdf"), "report.pdf");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "_.._etc_passwd");
        assert_eq!(sanitize_file_name("a/b\\c.txt"), "a_b_c.txt");
        assert_eq!(sanitize_file_name(""), "upload");
    }

    #[tokio::test]
    async fn test_save_and_read_upload() {
        let dir = std::env::temp_dir().join(format!("classline-storage-{}", uuid::Uuid::new_v4()));
        let storage = FileStorage::new(&dir);

        let rel = storage
            .save_upload("sess-1", "file-1", "notes.txt", b"hello")
            .await
            .unwrap();
        let bytes = storage.read_upload(&rel).await.unwrap();
        assert_eq!(bytes, b"hello");

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_publish_deck_replaces_atomically() {
        let dir = std::env::temp_dir().join(format!("classline-publish-{}", uuid::Uuid::new_v4()));
        let storage = FileStorage::new(&dir);

        let staging = storage.staging_dir("deck-1");
        tokio::fs::create_dir_all(&staging).await.unwrap();
        tokio::fs::write(staging.join("0.png"), b"img").await.unwrap();

        storage.publish_deck("deck-1", &staging).await.unwrap();
        let bytes = storage.read_slide("deck-1", 0).await.unwrap();
        assert_eq!(bytes, b"img");
        assert!(!staging.exists());

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
