//! One pretty-printed JSON file per conversation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use branch_tree::{ConversationDocument, ConversationId};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::TreeStorage;
use crate::error::{StoreError, StoreResult};

const EXTENSION: &str = "json";

#[derive(Debug, Clone)]
pub struct FileTreeStorage {
    base_dir: PathBuf,
}

impl FileTreeStorage {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Ids are used as file names, so anything that could escape the base
    /// directory is treated as an unknown conversation.
    fn unit_path(&self, id: &ConversationId) -> StoreResult<PathBuf> {
        let raw = id.as_str();
        let is_plain = !raw.is_empty()
            && !raw.starts_with('.')
            && !raw.contains(['/', '\\'])
            && raw != "..";
        if !is_plain {
            return Err(StoreError::ConversationNotFound(id.clone()));
        }
        Ok(self.base_dir.join(format!("{raw}.{EXTENSION}")))
    }

    fn temp_path(&self, id: &ConversationId) -> PathBuf {
        self.base_dir
            .join(format!(".{}.{}.tmp", id, uuid::Uuid::new_v4().simple()))
    }

    async fn write_atomically(&self, target: &Path, temp: &Path, contents: &[u8]) -> StoreResult<()> {
        let mut file = fs::File::create(temp).await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(temp, target).await?;
        Ok(())
    }
}

#[async_trait]
impl TreeStorage for FileTreeStorage {
    async fn init(&self) -> StoreResult<()> {
        fs::create_dir_all(&self.base_dir).await?;
        Ok(())
    }

    async fn load_document(
        &self,
        id: &ConversationId,
    ) -> StoreResult<Option<ConversationDocument>> {
        let path = self.unit_path(id)?;
        let contents = match fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                debug!(conversation_id = %id, "FileStorage: no file on disk");
                return Ok(None);
            }
            Err(error) => return Err(error.into()),
        };

        match ConversationDocument::from_json(&contents) {
            Ok(document) => Ok(Some(document)),
            Err(error) => {
                warn!(
                    conversation_id = %id,
                    path = %path.display(),
                    error = %error,
                    "FileStorage: unreadable conversation file, starting from an empty tree"
                );
                Ok(None)
            }
        }
    }

    async fn save_document(
        &self,
        id: &ConversationId,
        document: &ConversationDocument,
    ) -> StoreResult<()> {
        let path = self.unit_path(id)?;
        fs::create_dir_all(&self.base_dir).await?;

        let contents = document.to_json_pretty()?;
        let temp = self.temp_path(id);
        if let Err(error) = self.write_atomically(&path, &temp, contents.as_bytes()).await {
            let _ = fs::remove_file(&temp).await;
            return Err(error);
        }

        debug!(
            conversation_id = %id,
            nodes = document.nodes.len(),
            branches = document.branches.len(),
            "FileStorage: saved conversation"
        );
        Ok(())
    }

    async fn delete_document(&self, id: &ConversationId) -> StoreResult<bool> {
        let path = self.unit_path(id)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(conversation_id = %id, "FileStorage: deleted conversation");
                Ok(true)
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(error) => Err(error.into()),
        }
    }

    async fn list_documents(&self) -> StoreResult<Vec<ConversationId>> {
        let mut entries = match fs::read_dir(&self.base_dir).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(error.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if stem.is_empty() || stem.starts_with('.') {
                continue;
            }
            if entry.file_type().await?.is_file() {
                ids.push(ConversationId::from_raw(stem));
            }
        }

        ids.sort();
        Ok(ids)
    }

    async fn exists(&self, id: &ConversationId) -> StoreResult<bool> {
        match self.unit_path(id) {
            Ok(path) => Ok(fs::try_exists(&path).await?),
            Err(_) => Ok(false),
        }
    }
}
