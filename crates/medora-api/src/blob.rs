use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use axum::body::Bytes;
use chrono::Utc;
use tokio::fs;
use tracing::{info, warn};
use uuid::Uuid;

use medora_db::Database;
use medora_db::models::{FileRow, to_millis};

/// A file about to be stored.
#[derive(Debug, Clone)]
pub struct NewBlob {
    pub owner_id: String,
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub id: String,
    pub url: String,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct BlobContent {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Where uploaded consultation attachments live.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn store(&self, blob: NewBlob) -> Result<StoredBlob>;
    async fn load(&self, id: &str) -> Result<Option<BlobContent>>;
    async fn delete(&self, id: &str) -> Result<()>;
}

/// Files on local disk at `{dir}/{id}`, metadata in the `files` table.
pub struct LocalBlobStore {
    dir: PathBuf,
    db: Arc<Database>,
    public_base: String,
}

impl LocalBlobStore {
    pub async fn new(dir: PathBuf, db: Arc<Database>, public_base: impl Into<String>) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Upload directory: {}", dir.display());
        Ok(Self {
            dir,
            db,
            public_base: public_base.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn url_for(&self, id: &str) -> String {
        format!("{}/files/{}", self.public_base, id)
    }

    fn file_path(&self, id: &str) -> PathBuf {
        self.dir.join(id)
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn store(&self, blob: NewBlob) -> Result<StoredBlob> {
        let id = Uuid::new_v4().to_string();
        let size = blob.bytes.len() as u64;
        fs::write(self.file_path(&id), &blob.bytes).await?;

        let row = FileRow {
            id: id.clone(),
            owner_id: blob.owner_id,
            file_name: blob.file_name,
            content_type: blob.content_type,
            size: size as i64,
            created_at: to_millis(Utc::now()),
        };
        let db = self.db.clone();
        let inserted = tokio::task::spawn_blocking(move || db.insert_file(&row)).await?;
        if let Err(e) = inserted {
            let _ = fs::remove_file(self.file_path(&id)).await;
            return Err(e);
        }

        Ok(StoredBlob {
            url: self.url_for(&id),
            id,
            size,
        })
    }

    async fn load(&self, id: &str) -> Result<Option<BlobContent>> {
        // ids are server-generated uuids; anything else never reaches the filesystem
        if id.parse::<Uuid>().is_err() {
            return Ok(None);
        }

        let db = self.db.clone();
        let fid = id.to_string();
        let Some(row) = tokio::task::spawn_blocking(move || db.get_file(&fid)).await?? else {
            return Ok(None);
        };

        match fs::read(self.file_path(id)).await {
            Ok(bytes) => Ok(Some(BlobContent {
                file_name: row.file_name,
                content_type: row.content_type,
                bytes,
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("File {} is registered but missing on disk", id);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, id: &str) -> Result<()> {
        match fs::remove_file(self.file_path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("medora-blob-{}", Uuid::new_v4()))
    }

    #[tokio::test]
    async fn stored_file_can_be_loaded() {
        let dir = temp_dir();
        let db = Arc::new(Database::open_in_memory().unwrap());
        let store = LocalBlobStore::new(dir.clone(), db.clone(), "https://cdn.example/").await.unwrap();

        let stored = store
            .store(NewBlob {
                owner_id: "P".into(),
                file_name: "scan.png".into(),
                content_type: "image/png".into(),
                bytes: Bytes::from_static(b"\x89PNG"),
            })
            .await
            .unwrap();

        assert_eq!(stored.size, 4);
        assert_eq!(stored.url, format!("https://cdn.example/files/{}", stored.id));
        assert_eq!(db.get_file(&stored.id).unwrap().unwrap().owner_id, "P");

        let content = store.load(&stored.id).await.unwrap().unwrap();
        assert_eq!(content.content_type, "image/png");
        assert_eq!(content.bytes, b"\x89PNG");

        store.delete(&stored.id).await.unwrap();
        assert!(store.load(&stored.id).await.unwrap().is_none());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn unknown_or_malformed_ids_load_nothing() {
        let dir = temp_dir();
        let db = Arc::new(Database::open_in_memory().unwrap());
        let store = LocalBlobStore::new(dir.clone(), db, "").await.unwrap();

        assert!(store.load("../../etc/passwd").await.unwrap().is_none());
        assert!(store.load(&Uuid::new_v4().to_string()).await.unwrap().is_none());
        let _ = std::fs::remove_dir_all(dir);
    }
}
