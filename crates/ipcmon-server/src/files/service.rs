//! Upload, download and deletion of user files through an [`ObjectStore`].

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_stream::try_stream;
use axum::body::Bytes;
use ipcmon_core::config::StorageConfig;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tokio_stream::Stream;
use tracing::{info, warn};

use super::store::{ObjectStore, StoreError};
use crate::error::{ServiceError, ServiceResult};
use crate::storage::{FileRecord, ServerDatabase};

/// Size of each ranged read while streaming a download.
pub const CHUNK_SIZE: u64 = 1024 * 1024;

pub const AUTHOR_KEY: &str = "author_id";
pub const ORIGINAL_NAME_KEY: &str = "original-filename";

const AVATAR_TYPES: [&str; 3] = ["image/png", "image/jpeg", "image/webp"];

/// RFC 5987 `attr-char` leaves these unescaped.
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

/// A file received from a client.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Folder {
    Uploads,
    Presets,
}

/// Everything needed to build a download response.
#[derive(Debug, Clone)]
pub struct Download {
    pub store_key: String,
    pub filename: String,
    pub content_type: String,
    pub size: u64,
}

impl Download {
    /// `Content-Disposition` value with an ASCII fallback and an RFC 5987
    /// UTF-8 `filename*`.
    pub fn content_disposition(&self) -> String {
        let fallback: String = self
            .filename
            .chars()
            .map(|c| {
                if c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let encoded = utf8_percent_encode(&self.filename, ATTR_CHAR);
        format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
    }
}

#[derive(Clone)]
pub struct FileService {
    db: ServerDatabase,
    store: Arc<dyn ObjectStore>,
    settings: StorageConfig,
    public_url: String,
}

impl FileService {
    pub fn new(
        db: ServerDatabase,
        store: Arc<dyn ObjectStore>,
        settings: StorageConfig,
        public_url: impl Into<String>,
    ) -> Self {
        Self {
            db,
            store,
            settings,
            public_url: public_url.into(),
        }
    }

    fn folder_name(&self, folder: Folder) -> &str {
        match folder {
            Folder::Uploads => &self.settings.uploads_folder,
            Folder::Presets => &self.settings.presets_folder,
        }
    }

    fn store_key(&self, folder: Folder, key: &str) -> String {
        format!("{}/{key}", self.folder_name(folder))
    }

    /// Validate and store an upload, then record it.
    pub async fn upload(&self, author_id: i64, upload: Upload) -> ServiceResult<FileRecord> {
        if upload.data.is_empty() {
            return Err(ServiceError::EmptyFile);
        }
        if upload.data.len() as u64 > self.settings.max_size_bytes() {
            return Err(ServiceError::FileTooLarge {
                max_mb: self.settings.max_size_mb,
            });
        }

        let extension = guess_extension(upload.content_type.as_deref(), upload.filename.as_deref());
        let key = format!("{}.{extension}", uuid::Uuid::new_v4().simple());
        let origin = upload.filename.clone().unwrap_or_else(|| key.clone());
        let content_type = upload
            .content_type
            .clone()
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let size = upload.data.len();

        let metadata = HashMap::from([
            (AUTHOR_KEY.to_string(), author_id.to_string()),
            (ORIGINAL_NAME_KEY.to_string(), origin.clone()),
        ]);
        self.store
            .put(
                &self.store_key(Folder::Uploads, &key),
                upload.data,
                &content_type,
                metadata,
            )
            .await
            .map_err(ServiceError::FileUploadFailed)?;

        let record = self
            .db
            .create_file(&key, &origin, i64::try_from(size).unwrap_or(i64::MAX), author_id)
            .await?;
        info!(key = %record.key, author_id, size, "File uploaded");
        Ok(record)
    }

    /// Store an avatar image. Only PNG, JPEG and WebP are accepted.
    pub async fn upload_avatar(&self, user_id: i64, upload: Upload) -> ServiceResult<FileRecord> {
        let allowed = upload
            .content_type
            .as_deref()
            .is_some_and(|ct| AVATAR_TYPES.contains(&ct));
        if !allowed {
            return Err(ServiceError::UnsupportedMediaType);
        }
        self.upload(user_id, upload).await
    }

    /// Look up an object for download.
    pub async fn open(&self, folder: Folder, key: &str) -> ServiceResult<Download> {
        let store_key = self.store_key(folder, key);
        let meta = match self.store.head(&store_key).await {
            Ok(Some(meta)) => meta,
            Ok(None) | Err(StoreError::InvalidKey(_) | StoreError::NotFound(_)) => {
                return Err(ServiceError::FileNotFound);
            }
            Err(e) => return Err(ServiceError::StreamingFailed(e)),
        };

        let filename = meta
            .metadata
            .get(ORIGINAL_NAME_KEY)
            .cloned()
            .unwrap_or_else(|| key.to_string());
        let content_type = if meta.content_type.is_empty() {
            mime_guess::from_path(key).first_or_octet_stream().to_string()
        } else {
            meta.content_type
        };
        Ok(Download {
            store_key,
            filename,
            content_type,
            size: meta.size,
        })
    }

    /// Stream an object in [`CHUNK_SIZE`] ranged reads.
    pub fn stream(
        &self,
        download: &Download,
    ) -> impl Stream<Item = Result<Bytes, StoreError>> + Send + 'static {
        let store = Arc::clone(&self.store);
        let key = download.store_key.clone();
        let size = download.size;
        try_stream! {
            let mut offset = 0;
            while offset < size {
                let chunk = store.get_range(&key, offset, CHUNK_SIZE).await?;
                if chunk.is_empty() {
                    break;
                }
                offset += chunk.len() as u64;
                yield chunk;
            }
        }
    }

    /// Delete an upload. Only its author may do so.
    pub async fn delete(&self, user_id: i64, key: &str) -> ServiceResult<()> {
        self.db
            .get_file(key)
            .await
            .map_err(|e| ServiceError::from_lookup(e, ServiceError::FileNotFound))?;

        let store_key = self.store_key(Folder::Uploads, key);
        let meta = match self.store.head(&store_key).await {
            Ok(Some(meta)) => meta,
            Ok(None) | Err(StoreError::InvalidKey(_) | StoreError::NotFound(_)) => {
                return Err(ServiceError::FileNotFound);
            }
            Err(e) => {
                warn!(key, error = %e, "Failed to read object metadata");
                return Err(ServiceError::InvalidMetadata);
            }
        };
        let author = meta
            .metadata
            .get(AUTHOR_KEY)
            .and_then(|raw| raw.parse::<i64>().ok())
            .ok_or(ServiceError::InvalidMetadata)?;
        if author != user_id {
            return Err(ServiceError::NotAuthorized);
        }

        self.store
            .delete(&store_key)
            .await
            .map_err(ServiceError::FileDeleteFailed)?;
        self.db.delete_file(key).await?;
        info!(key, user_id, "File deleted");
        Ok(())
    }

    /// Public URL of an avatar. The shared default lives in the presets
    /// folder; everything else is an upload.
    pub fn avatar_url(&self, avatar: &str) -> String {
        let folder = if avatar == self.settings.default_avatar {
            "presets"
        } else {
            "file"
        };
        format!(
            "{}/v1/files/{folder}/{avatar}",
            self.public_url.trim_end_matches('/')
        )
    }

    pub fn default_avatar(&self) -> &str {
        &self.settings.default_avatar
    }

    pub const fn settings(&self) -> &StorageConfig {
        &self.settings
    }

    pub const fn max_size_mb(&self) -> u64 {
        self.settings.max_size_mb
    }
}

/// Extension for a new object: from the content type, else the original
/// filename, else `bin`.
fn guess_extension(content_type: Option<&str>, filename: Option<&str>) -> String {
    let from_type = content_type.and_then(|ct| match ct {
        "image/jpeg" => Some("jpg"),
        "text/plain" => Some("txt"),
        other => mime_guess::get_mime_extensions_str(other).and_then(|exts| exts.first().copied()),
    });
    let from_name = || {
        filename
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
    };
    from_type
        .or_else(from_name)
        .unwrap_or("bin")
        .to_ascii_lowercase()
}
