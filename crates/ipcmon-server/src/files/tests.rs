//! File service tests against a temporary filesystem store.

use std::sync::Arc;

use axum::body::Bytes;
use ipcmon_core::config::StorageConfig;
use tokio_stream::StreamExt;

use super::{CHUNK_SIZE, FileService, Folder, FsObjectStore, ObjectStore, Upload};
use crate::error::ServiceError;
use crate::storage::ServerDatabase;

struct Fixture {
    files: FileService,
    store: Arc<FsObjectStore>,
    db: ServerDatabase,
    _dir: tempfile::TempDir,
}

async fn fixture(max_size_mb: u64) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FsObjectStore::new(dir.path()));
    let db = ServerDatabase::open_in_memory().await.unwrap();
    let settings = StorageConfig {
        max_size_mb,
        ..StorageConfig::default()
    };
    let files = FileService::new(
        db.clone(),
        Arc::clone(&store) as Arc<dyn ObjectStore>,
        settings,
        "http://localhost:8000/",
    );
    Fixture {
        files,
        store,
        db,
        _dir: dir,
    }
}

async fn user(db: &ServerDatabase, email: &str) -> i64 {
    db.create_user("u", email, "h", "default.webp").await.unwrap().id
}

fn upload(name: &str, content_type: Option<&str>, data: &'static [u8]) -> Upload {
    Upload {
        filename: Some(name.to_string()),
        content_type: content_type.map(ToString::to_string),
        data: Bytes::from_static(data),
    }
}

#[tokio::test]
async fn upload_records_and_stores_metadata() {
    let fx = fixture(1).await;
    let author = user(&fx.db, "a@example.com").await;

    let record = fx
        .files
        .upload(author, upload("notes.txt", Some("text/plain"), b"hello"))
        .await
        .unwrap();

    assert!(record.key.ends_with(".txt"));
    assert_eq!(record.key.len(), 32 + 4);
    assert_eq!(record.origin, "notes.txt");
    assert_eq!(record.size, 5);

    let meta = fx
        .store
        .head(&format!("uploads/{}", record.key))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(meta.metadata["author_id"], author.to_string());
    assert_eq!(meta.metadata["original-filename"], "notes.txt");
}

#[tokio::test]
async fn extension_falls_back_to_filename_then_bin() {
    let fx = fixture(1).await;
    let author = user(&fx.db, "a@example.com").await;

    let from_name = fx
        .files
        .upload(author, upload("data.CSV", None, b"a,b"))
        .await
        .unwrap();
    assert!(from_name.key.ends_with(".csv"), "{}", from_name.key);

    let neither = fx
        .files
        .upload(author, upload("blob", None, b"x"))
        .await
        .unwrap();
    assert!(neither.key.ends_with(".bin"), "{}", neither.key);
}

#[tokio::test]
async fn empty_and_oversized_uploads_are_rejected() {
    let fx = fixture(1).await;
    let author = user(&fx.db, "a@example.com").await;

    assert!(matches!(
        fx.files.upload(author, upload("e.txt", None, b"")).await,
        Err(ServiceError::EmptyFile)
    ));

    let big = Upload {
        filename: Some("big.bin".into()),
        content_type: None,
        data: Bytes::from(vec![0u8; 1024 * 1024 + 1]),
    };
    assert!(matches!(
        fx.files.upload(author, big).await,
        Err(ServiceError::FileTooLarge { max_mb: 1 })
    ));
}

#[tokio::test]
async fn avatars_must_be_images() {
    let fx = fixture(1).await;
    let author = user(&fx.db, "a@example.com").await;

    assert!(matches!(
        fx.files
            .upload_avatar(author, upload("a.gif", Some("image/gif"), b"GIF89a"))
            .await,
        Err(ServiceError::UnsupportedMediaType)
    ));
    let record = fx
        .files
        .upload_avatar(author, upload("me.jpg", Some("image/jpeg"), b"\xff\xd8"))
        .await
        .unwrap();
    assert!(record.key.ends_with(".jpg"));
}

#[tokio::test]
async fn download_streams_in_chunks() {
    let fx = fixture(4).await;
    let author = user(&fx.db, "a@example.com").await;
    let payload: Vec<u8> = (0..(CHUNK_SIZE * 2 + 10)).map(|i| (i % 251) as u8).collect();
    let record = fx
        .files
        .upload(
            author,
            Upload {
                filename: Some("large.bin".into()),
                content_type: Some("application/octet-stream".into()),
                data: Bytes::from(payload.clone()),
            },
        )
        .await
        .unwrap();

    let download = fx.files.open(Folder::Uploads, &record.key).await.unwrap();
    assert_eq!(download.size, payload.len() as u64);
    assert_eq!(download.filename, "large.bin");

    let stream = fx.files.stream(&download);
    tokio::pin!(stream);
    let chunks: Vec<Bytes> = stream.map(Result::unwrap).collect().await;
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks.concat(), payload);
}

#[tokio::test]
async fn open_missing_or_hostile_key_is_not_found() {
    let fx = fixture(1).await;
    assert!(matches!(
        fx.files.open(Folder::Uploads, "nope.png").await,
        Err(ServiceError::FileNotFound)
    ));
    assert!(matches!(
        fx.files.open(Folder::Uploads, "../secrets").await,
        Err(ServiceError::FileNotFound)
    ));
}

#[tokio::test]
async fn only_the_author_can_delete() {
    let fx = fixture(1).await;
    let alice = user(&fx.db, "a@example.com").await;
    let bob = user(&fx.db, "b@example.com").await;
    let record = fx
        .files
        .upload(alice, upload("a.txt", Some("text/plain"), b"hi"))
        .await
        .unwrap();

    assert!(matches!(
        fx.files.delete(bob, &record.key).await,
        Err(ServiceError::NotAuthorized)
    ));
    fx.files.delete(alice, &record.key).await.unwrap();
    assert!(matches!(
        fx.files.delete(alice, &record.key).await,
        Err(ServiceError::FileNotFound)
    ));
    assert!(matches!(
        fx.files.open(Folder::Uploads, &record.key).await,
        Err(ServiceError::FileNotFound)
    ));
}

#[tokio::test]
async fn delete_with_corrupt_author_metadata() {
    let fx = fixture(1).await;
    let alice = user(&fx.db, "a@example.com").await;
    fx.db.create_file("orphan.txt", "o.txt", 1, alice).await.unwrap();
    fx.store
        .put(
            "uploads/orphan.txt",
            Bytes::from_static(b"x"),
            "text/plain",
            std::collections::HashMap::new(),
        )
        .await
        .unwrap();

    assert!(matches!(
        fx.files.delete(alice, "orphan.txt").await,
        Err(ServiceError::InvalidMetadata)
    ));
}

#[test]
fn content_disposition_has_ascii_fallback() {
    let download = super::Download {
        store_key: "uploads/x.pdf".into(),
        filename: "отчёт \"Q1\".pdf".into(),
        content_type: "application/pdf".into(),
        size: 1,
    };
    let header = download.content_disposition();
    assert!(header.starts_with("attachment; filename=\"_____ _Q1_.pdf\""), "{header}");
    assert!(header.contains("filename*=UTF-8''%D0%BE"), "{header}");
}

#[tokio::test]
async fn avatar_urls_point_at_presets_or_uploads() {
    let fx = fixture(1).await;
    assert_eq!(
        fx.files.avatar_url("default.webp"),
        "http://localhost:8000/v1/files/presets/default.webp"
    );
    assert_eq!(
        fx.files.avatar_url("abc.png"),
        "http://localhost:8000/v1/files/file/abc.png"
    );
}
