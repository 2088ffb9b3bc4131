//! Fixtures shared by the unit tests.

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::path::Path;

use crate::config::{AppConfig, ImageStorage};
use crate::db::connect_db;
use crate::image_store::SharedImageStore;
use crate::migration::run_migrations;
use crate::repository::MemoryRepository;
use crate::upload::{validate_image, MemoryFields, UploadedImage};

pub async fn memory_db() -> DatabaseConnection {
    let mut opt = ConnectOptions::new("sqlite::memory:".to_string());
    opt.max_connections(1).min_connections(1).sqlx_logging(false);
    Database::connect(opt).await.unwrap()
}

pub async fn migrated_db(store: SharedImageStore) -> DatabaseConnection {
    let db = memory_db().await;
    run_migrations(&db, store, Path::new("/nonexistent")).await.unwrap();
    db
}

pub async fn repository(store: SharedImageStore) -> MemoryRepository {
    let db = migrated_db(store.clone()).await;
    MemoryRepository::new(db, store)
}

/// A migrated SQLite file under `dir` behind a pool of `max_connections`.
pub async fn file_repository(
    dir: &Path,
    max_connections: u32,
    store: SharedImageStore,
) -> MemoryRepository {
    let config = AppConfig {
        server_port: 0,
        sqlite_path: dir.join("memories.sqlite").display().to_string(),
        database_url: None,
        max_connections,
        upload_storage_path: dir.display().to_string(),
        image_storage: ImageStorage::SideTable,
        cors_allow_origin: "*".to_string(),
        development: false,
    };
    let db = connect_db(&config).await.unwrap();
    run_migrations(&db, store.clone(), dir).await.unwrap();
    MemoryRepository::new(db, store)
}

pub fn fields(pairs: &[(&str, &str)]) -> MemoryFields {
    let mut fields = MemoryFields::default();
    for (name, value) in pairs {
        fields.set_text(name, value.to_string());
    }
    fields
}

pub fn png_bytes() -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    bytes.extend_from_slice(&[0, 0, 0, 0x0D, b'I', b'H', b'D', b'R', 0, 0, 0, 1, 0, 0, 0, 1]);
    bytes
}

pub fn gif_bytes() -> Vec<u8> {
    let mut bytes = b"GIF89a".to_vec();
    bytes.extend_from_slice(&[1, 0, 1, 0, 0, 0, 0, b';']);
    bytes
}

pub fn png_image() -> UploadedImage {
    validate_image("photo.png", Some("image/png"), png_bytes()).unwrap()
}

pub struct MultipartPart {
    name: String,
    file_name: Option<String>,
    content_type: Option<String>,
    data: Vec<u8>,
}

impl MultipartPart {
    pub fn text(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            file_name: None,
            content_type: None,
            data: value.as_bytes().to_vec(),
        }
    }

    pub fn file(name: &str, file_name: &str, content_type: &str, data: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            file_name: Some(file_name.to_string()),
            content_type: Some(content_type.to_string()),
            data,
        }
    }
}

/// Returns the `Content-Type` header value and the encoded body.
pub fn multipart_body(parts: &[MultipartPart]) -> (String, Vec<u8>) {
    let boundary = "----memories-test-boundary";
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        let mut disposition = format!("Content-Disposition: form-data; name=\"{}\"", part.name);
        if let Some(file_name) = &part.file_name {
            disposition.push_str(&format!("; filename=\"{}\"", file_name));
        }
        body.extend_from_slice(disposition.as_bytes());
        body.extend_from_slice(b"\r\n");
        if let Some(content_type) = &part.content_type {
            body.extend_from_slice(format!("Content-Type: {}\r\n", content_type).as_bytes());
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(&part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    (format!("multipart/form-data; boundary={}", boundary), body)
}
