//! Startup schema management.
//!
//! Numbered migrations are applied once and recorded in `t_schema_version`.
//! Afterwards, column checks patch tables created by older deployments and the
//! legacy `image_path` column is folded into the configured image store.

use chrono::Utc;
use log::{error, info, warn};
use sea_orm::{ConnectionTrait, DatabaseConnection, Statement, TransactionTrait};
use std::path::{Path, PathBuf};

use crate::error::AppError;
use crate::image_store::{SharedImageStore, StagedImage};
use crate::upload::{validate_image, UploadedImage};

pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub sql: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_memory",
        sql: include_str!("../migrations/001_create_memory.sql"),
    },
    Migration {
        version: 2,
        name: "create_memory_image",
        sql: include_str!("../migrations/002_create_memory_image.sql"),
    },
];

const CORE_TABLE: &str = "t_memory";
const LEGACY_IMAGE_COLUMN: &str = "image_path";

/// Columns added after the first release, with their definitions.
const EXPECTED_COLUMNS: &[(&str, &str)] = &[
    ("mood", "TEXT"),
    ("tags", "TEXT"),
    ("has_image", "INTEGER NOT NULL DEFAULT 0"),
    ("image_data", "TEXT"),
    ("image_mime", "TEXT"),
    ("created", "TEXT"),
    ("updated", "TEXT"),
];

pub async fn run_migrations(
    db: &DatabaseConnection,
    store: SharedImageStore,
    upload_root: &Path,
) -> Result<(), AppError> {
    exec(
        db,
        "CREATE TABLE IF NOT EXISTS t_schema_version (version INTEGER PRIMARY KEY NOT NULL, name TEXT NOT NULL, applied TEXT NOT NULL)",
        vec![],
    )
    .await?;

    let current = current_version(db).await?;
    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        apply(db, migration).await?;
        info!("applied migration {} ({})", migration.version, migration.name);
    }

    if !table_exists(db, CORE_TABLE).await? {
        return Err(AppError::storage(
            "schema check failed",
            format!("core table {} is missing", CORE_TABLE),
        ));
    }

    ensure_columns(db).await;

    if let Err(e) = migrate_legacy_image_path(db, store, upload_root).await {
        error!("legacy image migration failed, will retry on next start: {}", e);
    }
    Ok(())
}

async fn apply(db: &DatabaseConnection, migration: &'static Migration) -> Result<(), AppError> {
    db.transaction::<_, (), AppError>(|txn| {
        Box::pin(async move {
            for stmt in split_sql(migration.sql) {
                exec(txn, &stmt, vec![]).await?;
            }
            exec(
                txn,
                "INSERT INTO t_schema_version (version, name, applied) VALUES (?, ?, ?)",
                vec![
                    migration.version.into(),
                    migration.name.into(),
                    Utc::now().to_rfc3339().into(),
                ],
            )
            .await
        })
    })
    .await
    .map_err(AppError::from)
}

pub async fn current_version<C: ConnectionTrait>(db: &C) -> Result<i64, AppError> {
    let row = query_one(db, "SELECT MAX(version) AS version FROM t_schema_version", vec![]).await?;
    Ok(row
        .and_then(|r| r.try_get::<Option<i64>>("", "version").ok())
        .flatten()
        .unwrap_or(0))
}

/// Adds missing columns. Failures are logged; startup continues.
async fn ensure_columns(db: &DatabaseConnection) {
    for (column, definition) in EXPECTED_COLUMNS {
        match column_exists(db, CORE_TABLE, column).await {
            Ok(true) => {}
            Ok(false) => {
                let sql = format!("ALTER TABLE {} ADD COLUMN {} {}", CORE_TABLE, column, definition);
                match exec(db, &sql, vec![]).await {
                    Ok(()) => info!("added column {}.{}", CORE_TABLE, column),
                    Err(e) => error!("adding column {}.{} failed: {}", CORE_TABLE, column, e),
                }
            }
            Err(e) => error!("checking column {}.{} failed: {}", CORE_TABLE, column, e),
        }
    }
}

async fn migrate_legacy_image_path(
    db: &DatabaseConnection,
    store: SharedImageStore,
    upload_root: &Path,
) -> Result<(), AppError> {
    if !column_exists(db, CORE_TABLE, LEGACY_IMAGE_COLUMN).await? {
        return Ok(());
    }
    info!(
        "found legacy {}.{}, moving images into the {} store",
        CORE_TABLE,
        LEGACY_IMAGE_COLUMN,
        store.name()
    );

    let rows = query_all(
        db,
        "SELECT id, image_path FROM t_memory WHERE image_path IS NOT NULL AND image_path <> ''",
        vec![],
    )
    .await?;

    let mut imports: Vec<(String, Option<UploadedImage>)> = Vec::with_capacity(rows.len());
    for row in rows {
        let id: String = row.try_get("", "id")?;
        let stored: String = row.try_get("", "image_path")?;
        let image = load_legacy_image(upload_root, &stored).await;
        if image.is_none() {
            warn!("memory {}: legacy image {} could not be imported", id, stored);
        }
        imports.push((id, image));
    }

    let mut staged = Vec::with_capacity(imports.len());
    for (id, image) in &imports {
        if let Some(image) = image {
            match store.stage(id, image).await {
                Ok(s) => staged.push((id.clone(), s)),
                Err(e) => {
                    discard_all(&store, staged).await;
                    return Err(e);
                }
            }
        }
    }

    let tx_store = store.clone();
    let result = db.transaction::<_, (), AppError>(|txn| {
        Box::pin(async move {
            exec(
                txn,
                "UPDATE t_memory SET has_image = 1 WHERE image_path IS NOT NULL AND image_path <> ''",
                vec![],
            )
            .await?;
            for (id, image) in imports {
                match image {
                    Some(image) => tx_store.save(txn, &id, &image).await?,
                    None => {
                        exec(txn, "UPDATE t_memory SET has_image = 0 WHERE id = ?", vec![id.into()])
                            .await?
                    }
                }
            }
            exec(txn, "ALTER TABLE t_memory DROP COLUMN image_path", vec![]).await
        })
    })
    .await;

    if let Err(e) = result {
        discard_all(&store, staged).await;
        return Err(e.into());
    }
    for (id, s) in staged {
        store.commit(&id, s).await;
    }
    info!("legacy image migration finished");
    Ok(())
}

async fn discard_all(store: &SharedImageStore, staged: Vec<(String, StagedImage)>) {
    for (_, s) in staged {
        store.discard(s).await;
    }
}

fn legacy_candidates(upload_root: &Path, stored: &str) -> Vec<PathBuf> {
    let stored_path = Path::new(stored.trim());
    let mut candidates = Vec::new();
    if stored_path.is_absolute() {
        candidates.push(stored_path.to_path_buf());
    }
    if let Some(file_name) = stored_path.file_name() {
        candidates.push(upload_root.join(file_name));
    }
    candidates
}

async fn load_legacy_image(upload_root: &Path, stored: &str) -> Option<UploadedImage> {
    for path in legacy_candidates(upload_root, stored) {
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(_) => continue,
        };
        let file_name = path.file_name()?.to_string_lossy().to_string();
        let mime = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(|e| mime_guess::from_ext(e).first_raw());
        return match validate_image(&file_name, mime, bytes) {
            Ok(image) => Some(image),
            Err(e) => {
                warn!("legacy image {} rejected: {}", path.display(), e);
                None
            }
        };
    }
    None
}

pub async fn table_exists<C: ConnectionTrait>(db: &C, table: &str) -> Result<bool, AppError> {
    let row = query_one(
        db,
        "SELECT name FROM sqlite_master WHERE type='table' AND name = ? LIMIT 1",
        vec![table.into()],
    )
    .await?;
    Ok(row.is_some())
}

pub async fn column_exists<C: ConnectionTrait>(
    db: &C,
    table: &str,
    column: &str,
) -> Result<bool, AppError> {
    let row = query_one(
        db,
        "SELECT name FROM pragma_table_info(?) WHERE name = ? LIMIT 1",
        vec![table.into(), column.into()],
    )
    .await?;
    Ok(row.is_some())
}

fn split_sql(input: &str) -> Vec<String> {
    let mut buf = String::new();
    for line in input.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("--") || trimmed.is_empty() {
            continue;
        }
        buf.push_str(line);
        buf.push('\n');
    }
    buf.split(';')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

async fn exec<C: ConnectionTrait>(db: &C, sql: &str, values: Vec<sea_orm::Value>) -> Result<(), AppError> {
    let backend = db.get_database_backend();
    let stmt = Statement::from_sql_and_values(backend, sql, values);
    db.execute(stmt)
        .await
        .map_err(|e| AppError::storage(format!("exec failed (sql={})", sql), e))?;
    Ok(())
}

async fn query_one<C: ConnectionTrait>(
    db: &C,
    sql: &str,
    values: Vec<sea_orm::Value>,
) -> Result<Option<sea_orm::QueryResult>, AppError> {
    let backend = db.get_database_backend();
    let stmt = Statement::from_sql_and_values(backend, sql, values);
    Ok(db.query_one(stmt).await?)
}

async fn query_all<C: ConnectionTrait>(
    db: &C,
    sql: &str,
    values: Vec<sea_orm::Value>,
) -> Result<Vec<sea_orm::QueryResult>, AppError> {
    let backend = db.get_database_backend();
    let stmt = Statement::from_sql_and_values(backend, sql, values);
    Ok(db.query_all(stmt).await?)
}
