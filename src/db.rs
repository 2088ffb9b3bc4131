use log::{info, warn};
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::time::Duration;

use crate::config::AppConfig;

pub async fn connect_db(config: &AppConfig) -> Result<DatabaseConnection, DbErr> {
    let url = config.database_url();
    ensure_sqlite_path(&url);

    let mut opt = ConnectOptions::new(url);
    opt.max_connections(config.max_connections)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(10))
        .sqlx_logging(false);
    if is_memory_url(opt.get_url()) {
        // every pooled connection to :memory: would open its own database
        opt.max_connections(1);
    }
    let db = Database::connect(opt).await?;
    info!("database pool ready");
    Ok(db)
}

pub async fn close_db(db: DatabaseConnection) {
    if let Err(e) = db.close().await {
        warn!("closing database pool failed: {}", e);
    }
}

fn is_memory_url(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

fn ensure_sqlite_path(raw: &str) {
    if is_memory_url(raw) {
        return;
    }
    let path = raw
        .strip_prefix("sqlite://")
        .or_else(|| raw.strip_prefix("sqlite:"))
        .unwrap_or(raw);
    let path = path.split('?').next().unwrap_or(path);
    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let _ = OpenOptions::new().create(true).append(true).open(path);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_urls_are_detected() {
        assert!(is_memory_url("sqlite::memory:"));
        assert!(is_memory_url("sqlite://file.db?mode=memory&cache=shared"));
        assert!(!is_memory_url("sqlite://./data/memories.sqlite"));
    }

    #[test]
    fn sqlite_file_is_created_with_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("nested").join("db.sqlite");
        ensure_sqlite_path(&format!("sqlite://{}", file.display()));
        assert!(file.exists());
    }
}
