use std::env;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageStorage {
    Disk,
    Inline,
    SideTable,
}

impl FromStr for ImageStorage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disk" | "local" => Ok(Self::Disk),
            "inline" | "base64" => Ok(Self::Inline),
            "side_table" | "sidetable" | "table" => Ok(Self::SideTable),
            other => Err(format!("unknown IMAGE_STORAGE value: {}", other)),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub server_port: u16,
    pub sqlite_path: String,
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub upload_storage_path: String,
    pub image_storage: ImageStorage,
    pub cors_allow_origin: String,
    pub development: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let server_port = env::var("SERVER_PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(38321);

        let sqlite_path =
            env::var("SQLITE_PATH").unwrap_or_else(|_| "./data/memories.sqlite".to_string());
        let database_url = env::var("DATABASE_URL").ok().filter(|v| !v.trim().is_empty());

        let max_connections = env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(10);

        let upload_storage_path =
            env::var("UPLOAD_STORAGE_PATH").unwrap_or_else(|_| "./uploads".to_string());

        let image_storage = match env::var("IMAGE_STORAGE") {
            Ok(raw) => raw.parse().unwrap_or_else(|e: String| {
                log::warn!("{}, falling back to side_table", e);
                ImageStorage::SideTable
            }),
            Err(_) => ImageStorage::SideTable,
        };

        let cors_allow_origin =
            env::var("CORS_ALLOW_ORIGIN").unwrap_or_else(|_| "*".to_string());

        let development = env::var("APP_ENV")
            .map(|v| v.eq_ignore_ascii_case("development") || v.eq_ignore_ascii_case("dev"))
            .unwrap_or(false);

        Self {
            server_port,
            sqlite_path,
            database_url,
            max_connections,
            upload_storage_path,
            image_storage,
            cors_allow_origin,
            development,
        }
    }

    pub fn database_url(&self) -> String {
        if let Some(url) = &self.database_url {
            return url.clone();
        }

        let path = self.sqlite_path.trim();
        if path.starts_with("sqlite:") || path.starts_with("file:") {
            return path.to_string();
        }
        format!("sqlite://{}", path)
    }

    pub fn upload_storage_path(&self) -> String {
        self.upload_storage_path.clone()
    }
}
