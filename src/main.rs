mod config;
mod db;
mod entity;
mod error;
mod image_store;
mod migration;
mod repository;
mod response;
mod routes;
mod upload;

#[cfg(test)]
mod test_support;

use actix_web::{middleware, web, App, HttpServer};
use config::AppConfig;
use db::{close_db, connect_db};
use image_store::build_image_store;
use log::info;
use repository::MemoryRepository;
use std::io;
use std::path::PathBuf;

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();
    let config = AppConfig::from_env();
    response::set_development(config.development);

    let db = connect_db(&config)
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("db connect failed: {}", e)))?;
    let store = build_image_store(&config);
    info!("image storage: {}", store.name());

    let upload_root = PathBuf::from(config.upload_storage_path());
    if let Err(e) = migration::run_migrations(&db, store.clone(), &upload_root).await {
        close_db(db).await;
        return Err(io::Error::new(
            io::ErrorKind::Other,
            format!("schema migration failed: {}", e),
        ));
    }

    let repo = web::Data::new(MemoryRepository::new(db.clone(), store));
    let server_port = config.server_port;

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(config.clone()))
            .app_data(repo.clone())
            .wrap(middleware::Logger::default())
            .wrap(middleware::from_fn(routes::cors::cors_handler))
            .configure(routes::configure)
    })
    .bind(("0.0.0.0", server_port))?;
    info!("server started at http://0.0.0.0:{}", server_port);

    let result = server.run().await;
    close_db(db).await;
    info!("server stopped");
    result
}
