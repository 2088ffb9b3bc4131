use actix_web::{web, HttpResponse};

use crate::error::AppError;
use crate::repository::MemoryRepository;
use crate::response::MessageResponse;
use crate::upload::MemoryForm;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("")
            .route(web::get().to(list))
            .route(web::post().to(create)),
    )
    .service(
        web::resource("/{id}")
            .route(web::get().to(get))
            .route(web::put().to(update))
            .route(web::delete().to(remove)),
    );
}

async fn list(repo: web::Data<MemoryRepository>) -> Result<HttpResponse, AppError> {
    let items = repo.list().await?;
    Ok(HttpResponse::Ok().json(items))
}

async fn get(
    repo: web::Data<MemoryRepository>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let item = repo.get(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(item))
}

async fn create(
    repo: web::Data<MemoryRepository>,
    form: MemoryForm,
) -> Result<HttpResponse, AppError> {
    let created = repo.create(form.fields, form.image).await?;
    Ok(HttpResponse::Created().json(created))
}

async fn update(
    repo: web::Data<MemoryRepository>,
    path: web::Path<String>,
    form: MemoryForm,
) -> Result<HttpResponse, AppError> {
    let updated = repo
        .update(&path.into_inner(), form.fields, form.image)
        .await?;
    Ok(HttpResponse::Ok().json(updated))
}

async fn remove(
    repo: web::Data<MemoryRepository>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    repo.delete(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(MessageResponse::new("Memory deleted")))
}
