use actix_web::{http::header, web, HttpResponse};
use uuid::Uuid;

use crate::error::AppError;
use crate::repository::MemoryRepository;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/{id}").route(web::get().to(get_image)));
}

async fn get_image(
    repo: web::Data<MemoryRepository>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let id = Uuid::parse_str(path.trim()).map_err(|_| AppError::validation("Invalid image id"))?;
    let image = repo.fetch_image(id).await?;
    Ok(HttpResponse::Ok()
        .content_type(image.mime_type)
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .body(image.bytes))
}

#[cfg(test)]
mod tests {
    use crate::image_store::DiskImageStore;
    use crate::routes::test_app;
    use crate::test_support::{gif_bytes, multipart_body, MultipartPart};
    use actix_web::http::{header::CONTENT_TYPE, StatusCode};
    use actix_web::test::{call_service, read_body, read_body_json, TestRequest};
    use serde_json::Value;
    use std::sync::Arc;
    use uuid::Uuid;

    #[actix_web::test]
    async fn invalid_id_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(Arc::new(DiskImageStore::new(dir.path()))).await;
        let resp = call_service(&app, TestRequest::get().uri("/api/images/nope").to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let err: Value = read_body_json(resp).await;
        assert_eq!(err["message"], "Invalid image id");
    }

    #[actix_web::test]
    async fn unknown_id_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(Arc::new(DiskImageStore::new(dir.path()))).await;
        let req = TestRequest::get()
            .uri(&format!("/api/images/{}", Uuid::new_v4()))
            .to_request();
        assert_eq!(call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn disk_backed_image_is_served_with_its_type() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(Arc::new(DiskImageStore::new(dir.path()))).await;
        let (content_type, body) = multipart_body(&[
            MultipartPart::text("title", "Cat"),
            MultipartPart::text("content", "c"),
            MultipartPart::file("image", "cat.gif", "image/gif", gif_bytes()),
        ]);
        let req = TestRequest::post()
            .uri("/api/memories")
            .insert_header((CONTENT_TYPE, content_type))
            .set_payload(body)
            .to_request();
        let created: Value = read_body_json(call_service(&app, req).await).await;
        let id = created["id"].as_str().unwrap().to_string();
        assert!(dir.path().join(format!("{}.gif", id)).exists());

        let req = TestRequest::get().uri(&format!("/api/images/{}", id)).to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get(CONTENT_TYPE).unwrap(), "image/gif");
        assert_eq!(read_body(resp).await.as_ref(), gif_bytes().as_slice());

        let req = TestRequest::delete().uri(&format!("/api/memories/{}", id)).to_request();
        assert_eq!(call_service(&app, req).await.status(), StatusCode::OK);
        assert!(!dir.path().join(format!("{}.gif", id)).exists());
    }
}
