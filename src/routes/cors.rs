use actix_web::{
    body::{EitherBody, MessageBody},
    dev::{ServiceRequest, ServiceResponse},
    http::header::{self, HeaderValue},
    http::Method,
    middleware::Next,
    web, Error, HttpResponse,
};

use crate::config::AppConfig;

pub async fn cors_handler<B>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<EitherBody<B>>, Error>
where
    B: MessageBody,
{
    let origin = req
        .app_data::<web::Data<AppConfig>>()
        .and_then(|cfg| HeaderValue::from_str(&cfg.cors_allow_origin).ok())
        .unwrap_or_else(|| HeaderValue::from_static("*"));

    let mut res = if req.method() == Method::OPTIONS {
        let res = HttpResponse::NoContent().finish().map_into_right_body();
        req.into_response(res)
    } else {
        next.call(req).await?.map_into_left_body()
    };

    let headers = res.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Origin, X-Requested-With, Content-Type, Accept"),
    );
    headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("86400"));

    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ImageStorage;
    use actix_web::{middleware::from_fn, test, App};

    fn config(origin: &str) -> AppConfig {
        AppConfig {
            server_port: 0,
            sqlite_path: String::new(),
            database_url: None,
            max_connections: 1,
            upload_storage_path: String::new(),
            image_storage: ImageStorage::SideTable,
            cors_allow_origin: origin.to_string(),
            development: false,
        }
    }

    #[actix_web::test]
    async fn preflight_is_answered_without_routing() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(config("https://diary.example")))
                .wrap(from_fn(cors_handler))
                .route("/x", web::get().to(|| async { HttpResponse::Ok().finish() })),
        )
        .await;
        let req = test::TestRequest::default()
            .method(Method::OPTIONS)
            .uri("/anything")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::NO_CONTENT);
        assert_eq!(
            resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "https://diary.example"
        );
    }

    #[actix_web::test]
    async fn regular_responses_carry_cors_headers() {
        let app = test::init_service(
            App::new()
                .wrap(from_fn(cors_handler))
                .route("/x", web::get().to(|| async { HttpResponse::Ok().finish() })),
        )
        .await;
        let resp = test::call_service(&app, test::TestRequest::get().uri("/x").to_request()).await;
        assert!(resp.status().is_success());
        assert_eq!(resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
        assert!(resp.headers().contains_key(header::ACCESS_CONTROL_ALLOW_METHODS));
    }
}
