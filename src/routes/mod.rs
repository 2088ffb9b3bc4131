pub mod cors;
pub mod image;
pub mod memory;

use actix_web::web;

use crate::response::json_error_handler;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error_handler))
        .service(
            web::scope("/api")
                .service(web::scope("/memories").configure(memory::config))
                .service(web::scope("/images").configure(image::config)),
        );
}

#[cfg(test)]
pub(crate) async fn test_app(
    store: crate::image_store::SharedImageStore,
) -> impl actix_web::dev::Service<
    actix_http::Request,
    Response = actix_web::dev::ServiceResponse,
    Error = actix_web::Error,
> {
    let repo = crate::test_support::repository(store).await;
    actix_web::test::init_service(
        actix_web::App::new()
            .app_data(web::Data::new(repo))
            .configure(configure),
    )
    .await
}
