//! Request body extraction for memory write routes.
//!
//! Write routes accept either `multipart/form-data` (text fields plus at most
//! one image under [`IMAGE_FIELD`]) or `application/json` (text fields only).
//! Image validation happens here, before any database work.

use actix_multipart::{Field, Multipart};
use actix_web::{dev::Payload, http::header::CONTENT_TYPE, web, FromRequest, HttpRequest};
use futures_util::future::LocalBoxFuture;
use futures_util::StreamExt;
use serde::{Deserialize, Deserializer};
use std::path::Path;

use crate::error::AppError;

pub const IMAGE_FIELD: &str = "image";
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
const MAX_TEXT_FIELD_BYTES: usize = 1024 * 1024;

const ALLOWED_EXTENSIONS: [&str; 5] = ["jpeg", "jpg", "png", "gif", "webp"];
pub const ALLOWED_MIME_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/gif", "image/webp"];

#[derive(Clone, Debug, PartialEq)]
pub struct UploadedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub file_name: String,
}

impl UploadedImage {
    /// Extension used when the image is written to disk.
    pub fn extension(&self) -> &'static str {
        extension_for_mime(&self.mime_type)
    }
}

pub fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type {
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "jpg",
    }
}

/// Tags as sent by clients: a JSON array, or a string that is either
/// JSON-encoded or comma separated.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TagsInput {
    List(Vec<String>),
    Text(String),
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryFields {
    pub id: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub date: Option<String>,
    pub mood: Option<String>,
    pub tags: Option<TagsInput>,
    #[serde(default, alias = "delete_image", deserialize_with = "deserialize_flag")]
    pub delete_image: bool,
}

impl MemoryFields {
    pub(crate) fn set_text(&mut self, name: &str, value: String) {
        match name {
            "id" => self.id = Some(value),
            "title" => self.title = Some(value),
            "content" => self.content = Some(value),
            "date" => self.date = Some(value),
            "mood" => self.mood = Some(value),
            "tags" => self.tags = Some(TagsInput::Text(value)),
            "deleteImage" | "delete_image" => self.delete_image = parse_flag(&value),
            _ => {}
        }
    }
}

pub fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Bool(b)) => b,
        Some(serde_json::Value::Number(n)) => n.as_i64().unwrap_or(0) != 0,
        Some(serde_json::Value::String(s)) => parse_flag(&s),
        _ => false,
    })
}

/// Parsed body of a create or update request.
#[derive(Debug, Default)]
pub struct MemoryForm {
    pub fields: MemoryFields,
    pub image: Option<UploadedImage>,
}

impl FromRequest for MemoryForm {
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_ascii_lowercase())
            .unwrap_or_default();

        if content_type.starts_with("multipart/form-data") {
            let multipart = Multipart::new(req.headers(), payload.take());
            return Box::pin(async move { read_multipart(multipart).await.map_err(Into::into) });
        }
        if content_type.starts_with("application/json") {
            let json = web::Json::<MemoryFields>::from_request(req, payload);
            return Box::pin(async move {
                let fields = json.await?.into_inner();
                Ok(MemoryForm { fields, image: None })
            });
        }
        if content_type.is_empty() {
            return Box::pin(async { Ok(MemoryForm::default()) });
        }
        Box::pin(async move {
            Err(AppError::validation(format!("unsupported content type: {}", content_type)).into())
        })
    }
}

async fn read_multipart(mut multipart: Multipart) -> Result<MemoryForm, AppError> {
    let mut form = MemoryForm::default();

    while let Some(item) = multipart.next().await {
        let mut field =
            item.map_err(|e| AppError::validation(format!("malformed multipart body: {}", e)))?;
        let name = field.name().to_string();

        if name == IMAGE_FIELD {
            let file_name = field
                .content_disposition()
                .get_filename()
                .map(str::to_string)
                .unwrap_or_default();
            let declared = field.content_type().map(|m| m.essence_str().to_string());
            let bytes = read_field(&mut field, MAX_IMAGE_BYTES).await?;
            // browsers submit an empty part when no file was picked
            if bytes.is_empty() && file_name.is_empty() {
                continue;
            }
            if form.image.is_some() {
                return Err(AppError::validation("only one image may be uploaded"));
            }
            form.image = Some(validate_image(&file_name, declared.as_deref(), bytes)?);
        } else {
            let bytes = read_field(&mut field, MAX_TEXT_FIELD_BYTES).await?;
            let value = String::from_utf8(bytes)
                .map_err(|_| AppError::validation(format!("field {} is not valid UTF-8", name)))?;
            form.fields.set_text(&name, value);
        }
    }

    Ok(form)
}

async fn read_field(field: &mut Field, limit: usize) -> Result<Vec<u8>, AppError> {
    let mut buf = Vec::new();
    while let Some(chunk) = field.next().await {
        let data =
            chunk.map_err(|e| AppError::validation(format!("malformed multipart body: {}", e)))?;
        if buf.len() + data.len() > limit {
            return Err(AppError::validation(format!(
                "field {} exceeds the {} byte limit",
                field.name(),
                limit
            )));
        }
        buf.extend_from_slice(&data);
    }
    Ok(buf)
}

/// Checks size, extension, declared MIME type and sniffed content against
/// the image allow-list.
pub fn validate_image(
    file_name: &str,
    declared_mime: Option<&str>,
    bytes: Vec<u8>,
) -> Result<UploadedImage, AppError> {
    if bytes.is_empty() {
        return Err(AppError::validation("image is empty"));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(AppError::validation(format!(
            "image exceeds the {} byte limit",
            MAX_IMAGE_BYTES
        )));
    }

    let ext = Path::new(file_name)
        .extension()
        .and_then(|s| s.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(AppError::validation(
            "only jpeg, jpg, png, gif and webp images are allowed",
        ));
    }

    let declared = normalize_mime(declared_mime.unwrap_or_default());
    if !ALLOWED_MIME_TYPES.contains(&declared.as_str()) {
        return Err(AppError::validation(
            "only jpeg, jpg, png, gif and webp images are allowed",
        ));
    }

    let implied = mime_guess::from_ext(&ext).first_raw();
    if implied != Some(declared.as_str()) {
        return Err(AppError::validation(
            "file extension does not match the declared content type",
        ));
    }

    if let Some(kind) = infer::get(&bytes) {
        if kind.mime_type() != declared {
            return Err(AppError::validation(
                "file content does not match the declared content type",
            ));
        }
    }

    Ok(UploadedImage {
        bytes,
        mime_type: declared,
        file_name: file_name.to_string(),
    })
}

fn normalize_mime(raw: &str) -> String {
    let mime = raw.trim().to_ascii_lowercase();
    match mime.as_str() {
        "image/jpg" | "image/pjpeg" => "image/jpeg".to_string(),
        _ => mime,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{multipart_body, png_bytes, MultipartPart};
    use actix_web::test::TestRequest;

    #[test]
    fn accepts_matching_extension_and_mime() {
        let image = validate_image("beach.png", Some("image/png"), png_bytes()).unwrap();
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.extension(), "png");
    }

    #[test]
    fn jpg_extension_matches_jpeg_mime() {
        let image = validate_image("Photo.JPG", Some("image/jpeg"), vec![1, 2, 3]).unwrap();
        assert_eq!(image.mime_type, "image/jpeg");
        assert_eq!(image.extension(), "jpg");
    }

    #[test]
    fn rejects_disallowed_extension() {
        let err = validate_image("notes.txt", Some("image/png"), png_bytes()).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn rejects_disallowed_mime() {
        let err = validate_image("x.png", Some("application/pdf"), png_bytes()).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        let err = validate_image("x.png", None, png_bytes()).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn rejects_extension_mime_mismatch() {
        let err = validate_image("x.gif", Some("image/png"), png_bytes()).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn rejects_sniffed_content_mismatch() {
        let err = validate_image("x.jpg", Some("image/jpeg"), png_bytes()).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn rejects_oversized_image() {
        let bytes = vec![0u8; MAX_IMAGE_BYTES + 1];
        let err = validate_image("big.png", Some("image/png"), bytes).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn accepts_image_at_size_limit() {
        let mut bytes = png_bytes();
        bytes.resize(MAX_IMAGE_BYTES, 0);
        assert!(validate_image("big.png", Some("image/png"), bytes).is_ok());
    }

    #[test]
    fn flags_parse_common_spellings() {
        assert!(parse_flag("true"));
        assert!(parse_flag(" 1 "));
        assert!(parse_flag("ON"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag(""));
    }

    #[test]
    fn json_fields_accept_array_or_string_tags() {
        let fields: MemoryFields =
            serde_json::from_str(r#"{"title":"t","tags":["a","b"],"deleteImage":"true"}"#).unwrap();
        assert_eq!(fields.tags, Some(TagsInput::List(vec!["a".into(), "b".into()])));
        assert!(fields.delete_image);

        let fields: MemoryFields =
            serde_json::from_str(r#"{"tags":"a,b","deleteImage":false}"#).unwrap();
        assert_eq!(fields.tags, Some(TagsInput::Text("a,b".into())));
        assert!(!fields.delete_image);
    }

    #[actix_web::test]
    async fn multipart_form_yields_fields_and_image() {
        let (content_type, body) = multipart_body(&[
            MultipartPart::text("title", "Trip"),
            MultipartPart::text("tags", "fun,sun"),
            MultipartPart::text("deleteImage", "1"),
            MultipartPart::file("image", "beach.png", "image/png", png_bytes()),
        ]);
        let (req, mut payload) = TestRequest::post()
            .insert_header((CONTENT_TYPE, content_type))
            .set_payload(body)
            .to_http_parts();

        let form = MemoryForm::from_request(&req, &mut payload).await.unwrap();
        assert_eq!(form.fields.title.as_deref(), Some("Trip"));
        assert_eq!(form.fields.tags, Some(TagsInput::Text("fun,sun".into())));
        assert!(form.fields.delete_image);
        let image = form.image.unwrap();
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.bytes, png_bytes());
    }

    #[actix_web::test]
    async fn multipart_rejects_second_image() {
        let (content_type, body) = multipart_body(&[
            MultipartPart::file("image", "a.png", "image/png", png_bytes()),
            MultipartPart::file("image", "b.png", "image/png", png_bytes()),
        ]);
        let (req, mut payload) = TestRequest::post()
            .insert_header((CONTENT_TYPE, content_type))
            .set_payload(body)
            .to_http_parts();

        assert!(MemoryForm::from_request(&req, &mut payload).await.is_err());
    }

    #[actix_web::test]
    async fn multipart_skips_empty_file_part() {
        let (content_type, body) = multipart_body(&[
            MultipartPart::text("title", "No picture"),
            MultipartPart::file("image", "", "application/octet-stream", Vec::new()),
        ]);
        let (req, mut payload) = TestRequest::post()
            .insert_header((CONTENT_TYPE, content_type))
            .set_payload(body)
            .to_http_parts();

        let form = MemoryForm::from_request(&req, &mut payload).await.unwrap();
        assert!(form.image.is_none());
        assert_eq!(form.fields.title.as_deref(), Some("No picture"));
    }

    #[actix_web::test]
    async fn unsupported_content_type_is_rejected() {
        let (req, mut payload) = TestRequest::post()
            .insert_header((CONTENT_TYPE, "text/plain"))
            .set_payload("hello")
            .to_http_parts();
        assert!(MemoryForm::from_request(&req, &mut payload).await.is_err());
    }
}
