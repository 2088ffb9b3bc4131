use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use sea_orm::{
    ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait, QueryFilter, QuerySelect,
};
use sea_orm::sea_query::Expr;

use super::{not_found, ImageStore, StoredImage};
use crate::entity::memory;
use crate::error::AppError;
use crate::upload::UploadedImage;

/// Base64 text in the `image_data` / `image_mime` columns of the entry row.
pub struct InlineImageStore;

#[async_trait]
impl ImageStore for InlineImageStore {
    fn name(&self) -> &'static str {
        "inline"
    }

    async fn save(
        &self,
        txn: &DatabaseTransaction,
        memory_id: &str,
        image: &UploadedImage,
    ) -> Result<(), AppError> {
        let encoded = STANDARD.encode(&image.bytes);
        memory::Entity::update_many()
            .col_expr(memory::Column::ImageData, Expr::value(encoded))
            .col_expr(memory::Column::ImageMime, Expr::value(image.mime_type.clone()))
            .filter(memory::Column::Id.eq(memory_id))
            .exec(txn)
            .await?;
        Ok(())
    }

    async fn fetch(&self, db: &DatabaseConnection, memory_id: &str) -> Result<StoredImage, AppError> {
        let row: Option<(Option<String>, Option<String>)> = memory::Entity::find_by_id(memory_id.to_string())
            .select_only()
            .column(memory::Column::ImageData)
            .column(memory::Column::ImageMime)
            .into_tuple()
            .one(db)
            .await?;

        let (data, mime_type) = match row {
            Some((Some(data), Some(mime))) => (data, mime),
            _ => return Err(not_found(memory_id)),
        };
        let bytes = STANDARD
            .decode(data.as_bytes())
            .map_err(|e| AppError::storage("stored image is not valid base64", e))?;
        Ok(StoredImage { bytes, mime_type })
    }

    async fn delete(&self, txn: &DatabaseTransaction, memory_id: &str) -> Result<(), AppError> {
        memory::Entity::update_many()
            .col_expr(memory::Column::ImageData, Expr::value(Option::<String>::None))
            .col_expr(memory::Column::ImageMime, Expr::value(Option::<String>::None))
            .filter(memory::Column::Id.eq(memory_id))
            .exec(txn)
            .await?;
        Ok(())
    }
}
