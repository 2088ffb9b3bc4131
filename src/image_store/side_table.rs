use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, DatabaseTransaction, EntityTrait, Set};

use super::{not_found, ImageStore, StoredImage};
use crate::entity::memory_image;
use crate::error::AppError;
use crate::upload::UploadedImage;

/// Bytes in `t_memory_image`, one row per entry, removed by FK cascade
/// together with the entry.
pub struct SideTableImageStore;

#[async_trait]
impl ImageStore for SideTableImageStore {
    fn name(&self) -> &'static str {
        "side_table"
    }

    async fn save(
        &self,
        txn: &DatabaseTransaction,
        memory_id: &str,
        image: &UploadedImage,
    ) -> Result<(), AppError> {
        memory_image::Entity::delete_by_id(memory_id.to_string())
            .exec(txn)
            .await?;
        let row = memory_image::ActiveModel {
            memory_id: Set(memory_id.to_string()),
            data: Set(image.bytes.clone()),
            mime_type: Set(image.mime_type.clone()),
            created: Set(Some(Utc::now())),
        };
        row.insert(txn).await?;
        Ok(())
    }

    async fn fetch(&self, db: &DatabaseConnection, memory_id: &str) -> Result<StoredImage, AppError> {
        let row = memory_image::Entity::find_by_id(memory_id.to_string())
            .one(db)
            .await?
            .ok_or_else(|| not_found(memory_id))?;
        Ok(StoredImage {
            bytes: row.data,
            mime_type: row.mime_type,
        })
    }

    async fn delete(&self, txn: &DatabaseTransaction, memory_id: &str) -> Result<(), AppError> {
        memory_image::Entity::delete_by_id(memory_id.to_string())
            .exec(txn)
            .await?;
        Ok(())
    }
}
