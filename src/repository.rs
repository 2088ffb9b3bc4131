use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use log::debug;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, FromQueryResult, QueryFilter, QueryOrder, QuerySelect, Select, Set,
    TransactionError, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::memory;
use crate::error::AppError;
use crate::image_store::{SharedImageStore, StagedImage, StoredImage};
use crate::upload::{MemoryFields, TagsInput, UploadedImage};

pub const DEFAULT_MOOD: &str = "neutral";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryDto {
    pub id: String,
    pub title: String,
    pub content: String,
    pub date: String,
    pub mood: Option<String>,
    pub tags: Vec<String>,
    pub has_image: bool,
    pub image_url: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// Entry columns without the inline image payload.
#[derive(Clone, Debug, FromQueryResult)]
struct MemoryRow {
    id: String,
    title: String,
    content: String,
    date: DateTime<Utc>,
    mood: Option<String>,
    tags: Option<String>,
    has_image: bool,
    created: Option<DateTime<Utc>>,
    updated: Option<DateTime<Utc>>,
}

impl From<memory::Model> for MemoryRow {
    fn from(model: memory::Model) -> Self {
        Self {
            id: model.id,
            title: model.title,
            content: model.content,
            date: model.date,
            mood: model.mood,
            tags: model.tags,
            has_image: model.has_image,
            created: model.created,
            updated: model.updated,
        }
    }
}

impl From<MemoryRow> for MemoryDto {
    fn from(row: MemoryRow) -> Self {
        let image_url = if row.has_image {
            Some(format!("/api/images/{}", row.id))
        } else {
            None
        };
        Self {
            tags: decode_tags(row.tags.as_deref()),
            date: to_rfc3339(row.date),
            created_at: row.created.map(to_rfc3339),
            updated_at: row.updated.map(to_rfc3339),
            id: row.id,
            title: row.title,
            content: row.content,
            mood: row.mood,
            has_image: row.has_image,
            image_url,
        }
    }
}

impl From<memory::Model> for MemoryDto {
    fn from(model: memory::Model) -> Self {
        MemoryRow::from(model).into()
    }
}

fn select_rows() -> Select<memory::Entity> {
    memory::Entity::find().select_only().columns([
        memory::Column::Id,
        memory::Column::Title,
        memory::Column::Content,
        memory::Column::Date,
        memory::Column::Mood,
        memory::Column::Tags,
        memory::Column::HasImage,
        memory::Column::Created,
        memory::Column::Updated,
    ])
}

async fn find_row<C: ConnectionTrait>(db: &C, id: &str) -> Result<Option<MemoryRow>, AppError> {
    Ok(select_rows()
        .filter(memory::Column::Id.eq(id))
        .into_model::<MemoryRow>()
        .one(db)
        .await?)
}

/// Entry rows plus their image assets. Every write that touches both runs in
/// one transaction.
///
/// Update and delete issue their write before any read so SQLite takes the
/// write lock up front.
pub struct MemoryRepository {
    db: DatabaseConnection,
    store: SharedImageStore,
}

impl MemoryRepository {
    pub fn new(db: DatabaseConnection, store: SharedImageStore) -> Self {
        Self { db, store }
    }

    pub async fn list(&self) -> Result<Vec<MemoryDto>, AppError> {
        let rows = select_rows()
            .order_by_desc(memory::Column::Date)
            .into_model::<MemoryRow>()
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(MemoryDto::from).collect())
    }

    pub async fn get(&self, raw_id: &str) -> Result<MemoryDto, AppError> {
        let id = normalize_id(Some(raw_id));
        find_row(&self.db, &id)
            .await?
            .map(MemoryDto::from)
            .ok_or_else(memory_not_found)
    }

    pub async fn create(
        &self,
        fields: MemoryFields,
        image: Option<UploadedImage>,
    ) -> Result<MemoryDto, AppError> {
        let id = normalize_id(fields.id.as_deref());
        let title = fields.title.unwrap_or_default();
        if title.trim().is_empty() {
            return Err(AppError::validation("title is required"));
        }
        let content = fields
            .content
            .ok_or_else(|| AppError::validation("content is required"))?;
        let date = parse_date(fields.date.as_deref())?;
        let tags = encode_tags(&parse_tags(fields.tags));
        let now = Utc::now();

        let model = memory::ActiveModel {
            id: Set(id.clone()),
            title: Set(title),
            content: Set(content),
            date: Set(date),
            mood: Set(Some(normalize_mood(fields.mood))),
            tags: Set(Some(tags)),
            has_image: Set(image.is_some()),
            image_data: Set(None),
            image_mime: Set(None),
            created: Set(Some(now)),
            updated: Set(Some(now)),
        };

        let staged = self.stage(&id, image.as_ref()).await?;
        let store = self.store.clone();
        let tx_id = id.clone();
        let result = self
            .db
            .transaction::<_, memory::Model, AppError>(|txn| {
                Box::pin(async move {
                    let inserted = model.insert(txn).await?;
                    if let Some(image) = image {
                        store.save(txn, &tx_id, &image).await?;
                        debug!("memory {} image saved ({})", tx_id, store.name());
                    }
                    Ok(inserted)
                })
            })
            .await;
        let inserted = self.finish(&id, staged, result).await?;

        debug!("memory created id={}", inserted.id);
        Ok(inserted.into())
    }

    /// Full replace: omitted fields reset to their defaults instead of
    /// keeping the stored value.
    pub async fn update(
        &self,
        raw_id: &str,
        fields: MemoryFields,
        image: Option<UploadedImage>,
    ) -> Result<MemoryDto, AppError> {
        let id = normalize_id(Some(raw_id));
        if find_row(&self.db, &id).await?.is_none() {
            return Err(memory_not_found());
        }
        let date = parse_date(fields.date.as_deref())?;
        let image_removed = image.is_none() && fields.delete_image;
        let has_image = match (&image, fields.delete_image) {
            (Some(_), _) => Set(true),
            (None, true) => Set(false),
            (None, false) => NotSet,
        };
        let changes = memory::ActiveModel {
            id: NotSet,
            title: Set(fields.title.unwrap_or_default()),
            content: Set(fields.content.unwrap_or_default()),
            date: Set(date),
            mood: Set(Some(normalize_mood(fields.mood))),
            tags: Set(Some(encode_tags(&parse_tags(fields.tags)))),
            has_image,
            image_data: NotSet,
            image_mime: NotSet,
            created: NotSet,
            updated: Set(Some(Utc::now())),
        };

        let staged = self.stage(&id, image.as_ref()).await?;
        let store = self.store.clone();
        let tx_id = id.clone();
        let result = self
            .db
            .transaction::<_, MemoryRow, AppError>(|txn| {
                Box::pin(async move {
                    // a concurrent delete may have won since the check above
                    let written = memory::Entity::update_many()
                        .set(changes)
                        .filter(memory::Column::Id.eq(tx_id.as_str()))
                        .exec(txn)
                        .await?;
                    if written.rows_affected == 0 {
                        return Err(memory_not_found());
                    }

                    match (&image, image_removed) {
                        (Some(image), _) => store.save(txn, &tx_id, image).await?,
                        (None, true) => store.delete(txn, &tx_id).await?,
                        (None, false) => {}
                    }
                    find_row(txn, &tx_id).await?.ok_or_else(memory_not_found)
                })
            })
            .await;
        let updated = self.finish(&id, staged, result).await?;

        if image_removed {
            self.store.cleanup(&id).await;
        }
        debug!("memory updated id={}", id);
        Ok(updated.into())
    }

    pub async fn delete(&self, raw_id: &str) -> Result<(), AppError> {
        let id = normalize_id(Some(raw_id));
        let store = self.store.clone();
        let tx_id = id.clone();
        self.db
            .transaction::<_, (), AppError>(|txn| {
                Box::pin(async move {
                    let deleted = memory::Entity::delete_by_id(tx_id.clone()).exec(txn).await?;
                    if deleted.rows_affected == 0 {
                        return Err(memory_not_found());
                    }
                    store.delete(txn, &tx_id).await
                })
            })
            .await?;

        self.store.cleanup(&id).await;
        debug!("memory deleted id={}", id);
        Ok(())
    }

    /// Image bytes for an entry whose row says it has one.
    pub async fn fetch_image(&self, id: Uuid) -> Result<StoredImage, AppError> {
        let id = id.to_string();
        let row = find_row(&self.db, &id).await?.ok_or_else(memory_not_found)?;
        if !row.has_image {
            return Err(AppError::not_found("Image not found"));
        }
        self.store.fetch(&self.db, &id).await
    }

    async fn stage(&self, id: &str, image: Option<&UploadedImage>) -> Result<StagedImage, AppError> {
        match image {
            Some(image) => self.store.stage(id, image).await,
            None => Ok(StagedImage::default()),
        }
    }

    /// Publishes or drops staged image state depending on how the
    /// transaction ended.
    async fn finish<T>(
        &self,
        id: &str,
        staged: StagedImage,
        result: Result<T, TransactionError<AppError>>,
    ) -> Result<T, AppError> {
        match result {
            Ok(value) => {
                self.store.commit(id, staged).await;
                Ok(value)
            }
            Err(e) => {
                self.store.discard(staged).await;
                Err(e.into())
            }
        }
    }
}

fn memory_not_found() -> AppError {
    AppError::not_found("Memory not found")
}

/// Returns the canonical form of a valid UUID, or a fresh v4 UUID when the
/// input is missing or malformed.
pub fn normalize_id(raw: Option<&str>) -> String {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => match Uuid::parse_str(s) {
            Ok(id) => id.to_string(),
            Err(_) => {
                let id = Uuid::new_v4();
                debug!("invalid id {:?} replaced with {}", s, id);
                id.to_string()
            }
        },
        None => Uuid::new_v4().to_string(),
    }
}

fn normalize_mood(mood: Option<String>) -> String {
    mood.map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| DEFAULT_MOOD.to_string())
}

/// JSON array first, comma separated list otherwise. Items are trimmed and
/// empty items dropped.
pub fn parse_tags(input: Option<TagsInput>) -> Vec<String> {
    let raw: Vec<String> = match input {
        None => Vec::new(),
        Some(TagsInput::List(items)) => items,
        Some(TagsInput::Text(text)) => {
            match serde_json::from_str::<Vec<serde_json::Value>>(&text) {
                Ok(values) => values
                    .into_iter()
                    .map(|v| match v {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    })
                    .collect(),
                Err(_) => text.split(',').map(str::to_string).collect(),
            }
        }
    };
    raw.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

fn encode_tags(tags: &[String]) -> String {
    serde_json::to_string(tags).unwrap_or_else(|_| "[]".to_string())
}

fn decode_tags(stored: Option<&str>) -> Vec<String> {
    match stored {
        None => Vec::new(),
        Some(s) => parse_tags(Some(TagsInput::Text(s.to_string()))),
    }
}

/// Accepts RFC 3339, `YYYY-MM-DDTHH:MM:SS` (read as UTC), `YYYY-MM-DD`, or
/// epoch milliseconds. Missing or blank means now.
pub fn parse_date(input: Option<&str>) -> Result<DateTime<Utc>, AppError> {
    let input = match input.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => s,
        None => return Ok(Utc::now()),
    };
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(dt.and_utc());
    }
    if let Some(dt) = NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(dt.and_utc());
    }
    if let Ok(ms) = input.parse::<i64>() {
        if let Some(dt) = DateTime::<Utc>::from_timestamp_millis(ms) {
            return Ok(dt);
        }
    }
    Err(AppError::validation(format!("invalid date: {}", input)))
}

fn to_rfc3339(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}
