use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "t_memory")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub title: String,
    pub content: String,
    pub date: DateTimeUtc,
    pub mood: Option<String>,
    /// JSON-encoded list of strings.
    pub tags: Option<String>,
    pub has_image: bool,
    pub image_data: Option<String>,
    pub image_mime: Option<String>,
    pub created: Option<DateTimeUtc>,
    pub updated: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::memory_image::Entity")]
    MemoryImage,
}

impl Related<super::memory_image::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MemoryImage.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
