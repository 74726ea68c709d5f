use sea_orm::entity::prelude::*;

/// A catalog entry imported from the "now playing" listing. The id is the
/// catalog's own id, never generated locally.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "movies")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub movie_id: i32,
    pub movie_title: String,
    pub release_date: String,
    pub poster_path: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::watchlog::Entity")]
    Watchlogs,
}

impl Related<super::watchlog::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Watchlogs.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
