use sea_orm::entity::prelude::*;

/// One viewing event. `(user_id, movie_id, theater_id, viewed_date)` is unique.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "viewing_logs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub log_id: i32,
    pub user_id: i32,
    pub movie_id: i32,
    pub theater_id: String,
    pub viewed_date: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
    #[sea_orm(
        belongs_to = "super::movie::Entity",
        from = "Column::MovieId",
        to = "super::movie::Column::MovieId"
    )]
    Movie,
    #[sea_orm(
        belongs_to = "super::theater::Entity",
        from = "Column::TheaterId",
        to = "super::theater::Column::TheaterId"
    )]
    Theater,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::movie::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Movie.def()
    }
}

impl Related<super::theater::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Theater.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
