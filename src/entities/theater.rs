use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "theaters")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub theater_id: String,
    pub theater_name: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
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
