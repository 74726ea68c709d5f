use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Movies::Table)
                    .if_not_exists()
                    .col(integer(Movies::MovieId).primary_key())
                    .col(string_len(Movies::MovieTitle, 255))
                    .col(string_len(Movies::ReleaseDate, 10))
                    .col(string_len_null(Movies::PosterPath, 255))
                    .col(big_integer(Movies::CreatedAt))
                    .col(big_integer(Movies::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Theaters::Table)
                    .if_not_exists()
                    .col(string_len(Theaters::TheaterId, 30).primary_key())
                    .col(string_len(Theaters::TheaterName, 255))
                    .col(string_len(Theaters::Address, 255))
                    .col(double(Theaters::Latitude))
                    .col(double(Theaters::Longitude))
                    .col(big_integer(Theaters::CreatedAt))
                    .col(big_integer(Theaters::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(pk_auto(Users::Id))
                    .col(string_len(Users::Username, 16).unique_key())
                    .col(string_len(Users::Email, 120).unique_key())
                    .col(string_len(Users::PasswordHash, 256))
                    .col(string_len_null(Users::Prefecture, 50))
                    .col(big_integer(Users::CreatedAt))
                    .col(big_integer(Users::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ViewingLogs::Table)
                    .if_not_exists()
                    .col(pk_auto(ViewingLogs::LogId))
                    .col(integer(ViewingLogs::UserId))
                    .col(integer(ViewingLogs::MovieId))
                    .col(string_len(ViewingLogs::TheaterId, 30))
                    .col(string_len(ViewingLogs::ViewedDate, 10))
                    .col(big_integer(ViewingLogs::CreatedAt))
                    .col(big_integer(ViewingLogs::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_viewing_logs_user")
                            .from(ViewingLogs::Table, ViewingLogs::UserId)
                            .to(Users::Table, Users::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_viewing_logs_movie")
                            .from(ViewingLogs::Table, ViewingLogs::MovieId)
                            .to(Movies::Table, Movies::MovieId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_viewing_logs_theater")
                            .from(ViewingLogs::Table, ViewingLogs::TheaterId)
                            .to(Theaters::Table, Theaters::TheaterId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_viewing_logs_natural_key")
                    .table(ViewingLogs::Table)
                    .col(ViewingLogs::UserId)
                    .col(ViewingLogs::MovieId)
                    .col(ViewingLogs::TheaterId)
                    .col(ViewingLogs::ViewedDate)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(ViewingLogs::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Users::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Theaters::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Movies::Table).to_owned()).await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Movies {
    Table,
    MovieId,
    MovieTitle,
    ReleaseDate,
    PosterPath,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Theaters {
    Table,
    TheaterId,
    TheaterName,
    Address,
    Latitude,
    Longitude,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    Username,
    Email,
    PasswordHash,
    Prefecture,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ViewingLogs {
    Table,
    LogId,
    UserId,
    MovieId,
    TheaterId,
    ViewedDate,
    CreatedAt,
    UpdatedAt,
}
