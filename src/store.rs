use std::collections::HashMap;

use jiff::civil::Date;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set,
};

use crate::{
    db::{next_stamp, now_ms},
    entities::{movie, theater, watchlog},
    models::{MovieSummary, WatchHistoryEntry},
};

/// A validated catalog record ready to be written.
#[derive(Clone, Debug, PartialEq)]
pub struct NewMovie {
    pub movie_id: i32,
    pub title: String,
    pub release_date: Date,
    pub poster_path: Option<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Upserted {
    Inserted,
    Updated,
}

/// Insert the movie, or overwrite title, release date and poster of the row
/// sharing its id. `created_at` survives an overwrite.
pub async fn upsert_movie<C: ConnectionTrait>(conn: &C, new: &NewMovie) -> Result<Upserted, DbErr> {
    let release_date = new.release_date.to_string();

    if let Some(existing) = movie::Entity::find_by_id(new.movie_id).one(conn).await? {
        let stamp = next_stamp(existing.updated_at);
        let mut row: movie::ActiveModel = existing.into();
        row.movie_title = Set(new.title.clone());
        row.release_date = Set(release_date);
        row.poster_path = Set(new.poster_path.clone());
        row.updated_at = Set(stamp);
        row.update(conn).await?;
        return Ok(Upserted::Updated);
    }

    let now = now_ms();
    let row = movie::ActiveModel {
        movie_id: Set(new.movie_id),
        movie_title: Set(new.title.clone()),
        release_date: Set(release_date),
        poster_path: Set(new.poster_path.clone()),
        created_at: Set(now),
        updated_at: Set(now),
    };
    movie::Entity::insert(row).exec_without_returning(conn).await?;
    Ok(Upserted::Inserted)
}

pub async fn list_movies<C: ConnectionTrait>(conn: &C) -> Result<Vec<MovieSummary>, DbErr> {
    let rows = movie::Entity::find().order_by_asc(movie::Column::MovieId).all(conn).await?;
    Ok(rows
        .into_iter()
        .map(|m| MovieSummary { movie_id: m.movie_id, movie_title: m.movie_title })
        .collect())
}

/// A user's viewing history, most recent viewing first.
pub async fn watch_history<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
) -> Result<Vec<WatchHistoryEntry>, DbErr> {
    let logs = watchlog::Entity::find()
        .filter(watchlog::Column::UserId.eq(user_id))
        .order_by_desc(watchlog::Column::ViewedDate)
        .order_by_desc(watchlog::Column::LogId)
        .find_also_related(movie::Entity)
        .all(conn)
        .await?;

    let theater_ids: Vec<String> = logs.iter().map(|(log, _)| log.theater_id.clone()).collect();
    let theater_names: HashMap<String, String> = theater::Entity::find()
        .filter(theater::Column::TheaterId.is_in(theater_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|t| (t.theater_id, t.theater_name))
        .collect();

    Ok(logs
        .into_iter()
        .map(|(log, movie)| WatchHistoryEntry {
            theater_name: theater_names.get(&log.theater_id).cloned(),
            log_id: log.log_id,
            movie_id: log.movie_id,
            movie_title: movie.map(|m| m.movie_title),
            theater_id: log.theater_id,
            viewed_date: log.viewed_date,
        })
        .collect())
}
