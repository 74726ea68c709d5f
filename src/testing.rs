//! Fixtures shared by the unit tests.

use axum::Router;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};

use crate::{
    db::now_ms,
    entities::{movie, user},
};

pub async fn seed_user(db: &DatabaseConnection, id: i32, username: &str) -> user::Model {
    let now = now_ms();
    user::ActiveModel {
        id: Set(id),
        username: Set(username.to_string()),
        email: Set(format!("{username}@example.com")),
        password_hash: Set("not-a-real-hash".to_string()),
        prefecture: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .expect("seed user")
}

pub async fn seed_movie(db: &DatabaseConnection, id: i32, title: &str) {
    let now = now_ms();
    let row = movie::ActiveModel {
        movie_id: Set(id),
        movie_title: Set(title.to_string()),
        release_date: Set("2024-04-26".to_string()),
        poster_path: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    };
    movie::Entity::insert(row).exec_without_returning(db).await.expect("seed movie");
}

/// Serve `app` on an ephemeral local port and return its base URL.
pub async fn spawn_upstream(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind upstream");
    let addr = listener.local_addr().expect("upstream addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    format!("http://{addr}")
}
