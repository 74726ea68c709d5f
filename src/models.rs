use jiff::civil::Date;
use serde::{Deserialize, Serialize};

/// A watch-log submission after validation: every field present and typed.
#[derive(Clone, Debug, PartialEq)]
pub struct WatchSubmission {
    pub theater_id: String,
    pub theater_name: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub movie_id: i32,
    pub user_id: i32,
    pub watched_date: Date,
}

/// Result of a successful recording.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct RecordOutcome {
    pub log_id: i32,
    pub created: bool,
}

/// A venue as returned by the places search, normalized.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TheaterInfo {
    pub id: String,
    pub name: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct MovieSummary {
    pub movie_id: i32,
    pub movie_title: String,
}

/// One catalog record as listed by the "now playing" endpoint.
#[derive(Clone, Debug, Deserialize)]
pub struct CatalogMovie {
    pub id: i32,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct ImportSummary {
    pub pages: u32,
    pub inserted: u32,
    pub updated: u32,
    pub skipped: u32,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct WatchHistoryEntry {
    pub log_id: i32,
    pub movie_id: i32,
    pub movie_title: Option<String>,
    pub theater_id: String,
    pub theater_name: Option<String>,
    pub viewed_date: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub prefecture: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub email: Option<String>,
    /// An empty string clears the prefecture.
    #[serde(default)]
    pub prefecture: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Profile {
    pub user_id: i32,
    pub username: String,
    pub email: String,
    pub prefecture: Option<String>,
}
