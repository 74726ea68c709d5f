use std::{net::SocketAddr, time::Duration};

use anyhow::{Context, bail};

/// Smallest accepted `SECRET_KEY`, in bytes. Cookie signing keys are derived from it.
pub const MIN_SECRET_KEY_LEN: usize = 32;

#[derive(Clone, Debug)]
pub struct Config {
    pub addr: SocketAddr,
    pub database_url: String,
    pub secret_key: String,
    pub session_ttl_days: i64,
    pub cookie_secure: bool,
    pub tmdb_api_key: String,
    pub tmdb_base_url: String,
    pub tmdb_language: String,
    pub tmdb_region: String,
    pub tmdb_rps: u32,
    pub catalog_timeout: Duration,
    pub foursquare_client_id: String,
    pub foursquare_client_secret: String,
    pub foursquare_base_url: String,
    pub foursquare_version: String,
    pub places_locale: String,
    pub places_timeout: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let host = var("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port: u16 = var("PORT").unwrap_or_else(|| "3000".to_string()).parse().context("PORT")?;

        let database_url = var("DATABASE_URL")
            .filter(|s| !s.trim().is_empty())
            .context("DATABASE_URL must be set")?;

        let secret_key = var("SECRET_KEY").context("SECRET_KEY must be set")?;
        if secret_key.len() < MIN_SECRET_KEY_LEN {
            bail!("SECRET_KEY must be at least {MIN_SECRET_KEY_LEN} bytes");
        }

        let session_ttl_days: i64 =
            var("SESSION_TTL_DAYS").and_then(|s| s.parse().ok()).unwrap_or(14);

        let cookie_secure = var("COOKIE_SECURE")
            .map(|s| matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let tmdb_api_key = var("TMDB_API_KEY").unwrap_or_default();
        let tmdb_base_url =
            var("TMDB_BASE_URL").unwrap_or_else(|| "https://api.themoviedb.org/3".to_string());
        let tmdb_language = var("TMDB_LANGUAGE").unwrap_or_else(|| "ja-JP".to_string());
        let tmdb_region = var("TMDB_REGION").unwrap_or_else(|| "JP".to_string());
        let tmdb_rps: u32 = var("TMDB_RPS").and_then(|s| s.parse().ok()).unwrap_or(4);
        let catalog_timeout_secs: u64 =
            var("CATALOG_TIMEOUT_SECS").and_then(|s| s.parse().ok()).unwrap_or(10);

        let foursquare_client_id = var("FOURSQUARE_CLIENT_ID").unwrap_or_default();
        let foursquare_client_secret = var("FOURSQUARE_CLIENT_SECRET").unwrap_or_default();
        let foursquare_base_url = var("FOURSQUARE_BASE_URL")
            .unwrap_or_else(|| "https://api.foursquare.com/v2".to_string());
        let foursquare_version =
            var("FOURSQUARE_VERSION").unwrap_or_else(|| "20240304".to_string());
        let places_locale = var("PLACES_LOCALE").unwrap_or_else(|| "ja".to_string());
        let places_timeout_secs: u64 =
            var("PLACES_TIMEOUT_SECS").and_then(|s| s.parse().ok()).unwrap_or(10);

        Ok(Self {
            addr: format!("{host}:{port}").parse().context("HOST/PORT")?,
            database_url,
            secret_key,
            session_ttl_days,
            cookie_secure,
            tmdb_api_key,
            tmdb_base_url,
            tmdb_language,
            tmdb_region,
            tmdb_rps,
            catalog_timeout: Duration::from_secs(catalog_timeout_secs.max(1)),
            foursquare_client_id,
            foursquare_client_secret,
            foursquare_base_url,
            foursquare_version,
            places_locale,
            places_timeout: Duration::from_secs(places_timeout_secs.max(1)),
        })
    }
}
