use std::{num::NonZeroU32, sync::Arc, time::Duration};

use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use serde::Deserialize;
use tracing::debug;

use crate::{importer::ImportError, models::CatalogMovie};

pub struct TmdbClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl TmdbClient {
    pub fn new(
        client: reqwest::Client,
        api_key: String,
        base_url: String,
        rps: u32,
        timeout: Duration,
    ) -> Self {
        if api_key.trim().is_empty() {
            tracing::warn!("no TMDB_API_KEY provided, catalog import is disabled");
        }

        let rps = NonZeroU32::new(rps).unwrap_or(NonZeroU32::MIN);
        let limiter = Arc::new(RateLimiter::direct(Quota::per_second(rps)));
        Self { client, api_key, base_url, timeout, limiter }
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Fetch one page (1-indexed) of the "now playing" listing. Each call has
    /// its own deadline.
    pub async fn now_playing(
        &self,
        language: &str,
        region: &str,
        page: u32,
    ) -> Result<NowPlayingPage, ImportError> {
        self.limiter.until_ready().await;

        let url = format!("{}/movie/now_playing", self.base_url.trim_end_matches('/'));
        debug!(page = page, language = %language, region = %region, "requesting now playing");

        let resp = self
            .client
            .get(url)
            .query(&[
                ("api_key", self.api_key.as_str()),
                ("language", language),
                ("region", region),
            ])
            .query(&[("page", page)])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| ImportError::request(page, err))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ImportError::Status { page, status });
        }

        resp.json().await.map_err(|err| ImportError::request(page, err))
    }
}

#[derive(Debug, Deserialize)]
pub struct NowPlayingPage {
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub results: Vec<CatalogMovie>,
}
