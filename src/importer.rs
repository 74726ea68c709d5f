use jiff::civil::Date;
use sea_orm::{DatabaseConnection, DatabaseTransaction, DbErr, TransactionTrait};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    models::{CatalogMovie, ImportSummary},
    store::{self, NewMovie, Upserted},
    tmdb::TmdbClient,
};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("TMDB_API_KEY is not configured")]
    MissingApiKey,
    #[error("catalog page {page} timed out")]
    Timeout { page: u32 },
    #[error("catalog page {page} request failed: {source}")]
    Http {
        page: u32,
        #[source]
        source: reqwest::Error,
    },
    #[error("catalog page {page} returned {status}")]
    Status { page: u32, status: reqwest::StatusCode },
    #[error("storage error: {0}")]
    Storage(#[from] DbErr),
}

impl ImportError {
    /// Classify a failed request. The URL is dropped because its query
    /// string carries the API key.
    pub fn request(page: u32, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ImportError::Timeout { page }
        } else {
            ImportError::Http { page, source: err.without_url() }
        }
    }
}

/// Pull every page of the "now playing" listing and upsert each movie.
///
/// All pages are fetched before anything is written, and the writes share one
/// transaction: a failed run leaves the store exactly as it was, and the
/// recovery is to run the import again.
pub async fn import_now_playing(
    db: &DatabaseConnection,
    tmdb: &TmdbClient,
    language: &str,
    region: &str,
) -> Result<ImportSummary, ImportError> {
    if !tmdb.has_api_key() {
        return Err(ImportError::MissingApiKey);
    }

    let first = tmdb.now_playing(language, region, 1).await?;
    let total_pages = first.total_pages;
    debug!(total_pages = total_pages, results = first.results.len(), "fetched first page");

    let mut movies = first.results;
    for page in 2..=total_pages {
        let next = tmdb.now_playing(language, region, page).await?;
        debug!(page = page, results = next.results.len(), "fetched page");
        movies.extend(next.results);
    }

    let mut summary = ImportSummary { pages: total_pages.max(1), ..Default::default() };

    let txn = db.begin().await?;
    match stage(&txn, movies, &mut summary).await {
        Ok(()) => txn.commit().await?,
        Err(err) => {
            if let Err(rollback_err) = txn.rollback().await {
                warn!(error = %rollback_err, "rollback failed");
            }
            return Err(err.into());
        },
    }

    info!(
        pages = summary.pages,
        inserted = summary.inserted,
        updated = summary.updated,
        skipped = summary.skipped,
        "catalog import finished"
    );
    Ok(summary)
}

async fn stage(
    txn: &DatabaseTransaction,
    movies: Vec<CatalogMovie>,
    summary: &mut ImportSummary,
) -> Result<(), DbErr> {
    for movie in movies {
        let Some(new) = accept(movie) else {
            summary.skipped += 1;
            continue;
        };
        match store::upsert_movie(txn, &new).await? {
            Upserted::Inserted => summary.inserted += 1,
            Upserted::Updated => summary.updated += 1,
        }
    }
    Ok(())
}

/// Records without a usable title or release date are skipped, never given a
/// made-up date.
fn accept(movie: CatalogMovie) -> Option<NewMovie> {
    let title = movie.title.as_deref().map(str::trim).unwrap_or_default();
    if title.is_empty() {
        warn!(movie_id = movie.id, "skipping catalog record without a title");
        return None;
    }

    let raw_date = movie.release_date.as_deref().map(str::trim).unwrap_or_default();
    let Ok(release_date) = raw_date.parse::<Date>() else {
        warn!(
            movie_id = movie.id,
            release_date = %raw_date,
            "skipping catalog record without a valid release date"
        );
        return None;
    };

    let poster_path = movie.poster_path.map(|p| p.trim().to_string()).filter(|p| !p.is_empty());

    Some(NewMovie { movie_id: movie.id, title: title.to_string(), release_date, poster_path })
}
