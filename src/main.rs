mod auth;
mod config;
mod db;
mod entities;
mod error;
mod importer;
mod locator;
mod models;
mod places;
mod recorder;
mod routes;
mod store;
#[cfg(test)]
mod testing;
mod tmdb;

use std::{io::BufRead, sync::Arc, time::Duration};

use anyhow::Context;
use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use clap::{Parser, Subcommand};
use sea_orm::DatabaseConnection;

use crate::{config::Config, places::PlacesClient, tmdb::TmdbClient};

/// Application context handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: DatabaseConnection,
    pub tmdb: Arc<TmdbClient>,
    pub places: Arc<PlacesClient>,
    pub cookie_key: Key,
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}

impl AppState {
    async fn build(config: Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("cinelog/0.1")
            .timeout(Duration::from_secs(30))
            .build()?;

        let db = db::connect_and_migrate(&config.database_url)
            .await
            .context("failed to open database")?;

        let tmdb = TmdbClient::new(
            http.clone(),
            config.tmdb_api_key.clone(),
            config.tmdb_base_url.clone(),
            config.tmdb_rps,
            config.catalog_timeout,
        );
        let places = PlacesClient::new(
            http,
            config.foursquare_client_id.clone(),
            config.foursquare_client_secret.clone(),
            config.foursquare_base_url.clone(),
            config.foursquare_version.clone(),
            config.places_locale.clone(),
            config.places_timeout,
        );

        Ok(Self {
            cookie_key: Key::derive_from(config.secret_key.as_bytes()),
            config: Arc::new(config),
            db,
            tmdb: Arc::new(tmdb),
            places: Arc::new(places),
        })
    }
}

#[derive(Parser)]
#[command(name = "cinelog", version, about = "Movie watch log service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API (default).
    Serve,
    /// Import the "now playing" catalog into the database.
    Import {
        #[arg(long)]
        language: Option<String>,
        #[arg(long)]
        region: Option<String>,
    },
    /// Read a password from stdin and print its argon2 hash.
    HashPassword,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,cinelog=debug,sqlx=warn".to_string()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve().await,
        Command::Import { language, region } => import(language, region).await,
        Command::HashPassword => hash_password(),
    }
}

async fn serve() -> anyhow::Result<()> {
    let state = AppState::build(Config::from_env()?).await?;
    let addr = state.config.addr;
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}

async fn import(language: Option<String>, region: Option<String>) -> anyhow::Result<()> {
    let state = AppState::build(Config::from_env()?).await?;
    let language = language.unwrap_or_else(|| state.config.tmdb_language.clone());
    let region = region.unwrap_or_else(|| state.config.tmdb_region.clone());

    let summary = importer::import_now_playing(&state.db, &state.tmdb, &language, &region).await?;
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

fn hash_password() -> anyhow::Result<()> {
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let password = line.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        anyhow::bail!("no password given on stdin");
    }
    println!("{}", auth::hash_password(password)?);
    Ok(())
}
