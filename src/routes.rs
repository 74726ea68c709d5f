use axum::{
    Form, Json, Router,
    extract::{Query, State, rejection::JsonRejection},
    http::StatusCode,
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, SameSite, SignedCookieJar};
use serde_json::{Value, json};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::{
    AppState,
    auth::{self, Identity, SESSION_COOKIE, UserIdentity},
    error::{AppError, AppResult},
    locator::{self, NearbyQuery},
    models::{
        LoginRequest, MovieSummary, Profile, ProfileUpdate, RegisterRequest, TheaterInfo,
        WatchHistoryEntry,
    },
    recorder, store,
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/auth/register", post(register))
        .route("/api/v1/auth/login", post(login))
        .route("/api/v1/auth/logout", post(logout))
        .route("/api/v1/me", get(me).put(update_me))
        .route("/api/v1/movies", get(movies))
        .route("/api/v1/theaters", get(theaters))
        .route("/api/v1/watchlog", get(history).post(record_watch))
        .with_state(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn register(
    State(state): State<AppState>,
    Form(req): Form<RegisterRequest>,
) -> AppResult<(StatusCode, Json<UserIdentity>)> {
    let account = auth::register(&state.db, req).await?;
    Ok((StatusCode::CREATED, Json(auth::Authenticatable::identity(&account))))
}

async fn login(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Form(req): Form<LoginRequest>,
) -> AppResult<(SignedCookieJar, Json<UserIdentity>)> {
    let identity = match auth::authenticate(&state.db, &req.username, &req.password).await {
        Ok(identity) => identity,
        Err(err) => {
            warn!(username = %req.username, "login rejected");
            return Err(err.into());
        },
    };

    let token =
        auth::create_session(&state.db, identity.user_id, state.config.session_ttl_days).await?;
    let cookie = Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(state.config.cookie_secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::days(state.config.session_ttl_days.max(1)));

    info!(user_id = identity.user_id, "logged in");
    Ok((jar.add(cookie), Json(identity)))
}

async fn logout(
    State(state): State<AppState>,
    jar: SignedCookieJar,
) -> AppResult<(SignedCookieJar, StatusCode)> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        auth::revoke_session(&state.db, cookie.value()).await?;
    }
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    Ok((jar, StatusCode::NO_CONTENT))
}

async fn me(State(state): State<AppState>, identity: Identity) -> AppResult<Json<Value>> {
    let body = match identity {
        Identity::Anonymous => json!({ "user_id": null, "username": null }),
        Identity::User(user) => {
            let profile = auth::profile(&state.db, user.user_id).await?;
            json!({
                "user_id": profile.user_id,
                "username": profile.username,
                "email": profile.email,
                "prefecture": profile.prefecture,
            })
        },
    };
    Ok(Json(body))
}

async fn update_me(
    State(state): State<AppState>,
    identity: Identity,
    Json(update): Json<ProfileUpdate>,
) -> AppResult<Json<Profile>> {
    let user = identity.require()?;
    Ok(Json(auth::update_profile(&state.db, user.user_id, update).await?))
}

async fn movies(State(state): State<AppState>) -> AppResult<Json<Vec<MovieSummary>>> {
    Ok(Json(store::list_movies(&state.db).await?))
}

async fn theaters(
    State(state): State<AppState>,
    Query(query): Query<NearbyQuery>,
) -> AppResult<Json<Vec<TheaterInfo>>> {
    Ok(Json(locator::find_nearby_query(&state.places, &query).await?))
}

async fn history(
    State(state): State<AppState>,
    identity: Identity,
) -> AppResult<Json<Vec<WatchHistoryEntry>>> {
    let user = identity.require()?;
    Ok(Json(store::watch_history(&state.db, user.user_id).await?))
}

/// Anonymous callers may record for any existing user, matching the public
/// client contract. A logged-in caller may only record for itself.
async fn record_watch(
    State(state): State<AppState>,
    identity: Identity,
    payload: Result<Json<Value>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let Json(payload) = payload.map_err(|rejection| AppError::Validation(rejection.body_text()))?;

    let outcome = recorder::record_watch(&state.db, payload, identity.user_id())
        .await
        .inspect_err(|err| warn!(error = %err, "rejected watch log submission"))?;
    Ok(Json(json!({ "status": "ok", "log_id": outcome.log_id, "created": outcome.created })))
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use axum::{
        body::Body,
        http::{Request, header},
        response::Response,
    };
    use axum_extra::extract::cookie::Key;
    use sea_orm::{EntityTrait, PaginatorTrait};
    use tower::ServiceExt;

    use super::*;
    use crate::{
        config::Config,
        db,
        entities::{theater, watchlog},
        places::PlacesClient,
        testing,
        tmdb::TmdbClient,
    };

    const SECRET: &str = "test-secret-key-that-is-long-enough-for-signing";
    const PLACES_SECRET: &str = "fsq-client-secret-5f1e";

    async fn state() -> AppState {
        let config = Config::from_lookup(|key| match key {
            "DATABASE_URL" => Some("sqlite::memory:".to_string()),
            "SECRET_KEY" => Some(SECRET.to_string()),
            "FOURSQUARE_BASE_URL" => Some("http://127.0.0.1:9".to_string()),
            _ => None,
        })
        .unwrap();
        let db = db::memory().await;
        testing::seed_user(&db, 3, "carol").await;
        testing::seed_movie(&db, 7, "Seven").await;

        let http = reqwest::Client::new();
        AppState {
            tmdb: Arc::new(TmdbClient::new(
                http.clone(),
                String::new(),
                config.tmdb_base_url.clone(),
                1,
                Duration::from_secs(1),
            )),
            places: Arc::new(PlacesClient::new(
                http,
                "id".into(),
                PLACES_SECRET.into(),
                config.foursquare_base_url.clone(),
                config.foursquare_version.clone(),
                config.places_locale.clone(),
                Duration::from_secs(1),
            )),
            cookie_key: Key::derive_from(SECRET.as_bytes()),
            config: Arc::new(config),
            db,
        }
    }

    async fn send(state: &AppState, req: Request<Body>) -> Response {
        router(state.clone()).oneshot(req).await.unwrap()
    }

    async fn json_body(resp: Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn post_form(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn scenario() -> Value {
        json!({
            "theater_id": "T1",
            "theater_name": "Cineplex",
            "address": "1 Main St",
            "latitude": 35.6895,
            "longitude": 139.6917,
            "movie_id": 7,
            "user_id": 3,
            "watched_date": "2024-05-01"
        })
    }

    /// Register and log in, returning the `name=value` session cookie.
    async fn login_as(state: &AppState, username: &str) -> String {
        let form =
            format!("username={username}&email={username}%40example.org&password=password123");
        let resp = send(state, post_form("/api/v1/auth/register", &form)).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let form = format!("username={username}&password=password123");
        let resp = send(state, post_form("/api/v1/auth/login", &form)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let set_cookie = resp.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
        set_cookie.split(';').next().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let state = state().await;
        let resp = send(&state, get("/health", None)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["status"], "ok");
    }

    #[tokio::test]
    async fn watchlog_submission_succeeds() {
        let state = state().await;
        let resp = send(&state, post_json("/api/v1/watchlog", scenario())).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["created"], true);

        assert_eq!(theater::Entity::find().count(&state.db).await.unwrap(), 1);
        assert_eq!(watchlog::Entity::find().count(&state.db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn watchlog_validation_and_reference_failures_are_400() {
        let state = state().await;

        let mut payload = scenario();
        payload.as_object_mut().unwrap().remove("watched_date");
        let resp = send(&state, post_json("/api/v1/watchlog", payload)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["error"], "watched_date is required");

        let mut payload = scenario();
        payload["movie_id"] = json!(404);
        let resp = send(&state, post_json("/api/v1/watchlog", payload)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = Request::builder()
            .method("POST")
            .uri("/api/v1/watchlog")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let resp = send(&state, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(resp).await["error"].is_string());

        assert_eq!(theater::Entity::find().count(&state.db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn logged_in_user_cannot_record_for_someone_else() {
        let state = state().await;
        let cookie = login_as(&state, "dave").await;

        let mut req = post_json("/api/v1/watchlog", scenario());
        req.headers_mut().insert(header::COOKIE, cookie.parse().unwrap());
        let resp = send(&state, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(watchlog::Entity::find().count(&state.db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn theater_search_without_longitude_is_400() {
        let state = state().await;
        let resp = send(&state, get("/api/v1/theaters?latitude=35.6895", None)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["error"], "longitude is required");

        let resp = send(&state, get("/api/v1/theaters", None)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unreachable_places_service_is_502_without_credentials() {
        let state = state().await;
        let resp = send(&state, get("/api/v1/theaters?latitude=35.6&longitude=139.7", None)).await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

        let body = json_body(resp).await.to_string();
        assert!(body.contains("failed to reach places service"), "{body}");
        assert!(!body.contains("client_secret"), "{body}");
        assert!(!body.contains(PLACES_SECRET), "{body}");
    }

    #[tokio::test]
    async fn movies_lists_id_and_title() {
        let state = state().await;
        let resp = send(&state, get("/api/v1/movies", None)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await, json!([{ "movie_id": 7, "movie_title": "Seven" }]));
    }

    #[tokio::test]
    async fn login_me_history_logout_flow() {
        let state = state().await;

        let resp = send(&state, get("/api/v1/me", None)).await;
        assert_eq!(json_body(resp).await["user_id"], Value::Null);

        let resp = send(&state, get("/api/v1/watchlog", None)).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let cookie = login_as(&state, "erin").await;
        let resp = send(&state, get("/api/v1/me", Some(&cookie))).await;
        let me = json_body(resp).await;
        assert_eq!(me["username"], "erin");
        let user_id = me["user_id"].as_i64().unwrap();

        let mut payload = scenario();
        payload["user_id"] = json!(user_id);
        let mut req = post_json("/api/v1/watchlog", payload);
        req.headers_mut().insert(header::COOKIE, cookie.parse().unwrap());
        assert_eq!(send(&state, req).await.status(), StatusCode::OK);

        let resp = send(&state, get("/api/v1/watchlog", Some(&cookie))).await;
        let history = json_body(resp).await;
        assert_eq!(history.as_array().unwrap().len(), 1);
        assert_eq!(history[0]["movie_title"], "Seven");

        let mut req = post_form("/api/v1/auth/logout", "");
        req.headers_mut().insert(header::COOKIE, cookie.parse().unwrap());
        assert_eq!(send(&state, req).await.status(), StatusCode::NO_CONTENT);

        let resp = send(&state, get("/api/v1/me", Some(&cookie))).await;
        assert_eq!(json_body(resp).await["user_id"], Value::Null);
    }

    #[tokio::test]
    async fn bad_login_is_401_with_generic_message() {
        let state = state().await;
        login_as(&state, "frank").await;

        let resp =
            send(&state, post_form("/api/v1/auth/login", "username=frank&password=nope")).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(resp).await["error"], "invalid username or password");

        let resp =
            send(&state, post_form("/api/v1/auth/login", "username=ghost&password=nope")).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(resp).await["error"], "invalid username or password");
    }

    #[tokio::test]
    async fn tampered_cookie_is_anonymous() {
        let state = state().await;
        let cookie = login_as(&state, "grace").await;
        let tampered = format!("{cookie}x");

        let resp = send(&state, get("/api/v1/me", Some(&tampered))).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["user_id"], Value::Null);
    }

    #[tokio::test]
    async fn duplicate_registration_is_409() {
        let state = state().await;
        login_as(&state, "heidi").await;
        let resp = send(
            &state,
            post_form(
                "/api/v1/auth/register",
                "username=heidi&email=other%40example.org&password=password123",
            ),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }
}
