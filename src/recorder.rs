use jiff::civil::Date;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    NotSet, QueryFilter, Set, SqlErr, TransactionTrait,
};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    db::{next_stamp, now_ms},
    entities::{movie, theater, user, watchlog},
    models::{RecordOutcome, WatchSubmission},
};

const MAX_THEATER_ID_LEN: usize = 30;
const MAX_TEXT_LEN: usize = 255;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    ForeignKey(String),
    #[error("cannot record a viewing for another user")]
    NotOwner,
    #[error("storage error: {0}")]
    Storage(#[source] DbErr),
}

impl From<DbErr> for RecordError {
    fn from(err: DbErr) -> Self {
        match err.sql_err() {
            Some(SqlErr::ForeignKeyConstraintViolation(msg)) => RecordError::ForeignKey(msg),
            _ => RecordError::Storage(err),
        }
    }
}

fn invalid(msg: impl Into<String>) -> RecordError {
    RecordError::Validation(msg.into())
}

/// Validate a raw JSON submission and record it.
///
/// `session_user` is the caller's logged-in user, if any. A session may only
/// record viewings for itself. Without a session the payload's `user_id` is
/// trusted as long as it names an existing user, which keeps the anonymous
/// client contract working.
pub async fn record_watch(
    db: &DatabaseConnection,
    payload: Value,
    session_user: Option<i32>,
) -> Result<RecordOutcome, RecordError> {
    let submission = parse_submission(payload)?;
    if session_user.is_some_and(|id| id != submission.user_id) {
        warn!(
            session_user = ?session_user,
            payload_user = submission.user_id,
            "watch log for another user"
        );
        return Err(RecordError::NotOwner);
    }
    record_submission(db, &submission).await
}

/// Accepts a single object, or a one-element array holding that object.
pub fn parse_submission(payload: Value) -> Result<WatchSubmission, RecordError> {
    let fields = match payload {
        Value::Object(map) => map,
        Value::Array(items) => match <[Value; 1]>::try_from(items) {
            Ok([Value::Object(map)]) => map,
            Ok(_) => return Err(invalid("payload array must contain an object")),
            Err(items) => {
                return Err(invalid(format!(
                    "payload array must contain exactly one object, got {}",
                    items.len()
                )));
            },
        },
        _ => return Err(invalid("payload must be a JSON object")),
    };

    let watched_date = match fields.get("watched_date") {
        None | Some(Value::Null) => return Err(invalid("watched_date is required")),
        Some(Value::String(raw)) => raw
            .trim()
            .parse::<Date>()
            .map_err(|_| invalid(format!("watched_date {raw:?} is not an ISO-8601 date")))?,
        Some(_) => return Err(invalid("watched_date must be an ISO-8601 date string")),
    };

    let theater_id = text(&fields, "theater_id", false, MAX_THEATER_ID_LEN)?;
    let theater_name = text(&fields, "theater_name", false, MAX_TEXT_LEN)?;
    let address = text(&fields, "address", true, MAX_TEXT_LEN)?;
    let latitude = coordinate(&fields, "latitude", 90.0)?;
    let longitude = coordinate(&fields, "longitude", 180.0)?;
    let movie_id = id(&fields, "movie_id")?;
    let user_id = id(&fields, "user_id")?;

    Ok(WatchSubmission {
        theater_id,
        theater_name,
        address,
        latitude,
        longitude,
        movie_id,
        user_id,
        watched_date,
    })
}

fn text(
    fields: &Map<String, Value>,
    name: &str,
    allow_empty: bool,
    max_len: usize,
) -> Result<String, RecordError> {
    let value = match fields.get(name) {
        None | Some(Value::Null) => return Err(invalid(format!("{name} is required"))),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(_) => return Err(invalid(format!("{name} must be a string"))),
    };
    if !allow_empty && value.is_empty() {
        return Err(invalid(format!("{name} must not be empty")));
    }
    if value.chars().count() > max_len {
        return Err(invalid(format!("{name} must be at most {max_len} characters")));
    }
    Ok(value)
}

fn coordinate(fields: &Map<String, Value>, name: &str, bound: f64) -> Result<f64, RecordError> {
    let value = match fields.get(name) {
        None | Some(Value::Null) => return Err(invalid(format!("{name} is required"))),
        Some(Value::Number(n)) => n.as_f64(),
        Some(_) => None,
    }
    .ok_or_else(|| invalid(format!("{name} must be a number")))?;

    if !value.is_finite() || value.abs() > bound {
        return Err(invalid(format!("{name} must be between -{bound} and {bound}")));
    }
    Ok(quantize(value))
}

fn id(fields: &Map<String, Value>, name: &str) -> Result<i32, RecordError> {
    let raw = match fields.get(name) {
        None | Some(Value::Null) => return Err(invalid(format!("{name} is required"))),
        Some(Value::Number(n)) => n.as_i64(),
        Some(_) => None,
    }
    .ok_or_else(|| invalid(format!("{name} must be an integer")))?;

    i32::try_from(raw)
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| invalid(format!("{name} must be a positive 32-bit integer")))
}

/// Round to six fractional digits, the stored coordinate precision.
pub fn quantize(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

/// Upsert the theater and the watch log in one transaction. Nothing is
/// durable unless both writes succeed.
pub async fn record_submission(
    db: &DatabaseConnection,
    submission: &WatchSubmission,
) -> Result<RecordOutcome, RecordError> {
    let txn = db.begin().await?;

    match stage(&txn, submission).await {
        Ok(outcome) => {
            txn.commit().await?;
            info!(
                log_id = outcome.log_id,
                created = outcome.created,
                user_id = submission.user_id,
                movie_id = submission.movie_id,
                theater_id = %submission.theater_id,
                "recorded watch"
            );
            Ok(outcome)
        },
        Err(err) => {
            if let Err(rollback_err) = txn.rollback().await {
                warn!(error = %rollback_err, "rollback failed");
            }
            Err(err)
        },
    }
}

async fn stage(
    txn: &DatabaseTransaction,
    submission: &WatchSubmission,
) -> Result<RecordOutcome, RecordError> {
    ensure_references(txn, submission).await?;
    upsert_theater(txn, submission).await?;
    upsert_watchlog(txn, submission).await
}

async fn ensure_references(
    txn: &DatabaseTransaction,
    submission: &WatchSubmission,
) -> Result<(), RecordError> {
    if user::Entity::find_by_id(submission.user_id).one(txn).await?.is_none() {
        return Err(RecordError::ForeignKey(format!(
            "user_id {} does not reference an existing user",
            submission.user_id
        )));
    }
    if movie::Entity::find_by_id(submission.movie_id).one(txn).await?.is_none() {
        return Err(RecordError::ForeignKey(format!(
            "movie_id {} does not reference an existing movie",
            submission.movie_id
        )));
    }
    Ok(())
}

async fn upsert_theater(
    txn: &DatabaseTransaction,
    submission: &WatchSubmission,
) -> Result<(), RecordError> {
    let existing = theater::Entity::find_by_id(submission.theater_id.clone()).one(txn).await?;

    match existing {
        Some(row) => {
            debug!(theater_id = %row.theater_id, "overwriting theater");
            let stamp = next_stamp(row.updated_at);
            let mut row: theater::ActiveModel = row.into();
            row.theater_name = Set(submission.theater_name.clone());
            row.address = Set(submission.address.clone());
            row.latitude = Set(submission.latitude);
            row.longitude = Set(submission.longitude);
            row.updated_at = Set(stamp);
            row.update(txn).await?;
        },
        None => {
            debug!(theater_id = %submission.theater_id, "inserting theater");
            let now = now_ms();
            let row = theater::ActiveModel {
                theater_id: Set(submission.theater_id.clone()),
                theater_name: Set(submission.theater_name.clone()),
                address: Set(submission.address.clone()),
                latitude: Set(submission.latitude),
                longitude: Set(submission.longitude),
                created_at: Set(now),
                updated_at: Set(now),
            };
            theater::Entity::insert(row).exec_without_returning(txn).await?;
        },
    }
    Ok(())
}

async fn upsert_watchlog(
    txn: &DatabaseTransaction,
    submission: &WatchSubmission,
) -> Result<RecordOutcome, RecordError> {
    let viewed_date = submission.watched_date.to_string();

    let existing = watchlog::Entity::find()
        .filter(watchlog::Column::UserId.eq(submission.user_id))
        .filter(watchlog::Column::MovieId.eq(submission.movie_id))
        .filter(watchlog::Column::TheaterId.eq(submission.theater_id.as_str()))
        .filter(watchlog::Column::ViewedDate.eq(viewed_date.as_str()))
        .one(txn)
        .await?;

    if let Some(row) = existing {
        let log_id = row.log_id;
        let stamp = next_stamp(row.updated_at);
        let mut row: watchlog::ActiveModel = row.into();
        row.updated_at = Set(stamp);
        row.update(txn).await?;
        return Ok(RecordOutcome { log_id, created: false });
    }

    let now = now_ms();
    let row = watchlog::ActiveModel {
        log_id: NotSet,
        user_id: Set(submission.user_id),
        movie_id: Set(submission.movie_id),
        theater_id: Set(submission.theater_id.clone()),
        viewed_date: Set(viewed_date),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(txn)
    .await?;

    Ok(RecordOutcome { log_id: row.log_id, created: true })
}
