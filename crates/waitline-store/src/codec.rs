//! Lease record encoding.
//!
//! A lease is stored as a flat string hash. Decoding is strict: a record
//! that exists but cannot be turned back into a valid [`Lease`] is reported
//! as corruption and never as a missing lease.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::error;

use waitline_core::AppResult;
use waitline_core::error::AppError;
use waitline_core::types::{ConcertId, UserId};
use waitline_entity::{Lease, QueueStatus, mask_token};

/// Hash field holding the lease token.
pub const FIELD_TOKEN: &str = "token";
/// Hash field holding the lease status.
pub const FIELD_STATUS: &str = "status";
/// Hash field holding the expiry as Unix milliseconds.
pub const FIELD_EXPIRES_AT: &str = "expires_at";
/// Hash field holding the extension count.
pub const FIELD_EXTEND_COUNT: &str = "extend_count";

/// Flatten a lease into hash fields.
pub fn encode(lease: &Lease) -> Vec<(&'static str, String)> {
    vec![
        (FIELD_TOKEN, lease.token.clone()),
        (FIELD_STATUS, lease.status.as_str().to_string()),
        (FIELD_EXPIRES_AT, lease.expires_at.timestamp_millis().to_string()),
        (FIELD_EXTEND_COUNT, lease.extend_count.to_string()),
    ]
}

/// Rebuild a lease from its hash fields.
pub fn decode(
    concert_id: &ConcertId,
    user_id: &UserId,
    fields: &HashMap<String, String>,
) -> AppResult<Lease> {
    parse(concert_id, user_id, fields).map_err(|reason| {
        error!(
            concert_id = %concert_id,
            user_id = %user_id,
            reason = %reason,
            raw = ?redact(fields),
            "Corrupted lease record"
        );
        AppError::data_corruption(format!(
            "Lease for concert '{concert_id}', user '{user_id}' is unreadable: {reason}"
        ))
    })
}

/// Convert Unix milliseconds to an instant.
pub fn millis_to_datetime(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
}

fn parse(
    concert_id: &ConcertId,
    user_id: &UserId,
    fields: &HashMap<String, String>,
) -> Result<Lease, String> {
    let token = fields
        .get(FIELD_TOKEN)
        .filter(|t| !t.is_empty())
        .ok_or("missing token")?
        .clone();

    let status: QueueStatus = fields
        .get(FIELD_STATUS)
        .ok_or("missing status")?
        .parse()
        .map_err(|e: AppError| e.message)?;
    if !status.is_storable() {
        return Err(format!("status {status} cannot be stored"));
    }

    let expires_at = fields
        .get(FIELD_EXPIRES_AT)
        .ok_or("missing expires_at")?
        .parse::<i64>()
        .ok()
        .and_then(millis_to_datetime)
        .ok_or("expires_at is not a millisecond timestamp")?;

    let extend_count = fields
        .get(FIELD_EXTEND_COUNT)
        .ok_or("missing extend_count")?
        .parse::<u32>()
        .map_err(|e| format!("extend_count: {e}"))?;

    Ok(Lease {
        concert_id: concert_id.clone(),
        user_id: user_id.clone(),
        token,
        status,
        expires_at,
        extend_count,
    })
}

fn redact(fields: &HashMap<String, String>) -> HashMap<&str, String> {
    fields
        .iter()
        .map(|(k, v)| {
            let shown = if k == FIELD_TOKEN {
                mask_token(v)
            } else {
                v.clone()
            };
            (k.as_str(), shown)
        })
        .collect()
}
