//! Analytics event intake.
//!
//! Events are validated, enriched with request metadata and written to the log.
//! Nothing is persisted.

use axum::http::{header, HeaderMap};
use chrono::{SecondsFormat, Utc};
use flamydash_types::api::{AnalyticsAck, AnalyticsEvent};
use rand::Rng;
use serde::Serialize;
use serde_json::{Map, Value};
use std::net::SocketAddr;
use thiserror::Error;
use tracing::info;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const EVENT_ID_SUFFIX_LEN: usize = 9;
const UNKNOWN: &str = "unknown";

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("Missing required fields")]
    MissingFields,
    #[error("Failed to record event: {0}")]
    Recording(#[from] serde_json::Error),
}

/// Request metadata attached to every recorded event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestMeta {
    pub ip: String,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
    pub country: String,
}

impl RequestMeta {
    /// Client address from proxy headers, falling back to the peer address.
    pub fn from_headers(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        let ip = header_str(headers, "cf-connecting-ip")
            .or_else(|| {
                header_str(headers, "x-forwarded-for")
                    .and_then(|forwarded| forwarded.split(',').next())
                    .map(str::trim)
                    .filter(|ip| !ip.is_empty())
            })
            .or_else(|| header_str(headers, "x-real-ip"))
            .map(str::to_string)
            .or_else(|| peer.map(|peer| peer.ip().to_string()))
            .unwrap_or_else(|| UNKNOWN.to_string());

        Self {
            ip,
            user_agent: header_str(headers, header::USER_AGENT.as_str()).map(str::to_string),
            referrer: header_str(headers, header::REFERER.as_str()).map(str::to_string),
            country: header_str(headers, "cf-ipcountry")
                .unwrap_or(UNKNOWN)
                .to_string(),
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// The record written for each accepted event.
#[derive(Clone, Debug, Serialize)]
pub struct EventRecord {
    pub timestamp: String,
    pub event_type: String,
    pub game_id: String,
    pub data: Map<String, Value>,
    pub ip: String,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
    pub country: String,
}

/// `evt_<unix millis>_<9 base36 chars>`.
pub fn generate_event_id<R: Rng>(rng: &mut R, millis: i64) -> String {
    let suffix: String = (0..EVENT_ID_SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("evt_{millis}_{suffix}")
}

fn required(field: Option<String>) -> Result<String, IntakeError> {
    field
        .filter(|value| !value.is_empty())
        .ok_or(IntakeError::MissingFields)
}

/// Validate and enrich `event`, log it, and acknowledge it.
pub fn record_event(event: AnalyticsEvent, meta: RequestMeta) -> Result<AnalyticsAck, IntakeError> {
    let now = Utc::now();
    let record = EventRecord {
        timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        event_type: required(event.event_type)?,
        game_id: required(event.game_id)?,
        data: event.data.unwrap_or_default(),
        ip: meta.ip,
        user_agent: meta.user_agent,
        referrer: meta.referrer,
        country: meta.country,
    };
    let event_id = generate_event_id(&mut rand::thread_rng(), now.timestamp_millis());
    let serialized = serde_json::to_string(&record)?;

    info!(
        event_id = %event_id,
        event_type = %record.event_type,
        game_id = %record.game_id,
        ip = %record.ip,
        country = %record.country,
        record = %serialized,
        "analytics.event"
    );

    Ok(AnalyticsAck {
        success: true,
        message: "Event recorded successfully".to_string(),
        event_id: Some(event_id),
    })
}
