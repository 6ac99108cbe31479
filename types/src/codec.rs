//! Request parameter tokens.
//!
//! A token is the JSON form of a parameter map, base64 encoded so it can travel
//! as a single URL query value. Decoding also accepts `key=value&...` payloads,
//! which is what older AzGame embeds send.

use base64::{
    alphabet,
    engine::{general_purpose, DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine as _,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::DEFAULT_GAME_ID;

/// Fields every token must carry (domain, game id, hostname, timestamp).
pub const REQUIRED_FIELDS: [&str; 4] = ["d", "gid", "hn", "ts"];

/// Default freshness window for request timestamps.
pub const DEFAULT_MAX_AGE_SECS: u64 = 3600;

/// Version reported in the `v` field of generated parameters.
pub const PARAMS_VERSION: &str = "1.0";

const DECODER: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Error)]
#[error("failed to encode parameters: {0}")]
pub struct EncodeError(#[from] serde_json::Error);

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("no parameters provided")]
    Empty,
    #[error("token is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("token payload is not utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("token payload is neither a JSON object nor key=value pairs")]
    Unparseable,
}

/// Flat parameter bag carried by a token.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestParams(Map<String, Value>);

impl RequestParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the parameters a page sends when asking for a game's config.
    pub fn for_page(page: &PageContext, game_id: &str, ts: i64) -> Self {
        Self::new()
            .with("d", page.domain.as_str())
            .with("gid", game_id)
            .with("hn", page.hostname.as_str())
            .with("pn", page.pathname.as_str())
            .with("ts", ts)
            .with("ie", "yes")
            .with("ref", page.referrer.as_str())
            .with("ua", page.user_agent.as_str())
            .with("lang", page.language.as_str())
            .with("v", PARAMS_VERSION)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn domain(&self) -> Option<&str> {
        self.get_str("d")
    }

    pub fn game_id(&self) -> Option<&str> {
        self.get_str("gid")
    }

    pub fn hostname(&self) -> Option<&str> {
        self.get_str("hn")
    }

    /// Unix seconds from `ts`, accepting numbers and numeric strings.
    ///
    /// Fractional values round up so freshness checks agree with comparing
    /// against the raw value.
    pub fn timestamp(&self) -> Option<i64> {
        match self.0.get("ts")? {
            Value::Number(number) => number
                .as_i64()
                .or_else(|| number.as_f64().and_then(seconds_from_f64)),
            Value::String(raw) => {
                let raw = raw.trim();
                raw.parse::<i64>()
                    .ok()
                    .or_else(|| raw.parse::<f64>().ok().and_then(seconds_from_f64))
            }
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for RequestParams {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn seconds_from_f64(value: f64) -> Option<i64> {
    if !value.is_finite() || value.abs() > i64::MAX as f64 {
        return None;
    }
    Some(value.ceil() as i64)
}

/// Where a config request originates from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageContext {
    pub domain: String,
    pub hostname: String,
    pub pathname: String,
    pub referrer: String,
    pub user_agent: String,
    pub language: String,
}

impl Default for PageContext {
    fn default() -> Self {
        Self {
            domain: "flamydash.com".to_string(),
            hostname: "localhost".to_string(),
            pathname: "/".to_string(),
            referrer: String::new(),
            user_agent: "Mozilla/5.0".to_string(),
            language: "en-US".to_string(),
        }
    }
}

impl PageContext {
    /// Parameters for the default game, stamped with the current time.
    pub fn params(&self) -> RequestParams {
        RequestParams::for_page(self, DEFAULT_GAME_ID, now_secs())
    }

    /// URL of the page itself.
    pub fn href(&self) -> String {
        format!("https://{}{}", self.hostname, self.pathname)
    }
}

/// Serialize `params` to JSON and base64 encode it.
pub fn encode<T: Serialize + ?Sized>(params: &T) -> Result<String, EncodeError> {
    let json = serde_json::to_string(params)?;
    Ok(general_purpose::STANDARD.encode(json))
}

/// Reverse [encode].
///
/// Spaces are read back as `+`, since form decoding of an unescaped query turns
/// one into the other. Padding is optional.
pub fn decode(token: &str) -> Result<RequestParams, DecodeError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(DecodeError::Empty);
    }
    let bytes = DECODER.decode(token.replace(' ', "+"))?;
    let text = String::from_utf8(bytes)?;

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&text) {
        return Ok(RequestParams(map));
    }
    parse_pairs(&text)
        .map(RequestParams)
        .ok_or(DecodeError::Unparseable)
}

fn parse_pairs(text: &str) -> Option<Map<String, Value>> {
    if !text.contains('=') {
        return None;
    }
    let map = url::form_urlencoded::parse(text.as_bytes())
        .map(|(key, value)| (key.into_owned(), Value::String(value.into_owned())))
        .collect::<Map<_, _>>();
    (!map.is_empty()).then_some(map)
}

/// True iff every field in [REQUIRED_FIELDS] is present and not null.
pub fn validate_required(params: &RequestParams) -> bool {
    REQUIRED_FIELDS
        .iter()
        .all(|field| params.get(field).is_some_and(|value| !value.is_null()))
}

/// True iff `ts` is at most `max_age_secs` old and not in the future.
pub fn validate_timestamp(ts: i64, max_age_secs: u64) -> bool {
    validate_timestamp_at(ts, max_age_secs, now_secs())
}

pub fn validate_timestamp_at(ts: i64, max_age_secs: u64, now: i64) -> bool {
    match now.checked_sub(ts) {
        Some(age) => age >= 0 && age.unsigned_abs() <= max_age_secs,
        None => false,
    }
}

/// Current unix time in seconds.
pub fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn complete_params(ts: i64) -> RequestParams {
        RequestParams::new()
            .with("d", "x.com")
            .with("gid", "flamy-dash")
            .with("hn", "x.com")
            .with("ts", ts)
    }

    #[test]
    fn decodes_what_it_encodes() {
        let params = RequestParams::for_page(&PageContext::default(), "flamy-dash", 1_700_000_000);
        let token = encode(&params).unwrap();
        assert!(token.is_ascii());
        assert_eq!(decode(&token).unwrap(), params);
    }

    #[test]
    fn falls_back_to_key_value_pairs() {
        let token = general_purpose::STANDARD.encode("d=x.com&gid=flamy-dash&hn=x.com&ts=42");
        let params = decode(&token).unwrap();
        assert_eq!(params.domain(), Some("x.com"));
        assert_eq!(params.game_id(), Some("flamy-dash"));
        assert_eq!(params.get_str("ts"), Some("42"));
        assert_eq!(params.timestamp(), Some(42));
    }

    #[test]
    fn json_scalar_payload_uses_pair_fallback() {
        let token = general_purpose::STANDARD.encode("12345");
        assert!(matches!(decode(&token), Err(DecodeError::Unparseable)));
    }

    #[test]
    fn rejects_empty_and_malformed_tokens() {
        assert!(matches!(decode(""), Err(DecodeError::Empty)));
        assert!(matches!(decode("   "), Err(DecodeError::Empty)));
        assert!(matches!(decode("!!not base64!!"), Err(DecodeError::Base64(_))));

        let invalid_utf8 = general_purpose::STANDARD.encode([0xff, 0xfe, 0xfd]);
        assert!(matches!(decode(&invalid_utf8), Err(DecodeError::Utf8(_))));

        let garbage = general_purpose::STANDARD.encode("just some words");
        assert!(matches!(decode(&garbage), Err(DecodeError::Unparseable)));
    }

    #[test]
    fn tolerates_form_decoded_plus_and_missing_padding() {
        let params = RequestParams::new().with("d", "?>?~~~");
        let token = encode(&params).unwrap();
        assert_eq!(token, "eyJkIjoiPz4/fn5+In0=");

        let mangled = token.replace('+', " ").trim_end_matches('=').to_string();
        assert_eq!(decode(&mangled).unwrap(), params);
    }

    #[test]
    fn required_fields() {
        let params = complete_params(1);
        assert!(validate_required(&params));

        for field in REQUIRED_FIELDS {
            let mut missing = params.clone();
            missing.remove(field);
            assert!(!validate_required(&missing), "{field} missing");

            let mut null = params.clone();
            null.insert(field, Value::Null);
            assert!(!validate_required(&null), "{field} null");
        }

        assert!(!validate_required(&RequestParams::new()));
    }

    #[test]
    fn required_fields_ignore_types() {
        let params = RequestParams::new()
            .with("d", 0)
            .with("gid", false)
            .with("hn", "")
            .with("ts", "not a number");
        assert!(validate_required(&params));
    }

    #[test]
    fn timestamp_window() {
        let now = 1_700_000_000;
        assert!(validate_timestamp_at(now, 3600, now));
        assert!(validate_timestamp_at(now - 3600, 3600, now));
        assert!(!validate_timestamp_at(now - 3601, 3600, now));
        assert!(!validate_timestamp_at(now + 1, 3600, now));
        assert!(!validate_timestamp_at(i64::MIN, 3600, now));
        assert!(!validate_timestamp_at(i64::MAX, 3600, now));

        let current = now_secs();
        assert!(validate_timestamp(current, DEFAULT_MAX_AGE_SECS));
        assert!(!validate_timestamp(
            current - DEFAULT_MAX_AGE_SECS as i64 - 1,
            DEFAULT_MAX_AGE_SECS
        ));
        assert!(!validate_timestamp(current + 1, DEFAULT_MAX_AGE_SECS));
    }

    #[test]
    fn timestamp_accepts_numeric_strings_and_floats() {
        assert_eq!(RequestParams::new().with("ts", "17").timestamp(), Some(17));
        assert_eq!(RequestParams::new().with("ts", " 17 ").timestamp(), Some(17));
        assert_eq!(RequestParams::new().with("ts", 16.2).timestamp(), Some(17));
        assert_eq!(RequestParams::new().with("ts", "16.5").timestamp(), Some(17));
        assert_eq!(RequestParams::new().with("ts", "soon").timestamp(), None);
        assert_eq!(RequestParams::new().with("ts", true).timestamp(), None);
        assert_eq!(RequestParams::new().timestamp(), None);
    }

    #[test]
    fn page_params_carry_defaults() {
        let params = PageContext::default().params();
        assert!(validate_required(&params));
        assert_eq!(params.game_id(), Some(DEFAULT_GAME_ID));
        assert_eq!(params.get_str("ie"), Some("yes"));
        assert_eq!(params.get_str("v"), Some(PARAMS_VERSION));
        assert_eq!(params.len(), 10);
    }

    #[derive(Clone, Debug)]
    enum Scalar {
        Text(String),
        Int(i64),
        Float(f64),
        Bool(bool),
        Null,
    }

    fn scalar() -> impl Strategy<Value = Scalar> {
        prop_oneof![
            any::<String>().prop_map(Scalar::Text),
            any::<i64>().prop_map(Scalar::Int),
            (proptest::num::f64::NORMAL
                | proptest::num::f64::SUBNORMAL
                | proptest::num::f64::ZERO)
                .prop_map(Scalar::Float),
            any::<bool>().prop_map(Scalar::Bool),
            Just(Scalar::Null),
        ]
    }

    proptest! {
        #[test]
        fn round_trip(
            entries in proptest::collection::btree_map(any::<String>(), scalar(), 0..12)
        ) {
            let params = entries
                .into_iter()
                .fold(RequestParams::new(), |params, (key, value)| match value {
                    Scalar::Text(text) => params.with(key, text),
                    Scalar::Int(int) => params.with(key, int),
                    Scalar::Float(float) => params.with(key, float),
                    Scalar::Bool(flag) => params.with(key, flag),
                    Scalar::Null => params.with(key, Value::Null),
                });
            let token = encode(&params).unwrap();
            prop_assert_eq!(decode(&token).unwrap(), params);
        }
    }

    #[test]
    fn extreme_floats_survive_encoding() {
        for float in [2.4031382394049478e-210, f64::MIN_POSITIVE, f64::MAX, -1.7e308, 5e-324] {
            let params = RequestParams::new().with("x", float);
            let decoded = decode(&encode(&params).unwrap()).unwrap();
            assert_eq!(decoded.get("x").and_then(Value::as_f64), Some(float));
        }
    }

    #[test]
    fn encode_rejects_non_string_keys() {
        let mut bad = BTreeMap::new();
        bad.insert(vec![1u8], 1u8);
        assert!(encode(&bad).is_err());
    }
}
