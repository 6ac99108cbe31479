//! Best-effort analytics sinks.
//!
//! Recording never fails into the caller: errors are logged and dropped.

use chrono::{DateTime, SecondsFormat, Utc};
use flamydash_types::PageContext;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::Client;

/// Entries kept by [LocalRecorder].
pub const LOCAL_CAPACITY: usize = 100;

pub trait EventRecorder: Send + Sync {
    fn record(&self, event_type: &str, game_id: &str, data: Map<String, Value>);
}

/// `data` plus `timestamp`, `url` and `user_agent`, which win over caller keys.
pub fn enrich_event_data(
    mut data: Map<String, Value>,
    page: &PageContext,
    now: DateTime<Utc>,
) -> Map<String, Value> {
    data.insert(
        "timestamp".to_string(),
        Value::from(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
    data.insert("url".to_string(), Value::from(page.href()));
    data.insert("user_agent".to_string(), Value::from(page.user_agent.as_str()));
    data
}

/// Posts events to the API from a background task.
pub struct HttpRecorder {
    client: Client,
}

impl HttpRecorder {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl EventRecorder for HttpRecorder {
    fn record(&self, event_type: &str, game_id: &str, data: Map<String, Value>) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(event_type, game_id, "no runtime; dropping analytics event");
            return;
        };
        let client = self.client.clone();
        let event_type = event_type.to_string();
        let game_id = game_id.to_string();
        runtime.spawn(async move {
            match client.record_game_event(&event_type, &game_id, data).await {
                Ok(ack) => debug!(event_type, event_id = ?ack.event_id, "analytics event recorded"),
                Err(err) => warn!(?err, event_type, game_id, "failed to record analytics event"),
            }
        });
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_type: String,
    pub game_id: String,
    pub data: Map<String, Value>,
}

/// Keeps the most recent [LOCAL_CAPACITY] events in memory.
pub struct LocalRecorder {
    page: PageContext,
    events: Mutex<VecDeque<StoredEvent>>,
}

impl Default for LocalRecorder {
    fn default() -> Self {
        Self::new(PageContext::default())
    }
}

impl LocalRecorder {
    pub fn new(page: PageContext) -> Self {
        Self {
            page,
            events: Mutex::new(VecDeque::with_capacity(LOCAL_CAPACITY)),
        }
    }

    /// A panic while holding the lock leaves the ring intact, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, VecDeque<StoredEvent>> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Oldest first.
    pub fn events(&self) -> Vec<StoredEvent> {
        self.lock().iter().cloned().collect()
    }

    pub fn event_types(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .map(|event| event.event_type)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Stored events as a JSON array.
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.events()).unwrap_or_else(|_| "[]".to_string())
    }
}

impl EventRecorder for LocalRecorder {
    fn record(&self, event_type: &str, game_id: &str, data: Map<String, Value>) {
        let mut data = enrich_event_data(data, &self.page, Utc::now());
        data.insert("static_mode".to_string(), Value::Bool(true));
        let event = StoredEvent {
            event_type: event_type.to_string(),
            game_id: game_id.to_string(),
            data,
        };
        let mut events = self.lock();
        while events.len() >= LOCAL_CAPACITY {
            events.pop_front();
        }
        events.push_back(event);
        debug!(event_type, game_id, "event recorded locally");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn enrichment_overrides_reserved_keys() {
        let mut data = Map::new();
        data.insert("score".to_string(), Value::from(10));
        data.insert("url".to_string(), Value::from("spoofed"));
        let now = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let page = PageContext {
            hostname: "flamydash.com".to_string(),
            pathname: "/play".to_string(),
            ..Default::default()
        };

        let data = enrich_event_data(data, &page, now);
        assert_eq!(data["score"], Value::from(10));
        assert_eq!(data["url"], Value::from("https://flamydash.com/play"));
        assert_eq!(data["timestamp"], Value::from("2025-01-02T03:04:05.000Z"));
        assert_eq!(data["user_agent"], Value::from("Mozilla/5.0"));
    }

    #[test]
    fn local_recorder_keeps_latest_hundred() {
        let recorder = LocalRecorder::default();
        for i in 0..150 {
            recorder.record(&format!("event_{i}"), "flamy-dash", Map::new());
        }
        let events = recorder.events();
        assert_eq!(events.len(), LOCAL_CAPACITY);
        assert_eq!(events[0].event_type, "event_50");
        assert_eq!(events[99].event_type, "event_149");
        assert_eq!(events[0].data["static_mode"], Value::Bool(true));

        recorder.clear();
        assert!(recorder.is_empty());
        assert_eq!(recorder.to_json(), "[]");
    }

    #[test]
    fn local_recorder_survives_poisoned_lock() {
        let recorder = std::sync::Arc::new(LocalRecorder::default());
        recorder.record("load_started", "flamy-dash", Map::new());
        let poisoner = recorder.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.events.lock().unwrap();
            panic!("poison the ring");
        })
        .join();
        assert!(recorder.events.is_poisoned());

        recorder.record("load_completed", "flamy-dash", Map::new());
        assert_eq!(recorder.event_types(), vec!["load_started", "load_completed"]);
        recorder.clear();
        assert!(recorder.is_empty());
    }

    #[test]
    fn http_recorder_without_runtime_does_not_panic() {
        let recorder = HttpRecorder::new(Client::new("http://127.0.0.1:9").unwrap());
        recorder.record("load_started", "flamy-dash", Map::new());
    }

    #[tokio::test]
    async fn http_recorder_swallows_failures() {
        let client = Client::new("http://127.0.0.1:9").unwrap().with_retry_policy(
            crate::RetryPolicy {
                max_attempts: 1,
                ..Default::default()
            },
        );
        HttpRecorder::new(client).record("load_started", "flamy-dash", Map::new());
        tokio::task::yield_now().await;
    }
}
