//! Cabinet wait-time estimation and play-partner ranking for arcade queues.
//!
//! The engine works on read-only snapshots handed in by the host: branch
//! capacity, active and waiting sessions, user profiles and completed session
//! history. Every call is pure and returns a fresh result.

pub mod error;
pub mod features;
pub mod logging;
mod matchmaker;
mod predictor;
mod simulation;
mod types;

#[cfg(test)]
mod properties;

pub use error::{Error, Result};
pub use features::{FeatureExtractor, ProfileSource};
pub use matchmaker::{rank_candidates, CompatibilityRanker, MatchReport, RANKING_METHOD};
pub use predictor::{train_predictor, DurationPredictor, HeuristicModel, PredictionMethod, RegressionModel};
pub use simulation::{estimate_wait, Assignment, ResourceClocks, SimulationOutcome, WaitEstimate, WaitRequest, WaitSimulator};
pub use types::*;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use wasm_bindgen::prelude::*;

/// Initialize panic hook for better error messages
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Payload for a wait estimate from the host
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EstimatePayload {
    #[serde(flatten)]
    request: WaitRequest,
    #[serde(default)]
    profiles: HashMap<String, ParticipantProfile>,
    #[serde(default)]
    history: Vec<HistoricalSession>,
    /// Defaults to the host clock
    #[serde(default)]
    now: Option<DateTime<Utc>>,
}

/// Payload for predictor training from the host
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrainPayload {
    #[serde(default)]
    profiles: HashMap<String, ParticipantProfile>,
    history: Vec<HistoricalSession>,
}

/// Payload for partner suggestions from the host
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RankPayload {
    requester_id: String,
    candidates: Vec<Candidate>,
    k: usize,
}

#[cfg(target_arch = "wasm32")]
fn host_now() -> DateTime<Utc> {
    let millis = js_sys::Date::now() as i64;
    DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
}

#[cfg(not(target_arch = "wasm32"))]
fn host_now() -> DateTime<Utc> {
    Utc::now()
}

/// JSON wrapper around [`estimate_wait`]; trains the predictor from the
/// payload's history first.
pub fn estimate_wait_json(config: &EngineConfig, payload_json: &str) -> Result<String> {
    config.validate()?;
    let payload: EstimatePayload = serde_json::from_str(payload_json)?;
    let predictor = train_predictor(&payload.history, &payload.profiles, config);
    let now = payload.now.unwrap_or_else(host_now);
    let estimate = estimate_wait(&payload.request, &payload.profiles, &predictor, now, config)?;
    Ok(serde_json::to_string(&estimate)?)
}

/// JSON wrapper around [`train_predictor`]; reports the selected method
pub fn train_predictor_json(config: &EngineConfig, payload_json: &str) -> Result<String> {
    config.validate()?;
    let payload: TrainPayload = serde_json::from_str(payload_json)?;
    let predictor = train_predictor(&payload.history, &payload.profiles, config);
    Ok(serde_json::json!({ "method": predictor.method() }).to_string())
}

/// JSON wrapper around [`rank_candidates`]
pub fn rank_candidates_json(config: &EngineConfig, payload_json: &str) -> Result<String> {
    let payload: RankPayload = serde_json::from_str(payload_json)?;
    let report = rank_candidates(&payload.requester_id, &payload.candidates, payload.k, config)?;
    Ok(serde_json::to_string(&report)?)
}

fn to_js_error(error: Error) -> JsValue {
    JsValue::from_str(&serde_json::json!({ "error": error.to_string() }).to_string())
}

/// WASM-exposed engine wrapper
#[wasm_bindgen]
pub struct QueueEngine {
    config: EngineConfig,
}

#[wasm_bindgen]
impl QueueEngine {
    /// Create an engine with the default config
    #[wasm_bindgen(constructor)]
    pub fn new() -> QueueEngine {
        QueueEngine {
            config: EngineConfig::default(),
        }
    }

    /// Create with custom config
    pub fn new_with_config(config_json: &str) -> std::result::Result<QueueEngine, JsValue> {
        let config = EngineConfig::from_json(config_json).map_err(to_js_error)?;
        Ok(QueueEngine { config })
    }

    /// Get default config as JSON
    pub fn get_default_config() -> String {
        serde_json::to_string(&EngineConfig::default()).unwrap_or_default()
    }

    /// Estimate the wait at a branch
    pub fn estimate_wait(&self, payload_json: &str) -> std::result::Result<String, JsValue> {
        estimate_wait_json(&self.config, payload_json).map_err(to_js_error)
    }

    /// Train a predictor and report which strategy was selected
    pub fn train_predictor(&self, payload_json: &str) -> std::result::Result<String, JsValue> {
        train_predictor_json(&self.config, payload_json).map_err(to_js_error)
    }

    /// Suggest play partners
    pub fn rank_candidates(&self, payload_json: &str) -> std::result::Result<String, JsValue> {
        rank_candidates_json(&self.config, payload_json).map_err(to_js_error)
    }
}

impl Default for QueueEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_wait_json() {
        let payload = r#"{
            "branchCapacity": 2,
            "waitingGroups": [
                {"participants": ["a"], "status": "queued"},
                {"participants": ["b", "c"], "status": "queued"},
                {"participants": ["d"], "status": "queued"}
            ],
            "targetParticipantId": "d",
            "profiles": {
                "a": {"rank": 1000, "playStyle": "Casual"},
                "b": {"rank": 2000, "playStyle": "14k Spammer"},
                "c": {"rank": 1500}
            },
            "now": "2024-06-01T19:00:00Z"
        }"#;
        let out: serde_json::Value =
            serde_json::from_str(&estimate_wait_json(&EngineConfig::default(), payload).unwrap()).unwrap();
        assert_eq!(out["estimated_minutes"], 12.0);
        assert_eq!(out["queue_length"], 3);
        assert_eq!(out["active_machines"], 2);
        assert_eq!(out["method"], "static_math");
        assert_eq!(out["in_queue"], true);
    }

    #[test]
    fn test_estimate_wait_json_rejects_zero_capacity() {
        let payload = r#"{"branchCapacity": 0, "now": "2024-06-01T19:00:00Z"}"#;
        let err = estimate_wait_json(&EngineConfig::default(), payload).unwrap_err();
        assert!(err.is_rejection());
    }

    #[test]
    fn test_inverted_duration_bounds_are_rejected() {
        let payload = r#"{
            "branchCapacity": 1,
            "waitingGroups": [{"participants": ["a"], "status": "queued"}],
            "now": "2024-06-01T19:00:00Z"
        }"#;
        let config = EngineConfig {
            min_duration: 30.0,
            max_duration: 5.0,
            ..EngineConfig::default()
        };
        let err = estimate_wait_json(&config, payload).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
        assert!(err.is_rejection());

        assert!(EngineConfig::from_json(r#"{"min_duration":30.0,"max_duration":5.0}"#).is_err());
    }

    #[test]
    fn test_train_predictor_json_reports_method() {
        let payload = r#"{"history": [
            {"participants": ["a"], "startedAt": "2024-06-01T18:00:00Z", "endedAt": "2024-06-01T18:12:00Z"}
        ]}"#;
        let out = train_predictor_json(&EngineConfig::default(), payload).unwrap();
        assert_eq!(out, r#"{"method":"static_math"}"#);
    }

    #[test]
    fn test_rank_candidates_json() {
        let payload = r#"{
            "requesterId": "me",
            "k": 2,
            "candidates": [
                {"id": "me", "rank": 1000, "playStyle": "Casual"},
                {"id": "x", "rank": 1050, "playStyle": "Casual", "username": "Sarah"},
                {"id": "y", "rank": 3000, "playStyle": "Casual"},
                {"id": "z", "rank": 1000, "playStyle": "14k Spammer"}
            ]
        }"#;
        let out: serde_json::Value =
            serde_json::from_str(&rank_candidates_json(&EngineConfig::default(), payload).unwrap()).unwrap();
        assert_eq!(out["requester"], "me");
        assert_eq!(out["matches"].as_array().unwrap().len(), 2);
        assert_eq!(out["matches"][0]["uid"], "x");
        assert!(out["matches"][0]["compatibility_score"].is_number());
        assert_eq!(out["matches"][0]["username"], "Sarah");
        assert!(out.get("message").is_none());
    }

    #[test]
    fn test_malformed_payload_is_a_config_error() {
        let err = rank_candidates_json(&EngineConfig::default(), "{").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
