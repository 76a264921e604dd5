//! [`ModelPolicy`] – decisions from an external inference endpoint.
//!
//! The model runs out of process and speaks plain JSON over HTTP:
//!
//! | Request                      | Body            | Expected reply          |
//! |------------------------------|-----------------|-------------------------|
//! | `GET {endpoint}/health`      | –               | any 2xx                 |
//! | `POST {endpoint}/act?model=` | `Observation`   | `Decision`              |
//!
//! Loading probes `/health` once. After that every [`Policy::decide`] call
//! posts the observation; a transport error, non-2xx status, undecodable body
//! or out-of-range confidence is logged and answered by the embedded
//! [`HeuristicPolicy`] instead, so `decide` stays total.
//!
//! The HTTP client is blocking. Call [`Policy::decide`] from a blocking
//! context (e.g. `tokio::task::spawn_blocking`), never directly on an async
//! worker.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use skirmish_types::{Decision, Observation, SkirmishError};
use tracing::{info, warn};

use crate::{HeuristicPolicy, Policy};

fn default_endpoint() -> String {
    "http://127.0.0.1:8765".to_string()
}
fn default_model_name() -> String {
    "vpt".to_string()
}
fn default_timeout_ms() -> u64 {
    2000
}

/// Where the external model lives and whether it may answer requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Base URL of the inference server.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Model identifier forwarded to the server.
    #[serde(default = "default_model_name")]
    pub name: String,

    /// Per-request timeout for both the health probe and inference.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// When `false` a successfully loaded model is kept idle and the
    /// heuristic keeps answering.
    #[serde(default)]
    pub route_decisions: bool,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            name: default_model_name(),
            timeout_ms: default_timeout_ms(),
            route_decisions: false,
        }
    }
}

impl ModelSettings {
    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint.trim_end_matches('/'), path)
    }
}

/// Policy backed by an external model, with the heuristic as safety net.
pub struct ModelPolicy {
    settings: ModelSettings,
    client: Client,
    fallback: HeuristicPolicy,
}

impl ModelPolicy {
    /// Build the client and probe `{endpoint}/health`.
    ///
    /// # Errors
    ///
    /// Returns [`SkirmishError::ModelUnavailable`] if the client cannot be
    /// built or the probe fails for any reason.
    pub fn load(settings: ModelSettings) -> Result<Self, SkirmishError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()
            .map_err(|e| SkirmishError::ModelUnavailable(format!("http client: {e}")))?;

        let health_url = settings.url("health");
        client
            .get(&health_url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| SkirmishError::ModelUnavailable(format!("{health_url}: {e}")))?;

        info!(endpoint = %settings.endpoint, model = %settings.name, "model endpoint healthy");
        Ok(Self {
            settings,
            client,
            fallback: HeuristicPolicy::new(),
        })
    }

    /// Ask the model for a decision without falling back.
    ///
    /// # Errors
    ///
    /// Returns [`SkirmishError::ModelInference`] on transport, status or
    /// decode failure, or when the confidence is outside `(0, 1]`.
    pub fn infer(&self, observation: &Observation) -> Result<Decision, SkirmishError> {
        let decision: Decision = self
            .client
            .post(self.settings.url("act"))
            .query(&[("model", self.settings.name.as_str())])
            .json(observation)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json())
            .map_err(|e| SkirmishError::ModelInference(e.to_string()))?;

        if !decision.has_valid_confidence() {
            return Err(SkirmishError::ModelInference(format!(
                "confidence {} outside (0, 1]",
                decision.confidence
            )));
        }
        Ok(decision)
    }
}

impl Policy for ModelPolicy {
    fn name(&self) -> &str {
        "model"
    }

    fn decide(&self, observation: &Observation) -> Decision {
        match self.infer(observation) {
            Ok(decision) => decision,
            Err(e) => {
                warn!(model = %self.settings.name, error = %e, "model inference failed; answering with heuristic");
                self.fallback.decide(observation)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use skirmish_types::{Action, Hostile};
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Mock model server whose `/health` answers `status` exactly once.
    pub(crate) async fn mock_model(status: u16) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(status))
            .expect(1)
            .mount(&server)
            .await;
        server
    }

    pub(crate) fn settings_for(server: &MockServer) -> ModelSettings {
        ModelSettings {
            endpoint: server.uri(),
            ..ModelSettings::default()
        }
    }

    pub(crate) fn unreachable_settings() -> ModelSettings {
        // Bind then drop so the port is almost certainly closed.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        ModelSettings {
            endpoint: format!("http://127.0.0.1:{port}"),
            timeout_ms: 500,
            ..ModelSettings::default()
        }
    }

    fn distant_target() -> Observation {
        Observation::default().with_hostile(Hostile {
            distance: 9.0,
            angle: 0.0,
        })
    }

    /// Load against `settings` and run `f`, all on a blocking thread so the
    /// blocking client never lives on an async worker.
    async fn with_loaded<T, F>(settings: ModelSettings, f: F) -> T
    where
        T: Send + 'static,
        F: FnOnce(ModelPolicy) -> T + Send + 'static,
    {
        tokio::task::spawn_blocking(move || f(ModelPolicy::load(settings).expect("load")))
            .await
            .unwrap()
    }

    #[test]
    fn settings_defaults() {
        let s = ModelSettings::default();
        assert_eq!(s.endpoint, "http://127.0.0.1:8765");
        assert_eq!(s.name, "vpt");
        assert_eq!(s.timeout_ms, 2000);
        assert!(!s.route_decisions);
    }

    #[test]
    fn url_joins_without_double_slash() {
        let s = ModelSettings {
            endpoint: "http://host:1/".to_string(),
            ..ModelSettings::default()
        };
        assert_eq!(s.url("health"), "http://host:1/health");
    }

    #[test]
    fn load_fails_when_endpoint_unreachable() {
        let err = ModelPolicy::load(unreachable_settings()).err().expect("must fail");
        assert!(matches!(err, SkirmishError::ModelUnavailable(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn load_fails_on_unhealthy_status() {
        let server = mock_model(503).await;
        let settings = settings_for(&server);
        let res = tokio::task::spawn_blocking(move || ModelPolicy::load(settings).map(|_| ()))
            .await
            .unwrap();
        assert!(matches!(res, Err(SkirmishError::ModelUnavailable(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn decide_uses_model_reply() {
        let server = mock_model(200).await;
        Mock::given(method("POST"))
            .and(path("/act"))
            .and(query_param("model", "vpt"))
            .and(body_partial_json(json!({"nearest_hostile": {"distance": 9.0}})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"action": "use_item", "confidence": 0.8})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let decision = with_loaded(settings_for(&server), |p| p.decide(&distant_target())).await;
        assert_eq!(decision, Decision::new(Action::UseItem, 0.8));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn decide_falls_back_on_bad_reply() {
        let replies = [
            ResponseTemplate::new(200).set_body_string("not a decision"),
            ResponseTemplate::new(200).set_body_json(json!({"action": "attack", "confidence": 1.5})),
            ResponseTemplate::new(500),
        ];
        for reply in replies {
            let server = mock_model(200).await;
            Mock::given(method("POST"))
                .and(path("/act"))
                .respond_with(reply)
                .expect(1)
                .mount(&server)
                .await;

            // Heuristic: distance 9, facing → closing-in attack.
            let decision =
                with_loaded(settings_for(&server), |p| p.decide(&distant_target())).await;
            assert_eq!(decision, Decision::new(Action::Attack, 0.6));
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn infer_rejects_out_of_range_confidence() {
        let server = mock_model(200).await;
        Mock::given(method("POST"))
            .and(path("/act"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"action": "flee", "confidence": 0})),
            )
            .mount(&server)
            .await;

        let err = with_loaded(settings_for(&server), |p| p.infer(&distant_target()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("outside (0, 1]"));
    }
}
