//! Langfuse run tracing.
//!
//! One `trace-create` event is sent per research run. Tracing never fails a
//! run: delivery problems are logged and dropped.

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::agents::AgentKind;
use crate::config::LangfuseSettings;

const INGESTION_PATH: &str = "/api/public/ingestion";
const TRACE_TAG: &str = "research-cli";
const DEFAULT_USER: &str = "research-cli";

/// What happened during one run.
#[derive(Debug, Clone)]
pub struct RunTrace {
    pub agent: AgentKind,
    pub query: String,
    pub thread_id: Option<String>,
    pub query_id: Option<i64>,
    pub output: Option<String>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl RunTrace {
    pub fn start(agent: AgentKind, query: impl Into<String>, thread_id: Option<String>) -> Self {
        Self {
            agent,
            query: query.into(),
            thread_id,
            query_id: None,
            output: None,
            error: None,
            started_at: Utc::now(),
        }
    }

    /// The thread id, or a fresh `cli-session-xxxxxxxx` id.
    pub fn session_id(&self) -> String {
        match &self.thread_id {
            Some(id) => id.clone(),
            None => {
                let id = Uuid::new_v4().simple().to_string();
                format!("cli-session-{}", &id[..8])
            }
        }
    }
}

pub struct LangfuseTracer {
    http: Client,
    endpoint: String,
    public_key: String,
    secret_key: String,
    release: Option<String>,
}

impl LangfuseTracer {
    /// `None` unless tracing is enabled and both keys are configured.
    pub fn from_settings(settings: &LangfuseSettings, http: Client) -> Option<Self> {
        if !settings.is_active() {
            debug!("langfuse tracing disabled");
            return None;
        }

        Some(Self {
            http,
            endpoint: format!("{}{INGESTION_PATH}", settings.host.trim_end_matches('/')),
            public_key: settings.public_key.clone()?,
            secret_key: settings.secret_key.clone()?,
            release: settings.release.clone(),
        })
    }

    pub fn payload(&self, trace: &RunTrace) -> Value {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let user_id = trace
            .thread_id
            .clone()
            .unwrap_or_else(|| DEFAULT_USER.to_string());

        let mut body = json!({
            "id": Uuid::new_v4().to_string(),
            "timestamp": trace.started_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            "name": format!("research::{}", trace.agent),
            "sessionId": trace.session_id(),
            "userId": user_id,
            "tags": [TRACE_TAG, trace.agent.to_string()],
            "metadata": {
                "query": trace.query,
                "agent": trace.agent.to_string(),
                "thread_id": trace.thread_id,
                "query_id": trace.query_id,
                "error": trace.error,
            },
            "input": { "query": trace.query },
            "output": trace.output,
        });
        if let Some(release) = &self.release {
            body["release"] = json!(release);
        }

        json!({
            "batch": [{
                "id": Uuid::new_v4().to_string(),
                "timestamp": now,
                "type": "trace-create",
                "body": body,
            }]
        })
    }

    /// Send the trace. Errors are logged, never returned.
    pub async fn record(&self, trace: &RunTrace) {
        let response = self
            .http
            .post(&self.endpoint)
            .basic_auth(&self.public_key, Some(&self.secret_key))
            .json(&self.payload(trace))
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => debug!("trace recorded"),
            Ok(resp) => warn!(status = %resp.status(), "langfuse rejected the trace"),
            Err(err) => warn!(error = %err, "could not send trace to langfuse"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use pretty_assertions::assert_eq;

    fn settings(host: &str) -> LangfuseSettings {
        LangfuseSettings {
            enabled: true,
            public_key: Some("pk-lf".to_string()),
            secret_key: Some("sk-lf".to_string()),
            host: host.to_string(),
            release: Some("1.2.0".to_string()),
        }
    }

    #[test]
    fn inactive_settings_disable_tracing() {
        let mut disabled = settings("http://localhost");
        disabled.enabled = false;
        assert!(LangfuseTracer::from_settings(&disabled, Client::new()).is_none());

        let mut keyless = settings("http://localhost");
        keyless.secret_key = None;
        assert!(LangfuseTracer::from_settings(&keyless, Client::new()).is_none());
    }

    #[test]
    fn session_falls_back_to_a_cli_session() {
        let trace = RunTrace::start(AgentKind::Simple, "q", None);
        let session = trace.session_id();
        assert!(session.starts_with("cli-session-"));
        assert_eq!(session.len(), "cli-session-".len() + 8);

        let threaded = RunTrace::start(AgentKind::Simple, "q", Some("thread-7".to_string()));
        assert_eq!(threaded.session_id(), "thread-7");
    }

    #[test]
    fn payload_describes_the_run() {
        let tracer = LangfuseTracer::from_settings(&settings("http://localhost"), Client::new()).unwrap();
        let mut trace = RunTrace::start(AgentKind::Memory, "What is LangGraph?", None);
        trace.output = Some("a report".to_string());

        let payload = tracer.payload(&trace);
        let event = &payload["batch"][0];
        assert_eq!(event["type"], "trace-create");

        let body = &event["body"];
        assert_eq!(body["name"], "research::memory");
        assert_eq!(body["userId"], "research-cli");
        assert_eq!(body["tags"], json!(["research-cli", "memory"]));
        assert_eq!(body["metadata"]["query"], "What is LangGraph?");
        assert_eq!(body["input"]["query"], "What is LangGraph?");
        assert_eq!(body["output"], "a report");
        assert_eq!(body["release"], "1.2.0");
    }

    #[tokio::test]
    async fn record_posts_with_basic_auth() {
        let mut server = mockito::Server::new_async().await;
        // base64("pk-lf:sk-lf")
        let mock = server
            .mock("POST", "/api/public/ingestion")
            .match_header("authorization", "Basic cGstbGY6c2stbGY=")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#""type":"trace-create""#.to_string()),
                Matcher::Regex(r#""sessionId":"thread-1""#.to_string()),
            ]))
            .with_status(207)
            .with_body(r#"{"successes":[],"errors":[]}"#)
            .create_async()
            .await;

        let tracer = LangfuseTracer::from_settings(&settings(&server.url()), Client::new()).unwrap();
        let trace = RunTrace::start(AgentKind::Coordinator, "q", Some("thread-1".to_string()));
        tracer.record(&trace).await;

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn delivery_failures_are_swallowed() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/public/ingestion")
            .with_status(500)
            .create_async()
            .await;

        let tracer = LangfuseTracer::from_settings(&settings(&server.url()), Client::new()).unwrap();
        tracer
            .record(&RunTrace::start(AgentKind::Simple, "q", None))
            .await;

        mock.assert_async().await;
    }
}
