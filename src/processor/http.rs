use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

use super::{CancelAck, ContentKind, RemoteProcessor, Task};

/// A processor reached over HTTP.
///
/// The protocol is three endpoints: create, observe, cancel. Anything
/// the server won't answer becomes a transport error; anything it
/// answers with garbage becomes a protocol violation.
pub struct HttpProcessor {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpProcessor {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    /// Join the base URL and a path without doubling slashes.
    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.header("authorization", format!("Bearer {key}")),
            None => req,
        }
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        resp: reqwest::Response,
    ) -> Result<T> {
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::Transport(format!(
                "processor returned {status}: {text}"
            )));
        }
        resp.json::<T>()
            .await
            .map_err(|e| Error::Protocol(format!("malformed processor response: {e}")))
    }
}

#[async_trait]
impl RemoteProcessor for HttpProcessor {
    async fn create_task(
        &self,
        kind: ContentKind,
        params: &HashMap<String, String>,
    ) -> Result<Task> {
        let url = self.endpoint("v1/tasks");
        debug!(%kind, %url, "submitting generation task");

        let body = CreateTaskRequest { kind, params };
        let resp = self
            .apply_auth(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        Self::decode(resp).await
    }

    async fn get_task(&self, id: &str) -> Result<Task> {
        let url = self.endpoint(&format!("v1/tasks/{id}"));
        let resp = self
            .apply_auth(self.client.get(&url))
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        Self::decode(resp).await
    }

    async fn request_cancel(&self, id: &str) -> Result<CancelAck> {
        let url = self.endpoint(&format!("v1/tasks/{id}/cancel"));
        debug!(%id, "requesting cancellation");

        let resp = self
            .apply_auth(self.client.post(&url))
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        let ack: CancelResponse = Self::decode(resp).await?;
        Ok(ack.ack)
    }
}

// --- API types ---

#[derive(Serialize)]
struct CreateTaskRequest<'a> {
    kind: ContentKind,
    params: &'a HashMap<String, String>,
}

#[derive(Deserialize)]
struct CancelResponse {
    ack: CancelAck,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_without_double_slash() {
        let p = HttpProcessor::new("http://host:8700/", None);
        assert_eq!(p.endpoint("/v1/tasks"), "http://host:8700/v1/tasks");
        assert_eq!(p.endpoint("v1/tasks"), "http://host:8700/v1/tasks");
    }

    #[test]
    fn endpoint_keeps_base_path() {
        let p = HttpProcessor::new("http://host/api", None);
        assert_eq!(p.endpoint("v1/tasks/t-1"), "http://host/api/v1/tasks/t-1");
    }

    #[test]
    fn cancel_response_decodes_both_acks() {
        let r: CancelResponse = serde_json::from_str(r#"{"ack":"requested"}"#).unwrap();
        assert_eq!(r.ack, CancelAck::Requested);

        let r: CancelResponse =
            serde_json::from_str(r#"{"ack":"already_terminal"}"#).unwrap();
        assert_eq!(r.ack, CancelAck::AlreadyTerminal);
    }

    #[test]
    fn task_decodes_from_wire_shape() {
        let json = r#"{
            "id": "task-9",
            "kind": "cover_letter",
            "status": "completed",
            "result": {"text": "Dear team"},
            "created_at": "2026-03-01T10:00:00Z",
            "updated_at": "2026-03-01T10:00:12Z"
        }"#;
        let task: Task = serde_json::from_str(json).unwrap();
        assert_eq!(task.id, "task-9");
        assert_eq!(task.status, super::super::TaskStatus::Completed);
        assert!(task.result.is_some());
        assert!(task.error_message.is_none());
    }
}
