use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use assess_core::model::{AnswerSnapshot, SessionConfig, SessionId, SessionMode, SessionResult};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;

use crate::auth::AuthContext;
use crate::repository::{GatewayError, SessionGateway, StartedSession};

mod mapping;

use mapping::{StartRequest, StartResponse, SubmitRequest, classify_status, map_reqwest_error};

#[derive(Clone, Debug)]
pub struct HttpGatewayConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl HttpGatewayConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(15),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// JSON-over-HTTP gateway to the assessment server.
#[derive(Clone)]
pub struct HttpGateway {
    client: Client,
    config: HttpGatewayConfig,
    auth: Arc<dyn AuthContext>,
}

impl HttpGateway {
    /// Build a gateway with its own connection pool.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Transport` if the HTTP client cannot be built.
    pub fn new(config: HttpGatewayConfig, auth: Arc<dyn AuthContext>) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| map_reqwest_error(&e))?;
        Ok(Self {
            client,
            config,
            auth,
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.auth.bearer_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, GatewayError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| map_reqwest_error(&e))?;
        self.decode(response).await
    }

    async fn decode<T: DeserializeOwned>(&self, response: Response) -> Result<T, GatewayError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = classify_status(status, &body);
            if err == GatewayError::Unauthorized {
                self.auth.credentials_rejected();
            }
            tracing::debug!(%status, error = %err, "gateway request failed");
            return Err(err);
        }
        response.json::<T>().await.map_err(|e| map_reqwest_error(&e))
    }
}

#[async_trait]
impl SessionGateway for HttpGateway {
    async fn start_session(
        &self,
        mode: SessionMode,
        config: &SessionConfig,
    ) -> Result<StartedSession, GatewayError> {
        tracing::debug!(%mode, "starting session");
        let request = self
            .client
            .post(self.config.url("sessions"))
            .json(&StartRequest { config });
        let body: StartResponse = self.send(request).await?;
        Ok(StartedSession {
            session_id: body.session_id,
            questions: body.questions,
        })
    }

    async fn submit_session(
        &self,
        session_id: &SessionId,
        answers: &AnswerSnapshot,
    ) -> Result<SessionResult, GatewayError> {
        tracing::debug!(%session_id, answers = answers.len(), "submitting session");
        let request = self
            .client
            .post(self.config.url(&format!("sessions/{session_id}/submit")))
            .json(&SubmitRequest { answers });
        self.send(request).await
    }

    async fn fetch_results(&self, session_id: &SessionId) -> Result<SessionResult, GatewayError> {
        let request = self
            .client
            .get(self.config.url(&format!("sessions/{session_id}/results")));
        self.send(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_join_without_double_slash() {
        let config = HttpGatewayConfig::new("https://api.example.test/v1/");
        assert_eq!(
            config.url("sessions/s1/submit"),
            "https://api.example.test/v1/sessions/s1/submit"
        );
    }

    #[test]
    fn default_timeout_is_bounded() {
        let config = HttpGatewayConfig::new("http://localhost").with_timeout(Duration::from_secs(3));
        assert_eq!(config.timeout, Duration::from_secs(3));
    }
}
