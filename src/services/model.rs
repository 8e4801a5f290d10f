//! HTTP client for the model services.
//!
//! One reqwest client backs all three LLM-facing traits: formalization,
//! tactic synthesis, and narration. The model endpoints are black boxes;
//! only the wire plumbing lives here.

use crate::error::{Error, Result, SynthesisErrorReason, TranslationErrorReason};
use crate::job::InputKind;
use crate::services::{
    LanguageFormalizer, LemmaHint, NarrativeGenerator, RankedStatement, RepairContext,
    TacticSynthesizer, TranslationContext,
};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Configuration for the model-service client.
#[derive(Debug, Clone)]
pub struct ModelServiceConfig {
    /// API key sent as a bearer token.
    pub api_key: String,
    /// Base URL override.
    pub base_url: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl ModelServiceConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: None,
            timeout_secs: 120,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// Client for the formalizer, synthesizer, and narrative endpoints.
pub struct ModelServiceClient {
    config: ModelServiceConfig,
    http: Client,
}

impl ModelServiceClient {
    const DEFAULT_BASE_URL: &'static str = "https://models.axion.dev";

    pub fn new(config: ModelServiceConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { config, http })
    }

    fn base_url(&self) -> &str {
        self.config
            .base_url
            .as_deref()
            .unwrap_or(Self::DEFAULT_BASE_URL)
    }

    async fn post<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        request: &Req,
    ) -> std::result::Result<Resp, ServiceCallError> {
        let url = format!("{}/v1/{}", self.base_url(), endpoint);
        debug!(%url, "model service request");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| ServiceCallError::Unreachable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<Resp>()
                .await
                .map_err(|e| ServiceCallError::Unreachable(format!("malformed response: {}", e)));
        }

        let envelope = response.json::<ServiceErrorEnvelope>().await.ok();
        let message = envelope
            .map(|env| env.error.message)
            .unwrap_or_else(|| format!("HTTP {}", status));

        if status == StatusCode::UNPROCESSABLE_ENTITY {
            Err(ServiceCallError::Rejected(message))
        } else {
            // 429s, 5xx, auth failures: the service is unavailable to us.
            Err(ServiceCallError::Unreachable(message))
        }
    }
}

/// Transport-level call failure, mapped to the calling trait's error space.
enum ServiceCallError {
    /// Connection, timeout, decode, or server-side failure.
    Unreachable(String),
    /// The service understood the request and rejected its content (422).
    Rejected(String),
}

#[derive(Debug, Serialize)]
struct FormalizeRequest<'a> {
    input_kind: InputKind,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    prior_statement: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    prior_diagnostic: Option<&'a str>,
    disambiguate: bool,
}

#[derive(Debug, Deserialize)]
struct FormalizeResponse {
    #[serde(default)]
    statements: Vec<RankedStatement>,
    /// The model may flag that the input admits several readings.
    #[serde(default)]
    ambiguous: bool,
}

#[derive(Debug, Serialize)]
struct SynthesizeRequest<'a> {
    statement: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    diagnostic: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    goal_state: Option<&'a str>,
    prefer_simple_tactics: bool,
    lemmas: &'a [LemmaHint],
}

#[derive(Debug, Deserialize)]
struct SynthesizeResponse {
    /// None when the model found no strategy.
    proof: Option<String>,
}

#[derive(Debug, Serialize)]
struct NarrateRequest<'a> {
    statement: &'a str,
    proof: &'a str,
}

#[derive(Debug, Deserialize)]
struct NarrateResponse {
    steps: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ServiceErrorEnvelope {
    error: ServiceErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ServiceErrorDetail {
    message: String,
    #[serde(rename = "type")]
    #[allow(dead_code)]
    error_type: Option<String>,
}

#[async_trait]
impl LanguageFormalizer for ModelServiceClient {
    async fn translate(
        &self,
        input_kind: InputKind,
        text: &str,
        context: Option<&TranslationContext>,
    ) -> Result<Vec<RankedStatement>> {
        let request = FormalizeRequest {
            input_kind,
            text,
            prior_statement: context.and_then(|c| c.prior_statement.as_deref()),
            prior_diagnostic: context.and_then(|c| c.prior_diagnostic.as_deref()),
            disambiguate: context.map(|c| c.disambiguate).unwrap_or(false),
        };

        let response: FormalizeResponse =
            self.post("formalize", &request).await.map_err(|e| match e {
                ServiceCallError::Unreachable(msg) => {
                    Error::translation(TranslationErrorReason::ServiceUnavailable, msg)
                }
                ServiceCallError::Rejected(msg) => {
                    Error::translation(TranslationErrorReason::Unparseable, msg)
                }
            })?;

        if response.ambiguous && response.statements.is_empty() {
            return Err(Error::translation(
                TranslationErrorReason::Ambiguous,
                "model reported multiple incompatible readings",
            ));
        }
        Ok(response.statements)
    }
}

#[async_trait]
impl TacticSynthesizer for ModelServiceClient {
    async fn propose(
        &self,
        statement: &str,
        repair: Option<&RepairContext>,
        hints: &[LemmaHint],
    ) -> Result<String> {
        let request = SynthesizeRequest {
            statement,
            diagnostic: repair.map(|r| r.diagnostic.as_str()),
            goal_state: repair.and_then(|r| r.goal_state.as_deref()),
            prefer_simple_tactics: repair.map(|r| r.prefer_simple_tactics).unwrap_or(false),
            lemmas: hints,
        };

        let response: SynthesizeResponse =
            self.post("synthesize", &request).await.map_err(|e| match e {
                ServiceCallError::Unreachable(msg) => {
                    Error::synthesis(SynthesisErrorReason::ServiceUnavailable, msg)
                }
                ServiceCallError::Rejected(msg) => {
                    Error::synthesis(SynthesisErrorReason::NoStrategyFound, msg)
                }
            })?;

        response.proof.ok_or_else(|| {
            Error::synthesis(
                SynthesisErrorReason::NoStrategyFound,
                "model returned no proof",
            )
        })
    }
}

#[async_trait]
impl NarrativeGenerator for ModelServiceClient {
    async fn describe(&self, statement: &str, proof: &str) -> Result<Vec<String>> {
        let request = NarrateRequest { statement, proof };

        let response: NarrateResponse = self.post("narrate", &request).await.map_err(|e| {
            let (ServiceCallError::Unreachable(msg) | ServiceCallError::Rejected(msg)) = e;
            Error::model_service("narrate", msg)
        })?;

        Ok(response.steps)
    }
}
