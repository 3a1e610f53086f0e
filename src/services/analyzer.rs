//! Boundary to the AI extraction collaborator.
//!
//! The lifecycle only observes success or failure here: a successful
//! analysis carries the findings used to populate the action plan plus the
//! raw response snapshot; a failure carries the error detail recorded on
//! the job. Prompt engineering and retry policy live on the other side of
//! this boundary.

use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const MODEL: &str = "claude-sonnet-4-5-20250929";
const MAX_TOKENS: u32 = 8192;

const EXTRACTION_PROMPT: &str = "Você é um auditor sanitário. Analise o relatório de inspeção em anexo \
e responda SOMENTE com um JSON no formato: {\"summary\": string, \"strengths\": string, \
\"findings\": [{\"problem\": string, \"action\": string, \"legal_basis\": string|null, \
\"sector\": string|null, \"severity\": \"LOW\"|\"MEDIUM\"|\"HIGH\"|\"CRITICAL\", \
\"deadline\": string}]}. O campo deadline é texto livre (ex.: \"30 dias\", \"Imediato\").";

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("falha na chamada ao serviço de IA: {0}")]
    Http(#[from] reqwest::Error),
    #[error("serviço de IA respondeu com status {status}: {message}")]
    Api { status: u16, message: String },
    #[error("resposta do modelo não contém JSON válido: {0}")]
    MalformedOutput(String),
}

/// One corrective-action finding extracted from the report.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedFinding {
    pub problem: String,
    pub action: String,
    #[serde(default)]
    pub legal_basis: Option<String>,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub deadline: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AnalysisUsage {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub api_calls: i32,
}

/// Successful extraction: the raw snapshot kept for audit/retraining plus
/// the structured pieces the plan is built from.
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub raw: serde_json::Value,
    pub summary: Option<String>,
    pub strengths: Option<String>,
    pub findings: Vec<ExtractedFinding>,
    pub usage: AnalysisUsage,
}

#[async_trait]
pub trait ReportAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        filename: &str,
        document: &[u8],
    ) -> Result<AnalysisReport, AnalyzerError>;
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: i64,
    output_tokens: i64,
}

#[derive(Debug, Deserialize)]
struct ExtractionPayload {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    strengths: Option<String>,
    #[serde(default)]
    findings: Vec<ExtractedFinding>,
}

pub struct AnthropicAnalyzer {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
}

impl AnthropicAnalyzer {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, API_URL.to_string())
    }

    /// Client pointing at a custom base URL (used by tests).
    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(180))
            .build()
            .expect("failed to build HTTP client");
        Self {
            api_key,
            client,
            base_url,
        }
    }
}

#[async_trait]
impl ReportAnalyzer for AnthropicAnalyzer {
    async fn analyze(
        &self,
        filename: &str,
        document: &[u8],
    ) -> Result<AnalysisReport, AnalyzerError> {
        let body = json!({
            "model": MODEL,
            "max_tokens": MAX_TOKENS,
            "messages": [{
                "role": "user",
                "content": [
                    {
                        "type": "document",
                        "source": {
                            "type": "base64",
                            "media_type": "application/pdf",
                            "data": Base64::encode_string(document),
                        },
                        "title": filename,
                    },
                    { "type": "text", "text": EXTRACTION_PROMPT },
                ],
            }],
        });

        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(AnalyzerError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed = response.json::<MessagesResponse>().await?;
        let text = parsed
            .content
            .iter()
            .find(|block| block.content_type == "text")
            .map(|block| block.text.as_str())
            .unwrap_or_default();

        let raw = extract_json(text)?;
        let payload: ExtractionPayload = serde_json::from_value(raw.clone())
            .map_err(|e| AnalyzerError::MalformedOutput(e.to_string()))?;

        Ok(AnalysisReport {
            raw,
            summary: payload.summary,
            strengths: payload.strengths,
            findings: payload.findings,
            usage: AnalysisUsage {
                input_tokens: parsed.usage.input_tokens,
                output_tokens: parsed.usage.output_tokens,
                api_calls: 1,
            },
        })
    }
}

/// Pull the JSON object out of the model's text output, tolerating fenced
/// code blocks around it.
fn extract_json(text: &str) -> Result<serde_json::Value, AnalyzerError> {
    let trimmed = text.trim();
    let inner = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    serde_json::from_str(inner).map_err(|e| AnalyzerError::MalformedOutput(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn extract_json_handles_plain_and_fenced_output() {
        let plain = r#"{"summary": "ok", "findings": []}"#;
        assert!(extract_json(plain).is_ok());

        let fenced = "```json\n{\"summary\": \"ok\", \"findings\": []}\n```";
        let value = extract_json(fenced).unwrap();
        assert_eq!(value["summary"], "ok");

        assert!(extract_json("não consegui analisar").is_err());
    }

    #[test]
    fn findings_deserialize_with_optional_fields_missing() {
        let payload: ExtractionPayload = serde_json::from_str(
            r#"{"findings": [{"problem": "Piso sujo", "action": "Higienizar"}]}"#,
        )
        .unwrap();

        assert_eq!(payload.findings.len(), 1);
        assert_eq!(payload.findings[0].problem, "Piso sujo");
        assert_eq!(payload.findings[0].deadline, None);
    }

    #[tokio::test]
    async fn analyze_parses_findings_and_usage() {
        let server = MockServer::start().await;
        let model_text = "```json\n{\"summary\": \"Resumo\", \"strengths\": \"Equipe treinada\", \
            \"findings\": [{\"problem\": \"Lixeira sem tampa\", \"action\": \"Substituir\", \
            \"severity\": \"HIGH\", \"deadline\": \"30 dias\"}]}\n```";

        Mock::given(method("POST"))
            .and(path("/"))
            .and(header("x-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [{"type": "text", "text": model_text}],
                "usage": {"input_tokens": 1200, "output_tokens": 340}
            })))
            .mount(&server)
            .await;

        let analyzer = AnthropicAnalyzer::with_base_url("test-key".to_string(), server.uri());
        let report = analyzer.analyze("laudo.pdf", b"%PDF-1.4").await.unwrap();

        assert_eq!(report.summary.as_deref(), Some("Resumo"));
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].deadline.as_deref(), Some("30 dias"));
        assert_eq!(report.usage.input_tokens, 1200);
        assert_eq!(report.usage.output_tokens, 340);
    }

    #[tokio::test]
    async fn analyze_surfaces_api_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(529).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let analyzer = AnthropicAnalyzer::with_base_url("test-key".to_string(), server.uri());
        let err = analyzer.analyze("laudo.pdf", b"%PDF-1.4").await.unwrap_err();

        match err {
            AnalyzerError::Api { status, message } => {
                assert_eq!(status, 529);
                assert_eq!(message, "overloaded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
