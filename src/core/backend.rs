use crate::core::config::BackendConfig;
use crate::core::errors::ErrorContext;
use crate::core::models::{ExtractedProduct, ScanResults, SkinConcern, SkinType};
use async_trait::async_trait;
use log::info;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

pub const AI_FUNCTION: &str = "skincare-ai";
pub const HISTORY_FUNCTION: &str = "skincare-history";

/// Hosted AI assistant: chat answers and routine generation
#[async_trait]
pub trait AiBackend: Send + Sync {
    async fn chat(&self, message: &str) -> io::Result<String>;

    async fn generate_routine(&self, request: &RoutineRequest) -> io::Result<String>;
}

/// Per-user history storage
#[async_trait]
pub trait HistoryBackend: Send + Sync {
    /// Whether saves can succeed at all (a signed-in user is required).
    fn is_enabled(&self) -> bool;

    async fn save_chat(&self, record: &ChatRecord) -> io::Result<()>;

    async fn save_scan(&self, record: &ScanRecord) -> io::Result<()>;

    async fn get_history(&self, kind: HistoryKind) -> io::Result<Vec<serde_json::Value>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutineRequest {
    pub skin_type: SkinType,
    pub concerns: Vec<SkinConcern>,
    pub include_actives: bool,
}

impl RoutineRequest {
    /// Human-readable prompt stored alongside the generated routine.
    pub fn describe(&self) -> String {
        let concerns: Vec<&str> = self.concerns.iter().map(|c| c.as_str()).collect();
        format!(
            "Generate a skincare routine for {} skin with concerns: {}{}",
            self.skin_type,
            concerns.join(", "),
            if self.include_actives {
                " including active ingredients"
            } else {
                ""
            }
        )
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
enum AiRequest<'a> {
    Chat {
        message: &'a str,
    },
    GenerateRoutine {
        skin_type: SkinType,
        concerns: &'a [SkinConcern],
        include_actives: bool,
    },
}

#[derive(Debug, Deserialize)]
struct AiResponse {
    result: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRecord {
    pub message: String,
    pub response: String,
    pub products: Vec<ExtractedProduct>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRecord {
    #[serde(flatten)]
    pub results: ScanResults,
    pub scan_image: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryKind {
    Chat,
    Scan,
}

#[derive(Debug, Serialize)]
#[serde(tag = "action", content = "data", rename_all = "kebab-case")]
enum HistoryRequest<'a> {
    SaveChat(&'a ChatRecord),
    SaveScan(&'a ScanRecord),
    GetHistory {
        #[serde(rename = "type")]
        kind: HistoryKind,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryResponse {
    #[serde(default)]
    success: bool,
    error: Option<String>,
    chats: Option<Vec<serde_json::Value>>,
    scans: Option<Vec<serde_json::Value>>,
}

/// Error types for backend calls
#[derive(Debug)]
pub enum BackendError {
    NotConfigured(String),
    ConnectionError(String),
    ApiError { status: u16, message: String },
    DataParseError(String),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::NotConfigured(msg) => write!(f, "Backend not configured: {msg}"),
            BackendError::ConnectionError(msg) => write!(f, "Connection error: {msg}"),
            BackendError::ApiError { status, message } => {
                write!(f, "API error (HTTP {status}): {message}")
            }
            BackendError::DataParseError(msg) => write!(f, "Data parse error: {msg}"),
        }
    }
}

impl std::error::Error for BackendError {}

impl From<BackendError> for io::Error {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::NotConfigured(_) => io::Error::new(io::ErrorKind::NotFound, err),
            _ => io::Error::other(err),
        }
    }
}

/// Client for the hosted serverless functions
pub struct FunctionsClient {
    client: Client,
    base_url: String,
    anon_key: String,
    access_token: Option<String>,
    error_log: Option<PathBuf>,
}

impl FunctionsClient {
    pub fn new(config: &BackendConfig, error_log: Option<PathBuf>) -> io::Result<Self> {
        if !config.is_configured() {
            return Err(BackendError::NotConfigured(
                "set functions_url and anon_key with 'skinscan config set'".to_string(),
            )
            .into());
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| io::Error::other(format!("Failed to create HTTP client: {e}")))?;

        let base_url = config.functions_url.trim_end_matches('/').to_string();
        info!("Created functions client for {base_url}");

        let access_token = Some(config.access_token.trim().to_string()).filter(|t| !t.is_empty());

        Ok(Self {
            client,
            base_url,
            anon_key: config.anon_key.clone(),
            access_token,
            error_log,
        })
    }

    fn function_url(&self, function: &str) -> String {
        format!("{}/functions/v1/{function}", self.base_url)
    }

    async fn invoke<B, R>(&self, function: &str, operation: &str, body: &B) -> io::Result<R>
    where
        B: Serialize + Sync + ?Sized,
        R: DeserializeOwned + Send,
    {
        let url = self.function_url(function);
        let bearer = self.access_token.as_deref().unwrap_or(&self.anon_key);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {bearer}"))
            .header("apikey", &self.anon_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                ErrorContext::new(function, operation)
                    .with_error("network_error", &e.to_string())
                    .with_request_details(&url, None, None)
                    .log_error(self.error_log.as_deref());
                BackendError::ConnectionError(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&error_text)
                .ok()
                .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
                .unwrap_or_else(|| error_text.clone());

            ErrorContext::new(function, operation)
                .with_error("api_error", &format!("HTTP {status}"))
                .with_request_details(&url, Some(status.as_u16()), Some(&error_text))
                .log_error(self.error_log.as_deref());

            return Err(BackendError::ApiError {
                status: status.as_u16(),
                message,
            }
            .into());
        }

        response.json::<R>().await.map_err(|e| {
            ErrorContext::new(function, operation)
                .with_error("json_parse_error", &e.to_string())
                .with_request_details(&url, Some(status.as_u16()), None)
                .log_error(self.error_log.as_deref());
            BackendError::DataParseError(e.to_string()).into()
        })
    }

    async fn invoke_ai(&self, operation: &str, request: &AiRequest<'_>) -> io::Result<String> {
        let response: AiResponse = self.invoke(AI_FUNCTION, operation, request).await?;
        match (response.result, response.error) {
            (Some(result), _) => Ok(result),
            (None, Some(error)) => Err(BackendError::ApiError {
                status: 200,
                message: error,
            }
            .into()),
            (None, None) => {
                Err(BackendError::DataParseError("response has no result".to_string()).into())
            }
        }
    }

    async fn invoke_history(&self, request: &HistoryRequest<'_>) -> io::Result<HistoryResponse> {
        let operation = match request {
            HistoryRequest::SaveChat(_) => "save-chat",
            HistoryRequest::SaveScan(_) => "save-scan",
            HistoryRequest::GetHistory { .. } => "get-history",
        };
        let response: HistoryResponse = self.invoke(HISTORY_FUNCTION, operation, request).await?;
        if !response.success {
            let message = response
                .error
                .clone()
                .unwrap_or_else(|| "request was not successful".to_string());
            ErrorContext::new(HISTORY_FUNCTION, operation)
                .with_error("api_error", &message)
                .log_error(self.error_log.as_deref());
            return Err(BackendError::ApiError {
                status: 200,
                message,
            }
            .into());
        }
        Ok(response)
    }
}

#[async_trait]
impl AiBackend for FunctionsClient {
    async fn chat(&self, message: &str) -> io::Result<String> {
        info!("Sending chat message ({} chars)", message.len());
        self.invoke_ai("chat", &AiRequest::Chat { message }).await
    }

    async fn generate_routine(&self, request: &RoutineRequest) -> io::Result<String> {
        info!(
            "Requesting routine for {} skin ({} concerns)",
            request.skin_type,
            request.concerns.len()
        );
        self.invoke_ai(
            "generate-routine",
            &AiRequest::GenerateRoutine {
                skin_type: request.skin_type,
                concerns: &request.concerns,
                include_actives: request.include_actives,
            },
        )
        .await
    }
}

#[async_trait]
impl HistoryBackend for FunctionsClient {
    fn is_enabled(&self) -> bool {
        self.access_token.is_some()
    }

    async fn save_chat(&self, record: &ChatRecord) -> io::Result<()> {
        self.invoke_history(&HistoryRequest::SaveChat(record))
            .await
            .map(|_| ())
    }

    async fn save_scan(&self, record: &ScanRecord) -> io::Result<()> {
        self.invoke_history(&HistoryRequest::SaveScan(record))
            .await
            .map(|_| ())
    }

    async fn get_history(&self, kind: HistoryKind) -> io::Result<Vec<serde_json::Value>> {
        let response = self
            .invoke_history(&HistoryRequest::GetHistory { kind })
            .await?;
        let entries = match kind {
            HistoryKind::Chat => response.chats,
            HistoryKind::Scan => response.scans,
        };
        Ok(entries.unwrap_or_default())
    }
}
