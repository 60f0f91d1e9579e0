//! Backend HTTP client
//!
//! Thin wrapper over the assistant backend's health endpoints. Every
//! call resolves to a `{status, data | error}` envelope; a network
//! failure is an envelope with status 0, so callers treat it exactly
//! like a non-2xx response.

use crate::config::BackendConfig;
use crate::error::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Generic response envelope shared by all backend calls
#[derive(Debug, Clone)]
pub struct ApiResponse<T> {
    /// HTTP status; 0 on network failure
    pub status: u16,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

impl<T> ApiResponse<T> {
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn network_error(message: String) -> Self {
        Self {
            status: 0,
            data: None,
            error: Some(ApiError {
                code: "NETWORK_ERROR".to_string(),
                message,
            }),
        }
    }
}

/// Structured error detail from the backend
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

/// Client ping payload reported to the backend
#[derive(Debug, Clone, Serialize)]
pub struct ClientPingRequest {
    pub is_gpu_alive: bool,
    pub is_assistant_running: bool,
}

/// Client ping response
#[derive(Debug, Clone, Deserialize)]
pub struct ClientPingResponse {
    pub credits: u64,
}

/// The health surface of the backend, as the prober sees it.
#[async_trait]
pub trait HealthApi: Send + Sync {
    async fn ping(&self) -> ApiResponse<String>;
    async fn ping_client(&self, request: ClientPingRequest) -> ApiResponse<ClientPingResponse>;
    async fn ping_gpu_server(&self) -> ApiResponse<String>;
    async fn wakeup_gpu_server(&self) -> ApiResponse<()>;
}

/// HTTP client for the assistant backend.
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
    session_token: Option<String>,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(format!("Prompter/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            session_token: config.session_token.clone(),
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> ApiResponse<T> {
        let mut request = self.http.get(format!("{}{}", self.base_url, path));
        if let Some(ref token) = self.session_token {
            request = request.bearer_auth(token);
        }
        Self::envelope(request.send().await).await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> ApiResponse<T> {
        let mut request = self.http.post(format!("{}{}", self.base_url, path)).json(body);
        if let Some(ref token) = self.session_token {
            request = request.bearer_auth(token);
        }
        Self::envelope(request.send().await).await
    }

    async fn envelope<T: DeserializeOwned>(
        result: std::result::Result<reqwest::Response, reqwest::Error>,
    ) -> ApiResponse<T> {
        let response = match result {
            Ok(response) => response,
            Err(e) => return ApiResponse::network_error(e.to_string()),
        };

        let status = response.status().as_u16();
        let body: serde_json::Value = response.json().await.unwrap_or_default();

        if !(200..300).contains(&status) {
            let detail = body.get("detail").cloned().unwrap_or_default();
            return ApiResponse {
                status,
                data: None,
                error: Some(ApiError {
                    code: detail
                        .get("error_code")
                        .and_then(|v| v.as_str())
                        .unwrap_or("HTTP_ERROR")
                        .to_string(),
                    message: detail
                        .get("message")
                        .and_then(|v| v.as_str())
                        .unwrap_or("request failed")
                        .to_string(),
                }),
            };
        }

        match serde_json::from_value::<T>(body) {
            Ok(data) => ApiResponse {
                status,
                data: Some(data),
                error: None,
            },
            Err(e) => ApiResponse {
                status,
                data: None,
                error: Some(ApiError {
                    code: "DECODE_ERROR".to_string(),
                    message: e.to_string(),
                }),
            },
        }
    }
}

#[async_trait]
impl HealthApi for BackendClient {
    /// Health check / ping
    async fn ping(&self) -> ApiResponse<String> {
        self.get("/api/health-check/ping").await
    }

    /// Report client status to the backend; returns remaining credits
    async fn ping_client(&self, request: ClientPingRequest) -> ApiResponse<ClientPingResponse> {
        self.post("/api/health-check/ping-client", &request).await
    }

    /// Ping the GPU compute server
    async fn ping_gpu_server(&self) -> ApiResponse<String> {
        self.get("/api/health-check/ping-gpu-server").await
    }

    /// Ask the backend to wake the GPU compute server
    async fn wakeup_gpu_server(&self) -> ApiResponse<()> {
        self.post("/api/health-check/wakeup-gpu-server", &serde_json::json!({}))
            .await
    }
}
