//! HTTP client for the remote calibration service.
//!
//! Stateless apart from the cookie jar that carries the session. Every
//! non-2xx reply becomes [`Error::Remote`] with the server's message text.

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::types::{
    CalibrationJob, ExtrinsicResponse, ExtrinsicSubmission, FrameSubmission, StartResponse,
    StopResponse, SubmitResponse,
};
use crate::camera::EncodedImage;
use crate::config::BackendConfig;
use crate::error::{Error, Result};

const START_PATH: &str = "/api/calibration/start";
const CAPTURE_PATH: &str = "/api/capture_checkerboard_image";
const STATUS_PATH: &str = "/api/capture_checkerboard_image/status";
const STOP_PATH: &str = "/api/capture_checkerboard_image/stop";
const EXTRINSIC_PATH: &str = "/api/calibration/extrinsic";

/// Longest server message kept in a [`Error::Remote`].
const MAX_MESSAGE_LEN: usize = 300;

/// Operations offered by the calibration service.
#[async_trait]
pub trait CalibrationApi: Send + Sync {
    async fn start(&self) -> Result<StartResponse>;

    async fn submit_frame(&self, image: &EncodedImage, camera_index: usize) -> Result<SubmitResponse>;

    async fn submit_extrinsic(
        &self,
        image: &EncodedImage,
        camera_indices: [usize; 2],
    ) -> Result<ExtrinsicResponse>;

    async fn query_status(&self) -> Result<CalibrationJob>;

    async fn stop(&self) -> Result<StopResponse>;
}

/// reqwest-backed [`CalibrationApi`].
pub struct CalibrationClient {
    http: reqwest::Client,
    base_url: String,
    session_token: Option<String>,
    timeout: Duration,
}

impl CalibrationClient {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let base_url = config.base_url.trim().trim_end_matches('/').to_string();
        reqwest::Url::parse(&base_url)
            .map_err(|e| Error::Config(format!("invalid backend url {:?}: {}", base_url, e)))?;

        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            http,
            base_url,
            session_token: config.session_token.clone(),
            timeout: config.request_timeout(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        log::debug!("{} {}", method, url);

        let mut request = self
            .http
            .request(method, &url)
            .header(ACCEPT, "application/json");
        if let Some(token) = &self.session_token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(|e| self.network_error(e))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = remote_message(status, &text);
            log::warn!("{} failed with {}: {}", path, status, message);
            return Err(Error::Remote {
                status: status.as_u16(),
                message,
            });
        }

        response.json::<T>().await.map_err(|e| self.network_error(e))
    }

    fn network_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Network(format!("request timed out after {:?}", self.timeout))
        } else {
            Error::from(e)
        }
    }
}

#[async_trait]
impl CalibrationApi for CalibrationClient {
    async fn start(&self) -> Result<StartResponse> {
        self.request(Method::POST, START_PATH, None).await
    }

    async fn submit_frame(&self, image: &EncodedImage, camera_index: usize) -> Result<SubmitResponse> {
        let body = serde_json::to_value(FrameSubmission {
            image_data: &image.data_url,
            camera_index,
        })?;
        self.request(Method::POST, CAPTURE_PATH, Some(body)).await
    }

    async fn submit_extrinsic(
        &self,
        image: &EncodedImage,
        camera_indices: [usize; 2],
    ) -> Result<ExtrinsicResponse> {
        let body = serde_json::to_value(ExtrinsicSubmission {
            image_data: &image.data_url,
            camera_indices,
        })?;
        self.request(Method::POST, EXTRINSIC_PATH, Some(body)).await
    }

    async fn query_status(&self) -> Result<CalibrationJob> {
        let job: CalibrationJob = self.request(Method::GET, STATUS_PATH, None).await?;
        Ok(job.normalized())
    }

    async fn stop(&self) -> Result<StopResponse> {
        self.request(Method::POST, STOP_PATH, None).await
    }
}

/// Best message from an error body: a JSON `message`/`error` field, else the
/// raw text, else the status reason.
fn remote_message(status: StatusCode, body: &str) -> String {
    let from_json = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            ["message", "error"]
                .iter()
                .find_map(|key| v.get(key).and_then(|m| m.as_str()).map(str::to_string))
        });

    let text = from_json.unwrap_or_else(|| body.trim().to_string());
    if text.is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string();
    }
    if text.chars().count() > MAX_MESSAGE_LEN {
        let truncated: String = text.chars().take(MAX_MESSAGE_LEN).collect();
        format!("{}...", truncated)
    } else {
        text
    }
}
