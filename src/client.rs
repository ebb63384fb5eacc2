//! HTTP client for the SparkPost REST API.

use crate::error::{Error, Result};
use crate::payload::{Preview, Transmission};
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// SparkPost account region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Region {
    #[default]
    Us,
    Eu,
}

impl Region {
    /// Region by name; anything unknown falls back to `us`.
    #[must_use]
    pub fn from_name(name: Option<&str>) -> Self {
        match name.map(|n| n.trim().to_ascii_lowercase()).as_deref() {
            Some("eu") => Self::Eu,
            _ => Self::Us,
        }
    }

    #[must_use]
    pub const fn host(self) -> &'static str {
        match self {
            Self::Us => "api.sparkpost.com",
            Self::Eu => "api.eu.sparkpost.com",
        }
    }
}

/// Connection settings for the SparkPost API.
#[derive(Debug, Clone)]
pub struct SparkpostConfig {
    pub api_key: String,
    pub region: Region,
    /// Overrides the region host, e.g. `http://127.0.0.1:8080/api/v1`
    pub base_url: Option<String>,
    pub timeout: Duration,
}

impl Default for SparkpostConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            region: Region::Us,
            base_url: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl SparkpostConfig {
    /// API root all endpoint paths are appended to.
    #[must_use]
    pub fn endpoint(&self) -> String {
        self.base_url.as_deref().map_or_else(
            || format!("https://{}/api/v1", self.region.host()),
            |url| url.trim_end_matches('/').to_string(),
        )
    }
}

/// `results` of an accepted transmission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TransmissionResults {
    #[serde(default)]
    pub total_accepted_recipients: usize,
    #[serde(default)]
    pub total_rejected_recipients: usize,
    #[serde(default)]
    pub id: Option<String>,
}

/// One entry of the vendor's `errors` array.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct VendorError {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub code: Option<Value>,
}

/// Parsed response body shared by the transmission and preview endpoints.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ResponseBody {
    #[serde(default)]
    pub results: Option<TransmissionResults>,
    #[serde(default)]
    pub errors: Vec<VendorError>,
}

impl ResponseBody {
    /// Error text of the first error. The field was renamed from
    /// `description` to `message` at some point; `description` wins.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        let first = self.errors.first()?;
        first
            .description
            .as_deref()
            .or(first.message.as_deref())
    }

    /// Numeric code of the first error, sent either as number or string.
    #[must_use]
    pub fn error_code(&self) -> Option<i64> {
        match self.errors.first()?.code.as_ref()? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Status code plus parsed body of a vendor call.
#[derive(Debug, Clone)]
pub struct VendorResponse {
    pub status: u16,
    pub body: ResponseBody,
    pub raw: String,
}

impl VendorResponse {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Thin client over the two endpoints the transport needs.
#[derive(Debug, Clone)]
pub struct SparkpostClient {
    http: Client,
    endpoint: String,
    api_key: String,
}

impl SparkpostClient {
    pub fn new(config: &SparkpostConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("sparkpost-relay/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            http,
            endpoint: config.endpoint(),
            api_key: config.api_key.clone(),
        })
    }

    /// `POST /transmissions`
    pub async fn post_transmission(&self, transmission: &Transmission) -> Result<VendorResponse> {
        self.post("transmissions", transmission).await
    }

    /// `POST /utils/content-previewer`
    pub async fn preview(&self, preview: &Preview<'_>) -> Result<VendorResponse> {
        self.post("utils/content-previewer", preview).await
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<VendorResponse> {
        let url = format!("{}/{path}", self.endpoint);
        debug!("POST {url}");

        let response = self
            .http
            .post(&url)
            .header(AUTHORIZATION, &self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let raw = response.text().await?;
        let body = serde_json::from_str(&raw).unwrap_or_else(|e| {
            debug!("Unparsable response body from {url} (HTTP {status}): {e}");
            ResponseBody::default()
        });

        debug!("HTTP {status} from {url}");
        Ok(VendorResponse { status, body, raw })
    }
}

impl From<&VendorResponse> for Error {
    fn from(response: &VendorResponse) -> Self {
        let message = response
            .body
            .error_message()
            .map_or_else(|| response.raw.chars().take(200).collect(), String::from);
        Self::Vendor {
            status: response.status,
            message,
        }
    }
}
