//! Wire types for the SparkPost transmission and preview endpoints.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Body of `POST /transmissions`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transmission {
    pub content: Content,
    pub recipients: Vec<TransmissionRecipient>,
    pub inline_css: Option<bool>,
    pub tags: Vec<String>,
    pub campaign_id: String,
    pub options: TrackingOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Content {
    pub from: String,
    pub subject: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub inline_images: Vec<EncodedFile>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<EncodedFile>,
}

/// An inline image or attachment; `data` is base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncodedFile {
    #[serde(rename = "type")]
    pub content_type: String,
    pub name: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransmissionRecipient {
    pub address: RecipientAddress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header_to: Option<String>,
    /// Always present, copies included; `{}` when there is nothing to substitute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub substitution_data: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecipientAddress {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrackingOptions {
    pub open_tracking: bool,
    pub click_tracking: bool,
}

impl Default for TrackingOptions {
    fn default() -> Self {
        Self {
            open_tracking: false,
            click_tracking: false,
        }
    }
}

/// Body of `POST /utils/content-previewer`: the transmission without its
/// recipient list, with the first recipient's substitution data inlined.
#[derive(Debug, Clone, Serialize)]
pub struct Preview<'a> {
    pub content: &'a Content,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub substitution_data: Option<&'a Map<String, Value>>,
    pub inline_css: Option<bool>,
    pub tags: &'a [String],
    pub campaign_id: &'a str,
    pub options: TrackingOptions,
}

impl<'a> Preview<'a> {
    #[must_use]
    pub fn from_transmission(transmission: &'a Transmission) -> Self {
        Self {
            content: &transmission.content,
            substitution_data: transmission
                .recipients
                .first()
                .and_then(|r| r.substitution_data.as_ref()),
            inline_css: transmission.inline_css,
            tags: &transmission.tags,
            campaign_id: &transmission.campaign_id,
            options: transmission.options,
        }
    }
}
