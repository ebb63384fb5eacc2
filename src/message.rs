//! Outbound message model and per-recipient metadata.

use crate::error::ValidationError;
use lettre::message::Mailbox;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A single mailbox: an address with an optional display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Recipient {
    /// Parse `"Name <user@example.com>"` or a bare address.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let mailbox: Mailbox = raw
            .trim()
            .parse()
            .map_err(|_| ValidationError::InvalidAddress(raw.to_string()))?;
        Ok(Self {
            email: mailbox.email.to_string(),
            name: mailbox.name.filter(|n| !n.is_empty()),
        })
    }

    /// Render as `"Name <email>"` when a name is set, else the bare email.
    #[must_use]
    pub fn display(&self) -> String {
        match &self.name {
            Some(name) => format!("{name} <{}>", self.email),
            None => self.email.clone(),
        }
    }
}

/// A file attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: String,
    pub content: Vec<u8>,
    /// Embedded image referenced from the HTML body by content id
    pub inline: bool,
    pub content_id: Option<String>,
}

impl Attachment {
    /// The id an inline image is referenced by; falls back to the file name.
    #[must_use]
    pub fn cid(&self) -> &str {
        self.content_id.as_deref().unwrap_or(&self.file_name)
    }
}

/// UTM tags attached to a campaign email.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UtmTags {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_medium: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_campaign: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_content: Option<String>,
}

/// Sending metadata for one recipient.
///
/// Everything except `tokens` is forwarded to the vendor as recipient
/// metadata and comes back in delivery callbacks as `rcpt_meta`, hence the
/// camelCase keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientMetadata {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tokens: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash_id: Option<String>,
    /// Contact identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lead_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_tags: Option<UtmTags>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RecipientMetadata {
    /// Metadata as sent to the vendor: everything but the tokens.
    /// `None` when nothing is left.
    #[must_use]
    pub fn vendor_metadata(&self) -> Option<Map<String, Value>> {
        let Ok(Value::Object(mut map)) = serde_json::to_value(self) else {
            return None;
        };
        map.remove("tokens");
        (!map.is_empty()).then_some(map)
    }
}

/// An email ready to be handed to a transport.
#[derive(Debug, Clone, Default)]
pub struct Message {
    pub subject: String,
    pub html: Option<String>,
    pub text: Option<String>,
    pub from: Option<Recipient>,
    pub reply_to: Option<Recipient>,
    pub to: Vec<Recipient>,
    pub cc: Vec<Recipient>,
    pub bcc: Vec<Recipient>,
    /// Header name/value pairs in insertion order
    pub headers: Vec<(String, String)>,
    pub attachments: Vec<Attachment>,
    metadata: Vec<(String, RecipientMetadata)>,
}

impl Message {
    /// Start building a message.
    #[must_use]
    pub fn builder() -> MessageBuilder {
        MessageBuilder::default()
    }

    /// Case-insensitive header lookup.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Attach sending metadata to a recipient, replacing any previous entry.
    pub fn add_metadata(&mut self, email: &str, metadata: RecipientMetadata) {
        let key = email.trim().to_lowercase();
        if let Some(slot) = self.metadata.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = metadata;
        } else {
            self.metadata.push((key, metadata));
        }
    }

    /// All metadata entries, in insertion order.
    #[must_use]
    pub fn metadata(&self) -> &[(String, RecipientMetadata)] {
        &self.metadata
    }

    /// Metadata of a single recipient.
    #[must_use]
    pub fn metadata_for(&self, email: &str) -> Option<&RecipientMetadata> {
        let key = email.trim().to_lowercase();
        self.metadata.iter().find(|(k, _)| *k == key).map(|(_, m)| m)
    }

    /// The first metadata entry added.
    #[must_use]
    pub fn first_metadata(&self) -> Option<&RecipientMetadata> {
        self.metadata.first().map(|(_, m)| m)
    }

    pub fn clear_metadata(&mut self) {
        self.metadata.clear();
    }

    pub fn add_attachment(&mut self, attachment: Attachment) {
        self.attachments.push(attachment);
    }

    pub fn clear_attachments(&mut self) {
        self.attachments.clear();
    }
}

/// Builder collecting raw addresses; they are parsed in [`MessageBuilder::build`].
#[derive(Debug, Default)]
pub struct MessageBuilder {
    subject: String,
    html: Option<String>,
    text: Option<String>,
    from: Option<String>,
    reply_to: Option<String>,
    to: Vec<String>,
    cc: Vec<String>,
    bcc: Vec<String>,
    headers: Vec<(String, String)>,
    attachments: Vec<Attachment>,
}

impl MessageBuilder {
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    #[must_use]
    pub fn html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    #[must_use]
    pub fn from(mut self, addr: impl Into<String>) -> Self {
        self.from = Some(addr.into());
        self
    }

    #[must_use]
    pub fn reply_to(mut self, addr: impl Into<String>) -> Self {
        self.reply_to = Some(addr.into());
        self
    }

    #[must_use]
    pub fn to(mut self, addr: impl Into<String>) -> Self {
        self.to.push(addr.into());
        self
    }

    #[must_use]
    pub fn cc(mut self, addr: impl Into<String>) -> Self {
        self.cc.push(addr.into());
        self
    }

    #[must_use]
    pub fn bcc(mut self, addr: impl Into<String>) -> Self {
        self.bcc.push(addr.into());
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Parse every address and produce the message.
    pub fn build(self) -> Result<Message, ValidationError> {
        let parse_all = |list: Vec<String>| -> Result<Vec<Recipient>, ValidationError> {
            list.iter().map(|a| Recipient::parse(a)).collect()
        };

        Ok(Message {
            subject: self.subject,
            html: self.html,
            text: self.text,
            from: self.from.as_deref().map(Recipient::parse).transpose()?,
            reply_to: self.reply_to.as_deref().map(Recipient::parse).transpose()?,
            to: parse_all(self.to)?,
            cc: parse_all(self.cc)?,
            bcc: parse_all(self.bcc)?,
            headers: self.headers,
            attachments: self.attachments,
            metadata: Vec::new(),
        })
    }
}
