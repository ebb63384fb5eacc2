//! Translation of a [`Message`] into a SparkPost transmission.
//!
//! Tokens such as `{contactfield=firstname}` are rewritten to the vendor's
//! triple-brace placeholders (`{{{ CONTACTFIELDFIRSTNAME }}}`) so values are
//! substituted unescaped, and each recipient gets the matching
//! `substitution_data`.

use crate::error::ValidationError;
use crate::message::{Attachment, Message, Recipient, RecipientMetadata};
use crate::payload::{
    Content, EncodedFile, RecipientAddress, TrackingOptions, Transmission, TransmissionRecipient,
};
use base64::prelude::*;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

/// Header toggling CSS inlining on the vendor side.
pub const INLINE_CSS_HEADER: &str = "X-MC-InlineCSS";
/// Comma-separated transmission tags.
pub const TAGS_HEADER: &str = "X-MC-Tags";

const CAMPAIGN_ID_MAX_BYTES: usize = 64;

/// Substitution variable for a token: ASCII alphanumerics only, uppercased.
#[must_use]
pub fn substitution_variable(token: &str) -> String {
    token
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Token → substitution variable mapping shared by the whole transmission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeVars {
    // Longest token first so overlapping tokens rewrite greedily.
    vars: Vec<(String, String)>,
}

impl MergeVars {
    /// Build the mapping, rejecting tokens that would share a variable.
    pub fn from_tokens<'a, I>(tokens: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut seen: BTreeMap<String, &str> = BTreeMap::new();
        let mut vars = Vec::new();

        for token in tokens {
            let variable = substitution_variable(token);
            if variable.is_empty() {
                return Err(ValidationError::EmptyTokenName(token.clone()));
            }
            if let Some(first) = seen.get(&variable) {
                return Err(ValidationError::AmbiguousToken {
                    first: (*first).to_string(),
                    second: token.clone(),
                    variable,
                });
            }
            seen.insert(variable.clone(), token);
            vars.push((token.clone(), variable));
        }

        vars.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        Ok(Self { vars })
    }

    /// Variable name for a token, if it belongs to the set.
    #[must_use]
    pub fn variable(&self, token: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(t, _)| t == token)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Replace every literal token with its `{{{ VAR }}}` placeholder.
    #[must_use]
    pub fn rewrite(&self, input: &str) -> String {
        if self.vars.is_empty() {
            return input.to_string();
        }

        let mut out = String::with_capacity(input.len());
        let mut rest = input;
        'scan: while let Some(c) = rest.chars().next() {
            for (token, variable) in &self.vars {
                if rest.starts_with(token.as_str()) {
                    out.push_str("{{{ ");
                    out.push_str(variable);
                    out.push_str(" }}}");
                    rest = &rest[token.len()..];
                    continue 'scan;
                }
            }
            out.push(c);
            rest = &rest[c.len_utf8()..];
        }
        out
    }

    /// Substitution data for one recipient, keyed by variable name.
    fn substitution_data(&self, metadata: Option<&RecipientMetadata>) -> Map<String, Value> {
        let mut data = Map::new();
        let Some(metadata) = metadata else {
            return data;
        };
        for (token, value) in &metadata.tokens {
            match self.variable(token) {
                Some(variable) => {
                    data.insert(variable.to_string(), Value::String(value.clone()));
                }
                None => debug!("Token {token} is not in the transmission token set, skipping"),
            }
        }
        data
    }
}

/// Campaign id from a metadata sample: UTM campaign, then `emailId:emailName`,
/// then `emailId`; at most 64 bytes.
#[must_use]
pub fn campaign_id(metadata: &RecipientMetadata) -> String {
    let utm_campaign = metadata
        .utm_tags
        .as_ref()
        .and_then(|t| t.utm_campaign.as_deref())
        .filter(|c| !c.is_empty());
    let email_id = metadata.email_id.filter(|id| *id != 0);
    let email_name = metadata.email_name.as_deref().filter(|n| !n.is_empty());

    let id = match (utm_campaign, email_id, email_name) {
        (Some(campaign), _, _) => campaign.to_string(),
        (None, Some(id), Some(name)) => format!("{id}:{name}"),
        (None, Some(id), None) => id.to_string(),
        (None, None, _) => String::new(),
    };
    truncate_on_char_boundary(id, CAMPAIGN_ID_MAX_BYTES)
}

fn truncate_on_char_boundary(mut s: String, max: usize) -> String {
    if s.len() > max {
        let mut cut = max;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
    }
    s
}

fn truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn encode(attachment: &Attachment, name: &str) -> EncodedFile {
    EncodedFile {
        content_type: attachment.content_type.clone(),
        name: name.to_string(),
        data: BASE64_STANDARD.encode(&attachment.content),
    }
}

/// Build the transmission payload for a message. No network access.
pub fn build_transmission(message: &Message) -> Result<Transmission, ValidationError> {
    let sample = message.first_metadata();
    let merge_vars = match sample {
        Some(metadata) => MergeVars::from_tokens(metadata.tokens.keys())?,
        None => MergeVars::default(),
    };
    let campaign_id = sample.map(campaign_id).unwrap_or_default();

    let subject = merge_vars.rewrite(&message.subject);
    if subject.is_empty() {
        return Err(ValidationError::MissingSubject);
    }

    let inline_css = message.header(INLINE_CSS_HEADER).map(truthy);
    let tags: Vec<String> = message
        .header(TAGS_HEADER)
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();
    let headers: BTreeMap<String, String> = message
        .headers
        .iter()
        .filter(|(name, _)| {
            !name.eq_ignore_ascii_case(INLINE_CSS_HEADER) && !name.eq_ignore_ascii_case(TAGS_HEADER)
        })
        .map(|(name, value)| (name.clone(), merge_vars.rewrite(value)))
        .collect();

    let mut recipients = Vec::new();
    for to in &message.to {
        let metadata = message.metadata_for(&to.email);
        let substitution_data = merge_vars.substitution_data(metadata);

        // Copies are sent as extra recipients that keep the primary's To header.
        let copies: Vec<TransmissionRecipient> = message
            .cc
            .iter()
            .chain(&message.bcc)
            .map(|copy| TransmissionRecipient {
                address: RecipientAddress {
                    email: copy.email.clone(),
                    name: None,
                },
                header_to: Some(to.email.clone()),
                substitution_data: Some(substitution_data.clone()),
                metadata: None,
            })
            .collect();

        recipients.push(TransmissionRecipient {
            address: RecipientAddress {
                email: to.email.clone(),
                name: to.name.clone(),
            },
            header_to: None,
            substitution_data: Some(substitution_data),
            metadata: metadata.and_then(RecipientMetadata::vendor_metadata),
        });
        recipients.extend(copies);
    }

    let mut inline_images = Vec::new();
    let mut attachments = Vec::new();
    for attachment in &message.attachments {
        if attachment.inline {
            inline_images.push(encode(attachment, attachment.cid()));
        } else {
            attachments.push(encode(attachment, &attachment.file_name));
        }
    }

    let content = Content {
        from: message
            .from
            .as_ref()
            .map(Recipient::display)
            .unwrap_or_default(),
        subject,
        headers,
        html: message
            .html
            .as_deref()
            .filter(|h| !h.is_empty())
            .map(|h| merge_vars.rewrite(h)),
        text: message
            .text
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(|t| merge_vars.rewrite(t)),
        reply_to: message.reply_to.as_ref().map(|r| r.email.clone()),
        inline_images,
        attachments,
    };

    debug!(
        "Built transmission with {} recipients, {} attachments, {} inline images",
        recipients.len(),
        content.attachments.len(),
        content.inline_images.len()
    );

    Ok(Transmission {
        content,
        recipients,
        inline_css,
        tags,
        campaign_id,
        options: TrackingOptions::default(),
    })
}
