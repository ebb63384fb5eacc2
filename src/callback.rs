//! Classification of SparkPost webhook batches into contact-status updates.
//!
//! A batch is a JSON array of envelopes shaped
//! `{"msys": {"message_event": {...}}}` or `{"msys": {"unsubscribe_event": {...}}}`.
//! Entries that cannot be understood are skipped; the rest of the batch is
//! still processed.

use crate::contact::{ContactRef, ContactStatus, DncReason};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Bounce classes treated as permanent failures. Everything else is a soft
/// bounce and ignored.
pub const HARD_BOUNCE_CLASSES: [u64; 8] = [10, 30, 50, 51, 52, 53, 54, 90];

/// Event types carried by a delivery callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryEventKind {
    Bounce,
    SpamComplaint,
    OutOfBand,
    PolicyRejection,
    ListUnsubscribe,
    LinkUnsubscribe,
    Other,
}

impl DeliveryEventKind {
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "bounce" => Self::Bounce,
            "spam_complaint" => Self::SpamComplaint,
            "out_of_band" => Self::OutOfBand,
            "policy_rejection" => Self::PolicyRejection,
            "list_unsubscribe" => Self::ListUnsubscribe,
            "link_unsubscribe" => Self::LinkUnsubscribe,
            _ => Self::Other,
        }
    }
}

/// What a single callback entry asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub target: ContactRef,
    pub comments: String,
    pub reason: DncReason,
}

/// Why an entry was skipped as malformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedEntry(&'static str);

impl fmt::Display for MalformedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed callback entry: {}", self.0)
    }
}

impl std::error::Error for MalformedEntry {}

fn str_field<'a>(event: &'a Value, key: &'static str) -> Result<&'a str, MalformedEntry> {
    event
        .get(key)
        .and_then(Value::as_str)
        .ok_or(MalformedEntry(key))
}

fn bounce_class(event: &Value) -> Result<u64, MalformedEntry> {
    match event.get("bounce_class") {
        Some(Value::Number(n)) => n.as_u64().ok_or(MalformedEntry("bounce_class")),
        Some(Value::String(s)) => s.trim().parse().map_err(|_| MalformedEntry("bounce_class")),
        _ => Err(MalformedEntry("bounce_class")),
    }
}

/// Classify one envelope. `Ok(None)` means the entry is valid but needs no action.
pub fn classify(envelope: &Value) -> Result<Option<StatusUpdate>, MalformedEntry> {
    let msys = envelope.get("msys").ok_or(MalformedEntry("msys"))?;
    let Some(event) = msys
        .get("message_event")
        .or_else(|| msys.get("unsubscribe_event"))
    else {
        return Ok(None);
    };

    // Copies delivered to cc/bcc carry no contact of their own.
    if let Some(rcpt_type) = event.get("rcpt_type").and_then(Value::as_str) {
        if rcpt_type != "to" {
            return Ok(None);
        }
    }

    let kind = DeliveryEventKind::from_name(str_field(event, "type")?);
    if kind == DeliveryEventKind::Other {
        return Ok(None);
    }
    if kind == DeliveryEventKind::Bounce && !HARD_BOUNCE_CLASSES.contains(&bounce_class(event)?) {
        return Ok(None);
    }

    let hash_id = event
        .get("rcpt_meta")
        .and_then(|meta| meta.get("hashId"))
        .and_then(Value::as_str)
        .filter(|h| !h.is_empty());
    let target = match hash_id {
        Some(hash_id) => ContactRef::HashId(hash_id.to_string()),
        None => ContactRef::Address(str_field(event, "rcpt_to")?.to_string()),
    };

    let (comments, reason) = match kind {
        DeliveryEventKind::Bounce
        | DeliveryEventKind::OutOfBand
        | DeliveryEventKind::PolicyRejection => {
            (str_field(event, "raw_reason")?.to_string(), DncReason::Bounced)
        }
        DeliveryEventKind::SpamComplaint => {
            (str_field(event, "fbtype")?.to_string(), DncReason::Unsubscribed)
        }
        DeliveryEventKind::ListUnsubscribe | DeliveryEventKind::LinkUnsubscribe => {
            ("unsubscribed".to_string(), DncReason::Unsubscribed)
        }
        DeliveryEventKind::Other => return Ok(None),
    };

    Ok(Some(StatusUpdate {
        target,
        comments,
        reason,
    }))
}

/// Classify a whole batch and apply the updates. Returns how many were applied.
pub fn process_callback(payload: &Value, contacts: &dyn ContactStatus) -> usize {
    let Some(entries) = payload.as_array() else {
        warn!("Ignoring callback payload that is not a JSON array");
        return 0;
    };

    let mut applied = 0;
    for (index, entry) in entries.iter().enumerate() {
        match classify(entry) {
            Ok(Some(update)) => {
                contacts.add_failure(&update.target, &update.comments, update.reason, None);
                applied += 1;
            }
            Ok(None) => debug!("Callback entry {index} needs no action"),
            Err(e) => debug!("Skipping callback entry {index}: {e}"),
        }
    }

    info!("Processed callback batch: {applied} of {} entries applied", entries.len());
    applied
}

/// A transport that accepts delivery callbacks at `/mailer/{path}/callback`.
pub trait CallbackTransport: Send + Sync {
    fn callback_path(&self) -> &str;

    /// Process a callback body; returns the number of status updates applied.
    fn process_callback(&self, payload: &Value) -> usize;
}

/// Webhook side of the SparkPost transport.
#[derive(Clone)]
pub struct SparkpostWebhook {
    contacts: Arc<dyn ContactStatus>,
}

impl SparkpostWebhook {
    pub const CALLBACK_PATH: &'static str = "sparkpost";

    #[must_use]
    pub fn new(contacts: Arc<dyn ContactStatus>) -> Self {
        Self { contacts }
    }
}

impl CallbackTransport for SparkpostWebhook {
    fn callback_path(&self) -> &str {
        Self::CALLBACK_PATH
    }

    fn process_callback(&self, payload: &Value) -> usize {
        process_callback(payload, self.contacts.as_ref())
    }
}
