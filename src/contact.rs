//! Contact-status collaborator: where delivery failures end up.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};
use tracing::info;

/// Why a contact should no longer be emailed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DncReason {
    Unsubscribed,
    #[default]
    Bounced,
    Manual,
}

/// How a failure identifies the contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ContactRef {
    /// Vendor-assigned per-send hash id
    HashId(String),
    Address(String),
    ContactId(u64),
}

/// Records delivery failures against contacts.
pub trait ContactStatus: Send + Sync {
    fn add_failure_by_hash_id(
        &self,
        hash_id: &str,
        comments: &str,
        reason: DncReason,
        email_id: Option<u64>,
    );

    fn add_failure_by_address(
        &self,
        email: &str,
        comments: &str,
        reason: DncReason,
        email_id: Option<u64>,
    );

    fn add_failure_by_contact_id(
        &self,
        contact_id: u64,
        comments: &str,
        reason: DncReason,
        email_id: Option<u64>,
    );

    /// Dispatch on the kind of reference.
    fn add_failure(
        &self,
        target: &ContactRef,
        comments: &str,
        reason: DncReason,
        email_id: Option<u64>,
    ) {
        match target {
            ContactRef::HashId(hash_id) => {
                self.add_failure_by_hash_id(hash_id, comments, reason, email_id);
            }
            ContactRef::Address(email) => {
                self.add_failure_by_address(email, comments, reason, email_id);
            }
            ContactRef::ContactId(id) => {
                self.add_failure_by_contact_id(*id, comments, reason, email_id);
            }
        }
    }
}

/// A recorded do-not-contact entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DncEntry {
    pub target: ContactRef,
    pub comments: String,
    pub reason: DncReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_id: Option<u64>,
    pub date_added: DateTime<Utc>,
}

/// Thread-safe in-memory ledger of do-not-contact entries.
#[derive(Debug, Default)]
pub struct DncLedger {
    entries: RwLock<Vec<DncEntry>>,
}

impl DncLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded entries, oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<DncEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn record(&self, target: ContactRef, comments: &str, reason: DncReason, email_id: Option<u64>) {
        info!("Marking {target:?} as do-not-contact ({reason:?}): {comments}");
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(DncEntry {
                target,
                comments: comments.to_string(),
                reason,
                email_id,
                date_added: Utc::now(),
            });
    }
}

impl ContactStatus for DncLedger {
    fn add_failure_by_hash_id(
        &self,
        hash_id: &str,
        comments: &str,
        reason: DncReason,
        email_id: Option<u64>,
    ) {
        self.record(ContactRef::HashId(hash_id.to_string()), comments, reason, email_id);
    }

    fn add_failure_by_address(
        &self,
        email: &str,
        comments: &str,
        reason: DncReason,
        email_id: Option<u64>,
    ) {
        self.record(
            ContactRef::Address(email.trim().to_lowercase()),
            comments,
            reason,
            email_id,
        );
    }

    fn add_failure_by_contact_id(
        &self,
        contact_id: u64,
        comments: &str,
        reason: DncReason,
        email_id: Option<u64>,
    ) {
        self.record(ContactRef::ContactId(contact_id), comments, reason, email_id);
    }
}
