//! Send orchestration: the [`Transport`] capability and its SparkPost implementation.

use crate::callback::SparkpostWebhook;
use crate::client::{ResponseBody, SparkpostClient, SparkpostConfig};
use crate::contact::{ContactStatus, DncReason};
use crate::error::{Error, Result};
use crate::message::Message;
use crate::payload::Transmission;
use crate::preview::check_template;
use crate::translate::build_transmission;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Which recipient list an address is being added to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecipientKind {
    #[default]
    To,
    Cc,
    Bcc,
}

/// Something that can deliver a [`Message`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one message and return the number of accepted recipients.
    ///
    /// The message's recipient metadata is cleared once the attempt is over.
    async fn send(&self, message: &mut Message) -> Result<usize>;

    /// Largest number of recipients one send may carry.
    fn max_batch_limit(&self) -> usize;

    /// Recipients the message would have after adding `to_be_added` more.
    fn batch_recipient_count(
        &self,
        message: &Message,
        to_be_added: usize,
        kind: RecipientKind,
    ) -> usize;
}

/// Outcome reported to listeners after a send.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SendResult {
    #[default]
    Pending,
    Success,
    Failed,
}

/// What listeners see of a send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendEvent {
    pub subject: String,
    pub recipients: Vec<String>,
    pub result: SendResult,
}

impl SendEvent {
    fn for_message(message: &Message) -> Self {
        Self {
            subject: message.subject.clone(),
            recipients: message
                .to
                .iter()
                .chain(&message.cc)
                .chain(&message.bcc)
                .map(|r| r.email.clone())
                .collect(),
            result: SendResult::Pending,
        }
    }
}

/// Observer of sends. Returning `false` from `before_send` cancels the send.
pub trait SendListener: Send + Sync {
    fn before_send(&self, _event: &SendEvent) -> bool {
        true
    }

    fn send_performed(&self, _event: &SendEvent) {}
}

/// SparkPost error code for a recipient the vendor refuses outright.
const INVALID_RECIPIENT_CODE: i64 = 1902;

/// Transport submitting messages to the SparkPost transmissions API.
pub struct SparkpostTransport {
    client: SparkpostClient,
    contacts: Arc<dyn ContactStatus>,
    listeners: Vec<Arc<dyn SendListener>>,
}

impl SparkpostTransport {
    pub const MAX_BATCH_LIMIT: usize = 5000;

    /// Create the transport; an empty API key is a configuration error.
    pub fn new(config: &SparkpostConfig, contacts: Arc<dyn ContactStatus>) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(Error::Config("a SparkPost API key is required".to_string()));
        }

        Ok(Self {
            client: SparkpostClient::new(config)?,
            contacts,
            listeners: Vec::new(),
        })
    }

    /// Register a send listener.
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn SendListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// The callback side, sharing this transport's contact-status collaborator.
    #[must_use]
    pub fn webhook(&self) -> SparkpostWebhook {
        SparkpostWebhook::new(Arc::clone(&self.contacts))
    }

    async fn perform_send(&self, message: &Message) -> Result<usize> {
        let transmission = build_transmission(message)?;
        check_template(&self.client, &transmission).await?;

        let response = self.client.post_transmission(&transmission).await?;

        if let Some(vendor_message) = response.body.error_message() {
            error!(
                "SparkPost rejected transmission (HTTP {}): {vendor_message}",
                response.status
            );
            self.process_immediate_feedback(message, &transmission, &response.body);
            return Err(Error::Transport {
                message: vendor_message.to_string(),
                source: Some(Box::new(Error::from(&response))),
            });
        }

        if !response.is_success() {
            error!("SparkPost returned HTTP {} without an error body", response.status);
            return Err(Error::from(&response));
        }

        let results = response.body.results.unwrap_or_default();
        info!(
            "SparkPost accepted {} recipient(s), rejected {} (transmission {})",
            results.total_accepted_recipients,
            results.total_rejected_recipients,
            results.id.as_deref().unwrap_or("-")
        );
        Ok(results.total_accepted_recipients)
    }

    /// Record a bounce right away when the vendor rejects the first recipient inline.
    fn process_immediate_feedback(
        &self,
        message: &Message,
        transmission: &Transmission,
        body: &ResponseBody,
    ) {
        if body.error_code() != Some(INVALID_RECIPIENT_CODE) {
            return;
        }
        let Some(first) = transmission.recipients.first() else {
            return;
        };
        let Some(metadata) = message.metadata_for(&first.address.email) else {
            return;
        };
        let Some(contact_id) = metadata.lead_id else {
            return;
        };

        let comments = body.error_message().unwrap_or_default();
        debug!("Recording immediate bounce for contact {contact_id}");
        self.contacts.add_failure_by_contact_id(
            contact_id,
            comments,
            DncReason::Bounced,
            metadata.email_id.filter(|id| *id != 0),
        );
    }

    async fn dispatch(&self, message: &Message) -> Result<usize> {
        let mut event = SendEvent::for_message(message);

        if !self.listeners.iter().all(|l| l.before_send(&event)) {
            info!("Send of '{}' cancelled by a listener", message.subject);
            return Ok(0);
        }

        let accepted = self.perform_send(message).await.map_err(Error::transport)?;

        event.result = if accepted > 0 {
            SendResult::Success
        } else {
            SendResult::Failed
        };
        for listener in &self.listeners {
            listener.send_performed(&event);
        }

        Ok(accepted)
    }
}

#[async_trait]
impl Transport for SparkpostTransport {
    async fn send(&self, message: &mut Message) -> Result<usize> {
        let outcome = self.dispatch(message).await;
        message.clear_metadata();
        outcome
    }

    fn max_batch_limit(&self) -> usize {
        Self::MAX_BATCH_LIMIT
    }

    fn batch_recipient_count(
        &self,
        message: &Message,
        to_be_added: usize,
        _kind: RecipientKind,
    ) -> usize {
        message.to.len() + message.cc.len() + message.bcc.len() + to_be_added
    }
}
