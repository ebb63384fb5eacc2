//! SparkPost email transport with a delivery-callback relay.
//!
//! The library translates [`Message`]s into SparkPost transmissions, validates
//! templates, submits them and turns SparkPost webhook batches into
//! do-not-contact updates. [`start_relay`] serves the webhook and the batch
//! segment endpoints over HTTP.

mod callback;
mod client;
mod contact;
mod error;
mod http;
mod message;
mod payload;
mod preview;
mod segment;
mod translate;
mod transport;

pub use callback::{
    classify, process_callback, CallbackTransport, DeliveryEventKind, MalformedEntry,
    SparkpostWebhook, StatusUpdate, HARD_BOUNCE_CLASSES,
};
pub use client::{
    Region, ResponseBody, SparkpostClient, SparkpostConfig, TransmissionResults, VendorError,
    VendorResponse,
};
pub use contact::{ContactRef, ContactStatus, DncEntry, DncLedger, DncReason};
pub use error::{Error, Result, ValidationError};
pub use message::{Attachment, Message, MessageBuilder, Recipient, RecipientMetadata, UtmTags};
pub use payload::{
    Content, EncodedFile, Preview, RecipientAddress, TrackingOptions, Transmission,
    TransmissionRecipient,
};
pub use preview::check_template;
pub use segment::{
    apply_batch, batch_view, BatchResponse, BatchSegmentForm, BatchSegmentRequest, BatchView,
    FlashLevel, FlashMessage, SegmentActions, SegmentBook, SegmentSummary,
};
pub use translate::{
    build_transmission, campaign_id, substitution_variable, MergeVars, INLINE_CSS_HEADER,
    TAGS_HEADER,
};
pub use transport::{
    RecipientKind, SendEvent, SendListener, SendResult, SparkpostTransport, Transport,
};

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

/// Configuration options for the relay server.
#[derive(Debug, Clone, Default)]
pub struct RelayOptions {
    pub http_port: Option<u16>,
    pub bind_address: Option<String>,
    /// Segments offered in the batch form
    pub segments: Vec<SegmentSummary>,
}

/// Running server handle.
pub struct RunningRelay {
    pub http_addr: SocketAddr,
    pub ledger: Arc<DncLedger>,
    pub segments: Arc<SegmentBook>,
    http_handle: tokio::task::JoinHandle<()>,
    shutdown_tx: broadcast::Sender<()>,
}

impl RunningRelay {
    /// Stop the server gracefully.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.http_handle.await;
    }
}

/// Start the relay with the given options.
pub async fn start_relay(opts: RelayOptions) -> std::io::Result<RunningRelay> {
    let http_port = opts.http_port.unwrap_or(8080);
    let bind_address = opts.bind_address.unwrap_or_else(|| "0.0.0.0".to_string());

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let ledger = Arc::new(DncLedger::new());
    let segments = Arc::new(SegmentBook::new(opts.segments));
    let contacts: Arc<dyn ContactStatus> = ledger.clone();

    let http_listener = TcpListener::bind((bind_address.as_str(), http_port)).await?;
    let http_addr = http_listener.local_addr()?;

    tracing::info!(
        "HTTP server listening on {http_addr}, webhook at /mailer/{}/callback",
        SparkpostWebhook::CALLBACK_PATH
    );

    let state = http::AppState {
        callbacks: Arc::new(SparkpostWebhook::new(contacts)),
        ledger: Arc::clone(&ledger),
        segments: segments.clone(),
    };

    let http_shutdown = shutdown_tx.subscribe();
    let http_handle = tokio::spawn(async move {
        http::run_http_server(http_listener, state, http_shutdown).await;
    });

    Ok(RunningRelay {
        http_addr,
        ledger,
        segments,
        http_handle,
        shutdown_tx,
    })
}
