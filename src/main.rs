//! CLI entry point for sparkpost-relay.

use clap::{Args, Parser, Subcommand};
use sparkpost_relay::{
    start_relay, Attachment, DncLedger, Message, Region, RelayOptions, SegmentSummary,
    SparkpostConfig, SparkpostTransport, Transport,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sparkpost-relay")]
#[command(about = "Send email through SparkPost and relay its delivery callbacks")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the webhook and batch segment endpoints
    Serve(ServeArgs),
    /// Send one message through SparkPost
    Send(SendArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// HTTP port to listen on
    #[arg(short = 'p', long, env = "RELAY_HTTP_PORT", default_value = "8080")]
    http_port: u16,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// Segment offered in the batch form, as `id:name` (repeatable)
    #[arg(long = "segment", value_parser = parse_segment)]
    segments: Vec<SegmentSummary>,
}

#[derive(Args, Debug)]
struct SendArgs {
    /// SparkPost API key
    #[arg(long, env = "SPARKPOST_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Account region (us or eu)
    #[arg(long, env = "SPARKPOST_REGION")]
    region: Option<String>,

    /// Override the API root, e.g. for a proxy
    #[arg(long, env = "SPARKPOST_BASE_URL")]
    base_url: Option<String>,

    /// Request timeout in seconds
    #[arg(long, default_value = "30")]
    timeout: u64,

    #[arg(long)]
    from: String,

    #[arg(long, required = true)]
    to: Vec<String>,

    #[arg(long)]
    cc: Vec<String>,

    #[arg(long)]
    bcc: Vec<String>,

    #[arg(long)]
    reply_to: Option<String>,

    #[arg(short = 's', long)]
    subject: String,

    /// File holding the HTML body
    #[arg(long)]
    html: Option<String>,

    /// File holding the plain-text body
    #[arg(long)]
    text: Option<String>,

    /// Extra header as `Name: value` (repeatable)
    #[arg(long = "header", value_parser = parse_header)]
    headers: Vec<(String, String)>,

    /// File to attach, optionally as `path:content/type` (repeatable)
    #[arg(long = "attach")]
    attachments: Vec<String>,
}

fn parse_segment(raw: &str) -> Result<SegmentSummary, String> {
    let (id, name) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected id:name, got {raw}"))?;
    Ok(SegmentSummary {
        id: id.trim().parse().map_err(|e| format!("bad segment id {id}: {e}"))?,
        name: name.trim().to_string(),
    })
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected 'Name: value', got {raw}"))?;
    Ok((name.trim().to_string(), value.trim().to_string()))
}

async fn load_attachment(arg: &str) -> std::io::Result<Attachment> {
    let (path, content_type) = match arg.rsplit_once(':') {
        Some((path, ct)) if ct.contains('/') => (path, ct.to_string()),
        _ => (arg, "application/octet-stream".to_string()),
    };
    let content = tokio::fs::read(path).await?;
    let file_name = Path::new(path)
        .file_name()
        .map_or_else(|| path.to_string(), |n| n.to_string_lossy().into_owned());

    Ok(Attachment {
        file_name,
        content_type,
        content,
        inline: false,
        content_id: None,
    })
}

async fn serve(args: ServeArgs) -> std::io::Result<()> {
    let relay = start_relay(RelayOptions {
        http_port: Some(args.http_port),
        bind_address: Some(args.bind),
        segments: args.segments,
    })
    .await?;

    // Wait for Ctrl+C
    tokio::signal::ctrl_c().await?;
    relay.stop().await;

    Ok(())
}

async fn send(args: SendArgs) -> std::io::Result<()> {
    let config = SparkpostConfig {
        api_key: args.api_key,
        region: Region::from_name(args.region.as_deref()),
        base_url: args.base_url,
        timeout: Duration::from_secs(args.timeout),
    };
    let ledger = Arc::new(DncLedger::new());
    let transport = SparkpostTransport::new(&config, ledger.clone())?;

    let mut builder = Message::builder()
        .from(args.from)
        .subject(args.subject);
    for addr in args.to {
        builder = builder.to(addr);
    }
    for addr in args.cc {
        builder = builder.cc(addr);
    }
    for addr in args.bcc {
        builder = builder.bcc(addr);
    }
    if let Some(addr) = args.reply_to {
        builder = builder.reply_to(addr);
    }
    if let Some(path) = args.html {
        builder = builder.html(tokio::fs::read_to_string(path).await?);
    }
    if let Some(path) = args.text {
        builder = builder.text(tokio::fs::read_to_string(path).await?);
    }
    for (name, value) in args.headers {
        builder = builder.header(name, value);
    }

    let mut message = builder
        .build()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    for arg in &args.attachments {
        message.add_attachment(load_attachment(arg).await?);
    }

    let accepted = transport.send(&mut message).await?;
    println!("Accepted recipients: {accepted}");

    for entry in ledger.entries() {
        println!("Do-not-contact: {:?} ({:?}) {}", entry.target, entry.reason, entry.comments);
    }

    Ok(())
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    match Cli::parse().command {
        Command::Serve(args) => serve(args).await,
        Command::Send(args) => send(args).await,
    }
}
