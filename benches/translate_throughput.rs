//! Translation throughput benchmarks.
//!
//! Run with: `cargo bench`

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sparkpost_relay::{build_transmission, Message, RecipientMetadata};
use std::collections::BTreeMap;

const HTML_BODY: &str = r#"
    <html>
    <body>
        <h1>Hello {contactfield=firstname}</h1>
        <p>Your account manager is {ownerfield=firstname} {ownerfield=lastname}.</p>
        <p>Visit <a href="{webview_url}">the web version</a> or
        <a href="{unsubscribe_url}">unsubscribe</a>.</p>
    </body>
    </html>
"#;

/// Build a message with merge tokens and `copies` cc recipients.
fn build_message(copies: usize) -> Message {
    let mut builder = Message::builder()
        .from("Sender <sender@example.com>")
        .to("Amy <amy@example.com>")
        .subject("Hello {contactfield=firstname}")
        .html(HTML_BODY)
        .text("Hello {contactfield=firstname}, see {webview_url}")
        .header("X-MC-Tags", "newsletter,weekly")
        .header("List-Unsubscribe", "<{unsubscribe_url}>");
    for i in 0..copies {
        builder = builder.cc(format!("copy{i}@example.com"));
    }
    let mut message = builder.build().unwrap();

    let tokens: BTreeMap<String, String> = [
        ("{contactfield=firstname}", "Amy"),
        ("{ownerfield=firstname}", "Owen"),
        ("{ownerfield=lastname}", "Stone"),
        ("{webview_url}", "https://example.com/view/abc"),
        ("{unsubscribe_url}", "https://example.com/unsub/abc"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    message.add_metadata(
        "amy@example.com",
        RecipientMetadata {
            tokens,
            hash_id: Some("abc".to_string()),
            lead_id: Some(42),
            email_id: Some(7),
            email_name: Some("Weekly".to_string()),
            ..Default::default()
        },
    );
    message
}

fn benchmark_build_transmission(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_transmission");

    for copies in [0_usize, 10, 100] {
        let message = build_message(copies);
        group.throughput(Throughput::Elements(copies as u64 + 1));
        group.bench_with_input(BenchmarkId::new("cc", copies), &message, |b, message| {
            b.iter(|| build_transmission(message).unwrap());
        });
    }

    group.finish();
}

fn benchmark_serialize_transmission(c: &mut Criterion) {
    let transmission = build_transmission(&build_message(10)).unwrap();

    c.bench_function("serialize_transmission", |b| {
        b.iter(|| serde_json::to_vec(&transmission).unwrap());
    });
}

criterion_group!(
    benches,
    benchmark_build_transmission,
    benchmark_serialize_transmission,
);
criterion_main!(benches);
