//! Wire-level stream tests: bytes in, transcript out
//!
//! Chunk boundaries are chosen by the network, not the service, so the
//! transcript must not depend on where the body is split.

use bytes::Bytes;
use futures_util::stream;
use quickcheck::TestResult;
use quickcheck_macros::quickcheck;
use serde_json::json;

use ragbuddy::streaming::{frame_events, CompletionStream, NdjsonDecoder, SseDecoder};

fn sse_body(fragments: &[String]) -> Vec<u8> {
    let mut body = String::new();
    for fragment in fragments {
        let event = json!({ "choices": [{ "delta": { "content": fragment }, "finish_reason": null }] });
        body.push_str(&format!("data: {}\n\n", event));
    }
    body.push_str("data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n");
    body.push_str("data: [DONE]\n\n");
    body.into_bytes()
}

fn ndjson_body(fragments: &[String]) -> Vec<u8> {
    let mut body = String::new();
    for fragment in fragments {
        body.push_str(&json!({ "response": fragment, "done": false }).to_string());
        body.push('\n');
    }
    body.push_str("{\"response\":\"\",\"done\":true}\n");
    body.into_bytes()
}

/// A line no decoder can turn into a fragment, built from arbitrary text
fn bad_line(kind: usize, text: &str, prefix: &str) -> Vec<u8> {
    let text = text.replace(['\n', '\r'], " ");
    let mut line = prefix.as_bytes().to_vec();
    match kind % 3 {
        // stray closing brace
        0 => line.extend_from_slice(format!("}}{}", text).as_bytes()),
        // object that never closes
        1 => line.extend_from_slice(format!("{{\"response\":{}", json!(text)).as_bytes()),
        // not UTF-8
        _ => {
            line.push(0xFF);
            line.extend_from_slice(text.as_bytes());
        }
    }
    line.push(b'\n');
    line
}

/// Valid fragment lines with a bad line ahead of each, as far as `garbage` lasts
fn mixed_body(fragments: &[String], garbage: &[String], valid_line: impl Fn(&str) -> String, prefix: &str) -> Vec<u8> {
    let mut body = Vec::new();
    for (i, fragment) in fragments.iter().enumerate() {
        if let Some(text) = garbage.get(i) {
            body.extend(bad_line(i, text, prefix));
        }
        body.extend_from_slice(valid_line(fragment).as_bytes());
    }
    for (i, text) in garbage.iter().enumerate().skip(fragments.len()) {
        body.extend(bad_line(i, text, prefix));
    }
    body
}

/// Split `body` at the given byte offsets
fn chunk(body: &[u8], cuts: &[usize]) -> Vec<Result<Bytes, std::io::Error>> {
    let mut points: Vec<usize> = cuts
        .iter()
        .filter(|_| !body.is_empty())
        .map(|c| c % body.len())
        .collect();
    points.push(0);
    points.push(body.len());
    points.sort_unstable();
    points.dedup();

    points
        .windows(2)
        .map(|w| Ok(Bytes::copy_from_slice(&body[w[0]..w[1]])))
        .collect()
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

#[quickcheck]
fn prop_sse_transcript_ignores_chunking(fragments: Vec<String>, cuts: Vec<usize>) -> TestResult {
    if fragments.len() > 50 {
        return TestResult::discard();
    }

    let chunks = chunk(&sse_body(&fragments), &cuts);
    let events = frame_events(stream::iter(chunks), SseDecoder::new());
    let outcome = runtime().block_on(CompletionStream::new(events).collect_all());

    TestResult::from_bool(outcome.transcript == fragments.concat() && outcome.is_complete())
}

#[quickcheck]
fn prop_ndjson_transcript_ignores_chunking(fragments: Vec<String>, cuts: Vec<usize>) -> TestResult {
    if fragments.len() > 50 {
        return TestResult::discard();
    }

    let chunks = chunk(&ndjson_body(&fragments), &cuts);
    let events = frame_events(stream::iter(chunks), NdjsonDecoder::new());
    let outcome = runtime().block_on(CompletionStream::new(events).collect_all());

    TestResult::from_bool(outcome.transcript == fragments.concat() && outcome.is_complete())
}

#[quickcheck]
fn prop_ndjson_bad_lines_cost_nothing(fragments: Vec<String>, garbage: Vec<String>, cuts: Vec<usize>) -> TestResult {
    if fragments.len() > 50 || garbage.len() > 50 {
        return TestResult::discard();
    }

    let mut body = mixed_body(
        &fragments,
        &garbage,
        |f| format!("{}\n", json!({ "response": f, "done": false })),
        "",
    );
    body.extend_from_slice(b"{\"response\":\"\",\"done\":true}\n");

    let events = frame_events(stream::iter(chunk(&body, &cuts)), NdjsonDecoder::new());
    let outcome = runtime().block_on(CompletionStream::new(events).collect_all());

    TestResult::from_bool(
        outcome.transcript == fragments.concat() && outcome.is_complete() && outcome.skipped >= garbage.len(),
    )
}

#[quickcheck]
fn prop_sse_bad_lines_cost_nothing(fragments: Vec<String>, garbage: Vec<String>, cuts: Vec<usize>) -> TestResult {
    if fragments.len() > 50 || garbage.len() > 50 {
        return TestResult::discard();
    }

    let mut body = mixed_body(
        &fragments,
        &garbage,
        |f| format!("data: {}\n\n", json!({ "choices": [{ "delta": { "content": f }, "finish_reason": null }] })),
        "data: ",
    );
    body.extend_from_slice(b"data: [DONE]\n\n");

    let events = frame_events(stream::iter(chunk(&body, &cuts)), SseDecoder::new());
    let outcome = runtime().block_on(CompletionStream::new(events).collect_all());

    TestResult::from_bool(
        outcome.transcript == fragments.concat() && outcome.is_complete() && outcome.skipped >= garbage.len(),
    )
}

#[tokio::test]
async fn test_ndjson_stray_brace_in_one_chunk() {
    let body = "}\n{\"response\":\"A\",\"done\":false}\n{\"response\":\"x\"\n\
                {\"response\":\"B\",\"done\":false}\n{\"response\":\"\",\"done\":true}\n";
    let chunks = vec![Ok::<_, std::io::Error>(Bytes::from_static(body.as_bytes()))];

    let events = frame_events(stream::iter(chunks), NdjsonDecoder::new());
    let outcome = CompletionStream::new(events).collect_all().await;

    assert_eq!(outcome.transcript, "AB");
    assert_eq!(outcome.fragments, 2);
    assert!(outcome.is_complete());
}

#[tokio::test]
async fn test_garbage_lines_are_skipped() {
    let body = "data: {\"choices\":[{\"delta\":{\"content\":\"Grit \"}}]}\n\
                : keep-alive comment\n\
                data: {not json\n\
                data: {\"unexpected\":true}\n\
                data: {\"choices\":[{\"delta\":{\"content\":\"pays.\"}}]}\n\
                data: [DONE]\n";
    let chunks = vec![Ok::<_, std::io::Error>(Bytes::from_static(body.as_bytes()))];

    let events = frame_events(stream::iter(chunks), SseDecoder::new());
    let outcome = CompletionStream::new(events).collect_all().await;

    assert_eq!(outcome.transcript, "Grit pays.");
    assert_eq!(outcome.fragments, 2);
    // Two malformed lines plus the [DONE] marker
    assert_eq!(outcome.skipped, 3);
    assert!(outcome.is_complete());
}

#[tokio::test]
async fn test_multibyte_character_split_across_chunks() {
    let body = "{\"response\":\"caf\u{e9} \u{1f680}\",\"done\":false}\n".as_bytes().to_vec();
    let split = body.iter().position(|&b| b == 0xC3).unwrap() + 1;

    let chunks = vec![
        Ok::<_, std::io::Error>(Bytes::copy_from_slice(&body[..split])),
        Ok(Bytes::copy_from_slice(&body[split..])),
    ];
    let events = frame_events(stream::iter(chunks), NdjsonDecoder::new());
    let outcome = CompletionStream::new(events).collect_all().await;

    assert_eq!(outcome.transcript, "caf\u{e9} \u{1f680}");
    assert_eq!(outcome.skipped, 0);
}

#[tokio::test]
async fn test_transport_error_mid_body() {
    let chunks = vec![
        Ok(Bytes::from_static(b"{\"response\":\"Half an \",\"done\":false}\n")),
        Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "connection reset")),
        Ok(Bytes::from_static(b"{\"response\":\"answer\",\"done\":false}\n")),
    ];

    let events = frame_events(stream::iter(chunks), NdjsonDecoder::new());
    let outcome = CompletionStream::new(events).collect_all().await;

    assert_eq!(outcome.transcript, "Half an ");
    assert_eq!(outcome.fault.as_deref(), Some("connection reset"));
    assert!(!outcome.is_complete());
}
