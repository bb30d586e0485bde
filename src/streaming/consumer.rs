//! Completion stream consumer
//!
//! Pulls events from a [`CompletionClient`] stream and keeps a running
//! transcript. Per-event policy:
//! - `Fragment`: appended to the transcript and yielded
//! - `Skip`: counted, logged at debug level, never shown to the caller
//! - `TransportFault`: recorded, ends the stream; the transcript stays valid
//!
//! Dropping the consumer drops the underlying response body and releases
//! the connection.

use futures_util::stream::{self, Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use crate::errors::Result;
use crate::streaming::client::{CompletionClient, CompletionRequest, EventStream};
use crate::streaming::parser::StreamEvent;
use crate::telemetry::{TelemetryCollector, TelemetryEvent};

/// Why a stream stopped before the service finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    /// A caller-supplied deadline elapsed
    Deadline,
    /// The caller cancelled explicitly
    Cancelled,
}

/// Final state of a consumed stream
#[derive(Debug, Clone, PartialEq)]
pub struct StreamOutcome {
    pub transcript: String,
    pub fragments: usize,
    pub skipped: usize,
    /// Transport failure message, if the stream ended on one
    pub fault: Option<String>,
    pub interrupted: Option<Interrupted>,
}

impl StreamOutcome {
    /// True if the service finished the answer
    pub fn is_complete(&self) -> bool {
        self.fault.is_none() && self.interrupted.is_none()
    }
}

/// A lazily consumed answer: a finite, non-restartable sequence of fragments
pub struct CompletionStream {
    events: EventStream,
    transcript: String,
    fragments: usize,
    skipped: usize,
    fault: Option<String>,
    interrupted: Option<Interrupted>,
    finished: bool,
    telemetry: Option<TelemetryCollector>,
}

impl CompletionStream {
    /// Open a stream for `prompt`
    pub async fn open(
        client: &dyn CompletionClient,
        prompt: &str,
        temperature: f32,
        max_tokens: usize,
    ) -> Result<Self> {
        let request = CompletionRequest::new(prompt, temperature, max_tokens);
        let events = client.stream_completion(&request).await?;
        tracing::debug!(model = client.model(), temperature, max_tokens, "completion stream opened");
        Ok(Self::new(events))
    }

    /// Wrap an already opened event stream
    pub fn new(events: EventStream) -> Self {
        Self {
            events,
            transcript: String::new(),
            fragments: 0,
            skipped: 0,
            fault: None,
            interrupted: None,
            finished: false,
            telemetry: None,
        }
    }

    /// Attach a telemetry collector
    pub fn with_telemetry(mut self, telemetry: TelemetryCollector) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Pull the next fragment; `None` once the stream has ended
    pub async fn next_fragment(&mut self) -> Option<String> {
        self.next().await
    }

    /// Pull the next fragment, abandoning the stream if none arrives in time
    pub async fn next_fragment_within(&mut self, timeout: Duration) -> Option<String> {
        match tokio::time::timeout(timeout, self.next()).await {
            Ok(fragment) => fragment,
            Err(_) => {
                self.interrupt(Interrupted::Deadline);
                None
            }
        }
    }

    /// Drain the stream to the end
    pub async fn collect_all(mut self) -> StreamOutcome {
        while self.next().await.is_some() {}
        self.finish()
    }

    /// Drain the stream, abandoning it once `deadline` has elapsed
    pub async fn collect_within(mut self, deadline: Duration) -> StreamOutcome {
        let until = tokio::time::Instant::now() + deadline;
        loop {
            match tokio::time::timeout_at(until, self.next()).await {
                Ok(Some(_)) => continue,
                Ok(None) => break,
                Err(_) => {
                    self.interrupt(Interrupted::Deadline);
                    break;
                }
            }
        }
        self.finish()
    }

    /// Stop consuming and release the transport
    pub fn cancel(&mut self) {
        self.interrupt(Interrupted::Cancelled);
    }

    fn interrupt(&mut self, reason: Interrupted) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.interrupted = Some(reason);
        // Replacing the stream drops the response body
        self.events = Box::pin(stream::empty());
        tracing::warn!(?reason, chars = self.transcript.len(), "completion stream abandoned");
        self.emit(TelemetryEvent::StreamInterrupted {
            timestamp: Instant::now(),
        });
    }

    /// Text accumulated so far
    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn fault(&self) -> Option<&str> {
        self.fault.as_deref()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Consume the stream state into its outcome
    pub fn finish(self) -> StreamOutcome {
        StreamOutcome {
            transcript: self.transcript,
            fragments: self.fragments,
            skipped: self.skipped,
            fault: self.fault,
            interrupted: self.interrupted,
        }
    }

    fn emit(&self, event: TelemetryEvent) {
        if let Some(telemetry) = &self.telemetry {
            telemetry.record(event);
        }
    }
}

impl Stream for CompletionStream {
    type Item = String;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        let this = self.get_mut();

        loop {
            if this.finished {
                return Poll::Ready(None);
            }

            match this.events.as_mut().poll_next(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(None) => {
                    this.finished = true;
                    tracing::debug!(
                        fragments = this.fragments,
                        skipped = this.skipped,
                        "completion stream ended"
                    );
                    return Poll::Ready(None);
                }
                Poll::Ready(Some(StreamEvent::Fragment(text))) if !text.is_empty() => {
                    this.transcript.push_str(&text);
                    this.fragments += 1;
                    this.emit(TelemetryEvent::FragmentReceived {
                        chars: text.chars().count(),
                        timestamp: Instant::now(),
                    });
                    return Poll::Ready(Some(text));
                }
                Poll::Ready(Some(StreamEvent::Fragment(_))) => {
                    this.skipped += 1;
                }
                Poll::Ready(Some(StreamEvent::Skip(reason))) => {
                    this.skipped += 1;
                    tracing::debug!(%reason, "skipping stream chunk");
                    this.emit(TelemetryEvent::ChunkSkipped {
                        reason,
                        timestamp: Instant::now(),
                    });
                }
                Poll::Ready(Some(StreamEvent::TransportFault(message))) => {
                    tracing::warn!(error = %message, chars = this.transcript.len(), "completion transport failed");
                    this.emit(TelemetryEvent::TransportFault {
                        message: message.clone(),
                        timestamp: Instant::now(),
                    });
                    this.fault = Some(message);
                    this.finished = true;
                    this.events = Box::pin(stream::empty());
                    return Poll::Ready(None);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::parser::SkipReason;
    use quickcheck::TestResult;
    use quickcheck_macros::quickcheck;

    fn events(items: Vec<StreamEvent>) -> EventStream {
        Box::pin(stream::iter(items))
    }

    fn fragment(text: &str) -> StreamEvent {
        StreamEvent::Fragment(text.to_string())
    }

    #[tokio::test]
    async fn test_skips_malformed_chunks() {
        let stream = CompletionStream::new(events(vec![
            fragment("The "),
            StreamEvent::Skip(SkipReason::Malformed),
            fragment("answer"),
            StreamEvent::Skip(SkipReason::Empty),
            fragment("."),
            StreamEvent::Skip(SkipReason::Control),
        ]));

        let outcome = stream.collect_all().await;
        assert_eq!(outcome.transcript, "The answer.");
        assert_eq!(outcome.fragments, 3);
        assert_eq!(outcome.skipped, 3);
        assert!(outcome.is_complete());
    }

    #[tokio::test]
    async fn test_transport_fault_keeps_partial_transcript() {
        let mut stream = CompletionStream::new(events(vec![
            fragment("Partial"),
            StreamEvent::TransportFault("connection reset".to_string()),
            fragment(" never seen"),
        ]));

        assert_eq!(stream.next_fragment().await.as_deref(), Some("Partial"));
        assert_eq!(stream.next_fragment().await, None);
        assert_eq!(stream.next_fragment().await, None);
        assert_eq!(stream.fault(), Some("connection reset"));

        let outcome = stream.finish();
        assert_eq!(outcome.transcript, "Partial");
        assert!(!outcome.is_complete());
    }

    #[tokio::test]
    async fn test_yields_fragments_incrementally() {
        let mut stream = CompletionStream::new(events(vec![fragment("a"), fragment("b")]));

        assert_eq!(stream.next_fragment().await.as_deref(), Some("a"));
        assert_eq!(stream.transcript(), "a");
        assert_eq!(stream.next_fragment().await.as_deref(), Some("b"));
        assert_eq!(stream.transcript(), "ab");
        assert_eq!(stream.next_fragment().await, None);
        assert!(stream.is_finished());
    }

    #[tokio::test]
    async fn test_deadline_abandons_stream() {
        let slow: EventStream = Box::pin(
            stream::iter(vec![fragment("fast")]).chain(stream::pending()),
        );
        let mut stream = CompletionStream::new(slow);

        assert_eq!(stream.next_fragment().await.as_deref(), Some("fast"));
        assert_eq!(stream.next_fragment_within(Duration::from_millis(20)).await, None);
        assert_eq!(stream.next_fragment().await, None);

        let outcome = stream.finish();
        assert_eq!(outcome.transcript, "fast");
        assert_eq!(outcome.interrupted, Some(Interrupted::Deadline));
    }

    #[tokio::test]
    async fn test_collect_within_deadline() {
        let slow: EventStream = Box::pin(
            stream::iter(vec![fragment("one "), fragment("two")]).chain(stream::pending()),
        );

        let outcome = CompletionStream::new(slow)
            .collect_within(Duration::from_millis(20))
            .await;
        assert_eq!(outcome.transcript, "one two");
        assert_eq!(outcome.interrupted, Some(Interrupted::Deadline));
        assert!(outcome.fault.is_none());
    }

    #[tokio::test]
    async fn test_cancel() {
        let mut stream = CompletionStream::new(events(vec![fragment("x"), fragment("y")]));
        assert_eq!(stream.next_fragment().await.as_deref(), Some("x"));

        stream.cancel();
        assert_eq!(stream.next_fragment().await, None);
        assert_eq!(stream.finish().interrupted, Some(Interrupted::Cancelled));
    }

    #[tokio::test]
    async fn test_telemetry_counts() {
        let telemetry = TelemetryCollector::new();
        let stream = CompletionStream::new(events(vec![
            fragment("hi"),
            StreamEvent::Skip(SkipReason::Malformed),
            StreamEvent::TransportFault("eof".to_string()),
        ]))
        .with_telemetry(telemetry.clone());

        stream.collect_all().await;
        let stats = telemetry.get_stats();
        assert_eq!(stats.fragments_received, 1);
        assert_eq!(stats.chunks_skipped, 1);
        assert_eq!(stats.transport_faults, 1);
    }

    /// Malformed events at arbitrary positions never change the transcript
    #[quickcheck]
    fn prop_transcript_ignores_skips(fragments: Vec<String>, faults: Vec<(usize, u8)>) -> TestResult {
        let fragments: Vec<String> = fragments.into_iter().filter(|f| !f.is_empty()).collect();

        let mut sequence: Vec<StreamEvent> = fragments.iter().map(|f| fragment(f)).collect();
        for (position, kind) in faults {
            let reason = match kind % 3 {
                0 => SkipReason::Malformed,
                1 => SkipReason::Empty,
                _ => SkipReason::Control,
            };
            let index = position % (sequence.len() + 1);
            sequence.insert(index, StreamEvent::Skip(reason));
        }

        let runtime = match tokio::runtime::Builder::new_current_thread().build() {
            Ok(runtime) => runtime,
            Err(_) => return TestResult::discard(),
        };
        let outcome = runtime.block_on(CompletionStream::new(events(sequence)).collect_all());

        TestResult::from_bool(outcome.transcript == fragments.concat() && outcome.fragments == fragments.len())
    }
}
