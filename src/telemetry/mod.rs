//! Telemetry system for RagBuddy
//!
//! Collects typed pipeline events per session and prints a summary.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::cli::Verbosity;
use crate::streaming::SkipReason;

/// Telemetry event types
#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    // Retrieval events
    Retrieved {
        hits: usize,
        duration_ms: u64,
        timestamp: Instant,
    },
    Reranked {
        candidates: usize,
        kept: usize,
        duration_ms: u64,
        timestamp: Instant,
    },
    ContextSelected {
        accepted: usize,
        rejected: usize,
        prompt_tokens: usize,
        timestamp: Instant,
    },

    // Stream events
    FragmentReceived {
        chars: usize,
        timestamp: Instant,
    },
    ChunkSkipped {
        reason: SkipReason,
        timestamp: Instant,
    },
    TransportFault {
        message: String,
        timestamp: Instant,
    },
    StreamInterrupted {
        timestamp: Instant,
    },
}

/// Telemetry statistics
#[derive(Debug, Clone, Default)]
pub struct TelemetryStats {
    pub queries: usize,
    pub hits_retrieved: usize,
    pub hits_reranked: usize,
    pub passages_accepted: usize,
    pub passages_rejected: usize,
    pub prompt_tokens: usize,
    pub fragments_received: usize,
    pub chars_received: usize,
    pub chunks_skipped: usize,
    pub transport_faults: usize,
    pub interruptions: usize,
}

/// Telemetry collector
#[derive(Clone)]
pub struct TelemetryCollector {
    events: Arc<Mutex<Vec<TelemetryEvent>>>,
    stats: Arc<Mutex<TelemetryStats>>,
    start_time: Instant,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TelemetryCollector {
    /// Create a new telemetry collector
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            stats: Arc::new(Mutex::new(TelemetryStats::default())),
            start_time: Instant::now(),
        }
    }

    /// Record an event
    pub fn record(&self, event: TelemetryEvent) {
        {
            let mut stats = lock(&self.stats);
            match &event {
                TelemetryEvent::Retrieved { hits, .. } => {
                    stats.queries += 1;
                    stats.hits_retrieved += hits;
                }
                TelemetryEvent::Reranked { kept, .. } => {
                    stats.hits_reranked += kept;
                }
                TelemetryEvent::ContextSelected {
                    accepted,
                    rejected,
                    prompt_tokens,
                    ..
                } => {
                    stats.passages_accepted += accepted;
                    stats.passages_rejected += rejected;
                    stats.prompt_tokens += prompt_tokens;
                }
                TelemetryEvent::FragmentReceived { chars, .. } => {
                    stats.fragments_received += 1;
                    stats.chars_received += chars;
                }
                TelemetryEvent::ChunkSkipped { .. } => {
                    stats.chunks_skipped += 1;
                }
                TelemetryEvent::TransportFault { .. } => {
                    stats.transport_faults += 1;
                }
                TelemetryEvent::StreamInterrupted { .. } => {
                    stats.interruptions += 1;
                }
            }
        }

        lock(&self.events).push(event);
    }

    /// Get current statistics
    pub fn get_stats(&self) -> TelemetryStats {
        lock(&self.stats).clone()
    }

    /// Get elapsed time since start
    pub fn elapsed(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    pub fn event_count(&self) -> usize {
        lock(&self.events).len()
    }

    /// Get recent events (last n)
    pub fn recent_events(&self, n: usize) -> Vec<TelemetryEvent> {
        let events = lock(&self.events);
        let start = events.len().saturating_sub(n);
        events[start..].to_vec()
    }

    /// Fraction of stream events that were skipped
    pub fn skip_rate(&self) -> f64 {
        let stats = lock(&self.stats);
        let total = stats.fragments_received + stats.chunks_skipped;
        if total == 0 {
            0.0
        } else {
            stats.chunks_skipped as f64 / total as f64
        }
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Simple telemetry display
pub struct TelemetryDisplay {
    collector: TelemetryCollector,
    verbosity: Verbosity,
}

impl TelemetryDisplay {
    pub fn new(collector: TelemetryCollector, verbosity: Verbosity) -> Self {
        Self {
            collector,
            verbosity,
        }
    }

    /// Display summary statistics
    pub fn display_summary(&self) {
        if !self.verbosity.show_events() {
            return;
        }

        let stats = self.collector.get_stats();
        let elapsed = self.collector.elapsed();

        println!("\n📊 Session Summary");
        println!("─────────────────────────────────────");
        println!("Duration:          {:?}", elapsed);
        println!("Queries:           {}", stats.queries);
        println!("Hits retrieved:    {}", stats.hits_retrieved);
        println!("Passages used:     {}", stats.passages_accepted);
        println!("Passages dropped:  {}", stats.passages_rejected);
        println!("Prompt tokens:     {}", stats.prompt_tokens);
        println!("Fragments:         {}", stats.fragments_received);
        println!("Skipped chunks:    {} ({:.1}%)", stats.chunks_skipped, self.collector.skip_rate() * 100.0);
        println!("Transport faults:  {}", stats.transport_faults);
        println!();
    }
}
