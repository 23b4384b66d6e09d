//! Rolling telemetry for the control stream
//!
//! Tracks packet cadence, a sampled packets-per-second rate, latency and
//! uptime for the dashboard. Cadence and latency live in bounded ring
//! buffers (oldest sample evicted on overflow). Interval math uses the
//! monotonic clock; only the pps window boundary consults wall-clock time,
//! so system clock adjustments cannot corrupt interval measurements.

use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant, SystemTime};

/// Default ring capacity for cadence/latency history.
pub const DEFAULT_WINDOW: usize = 30;

/// Tumbling window length for the packets-per-second sample.
const PPS_WINDOW: Duration = Duration::from_secs(1);

/// Point-in-time aggregate consumed by the dashboard. Never mutated by it.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TelemetrySnapshot {
    pub packets_received: u64,
    /// Sampled rate from the last completed 1 s tumbling window
    pub packets_per_second: u64,
    /// Mean of the cadence ring; `None` before the second packet
    pub avg_cadence_ms: Option<f64>,
    /// Mean of the latency ring; `None` until a latency sample arrives
    pub avg_latency_ms: Option<f64>,
    pub uptime_seconds: f64,
}

/// Per-session timing aggregator.
pub struct TelemetryTracker {
    window: usize,
    packets_received: u64,
    packets_per_second: u64,
    last_packet_at: Option<Instant>,
    cadence_ms: VecDeque<f64>,
    latency_ms: VecDeque<f64>,
    window_counter: u64,
    last_window_at: SystemTime,
    started_at: Instant,
}

impl TelemetryTracker {
    pub fn new() -> Self {
        Self::with_window(DEFAULT_WINDOW)
    }

    /// Create a tracker with a custom ring capacity.
    pub fn with_window(window: usize) -> Self {
        Self {
            window,
            packets_received: 0,
            packets_per_second: 0,
            last_packet_at: None,
            cadence_ms: VecDeque::with_capacity(window),
            latency_ms: VecDeque::with_capacity(window),
            window_counter: 0,
            last_window_at: SystemTime::now(),
            started_at: Instant::now(),
        }
    }

    /// Record one received control packet.
    pub fn record_packet(&mut self) {
        self.record_packet_at(Instant::now(), SystemTime::now());
    }

    /// Clock-injected variant of [`record_packet`](Self::record_packet).
    pub(crate) fn record_packet_at(&mut self, now: Instant, wall: SystemTime) {
        if let Some(last) = self.last_packet_at {
            let cadence = now.duration_since(last).as_secs_f64() * 1000.0;
            push_bounded(&mut self.cadence_ms, cadence, self.window);
        }
        self.last_packet_at = Some(now);
        self.packets_received += 1;
        self.window_counter += 1;

        // Tumbling window: publish and reset once >= 1 s has passed.
        // A clock stepped backwards yields zero elapsed and keeps counting.
        let elapsed = wall
            .duration_since(self.last_window_at)
            .unwrap_or_default();
        if elapsed >= PPS_WINDOW {
            self.packets_per_second = self.window_counter;
            self.window_counter = 0;
            self.last_window_at = wall;
        }
    }

    /// Record a latency measurement in milliseconds.
    pub fn record_latency(&mut self, latency_ms: f64) {
        push_bounded(&mut self.latency_ms, latency_ms, self.window);
    }

    /// Current aggregate view.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            packets_received: self.packets_received,
            packets_per_second: self.packets_per_second,
            avg_cadence_ms: mean(&self.cadence_ms),
            avg_latency_ms: mean(&self.latency_ms),
            uptime_seconds: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

impl Default for TelemetryTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn push_bounded(ring: &mut VecDeque<f64>, sample: f64, cap: usize) {
    if ring.len() >= cap {
        ring.pop_front();
    }
    ring.push_back(sample);
}

fn mean(ring: &VecDeque<f64>) -> Option<f64> {
    if ring.is_empty() {
        None
    } else {
        Some(ring.iter().sum::<f64>() / ring.len() as f64)
    }
}
