// Metrics collection and tracking

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Keep the last N latency samples for percentiles
const MAX_LATENCY_SAMPLES: usize = 1000;

/// Upstream handshake latency
#[derive(Debug)]
pub struct LatencyMetrics {
    count: AtomicU64,
    total_ms: AtomicU64,
    min_ms: AtomicU64,
    max_ms: AtomicU64,
    samples: Mutex<Vec<u64>>,
}

impl LatencyMetrics {
    pub fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            total_ms: AtomicU64::new(0),
            min_ms: AtomicU64::new(u64::MAX),
            max_ms: AtomicU64::new(0),
            samples: Mutex::new(Vec::new()),
        }
    }

    pub fn record(&self, latency_ms: u64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.min_ms.fetch_min(latency_ms, Ordering::Relaxed);
        self.max_ms.fetch_max(latency_ms, Ordering::Relaxed);

        if let Ok(mut samples) = self.samples.lock() {
            samples.push(latency_ms);
            if samples.len() > MAX_LATENCY_SAMPLES {
                samples.remove(0);
            }
        }
    }

    pub fn avg_ms(&self) -> f64 {
        let count = self.count.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        self.total_ms.load(Ordering::Relaxed) as f64 / count as f64
    }

    fn percentile(&self, p: u8) -> u64 {
        if let Ok(samples) = self.samples.lock() {
            if samples.is_empty() {
                return 0;
            }
            let mut sorted = samples.clone();
            sorted.sort_unstable();
            let index = (sorted.len() * p as usize / 100).min(sorted.len() - 1);
            sorted[index]
        } else {
            0
        }
    }

    pub fn stats(&self) -> LatencyStats {
        let count = self.count.load(Ordering::Relaxed);
        LatencyStats {
            count,
            avg_ms: self.avg_ms(),
            min_ms: if count == 0 { 0 } else { self.min_ms.load(Ordering::Relaxed) },
            max_ms: self.max_ms.load(Ordering::Relaxed),
            p50_ms: self.percentile(50),
            p95_ms: self.percentile(95),
            p99_ms: self.percentile(99),
        }
    }
}

impl Default for LatencyMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Session and stream counters
#[derive(Debug, Default)]
pub struct OrchestratorMetrics {
    pub sessions_opened: AtomicU64,
    pub sessions_active: AtomicU64,
    pub speak_requests: AtomicU64,
    pub barge_ins: AtomicU64,
    pub upstream_failures: AtomicU64,
    pub visemes_forwarded: AtomicU64,
    pub audio_chunks_forwarded: AtomicU64,
    pub idle_timeouts: AtomicU64,
    pub delivery_failures: AtomicU64,
    pub http_requests: AtomicU64,
    pub handshake: LatencyMetrics,
}

impl OrchestratorMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_opened(&self) {
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
        self.sessions_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_closed(&self) {
        let _ = self
            .sessions_active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn snapshot(&self) -> SessionMetricsResponse {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        SessionMetricsResponse {
            sessions_opened: load(&self.sessions_opened),
            sessions_active: load(&self.sessions_active),
            speak_requests: load(&self.speak_requests),
            barge_ins: load(&self.barge_ins),
            upstream_failures: load(&self.upstream_failures),
            visemes_forwarded: load(&self.visemes_forwarded),
            audio_chunks_forwarded: load(&self.audio_chunks_forwarded),
            idle_timeouts: load(&self.idle_timeouts),
            delivery_failures: load(&self.delivery_failures),
            handshake_latency: self.handshake.stats(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LatencyStats {
    pub count: u64,
    pub avg_ms: f64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct SessionMetricsResponse {
    pub sessions_opened: u64,
    pub sessions_active: u64,
    pub speak_requests: u64,
    pub barge_ins: u64,
    pub upstream_failures: u64,
    pub visemes_forwarded: u64,
    pub audio_chunks_forwarded: u64,
    pub idle_timeouts: u64,
    pub delivery_failures: u64,
    pub handshake_latency: LatencyStats,
}

#[derive(Serialize)]
pub struct SystemMetrics {
    pub cpu_usage_percent: f32,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    pub memory_usage_percent: f32,
    pub request_count: u64,
    pub uptime_seconds: u64,
    pub system_load: Option<f64>,
}

#[derive(Serialize)]
pub struct MetricsResponse {
    pub timestamp: DateTime<Utc>,
    pub system: SystemMetrics,
    pub sessions: SessionMetricsResponse,
}
