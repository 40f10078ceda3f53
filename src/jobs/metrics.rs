//! Counters for translation jobs handled by this process.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use super::translate_language::JobReport;

#[derive(Debug, Default)]
pub struct JobMetrics {
    /// Messages handed to a job handler
    jobs_received: AtomicU64,

    /// Jobs that ran to completion
    jobs_succeeded: AtomicU64,

    /// Jobs aborted for any reason, including undecodable payloads
    jobs_failed: AtomicU64,

    /// Provider calls made across all jobs
    batches_translated: AtomicU64,

    /// Rows written by completed jobs
    resources_written: AtomicU64,
}

impl JobMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self) {
        self.jobs_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self, report: &JobReport) {
        self.jobs_succeeded.fetch_add(1, Ordering::Relaxed);
        self.batches_translated
            .fetch_add(report.batches as u64, Ordering::Relaxed);
        self.resources_written
            .fetch_add(report.resources_written, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn report(&self) -> MetricsReport {
        let succeeded = self.jobs_succeeded.load(Ordering::Relaxed);
        let failed = self.jobs_failed.load(Ordering::Relaxed);
        let finished = succeeded + failed;
        let success_rate = if finished > 0 {
            (succeeded as f64 / finished as f64) * 100.0
        } else {
            0.0
        };

        MetricsReport {
            jobs_received: self.jobs_received.load(Ordering::Relaxed),
            jobs_succeeded: succeeded,
            jobs_failed: failed,
            success_rate,
            batches_translated: self.batches_translated.load(Ordering::Relaxed),
            resources_written: self.resources_written.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot served by `/metrics`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsReport {
    pub jobs_received: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    /// Percentage of finished jobs that succeeded (0-100)
    pub success_rate: f64,
    pub batches_translated: u64,
    pub resources_written: u64,
}
