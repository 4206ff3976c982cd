use crate::domain::model::{BatchReport, JobEntry, JobResult, MergeJob};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// Runs a single job to completion. Implementations convert every failure
/// into a `JobResult`; nothing escapes the job boundary.
#[async_trait::async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, job: &MergeJob) -> JobResult;
}

/// 可跨 task 共享的取消旗標，於 job 之間檢查
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        let notified = self.notify.notified();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

/// Sequential batch runner: one job in flight at a time, results kept in
/// submission order.
pub struct BatchJobRunner<E: JobExecutor> {
    executor: E,
    inter_job_delay: Duration,
    cancellation: CancellationFlag,
}

impl<E: JobExecutor> BatchJobRunner<E> {
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            inter_job_delay: Duration::ZERO,
            cancellation: CancellationFlag::new(),
        }
    }

    pub fn with_inter_job_delay(mut self, delay: Duration) -> Self {
        self.inter_job_delay = delay;
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationFlag) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn cancellation(&self) -> &CancellationFlag {
        &self.cancellation
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub async fn run(&self, jobs: &[MergeJob]) -> BatchReport {
        let mut report = BatchReport::default();
        let total = jobs.len();
        let total_skills: usize = jobs.iter().map(|j| j.skills.len()).sum();

        tracing::info!("🎬 Starting merge batch: {} jobs, {} skills", total, total_skills);

        for (index, job) in jobs.iter().enumerate() {
            if self.cancellation.is_cancelled() {
                tracing::warn!("⏹️ Batch interrupted before job {}/{}", index + 1, total);
                report.interrupted = true;
                break;
            }

            let start_time = Instant::now();
            let result = self.executor.execute(job).await;
            let duration = start_time.elapsed();

            match &result {
                JobResult::Success { records } => tracing::info!(
                    "✅ [{}/{}] {} ({} skills): {}, {} outcomes ({:.2?})",
                    index + 1,
                    total,
                    job.label(),
                    job.skills.len(),
                    result.status_label(),
                    records.len(),
                    duration
                ),
                JobResult::ValidationFailure { reason } => tracing::warn!(
                    "⚠️ [{}/{}] {} ({} skills): {} ({:.2?}) - {}",
                    index + 1,
                    total,
                    job.label(),
                    job.skills.len(),
                    result.status_label(),
                    duration,
                    reason
                ),
                JobResult::Exception { message, kind } => tracing::error!(
                    "❌ [{}/{}] {} ({} skills): {} {} ({:.2?}) - {}",
                    index + 1,
                    total,
                    job.label(),
                    job.skills.len(),
                    result.status_label(),
                    kind,
                    duration,
                    message
                ),
            }

            report.entries.push(JobEntry {
                domain_id: job.domain_id,
                cluster_id: job.cluster_id,
                domain: job.domain.clone(),
                cluster: job.cluster.clone(),
                skills_count: job.skills.len(),
                duration,
                result,
            });

            if index + 1 < total {
                self.pause().await;
            }
        }

        report
    }

    async fn pause(&self) {
        if self.inter_job_delay.is_zero() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(self.inter_job_delay) => {}
            _ = self.cancellation.cancelled() => {}
        }
    }
}

/// 批次結果統計，失敗依原因分組
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total_jobs: usize,
    pub succeeded: usize,
    pub validation_failed: usize,
    pub raised: usize,
    pub total_skills: usize,
    pub total_duration_ms: u64,
    pub interrupted: bool,
    /// (reason, occurrences), most common first.
    pub failures_by_reason: Vec<(String, usize)>,
}

impl BatchSummary {
    pub fn from_report(report: &BatchReport) -> Self {
        let mut summary = BatchSummary {
            total_jobs: report.entries.len(),
            interrupted: report.interrupted,
            ..Default::default()
        };
        let mut reasons: HashMap<&str, usize> = HashMap::new();

        for entry in &report.entries {
            summary.total_skills += entry.skills_count;
            summary.total_duration_ms += entry.duration.as_millis() as u64;
            match &entry.result {
                JobResult::Success { .. } => summary.succeeded += 1,
                JobResult::ValidationFailure { .. } => summary.validation_failed += 1,
                JobResult::Exception { .. } => summary.raised += 1,
            }
            if let Some(message) = entry.result.failure_message() {
                *reasons.entry(message).or_default() += 1;
            }
        }

        let mut failures_by_reason: Vec<(String, usize)> = reasons
            .into_iter()
            .map(|(reason, count)| (reason.to_string(), count))
            .collect();
        failures_by_reason.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        summary.failures_by_reason = failures_by_reason;

        summary
    }

    pub fn failed(&self) -> usize {
        self.validation_failed + self.raised
    }

    /// Percentage of attempted jobs that succeeded.
    pub fn success_rate(&self) -> f64 {
        if self.total_jobs == 0 {
            return 0.0;
        }
        self.succeeded as f64 / self.total_jobs as f64 * 100.0
    }

    pub fn log(&self) {
        tracing::info!("📊 Batch summary:");
        tracing::info!("  ✅ Successfully processed: {} clusters", self.succeeded);
        tracing::info!("  ⚠️ Validation failures: {} clusters", self.validation_failed);
        tracing::info!("  ❌ Exceptions: {} clusters", self.raised);
        tracing::info!("  📊 Total skills processed: {}", self.total_skills);
        if self.failed() > 0 {
            tracing::info!("  Success rate: {:.1}%", self.success_rate());
            for (reason, count) in self.failures_by_reason.iter().take(5) {
                tracing::info!("  • {}x: {}", count, truncate(reason, 80));
            }
        }
        if self.interrupted {
            tracing::warn!("  ⏹️ Batch was interrupted; remaining clusters were not attempted");
        }
    }
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut short: String = text.chars().take(limit.saturating_sub(3)).collect();
    short.push_str("...");
    short
}
