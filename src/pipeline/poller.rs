//! Drives one batch job until it completes, stalls or runs out of polls.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::{ClientError, RecordingService};
use crate::model::{JobHandle, JobStatus, OutcomeState};

pub const MAX_STALLED_POLLS: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Upper bound on status queries for one job.
    pub max_attempts: u32,
    /// Consecutive polls without progress before the job is abandoned.
    pub max_stalled: u32,
    pub interval: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            max_attempts: 50,
            max_stalled: MAX_STALLED_POLLS,
            interval: Duration::from_secs(25),
        }
    }
}

/// Terminal state of a poll run. Only `Completed` carries results.
#[derive(Debug)]
pub enum PollOutcome {
    Completed(JobStatus),
    Stalled { polls: u32, progress: u32 },
    TimedOut { polls: u32, progress: u32 },
    Error { polls: u32, source: ClientError },
    Cancelled { polls: u32 },
}

impl PollOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed(_) => "completed",
            Self::Stalled { .. } => "stalled",
            Self::TimedOut { .. } => "timed_out",
            Self::Error { .. } => "error",
            Self::Cancelled { .. } => "cancelled",
        }
    }
}

/// Counts consecutive observations of an unchanged result count.
#[derive(Debug, Default)]
pub struct StallTracker {
    last: Option<u32>,
    stalled: u32,
}

impl StallTracker {
    /// Records a progress value and returns the current stall count.
    pub fn observe(&mut self, progress: u32) -> u32 {
        if self.last == Some(progress) {
            self.stalled += 1;
        } else {
            self.stalled = 0;
        }
        self.last = Some(progress);
        self.stalled
    }
}

pub struct JobPoller {
    service: Arc<dyn RecordingService>,
    settings: PollSettings,
    cancel: CancellationToken,
}

impl JobPoller {
    pub fn new(
        service: Arc<dyn RecordingService>,
        settings: PollSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            service,
            settings,
            cancel,
        }
    }

    pub async fn poll(&self, job: &JobHandle) -> PollOutcome {
        let job_id = job.job_id.as_str();
        let mut tracker = StallTracker::default();
        let mut progress = 0;

        for attempt in 1..=self.settings.max_attempts {
            let status = match self.service.poll_job(job).await {
                Ok(status) => status,
                Err(err) => {
                    error!(job_id, "Error polling batch request status: {}", err);
                    return PollOutcome::Error {
                        polls: attempt,
                        source: err,
                    };
                }
            };

            if status.is_complete() {
                info!(job_id, total_recordings = status.expected_count, "Batch job completed");
                report_results(&status);
                return PollOutcome::Completed(status);
            }

            progress = status.result_count;
            let stalled = tracker.observe(progress);
            if stalled > 0 {
                debug!(job_id, stalled_count = stalled, "No progress in batch job");
            }
            if stalled >= self.settings.max_stalled {
                warn!(job_id, progress, "Batch job stalled, giving up");
                return PollOutcome::Stalled {
                    polls: attempt,
                    progress,
                };
            }

            info!(
                job_id,
                progress,
                expected = status.expected_count,
                "Waiting for batch job"
            );

            if attempt < self.settings.max_attempts {
                tokio::select! {
                    _ = tokio::time::sleep(self.settings.interval) => {}
                    _ = self.cancel.cancelled() => {
                        warn!(job_id, "Polling cancelled");
                        return PollOutcome::Cancelled { polls: attempt };
                    }
                }
            }
        }

        warn!(
            job_id,
            polls = self.settings.max_attempts,
            "Batch job did not complete in time"
        );
        PollOutcome::TimedOut {
            polls: self.settings.max_attempts,
            progress,
        }
    }
}

/// Prints ready URLs and logs per-recording failures of a completed job.
fn report_results(status: &JobStatus) {
    for item in &status.results {
        match item.state() {
            OutcomeState::Ready(url) => println!("Download URL: {url}"),
            OutcomeState::Failed(message) => warn!(
                job_id = %status.job_id,
                recording_id = item.recording_id.as_deref().unwrap_or(""),
                "Recording export failed: {}",
                message
            ),
            OutcomeState::Pending => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::{ready_item, status, FakeService};
    use tokio::time::Instant;

    fn job(id: &str) -> JobHandle {
        JobHandle {
            job_id: id.to_string(),
            reference_count: 5,
        }
    }

    fn poller(service: Arc<FakeService>, max_attempts: u32) -> JobPoller {
        JobPoller::new(
            service,
            PollSettings {
                max_attempts,
                max_stalled: MAX_STALLED_POLLS,
                interval: Duration::from_secs(25),
            },
            CancellationToken::new(),
        )
    }

    #[test]
    fn test_stall_tracker_resets_on_progress() {
        let mut tracker = StallTracker::default();
        assert_eq!(tracker.observe(0), 0);
        assert_eq!(tracker.observe(0), 1);
        assert_eq!(tracker.observe(0), 2);
        assert_eq!(tracker.observe(3), 0);
        assert_eq!(tracker.observe(3), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_complete_on_first_poll_without_sleep() {
        let mut done = status("job-a", 5, 5);
        done.results = (0..5).map(|i| ready_item("c1", &format!("r{i}"))).collect();
        let service = Arc::new(FakeService::new().with_poll_script("job-a", vec![Ok(done)]));
        let start = Instant::now();

        let outcome = poller(Arc::clone(&service), 50).poll(&job("job-a")).await;

        match outcome {
            PollOutcome::Completed(status) => assert_eq!(status.ready().count(), 5),
            other => panic!("expected completion, got {other:?}"),
        }
        assert_eq!(service.poll_calls("job-a"), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stall_detected_before_attempt_budget() {
        let service = Arc::new(
            FakeService::new().with_poll_script("job-s", vec![Ok(status("job-s", 3, 10))]),
        );

        let outcome = poller(Arc::clone(&service), 100).poll(&job("job-s")).await;

        assert!(matches!(
            outcome,
            PollOutcome::Stalled {
                polls: 31,
                progress: 3
            }
        ));
        assert_eq!(service.poll_calls("job-s"), 31);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_resets_stall_counter() {
        let mut script: Vec<Result<JobStatus, ()>> =
            (0..20).map(|_| Ok(status("job-p", 1, 10))).collect();
        script.extend((0..20).map(|_| Ok(status("job-p", 2, 10))));
        script.push(Ok(status("job-p", 10, 10)));
        let service = Arc::new(FakeService::new().with_poll_script("job-p", script));

        let outcome = poller(Arc::clone(&service), 100).poll(&job("job-p")).await;

        assert!(matches!(outcome, PollOutcome::Completed(_)));
        assert_eq!(service.poll_calls("job-p"), 41);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_when_budget_exhausted() {
        let script = (1..=10).map(|n| Ok(status("job-t", n, 20))).collect();
        let service = Arc::new(FakeService::new().with_poll_script("job-t", script));
        let start = Instant::now();

        let outcome = poller(Arc::clone(&service), 5).poll(&job("job-t")).await;

        assert!(matches!(
            outcome,
            PollOutcome::TimedOut {
                polls: 5,
                progress: 5
            }
        ));
        assert_eq!(service.poll_calls("job-t"), 5);
        // Four sleeps between five polls.
        assert_eq!(start.elapsed(), Duration::from_secs(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_ends_polling() {
        let service = Arc::new(FakeService::new().with_poll_script(
            "job-e",
            vec![Ok(status("job-e", 1, 5)), Err(())],
        ));

        let outcome = poller(Arc::clone(&service), 50).poll(&job("job-e")).await;

        assert!(matches!(outcome, PollOutcome::Error { polls: 2, .. }));
        assert_eq!(service.poll_calls("job-e"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_expected_never_completes() {
        let service = Arc::new(
            FakeService::new().with_poll_script("job-z", vec![Ok(status("job-z", 0, 0))]),
        );

        let outcome = poller(Arc::clone(&service), 10).poll(&job("job-z")).await;

        assert!(matches!(outcome, PollOutcome::TimedOut { polls: 10, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_waiting() {
        let service = Arc::new(
            FakeService::new().with_poll_script("job-c", vec![Ok(status("job-c", 1, 5))]),
        );
        let cancel = CancellationToken::new();
        let poller = JobPoller::new(service.clone(), PollSettings::default(), cancel.clone());
        cancel.cancel();

        let outcome = poller.poll(&job("job-c")).await;

        assert!(matches!(outcome, PollOutcome::Cancelled { polls: 1 }));
    }
}
