//! Job scheduler for the worker's periodic tasks.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Offset, TimeZone, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const DAY: Duration = Duration::from_secs(86_400);

/// How often a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobFrequency {
    /// Every N minutes.
    Minutes(u64),
    /// Every hour.
    Hourly,
    /// Once a day at a wall-clock time in a fixed UTC offset.
    DailyAt {
        hour: u32,
        minute: u32,
        utc_offset_hours: i32,
    },
}

impl JobFrequency {
    /// Time to wait from `now` until the next run.
    pub fn next_delay(&self, now: DateTime<Utc>) -> Duration {
        match *self {
            JobFrequency::Minutes(mins) => Duration::from_secs(mins.max(1) * 60),
            JobFrequency::Hourly => Duration::from_secs(3600),
            JobFrequency::DailyAt {
                hour,
                minute,
                utc_offset_hours,
            } => {
                let offset = FixedOffset::east_opt(utc_offset_hours * 3600)
                    .unwrap_or_else(|| Utc.fix());
                let local = now.with_timezone(&offset);

                let Some(today) = local.date_naive().and_hms_opt(hour, minute, 0) else {
                    return DAY;
                };
                let Some(mut next) = offset.from_local_datetime(&today).single() else {
                    return DAY;
                };
                if next <= local {
                    next += chrono::Duration::days(1);
                }

                (next - local).to_std().unwrap_or(DAY)
            }
        }
    }
}

/// A periodic background job.
#[async_trait::async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &'static str;

    fn frequency(&self) -> JobFrequency;

    /// Run once. Errors are logged by the scheduler and the job stays scheduled.
    async fn execute(&self) -> Result<(), String>;
}

pub struct JobScheduler {
    jobs: Vec<Arc<dyn Job>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl JobScheduler {
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            jobs: Vec::new(),
            shutdown_tx,
            shutdown_rx,
            handles: Vec::new(),
        }
    }

    pub fn register<J: Job + 'static>(&mut self, job: J) {
        self.jobs.push(Arc::new(job));
    }

    /// Receiver that flips to `true` on shutdown, for tasks outside the scheduler.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Adopt a task spawned elsewhere so shutdown waits for it.
    pub fn track(&mut self, handle: JoinHandle<()>) {
        self.handles.push(handle);
    }

    pub fn start(&mut self) {
        info!("Starting job scheduler with {} jobs", self.jobs.len());

        for job in &self.jobs {
            let job = Arc::clone(job);
            let mut shutdown_rx = self.shutdown_rx.clone();

            let handle = tokio::spawn(async move {
                let name = job.name();
                let frequency = job.frequency();
                info!(job = name, frequency = ?frequency, "Job scheduled");

                loop {
                    let delay = frequency.next_delay(Utc::now());

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {
                            let start = std::time::Instant::now();
                            info!(job = name, "Job starting");

                            match job.execute().await {
                                Ok(()) => info!(
                                    job = name,
                                    elapsed_ms = start.elapsed().as_millis(),
                                    "Job completed successfully"
                                ),
                                Err(e) => error!(
                                    job = name,
                                    elapsed_ms = start.elapsed().as_millis(),
                                    error = %e,
                                    "Job failed"
                                ),
                            }
                        }
                        _ = shutdown_rx.changed() => {
                            if *shutdown_rx.borrow() {
                                info!(job = name, "Job shutting down");
                                break;
                            }
                        }
                    }
                }
            });

            self.handles.push(handle);
        }
    }

    /// Signal every job to stop after its current run.
    pub fn shutdown(&self) {
        info!("Initiating job scheduler shutdown");
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn wait_for_shutdown(self, timeout: Duration) {
        info!("Waiting for jobs to complete (timeout: {:?})", timeout);

        let shutdown_future = async {
            for handle in self.handles {
                if let Err(e) = handle.await {
                    warn!("Job task panicked: {}", e);
                }
            }
        };

        match tokio::time::timeout(timeout, shutdown_future).await {
            Ok(()) => info!("All jobs completed gracefully"),
            Err(_) => warn!("Job shutdown timed out after {:?}", timeout),
        }
    }
}

impl Default for JobScheduler {
    fn default() -> Self {
        Self::new()
    }
}
