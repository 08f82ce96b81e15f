//! Background work behind the data API.
//!
//! Request handlers only validate, record and enqueue; the worker runs each
//! job to completion and publishes the final state of its record.

pub mod generate;
pub mod ingest;
pub mod templates;

use crate::errors::{FactoryError, Result};
use crate::metrics_defs::JOBS_IN_FLIGHT;
use crate::records::{GeneratedResource, ResourceDetails};
use crate::services::Services;
use boundary::BoundaryFilter;
use serde::{Deserialize, Serialize};
use shared::gauge;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

pub use generate::{DownloadQuery, GenerateRequest};

/// Optional restriction of the boundaries a template covers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filters {
    #[serde(default)]
    pub boundaries: Vec<BoundaryFilter>,
}

pub enum Job {
    Generate {
        record: GeneratedResource,
        request: GenerateRequest,
    },
    Ingest {
        details: ResourceDetails,
        user: Option<String>,
        locale: String,
    },
}

impl Job {
    fn kind(&self) -> &'static str {
        match self {
            Job::Generate { .. } => "generate",
            Job::Ingest { .. } => "ingest",
        }
    }
}

/// Sending side of the worker queue.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<Job>,
    in_flight: Arc<AtomicUsize>,
}

impl JobQueue {
    pub fn new(depth: usize) -> (JobQueue, Worker) {
        let (tx, rx) = mpsc::channel(depth.max(1));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let queue = JobQueue {
            tx,
            in_flight: in_flight.clone(),
        };
        (queue, Worker { rx, in_flight })
    }

    /// Waits for room in the queue when it is full.
    pub async fn submit(&self, job: Job) -> Result<()> {
        let count = self.in_flight.fetch_add(1, Ordering::Relaxed) + 1;
        gauge!(JOBS_IN_FLIGHT).set(count as f64);
        if self.tx.send(job).await.is_err() {
            self.in_flight.fetch_sub(1, Ordering::Relaxed);
            return Err(FactoryError::WorkerUnavailable);
        }
        Ok(())
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }
}

/// Receiving side of the worker queue. Jobs run concurrently; the worker
/// stops once every `JobQueue` is dropped and all started jobs finished.
pub struct Worker {
    rx: mpsc::Receiver<Job>,
    in_flight: Arc<AtomicUsize>,
}

impl Worker {
    pub async fn run(mut self, services: Arc<Services>) {
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                job = self.rx.recv() => match job {
                    Some(job) => {
                        tracing::debug!(kind = job.kind(), "job started");
                        tasks.spawn(run_job(services.clone(), job));
                    }
                    None => break,
                },
                Some(result) = tasks.join_next(), if !tasks.is_empty() => {
                    self.finished(result);
                }
            }
        }

        while let Some(result) = tasks.join_next().await {
            self.finished(result);
        }
        tracing::info!("worker stopped");
    }

    fn finished(&self, result: std::result::Result<(), tokio::task::JoinError>) {
        if let Err(e) = result {
            tracing::error!("Job panicked: {}", e);
        }
        let count = self.in_flight.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
        gauge!(JOBS_IN_FLIGHT).set(count as f64);
    }
}

async fn run_job(services: Arc<Services>, job: Job) {
    match job {
        Job::Generate { record, request } => {
            generate::run_generation(&services, record, &request).await;
        }
        Job::Ingest {
            details,
            user,
            locale,
        } => {
            ingest::run_ingestion(&services, details, user.as_deref(), &locale).await;
        }
    }
}

/// Entry point of the data API: accepts requests and hands their work to
/// the background worker.
#[derive(Clone)]
pub struct Factory {
    services: Arc<Services>,
    queue: JobQueue,
}

impl Factory {
    pub fn new(services: Arc<Services>, queue: JobQueue) -> Self {
        Factory { services, queue }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn jobs_in_flight(&self) -> usize {
        self.queue.in_flight()
    }
}
