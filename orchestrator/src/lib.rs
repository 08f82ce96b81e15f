//! Template generation and sheet ingestion for campaign setup.

pub mod api;
pub mod cache;
pub mod clients;
pub mod config;
pub mod errors;
pub mod localizer;
pub mod metrics_defs;
pub mod records;
pub mod services;
pub mod workflow;

#[cfg(any(test, feature = "testutils"))]
pub mod testutils;

use crate::config::Config;
use crate::errors::FactoryError;
use crate::services::Services;
use crate::workflow::{Factory, JobQueue};
use shared::admin_service::{AdminService, AdminStatus};
use shared::http::run_http_service;
use shared::metrics_defs::describe_all;
use std::sync::Arc;

pub async fn run(config: Config) -> Result<(), FactoryError> {
    config.validate()?;
    describe_all(metrics_defs::ALL_METRICS);
    describe_all(boundary::metrics_defs::ALL_METRICS);

    let services = Arc::new(Services::from_config(&config));
    let (queue, worker) = JobQueue::new(config.worker.queue_depth);
    let factory = Factory::new(services.clone(), queue);
    let worker = tokio::spawn(worker.run(services));

    let status_factory = factory.clone();
    let admin = AdminService::<_, FactoryError>::new(move || AdminStatus {
        ready: true,
        jobs_in_flight: status_factory.jobs_in_flight(),
    });

    let result = tokio::try_join!(
        api::serve(config.listener.clone(), factory),
        run_http_service(
            &config.admin_listener.host,
            config.admin_listener.port,
            admin
        ),
    );

    worker.abort();
    result.map(|_| ())
}
