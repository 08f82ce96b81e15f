//! Metrics definitions for the generation and ingestion workflows.

use shared::metrics_defs::{MetricDef, MetricType};

pub const LOOKUP_CACHE_HIT: MetricDef = MetricDef {
    name: "lookup_cache.hit",
    metric_type: MetricType::Counter,
    description: "Number of localization lookups served from the cache",
};

pub const LOOKUP_CACHE_MISS: MetricDef = MetricDef {
    name: "lookup_cache.miss",
    metric_type: MetricType::Counter,
    description: "Number of localization lookups that went to the localization service",
};

pub const GENERATION_COMPLETED: MetricDef = MetricDef {
    name: "generation.completed",
    metric_type: MetricType::Counter,
    description: "Number of templates generated successfully",
};

pub const GENERATION_FAILED: MetricDef = MetricDef {
    name: "generation.failed",
    metric_type: MetricType::Counter,
    description: "Number of template generations that failed",
};

pub const GENERATION_DURATION: MetricDef = MetricDef {
    name: "generation.duration",
    metric_type: MetricType::Histogram,
    description: "Time to build and upload a template in seconds",
};

pub const INGESTION_COMPLETED: MetricDef = MetricDef {
    name: "ingestion.completed",
    metric_type: MetricType::Counter,
    description: "Number of uploaded sheets processed successfully",
};

pub const INGESTION_FAILED: MetricDef = MetricDef {
    name: "ingestion.failed",
    metric_type: MetricType::Counter,
    description: "Number of uploaded sheets that failed processing",
};

pub const JOBS_IN_FLIGHT: MetricDef = MetricDef {
    name: "worker.jobs_in_flight",
    metric_type: MetricType::Gauge,
    description: "Background jobs accepted but not yet finished",
};

pub const EVENTS_PUBLISH_FAILED: MetricDef = MetricDef {
    name: "events.publish.failed",
    metric_type: MetricType::Counter,
    description: "Number of lifecycle events that could not be published",
};

pub const ALL_METRICS: &[MetricDef] = &[
    LOOKUP_CACHE_HIT,
    LOOKUP_CACHE_MISS,
    GENERATION_COMPLETED,
    GENERATION_FAILED,
    GENERATION_DURATION,
    INGESTION_COMPLETED,
    INGESTION_FAILED,
    JOBS_IN_FLIGHT,
    EVENTS_PUBLISH_FAILED,
];

#[cfg(test)]
mod tests {
    use super::*;
    use shared::metrics_defs::find_duplicate;

    #[test]
    fn test_metric_names_are_unique() {
        assert_eq!(
            find_duplicate(&[ALL_METRICS, boundary::metrics_defs::ALL_METRICS]),
            None
        );
    }
}
