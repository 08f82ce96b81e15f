//! Metrics definitions for boundary reconciliation.

use shared::metrics_defs::{MetricDef, MetricType};

pub const BOUNDARY_CODES_GENERATED: MetricDef = MetricDef {
    name: "boundary.codes.generated",
    metric_type: MetricType::Counter,
    description: "Number of boundary codes generated from uploaded sheets",
};

pub const REGISTRY_REQUEST_DURATION: MetricDef = MetricDef {
    name: "boundary.registry.request.duration",
    metric_type: MetricType::Histogram,
    description: "Time taken by a boundary registry request in seconds",
};

pub const BOUNDARY_ENTITIES_CREATED: MetricDef = MetricDef {
    name: "boundary.entities.created",
    metric_type: MetricType::Counter,
    description: "Number of boundary entities created in the registry",
};

pub const BOUNDARY_RELATIONSHIPS_CREATED: MetricDef = MetricDef {
    name: "boundary.relationships.created",
    metric_type: MetricType::Counter,
    description: "Number of boundary relationships created in the registry",
};

pub const PARENT_CONFIRMATION_RETRIES: MetricDef = MetricDef {
    name: "boundary.parent_confirmation.retries",
    metric_type: MetricType::Counter,
    description: "Number of times a parent boundary was not yet visible and was polled again",
};

pub const ALL_METRICS: &[MetricDef] = &[
    BOUNDARY_CODES_GENERATED,
    REGISTRY_REQUEST_DURATION,
    BOUNDARY_ENTITIES_CREATED,
    BOUNDARY_RELATIONSHIPS_CREATED,
    PARENT_CONFIRMATION_RETRIES,
];
