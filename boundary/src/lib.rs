pub mod code_gen;
pub mod hierarchy;
pub mod metrics_defs;
pub mod reconciler;
pub mod registry;
pub mod types;

#[cfg(any(test, feature = "testutils"))]
pub mod testutils;

pub use hierarchy::{BoundaryFilter, ChildParentMap, HierarchyError};
pub use reconciler::{
    BoundaryRow, ReconcileConfig, ReconcileError, ReconcileOutcome, Reconciler,
};
pub use registry::{BoundaryRegistry, HttpRegistry, RegistryError, RegistryPaths};
pub use types::{BoundaryNode, ElementKey, HierarchyLevel, RunContext};
