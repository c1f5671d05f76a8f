//! Controller module for PerconaServerMongoDB reconciliation
//!
//! This module contains the defaulting engine, the StatefulSet/Service
//! builders, the replica-set member classifier and the controller loop.

pub mod conditions;
pub mod container;
pub mod defaults;
mod reconciler;
#[cfg(test)]
mod reconciler_test;
pub mod resources;
pub mod task;
#[cfg(test)]
mod task_test;

pub use defaults::{Defaulter, Defaults, FixedPlatform, PlatformProbe, ServerPlatform};
pub use reconciler::{detect_platform, run_controller, ControllerState};
pub use resources::{build_service, build_statefulset, replset_labels, replset_resource_name};
pub use task::{
    classify, classify_worker, is_updating, resolve_address, Classification, MongoAddr, Task,
    TaskType, WorkerState, WorkerStatus, WorkloadStatus,
};
