//! PSMDB-K8s: Kubernetes Operator for Percona Server for MongoDB
//!
//! This crate turns a declarative `PerconaServerMongoDB` resource into one
//! StatefulSet and one headless Service per replica set, and classifies
//! the resulting pods to report readiness and rollout progress.

pub mod controller;
pub mod crd;
pub mod error;

pub use crate::error::{Error, Result};
