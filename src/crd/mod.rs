//! Custom Resource Definitions for PSMDB-K8s
//!
//! This module defines the PerconaServerMongoDB CRD and its shared types.

mod psmdb;
pub mod types;


pub use psmdb::{
    PerconaServerMongoDB, PerconaServerMongoDBSpec, PerconaServerMongoDBStatus,
    ReplsetMemberStatus, ReplsetStatus,
};
pub use types::*;
