//! Shared types for PerconaServerMongoDB resources
//!
//! These types are used across the CRD definitions and controller logic.
//! Every field is optional on the wire; the defaulting engine in
//! [`crate::controller::defaults`] fills whatever the user left unset.
//!
//! # Type Hierarchy
//!
//! - [`SecretsSpec`] - Names of the key-file and users secrets
//! - [`MongodSpec`] - mongod process settings (network, storage, profiling, resources)
//! - [`ReplsetSpec`] - One replica set: name, member count and storage class
//! - [`EngineSettings`] - Typed view of the storage block for the selected engine

use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Platform variant the cluster runs on
///
/// OpenShift assigns arbitrary uids per namespace, so a fixed `runUid`
/// must not be injected there.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Kubernetes,
    Openshift,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Kubernetes => write!(f, "kubernetes"),
            Platform::Openshift => write!(f, "openshift"),
        }
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "kubernetes" | "k8s" => Ok(Platform::Kubernetes),
            "openshift" => Ok(Platform::Openshift),
            other => Err(format!("unknown platform {other:?}")),
        }
    }
}

/// Secret names used by the mongod pods
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretsSpec {
    /// Secret holding the replica-set key file
    #[serde(default)]
    pub key: String,
    /// Secret holding the application user credentials
    #[serde(default)]
    pub users: String,
}

/// A single replica set of the cluster
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReplsetSpec {
    pub name: String,
    /// Desired member count; zero means "use the default"
    #[serde(default)]
    pub size: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
}

/// mongod process configuration
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MongodSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net: Option<MongodSpecNet>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<MongodSpecStorage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_profiling: Option<MongodSpecOperationProfiling>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesSpec>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MongodSpecNet {
    #[serde(default)]
    pub port: i32,
    /// Port exposed on the node; zero leaves the port unmapped
    #[serde(default)]
    pub host_port: i32,
}

/// Supported mongod storage engines
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum StorageEngine {
    #[serde(rename = "wiredTiger")]
    WiredTiger,
    #[serde(rename = "inMemory")]
    InMemory,
}

impl std::fmt::Display for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageEngine::WiredTiger => write!(f, "wiredTiger"),
            StorageEngine::InMemory => write!(f, "inMemory"),
        }
    }
}

/// Storage configuration as written in the manifest
///
/// Both engine blocks may be present on the wire, but only the block of the
/// selected [`StorageEngine`] is ever read; use
/// [`MongodSpecStorage::engine_settings`] rather than probing the blocks.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MongodSpecStorage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<StorageEngine>,

    #[serde(default, rename = "directoryPerDB")]
    pub directory_per_db: bool,

    #[serde(default)]
    pub sync_period_secs: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wired_tiger: Option<MongodSpecWiredTiger>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_memory: Option<MongodSpecInMemory>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MongodSpecWiredTiger {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_config: Option<WiredTigerEngineConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_config: Option<WiredTigerCollectionConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_config: Option<WiredTigerIndexConfig>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WiredTigerEngineConfig {
    /// Share of the memory limit (minus 1GB) given to the WiredTiger cache
    #[serde(default)]
    pub cache_size_ratio: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal_compressor: Option<WiredTigerCompressor>,

    #[serde(default)]
    pub directory_for_indexes: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WiredTigerCollectionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_compressor: Option<WiredTigerCompressor>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WiredTigerIndexConfig {
    #[serde(default)]
    pub prefix_compression: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum WiredTigerCompressor {
    None,
    Snappy,
    Zlib,
}

impl std::fmt::Display for WiredTigerCompressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WiredTigerCompressor::None => write!(f, "none"),
            WiredTigerCompressor::Snappy => write!(f, "snappy"),
            WiredTigerCompressor::Zlib => write!(f, "zlib"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MongodSpecInMemory {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_config: Option<InMemoryEngineConfig>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InMemoryEngineConfig {
    /// Share of the memory limit given to the in-memory store
    #[serde(default)]
    pub in_memory_size_ratio: f64,
}

/// Typed settings of the selected storage engine
///
/// Each variant carries only the knobs its engine understands.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineSettings {
    WiredTiger(WiredTigerSettings),
    InMemory(InMemorySettings),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct WiredTigerSettings {
    pub cache_size_ratio: f64,
    pub journal_compressor: Option<WiredTigerCompressor>,
    pub directory_for_indexes: bool,
    pub block_compressor: Option<WiredTigerCompressor>,
    pub index_prefix_compression: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct InMemorySettings {
    pub size_ratio: f64,
}

impl MongodSpecStorage {
    /// Settings for the selected engine, or `None` when no engine is chosen.
    ///
    /// Absent blocks read as zero values, so call this on a defaulted spec.
    pub fn engine_settings(&self) -> Option<EngineSettings> {
        match self.engine? {
            StorageEngine::WiredTiger => {
                let wt = self.wired_tiger.clone().unwrap_or_default();
                let engine = wt.engine_config.unwrap_or_default();
                Some(EngineSettings::WiredTiger(WiredTigerSettings {
                    cache_size_ratio: engine.cache_size_ratio,
                    journal_compressor: engine.journal_compressor,
                    directory_for_indexes: engine.directory_for_indexes,
                    block_compressor: wt.collection_config.and_then(|c| c.block_compressor),
                    index_prefix_compression: wt
                        .index_config
                        .map(|i| i.prefix_compression)
                        .unwrap_or(false),
                }))
            }
            StorageEngine::InMemory => {
                let size_ratio = self
                    .in_memory
                    .as_ref()
                    .and_then(|m| m.engine_config.as_ref())
                    .map(|c| c.in_memory_size_ratio)
                    .unwrap_or_default();
                Some(EngineSettings::InMemory(InMemorySettings { size_ratio }))
            }
        }
    }
}

/// Database profiler level
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum OperationProfilingMode {
    #[serde(rename = "off")]
    Off,
    #[default]
    #[serde(rename = "slowOp")]
    SlowOp,
    #[serde(rename = "all")]
    All,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MongodSpecOperationProfiling {
    #[serde(default)]
    pub mode: OperationProfilingMode,

    #[serde(default)]
    pub slow_ops_threshold_ms: i32,

    #[serde(default)]
    pub rate_limit: i32,
}

/// Kubernetes-style resource requests and limits for mongod
///
/// Quantities follow Kubernetes conventions:
/// - CPU: `"500m"` (millicores), `"2"` (cores)
/// - Memory / storage: `"512Mi"`, `"1Gi"`, `"3G"`
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourcesSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<ResourceSpecRequirements>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests: Option<ResourceSpecRequirements>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpecRequirements {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cpu: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub memory: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub storage: String,
}

/// Kubernetes-style condition on the cluster status
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition (e.g., "Ready", "Progressing", "Degraded")
    #[serde(rename = "type")]
    pub type_: String,
    /// Status of the condition: "True", "False", or "Unknown"
    pub status: String,
    /// Last time the condition transitioned
    pub last_transition_time: String,
    /// Machine-readable reason for the condition
    pub reason: String,
    /// Human-readable message
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}
