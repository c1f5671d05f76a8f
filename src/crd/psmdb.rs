//! PerconaServerMongoDB Custom Resource Definition
//!
//! A PerconaServerMongoDB describes one MongoDB cluster made of one or more
//! replica sets. Each replica set becomes a StatefulSet plus a headless
//! Service named `<cluster>-<replset>`.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Condition, MongodSpec, Platform, ReplsetSpec, SecretsSpec};

#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "psmdb.percona.com",
    version = "v1alpha1",
    kind = "PerconaServerMongoDB",
    plural = "perconaservermongodbs",
    namespaced,
    status = "PerconaServerMongoDBStatus",
    derive = "PartialEq",
    shortname = "psmdb",
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".spec.version"}"#,
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type=='Ready')].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PerconaServerMongoDBSpec {
    /// Percona Server for MongoDB image tag
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image_pull_policy: String,

    /// Forces the platform variant instead of the one detected at start-up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,

    /// OS user id mongod runs as (also used as the pod fsGroup)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_uid: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets: Option<SecretsSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mongod: Option<MongodSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replsets: Vec<ReplsetSpec>,
}

/// Observed state of a PerconaServerMongoDB
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PerconaServerMongoDBStatus {
    /// Human-readable message about current state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replsets: Vec<ReplsetStatus>,

    /// Readiness conditions following Kubernetes conventions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReplsetStatus {
    pub name: String,
    pub size: i32,
    /// Members whose pod and containers are all running
    pub ready: i32,
    /// The owning StatefulSet is mid-rollout
    #[serde(default)]
    pub updating: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<ReplsetMemberStatus>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReplsetMemberStatus {
    pub name: String,
    /// Upper-cased pod phase, or `UNOBSERVED`
    pub state: String,
    /// `host:port` other members use to reach this one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl ReplsetStatus {
    pub fn is_ready(&self) -> bool {
        !self.updating && self.size > 0 && self.ready >= self.size
    }
}
