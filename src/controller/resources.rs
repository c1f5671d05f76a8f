//! Kubernetes resource builders for PerconaServerMongoDB
//!
//! Each replica set of a cluster is realized as a StatefulSet and a
//! headless Service, both named `<cluster>-<replset>` and owned by the
//! PerconaServerMongoDB so that deleting the cluster cascades.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    Affinity, PersistentVolumeClaim, PersistentVolumeClaimSpec, Pod, PodAffinityTerm,
    PodAntiAffinity, PodSecurityContext, PodSpec, PodTemplateSpec,
    ResourceRequirements as K8sResources, SecretVolumeSource, Service, ServicePort, ServiceSpec,
    Volume, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::{Client, Resource, ResourceExt};
use tracing::{debug, instrument};

use super::container::{
    build_mongod_container, storage_quantity, MONGODB_PORT_NAME, MONGOD_DATA_VOLUME_NAME,
};
use super::defaults::Defaulter;
use crate::crd::{PerconaServerMongoDB, PerconaServerMongoDBSpec, ReplsetSpec};
use crate::error::{Error, Result};

pub const FIELD_MANAGER: &str = "psmdb-operator";

pub const LABEL_APP: &str = "app";
pub const LABEL_CLUSTER: &str = "percona-server-mongodb_cr";
pub const LABEL_REPLSET: &str = "replset";
const APP_NAME: &str = "percona-server-mongodb";

/// Mode of the mounted key-file secret (group read/write)
pub const SECRET_FILE_MODE: i32 = 0o060;
const DEFAULT_DATA_VOLUME_SIZE: &str = "3Gi";
const ANTI_AFFINITY_TOPOLOGY_KEY: &str = "kubernetes.io/hostname";

/// Labels shared by a replica set's pods, StatefulSet selector and Service selector
pub fn replset_labels(cluster_name: &str, replset: &ReplsetSpec) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_APP.to_string(), APP_NAME.to_string()),
        (LABEL_CLUSTER.to_string(), cluster_name.to_string()),
        (LABEL_REPLSET.to_string(), replset.name.clone()),
    ])
}

/// Create an OwnerReference for garbage collection
pub fn owner_reference(cluster: &PerconaServerMongoDB) -> OwnerReference {
    OwnerReference {
        api_version: PerconaServerMongoDB::api_version(&()).to_string(),
        kind: PerconaServerMongoDB::kind(&()).to_string(),
        name: cluster.name_any(),
        uid: cluster.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// `<cluster>-<replset>`, shared by the StatefulSet and its Service
pub fn replset_resource_name(cluster: &PerconaServerMongoDB, replset: &ReplsetSpec) -> String {
    format!("{}-{}", cluster.name_any(), replset.name)
}

fn replset_metadata(cluster: &PerconaServerMongoDB, replset: &ReplsetSpec) -> ObjectMeta {
    ObjectMeta {
        name: Some(replset_resource_name(cluster, replset)),
        namespace: cluster.namespace(),
        labels: Some(replset_labels(&cluster.name_any(), replset)),
        owner_references: Some(vec![owner_reference(cluster)]),
        ..Default::default()
    }
}

// ============================================================================
// StatefulSet
// ============================================================================

/// Build the StatefulSet for one replica set.
///
/// Defaults are applied again here, so a raw cluster can be passed in.
pub fn build_statefulset(
    defaulter: &Defaulter,
    cluster: &PerconaServerMongoDB,
    replset: &ReplsetSpec,
    resources: &K8sResources,
) -> Result<StatefulSet> {
    let spec = defaulter.apply(cluster);
    let replset = &defaulted_replset(defaulter, &spec, replset);
    let labels = replset_labels(&cluster.name_any(), replset);
    let name = replset_resource_name(cluster, replset);
    let key_secret = spec
        .secrets
        .as_ref()
        .map(|s| s.key.clone())
        .ok_or(Error::MissingObjectKey("spec.secrets"))?;

    let pod_spec = PodSpec {
        affinity: Some(build_pod_anti_affinity(&labels)),
        restart_policy: Some("Always".to_string()),
        containers: vec![build_mongod_container(&spec, replset, resources)?],
        security_context: Some(PodSecurityContext {
            fs_group: spec.run_uid,
            ..Default::default()
        }),
        volumes: Some(vec![Volume {
            name: key_secret.clone(),
            secret: Some(SecretVolumeSource {
                default_mode: Some(SECRET_FILE_MODE),
                secret_name: Some(key_secret),
                optional: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        }]),
        ..Default::default()
    };

    Ok(StatefulSet {
        metadata: replset_metadata(cluster, replset),
        spec: Some(StatefulSetSpec {
            service_name: name,
            replicas: Some(replset.size),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(pod_spec),
            },
            volume_claim_templates: Some(build_volume_claim_templates(
                resources,
                replset.storage_class.as_deref(),
            )),
            ..Default::default()
        }),
        status: None,
    })
}

/// The defaulted entry of `replset` in `spec`, matched by name.
///
/// A group the spec does not list still gets the default size.
fn defaulted_replset(
    defaulter: &Defaulter,
    spec: &PerconaServerMongoDBSpec,
    replset: &ReplsetSpec,
) -> ReplsetSpec {
    spec.replsets
        .iter()
        .find(|r| r.name == replset.name)
        .cloned()
        .unwrap_or_else(|| {
            let mut replset = replset.clone();
            if replset.size == 0 {
                replset.size = defaulter.defaults().replset_size;
            }
            replset
        })
}

/// Keep replicas of one replica set on distinct nodes
fn build_pod_anti_affinity(labels: &BTreeMap<String, String>) -> Affinity {
    Affinity {
        pod_anti_affinity: Some(PodAntiAffinity {
            required_during_scheduling_ignored_during_execution: Some(vec![PodAffinityTerm {
                label_selector: Some(LabelSelector {
                    match_labels: Some(labels.clone()),
                    ..Default::default()
                }),
                topology_key: ANTI_AFFINITY_TOPOLOGY_KEY.to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn build_volume_claim_templates(
    resources: &K8sResources,
    storage_class: Option<&str>,
) -> Vec<PersistentVolumeClaim> {
    let size = storage_quantity(resources)
        .unwrap_or_else(|| Quantity(DEFAULT_DATA_VOLUME_SIZE.to_string()));

    vec![PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(MONGOD_DATA_VOLUME_NAME.to_string()),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            storage_class_name: storage_class
                .filter(|class| !class.is_empty())
                .map(str::to_string),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([("storage".to_string(), size)])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        status: None,
    }]
}

// ============================================================================
// Service
// ============================================================================

/// Build the headless Service giving each replica-set member a stable DNS name
pub fn build_service(
    defaulter: &Defaulter,
    cluster: &PerconaServerMongoDB,
    replset: &ReplsetSpec,
) -> Service {
    let spec = defaulter.apply(cluster);
    let port = spec
        .mongod
        .as_ref()
        .and_then(|m| m.net.as_ref())
        .map(|n| n.port)
        .unwrap_or(defaulter.defaults().mongod_port);

    Service {
        metadata: replset_metadata(cluster, replset),
        spec: Some(ServiceSpec {
            ports: Some(vec![ServicePort {
                name: Some(MONGODB_PORT_NAME.to_string()),
                port,
                target_port: Some(IntOrString::Int(port)),
                ..Default::default()
            }]),
            cluster_ip: Some("None".to_string()),
            selector: Some(replset_labels(&cluster.name_any(), replset)),
            ..Default::default()
        }),
        status: None,
    }
}

// ============================================================================
// Apply helpers
// ============================================================================

/// Server-side apply the StatefulSet of a replica set and return the live object
#[instrument(skip_all, fields(name = statefulset.metadata.name.as_deref()))]
pub async fn ensure_statefulset(
    client: &Client,
    namespace: &str,
    statefulset: &StatefulSet,
) -> Result<StatefulSet> {
    let api: Api<StatefulSet> = Api::namespaced(client.clone(), namespace);
    let name = statefulset
        .metadata
        .name
        .as_deref()
        .ok_or(Error::MissingObjectKey("metadata.name"))?;

    let applied = api
        .patch(
            name,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(statefulset),
        )
        .await?;
    debug!("StatefulSet {}/{} applied", namespace, name);
    Ok(applied)
}

/// Server-side apply the headless Service of a replica set
#[instrument(skip_all, fields(name = service.metadata.name.as_deref()))]
pub async fn ensure_service(client: &Client, namespace: &str, service: &Service) -> Result<()> {
    let api: Api<Service> = Api::namespaced(client.clone(), namespace);
    let name = service
        .metadata
        .name
        .as_deref()
        .ok_or(Error::MissingObjectKey("metadata.name"))?;

    api.patch(
        name,
        &PatchParams::apply(FIELD_MANAGER).force(),
        &Patch::Apply(service),
    )
    .await?;
    debug!("Service {}/{} applied", namespace, name);
    Ok(())
}

/// List the pods of a replica set by its label set
pub async fn list_replset_pods(
    client: &Client,
    namespace: &str,
    labels: &BTreeMap<String, String>,
) -> Result<Vec<Pod>> {
    let api: Api<Pod> = Api::namespaced(client.clone(), namespace);
    let selector = labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",");

    let pods = api.list(&ListParams::default().labels(&selector)).await?;
    Ok(pods.items)
}
