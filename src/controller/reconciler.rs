//! Main reconciler for PerconaServerMongoDB resources
//!
//! Implements the controller pattern using kube-rs runtime. Every pass
//! re-derives the desired state from the stored spec: defaults are applied
//! to a private copy, each replica set's Service and StatefulSet are
//! server-side applied, and the replica set's pods are classified to build
//! the status.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::{
    api::{Api, Patch, PatchParams},
    client::Client,
    runtime::{
        controller::{Action, Controller},
        watcher::Config,
    },
    ResourceExt,
};
use tracing::{debug, error, info, instrument, warn};

use super::conditions::cluster_conditions;
use super::container::parse_resource_requirements;
use super::defaults::Defaulter;
use super::resources::{self, FIELD_MANAGER};
use super::task::{is_updating, Task, TaskType, WorkerState};
use crate::crd::{
    PerconaServerMongoDB, PerconaServerMongoDBStatus, Platform, ReplsetMemberStatus, ReplsetSpec,
    ReplsetStatus,
};
use crate::error::{Error, Result};

const OPENSHIFT_API_GROUP: &str = "security.openshift.io";
const UNOBSERVED_STATE: &str = "UNOBSERVED";

const REQUEUE_READY: Duration = Duration::from_secs(60);
const REQUEUE_PROGRESSING: Duration = Duration::from_secs(15);

/// Shared state for the controller
pub struct ControllerState {
    pub client: Client,
    pub defaulter: Defaulter,
}

/// Detect whether the API server is an OpenShift cluster
pub async fn detect_platform(client: &Client) -> Result<Platform> {
    let groups = client.list_api_groups().await?;
    let is_openshift = groups.groups.iter().any(|g| g.name == OPENSHIFT_API_GROUP);
    Ok(if is_openshift {
        Platform::Openshift
    } else {
        Platform::Kubernetes
    })
}

/// Main entry point to start the controller
///
/// Watches every namespace unless `namespace` is given.
pub async fn run_controller(state: Arc<ControllerState>, namespace: Option<String>) -> Result<()> {
    let client = state.client.clone();
    let clusters: Api<PerconaServerMongoDB> = match &namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    };

    info!("Starting PerconaServerMongoDB controller");

    // Verify CRD exists
    if let Err(e) = clusters.list(&Default::default()).await {
        error!(
            "PerconaServerMongoDB CRD not found. Please install the CRD first: {:?}",
            e
        );
        return Err(Error::ConfigError(
            "PerconaServerMongoDB CRD not installed".to_string(),
        ));
    }

    let (statefulsets, services): (Api<StatefulSet>, Api<Service>) = match &namespace {
        Some(ns) => (
            Api::namespaced(client.clone(), ns),
            Api::namespaced(client.clone(), ns),
        ),
        None => (Api::all(client.clone()), Api::all(client.clone())),
    };

    Controller::new(clusters, Config::default())
        .owns(statefulsets, Config::default())
        .owns(services, Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, state)
        .for_each(|res| async move {
            match res {
                Ok(obj) => debug!("Reconciled: {:?}", obj),
                Err(e) => error!("Reconcile error: {:?}", e),
            }
        })
        .await;

    Ok(())
}

/// The main reconciliation function
///
/// Called whenever a PerconaServerMongoDB or one of its StatefulSets or
/// Services changes, and when the requeue timer expires.
#[instrument(skip(ctx), fields(name = %obj.name_any(), namespace = obj.namespace()))]
async fn reconcile(obj: Arc<PerconaServerMongoDB>, ctx: Arc<ControllerState>) -> Result<Action> {
    let client = &ctx.client;
    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());
    let name = obj.name_any();

    info!("Reconciling PerconaServerMongoDB {}/{}", namespace, name);

    let mut cluster = (*obj).clone();
    cluster.spec = ctx.defaulter.apply(&obj);

    let requirements = parse_resource_requirements(
        cluster
            .spec
            .mongod
            .as_ref()
            .and_then(|m| m.resources.as_ref()),
    )?;

    let mut replsets = Vec::with_capacity(cluster.spec.replsets.len());
    for replset in &cluster.spec.replsets {
        let service = resources::build_service(&ctx.defaulter, &cluster, replset);
        resources::ensure_service(client, &namespace, &service).await?;

        let statefulset =
            resources::build_statefulset(&ctx.defaulter, &cluster, replset, &requirements)?;
        let live = resources::ensure_statefulset(client, &namespace, &statefulset).await?;

        let labels = resources::replset_labels(&name, replset);
        let pods = resources::list_replset_pods(client, &namespace, &labels).await?;

        let status = observe_replset(&name, &namespace, replset, Some(&live), &pods);
        info!(
            "Replset {}/{}-{}: {}/{} ready, updating={}",
            namespace, name, replset.name, status.ready, status.size, status.updating
        );
        replsets.push(status);
    }

    let ready = !replsets.is_empty() && replsets.iter().all(ReplsetStatus::is_ready);
    update_status(client, &obj, replsets).await?;

    Ok(Action::requeue(if ready {
        REQUEUE_READY
    } else {
        REQUEUE_PROGRESSING
    }))
}

/// Classify the pods of one replica set into its status entry
pub(crate) fn observe_replset(
    cluster_name: &str,
    namespace: &str,
    replset: &ReplsetSpec,
    statefulset: Option<&StatefulSet>,
    pods: &[Pod],
) -> ReplsetStatus {
    let mut ready = 0;
    let mut members = Vec::with_capacity(pods.len());

    for pod in pods {
        let task = Task::new(pod, statefulset, cluster_name, namespace);
        if !task.is_task_type(TaskType::Mongod) {
            continue;
        }

        let classification = task.classification();
        if classification.worker == WorkerState::Running {
            ready += 1;
        }

        let state = match classification.worker {
            WorkerState::Unobserved => UNOBSERVED_STATE.to_string(),
            _ => task.state().to_string(),
        };

        let address = match task.mongo_addr() {
            Ok(addr) => Some(addr.to_string()),
            Err(e) => {
                debug!("Member {} not reachable yet: {}", task.name(), e);
                None
            }
        };

        members.push(ReplsetMemberStatus {
            name: task.name().to_string(),
            state,
            address,
        });
    }
    members.sort_by(|a, b| a.name.cmp(&b.name));

    ReplsetStatus {
        name: replset.name.clone(),
        size: replset.size,
        ready,
        updating: statefulset.map(is_updating).unwrap_or(false),
        members,
    }
}

/// Update the status subresource of a PerconaServerMongoDB
async fn update_status(
    client: &Client,
    cluster: &PerconaServerMongoDB,
    replsets: Vec<ReplsetStatus>,
) -> Result<()> {
    let namespace = cluster.namespace().unwrap_or_else(|| "default".to_string());
    let api: Api<PerconaServerMongoDB> = Api::namespaced(client.clone(), &namespace);

    let previous = cluster
        .status
        .as_ref()
        .map(|s| s.conditions.as_slice())
        .unwrap_or_default();
    let conditions = cluster_conditions(previous, &replsets, cluster.metadata.generation);

    let ready = replsets.iter().filter(|r| r.is_ready()).count();
    let status = PerconaServerMongoDBStatus {
        message: Some(format!("{}/{} replica sets ready", ready, replsets.len())),
        observed_generation: cluster.metadata.generation,
        replsets,
        conditions,
    };

    let patch = serde_json::json!({ "status": serde_json::to_value(&status)? });
    api.patch_status(
        &cluster.name_any(),
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(&patch),
    )
    .await
    .map_err(Error::KubeError)?;

    Ok(())
}

fn error_policy(
    cluster: Arc<PerconaServerMongoDB>,
    error: &Error,
    _ctx: Arc<ControllerState>,
) -> Action {
    warn!("Reconciliation error for {}: {:?}", cluster.name_any(), error);

    let retry_duration = if error.is_retriable() {
        Duration::from_secs(15)
    } else {
        Duration::from_secs(60)
    };

    Action::requeue(retry_duration)
}
