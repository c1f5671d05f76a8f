//! Replica-set member ("task") classification
//!
//! A mongod pod is classified from its status snapshot alone: it is
//! `Unobserved` until the scheduler reports a phase, `Running` once the
//! phase is Running and every reported container is running, and
//! `NotRunning` otherwise. Whether the owning StatefulSet is mid-rollout is
//! a separate property of the workload. Nothing is remembered between
//! calls, so flapping is reported as observed.
//!
//! The classifier depends only on the [`WorkerStatus`] and
//! [`WorkloadStatus`] capabilities, implemented here for the Kubernetes
//! `Pod` and `StatefulSet` types and for plain snapshot structs.

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Pod;

use super::container::{
    ENV_MONGODB_REPLSET, MONGODB_PORT_NAME, MONGOD_CONTAINER_NAME, MONGOS_CONTAINER_NAME,
};
use crate::error::{Error, Result};

/// Cluster-internal DNS suffix of per-pod Service names
pub const CLUSTER_SERVICE_DNS_SUFFIX: &str = "svc.cluster.local";

const POD_PHASE_RUNNING: &str = "Running";

/// Run state of one container as reported by the kubelet
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerRunState {
    Running,
    Waiting,
    Terminated,
}

/// A container port declared in the pod spec
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeclaredPort {
    pub name: Option<String>,
    pub container_port: i32,
    pub host_port: i32,
}

/// A container declared in the pod spec
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeclaredContainer {
    pub name: String,
    pub ports: Vec<DeclaredPort>,
    pub env: Vec<(String, String)>,
}

/// What the classifier needs to know about a pod
pub trait WorkerStatus {
    fn worker_name(&self) -> &str;
    /// Reported phase; empty while the scheduler has not reported one
    fn phase(&self) -> &str;
    fn container_states(&self) -> Vec<ContainerRunState>;
    fn declared_containers(&self) -> Vec<DeclaredContainer>;
}

/// What the classifier needs to know about the owning StatefulSet
pub trait WorkloadStatus {
    fn current_revision(&self) -> Option<&str>;
    fn update_revision(&self) -> Option<&str>;
    fn current_replicas(&self) -> i32;
    fn ready_replicas(&self) -> i32;
}

/// Per-worker classification
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerState {
    Unobserved,
    Running,
    NotRunning,
}

/// Worker state plus the rollout state of its owning workload
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Classification {
    pub worker: WorkerState,
    pub updating: bool,
}

/// mongod process kinds, told apart by container name
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskType {
    Mongod,
    Mongos,
}

impl TaskType {
    pub fn container_name(&self) -> &'static str {
        match self {
            TaskType::Mongod => MONGOD_CONTAINER_NAME,
            TaskType::Mongos => MONGOS_CONTAINER_NAME,
        }
    }
}

/// Network address of a replica-set member
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MongoAddr {
    pub host: String,
    pub port: i32,
}

impl std::fmt::Display for MongoAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

pub fn classify_worker(worker: &impl WorkerStatus) -> WorkerState {
    match worker.phase() {
        "" => WorkerState::Unobserved,
        POD_PHASE_RUNNING
            if worker
                .container_states()
                .iter()
                .all(|s| *s == ContainerRunState::Running) =>
        {
            WorkerState::Running
        }
        _ => WorkerState::NotRunning,
    }
}

/// A workload is updating while revisions differ or not all current replicas are ready
pub fn is_updating(workload: &impl WorkloadStatus) -> bool {
    workload.current_revision() != workload.update_revision()
        || workload.ready_replicas() != workload.current_replicas()
}

/// Classify a worker and, when known, its owning workload.
///
/// A missing workload is reported as not updating.
pub fn classify<W, S>(worker: &W, workload: Option<&S>) -> Classification
where
    W: WorkerStatus,
    S: WorkloadStatus,
{
    Classification {
        worker: classify_worker(worker),
        updating: workload.map(is_updating).unwrap_or(false),
    }
}

pub fn is_task_type(worker: &impl WorkerStatus, task_type: TaskType) -> bool {
    worker
        .declared_containers()
        .iter()
        .any(|c| c.name == task_type.container_name())
}

/// Per-pod DNS name under a replica set's headless Service
pub fn mongo_host(pod: &str, service: &str, replset: &str, namespace: &str) -> String {
    let service_domain = format!("{service}-{replset}");
    [
        pod,
        service_domain.as_str(),
        namespace,
        CLUSTER_SERVICE_DNS_SUFFIX,
    ]
    .join(".")
}

/// Resolve the address other members use to reach `worker`.
///
/// Uses the first declared port named `mongodb`; the host port wins over the
/// container port when it is set.
pub fn resolve_address(
    worker: &impl WorkerStatus,
    service: &str,
    replset: &str,
    namespace: &str,
) -> Result<MongoAddr> {
    Ok(MongoAddr {
        host: mongo_host(worker.worker_name(), service, replset, namespace),
        port: mongodb_port(worker)?,
    })
}

/// Port of the first declared port named `mongodb`, host port first
pub fn mongodb_port(worker: &impl WorkerStatus) -> Result<i32> {
    worker
        .declared_containers()
        .iter()
        .flat_map(|c| c.ports.iter())
        .find(|p| p.name.as_deref() == Some(MONGODB_PORT_NAME))
        .map(|p| {
            if p.host_port != 0 {
                p.host_port
            } else {
                p.container_port
            }
        })
        .ok_or_else(|| Error::AddressNotFound {
            pod: worker.worker_name().to_string(),
        })
}

/// Replica set name carried in the mongod container's environment
pub fn replset_name(worker: &impl WorkerStatus) -> Result<String> {
    worker
        .declared_containers()
        .into_iter()
        .filter(|c| c.name == MONGOD_CONTAINER_NAME)
        .flat_map(|c| c.env)
        .find_map(|(name, value)| (name == ENV_MONGODB_REPLSET).then_some(value))
        .ok_or_else(|| Error::ReplsetNameNotFound {
            pod: worker.worker_name().to_string(),
        })
}

// ============================================================================
// Kubernetes objects
// ============================================================================

impl WorkerStatus for Pod {
    fn worker_name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    fn phase(&self) -> &str {
        self.status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .unwrap_or_default()
    }

    fn container_states(&self) -> Vec<ContainerRunState> {
        self.status
            .iter()
            .flat_map(|s| s.container_statuses.iter().flatten())
            .map(|cs| {
                let state = cs.state.as_ref();
                if state.and_then(|s| s.running.as_ref()).is_some() {
                    ContainerRunState::Running
                } else if state.and_then(|s| s.terminated.as_ref()).is_some() {
                    ContainerRunState::Terminated
                } else {
                    ContainerRunState::Waiting
                }
            })
            .collect()
    }

    fn declared_containers(&self) -> Vec<DeclaredContainer> {
        self.spec
            .iter()
            .flat_map(|s| s.containers.iter())
            .map(|c| DeclaredContainer {
                name: c.name.clone(),
                ports: c
                    .ports
                    .iter()
                    .flatten()
                    .map(|p| DeclaredPort {
                        name: p.name.clone(),
                        container_port: p.container_port,
                        host_port: p.host_port.unwrap_or_default(),
                    })
                    .collect(),
                env: c
                    .env
                    .iter()
                    .flatten()
                    .map(|e| (e.name.clone(), e.value.clone().unwrap_or_default()))
                    .collect(),
            })
            .collect()
    }
}

impl WorkloadStatus for StatefulSet {
    fn current_revision(&self) -> Option<&str> {
        self.status.as_ref().and_then(|s| s.current_revision.as_deref())
    }

    fn update_revision(&self) -> Option<&str> {
        self.status.as_ref().and_then(|s| s.update_revision.as_deref())
    }

    fn current_replicas(&self) -> i32 {
        self.status
            .as_ref()
            .and_then(|s| s.current_replicas)
            .unwrap_or_default()
    }

    fn ready_replicas(&self) -> i32 {
        self.status
            .as_ref()
            .and_then(|s| s.ready_replicas)
            .unwrap_or_default()
    }
}

// ============================================================================
// Plain snapshots
// ============================================================================

/// Owned pod snapshot, for callers that do not hold a full `Pod`
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkerSnapshot {
    pub name: String,
    pub phase: String,
    pub container_states: Vec<ContainerRunState>,
    pub containers: Vec<DeclaredContainer>,
}

impl WorkerStatus for WorkerSnapshot {
    fn worker_name(&self) -> &str {
        &self.name
    }

    fn phase(&self) -> &str {
        &self.phase
    }

    fn container_states(&self) -> Vec<ContainerRunState> {
        self.container_states.clone()
    }

    fn declared_containers(&self) -> Vec<DeclaredContainer> {
        self.containers.clone()
    }
}

/// Owned StatefulSet status snapshot
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkloadSnapshot {
    pub current_revision: Option<String>,
    pub update_revision: Option<String>,
    pub current_replicas: i32,
    pub ready_replicas: i32,
}

impl WorkloadStatus for WorkloadSnapshot {
    fn current_revision(&self) -> Option<&str> {
        self.current_revision.as_deref()
    }

    fn update_revision(&self) -> Option<&str> {
        self.update_revision.as_deref()
    }

    fn current_replicas(&self) -> i32 {
        self.current_replicas
    }

    fn ready_replicas(&self) -> i32 {
        self.ready_replicas
    }
}

// ============================================================================
// Task
// ============================================================================

/// Upper-cased pod phase, e.g. `RUNNING`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskState(String);

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One mongod pod together with the StatefulSet that owns it
#[derive(Clone, Debug)]
pub struct Task<'a> {
    pod: &'a Pod,
    statefulset: Option<&'a StatefulSet>,
    service_name: String,
    namespace: String,
}

impl<'a> Task<'a> {
    pub fn new(
        pod: &'a Pod,
        statefulset: Option<&'a StatefulSet>,
        service_name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            pod,
            statefulset,
            service_name: service_name.into(),
            namespace: namespace.into(),
        }
    }

    pub fn name(&self) -> &str {
        self.pod.worker_name()
    }

    pub fn state(&self) -> TaskState {
        TaskState(self.pod.phase().to_uppercase())
    }

    pub fn has_state(&self) -> bool {
        !self.pod.phase().is_empty()
    }

    pub fn classification(&self) -> Classification {
        classify(self.pod, self.statefulset)
    }

    pub fn is_running(&self) -> bool {
        classify_worker(self.pod) == WorkerState::Running
    }

    pub fn is_updating(&self) -> bool {
        self.statefulset.map(is_updating).unwrap_or(false)
    }

    pub fn is_task_type(&self, task_type: TaskType) -> bool {
        is_task_type(self.pod, task_type)
    }

    pub fn replset_name(&self) -> Result<String> {
        replset_name(self.pod)
    }

    /// A missing `mongodb` port is reported before a missing replset name.
    pub fn mongo_addr(&self) -> Result<MongoAddr> {
        let port = mongodb_port(self.pod)?;
        let replset = self.replset_name()?;
        Ok(MongoAddr {
            host: mongo_host(self.name(), &self.service_name, &replset, &self.namespace),
            port,
        })
    }
}
