//! Unit tests for replica-set member classification and address resolution

#[cfg(test)]
mod tests {
    use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetStatus};
    use k8s_openapi::api::core::v1::{
        Container, ContainerPort, ContainerState, ContainerStateRunning,
        ContainerStateTerminated, ContainerStateWaiting, ContainerStatus, EnvVar, Pod, PodSpec,
        PodStatus,
    };
    use kube::api::ObjectMeta;

    use crate::controller::task::*;
    use crate::error::Error;

    // -----------------------------------------------------------------------
    // Snapshot helpers
    // -----------------------------------------------------------------------

    fn mongod_container(host_port: i32) -> DeclaredContainer {
        DeclaredContainer {
            name: "mongod".to_string(),
            ports: vec![DeclaredPort {
                name: Some("mongodb".to_string()),
                container_port: 27017,
                host_port,
            }],
            env: vec![("MONGODB_REPLSET".to_string(), "rs0".to_string())],
        }
    }

    fn worker(phase: &str, states: Vec<ContainerRunState>) -> WorkerSnapshot {
        WorkerSnapshot {
            name: "mycluster-rs0-0".to_string(),
            phase: phase.to_string(),
            container_states: states,
            containers: vec![mongod_container(0)],
        }
    }

    fn workload(current: &str, update: &str, replicas: i32, ready: i32) -> WorkloadSnapshot {
        WorkloadSnapshot {
            current_revision: Some(current.to_string()),
            update_revision: Some(update.to_string()),
            current_replicas: replicas,
            ready_replicas: ready,
        }
    }

    // -----------------------------------------------------------------------
    // Worker state
    // -----------------------------------------------------------------------

    #[test]
    fn test_running_pod_with_running_containers() {
        let w = worker("Running", vec![ContainerRunState::Running]);
        assert_eq!(classify_worker(&w), WorkerState::Running);
    }

    #[test]
    fn test_pending_pod_is_not_running() {
        let w = worker("Pending", vec![ContainerRunState::Waiting]);
        assert_eq!(classify_worker(&w), WorkerState::NotRunning);
    }

    #[test]
    fn test_pod_without_phase_is_unobserved() {
        let w = worker("", vec![]);
        assert_eq!(classify_worker(&w), WorkerState::Unobserved);
    }

    #[test]
    fn test_running_phase_with_terminated_container_is_not_running() {
        let w = worker(
            "Running",
            vec![ContainerRunState::Running, ContainerRunState::Terminated],
        );
        assert_eq!(classify_worker(&w), WorkerState::NotRunning);
    }

    #[test]
    fn test_failed_and_succeeded_are_not_running() {
        for phase in ["Failed", "Succeeded", "Unknown"] {
            let w = worker(phase, vec![]);
            assert_eq!(
                classify_worker(&w),
                WorkerState::NotRunning,
                "phase {phase} should not be running"
            );
        }
    }

    // -----------------------------------------------------------------------
    // Workload rollout
    // -----------------------------------------------------------------------

    #[test]
    fn test_workload_settled() {
        assert!(!is_updating(&workload("rev-a", "rev-a", 3, 3)));
    }

    #[test]
    fn test_workload_updating_on_revision_mismatch() {
        assert!(is_updating(&workload("rev-a", "rev-b", 3, 3)));
    }

    #[test]
    fn test_workload_updating_on_ready_mismatch() {
        assert!(is_updating(&workload("rev-a", "rev-a", 3, 2)));
    }

    #[test]
    fn test_classify_combines_worker_and_workload() {
        let w = worker("Running", vec![ContainerRunState::Running]);

        let settled = classify(&w, Some(&workload("rev-a", "rev-a", 3, 3)));
        assert_eq!(
            settled,
            Classification {
                worker: WorkerState::Running,
                updating: false,
            }
        );

        let rolling = classify(&w, Some(&workload("rev-a", "rev-b", 3, 3)));
        assert!(rolling.updating);
        assert_eq!(rolling.worker, WorkerState::Running);
    }

    #[test]
    fn test_classify_without_workload_is_not_updating() {
        let w = worker("Pending", vec![]);
        let c = classify(&w, None::<&WorkloadSnapshot>);
        assert_eq!(c.worker, WorkerState::NotRunning);
        assert!(!c.updating);
    }

    #[test]
    fn test_classification_is_stateless() {
        let w = worker("Running", vec![ContainerRunState::Running]);
        let first = classify_worker(&w);
        let _ = classify_worker(&worker("Pending", vec![]));
        assert_eq!(classify_worker(&w), first);
    }

    // -----------------------------------------------------------------------
    // Task type
    // -----------------------------------------------------------------------

    #[test]
    fn test_task_type_by_container_name() {
        let w = worker("Running", vec![]);
        assert!(is_task_type(&w, TaskType::Mongod));
        assert!(!is_task_type(&w, TaskType::Mongos));
    }

    // -----------------------------------------------------------------------
    // Address resolution
    // -----------------------------------------------------------------------

    #[test]
    fn test_mongo_host() {
        assert_eq!(
            mongo_host("mycluster-rs0-0", "mycluster", "rs0", "default"),
            "mycluster-rs0-0.mycluster-rs0.default.svc.cluster.local"
        );
    }

    #[test]
    fn test_resolve_address_uses_container_port() {
        let addr = resolve_address(&worker("Running", vec![]), "mycluster", "rs0", "default")
            .unwrap();

        assert_eq!(addr.port, 27017);
        assert_eq!(
            addr.to_string(),
            "mycluster-rs0-0.mycluster-rs0.default.svc.cluster.local:27017"
        );
    }

    #[test]
    fn test_resolve_address_prefers_host_port() {
        let w = WorkerSnapshot {
            containers: vec![mongod_container(30017)],
            ..worker("Running", vec![])
        };
        let addr = resolve_address(&w, "mycluster", "rs0", "default").unwrap();
        assert_eq!(addr.port, 30017);
    }

    #[test]
    fn test_resolve_address_skips_unnamed_ports() {
        let w = WorkerSnapshot {
            containers: vec![DeclaredContainer {
                name: "mongod".to_string(),
                ports: vec![
                    DeclaredPort {
                        name: Some("metrics".to_string()),
                        container_port: 9216,
                        host_port: 0,
                    },
                    DeclaredPort {
                        name: Some("mongodb".to_string()),
                        container_port: 27018,
                        host_port: 0,
                    },
                ],
                env: vec![],
            }],
            ..worker("Running", vec![])
        };

        let addr = resolve_address(&w, "mycluster", "rs0", "default").unwrap();
        assert_eq!(addr.port, 27018);
    }

    #[test]
    fn test_resolve_address_without_mongodb_port() {
        let w = WorkerSnapshot {
            containers: vec![],
            ..worker("Running", vec![])
        };

        let err = resolve_address(&w, "mycluster", "rs0", "default").unwrap_err();
        assert!(matches!(err, Error::AddressNotFound { ref pod } if pod == "mycluster-rs0-0"));
        assert_eq!(
            err.to_string(),
            "could not find mongodb address for pod mycluster-rs0-0"
        );
    }

    #[test]
    fn test_replset_name_from_env() {
        assert_eq!(replset_name(&worker("Running", vec![])).unwrap(), "rs0");

        let w = WorkerSnapshot {
            containers: vec![DeclaredContainer {
                name: "mongod".to_string(),
                ..Default::default()
            }],
            ..worker("Running", vec![])
        };
        assert!(matches!(
            replset_name(&w),
            Err(Error::ReplsetNameNotFound { .. })
        ));
    }

    // -----------------------------------------------------------------------
    // Kubernetes objects
    // -----------------------------------------------------------------------

    fn container_status(state: ContainerState) -> ContainerStatus {
        ContainerStatus {
            name: "mongod".to_string(),
            state: Some(state),
            ..Default::default()
        }
    }

    fn pod(phase: Option<&str>, statuses: Vec<ContainerStatus>) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some("mycluster-rs0-1".to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: "mongod".to_string(),
                    ports: Some(vec![ContainerPort {
                        name: Some("mongodb".to_string()),
                        container_port: 27017,
                        ..Default::default()
                    }]),
                    env: Some(vec![EnvVar {
                        name: "MONGODB_REPLSET".to_string(),
                        value: Some("rs0".to_string()),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            status: Some(PodStatus {
                phase: phase.map(str::to_string),
                container_statuses: Some(statuses),
                ..Default::default()
            }),
        }
    }

    fn running() -> ContainerState {
        ContainerState {
            running: Some(ContainerStateRunning::default()),
            ..Default::default()
        }
    }

    fn statefulset(current: &str, update: &str) -> StatefulSet {
        StatefulSet {
            status: Some(StatefulSetStatus {
                current_revision: Some(current.to_string()),
                update_revision: Some(update.to_string()),
                current_replicas: Some(3),
                ready_replicas: Some(3),
                replicas: 3,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_pod_container_states() {
        let p = pod(
            Some("Running"),
            vec![
                container_status(running()),
                container_status(ContainerState {
                    waiting: Some(ContainerStateWaiting::default()),
                    ..Default::default()
                }),
                container_status(ContainerState {
                    terminated: Some(ContainerStateTerminated::default()),
                    ..Default::default()
                }),
            ],
        );

        assert_eq!(
            p.container_states(),
            vec![
                ContainerRunState::Running,
                ContainerRunState::Waiting,
                ContainerRunState::Terminated,
            ]
        );
        assert_eq!(classify_worker(&p), WorkerState::NotRunning);
    }

    #[test]
    fn test_task_on_running_pod() {
        let p = pod(Some("Running"), vec![container_status(running())]);
        let sts = statefulset("rev-a", "rev-a");
        let task = Task::new(&p, Some(&sts), "mycluster", "default");

        assert_eq!(task.name(), "mycluster-rs0-1");
        assert_eq!(task.state().to_string(), "RUNNING");
        assert!(task.has_state());
        assert!(task.is_running());
        assert!(!task.is_updating());
        assert!(task.is_task_type(TaskType::Mongod));
        assert_eq!(task.replset_name().unwrap(), "rs0");
        assert_eq!(
            task.mongo_addr().unwrap(),
            MongoAddr {
                host: "mycluster-rs0-1.mycluster-rs0.default.svc.cluster.local".to_string(),
                port: 27017,
            }
        );
    }

    #[test]
    fn test_task_without_port_or_env_reports_address_not_found() {
        let mut p = pod(Some("Running"), vec![container_status(running())]);
        p.spec = Some(PodSpec {
            containers: vec![Container {
                name: "mongod".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        });
        let task = Task::new(&p, None, "mycluster", "default");

        let err = task.mongo_addr().unwrap_err();
        assert!(
            matches!(err, Error::AddressNotFound { ref pod } if pod == "mycluster-rs0-1"),
            "expected AddressNotFound, got {err:?}"
        );
    }

    #[test]
    fn test_task_with_port_but_no_replset_env() {
        let mut p = pod(Some("Running"), vec![container_status(running())]);
        if let Some(spec) = p.spec.as_mut() {
            spec.containers[0].env = None;
        }
        let task = Task::new(&p, None, "mycluster", "default");

        assert!(matches!(
            task.mongo_addr(),
            Err(Error::ReplsetNameNotFound { .. })
        ));
    }

    #[test]
    fn test_task_on_unscheduled_pod() {
        let p = pod(None, vec![]);
        let sts = statefulset("rev-a", "rev-b");
        let task = Task::new(&p, Some(&sts), "mycluster", "default");

        assert!(!task.has_state());
        assert_eq!(task.state().to_string(), "");
        assert_eq!(
            task.classification(),
            Classification {
                worker: WorkerState::Unobserved,
                updating: true,
            }
        );
    }
}
