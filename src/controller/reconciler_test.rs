//! Unit tests for replica-set status observation
//!
//! The builders are used to produce pods the way the StatefulSet controller
//! would, so these tests cover the path from spec to status without an API
//! server.

#[cfg(test)]
mod tests {
    use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetStatus};
    use k8s_openapi::api::core::v1::{
        Container, ContainerState, ContainerStateRunning, ContainerStatus, Pod, PodStatus,
        ResourceRequirements as K8sResources,
    };
    use kube::api::ObjectMeta;

    use crate::controller::defaults::{Defaulter, Defaults, FixedPlatform};
    use crate::controller::reconciler::observe_replset;
    use crate::controller::resources::build_statefulset;
    use crate::crd::{PerconaServerMongoDB, PerconaServerMongoDBSpec, Platform, ReplsetSpec};

    fn fixtures() -> (PerconaServerMongoDB, ReplsetSpec, StatefulSet) {
        let cluster = PerconaServerMongoDB {
            metadata: ObjectMeta {
                name: Some("mycluster".to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            spec: PerconaServerMongoDBSpec::default(),
            status: None,
        };
        let replset = ReplsetSpec {
            name: "rs0".to_string(),
            size: 3,
            storage_class: None,
        };
        let defaulter = Defaulter::new(Defaults::default(), FixedPlatform(Platform::Kubernetes));
        let sts =
            build_statefulset(&defaulter, &cluster, &replset, &K8sResources::default()).unwrap();
        (cluster, replset, sts)
    }

    /// Instantiate pod `ordinal` from the StatefulSet template
    fn pod_from(sts: &StatefulSet, ordinal: usize, phase: Option<&str>, running: bool) -> Pod {
        let template = sts.spec.as_ref().unwrap().template.clone();
        let name = format!("{}-{}", sts.metadata.name.as_deref().unwrap(), ordinal);

        let state = running.then(|| ContainerState {
            running: Some(ContainerStateRunning::default()),
            ..Default::default()
        });

        Pod {
            metadata: ObjectMeta {
                name: Some(name),
                namespace: Some("default".to_string()),
                labels: template.metadata.and_then(|m| m.labels),
                ..Default::default()
            },
            spec: template.spec,
            status: Some(PodStatus {
                phase: phase.map(str::to_string),
                container_statuses: Some(vec![ContainerStatus {
                    name: "mongod".to_string(),
                    state,
                    ..Default::default()
                }]),
                ..Default::default()
            }),
        }
    }

    fn with_status(mut sts: StatefulSet, current: &str, update: &str, ready: i32) -> StatefulSet {
        sts.status = Some(StatefulSetStatus {
            replicas: 3,
            current_replicas: Some(3),
            ready_replicas: Some(ready),
            current_revision: Some(current.to_string()),
            update_revision: Some(update.to_string()),
            ..Default::default()
        });
        sts
    }

    #[test]
    fn test_all_members_running() {
        let (_, replset, sts) = fixtures();
        let pods: Vec<Pod> = (0..3)
            .map(|i| pod_from(&sts, i, Some("Running"), true))
            .collect();
        let live = with_status(sts, "rev-a", "rev-a", 3);

        let status = observe_replset("mycluster", "default", &replset, Some(&live), &pods);

        assert_eq!(status.name, "rs0");
        assert_eq!(status.size, 3);
        assert_eq!(status.ready, 3);
        assert!(!status.updating);
        assert!(status.is_ready());
        assert_eq!(status.members.len(), 3);
        assert_eq!(status.members[0].name, "mycluster-rs0-0");
        assert_eq!(status.members[0].state, "RUNNING");
        assert_eq!(
            status.members[0].address.as_deref(),
            Some("mycluster-rs0-0.mycluster-rs0.default.svc.cluster.local:27017")
        );
    }

    #[test]
    fn test_mixed_member_states() {
        let (_, replset, sts) = fixtures();
        let pods = vec![
            pod_from(&sts, 2, None, false),
            pod_from(&sts, 0, Some("Running"), true),
            pod_from(&sts, 1, Some("Pending"), false),
        ];
        let live = with_status(sts, "rev-a", "rev-b", 1);

        let status = observe_replset("mycluster", "default", &replset, Some(&live), &pods);

        assert_eq!(status.ready, 1);
        assert!(status.updating);
        assert!(!status.is_ready());

        let states: Vec<&str> = status.members.iter().map(|m| m.state.as_str()).collect();
        assert_eq!(states, vec!["RUNNING", "PENDING", "UNOBSERVED"]);
    }

    #[test]
    fn test_non_mongod_pods_are_ignored() {
        let (_, replset, sts) = fixtures();
        let mut sidecar = pod_from(&sts, 9, Some("Running"), true);
        if let Some(spec) = sidecar.spec.as_mut() {
            spec.containers = vec![Container {
                name: "backup-agent".to_string(),
                ..Default::default()
            }];
        }
        let pods = vec![pod_from(&sts, 0, Some("Running"), true), sidecar];

        let status = observe_replset("mycluster", "default", &replset, None, &pods);

        assert_eq!(status.members.len(), 1);
        assert_eq!(status.ready, 1);
        assert!(!status.updating);
    }

    #[test]
    fn test_member_without_address() {
        let (_, replset, sts) = fixtures();
        let mut p = pod_from(&sts, 0, Some("Running"), true);
        if let Some(spec) = p.spec.as_mut() {
            spec.containers[0].ports = None;
        }

        let status = observe_replset("mycluster", "default", &replset, None, &[p]);

        assert_eq!(status.members.len(), 1);
        assert_eq!(status.members[0].address, None);
    }
}
