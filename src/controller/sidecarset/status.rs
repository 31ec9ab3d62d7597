use super::control::SidecarSetControl;
use super::eligibility::UpgradeControl;
use super::instance::Instance;
use crate::crd::sidecarset::{SidecarSet, SidecarSetStatus};
use std::time::Duration;

/// Requeue interval while pods are still waiting for the latest revision
pub const REQUEUE_PROGRESSING: Duration = Duration::from_secs(30);

/// Requeue interval once every matched pod runs the latest revision
pub const REQUEUE_SETTLED: Duration = Duration::from_secs(300);

/// Compute SidecarSet status from the injected pods
///
/// # Arguments
/// * `sidecarset` - The SidecarSet being reconciled
/// * `instances` - Pods matched by the SidecarSet selector with it injected
/// * `control` - Revision predicates for this SidecarSet
pub fn calculate_status(
    sidecarset: &SidecarSet,
    instances: &[Instance],
    control: &SidecarSetControl,
) -> SidecarSetStatus {
    let mut status = SidecarSetStatus {
        observed_generation: sidecarset.metadata.generation,
        matched_pods: count(instances.len()),
        latest_hash: Some(control.hashes.full.clone()),
        ..Default::default()
    };

    for instance in instances {
        let updated = control.is_updated(instance);
        if updated {
            status.updated_pods += 1;
        }
        if instance.ready {
            status.ready_pods += 1;
            if updated {
                status.updated_ready_pods += 1;
            }
        }
    }

    status
}

/// Poll quickly while the rollout is in progress, slowly once settled
pub fn calculate_requeue_interval(status: &SidecarSetStatus) -> Duration {
    if status.updated_ready_pods < status.matched_pods {
        REQUEUE_PROGRESSING
    } else {
        REQUEUE_SETTLED
    }
}

fn count(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::sidecarset::hash::TemplateHash;
    use crate::crd::sidecarset::SidecarSetSpec;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

    fn control() -> SidecarSetControl {
        SidecarSetControl {
            name: "test-sidecarset".to_string(),
            hashes: TemplateHash {
                full: "bbb".to_string(),
                without_image: "without-aaa".to_string(),
            },
            sidecar_names: vec!["test-sidecar".to_string()],
        }
    }

    fn pod(name: &str, hash: &str, ready: bool) -> Instance {
        Instance {
            ready,
            revisions: [("test-sidecarset".to_string(), hash.to_string())]
                .into_iter()
                .collect(),
            ..Instance::new(name)
        }
    }

    fn sidecarset() -> SidecarSet {
        let mut ss = SidecarSet::new(
            "test-sidecarset",
            SidecarSetSpec {
                selector: LabelSelector::default(),
                namespace: None,
                containers: vec![],
                update_strategy: Default::default(),
            },
        );
        ss.metadata.generation = Some(3);
        ss
    }

    #[test]
    fn test_calculate_status_counts() {
        let instances = vec![
            pod("pod-0", "bbb", true),
            pod("pod-1", "bbb", false),
            pod("pod-2", "aaa", true),
            pod("pod-3", "aaa", false),
        ];

        let status = calculate_status(&sidecarset(), &instances, &control());

        assert_eq!(status.observed_generation, Some(3));
        assert_eq!(status.matched_pods, 4);
        assert_eq!(status.updated_pods, 2);
        assert_eq!(status.ready_pods, 2);
        assert_eq!(status.updated_ready_pods, 1);
        assert_eq!(status.latest_hash.as_deref(), Some("bbb"));
        assert_eq!(calculate_requeue_interval(&status), REQUEUE_PROGRESSING);
    }

    #[test]
    fn test_settled_rollout_requeues_slowly() {
        let instances = vec![pod("pod-0", "bbb", true), pod("pod-1", "bbb", true)];

        let status = calculate_status(&sidecarset(), &instances, &control());

        assert_eq!(calculate_requeue_interval(&status), REQUEUE_SETTLED);
        assert_eq!(
            calculate_requeue_interval(&calculate_status(&sidecarset(), &[], &control())),
            REQUEUE_SETTLED
        );
    }
}
