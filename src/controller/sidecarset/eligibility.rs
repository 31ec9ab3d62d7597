use super::instance::Instance;
use super::selector::{matches, validate_selector, SelectorError};
use crate::crd::sidecarset::UpdateStrategy;

/// Revision predicates the selection engine delegates to
///
/// `is_updated` answers "is this pod already on the target revision";
/// `is_upgradable` answers "may this pod be upgraded in place at all".
/// Both must be pure over the snapshot they are given.
pub trait UpgradeControl {
    fn is_updated(&self, instance: &Instance) -> bool;
    fn is_upgradable(&self, instance: &Instance) -> bool;
}

/// Result of partitioning a pod snapshot for one selection pass
#[derive(Debug, Default)]
pub struct Eligibility<'a> {
    /// Pods passing the strategy's sub-selector (percentage base)
    pub matched: usize,
    /// Matched pods already on the target revision
    pub already_upgraded: usize,
    /// Upgraded pods that are not ready yet
    pub in_flight_unavailable: usize,
    /// Matched pods that still need, and may receive, the upgrade
    pub eligible: Vec<&'a Instance>,
}

/// Split a snapshot into matched, upgraded and eligible pods
///
/// # Errors
/// Returns `SelectorError` for a malformed sub-selector. Callers must then
/// treat the pass as matching nothing.
pub fn filter_eligible<'a>(
    strategy: &UpdateStrategy,
    instances: &'a [Instance],
    control: &dyn UpgradeControl,
) -> Result<Eligibility<'a>, SelectorError> {
    if let Some(selector) = &strategy.selector {
        validate_selector(selector)?;
    }

    let mut eligibility = Eligibility::default();

    for instance in instances {
        if let Some(selector) = &strategy.selector {
            if !matches(selector, &instance.labels)? {
                continue;
            }
        }
        eligibility.matched += 1;

        if control.is_updated(instance) {
            eligibility.already_upgraded += 1;
            if !instance.ready {
                eligibility.in_flight_unavailable += 1;
            }
        } else if control.is_upgradable(instance) {
            eligibility.eligible.push(instance);
        }
    }

    Ok(eligibility)
}
