use super::budget::calculate_need_upgrade_count;
use super::eligibility::{filter_eligible, UpgradeControl};
use super::instance::Instance;
use super::ordering::order_candidates;
use super::scatter::resolve_scatter_terms;
use super::selector::SelectorError;
use crate::crd::sidecarset::UpdateStrategy;
use tracing::debug;

/// Outcome of one selection pass
#[derive(Debug, Default)]
pub struct SelectionOutcome<'a> {
    pub matched: usize,
    pub already_upgraded: usize,
    pub in_flight_unavailable: usize,
    pub need_upgrade_count: usize,
    /// Pods to upgrade now, highest priority first
    pub selected: Vec<&'a Instance>,
    /// Set when the sub-selector is malformed; the pass then selects nothing
    pub error: Option<SelectorError>,
}

/// Choose which pods to upgrade in this pass
///
/// Pure over `(strategy, instances)`: the same snapshot always yields the
/// same selection. A paused or `NotUpdate` strategy still reports counts
/// but selects nothing.
pub fn select_next_upgrade<'a>(
    strategy: &UpdateStrategy,
    instances: &'a [Instance],
    control: &dyn UpgradeControl,
) -> SelectionOutcome<'a> {
    let eligibility = match filter_eligible(strategy, instances, control) {
        Ok(eligibility) => eligibility,
        Err(e) => {
            return SelectionOutcome {
                error: Some(e),
                ..Default::default()
            }
        }
    };

    let need_upgrade_count = if strategy.is_rolling() {
        calculate_need_upgrade_count(
            strategy,
            eligibility.matched,
            eligibility.already_upgraded,
            eligibility.in_flight_unavailable,
        )
    } else {
        0
    };

    let selected = if need_upgrade_count == 0 || eligibility.eligible.is_empty() {
        Vec::new()
    } else {
        let terms = resolve_scatter_terms(&strategy.scatter_strategy, instances);
        let mut ordered = order_candidates(eligibility.eligible, &terms);
        ordered.truncate(need_upgrade_count);
        ordered
    };

    debug!(
        matched = eligibility.matched,
        already_upgraded = eligibility.already_upgraded,
        in_flight_unavailable = eligibility.in_flight_unavailable,
        need_upgrade_count,
        selected = selected.len(),
        "Selected pods for sidecar upgrade"
    );

    SelectionOutcome {
        matched: eligibility.matched,
        already_upgraded: eligibility.already_upgraded,
        in_flight_unavailable: eligibility.in_flight_unavailable,
        need_upgrade_count,
        selected,
        error: None,
    }
}
