use crate::crd::defaults::{DEFAULT_MAX_UNAVAILABLE, DEFAULT_PARTITION};
use crate::crd::sidecarset::UpdateStrategy;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

/// Validate a partition/maxUnavailable value
///
/// Returns true if the value is a valid format:
/// - Integer: non-negative
/// - Percentage string: "0%" to "100%"
/// - Numeric string: non-negative integer (e.g. "5")
pub(crate) fn is_valid_bound(value: &IntOrString) -> bool {
    match value {
        IntOrString::Int(abs) => *abs >= 0,
        IntOrString::String(s) => match s.strip_suffix('%') {
            Some(percent) => percent
                .parse::<i64>()
                .is_ok_and(|p| (0..=100).contains(&p)),
            None => s.parse::<i64>().is_ok_and(|abs| abs >= 0),
        },
    }
}

/// Resolve a partition/maxUnavailable value against the matched population
///
/// Percentages round down: `floor(total * percent / 100)`, so "10%" of 1000
/// is 100 and "25%" of 10 is 2. Absolute values are used verbatim. Negative
/// or malformed values resolve to 0.
///
/// # Examples
/// ```ignore
/// assert_eq!(resolve_bound(Some(&IntOrString::String("10%".into())), 1000, 1), 100);
/// assert_eq!(resolve_bound(Some(&IntOrString::Int(10)), 1000, 1), 10);
/// assert_eq!(resolve_bound(None, 1000, 1), 1); // unset -> default
/// ```
pub fn resolve_bound(value: Option<&IntOrString>, total: usize, default: i32) -> usize {
    let resolved: i64 = match value {
        None => default as i64,
        Some(IntOrString::Int(abs)) => *abs as i64,
        Some(IntOrString::String(s)) => match s.strip_suffix('%') {
            Some(percent) => match percent.parse::<i64>() {
                Ok(p) if p >= 0 => (total as i64).saturating_mul(p) / 100,
                _ => 0,
            },
            None => s.parse::<i64>().unwrap_or(0),
        },
    };
    resolved.max(0) as usize
}

/// How many pods may start upgrading in this pass
///
/// ```text
/// remaining_by_partition = max(0, matched - partition - already_upgraded)
/// available_budget       = max(0, max_unavailable - in_flight_unavailable)
/// need                   = min(remaining_by_partition, available_budget)
/// ```
///
/// # Arguments
/// * `strategy` - Update strategy (partition defaults to 0, maxUnavailable to 1)
/// * `matched` - Pods passing the strategy's sub-selector
/// * `already_upgraded` - Matched pods already on the target revision
/// * `in_flight_unavailable` - Upgraded pods that are not ready yet
pub fn calculate_need_upgrade_count(
    strategy: &UpdateStrategy,
    matched: usize,
    already_upgraded: usize,
    in_flight_unavailable: usize,
) -> usize {
    let partition = resolve_bound(strategy.partition.as_ref(), matched, DEFAULT_PARTITION);
    let max_unavailable = resolve_bound(
        strategy.max_unavailable.as_ref(),
        matched,
        DEFAULT_MAX_UNAVAILABLE,
    );

    let remaining_by_partition = matched
        .saturating_sub(partition)
        .saturating_sub(already_upgraded);
    let available_budget = max_unavailable.saturating_sub(in_flight_unavailable);

    remaining_by_partition.min(available_budget)
}
