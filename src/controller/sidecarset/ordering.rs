//! Upgrade priority and scatter spreading for the eligible pool

use super::instance::Instance;
use crate::crd::sidecarset::ScatterTerm;
use std::cmp::Ordering;
use std::collections::VecDeque;

/// Priority order of two pods
///
/// Not-ready pods come first, then newer pods before older ones. Pods
/// without a creation timestamp sort after every timestamped pod. Remaining
/// ties are broken by name, descending.
pub fn compare_priority(a: &Instance, b: &Instance) -> Ordering {
    a.ready
        .cmp(&b.ready)
        .then_with(|| b.creation_timestamp.cmp(&a.creation_timestamp))
        .then_with(|| b.name.cmp(&a.name))
}

/// Sort the eligible pool and spread it across scatter groups
///
/// The caller truncates the result to the upgrade budget.
pub fn order_candidates<'a>(
    mut pool: Vec<&'a Instance>,
    terms: &[ScatterTerm],
) -> Vec<&'a Instance> {
    pool.sort_by(|a, b| compare_priority(a, b));

    if terms.is_empty() {
        return pool;
    }

    let ready = pool.split_off(pool.partition_point(|i| !i.ready));
    let mut ordered = interleave(pool, terms);
    ordered.extend(interleave(ready, terms));
    ordered
}

/// Round-robin over scatter groups, keeping each group's internal order
///
/// A pod's group is the first term it matches; pods matching none share one
/// group. Groups take turns in the order their first member appears.
fn interleave<'a>(sorted: Vec<&'a Instance>, terms: &[ScatterTerm]) -> Vec<&'a Instance> {
    let total = sorted.len();
    let mut groups: Vec<(Option<usize>, VecDeque<&'a Instance>)> = Vec::new();

    for instance in sorted {
        let group = terms.iter().position(|t| t.matches(&instance.labels));
        match groups.iter_mut().find(|(g, _)| *g == group) {
            Some((_, members)) => members.push_back(instance),
            None => groups.push((group, VecDeque::from([instance]))),
        }
    }

    let mut ordered = Vec::with_capacity(total);
    while ordered.len() < total {
        for (_, members) in groups.iter_mut() {
            if let Some(instance) = members.pop_front() {
                ordered.push(instance);
            }
        }
    }
    ordered
}
