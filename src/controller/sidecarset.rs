pub mod budget;
pub mod control;
pub mod eligibility;
pub mod hash;
pub mod instance;
pub mod ordering;
pub mod reconcile;
pub mod scatter;
pub mod selection;
pub mod selector;
pub mod status;
pub mod upgrade;
pub mod validation;

pub use budget::{calculate_need_upgrade_count, resolve_bound};
pub use control::SidecarSetControl;
pub use eligibility::{filter_eligible, Eligibility, UpgradeControl};
pub use hash::{
    compute_sidecarset_hash, compute_sidecarset_hash_without_image, set_hash_annotations,
    HashError, TemplateHash,
};
pub use instance::Instance;
pub use ordering::{compare_priority, order_candidates};
pub use reconcile::{reconcile, Context, ReconcileError};
pub use scatter::resolve_scatter_terms;
pub use selection::{select_next_upgrade, SelectionOutcome};
pub use selector::SelectorError;
pub use status::{calculate_requeue_interval, calculate_status};
pub use upgrade::build_upgrade_patch;
pub use validation::validate_sidecarset;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Tests can use unwrap/expect for brevity
#[path = "sidecarset_test.rs"]
mod tests;
