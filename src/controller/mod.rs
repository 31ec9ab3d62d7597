pub mod sidecarset;

pub use sidecarset::{reconcile, Context, ReconcileError};
