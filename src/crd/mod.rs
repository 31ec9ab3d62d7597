pub mod defaults;
pub mod sidecarset;
