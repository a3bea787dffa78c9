pub mod analysis;
pub mod liveness;
pub mod readiness;
pub mod stats;
