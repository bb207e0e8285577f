pub mod generator;
pub mod manifest;
pub mod rotation;
pub mod scheduler;

pub use manifest::{KeyManifestEntry, KeyStatus};
pub use rotation::{HostLifetime, RestartChannel, RotationOutcome};
pub use scheduler::RotationScheduler;
