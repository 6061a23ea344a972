pub mod allocation;
pub mod assignment;
pub mod fleet;
pub mod geofence;
pub mod location;
pub mod orders;
pub mod queue;
pub mod scoring;
pub mod serviceability;
pub mod surge;
pub mod zones;
