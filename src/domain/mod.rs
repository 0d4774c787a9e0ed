pub mod model;
pub mod repositories;

pub use model::{NotificationEnvelope, resolve_routing_key};
pub use repositories::{PresenceDirectory, RoutingBus};
