pub mod router;

#[cfg(test)]
mod router_test;

pub use router::{MessageRouter, RouteOutcome};
