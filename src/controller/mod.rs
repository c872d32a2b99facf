pub mod events;
pub mod ingress;
pub mod traffic;

pub use traffic::{select_reconciler, Context, PatchOutcome, TrafficRoutingError};
