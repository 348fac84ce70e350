//! Pre-authorization gate: scores an order, persists the outcome, and hands approved
//! orders to monitoring.

pub mod gate;
pub mod order;
pub mod repository;
pub mod router;

#[cfg(test)]
mod tests;

pub use gate::{GateError, MoveOutcome, PreAuthGate};
pub use order::{PreAuthOrder, PreAuthStatus, ReviewAction, ReviewRequest, TransitionError};
pub use repository::PreAuthRepository;
pub use router::{pre_auth_router, PreAuthApi};
