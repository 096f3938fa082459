//! Pure session logic: turn arbitration, challenge selection, the session
//! state machine transitions, and the ephemeral media policy.
//!
//! Nothing in this crate does I/O or reads ambient state. Every policy
//! check that depends on premium status takes it as an explicit parameter,
//! and every transition is a plain function over a [`Session`] value so the
//! persistence layer can run it inside a version-guarded transaction.

pub mod error;
pub mod media;
pub mod selector;
pub mod session;
pub mod turn;

pub use error::{ErrorClass, MediaError, SessionError};
pub use tandem_types::models::Session;
