//! Authentication action parsing and dispatch.

pub mod dispatcher;

pub use dispatcher::{AuthAction, AuthDispatcher, AuthOutcome};
