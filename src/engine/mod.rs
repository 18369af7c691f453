//! Core engine: session state, the per-tick controller, remote
//! reconciliation, and the async table runner that drives them.

pub mod controller;
pub mod reconciler;
pub mod runner;
pub mod session;

pub use controller::SessionController;
pub use reconciler::{Command, RemoteReconciler, RemoteSnapshot};
pub use runner::{RunSummary, TableRunner};
pub use session::{SessionSeed, SessionState};
