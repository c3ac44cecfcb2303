//! Service layer
//!
//! Configuration, per-tab state, sessions, request coordination and message
//! dispatch.

pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod session;
pub mod store;

pub use config::TrustMeterConfig;
pub use coordinator::{AnalysisOutcome, RequestCoordinator};
pub use dispatch::{DispatchRouter, SenderContext};
pub use session::{
    spawn_session_sweeper, sweep_once, CancelDelivery, SessionRegistry, TabLifecycleEvent,
};
pub use store::TabStateStore;
