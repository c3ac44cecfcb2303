// TrustMeter Core Library - background coordination for the TrustMeter extension
// Three-layer architecture: Util -> Infrastructure -> Service

pub mod infrastructure; // Infrastructure layer - backend HTTP client, browser host port
pub mod service; // Service layer - config, sessions, request coordination, dispatch
pub mod util; // Utility layer - shared types and errors

#[cfg(test)]
mod testing;

// Export main types
pub use util::errors::*;
pub use util::types::*;

// Export infrastructure components
pub use infrastructure::{
    backend::{send_best_effort, AnalysisBackend, BackendClient},
    host::{InboundMessage, OutboundMessage, RequestPayload, TabHost},
};

// Export service layer components
pub use service::{
    config::TrustMeterConfig,
    coordinator::{AnalysisOutcome, RequestCoordinator},
    dispatch::{DispatchRouter, SenderContext},
    session::{spawn_session_sweeper, CancelDelivery, SessionRegistry, TabLifecycleEvent},
    store::TabStateStore,
};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const CORE_NAME: &str = "TrustMeter Core";
