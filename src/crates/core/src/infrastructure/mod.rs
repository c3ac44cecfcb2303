//! Infrastructure layer - backend HTTP client and browser host port

pub mod backend;
pub mod host;

pub use backend::{AnalysisBackend, BackendClient};
pub use host::{OutboundMessage, TabHost};
