pub mod analysis;
pub mod tab;

pub use analysis::*;
pub use tab::*;
