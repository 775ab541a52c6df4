pub mod clock;
pub mod config;
pub mod control;
pub mod error;
pub mod metrics;
pub mod model;
pub mod seam_rule;
pub mod transition;

pub use error::AirError;
pub use model::*;
