pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use config::JobConfig;
pub use core::{Chain, JobEngine, JobReport, StageCount, StageCounts};
pub use domain::model::Record;
pub use domain::ports::{IntoKeys, Keyed, Nested};
pub use utils::error::{BoxError, ChainError, Result};
