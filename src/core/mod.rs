pub mod chain;
pub mod combinators;
pub mod job;
pub mod join;
pub mod keys;
pub mod probe;
pub mod sinks;
pub mod stages;

pub use chain::{Chain, ErrorHandler, Iter, Stream};
pub use job::{JobEngine, JobReport};
pub use probe::{StageCount, StageCounts};
