// Domain layer: the record model and the capability traits the pipeline relies on.

pub mod model;
pub mod ports;
