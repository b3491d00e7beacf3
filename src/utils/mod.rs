pub mod error;
pub mod fs;
pub mod io;
pub mod logger;
pub mod validation;
