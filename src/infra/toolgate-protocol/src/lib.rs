mod approval;
mod error;
mod execution;
mod signal;

pub use approval::*;
pub use error::*;
pub use execution::*;
pub use signal::*;
