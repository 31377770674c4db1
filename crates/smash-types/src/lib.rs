//! Pure data types for smash: job identity and status, errors, command results.
//!
//! This crate is a leaf dependency with no async runtime and no OS calls, so
//! front ends can render job listings and results without pulling in the
//! job-control kernel.

pub mod error;
pub mod job;
pub mod result;

pub use error::*;
pub use job::*;
pub use result::*;
