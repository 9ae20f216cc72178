//! Data models for the POI annotator.
//!
//! Field names match the front-end's JSON records.

mod poi;
mod session;

pub use poi::*;
pub use session::*;
