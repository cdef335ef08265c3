//! Turn labeled items into the two run reports
//!
//! The raw appendix is rendered deterministically and always succeeds, so
//! callers render it first. The narrative is written by the model and may
//! fail or run out of time independently, leaving the raw report alone.

mod narrative;
mod raw;

pub use narrative::write_narrative;
pub use raw::render_raw_report;

