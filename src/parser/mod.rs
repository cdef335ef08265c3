//! Tolerant parsing of structured data out of free-form model output

mod json;
mod list;

pub use json::parse_embedded;
pub use list::parse_list_items;
