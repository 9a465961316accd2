// src/process/mod.rs
pub mod convert;
pub mod date_parser;
pub mod loader;
pub mod raw_table;
pub mod typed_table;
pub mod utils;

pub use loader::{load, LoadReport};
pub use raw_table::{RawTable, RawValue};
pub use typed_table::{TrustedTable, TypedValue};
