pub mod arrow;
pub mod types;

pub use self::arrow::{build_arrow_schema, map_to_arrow_type, timestamp_type};
pub use self::types::{Column, InvalidPolicy, SemanticType, TableSchema};
