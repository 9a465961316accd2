// src/schema/arrow.rs

use arrow::datatypes::{DataType, Field as ArrowField, Schema as ArrowSchema, TimeUnit};
use std::sync::Arc;

use super::types::{Column, SemanticType};

/// Timezone attached to every timestamp column we write.
pub const TIMESTAMP_TZ: &str = "UTC";

/// Arrow type for a timezone-aware microsecond timestamp.
pub fn timestamp_type() -> DataType {
    DataType::Timestamp(TimeUnit::Microsecond, Some(Arc::from(TIMESTAMP_TZ)))
}

/// Map a declared semantic type into an Arrow DataType.
///
/// - float64   → Float64
/// - date      → Date32
/// - timestamp → Timestamp(µs, UTC)
/// - string    → Utf8
pub fn map_to_arrow_type(ty: SemanticType) -> DataType {
    match ty {
        SemanticType::Float64 => DataType::Float64,
        SemanticType::Date => DataType::Date32,
        SemanticType::Timestamp => timestamp_type(),
        SemanticType::String => DataType::Utf8,
    }
}

/// Build an ArrowSchema (inside an Arc) from declared columns. Every field is
/// nullable; trailing `extra` fields are appended as given.
pub fn build_arrow_schema(cols: &[Column], extra: Vec<ArrowField>) -> Arc<ArrowSchema> {
    let mut fields: Vec<ArrowField> = cols
        .iter()
        .map(|col| ArrowField::new(&col.name, map_to_arrow_type(col.ty), true))
        .collect();
    fields.extend(extra);

    Arc::new(ArrowSchema::new(fields))
}
