// src/schema/arrow.rs

use arrow::datatypes::DataType;

use super::rules::TargetType;

/// Map a coercion target to the Arrow type it produces.
///
/// - integer → Int32
/// - boolean → Boolean
/// - string  → Utf8
/// - date    → Date32 (days since the Unix epoch)
pub fn map_to_arrow_type(target: TargetType) -> DataType {
    match target {
        TargetType::Integer => DataType::Int32,
        TargetType::Boolean => DataType::Boolean,
        TargetType::String => DataType::Utf8,
        TargetType::Date => DataType::Date32,
    }
}

/// Human label for an Arrow type, as recorded in table metadata.
pub fn type_label(dt: &DataType) -> String {
    match dt {
        DataType::Int32 => "integer".into(),
        DataType::Int64 => "bigint".into(),
        DataType::Float64 => "double".into(),
        DataType::Boolean => "boolean".into(),
        DataType::Utf8 | DataType::LargeUtf8 => "string".into(),
        DataType::Date32 => "date".into(),
        DataType::Null => "void".into(),
        other => other.to_string().to_lowercase(),
    }
}
