use anyhow::{bail, Context, Result};
use arrow::{
    array::{Array, ArrayRef, BooleanArray, Date32Builder, Int32Builder, StringArray},
    compute::{cast, cast_with_options, CastOptions},
    datatypes::DataType,
};
use std::sync::Arc;
use tracing::debug;

use super::{date_parser, Table};
use crate::schema::{map_to_arrow_type, Coercion, TargetType, TypeRules};

/// Run every matching rule over every column of `table`, in rule order.
///
/// A column hit by several rules is re-cast by each of them in turn; whatever
/// the last one produced is what stays.
pub fn apply_type_rules(mut table: Table, schema: &str, rules: &TypeRules) -> Result<Table> {
    for column in table.column_names() {
        let matched: Vec<Coercion> = rules
            .matching(&column, schema)
            .map(|r| r.coercion)
            .collect();
        for coercion in matched {
            let current = table
                .column(&column)
                .cloned()
                .context("column vanished while coercing")?;
            let coerced = coerce(&current, coercion)
                .with_context(|| format!("coercing column `{}` to {}", column, coercion.target()))?;
            debug!(column = %column, target = %coercion.target(), "coerced");
            table = table.with_column(&column, coerced)?;
        }
    }
    Ok(table)
}

pub fn coerce(array: &ArrayRef, coercion: Coercion) -> Result<ArrayRef> {
    match coercion {
        Coercion::Cast(target) => cast_to(array, target),
        Coercion::Flag { truthy } => {
            let flags = flag_column(array, truthy)?;
            cast_to(&flags, TargetType::Boolean)
        }
    }
}

/// `truthy` → `true`, anything else, null included → `false`.
pub fn flag_column(array: &ArrayRef, truthy: &str) -> Result<ArrayRef> {
    let flags: BooleanArray = match array.data_type() {
        DataType::Boolean => {
            let bools = array
                .as_any()
                .downcast_ref::<BooleanArray>()
                .context("expected boolean array")?;
            bools.iter().map(|v| Some(v.unwrap_or(false))).collect()
        }
        DataType::Utf8 => {
            let strings = array
                .as_any()
                .downcast_ref::<StringArray>()
                .context("expected string array")?;
            strings.iter().map(|v| Some(v == Some(truthy))).collect()
        }
        _ => {
            let rendered = cast(array, &DataType::Utf8)?;
            return flag_column(&rendered, truthy);
        }
    };
    Ok(Arc::new(flags))
}

/// Cast a column to a coercion target.
pub fn cast_to(array: &ArrayRef, target: TargetType) -> Result<ArrayRef> {
    let to = map_to_arrow_type(target);
    if array.data_type() == &to {
        return Ok(array.clone());
    }
    match target {
        TargetType::Integer => cast_to_integer(array),
        TargetType::Date => cast_to_date(array),
        TargetType::String | TargetType::Boolean => Ok(cast_with_options(
            array,
            &to,
            &CastOptions::default(),
        )?),
    }
}

/// Text to int32: integral text parses directly, decimal text truncates toward
/// zero, anything else (or out of range) becomes null.
fn str_to_i32(s: &str) -> Option<i32> {
    let s = s.trim();
    if let Ok(v) = s.parse::<i32>() {
        return Some(v);
    }
    let v = s.parse::<f64>().ok()?.trunc();
    if v.is_finite() && v >= i32::MIN as f64 && v <= i32::MAX as f64 {
        Some(v as i32)
    } else {
        None
    }
}

fn cast_to_integer(array: &ArrayRef) -> Result<ArrayRef> {
    match array.data_type() {
        DataType::Utf8 => {
            let strings = array
                .as_any()
                .downcast_ref::<StringArray>()
                .context("expected string array")?;
            let mut b = Int32Builder::with_capacity(strings.len());
            for v in strings.iter() {
                b.append_option(v.and_then(str_to_i32));
            }
            Ok(Arc::new(b.finish()))
        }
        DataType::Date32 | DataType::Date64 | DataType::Timestamp(_, _) => {
            bail!("cannot cast {} to integer", array.data_type())
        }
        // numeric narrowing and boolean → 1/0; overflow becomes null
        _ => Ok(cast_with_options(
            array,
            &DataType::Int32,
            &CastOptions::default(),
        )?),
    }
}

fn cast_to_date(array: &ArrayRef) -> Result<ArrayRef> {
    match array.data_type() {
        DataType::Utf8 => {
            let strings = array
                .as_any()
                .downcast_ref::<StringArray>()
                .context("expected string array")?;
            let mut b = Date32Builder::with_capacity(strings.len());
            for v in strings.iter() {
                b.append_option(v.and_then(date_parser::cast_str_to_days));
            }
            Ok(Arc::new(b.finish()))
        }
        DataType::Null | DataType::Date64 | DataType::Timestamp(_, _) => {
            Ok(cast(array, &DataType::Date32)?)
        }
        other => bail!("cannot cast {} to date", other),
    }
}
