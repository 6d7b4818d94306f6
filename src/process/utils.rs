use arrow::datatypes::DataType;
use std::collections::HashMap;

use super::date_parser;

/// Candidate column type while scanning values, ordered by how much it accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferredType {
    Null,
    Int32,
    Int64,
    Float64,
    Boolean,
    Date,
    Utf8,
}

impl InferredType {
    /// Widen two candidates to one that holds both.
    pub fn merge(self, other: InferredType) -> InferredType {
        use InferredType::*;
        match (self, other) {
            (a, b) if a == b => a,
            (Null, t) | (t, Null) => t,
            (Int32, Int64) | (Int64, Int32) => Int64,
            (Int32 | Int64, Float64) | (Float64, Int32 | Int64) => Float64,
            _ => Utf8,
        }
    }

    /// Final Arrow type. Columns that never held a value are strings.
    pub fn to_arrow(self) -> DataType {
        match self {
            InferredType::Null | InferredType::Utf8 => DataType::Utf8,
            InferredType::Int32 => DataType::Int32,
            InferredType::Int64 => DataType::Int64,
            InferredType::Float64 => DataType::Float64,
            InferredType::Boolean => DataType::Boolean,
            InferredType::Date => DataType::Date32,
        }
    }
}

/// Infer the narrowest type of one raw field. Empty fields are null.
pub fn infer_from_str(s: &str, date_format: &str) -> InferredType {
    if s.is_empty() {
        return InferredType::Null;
    }
    if s.parse::<i32>().is_ok() {
        return InferredType::Int32;
    }
    if s.parse::<i64>().is_ok() {
        return InferredType::Int64;
    }
    if is_float_literal(s) {
        return InferredType::Float64;
    }
    if parse_bool(s).is_some() {
        return InferredType::Boolean;
    }
    if date_parser::parse_date_days(s, date_format).is_some() {
        return InferredType::Date;
    }
    InferredType::Utf8
}

/// `f64::from_str` also takes `inf` and `NaN`; only keep numeric-looking text.
fn is_float_literal(s: &str) -> bool {
    s.parse::<f64>().is_ok()
        && s
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
}

pub fn parse_bool(s: &str) -> Option<bool> {
    if s.eq_ignore_ascii_case("true") {
        Some(true)
    } else if s.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Header names as stored: blanks become `_c<i>`, repeated names get their
/// column index appended.
pub fn normalize_headers(raw: &[String]) -> Vec<String> {
    let named: Vec<String> = raw
        .iter()
        .enumerate()
        .map(|(i, h)| {
            if h.trim().is_empty() {
                format!("_c{}", i)
            } else {
                h.clone()
            }
        })
        .collect();

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for name in &named {
        *counts.entry(name.as_str()).or_default() += 1;
    }

    named
        .iter()
        .enumerate()
        .map(|(i, name)| {
            if counts[name.as_str()] > 1 {
                format!("{}{}", name, i)
            } else {
                name.clone()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FMT: &str = "%Y-%m-%d";

    #[test]
    fn infers_narrowest_type() {
        assert_eq!(infer_from_str("", FMT), InferredType::Null);
        assert_eq!(infer_from_str("42", FMT), InferredType::Int32);
        assert_eq!(infer_from_str("-7", FMT), InferredType::Int32);
        assert_eq!(infer_from_str("3000000000", FMT), InferredType::Int64);
        assert_eq!(infer_from_str("0.25", FMT), InferredType::Float64);
        assert_eq!(infer_from_str("1e3", FMT), InferredType::Float64);
        assert_eq!(infer_from_str("TRUE", FMT), InferredType::Boolean);
        assert_eq!(infer_from_str("2020-01-05", FMT), InferredType::Date);
        assert_eq!(infer_from_str("t", FMT), InferredType::Utf8);
        assert_eq!(infer_from_str("NaN", FMT), InferredType::Utf8);
        assert_eq!(infer_from_str(" 12", FMT), InferredType::Utf8);
    }

    #[test]
    fn merge_widens_numbers_and_falls_back_to_string() {
        use InferredType::*;
        assert_eq!(Null.merge(Int32), Int32);
        assert_eq!(Int32.merge(Int64), Int64);
        assert_eq!(Int64.merge(Float64), Float64);
        assert_eq!(Int32.merge(Boolean), Utf8);
        assert_eq!(Date.merge(Int32), Utf8);
        assert_eq!(Date.merge(Null), Date);
        assert_eq!(Null.to_arrow(), DataType::Utf8);
    }

    #[test]
    fn headers_are_made_unique() {
        let raw = vec![
            "id".to_string(),
            "".to_string(),
            "name".to_string(),
            "name".to_string(),
        ];
        assert_eq!(normalize_headers(&raw), vec!["id", "_c1", "name2", "name3"]);
    }
}
