use crate::error::{DocsetError, Result};
use crate::record::Record;
use regex::{Regex, RegexBuilder};
use serde_json::Value;
use std::cmp::Ordering;
use std::str::FromStr;

/// Comparison operator accepted by `and_where` / `or_where`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
}

impl FromStr for Op {
    type Err = DocsetError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "=" | "==" => Ok(Op::Eq),
            "!=" => Ok(Op::Ne),
            "<" => Ok(Op::Lt),
            "<=" => Ok(Op::Le),
            ">" => Ok(Op::Gt),
            ">=" => Ok(Op::Ge),
            "like" => Ok(Op::Like),
            other => Err(DocsetError::Validation(format!(
                "Unsupported operator '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortOrder {
    type Err = DocsetError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(DocsetError::Validation(format!(
                "Unsupported sort mode '{other}'"
            ))),
        }
    }
}

/// How two scalars are ordered by `sort`.
///
/// `Lexical` compares text renderings, so `10 < 9`. `Numeric` orders values
/// that both parse as numbers by magnitude and falls back to text otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Collation {
    #[default]
    Lexical,
    Numeric,
}

/// A validated `field op value` test, applied to the field's record (or its
/// absence).
#[derive(Debug)]
pub(crate) enum Predicate {
    Absent,
    Present,
    Compare(Op, Value),
    Like(Regex),
}

impl Predicate {
    pub fn new(op: Op, value: Value) -> Result<Self> {
        match (op, value) {
            (Op::Eq, Value::Null) => Ok(Predicate::Absent),
            (Op::Ne, Value::Null) => Ok(Predicate::Present),
            (_, Value::Null) => Err(DocsetError::Validation(format!(
                "Operator {op:?} cannot compare against null"
            ))),
            (_, Value::Array(_) | Value::Object(_)) => Err(DocsetError::Validation(
                "Comparison value must be a scalar".into(),
            )),
            (Op::Like, value) => Ok(Predicate::Like(compile_like(&render(&value))?)),
            (op, value) => Ok(Predicate::Compare(op, value)),
        }
    }

    pub fn matches(&self, field: Option<&Record>) -> bool {
        match (self, field) {
            (Predicate::Absent, found) => found.is_none(),
            (Predicate::Present, found) => found.is_some(),
            (_, None) => false,
            (Predicate::Like(re), Some(Record::Scalar(v))) => re.is_match(&render(v)),
            (Predicate::Compare(op, expected), Some(Record::Scalar(v))) => {
                let ordering = loose_cmp(v, expected);
                match op {
                    Op::Eq => ordering == Some(Ordering::Equal),
                    Op::Ne => ordering != Some(Ordering::Equal),
                    Op::Lt => ordering == Some(Ordering::Less),
                    Op::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
                    Op::Gt => ordering == Some(Ordering::Greater),
                    Op::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
                    Op::Like => false,
                }
            }
            // mappings and sequences never match a scalar comparison
            (_, Some(_)) => false,
        }
    }
}

/// Compile a `like` pattern. `/body/flags` is unwrapped, with the flags
/// mapped onto the builder; anything else is used as a bare regex.
fn compile_like(pattern: &str) -> Result<Regex> {
    let (body, flags) = split_delimited(pattern).unwrap_or((pattern, ""));
    let mut builder = RegexBuilder::new(body);
    for flag in flags.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            'U' => builder.swap_greed(true),
            _ => &mut builder,
        };
    }
    builder
        .build()
        .map_err(|e| DocsetError::Validation(format!("Invalid pattern {pattern}: {e}")))
}

const PATTERN_FLAGS: &str = "imsxuU";

fn split_delimited(pattern: &str) -> Option<(&str, &str)> {
    let rest = pattern.strip_prefix('/')?;
    let end = rest.rfind('/')?;
    let flags = &rest[end + 1..];
    flags
        .chars()
        .all(|c| PATTERN_FLAGS.contains(c))
        .then(|| (&rest[..end], flags))
}

/// Text form of a scalar: strings verbatim, numbers in decimal, `true` as
/// `1` and `false` as the empty string.
pub(crate) fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) | Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                trimmed.parse::<f64>().ok().filter(|f| f.is_finite())
            }
        }
        _ => None,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !(s.is_empty() || s == "0"),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Loose comparison of two scalars, used by `and_where`.
pub(crate) fn loose_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Bool(_), _) | (_, Value::Bool(_)) => Some(truthy(a).cmp(&truthy(b))),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        _ => match (numeric(a), numeric(b)) {
            (Some(x), Some(y)) => x.partial_cmp(&y),
            _ => Some(render(a).cmp(&render(b))),
        },
    }
}

/// Order two scalars for `sort`.
pub(crate) fn collate(a: &Value, b: &Value, collation: Collation) -> Ordering {
    if collation == Collation::Numeric {
        if let (Some(x), Some(y)) = (numeric(a), numeric(b)) {
            if let Some(ordering) = x.partial_cmp(&y) {
                return ordering;
            }
        }
    }
    render(a).cmp(&render(b))
}

/// Full `sort` comparator over the records found at the sort field (or their
/// absence): present before missing, scalars before mappings and sequences.
pub(crate) fn sort_cmp(
    a: Option<&Record>,
    b: Option<&Record>,
    order: SortOrder,
    collation: Collation,
) -> Ordering {
    let ordering = match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(Record::Scalar(x)), Some(Record::Scalar(y))) => collate(x, y, collation),
        (Some(Record::Scalar(_)), Some(_)) => Ordering::Less,
        (Some(_), Some(Record::Scalar(_))) => Ordering::Greater,
        (Some(_), Some(_)) => Ordering::Equal,
    };
    match order {
        SortOrder::Asc => ordering,
        SortOrder::Desc => ordering.reverse(),
    }
}
