use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

/// A record key, preserved verbatim from the root record set through every
/// derived view so writes can find their way back.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Index(i64),
    Name(String),
}

impl Key {
    /// Parse a key as read from a JSON object member name. Canonical decimal
    /// integers become `Index`, anything else stays a `Name`.
    pub fn parse(raw: &str) -> Key {
        if is_canonical_integer(raw) {
            if let Ok(n) = raw.parse::<i64>() {
                return Key::Index(n);
            }
        }
        Key::Name(raw.to_string())
    }

    /// Convert a scalar record value into a key. Returns `None` for `null`,
    /// mappings and sequences.
    pub fn from_value(value: &Value) -> Option<Key> {
        match value {
            Value::String(s) => Some(Key::parse(s)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Key::Index(i))
                } else if let Some(u) = n.as_u64() {
                    Some(Key::Name(u.to_string()))
                } else {
                    n.as_f64()
                        .filter(|f| f.is_finite())
                        .map(|f| Key::Index(f.trunc() as i64))
                }
            }
            Value::Bool(b) => Some(Key::Index(i64::from(*b))),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn as_index(&self) -> Option<i64> {
        match self {
            Key::Index(i) => Some(*i),
            Key::Name(_) => None,
        }
    }
}

fn is_canonical_integer(raw: &str) -> bool {
    let digits = raw.strip_prefix('-').unwrap_or(raw);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    if digits == "0" {
        return raw == "0";
    }
    !digits.starts_with('0')
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Index(i) => write!(f, "{i}"),
            Key::Name(s) => f.write_str(s),
        }
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Key::Index(a), Key::Index(b)) => a.cmp(b),
            (Key::Name(a), Key::Name(b)) => a.cmp(b),
            (Key::Index(_), Key::Name(_)) => Ordering::Less,
            (Key::Name(_), Key::Index(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<i64> for Key {
    fn from(i: i64) -> Self {
        Key::Index(i)
    }
}

impl From<i32> for Key {
    fn from(i: i32) -> Self {
        Key::Index(i64::from(i))
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::parse(s)
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::parse(&s)
    }
}
