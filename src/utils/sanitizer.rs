//! Log-safe conversion of arbitrary payload data
//!
//! [`Loggable`] is the input model for anything a caller attaches to an
//! entry. [`sanitize`] turns it into a `serde_json::Value` that is
//! depth-bounded, cycle-safe and has secrets redacted.

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::RwLock;
use serde_json::{Map, Number, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

pub const DEFAULT_MAX_DEPTH: usize = 3;
pub const REDACTED: &str = "[REDACTED]";
pub const CIRCULAR: &str = "[Circular]";
pub const MAX_DEPTH_REACHED: &str = "[Max Depth Reached]";

/// Lowercased key fragments whose values are always redacted
pub const SENSITIVE_KEY_FRAGMENTS: [&str; 5] = ["password", "secret", "token", "key", "auth"];

/// Arbitrary value attached to a log entry
#[derive(Debug, Clone)]
pub enum Loggable {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Error {
        name: String,
        message: String,
        stack: Option<String>,
    },
    DateTime(DateTime<Utc>),
    List(Vec<Loggable>),
    Map(Vec<(String, Loggable)>),
    /// Shared node; the only way to build reference cycles
    Shared(SharedValue),
    /// Value that only has a textual representation
    Opaque(String),
}

impl Loggable {
    /// Capture an error with its source chain as the stack
    pub fn from_error<E>(error: &E) -> Self
    where
        E: std::error::Error + ?Sized,
    {
        let full_name = std::any::type_name::<E>();
        let name = full_name.rsplit("::").next().unwrap_or(full_name).to_string();

        let mut chain = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            chain.push(format!("caused by: {}", cause));
            source = cause.source();
        }

        Loggable::Error {
            name,
            message: error.to_string(),
            stack: if chain.is_empty() {
                None
            } else {
                Some(chain.join("\n"))
            },
        }
    }

    /// Wrap anything printable with `Debug`
    pub fn opaque<T: fmt::Debug + ?Sized>(value: &T) -> Self {
        Loggable::Opaque(format!("{:?}", value))
    }

    pub fn map<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Loggable>,
    {
        Loggable::Map(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn list<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Loggable>,
    {
        Loggable::List(items.into_iter().map(Into::into).collect())
    }
}

/// Reference-counted, mutable node inside a [`Loggable`] graph
///
/// Identity is the allocation address, which is what cycle detection keys on.
#[derive(Clone)]
pub struct SharedValue(Arc<RwLock<Loggable>>);

impl SharedValue {
    pub fn new(value: Loggable) -> Self {
        SharedValue(Arc::new(RwLock::new(value)))
    }

    pub fn set(&self, value: Loggable) {
        *self.0.write() = value;
    }

    /// Append an entry when the node holds a map
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Loggable>) {
        if let Loggable::Map(ref mut pairs) = *self.0.write() {
            pairs.push((key.into(), value.into()));
        }
    }

    /// Append an element when the node holds a list
    pub fn push(&self, value: impl Into<Loggable>) {
        if let Loggable::List(ref mut items) = *self.0.write() {
            items.push(value.into());
        }
    }

    fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl fmt::Debug for SharedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // never recurse: the node may be part of a cycle
        write!(f, "SharedValue({:#x})", self.identity())
    }
}

/// Whether values under `key` must be redacted
pub fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    SENSITIVE_KEY_FRAGMENTS
        .iter()
        .any(|fragment| lower.contains(fragment))
}

/// Convert `value` into log-safe data
///
/// Containers met at `depth >= max_depth` are replaced by
/// [`MAX_DEPTH_REACHED`]; revisiting a shared node on the current path
/// yields [`CIRCULAR`]. Never fails.
pub fn sanitize(value: &Loggable, max_depth: usize) -> Value {
    let mut seen = HashSet::new();
    sanitize_inner(value, 0, max_depth, &mut seen)
}

fn sanitize_inner(
    value: &Loggable,
    depth: usize,
    max_depth: usize,
    seen: &mut HashSet<usize>,
) -> Value {
    match value {
        Loggable::Null => Value::Null,
        Loggable::Bool(b) => Value::Bool(*b),
        Loggable::Int(i) => Value::Number((*i).into()),
        Loggable::UInt(u) => Value::Number((*u).into()),
        Loggable::Float(f) => Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(f.to_string())),
        Loggable::Str(s) => Value::String(s.clone()),
        Loggable::Opaque(s) => Value::String(s.clone()),
        Loggable::DateTime(dt) => Value::String(dt.to_rfc3339_opts(SecondsFormat::Millis, true)),
        Loggable::Error {
            name,
            message,
            stack,
        } => {
            let mut obj = Map::new();
            obj.insert("name".to_string(), Value::String(name.clone()));
            obj.insert("message".to_string(), Value::String(message.clone()));
            obj.insert(
                "stack".to_string(),
                stack.clone().map(Value::String).unwrap_or(Value::Null),
            );
            Value::Object(obj)
        }
        Loggable::List(items) => {
            if depth >= max_depth {
                return Value::String(MAX_DEPTH_REACHED.to_string());
            }
            Value::Array(
                items
                    .iter()
                    .map(|item| sanitize_inner(item, depth + 1, max_depth, seen))
                    .collect(),
            )
        }
        Loggable::Map(pairs) => {
            if depth >= max_depth {
                return Value::String(MAX_DEPTH_REACHED.to_string());
            }
            let mut obj = Map::new();
            for (key, item) in pairs {
                let safe = if is_sensitive_key(key) {
                    Value::String(REDACTED.to_string())
                } else {
                    sanitize_inner(item, depth + 1, max_depth, seen)
                };
                obj.insert(key.clone(), safe);
            }
            Value::Object(obj)
        }
        Loggable::Shared(node) => {
            let id = node.identity();
            if !seen.insert(id) {
                return Value::String(CIRCULAR.to_string());
            }
            // the node is transparent: its content sits at the same depth
            let result = match node.0.try_read() {
                Some(inner) => sanitize_inner(&inner, depth, max_depth, seen),
                None => Value::String("[Locked]".to_string()),
            };
            seen.remove(&id);
            result
        }
    }
}

impl From<bool> for Loggable {
    fn from(b: bool) -> Self {
        Loggable::Bool(b)
    }
}

impl From<i32> for Loggable {
    fn from(i: i32) -> Self {
        Loggable::Int(i as i64)
    }
}

impl From<i64> for Loggable {
    fn from(i: i64) -> Self {
        Loggable::Int(i)
    }
}

impl From<u32> for Loggable {
    fn from(u: u32) -> Self {
        Loggable::UInt(u as u64)
    }
}

impl From<u64> for Loggable {
    fn from(u: u64) -> Self {
        Loggable::UInt(u)
    }
}

impl From<usize> for Loggable {
    fn from(u: usize) -> Self {
        Loggable::UInt(u as u64)
    }
}

impl From<f64> for Loggable {
    fn from(f: f64) -> Self {
        Loggable::Float(f)
    }
}

impl From<String> for Loggable {
    fn from(s: String) -> Self {
        Loggable::Str(s)
    }
}

impl From<&str> for Loggable {
    fn from(s: &str) -> Self {
        Loggable::Str(s.to_string())
    }
}

impl From<DateTime<Utc>> for Loggable {
    fn from(dt: DateTime<Utc>) -> Self {
        Loggable::DateTime(dt)
    }
}

impl From<SharedValue> for Loggable {
    fn from(node: SharedValue) -> Self {
        Loggable::Shared(node)
    }
}

impl<T: Into<Loggable>> From<Option<T>> for Loggable {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Loggable::Null)
    }
}

impl<T: Into<Loggable>> From<Vec<T>> for Loggable {
    fn from(items: Vec<T>) -> Self {
        Loggable::list(items)
    }
}

impl<V: Into<Loggable>> From<HashMap<String, V>> for Loggable {
    fn from(map: HashMap<String, V>) -> Self {
        let mut pairs: Vec<(String, Loggable)> =
            map.into_iter().map(|(k, v)| (k, v.into())).collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        Loggable::Map(pairs)
    }
}

impl<V: Into<Loggable>> From<BTreeMap<String, V>> for Loggable {
    fn from(map: BTreeMap<String, V>) -> Self {
        Loggable::map(map)
    }
}

impl From<Value> for Loggable {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Loggable::Null,
            Value::Bool(b) => Loggable::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Loggable::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Loggable::UInt(u)
                } else {
                    Loggable::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => Loggable::Str(s),
            Value::Array(items) => Loggable::List(items.into_iter().map(Into::into).collect()),
            Value::Object(map) => {
                Loggable::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}
