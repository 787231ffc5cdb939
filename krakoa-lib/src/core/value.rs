//! Deals with the data representation shared by the compiler and the vm
//!
//! A [`Value`] is generic over the representation of its string leaves. The compiler reads
//! `Value<String>` from the parser, and the program stores `Value<TextIdx>`, where every
//! string leaf has been replaced by its index into the text pool. Lambdas are never touched
//! by that conversion, they stay source text until the vm evaluates them.

use indexmap::IndexMap;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use std::fmt;

/// represents an int index into the text pool
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TextIdx(pub usize);

pub type Number = OrderedFloat<f64>;

/// Params of a node or instruction, keys are never pooled
pub type Params<S = String> = IndexMap<String, Value<S>>;

/// A plain map of literal values, used for frames and context objects
pub type Object = IndexMap<String, Value>;

/// All values that can appear in a script.
///
/// The variant order matters for deserialization: serde tries them top to bottom.
/// `Text` comes before `Number`, so a bare integer in a pooled program is read back as a
/// pool index, while literal numbers in pooled params are written as `{"__num": ..}`
/// (see [`PooledNumber`]). Like `__type`, the `__num` key is reserved: a map holding
/// nothing but `__num` reads back as a number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value<S = String> {
    Null,
    Bool(bool),
    Text(S),
    Number(#[serde(with = "pooled_number")] Number),
    Lambda(Lambda),
    List(Vec<Value<S>>),
    Map(IndexMap<String, Value<S>>),
}

/// a deferred expression, evaluated at runtime against the frame stack
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Lambda {
    pub kind: LambdaKind,
    pub code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LambdaKind {
    #[serde(rename = "lambda")]
    Lambda,
}

impl Lambda {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            kind: LambdaKind::Lambda,
            code: code.into(),
        }
    }
}

/// wire form of a number, see [`Value`]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PooledNumber {
    #[serde(rename = "__num")]
    pub num: f64,
}

mod pooled_number {
    use super::{Number, PooledNumber};
    use ordered_float::OrderedFloat;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(n: &Number, s: S) -> Result<S::Ok, S::Error> {
        PooledNumber { num: n.0 }.serialize(s)
    }

    /// accepts the wrapped form as well as a plain number, so hand written
    /// node json can use ordinary numbers
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Number, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Wrapped(PooledNumber),
            Plain(f64),
        }
        Ok(match Repr::deserialize(d)? {
            Repr::Wrapped(PooledNumber { num }) => OrderedFloat(num),
            Repr::Plain(num) => OrderedFloat(num),
        })
    }
}

impl<S> Value<S> {
    pub fn number(x: f64) -> Self {
        Value::Number(OrderedFloat(x))
    }

    /// converts every string leaf with `f`. Lambdas and map keys are left alone
    pub fn try_map_text<T, E>(self, f: &mut impl FnMut(S) -> Result<T, E>) -> Result<Value<T>, E> {
        Ok(match self {
            Value::Null => Value::Null,
            Value::Bool(b) => Value::Bool(b),
            Value::Number(n) => Value::Number(n),
            Value::Text(s) => Value::Text(f(s)?),
            Value::Lambda(l) => Value::Lambda(l),
            Value::List(elems) => Value::List(
                elems
                    .into_iter()
                    .map(|e| e.try_map_text(f))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Map(entries) => Value::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| Ok((k, v.try_map_text(f)?)))
                    .collect::<Result<_, _>>()?,
            ),
        })
    }
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(n.0),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Object> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// plain json, numbers included. Used to display frames, where the pooled
    /// number form would only be noise
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Text(s) => Json::String(s.clone()),
            Value::Number(n) => serde_json::Number::from_f64(n.0)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::Lambda(l) => serde_json::json!({"kind": "lambda", "code": l.code}),
            Value::List(elems) => Json::Array(elems.iter().map(Value::to_json).collect()),
            Value::Map(entries) => Json::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// A context object is what a contextual instruction pushes for its id.
    /// It is recognized by the `__type` entry
    pub fn is_context_object(&self) -> bool {
        matches!(self, Value::Map(m) if m.contains_key("__type"))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::number(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Object> for Value {
    fn from(m: Object) -> Self {
        Value::Map(m)
    }
}

/// writes numbers the way scripts expect to read them: `100`, not `100.0`
pub fn fmt_number(x: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e15 {
        write!(f, "{}", x as i64)
    } else {
        write!(f, "{}", x)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Text(s) => write!(f, "{}", s),
            Value::Number(n) => fmt_number(n.0, f),
            Value::Lambda(l) => write!(f, "λ({})", l.code),
            Value::List(elems) => {
                write!(f, "[")?;
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", e)?;
                }
                write!(f, "]")
            }
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}
