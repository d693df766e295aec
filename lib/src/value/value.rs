use std::{fmt, sync::Arc};
use std::collections::BTreeMap;

use serde::{Serialize, Deserialize, Serializer};

use crate::error::{Error, Result};
use crate::util::LazyFallibleArc;

pub type Dict<K = Arc<str>, V = Value> = BTreeMap<K, V>;

/// Represents any valid value.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Num(Num),
    String(Arc<str>),
    Array(Arc<Vec<Value>>),
    Dict(Arc<Dict>),
    /// Text that is produced on first use. Serializes as the produced text.
    #[serde(skip_deserializing, serialize_with = "Renderable::serialize")]
    Lazy(Renderable),
}

/// A deferred, memoized, fallible text producer.
///
/// Clones share the computation: the producer runs at most once no matter
/// how many clones are forced, and a failure is remembered.
#[derive(Clone)]
pub struct Renderable(LazyFallibleArc<Arc<str>, Error>);

impl Renderable {
    pub fn new<F>(producer: F) -> Self
        where F: FnOnce() -> Result<String> + Send + Sync + 'static
    {
        Renderable(LazyFallibleArc::new(move || producer().map(Arc::from)))
    }

    /// Renders `source` as Markdown when first forced.
    pub fn markdown<S: Into<Arc<str>>>(source: S) -> Self {
        let source = source.into();
        Renderable::new(move || Ok(crate::markdown::to_html(&source)))
    }

    pub fn force(&self) -> Result<Arc<str>> {
        self.0.force().cloned().map_err(|e| e.clone())
    }

    pub fn is_forced(&self) -> bool {
        self.0.is_forced()
    }

    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::Error as _;

        let text = self.force().map_err(|e| S::Error::custom(e))?;
        serializer.serialize_str(&text)
    }
}

impl PartialEq for Renderable {
    fn eq(&self, other: &Self) -> bool {
        self.0.ptr_eq(&other.0)
    }
}

impl fmt::Debug for Renderable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.is_forced() {
            true => f.debug_tuple("Renderable").field(&*self.0).finish(),
            false => f.write_str("Renderable(<pending>)"),
        }
    }
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(&**s),
            _ => None
        }
    }

    pub fn as_slice(&self) -> Option<&[Value]> {
        match self {
            Value::Array(v) => Some(v.as_slice()),
            _ => None
        }
    }

    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            Value::Dict(v) => Some(&**v),
            _ => None
        }
    }

    pub fn as_lazy(&self) -> Option<&Renderable> {
        match self {
            Value::Lazy(v) => Some(v),
            _ => None
        }
    }

    /// Returns `true` if `self` is a dictionary with no entries.
    pub fn is_empty_dict(&self) -> bool {
        self.as_dict().map_or(false, |dict| dict.is_empty())
    }

    /// Looks up a `/`-separated `path` through nested dictionaries.
    ///
    /// ```rust
    /// use sitebake::{dict, value::Value};
    ///
    /// let team = dict!["bio" => dict!["content" => "hello"]];
    /// let value = Value::from(dict!["team" => team]);
    /// assert_eq!(value.get("team/bio/content"), Some(&Value::from("hello")));
    /// assert_eq!(value.get("team/missing"), None);
    /// ```
    pub fn get(&self, path: &str) -> Option<&Value> {
        path.split('/')
            .filter(|key| !key.is_empty())
            .try_fold(self, |value, key| value.as_dict()?.get(key))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Num(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Dict(_) => "dict",
            Value::Lazy(_) => "lazy",
        }
    }
}

impl fmt::Display for Value {
    /// Displays scalars and strings as text, forcing lazy values. Arrays and
    /// dictionaries display as JSON.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => b.fmt(f),
            Value::Num(n) => n.fmt(f),
            Value::String(s) => s.fmt(f),
            Value::Lazy(r) => match r.force() {
                Ok(text) => text.fmt(f),
                Err(_) => Err(fmt::Error),
            },
            Value::Array(_) | Value::Dict(_) => {
                let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
                f.write_str(&json)
            }
        }
    }
}

macro_rules! impl_from_primitive {
    ($($T:ty),+ => $E:ident::$kind:ident) => {
        $(
            impl From<$T> for $E {
                fn from(value: $T) -> Self {
                    $E::$kind(value.into())
                }
            }
        )+
    };
}

impl_from_primitive!(bool => Value::Bool);
impl_from_primitive!(&str => Value::String);
impl_from_primitive!(std::borrow::Cow<'_, str> => Value::String);
impl_from_primitive!(String => Value::String);
impl_from_primitive!(Arc<str> => Value::String);
impl_from_primitive!(Arc<Vec<Value>> => Value::Array);
impl_from_primitive!(Arc<Dict> => Value::Dict);
impl_from_primitive!(Renderable => Value::Lazy);
impl_from_primitive!(u8, u16, u32, u64, usize => Value::Num);
impl_from_primitive!(i8, i16, i32, i64, isize => Value::Num);
impl_from_primitive!(f32, f64 => Value::Num);

impl From<()> for Value  {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

impl<T> From<Option<T>> for Value where Value: From<T> {
    fn from(value: Option<T>) -> Self {
        value.map(Value::from).unwrap_or(Value::Null)
    }
}

impl<T> From<Vec<T>> for Value where Value: From<T> {
    fn from(value: Vec<T>) -> Self {
        value.into_iter()
            .map(Value::from)
            .collect()
    }
}

impl<K, V> From<Dict<K, V>> for Value where Arc<str>: From<K>, Value: From<V> {
    fn from(value: Dict<K, V>) -> Self {
        let dict = value.into_iter()
            .map(|(k, v)| (<Arc::<str>>::from(k), Value::from(v)))
            .collect::<Dict>();

        Value::Dict(Arc::new(dict))
    }
}

impl FromIterator<Value> for Value {
    fn from_iter<T: IntoIterator<Item = Value>>(iter: T) -> Self {
        let vec = iter.into_iter().collect::<Vec<Value>>();
        Value::Array(Arc::new(vec))
    }
}

/// A signed, unsigned, or floating-point number.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Num {
    Int(i64),
    UInt(u64),
    Float(f64),
}

impl fmt::Display for Num {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Num::Int(v) => v.fmt(f),
            Num::UInt(v) => v.fmt(f),
            Num::Float(v) => v.fmt(f),
        }
    }
}

macro_rules! impl_from_for_num_value {
    ($($T:ty: $V:ident),* $(,)?) => ($(
        impl From<$T> for Num {
            fn from(value: $T) -> Num {
                Num::$V(value.into())
            }
        }
    )*)
}

impl_from_for_num_value! {
    u8: Int, u16: Int, u32: Int, u64: UInt,
    i8: Int, i16: Int, i32: Int, i64: Int,
    f32: Float, f64: Float,
}

impl From<usize> for Num {
    fn from(value: usize) -> Num {
        Num::UInt(value as u64)
    }
}

impl From<isize> for Num {
    fn from(value: isize) -> Num {
        Num::Int(value as i64)
    }
}
