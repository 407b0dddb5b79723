//! Conversion between native values and directory attributes.
//!
//! A caller hands over an [`AttributeSet`] mapping names to either a single
//! [`Scalar`] or an ordered collection of them. On the wire every attribute is
//! just a name with a list of values; [`encode`] and [`decode`] translate
//! between the two shapes.

use std::borrow::Cow;
use std::fmt;

use unicase::UniCase;

use crate::error::{Error, Result};


/// A single attribute value as it travels to and from the directory.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Scalar {
    Text(String),
    Binary(Vec<u8>),
}
impl Scalar {
    /// Interprets raw wire bytes, preferring text when they are valid UTF-8.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(s) => Self::Text(s),
            Err(e) => Self::Binary(e.into_bytes()),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(s) => s.as_bytes(),
            Self::Binary(b) => b.as_slice(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s.as_str()),
            Self::Binary(_) => None,
        }
    }

    pub fn to_text_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.as_bytes())
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Text(s) => s.into_bytes(),
            Self::Binary(b) => b,
        }
    }
}
impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_text_lossy())
    }
}

macro_rules! scalar_from_display {
    ($($t:ty),+ $(,)?) => {
        $(
            impl From<$t> for Scalar {
                fn from(value: $t) -> Self { Self::Text(value.to_string()) }
            }
        )+
    }
}
scalar_from_display!(&str, &String, bool, i32, i64, u32, u64, usize, f64);

impl From<String> for Scalar {
    fn from(value: String) -> Self { Self::Text(value) }
}
impl From<Vec<u8>> for Scalar {
    fn from(value: Vec<u8>) -> Self { Self::Binary(value) }
}
impl From<&[u8]> for Scalar {
    fn from(value: &[u8]) -> Self { Self::Binary(value.to_vec()) }
}


/// The native shape of an attribute: one scalar or an ordered collection.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum AttrValue {
    Single(Scalar),
    Multi(Vec<Scalar>),
}
impl AttrValue {
    pub fn as_single(&self) -> Option<&Scalar> {
        match self {
            Self::Single(s) => Some(s),
            Self::Multi(_) => None,
        }
    }

    pub fn as_multi(&self) -> Option<&[Scalar]> {
        match self {
            Self::Single(_) => None,
            Self::Multi(values) => Some(values.as_slice()),
        }
    }

    /// All values in order, regardless of multiplicity.
    pub fn values(&self) -> &[Scalar] {
        match self {
            Self::Single(s) => std::slice::from_ref(s),
            Self::Multi(values) => values.as_slice(),
        }
    }
}
macro_rules! single_attr_value_from {
    ($($t:ty),+ $(,)?) => {
        $(
            impl From<$t> for AttrValue {
                fn from(value: $t) -> Self { Self::Single(Scalar::from(value)) }
            }
        )+
    }
}
single_attr_value_from!(Scalar, &str, &String, String, bool, i32, i64, u32, u64, usize, f64, Vec<u8>, &[u8]);

impl From<Vec<Scalar>> for AttrValue {
    fn from(value: Vec<Scalar>) -> Self { Self::Multi(value) }
}
impl From<Vec<String>> for AttrValue {
    fn from(value: Vec<String>) -> Self { Self::Multi(value.into_iter().map(Scalar::Text).collect()) }
}
impl From<Vec<&str>> for AttrValue {
    fn from(value: Vec<&str>) -> Self { value.into_iter().collect() }
}
impl<T: Into<Scalar>> FromIterator<T> for AttrValue {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::Multi(iter.into_iter().map(Into::into).collect())
    }
}


/// Wire representation: a name and its values in directory order.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub values: Vec<Scalar>,
}
impl Attribute {
    pub fn new(name: impl Into<String>, values: Vec<Scalar>) -> Self {
        Self { name: name.into(), values }
    }
}


pub fn encode(name: &str, value: &AttrValue) -> Attribute {
    let values = match value {
        AttrValue::Single(s) => vec![s.clone()],
        AttrValue::Multi(values) => values.clone(),
    };
    Attribute::new(name, values)
}

pub fn decode(attribute: Attribute) -> AttrValue {
    let mut values = attribute.values;
    if values.len() == 1 {
        // exactly one value => scalar
        AttrValue::Single(values.remove(0))
    } else {
        AttrValue::Multi(values)
    }
}


/// Insertion-ordered attribute map with case-insensitive, unique names.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AttributeSet {
    entries: Vec<(UniCase<String>, AttrValue)>,
}
impl AttributeSet {
    pub fn new() -> Self { Self::default() }

    /// Sets `name` to `value`. An existing attribute of the same name (in any
    /// case) keeps its position and has its value replaced.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<AttrValue>) {
        let name = UniCase::new(name.into());
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        let name = UniCase::new(name);
        self.entries.iter()
            .find(|(n, _)| UniCase::new(n.as_str()) == name)
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn encode(&self) -> Vec<Attribute> {
        self.iter()
            .map(|(name, value)| encode(name, value))
            .collect()
    }

    /// Builds a set from a TOML table of scalars or arrays of scalars.
    pub fn from_toml_table(table: &toml::Table) -> Result<Self> {
        let mut set = Self::new();
        for (name, value) in table {
            let attr_value = match value {
                toml::Value::Array(items) => {
                    let scalars = items.iter()
                        .map(|item| toml_scalar(name, item))
                        .collect::<Result<Vec<Scalar>>>()?;
                    AttrValue::Multi(scalars)
                },
                other => AttrValue::Single(toml_scalar(name, other)?),
            };
            set.insert(name.clone(), attr_value);
        }
        Ok(set)
    }
}
impl<N: Into<String>, V: Into<AttrValue>> FromIterator<(N, V)> for AttributeSet {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (name, value) in iter {
            set.insert(name, value);
        }
        set
    }
}

fn toml_scalar(name: &str, value: &toml::Value) -> Result<Scalar> {
    match value {
        toml::Value::String(s) => Ok(Scalar::Text(s.clone())),
        toml::Value::Integer(i) => Ok(Scalar::from(*i)),
        toml::Value::Float(f) => Ok(Scalar::from(*f)),
        toml::Value::Boolean(b) => Ok(Scalar::from(*b)),
        toml::Value::Datetime(d) => Ok(Scalar::Text(d.to_string())),
        toml::Value::Array(_) | toml::Value::Table(_) => Err(Error::invalid(format!(
            "attribute {:?} must be a scalar or a flat list of scalars", name,
        ))),
    }
}
