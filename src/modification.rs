use std::fmt;
use std::str::FromStr;

use crate::attribute::AttributeSet;
use crate::directory::ModificationItem;
use crate::error::{Error, Result};


#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ModificationKind {
    Add,
    Delete,
    Replace,
}
impl ModificationKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Add => "ADD",
            Self::Delete => "DELETE",
            Self::Replace => "REPLACE",
        }
    }
}
impl fmt::Display for ModificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
impl FromStr for ModificationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ADD" => Ok(Self::Add),
            "DELETE" => Ok(Self::Delete),
            "REPLACE" => Ok(Self::Replace),
            other => Err(Error::invalid(format!(
                "{:?} is not a modification kind (expected ADD, DELETE or REPLACE)", other,
            ))),
        }
    }
}


/// A set of attributes to change in one way.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Modification {
    pub kind: ModificationKind,
    pub attributes: AttributeSet,
}
impl Modification {
    pub fn new(kind: ModificationKind, attributes: AttributeSet) -> Self {
        Self { kind, attributes }
    }

    pub fn add(attributes: AttributeSet) -> Self { Self::new(ModificationKind::Add, attributes) }
    pub fn delete(attributes: AttributeSet) -> Self { Self::new(ModificationKind::Delete, attributes) }
    pub fn replace(attributes: AttributeSet) -> Self { Self::new(ModificationKind::Replace, attributes) }

    /// One item per attribute, in attribute order.
    pub fn items(&self) -> impl Iterator<Item = ModificationItem> + '_ {
        self.attributes.encode()
            .into_iter()
            .map(|attribute| ModificationItem { kind: self.kind, attribute })
    }

    /// Parses loosely typed input of the shape `[[kind, {attributes}], ...]`.
    pub fn list_from_toml(value: &toml::Value) -> Result<Vec<Self>> {
        let toml::Value::Array(pairs) = value else {
            return Err(Error::invalid("modifications must be a list of [kind, attributes] pairs"));
        };
        pairs.iter()
            .enumerate()
            .map(|(i, pair)| Self::pair_from_toml(i, pair))
            .collect()
    }

    fn pair_from_toml(index: usize, pair: &toml::Value) -> Result<Self> {
        let elements = match pair {
            toml::Value::Array(elements) if elements.len() == 2 => elements,
            _ => return Err(Error::invalid(format!(
                "modification {} is not a two-element [kind, attributes] pair", index,
            ))),
        };
        let kind = match &elements[0] {
            toml::Value::String(s) => s.parse()?,
            other => return Err(Error::invalid(format!(
                "modification {} has kind {} which is not a modification kind", index, other,
            ))),
        };
        let attributes = match &elements[1] {
            toml::Value::Table(table) => AttributeSet::from_toml_table(table)?,
            _ => return Err(Error::invalid(format!(
                "modification {} does not carry an attribute table", index,
            ))),
        };
        Ok(Self::new(kind, attributes))
    }
}

/// Flattens modifications into the items of a single modify request.
pub fn to_items(modifications: &[Modification]) -> Vec<ModificationItem> {
    modifications.iter()
        .flat_map(Modification::items)
        .collect()
}
