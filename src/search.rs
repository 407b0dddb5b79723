//! Search parameters and their normalization into a [`SearchSpec`].

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use unicase::UniCase;

use crate::attribute::Scalar;
use crate::error::{Error, Result};


pub const DEFAULT_FILTER: &str = "(objectClass=*)";
pub const DEFAULT_TIME_LIMIT_MS: u32 = 5000;
pub const DEFAULT_COUNT_LIMIT: u32 = 20000;


#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum SearchScope {
    Base,
    One,
    #[default]
    Sub,
}
impl SearchScope {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Base => "BASE",
            Self::One => "ONE",
            Self::Sub => "SUB",
        }
    }
}
impl fmt::Display for SearchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
impl FromStr for SearchScope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = UniCase::new(s.trim());
        [Self::Base, Self::One, Self::Sub]
            .into_iter()
            .find(|scope| UniCase::new(scope.name()) == wanted)
            .ok_or_else(|| Error::invalid(format!(
                "unknown search scope {:?} (expected BASE, ONE or SUB)", s,
            )))
    }
}
impl From<SearchScope> for ldap3::Scope {
    fn from(value: SearchScope) -> Self {
        match value {
            SearchScope::Base => ldap3::Scope::Base,
            SearchScope::One => ldap3::Scope::OneLevel,
            SearchScope::Sub => ldap3::Scope::Subtree,
        }
    }
}


/// A fully normalized, immutable search query.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SearchSpec {
    base: String,
    scope: SearchScope,
    filter: String,
    filter_args: Option<Vec<Scalar>>,
    attrs: Option<Vec<String>>,
    time_limit_ms: u32,
    count_limit: u32,
}
impl SearchSpec {
    pub fn new(base: impl Into<String>, scope: SearchScope, filter: impl Into<String>) -> Self {
        Self::with_limits(base, scope, filter, DEFAULT_TIME_LIMIT_MS, DEFAULT_COUNT_LIMIT)
    }

    pub fn with_limits(
        base: impl Into<String>,
        scope: SearchScope,
        filter: impl Into<String>,
        time_limit_ms: u32,
        count_limit: u32,
    ) -> Self {
        Self {
            base: base.into(),
            scope,
            filter: filter.into(),
            filter_args: None,
            attrs: None,
            time_limit_ms,
            count_limit,
        }
    }

    /// Shorthand for a subtree search below the session root.
    pub fn from_filter(filter: impl Into<String>) -> Self {
        Self::new("", SearchScope::Sub, filter)
    }

    pub fn with_filter_args<I, T>(mut self, args: I) -> Self
        where I: IntoIterator<Item = T>, T: Into<Scalar>
    {
        self.filter_args = Some(args.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_attrs<I, T>(mut self, attrs: I) -> Self
        where I: IntoIterator<Item = T>, T: Into<String>
    {
        self.attrs = Some(attrs.into_iter().map(Into::into).collect());
        self
    }

    pub fn base(&self) -> &str { &self.base }
    pub fn scope(&self) -> SearchScope { self.scope }
    pub fn filter(&self) -> &str { &self.filter }
    pub fn time_limit_ms(&self) -> u32 { self.time_limit_ms }
    pub fn count_limit(&self) -> u32 { self.count_limit }

    pub fn filter_args(&self) -> &[Scalar] {
        self.filter_args.as_deref().unwrap_or(&[])
    }

    /// `None` requests all attributes.
    pub fn attrs(&self) -> Option<&[String]> {
        self.attrs.as_deref()
    }

    pub fn controls(&self) -> SearchControls {
        SearchControls {
            scope: self.scope,
            returned_attrs: self.attrs.clone(),
            time_limit_ms: self.time_limit_ms,
            count_limit: self.count_limit,
        }
    }
}
impl Default for SearchSpec {
    fn default() -> Self {
        Self::new("", SearchScope::Sub, DEFAULT_FILTER)
    }
}


/// The per-request knobs handed to a directory session.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SearchControls {
    pub scope: SearchScope,
    /// `None` returns all attributes, an empty list returns none.
    pub returned_attrs: Option<Vec<String>>,
    pub time_limit_ms: u32,
    pub count_limit: u32,
}
impl SearchControls {
    /// Object-scope lookup that returns no attributes.
    pub fn object_only() -> Self {
        Self {
            scope: SearchScope::Base,
            returned_attrs: Some(Vec::new()),
            time_limit_ms: DEFAULT_TIME_LIMIT_MS,
            count_limit: DEFAULT_COUNT_LIMIT,
        }
    }

    /// The protocol counts in whole seconds; round up so a nonzero limit stays nonzero.
    pub fn time_limit_secs(&self) -> u32 {
        self.time_limit_ms.div_ceil(1000)
    }
}


/// Either one value or a list of them.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}
impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::One(value) => vec![value],
            Self::Many(values) => values,
        }
    }
}

/// A loosely typed scalar as found in configuration input.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Literal {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}
impl From<Literal> for Scalar {
    fn from(value: Literal) -> Self {
        match value {
            Literal::Text(s) => Scalar::Text(s),
            Literal::Integer(i) => Scalar::from(i),
            Literal::Float(f) => Scalar::from(f),
            Literal::Boolean(b) => Scalar::from(b),
        }
    }
}
impl From<&str> for Literal {
    fn from(value: &str) -> Self { Self::Text(value.to_owned()) }
}

/// A limit given either as a number or as its decimal string.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(untagged)]
pub enum Limit {
    Number(i64),
    Text(String),
}
impl Limit {
    fn to_u32(&self, key: &str) -> Result<u32> {
        let number = match self {
            Self::Number(n) => *n,
            Self::Text(s) => s.trim().parse::<i64>()
                .map_err(|_| Error::invalid(format!("{} {:?} is not an integer", key, s)))?,
        };
        u32::try_from(number)
            .map_err(|_| Error::invalid(format!("{} {} is out of range", key, number)))
    }
}
impl From<&str> for Limit {
    fn from(value: &str) -> Self { Self::Text(value.to_owned()) }
}
impl From<i64> for Limit {
    fn from(value: i64) -> Self { Self::Number(value) }
}


/// Mapping-style search parameters; every key is optional.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SearchConfig {
    pub base: Option<String>,
    pub scope: Option<String>,
    pub filter: Option<String>,
    pub filter_args: Option<OneOrMany<Literal>>,
    pub attrs: Option<OneOrMany<String>>,
    pub time_limit: Option<Limit>,
    pub count_limit: Option<Limit>,
}
impl SearchConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s)
            .map_err(|e| Error::invalid(format!("malformed search parameters: {}", e)))
    }

    pub fn into_spec(self) -> Result<SearchSpec> {
        SearchSpec::try_from(self)
    }
}
impl TryFrom<SearchConfig> for SearchSpec {
    type Error = Error;

    fn try_from(config: SearchConfig) -> Result<Self> {
        let scope = match config.scope {
            Some(s) => s.parse()?,
            None => SearchScope::Sub,
        };
        let time_limit_ms = match config.time_limit {
            Some(l) => l.to_u32("timeLimit")?,
            None => DEFAULT_TIME_LIMIT_MS,
        };
        let count_limit = match config.count_limit {
            Some(l) => l.to_u32("countLimit")?,
            None => DEFAULT_COUNT_LIMIT,
        };
        Ok(Self {
            base: config.base.unwrap_or_default(),
            scope,
            filter: config.filter.unwrap_or_else(|| DEFAULT_FILTER.to_owned()),
            filter_args: config.filter_args
                .map(|args| args.into_vec().into_iter().map(Scalar::from).collect()),
            attrs: config.attrs.map(OneOrMany::into_vec),
            time_limit_ms,
            count_limit,
        })
    }
}
