//! A uniform facade over directory servers: add, delete, read, exists, compare,
//! rename, modify and search, each in its own short-lived session.

pub mod attribute;
pub mod config;
pub mod directory;
pub mod dn;
pub mod error;
pub mod facade;
pub mod filter;
pub mod ldap;
pub mod ldif;
pub mod modification;
pub mod record;
pub mod search;
pub mod session;
pub mod tiny_directory;


pub use crate::attribute::{AttrValue, Attribute, AttributeSet, Scalar};
pub use crate::config::{Credentials, ServerConfig};
pub use crate::directory::{Connector, DirectorySession, Entry, EntryStream, ModificationItem};
pub use crate::error::{Error, Result};
pub use crate::facade::Facade;
pub use crate::ldap::LdapConnector;
pub use crate::modification::{Modification, ModificationKind};
pub use crate::record::Record;
pub use crate::search::{SearchConfig, SearchControls, SearchScope, SearchSpec};
pub use crate::tiny_directory::MemoryDirectory;
