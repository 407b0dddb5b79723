use async_trait::async_trait;

use crate::attribute::{Attribute, Scalar};
use crate::config::ServerConfig;
use crate::error::Result;
use crate::modification::ModificationKind;
use crate::search::SearchControls;


/// An entry exactly as the directory delivered it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Entry {
    pub dn: String,
    pub attributes: Vec<Attribute>,
}
impl Entry {
    pub fn new(dn: impl Into<String>, attributes: Vec<Attribute>) -> Self {
        Self { dn: dn.into(), attributes }
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
    }
}


/// One change within a modify request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ModificationItem {
    pub kind: ModificationKind,
    pub attribute: Attribute,
}


/// Opens directory sessions for a given server configuration.
#[async_trait]
pub trait Connector: Send + Sync {
    type Session: DirectorySession;

    async fn open_session(&self, config: &ServerConfig) -> Result<Self::Session>;
}


/// A live, bound connection used for exactly one facade operation.
#[async_trait]
pub trait DirectorySession: Send {
    async fn lookup(&mut self, dn: &str) -> Result<Entry>;

    async fn create_subcontext(&mut self, dn: &str, attributes: Vec<Attribute>) -> Result<()>;

    async fn destroy_subcontext(&mut self, dn: &str) -> Result<()>;

    /// Starts a search; `filter` is a template whose `{n}` placeholders are
    /// filled from `filter_args`. Entries are pulled from the returned stream
    /// one by one.
    async fn search(
        &mut self,
        base: &str,
        filter: &str,
        filter_args: &[Scalar],
        controls: &SearchControls,
    ) -> Result<Box<dyn EntryStream>>;

    /// Applies all items in one request; either all of them take effect or none.
    async fn modify_attributes(&mut self, dn: &str, items: Vec<ModificationItem>) -> Result<()>;

    async fn rename(&mut self, source_dn: &str, target_dn: &str, delete_old_rdn: bool) -> Result<()>;

    /// Releases the session. Calling it again is a no-op.
    async fn close(&mut self) -> Result<()>;
}


/// Lazily advanced search results.
#[async_trait]
pub trait EntryStream: Send {
    /// Returns the next entry, or `None` once the search completed successfully.
    async fn next_entry(&mut self) -> Result<Option<Entry>>;
}
