//! The eight directory operations, each run inside its own short-lived session.

use tracing::{debug, instrument};

use crate::attribute::{AttrValue, AttributeSet, Scalar};
use crate::config::{Credentials, ServerConfig};
use crate::directory::{Connector, DirectorySession, Entry};
use crate::dn;
use crate::filter;
use crate::error::{Error, Result};
use crate::ldap::LdapConnector;
use crate::modification::{self, Modification, ModificationKind};
use crate::record::Record;
use crate::search::{SearchConfig, SearchControls, SearchSpec, DEFAULT_FILTER};
use crate::session::SessionScope;


/// Uniform access to one directory server.
///
/// The server URL and bind identity are fixed at construction. Every operation
/// opens a fresh session, uses it for exactly that operation and closes it
/// again, so a `Facade` can be shared freely between tasks.
pub struct Facade<C: Connector = LdapConnector> {
    config: ServerConfig,
    connector: C,
}

impl Facade<LdapConnector> {
    /// Anonymous access to `ldap://localhost:389/`.
    pub fn new() -> Self {
        Self::with_connector(ServerConfig::default(), LdapConnector)
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self::with_connector(ServerConfig::anonymous(url), LdapConnector)
    }

    pub fn with_credentials(url: impl Into<String>, bind_dn: impl Into<String>, password: impl Into<String>) -> Self {
        Self::with_connector(
            ServerConfig::with_credentials(url, Credentials::new(bind_dn, password)),
            LdapConnector,
        )
    }
}
impl Default for Facade<LdapConnector> {
    fn default() -> Self { Self::new() }
}

impl<C: Connector> Facade<C> {
    pub fn with_connector(config: ServerConfig, connector: C) -> Self {
        Self { config, connector }
    }

    pub fn config(&self) -> &ServerConfig { &self.config }

    async fn open_scope(&self, operation: &'static str) -> Result<SessionScope<C::Session>> {
        let session = self.connector.open_session(&self.config).await?;
        Ok(SessionScope::new(session, operation))
    }

    /// Creates the entry `dn` with the given attributes.
    #[instrument(skip(self, attributes))]
    pub async fn add(&self, dn: &str, attributes: &AttributeSet) -> Result<()> {
        let encoded = attributes.encode();
        for attribute in &encoded {
            debug!(name = %attribute.name, values = attribute.values.len(), "encoded attribute");
        }

        let mut scope = self.open_scope("add").await?;
        let outcome = scope.session().create_subcontext(dn, encoded).await;
        scope.release(outcome).await
    }

    /// Removes the entry `dn`, failing with [`Error::EntryNotFound`] if it is absent.
    ///
    /// The existence check is a separate round trip; if the entry disappears in
    /// between, the directory's own error is returned.
    #[instrument(skip(self))]
    pub async fn delete(&self, dn: &str) -> Result<()> {
        if !self.exists(dn).await? {
            return Err(Error::EntryNotFound { dn: dn.to_owned() });
        }

        let mut scope = self.open_scope("delete").await?;
        let outcome = scope.session().destroy_subcontext(dn).await;
        scope.release(outcome).await
    }

    #[instrument(skip(self))]
    pub async fn read(&self, dn: &str) -> Result<Entry> {
        let mut scope = self.open_scope("read").await?;
        let outcome = scope.session().lookup(dn).await;
        scope.release(outcome).await
    }

    #[instrument(skip(self))]
    pub async fn exists(&self, dn: &str) -> Result<bool> {
        let mut scope = self.open_scope("exists").await?;
        let outcome = match any_match(scope.session(), dn, DEFAULT_FILTER, &[]).await {
            Err(e) if e.is_no_such_object() => {
                debug!(error = %e, "entry not found");
                Ok(false)
            },
            other => other,
        };
        scope.release(outcome).await
    }

    /// Checks whether `dn` holds the single attribute value in `assertion`.
    #[instrument(skip(self, assertion))]
    pub async fn compare(&self, dn: &str, assertion: &AttributeSet) -> Result<bool> {
        if assertion.len() != 1 {
            return Err(Error::invalid(format!(
                "an assertion must contain exactly one attribute, got {}", assertion.len(),
            )));
        }
        let Some((name, value)) = assertion.iter().next() else {
            return Err(Error::invalid("an assertion must contain exactly one attribute"));
        };
        let value = match value {
            AttrValue::Single(v) => v.clone(),
            AttrValue::Multi(_) => return Err(Error::invalid(format!(
                "the asserted value of {:?} must be a single value", name,
            ))),
        };
        if !is_attribute_description(name) {
            return Err(Error::invalid(format!("{:?} is not a valid attribute name", name)));
        }
        let filter = format!("({}={{0}})", name);

        let mut scope = self.open_scope("compare").await?;
        let outcome = any_match(scope.session(), dn, &filter, &[value]).await;
        scope.release(outcome).await
    }

    /// Moves `dn` to `new_rdn` below `new_superior`.
    #[instrument(skip(self))]
    pub async fn modify_dn(&self, dn: &str, new_rdn: &str, delete_old_rdn: bool, new_superior: &str) -> Result<()> {
        let target = dn::compose(new_superior, new_rdn)
            .ok_or_else(|| Error::invalid(format!(
                "cannot place {:?} below {:?}", new_rdn, new_superior,
            )))?;
        debug!(target = %target, "renaming entry");

        let mut scope = self.open_scope("modify_dn").await?;
        let outcome = scope.session().rename(dn, &target, delete_old_rdn).await;
        scope.release(outcome).await
    }

    /// Applies one kind of change to every attribute in `attributes`.
    pub async fn modify_one(&self, dn: &str, kind: ModificationKind, attributes: &AttributeSet) -> Result<()> {
        self.modify(dn, &[Modification::new(kind, attributes.clone())]).await
    }

    /// Applies all modifications as one atomic modify request.
    #[instrument(skip(self, modifications))]
    pub async fn modify(&self, dn: &str, modifications: &[Modification]) -> Result<()> {
        let items = modification::to_items(modifications);
        debug!(items = items.len(), "modifying entry");

        let mut scope = self.open_scope("modify").await?;
        let outcome = scope.session().modify_attributes(dn, items).await;
        scope.release(outcome).await
    }

    /// Runs the search and collects all records in directory order.
    pub async fn search(&self, spec: &SearchSpec) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        self.each_entry(spec, |record| records.push(record)).await?;
        Ok(records)
    }

    pub async fn search_with(&self, config: SearchConfig) -> Result<Vec<Record>> {
        let spec = config.into_spec()?;
        self.search(&spec).await
    }

    /// Subtree search below the session root.
    pub async fn search_filter(&self, filter: &str) -> Result<Vec<Record>> {
        self.search(&SearchSpec::from_filter(filter)).await
    }

    /// Calls `handler` with each record as it arrives from the directory.
    #[instrument(skip(self, spec, handler), fields(base = %spec.base(), filter = %spec.filter()))]
    pub async fn each_entry<F>(&self, spec: &SearchSpec, mut handler: F) -> Result<()>
        where F: FnMut(Record) + Send
    {
        // placeholder mistakes must not cost a round trip
        let expanded = filter::expand(spec.filter(), spec.filter_args())?;
        debug!(filter = %expanded, "expanded filter");

        let mut scope = self.open_scope("search").await?;
        let outcome = stream_records(scope.session(), spec, &mut handler).await;
        if let Ok(count) = &outcome {
            debug!(count, "search finished");
        }
        scope.release(outcome).await.map(|_| ())
    }

    pub async fn each_entry_with<F>(&self, config: SearchConfig, handler: F) -> Result<()>
        where F: FnMut(Record) + Send
    {
        let spec = config.into_spec()?;
        self.each_entry(&spec, handler).await
    }

    pub async fn each_entry_filter<F>(&self, filter: &str, handler: F) -> Result<()>
        where F: FnMut(Record) + Send
    {
        self.each_entry(&SearchSpec::from_filter(filter), handler).await
    }
}


/// `name` or `name;option...` as in RFC 4512; anything else would alter the filter.
fn is_attribute_description(name: &str) -> bool {
    let mut parts = name.split(';');
    let is_name = |part: &str| part.len() > 0
        && part.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'.');
    parts.next().is_some_and(is_name) && parts.all(is_name)
}

async fn any_match<S: DirectorySession>(session: &mut S, dn: &str, filter: &str, args: &[Scalar]) -> Result<bool> {
    let mut stream = session.search(dn, filter, args, &SearchControls::object_only()).await?;
    Ok(stream.next_entry().await?.is_some())
}

async fn stream_records<S, F>(session: &mut S, spec: &SearchSpec, handler: &mut F) -> Result<usize>
    where S: DirectorySession, F: FnMut(Record) + Send
{
    let controls = spec.controls();
    let mut stream = session.search(spec.base(), spec.filter(), spec.filter_args(), &controls).await?;
    let mut count = 0;
    while let Some(entry) = stream.next_entry().await? {
        handler(Record::from_entry(entry));
        count += 1;
    }
    Ok(count)
}
