//! A connector double that records every session call and can inject failures.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use ldapfacade::{
    Attribute, Connector, DirectorySession, Entry, EntryStream, Error, MemoryDirectory,
    ModificationItem, Result, Scalar, SearchControls, ServerConfig,
};
use ldapfacade::tiny_directory::MemorySession;


pub const PEOPLE_LDIF: &str = "\
dn: dc=example,dc=com
objectClass: domain
dc: example

dn: ou=people,dc=example,dc=com
objectClass: organizationalUnit
ou: people

dn: uid=jdoe,ou=people,dc=example,dc=com
uid: jdoe
mail: a@x.com
mail: b@x.com

dn: uid=asmith,ou=people,dc=example,dc=com
uid: asmith
cn: Anna Smith
";


#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Call {
    Lookup(String),
    Create(String),
    Destroy(String),
    Search { base: String, filter: String, args: Vec<Scalar> },
    Modify { dn: String, items: Vec<ModificationItem> },
    Rename { source: String, target: String, delete_old_rdn: bool },
}


#[derive(Debug, Default)]
pub struct JournalState {
    pub opened: usize,
    pub closed: usize,
    pub calls: Vec<Call>,
}

#[derive(Clone, Debug, Default)]
pub struct Journal(Arc<Mutex<JournalState>>);
impl Journal {
    fn with<T>(&self, f: impl FnOnce(&mut JournalState) -> T) -> T {
        let mut state = self.0.lock().unwrap();
        f(&mut state)
    }

    pub fn opened(&self) -> usize { self.with(|s| s.opened) }
    pub fn closed(&self) -> usize { self.with(|s| s.closed) }
    pub fn calls(&self) -> Vec<Call> { self.with(|s| s.calls.clone()) }

    fn record(&self, call: Call) {
        self.with(|s| s.calls.push(call));
    }
}


/// Serves sessions from a [`MemoryDirectory`], optionally failing every
/// directory call with a fixed result code or failing the close itself.
#[derive(Clone, Debug)]
pub struct RecordingConnector {
    pub directory: MemoryDirectory,
    pub journal: Journal,
    pub fail_with: Option<u32>,
    pub fail_close: bool,
}
impl RecordingConnector {
    pub fn new(directory: MemoryDirectory) -> Self {
        Self {
            directory,
            journal: Journal::default(),
            fail_with: None,
            fail_close: false,
        }
    }

    pub fn people() -> Self {
        Self::new(MemoryDirectory::from_ldif(PEOPLE_LDIF).unwrap())
    }

    pub fn failing_with(mut self, code: u32) -> Self {
        self.fail_with = Some(code);
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }
}
#[async_trait]
impl Connector for RecordingConnector {
    type Session = RecordingSession;

    async fn open_session(&self, config: &ServerConfig) -> Result<RecordingSession> {
        let inner = self.directory.open_session(config).await?;
        self.journal.with(|s| s.opened += 1);
        Ok(RecordingSession {
            inner,
            journal: self.journal.clone(),
            fail_with: self.fail_with,
            fail_close: self.fail_close,
        })
    }
}


pub struct RecordingSession {
    inner: MemorySession,
    journal: Journal,
    fail_with: Option<u32>,
    fail_close: bool,
}
impl RecordingSession {
    fn injected(&self) -> Result<()> {
        match self.fail_with {
            Some(code) => Err(Error::naming(code, "injected failure")),
            None => Ok(()),
        }
    }
}
#[async_trait]
impl DirectorySession for RecordingSession {
    async fn lookup(&mut self, dn: &str) -> Result<Entry> {
        self.journal.record(Call::Lookup(dn.to_owned()));
        self.injected()?;
        self.inner.lookup(dn).await
    }

    async fn create_subcontext(&mut self, dn: &str, attributes: Vec<Attribute>) -> Result<()> {
        self.journal.record(Call::Create(dn.to_owned()));
        self.injected()?;
        self.inner.create_subcontext(dn, attributes).await
    }

    async fn destroy_subcontext(&mut self, dn: &str) -> Result<()> {
        self.journal.record(Call::Destroy(dn.to_owned()));
        self.injected()?;
        self.inner.destroy_subcontext(dn).await
    }

    async fn search(
        &mut self,
        base: &str,
        filter: &str,
        filter_args: &[Scalar],
        controls: &SearchControls,
    ) -> Result<Box<dyn EntryStream>> {
        self.journal.record(Call::Search {
            base: base.to_owned(),
            filter: filter.to_owned(),
            args: filter_args.to_vec(),
        });
        self.injected()?;
        self.inner.search(base, filter, filter_args, controls).await
    }

    async fn modify_attributes(&mut self, dn: &str, items: Vec<ModificationItem>) -> Result<()> {
        self.journal.record(Call::Modify { dn: dn.to_owned(), items: items.clone() });
        self.injected()?;
        self.inner.modify_attributes(dn, items).await
    }

    async fn rename(&mut self, source_dn: &str, target_dn: &str, delete_old_rdn: bool) -> Result<()> {
        self.journal.record(Call::Rename {
            source: source_dn.to_owned(),
            target: target_dn.to_owned(),
            delete_old_rdn,
        });
        self.injected()?;
        self.inner.rename(source_dn, target_dn, delete_old_rdn).await
    }

    async fn close(&mut self) -> Result<()> {
        self.journal.with(|s| s.closed += 1);
        self.inner.close().await?;
        if self.fail_close {
            return Err(Error::protocol("injected close failure"));
        }
        Ok(())
    }
}
