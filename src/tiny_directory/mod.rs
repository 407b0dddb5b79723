//! A small directory server living entirely in memory.
//!
//! Entries form a tree keyed by their (case-folded) RDNs. Failures are reported
//! with the same LDAP result codes a real server would send, so the facade
//! behaves identically on top of either backend.

pub mod filter;


use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::attribute::{Attribute, Scalar};
use crate::config::{Credentials, ServerConfig};
use crate::directory::{Connector, DirectorySession, Entry, EntryStream, ModificationItem};
use crate::dn::{self, dn_to_rdns, Rdn};
use crate::error::{Error, Result, RC_NO_SUCH_OBJECT};
use crate::filter as filter_template;
use crate::ldif::parse_ldif;
use crate::modification::ModificationKind;
use crate::search::{SearchControls, SearchScope};


const RC_SIZE_LIMIT_EXCEEDED: u32 = 4;
const RC_NO_SUCH_ATTRIBUTE: u32 = 16;
const RC_ATTRIBUTE_OR_VALUE_EXISTS: u32 = 20;
const RC_INVALID_DN_SYNTAX: u32 = 34;
const RC_UNWILLING_TO_PERFORM: u32 = 53;
const RC_NOT_ALLOWED_ON_NON_LEAF: u32 = 66;
const RC_ENTRY_ALREADY_EXISTS: u32 = 68;

const PASSWORD_ATTRIBUTE: &str = "userPassword";


#[derive(Clone, Debug, Eq, PartialEq)]
struct Object {
    /// The RDN as it was spelled when the entry was created.
    rdn: String,
    attributes: Vec<Attribute>,
    children: BTreeMap<Rdn, Object>,
    /// Placeholder above a naming context; invisible to every operation.
    glue: bool,
}
impl Object {
    fn new(rdn: impl Into<String>, attributes: Vec<Attribute>) -> Self {
        Self {
            rdn: rdn.into(),
            attributes,
            children: BTreeMap::new(),
            glue: false,
        }
    }

    fn glue(rdn: impl Into<String>) -> Self {
        Self {
            glue: true,
            ..Self::new(rdn, Vec::new())
        }
    }

    fn root() -> Self {
        Self::new("", vec![Attribute::new("objectClass", vec![Scalar::from("top")])])
    }

    fn find(&self, rdns: &[Rdn]) -> Option<&Object> {
        match rdns.split_last() {
            None => Some(self),
            Some((top, rest)) => self.children.get(&top.folded())?.find(rest),
        }
    }

    fn find_mut(&mut self, rdns: &[Rdn]) -> Option<&mut Object> {
        match rdns.split_last() {
            None => Some(self),
            Some((top, rest)) => self.children.get_mut(&top.folded())?.find_mut(rest),
        }
    }

    /// Like [`Object::find`], skipping glue.
    fn find_entry(&self, rdns: &[Rdn]) -> Option<&Object> {
        self.find(rdns)
            .filter(|o| !o.glue)
    }

    fn find_entry_mut(&mut self, rdns: &[Rdn]) -> Option<&mut Object> {
        self.find_mut(rdns)
            .filter(|o| !o.glue)
    }

    /// Walks down to `rdns`, creating glue for every missing step.
    fn make_path(&mut self, rdns: &[Rdn], texts: &[&str]) -> &mut Object {
        match (rdns.split_last(), texts.split_last()) {
            (Some((top, rest)), Some((text, text_rest))) => self.children
                .entry(top.folded())
                .or_insert_with(|| Object::glue(*text))
                .make_path(rest, text_rest),
            _ => self,
        }
    }

    /// Like [`Object::find_entry`], also rebuilding the DN from the stored spellings.
    fn find_with_dn(&self, rdns: &[Rdn]) -> Option<(String, &Object)> {
        let mut dn = String::new();
        let mut current = self;
        for rdn in rdns.iter().rev() {
            current = current.children.get(&rdn.folded())?;
            dn = child_dn(&dn, &current.rdn);
        }
        if current.glue {
            None
        } else {
            Some((dn, current))
        }
    }

    /// Collects all entries below this one, parents before children.
    fn descendants<'a>(&'a self, dn: &str, found: &mut Vec<(String, &'a Object)>) {
        for child in self.children.values() {
            let dn = child_dn(dn, &child.rdn);
            if !child.glue {
                found.push((dn.clone(), child));
            }
            child.descendants(&dn, found);
        }
    }

    fn attribute_mut(&mut self, name: &str) -> Option<&mut Attribute> {
        self.attributes.iter_mut()
            .find(|a| a.name.eq_ignore_ascii_case(name))
    }
}

/// Composes the DN of a child from the DN of its parent. `rdn` is one
/// already-split component, so no validation is needed.
fn child_dn(parent_dn: &str, rdn: &str) -> String {
    if parent_dn.len() == 0 {
        rdn.to_owned()
    } else {
        format!("{},{}", rdn, parent_dn)
    }
}

/// The RDNs of `dn` as spelled, leftmost first.
fn rdn_texts(dn: &str) -> Vec<&str> {
    let mut texts = Vec::new();
    let mut rest = dn;
    while let Some((rdn, tail)) = dn::split_first_rdn(rest) {
        texts.push(rdn);
        rest = tail;
    }
    texts
}

fn parse_dn(dn: &str) -> Result<Vec<Rdn>> {
    dn_to_rdns(dn)
        .ok_or_else(|| Error::naming(RC_INVALID_DN_SYNTAX, format!("invalid DN syntax: {:?}", dn)))
}

fn no_such_object(dn: &str) -> Error {
    Error::naming(RC_NO_SUCH_OBJECT, format!("no such object: {:?}", dn))
}

fn same_value(value: &Scalar, other: &[u8]) -> bool {
    value.as_bytes().eq_ignore_ascii_case(other)
}

/// Adds the naming value of `rdn` to `attributes` unless it is already there.
fn ensure_rdn_value(attributes: &mut Vec<Attribute>, rdn: &Rdn) {
    let value = Scalar::from_bytes(rdn.value.clone());
    match attributes.iter_mut().find(|a| a.name.eq_ignore_ascii_case(&rdn.key)) {
        Some(attribute) => {
            if !attribute.values.iter().any(|v| same_value(v, &rdn.value)) {
                attribute.values.push(value);
            }
        },
        None => attributes.push(Attribute::new(rdn.key.clone(), vec![value])),
    }
}


/// Inserts a new leaf. Without `create_ancestors`, the parent must be an
/// existing entry; with it, missing ancestors become glue.
fn insert_entry(root: &mut Object, dn: &str, mut attributes: Vec<Attribute>, create_ancestors: bool) -> Result<()> {
    let rdns = parse_dn(dn)?;
    let texts = rdn_texts(dn);
    let (Some((own, parent_rdns)), Some((own_text, parent_texts))) = (rdns.split_first(), texts.split_first()) else {
        return Err(Error::naming(RC_ENTRY_ALREADY_EXISTS, "the root entry always exists"));
    };
    let parent = if create_ancestors {
        root.make_path(parent_rdns, parent_texts)
    } else {
        root.find_entry_mut(parent_rdns)
            .ok_or_else(|| Error::naming(RC_NO_SUCH_OBJECT, format!("parent of {:?} does not exist", dn)))?
    };

    attributes.retain(|a| a.values.len() > 0);
    ensure_rdn_value(&mut attributes, own);
    match parent.children.get_mut(&own.folded()) {
        Some(existing) if existing.glue => {
            existing.glue = false;
            existing.rdn = (*own_text).to_owned();
            existing.attributes = attributes;
        },
        Some(_) => {
            return Err(Error::naming(RC_ENTRY_ALREADY_EXISTS, format!("entry already exists: {:?}", dn)));
        },
        None => {
            parent.children.insert(own.folded(), Object::new(*own_text, attributes));
        },
    }
    Ok(())
}

fn apply_modification(attributes: &mut Vec<Attribute>, item: ModificationItem) -> Result<()> {
    let ModificationItem { kind, attribute } = item;
    let position = attributes.iter()
        .position(|a| a.name.eq_ignore_ascii_case(&attribute.name));

    match kind {
        ModificationKind::Add => {
            let Some(index) = position else {
                if attribute.values.len() > 0 {
                    attributes.push(attribute);
                }
                return Ok(());
            };
            for value in attribute.values {
                let existing = &mut attributes[index].values;
                if existing.iter().any(|v| same_value(v, value.as_bytes())) {
                    return Err(Error::naming(
                        RC_ATTRIBUTE_OR_VALUE_EXISTS,
                        format!("{} already holds the value {:?}", attribute.name, value.to_text_lossy()),
                    ));
                }
                existing.push(value);
            }
        },
        ModificationKind::Delete => {
            let Some(index) = position else {
                return Err(Error::naming(RC_NO_SUCH_ATTRIBUTE, format!("no such attribute: {}", attribute.name)));
            };
            if attribute.values.len() == 0 {
                attributes.remove(index);
                return Ok(());
            }
            for value in &attribute.values {
                let existing = &mut attributes[index].values;
                let Some(value_index) = existing.iter().position(|v| same_value(v, value.as_bytes())) else {
                    return Err(Error::naming(
                        RC_NO_SUCH_ATTRIBUTE,
                        format!("{} does not hold the value {:?}", attribute.name, value.to_text_lossy()),
                    ));
                };
                existing.remove(value_index);
            }
            if attributes[index].values.len() == 0 {
                attributes.remove(index);
            }
        },
        ModificationKind::Replace => {
            match (position, attribute.values.len() == 0) {
                (Some(index), true) => { attributes.remove(index); },
                (Some(index), false) => attributes[index].values = attribute.values,
                (None, true) => {},
                (None, false) => attributes.push(attribute),
            }
        },
    }
    Ok(())
}

fn project(attributes: &[Attribute], returned_attrs: Option<&[String]>) -> Vec<Attribute> {
    let Some(names) = returned_attrs else {
        return attributes.to_vec();
    };
    if names.iter().any(|n| n == "*") {
        return attributes.to_vec();
    }
    // "1.1" names no attribute and thereby selects none
    attributes.iter()
        .filter(|a| names.iter().any(|n| n.eq_ignore_ascii_case(&a.name)))
        .cloned()
        .collect()
}

fn check_password(root: &Object, credentials: &Credentials) -> bool {
    let Some(rdns) = dn_to_rdns(&credentials.bind_dn) else { return false };
    if rdns.len() == 0 {
        return false;
    }
    let Some(object) = root.find_entry(&rdns) else { return false };
    object.attributes.iter()
        .filter(|a| a.name.eq_ignore_ascii_case(PASSWORD_ATTRIBUTE))
        .flat_map(|a| a.values.iter())
        .any(|v| v.as_bytes() == credentials.password.as_bytes())
}


/// A shared in-memory directory. Clones refer to the same tree.
#[derive(Clone, Debug)]
pub struct MemoryDirectory {
    root: Arc<Mutex<Object>>,
}
impl MemoryDirectory {
    pub fn new() -> Self {
        Self {
            root: Arc::new(Mutex::new(Object::root())),
        }
    }

    /// Loads all content records of an LDIF document, in any order.
    pub fn from_ldif(ldif: &str) -> Result<Self> {
        let directory = Self::new();
        for record in parse_ldif(ldif) {
            directory.insert(&record.dn, record.attributes.encode())
                .map_err(|e| Error::invalid(format!("cannot load LDIF record {:?}: {}", record.dn, e)))?;
        }
        Ok(directory)
    }

    /// Adds an entry directly, bypassing sessions. Missing ancestors are
    /// created as glue, so `dc=example,dc=com` can start a naming context.
    pub fn insert(&self, dn: &str, attributes: Vec<Attribute>) -> Result<()> {
        let mut root = lock(&self.root)?;
        insert_entry(&mut root, dn, attributes, true)
    }

    /// The number of entries, not counting the root.
    pub fn len(&self) -> usize {
        self.snapshot()
            .map(|entries| entries.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All entries below the root, parents before children.
    pub fn snapshot(&self) -> Result<Vec<Entry>> {
        let root = lock(&self.root)?;
        let mut found = Vec::new();
        root.descendants("", &mut found);
        Ok(found.into_iter()
            .map(|(dn, object)| Entry::new(dn, object.attributes.clone()))
            .collect())
    }
}
impl Default for MemoryDirectory {
    fn default() -> Self { Self::new() }
}

fn lock(root: &Mutex<Object>) -> Result<std::sync::MutexGuard<'_, Object>> {
    root.lock()
        .map_err(|_| Error::protocol("in-memory directory is poisoned"))
}

#[async_trait]
impl Connector for MemoryDirectory {
    type Session = MemorySession;

    async fn open_session(&self, config: &ServerConfig) -> Result<MemorySession> {
        if let Some(credentials) = &config.credentials {
            let authenticated = {
                let root = lock(&self.root)?;
                check_password(&root, credentials)
            };
            if !authenticated {
                warn!(bind_dn = %credentials.bind_dn, "rejecting bind to in-memory directory");
                return Err(Error::AuthFailure {
                    bind_dn: credentials.bind_dn.clone(),
                    message: "invalid credentials".to_owned(),
                });
            }
        }
        debug!(url = %config.url, bind_dn = ?config.bind_dn(), "opened in-memory session");
        Ok(MemorySession {
            root: Arc::clone(&self.root),
            closed: false,
        })
    }
}


#[derive(Debug)]
pub struct MemorySession {
    root: Arc<Mutex<Object>>,
    closed: bool,
}
impl MemorySession {
    fn with_root<T, F>(&self, operation: F) -> Result<T>
        where F: FnOnce(&mut Object) -> Result<T>
    {
        if self.closed {
            return Err(Error::protocol("session has been closed"));
        }
        let mut root = lock(&self.root)?;
        operation(&mut root)
    }
}
#[async_trait]
impl DirectorySession for MemorySession {
    async fn lookup(&mut self, dn: &str) -> Result<Entry> {
        self.with_root(|root| {
            let rdns = parse_dn(dn)?;
            let (found_dn, object) = root.find_with_dn(&rdns)
                .ok_or_else(|| no_such_object(dn))?;
            Ok(Entry::new(found_dn, object.attributes.clone()))
        })
    }

    async fn create_subcontext(&mut self, dn: &str, attributes: Vec<Attribute>) -> Result<()> {
        self.with_root(|root| insert_entry(root, dn, attributes, false))
    }

    async fn destroy_subcontext(&mut self, dn: &str) -> Result<()> {
        self.with_root(|root| {
            let rdns = parse_dn(dn)?;
            let Some((own, parent_rdns)) = rdns.split_first() else {
                return Err(Error::naming(RC_UNWILLING_TO_PERFORM, "the root entry cannot be deleted"));
            };
            let parent = root.find_mut(parent_rdns)
                .ok_or_else(|| no_such_object(dn))?;
            let key = own.folded();
            match parent.children.get(&key) {
                None => return Err(no_such_object(dn)),
                Some(object) if object.glue => return Err(no_such_object(dn)),
                Some(object) if object.children.len() > 0 => {
                    return Err(Error::naming(RC_NOT_ALLOWED_ON_NON_LEAF, format!("{:?} has subordinates", dn)));
                },
                Some(_) => {},
            }
            parent.children.remove(&key);
            Ok(())
        })
    }

    async fn search(
        &mut self,
        base: &str,
        filter: &str,
        filter_args: &[Scalar],
        controls: &SearchControls,
    ) -> Result<Box<dyn EntryStream>> {
        let expanded = filter_template::expand(filter, filter_args)?;
        let parsed = filter::parse(&expanded)
            .ok_or_else(|| Error::protocol(format!("invalid search filter: {:?}", expanded)))?;

        let (entries, trailer) = self.with_root(|root| {
            let rdns = parse_dn(base)?;
            let (base_dn, base_object) = root.find_with_dn(&rdns)
                .ok_or_else(|| no_such_object(base))?;

            let mut candidates = Vec::new();
            match controls.scope {
                SearchScope::Base => candidates.push((base_dn, base_object)),
                SearchScope::One => {
                    for child in base_object.children.values().filter(|c| !c.glue) {
                        candidates.push((child_dn(&base_dn, &child.rdn), child));
                    }
                },
                SearchScope::Sub => {
                    // the root entry only answers base searches
                    if rdns.len() > 0 {
                        candidates.push((base_dn.clone(), base_object));
                    }
                    base_object.descendants(&base_dn, &mut candidates);
                },
            }

            let limit = usize::try_from(controls.count_limit).unwrap_or(usize::MAX);
            let mut entries = VecDeque::new();
            let mut trailer = None;
            for (dn, object) in candidates {
                if !parsed.matches(&object.attributes) {
                    continue;
                }
                if limit > 0 && entries.len() == limit {
                    trailer = Some(Error::naming(RC_SIZE_LIMIT_EXCEEDED, "size limit exceeded"));
                    break;
                }
                let attributes = project(&object.attributes, controls.returned_attrs.as_deref());
                entries.push_back(Entry::new(dn, attributes));
            }
            Ok((entries, trailer))
        })?;

        debug!(base, filter = %expanded, scope = %controls.scope, matched = entries.len(), "in-memory search");
        Ok(Box::new(MemoryEntryStream { entries, trailer }))
    }

    async fn modify_attributes(&mut self, dn: &str, items: Vec<ModificationItem>) -> Result<()> {
        self.with_root(|root| {
            let rdns = parse_dn(dn)?;
            if rdns.len() == 0 {
                return Err(Error::naming(RC_UNWILLING_TO_PERFORM, "the root entry cannot be modified"));
            }
            let object = root.find_entry_mut(&rdns)
                .ok_or_else(|| no_such_object(dn))?;

            // all or nothing
            let mut attributes = object.attributes.clone();
            for item in items {
                apply_modification(&mut attributes, item)?;
            }
            object.attributes = attributes;
            Ok(())
        })
    }

    async fn rename(&mut self, source_dn: &str, target_dn: &str, delete_old_rdn: bool) -> Result<()> {
        self.with_root(|root| {
            let source = parse_dn(source_dn)?;
            let target = parse_dn(target_dn)?;
            let (Some((old_rdn, source_parent)), Some((new_rdn, target_parent))) = (source.split_first(), target.split_first()) else {
                return Err(Error::naming(RC_UNWILLING_TO_PERFORM, "the root entry cannot be renamed"));
            };

            if root.find_entry(&source).is_none() {
                return Err(no_such_object(source_dn));
            }
            let same_entry = dn::same_dn(&source, &target);
            if !same_entry && dn::is_within(&target, &source) {
                return Err(Error::naming(RC_UNWILLING_TO_PERFORM, format!("cannot move {:?} below itself", source_dn)));
            }
            if root.find_entry(target_parent).is_none() {
                return Err(Error::naming(RC_NO_SUCH_OBJECT, format!("new superior of {:?} does not exist", target_dn)));
            }
            if !same_entry && root.find(&target).is_some() {
                return Err(Error::naming(RC_ENTRY_ALREADY_EXISTS, format!("entry already exists: {:?}", target_dn)));
            }
            let (rdn_text, _) = dn::split_first_rdn(target_dn)
                .ok_or_else(|| Error::naming(RC_INVALID_DN_SYNTAX, format!("invalid DN syntax: {:?}", target_dn)))?;

            let mut object = root.find_mut(source_parent)
                .and_then(|parent| parent.children.remove(&old_rdn.folded()))
                .ok_or_else(|| no_such_object(source_dn))?;
            object.rdn = rdn_text.to_owned();
            if delete_old_rdn && !old_rdn.matches(new_rdn) {
                if let Some(attribute) = object.attribute_mut(&old_rdn.key) {
                    attribute.values.retain(|v| !same_value(v, &old_rdn.value));
                }
                object.attributes.retain(|a| a.values.len() > 0);
            }
            ensure_rdn_value(&mut object.attributes, new_rdn);

            // checked above; the detached entry is not an ancestor of the new parent
            let new_parent = root.find_mut(target_parent)
                .ok_or_else(|| Error::protocol(format!("new superior of {:?} vanished", target_dn)))?;
            new_parent.children.insert(new_rdn.folded(), object);
            Ok(())
        })
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}


struct MemoryEntryStream {
    entries: VecDeque<Entry>,
    trailer: Option<Error>,
}
#[async_trait]
impl EntryStream for MemoryEntryStream {
    async fn next_entry(&mut self) -> Result<Option<Entry>> {
        if let Some(entry) = self.entries.pop_front() {
            return Ok(Some(entry));
        }
        match self.trailer.take() {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    const PEOPLE: &str = "\
dn: uid=jdoe,ou=people,dc=example,dc=com
objectClass: inetOrgPerson
uid: jdoe
mail: a@x.com
mail: b@x.com
userPassword: secret

dn: dc=example,dc=com
objectClass: domain
dc: example

dn: ou=people,dc=example,dc=com
objectClass: organizationalUnit
ou: people
";

    fn directory() -> MemoryDirectory {
        MemoryDirectory::from_ldif(PEOPLE).unwrap()
    }

    async fn session(directory: &MemoryDirectory) -> MemorySession {
        directory.open_session(&ServerConfig::default()).await.unwrap()
    }

    async fn collect(stream: &mut Box<dyn EntryStream>) -> Result<Vec<Entry>> {
        let mut entries = Vec::new();
        while let Some(entry) = stream.next_entry().await? {
            entries.push(entry);
        }
        Ok(entries)
    }

    fn controls(scope: SearchScope) -> SearchControls {
        SearchControls {
            scope,
            returned_attrs: None,
            time_limit_ms: 5000,
            count_limit: 0,
        }
    }

    #[test]
    fn test_from_ldif_accepts_any_order() {
        let directory = directory();
        let dns: Vec<String> = directory.snapshot().unwrap().into_iter().map(|e| e.dn).collect();
        assert_eq!(dns, vec![
            "dc=example,dc=com",
            "ou=people,dc=example,dc=com",
            "uid=jdoe,ou=people,dc=example,dc=com",
        ]);
    }

    #[test]
    fn test_from_ldif_rejects_duplicates() {
        let err = MemoryDirectory::from_ldif("dn: cn=x,dc=com\ncn: x\n\ndn: CN=X,dc=com\ncn: x\n").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_lookup_is_case_insensitive() {
        let directory = directory();
        let mut session = session(&directory).await;
        let entry = session.lookup("UID=JDoe,ou=People,dc=example,dc=com").await.unwrap();
        assert_eq!(entry.dn, "uid=jdoe,ou=people,dc=example,dc=com");

        let err = session.lookup("uid=nobody,ou=people,dc=example,dc=com").await.unwrap_err();
        assert_eq!(err.result_code(), Some(RC_NO_SUCH_OBJECT));
        let err = session.lookup("dc=com").await.unwrap_err();
        assert_eq!(err.result_code(), Some(RC_NO_SUCH_OBJECT));
        let err = session.lookup("garbage").await.unwrap_err();
        assert_eq!(err.result_code(), Some(RC_INVALID_DN_SYNTAX));
    }

    #[tokio::test]
    async fn test_create_and_destroy() {
        let directory = directory();
        let mut session = session(&directory).await;

        let err = session.create_subcontext("cn=x,ou=missing,dc=example,dc=com", vec![]).await.unwrap_err();
        assert_eq!(err.result_code(), Some(RC_NO_SUCH_OBJECT));
        let err = session.create_subcontext("ou=people,dc=example,dc=com", vec![]).await.unwrap_err();
        assert_eq!(err.result_code(), Some(RC_ENTRY_ALREADY_EXISTS));

        session.create_subcontext("cn=admins,dc=example,dc=com", vec![
            Attribute::new("objectClass", vec![Scalar::from("groupOfNames")]),
        ]).await.unwrap();
        let entry = session.lookup("cn=admins,dc=example,dc=com").await.unwrap();
        assert_eq!(entry.attribute("cn").unwrap().values, vec![Scalar::from("admins")]);

        let err = session.destroy_subcontext("ou=people,dc=example,dc=com").await.unwrap_err();
        assert_eq!(err.result_code(), Some(RC_NOT_ALLOWED_ON_NON_LEAF));
        session.destroy_subcontext("cn=admins,dc=example,dc=com").await.unwrap();
        let err = session.destroy_subcontext("cn=admins,dc=example,dc=com").await.unwrap_err();
        assert_eq!(err.result_code(), Some(RC_NO_SUCH_OBJECT));
    }

    #[tokio::test]
    async fn test_modify_is_atomic() {
        let directory = directory();
        let mut session = session(&directory).await;
        let dn = "uid=jdoe,ou=people,dc=example,dc=com";

        let items = vec![
            ModificationItem {
                kind: ModificationKind::Replace,
                attribute: Attribute::new("mail", vec![Scalar::from("c@x.com")]),
            },
            ModificationItem {
                kind: ModificationKind::Delete,
                attribute: Attribute::new("telephoneNumber", vec![]),
            },
        ];
        let err = session.modify_attributes(dn, items).await.unwrap_err();
        assert_eq!(err.result_code(), Some(RC_NO_SUCH_ATTRIBUTE));
        let entry = session.lookup(dn).await.unwrap();
        assert_eq!(entry.attribute("mail").unwrap().values.len(), 2);

        let items = vec![
            ModificationItem {
                kind: ModificationKind::Add,
                attribute: Attribute::new("mail", vec![Scalar::from("c@x.com")]),
            },
            ModificationItem {
                kind: ModificationKind::Delete,
                attribute: Attribute::new("mail", vec![Scalar::from("A@X.COM")]),
            },
        ];
        session.modify_attributes(dn, items).await.unwrap();
        let entry = session.lookup(dn).await.unwrap();
        assert_eq!(entry.attribute("mail").unwrap().values, vec![Scalar::from("b@x.com"), Scalar::from("c@x.com")]);

        let err = session.modify_attributes(dn, vec![ModificationItem {
            kind: ModificationKind::Add,
            attribute: Attribute::new("mail", vec![Scalar::from("b@x.com")]),
        }]).await.unwrap_err();
        assert_eq!(err.result_code(), Some(RC_ATTRIBUTE_OR_VALUE_EXISTS));
    }

    #[tokio::test]
    async fn test_rename_moves_subtree() {
        let directory = directory();
        let mut session = session(&directory).await;
        session.create_subcontext("ou=staff,dc=example,dc=com", vec![]).await.unwrap();

        session.rename("uid=jdoe,ou=people,dc=example,dc=com", "uid=john,ou=staff,dc=example,dc=com", true).await.unwrap();
        let entry = session.lookup("uid=john,ou=staff,dc=example,dc=com").await.unwrap();
        assert_eq!(entry.attribute("uid").unwrap().values, vec![Scalar::from("john")]);
        let err = session.lookup("uid=jdoe,ou=people,dc=example,dc=com").await.unwrap_err();
        assert_eq!(err.result_code(), Some(RC_NO_SUCH_OBJECT));

        session.rename("ou=staff,dc=example,dc=com", "ou=crew,dc=example,dc=com", false).await.unwrap();
        let entry = session.lookup("uid=john,ou=crew,dc=example,dc=com").await.unwrap();
        assert_eq!(entry.dn, "uid=john,ou=crew,dc=example,dc=com");
        let crew = session.lookup("ou=crew,dc=example,dc=com").await.unwrap();
        assert_eq!(crew.attribute("ou").unwrap().values, vec![Scalar::from("staff"), Scalar::from("crew")]);

        let err = session.rename("ou=crew,dc=example,dc=com", "ou=people,dc=example,dc=com", true).await.unwrap_err();
        assert_eq!(err.result_code(), Some(RC_ENTRY_ALREADY_EXISTS));
        let err = session.rename("ou=crew,dc=example,dc=com", "ou=x,ou=crew,dc=example,dc=com", true).await.unwrap_err();
        assert_eq!(err.result_code(), Some(RC_UNWILLING_TO_PERFORM));
    }

    #[tokio::test]
    async fn test_search_scopes_and_projection() {
        let directory = directory();
        let mut session = session(&directory).await;
        let base = "dc=example,dc=com";

        let mut stream = session.search(base, "(objectClass=*)", &[], &controls(SearchScope::Sub)).await.unwrap();
        assert_eq!(collect(&mut stream).await.unwrap().len(), 3);

        let mut stream = session.search(base, "(objectClass=*)", &[], &controls(SearchScope::One)).await.unwrap();
        let found = collect(&mut stream).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].dn, "ou=people,dc=example,dc=com");

        let mut projected = controls(SearchScope::Sub);
        projected.returned_attrs = Some(vec!["MAIL".to_owned()]);
        let mut stream = session.search(base, "(uid={0})", &[Scalar::from("jdoe")], &projected).await.unwrap();
        let found = collect(&mut stream).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].attributes, vec![
            Attribute::new("mail", vec![Scalar::from("a@x.com"), Scalar::from("b@x.com")]),
        ]);

        let mut stream = session.search("", "(objectClass=*)", &[], &SearchControls::object_only()).await.unwrap();
        let found = collect(&mut stream).await.unwrap();
        assert_eq!(found, vec![Entry::new("", vec![])]);

        let err = session.search("dc=missing", "(objectClass=*)", &[], &controls(SearchScope::Base)).await.err().unwrap();
        assert_eq!(err.result_code(), Some(RC_NO_SUCH_OBJECT));
        let err = session.search(base, "(objectClass=*", &[], &controls(SearchScope::Base)).await.err().unwrap();
        assert_eq!(err.result_code(), None);
    }

    #[tokio::test]
    async fn test_one_level_search_skips_glue() {
        let directory = MemoryDirectory::from_ldif("dn: dc=example,dc=com\nobjectClass: domain\ndc: example\n").unwrap();
        let mut session = session(&directory).await;

        let mut stream = session.search("", "(!(objectClass=domain))", &[], &controls(SearchScope::One)).await.unwrap();
        assert_eq!(collect(&mut stream).await.unwrap(), vec![]);
        let mut stream = session.search("", "(objectClass=*)", &[], &controls(SearchScope::One)).await.unwrap();
        assert_eq!(collect(&mut stream).await.unwrap(), vec![]);
        let err = session.search("dc=com", "(objectClass=*)", &[], &controls(SearchScope::Base)).await.err().unwrap();
        assert_eq!(err.result_code(), Some(RC_NO_SUCH_OBJECT));
    }

    #[tokio::test]
    async fn test_entries_without_object_class_are_found() {
        let directory = MemoryDirectory::from_ldif("dn: dc=example,dc=com\nobjectClass: domain\n\ndn: uid=bare,dc=example,dc=com\nuid: bare\n").unwrap();
        let mut session = session(&directory).await;

        let mut stream = session.search("uid=bare,dc=example,dc=com", "(objectClass=*)", &[], &SearchControls::object_only()).await.unwrap();
        assert_eq!(collect(&mut stream).await.unwrap(), vec![Entry::new("uid=bare,dc=example,dc=com", vec![])]);
    }

    #[tokio::test]
    async fn test_count_limit_trails_with_error() {
        let directory = directory();
        let mut session = session(&directory).await;
        let mut limited = controls(SearchScope::Sub);
        limited.count_limit = 2;

        let mut stream = session.search("dc=example,dc=com", "(objectClass=*)", &[], &limited).await.unwrap();
        assert!(stream.next_entry().await.unwrap().is_some());
        assert!(stream.next_entry().await.unwrap().is_some());
        let err = stream.next_entry().await.unwrap_err();
        assert_eq!(err.result_code(), Some(RC_SIZE_LIMIT_EXCEEDED));
    }

    #[tokio::test]
    async fn test_bind_checks_password() {
        let directory = directory();
        let good = ServerConfig::with_credentials("mem:", Credentials::new("uid=jdoe,ou=people,dc=example,dc=com", "secret"));
        directory.open_session(&good).await.unwrap();

        let bad = ServerConfig::with_credentials("mem:", Credentials::new("uid=jdoe,ou=people,dc=example,dc=com", "nope"));
        let err = directory.open_session(&bad).await.unwrap_err();
        assert!(matches!(err, Error::AuthFailure { .. }));
    }

    #[tokio::test]
    async fn test_closed_session_refuses_work() {
        let directory = directory();
        let mut session = session(&directory).await;
        session.close().await.unwrap();
        session.close().await.unwrap();
        assert!(session.lookup("dc=example,dc=com").await.is_err());
    }
}
