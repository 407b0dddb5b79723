use std::collections::HashSet;

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, Mod, ResultEntry, SearchOptions, SearchStream};
use ldap3::asn1::{StructureTag, PL};
use tracing::{debug, warn};

use crate::attribute::{Attribute, Scalar};
use crate::config::ServerConfig;
use crate::directory::{Connector, DirectorySession, Entry, EntryStream, ModificationItem};
use crate::dn;
use crate::error::{Error, Result, RC_INVALID_CREDENTIALS, RC_NO_SUCH_OBJECT};
use crate::filter;
use crate::modification::ModificationKind;
use crate::search::{SearchControls, DEFAULT_FILTER};


/// Protocol tag of a SearchResultEntry; references and intermediates are skipped.
const SEARCH_RESULT_ENTRY_TAG: u64 = 4;

/// Requests no attributes at all (RFC 4511 section 4.5.1.8).
const NO_ATTRIBUTES: &str = "1.1";

const ALL_USER_ATTRIBUTES: &str = "*";


/// Opens sessions over the LDAP protocol.
#[derive(Clone, Copy, Debug, Default)]
pub struct LdapConnector;
#[async_trait]
impl Connector for LdapConnector {
    type Session = LdapSession;

    async fn open_session(&self, config: &ServerConfig) -> Result<LdapSession> {
        debug!(url = %config.url, "connecting to LDAP server");
        let (conn, mut ldap) = LdapConnAsync::new(&config.url)
            .await
            .map_err(|e| Error::ConnectFailure { url: config.url.clone(), message: e.to_string() })?;
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection driver error");
            }
        });

        if let Some(credentials) = &config.credentials {
            debug!(bind_dn = %credentials.bind_dn, "binding");
            let auth_failure = |message: String| Error::AuthFailure {
                bind_dn: credentials.bind_dn.clone(),
                message,
            };
            let bind_result = match ldap.simple_bind(&credentials.bind_dn, &credentials.password).await {
                Ok(r) => r,
                Err(e) => {
                    let _ = ldap.unbind().await;
                    return Err(auth_failure(e.to_string()));
                },
            };
            if bind_result.rc != 0 {
                let _ = ldap.unbind().await;
                let message = if bind_result.rc == RC_INVALID_CREDENTIALS {
                    format!("invalid credentials: {}", bind_result.text)
                } else {
                    format!("bind returned result code {}: {}", bind_result.rc, bind_result.text)
                };
                return Err(auth_failure(message));
            }
        }

        Ok(LdapSession::new(ldap))
    }
}


#[derive(Debug)]
pub struct LdapSession {
    ldap: Ldap,
    closed: bool,
}
impl LdapSession {
    pub fn new(ldap: Ldap) -> Self { Self { ldap, closed: false } }
}
#[async_trait]
impl DirectorySession for LdapSession {
    async fn lookup(&mut self, dn: &str) -> Result<Entry> {
        let (raw_entries, _) = self.ldap
            .search(dn, ldap3::Scope::Base, DEFAULT_FILTER, vec![ALL_USER_ATTRIBUTES])
            .await?
            .success()?;
        for raw_entry in raw_entries {
            if let Some(entry) = entry_from_raw(raw_entry)? {
                return Ok(entry);
            }
        }
        Err(Error::naming(RC_NO_SUCH_OBJECT, format!("{} not found", dn)))
    }

    async fn create_subcontext(&mut self, dn: &str, attributes: Vec<Attribute>) -> Result<()> {
        let ldap_attributes: Vec<(Vec<u8>, HashSet<Vec<u8>>)> = attributes
            .into_iter()
            .map(|a| {
                let values = value_set(&a.name, a.values);
                (a.name.into_bytes(), values)
            })
            .collect();
        self.ldap.add(dn, ldap_attributes)
            .await?
            .success()?;
        Ok(())
    }

    async fn destroy_subcontext(&mut self, dn: &str) -> Result<()> {
        self.ldap.delete(dn)
            .await?
            .success()?;
        Ok(())
    }

    async fn search(
        &mut self,
        base: &str,
        filter: &str,
        filter_args: &[Scalar],
        controls: &SearchControls,
    ) -> Result<Box<dyn EntryStream>> {
        let expanded = filter::expand(filter, filter_args)?;
        let attrs: Vec<String> = match &controls.returned_attrs {
            None => vec![ALL_USER_ATTRIBUTES.to_owned()],
            Some(names) if names.is_empty() => vec![NO_ATTRIBUTES.to_owned()],
            Some(names) => names.clone(),
        };
        let options = SearchOptions::new()
            .sizelimit(clamp_i32(controls.count_limit))
            .timelimit(clamp_i32(controls.time_limit_secs()));
        debug!(base, filter = %expanded, scope = %controls.scope, "starting search");

        let scope: ldap3::Scope = controls.scope.into();
        let stream = self.ldap
            .with_search_options(options)
            .streaming_search(base, scope, &expanded, attrs)
            .await?;
        Ok(Box::new(LdapEntryStream { stream, finished: false }))
    }

    async fn modify_attributes(&mut self, dn: &str, items: Vec<ModificationItem>) -> Result<()> {
        let mods: Vec<Mod<Vec<u8>>> = items
            .into_iter()
            .map(|item| {
                let values = value_set(&item.attribute.name, item.attribute.values);
                let name = item.attribute.name.into_bytes();
                match item.kind {
                    ModificationKind::Add => Mod::Add(name, values),
                    ModificationKind::Delete => Mod::Delete(name, values),
                    ModificationKind::Replace => Mod::Replace(name, values),
                }
            })
            .collect();
        self.ldap.modify(dn, mods)
            .await?
            .success()?;
        Ok(())
    }

    async fn rename(&mut self, source_dn: &str, target_dn: &str, delete_old_rdn: bool) -> Result<()> {
        let (rdn, superior) = dn::split_first_rdn(target_dn)
            .ok_or_else(|| Error::invalid(format!("cannot rename to empty DN (from {:?})", source_dn)))?;
        self.ldap.modifydn(source_dn, rdn, delete_old_rdn, Some(superior))
            .await?
            .success()?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.ldap.unbind().await?;
        Ok(())
    }
}


struct LdapEntryStream {
    stream: SearchStream<'static, String, Vec<String>>,
    finished: bool,
}
#[async_trait]
impl EntryStream for LdapEntryStream {
    async fn next_entry(&mut self) -> Result<Option<Entry>> {
        while !self.finished {
            match self.stream.next().await? {
                Some(raw_entry) => {
                    if let Some(entry) = entry_from_raw(raw_entry)? {
                        return Ok(Some(entry));
                    }
                },
                None => {
                    // surface the final result code (size limit, no such object, ...)
                    self.finished = true;
                    self.stream.finish().await.success()?;
                },
            }
        }
        Ok(None)
    }
}


/// `ldap3` sends attribute values as sets: their order on the wire is
/// unspecified and duplicates collapse into one.
fn value_set(name: &str, values: Vec<Scalar>) -> HashSet<Vec<u8>> {
    let given = values.len();
    let set: HashSet<Vec<u8>> = values.into_iter()
        .map(Scalar::into_bytes)
        .collect();
    if set.len() < given {
        warn!(attribute = name, merged = given - set.len(), "duplicate attribute values merged");
    }
    set
}

fn clamp_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

/// Decodes a SearchResultEntry by hand; `SearchEntry::construct` would lose the
/// order in which the server sent the attributes.
fn entry_from_raw(raw_entry: ResultEntry) -> Result<Option<Entry>> {
    let tag = raw_entry.0;
    if tag.id != SEARCH_RESULT_ENTRY_TAG {
        return Ok(None);
    }

    let mut parts = constructed(tag)?.into_iter();
    let dn = text(next_part(&mut parts)?)?;
    let mut attributes = Vec::new();
    for partial_attribute in constructed(next_part(&mut parts)?)? {
        let mut pieces = constructed(partial_attribute)?.into_iter();
        let name = text(next_part(&mut pieces)?)?;
        let values = constructed(next_part(&mut pieces)?)?
            .into_iter()
            .map(|value| primitive(value).map(Scalar::from_bytes))
            .collect::<Result<Vec<Scalar>>>()?;
        attributes.push(Attribute::new(name, values));
    }
    Ok(Some(Entry::new(dn, attributes)))
}

fn next_part(parts: &mut impl Iterator<Item = StructureTag>) -> Result<StructureTag> {
    parts.next()
        .ok_or_else(|| Error::protocol("truncated search result entry"))
}

fn constructed(tag: StructureTag) -> Result<Vec<StructureTag>> {
    match tag.payload {
        PL::C(children) => Ok(children),
        PL::P(_) => Err(Error::protocol("expected a constructed element in search result entry")),
    }
}

fn primitive(tag: StructureTag) -> Result<Vec<u8>> {
    match tag.payload {
        PL::P(bytes) => Ok(bytes),
        PL::C(_) => Err(Error::protocol("expected a primitive element in search result entry")),
    }
}

fn text(tag: StructureTag) -> Result<String> {
    String::from_utf8(primitive(tag)?)
        .map_err(|_| Error::protocol("search result entry contains a non-UTF-8 name"))
}
