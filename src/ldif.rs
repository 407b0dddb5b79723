use std::borrow::Cow;
use std::fmt;

use base64::Engine;
use tracing::warn;

use crate::attribute::{AttrValue, AttributeSet, Scalar};
use crate::directory::Entry;
use crate::record::Record;


/// One content record of an LDIF file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LdifRecord {
    pub dn: String,
    pub attributes: AttributeSet,
}


fn normalize_newlines<'a>(ldif: &'a str) -> Cow<'a, str> {
    if ldif.contains("\r\n") {
        Cow::Owned(ldif.replace("\r\n", "\n"))
    } else {
        Cow::Borrowed(ldif)
    }
}

fn join_continuations<'a>(ldif: &'a str) -> Cow<'a, str> {
    if ldif.contains("\n ") {
        Cow::Owned(ldif.replace("\n ", ""))
    } else {
        Cow::Borrowed(ldif)
    }
}

fn strip_comments<'a>(ldif: &'a str) -> Cow<'a, str> {
    if ldif.starts_with('#') || ldif.contains("\n#") {
        let mut uncommented = String::with_capacity(ldif.len());
        let mut first_line = true;
        for ln in ldif.split('\n') {
            if ln.starts_with('#') {
                continue;
            }

            if first_line {
                first_line = false;
            } else {
                uncommented.push('\n');
            }
            uncommented.push_str(ln);
        }
        Cow::Owned(uncommented)
    } else {
        Cow::Borrowed(ldif)
    }
}

fn compress_newlines<'a>(ldif: &'a str) -> Cow<'a, str> {
    if ldif.contains("\n\n\n") {
        let mut compressed = ldif.replace("\n\n\n", "\n\n");
        while compressed.contains("\n\n\n") {
            compressed = compressed.replace("\n\n\n", "\n\n");
        }
        Cow::Owned(compressed)
    } else {
        Cow::Borrowed(ldif)
    }
}

fn cut_str_to_max(s: &str, mut max_bytes: usize) -> &str {
    if max_bytes >= s.len() {
        return s;
    }
    while !s.is_char_boundary(max_bytes) {
        max_bytes -= 1;
    }
    &s[0..max_bytes]
}


/// Parses LDIF content records. Malformed lines and records without a DN are
/// skipped with a warning.
pub fn parse_ldif(ldif: &str) -> Vec<LdifRecord> {
    // normalize LDIF
    // (comments go before continuations are joined, or a folded comment would leak into its neighbor)
    let normalized = normalize_newlines(ldif);
    let stripped = strip_comments(&normalized);
    let joined = join_continuations(&stripped);
    let compressed = compress_newlines(&joined);

    // each record is now separated by "\n\n"
    let mut records: Vec<LdifRecord> = Vec::new();
    for record in compressed.split("\n\n") {
        if record.trim().len() == 0 {
            continue;
        }

        let mut dn: Option<String> = None;
        let mut key_to_values: Vec<(String, Vec<Scalar>)> = Vec::new();

        // and each attribute in the record by "\n"
        for attribute in record.split('\n') {
            if attribute.len() == 0 {
                continue;
            }

            // split at the attribute name
            let Some((key, rest)) = attribute.split_once(':') else {
                warn!(line = %attribute, "skipping LDIF line missing colon");
                continue;
            };

            // how many colons?
            let value = if rest.len() == 0 || rest == ":" {
                // empty value
                Vec::with_capacity(0)
            } else if let Some(mut base64_str) = rest.strip_prefix(':') {
                // base64
                // strip off additional spaces
                base64_str = base64_str.trim_matches(' ');

                // decode
                match base64::engine::general_purpose::STANDARD.decode(base64_str) {
                    Ok(bs) => bs,
                    Err(_) => {
                        warn!(value = %cut_str_to_max(base64_str, 64), "skipping invalid base64 value");
                        continue;
                    },
                }
            } else if rest.starts_with('<') {
                warn!(key = %key, "skipping LDIF value given by URL");
                continue;
            } else {
                // plain
                // strip off additional spaces
                rest.trim_matches(' ').as_bytes().to_vec()
            };

            if key.eq_ignore_ascii_case("dn") {
                dn = Some(String::from_utf8_lossy(&value).into_owned());
                continue;
            }
            if key.eq_ignore_ascii_case("version") && dn.is_none() {
                continue;
            }
            if key.eq_ignore_ascii_case("changetype") {
                if !value.eq_ignore_ascii_case(b"add") {
                    warn!(?dn, "skipping LDIF change record other than add");
                    dn = None;
                    break;
                }
                continue;
            }

            let scalar = Scalar::from_bytes(value);
            match key_to_values.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(key)) {
                Some((_, values)) => values.push(scalar),
                None => key_to_values.push((key.to_owned(), vec![scalar])),
            }
        }

        let Some(dn) = dn else {
            if key_to_values.len() > 0 {
                warn!(record = %cut_str_to_max(record, 64), "skipping LDIF record missing required \"dn\" pseudo-attribute");
            }
            continue;
        };

        let attributes = key_to_values.into_iter()
            .map(|(key, mut values)| {
                let value = if values.len() == 1 {
                    AttrValue::Single(values.remove(0))
                } else {
                    AttrValue::Multi(values)
                };
                (key, value)
            })
            .collect();
        records.push(LdifRecord { dn, attributes });
    }

    records
}


fn is_safe_string(value: &[u8]) -> bool {
    // RFC 2849 SAFE-STRING
    match value.first() {
        None => return true,
        Some(b' ' | b':' | b'<') => return false,
        Some(_) => {},
    }
    if value.last() == Some(&b' ') {
        return false;
    }
    value.iter().all(|b| *b != 0 && *b != b'\n' && *b != b'\r' && b.is_ascii())
}

fn write_line<W: fmt::Write>(writer: &mut W, key: &str, value: &[u8]) -> fmt::Result {
    if is_safe_string(value) {
        // safe strings are ASCII
        writeln!(writer, "{}: {}", key, String::from_utf8_lossy(value))
    } else {
        writeln!(writer, "{}:: {}", key, base64::engine::general_purpose::STANDARD.encode(value))
    }
}

pub fn write_record<W: fmt::Write>(writer: &mut W, record: &Record) -> fmt::Result {
    for (key, value) in record.fields() {
        for scalar in value.values() {
            write_line(writer, key, scalar.as_bytes())?;
        }
    }
    writeln!(writer)
}

pub fn write_entry<W: fmt::Write>(writer: &mut W, entry: &Entry) -> fmt::Result {
    write_line(writer, "dn", entry.dn.as_bytes())?;
    for attribute in &entry.attributes {
        for value in &attribute.values {
            write_line(writer, &attribute.name, value.as_bytes())?;
        }
    }
    writeln!(writer)
}
