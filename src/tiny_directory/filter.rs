//! RFC 4515 search filters, parsed and evaluated against in-memory entries.

use std::cmp::Ordering;

use crate::attribute::{Attribute, Scalar};


const OBJECT_CLASS: &str = "objectClass";


#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Present(String),
    Equal(String, Vec<u8>),
    Approx(String, Vec<u8>),
    GreaterOrEqual(String, Vec<u8>),
    LessOrEqual(String, Vec<u8>),
    Substrings {
        attr: String,
        initial: Option<Vec<u8>>,
        any: Vec<Vec<u8>>,
        last: Option<Vec<u8>>,
    },
}
impl Filter {
    pub fn matches(&self, attributes: &[Attribute]) -> bool {
        match self {
            Self::And(filters) => filters.iter().all(|f| f.matches(attributes)),
            Self::Or(filters) => filters.iter().any(|f| f.matches(attributes)),
            Self::Not(filter) => !filter.matches(attributes),
            // every entry has an object class, even one loaded without it
            Self::Present(attr) if attr.eq_ignore_ascii_case(OBJECT_CLASS) => true,
            Self::Present(attr) => values_of(attributes, attr).next().is_some(),
            Self::Equal(attr, wanted) | Self::Approx(attr, wanted) => values_of(attributes, attr)
                .any(|v| v.as_bytes().eq_ignore_ascii_case(wanted)),
            Self::GreaterOrEqual(attr, bound) => values_of(attributes, attr)
                .any(|v| compare_values(v.as_bytes(), bound) != Ordering::Less),
            Self::LessOrEqual(attr, bound) => values_of(attributes, attr)
                .any(|v| compare_values(v.as_bytes(), bound) != Ordering::Greater),
            Self::Substrings { attr, initial, any, last } => values_of(attributes, attr)
                .any(|v| substrings_match(v.as_bytes(), initial.as_deref(), any, last.as_deref())),
        }
    }
}

fn values_of<'a>(attributes: &'a [Attribute], name: &'a str) -> impl Iterator<Item = &'a Scalar> + 'a {
    attributes.iter()
        .filter(move |a| a.name.eq_ignore_ascii_case(name))
        .flat_map(|a| a.values.iter())
}

fn compare_values(value: &[u8], bound: &[u8]) -> Ordering {
    let as_number = |bytes: &[u8]| std::str::from_utf8(bytes).ok()
        .and_then(|s| s.trim().parse::<i64>().ok());
    match (as_number(value), as_number(bound)) {
        (Some(v), Some(b)) => v.cmp(&b),
        _ => value.to_ascii_lowercase().cmp(&bound.to_ascii_lowercase()),
    }
}

fn substrings_match(value: &[u8], initial: Option<&[u8]>, any: &[Vec<u8>], last: Option<&[u8]>) -> bool {
    let value = value.to_ascii_lowercase();
    let mut rest: &[u8] = &value;

    if let Some(initial) = initial {
        let initial = initial.to_ascii_lowercase();
        if !rest.starts_with(&initial) {
            return false;
        }
        rest = &rest[initial.len()..];
    }

    // the final piece must not overlap anything matched before it
    if let Some(last) = last {
        let last = last.to_ascii_lowercase();
        if !rest.ends_with(&last) {
            return false;
        }
        rest = &rest[..rest.len()-last.len()];
    }

    for piece in any {
        let piece = piece.to_ascii_lowercase();
        match find_bytes(rest, &piece) {
            Some(index) => rest = &rest[index+piece.len()..],
            None => return false,
        }
    }
    true
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len())
        .position(|w| w == needle)
}


/// Parses a filter; a bare `attr=value` without parentheses is accepted too.
pub fn parse(filter: &str) -> Option<Filter> {
    let trimmed = filter.trim();
    let mut parser = Parser { input: trimmed.as_bytes(), pos: 0 };
    let parsed = if trimmed.starts_with('(') {
        parser.filter()?
    } else {
        parser.pos = trimmed.len();
        parse_item(trimmed.as_bytes())?
    };
    if parser.pos != trimmed.len() {
        return None;
    }
    Some(parsed)
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}
impl<'a> Parser<'a> {
    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn consume(&mut self, byte: u8) -> Option<()> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Some(())
        } else {
            None
        }
    }

    fn filter(&mut self) -> Option<Filter> {
        self.consume(b'(')?;
        let parsed = match self.peek()? {
            b'&' => {
                self.pos += 1;
                Filter::And(self.filter_list()?)
            },
            b'|' => {
                self.pos += 1;
                Filter::Or(self.filter_list()?)
            },
            b'!' => {
                self.pos += 1;
                Filter::Not(Box::new(self.filter()?))
            },
            _ => {
                let start = self.pos;
                let length = self.input[start..].iter().position(|b| *b == b')')?;
                self.pos += length;
                parse_item(&self.input[start..start+length])?
            },
        };
        self.consume(b')')?;
        Some(parsed)
    }

    fn filter_list(&mut self) -> Option<Vec<Filter>> {
        let mut filters = Vec::new();
        while self.peek() == Some(b'(') {
            filters.push(self.filter()?);
        }
        Some(filters)
    }
}

fn parse_item(item: &[u8]) -> Option<Filter> {
    let equals = item.iter().position(|b| *b == b'=')?;
    let (attr_end, kind) = match equals.checked_sub(1).map(|i| item[i]) {
        Some(b'>') => (equals - 1, b'>'),
        Some(b'<') => (equals - 1, b'<'),
        Some(b'~') => (equals - 1, b'~'),
        _ => (equals, b'='),
    };
    let attr = std::str::from_utf8(&item[..attr_end]).ok()?.trim();
    if attr.is_empty() || attr.contains(':') {
        // extensible matching is not supported
        return None;
    }
    let attr = attr.to_owned();
    let raw_value = &item[equals+1..];

    match kind {
        b'>' => Some(Filter::GreaterOrEqual(attr, unescape(raw_value)?)),
        b'<' => Some(Filter::LessOrEqual(attr, unescape(raw_value)?)),
        b'~' => Some(Filter::Approx(attr, unescape(raw_value)?)),
        _ => {
            if raw_value == b"*" {
                return Some(Filter::Present(attr));
            }
            if !raw_value.contains(&b'*') {
                return Some(Filter::Equal(attr, unescape(raw_value)?));
            }

            // escaped asterisks are \2a, so every literal one separates pieces
            let pieces: Vec<&[u8]> = raw_value.split(|b| *b == b'*').collect();
            let non_empty = |piece: &[u8]| -> Option<Option<Vec<u8>>> {
                if piece.is_empty() { Some(None) } else { unescape(piece).map(Some) }
            };
            let initial = non_empty(pieces[0])?;
            let last = non_empty(pieces[pieces.len()-1])?;
            let mut any = Vec::new();
            for piece in &pieces[1..pieces.len()-1] {
                if let Some(bytes) = non_empty(*piece)? {
                    any.push(bytes);
                }
            }
            Some(Filter::Substrings { attr, initial, any, last })
        },
    }
}

fn unescape(raw: &[u8]) -> Option<Vec<u8>> {
    let mut bytes = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'\\' {
            let hex = raw.get(i+1..i+3)?;
            let hex = std::str::from_utf8(hex).ok()?;
            bytes.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            bytes.push(raw[i]);
            i += 1;
        }
    }
    Some(bytes)
}


#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> Vec<Attribute> {
        vec![
            Attribute::new("objectClass", vec![Scalar::from("top"), Scalar::from("inetOrgPerson")]),
            Attribute::new("uid", vec![Scalar::from("jdoe")]),
            Attribute::new("cn", vec![Scalar::from("John (Jack) Doe")]),
            Attribute::new("uidNumber", vec![Scalar::from("1000")]),
        ]
    }

    fn check(filter: &str) -> bool {
        parse(filter).unwrap_or_else(|| panic!("failed to parse {:?}", filter)).matches(&person())
    }

    #[test]
    fn test_simple_items() {
        assert!(check("(objectClass=*)"));
        assert!(check("(UID=JDOE)"));
        assert!(check("uid=jdoe"));
        assert!(!check("(uid=jane)"));
        assert!(!check("(mail=*)"));
        assert!(check("(cn=John \\28Jack\\29 Doe)"));
    }

    #[test]
    fn test_object_class_presence_matches_any_entry() {
        let bare = vec![Attribute::new("uid", vec![Scalar::from("jdoe")])];
        assert!(parse("(objectClass=*)").unwrap().matches(&bare));
        assert!(parse("(OBJECTCLASS=*)").unwrap().matches(&[]));
        assert!(!parse("(objectClass=person)").unwrap().matches(&bare));
        assert!(!parse("(mail=*)").unwrap().matches(&bare));
    }

    #[test]
    fn test_composites() {
        assert!(check("(&(objectClass=inetOrgPerson)(uid=jdoe))"));
        assert!(!check("(&(objectClass=inetOrgPerson)(uid=jane))"));
        assert!(check("(|(uid=jane)(uid=jdoe))"));
        assert!(check("(!(uid=jane))"));
        assert!(check("(&)"));
        assert!(!check("(|)"));
    }

    #[test]
    fn test_substrings_and_ordering() {
        assert!(check("(cn=john*)"));
        assert!(check("(cn=*doe)"));
        assert!(check("(cn=j*jack*d*e)"));
        assert!(!check("(cn=*jane*)"));
        assert!(!check("(uid=jd*oe*e)"));
        assert!(check("(uidNumber>=999)"));
        assert!(!check("(uidNumber<=999)"));
        assert!(check("(uid~=JDoe)"));
    }

    #[test]
    fn test_malformed() {
        assert_eq!(parse("(uid=jdoe"), None);
        assert_eq!(parse("(uid=jdoe))"), None);
        assert_eq!(parse("(=x)"), None);
        assert_eq!(parse("(uid=\\zz)"), None);
        assert_eq!(parse("(cn:dn:=x)"), None);
    }
}
