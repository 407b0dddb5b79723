//! Just enough RFC 4514 to take distinguished names apart and put them back together.

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Rdn {
    pub key: String,
    pub value: Vec<u8>,
}
impl Rdn {
    pub fn new(key: String, value: Vec<u8>) -> Self {
        Self {
            key,
            value,
        }
    }

    /// Compares attribute type and value without regard to ASCII case.
    pub fn matches(&self, other: &Rdn) -> bool {
        self.key.eq_ignore_ascii_case(&other.key)
            && self.value.eq_ignore_ascii_case(&other.value)
    }

    /// Type and value folded to ASCII lowercase, for use as a lookup key.
    pub fn folded(&self) -> Rdn {
        Rdn::new(self.key.to_ascii_lowercase(), self.value.to_ascii_lowercase())
    }
}

pub fn dn_to_rdns(dn: &str) -> Option<Vec<Rdn>> {
    // RFC4514

    if dn.trim().len() == 0 {
        return Some(Vec::with_capacity(0));
    }

    let tokens = tokenize(dn)?;

    let pieces = split_at_unescaped_commas(&tokens);
    let mut rdns = Vec::with_capacity(pieces.len());
    for piece in pieces {
        let (key_tokens, value_tokens) = split_at_first_unescaped_equals(&piece)?;
        let key_bytes = tokens_to_bytes(&key_tokens);
        let rear_bytes = tokens_to_bytes(&trim_tokens(&value_tokens));

        let key_string = String::from_utf8(key_bytes).ok()?;
        let key_string = key_string.trim();
        if key_string.len() == 0 {
            return None;
        }
        rdns.push(Rdn::new(key_string.to_owned(), rear_bytes));
    }

    Some(rdns)
}

/// Whether both strings name the same entry.
pub fn same_dn(left: &[Rdn], right: &[Rdn]) -> bool {
    left.len() == right.len()
        && left.iter().zip(right.iter()).all(|(l, r)| l.matches(r))
}

/// Whether `dn` equals `base` or lies below it.
pub fn is_within(dn: &[Rdn], base: &[Rdn]) -> bool {
    dn.len() >= base.len()
        && same_dn(&dn[dn.len()-base.len()..], base)
}

/// Splits off the leftmost RDN: `"cn=a,dc=b"` becomes `("cn=a", "dc=b")`.
pub fn split_first_rdn(dn: &str) -> Option<(&str, &str)> {
    let mut escaped = false;
    for (i, c) in dn.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            ',' => return Some((dn[..i].trim(), dn[i+1..].trim())),
            _ => {},
        }
    }
    if dn.trim().len() == 0 {
        None
    } else {
        Some((dn.trim(), ""))
    }
}

/// Places `rdn` directly below `superior`. Both must be well-formed and `rdn`
/// must consist of exactly one component.
pub fn compose(superior: &str, rdn: &str) -> Option<String> {
    let rdn_parts = dn_to_rdns(rdn)?;
    if rdn_parts.len() != 1 {
        return None;
    }
    dn_to_rdns(superior)?;

    let rdn = rdn.trim();
    let superior = superior.trim();
    if superior.len() == 0 {
        Some(rdn.to_owned())
    } else {
        Some(format!("{},{}", rdn, superior))
    }
}

/// Escapes an attribute value for use inside an RDN.
pub fn escape_value(value: &[u8]) -> String {
    let mut escaped = String::with_capacity(value.len());
    let text = String::from_utf8_lossy(value);
    let last = text.chars().count().saturating_sub(1);
    for (i, c) in text.chars().enumerate() {
        match c {
            ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=' => {
                escaped.push('\\');
                escaped.push(c);
            },
            '\0' => escaped.push_str("\\00"),
            ' ' if i == 0 || i == last => escaped.push_str("\\20"),
            '#' if i == 0 => escaped.push_str("\\23"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[derive(Clone, Copy, Debug, Hash, Eq, Ord, PartialEq, PartialOrd)]
enum Token<'a> {
    UnescapedSlice(&'a str),
    EscapedByte(u8),
}

/// Tokenizes the given DN string.
///
/// Used to abstract away escapes.
fn tokenize(dn: &str) -> Option<Vec<Token<'_>>> {
    let mut tokens = Vec::new();

    let mut current_start = 0;
    loop {
        let next_backslash = match find_from(dn, '\\', current_start) {
            Some(nb) => nb,
            None => {
                let rest_slice = &dn[current_start..];
                if rest_slice.len() > 0 {
                    tokens.push(Token::UnescapedSlice(rest_slice));
                }
                break;
            },
        };

        // eat the part until the backslash
        let eaten = &dn[current_start..next_backslash];
        tokens.push(Token::UnescapedSlice(eaten));

        // what follows the backslash?
        match dn[next_backslash+1..].chars().nth(0) {
            None => {
                // backslash at the end is invalid
                return None;
            },
            Some(c) => {
                if c.is_ascii_hexdigit() {
                    // okay, do we have another hex digit?
                    let c2 = match dn[next_backslash+2..].chars().nth(0) {
                        Some(c2) => c2,
                        None => {
                            // DN ends with a string like "\9" or "\F"
                            return None;
                        },
                    };
                    if !c2.is_ascii_hexdigit() {
                        // a string like "\A%"
                        return None;
                    }
                    let hex_slice = &dn[next_backslash+1..next_backslash+3];
                    let hex_value = u8::from_str_radix(hex_slice, 16).ok()?;
                    tokens.push(Token::EscapedByte(hex_value));

                    // continue after the second hex digit
                    current_start = next_backslash + 3;
                } else if [' ', '"', '#', '+', ',', ';', '<', '=', '>', '\\'].binary_search(&c).is_ok() {
                    tokens.push(Token::EscapedByte(c as u8));

                    // continue after that escaped character
                    current_start = next_backslash + 2;
                } else {
                    // nothing else may be escaped
                    return None;
                }
            },
        }
    }

    Some(tokens)
}


fn find_from(haystack: &str, needle: char, offset: usize) -> Option<usize> {
    haystack[offset..]
        .find(needle)
        .map(|i| i + offset)
}

fn split_at_unescaped_commas<'a>(tokens: &[Token<'a>]) -> Vec<Vec<Token<'a>>> {
    let mut pieces = Vec::new();
    let mut current_piece = Vec::new();
    for token in tokens {
        match *token {
            Token::EscapedByte(_) => {
                current_piece.push(*token);
            },
            Token::UnescapedSlice(s) => {
                let mut rest = s;
                while let Some(comma_index) = rest.find(',') {
                    let before = &rest[..comma_index];
                    if before.len() > 0 {
                        current_piece.push(Token::UnescapedSlice(before));
                    }
                    pieces.push(std::mem::take(&mut current_piece));
                    rest = &rest[comma_index+1..];
                }
                if rest.len() > 0 {
                    current_piece.push(Token::UnescapedSlice(rest));
                }
            },
        }
    }
    if current_piece.len() > 0 {
        pieces.push(current_piece);
    }
    pieces
}

fn split_at_first_unescaped_equals<'a>(tokens: &[Token<'a>]) -> Option<(Vec<Token<'a>>, Vec<Token<'a>>)> {
    let mut front_pieces = Vec::new();
    for (i, token) in tokens.iter().enumerate() {
        match *token {
            Token::EscapedByte(_) => {
                front_pieces.push(*token);
            },
            Token::UnescapedSlice(s) => {
                match s.find('=') {
                    None => {
                        front_pieces.push(*token);
                    },
                    Some(equals_index) => {
                        let before = &s[..equals_index];
                        let after = &s[equals_index+1..];

                        if before.len() > 0 {
                            front_pieces.push(Token::UnescapedSlice(before));
                        }

                        // handle the rest
                        let mut rear_pieces = Vec::new();
                        if after.len() > 0 {
                            rear_pieces.push(Token::UnescapedSlice(after));
                        }
                        rear_pieces.extend(tokens.iter().skip(i + 1).copied());

                        return Some((front_pieces, rear_pieces));
                    },
                }
            },
        }
    }

    // no unescaped equals found
    None
}

/// Drops unescaped spaces at both ends; escaped spaces stay.
fn trim_tokens<'a>(tokens: &[Token<'a>]) -> Vec<Token<'a>> {
    let mut trimmed: Vec<Token<'a>> = tokens.to_vec();
    if let Some(Token::UnescapedSlice(s)) = trimmed.first_mut() {
        let slice: &'a str = *s;
        *s = slice.trim_start_matches(' ');
    }
    if let Some(Token::UnescapedSlice(s)) = trimmed.last_mut() {
        let slice: &'a str = *s;
        *s = slice.trim_end_matches(' ');
    }
    trimmed
}

fn tokens_to_bytes(tokens: &[Token]) -> Vec<u8> {
    let mut ret = Vec::new();
    for token in tokens {
        match token {
            Token::EscapedByte(b) => ret.push(*b),
            Token::UnescapedSlice(slice) => ret.extend_from_slice(slice.as_bytes()),
        }
    }
    ret
}
