use thiserror::Error;


/// LDAP result code for "no such object".
pub const RC_NO_SUCH_OBJECT: u32 = 32;

/// LDAP result code for "invalid credentials".
pub const RC_INVALID_CREDENTIALS: u32 = 49;


#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to connect to {url}: {message}")]
    ConnectFailure { url: String, message: String },

    #[error("failed to bind as {bind_dn:?}: {message}")]
    AuthFailure { bind_dn: String, message: String },

    #[error("entry {dn:?} does not exist")]
    EntryNotFound { dn: String },

    #[error("{}", naming_message(.code, .message))]
    NamingFailure { code: Option<u32>, message: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

fn naming_message(code: &Option<u32>, message: &str) -> String {
    match code {
        Some(rc) => format!("directory operation failed (result code {}): {}", rc, message),
        None => format!("directory operation failed: {}", message),
    }
}

impl Error {
    pub fn naming(code: u32, message: impl Into<String>) -> Self {
        Self::NamingFailure { code: Some(code), message: message.into() }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::NamingFailure { code: None, message: message.into() }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// The LDAP result code carried by a [`Error::NamingFailure`], if any.
    pub fn result_code(&self) -> Option<u32> {
        match self {
            Self::NamingFailure { code, .. } => *code,
            _ => None,
        }
    }

    pub fn is_no_such_object(&self) -> bool {
        self.result_code() == Some(RC_NO_SUCH_OBJECT)
    }
}

impl From<ldap3::LdapError> for Error {
    fn from(value: ldap3::LdapError) -> Self {
        match value {
            ldap3::LdapError::LdapResult { result } => {
                let message = if result.text.is_empty() {
                    format!("server returned result code {}", result.rc)
                } else {
                    result.text
                };
                Self::NamingFailure { code: Some(result.rc), message }
            },
            other => Self::protocol(other.to_string()),
        }
    }
}


pub type Result<T> = std::result::Result<T, Error>;
