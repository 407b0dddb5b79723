use tracing::{debug, warn};

use crate::directory::DirectorySession;
use crate::error::Result;


/// Owns one open session for the duration of one facade operation.
///
/// All directory work goes through [`SessionScope::session`]; the scope is then
/// consumed by [`SessionScope::release`], which closes the session and hands
/// back the operation's outcome untouched. Close failures are only logged.
pub struct SessionScope<S: DirectorySession> {
    session: Option<S>,
    operation: &'static str,
}
impl<S: DirectorySession> SessionScope<S> {
    pub fn new(session: S, operation: &'static str) -> Self {
        Self {
            session: Some(session),
            operation,
        }
    }

    pub fn session(&mut self) -> &mut S {
        match self.session.as_mut() {
            Some(s) => s,
            // release() consumes the scope, so the session is always present here
            None => unreachable!("session scope used after release"),
        }
    }

    pub async fn release<T>(mut self, outcome: Result<T>) -> Result<T> {
        if let Some(mut session) = self.session.take() {
            match session.close().await {
                Ok(()) => debug!(operation = self.operation, "directory session released"),
                Err(e) => warn!(operation = self.operation, error = %e, "failed to release directory session"),
            }
        }
        outcome
    }
}
impl<S: DirectorySession> Drop for SessionScope<S> {
    fn drop(&mut self) {
        if self.session.is_some() {
            warn!(operation = self.operation, "directory session dropped without release");
        }
    }
}
