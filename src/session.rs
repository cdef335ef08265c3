use crate::error::SessionError;
use sha2::{Digest, Sha256};

/// Access gate for a single user session.
///
/// Without a configured passcode the session starts authorized. With one,
/// the only transition to `authorized` is a successful [`SessionContext::authorize`].
#[derive(Debug)]
pub struct SessionContext {
    passcode_digest: Option<[u8; 32]>,
    authorized: bool,
}

impl SessionContext {
    pub fn new(passcode: Option<&str>) -> Self {
        let passcode_digest = passcode
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(digest);
        Self {
            authorized: passcode_digest.is_none(),
            passcode_digest,
        }
    }

    pub fn is_authorized(&self) -> bool {
        self.authorized
    }

    pub fn authorize(&mut self, entered: Option<&str>) -> Result<(), SessionError> {
        let Some(expected) = self.passcode_digest else {
            self.authorized = true;
            return Ok(());
        };

        let entered = entered.map(str::trim).unwrap_or_default();
        if entered.is_empty() {
            return Err(SessionError::PasscodeRequired);
        }
        if digest(entered) != expected {
            return Err(SessionError::PasscodeRejected);
        }

        self.authorized = true;
        Ok(())
    }
}

fn digest(value: &str) -> [u8; 32] {
    Sha256::digest(value.as_bytes()).into()
}
