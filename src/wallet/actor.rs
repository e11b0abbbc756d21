use std::fmt;
use uuid::Uuid;

/// Per-process session identity used when no wallet is connected
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn generate() -> Self {
        Self(format!("session_{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionToken {
    fn default() -> Self {
        Self::generate()
    }
}

/// Key for rate-limit and cache partitions.
///
/// A connected wallet address (lower-cased) wins over the session token so quotas follow
/// the wallet rather than the process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(String);

impl ActorId {
    pub fn resolve(account: Option<&str>, session: &SessionToken) -> Self {
        match account.map(str::trim).filter(|a| !a.is_empty()) {
            Some(address) => Self::from_address(address),
            None => Self(session.as_str().to_string()),
        }
    }

    pub fn from_address(address: &str) -> Self {
        Self(address.trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_address_is_case_normalized() {
        let session = SessionToken::generate();
        let upper = ActorId::resolve(Some("0xABCdef0000000000000000000000000000000001"), &session);
        let lower = ActorId::resolve(Some("0xabcdef0000000000000000000000000000000001"), &session);
        assert_eq!(upper, lower);
        assert_eq!(upper.as_str(), "0xabcdef0000000000000000000000000000000001");
    }

    #[test]
    fn test_falls_back_to_session_token() {
        let session = SessionToken::generate();
        assert_eq!(ActorId::resolve(None, &session).as_str(), session.as_str());
        assert_eq!(ActorId::resolve(Some("  "), &session).as_str(), session.as_str());
        assert!(session.as_str().starts_with("session_"));
        assert_ne!(session, SessionToken::generate());
    }
}
