//! Key and secret-text wrappers that wipe themselves on drop

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of every derived vault key in bytes
pub const KEY_LEN: usize = 32;

/// Vault encryption key - automatically zeroed when dropped
///
/// Deliberately not `Clone`: the session controller is the only owner, and
/// every other component borrows it for the duration of one call.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    key: [u8; KEY_LEN],
}

impl MasterKey {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    /// Borrow the raw key; never copy it out
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.key
    }

    /// Zeroed key to derive into, so no intermediate copy of the output exists
    pub(crate) fn zeroed() -> Self {
        Self { key: [0u8; KEY_LEN] }
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut [u8; KEY_LEN] {
        &mut self.key
    }

    /// `None` unless `slice` is exactly [`KEY_LEN`] bytes
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        let mut key = Self::zeroed();
        key.bytes_mut().copy_from_slice(<&[u8; KEY_LEN]>::try_from(slice).ok()?);
        Some(key)
    }

    /// True once the key material has been wiped
    pub fn is_zeroed(&self) -> bool {
        self.key.iter().all(|b| *b == 0)
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Secret text (passwords, tokens) - automatically zeroed when dropped
#[derive(Clone, Default, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretString {
    value: String,
}

impl SecretString {
    pub fn new(value: String) -> Self {
        Self { value }
    }

    /// Borrow the plaintext; keep the borrow short
    pub fn expose(&self) -> &str {
        &self.value
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Take the text out, leaving an empty (already wiped) shell to drop
    pub fn into_inner(mut self) -> String {
        std::mem::take(&mut self.value)
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self::new(value.to_string())
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretString")
            .field("value", &"[REDACTED]")
            .finish()
    }
}

// Serializes as a bare string: entry plaintext before encryption, and the
// sign-in body sent over TLS.
impl Serialize for SecretString {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.value)
    }
}

impl<'de> Deserialize<'de> for SecretString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_from_slice_checks_length() {
        let key = MasterKey::from_slice(&[9u8; KEY_LEN]).unwrap();
        assert_eq!(key.as_bytes(), &[9u8; KEY_LEN]);

        assert!(MasterKey::from_slice(&[9u8; 16]).is_none());
        assert!(MasterKey::from_slice(&[9u8; 33]).is_none());
    }

    #[test]
    fn test_master_key_zeroize_wipes_bytes() {
        let mut key = MasterKey::new([7u8; 32]);
        assert!(!key.is_zeroed());

        key.zeroize();
        assert!(key.is_zeroed());
        assert_eq!(key.as_bytes(), &[0u8; 32]);
    }

    #[test]
    fn test_secret_string_into_inner() {
        let secret = SecretString::from("correct horse");
        assert!(!secret.is_empty());
        assert_eq!(secret.into_inner(), "correct horse");
    }

    #[test]
    fn test_secret_string_serde_is_transparent() {
        let secret = SecretString::from("hunter2");
        let json = serde_json::to_string(&secret).unwrap();
        assert_eq!(json, "\"hunter2\"");

        let back: SecretString = serde_json::from_str(&json).unwrap();
        assert_eq!(back, secret);
    }

    #[test]
    fn test_debug_never_prints_material() {
        let key = MasterKey::new([0xAB; KEY_LEN]);
        let printed = format!("{:?}", key);
        assert!(printed.contains("[REDACTED]"));
        assert!(!printed.contains("171"));

        let secret = SecretString::from("visible?");
        assert!(!format!("{:?}", secret).contains("visible"));
    }
}
