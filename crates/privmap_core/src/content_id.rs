//! Content identifiers: keyed hashes of normalized identity strings.

use crate::error::{PrivmapError, Result};
use crate::normalize;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Hash key used when the configuration does not provide one.
///
/// Every process that stages or loads for the same graph must use the same
/// key, otherwise identifiers from different runs will not line up.
pub const DEFAULT_HASH_KEY: &str =
    "900f02030405060708090a0b9c0d0e0ff0e0d0c0b0a090807060504030201091";

/// A 32-byte keyed BLAKE3 hash identifying a graph node.
///
/// ContentIds are the primary key of every node. The same normalized
/// identity string always produces the same ContentId under the same key,
/// so later phases never need a lookup round-trip to learn a node's key.
///
/// # Examples
///
/// ```
/// use privmap_core::ContentId;
///
/// let id = ContentId::from_bytes([0xab; 32]);
/// assert_eq!(id.as_hex().len(), 64);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentId([u8; 32]);

impl ContentId {
    /// The length of a ContentId in bytes.
    pub const LEN: usize = 32;

    /// The length of a ContentId as a hex string.
    pub const HEX_LEN: usize = 64;

    /// Creates a ContentId from raw bytes.
    #[inline]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns a reference to the underlying hash bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns this ContentId as a lowercase hex string.
    pub fn as_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a ContentId from a hex string.
    ///
    /// # Errors
    ///
    /// Returns `PrivmapError::InvalidHex` if the string is not valid hex
    /// or is not exactly 64 characters long.
    ///
    /// # Examples
    ///
    /// ```
    /// use privmap_core::ContentId;
    ///
    /// let hex = "a".repeat(64);
    /// let id = ContentId::from_hex(&hex).unwrap();
    /// assert_eq!(id.as_hex(), hex);
    /// ```
    pub fn from_hex(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.len() != Self::HEX_LEN {
            return Err(PrivmapError::InvalidHex(format!(
                "expected {} hex chars, got {}",
                Self::HEX_LEN,
                s.len()
            )));
        }

        let bytes = hex::decode(s).map_err(|e| PrivmapError::InvalidHex(e.to_string()))?;

        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| PrivmapError::InvalidHex("invalid length".to_string()))?;

        Ok(Self(arr))
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_hex())
    }
}

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentId({}...)", &self.as_hex()[..12])
    }
}

// Staged as hex so the CSV stores stay human-readable.
impl Serialize for ContentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_hex())
    }
}

impl<'de> Deserialize<'de> for ContentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ContentId::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Derives ContentIds with a fixed deployment key.
///
/// `Identifier` is cheap to clone and safe to share between collector
/// workers; each call builds its own streaming hasher.
#[derive(Clone)]
pub struct Identifier {
    key: [u8; 32],
}

impl Identifier {
    /// Creates an identifier from a raw 32-byte key.
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Creates an identifier from a 64-character hex key.
    ///
    /// # Errors
    ///
    /// Returns `PrivmapError::InvalidHashKey` if the key is not 32 bytes of hex.
    pub fn from_hex_key(key: &str) -> Result<Self> {
        let bytes = hex::decode(key.trim())
            .map_err(|e| PrivmapError::InvalidHashKey(e.to_string()))?;
        let key: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
            PrivmapError::InvalidHashKey(format!("expected 32 bytes, got {}", b.len()))
        })?;
        Ok(Self::new(key))
    }

    /// Hashes an already-normalized identity string.
    ///
    /// # Examples
    ///
    /// ```
    /// use privmap_core::Identifier;
    ///
    /// let ident = Identifier::default();
    /// assert_eq!(ident.identify("c:/tools/a.exe"), ident.identify("c:/tools/a.exe"));
    /// ```
    pub fn identify(&self, normalized: &str) -> ContentId {
        let mut hasher = blake3::Hasher::new_keyed(&self.key);
        hasher.update(normalized.as_bytes());
        ContentId::from_bytes(*hasher.finalize().as_bytes())
    }

    /// Normalizes a filesystem path, then hashes it.
    pub fn path_id(&self, raw: &str) -> ContentId {
        self.identify(&normalize::normalize_path(raw))
    }

    /// Normalizes a principal, runner, or symbol name, then hashes it.
    pub fn name_id(&self, raw: &str) -> ContentId {
        self.identify(&normalize::normalize_name(raw))
    }

    /// Canonicalizes a principal name (folding built-in account aliases),
    /// then hashes it.
    pub fn principal_id(&self, raw: &str) -> ContentId {
        self.identify(&normalize::canonical_principal(raw))
    }

    /// Short fingerprint of the key, safe to write next to staged data.
    ///
    /// Lets a loader notice that stores were produced with a different key.
    pub fn fingerprint(&self) -> String {
        let digest = blake3::hash(&self.key);
        hex::encode(&digest.as_bytes()[..8])
    }
}

impl Default for Identifier {
    fn default() -> Self {
        // The default key is a compile-time constant of the right length.
        match Self::from_hex_key(DEFAULT_HASH_KEY) {
            Ok(ident) => ident,
            Err(_) => Self::new([0u8; 32]),
        }
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier(key={})", self.fingerprint())
    }
}
