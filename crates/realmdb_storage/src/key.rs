//! Key traits and the string key convertor.

use std::fmt::Debug;
use std::hash::Hash;
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};

/// Bound for types usable as entity keys.
///
/// Keys are:
/// - Unique within a store
/// - Immutable once assigned
/// - Totally ordered, so unordered queries still iterate deterministically
pub trait StoreKey: Clone + Eq + Ord + Hash + Debug + Send + Sync + 'static {}

impl<T> StoreKey for T where T: Clone + Eq + Ord + Hash + Debug + Send + Sync + 'static {}

/// Canonical conversion between keys and their string identifiers.
///
/// Every backend exposes one of these so callers never depend on the
/// physical key representation. `decode` is the strict variant;
/// `decode_safe` is for identifiers arriving from untrusted input where
/// a malformed id simply means "no such entity".
pub trait KeyConvertor<K: StoreKey>: Send + Sync {
    /// Returns the canonical string representation of a key.
    fn encode(&self, key: &K) -> String;

    /// Parses a key from its string representation.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidKeyFormat` on malformed input.
    fn decode(&self, raw: &str) -> StorageResult<K>;

    /// Tolerant variant of [`KeyConvertor::decode`].
    fn decode_safe(&self, raw: &str) -> Option<K> {
        self.decode(raw).ok()
    }

    /// Generates a new key with negligible collision probability.
    fn new_key(&self) -> K;
}

/// Key convertor for UUID keys.
///
/// New keys are random v4 UUIDs; the string form is the canonical
/// hyphenated representation.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidConvertor;

impl KeyConvertor<Uuid> for UuidConvertor {
    fn encode(&self, key: &Uuid) -> String {
        key.to_string()
    }

    fn decode(&self, raw: &str) -> StorageResult<Uuid> {
        Uuid::parse_str(raw).map_err(|_| StorageError::invalid_key_format(raw))
    }

    fn new_key(&self) -> Uuid {
        Uuid::new_v4()
    }
}
