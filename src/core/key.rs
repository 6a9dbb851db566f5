// Composite key encoding and validation. The storage key is
// `partition_key + U+001F + sort_key`; U+001F sorts below printable text and
// is rejected in user-supplied key fields, so byte order over storage keys is
// partition-major, sort-key-minor.

use serde::{Deserialize, Serialize};

/// Reserved separator between partition key and sort key.
pub const KEY_SEPARATOR: char = '\u{1f}';

#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Key {
    pub partition_key: String,
    pub sort_key: String,
}

impl Key {
    pub fn new(partition_key: impl Into<String>, sort_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: sort_key.into(),
        }
    }

    /// Raw bytes actually stored in the engine.
    pub fn storage_key(&self) -> Vec<u8> {
        format!("{}{KEY_SEPARATOR}{}", self.partition_key, self.sort_key).into_bytes()
    }

    /// Human-readable rendering for logs; never parsed back.
    pub fn display_key(&self) -> String {
        format!("{}#{}", self.partition_key, self.sort_key)
    }
}

/// Scan prefix for one partition: partition key plus the separator.
pub fn partition_prefix(partition_key: &str) -> Vec<u8> {
    format!("{partition_key}{KEY_SEPARATOR}").into_bytes()
}

/// Recovers the sort key from a storage key known to carry `prefix`.
pub fn sort_key_after_prefix<'a>(storage_key: &'a [u8], prefix: &[u8]) -> Option<&'a str> {
    if !storage_key.starts_with(prefix) {
        return None;
    }
    std::str::from_utf8(&storage_key[prefix.len()..]).ok()
}

/// One independent validation finding. Findings are collected, never
/// short-circuited; an empty list means the key is valid.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ValidationResult {
    pub valid: bool,
    pub message: Option<String>,
}

impl ValidationResult {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: Some(message.into()),
        }
    }
}

/// Checks a key field-by-field. Check order is stable: partition-blank,
/// partition-separator, sort-blank, sort-separator.
pub fn validate_key(key: &Key) -> Vec<ValidationResult> {
    let mut findings = validate_partition_key(&key.partition_key);
    findings.extend(validate_sort_key(&key.sort_key));
    findings
}

pub(crate) fn validate_partition_key(partition_key: &str) -> Vec<ValidationResult> {
    let mut findings = Vec::new();
    if partition_key.is_empty() {
        findings.push(ValidationResult::invalid("Partition key cannot be blank"));
    }
    if partition_key.contains(KEY_SEPARATOR) {
        findings.push(ValidationResult::invalid(format!(
            "Partition key cannot contain character U+{:04X}",
            KEY_SEPARATOR as u32
        )));
    }
    findings
}

pub(crate) fn validate_sort_key(sort_key: &str) -> Vec<ValidationResult> {
    let mut findings = Vec::new();
    if sort_key.is_empty() {
        findings.push(ValidationResult::invalid("Sort key cannot be blank"));
    }
    if sort_key.contains(KEY_SEPARATOR) {
        findings.push(ValidationResult::invalid(format!(
            "Sort key cannot contain character U+{:04X}",
            KEY_SEPARATOR as u32
        )));
    }
    findings
}
