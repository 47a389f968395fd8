//! Records: an identifier plus its (name, email) value.

use bytes::Bytes;

use crate::error::{CoreError, Result};
use crate::types::RecordId;

/// Largest length of a single value field, bounded by its one-byte prefix.
pub const MAX_FIELD_LEN: usize = u8::MAX as usize;

/// The payload stored under a [`RecordId`].
///
/// Both fields are opaque bytes of at most [`MAX_FIELD_LEN`] bytes. The
/// default value has two empty fields and is what a lookup of an absent
/// identifier answers with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RecordValue {
    name: Bytes,
    email: Bytes,
}

impl RecordValue {
    pub fn new(name: impl Into<Bytes>, email: impl Into<Bytes>) -> Result<Self> {
        let name = name.into();
        let email = email.into();
        check_len("name", &name)?;
        check_len("email", &email)?;
        Ok(Self { name, email })
    }

    pub fn name(&self) -> &Bytes {
        &self.name
    }

    pub fn email(&self) -> &Bytes {
        &self.email
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.email.is_empty()
    }

    /// Bytes taken by both fields and their length prefixes.
    pub fn encoded_len(&self) -> usize {
        2 + self.name.len() + self.email.len()
    }
}

fn check_len(field: &'static str, bytes: &[u8]) -> Result<()> {
    if bytes.len() > MAX_FIELD_LEN {
        return Err(CoreError::FieldTooLong {
            field,
            len: bytes.len(),
        });
    }
    Ok(())
}

/// A stored record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub id: RecordId,
    pub value: RecordValue,
}

impl Record {
    pub fn new(id: RecordId, value: RecordValue) -> Self {
        Self { id, value }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_accepts_max_length() {
        let value = RecordValue::new(vec![b'n'; 255], vec![b'e'; 255]).unwrap();
        assert_eq!(value.encoded_len(), 512);
    }

    #[test]
    fn test_value_rejects_long_fields() {
        assert_eq!(
            RecordValue::new(vec![0u8; 256], ""),
            Err(CoreError::FieldTooLong { field: "name", len: 256 })
        );
        assert_eq!(
            RecordValue::new("", vec![0u8; 300]),
            Err(CoreError::FieldTooLong { field: "email", len: 300 })
        );
    }

    #[test]
    fn test_default_value_is_empty() {
        let value = RecordValue::default();
        assert!(value.is_empty());
        assert_eq!(value.encoded_len(), 2);
    }

    #[test]
    fn test_value_keeps_bytes() {
        let value = RecordValue::new("Ada Lovelace", "ada@example.org").unwrap();
        assert_eq!(&value.name()[..], b"Ada Lovelace");
        assert_eq!(&value.email()[..], b"ada@example.org");
        assert!(!value.is_empty());
    }
}
