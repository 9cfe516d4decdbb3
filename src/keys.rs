//! Length-prefixed key encoding for LMDB storage.
//!
//! Keys owned by an entity are encoded as: [entity_id: u64 BE][len1][bytes1][len2][bytes2]...
//! - No delimiters, no escaping, any bytes allowed inside a part
//! - Fixed-width id prefix keeps all rows of one entity contiguous for prefix scans
//! - A wildcard scope is stored as an empty part

use crate::constants::MAX_KEY_PART_LEN;
use crate::error::{Error, Result};

/// Reject parts that do not fit a one-byte length prefix
#[inline]
pub fn check_part(part: &str) -> Result<()> {
    if part.len() > MAX_KEY_PART_LEN {
        return Err(Error::InvalidKey(format!(
            "key part too long: {} bytes (max {})",
            part.len(),
            MAX_KEY_PART_LEN
        )));
    }
    Ok(())
}

/// Build a length-prefixed key from parts
#[inline]
pub fn build_key(parts: &[&str]) -> Vec<u8> {
    let total_len: usize = parts.iter().map(|p| 1 + p.len()).sum();
    let mut key = Vec::with_capacity(total_len);
    for part in parts {
        key.push(part.len() as u8);
        key.extend_from_slice(part.as_bytes());
    }
    key
}

/// Big-endian id bytes (sorts numerically)
#[inline]
pub fn id_key(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

/// Build a key scoped to an entity: [entity_id][parts...]
#[inline]
pub fn owned_key(entity_id: u64, parts: &[&str]) -> Vec<u8> {
    let mut key = id_key(entity_id).to_vec();
    key.extend_from_slice(&build_key(parts));
    key
}

/// Key of a permission record: (entity, key, scope)
pub fn record_key(entity_id: u64, key: &str, scope: Option<&str>) -> Result<Vec<u8>> {
    check_part(key)?;
    let scope = scope.unwrap_or("");
    check_part(scope)?;
    Ok(owned_key(entity_id, &[key, scope]))
}

/// Normalize a scope: empty strings mean "no scope"
#[inline]
pub fn normalize_scope(scope: Option<&str>) -> Option<&str> {
    scope.filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_key() {
        let key = build_key(&["billing.refund", "eu"]);
        assert_eq!(key[0], 14);
        assert_eq!(&key[1..15], b"billing.refund");
        assert_eq!(key[15], 2);
        assert_eq!(&key[16..], b"eu");
    }

    #[test]
    fn test_record_keys_share_entity_prefix() {
        let a = record_key(7, "orders.view", None).unwrap();
        let b = record_key(7, "orders.view", Some("eu")).unwrap();
        let c = record_key(70, "orders.view", None).unwrap();
        assert!(a.starts_with(&id_key(7)));
        assert!(b.starts_with(&id_key(7)));
        assert!(!c.starts_with(&id_key(7)));
        assert_ne!(a, b);
    }

    #[test]
    fn test_key_boundaries_are_unambiguous() {
        // "ab" + "c" must not collide with "a" + "bc"
        assert_ne!(build_key(&["ab", "c"]), build_key(&["a", "bc"]));
    }

    #[test]
    fn test_long_part_rejected() {
        let long = "x".repeat(MAX_KEY_PART_LEN + 1);
        assert!(record_key(1, &long, None).is_err());
        assert!(record_key(1, "k", Some(&long)).is_err());
    }

    #[test]
    fn test_normalize_scope() {
        assert_eq!(normalize_scope(Some("")), None);
        assert_eq!(normalize_scope(Some("eu")), Some("eu"));
        assert_eq!(normalize_scope(None), None);
    }
}
