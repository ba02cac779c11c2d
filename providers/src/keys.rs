//! Key layout for persisted provider records.
//!
//! `"/providers/" ++ hex(content_id) ++ "/" ++ hex(peer_id)` → `le_u64(nanos)`.
//!
//! Hex never contains `/`, so the separator is unambiguous and every record
//! for one content id shares the contiguous prefix `"/providers/" ++ hex(cid) ++ "/"`.

use provstore_types::{ContentId, DecodeError, PeerId};

/// Namespace shared by every provider record.
pub const NAMESPACE: &[u8] = b"/providers/";

const SEPARATOR: u8 = b'/';

/// Full key for one `(content_id, peer_id)` record.
pub fn provider_key(content_id: &ContentId, peer_id: &PeerId) -> Vec<u8> {
    let mut key = content_prefix(content_id);
    key.extend_from_slice(hex::encode(peer_id.as_bytes()).as_bytes());
    key
}

/// Prefix shared by every record of `content_id`, including the trailing separator.
pub fn content_prefix(content_id: &ContentId) -> Vec<u8> {
    let cid_hex = hex::encode(content_id.as_bytes());
    let mut prefix = Vec::with_capacity(NAMESPACE.len() + cid_hex.len() + 1);
    prefix.extend_from_slice(NAMESPACE);
    prefix.extend_from_slice(cid_hex.as_bytes());
    prefix.push(SEPARATOR);
    prefix
}

/// Split a full key back into its identifiers.
pub fn parse_provider_key(key: &[u8]) -> Result<(ContentId, PeerId), DecodeError> {
    let rest = key
        .strip_prefix(NAMESPACE)
        .ok_or_else(|| DecodeError::InvalidKey("missing providers namespace".into()))?;

    let sep = rest
        .iter()
        .position(|b| *b == SEPARATOR)
        .ok_or_else(|| DecodeError::InvalidKey("missing peer separator".into()))?;
    let (cid_hex, peer_hex) = (&rest[..sep], &rest[sep + 1..]);
    if peer_hex.contains(&SEPARATOR) {
        return Err(DecodeError::InvalidKey("too many separators".into()));
    }

    let cid = hex::decode(cid_hex).map_err(|e| DecodeError::InvalidKey(e.to_string()))?;
    let peer = hex::decode(peer_hex).map_err(|e| DecodeError::InvalidKey(e.to_string()))?;
    Ok((ContentId::new(cid), PeerId::new(peer)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout() {
        let key = provider_key(&ContentId::from("ab"), &PeerId::from("p/q"));
        assert_eq!(key, b"/providers/6162/702f71".to_vec());
        assert!(key.starts_with(&content_prefix(&ContentId::from("ab"))));
    }

    #[test]
    fn prefix_does_not_match_longer_content_id() {
        let short = content_prefix(&ContentId::from("a"));
        let long_key = provider_key(&ContentId::from("ab"), &PeerId::from("p"));
        assert!(!long_key.starts_with(&short));
    }

    #[test]
    fn parse_recovers_identifiers_containing_separator() {
        let cid = ContentId::new(vec![b'/', 0, 255]);
        let peer = PeerId::from("peer one");
        assert_eq!(
            parse_provider_key(&provider_key(&cid, &peer)).unwrap(),
            (cid, peer)
        );
    }

    #[test]
    fn malformed_keys_are_rejected() {
        assert!(parse_provider_key(b"/other/aa/bb").is_err());
        assert!(parse_provider_key(b"/providers/aabb").is_err());
        assert!(parse_provider_key(b"/providers/aa/bb/cc").is_err());
        assert!(parse_provider_key(b"/providers/zz/bb").is_err());
    }
}
