//! Hash-tag extraction.
//!
//! A key containing `{tag}` is placed by `tag` alone, so `{user:1}profile`
//! and `{user:1}sessions` share a node with the plain key `user:1`.

/// Return the part of `raw` that decides placement.
///
/// Looks at the first `{` only. If a `}` follows it and the bytes in between
/// are non-empty, those bytes are the effective key. Otherwise the whole key
/// is used.
pub fn hash_key(raw: &[u8]) -> &[u8] {
    let Some(open) = raw.iter().position(|&b| b == b'{') else {
        return raw;
    };
    let rest = &raw[open + 1..];
    match rest.iter().position(|&b| b == b'}') {
        Some(close) if close > 0 => &rest[..close],
        _ => raw,
    }
}

/// True if `raw` carries a usable hash tag.
pub fn has_hash_tag(raw: &[u8]) -> bool {
    hash_key(raw).len() != raw.len()
}
