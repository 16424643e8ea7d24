//! Cache key derivation.
//!
//! Keys must be identical across process restarts for the same logical
//! (content, context) pair, so the persisted snapshot stays addressable.
//! 64-bit FNV-1a over `content \0 canonical-context`, rendered as 16 chars
//! of lowercase hex. No random seed, no identity hashing.

use crate::context::TranslationContext;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Opaque, fixed-width cache key (16 lowercase hex chars).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Rebuild a key from its persisted hex form.
    pub(crate) fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive the cache key for a (content, merged context) pair.
///
/// Pure and total: an absent context hashes the same as an empty canonical
/// string. Equal inputs always produce equal keys.
pub fn build_key(content: &str, context: Option<&TranslationContext>) -> CacheKey {
    let canonical = context.map(TranslationContext::canonical_string).unwrap_or_default();

    let mut hash = FNV_OFFSET_BASIS;
    for byte in content
        .as_bytes()
        .iter()
        .chain(std::iter::once(&0u8))
        .chain(canonical.as_bytes())
    {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }

    CacheKey(format!("{hash:016x}"))
}
