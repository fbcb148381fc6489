//! 32-bit MurmurHash2 used as the cache key for compiled passes.

pub const PASS_HASH_SEED: u32 = 666;

/// 32-bit MurmurHash2 of `data` reading blocks as little endian.
pub fn murmur_hash2(data: &[u8], seed: u32) -> u32 {
    murmur2::murmur2(data, seed)
}

/// Hash the concatenated sources of a pass.
pub fn hash_sources<'a>(sources: impl IntoIterator<Item = &'a str>) -> u32 {
    let text: String = sources.into_iter().collect();
    murmur_hash2(text.as_bytes(), PASS_HASH_SEED)
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn known_values() {
        assert_eq!(0, murmur_hash2(b"", 0));
        assert_eq!(1445806411, murmur_hash2(b"hello", 666));
        assert_eq!(1294880307, murmur_hash2(b"void main() {}", 666));
        assert_eq!(
            556214736,
            murmur_hash2(b"The quick brown fox jumps over the lazy dog", 0)
        );
    }

    #[test]
    fn concatenated_sources() {
        assert_eq!(1294880307, hash_sources(["void main", "() {}"]));
        assert_ne!(hash_sources(["void main() {}"]), hash_sources(["void main() { }"]));
    }
}
