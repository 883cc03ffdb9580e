/// DJB2 string hash (Bernstein, `hash * 33 + c`). Stable across processes and
/// platforms, which makes it suitable for deriving wire-visible identifiers
/// from human-readable names.
#[inline]
pub fn hash_str(value: &str) -> u64 {
    let mut hash: u64 = 5381;

    for byte in value.bytes() {
        hash = (hash << 5).wrapping_add(hash).wrapping_add(u64::from(byte));
    }

    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_values() {
        // Pinned values: these feed into wire-visible identifiers and must
        // never change between releases.
        assert_eq!(hash_str(""), 5381);
        assert_eq!(hash_str("a"), 177670);
    }

    #[test]
    fn test_distinct_names() {
        assert_ne!(hash_str("NodeA"), hash_str("NodeB"));
        assert_ne!(hash_str("Registry"), hash_str("registry"));
    }

    #[test]
    fn test_no_overflow_panic() {
        let long: String = std::iter::repeat('x').take(4096).collect();
        let _ = hash_str(&long);
    }
}
