use std::cmp::Ordering;
use std::fmt;

/// A fixed-width key that can live inside a B+tree page.
///
/// Keys are stored as little-endian bytes at computed offsets, so the
/// encoded length must be a compile-time constant per key type.
pub trait IndexKey: Copy + Default + fmt::Debug + Send + Sync {
    /// Number of bytes the encoded key occupies in a page
    const ENCODED_LEN: usize;

    /// Writes the key into the buffer; `buf` is exactly ENCODED_LEN bytes
    fn encode(&self, buf: &mut [u8]);

    /// Reads a key back out of the buffer
    fn decode(buf: &[u8]) -> Self;
}

impl IndexKey for u32 {
    const ENCODED_LEN: usize = 4;

    fn encode(&self, buf: &mut [u8]) {
        buf.copy_from_slice(&self.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        u32::from_le_bytes(buf.try_into().unwrap())
    }
}

impl IndexKey for u64 {
    const ENCODED_LEN: usize = 8;

    fn encode(&self, buf: &mut [u8]) {
        buf.copy_from_slice(&self.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        u64::from_le_bytes(buf.try_into().unwrap())
    }
}

/// Three-way comparison object for index keys. The tree never falls back to
/// a language-level ordering; the comparator is passed in explicitly.
pub trait KeyComparator<K>: Send + Sync {
    fn compare(&self, a: &K, b: &K) -> Ordering;
}

pub struct U32Comparator;

impl KeyComparator<u32> for U32Comparator {
    fn compare(&self, a: &u32, b: &u32) -> Ordering {
        a.cmp(b)
    }
}

pub struct U64Comparator;

impl KeyComparator<u64> for U64Comparator {
    fn compare(&self, a: &u64, b: &u64) -> Ordering {
        a.cmp(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u32_key_round_trip() {
        let mut buf = [0u8; 4];
        0xDEADBEEFu32.encode(&mut buf);
        assert_eq!(u32::decode(&buf), 0xDEADBEEF);
    }

    #[test]
    fn test_u32_comparator() {
        let cmp = U32Comparator;
        assert_eq!(cmp.compare(&1, &2), Ordering::Less);
        assert_eq!(cmp.compare(&2, &2), Ordering::Equal);
        assert_eq!(cmp.compare(&3, &2), Ordering::Greater);
    }
}
