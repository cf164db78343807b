/// Reference sequence index in a BAM header.
pub type RefId = usize;
/// 0-based genome or fragment coordinate.
pub type Pos = u32;

// Fast hash maps using AHash instead of the default SipHash.
// Import `HashMapExt` as well when you need `::new()` or `::with_capacity()`.
pub(crate) type HashMap<K, V> = ahash::HashMap<K, V>;
pub(crate) use ahash::HashMapExt;

/// Transcript strand. `Both` doubles as "unknown".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Strand {
    Plus,
    Minus,
    #[default]
    Both,
}

impl Strand {
    pub fn from_char(c: u8) -> Self {
        match c {
            b'+' => Strand::Plus,
            b'-' => Strand::Minus,
            _ => Strand::Both,
        }
    }

    pub fn to_char(self) -> u8 {
        match self {
            Strand::Plus => b'+',
            Strand::Minus => b'-',
            Strand::Both => b'.',
        }
    }

    pub fn is_known(self) -> bool {
        self != Strand::Both
    }

    /// True if `self` is compatible with a lookup restricted to `filter`.
    pub fn matches(self, filter: Strand) -> bool {
        filter == Strand::Both || self == filter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strand_chars() {
        assert_eq!(Strand::from_char(b'+'), Strand::Plus);
        assert_eq!(Strand::from_char(b'-'), Strand::Minus);
        assert_eq!(Strand::from_char(b'.'), Strand::Both);
        assert_eq!(Strand::from_char(b'?'), Strand::Both);
        assert_eq!(Strand::Minus.to_char(), b'-');
    }

    #[test]
    fn strand_filter() {
        assert!(Strand::Plus.matches(Strand::Both));
        assert!(Strand::Plus.matches(Strand::Plus));
        assert!(!Strand::Plus.matches(Strand::Minus));
    }
}
