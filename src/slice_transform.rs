//! Prefix extractors used by prefix-hashed plain tables.

/// Maps a user key to the prefix that groups it in a hash index.
pub trait SliceTransform: Send + Sync {
    /// A stable name, persisted in table properties.
    fn name(&self) -> &str;

    /// The prefix of `key`. Only called when [`in_domain`](Self::in_domain)
    /// holds.
    fn transform<'a>(&self, key: &'a [u8]) -> &'a [u8];

    /// Whether `key` has a prefix under this transform.
    fn in_domain(&self, key: &[u8]) -> bool;

    /// Fixed prefix length, if every prefix has the same length.
    fn fixed_length(&self) -> Option<usize> {
        None
    }
}

/// Takes the first `len` bytes of a key.
///
/// Every key is in the domain. A key shorter than `len` is its own prefix, so
/// in a prefix-hashed plain table it forms a group apart from the longer keys
/// it is a prefix of (`"ab"` and `"abcd1"` land in different groups under a
/// 4-byte transform).
#[derive(Debug, Clone)]
pub struct FixedPrefixTransform {
    len: usize,
    name: String,
}

impl FixedPrefixTransform {
    /// Creates an extractor for `len`-byte prefixes.
    pub fn new(len: usize) -> Self {
        Self { len, name: format!("tablestore.FixedPrefix.{}", len) }
    }
}

impl SliceTransform for FixedPrefixTransform {
    fn name(&self) -> &str {
        &self.name
    }

    fn transform<'a>(&self, key: &'a [u8]) -> &'a [u8] {
        &key[..key.len().min(self.len)]
    }

    /// Always true; short keys map to themselves.
    fn in_domain(&self, _key: &[u8]) -> bool {
        true
    }

    fn fixed_length(&self) -> Option<usize> {
        Some(self.len)
    }
}

/// The whole key is the prefix.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTransform;

impl SliceTransform for NoopTransform {
    fn name(&self) -> &str {
        "tablestore.Noop"
    }

    fn transform<'a>(&self, key: &'a [u8]) -> &'a [u8] {
        key
    }

    fn in_domain(&self, _key: &[u8]) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_prefix() {
        let t = FixedPrefixTransform::new(3);
        assert_eq!(t.transform(b"abcdef"), b"abc");
        assert_eq!(t.transform(b"ab"), b"ab");
        assert_eq!(t.fixed_length(), Some(3));
        assert_eq!(t.name(), "tablestore.FixedPrefix.3");
    }

    #[test]
    fn test_fixed_prefix_short_keys_in_domain() {
        let t = FixedPrefixTransform::new(4);
        assert!(t.in_domain(b""));
        assert!(t.in_domain(b"ab"));
        assert_eq!(t.transform(b""), b"");
        assert_eq!(t.transform(b"ab"), b"ab");
        assert_ne!(t.transform(b"ab"), t.transform(b"abcd1"));
    }

    #[test]
    fn test_noop() {
        assert_eq!(NoopTransform.transform(b"whole"), b"whole");
        assert!(NoopTransform.fixed_length().is_none());
    }
}
