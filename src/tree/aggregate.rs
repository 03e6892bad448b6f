//! Order-independent aggregation of per-file digests.

use std::fmt;

use crate::scanner::digest_bytes;

/// Digest of a whole directory tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GlobalDigest(String);

impl GlobalDigest {
    /// The digest as a hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the hex string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for GlobalDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for GlobalDigest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Combine per-file digests into one global digest.
///
/// The digests are sorted before they are concatenated and hashed, so the
/// result does not depend on walk order or on the order in which workers
/// finished. Duplicate digests are kept: two identical files contribute
/// twice. No digests at all give the digest of the empty string.
///
/// # Example
///
/// ```
/// use treetrawl::tree::combine;
///
/// let a = combine(["b", "a"]);
/// let b = combine(["a", "b"]);
/// assert_eq!(a, b);
/// assert_eq!(combine(Vec::<String>::new()).as_str(), "2d06800538d394c2");
/// ```
#[must_use]
pub fn combine<I, S>(digests: I) -> GlobalDigest
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let owned: Vec<S> = digests.into_iter().collect();
    let mut sorted: Vec<&str> = owned.iter().map(|d| d.as_ref()).collect();
    sorted.sort_unstable();

    GlobalDigest(digest_bytes(sorted.concat().as_bytes()))
}
