/// A watched key, or every key sharing a byte prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyRange {
    key: Vec<u8>,
    prefix: bool,
}

/// Range end used by etcd to mean "no upper bound".
pub const NO_PREFIX_END: &[u8] = &[0];

impl KeyRange {
    pub fn new(
        key: impl AsRef<[u8]>,
        prefix: bool,
    ) -> Self {
        Self {
            key: key.as_ref().to_vec(),
            prefix,
        }
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn is_prefix(&self) -> bool {
        self.prefix
    }

    /// Whether `candidate` falls inside this range.
    pub fn contains(
        &self,
        candidate: &[u8],
    ) -> bool {
        if self.prefix {
            candidate.starts_with(&self.key)
        } else {
            candidate == self.key.as_slice()
        }
    }

    /// `(key, range_end)` as sent on the etcd wire.
    ///
    /// An empty prefix selects the whole keyspace and is encoded as
    /// `([0], [0])`.
    pub fn to_wire(&self) -> (Vec<u8>, Vec<u8>) {
        if !self.prefix {
            return (self.key.clone(), Vec::new());
        }
        if self.key.is_empty() {
            return (NO_PREFIX_END.to_vec(), NO_PREFIX_END.to_vec());
        }
        (self.key.clone(), prefix_range_end(&self.key))
    }
}

/// Smallest key strictly greater than every key starting with `prefix`.
///
/// Increments the last byte that is not `0xff` and drops everything after it.
/// A prefix made only of `0xff` bytes has no such key; [`NO_PREFIX_END`] is
/// returned instead.
pub fn prefix_range_end(prefix: &[u8]) -> Vec<u8> {
    let mut end = prefix.to_vec();
    for i in (0..end.len()).rev() {
        if end[i] < 0xff {
            end[i] += 1;
            end.truncate(i + 1);
            return end;
        }
    }
    NO_PREFIX_END.to_vec()
}
