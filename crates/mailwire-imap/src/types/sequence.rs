//! Message sequence sets.

/// One element of a sequence set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeqRange {
    /// A single number.
    Single(u32),
    /// An inclusive range `a:b`.
    Range(u32, u32),
    /// An open range `n:*`.
    From(u32),
    /// The `*` wildcard (highest number in the mailbox).
    Last,
}

/// A sequence set as used by FETCH, STORE, COPY, and SEARCH.
///
/// Serves for both message sequence numbers and UIDs; the command decides
/// which interpretation applies (`UID FETCH` vs `FETCH`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceSet {
    ranges: Vec<SeqRange>,
}

impl SequenceSet {
    /// A set containing one number.
    ///
    /// Returns `None` when `n` is 0 (sequence numbers are 1-based).
    #[must_use]
    pub fn single(n: u32) -> Option<Self> {
        (n > 0).then(|| Self {
            ranges: vec![SeqRange::Single(n)],
        })
    }

    /// An inclusive range `first:last`.
    #[must_use]
    pub fn range(first: u32, last: u32) -> Option<Self> {
        (first > 0 && last >= first).then(|| Self {
            ranges: vec![SeqRange::Range(first, last)],
        })
    }

    /// The open range `first:*`.
    #[must_use]
    pub fn from(first: u32) -> Option<Self> {
        (first > 0).then(|| Self {
            ranges: vec![SeqRange::From(first)],
        })
    }

    /// The full-mailbox set `1:*`.
    #[must_use]
    pub fn all() -> Self {
        Self {
            ranges: vec![SeqRange::From(1)],
        }
    }

    /// A set from explicit numbers, zeroes skipped.
    #[must_use]
    pub fn from_numbers(numbers: &[u32]) -> Self {
        Self {
            ranges: numbers
                .iter()
                .filter(|n| **n > 0)
                .map(|n| SeqRange::Single(*n))
                .collect(),
        }
    }

    /// Appends another single number.
    pub fn push(&mut self, n: u32) {
        if n > 0 {
            self.ranges.push(SeqRange::Single(n));
        }
    }

    /// Returns true if the set has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

impl std::fmt::Display for SequenceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, range) in self.ranges.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            match range {
                SeqRange::Single(n) => write!(f, "{n}")?,
                SeqRange::Range(a, b) => write!(f, "{a}:{b}")?,
                SeqRange::From(n) => write!(f, "{n}:*")?,
                SeqRange::Last => write!(f, "*")?,
            }
        }
        Ok(())
    }
}
