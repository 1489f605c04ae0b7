use std::collections::{HashSet, VecDeque};

/// Links already published, in insertion order (oldest first).
///
/// Unbounded unless a limit is set with [`ProcessedSet::with_limit`]; then
/// the oldest links are evicted so it matches what the store keeps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessedSet {
    order: VecDeque<String>,
    index: HashSet<String>,
    limit: Option<usize>,
}

impl ProcessedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `limit` links, evicting the oldest.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit.max(1));
        self.evict();
        self
    }

    pub fn contains(&self, link: &str) -> bool {
        self.index.contains(link)
    }

    /// Insert a link. Returns false if it was already present, in which
    /// case its original position is kept.
    pub fn insert(&mut self, link: impl Into<String>) -> bool {
        let link = link.into();
        if self.index.contains(&link) {
            return false;
        }
        self.index.insert(link.clone());
        self.order.push_back(link);
        self.evict();
        true
    }

    fn evict(&mut self) {
        let Some(limit) = self.limit else { return };
        while self.order.len() > limit {
            if let Some(oldest) = self.order.pop_front() {
                self.index.remove(&oldest);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Iterate oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &str> + '_ {
        self.order.iter().map(String::as_str)
    }

    /// The `n` most recently inserted links, oldest first.
    pub fn most_recent(&self, n: usize) -> impl Iterator<Item = &str> + '_ {
        let skip = self.order.len().saturating_sub(n);
        self.iter().skip(skip)
    }
}

impl<S: Into<String>> FromIterator<S> for ProcessedSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        for link in iter {
            set.insert(link);
        }
        set
    }
}
