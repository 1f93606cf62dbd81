//! Key indexes for uniqueness and relation checks

use std::collections::HashMap;

/// Key tuple to the first row it appeared on.
///
/// Scoped to one resource within one validation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrimaryKeyIndex {
    positions: Vec<usize>,
    entries: HashMap<Vec<String>, usize>,
}

impl PrimaryKeyIndex {
    /// Create an index over the fields at `positions`
    pub fn new(positions: Vec<usize>) -> Self {
        Self {
            positions,
            entries: HashMap::new(),
        }
    }

    /// Field positions forming the key
    pub fn positions(&self) -> &[usize] {
        &self.positions
    }

    /// Insert a tuple seen on `row`.
    ///
    /// Returns the first row the tuple was seen on when it is already present;
    /// the original entry is kept.
    pub fn insert(&mut self, key: Vec<String>, row: usize) -> Option<usize> {
        match self.entries.get(&key) {
            Some(&first) => Some(first),
            None => {
                self.entries.insert(key, row);
                None
            }
        }
    }

    pub fn contains(&self, key: &[String]) -> bool {
        self.entries.contains_key(key)
    }

    /// Row the tuple was first seen on
    pub fn get(&self, key: &[String]) -> Option<usize> {
        self.entries.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// First row a foreign-key tuple appeared on and how many rows carry it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurrences {
    pub first_row: usize,
    pub rows: usize,
}

/// Distinct foreign-key tuples of a dependent resource.
///
/// Memory grows with the number of distinct tuples, not with the rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceIndex {
    positions: Vec<usize>,
    tuples: HashMap<Vec<String>, Occurrences>,
}

impl ReferenceIndex {
    pub fn new(positions: Vec<usize>) -> Self {
        Self {
            positions,
            tuples: HashMap::new(),
        }
    }

    pub fn positions(&self) -> &[usize] {
        &self.positions
    }

    /// Count a tuple seen on `row`; rows arrive in ascending order
    pub fn insert(&mut self, key: Vec<String>, row: usize) {
        self.tuples
            .entry(key)
            .and_modify(|seen| seen.rows += 1)
            .or_insert(Occurrences {
                first_row: row,
                rows: 1,
            });
    }

    pub fn get(&self, key: &[String]) -> Option<Occurrences> {
        self.tuples.get(key).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[String], Occurrences)> {
        self.tuples.iter().map(|(key, seen)| (key.as_slice(), *seen))
    }

    /// Number of distinct tuples
    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }
}

/// Key tuples collected from one resource during its pass, for the relation pass.
///
/// Targets are indexes of referenced field sets; sources are the tuples of
/// this resource's own foreign keys. Rows with an empty key component are
/// never recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyCaptures {
    targets: Vec<PrimaryKeyIndex>,
    sources: Vec<ReferenceIndex>,
    primary: Option<Vec<usize>>,
}

impl KeyCaptures {
    /// Captures nothing
    pub fn new() -> Self {
        Self::default()
    }

    /// Index the field set at `positions` as a reference target
    pub fn capture_target(&mut self, positions: Vec<usize>) {
        if self.target(&positions).is_none() {
            self.targets.push(PrimaryKeyIndex::new(positions));
        }
    }

    /// Record the field set at `positions` as a foreign key of this resource
    pub fn capture_source(&mut self, positions: Vec<usize>) {
        if self.source(&positions).is_none() {
            self.sources.push(ReferenceIndex::new(positions));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty() && self.sources.is_empty()
    }

    pub fn target(&self, positions: &[usize]) -> Option<&PrimaryKeyIndex> {
        self.targets.iter().find(|t| t.positions() == positions)
    }

    pub fn source(&self, positions: &[usize]) -> Option<&ReferenceIndex> {
        self.sources.iter().find(|s| s.positions() == positions)
    }

    /// The resource's primary key is tracked elsewhere and handed over with [`Self::adopt_primary`]
    pub(crate) fn share_primary(&mut self, positions: &[usize]) {
        if self.target(positions).is_some() {
            self.primary = Some(positions.to_vec());
        }
    }

    /// Replace the target index over the primary key with the finished primary-key index
    pub(crate) fn adopt_primary(&mut self, index: PrimaryKeyIndex) {
        if let Some(slot) = self
            .targets
            .iter_mut()
            .find(|t| t.positions() == index.positions())
        {
            *slot = index;
        }
    }

    /// Record one row, given a way to build its key tuple for a field set
    pub(crate) fn record<F>(&mut self, row: usize, key_of: F)
    where
        F: Fn(&[usize]) -> Option<Vec<String>>,
    {
        for target in &mut self.targets {
            if self.primary.as_deref() == Some(target.positions()) {
                continue;
            }
            if let Some(key) = key_of(target.positions()) {
                target.insert(key, row);
            }
        }
        for source in &mut self.sources {
            if let Some(key) = key_of(source.positions()) {
                source.insert(key, row);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|p| (*p).to_string()).collect()
    }

    #[test]
    fn test_insert_reports_first_row() {
        let mut index = PrimaryKeyIndex::new(vec![0]);
        assert_eq!(index.insert(key(&["1"]), 1), None);
        assert_eq!(index.insert(key(&["2"]), 2), None);
        assert_eq!(index.insert(key(&["1"]), 3), Some(1));
        assert_eq!(index.insert(key(&["1"]), 4), Some(1));
        assert_eq!(index.len(), 2);
        assert_eq!(index.get(&key(&["1"])), Some(1));
    }

    #[test]
    fn test_composite_keys_differ_by_any_component() {
        let mut index = PrimaryKeyIndex::new(vec![0, 1]);
        assert_eq!(index.insert(key(&["a", "1"]), 1), None);
        assert_eq!(index.insert(key(&["a", "2"]), 2), None);
        assert_eq!(index.insert(key(&["b", "1"]), 3), None);
        assert!(index.contains(&key(&["a", "2"])));
        assert!(!index.contains(&key(&["b", "2"])));
    }

    #[test]
    fn test_captures_record_requested_field_sets() {
        let mut captures = KeyCaptures::new();
        captures.capture_target(vec![0]);
        captures.capture_target(vec![0]);
        captures.capture_source(vec![1]);

        let rows = [["org-1", ""], ["org-2", "org-1"], ["org-3", "org-1"]];
        for (i, values) in rows.iter().enumerate() {
            captures.record(i + 1, |positions| {
                positions
                    .iter()
                    .map(|&p| Some(values[p]).filter(|v| !v.is_empty()).map(str::to_string))
                    .collect()
            });
        }

        assert_eq!(captures.target(&[0]).unwrap().len(), 3);
        let source = captures.source(&[1]).unwrap();
        assert_eq!(source.len(), 1);
        let (tuple, seen) = source.iter().next().unwrap();
        assert_eq!(tuple, &["org-1".to_string()][..]);
        assert_eq!(seen, Occurrences { first_row: 2, rows: 2 });
    }

    #[test]
    fn test_reference_index_keeps_distinct_tuples() {
        let mut index = ReferenceIndex::new(vec![1]);
        for row in 1..=1000 {
            index.insert(key(&[if row % 2 == 0 { "even" } else { "odd" }]), row);
        }
        assert_eq!(index.len(), 2);
        assert_eq!(index.get(&key(&["odd"])), Some(Occurrences { first_row: 1, rows: 500 }));
        assert_eq!(index.get(&key(&["even"])), Some(Occurrences { first_row: 2, rows: 500 }));
        assert_eq!(index.get(&key(&["none"])), None);
    }

    #[test]
    fn test_shared_primary_index_is_adopted() {
        let mut captures = KeyCaptures::new();
        captures.capture_target(vec![0]);
        captures.share_primary(&[0]);
        captures.record(1, |_| Some(key(&["x"])));
        assert!(captures.target(&[0]).unwrap().is_empty());

        let mut primary = PrimaryKeyIndex::new(vec![0]);
        primary.insert(key(&["x"]), 1);
        captures.adopt_primary(primary);
        assert!(captures.target(&[0]).unwrap().contains(&key(&["x"])));
    }
}
