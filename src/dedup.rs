use std::collections::HashSet;

use crate::record::{CompositeKey, ProjectRecord};

/// Records collected during one run, unique by composite key.
#[derive(Debug, Default)]
pub struct Accumulator {
    seen: HashSet<CompositeKey>,
    records: Vec<ProjectRecord>,
    duplicates: usize,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep the record unless its key was already seen. First occurrence wins;
    /// later ones are dropped, not merged.
    pub fn push(&mut self, record: ProjectRecord) -> bool {
        if self.seen.insert(record.key()) {
            self.records.push(record);
            true
        } else {
            self.duplicates += 1;
            false
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    pub fn records_mut(&mut self) -> &mut [ProjectRecord] {
        &mut self.records
    }

    pub fn into_records(self) -> Vec<ProjectRecord> {
        self.records
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(pid: Option<&str>, rcid: Option<&str>, desc: &str) -> ProjectRecord {
        ProjectRecord {
            project_id: pid.map(Into::into),
            report_contract_id: rcid.map(Into::into),
            description: Some(desc.into()),
            ..Default::default()
        }
    }

    #[test]
    fn first_occurrence_wins() {
        let mut acc = Accumulator::new();
        assert!(acc.push(rec(Some("101"), Some("A"), "first")));
        assert!(!acc.push(rec(Some("101"), Some("A"), "second")));
        assert_eq!(acc.len(), 1);
        assert_eq!(acc.duplicates(), 1);
        assert_eq!(acc.into_records()[0].description.as_deref(), Some("first"));
    }

    #[test]
    fn key_is_the_pair() {
        let mut acc = Accumulator::new();
        assert!(acc.push(rec(Some("101"), Some("A"), "x")));
        assert!(acc.push(rec(Some("101"), None, "x")));
        assert!(acc.push(rec(None, Some("A"), "x")));
        assert!(!acc.push(rec(None, Some("A"), "y")));
        assert_eq!(acc.len(), 3);
    }
}
