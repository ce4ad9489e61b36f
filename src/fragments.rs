//! Ordered fragment index of one packed sequence.

use crate::layout::Seqfragment;

/// The fragments of one sequence, strictly ordered by `sequence_offset` and
/// non-overlapping. Regions not covered by any fragment are logical `N`s.
#[derive(Debug, Clone, Default)]
pub struct FragmentIndex {
    fragments: Vec<Seqfragment>,
}

impl FragmentIndex {
    pub fn new(fragments: Vec<Seqfragment>) -> Self {
        FragmentIndex { fragments }
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Seqfragment> {
        self.fragments.get(index)
    }

    pub fn as_slice(&self) -> &[Seqfragment] {
        &self.fragments
    }

    /// Index of the first fragment whose end extends past `offset`, or
    /// `len()` if no fragment remains. A returned fragment either contains
    /// `offset` or starts after it (in which case `offset` lies in an N gap).
    pub fn find_next(&self, offset: u64) -> usize {
        self.fragments.partition_point(|fragment| fragment.end() < offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn index() -> FragmentIndex {
        // AAANNNCCCNNNGGG: three runs of three bases
        FragmentIndex::new(vec![
            Seqfragment { sequence_offset: 0, packed_bases_offset: 0, bases_count: 3, shift: 0 },
            Seqfragment { sequence_offset: 6, packed_bases_offset: 0, bases_count: 3, shift: 6 },
            Seqfragment { sequence_offset: 12, packed_bases_offset: 1, bases_count: 3, shift: 4 },
        ])
    }

    #[test]
    fn find_next_inside_fragment() {
        let index = index();
        assert_eq!(index.find_next(0), 0);
        assert_eq!(index.find_next(2), 0);
        assert_eq!(index.find_next(7), 1);
        assert_eq!(index.find_next(14), 2);
    }

    #[test]
    fn find_next_in_gap_returns_following_fragment() {
        let index = index();
        assert_eq!(index.find_next(4), 1);
        assert_eq!(index.find_next(10), 2);
    }

    #[test]
    fn find_next_at_fragment_end_is_inclusive() {
        // offset == end of a run still selects that run; the reader consumes
        // zero bases from it and advances.
        let index = index();
        assert_eq!(index.find_next(3), 0);
        assert_eq!(index.find_next(9), 1);
    }

    #[test]
    fn find_next_past_all_fragments() {
        let index = index();
        assert_eq!(index.find_next(16), 3);
        assert!(index.get(index.find_next(16)).is_none());
    }
}
