use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Definitions one atom participates in, split by role.
///
/// For coordination shells `primary` lists definitions where the atom is a core atom and
/// `secondary` those where it is a shell atom. For improper angles `primary` lists the
/// definitions where the atom is the improper atom and `secondary` those where it is the
/// origin, x or y atom. Both lists are sorted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AtomMembership {
    pub primary: Vec<usize>,
    pub secondary: Vec<usize>,
}

impl AtomMembership {
    pub fn is_empty(&self) -> bool {
        self.primary.is_empty() && self.secondary.is_empty()
    }

    /// Every definition the atom touches, in either role, sorted and deduplicated.
    pub fn definitions(&self) -> impl Iterator<Item = usize> + '_ {
        self.primary
            .iter()
            .merge(self.secondary.iter())
            .dedup()
            .copied()
    }
}

/// Per-atom membership lists, the inverse of a set of compiled definitions.
///
/// Indexed by real atom index and covering every atom of the frozen atom table, including
/// atoms that belong to no definition.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MembershipIndex {
    entries: Vec<AtomMembership>,
}

impl MembershipIndex {
    /// Builds the index from `(definition, primary atoms, secondary atoms)` triples.
    ///
    /// Definitions must be supplied in increasing order so that every list ends up sorted.
    pub fn build<'a, I>(num_atoms: usize, groups: I) -> Self
    where
        I: IntoIterator<Item = (usize, &'a [usize], &'a [usize])>,
    {
        let mut entries = vec![AtomMembership::default(); num_atoms];
        for (definition, primary, secondary) in groups {
            for &atom in primary {
                let list = &mut entries[atom].primary;
                if list.last() != Some(&definition) {
                    list.push(definition);
                }
            }
            for &atom in secondary {
                let list = &mut entries[atom].secondary;
                if list.last() != Some(&definition) {
                    list.push(definition);
                }
            }
        }
        Self { entries }
    }

    pub fn num_atoms(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, real: usize) -> Option<&AtomMembership> {
        self.entries.get(real)
    }

    /// Removes and returns the entries of an atom, leaving it with empty lists.
    pub fn take(&mut self, real: usize) -> Option<AtomMembership> {
        self.entries.get_mut(real).map(std::mem::take)
    }

    /// Reinstates previously taken entries.
    pub fn put(&mut self, real: usize, membership: AtomMembership) -> bool {
        match self.entries.get_mut(real) {
            Some(slot) => {
                *slot = membership;
                true
            }
            None => false,
        }
    }

    /// Definitions touched by any of the given atoms, sorted and deduplicated.
    pub fn definitions_touching(&self, reals: &[usize]) -> Vec<usize> {
        reals
            .iter()
            .filter_map(|&real| self.entries.get(real))
            .flat_map(|membership| membership.definitions())
            .sorted_unstable()
            .dedup()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_produces_exact_inverse_with_empty_lists_for_outsiders() {
        let index = MembershipIndex::build(
            5,
            [
                (0, [0usize].as_slice(), [1usize, 2].as_slice()),
                (1, [1].as_slice(), [0, 2].as_slice()),
            ],
        );
        assert_eq!(index.num_atoms(), 5);
        assert_eq!(index.get(0).unwrap().primary, vec![0]);
        assert_eq!(index.get(0).unwrap().secondary, vec![1]);
        assert_eq!(index.get(2).unwrap().secondary, vec![0, 1]);
        assert!(index.get(4).unwrap().is_empty());
    }

    #[test]
    fn definitions_touching_merges_roles() {
        let index = MembershipIndex::build(
            4,
            [
                (0, [0usize].as_slice(), [1usize].as_slice()),
                (1, [1].as_slice(), [2].as_slice()),
                (2, [3].as_slice(), [3].as_slice()),
            ],
        );
        assert_eq!(index.definitions_touching(&[1]), vec![0, 1]);
        assert_eq!(index.definitions_touching(&[1, 2, 3]), vec![0, 1, 2]);
        assert_eq!(index.get(3).unwrap().definitions().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn take_and_put_round_trip_entries() {
        let mut index =
            MembershipIndex::build(2, [(0, [0usize].as_slice(), [1usize].as_slice())]);
        let taken = index.take(1).unwrap();
        assert!(index.get(1).unwrap().is_empty());
        assert!(index.definitions_touching(&[1]).is_empty());
        assert!(index.put(1, taken));
        assert_eq!(index.definitions_touching(&[1]), vec![0]);
        assert!(index.take(9).is_none());
    }
}
