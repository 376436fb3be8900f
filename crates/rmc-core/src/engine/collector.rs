use super::error::EngineError;
use std::collections::BTreeMap;

/// Translates between real atom identities and the packed layout of active atoms.
///
/// Collected atoms keep their real index but disappear from the relative layout, and each
/// carries a saved payload (membership entries for a restraint, coordinates for the
/// shared store) that is handed back when the atom is restored.
#[derive(Debug, Clone, PartialEq)]
pub struct AtomsCollector<T> {
    collected: BTreeMap<usize, T>,
    real_to_relative: Vec<Option<usize>>,
    relative_to_real: Vec<usize>,
}

impl<T> Default for AtomsCollector<T> {
    fn default() -> Self {
        Self::new(0)
    }
}

impl<T> AtomsCollector<T> {
    /// Creates a collector over `num_atoms` real atoms, none of them collected.
    pub fn new(num_atoms: usize) -> Self {
        Self {
            collected: BTreeMap::new(),
            real_to_relative: (0..num_atoms).map(Some).collect(),
            relative_to_real: (0..num_atoms).collect(),
        }
    }

    pub fn num_atoms(&self) -> usize {
        self.real_to_relative.len()
    }

    pub fn num_active(&self) -> usize {
        self.relative_to_real.len()
    }

    pub fn is_collected(&self, real: usize) -> bool {
        self.collected.contains_key(&real)
    }

    /// Collected real indexes in increasing order.
    pub fn collected(&self) -> impl Iterator<Item = usize> + '_ {
        self.collected.keys().copied()
    }

    pub(crate) fn saved_mut(&mut self, real: usize) -> Option<&mut T> {
        self.collected.get_mut(&real)
    }

    fn check_range(&self, real: usize) -> Result<(), EngineError> {
        if real >= self.num_atoms() {
            return Err(EngineError::IndexOutOfRange {
                index: real,
                len: self.num_atoms(),
            });
        }
        Ok(())
    }

    /// Marks an atom as collected and stores its saved payload.
    pub fn collect(&mut self, real: usize, saved: T) -> Result<(), EngineError> {
        self.check_range(real)?;
        if self.collected.contains_key(&real) {
            return Err(EngineError::AtomCollected(real));
        }
        self.collected.insert(real, saved);
        self.rebuild();
        Ok(())
    }

    /// Returns a collected atom to the active layout, handing back its saved payload.
    pub fn restore(&mut self, real: usize) -> Result<T, EngineError> {
        self.check_range(real)?;
        let saved = self
            .collected
            .remove(&real)
            .ok_or(EngineError::AtomNotCollected(real))?;
        self.rebuild();
        Ok(saved)
    }

    pub fn relative_index(&self, real: usize) -> Result<usize, EngineError> {
        self.check_range(real)?;
        self.real_to_relative[real].ok_or(EngineError::AtomCollected(real))
    }

    pub fn relative_indexes(&self, reals: &[usize]) -> Result<Vec<usize>, EngineError> {
        reals.iter().map(|&real| self.relative_index(real)).collect()
    }

    /// Relative index an atom will occupy once restored; for active atoms, its current one.
    pub fn insertion_index(&self, real: usize) -> Result<usize, EngineError> {
        self.check_range(real)?;
        Ok(self.relative_to_real.partition_point(|&r| r < real))
    }

    pub fn real_index(&self, relative: usize) -> Result<usize, EngineError> {
        self.relative_to_real
            .get(relative)
            .copied()
            .ok_or(EngineError::IndexOutOfRange {
                index: relative,
                len: self.num_active(),
            })
    }

    /// Relative indexes of the active atoms among `reals`, collected ones skipped.
    pub fn active_relative(&self, reals: &[usize]) -> Vec<usize> {
        reals
            .iter()
            .filter_map(|&real| self.real_to_relative.get(real).copied().flatten())
            .collect()
    }

    fn rebuild(&mut self) {
        self.relative_to_real.clear();
        for (real, slot) in self.real_to_relative.iter_mut().enumerate() {
            if self.collected.contains_key(&real) {
                *slot = None;
            } else {
                *slot = Some(self.relative_to_real.len());
                self.relative_to_real.push(real);
            }
        }
    }
}
