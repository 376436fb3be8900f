use super::atom::AtomRecord;
use crate::core::geometry::cell::SimulationBox;
use nalgebra::Point3;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SystemError {
    #[error("System has {atoms} atom records but {positions} positions")]
    PositionCountMismatch { atoms: usize, positions: usize },

    #[error("Position of atom {0} is not finite")]
    NonFinitePosition(usize),

    #[error("Position index {index} is out of range for {len} stored positions")]
    PositionOutOfRange { index: usize, len: usize },

    #[error("Molecule assignment covers {given} atoms but the system has {expected}")]
    MoleculeCountMismatch { given: usize, expected: usize },
}

/// An atomic configuration shared by every restraint.
///
/// The attribute table is captured once at construction and is indexed by real atom
/// index for the lifetime of the system. The coordinate store, by contrast, only holds
/// the positions of atoms that are currently part of the system: removing an atom packs
/// the remaining positions so that they are addressed by relative index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AtomicSystem {
    /// Frozen attribute table, one record per original atom.
    atoms: Vec<AtomRecord>,
    /// Cartesian positions in the current packed layout.
    positions: Vec<Point3<f64>>,
    cell: SimulationBox,
}

impl AtomicSystem {
    /// Creates a new system from its atom table, positions and simulation box.
    ///
    /// # Errors
    ///
    /// Returns [`SystemError::PositionCountMismatch`] if the two tables differ in length
    /// and [`SystemError::NonFinitePosition`] if any coordinate is NaN or infinite.
    pub fn new(
        atoms: Vec<AtomRecord>,
        positions: Vec<Point3<f64>>,
        cell: SimulationBox,
    ) -> Result<Self, SystemError> {
        if atoms.len() != positions.len() {
            return Err(SystemError::PositionCountMismatch {
                atoms: atoms.len(),
                positions: positions.len(),
            });
        }
        if let Some(index) = positions
            .iter()
            .position(|p| p.coords.iter().any(|v| !v.is_finite()))
        {
            return Err(SystemError::NonFinitePosition(index));
        }
        Ok(Self {
            atoms,
            positions,
            cell,
        })
    }

    /// Returns the frozen attribute table.
    pub fn atoms(&self) -> &[AtomRecord] {
        &self.atoms
    }

    /// Returns the attribute record of a real atom index.
    pub fn atom(&self, real: usize) -> Option<&AtomRecord> {
        self.atoms.get(real)
    }

    /// Number of atoms in the original system, collected ones included.
    pub fn num_atoms(&self) -> usize {
        self.atoms.len()
    }

    /// Number of positions currently stored.
    pub fn num_active(&self) -> usize {
        self.positions.len()
    }

    pub fn positions(&self) -> &[Point3<f64>] {
        &self.positions
    }

    pub fn position(&self, relative: usize) -> Option<&Point3<f64>> {
        self.positions.get(relative)
    }

    pub fn cell(&self) -> &SimulationBox {
        &self.cell
    }

    pub fn set_cell(&mut self, cell: SimulationBox) {
        self.cell = cell;
    }

    /// Overwrites stored positions, typically to commit an accepted move.
    ///
    /// All indexes are checked before anything is written.
    pub fn set_positions(
        &mut self,
        relative: &[usize],
        positions: &[Point3<f64>],
    ) -> Result<(), SystemError> {
        if relative.len() != positions.len() {
            return Err(SystemError::PositionCountMismatch {
                atoms: relative.len(),
                positions: positions.len(),
            });
        }
        self.check_index(relative)?;
        if let Some(index) = positions
            .iter()
            .position(|p| p.coords.iter().any(|v| !v.is_finite()))
        {
            return Err(SystemError::NonFinitePosition(relative[index]));
        }
        for (&index, position) in relative.iter().zip(positions) {
            self.positions[index] = *position;
        }
        Ok(())
    }

    pub(crate) fn position_mut(&mut self, relative: usize) -> Option<&mut Point3<f64>> {
        self.positions.get_mut(relative)
    }

    pub(crate) fn check_index(&self, relative: &[usize]) -> Result<(), SystemError> {
        let len = self.positions.len();
        match relative.iter().find(|&&index| index >= len) {
            Some(&index) => Err(SystemError::PositionOutOfRange { index, len }),
            None => Ok(()),
        }
    }

    /// Removes the position at `relative`, shifting every later position down by one.
    pub fn remove_position(&mut self, relative: usize) -> Result<Point3<f64>, SystemError> {
        self.check_index(&[relative])?;
        Ok(self.positions.remove(relative))
    }

    /// Inserts a position at `relative`, shifting every later position up by one.
    pub fn insert_position(
        &mut self,
        relative: usize,
        position: Point3<f64>,
    ) -> Result<(), SystemError> {
        let len = self.positions.len();
        if relative > len {
            return Err(SystemError::PositionOutOfRange {
                index: relative,
                len,
            });
        }
        self.positions.insert(relative, position);
        Ok(())
    }

    /// Reassigns molecule index and name of every atom, in real index order.
    pub fn reassign_molecules(
        &mut self,
        assignments: Vec<(usize, String)>,
    ) -> Result<(), SystemError> {
        if assignments.len() != self.atoms.len() {
            return Err(SystemError::MoleculeCountMismatch {
                given: assignments.len(),
                expected: self.atoms.len(),
            });
        }
        for (atom, (index, name)) in self.atoms.iter_mut().zip(assignments) {
            atom.molecule_index = index;
            atom.molecule_name = name;
        }
        Ok(())
    }

    /// Groups real atom indexes by molecule index.
    pub fn molecules(&self) -> BTreeMap<usize, Vec<usize>> {
        let mut molecules: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (real, atom) in self.atoms.iter().enumerate() {
            molecules.entry(atom.molecule_index).or_default().push(real);
        }
        molecules
    }
}
