//! Concrete restraint kinds.
//!
//! - [`coordination`] - Mean coordination number of core atoms within distance shells
//! - [`improper`] - Improper angles of four-atom tuples within angular bounds

pub mod coordination;
pub mod improper;

use super::collector::AtomsCollector;
use super::error::EngineError;
use super::protocol::MovePhase;
use crate::core::definitions::{AtomMembership, MembershipIndex};
use crate::core::models::system::AtomicSystem;
use itertools::Itertools;

/// Attachment, membership and collection state shared by every restraint kind.
#[derive(Debug, Clone, Default)]
pub(crate) struct Bookkeeping {
    attached: bool,
    membership: MembershipIndex,
    collector: AtomsCollector<AtomMembership>,
    out_of_date: bool,
    standard_error: Option<f64>,
    tentative: Option<f64>,
}

impl Bookkeeping {
    /// Starts from a collector in which `collected` atoms are already collected.
    pub(crate) fn with_collected(num_atoms: usize, collected: &[usize]) -> Result<Self, EngineError> {
        let mut collector = AtomsCollector::new(num_atoms);
        for &real in collected {
            collector.collect(real, AtomMembership::default())?;
        }
        Ok(Self {
            collector,
            ..Self::default()
        })
    }

    pub(crate) fn ensure_attached(&self) -> Result<(), EngineError> {
        if self.attached {
            Ok(())
        } else {
            Err(EngineError::NotAttached)
        }
    }

    pub(crate) fn ensure_layout(&self, system: &AtomicSystem) -> Result<(), EngineError> {
        if system.num_atoms() != self.collector.num_atoms()
            || system.num_active() != self.collector.num_active()
        {
            return Err(EngineError::LayoutMismatch {
                expected: self.collector.num_active(),
                found: system.num_active(),
            });
        }
        Ok(())
    }

    /// Checks that committed data exists, is current and matches the system layout.
    pub(crate) fn ensure_ready(
        &self,
        system: &AtomicSystem,
        computed: bool,
    ) -> Result<(), EngineError> {
        self.ensure_attached()?;
        if self.out_of_date {
            return Err(EngineError::DataOutOfDate);
        }
        if !computed {
            return Err(EngineError::NotComputed);
        }
        self.ensure_layout(system)
    }

    /// Publishes a freshly compiled membership index.
    ///
    /// Atoms already collected keep being collected: their entries are moved out of the
    /// new index into the collector. A collector sized for a different atom table is
    /// replaced by an empty one. Nothing changes if the layout does not fit `system`.
    pub(crate) fn install(
        &mut self,
        mut membership: MembershipIndex,
        system: &AtomicSystem,
    ) -> Result<(), EngineError> {
        let mut collector = if self.collector.num_atoms() == system.num_atoms() {
            self.collector.clone()
        } else {
            AtomsCollector::new(system.num_atoms())
        };
        if collector.num_active() != system.num_active() {
            return Err(EngineError::LayoutMismatch {
                expected: collector.num_active(),
                found: system.num_active(),
            });
        }

        for real in collector.collected().collect_vec() {
            let entries = membership.take(real).unwrap_or_default();
            if let Some(saved) = collector.saved_mut(real) {
                *saved = entries;
            }
        }

        self.membership = membership;
        self.collector = collector;
        self.attached = true;
        self.invalidate();
        Ok(())
    }

    /// Drops committed and tentative results.
    pub(crate) fn invalidate(&mut self) {
        self.out_of_date = false;
        self.standard_error = None;
        self.tentative = None;
    }

    pub(crate) fn collect(&mut self, real: usize) -> Result<(), EngineError> {
        self.collector.relative_index(real)?;
        let entries = self.membership.take(real).unwrap_or_default();
        self.collector.collect(real, entries)
    }

    pub(crate) fn restore(&mut self, real: usize) -> Result<(), EngineError> {
        let entries = self.collector.restore(real)?;
        self.membership.put(real, entries);
        self.out_of_date = true;
        Ok(())
    }

    pub(crate) fn membership(&self) -> &MembershipIndex {
        &self.membership
    }

    pub(crate) fn collector(&self) -> &AtomsCollector<AtomMembership> {
        &self.collector
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.attached
    }

    pub(crate) fn is_out_of_date(&self) -> bool {
        self.out_of_date
    }

    pub(crate) fn commit(&mut self, standard_error: f64) {
        self.out_of_date = false;
        self.standard_error = Some(standard_error);
        self.tentative = None;
    }

    pub(crate) fn set_tentative(&mut self, tentative: Option<f64>) {
        self.tentative = tentative;
    }

    pub(crate) fn standard_error(&self) -> Option<f64> {
        if self.out_of_date {
            None
        } else {
            self.standard_error
        }
    }

    pub(crate) fn tentative(&self) -> Option<f64> {
        self.tentative
    }
}

/// Fails on the first real index that appears twice in a move.
pub(crate) fn ensure_unique(reals: &[usize]) -> Result<(), EngineError> {
    match reals.iter().duplicates().next() {
        Some(&real) => Err(EngineError::DuplicateAtom(real)),
        None => Ok(()),
    }
}

pub(crate) const IDLE: &[MovePhase] = &[MovePhase::Idle];
