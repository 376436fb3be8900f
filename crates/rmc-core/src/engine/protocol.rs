use super::error::EngineError;
use serde::{Deserialize, Serialize};

/// Phase of the trial-move cycle of one restraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MovePhase {
    #[default]
    Idle,
    BeforeMove,
    AfterMove,
}

/// State of the single trial move a restraint may have in flight.
///
/// `D` is the partial data a restraint records over the definitions touched by the move.
#[derive(Debug, Clone)]
pub struct TrialCycle<D> {
    phase: MovePhase,
    reals: Vec<usize>,
    before: Option<D>,
    after: Option<D>,
    tentative: Option<f64>,
}

impl<D> Default for TrialCycle<D> {
    fn default() -> Self {
        Self {
            phase: MovePhase::Idle,
            reals: Vec::new(),
            before: None,
            after: None,
            tentative: None,
        }
    }
}

impl<D> TrialCycle<D> {
    pub fn phase(&self) -> MovePhase {
        self.phase
    }

    pub fn before(&self) -> Option<&D> {
        self.before.as_ref()
    }

    /// Fails unless the cycle is in one of `allowed`.
    pub fn ensure_phase(
        &self,
        operation: &'static str,
        allowed: &[MovePhase],
    ) -> Result<(), EngineError> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(EngineError::Protocol {
                operation,
                phase: self.phase,
            })
        }
    }

    fn ensure_same_move(&self, operation: &'static str, reals: &[usize]) -> Result<(), EngineError> {
        if self.reals == reals {
            Ok(())
        } else {
            Err(EngineError::MoveMismatch { operation })
        }
    }

    /// Checks that an after-move evaluation may run for `reals`.
    pub fn ensure_after_move(&self, reals: &[usize]) -> Result<(), EngineError> {
        self.ensure_phase("compute_after_move", &[MovePhase::BeforeMove])?;
        self.ensure_same_move("compute_after_move", reals)
    }

    /// Opens a cycle with the data measured on current coordinates.
    pub fn begin(&mut self, reals: &[usize], before: D) -> Result<(), EngineError> {
        self.ensure_phase("compute_before_move", &[MovePhase::Idle])?;
        self.phase = MovePhase::BeforeMove;
        self.reals = reals.to_vec();
        self.before = Some(before);
        Ok(())
    }

    /// Records the data measured on trial coordinates and the tentative standard error.
    pub fn record_after(&mut self, reals: &[usize], after: D, tentative: f64) -> Result<(), EngineError> {
        self.ensure_after_move(reals)?;
        self.phase = MovePhase::AfterMove;
        self.after = Some(after);
        self.tentative = Some(tentative);
        Ok(())
    }

    /// Closes an evaluated cycle, handing back `(before, after, tentative)`.
    pub fn finish(&mut self, reals: &[usize]) -> Result<(D, D, f64), EngineError> {
        self.ensure_phase("accept_move", &[MovePhase::AfterMove])?;
        self.ensure_same_move("accept_move", reals)?;
        let cycle = std::mem::take(self);
        match (cycle.before, cycle.after, cycle.tentative) {
            (Some(before), Some(after), Some(tentative)) => Ok((before, after, tentative)),
            _ => Err(EngineError::Internal(
                "trial cycle in AfterMove phase without recorded data".to_string(),
            )),
        }
    }

    /// Discards an open cycle.
    pub fn abort(&mut self, reals: &[usize]) -> Result<(), EngineError> {
        self.ensure_phase("reject_move", &[MovePhase::BeforeMove, MovePhase::AfterMove])?;
        self.ensure_same_move("reject_move", reals)?;
        self.reset();
        Ok(())
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_cycle_walks_through_phases() {
        let mut cycle = TrialCycle::default();
        cycle.begin(&[1, 2], "before").unwrap();
        assert_eq!(cycle.phase(), MovePhase::BeforeMove);
        cycle.record_after(&[1, 2], "after", 0.5).unwrap();
        assert_eq!(cycle.phase(), MovePhase::AfterMove);
        assert_eq!(cycle.finish(&[1, 2]).unwrap(), ("before", "after", 0.5));
        assert_eq!(cycle.phase(), MovePhase::Idle);
        assert!(cycle.before().is_none());
    }

    #[test]
    fn out_of_order_calls_fail_without_changing_state() {
        let mut cycle: TrialCycle<u8> = TrialCycle::default();
        assert!(matches!(
            cycle.record_after(&[0], 1, 0.0),
            Err(EngineError::Protocol {
                operation: "compute_after_move",
                phase: MovePhase::Idle
            })
        ));
        assert!(cycle.abort(&[0]).is_err());

        cycle.begin(&[0], 1).unwrap();
        assert!(matches!(
            cycle.begin(&[0], 2),
            Err(EngineError::Protocol {
                phase: MovePhase::BeforeMove,
                ..
            })
        ));
        assert!(cycle.finish(&[0]).is_err());
        assert_eq!(cycle.before(), Some(&1));
    }

    #[test]
    fn mismatched_indexes_are_rejected() {
        let mut cycle = TrialCycle::default();
        cycle.begin(&[3], ()).unwrap();
        assert!(matches!(
            cycle.record_after(&[4], (), 0.0),
            Err(EngineError::MoveMismatch { .. })
        ));
        assert!(cycle.abort(&[4]).is_err());
        cycle.abort(&[3]).unwrap();
        assert_eq!(cycle.phase(), MovePhase::Idle);
    }
}
