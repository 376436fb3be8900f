use super::cell::SimulationBox;
use nalgebra::Point3;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Half-open distance window `[lower, upper)` of a coordination shell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShellWindow {
    pub lower: f64,
    pub upper: f64,
}

impl ShellWindow {
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    #[inline]
    pub fn contains(&self, distance: f64) -> bool {
        distance >= self.lower && distance < self.upper
    }
}

/// Raw output of the shell kernels.
///
/// Every qualifying ordered `(core, shell)` pair is counted exactly twice: once from the
/// core atom's perspective and once from the shell atom's. [`PairHits::into_count`] is
/// the only place where hits are turned into neighbour counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PairHits(u64);

impl PairHits {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    /// Normalizes doubled pair hits into a neighbour count.
    #[inline]
    pub fn into_count(self) -> f64 {
        self.0 as f64 / 2.0
    }
}

impl Add for PairHits {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for PairHits {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sum for PairHits {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), |acc, hits| acc + hits)
    }
}

/// Active atoms of one shell definition, expressed as relative indexes into the
/// current coordinate layout.
#[derive(Debug, Clone, Copy)]
pub struct ShellQuery<'a> {
    pub core: &'a [usize],
    pub shell: &'a [usize],
    pub window: ShellWindow,
}

/// Roles a moved atom plays in one shell definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShellRoles {
    pub as_core: bool,
    pub in_shell: bool,
}

#[inline]
fn weighted_neighbours<W>(
    positions: &[Point3<f64>],
    cell: &SimulationBox,
    atom: usize,
    partners: &[usize],
    window: ShellWindow,
    weight: W,
) -> u64
where
    W: Fn(usize) -> u64,
{
    let origin = &positions[atom];
    partners
        .iter()
        .filter(|&&partner| partner != atom)
        .filter(|&&partner| window.contains(cell.distance(origin, &positions[partner])))
        .map(|&partner| weight(partner))
        .sum()
}

/// Pair hits of a whole shell definition.
///
/// Core atoms count their shell neighbours and shell atoms count their core neighbours,
/// so the result is twice the number of ordered pairs inside the window.
pub fn full_pair_hits(
    positions: &[Point3<f64>],
    cell: &SimulationBox,
    query: &ShellQuery,
) -> PairHits {
    let as_core =
        |&c: &usize| weighted_neighbours(positions, cell, c, query.shell, query.window, |_| 1);
    let in_shell =
        |&s: &usize| weighted_neighbours(positions, cell, s, query.core, query.window, |_| 1);

    #[cfg(not(feature = "parallel"))]
    let hits: u64 = query.core.iter().map(as_core).sum::<u64>()
        + query.shell.iter().map(in_shell).sum::<u64>();

    #[cfg(feature = "parallel")]
    let hits: u64 = query.core.par_iter().map(as_core).sum::<u64>()
        + query.shell.par_iter().map(in_shell).sum::<u64>();

    PairHits(hits)
}

/// Pair hits contributed by a single moved atom.
///
/// `moved` flags every atom of the trial move by relative index. A partner that is not
/// moved is weighted 2 because nobody else will count the pair; a moved partner is
/// weighted 1 because it contributes the other half itself. Summed over all moved atoms
/// this yields the same doubled convention as [`full_pair_hits`], restricted to the pairs
/// touching the move.
pub fn moved_atom_pair_hits(
    positions: &[Point3<f64>],
    cell: &SimulationBox,
    query: &ShellQuery,
    atom: usize,
    roles: ShellRoles,
    moved: &[bool],
) -> PairHits {
    let weight = |partner: usize| {
        if moved.get(partner).copied().unwrap_or(false) {
            1
        } else {
            2
        }
    };

    let mut hits = 0;
    if roles.as_core {
        hits += weighted_neighbours(positions, cell, atom, query.shell, query.window, weight);
    }
    if roles.in_shell {
        hits += weighted_neighbours(positions, cell, atom, query.core, query.window, weight);
    }
    PairHits(hits)
}
