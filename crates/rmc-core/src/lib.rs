//! # RMC Core Library
//!
//! Incremental restraint evaluation for Reverse Monte Carlo refinement of atomic
//! structures.
//!
//! ## Architectural Philosophy
//!
//! The library follows a strict three-layer architecture.
//!
//! - **[`core`]: The Foundation.** Stateless models (`AtomicSystem`), periodic geometry
//!   kernels, definition compilation and the standard-error aggregator.
//!
//! - **[`engine`]: The Logic Core.** The stateful trial-move protocol. Restraints keep
//!   committed data consistent with exploratory trial data, collect and restore atoms
//!   without renumbering their index tables, and are dispatched together by a
//!   `RestraintSet` that owns the shared coordinate store.
//!
//! - **[`workflows`]: The Public API.** Complete procedures built on the engine, such as
//!   evaluating every restraint of a system in one call.

pub mod core;
pub mod engine;
pub mod workflows;
