//! # Core Module
//!
//! Stateless building blocks of restraint evaluation.
//!
//! ## Overview
//!
//! Everything in this layer is a pure data structure or a pure function: atomic system
//! models, geometry kernels, definition compilation and standard-error aggregation. The
//! stateful move protocol lives in [`crate::engine`] and is built on top of these pieces.
//!
//! ## Architecture
//!
//! - **Models** ([`models`]) - Atom records, the atomic system and restraint identifiers
//! - **Geometry** ([`geometry`]) - Simulation box, shell pair counting and improper angles
//! - **Definitions** ([`definitions`]) - Selector resolution, membership index, compilers
//! - **Standard Error** ([`standard_error`]) - Per-restraint-kind scalar objectives

pub mod definitions;
pub mod geometry;
pub mod models;
pub mod standard_error;
