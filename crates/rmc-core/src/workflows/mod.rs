//! # Workflows Module
//!
//! Complete procedures built on the restraint engine.
//!
//! ## Overview
//!
//! Workflows are the entry points for callers that do not drive the move protocol
//! themselves. They take an atomic system and a plan of restraint definitions, set up a
//! [`RestraintSet`](crate::engine::registry::RestraintSet), and return a self-contained
//! report.
//!
//! ## Architecture
//!
//! - **Evaluation Workflow** ([`evaluate`]) - Compiles every definition of a plan,
//!   computes committed data and reports per-definition values and standard errors,
//!   or only validates the plan without computing anything.

pub mod evaluate;
