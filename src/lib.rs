//! Declarative employee rostering.
//!
//! A scheduling spec (identifier sets, shift templates, coverage demand,
//! hard and soft rules) is validated, normalized, lowered into a CP model
//! over Boolean assignment variables, solved, and projected back into a
//! day/site/shift-grouped schedule. An axum REST surface wraps the
//! pipeline with synchronous solve, validate-only, and background jobs.

pub mod api;
pub mod cp;
pub mod demo_data;
pub mod lattice;
pub mod lower;
pub mod normalize;
pub mod schedule;
pub mod solver;
pub mod spec;
pub mod validate;
