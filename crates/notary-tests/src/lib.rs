//! Integration and property tests for the notary.
//!
//! Exercises the store, the orchestrator, and the anchor contract together:
//! index round trips, range scans, concurrent writers and scanners, and the
//! persist-then-anchor lifecycle against a Rocks-backed store.

pub mod helpers;
