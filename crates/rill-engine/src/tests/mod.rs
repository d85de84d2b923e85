//! Tests for the rill-engine crate.

mod helpers;

mod basic;
