//! Ember Types
//!
//! This crate defines the value model shared by the Ember rules engine
//! crates: the [`FactValue`] enum facts are built from, the comparison
//! [`Operator`]s used by compiled conditions, and the conversions between
//! `FactValue` and `serde_json::Value` used at the integration boundary.

mod types;

pub use types::{FactValue, Operator};
