//! Error types for session operations.
//!
//! The engine distinguishes four failure classes: inserting a fact that is
//! already present, updating or retracting a fact the session does not know,
//! a predicate (or key selector, binding, aggregator) failing during
//! propagation, and an action failing during fire. Host-supplied code fails
//! with arbitrary [`anyhow::Error`] payloads; the engine wraps them with the
//! context needed to locate the failure.

use std::sync::Arc;
use thiserror::Error;

/// Error raised by session operations.
///
/// Host failures are kept behind `Arc` so the same cause can travel both in
/// the returned error and in the failure event observers receive.
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    /// Strict insert of a fact that is already in working memory.
    #[error("fact already exists: {fact_type} [{key}]")]
    AlreadyExists { fact_type: String, key: String },

    /// Strict update/retract of a fact the session does not hold.
    #[error("unknown fact: {fact_type} [{key}]")]
    UnknownFact { fact_type: String, key: String },

    /// A predicate, key selector, binding expression or aggregator failed
    /// while the network was propagating a change.
    #[error("condition evaluation failed at {location}: {cause}")]
    Condition { location: String, cause: Arc<anyhow::Error> },

    /// A rule action failed during fire.
    #[error("action evaluation failed in rule '{rule}': {cause}")]
    Action { rule: String, cause: Arc<anyhow::Error> },

    /// Malformed network construction (unknown declaration, missing parent).
    #[error("network error: {message}")]
    Network { message: String },
}

impl EngineError {
    pub fn already_exists(fact_type: impl Into<String>, key: impl Into<String>) -> Self {
        Self::AlreadyExists { fact_type: fact_type.into(), key: key.into() }
    }

    pub fn unknown_fact(fact_type: impl Into<String>, key: impl Into<String>) -> Self {
        Self::UnknownFact { fact_type: fact_type.into(), key: key.into() }
    }

    pub fn condition(location: impl Into<String>, cause: Arc<anyhow::Error>) -> Self {
        Self::Condition { location: location.into(), cause }
    }

    pub fn action(rule: impl Into<String>, cause: Arc<anyhow::Error>) -> Self {
        Self::Action { rule: rule.into(), cause }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into() }
    }

    /// Stable category tag used in events and logs.
    pub fn category(&self) -> &'static str {
        match self {
            Self::AlreadyExists { .. } => "already_exists",
            Self::UnknownFact { .. } => "unknown_fact",
            Self::Condition { .. } => "condition_evaluation",
            Self::Action { .. } => "action_evaluation",
            Self::Network { .. } => "network",
        }
    }
}

/// Convenience alias used throughout the engine.
pub type SessionResult<T> = Result<T, EngineError>;
