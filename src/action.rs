//! The action model.
//!
//! An action is one declarative unit of change against the cluster. Every
//! kind carries a type tag used in source files, validates itself locally,
//! describes itself for progress output, and applies itself through a
//! [`Context`]. Kinds live in their own modules and register a factory with
//! the [`crate::registry::Factories`] list; nothing here enumerates them.
use crate::cluster::{Cluster, ClusterError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;

pub mod acl;
pub mod external_node;
pub mod kv;

/// An ordered list of actions; order is the apply order.
pub type Actions = Vec<Box<dyn Action>>;

/// What an action is given to do its work.
pub struct Context<'a> {
    pub cluster: &'a mut dyn Cluster,
}

impl<'a> Context<'a> {
    pub fn new(cluster: &'a mut dyn Cluster) -> Self {
        Self { cluster }
    }
}

/// Result of a successful `apply`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    /// Nothing was changed; the reason is shown on the progress line.
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field} {problem}")]
pub struct ValidationError {
    pub field: String,
    pub problem: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, problem: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            problem: problem.into(),
        }
    }

    pub fn empty(field: impl Into<String>) -> Self {
        Self::new(field, "must not be empty")
    }
}

/// Moves an action's fields in and out of the `Config` object of a record.
///
/// Implemented for every serde type, so action kinds only derive
/// `Serialize`/`Deserialize`.
pub trait ActionConfig {
    /// Replace all fields with the ones decoded from `config`.
    fn decode_config(&mut self, config: serde_json::Value) -> serde_json::Result<()>;
    fn encode_config(&self) -> serde_json::Result<serde_json::Value>;
}

impl<T> ActionConfig for T
where
    T: Serialize + DeserializeOwned,
{
    fn decode_config(&mut self, config: serde_json::Value) -> serde_json::Result<()> {
        *self = serde_json::from_value(config)?;
        Ok(())
    }

    fn encode_config(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

pub trait Action: ActionConfig + fmt::Display + fmt::Debug {
    /// Type tag used in the `Action` field of a record.
    fn kind(&self) -> &'static str;

    /// Local check of required fields; never touches the cluster.
    fn validate(&self) -> Result<(), ValidationError>;

    fn apply(&self, ctx: &mut Context<'_>) -> Result<Outcome, ClusterError>;
}

/// Fail with `field` when `value` is empty.
pub(crate) fn require(value: &str, field: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::empty(field));
    }
    Ok(())
}
