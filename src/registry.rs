//! Type-tag to action lookup.
//!
//! Each action module contributes a [`Factory`] through its `register`
//! function; [`Factories::with_defaults`] calls those once at start-up and the
//! list is read-only afterwards. Lookup asks every factory in registration
//! order: [`FactoryError::Unknown`] means "not mine, ask the next one", any
//! other error stops the lookup.
use crate::action::{self, Action};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown action {0:?}")]
pub struct UnknownFactoryId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FactoryError {
    #[error(transparent)]
    Unknown(#[from] UnknownFactoryId),

    #[error("cannot build action {id:?}: {message}")]
    Failed { id: String, message: String },
}

impl FactoryError {
    pub fn unknown(id: &str) -> Self {
        FactoryError::Unknown(UnknownFactoryId(id.to_string()))
    }
}

/// Builds an empty, ready-to-populate action for the ids it recognizes.
pub type Factory = fn(&str) -> Result<Box<dyn Action>, FactoryError>;

#[derive(Default, Clone)]
pub struct Factories {
    factories: Vec<Factory>,
}

impl Factories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every action kind shipped with this crate.
    pub fn with_defaults() -> Self {
        let mut factories = Self::new();
        action::acl::register(&mut factories);
        action::external_node::register(&mut factories);
        action::kv::register(&mut factories);
        factories
    }

    pub fn register(&mut self, factory: Factory) {
        self.factories.push(factory);
    }

    /// Build a zeroed action for `id`.
    pub fn new_action(&self, id: &str) -> Result<Box<dyn Action>, FactoryError> {
        for factory in &self.factories {
            match factory(id) {
                Ok(action) => return Ok(action),
                Err(FactoryError::Unknown(_)) => continue,
                Err(err) => return Err(err),
            }
        }
        Err(FactoryError::unknown(id))
    }
}

impl std::fmt::Debug for Factories {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Factories")
            .field("count", &self.factories.len())
            .finish()
    }
}
