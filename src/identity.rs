//! Actor identity resolution.
//!
//! The engine only needs to know whether an actor is an animal owner (has a parent profile)
//! or clinic staff. Real deployments plug in their own resolver.

use serde::{Deserialize, Serialize};

use crate::db::Database;
use crate::error::StoreError;

/// Owner profile linked to an authenticated actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentProfile {
    pub id: String,
    pub actor_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// What the resolver knows about an actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub parent_id: Option<String>,
}

pub trait IdentityResolver {
    /// `None` when the actor cannot be resolved to a usable identity.
    fn resolve(&self, actor_id: &str) -> Result<Option<Identity>, StoreError>;
}

impl IdentityResolver for Database {
    fn resolve(&self, actor_id: &str) -> Result<Option<Identity>, StoreError> {
        if actor_id.trim().is_empty() {
            return Ok(None);
        }
        let parent_id = self
            .parents
            .iter()
            .find(|p| p.actor_id == actor_id)
            .map(|p| p.id.clone());
        Ok(Some(Identity { parent_id }))
    }
}
