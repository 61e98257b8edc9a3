//! Registered entities and their chain addresses.
//!
//! Minting, consumption recording, and ownership checks all resolve an
//! entity id to its address here. Nothing chain-side is trusted to know
//! who "consumer:acme-1" is; this registry is the only mapping.

use alloy::primitives::Address;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Kind of a registered entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Producer,
    Project,
    Consumer,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Producer => write!(f, "producer"),
            EntityKind::Project => write!(f, "project"),
            EntityKind::Consumer => write!(f, "consumer"),
        }
    }
}

/// A registered entity with its on-chain address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// External identifier, e.g. "producer:5" or "consumer:acme-1".
    pub id: String,
    pub kind: EntityKind,
    /// Address used for mint targets and ownership lookups.
    pub eth_address: Address,
    /// Parent producer id, set for projects only.
    pub producer_id: Option<String>,
}

/// Errors from entity registration and lookup.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// An entity with this id already exists.
    #[error("entity '{0}' already registered")]
    Duplicate(String),

    /// No entity with this id.
    #[error("unknown entity '{0}'")]
    Unknown(String),

    /// Entity exists but is not the expected kind.
    #[error("entity '{id}' is a {actual}, expected {expected}")]
    WrongKind {
        id: String,
        expected: EntityKind,
        actual: EntityKind,
    },
}

/// Thread-safe registry of entities.
#[derive(Clone, Default)]
pub struct EntityRegistry {
    inner: Arc<DashMap<String, Entity>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a producer.
    pub fn add_producer(&self, id: &str, eth_address: Address) -> Result<(), RegistryError> {
        self.insert(Entity {
            id: id.to_string(),
            kind: EntityKind::Producer,
            eth_address,
            producer_id: None,
        })
    }

    /// Register a project under an existing producer.
    pub fn add_project(
        &self,
        id: &str,
        producer_id: &str,
        eth_address: Address,
    ) -> Result<(), RegistryError> {
        // Parent must exist and be a producer before the project is accepted.
        self.expect_kind(producer_id, EntityKind::Producer)?;
        self.insert(Entity {
            id: id.to_string(),
            kind: EntityKind::Project,
            eth_address,
            producer_id: Some(producer_id.to_string()),
        })
    }

    /// Register a consumer.
    pub fn add_consumer(&self, id: &str, eth_address: Address) -> Result<(), RegistryError> {
        self.insert(Entity {
            id: id.to_string(),
            kind: EntityKind::Consumer,
            eth_address,
            producer_id: None,
        })
    }

    fn insert(&self, entity: Entity) -> Result<(), RegistryError> {
        match self.inner.entry(entity.id.clone()) {
            dashmap::Entry::Occupied(_) => Err(RegistryError::Duplicate(entity.id)),
            dashmap::Entry::Vacant(slot) => {
                tracing::info!(
                    id = %entity.id,
                    kind = %entity.kind,
                    address = %entity.eth_address,
                    "Entity registered"
                );
                slot.insert(entity);
                Ok(())
            }
        }
    }

    /// Look up an entity by id.
    pub fn get(&self, id: &str) -> Option<Entity> {
        self.inner.get(id).map(|r| r.value().clone())
    }

    /// Look up an entity and require a specific kind.
    pub fn expect_kind(&self, id: &str, expected: EntityKind) -> Result<Entity, RegistryError> {
        let entity = self
            .get(id)
            .ok_or_else(|| RegistryError::Unknown(id.to_string()))?;
        if entity.kind != expected {
            return Err(RegistryError::WrongKind {
                id: id.to_string(),
                expected,
                actual: entity.kind,
            });
        }
        Ok(entity)
    }

    /// Number of registered entities.
    pub fn count(&self) -> usize {
        self.inner.len()
    }

    /// Per-kind counts for the admin view.
    pub fn summary(&self) -> (usize, usize, usize) {
        let mut producers = 0;
        let mut projects = 0;
        let mut consumers = 0;
        for r in self.inner.iter() {
            match r.value().kind {
                EntityKind::Producer => producers += 1,
                EntityKind::Project => projects += 1,
                EntityKind::Consumer => consumers += 1,
            }
        }
        (producers, projects, consumers)
    }
}
