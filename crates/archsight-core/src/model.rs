//! System model: the finished entity graph of one run.
//!
//! The model is an immutable snapshot built from a finalized
//! [`EntityRegistry`]. It is what crosses into rendering and serialization.
//!
//! ## Serialized shape
//!
//! A JSON array of records:
//!
//! ```json
//! [{"id": 0, "type": "controller", "label": "Orders",
//!   "children": {"endpoints": [1]},
//!   "properties": {"path": [{"type": "str", "value": "/orders"}]}}]
//! ```
//!
//! Property value order and child list order survive a round-trip.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::entity::{EntityId, EntityRegistry, EntityType};
use crate::error::{ArchError, Result};
use crate::value::PropertyValue;

/// One serialized entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: EntityId,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub label: String,
    #[serde(default)]
    pub children: BTreeMap<String, Vec<EntityId>>,
    #[serde(default)]
    pub properties: BTreeMap<String, Vec<PropertyValue>>,
}

impl EntityRecord {
    pub fn property(&self, key: &str) -> &[PropertyValue] {
        self.properties.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn children(&self, key: &str) -> &[EntityId] {
        self.children.get(key).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Finished entity graph, indexed by id and by type.
#[derive(Debug, Clone, Default)]
pub struct SystemModel {
    records: Vec<EntityRecord>,
    by_id: HashMap<EntityId, usize>,
    by_type: BTreeMap<EntityType, Vec<EntityId>>,
}

impl PartialEq for SystemModel {
    fn eq(&self, other: &Self) -> bool {
        self.records == other.records
    }
}

impl SystemModel {
    /// Snapshot a registry. Declared types without entities are kept.
    pub fn from_registry(registry: &EntityRegistry) -> Self {
        let records = registry
            .entities()
            .iter()
            .map(|entity| EntityRecord {
                id: entity.id,
                entity_type: entity.entity_type.clone(),
                label: entity.label.clone(),
                children: entity.children.clone(),
                properties: entity.properties.clone(),
            })
            .collect();
        let mut model = SystemModel::index(records);
        for entity_type in registry.types() {
            model.by_type.entry(entity_type.clone()).or_default();
        }
        model
    }

    /// Build a model from records, validating ids and child references.
    pub fn from_records(records: Vec<EntityRecord>) -> Result<Self> {
        let model = SystemModel::index(records);
        if model.by_id.len() != model.records.len() {
            return Err(ArchError::InvalidModel {
                message: "duplicate entity id".to_string(),
            });
        }
        for record in &model.records {
            for (key, children) in &record.children {
                if let Some(missing) = children.iter().find(|c| !model.by_id.contains_key(c)) {
                    return Err(ArchError::InvalidModel {
                        message: format!(
                            "entity {} references unknown child {} under '{}'",
                            record.id, missing, key
                        ),
                    });
                }
            }
        }
        Ok(model)
    }

    fn index(records: Vec<EntityRecord>) -> Self {
        let mut by_id = HashMap::with_capacity(records.len());
        let mut by_type: BTreeMap<EntityType, Vec<EntityId>> = BTreeMap::new();
        for (position, record) in records.iter().enumerate() {
            by_id.insert(record.id, position);
            by_type
                .entry(record.entity_type.clone())
                .or_default()
                .push(record.id);
        }
        SystemModel {
            records,
            by_id,
            by_type,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.records)?)
    }

    pub fn from_json(body: &str) -> Result<Self> {
        let records: Vec<EntityRecord> = serde_json::from_str(body)?;
        SystemModel::from_records(records)
    }

    pub fn records(&self) -> &[EntityRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn entity(&self, id: EntityId) -> Option<&EntityRecord> {
        self.by_id.get(&id).map(|&position| &self.records[position])
    }

    pub fn types(&self) -> impl Iterator<Item = &EntityType> {
        self.by_type.keys()
    }

    pub fn entities_of_type<'a>(
        &'a self,
        entity_type: &EntityType,
    ) -> impl Iterator<Item = &'a EntityRecord> + 'a {
        self.by_type
            .get(entity_type)
            .into_iter()
            .flatten()
            .filter_map(|id| self.entity(*id))
    }

    /// Children of `id` under `key`, resolved to records.
    pub fn children_of<'a>(
        &'a self,
        id: EntityId,
        key: &str,
    ) -> impl Iterator<Item = &'a EntityRecord> + 'a {
        self.entity(id)
            .map(|record| record.children(key))
            .unwrap_or(&[])
            .iter()
            .filter_map(|child| self.entity(*child))
    }

    /// Compare two models by `(type, label)`.
    ///
    /// Ids are run-local, so entities are matched by key and children are
    /// compared by the keys they point at.
    pub fn diff(&self, newer: &SystemModel) -> ModelDiff {
        let old = self.fingerprints();
        let new = newer.fingerprints();

        let mut diff = ModelDiff::default();
        for (key, prints) in &old {
            match new.get(key) {
                None => diff.removed.push(key.clone()),
                Some(other) if other != prints => diff.changed.push(key.clone()),
                Some(_) => {}
            }
        }
        for key in new.keys() {
            if !old.contains_key(key) {
                diff.added.push(key.clone());
            }
        }
        diff
    }

    fn key_of(&self, id: EntityId) -> Option<EntityKey> {
        self.entity(id).map(EntityKey::of)
    }

    fn fingerprints(&self) -> BTreeMap<EntityKey, Vec<Fingerprint>> {
        let mut prints: BTreeMap<EntityKey, Vec<Fingerprint>> = BTreeMap::new();
        for record in &self.records {
            let children = record
                .children
                .iter()
                .map(|(key, ids)| {
                    let keys: BTreeSet<EntityKey> =
                        ids.iter().filter_map(|id| self.key_of(*id)).collect();
                    (key.clone(), keys)
                })
                .collect();
            prints
                .entry(EntityKey::of(record))
                .or_default()
                .push(Fingerprint {
                    properties: record.properties.clone(),
                    children,
                });
        }
        for list in prints.values_mut() {
            list.sort();
        }
        prints
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Fingerprint {
    properties: BTreeMap<String, Vec<PropertyValue>>,
    children: BTreeMap<String, BTreeSet<EntityKey>>,
}

/// Run-independent identity of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub label: String,
}

impl EntityKey {
    fn of(record: &EntityRecord) -> Self {
        EntityKey {
            entity_type: record.entity_type.clone(),
            label: record.label.clone(),
        }
    }
}

/// Entities added, removed, or changed between two models.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModelDiff {
    pub added: Vec<EntityKey>,
    pub removed: Vec<EntityKey>,
    pub changed: Vec<EntityKey>,
}

impl ModelDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}
