//! Entities: user-defined business objects bound to elements.
//!
//! An [`Entity`] has a type tag, a lazily computed label, ordered properties
//! and ordered named child lists. Every child link is bidirectional: linking
//! `parent[key] = child` also records `child["backtrack"] = parent`.
//!
//! The [`EntityRegistry`] enforces the binding rules:
//! - registering the same `(element, type)` twice yields one entity;
//! - in strict mode, registering a second type for an already bound element
//!   fails with [`ArchError::UniqueElementPerEntityViolation`] when the caller
//!   asks for it (`error_if_exists`);
//! - otherwise the element is rebound and the most recent registration wins.
//!
//! The registry only grows during a run. Labels are computed once, by
//! [`EntityRegistry::finalize`], after the pipeline completes.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use serde::{Deserialize, Serialize};

use crate::element::{Element, ElementStore};
use crate::error::{ArchError, Result};
use crate::value::PropertyValue;

/// Child key holding the inverse edge of every child link.
pub const BACKTRACK: &str = "backtrack";

/// String-keyed entity type tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityType(String);

impl EntityType {
    pub fn new(name: impl Into<String>) -> Self {
        EntityType(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityType {
    fn from(name: &str) -> Self {
        EntityType::new(name)
    }
}

/// Dense id of an entity within one run (and within a saved model).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u32);

impl EntityId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ent_{}", self.0)
    }
}

// ============================================================================
// Properties and labels
// ============================================================================

/// How a property write combines with existing values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStrategy {
    /// Drop existing values.
    Replace,
    /// Add after existing values.
    #[default]
    Append,
    /// Add before existing values.
    Prepend,
    /// Keep the first write, ignore later ones.
    Immutable,
    /// Append unless an equal value is present.
    Unique,
}

impl UpdateStrategy {
    /// Apply one write to a value list.
    pub fn apply(self, values: &mut Vec<PropertyValue>, value: PropertyValue) {
        match self {
            UpdateStrategy::Replace => {
                values.clear();
                values.push(value);
            }
            UpdateStrategy::Append => values.push(value),
            UpdateStrategy::Prepend => values.insert(0, value),
            UpdateStrategy::Immutable => {
                if values.is_empty() {
                    values.push(value);
                }
            }
            UpdateStrategy::Unique => {
                if !values.contains(&value) {
                    values.push(value);
                }
            }
        }
    }
}

/// How an entity label is computed at finalization.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum LabelFormatter {
    /// Display name of the bound element.
    #[default]
    ElementName,
    /// Values of one property, comma separated.
    Property(String),
    /// `${key}` placeholders replaced by property values; `${name}` falls back
    /// to the element display name.
    Template(String),
}

impl LabelFormatter {
    pub fn format(&self, entity: &Entity, element_name: Option<&str>) -> String {
        match self {
            LabelFormatter::ElementName => element_name.unwrap_or_default().to_string(),
            LabelFormatter::Property(key) => join(entity.property(key)),
            LabelFormatter::Template(template) => expand(template, |key| {
                let values = entity.property(key);
                if values.is_empty() && key == "name" {
                    element_name.unwrap_or_default().to_string()
                } else {
                    join(values)
                }
            }),
        }
    }
}

/// Replace `${key}` placeholders. An unterminated `${` is kept verbatim.
fn expand(template: &str, mut lookup: impl FnMut(&str) -> String) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                out.push_str(&lookup(&after[..end]));
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn join(values: &[PropertyValue]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

// ============================================================================
// Entity
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: EntityId,
    pub entity_type: EntityType,
    /// Bound element; `None` for entities loaded from a saved model.
    pub element: Option<Element>,
    pub label: String,
    pub properties: BTreeMap<String, Vec<PropertyValue>>,
    pub children: BTreeMap<String, Vec<EntityId>>,
}

impl Entity {
    fn new(id: EntityId, entity_type: EntityType, element: Option<Element>) -> Self {
        Entity {
            id,
            entity_type,
            element,
            label: String::new(),
            properties: BTreeMap::new(),
            children: BTreeMap::new(),
        }
    }

    pub fn property(&self, key: &str) -> &[PropertyValue] {
        self.properties.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn children(&self, key: &str) -> &[EntityId] {
        self.children.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    fn push_child(&mut self, key: &str, child: EntityId) -> bool {
        let list = self.children.entry(key.to_string()).or_default();
        if list.contains(&child) {
            return false;
        }
        list.push(child);
        true
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Entity storage and element bindings for one run.
#[derive(Debug)]
pub struct EntityRegistry {
    entities: Vec<Entity>,
    by_element: HashMap<Element, EntityId>,
    /// Declared types, including ones that matched nothing.
    by_type: BTreeMap<EntityType, Vec<EntityId>>,
    formatters: HashMap<EntityType, LabelFormatter>,
    strict: bool,
    finalized: bool,
}

impl Default for EntityRegistry {
    fn default() -> Self {
        EntityRegistry::new(true)
    }
}

impl EntityRegistry {
    pub fn new(strict: bool) -> Self {
        EntityRegistry {
            entities: Vec::new(),
            by_element: HashMap::new(),
            by_type: BTreeMap::new(),
            formatters: HashMap::new(),
            strict,
            finalized: false,
        }
    }

    /// Record an entity type as registered, with an optional label formatter.
    pub fn declare(&mut self, entity_type: &EntityType, label: Option<&LabelFormatter>) {
        self.by_type.entry(entity_type.clone()).or_default();
        if let Some(label) = label {
            self.formatters.insert(entity_type.clone(), label.clone());
        }
    }

    pub fn is_declared(&self, entity_type: &EntityType) -> bool {
        self.by_type.contains_key(entity_type)
    }

    /// Fail unless the type was declared.
    pub fn require_declared(&self, entity_type: &EntityType) -> Result<()> {
        if self.is_declared(entity_type) {
            Ok(())
        } else {
            Err(ArchError::not_registered(entity_type))
        }
    }

    pub fn types(&self) -> impl Iterator<Item = &EntityType> {
        self.by_type.keys()
    }

    /// Bind an element to an entity of `entity_type`.
    pub fn register(
        &mut self,
        store: &ElementStore,
        element: Element,
        entity_type: &EntityType,
        error_if_exists: bool,
    ) -> Result<EntityId> {
        let anchor = store.anchor(element);
        self.declare(entity_type, None);

        if let Some(&existing) = self.by_element.get(&anchor) {
            let existing_type = &self.entities[existing.index()].entity_type;
            if existing_type == entity_type {
                return Ok(existing);
            }
            if error_if_exists && self.strict {
                return Err(ArchError::UniqueElementPerEntityViolation {
                    element: store.describe(anchor),
                    existing: existing_type.to_string(),
                    requested: entity_type.to_string(),
                });
            }
            tracing::warn!(
                "rebinding {} from '{}' to '{}'",
                store.describe(anchor),
                existing_type,
                entity_type
            );
            self.retype(existing, entity_type);
            return Ok(existing);
        }

        let id = EntityId(self.entities.len() as u32);
        self.entities
            .push(Entity::new(id, entity_type.clone(), Some(anchor)));
        self.by_element.insert(anchor, id);
        self.by_type.entry(entity_type.clone()).or_default().push(id);
        tracing::trace!("registered {} as '{}' ({})", store.describe(anchor), entity_type, id);
        Ok(id)
    }

    /// Move an entity to another type, keeping its id, element and links.
    fn retype(&mut self, id: EntityId, entity_type: &EntityType) {
        let previous = &self.entities[id.index()].entity_type;
        if let Some(ids) = self.by_type.get_mut(previous) {
            ids.retain(|&other| other != id);
        }
        self.entities[id.index()].entity_type = entity_type.clone();
        self.by_type.entry(entity_type.clone()).or_default().push(id);
    }

    pub fn entity(&self, id: EntityId) -> &Entity {
        &self.entities[id.index()]
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entity bound to an anchored element.
    pub fn entity_of(&self, element: Element) -> Option<EntityId> {
        self.by_element.get(&element).copied()
    }

    /// Entity bound to an anchored element, if it has the given type.
    pub fn entity_of_type(&self, element: Element, entity_type: &EntityType) -> Option<EntityId> {
        self.entity_of(element)
            .filter(|id| &self.entities[id.index()].entity_type == entity_type)
    }

    /// Entities of one type, in registration order.
    pub fn entities_of_type(&self, entity_type: &EntityType) -> &[EntityId] {
        self.by_type
            .get(entity_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// `(element, entity)` pairs of one type.
    pub fn registered<'a>(
        &'a self,
        entity_type: &EntityType,
    ) -> impl Iterator<Item = (Element, EntityId)> + 'a {
        self.entities_of_type(entity_type)
            .iter()
            .filter_map(|id| self.entities[id.index()].element.map(|e| (e, *id)))
    }

    /// Link `parent[key] = child` and `child["backtrack"] = parent`.
    ///
    /// Returns false when the link already existed.
    pub fn add_child(&mut self, parent: EntityId, key: &str, child: EntityId) -> bool {
        let added = self.entities[parent.index()].push_child(key, child);
        self.entities[child.index()].push_child(BACKTRACK, parent);
        added
    }

    pub fn set_property(
        &mut self,
        id: EntityId,
        key: &str,
        value: PropertyValue,
        strategy: UpdateStrategy,
    ) {
        let values = self.entities[id.index()]
            .properties
            .entry(key.to_string())
            .or_default();
        strategy.apply(values, value);
    }

    /// Compute labels. Only the first call has an effect.
    pub fn finalize(&mut self, store: &ElementStore) {
        if self.finalized {
            return;
        }
        for entity in &mut self.entities {
            let formatter = self
                .formatters
                .get(&entity.entity_type)
                .cloned()
                .unwrap_or_default();
            let name = entity.element.map(|e| store.display_name(e));
            entity.label = formatter.format(entity, name.as_deref());
        }
        self.finalized = true;
        tracing::debug!("finalized {} entities", self.entities.len());
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{ClassDecl, MethodDecl};

    fn store() -> ElementStore {
        ElementStore::from_classes(vec![ClassDecl::new("com/example/Orders")
            .with_method(MethodDecl::new("list", "()V"))])
    }

    fn class(store: &ElementStore) -> Element {
        Element::Class(store.input_classes()[0])
    }

    mod registration_tests {
        use super::*;

        #[test]
        fn same_type_twice_is_one_entity() {
            let store = store();
            let mut registry = EntityRegistry::new(true);
            let a: EntityType = "a".into();

            let first = registry.register(&store, class(&store), &a, true).unwrap();
            let second = registry.register(&store, class(&store), &a, true).unwrap();

            assert_eq!(first, second);
            assert_eq!(registry.len(), 1);
            assert_eq!(registry.entities_of_type(&a), &[first]);
        }

        #[test]
        fn second_type_is_a_violation() {
            let store = store();
            let mut registry = EntityRegistry::new(true);
            registry
                .register(&store, class(&store), &"a".into(), true)
                .unwrap();

            let err = registry
                .register(&store, class(&store), &"b".into(), true)
                .unwrap_err();
            assert!(matches!(err, ArchError::UniqueElementPerEntityViolation { .. }));
        }

        #[test]
        fn non_strict_rebinds_to_latest() {
            let store = store();
            let mut registry = EntityRegistry::new(false);
            let (a, b): (EntityType, EntityType) = ("a".into(), "b".into());
            let first = registry.register(&store, class(&store), &a, true).unwrap();
            let rebound = registry.register(&store, class(&store), &b, true).unwrap();

            assert_eq!(rebound, first);
            assert_eq!(registry.entity_of(class(&store)), Some(first));
            assert_eq!(registry.entity(first).entity_type, b);
            assert_eq!(registry.len(), 1);
            assert!(registry.entities_of_type(&a).is_empty());
            assert_eq!(registry.entities_of_type(&b), &[first]);
        }

        #[test]
        fn rebinding_back_reuses_the_entity() {
            let store = store();
            let mut registry = EntityRegistry::new(false);
            let (a, b): (EntityType, EntityType) = ("a".into(), "b".into());
            let first = registry.register(&store, class(&store), &a, true).unwrap();
            registry.register(&store, class(&store), &b, true).unwrap();
            let back = registry.register(&store, class(&store), &a, true).unwrap();

            assert_eq!(back, first);
            assert_eq!(registry.len(), 1);
            assert_eq!(registry.entities_of_type(&a), &[first]);
            assert!(registry.entities_of_type(&b).is_empty());
            assert!(registry.is_declared(&b));
        }

        #[test]
        fn declared_without_matches() {
            let mut registry = EntityRegistry::default();
            let t: EntityType = "endpoint".into();
            assert!(registry.require_declared(&t).is_err());
            registry.declare(&t, None);
            assert!(registry.require_declared(&t).is_ok());
            assert!(registry.entities_of_type(&t).is_empty());
        }
    }

    mod children_tests {
        use super::*;

        #[test]
        fn add_child_links_backtrack_once() {
            let store = store();
            let controller = Element::Class(store.input_classes()[0]);
            let method = Element::Method(store.class(store.input_classes()[0]).methods[0]);
            let mut registry = EntityRegistry::default();
            let parent = registry
                .register(&store, controller, &"controller".into(), true)
                .unwrap();
            let child = registry
                .register(&store, method, &"endpoint".into(), true)
                .unwrap();

            assert!(registry.add_child(parent, "endpoints", child));
            assert!(!registry.add_child(parent, "endpoints", child));

            assert_eq!(registry.entity(parent).children("endpoints"), &[child]);
            assert_eq!(registry.entity(child).children(BACKTRACK), &[parent]);
        }
    }

    mod property_tests {
        use super::*;

        fn apply_all(strategy: UpdateStrategy) -> Vec<PropertyValue> {
            let mut values = Vec::new();
            for v in ["a", "b", "a"] {
                strategy.apply(&mut values, PropertyValue::from(v));
            }
            values
        }

        #[test]
        fn strategies() {
            let s = |v: &str| PropertyValue::from(v);
            assert_eq!(apply_all(UpdateStrategy::Replace), vec![s("a")]);
            assert_eq!(apply_all(UpdateStrategy::Append), vec![s("a"), s("b"), s("a")]);
            assert_eq!(apply_all(UpdateStrategy::Prepend), vec![s("a"), s("b"), s("a")]);
            assert_eq!(apply_all(UpdateStrategy::Immutable), vec![s("a")]);
            assert_eq!(apply_all(UpdateStrategy::Unique), vec![s("a"), s("b")]);
        }

        #[test]
        fn labels_from_templates() {
            let store = store();
            let mut registry = EntityRegistry::default();
            let t: EntityType = "controller".into();
            registry.declare(&t, Some(&LabelFormatter::Template("${name} ${path}".into())));
            let id = registry.register(&store, class(&store), &t, true).unwrap();
            registry.set_property(id, "path", "/orders".into(), UpdateStrategy::Append);

            registry.finalize(&store);

            assert_eq!(registry.entity(id).label, "Orders /orders");
        }

        #[test]
        fn unterminated_placeholder_is_verbatim() {
            assert_eq!(expand("a ${b", |_| "x".into()), "a ${b");
            assert_eq!(expand("${k}-${k}", |k| k.to_uppercase()), "K-K");
        }

        #[test]
        fn default_label_is_element_name() {
            let store = store();
            let mut registry = EntityRegistry::default();
            let id = registry
                .register(&store, class(&store), &"x".into(), true)
                .unwrap();
            registry.finalize(&store);
            assert_eq!(registry.entity(id).label, "Orders");
        }
    }
}
