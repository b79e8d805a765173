//! Trace registry: why each element was reached.
//!
//! Every traversal step reports a `(from, to)` transition. The registry keeps,
//! per element, the distinct paths ("traces") from some traversal root to that
//! element. Relationship resolution between entities is computed from these
//! traces.
//!
//! ## Layout
//!
//! Elements are assigned a dense [`TraceId`] the first time they are
//! sanitized. Ids index plain vectors: per-kind slot tables map arena ids to
//! trace ids, and trace sets are stored by trace id. Nothing is hashed.
//!
//! ## Insertion policy
//!
//! - A transition whose source trace already contains the target is a cycle
//!   and is dropped.
//! - Sanitizing an untraced element seeds it with the singleton trace; the
//!   seed is replaced by the first real incoming trace.
//! - A candidate comparable to a stored trace (subset or superset) is
//!   redundant and dropped, so stored traces stay pairwise incomparable and
//!   the number of traces per element never decreases.

use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use serde::Serialize;

use crate::element::{Element, ElementStore};
use crate::entity::{EntityId, EntityRegistry, EntityType};

/// Dense id of a sanitized element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TraceId(pub u32);

impl TraceId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

// ============================================================================
// ElementTrace
// ============================================================================

#[derive(Debug)]
struct Link {
    id: TraceId,
    next: Option<Rc<Link>>,
}

/// One immutable path of element ids, newest first.
///
/// Traces share their tails, so extending a trace is a single allocation.
#[derive(Clone, Default)]
pub struct ElementTrace {
    head: Option<Rc<Link>>,
    len: usize,
}

impl ElementTrace {
    /// Singleton trace.
    pub fn root(id: TraceId) -> Self {
        ElementTrace::default().extend(id)
    }

    /// New trace with `id` prepended.
    pub fn extend(&self, id: TraceId) -> Self {
        ElementTrace {
            head: Some(Rc::new(Link {
                id,
                next: self.head.clone(),
            })),
            len: self.len + 1,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Newest id.
    pub fn head(&self) -> Option<TraceId> {
        self.head.as_ref().map(|link| link.id)
    }

    pub fn iter(&self) -> TraceIter<'_> {
        TraceIter {
            next: self.head.as_deref(),
        }
    }

    pub fn contains(&self, id: TraceId) -> bool {
        self.iter().any(|t| t == id)
    }

    /// True when every id of `self` appears in `other`.
    pub fn is_subset_of(&self, other: &ElementTrace) -> bool {
        if self.len > other.len {
            return false;
        }
        if other.len <= 8 {
            return self.iter().all(|id| other.contains(id));
        }
        let ids: HashSet<TraceId> = other.iter().collect();
        self.iter().all(|id| ids.contains(&id))
    }
}

impl PartialEq for ElementTrace {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().eq(other.iter())
    }
}

impl Eq for ElementTrace {}

impl fmt::Debug for ElementTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Iterator over a trace, newest first.
pub struct TraceIter<'a> {
    next: Option<&'a Link>,
}

impl Iterator for TraceIter<'_> {
    type Item = TraceId;

    fn next(&mut self) -> Option<TraceId> {
        let link = self.next?;
        self.next = link.next.as_deref();
        Some(link.id)
    }
}

// ============================================================================
// Slot table
// ============================================================================

/// Per-kind arena id → trace id.
#[derive(Debug, Default)]
struct SlotTable {
    classes: Vec<Option<TraceId>>,
    methods: Vec<Option<TraceId>>,
    fields: Vec<Option<TraceId>>,
    parameters: Vec<Option<TraceId>>,
    signatures: Vec<Option<TraceId>>,
}

impl SlotTable {
    fn column(&self, element: Element) -> Option<(&Vec<Option<TraceId>>, usize)> {
        match element {
            Element::Class(id) => Some((&self.classes, id.index())),
            Element::Method(id) => Some((&self.methods, id.index())),
            Element::Field(id) => Some((&self.fields, id.index())),
            Element::Parameter(id) => Some((&self.parameters, id.index())),
            Element::Signature(id) => Some((&self.signatures, id.index())),
            Element::Annotation(_) | Element::Value(_) => None,
        }
    }

    fn get(&self, element: Element) -> Option<TraceId> {
        let (column, index) = self.column(element)?;
        column.get(index).copied().flatten()
    }

    fn set(&mut self, element: Element, id: TraceId) {
        let (column, index) = match element {
            Element::Class(c) => (&mut self.classes, c.index()),
            Element::Method(m) => (&mut self.methods, m.index()),
            Element::Field(f) => (&mut self.fields, f.index()),
            Element::Parameter(p) => (&mut self.parameters, p.index()),
            Element::Signature(s) => (&mut self.signatures, s.index()),
            Element::Annotation(_) | Element::Value(_) => return,
        };
        if column.len() <= index {
            column.resize(index + 1, None);
        }
        column[index] = Some(id);
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Summary counters for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TraceStats {
    pub elements: usize,
    pub traces: usize,
    pub max_traces_per_element: usize,
    pub dropped: usize,
}

/// Trace sets for every element reached by the pipeline.
#[derive(Debug, Default)]
pub struct TraceRegistry {
    slots: SlotTable,
    /// trace id → anchor element.
    elements: Vec<Element>,
    /// trace id → stored traces.
    traces: Vec<Vec<ElementTrace>>,
    /// trace id → set holds only the singleton seed.
    seeded: Vec<bool>,
    max_traces_per_element: Option<usize>,
    dropped: usize,
}

impl TraceRegistry {
    pub fn new() -> Self {
        TraceRegistry::default()
    }

    /// Cap the number of traces kept per element; `0` means no cap.
    pub fn with_max_traces_per_element(mut self, max: Option<usize>) -> Self {
        self.max_traces_per_element = max.filter(|&max| max > 0);
        self
    }

    /// Trace id of an already sanitized element.
    pub fn id_of(&self, store: &ElementStore, element: Element) -> Option<TraceId> {
        self.slots.get(store.anchor(element))
    }

    /// Element behind a trace id.
    pub fn element(&self, id: TraceId) -> Element {
        self.elements[id.index()]
    }

    fn slot(&mut self, store: &ElementStore, element: Element) -> TraceId {
        let anchor = store.anchor(element);
        if let Some(id) = self.slots.get(anchor) {
            return id;
        }
        let id = TraceId(self.elements.len() as u32);
        self.slots.set(anchor, id);
        self.elements.push(anchor);
        self.traces.push(Vec::new());
        self.seeded.push(false);
        id
    }

    /// Canonical trace id of an element.
    ///
    /// Values and annotations resolve to their anchor element. An element
    /// without traces is seeded with its singleton trace.
    pub fn sanitize(&mut self, store: &ElementStore, element: Element) -> TraceId {
        let id = self.slot(store, element);
        if self.traces[id.index()].is_empty() {
            self.traces[id.index()].push(ElementTrace::root(id));
            self.seeded[id.index()] = true;
        }
        id
    }

    /// Record that the pipeline moved from `from` to `to`.
    pub fn register_transition(&mut self, store: &ElementStore, from: Element, to: Element) {
        let from_id = self.sanitize(store, from);
        let to_id = self.slot(store, to);
        if from_id == to_id {
            return;
        }

        let candidates: Vec<ElementTrace> = self.traces[from_id.index()]
            .iter()
            .filter(|trace| !trace.contains(to_id))
            .map(|trace| trace.extend(to_id))
            .collect();

        for candidate in candidates {
            self.insert(to_id, candidate);
        }
    }

    fn insert(&mut self, id: TraceId, candidate: ElementTrace) {
        let index = id.index();
        if self.seeded[index] {
            self.traces[index].clear();
            self.traces[index].push(candidate);
            self.seeded[index] = false;
            return;
        }

        let set = &mut self.traces[index];
        let redundant = set
            .iter()
            .any(|stored| stored.is_subset_of(&candidate) || candidate.is_subset_of(stored));
        if redundant {
            return;
        }
        if self.max_traces_per_element.is_some_and(|max| set.len() >= max) {
            self.dropped += 1;
            tracing::trace!("trace cap reached for {}, dropping trace", id);
            return;
        }
        set.push(candidate);
    }

    /// Stored traces of an element (empty if never reached).
    pub fn traces(&self, store: &ElementStore, element: Element) -> &[ElementTrace] {
        match self.id_of(store, element) {
            Some(id) => &self.traces[id.index()],
            None => &[],
        }
    }

    /// Traces of an element as element paths, newest first.
    ///
    /// An element never reached by the pipeline yields its singleton path.
    pub fn traces_of(&self, store: &ElementStore, element: Element) -> Vec<Vec<Element>> {
        let traces = self.traces(store, element);
        if traces.is_empty() {
            return vec![vec![store.anchor(element)]];
        }
        traces
            .iter()
            .map(|trace| trace.iter().map(|id| self.element(id)).collect())
            .collect()
    }

    /// Entities of `entity_type` related to `element` through traces.
    ///
    /// Combines two searches:
    /// - forward: along each trace of `element`, the first element bound to
    ///   an entity of `entity_type`;
    /// - reverse: entities of `entity_type` whose own traces pass through
    ///   `element`.
    ///
    /// The result is deduplicated and ordered by entity id.
    pub fn find_related_entities(
        &self,
        store: &ElementStore,
        element: Element,
        entity_type: &EntityType,
        entities: &EntityRegistry,
    ) -> Vec<EntityId> {
        let anchor = store.anchor(element);
        let mut related: Vec<EntityId> = Vec::new();

        // forward
        let traces = self.traces(store, anchor);
        if traces.is_empty() {
            if let Some(entity) = entities.entity_of_type(anchor, entity_type) {
                related.push(entity);
            }
        }
        for trace in traces {
            let found = trace
                .iter()
                .find_map(|id| entities.entity_of_type(self.element(id), entity_type));
            if let Some(entity) = found {
                related.push(entity);
            }
        }

        // reverse
        if let Some(query) = self.id_of(store, anchor) {
            for (candidate_element, entity) in entities.registered(entity_type) {
                let passes_through = self
                    .traces(store, candidate_element)
                    .iter()
                    .any(|trace| trace.contains(query));
                if passes_through {
                    related.push(entity);
                }
            }
        }

        related.sort();
        related.dedup();
        related
    }

    pub fn stats(&self) -> TraceStats {
        TraceStats {
            elements: self.elements.len(),
            traces: self.traces.iter().map(Vec::len).sum(),
            max_traces_per_element: self.traces.iter().map(Vec::len).max().unwrap_or(0),
            dropped: self.dropped,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{ClassDecl, FieldDecl, MethodDecl};
    use crate::value::PropertyValue;

    fn store() -> ElementStore {
        ElementStore::from_classes(vec![
            ClassDecl::new("a/Controller")
                .with_method(MethodDecl::new("get", "()V"))
                .with_method(MethodDecl::new("post", "()V"))
                .with_field(FieldDecl::new("repo", "La/Repo;")),
            ClassDecl::new("a/Repo").with_method(MethodDecl::new("save", "()V")),
        ])
    }

    fn ids(store: &ElementStore) -> (Element, Element, Element, Element, Element) {
        let controller = store.input_classes()[0];
        let repo = store.input_classes()[1];
        let node = store.class(controller);
        (
            Element::Class(controller),
            Element::Method(node.methods[0]),
            Element::Method(node.methods[1]),
            Element::Field(node.fields[0]),
            Element::Class(repo),
        )
    }

    mod element_trace_tests {
        use super::*;

        #[test]
        fn extend_prepends_and_shares() {
            let root = ElementTrace::root(TraceId(0));
            let a = root.extend(TraceId(1));
            let b = root.extend(TraceId(2));

            assert_eq!(a.iter().collect::<Vec<_>>(), vec![TraceId(1), TraceId(0)]);
            assert_eq!(b.head(), Some(TraceId(2)));
            assert_eq!(root.len(), 1);
            assert!(root.is_subset_of(&a));
            assert!(!a.is_subset_of(&b));
        }

        #[test]
        fn subset_of_long_trace() {
            let mut long = ElementTrace::root(TraceId(0));
            for i in 1..20 {
                long = long.extend(TraceId(i));
            }
            let short = ElementTrace::root(TraceId(19)).extend(TraceId(3));
            assert!(short.is_subset_of(&long));
            assert!(!long.is_subset_of(&short));
        }
    }

    mod registry_tests {
        use super::*;

        #[test]
        fn transition_extends_every_source_trace() {
            let store = store();
            let (controller, get, _, _, _) = ids(&store);
            let mut registry = TraceRegistry::new();

            registry.register_transition(&store, controller, get);

            assert_eq!(
                registry.traces_of(&store, get),
                vec![vec![get, controller]]
            );
            assert_eq!(registry.traces_of(&store, controller), vec![vec![controller]]);
        }

        #[test]
        fn self_transition_is_noop() {
            let store = store();
            let (controller, _, _, _, _) = ids(&store);
            let mut registry = TraceRegistry::new();
            registry.register_transition(&store, controller, controller);
            assert_eq!(registry.traces(&store, controller).len(), 1);
        }

        #[test]
        fn seed_is_replaced_by_incoming_trace() {
            let store = store();
            let (controller, _, _, field, repo) = ids(&store);
            let mut registry = TraceRegistry::new();

            registry.sanitize(&store, repo);
            registry.register_transition(&store, controller, field);
            registry.register_transition(&store, field, repo);

            assert_eq!(
                registry.traces_of(&store, repo),
                vec![vec![repo, field, controller]]
            );
        }

        #[test]
        fn cycles_are_dropped() {
            let store = store();
            let (controller, get, _, _, _) = ids(&store);
            let mut registry = TraceRegistry::new();

            registry.register_transition(&store, controller, get);
            registry.register_transition(&store, get, controller);

            assert_eq!(registry.traces_of(&store, controller), vec![vec![controller]]);
        }

        #[test]
        fn subsumed_traces_are_pruned_and_counts_never_decrease() {
            let store = store();
            let (controller, get, post, field, repo) = ids(&store);
            let mut registry = TraceRegistry::new();

            registry.register_transition(&store, controller, get);
            registry.register_transition(&store, get, repo);
            let first = registry.traces(&store, repo).len();

            // controller → post → get → repo contains {repo, get, controller}
            registry.register_transition(&store, controller, post);
            registry.register_transition(&store, post, get);
            registry.register_transition(&store, get, repo);
            let second = registry.traces(&store, repo).len();

            registry.register_transition(&store, controller, field);
            registry.register_transition(&store, field, repo);
            let third = registry.traces(&store, repo).len();

            assert!(first <= second && second <= third);
            assert_eq!(third, 2);

            let traces = registry.traces(&store, repo);
            for (i, a) in traces.iter().enumerate() {
                for (j, b) in traces.iter().enumerate() {
                    if i != j {
                        assert!(!a.is_subset_of(b));
                    }
                }
            }
        }

        #[test]
        fn values_resolve_to_anchor() {
            let mut store = store();
            let (controller, get, _, _, _) = ids(&store);
            let value = Element::Value(store.intern_value(PropertyValue::from("get"), get));
            let mut registry = TraceRegistry::new();

            registry.register_transition(&store, controller, get);
            let id = registry.sanitize(&store, value);

            assert_eq!(registry.id_of(&store, get), Some(id));
            assert_eq!(registry.traces_of(&store, value), vec![vec![get, controller]]);
        }

        #[test]
        fn trace_cap_drops_excess() {
            let store = store();
            let (controller, get, post, field, repo) = ids(&store);
            let mut registry = TraceRegistry::new().with_max_traces_per_element(Some(1));

            registry.register_transition(&store, controller, get);
            registry.register_transition(&store, controller, post);
            registry.register_transition(&store, controller, field);
            registry.register_transition(&store, get, repo);
            registry.register_transition(&store, post, repo);
            registry.register_transition(&store, field, repo);

            assert_eq!(registry.traces(&store, repo).len(), 1);
            assert_eq!(registry.stats().dropped, 2);
        }

        #[test]
        fn zero_cap_keeps_every_trace() {
            let store = store();
            let (controller, get, post, _, repo) = ids(&store);
            let mut registry = TraceRegistry::new().with_max_traces_per_element(Some(0));

            registry.register_transition(&store, controller, get);
            registry.register_transition(&store, controller, post);
            registry.register_transition(&store, get, repo);
            registry.register_transition(&store, post, repo);

            assert_eq!(registry.traces(&store, repo).len(), 2);
            assert_eq!(registry.stats().dropped, 0);
        }
    }
}
