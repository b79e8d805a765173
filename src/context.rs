//! Execution context: runs action pipelines over one element universe.
//!
//! The context owns the element store, the trace registry and the entity
//! registry for a single run, plus memoized facts derived from the class
//! hierarchy:
//! - superclass chains,
//! - implemented interfaces (inherited and through super-interfaces),
//! - invoked methods per method, closed transitively.
//!
//! Memoized facts are dropped whenever a stub is synthesized or classes are
//! added, since either can make a previously unresolvable reference resolve.
//!
//! ## Execution
//!
//! Every action runs through [`Context::measure`]. With profiling enabled it
//! records one [`Measurement`] per action, nested like the action tree.
//! Before anything runs, the whole tree is checked: regular expressions
//! must compile, and every entity type used by a relation or property step
//! must be registered somewhere (in this pipeline or an earlier one).

use std::collections::{HashMap, HashSet, VecDeque};
use std::iter;
use std::rc::Rc;
use std::time::Instant;

use archsight_core::config::AnalysisConfig;
use archsight_core::element::{
    ClassDecl, ClassId, Element, ElementStore, FieldAccessKind, FieldId, Instruction, MethodId,
};
use archsight_core::entity::EntityRegistry;
use archsight_core::error::{ArchError, Result};
use archsight_core::model::SystemModel;
use archsight_core::trace::TraceRegistry;

use crate::action::{self, Action, SynthesisTarget};
use crate::measure::{Measurement, ScopeKind};
use crate::resolver;

/// Interface families compiled lambdas are cast to.
const FUNCTIONAL_PREFIXES: &[&str] = &["kotlin/jvm/functions/Function", "java/util/function/"];
const FUNCTIONAL_TYPES: &[&str] = &["java/lang/Runnable", "java/util/concurrent/Callable"];

/// True for functional interfaces a closure class may implement.
pub fn is_functional_interface(name: &str) -> bool {
    FUNCTIONAL_TYPES.contains(&name) || FUNCTIONAL_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// State of one analysis run.
pub struct Context {
    pub(crate) store: ElementStore,
    pub(crate) traces: TraceRegistry,
    pub(crate) entities: EntityRegistry,
    config: AnalysisConfig,

    ancestors: HashMap<ClassId, Rc<[ClassId]>>,
    interfaces: HashMap<ClassId, Rc<[String]>>,
    invoked: HashMap<MethodId, Rc<[MethodId]>>,

    scopes: Vec<ScopeKind>,
    frames: Vec<Measurement>,
    measurements: Vec<Measurement>,
}

impl Context {
    pub fn new(classes: impl IntoIterator<Item = ClassDecl>, config: AnalysisConfig) -> Self {
        let store = ElementStore::from_classes(classes);
        tracing::debug!(
            "context created: {} classes, {} methods",
            store.class_count(),
            store.method_count()
        );
        Context {
            store,
            traces: TraceRegistry::new().with_max_traces_per_element(config.max_traces_per_element),
            entities: EntityRegistry::new(config.strict_entities),
            config,
            ancestors: HashMap::new(),
            interfaces: HashMap::new(),
            invoked: HashMap::new(),
            scopes: Vec::new(),
            frames: Vec::new(),
            measurements: Vec::new(),
        }
    }

    /// Add classes to the universe. A class already present as a stub is
    /// filled in place.
    pub fn add_classes(&mut self, classes: impl IntoIterator<Item = ClassDecl>) {
        for class in classes {
            self.store.insert_class(class);
        }
        self.invalidate_caches();
    }

    pub fn store(&self) -> &ElementStore {
        &self.store
    }

    pub fn traces(&self) -> &TraceRegistry {
        &self.traces
    }

    pub fn entities(&self) -> &EntityRegistry {
        &self.entities
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Root measurements, one per executed pipeline. Empty unless profiling.
    pub fn measurements(&self) -> &[Measurement] {
        &self.measurements
    }

    /// Traces of an element as element paths, newest first.
    pub fn traces_of(&self, element: Element) -> Vec<Vec<Element>> {
        self.traces.traces_of(&self.store, element)
    }

    /// Finalize labels and snapshot the entity graph.
    pub fn into_model(mut self) -> SystemModel {
        self.entities.finalize(&self.store);
        let stats = self.traces.stats();
        tracing::info!(
            "model built: {} entities, {} traced elements, {} traces",
            self.entities.len(),
            stats.elements,
            stats.traces
        );
        SystemModel::from_registry(&self.entities)
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Run a pipeline with an empty input.
    pub fn execute(&mut self, action: &Action) -> Result<Vec<Element>> {
        self.execute_with(action, Vec::new())
    }

    /// Run a pipeline against explicit input elements.
    pub fn execute_with(&mut self, action: &Action, input: Vec<Element>) -> Result<Vec<Element>> {
        self.prepare(action)?;
        self.measure(action, input)
    }

    fn prepare(&mut self, action: &Action) -> Result<()> {
        action.check_patterns()?;
        for (entity_type, label) in action.registered_types() {
            self.entities.declare(entity_type, label);
        }
        for entity_type in action.referenced_types() {
            self.entities.require_declared(entity_type)?;
        }
        Ok(())
    }

    /// The single choke point every action runs through.
    pub(crate) fn measure(&mut self, action: &Action, input: Vec<Element>) -> Result<Vec<Element>> {
        if !self.config.profile {
            return self.dispatch(action, input);
        }

        let scope = self.scopes.last().copied().unwrap_or_default();
        self.frames
            .push(Measurement::start(action.id(), scope, input.len()));
        let started = Instant::now();
        let result = self.dispatch(action, input);
        let elapsed = started.elapsed();

        let mut frame = self
            .frames
            .pop()
            .ok_or_else(|| ArchError::internal("measurement stack underflow"))?;
        frame.elapsed_micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        frame.output = result.as_ref().map(Vec::len).unwrap_or(0);
        match self.frames.last_mut() {
            Some(parent) => parent.children.push(frame),
            None => self.measurements.push(frame),
        }
        result
    }

    fn dispatch(&mut self, action: &Action, input: Vec<Element>) -> Result<Vec<Element>> {
        match action {
            Action::Chain(chain) => {
                let mut current = input;
                for step in chain.steps() {
                    current = self.measure(step, current)?;
                }
                Ok(current)
            }
            Action::Scope { kind, body } => {
                self.scopes.push(*kind);
                let result = self.measure(body, input);
                self.scopes.pop();
                result
            }
            Action::AllClasses => Ok(self
                .store
                .input_classes()
                .iter()
                .map(|c| Element::Class(*c))
                .collect()),
            Action::ClassesNamed { pattern } => {
                let mut out = Vec::new();
                for id in self.store.class_ids() {
                    if pattern.is_match(&self.store.class(id).name)? {
                        out.push(Element::Class(id));
                    }
                }
                Ok(out)
            }
            Action::Filter { filter, invert } => action::filter::apply(self, filter, *invert, input),
            Action::Explode { traversal } => action::traversal::explode(self, *traversal, input),
            Action::Fork { body } => {
                self.measure(body, input.clone())?;
                Ok(input)
            }
            Action::ForkOnEntityExistence {
                entity_type,
                exists,
                body,
            } => {
                let present = !self.entities.entities_of_type(entity_type).is_empty();
                if present == *exists {
                    self.measure(body, input.clone())?;
                }
                Ok(input)
            }
            Action::Synthesize { target } => {
                let element = self.synthesize(target)?;
                for &from in &input {
                    self.traces.register_transition(&self.store, from, element);
                }
                Ok(vec![element])
            }
            Action::RegisterEntity {
                entity_type,
                error_if_exists,
                ..
            } => {
                for &element in &input {
                    self.entities
                        .register(&self.store, element, entity_type, *error_if_exists)?;
                    self.traces.sanitize(&self.store, element);
                }
                Ok(input)
            }
            Action::RegisterSynthesizedEntity {
                target,
                entity_type,
                error_if_exists,
                ..
            } => {
                let element = self.synthesize(target)?;
                for &from in &input {
                    self.traces.register_transition(&self.store, from, element);
                }
                self.entities
                    .register(&self.store, element, entity_type, *error_if_exists)?;
                self.traces.sanitize(&self.store, element);
                Ok(vec![element])
            }
            Action::RegisterChildren { parent, key, child } => {
                action::entity::register_children(self, parent, key, child, &input)?;
                Ok(input)
            }
            Action::RegisterChildrenFromResolver {
                resolver,
                direction,
                parent,
                key,
                target,
            } => {
                resolver::register_from_resolver(
                    self, *resolver, *direction, parent, key, target, &input,
                )?;
                Ok(input)
            }
            Action::UpdateEntityProperty {
                key,
                strategy,
                entity_type,
            } => {
                action::entity::update_property(self, key, *strategy, entity_type.as_ref(), &input)?;
                Ok(input)
            }
            Action::ReadName => Ok(action::value::read_name(self, input)),
            Action::ReadAnnotationField { annotation, field } => Ok(
                action::value::read_annotation_field(self, annotation, field, input),
            ),
            Action::WithValue { value } => Ok(action::value::with_value(self, value, input)),
            Action::EditText { edit } => action::value::edit_text(self, edit, input),
            Action::Debug { label, count_only } => {
                self.debug_tap(label, *count_only, &input);
                Ok(input)
            }
        }
    }

    fn debug_tap(&self, label: &str, count_only: bool, elements: &[Element]) {
        if !self.config.debug {
            return;
        }
        if count_only {
            tracing::info!(target: "archsight::debug", "{}: {} elements", label, elements.len());
            return;
        }
        for &element in elements {
            tracing::info!(target: "archsight::debug", "{}: {}", label, self.store.describe(element));
        }
    }

    // ========================================================================
    // Synthesis
    // ========================================================================

    fn synthesize(&mut self, target: &SynthesisTarget) -> Result<Element> {
        let classes_before = self.store.class_count();
        let (element, created) = match target {
            SynthesisTarget::Class { name } => {
                let id = self.store.synthesize_class(name);
                (Element::Class(id), false)
            }
            SynthesisTarget::Method {
                owner,
                name,
                descriptor,
            } => {
                let (id, created) = self.store.synthesize_method(owner, name, descriptor)?;
                (Element::Method(id), created)
            }
        };
        if created || self.store.class_count() != classes_before {
            self.invalidate_caches();
        }
        Ok(element)
    }

    fn invalidate_caches(&mut self) {
        if !self.invoked.is_empty() || !self.ancestors.is_empty() {
            tracing::trace!("dropping memoized hierarchy and call graph facts");
        }
        self.ancestors.clear();
        self.interfaces.clear();
        self.invoked.clear();
    }

    // ========================================================================
    // Hierarchy
    // ========================================================================

    /// Superclass chain present in the universe, nearest first.
    pub fn ancestors(&mut self, class: ClassId) -> Rc<[ClassId]> {
        if let Some(hit) = self.ancestors.get(&class) {
            return Rc::clone(hit);
        }
        let mut chain = Vec::new();
        let mut seen = HashSet::from([class]);
        let mut next = self.store.class(class).super_name.clone();
        while let Some(name) = next {
            let Some(id) = self.store.class_by_name(&name) else {
                break;
            };
            if !seen.insert(id) {
                break;
            }
            chain.push(id);
            next = self.store.class(id).super_name.clone();
        }
        let chain: Rc<[ClassId]> = chain.into();
        self.ancestors.insert(class, Rc::clone(&chain));
        chain
    }

    /// Superclass names, including a trailing superclass outside the universe.
    pub fn ancestor_names(&mut self, class: ClassId) -> Vec<String> {
        let chain = self.ancestors(class);
        let mut names: Vec<String> = chain
            .iter()
            .map(|c| self.store.class(*c).name.clone())
            .collect();
        let last = chain.last().copied().unwrap_or(class);
        if let Some(super_name) = &self.store.class(last).super_name {
            if self.store.class_by_name(super_name).is_none() {
                names.push(super_name.clone());
            }
        }
        names
    }

    /// Every interface implemented by a class: declared, inherited from
    /// superclasses, and extended by those interfaces.
    pub fn all_interfaces(&mut self, class: ClassId) -> Rc<[String]> {
        if let Some(hit) = self.interfaces.get(&class) {
            return Rc::clone(hit);
        }
        let chain = self.ancestors(class);
        let mut queue: VecDeque<String> = iter::once(class)
            .chain(chain.iter().copied())
            .flat_map(|c| self.store.class(c).interfaces.iter().cloned())
            .collect();
        let mut seen = HashSet::new();
        let mut all = Vec::new();
        while let Some(name) = queue.pop_front() {
            if !seen.insert(name.clone()) {
                continue;
            }
            if let Some(id) = self.store.class_by_name(&name) {
                queue.extend(self.store.class(id).interfaces.iter().cloned());
            }
            all.push(name);
        }
        let all: Rc<[String]> = all.into();
        self.interfaces.insert(class, Rc::clone(&all));
        all
    }

    /// Field by name on a class or its superclasses.
    pub fn resolve_field(&mut self, class: ClassId, name: &str) -> Option<FieldId> {
        let chain = self.ancestors(class);
        iter::once(class).chain(chain.iter().copied()).find_map(|c| {
            self.store
                .class(c)
                .fields
                .iter()
                .copied()
                .find(|f| self.store.field(*f).name == name)
        })
    }

    /// Call target by owner, name and descriptor, looking through
    /// superclasses and then interfaces (default methods).
    pub fn resolve_method(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<Option<MethodId>> {
        let Some(class) = self.store.class_by_name(owner) else {
            return Ok(None);
        };
        let chain = self.ancestors(class);
        for c in iter::once(class).chain(chain.iter().copied()) {
            if let Some(method) = self.store.find_method(c, name, Some(descriptor))? {
                return Ok(Some(method));
            }
        }
        let interfaces = self.all_interfaces(class);
        for interface in interfaces.iter() {
            if let Some(c) = self.store.class_by_name(interface) {
                if let Some(method) = self.store.find_method(c, name, Some(descriptor))? {
                    return Ok(Some(method));
                }
            }
        }
        Ok(None)
    }

    // ========================================================================
    // Call graph
    // ========================================================================

    /// Methods transitively invoked by `method`, in discovery order.
    ///
    /// Follows resolved call sites, lambda implementation handles, and the
    /// two compiled-closure idioms: a static `INSTANCE` load of a nested class
    /// immediately cast to a functional interface, and an inline `new` of a
    /// nested class implementing one.
    pub fn invoked_methods(&mut self, method: MethodId) -> Result<Rc<[MethodId]>> {
        if let Some(hit) = self.invoked.get(&method) {
            return Ok(Rc::clone(hit));
        }

        let mut seen = HashSet::from([method]);
        let mut order = Vec::new();
        let mut stack = vec![method];
        while let Some(current) = stack.pop() {
            let direct = self.direct_targets(current)?;
            for target in direct.into_iter().rev() {
                if seen.insert(target) {
                    order.push(target);
                    stack.push(target);
                }
            }
        }

        let closure: Rc<[MethodId]> = order.into();
        self.invoked.insert(method, Rc::clone(&closure));
        Ok(closure)
    }

    fn direct_targets(&mut self, method: MethodId) -> Result<Vec<MethodId>> {
        let instructions = self.store.method(method).instructions.clone();
        let mut targets = Vec::new();
        for (index, insn) in instructions.iter().enumerate() {
            match insn {
                Instruction::Invoke {
                    owner,
                    name,
                    descriptor,
                    ..
                } => targets.extend(self.resolve_method(owner, name, descriptor)?),
                Instruction::InvokeDynamic {
                    implementation: Some(handle),
                    ..
                } => targets.extend(self.resolve_method(
                    &handle.owner,
                    &handle.name,
                    &handle.descriptor,
                )?),
                Instruction::FieldAccess {
                    kind: FieldAccessKind::GetStatic,
                    owner,
                    name,
                    ..
                } if name == "INSTANCE" => {
                    let cast_to_function = matches!(
                        instructions.get(index + 1),
                        Some(Instruction::CheckCast { type_name }) if is_functional_interface(type_name)
                    );
                    if cast_to_function {
                        targets.extend(self.closure_body(owner));
                    }
                }
                Instruction::New { type_name } => {
                    if self.is_inline_closure(type_name) {
                        targets.extend(self.closure_body(type_name));
                    }
                }
                _ => {}
            }
        }
        Ok(targets)
    }

    fn nested_class(&self, name: &str) -> Option<ClassId> {
        self.store
            .class_by_name(name)
            .filter(|c| self.store.class(*c).outer_class.is_some())
    }

    fn is_inline_closure(&mut self, name: &str) -> bool {
        match self.nested_class(name) {
            Some(class) => self
                .all_interfaces(class)
                .iter()
                .any(|i| is_functional_interface(i)),
            None => false,
        }
    }

    fn closure_body(&self, name: &str) -> Vec<MethodId> {
        let Some(class) = self.nested_class(name) else {
            return Vec::new();
        };
        self.store
            .class(class)
            .methods
            .iter()
            .copied()
            .filter(|m| {
                let node = self.store.method(*m);
                node.name != "<init>" && node.name != "<clinit>"
            })
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
