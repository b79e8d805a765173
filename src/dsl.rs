//! Builder DSL for analysis pipelines.
//!
//! A pipeline is written as nested scopes. Each scope builder wraps a
//! [`Chain`] and appends steps as methods are called; opening a nested scope
//! (`methods`, `parameters`, `type_argument`, ...) takes a closure over the
//! inner builder and compiles to a fork, so the outer scope keeps its
//! elements once the inner block is done.
//!
//! ```
//! use archsight::dsl::{template, ScopeBuilder};
//!
//! let pipeline = template(|t| {
//!     t.classes(|c| {
//!         c.annotated("org/springframework/stereotype/Controller")
//!             .entity("controller")
//!             .methods(|m| {
//!                 m.annotated("org/springframework/web/bind/annotation/GetMapping")
//!                     .entity("endpoint")
//!                     .relate("controller", "endpoints", "endpoint");
//!             });
//!     });
//! });
//! assert_eq!(pipeline.len(), 1);
//! ```
//!
//! Builders only record steps. Nothing touches an element until the chain is
//! run through [`Context::execute`](crate::context::Context::execute).

use archsight_core::entity::{EntityType, LabelFormatter, UpdateStrategy};
use archsight_core::error::Result;
use archsight_core::value::PropertyValue;

use crate::action::{Action, Chain, Filter, Pattern, SynthesisTarget, TextTransform, Traversal};
use crate::measure::ScopeKind;
use crate::resolver::{Direction, Resolver};
use crate::signature;

/// Build a top-level pipeline.
pub fn template(build: impl FnOnce(&mut TemplateScope)) -> Chain {
    let mut scope = TemplateScope::detached();
    build(&mut scope);
    scope.into_chain()
}

/// Compile a nested scope: `lead` steps select the scope's elements, then
/// the body runs, all inside a fork tagged with the scope kind.
fn nested<S: ScopeBuilder>(lead: Vec<Action>, build: impl FnOnce(&mut S)) -> Action {
    let mut scope = S::detached();
    build(&mut scope);
    let mut body: Chain = lead.into_iter().collect();
    body.extend(scope.into_chain());
    Action::Fork {
        body: Box::new(Action::Scope {
            kind: S::KIND,
            body: Box::new(body.into()),
        }),
    }
}

fn resolver_step(
    resolver: Resolver,
    direction: Direction,
    parent: impl Into<EntityType>,
    key: impl Into<String>,
    target: impl Into<EntityType>,
) -> Action {
    Action::RegisterChildrenFromResolver {
        resolver,
        direction,
        parent: parent.into(),
        key: key.into(),
        target: target.into(),
    }
}

// ============================================================================
// Shared operations
// ============================================================================

/// Operations available in every scope.
pub trait ScopeBuilder: Sized {
    const KIND: ScopeKind;

    /// An empty builder, not yet attached to any parent.
    fn detached() -> Self;

    fn chain_mut(&mut self) -> &mut Chain;

    fn into_chain(self) -> Chain;

    fn push(&mut self, action: impl Into<Action>) -> &mut Self {
        self.chain_mut().push(action);
        self
    }

    /// Bind the elements in scope to an entity type. Fails when an element is
    /// already bound to another type.
    fn entity(&mut self, entity_type: impl Into<EntityType>) -> &mut Self {
        self.entity_with(entity_type, None, true)
    }

    fn entity_with_label(
        &mut self,
        entity_type: impl Into<EntityType>,
        label: LabelFormatter,
    ) -> &mut Self {
        self.entity_with(entity_type, Some(label), true)
    }

    fn entity_with(
        &mut self,
        entity_type: impl Into<EntityType>,
        label: Option<LabelFormatter>,
        error_if_exists: bool,
    ) -> &mut Self {
        self.push(Action::RegisterEntity {
            entity_type: entity_type.into(),
            label,
            error_if_exists,
        })
    }

    fn filter(&mut self, filter: Filter) -> &mut Self {
        self.push(Action::Filter {
            filter,
            invert: false,
        })
    }

    fn exclude(&mut self, filter: Filter) -> &mut Self {
        self.push(Action::Filter {
            filter,
            invert: true,
        })
    }

    /// Keep elements whose display name matches a regular expression.
    fn named(&mut self, regex: &str) -> &mut Self {
        self.filter(Filter::Name(Pattern::new(regex)))
    }

    fn annotated(&mut self, annotation: &str) -> &mut Self {
        self.filter(Filter::Annotated(annotation.to_string()))
    }

    fn has_entity(&mut self, entity_type: impl Into<EntityType>) -> &mut Self {
        self.filter(Filter::HasEntity(Some(entity_type.into())))
    }

    /// Append a constant to a property of the entity bound to each element.
    fn set_property(&mut self, key: &str, value: impl Into<PropertyValue>) -> &mut Self {
        let steps = [
            Action::WithValue {
                value: value.into(),
            },
            Action::UpdateEntityProperty {
                key: key.to_string(),
                strategy: UpdateStrategy::default(),
                entity_type: None,
            },
        ];
        self.push(Action::Fork {
            body: Box::new(steps.into_iter().collect::<Chain>().into()),
        })
    }

    /// Append a constant to a property of every related entity of a type.
    fn set_property_of(
        &mut self,
        entity_type: impl Into<EntityType>,
        key: &str,
        value: impl Into<PropertyValue>,
    ) -> &mut Self {
        let steps = [
            Action::WithValue {
                value: value.into(),
            },
            Action::UpdateEntityProperty {
                key: key.to_string(),
                strategy: UpdateStrategy::default(),
                entity_type: Some(entity_type.into()),
            },
        ];
        self.push(Action::Fork {
            body: Box::new(steps.into_iter().collect::<Chain>().into()),
        })
    }

    fn read_name(&mut self, build: impl FnOnce(&mut ValueScope)) -> &mut Self {
        self.push(nested(vec![Action::ReadName], build))
    }

    fn annotation_field(
        &mut self,
        annotation: &str,
        field: &str,
        build: impl FnOnce(&mut ValueScope),
    ) -> &mut Self {
        let lead = Action::ReadAnnotationField {
            annotation: annotation.to_string(),
            field: field.to_string(),
        };
        self.push(nested(vec![lead], build))
    }

    /// `parent[key] = child` for entities related through traces.
    fn relate(
        &mut self,
        parent: impl Into<EntityType>,
        key: &str,
        child: impl Into<EntityType>,
    ) -> &mut Self {
        self.push(Action::RegisterChildren {
            parent: parent.into(),
            key: key.to_string(),
            child: child.into(),
        })
    }

    /// Run a block for its side effects and keep the current elements.
    fn fork(&mut self, build: impl FnOnce(&mut Self)) -> &mut Self {
        self.push(nested::<Self>(Vec::new(), build))
    }

    /// Fork only when entities of a type exist (`exists`) or do not.
    fn scope_if_entity_exists(
        &mut self,
        entity_type: impl Into<EntityType>,
        exists: bool,
        build: impl FnOnce(&mut Self),
    ) -> &mut Self {
        let mut scope = Self::detached();
        build(&mut scope);
        self.push(Action::ForkOnEntityExistence {
            entity_type: entity_type.into(),
            exists,
            body: Box::new(Action::Scope {
                kind: Self::KIND,
                body: Box::new(scope.into_chain().into()),
            }),
        })
    }

    fn log(&mut self, label: &str) -> &mut Self {
        self.push(Action::Debug {
            label: label.to_string(),
            count_only: false,
        })
    }

    fn log_count(&mut self, label: &str) -> &mut Self {
        self.push(Action::Debug {
            label: label.to_string(),
            count_only: true,
        })
    }

    /// `parent[key] = target` for every `target` entity whose class is
    /// instantiated by the code in scope.
    fn instantiations_of(
        &mut self,
        parent: impl Into<EntityType>,
        key: &str,
        target: impl Into<EntityType>,
    ) -> &mut Self {
        self.push(resolver_step(Resolver::Instantiations, Direction::Of, parent, key, target))
    }

    /// `target[key] = parent`, the inverse of [`instantiations_of`](Self::instantiations_of).
    fn instantiations_by(
        &mut self,
        parent: impl Into<EntityType>,
        key: &str,
        target: impl Into<EntityType>,
    ) -> &mut Self {
        self.push(resolver_step(Resolver::Instantiations, Direction::By, parent, key, target))
    }

    fn invocations_of(
        &mut self,
        parent: impl Into<EntityType>,
        key: &str,
        target: impl Into<EntityType>,
    ) -> &mut Self {
        self.push(resolver_step(Resolver::Invocations, Direction::Of, parent, key, target))
    }

    fn invocations_by(
        &mut self,
        parent: impl Into<EntityType>,
        key: &str,
        target: impl Into<EntityType>,
    ) -> &mut Self {
        self.push(resolver_step(Resolver::Invocations, Direction::By, parent, key, target))
    }

    fn field_accesses_of(
        &mut self,
        parent: impl Into<EntityType>,
        key: &str,
        target: impl Into<EntityType>,
    ) -> &mut Self {
        self.push(resolver_step(Resolver::FieldAccess, Direction::Of, parent, key, target))
    }

    fn field_accesses_by(
        &mut self,
        parent: impl Into<EntityType>,
        key: &str,
        target: impl Into<EntityType>,
    ) -> &mut Self {
        self.push(resolver_step(Resolver::FieldAccess, Direction::By, parent, key, target))
    }
}

macro_rules! scope_builder {
    ($(#[$meta:meta])* $name:ident => $kind:ident) => {
        $(#[$meta])*
        #[derive(Debug, Default)]
        pub struct $name {
            chain: Chain,
        }

        impl ScopeBuilder for $name {
            const KIND: ScopeKind = ScopeKind::$kind;

            fn detached() -> Self {
                Self::default()
            }

            fn chain_mut(&mut self) -> &mut Chain {
                &mut self.chain
            }

            fn into_chain(self) -> Chain {
                self.chain
            }
        }
    };
}

scope_builder!(
    /// Top level: sources and synthesis.
    TemplateScope => Template
);
scope_builder!(ClassScope => Class);
scope_builder!(MethodScope => Method);
scope_builder!(FieldScope => Field);
scope_builder!(ParameterScope => Parameter);
scope_builder!(
    /// Generic signature nodes: a raw type plus its type arguments.
    SignatureScope => Signature
);
scope_builder!(
    /// Values read from elements, on their way into entity properties.
    ValueScope => Value
);

fn explode(traversal: Traversal) -> Action {
    Action::Explode { traversal }
}

// ============================================================================
// Template
// ============================================================================

impl TemplateScope {
    /// Every input class.
    pub fn classes(&mut self, build: impl FnOnce(&mut ClassScope)) -> &mut Self {
        self.push(nested(vec![Action::AllClasses], build))
    }

    /// Every class, input or synthesized, whose binary name matches.
    pub fn classes_named(&mut self, regex: &str, build: impl FnOnce(&mut ClassScope)) -> &mut Self {
        let lead = Action::ClassesNamed {
            pattern: Pattern::new(regex),
        };
        self.push(nested(vec![lead], build))
    }

    /// A class stub, created when the class is not part of the input.
    pub fn synthesize_class(&mut self, name: &str, build: impl FnOnce(&mut ClassScope)) -> &mut Self {
        let lead = Action::Synthesize {
            target: SynthesisTarget::Class {
                name: name.to_string(),
            },
        };
        self.push(nested(vec![lead], build))
    }

    pub fn synthesize_method(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
        build: impl FnOnce(&mut MethodScope),
    ) -> &mut Self {
        let lead = Action::Synthesize {
            target: SynthesisTarget::Method {
                owner: owner.to_string(),
                name: name.to_string(),
                descriptor: descriptor.to_string(),
            },
        };
        self.push(nested(vec![lead], build))
    }

    /// Synthesize a class and bind it to an entity in one step.
    pub fn synthesized_class_entity(
        &mut self,
        name: &str,
        entity_type: impl Into<EntityType>,
        build: impl FnOnce(&mut ClassScope),
    ) -> &mut Self {
        let lead = Action::RegisterSynthesizedEntity {
            target: SynthesisTarget::Class {
                name: name.to_string(),
            },
            entity_type: entity_type.into(),
            label: None,
            error_if_exists: true,
        };
        self.push(nested(vec![lead], build))
    }
}

// ============================================================================
// Class, method, field, parameter
// ============================================================================

impl ClassScope {
    pub fn methods(&mut self, build: impl FnOnce(&mut MethodScope)) -> &mut Self {
        self.push(nested(vec![explode(Traversal::Methods)], build))
    }

    pub fn fields(&mut self, build: impl FnOnce(&mut FieldScope)) -> &mut Self {
        self.push(nested(vec![explode(Traversal::Fields)], build))
    }

    /// Directly implemented interfaces present in the universe.
    pub fn interfaces(&mut self, build: impl FnOnce(&mut ClassScope)) -> &mut Self {
        self.push(nested(vec![explode(Traversal::Interfaces)], build))
    }

    pub fn superclass(&mut self, build: impl FnOnce(&mut ClassScope)) -> &mut Self {
        self.push(nested(vec![explode(Traversal::Superclass)], build))
    }

    pub fn outer_class(&mut self, build: impl FnOnce(&mut ClassScope)) -> &mut Self {
        self.push(nested(vec![explode(Traversal::OuterClass)], build))
    }

    pub fn nested_classes(&mut self, build: impl FnOnce(&mut ClassScope)) -> &mut Self {
        self.push(nested(vec![explode(Traversal::NestedClasses)], build))
    }

    /// Keep classes implementing an interface, directly or inherited.
    pub fn implements(&mut self, interface: &str) -> &mut Self {
        self.filter(Filter::Implements(interface.to_string()))
    }

    pub fn inherits_from(&mut self, class: &str) -> &mut Self {
        self.filter(Filter::InheritsFrom(class.to_string()))
    }
}

impl MethodScope {
    pub fn parameters(&mut self, build: impl FnOnce(&mut ParameterScope)) -> &mut Self {
        self.push(nested(vec![explode(Traversal::Parameters)], build))
    }

    pub fn owner(&mut self, build: impl FnOnce(&mut ClassScope)) -> &mut Self {
        self.push(nested(vec![explode(Traversal::Owner)], build))
    }

    pub fn return_type(&mut self, build: impl FnOnce(&mut ClassScope)) -> &mut Self {
        self.push(nested(vec![explode(Traversal::ReturnType)], build))
    }

    pub fn return_signature(&mut self, build: impl FnOnce(&mut SignatureScope)) -> &mut Self {
        self.push(nested(vec![explode(Traversal::Signature)], build))
    }

    /// Explode the class bound to `T` in a generic return type pattern.
    pub fn return_type_t(
        &mut self,
        pattern: &str,
        build: impl FnOnce(&mut ClassScope),
    ) -> Result<&mut Self> {
        let mut signature = SignatureScope::detached();
        signature.explode_type_t(pattern, build)?;
        let lead = vec![explode(Traversal::Signature)];
        Ok(self.push(nested(lead, |s: &mut SignatureScope| *s = signature)))
    }

    /// Methods invoked from here, transitively.
    pub fn invoked_methods(&mut self, build: impl FnOnce(&mut MethodScope)) -> &mut Self {
        self.push(nested(vec![explode(Traversal::InvokedMethods)], build))
    }
}

impl FieldScope {
    pub fn owner(&mut self, build: impl FnOnce(&mut ClassScope)) -> &mut Self {
        self.push(nested(vec![explode(Traversal::Owner)], build))
    }

    pub fn field_type(&mut self, build: impl FnOnce(&mut ClassScope)) -> &mut Self {
        self.push(nested(vec![explode(Traversal::Type)], build))
    }

    pub fn signature(&mut self, build: impl FnOnce(&mut SignatureScope)) -> &mut Self {
        self.push(nested(vec![explode(Traversal::Signature)], build))
    }

    /// Explode the class bound to `T` in a generic field type pattern.
    pub fn field_type_t(
        &mut self,
        pattern: &str,
        build: impl FnOnce(&mut ClassScope),
    ) -> Result<&mut Self> {
        let mut signature = SignatureScope::detached();
        signature.explode_type_t(pattern, build)?;
        let lead = vec![explode(Traversal::Signature)];
        Ok(self.push(nested(lead, |s: &mut SignatureScope| *s = signature)))
    }
}

impl ParameterScope {
    pub fn method(&mut self, build: impl FnOnce(&mut MethodScope)) -> &mut Self {
        self.push(nested(vec![explode(Traversal::DeclaringMethod)], build))
    }

    pub fn owner(&mut self, build: impl FnOnce(&mut ClassScope)) -> &mut Self {
        self.push(nested(vec![explode(Traversal::Owner)], build))
    }

    pub fn parameter_type(&mut self, build: impl FnOnce(&mut ClassScope)) -> &mut Self {
        self.push(nested(vec![explode(Traversal::Type)], build))
    }

    pub fn signature(&mut self, build: impl FnOnce(&mut SignatureScope)) -> &mut Self {
        self.push(nested(vec![explode(Traversal::Signature)], build))
    }
}

// ============================================================================
// Signature
// ============================================================================

impl SignatureScope {
    /// Keep signature nodes whose raw type is `name` (full binary name or any
    /// package/outer-class suffix of it).
    pub fn filter_type(&mut self, name: &str) -> &mut Self {
        self.filter(Filter::SignatureType(Pattern::type_name(name)))
    }

    /// Descend into type argument `index`.
    pub fn type_argument(&mut self, index: u32, build: impl FnOnce(&mut SignatureScope)) -> &mut Self {
        self.push(nested(vec![explode(Traversal::TypeArgument(index))], build))
    }

    /// The class named by each signature node.
    pub fn explode_type(&mut self, build: impl FnOnce(&mut ClassScope)) -> &mut Self {
        self.push(nested(vec![explode(Traversal::SignatureClass)], build))
    }

    /// Find the class bound to `T` in a pattern such as
    /// `Map<_, List<Pair<T, _>>>` and run `build` on it.
    ///
    /// Compiles to the same steps as the equivalent hand-written
    /// `filter_type`/`type_argument` nesting.
    pub fn explode_type_t(
        &mut self,
        pattern: &str,
        build: impl FnOnce(&mut ClassScope),
    ) -> Result<&mut Self> {
        let parsed = signature::parse_type_pattern(pattern)?;
        signature::compile(&parsed, self, build);
        Ok(self)
    }
}

// ============================================================================
// Value
// ============================================================================

impl ValueScope {
    /// Regex replacement; `$1`-style group references are expanded.
    pub fn replace(&mut self, regex: &str, replacement: &str) -> &mut Self {
        self.push(Action::EditText {
            edit: TextTransform::Replace {
                pattern: Pattern::new(regex),
                replacement: replacement.to_string(),
            },
        })
    }

    pub fn prefix(&mut self, text: &str) -> &mut Self {
        self.push(Action::EditText {
            edit: TextTransform::Prefix {
                text: text.to_string(),
            },
        })
    }

    pub fn suffix(&mut self, text: &str) -> &mut Self {
        self.push(Action::EditText {
            edit: TextTransform::Suffix {
                text: text.to_string(),
            },
        })
    }

    pub fn lowercase(&mut self) -> &mut Self {
        self.push(Action::EditText {
            edit: TextTransform::Lowercase,
        })
    }

    pub fn uppercase(&mut self) -> &mut Self {
        self.push(Action::EditText {
            edit: TextTransform::Uppercase,
        })
    }

    /// Append each value to `key` on the entity bound to the value's element.
    pub fn property(&mut self, key: &str) -> &mut Self {
        self.property_with(key, UpdateStrategy::default())
    }

    pub fn property_with(&mut self, key: &str, strategy: UpdateStrategy) -> &mut Self {
        self.push(Action::UpdateEntityProperty {
            key: key.to_string(),
            strategy,
            entity_type: None,
        })
    }

    /// Write each value to every related entity of `entity_type`.
    pub fn property_of(
        &mut self,
        entity_type: impl Into<EntityType>,
        key: &str,
        strategy: UpdateStrategy,
    ) -> &mut Self {
        self.push(Action::UpdateEntityProperty {
            key: key.to_string(),
            strategy,
            entity_type: Some(entity_type.into()),
        })
    }
}
