//! Action pipeline: the typed step language the context interprets.
//!
//! An [`Action`] maps a list of elements to a list of elements. Sources
//! ignore their input; forks run a body for its side effects and hand back
//! their input unchanged. Every action has a stable [`Action::id`] used by
//! measurements and debug output, and the whole tree is serde-serializable so
//! pipelines can be stored next to the models they produced.
//!
//! Pipelines are normally built with the [`dsl`](crate::dsl) builders rather
//! than by hand.

pub mod entity;
pub mod filter;
pub mod traversal;
pub mod value;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use archsight_core::entity::{EntityType, LabelFormatter, UpdateStrategy};
use archsight_core::error::{ArchError, Result};
use archsight_core::value::PropertyValue;

use crate::measure::ScopeKind;
use crate::resolver::{Direction, Resolver};

pub use filter::{Filter, Pattern};
pub use traversal::Traversal;
pub use value::TextTransform;

/// Sequential composition with in-place append.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chain {
    steps: Vec<Action>,
}

impl Chain {
    pub fn new() -> Self {
        Chain::default()
    }

    pub fn push(&mut self, action: impl Into<Action>) -> &mut Self {
        self.steps.push(action.into());
        self
    }

    pub fn steps(&self) -> &[Action] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl From<Chain> for Action {
    fn from(chain: Chain) -> Self {
        Action::Chain(chain)
    }
}

impl FromIterator<Action> for Chain {
    fn from_iter<I: IntoIterator<Item = Action>>(iter: I) -> Self {
        Chain {
            steps: iter.into_iter().collect(),
        }
    }
}

impl Extend<Action> for Chain {
    fn extend<I: IntoIterator<Item = Action>>(&mut self, iter: I) {
        self.steps.extend(iter);
    }
}

impl IntoIterator for Chain {
    type Item = Action;
    type IntoIter = std::vec::IntoIter<Action>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.into_iter()
    }
}

/// What a synthesis step creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SynthesisTarget {
    Class {
        name: String,
    },
    Method {
        owner: String,
        name: String,
        descriptor: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Chain(Chain),
    /// Transparent; tags nested measurements with a lexical scope.
    Scope {
        kind: ScopeKind,
        body: Box<Action>,
    },
    /// Source: every input class.
    AllClasses,
    /// Source: every class (input or synthesized) whose binary name matches.
    ClassesNamed {
        pattern: Pattern,
    },
    Filter {
        filter: Filter,
        #[serde(default)]
        invert: bool,
    },
    Explode {
        traversal: Traversal,
    },
    Fork {
        body: Box<Action>,
    },
    /// Fork only when entities of the type exist (or do not, when
    /// `exists` is false).
    ForkOnEntityExistence {
        entity_type: EntityType,
        exists: bool,
        body: Box<Action>,
    },
    /// Source: the synthesized element, reached from every input element.
    Synthesize {
        target: SynthesisTarget,
    },
    RegisterEntity {
        entity_type: EntityType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<LabelFormatter>,
        error_if_exists: bool,
    },
    RegisterSynthesizedEntity {
        target: SynthesisTarget,
        entity_type: EntityType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<LabelFormatter>,
        error_if_exists: bool,
    },
    RegisterChildren {
        parent: EntityType,
        key: String,
        child: EntityType,
    },
    RegisterChildrenFromResolver {
        resolver: Resolver,
        direction: Direction,
        parent: EntityType,
        key: String,
        target: EntityType,
    },
    UpdateEntityProperty {
        key: String,
        strategy: UpdateStrategy,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        entity_type: Option<EntityType>,
    },
    ReadName,
    ReadAnnotationField {
        annotation: String,
        field: String,
    },
    WithValue {
        value: PropertyValue,
    },
    EditText {
        edit: TextTransform,
    },
    /// Print the elements in scope (or only their count) when debugging is
    /// enabled.
    Debug {
        label: String,
        count_only: bool,
    },
}

impl Action {
    /// Stable identifier for diagnostics and measurements.
    pub fn id(&self) -> String {
        match self {
            Action::Chain(_) => "chain".to_string(),
            Action::Scope { kind, .. } => format!("scope:{}", kind),
            Action::AllClasses => "all_classes".to_string(),
            Action::ClassesNamed { pattern } => format!("classes_named:{}", pattern.as_str()),
            Action::Filter { filter, invert } => {
                let not = if *invert { "!" } else { "" };
                format!("filter:{}{}", not, filter.id())
            }
            Action::Explode { traversal } => format!("explode:{}", traversal.id()),
            Action::Fork { .. } => "fork".to_string(),
            Action::ForkOnEntityExistence {
                entity_type,
                exists,
                ..
            } => {
                let not = if *exists { "" } else { "!" };
                format!("fork_if:{}{}", not, entity_type)
            }
            Action::Synthesize { .. } => "synthesize".to_string(),
            Action::RegisterEntity { entity_type, .. } => format!("entity:{}", entity_type),
            Action::RegisterSynthesizedEntity { entity_type, .. } => {
                format!("synthesized_entity:{}", entity_type)
            }
            Action::RegisterChildren { parent, key, child } => {
                format!("children:{}[{}]={}", parent, key, child)
            }
            Action::RegisterChildrenFromResolver {
                resolver,
                direction,
                key,
                ..
            } => format!("resolver:{}_{}[{}]", resolver.id(), direction.id(), key),
            Action::UpdateEntityProperty { key, .. } => format!("property:{}", key),
            Action::ReadName => "read_name".to_string(),
            Action::ReadAnnotationField { annotation, field } => {
                format!("read_annotation:{}.{}", annotation, field)
            }
            Action::WithValue { .. } => "with_value".to_string(),
            Action::EditText { edit } => format!("edit_text:{}", edit.id()),
            Action::Debug { label, .. } => format!("debug:{}", label),
        }
    }

    /// Direct sub-actions.
    pub fn children(&self) -> Vec<&Action> {
        match self {
            Action::Chain(chain) => chain.steps().iter().collect(),
            Action::Scope { body, .. }
            | Action::Fork { body }
            | Action::ForkOnEntityExistence { body, .. } => vec![body.as_ref()],
            _ => Vec::new(),
        }
    }

    /// Visit this action and every nested action, parents first.
    pub fn visit<'a>(&'a self, visitor: &mut impl FnMut(&'a Action)) {
        visitor(self);
        for child in self.children() {
            child.visit(visitor);
        }
    }

    /// Compile-check every regular expression in the tree.
    pub fn check_patterns(&self) -> Result<()> {
        let mut first_error = Ok(());
        self.visit(&mut |action| {
            if first_error.is_err() {
                return;
            }
            let pattern = match action {
                Action::ClassesNamed { pattern } => Some(pattern),
                Action::Filter { filter, .. } => filter.pattern(),
                Action::EditText {
                    edit: TextTransform::Replace { pattern, .. },
                } => Some(pattern),
                _ => None,
            };
            if let Some(pattern) = pattern {
                first_error = pattern.check();
            }
        });
        first_error
    }

    /// Check a self-contained pipeline: every pattern compiles and every
    /// referenced entity type is registered somewhere in the tree.
    pub fn validate(&self) -> Result<()> {
        self.check_patterns()?;
        let registered: HashSet<&EntityType> = self
            .registered_types()
            .into_iter()
            .map(|(entity_type, _)| entity_type)
            .collect();
        match self
            .referenced_types()
            .into_iter()
            .find(|entity_type| !registered.contains(entity_type))
        {
            Some(missing) => Err(ArchError::not_registered(missing)),
            None => Ok(()),
        }
    }

    /// Entity types registered anywhere in the tree, with their labels.
    pub fn registered_types(&self) -> Vec<(&EntityType, Option<&LabelFormatter>)> {
        let mut types = Vec::new();
        self.visit(&mut |action| match action {
            Action::RegisterEntity {
                entity_type, label, ..
            }
            | Action::RegisterSynthesizedEntity {
                entity_type, label, ..
            } => types.push((entity_type, label.as_ref())),
            _ => {}
        });
        types
    }

    /// Entity types a relation or property step requires to be registered.
    pub fn referenced_types(&self) -> Vec<&EntityType> {
        let mut types = Vec::new();
        self.visit(&mut |action| match action {
            Action::RegisterChildren { parent, child, .. } => {
                types.push(parent);
                types.push(child);
            }
            Action::RegisterChildrenFromResolver { parent, target, .. } => {
                types.push(parent);
                types.push(target);
            }
            Action::UpdateEntityProperty {
                entity_type: Some(entity_type),
                ..
            } => types.push(entity_type),
            _ => {}
        });
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Action {
        let mut chain = Chain::new();
        chain
            .push(Action::AllClasses)
            .push(Action::Filter {
                filter: Filter::Annotated("org/example/Controller".into()),
                invert: false,
            })
            .push(Action::RegisterEntity {
                entity_type: "controller".into(),
                label: None,
                error_if_exists: true,
            })
            .push(Action::Fork {
                body: Box::new(Action::RegisterChildren {
                    parent: "controller".into(),
                    key: "endpoints".into(),
                    child: "endpoint".into(),
                }),
            });
        chain.into()
    }

    #[test]
    fn ids_are_stable() {
        let action = sample();
        let mut ids = Vec::new();
        action.visit(&mut |a| ids.push(a.id()));
        assert_eq!(
            ids,
            vec![
                "chain",
                "all_classes",
                "filter:annotated",
                "entity:controller",
                "fork",
                "children:controller[endpoints]=endpoint",
            ]
        );
    }

    #[test]
    fn json_round_trip() {
        let action = sample();
        let json = serde_json::to_string(&action).unwrap();
        assert!(json.contains(r#""action":"all_classes""#));
        let back: Action = serde_json::from_str(&json).unwrap();
        assert_eq!(back, action);
    }

    #[test]
    fn registered_and_referenced_types() {
        let action = sample();
        let registered: Vec<&str> = action
            .registered_types()
            .into_iter()
            .map(|(t, _)| t.as_str())
            .collect();
        assert_eq!(registered, vec!["controller"]);
        let referenced: Vec<&str> = action.referenced_types().iter().map(|t| t.as_str()).collect();
        assert_eq!(referenced, vec!["controller", "endpoint"]);
    }

    #[test]
    fn validate_reports_unregistered_child() {
        assert!(matches!(
            sample().validate(),
            Err(ArchError::EntityNotRegistered { entity_type }) if entity_type == "endpoint"
        ));
    }

    #[test]
    fn bad_pattern_is_found_anywhere() {
        let action = Action::Fork {
            body: Box::new(Action::ClassesNamed {
                pattern: Pattern::new("[oops"),
            }),
        };
        assert!(action.check_patterns().is_err());
    }
}
