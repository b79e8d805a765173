//! Element filters.
//!
//! A filter is a predicate over one element. Filters never report trace
//! transitions: the elements they keep are the elements they received.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use archsight_core::element::{descriptor, AccessFlags, Element, ElementKind, Visibility};
use archsight_core::entity::EntityType;
use archsight_core::error::{ArchError, Result};

use crate::context::Context;

// ============================================================================
// Pattern
// ============================================================================

/// A regular expression kept together with its source text.
///
/// Construction never fails; an invalid expression is reported by
/// [`Pattern::check`], which the context runs over the whole action tree
/// before executing anything.
#[derive(Clone)]
pub struct Pattern {
    source: String,
    compiled: std::result::Result<Regex, regex::Error>,
}

impl Pattern {
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let compiled = Regex::new(&source);
        Pattern { source, compiled }
    }

    /// Matches a type by binary name or by any `/`/`$` separated suffix:
    /// `Map` matches `java/util/Map`, `util.Map` matches `java/util/Map`.
    pub fn type_name(name: &str) -> Self {
        let normalized = descriptor::normalize(name);
        Pattern::new(format!("^(?:.*[/$])?{}$", regex::escape(&normalized)))
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn check(&self) -> Result<()> {
        self.regex().map(|_| ())
    }

    pub fn is_match(&self, text: &str) -> Result<bool> {
        Ok(self.regex()?.is_match(text))
    }

    pub(crate) fn regex(&self) -> Result<&Regex> {
        self.compiled
            .as_ref()
            .map_err(|e| ArchError::InvalidPattern {
                pattern: self.source.clone(),
                message: e.to_string(),
            })
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for Pattern {}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pattern({:?})", self.source)
    }
}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        Ok(Pattern::new(source))
    }
}

impl From<&str> for Pattern {
    fn from(source: &str) -> Self {
        Pattern::new(source)
    }
}

// ============================================================================
// Filter
// ============================================================================

/// Predicate kept by a `Filter` action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    /// Display name matches.
    Name(Pattern),
    /// Carries an annotation of the given type.
    Annotated(String),
    /// Every bit of the mask is set.
    Access(AccessFlags),
    Visibility(Visibility),
    /// Declared type (field/parameter type, method return type) matches.
    DeclaredType(Pattern),
    /// Raw type of a signature element matches.
    SignatureType(Pattern),
    /// Owning class implements an interface, directly or inherited.
    Implements(String),
    /// Owning class extends a class somewhere up its superclass chain.
    InheritsFrom(String),
    /// Bound to an entity (of the given type, when set).
    HasEntity(Option<EntityType>),
    /// A synthesized stub or a member of one.
    Synthesized,
}

impl Filter {
    pub fn id(&self) -> &'static str {
        match self {
            Filter::Name(_) => "name",
            Filter::Annotated(_) => "annotated",
            Filter::Access(_) => "access",
            Filter::Visibility(_) => "visibility",
            Filter::DeclaredType(_) => "declared_type",
            Filter::SignatureType(_) => "signature_type",
            Filter::Implements(_) => "implements",
            Filter::InheritsFrom(_) => "inherits_from",
            Filter::HasEntity(_) => "has_entity",
            Filter::Synthesized => "synthesized",
        }
    }

    pub(crate) fn pattern(&self) -> Option<&Pattern> {
        match self {
            Filter::Name(p) | Filter::DeclaredType(p) | Filter::SignatureType(p) => Some(p),
            _ => None,
        }
    }

    fn matches(&self, ctx: &mut Context, element: Element) -> Result<bool> {
        let store = &ctx.store;
        match self {
            Filter::Name(pattern) => pattern.is_match(&store.display_name(element)),
            Filter::Annotated(type_name) => {
                Ok(store.find_annotation(store.anchor(element), type_name).is_some())
            }
            Filter::Access(mask) => Ok(store
                .access_of(store.anchor(element))
                .is_some_and(|flags| flags.contains(*mask))),
            Filter::Visibility(visibility) => Ok(store
                .access_of(store.anchor(element))
                .is_some_and(|flags| flags.visibility() == *visibility)),
            Filter::DeclaredType(pattern) => match store.declared_type_name(element) {
                Some(name) => pattern.is_match(name),
                None => Ok(false),
            },
            Filter::SignatureType(pattern) => match element {
                Element::Signature(id) => pattern.is_match(&store.signature(id).raw),
                other => Err(ArchError::illegal_cast(
                    "filter:signature_type",
                    ElementKind::Signature.to_string(),
                    other.kind().to_string(),
                )),
            },
            Filter::Implements(interface) => {
                let Some(class) = store.owner_class(element) else {
                    return Ok(false);
                };
                let wanted = descriptor::normalize(interface);
                Ok(ctx.all_interfaces(class).iter().any(|name| *name == wanted))
            }
            Filter::InheritsFrom(superclass) => {
                let Some(class) = store.owner_class(element) else {
                    return Ok(false);
                };
                let wanted = descriptor::normalize(superclass);
                Ok(ctx.ancestor_names(class).iter().any(|name| *name == wanted))
            }
            Filter::HasEntity(entity_type) => {
                let anchor = store.anchor(element);
                Ok(match entity_type {
                    Some(entity_type) => ctx.entities.entity_of_type(anchor, entity_type).is_some(),
                    None => ctx.entities.entity_of(anchor).is_some(),
                })
            }
            Filter::Synthesized => Ok(store.is_synthesized(element)),
        }
    }
}

/// Keep the elements for which `filter` holds (or fails, when inverted).
pub(crate) fn apply(
    ctx: &mut Context,
    filter: &Filter,
    invert: bool,
    input: Vec<Element>,
) -> Result<Vec<Element>> {
    let mut kept = Vec::with_capacity(input.len());
    for element in input {
        if filter.matches(ctx, element)? != invert {
            kept.push(element);
        }
    }
    Ok(kept)
}
