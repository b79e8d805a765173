//! Structural traversals.
//!
//! A traversal maps each input element to zero or more related elements.
//! Every `(from, to)` pair is reported to the trace registry; the output is
//! deduplicated in first-seen order.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use archsight_core::element::Element;
use archsight_core::error::{ArchError, Result};

use crate::context::Context;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Traversal {
    /// Class → declared methods.
    Methods,
    /// Class → declared fields.
    Fields,
    /// Class → directly implemented interfaces present in the input.
    Interfaces,
    /// Class → superclass.
    Superclass,
    /// Class → enclosing class.
    OuterClass,
    /// Class → classes nested in it.
    NestedClasses,
    /// Method → parameters.
    Parameters,
    /// Method, field or parameter → declaring class.
    Owner,
    /// Parameter → declaring method.
    DeclaringMethod,
    /// Method → class of the return type.
    ReturnType,
    /// Field or parameter → class of the declared type.
    Type,
    /// Method (return), field or parameter → root generic signature.
    Signature,
    /// Signature → type argument at the index.
    TypeArgument(u32),
    /// Signature → class of the raw type.
    SignatureClass,
    /// Method → transitively invoked methods.
    InvokedMethods,
    /// Class, method, field or parameter → annotations.
    Annotations,
}

impl Traversal {
    pub fn id(&self) -> String {
        match self {
            Traversal::Methods => "methods".to_string(),
            Traversal::Fields => "fields".to_string(),
            Traversal::Interfaces => "interfaces".to_string(),
            Traversal::Superclass => "superclass".to_string(),
            Traversal::OuterClass => "outer_class".to_string(),
            Traversal::NestedClasses => "nested_classes".to_string(),
            Traversal::Parameters => "parameters".to_string(),
            Traversal::Owner => "owner".to_string(),
            Traversal::DeclaringMethod => "declaring_method".to_string(),
            Traversal::ReturnType => "return_type".to_string(),
            Traversal::Type => "type".to_string(),
            Traversal::Signature => "signature".to_string(),
            Traversal::TypeArgument(index) => format!("type_argument[{}]", index),
            Traversal::SignatureClass => "signature_class".to_string(),
            Traversal::InvokedMethods => "invoked_methods".to_string(),
            Traversal::Annotations => "annotations".to_string(),
        }
    }

    fn expected(&self) -> &'static str {
        match self {
            Traversal::Methods
            | Traversal::Fields
            | Traversal::Interfaces
            | Traversal::Superclass
            | Traversal::OuterClass
            | Traversal::NestedClasses => "class",
            Traversal::Parameters | Traversal::ReturnType | Traversal::InvokedMethods => "method",
            Traversal::Owner => "method, field or parameter",
            Traversal::DeclaringMethod => "parameter",
            Traversal::Type => "field or parameter",
            Traversal::Signature => "method, field or parameter",
            Traversal::TypeArgument(_) | Traversal::SignatureClass => "signature",
            Traversal::Annotations => "class, method, field or parameter",
        }
    }

    fn cast_error(&self, found: Element) -> ArchError {
        ArchError::illegal_cast(
            format!("explode:{}", self.id()),
            self.expected(),
            found.kind().to_string(),
        )
    }

    /// Elements reached from one element.
    fn step(&self, ctx: &mut Context, from: Element) -> Result<Vec<Element>> {
        let store = &ctx.store;
        let class_named = |name: &str| store.class_by_name(name).map(Element::Class);

        let reached = match (self, from) {
            (Traversal::Methods, Element::Class(id)) => {
                store.class(id).methods.iter().map(|m| Element::Method(*m)).collect()
            }
            (Traversal::Fields, Element::Class(id)) => {
                store.class(id).fields.iter().map(|f| Element::Field(*f)).collect()
            }
            (Traversal::Interfaces, Element::Class(id)) => store
                .class(id)
                .interfaces
                .iter()
                .filter_map(|name| class_named(name.as_str()))
                .collect(),
            (Traversal::Superclass, Element::Class(id)) => store
                .class(id)
                .super_name
                .as_deref()
                .and_then(class_named)
                .into_iter()
                .collect(),
            (Traversal::OuterClass, Element::Class(id)) => store
                .class(id)
                .outer_class
                .as_deref()
                .and_then(class_named)
                .into_iter()
                .collect(),
            (Traversal::NestedClasses, Element::Class(id)) => {
                let name = &store.class(id).name;
                store
                    .class_ids()
                    .filter(|c| store.class(*c).outer_class.as_ref() == Some(name))
                    .map(Element::Class)
                    .collect()
            }
            (Traversal::Parameters, Element::Method(id)) => store
                .method(id)
                .parameters
                .iter()
                .map(|p| Element::Parameter(*p))
                .collect(),
            (
                Traversal::Owner,
                Element::Method(_) | Element::Field(_) | Element::Parameter(_),
            ) => store.owner_class(from).map(Element::Class).into_iter().collect(),
            (Traversal::DeclaringMethod, Element::Parameter(id)) => {
                vec![Element::Method(store.parameter(id).method)]
            }
            (Traversal::ReturnType, Element::Method(id)) => store
                .method(id)
                .return_type_name()
                .and_then(class_named)
                .into_iter()
                .collect(),
            (Traversal::Type, Element::Field(_) | Element::Parameter(_)) => store
                .declared_type_name(from)
                .and_then(class_named)
                .into_iter()
                .collect(),
            (Traversal::Signature, Element::Method(id)) => store
                .method(id)
                .return_signature
                .map(Element::Signature)
                .into_iter()
                .collect(),
            (Traversal::Signature, Element::Field(id)) => store
                .field(id)
                .signature
                .map(Element::Signature)
                .into_iter()
                .collect(),
            (Traversal::Signature, Element::Parameter(id)) => store
                .parameter(id)
                .signature
                .map(Element::Signature)
                .into_iter()
                .collect(),
            (Traversal::TypeArgument(index), Element::Signature(id)) => store
                .signature(id)
                .args
                .get(*index as usize)
                .map(|arg| Element::Signature(*arg))
                .into_iter()
                .collect(),
            (Traversal::SignatureClass, Element::Signature(id)) => {
                class_named(store.signature(id).raw.as_str())
                    .into_iter()
                    .collect()
            }
            (Traversal::InvokedMethods, Element::Method(id)) => ctx
                .invoked_methods(id)?
                .iter()
                .map(|m| Element::Method(*m))
                .collect(),
            (
                Traversal::Annotations,
                Element::Class(_) | Element::Method(_) | Element::Field(_) | Element::Parameter(_),
            ) => store
                .annotations_of(from)
                .iter()
                .map(|a| Element::Annotation(*a))
                .collect(),
            (_, other) => return Err(self.cast_error(other)),
        };
        Ok(reached)
    }
}

/// Apply a traversal to every input element.
pub(crate) fn explode(
    ctx: &mut Context,
    traversal: Traversal,
    input: Vec<Element>,
) -> Result<Vec<Element>> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for from in input {
        for to in traversal.step(ctx, from)? {
            ctx.traces.register_transition(&ctx.store, from, to);
            if seen.insert(to) {
                out.push(to);
            }
        }
    }
    Ok(out)
}
