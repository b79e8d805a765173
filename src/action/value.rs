//! Value-producing leaves: names, annotation fields, constants, text edits.
//!
//! Values are interned against the element they were read from, so they
//! resolve to that element's traces and never add trace entries of their own.

use serde::{Deserialize, Serialize};

use archsight_core::element::{AnnotationValue, Element};
use archsight_core::error::{ArchError, Result};
use archsight_core::value::PropertyValue;

use super::filter::Pattern;
use crate::context::Context;

/// String rewrite applied by `EditText`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "edit", rename_all = "snake_case")]
pub enum TextTransform {
    /// Regex replacement; `$1`-style group references are expanded.
    Replace { pattern: Pattern, replacement: String },
    Prefix { text: String },
    Suffix { text: String },
    Lowercase,
    Uppercase,
}

impl TextTransform {
    pub fn id(&self) -> &'static str {
        match self {
            TextTransform::Replace { .. } => "replace",
            TextTransform::Prefix { .. } => "prefix",
            TextTransform::Suffix { .. } => "suffix",
            TextTransform::Lowercase => "lowercase",
            TextTransform::Uppercase => "uppercase",
        }
    }

    pub fn apply(&self, text: &str) -> Result<String> {
        Ok(match self {
            TextTransform::Replace {
                pattern,
                replacement,
            } => pattern
                .regex()?
                .replace_all(text, replacement.as_str())
                .into_owned(),
            TextTransform::Prefix { text: prefix } => format!("{}{}", prefix, text),
            TextTransform::Suffix { text: suffix } => format!("{}{}", text, suffix),
            TextTransform::Lowercase => text.to_lowercase(),
            TextTransform::Uppercase => text.to_uppercase(),
        })
    }
}

fn annotation_scalar(value: &AnnotationValue) -> Option<PropertyValue> {
    match value {
        AnnotationValue::Str(s) | AnnotationValue::Enum(s) => Some(PropertyValue::Str(s.clone())),
        AnnotationValue::Int(i) => Some(PropertyValue::Int(*i)),
        AnnotationValue::Bool(b) => Some(PropertyValue::Bool(*b)),
        AnnotationValue::Class(name) => Some(PropertyValue::Type(name.clone())),
        AnnotationValue::Array(_) => None,
    }
}

pub(crate) fn read_name(ctx: &mut Context, input: Vec<Element>) -> Vec<Element> {
    input
        .into_iter()
        .map(|element| {
            let name = ctx.store.display_name(element);
            Element::Value(ctx.store.intern_value(PropertyValue::Str(name), element))
        })
        .collect()
}

/// One value per scalar of `annotation.field`; elements without it are dropped.
pub(crate) fn read_annotation_field(
    ctx: &mut Context,
    annotation: &str,
    field: &str,
    input: Vec<Element>,
) -> Vec<Element> {
    let mut out = Vec::new();
    for element in input {
        let anchor = ctx.store.anchor(element);
        let Some(annotation_id) = ctx.store.find_annotation(anchor, annotation) else {
            continue;
        };
        let values: Vec<PropertyValue> = match ctx.store.annotation(annotation_id).values.get(field)
        {
            Some(value) => value.flatten().into_iter().filter_map(annotation_scalar).collect(),
            None => continue,
        };
        for value in values {
            let id = ctx
                .store
                .intern_value(value, Element::Annotation(annotation_id));
            out.push(Element::Value(id));
        }
    }
    out
}

pub(crate) fn with_value(
    ctx: &mut Context,
    value: &PropertyValue,
    input: Vec<Element>,
) -> Vec<Element> {
    input
        .into_iter()
        .map(|element| Element::Value(ctx.store.intern_value(value.clone(), element)))
        .collect()
}

/// Rewrite value elements; the result keeps the original value's reference.
pub(crate) fn edit_text(
    ctx: &mut Context,
    edit: &TextTransform,
    input: Vec<Element>,
) -> Result<Vec<Element>> {
    let mut out = Vec::with_capacity(input.len());
    for element in input {
        let Element::Value(id) = element else {
            return Err(ArchError::illegal_cast(
                format!("edit_text:{}", edit.id()),
                "value",
                element.kind().to_string(),
            ));
        };
        let node = ctx.store.value(id);
        let reference = node.reference;
        let text = match &node.value {
            PropertyValue::Str(s) | PropertyValue::Type(s) => s.clone(),
            other => other.to_string(),
        };
        let edited = PropertyValue::Str(edit.apply(&text)?);
        out.push(Element::Value(ctx.store.intern_value(edited, reference)));
    }
    Ok(out)
}
