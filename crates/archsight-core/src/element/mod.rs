//! Element model: the arena of introspected code elements.
//!
//! This module provides the closed element hierarchy the pipeline traverses:
//! - [`ClassNode`]: classes (input or synthesized stubs)
//! - [`MethodNode`]: methods, including their call-site instructions
//! - [`FieldNode`]: fields
//! - [`ParameterNode`]: method parameters
//! - [`SignatureNode`]: generic type trees, flattened one node per type position
//! - [`AnnotationNode`]: annotations attached to any of the above
//! - [`ValueNode`]: property values produced during a run, anchored to an element
//!
//! The [`ElementStore`] owns every node in dense per-kind arenas, plus:
//! - a class-by-name index (binary names, `/` separated)
//! - an interning table for values, so value identity is payload + anchor
//! - deterministic iteration in insertion order
//!
//! # Identity
//!
//! [`Element`] is a `Copy` tagged enum of arena ids. Two elements are equal iff
//! they reference the same node; no node is ever hashed or compared
//! structurally.
//!
//! # Synthesized elements
//!
//! Stubs stand in for code outside the analyzed input (third-party
//! interfaces, framework base classes). When a real declaration for a stubbed
//! class is inserted later, the stub is filled in place and keeps its id.

mod decl;
pub mod descriptor;

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ArchError, Result};
use crate::value::PropertyValue;

pub use decl::{
    AnnotationDecl, AnnotationValue, ClassDecl, FieldAccessKind, FieldDecl, Instruction,
    InvokeKind, MethodDecl, MethodRef, ParameterDecl, TypeSignature,
};

// ============================================================================
// ID Types
// ============================================================================

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            pub fn new(id: u32) -> Self {
                $name(id)
            }

            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "_{}"), self.0)
            }
        }
    };
}

arena_id!(
    /// Arena index of a class.
    ClassId,
    "cls"
);
arena_id!(
    /// Arena index of a method.
    MethodId,
    "mth"
);
arena_id!(
    /// Arena index of a field.
    FieldId,
    "fld"
);
arena_id!(
    /// Arena index of a method parameter.
    ParameterId,
    "prm"
);
arena_id!(
    /// Arena index of a signature node.
    SignatureId,
    "sig"
);
arena_id!(
    /// Arena index of an annotation.
    AnnotationId,
    "ann"
);
arena_id!(
    /// Arena index of an interned value.
    ValueId,
    "val"
);

// ============================================================================
// Access flags
// ============================================================================

/// JVM access flag bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessFlags(pub u32);

impl AccessFlags {
    pub const PUBLIC: AccessFlags = AccessFlags(0x0001);
    pub const PRIVATE: AccessFlags = AccessFlags(0x0002);
    pub const PROTECTED: AccessFlags = AccessFlags(0x0004);
    pub const STATIC: AccessFlags = AccessFlags(0x0008);
    pub const FINAL: AccessFlags = AccessFlags(0x0010);
    pub const INTERFACE: AccessFlags = AccessFlags(0x0200);
    pub const ABSTRACT: AccessFlags = AccessFlags(0x0400);
    pub const SYNTHETIC: AccessFlags = AccessFlags(0x1000);
    pub const ANNOTATION: AccessFlags = AccessFlags(0x2000);
    pub const ENUM: AccessFlags = AccessFlags(0x4000);

    /// True when every bit of `mask` is set.
    pub fn contains(self, mask: AccessFlags) -> bool {
        self.0 & mask.0 == mask.0
    }

    pub fn visibility(self) -> Visibility {
        if self.contains(AccessFlags::PUBLIC) {
            Visibility::Public
        } else if self.contains(AccessFlags::PROTECTED) {
            Visibility::Protected
        } else if self.contains(AccessFlags::PRIVATE) {
            Visibility::Private
        } else {
            Visibility::Package
        }
    }
}

impl std::ops::BitOr for AccessFlags {
    type Output = AccessFlags;

    fn bitor(self, rhs: AccessFlags) -> AccessFlags {
        AccessFlags(self.0 | rhs.0)
    }
}

/// Visibility derived from access flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Protected,
    Package,
    Private,
}

// ============================================================================
// Element
// ============================================================================

/// Kind tag of an [`Element`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Class,
    Method,
    Field,
    Parameter,
    Signature,
    Annotation,
    Value,
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementKind::Class => "class",
            ElementKind::Method => "method",
            ElementKind::Field => "field",
            ElementKind::Parameter => "parameter",
            ElementKind::Signature => "signature",
            ElementKind::Annotation => "annotation",
            ElementKind::Value => "value",
        };
        f.write_str(name)
    }
}

/// One introspected code unit, referenced by arena id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Element {
    Class(ClassId),
    Method(MethodId),
    Field(FieldId),
    Parameter(ParameterId),
    Signature(SignatureId),
    Annotation(AnnotationId),
    Value(ValueId),
}

impl Element {
    pub fn kind(&self) -> ElementKind {
        match self {
            Element::Class(_) => ElementKind::Class,
            Element::Method(_) => ElementKind::Method,
            Element::Field(_) => ElementKind::Field,
            Element::Parameter(_) => ElementKind::Parameter,
            Element::Signature(_) => ElementKind::Signature,
            Element::Annotation(_) => ElementKind::Annotation,
            Element::Value(_) => ElementKind::Value,
        }
    }

    pub fn as_class(&self) -> Option<ClassId> {
        match self {
            Element::Class(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_method(&self) -> Option<MethodId> {
        match self {
            Element::Method(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_field(&self) -> Option<FieldId> {
        match self {
            Element::Field(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_parameter(&self) -> Option<ParameterId> {
        match self {
            Element::Parameter(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_signature(&self) -> Option<SignatureId> {
        match self {
            Element::Signature(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Option<ValueId> {
        match self {
            Element::Value(id) => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::Class(id) => write!(f, "{}", id),
            Element::Method(id) => write!(f, "{}", id),
            Element::Field(id) => write!(f, "{}", id),
            Element::Parameter(id) => write!(f, "{}", id),
            Element::Signature(id) => write!(f, "{}", id),
            Element::Annotation(id) => write!(f, "{}", id),
            Element::Value(id) => write!(f, "{}", id),
        }
    }
}

// ============================================================================
// Nodes
// ============================================================================

#[derive(Debug, Clone)]
pub struct ClassNode {
    pub class_id: ClassId,
    pub name: String,
    pub access: AccessFlags,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub annotations: Vec<AnnotationId>,
    pub fields: Vec<FieldId>,
    pub methods: Vec<MethodId>,
    pub outer_class: Option<String>,
    /// True for stubs created on demand.
    pub synthesized: bool,
}

impl ClassNode {
    pub fn simple_name(&self) -> &str {
        descriptor::simple_name(&self.name)
    }

    pub fn is_interface(&self) -> bool {
        self.access.contains(AccessFlags::INTERFACE)
    }
}

#[derive(Debug, Clone)]
pub struct MethodNode {
    pub method_id: MethodId,
    pub owner: ClassId,
    pub name: String,
    pub descriptor: String,
    pub access: AccessFlags,
    pub annotations: Vec<AnnotationId>,
    pub parameters: Vec<ParameterId>,
    pub instructions: Vec<Instruction>,
    pub return_signature: Option<SignatureId>,
    pub synthesized: bool,
}

impl MethodNode {
    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }

    pub fn return_type_name(&self) -> Option<&str> {
        descriptor::return_type_name(&self.descriptor)
    }
}

#[derive(Debug, Clone)]
pub struct FieldNode {
    pub field_id: FieldId,
    pub owner: ClassId,
    pub name: String,
    pub descriptor: String,
    pub access: AccessFlags,
    pub annotations: Vec<AnnotationId>,
    pub signature: Option<SignatureId>,
}

#[derive(Debug, Clone)]
pub struct ParameterNode {
    pub parameter_id: ParameterId,
    pub method: MethodId,
    pub index: u32,
    pub name: String,
    pub descriptor: String,
    pub annotations: Vec<AnnotationId>,
    pub signature: Option<SignatureId>,
}

/// Where a signature node sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureOwner {
    MethodReturn(MethodId),
    Field(FieldId),
    Parameter(ParameterId),
    /// Type argument `index` of another signature.
    Argument { parent: SignatureId, index: u32 },
}

#[derive(Debug, Clone)]
pub struct SignatureNode {
    pub signature_id: SignatureId,
    pub raw: String,
    pub args: Vec<SignatureId>,
    pub owner: SignatureOwner,
}

#[derive(Debug, Clone)]
pub struct AnnotationNode {
    pub annotation_id: AnnotationId,
    /// The annotated element (never a value or annotation).
    pub owner: Element,
    pub type_name: String,
    pub values: std::collections::BTreeMap<String, AnnotationValue>,
}

#[derive(Debug, Clone)]
pub struct ValueNode {
    pub value_id: ValueId,
    pub value: PropertyValue,
    /// Element the value was read from.
    pub reference: Element,
}

// ============================================================================
// Store
// ============================================================================

/// Arena storage for every element of one analysis run.
#[derive(Debug, Default)]
pub struct ElementStore {
    classes: Vec<ClassNode>,
    methods: Vec<MethodNode>,
    fields: Vec<FieldNode>,
    parameters: Vec<ParameterNode>,
    signatures: Vec<SignatureNode>,
    annotations: Vec<AnnotationNode>,
    values: Vec<ValueNode>,

    /// binary name → class.
    class_by_name: HashMap<String, ClassId>,
    /// (payload, reference) → interned value.
    value_index: HashMap<(PropertyValue, Element), ValueId>,
    /// Classes supplied as input, in input order.
    input_classes: Vec<ClassId>,
}

impl ElementStore {
    pub fn new() -> Self {
        ElementStore::default()
    }

    /// Build a store from reader output, preserving input order.
    pub fn from_classes(classes: impl IntoIterator<Item = ClassDecl>) -> Self {
        let mut store = ElementStore::new();
        for class in classes {
            store.insert_class(class);
        }
        store
    }

    // ========================================================================
    // Insert Operations
    // ========================================================================

    /// Insert a class declaration.
    ///
    /// A declaration for a class previously synthesized as a stub fills the
    /// stub in place; a duplicate of a real class is ignored.
    pub fn insert_class(&mut self, decl: ClassDecl) -> ClassId {
        let name = descriptor::normalize(&decl.name);
        if let Some(&existing) = self.class_by_name.get(&name) {
            if !self.classes[existing.index()].synthesized {
                tracing::warn!("duplicate class declaration ignored: {}", name);
                return existing;
            }
            tracing::debug!("filling synthesized class {} with its declaration", name);
            self.fill_class(existing, decl);
            self.input_classes.push(existing);
            return existing;
        }

        let class_id = ClassId::new(self.classes.len() as u32);
        self.classes.push(ClassNode {
            class_id,
            name: name.clone(),
            access: decl.access,
            super_name: None,
            interfaces: Vec::new(),
            annotations: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            outer_class: None,
            synthesized: false,
        });
        self.class_by_name.insert(name, class_id);
        self.fill_class(class_id, decl);
        self.input_classes.push(class_id);
        class_id
    }

    fn fill_class(&mut self, class_id: ClassId, decl: ClassDecl) {
        let annotations: Vec<AnnotationId> = decl
            .annotations
            .into_iter()
            .map(|a| self.alloc_annotation(Element::Class(class_id), a))
            .collect();

        {
            let class = &mut self.classes[class_id.index()];
            class.access = decl.access;
            class.super_name = decl.super_name.map(|s| descriptor::normalize(&s));
            class.interfaces = decl
                .interfaces
                .iter()
                .map(|s| descriptor::normalize(s))
                .collect();
            class.annotations = annotations;
            class.outer_class = decl.outer_class.map(|s| descriptor::normalize(&s));
            class.synthesized = false;
        }

        for field in decl.fields {
            let field_id = self.alloc_field(class_id, field);
            self.classes[class_id.index()].fields.push(field_id);
        }

        for method in decl.methods {
            let stub = self.classes[class_id.index()]
                .methods
                .iter()
                .copied()
                .find(|m| {
                    let node = &self.methods[m.index()];
                    node.synthesized && node.name == method.name && node.descriptor == method.descriptor
                });
            match stub {
                Some(method_id) => self.fill_method(method_id, method),
                None => {
                    let method_id = MethodId::new(self.methods.len() as u32);
                    self.methods.push(MethodNode {
                        method_id,
                        owner: class_id,
                        name: method.name.clone(),
                        descriptor: method.descriptor.clone(),
                        access: method.access,
                        annotations: Vec::new(),
                        parameters: Vec::new(),
                        instructions: Vec::new(),
                        return_signature: None,
                        synthesized: false,
                    });
                    self.fill_method(method_id, method);
                    self.classes[class_id.index()].methods.push(method_id);
                }
            }
        }
    }

    fn fill_method(&mut self, method_id: MethodId, decl: MethodDecl) {
        let annotations: Vec<AnnotationId> = decl
            .annotations
            .into_iter()
            .map(|a| self.alloc_annotation(Element::Method(method_id), a))
            .collect();

        let parameters: Vec<ParameterId> = decl
            .parameters
            .into_iter()
            .enumerate()
            .map(|(index, p)| self.alloc_parameter(method_id, index as u32, p))
            .collect();

        let return_signature = decl
            .return_signature
            .as_ref()
            .map(|sig| self.alloc_signature(sig, SignatureOwner::MethodReturn(method_id)));

        let method = &mut self.methods[method_id.index()];
        method.access = decl.access;
        method.annotations = annotations;
        method.parameters = parameters;
        method.instructions = decl.instructions;
        method.return_signature = return_signature;
        method.synthesized = false;
    }

    fn alloc_field(&mut self, owner: ClassId, decl: FieldDecl) -> FieldId {
        let field_id = FieldId::new(self.fields.len() as u32);
        self.fields.push(FieldNode {
            field_id,
            owner,
            name: decl.name,
            descriptor: decl.descriptor,
            access: decl.access,
            annotations: Vec::new(),
            signature: None,
        });
        let annotations = decl
            .annotations
            .into_iter()
            .map(|a| self.alloc_annotation(Element::Field(field_id), a))
            .collect();
        let signature = decl
            .signature
            .as_ref()
            .map(|sig| self.alloc_signature(sig, SignatureOwner::Field(field_id)));

        let field = &mut self.fields[field_id.index()];
        field.annotations = annotations;
        field.signature = signature;
        field_id
    }

    fn alloc_parameter(&mut self, method: MethodId, index: u32, decl: ParameterDecl) -> ParameterId {
        let parameter_id = ParameterId::new(self.parameters.len() as u32);
        self.parameters.push(ParameterNode {
            parameter_id,
            method,
            index,
            name: decl.name,
            descriptor: decl.descriptor,
            annotations: Vec::new(),
            signature: None,
        });
        let annotations = decl
            .annotations
            .into_iter()
            .map(|a| self.alloc_annotation(Element::Parameter(parameter_id), a))
            .collect();
        let signature = decl
            .signature
            .as_ref()
            .map(|sig| self.alloc_signature(sig, SignatureOwner::Parameter(parameter_id)));

        let parameter = &mut self.parameters[parameter_id.index()];
        parameter.annotations = annotations;
        parameter.signature = signature;
        parameter_id
    }

    fn alloc_signature(&mut self, sig: &TypeSignature, owner: SignatureOwner) -> SignatureId {
        let signature_id = SignatureId::new(self.signatures.len() as u32);
        self.signatures.push(SignatureNode {
            signature_id,
            raw: descriptor::normalize(&sig.raw),
            args: Vec::new(),
            owner,
        });
        let args = sig
            .args
            .iter()
            .enumerate()
            .map(|(index, arg)| {
                self.alloc_signature(
                    arg,
                    SignatureOwner::Argument {
                        parent: signature_id,
                        index: index as u32,
                    },
                )
            })
            .collect();
        self.signatures[signature_id.index()].args = args;
        signature_id
    }

    fn alloc_annotation(&mut self, owner: Element, decl: AnnotationDecl) -> AnnotationId {
        let annotation_id = AnnotationId::new(self.annotations.len() as u32);
        self.annotations.push(AnnotationNode {
            annotation_id,
            owner,
            type_name: descriptor::normalize(&decl.type_name),
            values: decl.values,
        });
        annotation_id
    }

    /// Intern a value read from `reference`.
    ///
    /// Interning makes value identity structural: the same payload read from
    /// the same element always yields the same [`ValueId`].
    pub fn intern_value(&mut self, value: PropertyValue, reference: Element) -> ValueId {
        if let Some(&id) = self.value_index.get(&(value.clone(), reference)) {
            return id;
        }
        let value_id = ValueId::new(self.values.len() as u32);
        self.values.push(ValueNode {
            value_id,
            value: value.clone(),
            reference,
        });
        self.value_index.insert((value, reference), value_id);
        value_id
    }

    // ========================================================================
    // Synthesis
    // ========================================================================

    /// Look up a class, creating an empty stub when it is not part of the input.
    pub fn synthesize_class(&mut self, name: &str) -> ClassId {
        let name = descriptor::normalize(name);
        if let Some(&existing) = self.class_by_name.get(&name) {
            return existing;
        }
        let class_id = ClassId::new(self.classes.len() as u32);
        tracing::debug!("synthesizing class {}", name);
        self.classes.push(ClassNode {
            class_id,
            name: name.clone(),
            access: AccessFlags::PUBLIC,
            super_name: None,
            interfaces: Vec::new(),
            annotations: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            outer_class: None,
            synthesized: true,
        });
        self.class_by_name.insert(name, class_id);
        class_id
    }

    /// Look up a method, creating a stub (and its owner) when absent.
    ///
    /// Returns the method and whether it was created by this call.
    pub fn synthesize_method(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<(MethodId, bool)> {
        let class_id = self.synthesize_class(owner);
        if let Some(existing) = self.find_method(class_id, name, Some(descriptor))? {
            return Ok((existing, false));
        }
        let method_id = MethodId::new(self.methods.len() as u32);
        tracing::debug!("synthesizing method {}.{}{}", owner, name, descriptor);
        self.methods.push(MethodNode {
            method_id,
            owner: class_id,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            access: AccessFlags::PUBLIC,
            annotations: Vec::new(),
            parameters: Vec::new(),
            instructions: Vec::new(),
            return_signature: None,
            synthesized: true,
        });
        self.classes[class_id.index()].methods.push(method_id);
        Ok((method_id, true))
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    pub fn class(&self, id: ClassId) -> &ClassNode {
        &self.classes[id.index()]
    }

    pub fn method(&self, id: MethodId) -> &MethodNode {
        &self.methods[id.index()]
    }

    pub fn field(&self, id: FieldId) -> &FieldNode {
        &self.fields[id.index()]
    }

    pub fn parameter(&self, id: ParameterId) -> &ParameterNode {
        &self.parameters[id.index()]
    }

    pub fn signature(&self, id: SignatureId) -> &SignatureNode {
        &self.signatures[id.index()]
    }

    pub fn annotation(&self, id: AnnotationId) -> &AnnotationNode {
        &self.annotations[id.index()]
    }

    pub fn value(&self, id: ValueId) -> &ValueNode {
        &self.values[id.index()]
    }

    /// Class by binary name (`.` or `/` separated).
    pub fn class_by_name(&self, name: &str) -> Option<ClassId> {
        self.class_by_name.get(&descriptor::normalize(name)).copied()
    }

    /// Input classes in input order (stubs excluded unless later filled in).
    pub fn input_classes(&self) -> &[ClassId] {
        &self.input_classes
    }

    /// Every class, input and synthesized, in arena order.
    pub fn class_ids(&self) -> impl Iterator<Item = ClassId> + '_ {
        self.classes.iter().map(|c| c.class_id)
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    /// Method on `owner` matching `name` and, when given, `descriptor`.
    ///
    /// Errors when more than one method matches.
    pub fn find_method(
        &self,
        owner: ClassId,
        name: &str,
        descriptor: Option<&str>,
    ) -> Result<Option<MethodId>> {
        let candidates: Vec<MethodId> = self
            .class(owner)
            .methods
            .iter()
            .copied()
            .filter(|m| {
                let node = self.method(*m);
                node.name == name
                    && match descriptor {
                        Some(d) => node.descriptor == d,
                        None => true,
                    }
            })
            .collect();

        match candidates.len() {
            0 => Ok(None),
            1 => Ok(Some(candidates[0])),
            n => Err(ArchError::AmbiguousMethodResolution {
                owner: self.class(owner).name.clone(),
                name: name.to_string(),
                descriptor: descriptor.unwrap_or("").to_string(),
                candidates: n,
            }),
        }
    }

    // ========================================================================
    // Element views
    // ========================================================================

    /// Resolve value and annotation indirection to the element they describe.
    pub fn anchor(&self, element: Element) -> Element {
        match element {
            Element::Value(id) => self.anchor(self.value(id).reference),
            Element::Annotation(id) => self.anchor(self.annotation(id).owner),
            other => other,
        }
    }

    /// Short display name.
    pub fn display_name(&self, element: Element) -> String {
        match element {
            Element::Class(id) => self.class(id).simple_name().to_string(),
            Element::Method(id) => self.method(id).name.clone(),
            Element::Field(id) => self.field(id).name.clone(),
            Element::Parameter(id) => self.parameter(id).name.clone(),
            Element::Signature(id) => descriptor::simple_name(&self.signature(id).raw).to_string(),
            Element::Annotation(id) => {
                descriptor::simple_name(&self.annotation(id).type_name).to_string()
            }
            Element::Value(id) => self.value(id).value.to_string(),
        }
    }

    /// Qualified description used in diagnostics and error messages.
    pub fn describe(&self, element: Element) -> String {
        match element {
            Element::Class(id) => format!("class {}", self.class(id).name),
            Element::Method(id) => {
                let method = self.method(id);
                format!(
                    "method {}.{}{}",
                    self.class(method.owner).name,
                    method.name,
                    method.descriptor
                )
            }
            Element::Field(id) => {
                let field = self.field(id);
                format!("field {}.{}", self.class(field.owner).name, field.name)
            }
            Element::Parameter(id) => {
                let parameter = self.parameter(id);
                format!(
                    "parameter {} of {}",
                    parameter.name,
                    self.describe(Element::Method(parameter.method))
                )
            }
            Element::Signature(id) => format!("signature {}", self.signature(id).raw),
            Element::Annotation(id) => format!("annotation @{}", self.annotation(id).type_name),
            Element::Value(id) => {
                let value = self.value(id);
                format!("value '{}' of {}", value.value, self.describe(value.reference))
            }
        }
    }

    /// Annotations directly attached to an element.
    pub fn annotations_of(&self, element: Element) -> &[AnnotationId] {
        match element {
            Element::Class(id) => &self.class(id).annotations,
            Element::Method(id) => &self.method(id).annotations,
            Element::Field(id) => &self.field(id).annotations,
            Element::Parameter(id) => &self.parameter(id).annotations,
            Element::Signature(_) | Element::Annotation(_) | Element::Value(_) => &[],
        }
    }

    /// First annotation of the given type on an element.
    pub fn find_annotation(&self, element: Element, type_name: &str) -> Option<AnnotationId> {
        let type_name = descriptor::normalize(type_name);
        self.annotations_of(element)
            .iter()
            .copied()
            .find(|a| self.annotation(*a).type_name == type_name)
    }

    /// Declaring element of a signature: the method, field or parameter whose
    /// type the signature tree describes.
    pub fn signature_root(&self, id: SignatureId) -> Element {
        match self.signature(id).owner {
            SignatureOwner::MethodReturn(m) => Element::Method(m),
            SignatureOwner::Field(f) => Element::Field(f),
            SignatureOwner::Parameter(p) => Element::Parameter(p),
            SignatureOwner::Argument { parent, .. } => self.signature_root(parent),
        }
    }

    /// Class that owns an element, if any.
    pub fn owner_class(&self, element: Element) -> Option<ClassId> {
        match element {
            Element::Class(id) => Some(id),
            Element::Method(id) => Some(self.method(id).owner),
            Element::Field(id) => Some(self.field(id).owner),
            Element::Parameter(id) => Some(self.method(self.parameter(id).method).owner),
            Element::Signature(id) => self.owner_class(self.signature_root(id)),
            Element::Annotation(_) | Element::Value(_) => self.owner_class(self.anchor(element)),
        }
    }

    /// Reinterpret an element as an enclosing element kind.
    ///
    /// Parameters widen to their method or class, methods and fields to their
    /// class, signatures to their declaring element. Widening to the element's
    /// own kind is the identity; anything else yields `None`.
    pub fn widen(&self, element: Element, kind: ElementKind) -> Option<Element> {
        if element.kind() == kind {
            return Some(element);
        }
        match (self.anchor(element), kind) {
            (anchored, _) if anchored != element => self.widen(anchored, kind),
            (_, ElementKind::Class) => self.owner_class(element).map(Element::Class),
            (Element::Parameter(id), ElementKind::Method) => {
                Some(Element::Method(self.parameter(id).method))
            }
            (Element::Signature(id), kind) => self.widen(self.signature_root(id), kind),
            _ => None,
        }
    }

    /// Class named by an element's declared type (field, parameter, method
    /// return, signature raw type).
    pub fn declared_type_name(&self, element: Element) -> Option<&str> {
        match element {
            Element::Field(id) => descriptor::field_type_name(&self.field(id).descriptor),
            Element::Parameter(id) => descriptor::field_type_name(&self.parameter(id).descriptor),
            Element::Method(id) => self.method(id).return_type_name(),
            Element::Signature(id) => Some(&self.signature(id).raw),
            Element::Class(id) => Some(&self.class(id).name),
            Element::Annotation(_) | Element::Value(_) => None,
        }
    }

    /// Access flags of elements that carry them.
    pub fn access_of(&self, element: Element) -> Option<AccessFlags> {
        match element {
            Element::Class(id) => Some(self.class(id).access),
            Element::Method(id) => Some(self.method(id).access),
            Element::Field(id) => Some(self.field(id).access),
            _ => None,
        }
    }

    /// True when the element (or its owning class) is a synthesized stub.
    pub fn is_synthesized(&self, element: Element) -> bool {
        match element {
            Element::Class(id) => self.class(id).synthesized,
            Element::Method(id) => self.method(id).synthesized,
            other => self
                .owner_class(other)
                .is_some_and(|c| self.class(c).synthesized),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
