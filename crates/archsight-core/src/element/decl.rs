//! Class declarations handed over by the bytecode reader.
//!
//! The core never touches class-file bytes. An external reader produces one
//! [`ClassDecl`] per class; [`ElementStore`](super::ElementStore) flattens the
//! declarations into its arenas. Declarations are plain serde types so readers
//! can also exchange them as JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::AccessFlags;

/// A parsed class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDecl {
    /// Binary name, slash separated (`com/example/Foo`, nested `Foo$Bar`).
    pub name: String,
    #[serde(default)]
    pub access: AccessFlags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub super_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<AnnotationDecl>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldDecl>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<MethodDecl>,
    /// Enclosing class for nested and anonymous classes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outer_class: Option<String>,
}

impl ClassDecl {
    /// Create a public class with no members.
    pub fn new(name: impl Into<String>) -> Self {
        ClassDecl {
            name: name.into(),
            access: AccessFlags::PUBLIC,
            super_name: None,
            interfaces: Vec::new(),
            annotations: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            outer_class: None,
        }
    }

    pub fn with_access(mut self, access: AccessFlags) -> Self {
        self.access = access;
        self
    }

    pub fn with_super(mut self, super_name: impl Into<String>) -> Self {
        self.super_name = Some(super_name.into());
        self
    }

    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    pub fn with_annotation(mut self, annotation: AnnotationDecl) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn with_field(mut self, field: FieldDecl) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_method(mut self, method: MethodDecl) -> Self {
        self.methods.push(method);
        self
    }

    pub fn with_outer_class(mut self, outer: impl Into<String>) -> Self {
        self.outer_class = Some(outer.into());
        self
    }
}

/// A parsed method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDecl {
    pub name: String,
    /// JVM method descriptor, e.g. `(Ljava/lang/String;)V`.
    pub descriptor: String,
    #[serde(default)]
    pub access: AccessFlags,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<AnnotationDecl>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ParameterDecl>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub instructions: Vec<Instruction>,
    /// Generic return type, when the class file carries a signature attribute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_signature: Option<TypeSignature>,
}

impl MethodDecl {
    /// Create a public method with no parameters or body.
    pub fn new(name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        MethodDecl {
            name: name.into(),
            descriptor: descriptor.into(),
            access: AccessFlags::PUBLIC,
            annotations: Vec::new(),
            parameters: Vec::new(),
            instructions: Vec::new(),
            return_signature: None,
        }
    }

    /// Create a public no-arg constructor.
    pub fn constructor() -> Self {
        MethodDecl::new("<init>", "()V")
    }

    pub fn with_access(mut self, access: AccessFlags) -> Self {
        self.access = access;
        self
    }

    pub fn with_annotation(mut self, annotation: AnnotationDecl) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn with_parameter(mut self, parameter: ParameterDecl) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn with_instruction(mut self, instruction: Instruction) -> Self {
        self.instructions.push(instruction);
        self
    }

    pub fn with_instructions(mut self, instructions: impl IntoIterator<Item = Instruction>) -> Self {
        self.instructions.extend(instructions);
        self
    }

    pub fn with_return_signature(mut self, signature: TypeSignature) -> Self {
        self.return_signature = Some(signature);
        self
    }
}

/// A parsed field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    /// JVM field descriptor, e.g. `Lcom/example/Repo;`.
    pub descriptor: String,
    #[serde(default)]
    pub access: AccessFlags,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<AnnotationDecl>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<TypeSignature>,
}

impl FieldDecl {
    /// Create a private field.
    pub fn new(name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        FieldDecl {
            name: name.into(),
            descriptor: descriptor.into(),
            access: AccessFlags::PRIVATE,
            annotations: Vec::new(),
            signature: None,
        }
    }

    pub fn with_access(mut self, access: AccessFlags) -> Self {
        self.access = access;
        self
    }

    pub fn with_annotation(mut self, annotation: AnnotationDecl) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn with_signature(mut self, signature: TypeSignature) -> Self {
        self.signature = Some(signature);
        self
    }
}

/// A parsed method parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDecl {
    pub name: String,
    pub descriptor: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<AnnotationDecl>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<TypeSignature>,
}

impl ParameterDecl {
    pub fn new(name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        ParameterDecl {
            name: name.into(),
            descriptor: descriptor.into(),
            annotations: Vec::new(),
            signature: None,
        }
    }

    pub fn with_annotation(mut self, annotation: AnnotationDecl) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn with_signature(mut self, signature: TypeSignature) -> Self {
        self.signature = Some(signature);
        self
    }
}

/// A runtime-visible annotation with its element values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationDecl {
    /// Binary name of the annotation type.
    pub type_name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub values: BTreeMap<String, AnnotationValue>,
}

impl AnnotationDecl {
    pub fn new(type_name: impl Into<String>) -> Self {
        AnnotationDecl {
            type_name: type_name.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, key: impl Into<String>, value: AnnotationValue) -> Self {
        self.values.insert(key.into(), value);
        self
    }
}

/// Annotation element value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AnnotationValue {
    Str(String),
    Int(i64),
    Bool(bool),
    /// Enum constant, stored as `Type.CONSTANT`.
    Enum(String),
    /// Class literal, stored as the binary name.
    Class(String),
    Array(Vec<AnnotationValue>),
}

impl AnnotationValue {
    /// Flatten arrays into their scalar members.
    pub fn flatten(&self) -> Vec<&AnnotationValue> {
        match self {
            AnnotationValue::Array(values) => values.iter().flat_map(|v| v.flatten()).collect(),
            scalar => vec![scalar],
        }
    }
}

/// A generic type tree, e.g. `Map<String, List<Pair<Payload, Integer>>>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeSignature {
    /// Raw (erased) type name, binary form.
    pub raw: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<TypeSignature>,
}

impl TypeSignature {
    /// A signature with no type arguments.
    pub fn new(raw: impl Into<String>) -> Self {
        TypeSignature {
            raw: raw.into(),
            args: Vec::new(),
        }
    }

    /// A parameterized signature.
    pub fn generic(raw: impl Into<String>, args: Vec<TypeSignature>) -> Self {
        TypeSignature {
            raw: raw.into(),
            args,
        }
    }
}

/// Reference to a method by owner, name and descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodRef {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

impl MethodRef {
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Self {
        MethodRef {
            owner: owner.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }
}

/// Kind of a method call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvokeKind {
    Virtual,
    Static,
    Special,
    Interface,
}

/// Kind of a field access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldAccessKind {
    Get,
    Put,
    GetStatic,
    PutStatic,
}

impl FieldAccessKind {
    pub fn is_static(&self) -> bool {
        matches!(self, FieldAccessKind::GetStatic | FieldAccessKind::PutStatic)
    }
}

/// The subset of bytecode instructions the analysis looks at.
///
/// Everything else is collapsed into [`Instruction::Other`] by the reader;
/// it is kept only so instruction adjacency (load followed by cast) stays
/// meaningful.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Instruction {
    Invoke {
        kind: InvokeKind,
        owner: String,
        name: String,
        descriptor: String,
    },
    /// Lambda or method reference; `implementation` is the bootstrap's
    /// implementation method handle when it could be decoded.
    InvokeDynamic {
        interface_owner: String,
        interface_method: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        implementation: Option<MethodRef>,
    },
    FieldAccess {
        kind: FieldAccessKind,
        owner: String,
        name: String,
        descriptor: String,
    },
    New {
        type_name: String,
    },
    CheckCast {
        type_name: String,
    },
    Other,
}

impl Instruction {
    fn invoke(
        kind: InvokeKind,
        owner: impl Into<String>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Self {
        Instruction::Invoke {
            kind,
            owner: owner.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }

    pub fn invoke_virtual(
        owner: impl Into<String>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Self {
        Self::invoke(InvokeKind::Virtual, owner, name, descriptor)
    }

    pub fn invoke_static(
        owner: impl Into<String>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Self {
        Self::invoke(InvokeKind::Static, owner, name, descriptor)
    }

    pub fn invoke_special(
        owner: impl Into<String>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Self {
        Self::invoke(InvokeKind::Special, owner, name, descriptor)
    }

    pub fn invoke_interface(
        owner: impl Into<String>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Self {
        Self::invoke(InvokeKind::Interface, owner, name, descriptor)
    }

    /// `new T` followed by the `<init>` call the compiler always emits.
    pub fn construct(type_name: impl Into<String>, descriptor: impl Into<String>) -> Vec<Self> {
        let type_name = type_name.into();
        vec![
            Instruction::New {
                type_name: type_name.clone(),
            },
            Self::invoke_special(type_name, "<init>", descriptor),
        ]
    }

    pub fn invoke_dynamic(
        interface_owner: impl Into<String>,
        interface_method: impl Into<String>,
        implementation: Option<MethodRef>,
    ) -> Self {
        Instruction::InvokeDynamic {
            interface_owner: interface_owner.into(),
            interface_method: interface_method.into(),
            implementation,
        }
    }

    pub fn field_access(
        kind: FieldAccessKind,
        owner: impl Into<String>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Self {
        Instruction::FieldAccess {
            kind,
            owner: owner.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }

    pub fn check_cast(type_name: impl Into<String>) -> Self {
        Instruction::CheckCast {
            type_name: type_name.into(),
        }
    }
}
