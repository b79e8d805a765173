//! Compile-only test to verify public API surface.
//!
//! This file serves as a compile-time contract for the public API.
//! If this file fails to compile, the public API has regressed.
//!
//! Run with: cargo test -- api_surface

// Allow unused imports - this test is about compile-time verification, not runtime usage
#![allow(unused_imports)]

// ============================================================================
// Element Model (archsight-core)
// ============================================================================

// element module - arena ids, nodes and input declarations
use archsight::element::{
    AccessFlags, AnnotationDecl, AnnotationId, AnnotationNode, AnnotationValue, ClassDecl,
    ClassId, ClassNode, Element, ElementKind, ElementStore, FieldAccessKind, FieldDecl, FieldId,
    FieldNode, Instruction, InvokeKind, MethodDecl, MethodId, MethodNode, MethodRef,
    ParameterDecl, ParameterId, ParameterNode, SignatureId, SignatureNode, SignatureOwner,
    TypeSignature, ValueId, ValueNode, Visibility,
};

// trace module - provenance of every reached element
use archsight::trace::{ElementTrace, TraceId, TraceRegistry, TraceStats};

// entity module - entity registry and label formatting
use archsight::entity::{
    Entity, EntityId, EntityRegistry, EntityType, LabelFormatter, UpdateStrategy, BACKTRACK,
};

// model module - the serializable result of a run
use archsight::model::{EntityKey, EntityRecord, ModelDiff, SystemModel};

// error module - error types and codes
use archsight::error::{ArchError, ErrorCode, Result};

// config module - layered analysis configuration
use archsight::config::{
    AnalysisConfig, ConfigOverrides, ConfigSource, ConfigValue, ResolvedConfig, ENV_DEBUG,
    ENV_MAX_TRACES, ENV_PROFILE, ENV_STRICT,
};

use archsight::value::PropertyValue;

// ============================================================================
// Pipelines
// ============================================================================

use archsight::action::{
    Action, Chain, Filter, Pattern, SynthesisTarget, TextTransform, Traversal,
};
use archsight::context::{is_functional_interface, Context};
use archsight::dsl::{
    template, ClassScope, FieldScope, MethodScope, ParameterScope, ScopeBuilder, SignatureScope,
    TemplateScope, ValueScope,
};
use archsight::measure::{Measurement, ScopeKind};
use archsight::resolver::{Direction, Resolver};
use archsight::signature::{parse_type_pattern, TypePattern};

// ============================================================================
// Test
// ============================================================================

#[test]
fn api_surface_compiles() {
    // This test exists only to verify imports compile.
    // If you're here because this test broke, you may have
    // accidentally removed a public re-export.
    let _ = std::any::type_name::<Context>();
    let _ = std::any::type_name::<Action>();
    let _ = std::any::type_name::<SystemModel>();
    let _ = std::any::type_name::<TraceRegistry>();
    let _ = std::any::type_name::<EntityRegistry>();
    let _ = std::any::type_name::<ArchError>();
    let _ = std::any::type_name::<Measurement>();
}

#[test]
fn backtrack_key_is_stable() {
    // Serialized models depend on the inverse edge key
    assert_eq!(BACKTRACK, "backtrack");
}
