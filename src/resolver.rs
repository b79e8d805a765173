//! Relationship resolvers over the call, instantiation and field-access graphs.
//!
//! Where `RegisterChildren` relates entities through traces, a resolver
//! relates them through what a method's code does:
//! - [`Resolver::Instantiations`]: classes whose constructor is called by the
//!   method or anything it transitively invokes;
//! - [`Resolver::Invocations`]: methods transitively invoked, excluding calls
//!   back into the caller's own class;
//! - [`Resolver::FieldAccess`]: fields read or written by the method or
//!   anything it transitively invokes.
//!
//! Matching targets are entity-bound elements of the target type. Every match
//! is linked; ties are never broken.
//!
//! [`Direction::Of`] links `parent[key] = target`; [`Direction::By`] links the
//! inverse edge, `target[key] = parent`. Either way the registry records the
//! `backtrack` edge on the other side.

use std::collections::{BTreeSet, HashMap};
use std::iter;

use serde::{Deserialize, Serialize};

use archsight_core::element::{ClassId, Element, Instruction, MethodId};
use archsight_core::entity::{EntityId, EntityType};
use archsight_core::error::{ArchError, Result};

use crate::context::Context;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolver {
    Instantiations,
    Invocations,
    FieldAccess,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// `parent[key] = target`
    Of,
    /// `target[key] = parent`
    By,
}

impl Direction {
    pub fn id(&self) -> &'static str {
        match self {
            Direction::Of => "of",
            Direction::By => "by",
        }
    }
}

impl Resolver {
    pub fn id(&self) -> &'static str {
        match self {
            Resolver::Instantiations => "instantiations",
            Resolver::Invocations => "invocations",
            Resolver::FieldAccess => "field_access",
        }
    }

    /// Target entities reached from one method.
    fn targets(
        &self,
        ctx: &mut Context,
        method: MethodId,
        candidates: &HashMap<Element, EntityId>,
    ) -> Result<BTreeSet<EntityId>> {
        let closure = ctx.invoked_methods(method)?;
        let store = &ctx.store;
        let lookup = |element: Element| candidates.get(&element).copied();
        let class_named = |name: &str| store.class_by_name(name);

        let mut found = BTreeSet::new();
        match self {
            Resolver::Instantiations => {
                for m in iter::once(method).chain(closure.iter().copied()) {
                    let caller = store.method(m);
                    let caller_class = store.class(caller.owner);
                    for insn in &caller.instructions {
                        let Instruction::Invoke { owner, name, .. } = insn else {
                            continue;
                        };
                        if name != "<init>" {
                            continue;
                        }
                        // super(...) and this(...) chains construct nothing new
                        let chained = caller.is_constructor()
                            && (*owner == caller_class.name
                                || caller_class.super_name.as_deref() == Some(owner.as_str()));
                        if chained {
                            continue;
                        }
                        found.extend(class_named(owner.as_str()).and_then(|c| lookup(Element::Class(c))));
                    }
                }
            }
            Resolver::Invocations => {
                let caller_class = store.method(method).owner;
                for &target in closure.iter() {
                    let node = store.method(target);
                    if node.owner == caller_class || node.is_constructor() {
                        continue;
                    }
                    found.extend(
                        lookup(Element::Method(target)).or_else(|| lookup(Element::Class(node.owner))),
                    );
                }
            }
            Resolver::FieldAccess => {
                let mut accesses: Vec<(ClassId, String)> = Vec::new();
                for m in iter::once(method).chain(closure.iter().copied()) {
                    for insn in &store.method(m).instructions {
                        if let Instruction::FieldAccess { owner, name, .. } = insn {
                            if let Some(class) = class_named(owner.as_str()) {
                                accesses.push((class, name.clone()));
                            }
                        }
                    }
                }
                for (class, name) in accesses {
                    let field = ctx.resolve_field(class, &name);
                    let hit = field
                        .and_then(|f| lookup(Element::Field(f)))
                        .or_else(|| {
                            field.and_then(|f| lookup(Element::Class(ctx.store.field(f).owner)))
                        })
                        .or_else(|| lookup(Element::Class(class)));
                    found.extend(hit);
                }
            }
        }
        Ok(found)
    }
}

/// Methods a resolver starts from for one element in scope.
fn methods_of(ctx: &Context, action: &str, element: Element) -> Result<Vec<MethodId>> {
    let store = &ctx.store;
    match store.anchor(element) {
        Element::Method(id) => Ok(vec![id]),
        Element::Class(id) => Ok(store.class(id).methods.clone()),
        Element::Parameter(id) => Ok(vec![store.parameter(id).method]),
        other => Err(ArchError::illegal_cast(
            action,
            "class, method or parameter",
            other.kind().to_string(),
        )),
    }
}

/// Link related entities for every element in scope.
pub(crate) fn register_from_resolver(
    ctx: &mut Context,
    resolver: Resolver,
    direction: Direction,
    parent: &EntityType,
    key: &str,
    target: &EntityType,
    input: &[Element],
) -> Result<()> {
    ctx.entities.require_declared(parent)?;
    ctx.entities.require_declared(target)?;

    let candidates: HashMap<Element, EntityId> = ctx.entities.registered(target).collect();
    let action = format!("resolver:{}", resolver.id());
    let mut links = 0usize;

    for &element in input {
        let parents = ctx
            .traces
            .find_related_entities(&ctx.store, element, parent, &ctx.entities);
        if parents.is_empty() {
            return Err(ArchError::entity_not_found(
                parent,
                ctx.store.describe(ctx.store.anchor(element)),
            ));
        }

        let mut targets = BTreeSet::new();
        for method in methods_of(ctx, &action, element)? {
            targets.extend(resolver.targets(ctx, method, &candidates)?);
        }

        for &p in &parents {
            for &t in &targets {
                if p == t {
                    continue;
                }
                match direction {
                    Direction::Of => ctx.entities.add_child(p, key, t),
                    Direction::By => ctx.entities.add_child(t, key, p),
                };
                links += 1;
            }
        }
    }

    tracing::debug!(
        "{} {:?} {}[{}]: {} links over {} elements",
        resolver.id(),
        direction,
        parent,
        key,
        links,
        input.len()
    );
    Ok(())
}
