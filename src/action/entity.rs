//! Entity-writing steps: relation wiring through traces and property writes.

use archsight_core::element::Element;
use archsight_core::entity::{EntityType, UpdateStrategy};
use archsight_core::error::{ArchError, Result};

use crate::context::Context;

/// Link `parent[key] = child` for every parent/child pair related to each
/// element in scope.
///
/// Errors:
/// - `EntityNotFound` when an element bound to `child` has no related parent;
/// - `UnresolvedParentRelation` when both types have entities, the scope is
///   not empty and not a single pair could be linked.
pub(crate) fn register_children(
    ctx: &mut Context,
    parent: &EntityType,
    key: &str,
    child: &EntityType,
    input: &[Element],
) -> Result<()> {
    ctx.entities.require_declared(parent)?;
    ctx.entities.require_declared(child)?;

    let mut links = 0usize;
    for &element in input {
        let anchor = ctx.store.anchor(element);
        let parents = ctx
            .traces
            .find_related_entities(&ctx.store, element, parent, &ctx.entities);
        let children = ctx
            .traces
            .find_related_entities(&ctx.store, element, child, &ctx.entities);

        if parents.is_empty() && ctx.entities.entity_of_type(anchor, child).is_some() {
            return Err(ArchError::entity_not_found(parent, ctx.store.describe(anchor)));
        }

        for &p in &parents {
            for &c in &children {
                if p != c {
                    ctx.entities.add_child(p, key, c);
                    links += 1;
                }
            }
        }
    }

    let populated = !ctx.entities.entities_of_type(parent).is_empty()
        && !ctx.entities.entities_of_type(child).is_empty();
    if links == 0 && populated && !input.is_empty() {
        return Err(ArchError::UnresolvedParentRelation {
            parent: parent.to_string(),
            key: key.to_string(),
            child: child.to_string(),
        });
    }
    tracing::debug!("{}[{}] = {}: {} links", parent, key, child, links);
    Ok(())
}

/// Write each input value to its target entities.
///
/// Without `entity_type` the target is the entity bound to the value's
/// anchor element; with it, every entity of that type related through traces.
pub(crate) fn update_property(
    ctx: &mut Context,
    key: &str,
    strategy: UpdateStrategy,
    entity_type: Option<&EntityType>,
    input: &[Element],
) -> Result<()> {
    if let Some(entity_type) = entity_type {
        ctx.entities.require_declared(entity_type)?;
    }

    for &element in input {
        let Element::Value(id) = element else {
            return Err(ArchError::illegal_cast(
                format!("property:{}", key),
                "value",
                element.kind().to_string(),
            ));
        };
        let anchor = ctx.store.anchor(element);
        let targets = match entity_type {
            Some(entity_type) => {
                let related =
                    ctx.traces
                        .find_related_entities(&ctx.store, element, entity_type, &ctx.entities);
                if related.is_empty() {
                    return Err(ArchError::entity_not_found(
                        entity_type,
                        ctx.store.describe(anchor),
                    ));
                }
                related
            }
            None => match ctx.entities.entity_of(anchor) {
                Some(entity) => vec![entity],
                None => {
                    return Err(ArchError::entity_not_found(
                        "any",
                        ctx.store.describe(anchor),
                    ))
                }
            },
        };

        let value = ctx.store.value(id).value.clone();
        for target in targets {
            ctx.entities.set_property(target, key, value.clone(), strategy);
        }
    }
    Ok(())
}
