//! Alpha-network propagation: single-fact filtering.
//!
//! Assert walks the selection chains under each applicable type root,
//! appends the fact to every alpha memory whose path holds, records the
//! membership on the fact wrapper, and right-activates the adapters hanging
//! off each memory. Retract never re-evaluates a predicate — it walks the
//! recorded memberships in reverse. Update re-walks the chains once,
//! diffs the membership set, and sends retract/update/assert to exactly the
//! memories that changed.

use crate::beta;
use crate::context::ExecutionContext;
use crate::error::SessionResult;
use crate::facts::FactId;
use crate::network::{NodeId, ReteNetwork, ReteNode};
use tracing::trace;

/// Propagate a freshly registered fact through the alpha network.
pub(crate) fn assert_fact(
    net: &ReteNetwork,
    ctx: &mut ExecutionContext<'_>,
    roots: &[NodeId],
    fact: FactId,
) -> SessionResult<()> {
    for &root in roots {
        if let ReteNode::Type(type_node) = net.node(root) {
            for &successor in &type_node.successors {
                descend(net, ctx, successor, fact)?;
            }
        }
    }
    Ok(())
}

fn descend(
    net: &ReteNetwork,
    ctx: &mut ExecutionContext<'_>,
    node: NodeId,
    fact: FactId,
) -> SessionResult<()> {
    match net.node(node) {
        ReteNode::Selection(selection) => {
            let passed = {
                let Some(entry) = ctx.memory.entry(fact) else {
                    return Ok(());
                };
                selection.predicate.evaluate(&entry.fact)
            };
            let passed = match passed {
                Ok(passed) => passed,
                Err(error) => {
                    return Err(ctx.condition_failure(
                        format!("selection node {} [{}]", node, selection.predicate.describe()),
                        error,
                    ))
                }
            };
            if passed {
                for &successor in &selection.successors {
                    descend(net, ctx, successor, fact)?;
                }
            }
            Ok(())
        }
        ReteNode::AlphaMemory(memory_node) => {
            if ctx.memory.alpha_memory(memory_node.id).add(fact) {
                if let Some(entry) = ctx.memory.entry_mut(fact) {
                    entry.alpha_memberships.push(memory_node.id);
                }
                trace!(node = memory_node.id, fact, "fact entered alpha memory");
                notify_adapters(net, ctx, memory_node.id, fact, Propagation::Assert)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Remove a fact from the network using its recorded memberships, in
/// reverse assertion order. Never evaluates a predicate.
pub(crate) fn retract_fact(
    net: &ReteNetwork,
    ctx: &mut ExecutionContext<'_>,
    fact: FactId,
) -> SessionResult<()> {
    let memberships = ctx
        .memory
        .entry_mut(fact)
        .map(|entry| std::mem::take(&mut entry.alpha_memberships))
        .unwrap_or_default();
    for &memory_id in memberships.iter().rev() {
        ctx.memory.alpha_memory(memory_id).remove(fact);
        trace!(node = memory_id, fact, "fact left alpha memory");
        notify_adapters(net, ctx, memory_id, fact, Propagation::Retract)?;
    }
    Ok(())
}

/// Re-walk the alpha chains for an updated fact. Memberships that held
/// before and still hold get an update; flipped predicates turn into
/// retracts and asserts on exactly the affected memories.
pub(crate) fn update_fact(
    net: &ReteNetwork,
    ctx: &mut ExecutionContext<'_>,
    roots: &[NodeId],
    fact: FactId,
) -> SessionResult<()> {
    // Read-only pass first: any predicate failure aborts before the
    // network is touched.
    let mut passing: Vec<NodeId> = Vec::new();
    for &root in roots {
        if let ReteNode::Type(type_node) = net.node(root) {
            for &successor in &type_node.successors {
                collect_passing(net, ctx, successor, fact, &mut passing)?;
            }
        }
    }

    let previous = ctx
        .memory
        .entry(fact)
        .map(|entry| entry.alpha_memberships.clone())
        .unwrap_or_default();

    // Lost memberships first, reverse assertion order.
    for &memory_id in previous.iter().rev() {
        if !passing.contains(&memory_id) {
            ctx.memory.alpha_memory(memory_id).remove(fact);
            if let Some(entry) = ctx.memory.entry_mut(fact) {
                entry.alpha_memberships.retain(|m| *m != memory_id);
            }
            notify_adapters(net, ctx, memory_id, fact, Propagation::Retract)?;
        }
    }

    // Retained memberships update in place; gained ones assert.
    for &memory_id in &passing {
        if previous.contains(&memory_id) {
            notify_adapters(net, ctx, memory_id, fact, Propagation::Update)?;
        } else {
            ctx.memory.alpha_memory(memory_id).add(fact);
            if let Some(entry) = ctx.memory.entry_mut(fact) {
                entry.alpha_memberships.push(memory_id);
            }
            notify_adapters(net, ctx, memory_id, fact, Propagation::Assert)?;
        }
    }
    Ok(())
}

fn collect_passing(
    net: &ReteNetwork,
    ctx: &ExecutionContext<'_>,
    node: NodeId,
    fact: FactId,
    passing: &mut Vec<NodeId>,
) -> SessionResult<()> {
    match net.node(node) {
        ReteNode::Selection(selection) => {
            let Some(entry) = ctx.memory.entry(fact) else {
                return Ok(());
            };
            let passed = selection.predicate.evaluate(&entry.fact).map_err(|error| {
                ctx.condition_failure(
                    format!("selection node {} [{}]", node, selection.predicate.describe()),
                    error,
                )
            })?;
            if passed {
                for &successor in &selection.successors {
                    collect_passing(net, ctx, successor, fact, passing)?;
                }
            }
            Ok(())
        }
        ReteNode::AlphaMemory(memory_node) => {
            if !passing.contains(&memory_node.id) {
                passing.push(memory_node.id);
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

#[derive(Clone, Copy)]
enum Propagation {
    Assert,
    Update,
    Retract,
}

fn notify_adapters(
    net: &ReteNetwork,
    ctx: &mut ExecutionContext<'_>,
    memory_id: NodeId,
    fact: FactId,
    kind: Propagation,
) -> SessionResult<()> {
    if let ReteNode::AlphaMemory(memory_node) = net.node(memory_id) {
        for &successor in &memory_node.successors {
            if let ReteNode::Adapter(adapter) = net.node(successor) {
                match kind {
                    Propagation::Assert => beta::right_assert(net, ctx, adapter.target, fact)?,
                    Propagation::Update => beta::right_update(net, ctx, adapter.target, fact)?,
                    Propagation::Retract => beta::right_retract(net, ctx, adapter.target, fact)?,
                }
            }
        }
    }
    Ok(())
}
