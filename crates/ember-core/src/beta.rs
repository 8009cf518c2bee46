//! Beta-network propagation: joins, negations, aggregates, bindings and
//! terminals.
//!
//! Every operation is depth-first: a node finishes propagating one input
//! item through its whole downstream before looking at the next partner.
//! Partner enumeration always reads the insertion-ordered key indexes, so
//! the emitted event sequence is reproducible for a given network and input
//! order.
//!
//! Left activations carry tuples admitted by a node's parent; right
//! activations carry facts arriving from an alpha memory through an
//! adapter. Child tuples are deduplicated per (parent, fact) lineage in the
//! creating node's memory.

use crate::agenda::Activation;
use crate::context::ExecutionContext;
use crate::error::SessionResult;
use crate::events::{ActivationInfo, SessionEvent};
use crate::facts::{Fact, FactHandle, FactId, RuleId};
use crate::network::{NodeId, ReteNetwork, ReteNode};
use crate::predicate::{FactKeySelector, TupleKeySelector};
use crate::tuples::TupleId;
use ember_types::FactValue;
use std::sync::Arc;
use tracing::trace;

// ---------------------------------------------------------------------------
// key evaluation
// ---------------------------------------------------------------------------

fn tuple_key(
    ctx: &ExecutionContext<'_>,
    selector: &Arc<dyn TupleKeySelector>,
    tuple: TupleId,
    node: NodeId,
) -> SessionResult<Option<FactValue>> {
    let facts = ctx.memory.tuple_facts(tuple);
    selector.select(&facts).map_err(|error| {
        ctx.condition_failure(format!("node {} left key [{}]", node, selector.describe()), error)
    })
}

fn fact_key(
    ctx: &ExecutionContext<'_>,
    selector: &Arc<dyn FactKeySelector>,
    fact: FactId,
    node: NodeId,
) -> SessionResult<Option<FactValue>> {
    let Some(entry) = ctx.memory.entry(fact) else {
        return Ok(None);
    };
    selector.select(&entry.fact).map_err(|error| {
        ctx.condition_failure(format!("node {} right key [{}]", node, selector.describe()), error)
    })
}

// ---------------------------------------------------------------------------
// child tuple lifecycle
// ---------------------------------------------------------------------------

fn make_child(
    net: &ReteNetwork,
    ctx: &mut ExecutionContext<'_>,
    node: NodeId,
    parent: TupleId,
    fact: FactId,
    successors: &[NodeId],
) -> SessionResult<()> {
    if ctx.memory.beta_memory(node).by_lineage.contains_key(&(parent, fact)) {
        return Ok(());
    }
    let child = ctx.memory.tuples.create(node, parent, fact);
    let memory = ctx.memory.beta_memory(node);
    memory.by_lineage.insert((parent, fact), child);
    memory.admit(child);
    trace!(node, parent, fact, child, "child tuple created");
    for &successor in successors {
        left_assert(net, ctx, successor, child)?;
    }
    Ok(())
}

fn remove_child(
    net: &ReteNetwork,
    ctx: &mut ExecutionContext<'_>,
    node: NodeId,
    parent: TupleId,
    fact: FactId,
    successors: &[NodeId],
) -> SessionResult<()> {
    let Some(child) = ctx.memory.beta_memory(node).by_lineage.remove(&(parent, fact)) else {
        return Ok(());
    };
    ctx.memory.beta_memory(node).evict(child);
    for &successor in successors {
        left_retract(net, ctx, successor, child)?;
    }
    ctx.memory.tuples.remove(child);
    trace!(node, parent, fact, child, "child tuple removed");
    Ok(())
}

fn update_child(
    net: &ReteNetwork,
    ctx: &mut ExecutionContext<'_>,
    node: NodeId,
    parent: TupleId,
    fact: FactId,
    successors: &[NodeId],
) -> SessionResult<()> {
    let Some(&child) = ctx.memory.beta_memory(node).by_lineage.get(&(parent, fact)) else {
        return Ok(());
    };
    for &successor in successors {
        left_update(net, ctx, successor, child)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// left activation
// ---------------------------------------------------------------------------

pub(crate) fn left_assert(
    net: &ReteNetwork,
    ctx: &mut ExecutionContext<'_>,
    node: NodeId,
    tuple: TupleId,
) -> SessionResult<()> {
    match net.node(node) {
        ReteNode::Join(join) => {
            let Some(key) = tuple_key(ctx, &join.left_key, tuple, node)? else {
                return Ok(());
            };
            let partners: Vec<FactId> = {
                let memory = ctx.memory.beta_memory(node);
                memory.left.insert(key.clone(), tuple);
                memory.right.matches(&key).to_vec()
            };
            for fact in partners {
                make_child(net, ctx, node, tuple, fact, &join.successors)?;
            }
            Ok(())
        }
        ReteNode::TupleSelection(selection) => {
            let passed = {
                let facts = ctx.memory.tuple_facts(tuple);
                selection.predicate.evaluate(&facts)
            };
            let passed = passed.map_err(|error| {
                ctx.condition_failure(
                    format!("tuple selection {} [{}]", node, selection.predicate.describe()),
                    error,
                )
            })?;
            if passed {
                ctx.memory.beta_memory(node).admit(tuple);
                for &successor in &selection.successors {
                    left_assert(net, ctx, successor, tuple)?;
                }
            }
            Ok(())
        }
        ReteNode::Not(not) => negation_left_assert(
            net,
            ctx,
            node,
            tuple,
            &not.left_key,
            &not.successors,
            false,
        ),
        ReteNode::Exists(exists) => negation_left_assert(
            net,
            ctx,
            node,
            tuple,
            &exists.left_key,
            &exists.successors,
            true,
        ),
        ReteNode::Aggregate(aggregate) => {
            let key = tuple_key(ctx, &aggregate.left_key, tuple, node)?;
            let members: Vec<FactId> = match &key {
                Some(key) => {
                    let memory = ctx.memory.beta_memory(node);
                    memory.left.insert(key.clone(), tuple);
                    memory.right.matches(key).to_vec()
                }
                None => Vec::new(),
            };
            let memory = ctx.memory.beta_memory(node);
            let group = memory.groups.entry(tuple).or_default();
            group.members = members;
            group.emitted = None;
            reevaluate_group(net, ctx, node, tuple)
        }
        ReteNode::Binding(binding) => {
            let value = {
                let facts = ctx.memory.tuple_facts(tuple);
                binding.expr.compute(&facts)
            };
            let value = value.map_err(|error| {
                ctx.condition_failure(
                    format!("binding node {} [{}]", node, binding.expr.describe()),
                    error,
                )
            })?;
            let synthetic =
                Fact::new(binding.result_type.clone()).with_field("value", value);
            let fact = ctx.memory.register_derived(synthetic);
            let child = ctx.memory.tuples.create(node, tuple, fact);
            let memory = ctx.memory.beta_memory(node);
            memory.by_lineage.insert((tuple, fact), child);
            memory.projections.insert(tuple, (fact, child));
            memory.admit(child);
            for &successor in &binding.successors {
                left_assert(net, ctx, successor, child)?;
            }
            Ok(())
        }
        ReteNode::Terminal(terminal) => {
            if !ctx.memory.beta_memory(node).admit(tuple) {
                return Ok(());
            }
            let fact_ids = ctx.memory.tuples.fact_ids(tuple);
            let facts: Vec<(String, FactId)> = terminal
                .declarations
                .iter()
                .cloned()
                .zip(fact_ids.iter().copied())
                .collect();
            let seq = ctx.agenda.next_seq();
            let priority = ctx.rules[terminal.rule as usize].priority;
            let activation = Activation { rule: terminal.rule, tuple, seq, facts };
            if ctx.agenda.add(activation, priority) {
                let info = activation_info(ctx, terminal.rule, tuple, &terminal.declarations);
                trace!(rule = terminal.rule, tuple, seq, "activation created");
                ctx.publish(|| SessionEvent::ActivationCreated { activation: info });
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

pub(crate) fn left_retract(
    net: &ReteNetwork,
    ctx: &mut ExecutionContext<'_>,
    node: NodeId,
    tuple: TupleId,
) -> SessionResult<()> {
    match net.node(node) {
        ReteNode::Join(join) => {
            let Some(key) = ctx.memory.beta_memory(node).left.remove(tuple) else {
                return Ok(());
            };
            let partners: Vec<FactId> =
                ctx.memory.beta_memory(node).right.matches(&key).to_vec();
            for fact in partners {
                remove_child(net, ctx, node, tuple, fact, &join.successors)?;
            }
            Ok(())
        }
        ReteNode::TupleSelection(selection) => {
            if ctx.memory.beta_memory(node).evict(tuple) {
                for &successor in &selection.successors {
                    left_retract(net, ctx, successor, tuple)?;
                }
            }
            Ok(())
        }
        ReteNode::Not(not) => {
            negation_left_retract(net, ctx, node, tuple, &not.successors)
        }
        ReteNode::Exists(exists) => {
            negation_left_retract(net, ctx, node, tuple, &exists.successors)
        }
        ReteNode::Aggregate(aggregate) => {
            ctx.memory.beta_memory(node).left.remove(tuple);
            let emitted = ctx
                .memory
                .beta_memory(node)
                .groups
                .remove(&tuple)
                .and_then(|group| group.emitted);
            if let Some((fact, child)) = emitted {
                let memory = ctx.memory.beta_memory(node);
                memory.evict(child);
                memory.by_lineage.remove(&(tuple, fact));
                for &successor in &aggregate.successors {
                    left_retract(net, ctx, successor, child)?;
                }
                ctx.memory.tuples.remove(child);
                ctx.memory.unregister(fact);
            }
            Ok(())
        }
        ReteNode::Binding(binding) => {
            let Some((fact, child)) = ctx.memory.beta_memory(node).projections.remove(&tuple)
            else {
                return Ok(());
            };
            let memory = ctx.memory.beta_memory(node);
            memory.evict(child);
            memory.by_lineage.remove(&(tuple, fact));
            for &successor in &binding.successors {
                left_retract(net, ctx, successor, child)?;
            }
            ctx.memory.tuples.remove(child);
            ctx.memory.unregister(fact);
            Ok(())
        }
        ReteNode::Terminal(terminal) => {
            if ctx.memory.beta_memory(node).evict(tuple) {
                let info = activation_info(ctx, terminal.rule, tuple, &terminal.declarations);
                ctx.agenda.remove(terminal.rule, tuple);
                trace!(rule = terminal.rule, tuple, "activation deleted");
                ctx.publish(|| SessionEvent::ActivationDeleted { activation: info });
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

pub(crate) fn left_update(
    net: &ReteNetwork,
    ctx: &mut ExecutionContext<'_>,
    node: NodeId,
    tuple: TupleId,
) -> SessionResult<()> {
    match net.node(node) {
        ReteNode::Join(join) => {
            let new_key = tuple_key(ctx, &join.left_key, tuple, node)?;
            let old_key = ctx.memory.beta_memory(node).left.key_of(tuple).cloned();
            match (old_key, new_key) {
                (Some(old), Some(new)) if old == new => {
                    let partners: Vec<FactId> =
                        ctx.memory.beta_memory(node).right.matches(&new).to_vec();
                    for fact in partners {
                        update_child(net, ctx, node, tuple, fact, &join.successors)?;
                    }
                    Ok(())
                }
                (old, new) => {
                    if let Some(old) = old {
                        ctx.memory.beta_memory(node).left.remove(tuple);
                        let partners: Vec<FactId> =
                            ctx.memory.beta_memory(node).right.matches(&old).to_vec();
                        for fact in partners {
                            remove_child(net, ctx, node, tuple, fact, &join.successors)?;
                        }
                    }
                    if let Some(new) = new {
                        let partners: Vec<FactId> = {
                            let memory = ctx.memory.beta_memory(node);
                            memory.left.insert(new.clone(), tuple);
                            memory.right.matches(&new).to_vec()
                        };
                        for fact in partners {
                            make_child(net, ctx, node, tuple, fact, &join.successors)?;
                        }
                    }
                    Ok(())
                }
            }
        }
        ReteNode::TupleSelection(selection) => {
            let passed = {
                let facts = ctx.memory.tuple_facts(tuple);
                selection.predicate.evaluate(&facts)
            };
            let passed = passed.map_err(|error| {
                ctx.condition_failure(
                    format!("tuple selection {} [{}]", node, selection.predicate.describe()),
                    error,
                )
            })?;
            let admitted = ctx.memory.beta_memory(node).contains(tuple);
            match (admitted, passed) {
                (true, true) => {
                    for &successor in &selection.successors {
                        left_update(net, ctx, successor, tuple)?;
                    }
                }
                (true, false) => {
                    ctx.memory.beta_memory(node).evict(tuple);
                    for &successor in &selection.successors {
                        left_retract(net, ctx, successor, tuple)?;
                    }
                }
                (false, true) => {
                    ctx.memory.beta_memory(node).admit(tuple);
                    for &successor in &selection.successors {
                        left_assert(net, ctx, successor, tuple)?;
                    }
                }
                (false, false) => {}
            }
            Ok(())
        }
        ReteNode::Not(not) => negation_left_update(
            net,
            ctx,
            node,
            tuple,
            &not.left_key,
            &not.successors,
            false,
        ),
        ReteNode::Exists(exists) => negation_left_update(
            net,
            ctx,
            node,
            tuple,
            &exists.left_key,
            &exists.successors,
            true,
        ),
        ReteNode::Aggregate(aggregate) => {
            let new_key = tuple_key(ctx, &aggregate.left_key, tuple, node)?;
            let old_key = ctx.memory.beta_memory(node).left.key_of(tuple).cloned();
            if old_key == new_key {
                // Same group; members unchanged, but ancestors of the
                // synthetic tuple did change.
                let emitted =
                    ctx.memory.beta_memory(node).groups.get(&tuple).and_then(|g| g.emitted);
                if let Some((_, child)) = emitted {
                    for &successor in &aggregate.successors {
                        left_update(net, ctx, successor, child)?;
                    }
                }
                return Ok(());
            }
            // Group key changed: rebuild the group against the new key.
            left_retract(net, ctx, node, tuple)?;
            left_assert(net, ctx, node, tuple)
        }
        ReteNode::Binding(binding) => {
            let value = {
                let facts = ctx.memory.tuple_facts(tuple);
                binding.expr.compute(&facts)
            };
            let value = value.map_err(|error| {
                ctx.condition_failure(
                    format!("binding node {} [{}]", node, binding.expr.describe()),
                    error,
                )
            })?;
            let Some(&(fact, child)) = ctx.memory.beta_memory(node).projections.get(&tuple)
            else {
                return Ok(());
            };
            if let Some(entry) = ctx.memory.entry_mut(fact) {
                entry.fact.set("value", value);
            }
            for &successor in &binding.successors {
                left_update(net, ctx, successor, child)?;
            }
            Ok(())
        }
        ReteNode::Terminal(terminal) => {
            if ctx.memory.beta_memory(node).contains(tuple) {
                let priority = ctx.rules[terminal.rule as usize].priority;
                ctx.agenda.modify(terminal.rule, tuple, priority);
                let info = activation_info(ctx, terminal.rule, tuple, &terminal.declarations);
                trace!(rule = terminal.rule, tuple, "activation updated");
                ctx.publish(|| SessionEvent::ActivationUpdated { activation: info });
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// right activation
// ---------------------------------------------------------------------------

pub(crate) fn right_assert(
    net: &ReteNetwork,
    ctx: &mut ExecutionContext<'_>,
    node: NodeId,
    fact: FactId,
) -> SessionResult<()> {
    match net.node(node) {
        ReteNode::Join(join) => {
            let Some(key) = fact_key(ctx, &join.right_key, fact, node)? else {
                return Ok(());
            };
            let lefts: Vec<TupleId> = {
                let memory = ctx.memory.beta_memory(node);
                memory.right.insert(key.clone(), fact);
                memory.left.matches(&key).to_vec()
            };
            for left in lefts {
                make_child(net, ctx, node, left, fact, &join.successors)?;
            }
            Ok(())
        }
        ReteNode::Not(not) => {
            negation_right_assert(net, ctx, node, fact, &not.right_key, &not.successors, false)
        }
        ReteNode::Exists(exists) => {
            negation_right_assert(net, ctx, node, fact, &exists.right_key, &exists.successors, true)
        }
        ReteNode::Aggregate(aggregate) => {
            let Some(key) = fact_key(ctx, &aggregate.right_key, fact, node)? else {
                return Ok(());
            };
            let lefts: Vec<TupleId> = {
                let memory = ctx.memory.beta_memory(node);
                memory.right.insert(key.clone(), fact);
                memory.left.matches(&key).to_vec()
            };
            for left in lefts {
                if let Some(group) = ctx.memory.beta_memory(node).groups.get_mut(&left) {
                    group.members.push(fact);
                }
                reevaluate_group(net, ctx, node, left)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

pub(crate) fn right_retract(
    net: &ReteNetwork,
    ctx: &mut ExecutionContext<'_>,
    node: NodeId,
    fact: FactId,
) -> SessionResult<()> {
    match net.node(node) {
        ReteNode::Join(join) => {
            let Some(key) = ctx.memory.beta_memory(node).right.remove(fact) else {
                return Ok(());
            };
            let lefts: Vec<TupleId> = ctx.memory.beta_memory(node).left.matches(&key).to_vec();
            for left in lefts {
                remove_child(net, ctx, node, left, fact, &join.successors)?;
            }
            Ok(())
        }
        ReteNode::Not(not) => {
            negation_right_retract(net, ctx, node, fact, &not.successors, false)
        }
        ReteNode::Exists(exists) => {
            negation_right_retract(net, ctx, node, fact, &exists.successors, true)
        }
        ReteNode::Aggregate(_) => {
            let Some(key) = ctx.memory.beta_memory(node).right.remove(fact) else {
                return Ok(());
            };
            let lefts: Vec<TupleId> = ctx.memory.beta_memory(node).left.matches(&key).to_vec();
            for left in lefts {
                if let Some(group) = ctx.memory.beta_memory(node).groups.get_mut(&left) {
                    group.members.retain(|member| *member != fact);
                }
                reevaluate_group(net, ctx, node, left)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

pub(crate) fn right_update(
    net: &ReteNetwork,
    ctx: &mut ExecutionContext<'_>,
    node: NodeId,
    fact: FactId,
) -> SessionResult<()> {
    match net.node(node) {
        ReteNode::Join(join) => {
            let new_key = fact_key(ctx, &join.right_key, fact, node)?;
            let old_key = ctx.memory.beta_memory(node).right.key_of(fact).cloned();
            match (old_key, new_key) {
                (Some(old), Some(new)) if old == new => {
                    let lefts: Vec<TupleId> =
                        ctx.memory.beta_memory(node).left.matches(&new).to_vec();
                    for left in lefts {
                        update_child(net, ctx, node, left, fact, &join.successors)?;
                    }
                    Ok(())
                }
                (old, new) => {
                    if let Some(old) = old {
                        ctx.memory.beta_memory(node).right.remove(fact);
                        let lefts: Vec<TupleId> =
                            ctx.memory.beta_memory(node).left.matches(&old).to_vec();
                        for left in lefts {
                            remove_child(net, ctx, node, left, fact, &join.successors)?;
                        }
                    }
                    if let Some(new) = new {
                        let lefts: Vec<TupleId> = {
                            let memory = ctx.memory.beta_memory(node);
                            memory.right.insert(new.clone(), fact);
                            memory.left.matches(&new).to_vec()
                        };
                        for left in lefts {
                            make_child(net, ctx, node, left, fact, &join.successors)?;
                        }
                    }
                    Ok(())
                }
            }
        }
        ReteNode::Not(not) => {
            negation_right_update(net, ctx, node, fact, &not.right_key, &not.successors, false)
        }
        ReteNode::Exists(exists) => {
            negation_right_update(net, ctx, node, fact, &exists.right_key, &exists.successors, true)
        }
        ReteNode::Aggregate(aggregate) => {
            let new_key = fact_key(ctx, &aggregate.right_key, fact, node)?;
            let old_key = ctx.memory.beta_memory(node).right.key_of(fact).cloned();
            if old_key == new_key {
                // Same groups, member value changed: re-run the aggregator.
                if let Some(key) = new_key {
                    let lefts: Vec<TupleId> =
                        ctx.memory.beta_memory(node).left.matches(&key).to_vec();
                    for left in lefts {
                        reevaluate_group(net, ctx, node, left)?;
                    }
                }
                return Ok(());
            }
            right_retract(net, ctx, node, fact)?;
            right_assert(net, ctx, node, fact)
        }
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// not / exists
// ---------------------------------------------------------------------------

fn match_count(ctx: &mut ExecutionContext<'_>, node: NodeId, key: &Option<FactValue>) -> usize {
    match key {
        Some(key) => ctx.memory.beta_memory(node).right.matches(key).len(),
        None => 0,
    }
}

fn negation_admits(count: usize, exists: bool) -> bool {
    if exists {
        count > 0
    } else {
        count == 0
    }
}

fn negation_left_assert(
    net: &ReteNetwork,
    ctx: &mut ExecutionContext<'_>,
    node: NodeId,
    tuple: TupleId,
    left_key: &Arc<dyn TupleKeySelector>,
    successors: &[NodeId],
    exists: bool,
) -> SessionResult<()> {
    let key = tuple_key(ctx, left_key, tuple, node)?;
    let count = match_count(ctx, node, &key);
    let memory = ctx.memory.beta_memory(node);
    if let Some(key) = key {
        memory.left.insert(key, tuple);
    }
    memory.counts.insert(tuple, count);
    if negation_admits(count, exists) {
        memory.admit(tuple);
        for &successor in successors {
            left_assert(net, ctx, successor, tuple)?;
        }
    }
    Ok(())
}

fn negation_left_retract(
    net: &ReteNetwork,
    ctx: &mut ExecutionContext<'_>,
    node: NodeId,
    tuple: TupleId,
    successors: &[NodeId],
) -> SessionResult<()> {
    let memory = ctx.memory.beta_memory(node);
    memory.left.remove(tuple);
    memory.counts.remove(&tuple);
    if memory.evict(tuple) {
        for &successor in successors {
            left_retract(net, ctx, successor, tuple)?;
        }
    }
    Ok(())
}

fn negation_left_update(
    net: &ReteNetwork,
    ctx: &mut ExecutionContext<'_>,
    node: NodeId,
    tuple: TupleId,
    left_key: &Arc<dyn TupleKeySelector>,
    successors: &[NodeId],
    exists: bool,
) -> SessionResult<()> {
    let new_key = tuple_key(ctx, left_key, tuple, node)?;
    let old_key = ctx.memory.beta_memory(node).left.key_of(tuple).cloned();
    if old_key == new_key {
        if ctx.memory.beta_memory(node).contains(tuple) {
            for &successor in successors {
                left_update(net, ctx, successor, tuple)?;
            }
        }
        return Ok(());
    }

    let was_admitted = ctx.memory.beta_memory(node).contains(tuple);
    let count = match_count(ctx, node, &new_key);
    let memory = ctx.memory.beta_memory(node);
    memory.left.remove(tuple);
    if let Some(key) = new_key {
        memory.left.insert(key, tuple);
    }
    memory.counts.insert(tuple, count);
    let admits = negation_admits(count, exists);
    match (was_admitted, admits) {
        (true, true) => {
            for &successor in successors {
                left_update(net, ctx, successor, tuple)?;
            }
        }
        (true, false) => {
            ctx.memory.beta_memory(node).evict(tuple);
            for &successor in successors {
                left_retract(net, ctx, successor, tuple)?;
            }
        }
        (false, true) => {
            ctx.memory.beta_memory(node).admit(tuple);
            for &successor in successors {
                left_assert(net, ctx, successor, tuple)?;
            }
        }
        (false, false) => {}
    }
    Ok(())
}

fn negation_right_assert(
    net: &ReteNetwork,
    ctx: &mut ExecutionContext<'_>,
    node: NodeId,
    fact: FactId,
    right_key: &Arc<dyn FactKeySelector>,
    successors: &[NodeId],
    exists: bool,
) -> SessionResult<()> {
    let Some(key) = fact_key(ctx, right_key, fact, node)? else {
        return Ok(());
    };
    let lefts: Vec<TupleId> = {
        let memory = ctx.memory.beta_memory(node);
        memory.right.insert(key.clone(), fact);
        memory.left.matches(&key).to_vec()
    };
    for left in lefts {
        let count = {
            let memory = ctx.memory.beta_memory(node);
            let count = memory.counts.entry(left).or_insert(0);
            *count += 1;
            *count
        };
        if count == 1 {
            // zero -> one transition
            if exists {
                if ctx.memory.beta_memory(node).admit(left) {
                    for &successor in successors {
                        left_assert(net, ctx, successor, left)?;
                    }
                }
            } else if ctx.memory.beta_memory(node).evict(left) {
                for &successor in successors {
                    left_retract(net, ctx, successor, left)?;
                }
            }
        }
    }
    Ok(())
}

fn negation_right_retract(
    net: &ReteNetwork,
    ctx: &mut ExecutionContext<'_>,
    node: NodeId,
    fact: FactId,
    successors: &[NodeId],
    exists: bool,
) -> SessionResult<()> {
    let Some(key) = ctx.memory.beta_memory(node).right.remove(fact) else {
        return Ok(());
    };
    let lefts: Vec<TupleId> = ctx.memory.beta_memory(node).left.matches(&key).to_vec();
    for left in lefts {
        let count = {
            let memory = ctx.memory.beta_memory(node);
            let count = memory.counts.entry(left).or_insert(1);
            *count = count.saturating_sub(1);
            *count
        };
        if count == 0 {
            // one -> zero transition
            if exists {
                if ctx.memory.beta_memory(node).evict(left) {
                    for &successor in successors {
                        left_retract(net, ctx, successor, left)?;
                    }
                }
            } else if ctx.memory.beta_memory(node).admit(left) {
                for &successor in successors {
                    left_assert(net, ctx, successor, left)?;
                }
            }
        }
    }
    Ok(())
}

fn negation_right_update(
    net: &ReteNetwork,
    ctx: &mut ExecutionContext<'_>,
    node: NodeId,
    fact: FactId,
    right_key: &Arc<dyn FactKeySelector>,
    successors: &[NodeId],
    exists: bool,
) -> SessionResult<()> {
    let new_key = fact_key(ctx, right_key, fact, node)?;
    let old_key = ctx.memory.beta_memory(node).right.key_of(fact).cloned();
    if old_key == new_key {
        // The fact neither entered nor left any group; admitted left tuples
        // do not contain it, so nothing propagates.
        return Ok(());
    }
    negation_right_retract(net, ctx, node, fact, successors, exists)?;
    negation_right_assert(net, ctx, node, fact, right_key, successors, exists)
}

// ---------------------------------------------------------------------------
// aggregate groups
// ---------------------------------------------------------------------------

fn reevaluate_group(
    net: &ReteNetwork,
    ctx: &mut ExecutionContext<'_>,
    node: NodeId,
    left: TupleId,
) -> SessionResult<()> {
    let ReteNode::Aggregate(aggregate) = net.node(node) else {
        return Ok(());
    };
    let (members, emitted) = match ctx.memory.beta_memory(node).groups.get(&left) {
        Some(group) => (group.members.clone(), group.emitted),
        None => return Ok(()),
    };
    let result = {
        let facts = ctx.memory.facts_for(&members);
        aggregate.aggregator.evaluate(&facts)
    };
    let result = result.map_err(|error| {
        ctx.condition_failure(
            format!("aggregate node {} [{}]", node, aggregate.aggregator.name()),
            error,
        )
    })?;

    match (emitted, result) {
        (None, None) => Ok(()),
        (None, Some(value)) => {
            let synthetic = Fact::new(aggregate.result_type.clone())
                .with_field("value", value)
                .with_field("count", FactValue::Integer(members.len() as i64));
            let fact = ctx.memory.register_derived(synthetic);
            let child = ctx.memory.tuples.create(node, left, fact);
            let memory = ctx.memory.beta_memory(node);
            memory.by_lineage.insert((left, fact), child);
            memory.admit(child);
            if let Some(group) = memory.groups.get_mut(&left) {
                group.emitted = Some((fact, child));
            }
            trace!(node, left, fact, "aggregate result emitted");
            for &successor in &aggregate.successors {
                left_assert(net, ctx, successor, child)?;
            }
            Ok(())
        }
        (Some((fact, child)), None) => {
            let memory = ctx.memory.beta_memory(node);
            memory.evict(child);
            memory.by_lineage.remove(&(left, fact));
            if let Some(group) = memory.groups.get_mut(&left) {
                group.emitted = None;
            }
            trace!(node, left, fact, "aggregate result withdrawn");
            for &successor in &aggregate.successors {
                left_retract(net, ctx, successor, child)?;
            }
            ctx.memory.tuples.remove(child);
            ctx.memory.unregister(fact);
            Ok(())
        }
        (Some((fact, child)), Some(value)) => {
            if let Some(entry) = ctx.memory.entry_mut(fact) {
                entry.fact.set("value", value);
                entry.fact.set("count", FactValue::Integer(members.len() as i64));
            }
            for &successor in &aggregate.successors {
                left_update(net, ctx, successor, child)?;
            }
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// activation payloads
// ---------------------------------------------------------------------------

fn activation_info(
    ctx: &ExecutionContext<'_>,
    rule: RuleId,
    tuple: TupleId,
    declarations: &[String],
) -> ActivationInfo {
    let fact_ids = ctx.memory.tuples.fact_ids(tuple);
    ActivationInfo {
        rule,
        rule_name: ctx.rules[rule as usize].name.clone(),
        tuple,
        facts: declarations
            .iter()
            .cloned()
            .zip(fact_ids.iter().map(|&id| FactHandle(id)))
            .collect(),
    }
}
