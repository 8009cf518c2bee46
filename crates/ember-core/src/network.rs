//! The compiled Rete network: node arena, rule definitions, and the
//! builder that assembles both.
//!
//! Nodes live in a flat arena indexed by [`NodeId`]; parent and successor
//! links are indices, never references, so the structure has no ownership
//! cycles and snapshots are a linear walk. The network is immutable once
//! built — a session borrows it read-only while propagating into its own
//! working memory.
//!
//! ```text
//! type root ─ selection* ─ alpha memory ─ adapter ┐
//!                                                 ├─ join ─ … ─ terminal
//! beta root ──────────────(left channel)──────────┘
//! ```

use crate::aggregate::Aggregator;
use crate::context::RuleAction;
use crate::error::{EngineError, SessionResult};
use crate::facts::RuleId;
use crate::predicate::{
    ConstantKey, FactKeySelector, FactPredicate, FieldKey, TupleFieldKey, TupleKeySelector,
    TuplePredicate, BindingExpr,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Index of a node in the arena.
pub type NodeId = usize;

/// Dispatches facts of one declared type into its selection chains.
#[derive(Debug)]
pub struct TypeNode {
    pub id: NodeId,
    pub fact_type: String,
    pub successors: Vec<NodeId>,
}

/// Single-fact predicate filter.
#[derive(Debug)]
pub struct SelectionNode {
    pub id: NodeId,
    pub predicate: Arc<dyn FactPredicate>,
    pub successors: Vec<NodeId>,
}

/// Leaf of an alpha chain; owns one alpha memory (in working memory) and
/// feeds the adapters hanging off it.
#[derive(Debug)]
pub struct AlphaMemoryNode {
    pub id: NodeId,
    pub successors: Vec<NodeId>,
}

/// Seeds the beta network with the root tuple.
#[derive(Debug)]
pub struct BetaRootNode {
    pub id: NodeId,
    pub successors: Vec<NodeId>,
}

/// Injects an alpha memory onto the right channel of one join-family node.
#[derive(Debug)]
pub struct AdapterNode {
    pub id: NodeId,
    /// Alpha memory this adapter reads.
    pub source: NodeId,
    /// Join/not/exists/aggregate node fed by this adapter.
    pub target: NodeId,
}

/// Joins left tuples with right facts on matching keys.
#[derive(Debug)]
pub struct JoinNode {
    pub id: NodeId,
    pub parent: NodeId,
    pub alpha_source: NodeId,
    pub left_key: Arc<dyn TupleKeySelector>,
    pub right_key: Arc<dyn FactKeySelector>,
    pub successors: Vec<NodeId>,
}

/// Filters whole tuples.
#[derive(Debug)]
pub struct TupleSelectionNode {
    pub id: NodeId,
    pub parent: NodeId,
    pub predicate: Arc<dyn TuplePredicate>,
    pub successors: Vec<NodeId>,
}

/// Admits a left tuple only while zero right facts match it.
#[derive(Debug)]
pub struct NotNode {
    pub id: NodeId,
    pub parent: NodeId,
    pub alpha_source: NodeId,
    pub left_key: Arc<dyn TupleKeySelector>,
    pub right_key: Arc<dyn FactKeySelector>,
    pub successors: Vec<NodeId>,
}

/// Admits a left tuple only while at least one right fact matches it.
#[derive(Debug)]
pub struct ExistsNode {
    pub id: NodeId,
    pub parent: NodeId,
    pub alpha_source: NodeId,
    pub left_key: Arc<dyn TupleKeySelector>,
    pub right_key: Arc<dyn FactKeySelector>,
    pub successors: Vec<NodeId>,
}

/// Groups matching right facts per left tuple and emits one synthetic fact
/// per group.
#[derive(Debug)]
pub struct AggregateNode {
    pub id: NodeId,
    pub parent: NodeId,
    pub alpha_source: NodeId,
    pub left_key: Arc<dyn TupleKeySelector>,
    pub right_key: Arc<dyn FactKeySelector>,
    pub aggregator: Arc<dyn Aggregator>,
    /// Type tag of the emitted synthetic fact.
    pub result_type: String,
    pub successors: Vec<NodeId>,
}

/// Projects a computed value into the tuple as a synthetic fact.
#[derive(Debug)]
pub struct BindingNode {
    pub id: NodeId,
    pub parent: NodeId,
    pub expr: Arc<dyn BindingExpr>,
    pub result_type: String,
    pub successors: Vec<NodeId>,
}

/// Converts admitted tuples into agenda activations.
#[derive(Debug)]
pub struct TerminalNode {
    pub id: NodeId,
    pub parent: NodeId,
    pub rule: RuleId,
    /// Names of the bound facts, in tuple order.
    pub declarations: Vec<String>,
}

/// One node of the compiled network.
#[derive(Debug)]
pub enum ReteNode {
    Type(TypeNode),
    Selection(SelectionNode),
    AlphaMemory(AlphaMemoryNode),
    BetaRoot(BetaRootNode),
    Adapter(AdapterNode),
    Join(JoinNode),
    TupleSelection(TupleSelectionNode),
    Not(NotNode),
    Exists(ExistsNode),
    Aggregate(AggregateNode),
    Binding(BindingNode),
    Terminal(TerminalNode),
}

impl ReteNode {
    pub fn id(&self) -> NodeId {
        match self {
            ReteNode::Type(n) => n.id,
            ReteNode::Selection(n) => n.id,
            ReteNode::AlphaMemory(n) => n.id,
            ReteNode::BetaRoot(n) => n.id,
            ReteNode::Adapter(n) => n.id,
            ReteNode::Join(n) => n.id,
            ReteNode::TupleSelection(n) => n.id,
            ReteNode::Not(n) => n.id,
            ReteNode::Exists(n) => n.id,
            ReteNode::Aggregate(n) => n.id,
            ReteNode::Binding(n) => n.id,
            ReteNode::Terminal(n) => n.id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ReteNode::Type(_) => "type",
            ReteNode::Selection(_) => "selection",
            ReteNode::AlphaMemory(_) => "alpha-memory",
            ReteNode::BetaRoot(_) => "beta-root",
            ReteNode::Adapter(_) => "adapter",
            ReteNode::Join(_) => "join",
            ReteNode::TupleSelection(_) => "tuple-selection",
            ReteNode::Not(_) => "not",
            ReteNode::Exists(_) => "exists",
            ReteNode::Aggregate(_) => "aggregate",
            ReteNode::Binding(_) => "binding",
            ReteNode::Terminal(_) => "terminal",
        }
    }

    pub fn successors(&self) -> &[NodeId] {
        match self {
            ReteNode::Type(n) => &n.successors,
            ReteNode::Selection(n) => &n.successors,
            ReteNode::AlphaMemory(n) => &n.successors,
            ReteNode::BetaRoot(n) => &n.successors,
            ReteNode::Adapter(_) | ReteNode::Terminal(_) => &[],
            ReteNode::Join(n) => &n.successors,
            ReteNode::TupleSelection(n) => &n.successors,
            ReteNode::Not(n) => &n.successors,
            ReteNode::Exists(n) => &n.successors,
            ReteNode::Aggregate(n) => &n.successors,
            ReteNode::Binding(n) => &n.successors,
        }
    }

    /// Display label used by snapshots.
    pub fn label(&self) -> String {
        match self {
            ReteNode::Type(n) => n.fact_type.clone(),
            ReteNode::Selection(n) => n.predicate.describe(),
            ReteNode::AlphaMemory(_) => String::new(),
            ReteNode::BetaRoot(_) => String::new(),
            ReteNode::Adapter(n) => format!("alpha {} -> {}", n.source, n.target),
            ReteNode::Join(n) => {
                format!("{} == {}", n.left_key.describe(), n.right_key.describe())
            }
            ReteNode::TupleSelection(n) => n.predicate.describe(),
            ReteNode::Not(n) => format!("not [{}]", n.right_key.describe()),
            ReteNode::Exists(n) => format!("exists [{}]", n.right_key.describe()),
            ReteNode::Aggregate(n) => n.aggregator.name().to_string(),
            ReteNode::Binding(n) => n.expr.describe(),
            ReteNode::Terminal(n) => format!("rule {}", n.rule),
        }
    }
}

/// A compiled rule: identity, ordering metadata and the actions to run.
pub struct RuleDefinition {
    pub id: RuleId,
    pub name: String,
    /// Higher fires first; ties break FIFO by activation sequence.
    pub priority: i32,
    /// Optional agenda group, selectable via agenda filters.
    pub group: Option<String>,
    pub actions: Vec<Arc<dyn RuleAction>>,
}

impl std::fmt::Debug for RuleDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleDefinition")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("group", &self.group)
            .field("actions", &self.actions.len())
            .finish()
    }
}

/// The compiled, immutable network a session runs against.
#[derive(Debug)]
pub struct ReteNetwork {
    nodes: Vec<ReteNode>,
    type_roots: HashMap<String, NodeId>,
    beta_root: NodeId,
    rules: Vec<Arc<RuleDefinition>>,
}

impl ReteNetwork {
    pub fn node(&self, id: NodeId) -> &ReteNode {
        &self.nodes[id]
    }

    pub fn nodes(&self) -> &[ReteNode] {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn beta_root(&self) -> NodeId {
        self.beta_root
    }

    pub fn rules(&self) -> &[Arc<RuleDefinition>] {
        &self.rules
    }

    pub fn rule(&self, id: RuleId) -> &Arc<RuleDefinition> {
        &self.rules[id as usize]
    }

    /// Type nodes applicable to a concrete fact type, nearest ancestor
    /// first. Callers cache the result per concrete type.
    pub fn dispatch_roots(
        &self,
        ancestry: &[&str],
    ) -> Vec<NodeId> {
        ancestry.iter().filter_map(|t| self.type_roots.get(*t).copied()).collect()
    }
}

/// Equality test between a field of an earlier declaration and a field of
/// the pattern under construction.
#[derive(Debug, Clone)]
pub struct JoinTest {
    pub declaration: String,
    pub left_field: String,
    pub right_field: String,
}

/// Shorthand constructor for the common equality join test.
pub fn join_on(
    declaration: impl Into<String>,
    left_field: impl Into<String>,
    right_field: impl Into<String>,
) -> JoinTest {
    JoinTest {
        declaration: declaration.into(),
        left_field: left_field.into(),
        right_field: right_field.into(),
    }
}

enum PatternElement {
    Match {
        name: String,
        fact_type: String,
        conditions: Vec<Arc<dyn FactPredicate>>,
        joins: Vec<JoinTest>,
    },
    Negation {
        fact_type: String,
        conditions: Vec<Arc<dyn FactPredicate>>,
        joins: Vec<JoinTest>,
        exists: bool,
    },
    Aggregate {
        name: String,
        fact_type: String,
        conditions: Vec<Arc<dyn FactPredicate>>,
        joins: Vec<JoinTest>,
        aggregator: Arc<dyn Aggregator>,
    },
    Selection {
        predicate: Arc<dyn TuplePredicate>,
    },
    Binding {
        name: String,
        expr: Arc<dyn BindingExpr>,
    },
}

/// Declarative form of one rule, consumed by [`NetworkBuilder::add_rule`].
pub struct RuleSpec {
    name: String,
    priority: i32,
    group: Option<String>,
    elements: Vec<PatternElement>,
    actions: Vec<Arc<dyn RuleAction>>,
}

impl RuleSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: 0,
            group: None,
            elements: Vec::new(),
            actions: Vec::new(),
        }
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Match a fact of `fact_type`, binding it under `name`.
    pub fn when(
        mut self,
        name: impl Into<String>,
        fact_type: impl Into<String>,
        conditions: Vec<Arc<dyn FactPredicate>>,
    ) -> Self {
        self.elements.push(PatternElement::Match {
            name: name.into(),
            fact_type: fact_type.into(),
            conditions,
            joins: Vec::new(),
        });
        self
    }

    /// Like [`when`](Self::when), with equality join tests against earlier
    /// declarations.
    pub fn when_join(
        mut self,
        name: impl Into<String>,
        fact_type: impl Into<String>,
        conditions: Vec<Arc<dyn FactPredicate>>,
        joins: Vec<JoinTest>,
    ) -> Self {
        self.elements.push(PatternElement::Match {
            name: name.into(),
            fact_type: fact_type.into(),
            conditions,
            joins,
        });
        self
    }

    /// Require that no matching fact exists.
    pub fn not(
        mut self,
        fact_type: impl Into<String>,
        conditions: Vec<Arc<dyn FactPredicate>>,
        joins: Vec<JoinTest>,
    ) -> Self {
        self.elements.push(PatternElement::Negation {
            fact_type: fact_type.into(),
            conditions,
            joins,
            exists: false,
        });
        self
    }

    /// Require that at least one matching fact exists, without binding it.
    pub fn exists(
        mut self,
        fact_type: impl Into<String>,
        conditions: Vec<Arc<dyn FactPredicate>>,
        joins: Vec<JoinTest>,
    ) -> Self {
        self.elements.push(PatternElement::Negation {
            fact_type: fact_type.into(),
            conditions,
            joins,
            exists: true,
        });
        self
    }

    /// Group matching facts and bind the aggregate result under `name`.
    pub fn aggregate(
        mut self,
        name: impl Into<String>,
        fact_type: impl Into<String>,
        conditions: Vec<Arc<dyn FactPredicate>>,
        joins: Vec<JoinTest>,
        aggregator: impl Aggregator + 'static,
    ) -> Self {
        self.elements.push(PatternElement::Aggregate {
            name: name.into(),
            fact_type: fact_type.into(),
            conditions,
            joins,
            aggregator: Arc::new(aggregator),
        });
        self
    }

    /// Filter the tuple built so far.
    pub fn select(mut self, predicate: impl TuplePredicate + 'static) -> Self {
        self.elements.push(PatternElement::Selection { predicate: Arc::new(predicate) });
        self
    }

    /// Project a computed value into the tuple under `name`.
    pub fn bind(mut self, name: impl Into<String>, expr: impl BindingExpr + 'static) -> Self {
        self.elements.push(PatternElement::Binding { name: name.into(), expr: Arc::new(expr) });
        self
    }

    /// Append an action; actions run in order when the rule fires.
    pub fn execute(mut self, action: impl RuleAction + 'static) -> Self {
        self.actions.push(Arc::new(action));
        self
    }
}

/// Assembles rule specs into a shared network, reusing identical alpha
/// chains across rules.
pub struct NetworkBuilder {
    nodes: Vec<ReteNode>,
    type_roots: HashMap<String, NodeId>,
    beta_root: NodeId,
    rules: Vec<Arc<RuleDefinition>>,
    // (parent node, predicate share key) -> existing selection node
    selection_cache: HashMap<(NodeId, String), NodeId>,
    // chain end -> its alpha memory
    memory_cache: HashMap<NodeId, NodeId>,
}

impl NetworkBuilder {
    pub fn new() -> Self {
        let beta_root = 0;
        let nodes = vec![ReteNode::BetaRoot(BetaRootNode { id: beta_root, successors: Vec::new() })];
        Self {
            nodes,
            type_roots: HashMap::new(),
            beta_root,
            rules: Vec::new(),
            selection_cache: HashMap::new(),
            memory_cache: HashMap::new(),
        }
    }

    fn push(&mut self, make: impl FnOnce(NodeId) -> ReteNode) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(make(id));
        id
    }

    fn link(&mut self, parent: NodeId, child: NodeId) {
        let successors = match &mut self.nodes[parent] {
            ReteNode::Type(n) => &mut n.successors,
            ReteNode::Selection(n) => &mut n.successors,
            ReteNode::AlphaMemory(n) => &mut n.successors,
            ReteNode::BetaRoot(n) => &mut n.successors,
            ReteNode::Join(n) => &mut n.successors,
            ReteNode::TupleSelection(n) => &mut n.successors,
            ReteNode::Not(n) => &mut n.successors,
            ReteNode::Exists(n) => &mut n.successors,
            ReteNode::Aggregate(n) => &mut n.successors,
            ReteNode::Binding(n) => &mut n.successors,
            ReteNode::Adapter(_) | ReteNode::Terminal(_) => return,
        };
        if !successors.contains(&child) {
            successors.push(child);
        }
    }

    /// Build (or reuse) the alpha chain for a pattern and return its alpha
    /// memory node.
    fn alpha_chain(
        &mut self,
        fact_type: &str,
        conditions: &[Arc<dyn FactPredicate>],
    ) -> NodeId {
        let type_root = match self.type_roots.get(fact_type) {
            Some(&id) => id,
            None => {
                let id = self.push(|id| {
                    ReteNode::Type(TypeNode {
                        id,
                        fact_type: fact_type.to_string(),
                        successors: Vec::new(),
                    })
                });
                self.type_roots.insert(fact_type.to_string(), id);
                id
            }
        };

        let mut current = type_root;
        for condition in conditions {
            let shared = condition
                .share_key()
                .and_then(|key| self.selection_cache.get(&(current, key)).copied());
            current = match shared {
                Some(existing) => existing,
                None => {
                    let predicate = condition.clone();
                    let node = self.push(|id| {
                        ReteNode::Selection(SelectionNode { id, predicate, successors: Vec::new() })
                    });
                    self.link(current, node);
                    if let Some(key) = condition.share_key() {
                        self.selection_cache.insert((current, key), node);
                    }
                    node
                }
            };
        }

        match self.memory_cache.get(&current) {
            Some(&memory) => memory,
            None => {
                let memory = self
                    .push(|id| ReteNode::AlphaMemory(AlphaMemoryNode { id, successors: Vec::new() }));
                self.link(current, memory);
                self.memory_cache.insert(current, memory);
                memory
            }
        }
    }

    fn keys_for(
        &self,
        joins: &[JoinTest],
        declarations: &HashMap<String, usize>,
        rule: &str,
    ) -> SessionResult<(Arc<dyn TupleKeySelector>, Arc<dyn FactKeySelector>)> {
        if joins.is_empty() {
            return Ok((Arc::new(ConstantKey), Arc::new(ConstantKey)));
        }
        let mut left_fields = Vec::with_capacity(joins.len());
        let mut right_fields = Vec::with_capacity(joins.len());
        for test in joins {
            let position = declarations.get(&test.declaration).copied().ok_or_else(|| {
                EngineError::network(format!(
                    "rule '{rule}': join references unknown declaration '{}'",
                    test.declaration
                ))
            })?;
            left_fields.push((position, test.left_field.clone()));
            right_fields.push(test.right_field.clone());
        }
        Ok((
            Arc::new(TupleFieldKey { fields: left_fields }),
            Arc::new(FieldKey { fields: right_fields }),
        ))
    }

    fn attach_adapter(&mut self, alpha_memory: NodeId, target: NodeId) {
        let adapter =
            self.push(|id| ReteNode::Adapter(AdapterNode { id, source: alpha_memory, target }));
        self.link(alpha_memory, adapter);
    }

    /// Compile one rule spec into the shared network.
    pub fn add_rule(&mut self, spec: RuleSpec) -> SessionResult<RuleId> {
        let rule_id = self.rules.len() as RuleId;
        let rule_name = spec.name.clone();
        if spec.elements.is_empty() {
            return Err(EngineError::network(format!("rule '{rule_name}' has no patterns")));
        }

        let mut declarations: HashMap<String, usize> = HashMap::new();
        let mut declaration_names: Vec<String> = Vec::new();
        let mut current = self.beta_root;

        for element in &spec.elements {
            match element {
                PatternElement::Match { name, fact_type, conditions, joins } => {
                    let memory = self.alpha_chain(fact_type, conditions);
                    let (left_key, right_key) =
                        self.keys_for(joins, &declarations, &rule_name)?;
                    let parent = current;
                    let join = self.push(|id| {
                        ReteNode::Join(JoinNode {
                            id,
                            parent,
                            alpha_source: memory,
                            left_key,
                            right_key,
                            successors: Vec::new(),
                        })
                    });
                    self.link(parent, join);
                    self.attach_adapter(memory, join);
                    declarations.insert(name.clone(), declaration_names.len());
                    declaration_names.push(name.clone());
                    current = join;
                }
                PatternElement::Negation { fact_type, conditions, joins, exists } => {
                    let memory = self.alpha_chain(fact_type, conditions);
                    let (left_key, right_key) =
                        self.keys_for(joins, &declarations, &rule_name)?;
                    let parent = current;
                    let node = if *exists {
                        self.push(|id| {
                            ReteNode::Exists(ExistsNode {
                                id,
                                parent,
                                alpha_source: memory,
                                left_key,
                                right_key,
                                successors: Vec::new(),
                            })
                        })
                    } else {
                        self.push(|id| {
                            ReteNode::Not(NotNode {
                                id,
                                parent,
                                alpha_source: memory,
                                left_key,
                                right_key,
                                successors: Vec::new(),
                            })
                        })
                    };
                    self.link(parent, node);
                    self.attach_adapter(memory, node);
                    current = node;
                }
                PatternElement::Aggregate { name, fact_type, conditions, joins, aggregator } => {
                    let memory = self.alpha_chain(fact_type, conditions);
                    let (left_key, right_key) =
                        self.keys_for(joins, &declarations, &rule_name)?;
                    let parent = current;
                    let aggregator = aggregator.clone();
                    let result_type = format!("aggregate:{}", aggregator.name());
                    let node = self.push(|id| {
                        ReteNode::Aggregate(AggregateNode {
                            id,
                            parent,
                            alpha_source: memory,
                            left_key,
                            right_key,
                            aggregator,
                            result_type,
                            successors: Vec::new(),
                        })
                    });
                    self.link(parent, node);
                    self.attach_adapter(memory, node);
                    declarations.insert(name.clone(), declaration_names.len());
                    declaration_names.push(name.clone());
                    current = node;
                }
                PatternElement::Selection { predicate } => {
                    let parent = current;
                    let predicate = predicate.clone();
                    let node = self.push(|id| {
                        ReteNode::TupleSelection(TupleSelectionNode {
                            id,
                            parent,
                            predicate,
                            successors: Vec::new(),
                        })
                    });
                    self.link(parent, node);
                    current = node;
                }
                PatternElement::Binding { name, expr } => {
                    let parent = current;
                    let expr = expr.clone();
                    let node = self.push(|id| {
                        ReteNode::Binding(BindingNode {
                            id,
                            parent,
                            expr,
                            result_type: "binding".to_string(),
                            successors: Vec::new(),
                        })
                    });
                    self.link(parent, node);
                    declarations.insert(name.clone(), declaration_names.len());
                    declaration_names.push(name.clone());
                    current = node;
                }
            }
        }

        let parent = current;
        let terminal = self.push(|id| {
            ReteNode::Terminal(TerminalNode {
                id,
                parent,
                rule: rule_id,
                declarations: declaration_names,
            })
        });
        self.link(parent, terminal);

        self.rules.push(Arc::new(RuleDefinition {
            id: rule_id,
            name: spec.name,
            priority: spec.priority,
            group: spec.group,
            actions: spec.actions,
        }));

        debug!(rule = %rule_name, rule_id, terminal, "compiled rule into network");
        Ok(rule_id)
    }

    pub fn build(self) -> ReteNetwork {
        debug!(
            nodes = self.nodes.len(),
            rules = self.rules.len(),
            types = self.type_roots.len(),
            "network built"
        );
        ReteNetwork {
            nodes: self.nodes,
            type_roots: self.type_roots,
            beta_root: self.beta_root,
            rules: self.rules,
        }
    }
}

impl Default for NetworkBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::FieldCondition;
    use ember_types::{FactValue, Operator};

    fn cond(field: &str, op: Operator, value: FactValue) -> Arc<dyn FactPredicate> {
        Arc::new(FieldCondition::new(field, op, value))
    }

    #[test]
    fn identical_alpha_chains_are_shared() {
        let mut builder = NetworkBuilder::new();
        builder
            .add_rule(RuleSpec::new("a").when(
                "p",
                "Person",
                vec![cond("age", Operator::GreaterThan, FactValue::Integer(18))],
            ))
            .unwrap();
        let nodes_after_first = builder.nodes.len();
        builder
            .add_rule(RuleSpec::new("b").when(
                "p",
                "Person",
                vec![cond("age", Operator::GreaterThan, FactValue::Integer(18))],
            ))
            .unwrap();

        let network = builder.build();
        // Second rule reuses type, selection and alpha-memory nodes; it only
        // adds its own join, adapter and terminal.
        assert_eq!(network.node_count(), nodes_after_first + 3);
    }

    #[test]
    fn join_test_must_reference_known_declaration() {
        let mut builder = NetworkBuilder::new();
        let err = builder
            .add_rule(
                RuleSpec::new("broken")
                    .when("a", "A", vec![])
                    .when_join("b", "B", vec![], vec![join_on("nope", "x", "y")]),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::Network { .. }));
    }

    #[test]
    fn empty_rule_is_rejected() {
        let mut builder = NetworkBuilder::new();
        assert!(builder.add_rule(RuleSpec::new("empty")).is_err());
    }
}
