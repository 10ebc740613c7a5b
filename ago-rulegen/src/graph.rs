use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

pub const MAX_RULE_BLOCKS: usize = 256;

/// One block kind per variant. The Lua emitter matches exhaustively, so a new
/// kind without a generator arm fails to compile instead of failing at
/// runtime.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockKind {
    NumberLiteral {
        value: String,
    },
    TextLiteral {
        value: String,
    },
    BooleanLiteral {
        value: bool,
    },
    /// Read a variable. Names carrying the `ago_` prefix resolve through the
    /// injected `context` table instead of a script local.
    VariableGet {
        name: String,
    },
    /// Read a field of the event that triggered the rule.
    EventField {
        field: String,
    },
    /// Read the current state of a device by uuid.
    DeviceState {
        device: String,
    },
    Compare {
        op: CompareOp,
    },
    Logic {
        op: LogicOp,
    },
    Negate,
    Math {
        op: MathOp,
    },
    TextJoin,
    /// Parse a datetime string into a unix timestamp; the parsing routine is
    /// emitted once per script as a shared helper.
    DatetimeToTimestamp,
    TimestampNow,
    VariableSet {
        name: String,
    },
    /// Issue a command to a device. `params` names the value inputs attached
    /// to the command table.
    SendCommand {
        device: String,
        command: String,
        #[serde(default)]
        params: Vec<String>,
    },
    IfElse,
    /// Root guard: bail out unless the triggering event matches.
    TriggerGuard {
        device: String,
        subject: String,
    },
}

impl BlockKind {
    pub fn id(&self) -> &'static str {
        match self {
            BlockKind::NumberLiteral { .. } => "number_literal",
            BlockKind::TextLiteral { .. } => "text_literal",
            BlockKind::BooleanLiteral { .. } => "boolean_literal",
            BlockKind::VariableGet { .. } => "variable_get",
            BlockKind::EventField { .. } => "event_field",
            BlockKind::DeviceState { .. } => "device_state",
            BlockKind::Compare { .. } => "compare",
            BlockKind::Logic { .. } => "logic",
            BlockKind::Negate => "negate",
            BlockKind::Math { .. } => "math",
            BlockKind::TextJoin => "text_join",
            BlockKind::DatetimeToTimestamp => "datetime_totimestamp",
            BlockKind::TimestampNow => "timestamp_now",
            BlockKind::VariableSet { .. } => "variable_set",
            BlockKind::SendCommand { .. } => "send_command",
            BlockKind::IfElse => "if_else",
            BlockKind::TriggerGuard { .. } => "trigger_guard",
        }
    }

    /// Value-producing blocks connect into inputs; statement blocks chain.
    pub fn produces_value(&self) -> bool {
        !matches!(
            self,
            BlockKind::VariableSet { .. }
                | BlockKind::SendCommand { .. }
                | BlockKind::IfElse
                | BlockKind::TriggerGuard { .. }
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn lua_symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "~=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicOp {
    And,
    Or,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MathOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
}

impl MathOp {
    pub fn lua_symbol(self) -> &'static str {
        match self {
            MathOp::Add => "+",
            MathOp::Subtract => "-",
            MathOp::Multiply => "*",
            MathOp::Divide => "/",
            MathOp::Power => "^",
        }
    }
}

/// One placed block. `inputs` connects named value slots to other blocks,
/// `statements` connects named branch slots, `next` chains statements.
/// Any of them may be absent; generation substitutes placeholders.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockNode {
    pub id: String,
    #[serde(flatten)]
    pub kind: BlockKind,
    #[serde(default)]
    pub inputs: HashMap<String, String>,
    #[serde(default)]
    pub statements: HashMap<String, String>,
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RuleGraph {
    #[serde(default)]
    pub name: String,
    pub blocks: Vec<BlockNode>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GraphError {
    TooManyBlocks { count: usize, limit: usize },
    DuplicateBlock { id: String },
    UnknownReference { block: String, slot: String, target: String },
    StatementExpected { block: String, slot: String, target: String },
    ValueExpected { block: String, slot: String, target: String },
    Cycle,
}

impl std::fmt::Display for GraphError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraphError::TooManyBlocks { count, limit } => {
                write!(formatter, "too many blocks: {count} (limit {limit})")
            }
            GraphError::DuplicateBlock { id } => {
                write!(formatter, "duplicate block id '{id}'")
            }
            GraphError::UnknownReference {
                block,
                slot,
                target,
            } => write!(
                formatter,
                "block '{block}' slot '{slot}' references missing block '{target}'"
            ),
            GraphError::StatementExpected {
                block,
                slot,
                target,
            } => write!(
                formatter,
                "block '{block}' slot '{slot}' expects a statement block but '{target}' produces a value"
            ),
            GraphError::ValueExpected {
                block,
                slot,
                target,
            } => write!(
                formatter,
                "block '{block}' slot '{slot}' expects a value block but '{target}' is a statement"
            ),
            GraphError::Cycle => write!(
                formatter,
                "blocks form a cycle; connect them as a directed acyclic graph"
            ),
        }
    }
}

impl std::error::Error for GraphError {}

/// Validated view over a graph: id lookup plus the top-level statement
/// chains in canvas order.
#[derive(Debug)]
pub(crate) struct ResolvedGraph<'graph> {
    nodes: HashMap<&'graph str, &'graph BlockNode>,
    roots: Vec<&'graph BlockNode>,
}

impl<'graph> ResolvedGraph<'graph> {
    pub(crate) fn node(&self, id: &str) -> Option<&'graph BlockNode> {
        self.nodes.get(id).copied()
    }

    pub(crate) fn roots(&self) -> &[&'graph BlockNode] {
        &self.roots
    }
}

pub(crate) fn resolve_graph(graph: &RuleGraph) -> Result<ResolvedGraph<'_>, GraphError> {
    if graph.blocks.len() > MAX_RULE_BLOCKS {
        return Err(GraphError::TooManyBlocks {
            count: graph.blocks.len(),
            limit: MAX_RULE_BLOCKS,
        });
    }

    let mut nodes: HashMap<&str, &BlockNode> = HashMap::with_capacity(graph.blocks.len());
    for block in &graph.blocks {
        if nodes.insert(block.id.as_str(), block).is_some() {
            return Err(GraphError::DuplicateBlock {
                id: block.id.clone(),
            });
        }
    }

    let mut referenced: HashSet<&str> = HashSet::new();
    let mut indegree: HashMap<&str, usize> = HashMap::new();
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for block in &graph.blocks {
        indegree.entry(block.id.as_str()).or_insert(0);
    }

    for block in &graph.blocks {
        for (slot, target) in &block.inputs {
            let Some(child) = nodes.get(target.as_str()) else {
                return Err(GraphError::UnknownReference {
                    block: block.id.clone(),
                    slot: slot.clone(),
                    target: target.clone(),
                });
            };
            if !child.kind.produces_value() {
                return Err(GraphError::ValueExpected {
                    block: block.id.clone(),
                    slot: slot.clone(),
                    target: target.clone(),
                });
            }
            referenced.insert(target.as_str());
            adjacency
                .entry(block.id.as_str())
                .or_default()
                .push(target.as_str());
            *indegree.entry(target.as_str()).or_default() += 1;
        }
        let statement_links = block
            .statements
            .iter()
            .map(|(slot, target)| (slot.as_str(), target))
            .chain(block.next.iter().map(|target| ("next", target)));
        for (slot, target) in statement_links {
            let Some(child) = nodes.get(target.as_str()) else {
                return Err(GraphError::UnknownReference {
                    block: block.id.clone(),
                    slot: slot.to_string(),
                    target: target.clone(),
                });
            };
            if child.kind.produces_value() {
                return Err(GraphError::StatementExpected {
                    block: block.id.clone(),
                    slot: slot.to_string(),
                    target: target.clone(),
                });
            }
            referenced.insert(target.as_str());
            adjacency
                .entry(block.id.as_str())
                .or_default()
                .push(target.as_str());
            *indegree.entry(target.as_str()).or_default() += 1;
        }
    }

    // Kahn's over every connection kind; leftovers mean a cycle.
    let mut queue = graph
        .blocks
        .iter()
        .filter(|block| indegree.get(block.id.as_str()).copied().unwrap_or(0) == 0)
        .map(|block| block.id.as_str())
        .collect::<VecDeque<_>>();
    let mut visited = 0usize;
    while let Some(node_id) = queue.pop_front() {
        visited += 1;
        if let Some(targets) = adjacency.get(node_id) {
            for target in targets {
                if let Some(entry) = indegree.get_mut(target) {
                    *entry = entry.saturating_sub(1);
                    if *entry == 0 {
                        queue.push_back(target);
                    }
                }
            }
        }
    }
    if visited != graph.blocks.len() {
        return Err(GraphError::Cycle);
    }

    let roots = graph
        .blocks
        .iter()
        .filter(|block| !block.kind.produces_value() && !referenced.contains(block.id.as_str()))
        .collect::<Vec<_>>();

    Ok(ResolvedGraph { nodes, roots })
}
