use std::collections::{BTreeMap, BTreeSet};

use crate::graph::{
    BlockKind, BlockNode, GraphError, LogicOp, MathOp, ResolvedGraph, RuleGraph, resolve_graph,
};

// Lua operator precedence, weakest to strongest. Parenthesization decisions
// compare these numbers and nothing else.
pub const PREC_NONE: u8 = 0;
pub const PREC_OR: u8 = 1;
pub const PREC_AND: u8 = 2;
pub const PREC_COMPARE: u8 = 3;
pub const PREC_CONCAT: u8 = 4;
pub const PREC_ADD: u8 = 5;
pub const PREC_MUL: u8 = 6;
pub const PREC_UNARY: u8 = 7;
pub const PREC_POW: u8 = 8;
pub const PREC_ATOMIC: u8 = 10;

/// Variables with this prefix are injected by the script host and resolve
/// through the `context` table rather than a script local.
pub const CONTEXT_VARIABLE_PREFIX: &str = "ago_";

const HELPER_DATETIME: &str = "datetimeToTimestamp";
const HELPER_DATETIME_BODY: &str = r#"local function datetimeToTimestamp(value, pattern)
    if pattern == nil or pattern == "" then
        pattern = "(%d+)/(%d+)/(%d+) (%d+):(%d+)"
    end
    local day, month, year, hour, minute = string.match(value, pattern)
    if day == nil then
        return 0
    end
    return os.time({day = day, month = month, year = year, hour = hour, min = minute})
end"#;

/// Compile a rule graph to a Lua script. Validation rejects malformed graphs;
/// once a graph resolves, generation always succeeds — disconnected inputs
/// degrade to placeholder literals instead of errors.
pub fn compile_rule(graph: &RuleGraph) -> Result<String, GraphError> {
    let resolved = resolve_graph(graph)?;
    let mut emitter = LuaEmitter {
        graph: &resolved,
        helpers: BTreeMap::new(),
        locals: BTreeSet::new(),
    };

    let mut statements = Vec::new();
    for root in resolved.roots() {
        emitter.emit_chain(Some(root.id.as_str()), 0, &mut statements);
    }

    let mut lines: Vec<String> = Vec::new();
    for body in emitter.helpers.values() {
        lines.extend(body.lines().map(ToOwned::to_owned));
        lines.push(String::new());
    }
    if !emitter.locals.is_empty() {
        let names = emitter
            .locals
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(format!("local {names}"));
        lines.push(String::new());
    }
    lines.extend(statements);
    Ok(join_lines(&lines))
}

struct LuaEmitter<'graph> {
    graph: &'graph ResolvedGraph<'graph>,
    helpers: BTreeMap<&'static str, &'static str>,
    locals: BTreeSet<String>,
}

impl LuaEmitter<'_> {
    fn emit_chain(&mut self, start: Option<&str>, level: usize, out: &mut Vec<String>) {
        let mut cursor = start.and_then(|id| self.graph.node(id));
        while let Some(node) = cursor {
            self.emit_statement(node, level, out);
            cursor = node.next.as_deref().and_then(|id| self.graph.node(id));
        }
    }

    fn emit_statement(&mut self, node: &BlockNode, level: usize, out: &mut Vec<String>) {
        match &node.kind {
            BlockKind::VariableSet { name } => {
                let value = self.value_to_code(node, "VALUE", PREC_NONE, "nil");
                let target = self.variable_access(name);
                out.push(indent_line(level, format!("{target} = {value}")));
            }
            BlockKind::SendCommand {
                device,
                command,
                params,
            } => {
                let mut fields = vec![
                    format!("uuid = {}", lua_string(device)),
                    format!("command = {}", lua_string(command)),
                ];
                for param in params {
                    let value = self.value_to_code(node, param, PREC_NONE, "nil");
                    fields.push(format!("{} = {value}", sanitize_identifier(param, "param")));
                }
                out.push(indent_line(
                    level,
                    format!("sendMessage({{{}}})", fields.join(", ")),
                ));
            }
            BlockKind::IfElse => {
                let condition = self.value_to_code(node, "IF", PREC_NONE, "false");
                out.push(indent_line(level, format!("if {condition} then")));
                self.emit_branch(node, "THEN", level + 1, out);
                if node.statements.contains_key("ELSE") {
                    out.push(indent_line(level, "else".to_string()));
                    self.emit_branch(node, "ELSE", level + 1, out);
                }
                out.push(indent_line(level, "end".to_string()));
            }
            BlockKind::TriggerGuard { device, subject } => {
                out.push(indent_line(
                    level,
                    format!(
                        "if content.event ~= {} or content.uuid ~= {} then",
                        lua_string(subject),
                        lua_string(device)
                    ),
                ));
                out.push(indent_line(level + 1, "return".to_string()));
                out.push(indent_line(level, "end".to_string()));
                self.emit_branch(node, "DO", level, out);
            }
            // Value kinds cannot reach a statement slot past resolve_graph.
            BlockKind::NumberLiteral { .. }
            | BlockKind::TextLiteral { .. }
            | BlockKind::BooleanLiteral { .. }
            | BlockKind::VariableGet { .. }
            | BlockKind::EventField { .. }
            | BlockKind::DeviceState { .. }
            | BlockKind::Compare { .. }
            | BlockKind::Logic { .. }
            | BlockKind::Negate
            | BlockKind::Math { .. }
            | BlockKind::TextJoin
            | BlockKind::DatetimeToTimestamp
            | BlockKind::TimestampNow => {}
        }
    }

    fn emit_branch(&mut self, node: &BlockNode, slot: &str, level: usize, out: &mut Vec<String>) {
        let start = node.statements.get(slot).map(String::as_str);
        self.emit_chain(start, level, out);
    }

    /// Render the block connected to `slot`, parenthesized iff its precedence
    /// is weaker than `min_prec`. Disconnected or dangling inputs render as
    /// the placeholder literal.
    fn value_to_code(
        &mut self,
        node: &BlockNode,
        slot: &str,
        min_prec: u8,
        placeholder: &str,
    ) -> String {
        let child = node
            .inputs
            .get(slot)
            .and_then(|target| self.graph.node(target));
        let Some(child) = child else {
            return placeholder.to_string();
        };
        let (code, prec) = self.emit_value(child);
        if prec < min_prec {
            format!("({code})")
        } else {
            code
        }
    }

    fn emit_value(&mut self, node: &BlockNode) -> (String, u8) {
        match &node.kind {
            BlockKind::NumberLiteral { value } => {
                let rendered = sanitize_number(value, "0");
                let prec = if rendered.starts_with('-') {
                    PREC_UNARY
                } else {
                    PREC_ATOMIC
                };
                (rendered, prec)
            }
            BlockKind::TextLiteral { value } => (lua_string(value), PREC_ATOMIC),
            BlockKind::BooleanLiteral { value } => {
                let rendered = if *value { "true" } else { "false" };
                (rendered.to_string(), PREC_ATOMIC)
            }
            BlockKind::VariableGet { name } => (self.variable_access(name), PREC_ATOMIC),
            BlockKind::EventField { field } => (
                format!("content.{}", sanitize_identifier(field, "value")),
                PREC_ATOMIC,
            ),
            BlockKind::DeviceState { device } => (
                format!("getDeviceState({})", lua_string(device)),
                PREC_ATOMIC,
            ),
            BlockKind::Compare { op } => {
                // Lua comparisons do not chain; both sides need to bind
                // tighter than the comparison itself.
                let left = self.value_to_code(node, "A", PREC_COMPARE + 1, "nil");
                let right = self.value_to_code(node, "B", PREC_COMPARE + 1, "nil");
                (format!("{left} {} {right}", op.lua_symbol()), PREC_COMPARE)
            }
            BlockKind::Logic { op } => {
                let (symbol, prec) = match op {
                    LogicOp::And => ("and", PREC_AND),
                    LogicOp::Or => ("or", PREC_OR),
                };
                let left = self.value_to_code(node, "A", prec, "false");
                let right = self.value_to_code(node, "B", prec, "false");
                (format!("{left} {symbol} {right}"), prec)
            }
            BlockKind::Negate => {
                let operand = self.value_to_code(node, "BOOL", PREC_UNARY, "false");
                (format!("not {operand}"), PREC_UNARY)
            }
            BlockKind::Math { op } => {
                let (prec, left_min, right_min) = match op {
                    MathOp::Add | MathOp::Subtract => (PREC_ADD, PREC_ADD, PREC_ADD + 1),
                    MathOp::Multiply | MathOp::Divide => (PREC_MUL, PREC_MUL, PREC_MUL + 1),
                    // Exponentiation is right-associative.
                    MathOp::Power => (PREC_POW, PREC_POW + 1, PREC_POW),
                };
                let left = self.value_to_code(node, "A", left_min, "0");
                let right = self.value_to_code(node, "B", right_min, "0");
                (format!("{left} {} {right}", op.lua_symbol()), prec)
            }
            BlockKind::TextJoin => {
                // Concatenation is right-associative.
                let left = self.value_to_code(node, "A", PREC_CONCAT + 1, "\"\"");
                let right = self.value_to_code(node, "B", PREC_CONCAT, "\"\"");
                (format!("{left} .. {right}"), PREC_CONCAT)
            }
            BlockKind::DatetimeToTimestamp => {
                self.require_helper(HELPER_DATETIME, HELPER_DATETIME_BODY);
                let value = self.value_to_code(node, "VALUE", PREC_NONE, "\"\"");
                let pattern = self.value_to_code(node, "PATTERN", PREC_NONE, "\"\"");
                (
                    format!("{HELPER_DATETIME}({value}, {pattern})"),
                    PREC_ATOMIC,
                )
            }
            BlockKind::TimestampNow => ("os.time()".to_string(), PREC_ATOMIC),
            // Statement kinds cannot reach a value slot past resolve_graph.
            BlockKind::VariableSet { .. }
            | BlockKind::SendCommand { .. }
            | BlockKind::IfElse
            | BlockKind::TriggerGuard { .. } => ("nil".to_string(), PREC_ATOMIC),
        }
    }

    /// Register a shared helper body exactly once per compilation pass.
    fn require_helper(&mut self, name: &'static str, body: &'static str) {
        self.helpers.entry(name).or_insert(body);
    }

    /// The same rewrite applies at read and write sites: `ago_`-prefixed
    /// names live in the injected `context` table, everything else is a
    /// hoisted script local.
    fn variable_access(&mut self, name: &str) -> String {
        let ident = sanitize_identifier(name, "value");
        if ident.starts_with(CONTEXT_VARIABLE_PREFIX) {
            format!("context.{ident}")
        } else {
            self.locals.insert(ident.clone());
            ident
        }
    }
}

fn indent_line(level: usize, line: String) -> String {
    format!("{}{line}", "    ".repeat(level))
}

fn join_lines(lines: &[String]) -> String {
    lines.join("\n")
}

fn sanitize_identifier(value: &str, fallback: &str) -> String {
    let raw = value.trim();
    let candidate = if raw.is_empty() { fallback } else { raw };
    let mut output = String::with_capacity(candidate.len());
    for (index, ch) in candidate.chars().enumerate() {
        let valid = ch == '_' || ch.is_ascii_alphanumeric();
        if !valid {
            continue;
        }
        if index == 0 && ch.is_ascii_digit() {
            output.push('_');
        }
        output.push(ch);
    }
    if output.is_empty() {
        fallback.to_string()
    } else {
        output
    }
}

fn sanitize_number(value: &str, fallback: &str) -> String {
    let raw = value.trim();
    if raw.parse::<f64>().is_ok() {
        raw.to_string()
    } else {
        fallback.to_string()
    }
}

fn lua_string(value: &str) -> String {
    format!("\"{}\"", escape_double_quoted(value))
}

fn escape_double_quoted(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('\"', "\\\"")
        .replace('\n', "\\n")
}
