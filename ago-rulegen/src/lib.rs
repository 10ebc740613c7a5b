pub mod catalog;
pub mod graph;
pub mod lua;

pub use catalog::{BlockDefinition, BlockField, BlockInput, block_catalog};
pub use graph::{
    BlockKind, BlockNode, CompareOp, GraphError, LogicOp, MathOp, MAX_RULE_BLOCKS, RuleGraph,
};
pub use lua::{
    PREC_ADD, PREC_AND, PREC_ATOMIC, PREC_COMPARE, PREC_CONCAT, PREC_MUL, PREC_NONE, PREC_OR,
    PREC_POW, PREC_UNARY, compile_rule,
};
