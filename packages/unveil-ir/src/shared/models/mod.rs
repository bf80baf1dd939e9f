//! Shared data model
//!
//! - `span`    - source locations
//! - `node`    - the IR node model (closed tagged variant)
//! - `factory` - node construction with stable identity allocation
//! - `cfg`     - basic blocks, typed edges, dominance fields
//! - `state`   - the shared analysis state passed between passes
//! - `trace`   - sandbox execution trace events

pub mod cfg;
pub mod factory;
pub mod node;
pub mod span;
pub mod state;
pub mod trace;

pub use cfg::{BasicBlock, BlockId, Cfg, CfgEdge, EdgeKind};
pub use factory::NodeFactory;
pub use node::{
    structural_eq, AssignOp, BinaryOp, DeclKind, IrNode, LiteralValue, LogicalOp, NodeId, NodeKind,
    NodeMap, PhiOperand, UnaryOp, UpdateOp,
};
pub use span::Span;
pub use state::{IrState, SsaState};
pub use trace::{ExecutionTrace, TraceEvent, TraceValue};
