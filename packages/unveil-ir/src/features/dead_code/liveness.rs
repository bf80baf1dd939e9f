//! Backward liveness dataflow over one CFG
//!
//! Tracks base names, restricted to the set the caller considers
//! analyzable (local, uncaptured, unshadowed); everything else is treated
//! as live everywhere.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::shared::models::{BlockId, Cfg, IrState, NodeId, NodeKind};

#[derive(Debug, Default)]
pub struct Liveness {
    pub live_in: FxHashMap<BlockId, FxHashSet<String>>,
    pub live_out: FxHashMap<BlockId, FxHashSet<String>>,
}

impl Liveness {
    /// Standard backward iteration to a fixed point
    pub fn compute(state: &IrState, cfg: &Cfg, tracked: &FxHashSet<String>) -> Self {
        let mut use_sets: FxHashMap<BlockId, FxHashSet<String>> = FxHashMap::default();
        let mut def_sets: FxHashMap<BlockId, FxHashSet<String>> = FxHashMap::default();

        for block in &cfg.blocks {
            let mut uses = FxHashSet::default();
            let mut defs = FxHashSet::default();
            for &stmt in &block.statements {
                let (stmt_uses, stmt_defs) = uses_and_defs(state, stmt, tracked);
                for u in stmt_uses {
                    if !defs.contains(&u) {
                        uses.insert(u);
                    }
                }
                defs.extend(stmt_defs);
            }
            // Edge conditions evaluate after the block's statements
            let mut seen = FxHashSet::default();
            for edge in cfg.edges_from(block.id) {
                if let Some(cond) = edge.condition {
                    if seen.insert(cond) {
                        for u in reads_of(state, cond, tracked) {
                            if !defs.contains(&u) {
                                uses.insert(u);
                            }
                        }
                    }
                }
            }
            use_sets.insert(block.id, uses);
            def_sets.insert(block.id, defs);
        }

        let mut live_in: FxHashMap<BlockId, FxHashSet<String>> = FxHashMap::default();
        let mut live_out: FxHashMap<BlockId, FxHashSet<String>> = FxHashMap::default();
        for block in &cfg.blocks {
            live_in.insert(block.id, FxHashSet::default());
            live_out.insert(block.id, FxHashSet::default());
        }

        let order = cfg.reverse_post_order();
        let mut changed = true;
        while changed {
            changed = false;
            for &b in order.iter().rev() {
                let mut out: FxHashSet<String> = FxHashSet::default();
                for &s in &cfg.block(b).succs {
                    out.extend(live_in[&s].iter().cloned());
                }
                let mut inn = use_sets[&b].clone();
                for name in out.iter() {
                    if !def_sets[&b].contains(name) {
                        inn.insert(name.clone());
                    }
                }
                if out != live_out[&b] || inn != live_in[&b] {
                    live_out.insert(b, out);
                    live_in.insert(b, inn);
                    changed = true;
                }
            }
        }

        Self { live_in, live_out }
    }
}

/// Upward-exposed reads and definitions of one statement, in evaluation
/// order (reads of the RHS happen before the write)
pub fn uses_and_defs(
    state: &IrState,
    stmt: NodeId,
    tracked: &FxHashSet<String>,
) -> (FxHashSet<String>, FxHashSet<String>) {
    let mut uses = FxHashSet::default();
    let mut defs = FxHashSet::default();
    scan(state, stmt, tracked, &mut uses, &mut defs);
    (uses, defs)
}

/// Reads only (edge conditions, tests)
pub fn reads_of(state: &IrState, expr: NodeId, tracked: &FxHashSet<String>) -> FxHashSet<String> {
    let mut uses = FxHashSet::default();
    let mut defs = FxHashSet::default();
    scan(state, expr, tracked, &mut uses, &mut defs);
    uses
}

fn scan(
    state: &IrState,
    node: NodeId,
    tracked: &FxHashSet<String>,
    uses: &mut FxHashSet<String>,
    defs: &mut FxHashSet<String>,
) {
    let Some(kind) = state.kind(node) else { return };
    match kind {
        NodeKind::Identifier { name } | NodeKind::SsaName { name, .. } => {
            if tracked.contains(name) && !defs.contains(name) {
                uses.insert(name.clone());
            }
        }
        NodeKind::Assignment { op, target, value } => {
            scan(state, *value, tracked, uses, defs);
            match state.kind(*target) {
                Some(NodeKind::Identifier { name }) | Some(NodeKind::SsaName { name, .. })
                    if tracked.contains(name) =>
                {
                    // Augmented assignment reads before writing
                    if op.binary_op().is_some() && !defs.contains(name) {
                        uses.insert(name.clone());
                    }
                    defs.insert(name.clone());
                }
                _ => scan(state, *target, tracked, uses, defs),
            }
        }
        NodeKind::Update { argument, .. } => match state.kind(*argument) {
            Some(NodeKind::Identifier { name }) | Some(NodeKind::SsaName { name, .. })
                if tracked.contains(name) =>
            {
                if !defs.contains(name) {
                    uses.insert(name.clone());
                }
                defs.insert(name.clone());
            }
            _ => scan(state, *argument, tracked, uses, defs),
        },
        NodeKind::VariableDeclarator { id, init } => {
            if let Some(init) = init {
                scan(state, *init, tracked, uses, defs);
            }
            if init.is_some() {
                if let Some(name) = state.kind(*id).and_then(NodeKind::variable_name) {
                    if tracked.contains(name) {
                        defs.insert(name.to_string());
                    }
                }
            }
        }
        NodeKind::Member {
            object,
            property,
            computed,
            ..
        } => {
            scan(state, *object, tracked, uses, defs);
            if *computed {
                scan(state, *property, tracked, uses, defs);
            }
        }
        NodeKind::Property {
            key,
            value,
            computed,
            ..
        } => {
            if *computed {
                scan(state, *key, tracked, uses, defs);
            }
            scan(state, *value, tracked, uses, defs);
        }
        // A nested function may run at any time: all its reads count as
        // uses here, conservatively
        NodeKind::FunctionDeclaration { body, .. }
        | NodeKind::FunctionExpression { body, .. }
        | NodeKind::ArrowFunction { body, .. } => {
            let mut inner_defs = FxHashSet::default();
            scan(state, *body, tracked, uses, &mut inner_defs);
        }
        other => {
            for child in other.children() {
                scan(state, child, tracked, uses, defs);
            }
        }
    }
}
