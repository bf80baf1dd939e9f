//! SSA construction
//!
//! Standard frontier-based placement followed by a dominator-tree rename
//! walk. Versions are monotone per original name; use-def chains are
//! recorded so dataflow passes can navigate from any SSA identifier back
//! to its defining statement.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::features::scopes;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::pass::{MetricsRecorder, Pass, PassContext, PassOutcome};
use crate::shared::models::state::{BodySsa, SsaDef, SsaState};
use crate::shared::models::{AssignOp, BlockId, Cfg, IrState, NodeId, NodeKind, PhiOperand};

pub struct SsaConstructPass;

impl Pass for SsaConstructPass {
    fn name(&self) -> &'static str {
        "ssa-construct"
    }

    fn description(&self) -> &'static str {
        "convert each code body to SSA form with phi placement at dominance frontiers"
    }

    fn run(&self, mut state: IrState, ctx: &PassContext<'_>) -> PipelineResult<PassOutcome> {
        let mut recorder = MetricsRecorder::start();
        let analysis = scopes::bind(&state);
        let owners = state.body_owners();
        let mut ssa = SsaState::default();

        for owner in owners {
            ctx.cancel.check("ssa-construct")?;
            let candidates = analysis.ssa_candidates(owner);
            if candidates.is_empty() || !state.cfgs.contains_key(&owner) {
                ssa.per_body.insert(owner, BodySsa::default());
                continue;
            }
            let body_ssa = construct_body(&mut state, owner, &candidates, &mut recorder)?;
            ssa.per_body.insert(owner, body_ssa);
        }

        state.ssa = Some(ssa);
        Ok(PassOutcome::changed(state, recorder.finish()))
    }
}

/// SSA-convert one code body
fn construct_body(
    state: &mut IrState,
    owner: NodeId,
    candidates: &FxHashSet<String>,
    recorder: &mut MetricsRecorder,
) -> PipelineResult<BodySsa> {
    let cfg = state
        .cfgs
        .get(&owner)
        .cloned()
        .ok_or_else(|| PipelineError::ssa(owner, "no CFG for body"))?;

    // Variables written through augmented assignment or update operators
    // keep their original names; versioning a combined read-write site
    // through a single node is not expressible
    let mut candidates = candidates.clone();
    for block in &cfg.blocks {
        for &stmt in &block.statements {
            exclude_compound_targets(state, stmt, &mut candidates);
        }
    }
    for edge in &cfg.edges {
        if let Some(cond) = edge.condition {
            exclude_compound_targets(state, cond, &mut candidates);
        }
    }

    // Definition sites per variable
    let mut def_blocks: FxHashMap<String, FxHashSet<BlockId>> = FxHashMap::default();
    for block in &cfg.blocks {
        for &stmt in &block.statements {
            collect_def_names(state, stmt, &candidates, &mut |name| {
                def_blocks
                    .entry(name.to_string())
                    .or_default()
                    .insert(block.id);
            });
        }
    }

    // Parameters define version 0 at entry
    let params = params_of(state, owner);
    for name in params.iter().filter(|n| candidates.contains(*n)) {
        def_blocks
            .entry(name.clone())
            .or_default()
            .insert(cfg.entry);
    }

    // φ placement at iterated dominance frontiers of multi-def variables
    let mut phi_sites: FxHashMap<BlockId, Vec<String>> = FxHashMap::default();
    for (name, blocks) in def_blocks.iter() {
        if blocks.len() < 2 {
            continue;
        }
        let mut placed: FxHashSet<BlockId> = FxHashSet::default();
        let mut work: Vec<BlockId> = blocks.iter().copied().collect();
        work.sort();
        while let Some(b) = work.pop() {
            let frontier: Vec<BlockId> = {
                let mut f: Vec<BlockId> =
                    cfg.block(b).dom_frontier.iter().copied().collect();
                f.sort();
                f
            };
            for y in frontier {
                if placed.insert(y) {
                    phi_sites.entry(y).or_default().push(name.clone());
                    if !blocks.contains(&y) {
                        work.push(y);
                    }
                }
            }
        }
    }
    for names in phi_sites.values_mut() {
        names.sort();
    }

    let mut renamer = Renamer {
        state,
        cfg: &cfg,
        candidates: &candidates,
        body: BodySsa::default(),
        stacks: FxHashMap::default(),
        phi_sites,
        phi_by_block: FxHashMap::default(),
        recorder,
    };

    // Parameters enter at version 0
    for name in params.iter().filter(|n| renamer.candidates.contains(*n)) {
        let version = renamer.fresh_version(name);
        renamer.stacks.entry(name.clone()).or_default().push(version);
        renamer.body.defs.insert(
            (name.clone(), version),
            SsaDef {
                block: cfg.entry,
                stmt: owner,
                value: None,
            },
        );
    }

    renamer.place_phis();
    renamer.rename_block(cfg.entry);

    let mut body = renamer.body;
    body.phis = renamer.phi_by_block;
    Ok(body)
}

fn params_of(state: &IrState, owner: NodeId) -> Vec<String> {
    match state.kind(owner) {
        Some(NodeKind::FunctionDeclaration { params, .. })
        | Some(NodeKind::FunctionExpression { params, .. })
        | Some(NodeKind::ArrowFunction { params, .. }) => params
            .iter()
            .filter_map(|&p| {
                state
                    .kind(p)
                    .and_then(NodeKind::variable_name)
                    .map(str::to_string)
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Remove variables defined through `+=`-style or `++` operators
fn exclude_compound_targets(state: &IrState, root: NodeId, candidates: &mut FxHashSet<String>) {
    for node in state.subtree_nodes(root) {
        match state.kind(node) {
            Some(NodeKind::Assignment { op, target, .. }) if *op != AssignOp::Assign => {
                if let Some(name) = state.kind(*target).and_then(NodeKind::variable_name) {
                    candidates.remove(name);
                }
            }
            Some(NodeKind::Update { argument, .. }) => {
                if let Some(name) = state.kind(*argument).and_then(NodeKind::variable_name) {
                    candidates.remove(name);
                }
            }
            _ => {}
        }
    }
}

/// Report each candidate name defined by this statement subtree, without
/// descending into nested functions
fn collect_def_names(
    state: &IrState,
    root: NodeId,
    candidates: &FxHashSet<String>,
    sink: &mut impl FnMut(&str),
) {
    let Some(kind) = state.kind(root) else { return };
    match kind {
        NodeKind::FunctionDeclaration { .. }
        | NodeKind::FunctionExpression { .. }
        | NodeKind::ArrowFunction { .. } => {}
        NodeKind::VariableDeclarator { id, init } => {
            if init.is_some() {
                if let Some(name) = state.kind(*id).and_then(NodeKind::variable_name) {
                    if candidates.contains(name) {
                        sink(name);
                    }
                }
            }
            if let Some(init) = init {
                collect_def_names(state, *init, candidates, sink);
            }
        }
        NodeKind::Assignment {
            op: AssignOp::Assign,
            target,
            value,
        } => {
            if let Some(name) = state.kind(*target).and_then(NodeKind::variable_name) {
                if candidates.contains(name) {
                    sink(name);
                }
            }
            collect_def_names(state, *value, candidates, sink);
        }
        other => {
            for child in other.children() {
                collect_def_names(state, child, candidates, sink);
            }
        }
    }
}

struct Renamer<'s, 'r> {
    state: &'s mut IrState,
    cfg: &'s Cfg,
    candidates: &'s FxHashSet<String>,
    body: BodySsa,
    stacks: FxHashMap<String, Vec<u32>>,
    phi_sites: FxHashMap<BlockId, Vec<String>>,
    phi_by_block: FxHashMap<BlockId, Vec<NodeId>>,
    recorder: &'r mut MetricsRecorder,
}

impl<'s, 'r> Renamer<'s, 'r> {
    fn fresh_version(&mut self, name: &str) -> u32 {
        let counter = self.body.next_version.entry(name.to_string()).or_insert(0);
        let version = *counter;
        *counter += 1;
        version
    }

    /// Current version, materializing an implicit version 0 for variables
    /// used before any definition
    fn current_version(&mut self, name: &str, block: BlockId) -> u32 {
        if let Some(stack) = self.stacks.get(name) {
            if let Some(&v) = stack.last() {
                return v;
            }
        }
        let version = self.fresh_version(name);
        self.stacks.entry(name.to_string()).or_default().push(version);
        self.body.defs.insert(
            (name.to_string(), version),
            SsaDef {
                block,
                stmt: self.state.root,
                value: None,
            },
        );
        version
    }

    /// Create all φ nodes with placeholder targets; versions land during
    /// the rename walk
    fn place_phis(&mut self) {
        let mut sites: Vec<(BlockId, Vec<String>)> = self
            .phi_sites
            .iter()
            .map(|(b, names)| (*b, names.clone()))
            .collect();
        sites.sort_by_key(|(b, _)| *b);
        for (block, names) in sites {
            for name in names {
                let target = self.state.add(
                    NodeKind::SsaName {
                        name: name.clone(),
                        version: 0,
                    },
                    None,
                );
                let phi = self.state.add(
                    NodeKind::Phi {
                        target,
                        operands: Vec::new(),
                    },
                    None,
                );
                self.recorder.inserted(2);
                self.phi_by_block.entry(block).or_default().push(phi);
            }
        }
    }

    fn rename_block(&mut self, block: BlockId) {
        let mut pushed: Vec<String> = Vec::new();

        // φ targets define new versions at the block head
        let phis = self.phi_by_block.get(&block).cloned().unwrap_or_default();
        for phi in &phis {
            let target = match self.state.kind(*phi) {
                Some(NodeKind::Phi { target, .. }) => *target,
                _ => continue,
            };
            let name = match self.state.kind(target).and_then(NodeKind::variable_name) {
                Some(n) => n.to_string(),
                None => continue,
            };
            let version = self.fresh_version(&name);
            self.state.replace_kind(
                target,
                NodeKind::SsaName {
                    name: name.clone(),
                    version,
                },
            );
            self.stacks.entry(name.clone()).or_default().push(version);
            pushed.push(name.clone());
            self.body.defs.insert(
                (name, version),
                SsaDef {
                    block,
                    stmt: *phi,
                    value: None,
                },
            );
        }

        // Statements in source order
        let statements = self.cfg.block(block).statements.clone();
        for stmt in statements {
            self.rename_in(stmt, block, &mut pushed);
        }

        // Edge conditions are evaluated at the end of this block
        let mut seen_conditions = FxHashSet::default();
        let conditions: Vec<NodeId> = self
            .cfg
            .edges_from(block)
            .filter_map(|e| e.condition)
            .filter(|c| seen_conditions.insert(*c))
            .collect();
        for cond in conditions {
            self.rename_in(cond, block, &mut pushed);
        }

        // Fill φ operands of successors with the versions leaving here
        let succs = self.cfg.block(block).succs.clone();
        let mut filled = FxHashSet::default();
        for succ in succs {
            if !filled.insert(succ) {
                continue;
            }
            let succ_phis = self.phi_by_block.get(&succ).cloned().unwrap_or_default();
            for phi in succ_phis {
                let (target, mut operands) = match self.state.kind(phi) {
                    Some(NodeKind::Phi { target, operands }) => (*target, operands.clone()),
                    _ => continue,
                };
                let name = match self.state.kind(target).and_then(NodeKind::variable_name) {
                    Some(n) => n.to_string(),
                    None => continue,
                };
                let version = self.current_version(&name, block);
                let value = self.state.add(
                    NodeKind::SsaName {
                        name: name.clone(),
                        version,
                    },
                    None,
                );
                self.body
                    .uses
                    .entry((name, version))
                    .or_default()
                    .push(value);
                operands.push(PhiOperand { block, value });
                self.state.replace_kind(phi, NodeKind::Phi { target, operands });
            }
        }

        // Dominator-tree children, in id order for determinism
        let children: Vec<BlockId> = self
            .cfg
            .blocks
            .iter()
            .filter(|b| b.idom == Some(block) && b.id != block)
            .map(|b| b.id)
            .collect();
        for child in children {
            self.rename_block(child);
        }

        for name in pushed.into_iter().rev() {
            if let Some(stack) = self.stacks.get_mut(&name) {
                stack.pop();
            }
        }
    }

    /// Rename uses and definitions inside a statement subtree, in
    /// evaluation order
    fn rename_in(&mut self, node: NodeId, block: BlockId, pushed: &mut Vec<String>) {
        let Some(kind) = self.state.kind(node).cloned() else {
            return;
        };
        self.recorder.visit(1);
        match kind {
            // Nested bodies rename themselves
            NodeKind::FunctionDeclaration { .. }
            | NodeKind::FunctionExpression { .. }
            | NodeKind::ArrowFunction { .. } => {}
            NodeKind::Identifier { name } => {
                if self.candidates.contains(&name) {
                    let version = self.current_version(&name, block);
                    self.state.replace_kind(
                        node,
                        NodeKind::SsaName {
                            name: name.clone(),
                            version,
                        },
                    );
                    self.recorder.changed(1);
                    self.body
                        .uses
                        .entry((name, version))
                        .or_default()
                        .push(node);
                }
            }
            NodeKind::VariableDeclarator { id, init } => {
                if let Some(init) = init {
                    self.rename_in(init, block, pushed);
                }
                let name = self
                    .state
                    .kind(id)
                    .and_then(NodeKind::variable_name)
                    .map(str::to_string);
                if let Some(name) = name {
                    if self.candidates.contains(&name) && init.is_some() {
                        let version = self.fresh_version(&name);
                        self.state.replace_kind(
                            id,
                            NodeKind::SsaName {
                                name: name.clone(),
                                version,
                            },
                        );
                        self.recorder.changed(1);
                        self.stacks.entry(name.clone()).or_default().push(version);
                        pushed.push(name.clone());
                        self.body.defs.insert(
                            (name, version),
                            SsaDef {
                                block,
                                stmt: node,
                                value: init,
                            },
                        );
                    }
                }
            }
            NodeKind::Assignment {
                op: AssignOp::Assign,
                target,
                value,
            } => {
                self.rename_in(value, block, pushed);
                let name = self
                    .state
                    .kind(target)
                    .and_then(NodeKind::variable_name)
                    .map(str::to_string);
                match name {
                    Some(name) if self.candidates.contains(&name) => {
                        let version = self.fresh_version(&name);
                        self.state.replace_kind(
                            target,
                            NodeKind::SsaName {
                                name: name.clone(),
                                version,
                            },
                        );
                        self.recorder.changed(1);
                        self.stacks.entry(name.clone()).or_default().push(version);
                        pushed.push(name.clone());
                        self.body.defs.insert(
                            (name, version),
                            SsaDef {
                                block,
                                stmt: node,
                                value: Some(value),
                            },
                        );
                    }
                    _ => self.rename_in(target, block, pushed),
                }
            }
            NodeKind::Member {
                object,
                property,
                computed,
                ..
            } => {
                self.rename_in(object, block, pushed);
                if computed {
                    self.rename_in(property, block, pushed);
                }
            }
            NodeKind::Property {
                key,
                value,
                computed,
                ..
            } => {
                if computed {
                    self.rename_in(key, block, pushed);
                }
                self.rename_in(value, block, pushed);
            }
            other => {
                for child in other.children() {
                    self.rename_in(child, block, pushed);
                }
            }
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::dominance;
    use crate::features::flow_graph;
    use crate::features::parsing::parse_source;
    use crate::pipeline::config::PipelineConfig;
    use crate::pipeline::pass::CancelToken;

    fn prepared_state(src: &str) -> IrState {
        let lowered = parse_source(src, "test.js").unwrap();
        let mut state = IrState::new(lowered.nodes, lowered.root, lowered.factory);
        flow_graph::rebuild_cfgs(&mut state).unwrap();
        let owners = state.body_owners();
        for owner in owners {
            let mut cfg = state.cfgs.remove(&owner).unwrap();
            dominance::compute(&mut cfg);
            state.cfgs.insert(owner, cfg);
        }
        state
    }

    fn run_construct(state: IrState) -> IrState {
        let config = PipelineConfig::default();
        let cancel = CancelToken::new();
        let ctx = PassContext::bare(&config, &cancel);
        SsaConstructPass.run(state, &ctx).unwrap().state
    }

    #[test]
    fn test_versions_are_monotone_per_name() {
        let state = prepared_state("var a = 1; a = 2; a = 3; use(a);");
        let state = run_construct(state);
        let ssa = state.ssa.as_ref().unwrap();
        let body = ssa.body(state.root).unwrap();
        assert_eq!(body.next_version.get("a"), Some(&3));
        assert!(body.defs.contains_key(&("a".to_string(), 0)));
        assert!(body.defs.contains_key(&("a".to_string(), 2)));
    }

    #[test]
    fn test_uses_rewritten_to_latest_version() {
        let state = prepared_state("var a = 1; a = 2; use(a);");
        let state = run_construct(state);
        // The argument of use() must reference version 1
        let mut found = false;
        for node in state.nodes.values() {
            if let NodeKind::SsaName { name, version } = &node.kind {
                if name == "a" && *version == 1 {
                    found = true;
                }
            }
        }
        assert!(found);
        let ssa = state.ssa.as_ref().unwrap();
        let body = ssa.body(state.root).unwrap();
        assert!(!body.uses[&("a".to_string(), 1)].is_empty());
    }

    #[test]
    fn test_phi_placed_at_join() {
        let state = prepared_state("var x = 0; if (c) { x = 1; } else { x = 2; } use(x);");
        let state = run_construct(state);
        let ssa = state.ssa.as_ref().unwrap();
        let body = ssa.body(state.root).unwrap();
        let phi_count: usize = body.phis.values().map(Vec::len).sum();
        assert_eq!(phi_count, 1);

        // Operand count must equal the predecessor count of the φ's block
        let cfg = state.primary_cfg().unwrap();
        for (&block, phis) in &body.phis {
            for &phi in phis {
                let Some(NodeKind::Phi { operands, .. }) = state.kind(phi) else {
                    panic!("not a phi");
                };
                assert_eq!(operands.len(), cfg.block(block).preds.len());
                for op in operands {
                    assert!(cfg.block(block).preds.contains(&op.block));
                }
            }
        }
    }

    #[test]
    fn test_captured_variables_left_alone() {
        let state =
            prepared_state("var t = 1; function f() { return t; } t = 2; use(f());");
        let state = run_construct(state);
        // t is captured: no SsaName for it anywhere
        for node in state.nodes.values() {
            if let NodeKind::SsaName { name, .. } = &node.kind {
                assert_ne!(name, "t");
            }
        }
    }

    #[test]
    fn test_update_targets_left_alone() {
        let state = prepared_state("var n = 0; n++; use(n);");
        let state = run_construct(state);
        for node in state.nodes.values() {
            if let NodeKind::SsaName { name, .. } = &node.kind {
                assert_ne!(name, "n");
            }
        }
    }
}
