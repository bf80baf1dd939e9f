//! The dead-code elimination pass

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::features::effects::{self, EffectSet};
use crate::features::flow_graph;
use crate::features::scopes::{self, BindingKind};
use crate::pipeline::error::PipelineResult;
use crate::pipeline::pass::{MetricsRecorder, Pass, PassContext, PassOutcome};
use crate::shared::models::node::{NodeId, NodeKind};
use crate::shared::models::IrState;

use super::liveness::{self, Liveness};

const MAX_ROUNDS: usize = 16;

pub struct DeadCodePass {
    label: &'static str,
}

impl DeadCodePass {
    /// The pipeline schedules two runs; they share one implementation
    pub fn first() -> Self {
        Self {
            label: "dead-code-elimination",
        }
    }

    pub fn second() -> Self {
        Self {
            label: "dead-code-elimination-2",
        }
    }
}

impl Pass for DeadCodePass {
    fn name(&self) -> &'static str {
        self.label
    }

    fn description(&self) -> &'static str {
        "remove unreachable statements, unread bindings, dead stores, and empty shells"
    }

    fn mutates_control_flow(&self) -> bool {
        true
    }

    fn run(&self, mut state: IrState, ctx: &PassContext<'_>) -> PipelineResult<PassOutcome> {
        let mut recorder = MetricsRecorder::start();
        let mut changed = false;

        for round in 0..MAX_ROUNDS {
            ctx.cancel.check(self.label)?;
            let round_changed = run_round(&mut state, &mut recorder)?;
            if !round_changed {
                if round > 0 {
                    debug!(pass = self.label, rounds = round, "reached fixpoint");
                }
                break;
            }
            changed = true;
        }

        let metrics = recorder.finish();
        Ok(if changed {
            PassOutcome::changed(state, metrics)
        } else {
            PassOutcome::unchanged(state, metrics)
        })
    }
}

fn run_round(state: &mut IrState, recorder: &mut MetricsRecorder) -> PipelineResult<bool> {
    let mut changed = false;
    changed |= truncate_after_terminators(state, recorder);
    changed |= canonicalize_literal_tests(state, recorder);
    changed |= remove_dead_bindings(state, recorder);
    changed |= remove_pure_expression_statements(state, recorder);
    changed |= remove_dead_stores(state, recorder)?;
    changed |= coalesce_empty_shells(state, recorder);
    Ok(changed)
}

/// Every statement list from the root
fn statement_lists(state: &IrState) -> Vec<NodeId> {
    state
        .subtree_nodes(state.root)
        .into_iter()
        .filter(|&n| state.statement_list(n).is_some())
        .collect()
}

/// Statements behind a terminator never execute; they are flagged by the
/// CFG builder and removed here, wholesale
fn truncate_after_terminators(state: &mut IrState, recorder: &mut MetricsRecorder) -> bool {
    let mut changed = false;
    for list_owner in statement_lists(state) {
        let Some(list) = state.statement_list(list_owner) else { continue };
        let cut = list
            .iter()
            .position(|&s| state.kind(s).map(|k| k.is_terminator()).unwrap_or(false));
        let Some(cut) = cut else { continue };
        let list = list.clone();
        if cut + 1 >= list.len() {
            continue;
        }
        let (keep, drop) = list.split_at(cut + 1);
        let keep = keep.to_vec();
        for &dead in drop {
            remove_subtree(state, dead, recorder);
        }
        if let Some(list_mut) = state.statement_list_mut(list_owner) {
            *list_mut = keep;
        }
        changed = true;
    }
    changed
}

/// `if`/`while`/`do` with a literal test collapse to the live side
fn canonicalize_literal_tests(state: &mut IrState, recorder: &mut MetricsRecorder) -> bool {
    let mut changed = false;
    for node in state.subtree_nodes(state.root) {
        let Some(kind) = state.kind(node).cloned() else { continue };
        match kind {
            NodeKind::If {
                test,
                consequent,
                alternate,
            } => {
                let Some(truthy) = literal_truthiness(state, test) else {
                    continue;
                };
                remove_subtree(state, test, recorder);
                let (keep, drop) = if truthy {
                    (Some(consequent), alternate)
                } else {
                    (alternate, Some(consequent))
                };
                if let Some(drop) = drop {
                    remove_subtree(state, drop, recorder);
                }
                match keep {
                    Some(keep) => adopt(state, node, keep, recorder),
                    None => state.replace_kind(node, NodeKind::EmptyStatement),
                }
                changed = true;
            }
            NodeKind::While { test, body } => {
                if literal_truthiness(state, test) == Some(false) {
                    remove_subtree(state, test, recorder);
                    remove_subtree(state, body, recorder);
                    state.replace_kind(node, NodeKind::EmptyStatement);
                    changed = true;
                }
            }
            NodeKind::DoWhile { body, test } => {
                // Runs exactly once when the latch test is always false
                if literal_truthiness(state, test) == Some(false) {
                    remove_subtree(state, test, recorder);
                    adopt(state, node, body, recorder);
                    changed = true;
                }
            }
            _ => {}
        }
    }
    changed
}

fn literal_truthiness(state: &IrState, expr: NodeId) -> Option<bool> {
    match state.kind(expr)? {
        NodeKind::Literal { value } => value.truthiness(),
        _ => None,
    }
}

/// Bindings with no reads anywhere lose their declarations, their pure
/// stores, and (for functions) their bodies
fn remove_dead_bindings(state: &mut IrState, recorder: &mut MetricsRecorder) -> bool {
    let analysis = scopes::bind(state);
    let locals = analysis.declared_names();

    // Names safe to drop: unread, not captured, not parameters. Removal
    // works by name, so a name qualifies only when every binding of that
    // name is dead
    let mut dead_count: FxHashMap<&str, usize> = FxHashMap::default();
    let mut total_count: FxHashMap<&str, usize> = FxHashMap::default();
    for binding in &analysis.bindings {
        *total_count.entry(binding.name.as_str()).or_insert(0) += 1;
        let removable = binding.read_count() == 0
            && !binding.captured
            && !matches!(binding.kind, BindingKind::Param | BindingKind::CatchParam);
        if removable {
            *dead_count.entry(binding.name.as_str()).or_insert(0) += 1;
        }
    }
    let dead: FxHashSet<String> = dead_count
        .into_iter()
        .filter(|(name, n)| total_count.get(name) == Some(n))
        .map(|(name, _)| name.to_string())
        .collect();
    if dead.is_empty() || analysis.has_eval {
        return false;
    }

    let mut changed = false;
    let mut removals: FxHashSet<NodeId> = FxHashSet::default();
    let mut declaration_edits: FxHashMap<NodeId, Vec<NodeId>> = FxHashMap::default();

    for list_owner in statement_lists(state) {
        let Some(list) = state.statement_list(list_owner) else { continue };
        for &stmt in list.clone().iter() {
            match state.kind(stmt).cloned() {
                Some(NodeKind::FunctionDeclaration { id, .. }) => {
                    let name = state.kind(id).and_then(NodeKind::variable_name);
                    if matches!(name, Some(n) if dead.contains(n)) {
                        removals.insert(stmt);
                    }
                }
                Some(NodeKind::VariableDeclaration { declarations, .. }) => {
                    let mut kept = Vec::new();
                    for &decl in &declarations {
                        let Some(NodeKind::VariableDeclarator { id, init }) =
                            state.kind(decl).cloned()
                        else {
                            continue;
                        };
                        let name = state
                            .kind(id)
                            .and_then(NodeKind::variable_name)
                            .map(str::to_string);
                        let removable_init = match init {
                            None => true,
                            Some(init) => effect_set(state, init, &locals).is_removable(),
                        };
                        match name {
                            Some(n) if dead.contains(&n) && removable_init => {}
                            _ => kept.push(decl),
                        }
                    }
                    if kept.len() != declarations.len() {
                        if kept.is_empty() {
                            removals.insert(stmt);
                        } else {
                            declaration_edits.insert(stmt, kept);
                        }
                    }
                }
                Some(NodeKind::ExpressionStatement { expression }) => {
                    // A pure store to a dead name
                    if let Some(NodeKind::Assignment { target, value, .. }) =
                        state.kind(expression).cloned()
                    {
                        let name = state.kind(target).and_then(NodeKind::variable_name);
                        let is_dead = matches!(name, Some(n) if dead.contains(n));
                        if is_dead && effect_set(state, value, &locals).is_removable() {
                            removals.insert(stmt);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    for (decl_stmt, kept) in declaration_edits {
        let Some(NodeKind::VariableDeclaration { kind, declarations }) =
            state.kind(decl_stmt).cloned()
        else {
            continue;
        };
        for &d in &declarations {
            if !kept.contains(&d) {
                remove_subtree(state, d, recorder);
            }
        }
        state.replace_kind(
            decl_stmt,
            NodeKind::VariableDeclaration {
                kind,
                declarations: kept,
            },
        );
        changed = true;
    }
    changed |= apply_removals(state, &removals, recorder);
    changed
}

/// Expression statements whose evaluation observes nothing
fn remove_pure_expression_statements(state: &mut IrState, recorder: &mut MetricsRecorder) -> bool {
    let analysis = scopes::bind(state);
    let locals = analysis.declared_names();
    let mut removals: FxHashSet<NodeId> = FxHashSet::default();

    for list_owner in statement_lists(state) {
        let Some(list) = state.statement_list(list_owner) else { continue };
        for &stmt in list.clone().iter() {
            if let Some(NodeKind::ExpressionStatement { expression }) = state.kind(stmt) {
                if effect_set(state, *expression, &locals).is_removable() {
                    removals.insert(stmt);
                }
            }
        }
    }
    apply_removals(state, &removals, recorder)
}

/// Stores whose target is not live afterwards, found by backward
/// dataflow per code body
fn remove_dead_stores(
    state: &mut IrState,
    recorder: &mut MetricsRecorder,
) -> PipelineResult<bool> {
    flow_graph::rebuild_cfgs(state)?;
    let analysis = scopes::bind(state);
    let locals = analysis.declared_names();

    let mut removals: FxHashSet<NodeId> = FxHashSet::default();
    for owner in state.body_owners() {
        let tracked = analysis.ssa_candidates(owner);
        if tracked.is_empty() {
            continue;
        }
        let Some(cfg) = state.cfgs.get(&owner) else { continue };
        let live = Liveness::compute(state, cfg, &tracked);

        for block in &cfg.blocks {
            let mut live_now = live.live_out[&block.id].clone();
            let mut seen = FxHashSet::default();
            for edge in cfg.edges_from(block.id) {
                if let Some(cond) = edge.condition {
                    if seen.insert(cond) {
                        live_now.extend(liveness::reads_of(state, cond, &tracked));
                    }
                }
            }
            for &stmt in block.statements.iter().rev() {
                let store = dead_store_candidate(state, stmt, &tracked, &locals);
                if let Some(target) = store {
                    if !live_now.contains(&target) {
                        removals.insert(stmt);
                        continue;
                    }
                }
                let (uses, defs) = liveness::uses_and_defs(state, stmt, &tracked);
                for d in defs {
                    live_now.remove(&d);
                }
                live_now.extend(uses);
            }
        }
    }
    Ok(apply_removals(state, &removals, recorder))
}

/// `x = pure-expr;` for a tracked x returns the target name
fn dead_store_candidate(
    state: &IrState,
    stmt: NodeId,
    tracked: &FxHashSet<String>,
    locals: &FxHashSet<String>,
) -> Option<String> {
    let NodeKind::ExpressionStatement { expression } = state.kind(stmt)? else {
        return None;
    };
    let NodeKind::Assignment { target, value, .. } = state.kind(*expression)? else {
        return None;
    };
    let name = state.kind(*target).and_then(NodeKind::variable_name)?;
    if !tracked.contains(name) {
        return None;
    }
    if !effect_set(state, *value, locals).is_removable() {
        return None;
    }
    Some(name.to_string())
}

/// Empty blocks, empty statements, and ifs with nothing left in them
fn coalesce_empty_shells(state: &mut IrState, recorder: &mut MetricsRecorder) -> bool {
    let mut changed = false;
    changed |= flatten_plain_blocks(state, recorder);
    let mut removals: FxHashSet<NodeId> = FxHashSet::default();

    for list_owner in statement_lists(state) {
        let Some(list) = state.statement_list(list_owner) else { continue };
        for &stmt in list.clone().iter() {
            match state.kind(stmt) {
                Some(NodeKind::EmptyStatement) => {
                    removals.insert(stmt);
                }
                Some(NodeKind::Block { body }) if body.is_empty() => {
                    removals.insert(stmt);
                }
                Some(NodeKind::VariableDeclaration { declarations, .. })
                    if declarations.is_empty() =>
                {
                    removals.insert(stmt);
                }
                _ => {}
            }
        }
    }
    changed |= apply_removals(state, &removals, recorder);

    // An if whose branches are both empty keeps only its effectful test
    for node in state.subtree_nodes(state.root) {
        let Some(NodeKind::If {
            test,
            consequent,
            alternate,
        }) = state.kind(node).cloned()
        else {
            continue;
        };
        let consequent_empty = is_empty_stmt(state, consequent);
        let alternate_empty = alternate.map(|a| is_empty_stmt(state, a)).unwrap_or(true);
        if consequent_empty && alternate_empty {
            remove_subtree(state, consequent, recorder);
            if let Some(alt) = alternate {
                remove_subtree(state, alt, recorder);
            }
            state.replace_kind(node, NodeKind::ExpressionStatement { expression: test });
            changed = true;
        }
    }
    changed
}

/// A block statement without lexical declarations adds no scope; its
/// statements splice into the surrounding list
fn flatten_plain_blocks(state: &mut IrState, recorder: &mut MetricsRecorder) -> bool {
    let mut changed = false;
    for list_owner in statement_lists(state) {
        let Some(list) = state.statement_list(list_owner) else { continue };
        let list = list.clone();
        let mut rebuilt: Vec<NodeId> = Vec::with_capacity(list.len());
        let mut touched = false;
        for stmt in list {
            let inner = match state.kind(stmt) {
                Some(NodeKind::Block { body }) if !block_needs_scope(state, body) => {
                    Some(body.clone())
                }
                _ => None,
            };
            match inner {
                Some(body) => {
                    rebuilt.extend(body);
                    state.nodes.remove(&stmt);
                    recorder.removed(1);
                    touched = true;
                }
                None => rebuilt.push(stmt),
            }
        }
        if touched {
            if let Some(list_mut) = state.statement_list_mut(list_owner) {
                *list_mut = rebuilt;
            }
            changed = true;
        }
    }
    changed
}

/// `let`/`const` (and function declarations, which hoist differently)
/// pin the block scope in place
fn block_needs_scope(state: &IrState, body: &[NodeId]) -> bool {
    body.iter().any(|&stmt| {
        matches!(
            state.kind(stmt),
            Some(NodeKind::VariableDeclaration {
                kind: crate::shared::models::DeclKind::Let
                    | crate::shared::models::DeclKind::Const,
                ..
            }) | Some(NodeKind::FunctionDeclaration { .. })
        )
    })
}

fn is_empty_stmt(state: &IrState, stmt: NodeId) -> bool {
    match state.kind(stmt) {
        Some(NodeKind::EmptyStatement) => true,
        Some(NodeKind::Block { body }) => body.is_empty(),
        _ => false,
    }
}

fn effect_set(state: &IrState, expr: NodeId, locals: &FxHashSet<String>) -> EffectSet {
    effects::expr_effects(state, expr, locals)
}

fn apply_removals(
    state: &mut IrState,
    removals: &FxHashSet<NodeId>,
    recorder: &mut MetricsRecorder,
) -> bool {
    if removals.is_empty() {
        return false;
    }
    for list_owner in statement_lists(state) {
        let Some(list) = state.statement_list_mut(list_owner) else { continue };
        list.retain(|s| !removals.contains(s));
    }
    for &dead in removals {
        remove_subtree(state, dead, recorder);
    }
    true
}

fn remove_subtree(state: &mut IrState, root: NodeId, recorder: &mut MetricsRecorder) {
    for node in state.subtree_nodes(root) {
        if state.nodes.remove(&node).is_some() {
            recorder.removed(1);
        }
    }
}

/// Replace a node's kind with its child's, consuming the child entry
fn adopt(state: &mut IrState, parent: NodeId, child: NodeId, recorder: &mut MetricsRecorder) {
    if let Some(kind) = state.kind(child).cloned() {
        state.replace_kind(parent, kind);
        state.nodes.remove(&child);
        recorder.changed(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::parsing::parse_source;
    use crate::features::printing::print_program;
    use crate::pipeline::config::PipelineConfig;
    use crate::pipeline::pass::{CancelToken, PassContext};

    fn run_dce(src: &str) -> String {
        let lowered = parse_source(src, "test.js").unwrap();
        let mut state = IrState::new(lowered.nodes, lowered.root, lowered.factory);
        flow_graph::rebuild_cfgs(&mut state).unwrap();
        let config = PipelineConfig::default();
        let cancel = CancelToken::new();
        let ctx = PassContext::bare(&config, &cancel);
        let state = DeadCodePass::first().run(state, &ctx).unwrap().state;
        print_program(&state)
    }

    fn normalized(src: &str) -> String {
        run_dce(src)
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_unreachable_after_return_removed() {
        let out = normalized("f(); return; unreachable();");
        assert!(!out.contains("unreachable"), "got: {out}");
        assert!(out.contains("return;"), "got: {out}");
    }

    #[test]
    fn test_unread_binding_removed() {
        let out = normalized("var waste = 42; console.log(1);");
        assert!(!out.contains("waste"), "got: {out}");
        assert!(out.contains("console.log(1);"), "got: {out}");
    }

    #[test]
    fn test_read_binding_kept() {
        let out = normalized("var keep = 42; use(keep);");
        assert!(out.contains("var keep = 42;"), "got: {out}");
    }

    #[test]
    fn test_impure_initializer_blocks_removal() {
        let out = normalized("var x = sideEffect();");
        assert!(out.contains("sideEffect()"), "got: {out}");
    }

    #[test]
    fn test_cascading_removal_reaches_fixpoint() {
        // Removing the function unreads the table, which then goes too
        let out = normalized(
            "var table = ['a']; function pick(i) { return table[i]; } console.log(1);",
        );
        assert!(!out.contains("table"), "got: {out}");
        assert!(!out.contains("pick"), "got: {out}");
        assert!(out.contains("console.log(1);"), "got: {out}");
    }

    #[test]
    fn test_dead_store_removed() {
        let out = normalized("var x = 0; x = 1; x = 2; use(x);");
        // The store of 1 is overwritten before any read
        assert!(!out.contains("x = 1"), "got: {out}");
        assert!(out.contains("x = 2"), "got: {out}");
    }

    #[test]
    fn test_literal_if_collapses() {
        let out = normalized("if (true) { f(); } else { g(); }");
        assert!(out.contains("f();"), "got: {out}");
        assert!(!out.contains("g()"), "got: {out}");
    }

    #[test]
    fn test_while_false_removed() {
        let out = normalized("while (false) { f(); } g();");
        assert!(!out.contains("f()"), "got: {out}");
        assert!(out.contains("g();"), "got: {out}");
    }

    #[test]
    fn test_idempotent() {
        let src = "var a = 1; use(a); return; dead();";
        let once = run_dce(src);
        let twice = run_dce(&once);
        assert_eq!(
            once.split_whitespace().collect::<Vec<_>>(),
            twice.split_whitespace().collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_pure_expression_statement_removed() {
        let out = normalized("var a = 1; a + 2; use(a);");
        assert!(!out.contains("a + 2"), "got: {out}");
        assert!(out.contains("use(a);"), "got: {out}");
    }
}
