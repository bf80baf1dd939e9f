//! The constant-propagation pass

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::features::effects;
use crate::features::eval::js_value::JsValue;
use crate::features::eval::{eval_binary_literal, eval_logical_literal, eval_unary_literal, LogicalFold};
use crate::features::scopes::{self, BindingKind};
use crate::pipeline::error::PipelineResult;
use crate::pipeline::pass::{MetricsRecorder, Pass, PassContext, PassOutcome};
use crate::shared::models::node::{LiteralValue, NodeId, NodeKind};
use crate::shared::models::IrState;

use super::lattice::AbstractValue;
use super::partial_eval::evaluate_pure_call;

/// Substitution iterations per body; each round can only shrink the
/// program, so this is a safety net, not a tuning knob
const MAX_ROUNDS: usize = 8;

pub struct ConstantPropagationPass;

impl Pass for ConstantPropagationPass {
    fn name(&self) -> &'static str {
        "constant-propagation"
    }

    fn description(&self) -> &'static str {
        "replace literal-valued uses and fold constant expressions"
    }

    fn requires_ssa(&self) -> bool {
        true
    }

    fn run(&self, mut state: IrState, ctx: &PassContext<'_>) -> PipelineResult<PassOutcome> {
        let mut recorder = MetricsRecorder::start();
        let mut changed = false;

        // Pure top-level functions, for compile-time call evaluation
        let pure_functions = if ctx.config.enhanced_constants {
            collect_pure_functions(&mut state)
        } else {
            FxHashMap::default()
        };

        let owners = state.body_owners();
        for owner in owners {
            ctx.cancel.check("constant-propagation")?;
            for _round in 0..MAX_ROUNDS {
                let literals = reaching_literals(&state, owner);
                let mut walker = Walker {
                    state: &mut state,
                    literals: &literals,
                    pure_functions: &pure_functions,
                    enhanced: ctx.config.enhanced_constants,
                    step_bound: ctx.config.partial_eval_step_bound,
                    recorder: &mut recorder,
                    changed: false,
                };
                let stmts = walker.state.body_statements(owner);
                for stmt in stmts {
                    walker.walk_stmt(stmt);
                }
                if !walker.changed {
                    break;
                }
                changed = true;
            }
        }

        let metrics = recorder.finish();
        Ok(if changed {
            PassOutcome::changed(state, metrics)
        } else {
            PassOutcome::unchanged(state, metrics)
        })
    }
}

/// Literal values per SSA version: direct literal definitions plus φ
/// targets whose operands join to a constant
fn reaching_literals(state: &IrState, owner: NodeId) -> FxHashMap<(String, u32), LiteralValue> {
    let mut literals: FxHashMap<(String, u32), LiteralValue> = FxHashMap::default();
    let Some(body) = state.ssa.as_ref().and_then(|ssa| ssa.body(owner)) else {
        return literals;
    };

    for ((name, version), def) in &body.defs {
        if let Some(value) = def.value {
            if let Some(NodeKind::Literal { value: lit }) = state.kind(value) {
                literals.insert((name.clone(), *version), lit.clone());
            }
        }
    }

    // φ joins through the abstract lattice: equal constants fold, unequal
    // ones keep their names (they may still form a usable range)
    loop {
        let mut grew = false;
        let mut blocks: Vec<_> = body.phis.keys().copied().collect();
        blocks.sort();
        for block in blocks {
            for &phi in &body.phis[&block] {
                let (target, operands) = match state.kind(phi) {
                    Some(NodeKind::Phi { target, operands }) => (*target, operands.clone()),
                    _ => continue,
                };
                let Some(NodeKind::SsaName { name, version }) = state.kind(target) else {
                    continue;
                };
                let key = (name.clone(), *version);
                if literals.contains_key(&key) {
                    continue;
                }
                let mut joined = AbstractValue::Bottom;
                for op in &operands {
                    let abstract_op = match state.kind(op.value) {
                        Some(NodeKind::SsaName { name, version }) => literals
                            .get(&(name.clone(), *version))
                            .map(AbstractValue::from_literal)
                            .unwrap_or(AbstractValue::Top),
                        Some(NodeKind::Literal { value }) => AbstractValue::from_literal(value),
                        _ => AbstractValue::Top,
                    };
                    joined = joined.join(&abstract_op);
                }
                if let Some(lit) = joined.as_constant() {
                    literals.insert(key, lit.clone());
                    grew = true;
                }
            }
        }
        if !grew {
            break;
        }
    }
    literals
}

/// Top-level function declarations with an empty effect summary that are
/// never reassigned
fn collect_pure_functions(state: &mut IrState) -> FxHashMap<String, NodeId> {
    let analysis = scopes::bind(state);
    let mut pure = FxHashMap::default();
    let mut purity_report = Vec::new();
    for binding in &analysis.bindings {
        if !matches!(binding.kind, BindingKind::Function) || binding.write_count() > 0 {
            continue;
        }
        // Locate the declaration node for this function name
        let decl = state.subtree_nodes(state.root).into_iter().find(|&n| {
            matches!(
                state.kind(n),
                Some(NodeKind::FunctionDeclaration { id, .. })
                    if state.kind(*id).and_then(NodeKind::variable_name) == Some(binding.name.as_str())
            )
        });
        if let Some(decl) = decl {
            let summary = effects::function_effects(state, decl);
            if summary.is_pure() {
                pure.insert(binding.name.clone(), decl);
                purity_report.push(binding.name.clone());
            }
        }
    }
    if !purity_report.is_empty() {
        debug!(functions = ?purity_report, "pure function summaries");
        state.set_meta(
            "constants.pure_functions",
            serde_json::json!(purity_report),
        );
    }
    pure
}

struct Walker<'s, 'r> {
    state: &'s mut IrState,
    literals: &'s FxHashMap<(String, u32), LiteralValue>,
    pure_functions: &'s FxHashMap<String, NodeId>,
    enhanced: bool,
    step_bound: usize,
    recorder: &'r mut MetricsRecorder,
    changed: bool,
}

impl<'s, 'r> Walker<'s, 'r> {
    fn literal_kind(&self, id: NodeId) -> Option<LiteralValue> {
        match self.state.kind(id)? {
            NodeKind::Literal { value } => Some(value.clone()),
            _ => None,
        }
    }

    /// The literal a use site would substitute to, when its reaching
    /// definition is a literal
    fn substitutable(&self, id: NodeId) -> Option<LiteralValue> {
        match self.state.kind(id)? {
            NodeKind::SsaName { name, version } => {
                self.literals.get(&(name.clone(), *version)).cloned()
            }
            _ => None,
        }
    }

    fn replace_with_literal(&mut self, id: NodeId, value: LiteralValue) {
        self.state.replace_kind(id, NodeKind::Literal { value });
        self.recorder.changed(1);
        self.changed = true;
    }

    /// Substitute the node if it is a literal-valued use
    fn try_substitute(&mut self, id: NodeId) -> bool {
        if let Some(value) = self.substitutable(id) {
            self.replace_with_literal(id, value);
            return true;
        }
        false
    }

    /// Drop a subtree that is no longer referenced
    fn remove_subtree(&mut self, root: NodeId) {
        for node in self.state.subtree_nodes(root) {
            self.state.nodes.remove(&node);
            self.recorder.removed(1);
        }
    }

    /// Parent adopts a child's kind; the child entry dies, its children
    /// transfer to the parent
    fn adopt(&mut self, parent: NodeId, child: NodeId) {
        if let Some(kind) = self.state.kind(child).cloned() {
            self.state.replace_kind(parent, kind);
            self.state.nodes.remove(&child);
            self.recorder.changed(1);
            self.changed = true;
        }
    }

    fn walk_stmt(&mut self, stmt: NodeId) {
        let Some(kind) = self.state.kind(stmt).cloned() else {
            return;
        };
        self.recorder.visit(1);
        match kind {
            // Nested bodies run in their own iteration
            NodeKind::FunctionDeclaration { .. }
            | NodeKind::FunctionExpression { .. }
            | NodeKind::ArrowFunction { .. } => {}
            NodeKind::ExpressionStatement { expression } => self.walk_expr(expression),
            NodeKind::VariableDeclaration { declarations, .. } => {
                for decl in declarations {
                    if let Some(NodeKind::VariableDeclarator {
                        init: Some(init), ..
                    }) = self.state.kind(decl).cloned()
                    {
                        // The whole right-hand side may substitute
                        if !self.try_substitute(init) {
                            self.walk_expr(init);
                        }
                    }
                }
            }
            NodeKind::Return { argument } => {
                if let Some(arg) = argument {
                    self.walk_expr(arg);
                }
            }
            NodeKind::If {
                test,
                consequent,
                alternate,
            } => {
                if !self.try_substitute(test) {
                    self.walk_expr(test);
                }
                self.walk_stmt(consequent);
                if let Some(alt) = alternate {
                    self.walk_stmt(alt);
                }
            }
            NodeKind::While { test, body } => {
                if !self.try_substitute(test) {
                    self.walk_expr(test);
                }
                self.walk_stmt(body);
            }
            NodeKind::DoWhile { body, test } => {
                self.walk_stmt(body);
                if !self.try_substitute(test) {
                    self.walk_expr(test);
                }
            }
            NodeKind::For {
                init,
                test,
                update,
                body,
            } => {
                if let Some(init) = init {
                    if matches!(
                        self.state.kind(init),
                        Some(NodeKind::VariableDeclaration { .. })
                    ) {
                        self.walk_stmt(init);
                    } else {
                        self.walk_expr(init);
                    }
                }
                if let Some(test) = test {
                    if !self.try_substitute(test) {
                        self.walk_expr(test);
                    }
                }
                if let Some(update) = update {
                    self.walk_expr(update);
                }
                self.walk_stmt(body);
            }
            NodeKind::Block { body } => {
                for stmt in body {
                    self.walk_stmt(stmt);
                }
            }
            NodeKind::Switch {
                discriminant,
                cases,
            } => {
                self.walk_expr(discriminant);
                for case in cases {
                    if let Some(NodeKind::SwitchCase { test, body }) =
                        self.state.kind(case).cloned()
                    {
                        if let Some(test) = test {
                            self.walk_expr(test);
                        }
                        for stmt in body {
                            self.walk_stmt(stmt);
                        }
                    }
                }
            }
            NodeKind::Labeled { body, .. } => self.walk_stmt(body),
            NodeKind::Throw { argument } => self.walk_expr(argument),
            NodeKind::Try {
                block,
                handler,
                finalizer,
                ..
            } => {
                self.walk_stmt(block);
                if let Some(h) = handler {
                    self.walk_stmt(h);
                }
                if let Some(f) = finalizer {
                    self.walk_stmt(f);
                }
            }
            _ => {}
        }
    }

    /// Walk an expression: substitute where the context allows, fold what
    /// becomes fully literal
    fn walk_expr(&mut self, expr: NodeId) {
        let Some(kind) = self.state.kind(expr).cloned() else {
            return;
        };
        self.recorder.visit(1);
        match kind {
            NodeKind::Binary { op, left, right } => {
                self.walk_expr(left);
                self.walk_expr(right);
                // Substitute an operand only when its co-operand is
                // already literal, so the expression folds away
                if self.literal_kind(right).is_some() {
                    self.try_substitute(left);
                }
                if self.literal_kind(left).is_some() {
                    self.try_substitute(right);
                }
                if let (Some(l), Some(r)) =
                    (self.literal_kind(left), self.literal_kind(right))
                {
                    if let Some(folded) = eval_binary_literal(op, &l, &r) {
                        self.state.nodes.remove(&left);
                        self.state.nodes.remove(&right);
                        self.recorder.removed(2);
                        self.replace_with_literal(expr, folded);
                    }
                }
            }
            NodeKind::Unary { op, argument } => {
                self.walk_expr(argument);
                self.try_substitute(argument);
                if let Some(v) = self.literal_kind(argument) {
                    if let Some(folded) = eval_unary_literal(op, &v) {
                        self.state.nodes.remove(&argument);
                        self.recorder.removed(1);
                        self.replace_with_literal(expr, folded);
                    }
                }
            }
            NodeKind::Logical { op, left, right } => {
                self.walk_expr(left);
                self.try_substitute(left);
                self.walk_expr(right);
                if let Some(l) = self.literal_kind(left) {
                    match eval_logical_literal(op, &l) {
                        Some(LogicalFold::Left) => {
                            self.remove_subtree(right);
                            self.adopt(expr, left);
                        }
                        Some(LogicalFold::Right) => {
                            self.state.nodes.remove(&left);
                            self.recorder.removed(1);
                            self.adopt(expr, right);
                        }
                        None => {}
                    }
                }
            }
            NodeKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                self.walk_expr(test);
                self.try_substitute(test);
                self.walk_expr(consequent);
                self.walk_expr(alternate);
                if let Some(t) = self.literal_kind(test) {
                    if let Some(truthy) = t.truthiness() {
                        self.state.nodes.remove(&test);
                        self.recorder.removed(1);
                        let (keep, drop) = if truthy {
                            (consequent, alternate)
                        } else {
                            (alternate, consequent)
                        };
                        self.remove_subtree(drop);
                        self.adopt(expr, keep);
                    }
                }
            }
            NodeKind::Assignment { target, value, .. } => {
                // The whole right-hand side may substitute
                if !self.try_substitute(value) {
                    self.walk_expr(value);
                }
                self.walk_expr(target);
            }
            NodeKind::Call {
                callee, arguments, ..
            } => {
                self.walk_expr(callee);
                let console_sink = effects::classifier::is_console_call(self.state, callee);
                for &arg in &arguments {
                    if console_sink {
                        // Console arguments read better as values
                        if !self.try_substitute(arg) {
                            self.walk_expr(arg);
                        }
                    } else {
                        self.walk_expr(arg);
                    }
                }
                self.try_pure_call_fold(expr, callee, &arguments);
            }
            NodeKind::New {
                callee, arguments, ..
            } => {
                self.walk_expr(callee);
                for arg in arguments {
                    self.walk_expr(arg);
                }
            }
            NodeKind::Member {
                object,
                property,
                computed,
                ..
            } => {
                self.walk_expr(object);
                if computed {
                    // Constant indices expose decoder-table lookups
                    if !self.try_substitute(property) {
                        self.walk_expr(property);
                    }
                }
            }
            NodeKind::Sequence { expressions } => {
                for e in expressions {
                    self.walk_expr(e);
                }
            }
            NodeKind::ArrayLit { elements } => {
                for e in elements.into_iter().flatten() {
                    self.walk_expr(e);
                }
            }
            NodeKind::ObjectLit { properties } => {
                for p in properties {
                    if let Some(NodeKind::Property {
                        key,
                        value,
                        computed,
                        ..
                    }) = self.state.kind(p).cloned()
                    {
                        if computed {
                            self.walk_expr(key);
                        }
                        self.walk_expr(value);
                    }
                }
            }
            NodeKind::Update { .. }
            | NodeKind::Identifier { .. }
            | NodeKind::SsaName { .. }
            | NodeKind::Literal { .. } => {}
            // Closures fold on their own pass over their own body
            NodeKind::FunctionExpression { .. } | NodeKind::ArrowFunction { .. } => {}
            _ => {}
        }
    }

    /// Evaluate a pure call with all-literal arguments at compile time
    fn try_pure_call_fold(&mut self, call: NodeId, callee: NodeId, arguments: &[NodeId]) {
        if !self.enhanced {
            return;
        }
        let Some(name) = self.state.kind(callee).and_then(NodeKind::variable_name) else {
            return;
        };
        let Some(&function) = self.pure_functions.get(name) else {
            return;
        };
        let mut args = Vec::with_capacity(arguments.len());
        for &arg in arguments {
            let Some(lit) = self.literal_kind(arg) else { return };
            let Some(v) = JsValue::from_literal(&lit) else { return };
            args.push(v);
        }
        if let Some(result) = evaluate_pure_call(self.state, function, &args, self.step_bound) {
            if let Some(lit) = result.into_literal() {
                debug!(callee = name, "folded pure call");
                for &arg in arguments {
                    self.state.nodes.remove(&arg);
                    self.recorder.removed(1);
                }
                self.remove_subtree(callee);
                self.replace_with_literal(call, lit);
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
    use crate::features::printing::print_program;
    use crate::features::ssa::{SsaConstructPass, SsaDestructPass};
    use crate::pipeline::config::PipelineConfig;
    use crate::pipeline::pass::CancelToken;

    fn run_pipeline_fragment(src: &str, config: &PipelineConfig) -> String {
        let lowered = parse_source(src, "test.js").unwrap();
        let mut state = IrState::new(lowered.nodes, lowered.root, lowered.factory);
        flow_graph::rebuild_cfgs(&mut state).unwrap();
        let owners = state.body_owners();
        for owner in owners {
            let mut cfg = state.cfgs.remove(&owner).unwrap();
            dominance::compute(&mut cfg);
            state.cfgs.insert(owner, cfg);
        }
        let cancel = CancelToken::new();
        let ctx = PassContext::bare(config, &cancel);
        let state = SsaConstructPass.run(state, &ctx).unwrap().state;
        let state = ConstantPropagationPass.run(state, &ctx).unwrap().state;
        let state = SsaDestructPass.run(state, &ctx).unwrap().state;
        print_program(&state)
    }

    fn normalized(src: &str, config: &PipelineConfig) -> String {
        run_pipeline_fragment(src, config)
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_chain_folds_into_console_argument() {
        let config = PipelineConfig::default();
        let out = normalized("var a = 1; var b = a; var c = b + 2; console.log(c);", &config);
        assert!(out.contains("console.log(3);"), "got: {out}");
    }

    #[test]
    fn test_mixed_variable_expression_is_preserved() {
        let config = PipelineConfig::default();
        let out = normalized("var x = 10; var y = 20; console.log(x + y);", &config);
        // Neither operand substitutes: the co-operand is a variable
        assert!(out.contains("console.log(x + y);"), "got: {out}");
        assert!(out.contains("var x = 10;"), "got: {out}");
    }

    #[test]
    fn test_unknown_call_argument_keeps_binding() {
        let config = PipelineConfig::default();
        let out = normalized("var k = 42; use(k);", &config);
        assert!(out.contains("use(k);"), "got: {out}");
    }

    #[test]
    fn test_equal_phi_operands_fold() {
        let config = PipelineConfig::default();
        let out = normalized(
            "var x = 0; if (c) { x = 7; } else { x = 7; } console.log(x);",
            &config,
        );
        assert!(out.contains("console.log(7);"), "got: {out}");
    }

    #[test]
    fn test_unequal_phi_operands_keep_variable() {
        let config = PipelineConfig::default();
        let out = normalized(
            "var x = 0; if (c) { x = 1; } else { x = 2; } console.log(x);",
            &config,
        );
        assert!(out.contains("console.log(x);"), "got: {out}");
    }

    #[test]
    fn test_pure_call_with_constant_args_evaluates() {
        let config = PipelineConfig::default();
        let out = normalized(
            "function add(a, b) { return a + b; } console.log(add(2, 3));",
            &config,
        );
        assert!(out.contains("console.log(5);"), "got: {out}");
    }

    #[test]
    fn test_pure_call_fold_disabled_without_enhanced_mode() {
        let config = PipelineConfig {
            enhanced_constants: false,
            ..PipelineConfig::default()
        };
        let out = normalized(
            "function add(a, b) { return a + b; } console.log(add(2, 3));",
            &config,
        );
        assert!(out.contains("add(2, 3)"), "got: {out}");
    }

    #[test]
    fn test_nan_producing_fold_is_left_alone() {
        let config = PipelineConfig::default();
        let out = normalized("var z = 0 / 0; console.log(z);", &config);
        // 0 / 0 is NaN: the division must survive
        assert!(out.contains("0 / 0"), "got: {out}");
    }

    #[test]
    fn test_idempotent_on_second_run() {
        // Confluence: running the fragment twice equals running it once
        let config = PipelineConfig::default();
        let once = run_pipeline_fragment(
            "var a = 1; var b = a; var c = b + 2; console.log(c);",
            &config,
        );
        let twice = run_pipeline_fragment(&once, &config);
        assert_eq!(
            once.split_whitespace().collect::<Vec<_>>(),
            twice.split_whitespace().collect::<Vec<_>>()
        );
    }
}
