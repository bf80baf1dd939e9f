//! Effect classifier
//!
//! Classifies expressions and statements into the effect taxonomy by a
//! single bottom-up scan. Identifier reads of known bindings carry no
//! effect; everything the analysis cannot see locally is classified
//! conservatively.

use std::collections::BTreeSet;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::shared::models::{IrState, NodeId, NodeKind, UnaryOp};

/// Side-effect kinds
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Effect {
    MemoryRead,
    MemoryWrite,
    Io,
    MayThrow,
    GlobalAccess,
    ExternalCall,
    PropertyAccess,
    ConsoleOutput,
}

impl Effect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Effect::MemoryRead => "memory_read",
            Effect::MemoryWrite => "memory_write",
            Effect::Io => "io",
            Effect::MayThrow => "may_throw",
            Effect::GlobalAccess => "global_access",
            Effect::ExternalCall => "external_call",
            Effect::PropertyAccess => "property_access",
            Effect::ConsoleOutput => "console_output",
        }
    }
}

/// A set of effects; pure means empty
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectSet(BTreeSet<Effect>);

impl EffectSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn of(effects: impl IntoIterator<Item = Effect>) -> Self {
        Self(effects.into_iter().collect())
    }

    pub fn insert(&mut self, effect: Effect) {
        self.0.insert(effect);
    }

    pub fn union(&mut self, other: &EffectSet) {
        self.0.extend(other.0.iter().copied());
    }

    pub fn contains(&self, effect: Effect) -> bool {
        self.0.contains(&effect)
    }

    pub fn is_pure(&self) -> bool {
        self.0.is_empty()
    }

    /// Effects that make statement removal unsafe. Reads of known
    /// bindings are unobservable; writes, io, throws, calls, property
    /// getters, and unresolved global reads are not.
    pub fn is_removable(&self) -> bool {
        !self.contains(Effect::MemoryWrite)
            && !self.contains(Effect::Io)
            && !self.contains(Effect::MayThrow)
            && !self.contains(Effect::ExternalCall)
            && !self.contains(Effect::ConsoleOutput)
            && !self.contains(Effect::PropertyAccess)
            && !self.contains(Effect::GlobalAccess)
    }

    pub fn iter(&self) -> impl Iterator<Item = Effect> + '_ {
        self.0.iter().copied()
    }
}

/// Names that exist on every realm without observable access effects
const SAFE_GLOBALS: [&str; 5] = ["undefined", "NaN", "Infinity", "globalThis", "arguments"];

/// Whether a call expression is a `console.*` sink
pub fn is_console_call(state: &IrState, callee: NodeId) -> bool {
    match state.kind(callee) {
        Some(NodeKind::Member {
            object,
            property,
            computed: false,
            ..
        }) => {
            matches!(
                state.kind(*object),
                Some(NodeKind::Identifier { name }) if name == "console"
            ) && matches!(state.kind(*property), Some(NodeKind::Identifier { .. }))
        }
        _ => false,
    }
}

/// Effects of evaluating an expression. `locals` holds every name the
/// caller knows to be bound; reads of those carry no effect.
pub fn expr_effects(state: &IrState, expr: NodeId, locals: &FxHashSet<String>) -> EffectSet {
    let mut effects = EffectSet::empty();
    collect(state, expr, locals, &mut effects);
    effects
}

fn collect(state: &IrState, id: NodeId, locals: &FxHashSet<String>, effects: &mut EffectSet) {
    let Some(kind) = state.kind(id) else { return };
    match kind {
        NodeKind::Literal { .. } => {}
        // Reading a known binding observes nothing; memory-read is
        // reserved for heap reads through properties
        NodeKind::Identifier { name } | NodeKind::SsaName { name, .. } => {
            if !locals.contains(name) && !SAFE_GLOBALS.contains(&name.as_str()) {
                effects.insert(Effect::GlobalAccess);
            }
        }
        NodeKind::Member { object, .. } => {
            effects.insert(Effect::PropertyAccess);
            effects.insert(Effect::MemoryRead);
            collect(state, *object, locals, effects);
            // Computed property expressions are evaluated too
            if let Some(NodeKind::Member {
                property,
                computed: true,
                ..
            }) = state.kind(id)
            {
                collect(state, *property, locals, effects);
            }
        }
        NodeKind::Assignment { target, value, .. } => {
            match state.kind(*target) {
                Some(NodeKind::Member { .. }) => {
                    effects.insert(Effect::MemoryWrite);
                    effects.insert(Effect::PropertyAccess);
                }
                Some(NodeKind::Identifier { name }) | Some(NodeKind::SsaName { name, .. }) => {
                    effects.insert(Effect::MemoryWrite);
                    if !locals.contains(name) {
                        effects.insert(Effect::GlobalAccess);
                    }
                }
                _ => effects.insert(Effect::MemoryWrite),
            }
            collect(state, *value, locals, effects);
        }
        NodeKind::Update { argument, .. } => {
            effects.insert(Effect::MemoryWrite);
            if let Some(name) = state.kind(*argument).and_then(NodeKind::variable_name) {
                if !locals.contains(name) {
                    effects.insert(Effect::GlobalAccess);
                }
            }
        }
        NodeKind::Call {
            callee, arguments, ..
        } => {
            if is_console_call(state, *callee) {
                effects.insert(Effect::ConsoleOutput);
                effects.insert(Effect::Io);
            } else {
                effects.insert(Effect::ExternalCall);
                effects.insert(Effect::MayThrow);
                collect(state, *callee, locals, effects);
            }
            for &arg in arguments {
                collect(state, arg, locals, effects);
            }
        }
        NodeKind::New { callee, arguments } => {
            effects.insert(Effect::ExternalCall);
            effects.insert(Effect::MayThrow);
            collect(state, *callee, locals, effects);
            for &arg in arguments {
                collect(state, arg, locals, effects);
            }
        }
        NodeKind::Unary { op, argument } => {
            if matches!(op, UnaryOp::Delete) {
                effects.insert(Effect::MemoryWrite);
                effects.insert(Effect::PropertyAccess);
            }
            collect(state, *argument, locals, effects);
        }
        NodeKind::Throw { argument } => {
            effects.insert(Effect::MayThrow);
            collect(state, *argument, locals, effects);
        }
        // Closure creation is pure; the body runs later
        NodeKind::FunctionExpression { .. } | NodeKind::ArrowFunction { .. } => {}
        other => {
            for child in other.children() {
                collect(state, child, locals, effects);
            }
        }
    }
}

/// Effects of executing a statement once. Declarator bindings themselves
/// are not counted; liveness decides whether the write matters.
pub fn stmt_effects(state: &IrState, stmt: NodeId, locals: &FxHashSet<String>) -> EffectSet {
    let Some(kind) = state.kind(stmt) else {
        return EffectSet::empty();
    };
    match kind {
        NodeKind::ExpressionStatement { expression } => expr_effects(state, *expression, locals),
        NodeKind::VariableDeclaration { declarations, .. } => {
            let mut effects = EffectSet::empty();
            for &decl in declarations {
                if let Some(NodeKind::VariableDeclarator {
                    init: Some(init), ..
                }) = state.kind(decl)
                {
                    effects.union(&expr_effects(state, *init, locals));
                }
            }
            effects
        }
        NodeKind::EmptyStatement => EffectSet::empty(),
        // Declaring a function binds a name; the body does not run
        NodeKind::FunctionDeclaration { .. } => EffectSet::empty(),
        NodeKind::Block { body } => {
            let mut effects = EffectSet::empty();
            for &s in body {
                effects.union(&stmt_effects(state, s, locals));
            }
            effects
        }
        // Control-flow statements are never candidates for effect-based
        // removal; classify conservatively
        _ => EffectSet::of([Effect::MemoryRead, Effect::MemoryWrite, Effect::MayThrow]),
    }
}

/// Whole-function effect summary: the union over the body with the
/// function's own parameters and declarations treated as locals
pub fn function_effects(state: &IrState, function: NodeId) -> EffectSet {
    let (params, body) = match state.kind(function) {
        Some(NodeKind::FunctionDeclaration { params, body, .. })
        | Some(NodeKind::FunctionExpression { params, body, .. })
        | Some(NodeKind::ArrowFunction { params, body, .. }) => (params.clone(), *body),
        _ => return EffectSet::of([Effect::ExternalCall]),
    };

    let mut locals: FxHashSet<String> = FxHashSet::default();
    for &param in &params {
        if let Some(name) = state.kind(param).and_then(NodeKind::variable_name) {
            locals.insert(name.to_string());
        }
    }
    // Hoist every declaration inside the body
    for node in state.subtree_nodes(body) {
        if let Some(NodeKind::VariableDeclarator { id, .. }) = state.kind(node) {
            if let Some(name) = state.kind(*id).and_then(NodeKind::variable_name) {
                locals.insert(name.to_string());
            }
        }
    }

    let mut effects = EffectSet::empty();
    match state.kind(body) {
        Some(NodeKind::Block { body: stmts }) => {
            for &stmt in stmts {
                effects.union(&statement_effects_deep(state, stmt, &locals));
            }
        }
        // Expression-bodied arrow
        Some(_) => effects.union(&expr_effects(state, body, &locals)),
        None => {}
    }
    effects
}

/// Statement effects that recurse through the control flow a function body
/// may contain, for purity summaries
fn statement_effects_deep(state: &IrState, stmt: NodeId, locals: &FxHashSet<String>) -> EffectSet {
    let Some(kind) = state.kind(stmt) else {
        return EffectSet::empty();
    };
    match kind {
        NodeKind::Return { argument } => match argument {
            Some(arg) => expr_effects(state, *arg, locals),
            None => EffectSet::empty(),
        },
        NodeKind::If {
            test,
            consequent,
            alternate,
        } => {
            let mut effects = expr_effects(state, *test, locals);
            effects.union(&statement_effects_deep(state, *consequent, locals));
            if let Some(alt) = alternate {
                effects.union(&statement_effects_deep(state, *alt, locals));
            }
            effects
        }
        NodeKind::While { test, body } => {
            let mut effects = expr_effects(state, *test, locals);
            effects.union(&statement_effects_deep(state, *body, locals));
            effects
        }
        NodeKind::DoWhile { body, test } => {
            let mut effects = expr_effects(state, *test, locals);
            effects.union(&statement_effects_deep(state, *body, locals));
            effects
        }
        NodeKind::Block { body } => {
            let mut effects = EffectSet::empty();
            for &s in body {
                effects.union(&statement_effects_deep(state, s, locals));
            }
            effects
        }
        NodeKind::Break { .. } | NodeKind::Continue { .. } | NodeKind::EmptyStatement => {
            EffectSet::empty()
        }
        _ => stmt_effects(state, stmt, locals),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::node::LiteralValue;
    use crate::shared::models::{NodeFactory, NodeMap};

    fn state_with(nodes: Vec<crate::shared::models::IrNode>, root: NodeId, factory: NodeFactory) -> IrState {
        let mut map = NodeMap::default();
        for n in nodes {
            map.insert(n.id, n);
        }
        IrState::new(map, root, factory)
    }

    #[test]
    fn test_literal_is_pure() {
        let mut f = NodeFactory::new();
        let lit = f.literal(LiteralValue::Number(1.0));
        let id = lit.id;
        let root = f.program(vec![], false);
        let root_id = root.id;
        let state = state_with(vec![lit, root], root_id, f);
        assert!(expr_effects(&state, id, &FxHashSet::default()).is_pure());
    }

    #[test]
    fn test_console_call_is_output_not_external() {
        let mut f = NodeFactory::new();
        let console = f.identifier("console");
        let log = f.identifier("log");
        let member = f.member(console.id, log.id, false, false);
        let arg = f.literal(LiteralValue::Number(3.0));
        let call = f.call(member.id, vec![arg.id], false);
        let call_id = call.id;
        let root = f.program(vec![], false);
        let root_id = root.id;
        let state = state_with(vec![console, log, member, arg, call, root], root_id, f);

        let effects = expr_effects(&state, call_id, &FxHashSet::default());
        assert!(effects.contains(Effect::ConsoleOutput));
        assert!(!effects.contains(Effect::ExternalCall));
        assert!(!effects.is_removable());
    }

    #[test]
    fn test_unknown_call_is_external_and_may_throw() {
        let mut f = NodeFactory::new();
        let callee = f.identifier("use");
        let call = f.call(callee.id, vec![], false);
        let call_id = call.id;
        let root = f.program(vec![], false);
        let root_id = root.id;
        let state = state_with(vec![callee, call, root], root_id, f);

        let effects = expr_effects(&state, call_id, &FxHashSet::default());
        assert!(effects.contains(Effect::ExternalCall));
        assert!(effects.contains(Effect::MayThrow));
    }

    #[test]
    fn test_table_lookup_function_is_pure() {
        // function f(i) { return table[i]; } reads memory but neither
        // writes nor calls out; still not is_removable-pure because of the
        // property access, which is the decoder lifter's concern
        let mut f = NodeFactory::new();
        let param = f.identifier("i");
        let table = f.identifier("table");
        let idx = f.identifier("i");
        let member = f.member(table.id, idx.id, true, false);
        let ret = f.return_statement(Some(member.id));
        let body = f.block(vec![ret.id]);
        let name = f.identifier("f");
        let func = f.function_declaration(name.id, vec![param.id], body.id, false, false);
        let func_id = func.id;
        let root = f.program(vec![func.id], false);
        let root_id = root.id;
        let state = state_with(
            vec![param, table, idx, member, ret, body, name, func, root],
            root_id,
            f,
        );

        let effects = function_effects(&state, func_id);
        assert!(!effects.contains(Effect::MemoryWrite));
        assert!(!effects.contains(Effect::ExternalCall));
        assert!(effects.contains(Effect::PropertyAccess));
    }

    #[test]
    fn test_pure_arithmetic_function() {
        // function add(a, b) { return a + b; }
        let mut f = NodeFactory::new();
        let pa = f.identifier("a");
        let pb = f.identifier("b");
        let ua = f.identifier("a");
        let ub = f.identifier("b");
        let sum = f.binary(crate::shared::models::BinaryOp::Add, ua.id, ub.id);
        let ret = f.return_statement(Some(sum.id));
        let body = f.block(vec![ret.id]);
        let name = f.identifier("add");
        let func = f.function_declaration(name.id, vec![pa.id, pb.id], body.id, false, false);
        let func_id = func.id;
        let root = f.program(vec![func.id], false);
        let root_id = root.id;
        let state = state_with(
            vec![pa, pb, ua, ub, sum, ret, body, name, func, root],
            root_id,
            f,
        );

        let effects = function_effects(&state, func_id);
        // Reads of its own locals observe nothing: the summary is empty
        assert!(effects.is_pure());
    }
}
