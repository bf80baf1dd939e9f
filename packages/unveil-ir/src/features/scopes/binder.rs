//! Binder: scope tree construction and identifier resolution

use rustc_hash::{FxHashMap, FxHashSet};

use crate::shared::models::{DeclKind, IrState, NodeId, NodeKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    Var,
    Let,
    Const,
    Function,
    Param,
    CatchParam,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OccKind {
    Decl,
    Read,
    Write,
    ReadWrite,
}

#[derive(Debug, Clone, Copy)]
pub struct Occurrence {
    pub node: NodeId,
    pub kind: OccKind,
}

#[derive(Debug, Clone)]
pub struct Binding {
    pub name: String,
    pub kind: BindingKind,
    /// Function or program body the binding belongs to for closure
    /// purposes (block-scoped bindings record their enclosing function)
    pub body_owner: NodeId,
    pub occurrences: Vec<Occurrence>,
    /// Referenced from a nested function relative to its declaration
    pub captured: bool,
    /// Declared in a `for` header with a conventional index name
    pub loop_index: bool,
}

impl Binding {
    pub fn read_count(&self) -> usize {
        self.occurrences
            .iter()
            .filter(|o| matches!(o.kind, OccKind::Read | OccKind::ReadWrite))
            .count()
    }

    pub fn write_count(&self) -> usize {
        self.occurrences
            .iter()
            .filter(|o| matches!(o.kind, OccKind::Write | OccKind::ReadWrite))
            .count()
    }
}

#[derive(Debug, Default)]
pub struct ScopeAnalysis {
    pub bindings: Vec<Binding>,
    /// Identifier node → binding index
    pub resolution: FxHashMap<NodeId, usize>,
    /// Any direct `eval` call poisons every static assumption
    pub has_eval: bool,
}

impl ScopeAnalysis {
    pub fn binding_of(&self, node: NodeId) -> Option<&Binding> {
        self.resolution.get(&node).map(|&i| &self.bindings[i])
    }

    pub fn binding_index_of(&self, node: NodeId) -> Option<usize> {
        self.resolution.get(&node).copied()
    }

    /// Every declared name, for effect classification
    pub fn declared_names(&self) -> FxHashSet<String> {
        self.bindings.iter().map(|b| b.name.clone()).collect()
    }

    /// Variables safe to SSA-version inside one code body: declared there,
    /// never captured, not shadowed by a sibling binding of the same name,
    /// and nothing when `eval` is present
    pub fn ssa_candidates(&self, owner: NodeId) -> FxHashSet<String> {
        if self.has_eval {
            return FxHashSet::default();
        }
        let mut counts: FxHashMap<&str, usize> = FxHashMap::default();
        for b in self.bindings.iter().filter(|b| b.body_owner == owner) {
            *counts.entry(b.name.as_str()).or_insert(0) += 1;
        }
        self.bindings
            .iter()
            .filter(|b| {
                b.body_owner == owner
                    && !b.captured
                    && counts.get(b.name.as_str()) == Some(&1)
                    && !matches!(b.kind, BindingKind::Function)
            })
            .map(|b| b.name.clone())
            .collect()
    }
}

/// Run the binder over the whole program
pub fn bind(state: &IrState) -> ScopeAnalysis {
    let mut binder = Binder {
        state,
        analysis: ScopeAnalysis::default(),
        scopes: Vec::new(),
        current_body: state.root,
    };
    binder.run();
    binder.analysis
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    Body,
    Block,
}

struct Scope {
    kind: ScopeKind,
    names: FxHashMap<String, usize>,
}

struct Binder<'s> {
    state: &'s IrState,
    analysis: ScopeAnalysis,
    scopes: Vec<Scope>,
    current_body: NodeId,
}

impl<'s> Binder<'s> {
    fn run(&mut self) {
        let root = self.state.root;
        let body = self.state.program_body();
        self.enter_body(root, &[], &body);
    }

    fn push(&mut self, kind: ScopeKind) {
        self.scopes.push(Scope {
            kind,
            names: FxHashMap::default(),
        });
    }

    fn pop(&mut self) {
        self.scopes.pop();
    }

    fn declare(
        &mut self,
        name: &str,
        kind: BindingKind,
        loop_index: bool,
        at_body_scope: bool,
    ) -> usize {
        // var/function hoist to the innermost body scope, block kinds bind
        // in the innermost scope
        let scope_idx = if at_body_scope {
            self.scopes
                .iter()
                .rposition(|s| s.kind == ScopeKind::Body)
                .unwrap_or(0)
        } else {
            self.scopes.len() - 1
        };
        if let Some(&existing) = self.scopes[scope_idx].names.get(name) {
            // var redeclaration folds into the existing binding
            return existing;
        }
        let index = self.analysis.bindings.len();
        self.analysis.bindings.push(Binding {
            name: name.to_string(),
            kind,
            body_owner: self.current_body,
            occurrences: Vec::new(),
            captured: false,
            loop_index,
        });
        self.scopes[scope_idx].names.insert(name.to_string(), index);
        index
    }

    fn resolve(&mut self, name: &str) -> Option<usize> {
        for scope in self.scopes.iter().rev() {
            if let Some(&idx) = scope.names.get(name) {
                return Some(idx);
            }
        }
        None
    }

    fn record(&mut self, node: NodeId, name: &str, occ: OccKind) {
        if let Some(idx) = self.resolve(name) {
            let current = self.current_body;
            let binding = &mut self.analysis.bindings[idx];
            if binding.body_owner != current {
                binding.captured = true;
            }
            binding.occurrences.push(Occurrence { node, kind: occ });
            self.analysis.resolution.insert(node, idx);
        }
    }

    /// Enter a function or program body: declare params, hoist var and
    /// function declarations, then walk the statements
    fn enter_body(&mut self, owner: NodeId, params: &[NodeId], stmts: &[NodeId]) {
        let previous_body = self.current_body;
        self.current_body = owner;
        self.push(ScopeKind::Body);

        for &param in params {
            if let Some(name) = self.name_of(param) {
                let idx = self.declare(&name, BindingKind::Param, false, true);
                self.analysis.bindings[idx].occurrences.push(Occurrence {
                    node: param,
                    kind: OccKind::Decl,
                });
                self.analysis.resolution.insert(param, idx);
            }
        }

        for &stmt in stmts {
            self.hoist(stmt);
        }
        self.hoist_lets(stmts);
        for &stmt in stmts {
            self.walk_stmt(stmt);
        }

        self.pop();
        self.current_body = previous_body;
    }

    fn name_of(&self, node: NodeId) -> Option<String> {
        self.state
            .kind(node)
            .and_then(NodeKind::variable_name)
            .map(str::to_string)
    }

    /// Hoist `var` declarators and function declarations to the body
    /// scope, without descending into nested functions
    fn hoist(&mut self, stmt: NodeId) {
        let Some(kind) = self.state.kind(stmt).cloned() else {
            return;
        };
        match kind {
            NodeKind::VariableDeclaration {
                kind: DeclKind::Var,
                declarations,
            } => {
                for decl in declarations {
                    let name = match self.state.kind(decl) {
                        Some(NodeKind::VariableDeclarator { id, .. }) => self.name_of(*id),
                        _ => None,
                    };
                    if let Some(name) = name {
                        self.declare(&name, BindingKind::Var, false, true);
                    }
                }
            }
            NodeKind::FunctionDeclaration { id, .. } => {
                if let Some(name) = self.name_of(id) {
                    self.declare(&name, BindingKind::Function, false, true);
                }
            }
            NodeKind::If {
                consequent,
                alternate,
                ..
            } => {
                self.hoist(consequent);
                if let Some(alt) = alternate {
                    self.hoist(alt);
                }
            }
            NodeKind::While { body, .. } | NodeKind::DoWhile { body, .. } => self.hoist(body),
            NodeKind::For { init, body, .. } => {
                if let Some(init) = init {
                    self.hoist(init);
                }
                self.hoist(body);
            }
            NodeKind::Labeled { body, .. } => self.hoist(body),
            NodeKind::Block { body } => {
                for s in body {
                    self.hoist(s);
                }
            }
            NodeKind::Switch { cases, .. } => {
                for case in cases {
                    let body = match self.state.kind(case) {
                        Some(NodeKind::SwitchCase { body, .. }) => body.clone(),
                        _ => continue,
                    };
                    for s in body {
                        self.hoist(s);
                    }
                }
            }
            NodeKind::Try {
                block,
                handler,
                finalizer,
                ..
            } => {
                self.hoist(block);
                if let Some(h) = handler {
                    self.hoist(h);
                }
                if let Some(f) = finalizer {
                    self.hoist(f);
                }
            }
            _ => {}
        }
    }

    /// Declare `let`/`const` bindings of the directly contained statements
    /// into the current scope
    fn hoist_lets(&mut self, stmts: &[NodeId]) {
        for &stmt in stmts {
            let (decl_kind, declarations) = match self.state.kind(stmt) {
                Some(NodeKind::VariableDeclaration {
                    kind: decl_kind @ (DeclKind::Let | DeclKind::Const),
                    declarations,
                }) => (*decl_kind, declarations.clone()),
                _ => continue,
            };
            let binding_kind = match decl_kind {
                DeclKind::Let => BindingKind::Let,
                _ => BindingKind::Const,
            };
            for decl in declarations {
                let name = match self.state.kind(decl) {
                    Some(NodeKind::VariableDeclarator { id, .. }) => self.name_of(*id),
                    _ => None,
                };
                if let Some(name) = name {
                    self.declare(&name, binding_kind, false, false);
                }
            }
        }
    }

    fn walk_stmt(&mut self, stmt: NodeId) {
        let Some(kind) = self.state.kind(stmt).cloned() else {
            return;
        };
        match kind {
            NodeKind::Block { body } => {
                self.push(ScopeKind::Block);
                self.hoist_lets(&body);
                for &s in &body {
                    self.walk_stmt(s);
                }
                self.pop();
            }
            NodeKind::ExpressionStatement { expression } => self.walk_expr(expression),
            NodeKind::VariableDeclaration { declarations, .. } => {
                for decl in declarations {
                    if let Some(NodeKind::VariableDeclarator { id, init }) =
                        self.state.kind(decl).cloned()
                    {
                        if let Some(name) = self.name_of(id) {
                            self.record(id, &name, OccKind::Decl);
                        }
                        if let Some(init) = init {
                            self.walk_expr(init);
                        }
                    }
                }
            }
            NodeKind::FunctionDeclaration {
                id, params, body, ..
            } => {
                if let Some(name) = self.name_of(id) {
                    self.record(id, &name, OccKind::Decl);
                }
                self.walk_function(stmt, &params, body);
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
                self.walk_expr(test);
                self.walk_stmt(consequent);
                if let Some(alt) = alternate {
                    self.walk_stmt(alt);
                }
            }
            NodeKind::While { test, body } => {
                self.walk_expr(test);
                self.walk_stmt(body);
            }
            NodeKind::DoWhile { body, test } => {
                self.walk_stmt(body);
                self.walk_expr(test);
            }
            NodeKind::For {
                init,
                test,
                update,
                body,
            } => {
                self.push(ScopeKind::Block);
                if let Some(init) = init {
                    match self.state.kind(init).cloned() {
                        Some(NodeKind::VariableDeclaration {
                            kind: decl_kind,
                            declarations,
                        }) => {
                            for decl in declarations {
                                if let Some(NodeKind::VariableDeclarator { id, init: dinit }) =
                                    self.state.kind(decl).cloned()
                                {
                                    if let Some(name) = self.name_of(id) {
                                        let loop_index =
                                            matches!(name.as_str(), "i" | "j" | "k");
                                        match decl_kind {
                                            DeclKind::Var => {
                                                let idx = self.declare(
                                                    &name,
                                                    BindingKind::Var,
                                                    loop_index,
                                                    true,
                                                );
                                                self.analysis.bindings[idx].loop_index |=
                                                    loop_index;
                                            }
                                            DeclKind::Let => {
                                                self.declare(
                                                    &name,
                                                    BindingKind::Let,
                                                    loop_index,
                                                    false,
                                                );
                                            }
                                            DeclKind::Const => {
                                                self.declare(
                                                    &name,
                                                    BindingKind::Const,
                                                    loop_index,
                                                    false,
                                                );
                                            }
                                        }
                                        self.record(id, &name, OccKind::Decl);
                                    }
                                    if let Some(dinit) = dinit {
                                        self.walk_expr(dinit);
                                    }
                                }
                            }
                        }
                        _ => self.walk_expr(init),
                    }
                }
                if let Some(test) = test {
                    self.walk_expr(test);
                }
                if let Some(update) = update {
                    self.walk_expr(update);
                }
                self.walk_stmt(body);
                self.pop();
            }
            NodeKind::Break { .. } | NodeKind::Continue { .. } | NodeKind::EmptyStatement => {}
            NodeKind::Labeled { body, .. } => self.walk_stmt(body),
            NodeKind::Switch {
                discriminant,
                cases,
            } => {
                self.walk_expr(discriminant);
                self.push(ScopeKind::Block);
                // One shared block scope across all cases
                for &case in &cases {
                    let body = match self.state.kind(case) {
                        Some(NodeKind::SwitchCase { body, .. }) => body.clone(),
                        _ => continue,
                    };
                    self.hoist_lets(&body);
                }
                for case in cases {
                    if let Some(NodeKind::SwitchCase { test, body }) =
                        self.state.kind(case).cloned()
                    {
                        if let Some(test) = test {
                            self.walk_expr(test);
                        }
                        for s in body {
                            self.walk_stmt(s);
                        }
                    }
                }
                self.pop();
            }
            NodeKind::Throw { argument } => self.walk_expr(argument),
            NodeKind::Try {
                block,
                handler_param,
                handler,
                finalizer,
            } => {
                self.walk_stmt(block);
                if let Some(handler) = handler {
                    self.push(ScopeKind::Block);
                    if let Some(param) = handler_param {
                        if let Some(name) = self.name_of(param) {
                            let idx = self.declare(&name, BindingKind::CatchParam, false, false);
                            self.analysis.bindings[idx].occurrences.push(Occurrence {
                                node: param,
                                kind: OccKind::Decl,
                            });
                            self.analysis.resolution.insert(param, idx);
                        }
                    }
                    self.walk_stmt(handler);
                    self.pop();
                }
                if let Some(finalizer) = finalizer {
                    self.walk_stmt(finalizer);
                }
            }
            _ => self.walk_expr(stmt),
        }
    }

    fn walk_function(&mut self, owner: NodeId, params: &[NodeId], body: NodeId) {
        match self.state.kind(body).cloned() {
            Some(NodeKind::Block { body: stmts }) => {
                self.enter_body(owner, params, &stmts);
            }
            // Expression-bodied arrow: params still bind
            Some(_) => {
                let previous_body = self.current_body;
                self.current_body = owner;
                self.push(ScopeKind::Body);
                for &param in params {
                    if let Some(name) = self.name_of(param) {
                        let idx = self.declare(&name, BindingKind::Param, false, true);
                        self.analysis.bindings[idx].occurrences.push(Occurrence {
                            node: param,
                            kind: OccKind::Decl,
                        });
                        self.analysis.resolution.insert(param, idx);
                    }
                }
                self.walk_expr(body);
                self.pop();
                self.current_body = previous_body;
            }
            None => {}
        }
    }

    fn walk_expr(&mut self, expr: NodeId) {
        let Some(kind) = self.state.kind(expr).cloned() else {
            return;
        };
        match kind {
            NodeKind::Identifier { name } => {
                if name == "eval" {
                    // A bare read of eval is already suspicious enough
                    self.analysis.has_eval = true;
                }
                self.record(expr, &name, OccKind::Read);
            }
            NodeKind::SsaName { name, .. } => {
                self.record(expr, &name, OccKind::Read);
            }
            NodeKind::Assignment { op, target, value } => {
                match self.state.kind(target).cloned() {
                    Some(NodeKind::Identifier { name }) => {
                        let occ = if matches!(op, crate::shared::models::AssignOp::Assign) {
                            OccKind::Write
                        } else {
                            OccKind::ReadWrite
                        };
                        self.record(target, &name, occ);
                    }
                    _ => self.walk_expr(target),
                }
                self.walk_expr(value);
            }
            NodeKind::Update { argument, .. } => {
                match self.state.kind(argument).cloned() {
                    Some(NodeKind::Identifier { name }) => {
                        self.record(argument, &name, OccKind::ReadWrite)
                    }
                    _ => self.walk_expr(argument),
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
                    self.walk_expr(property);
                }
            }
            NodeKind::Property {
                key,
                value,
                computed,
                ..
            } => {
                if computed {
                    self.walk_expr(key);
                }
                self.walk_expr(value);
            }
            NodeKind::Call {
                callee, arguments, ..
            } => {
                if let Some(NodeKind::Identifier { name }) = self.state.kind(callee) {
                    if name == "eval" {
                        self.analysis.has_eval = true;
                    }
                }
                self.walk_expr(callee);
                for arg in arguments {
                    self.walk_expr(arg);
                }
            }
            NodeKind::FunctionExpression {
                id, params, body, ..
            } => {
                // A named function expression binds its own name inside
                // itself only; approximate by walking the body with the
                // name invisible outside
                let _ = id;
                self.walk_function(expr, &params, body);
            }
            NodeKind::ArrowFunction { params, body, .. } => {
                self.walk_function(expr, &params, body);
            }
            other => {
                for child in other.children() {
                    self.walk_expr(child);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::node::LiteralValue;
    use crate::shared::models::{NodeFactory, NodeMap};

    struct Builder {
        f: NodeFactory,
        map: NodeMap,
    }

    impl Builder {
        fn new() -> Self {
            Self {
                f: NodeFactory::new(),
                map: NodeMap::default(),
            }
        }

        fn keep(&mut self, n: crate::shared::models::IrNode) -> NodeId {
            let id = n.id;
            self.map.insert(id, n);
            id
        }

        fn ident(&mut self, name: &str) -> NodeId {
            let n = self.f.identifier(name);
            self.keep(n)
        }

        fn num(&mut self, v: f64) -> NodeId {
            let n = self.f.literal(LiteralValue::Number(v));
            self.keep(n)
        }

        fn var_decl(&mut self, name: &str, init: Option<NodeId>) -> NodeId {
            let id = self.ident(name);
            let decl = self.f.variable_declarator(id, init);
            let decl = self.keep(decl);
            let stmt = self
                .f
                .variable_declaration(crate::shared::models::DeclKind::Var, vec![decl]);
            self.keep(stmt)
        }

        fn finish(mut self, body: Vec<NodeId>) -> IrState {
            let program = self.f.program(body, false);
            let root = self.keep(program);
            IrState::new(self.map, root, self.f)
        }
    }

    #[test]
    fn test_declaration_and_use_resolve_to_one_binding() {
        let mut b = Builder::new();
        let init = b.num(1.0);
        let decl = b.var_decl("a", Some(init));
        let use_a = b.ident("a");
        let stmt = b.f.expression_statement(use_a);
        let stmt = b.keep(stmt);
        let state = b.finish(vec![decl, stmt]);

        let analysis = bind(&state);
        assert_eq!(analysis.bindings.len(), 1);
        let binding = &analysis.bindings[0];
        assert_eq!(binding.name, "a");
        assert_eq!(binding.read_count(), 1);
        assert!(!binding.captured);
        assert_eq!(analysis.binding_of(use_a).map(|b| b.name.as_str()), Some("a"));
    }

    #[test]
    fn test_capture_by_nested_function() {
        // var table = 1; function f() { return table; }
        let mut b = Builder::new();
        let init = b.num(1.0);
        let decl = b.var_decl("table", Some(init));

        let use_table = b.ident("table");
        let ret = b.f.return_statement(Some(use_table));
        let ret = b.keep(ret);
        let body = b.f.block(vec![ret]);
        let body = b.keep(body);
        let fname = b.ident("f");
        let func = b.f.function_declaration(fname, vec![], body, false, false);
        let func = b.keep(func);
        let state = b.finish(vec![decl, func]);

        let analysis = bind(&state);
        let table = analysis
            .bindings
            .iter()
            .find(|b| b.name == "table")
            .unwrap();
        assert!(table.captured);

        // Captured variables are not SSA candidates at the top level
        let candidates = analysis.ssa_candidates(state.root);
        assert!(!candidates.contains("table"));
    }

    #[test]
    fn test_shadowed_names_are_not_ssa_candidates() {
        // var x = 1; { let x = 2; }
        let mut b = Builder::new();
        let i1 = b.num(1.0);
        let d1 = b.var_decl("x", Some(i1));
        let x2 = b.ident("x");
        let i2 = b.num(2.0);
        let vd2 = b.f.variable_declarator(x2, Some(i2));
        let vd2 = b.keep(vd2);
        let d2 = b
            .f
            .variable_declaration(crate::shared::models::DeclKind::Let, vec![vd2]);
        let d2 = b.keep(d2);
        let inner = b.f.block(vec![d2]);
        let inner = b.keep(inner);
        let state = b.finish(vec![d1, inner]);

        let analysis = bind(&state);
        assert_eq!(analysis.bindings.len(), 2);
        let candidates = analysis.ssa_candidates(state.root);
        assert!(!candidates.contains("x"));
    }

    #[test]
    fn test_eval_disables_ssa() {
        let mut b = Builder::new();
        let init = b.num(1.0);
        let decl = b.var_decl("a", Some(init));
        let eval_callee = b.ident("eval");
        let arg = b.num(0.0);
        let call = b.f.call(eval_callee, vec![arg], false);
        let call = b.keep(call);
        let stmt = b.f.expression_statement(call);
        let stmt = b.keep(stmt);
        let state = b.finish(vec![decl, stmt]);

        let analysis = bind(&state);
        assert!(analysis.has_eval);
        assert!(analysis.ssa_candidates(state.root).is_empty());
    }

    #[test]
    fn test_loop_index_exemption() {
        // for (var i = 0; i < 10; i++) {}
        let mut b = Builder::new();
        let iid = b.ident("i");
        let zero = b.num(0.0);
        let vd = b.f.variable_declarator(iid, Some(zero));
        let vd = b.keep(vd);
        let init = b
            .f
            .variable_declaration(crate::shared::models::DeclKind::Var, vec![vd]);
        let init = b.keep(init);
        let iread = b.ident("i");
        let ten = b.num(10.0);
        let test = b
            .f
            .binary(crate::shared::models::BinaryOp::Lt, iread, ten);
        let test = b.keep(test);
        let iupd = b.ident("i");
        let update = b
            .f
            .update(crate::shared::models::UpdateOp::Increment, iupd, false);
        let update = b.keep(update);
        let body = b.f.block(vec![]);
        let body = b.keep(body);
        let for_stmt = b.f.for_statement(Some(init), Some(test), Some(update), body);
        let for_stmt = b.keep(for_stmt);
        let state = b.finish(vec![for_stmt]);

        let analysis = bind(&state);
        let i_binding = analysis.bindings.iter().find(|b| b.name == "i").unwrap();
        assert!(i_binding.loop_index);
    }
}
