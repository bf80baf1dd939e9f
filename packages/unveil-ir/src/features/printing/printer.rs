//! IR → source printer

use crate::features::eval::number_to_string;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::shared::models::node::{LiteralValue, LogicalOp, NodeId, NodeKind};
use crate::shared::models::IrState;

use super::source_map::SourceMap;

/// Print the whole program
pub fn print_program(state: &IrState) -> String {
    let mut printer = Printer::new(state, None);
    printer.emit_program();
    printer.out
}

/// Print with source-map mappings for located nodes
pub fn print_with_source_map(state: &IrState, source_name: &str) -> (String, SourceMap) {
    let mut printer = Printer::new(state, Some(SourceMap::new(source_name)));
    printer.emit_program();
    let map = printer.map.take().unwrap_or_default();
    (printer.out, map)
}

/// Print a single expression (suggestion texts, analysis export)
pub fn print_expression(state: &IrState, expr: NodeId) -> String {
    let mut printer = Printer::new(state, None);
    printer.emit_expr(expr, 0);
    printer.out
}

/// Guard for the final emission: SSA identifiers must not survive to the
/// printer (they exist only between construction and destruction)
pub fn assert_no_ssa(state: &IrState) -> PipelineResult<()> {
    for id in state.subtree_nodes(state.root) {
        if matches!(state.kind(id), Some(NodeKind::SsaName { .. })) {
            return Err(PipelineError::invariant(
                "printer",
                format!("SSA identifier {id} reached final emission"),
            ));
        }
    }
    Ok(())
}

/// Operator precedence, higher binds tighter
fn precedence(state: &IrState, id: NodeId) -> u8 {
    use crate::shared::models::node::BinaryOp::*;
    match state.kind(id) {
        Some(NodeKind::Sequence { .. }) => 1,
        Some(NodeKind::Assignment { .. }) => 2,
        Some(NodeKind::Conditional { .. }) => 3,
        Some(NodeKind::ArrowFunction { .. }) => 2,
        Some(NodeKind::Logical { op, .. }) => match op {
            LogicalOp::Nullish => 4,
            LogicalOp::Or => 4,
            LogicalOp::And => 5,
        },
        Some(NodeKind::Binary { op, .. }) => match op {
            BitOr => 6,
            BitXor => 7,
            BitAnd => 8,
            Eq | NotEq | StrictEq | StrictNotEq => 9,
            Lt | LtEq | Gt | GtEq | In | Instanceof => 10,
            Shl | Shr | UShr => 11,
            Add | Sub => 12,
            Mul | Div | Rem => 13,
        },
        Some(NodeKind::Unary { .. }) => 15,
        Some(NodeKind::Update { .. }) => 16,
        Some(NodeKind::New { arguments, .. }) if arguments.is_empty() => 17,
        Some(NodeKind::Call { .. }) | Some(NodeKind::Member { .. }) | Some(NodeKind::New { .. }) => {
            18
        }
        _ => 20,
    }
}

struct Printer<'s> {
    state: &'s IrState,
    out: String,
    indent: usize,
    map: Option<SourceMap>,
    line: u32,
    col: u32,
}

impl<'s> Printer<'s> {
    fn new(state: &'s IrState, map: Option<SourceMap>) -> Self {
        Self {
            state,
            out: String::new(),
            indent: 0,
            map,
            line: 1,
            col: 0,
        }
    }

    fn write(&mut self, text: &str) {
        for ch in text.chars() {
            if ch == '\n' {
                self.line += 1;
                self.col = 0;
            } else {
                self.col += 1;
            }
        }
        self.out.push_str(text);
    }

    fn mark(&mut self, id: NodeId) {
        if self.map.is_none() {
            return;
        }
        if let Some(span) = self.state.node(id).and_then(|n| n.span) {
            if span.is_synthetic() {
                return;
            }
            let generated = (self.line, self.col);
            if let Some(map) = self.map.as_mut() {
                map.add(generated, span.start());
            }
        }
    }

    fn newline(&mut self) {
        self.write("\n");
        let pad = "  ".repeat(self.indent);
        self.write(&pad);
    }

    fn emit_program(&mut self) {
        let body = self.state.program_body();
        let mut first = true;
        for stmt in body {
            if !first {
                self.newline();
            }
            first = false;
            self.emit_stmt(stmt);
        }
        if !self.out.is_empty() {
            self.out.push('\n');
        }
    }

    /// Emit a statement at the current indentation
    fn emit_stmt(&mut self, id: NodeId) {
        let Some(kind) = self.state.kind(id).cloned() else {
            return;
        };
        self.mark(id);
        match kind {
            NodeKind::ExpressionStatement { expression } => {
                // Expression statements must not start with `{` or
                // `function`, which would reparse as other constructs
                if self.starts_ambiguously(expression) {
                    self.write("(");
                    self.emit_expr(expression, 0);
                    self.write(");");
                } else {
                    self.emit_expr(expression, 1);
                    self.write(";");
                }
            }
            NodeKind::VariableDeclaration { .. } => {
                self.emit_declaration(id);
                self.write(";");
            }
            NodeKind::Block { body } => {
                self.write("{");
                self.indent += 1;
                for stmt in body {
                    self.newline();
                    self.emit_stmt(stmt);
                }
                self.indent -= 1;
                self.newline();
                self.write("}");
            }
            NodeKind::EmptyStatement => self.write(";"),
            NodeKind::FunctionDeclaration {
                id: name,
                params,
                body,
                is_async,
                is_generator,
            } => {
                if is_async {
                    self.write("async ");
                }
                self.write("function");
                if is_generator {
                    self.write("*");
                }
                self.write(" ");
                self.emit_expr(name, 20);
                self.emit_params(&params);
                self.write(" ");
                self.emit_braced_body(body);
            }
            NodeKind::Return { argument } => {
                self.write("return");
                if let Some(arg) = argument {
                    self.write(" ");
                    self.emit_expr(arg, 1);
                }
                self.write(";");
            }
            NodeKind::Throw { argument } => {
                self.write("throw ");
                self.emit_expr(argument, 1);
                self.write(";");
            }
            NodeKind::Break { label } => {
                self.write("break");
                if let Some(l) = label {
                    self.write(" ");
                    self.write(&l);
                }
                self.write(";");
            }
            NodeKind::Continue { label } => {
                self.write("continue");
                if let Some(l) = label {
                    self.write(" ");
                    self.write(&l);
                }
                self.write(";");
            }
            NodeKind::Labeled { label, body } => {
                self.write(&label);
                self.write(": ");
                self.emit_stmt(body);
            }
            NodeKind::If {
                test,
                consequent,
                alternate,
            } => {
                self.write("if (");
                self.emit_expr(test, 0);
                self.write(") ");
                self.emit_braced_body(consequent);
                if let Some(alt) = alternate {
                    self.write(" else ");
                    if matches!(self.state.kind(alt), Some(NodeKind::If { .. })) {
                        self.emit_stmt(alt);
                    } else {
                        self.emit_braced_body(alt);
                    }
                }
            }
            NodeKind::While { test, body } => {
                self.write("while (");
                self.emit_expr(test, 0);
                self.write(") ");
                self.emit_braced_body(body);
            }
            NodeKind::DoWhile { body, test } => {
                self.write("do ");
                self.emit_braced_body(body);
                self.write(" while (");
                self.emit_expr(test, 0);
                self.write(");");
            }
            NodeKind::For {
                init,
                test,
                update,
                body,
            } => {
                self.write("for (");
                if let Some(init) = init {
                    if matches!(
                        self.state.kind(init),
                        Some(NodeKind::VariableDeclaration { .. })
                    ) {
                        self.emit_declaration(init);
                    } else {
                        self.emit_expr(init, 0);
                    }
                }
                self.write("; ");
                if let Some(test) = test {
                    self.emit_expr(test, 0);
                }
                self.write("; ");
                if let Some(update) = update {
                    self.emit_expr(update, 0);
                }
                self.write(") ");
                self.emit_braced_body(body);
            }
            NodeKind::Switch {
                discriminant,
                cases,
            } => {
                self.write("switch (");
                self.emit_expr(discriminant, 0);
                self.write(") {");
                self.indent += 1;
                for case in cases {
                    let Some(NodeKind::SwitchCase { test, body }) =
                        self.state.kind(case).cloned()
                    else {
                        continue;
                    };
                    self.newline();
                    match test {
                        Some(test) => {
                            self.write("case ");
                            self.emit_expr(test, 1);
                            self.write(":");
                        }
                        None => self.write("default:"),
                    }
                    self.indent += 1;
                    for stmt in body {
                        self.newline();
                        self.emit_stmt(stmt);
                    }
                    self.indent -= 1;
                }
                self.indent -= 1;
                self.newline();
                self.write("}");
            }
            NodeKind::Try {
                block,
                handler_param,
                handler,
                finalizer,
            } => {
                self.write("try ");
                self.emit_braced_body(block);
                if let Some(handler) = handler {
                    self.write(" catch ");
                    if let Some(param) = handler_param {
                        self.write("(");
                        self.emit_expr(param, 20);
                        self.write(") ");
                    }
                    self.emit_braced_body(handler);
                }
                if let Some(finalizer) = finalizer {
                    self.write(" finally ");
                    self.emit_braced_body(finalizer);
                }
            }
            // An expression in statement position
            _ => {
                self.emit_expr(id, 1);
                self.write(";");
            }
        }
    }

    /// Print any statement as a braced body
    fn emit_braced_body(&mut self, id: NodeId) {
        if matches!(self.state.kind(id), Some(NodeKind::Block { .. })) {
            self.emit_stmt(id);
            return;
        }
        self.write("{");
        self.indent += 1;
        self.newline();
        self.emit_stmt(id);
        self.indent -= 1;
        self.newline();
        self.write("}");
    }

    /// `var a = 1, b = 2` without the trailing semicolon
    fn emit_declaration(&mut self, id: NodeId) {
        let Some(NodeKind::VariableDeclaration { kind, declarations }) =
            self.state.kind(id).cloned()
        else {
            return;
        };
        self.write(kind.as_str());
        self.write(" ");
        let mut first = true;
        for decl in declarations {
            if !first {
                self.write(", ");
            }
            first = false;
            let Some(NodeKind::VariableDeclarator { id: name, init }) =
                self.state.kind(decl).cloned()
            else {
                continue;
            };
            self.emit_expr(name, 20);
            if let Some(init) = init {
                self.write(" = ");
                self.emit_expr(init, 2);
            }
        }
    }

    fn emit_params(&mut self, params: &[NodeId]) {
        self.write("(");
        let mut first = true;
        for &param in params {
            if !first {
                self.write(", ");
            }
            first = false;
            self.emit_expr(param, 20);
        }
        self.write(")");
    }

    /// Whether the expression's first token would be `{` or `function`
    fn starts_ambiguously(&self, id: NodeId) -> bool {
        match self.state.kind(id) {
            Some(NodeKind::ObjectLit { .. }) | Some(NodeKind::FunctionExpression { .. }) => true,
            Some(NodeKind::Binary { left, .. })
            | Some(NodeKind::Logical { left, .. }) => self.starts_ambiguously(*left),
            Some(NodeKind::Assignment { target, .. }) => self.starts_ambiguously(*target),
            Some(NodeKind::Conditional { test, .. }) => self.starts_ambiguously(*test),
            Some(NodeKind::Member { object, .. }) => self.starts_ambiguously(*object),
            Some(NodeKind::Call { callee, .. }) => self.starts_ambiguously(*callee),
            Some(NodeKind::Sequence { expressions }) => expressions
                .first()
                .map(|&e| self.starts_ambiguously(e))
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Emit an expression; parenthesize when its precedence is below the
    /// context minimum
    fn emit_expr(&mut self, id: NodeId, min_prec: u8) {
        let prec = precedence(self.state, id);
        let parens = prec < min_prec;
        if parens {
            self.write("(");
        }
        self.emit_expr_bare(id, prec);
        if parens {
            self.write(")");
        }
    }

    fn emit_expr_bare(&mut self, id: NodeId, own_prec: u8) {
        let Some(kind) = self.state.kind(id).cloned() else {
            return;
        };
        self.mark(id);
        match kind {
            NodeKind::Identifier { name } => self.write(&name),
            NodeKind::SsaName { name, .. } => self.write(&name),
            NodeKind::Literal { value } => self.emit_literal(&value),
            NodeKind::Binary { op, left, right } => {
                self.emit_expr(left, own_prec);
                self.write(" ");
                self.write(op.as_str());
                self.write(" ");
                self.emit_expr(right, own_prec + 1);
            }
            NodeKind::Logical { op, left, right } => {
                self.emit_expr(left, own_prec);
                self.write(" ");
                self.write(op.as_str());
                self.write(" ");
                self.emit_expr(right, own_prec + 1);
            }
            NodeKind::Unary { op, argument } => {
                use crate::shared::models::UnaryOp;
                self.write(op.as_str());
                if matches!(op, UnaryOp::Typeof | UnaryOp::Void | UnaryOp::Delete) {
                    self.write(" ");
                }
                // `- -x` and `+ +x` must not paste into `--x` / `++x`
                let pastes = matches!(
                    (op, self.state.kind(argument)),
                    (
                        UnaryOp::Minus,
                        Some(NodeKind::Unary {
                            op: UnaryOp::Minus,
                            ..
                        })
                    ) | (
                        UnaryOp::Plus,
                        Some(NodeKind::Unary {
                            op: UnaryOp::Plus,
                            ..
                        })
                    ) | (_, Some(NodeKind::Update { prefix: true, .. }))
                );
                if pastes {
                    self.write("(");
                    self.emit_expr(argument, 0);
                    self.write(")");
                } else {
                    self.emit_expr(argument, 15);
                }
            }
            NodeKind::Update {
                op,
                argument,
                prefix,
            } => {
                if prefix {
                    self.write(op.as_str());
                    self.emit_expr(argument, 16);
                } else {
                    self.emit_expr(argument, 16);
                    self.write(op.as_str());
                }
            }
            NodeKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                self.emit_expr(test, 4);
                self.write(" ? ");
                self.emit_expr(consequent, 2);
                self.write(" : ");
                self.emit_expr(alternate, 2);
            }
            NodeKind::Assignment { op, target, value } => {
                self.emit_expr(target, 16);
                self.write(" ");
                self.write(op.as_str());
                self.write(" ");
                self.emit_expr(value, 2);
            }
            NodeKind::Call {
                callee,
                arguments,
                optional,
            } => {
                self.emit_expr(callee, 18);
                if optional {
                    self.write("?.");
                }
                self.write("(");
                let mut first = true;
                for arg in arguments {
                    if !first {
                        self.write(", ");
                    }
                    first = false;
                    self.emit_expr(arg, 2);
                }
                self.write(")");
            }
            NodeKind::New { callee, arguments } => {
                self.write("new ");
                self.emit_expr(callee, 18);
                self.write("(");
                let mut first = true;
                for arg in arguments {
                    if !first {
                        self.write(", ");
                    }
                    first = false;
                    self.emit_expr(arg, 2);
                }
                self.write(")");
            }
            NodeKind::Member {
                object,
                property,
                computed,
                optional,
            } => {
                self.emit_expr(object, 18);
                if computed {
                    if optional {
                        self.write("?.");
                    }
                    self.write("[");
                    self.emit_expr(property, 0);
                    self.write("]");
                } else {
                    self.write(if optional { "?." } else { "." });
                    self.emit_expr(property, 20);
                }
            }
            NodeKind::ArrayLit { elements } => {
                self.write("[");
                let mut first = true;
                for element in elements {
                    if !first {
                        self.write(", ");
                    }
                    first = false;
                    match element {
                        Some(e) => self.emit_expr(e, 2),
                        None => {}
                    }
                }
                self.write("]");
            }
            NodeKind::ObjectLit { properties } => {
                self.write("{");
                let mut first = true;
                for prop in properties {
                    if !first {
                        self.write(", ");
                    }
                    first = false;
                    let Some(NodeKind::Property {
                        key,
                        value,
                        computed,
                        shorthand,
                    }) = self.state.kind(prop).cloned()
                    else {
                        continue;
                    };
                    if shorthand {
                        self.emit_expr(value, 20);
                        continue;
                    }
                    if computed {
                        self.write("[");
                        self.emit_expr(key, 0);
                        self.write("]");
                    } else {
                        self.emit_expr(key, 20);
                    }
                    self.write(": ");
                    self.emit_expr(value, 2);
                }
                self.write("}");
            }
            NodeKind::Sequence { expressions } => {
                let mut first = true;
                for expr in expressions {
                    if !first {
                        self.write(", ");
                    }
                    first = false;
                    self.emit_expr(expr, 2);
                }
            }
            NodeKind::FunctionExpression {
                id: name,
                params,
                body,
                is_async,
                is_generator,
            } => {
                if is_async {
                    self.write("async ");
                }
                self.write("function");
                if is_generator {
                    self.write("*");
                }
                if let Some(name) = name {
                    self.write(" ");
                    self.emit_expr(name, 20);
                }
                self.emit_params(&params);
                self.write(" ");
                self.emit_braced_body(body);
            }
            NodeKind::ArrowFunction {
                params,
                body,
                expression,
                is_async,
            } => {
                if is_async {
                    self.write("async ");
                }
                self.emit_params(&params);
                self.write(" => ");
                if expression {
                    // Object-literal bodies need wrapping
                    if self.starts_ambiguously(body) {
                        self.write("(");
                        self.emit_expr(body, 0);
                        self.write(")");
                    } else {
                        self.emit_expr(body, 2);
                    }
                } else {
                    self.emit_braced_body(body);
                }
            }
            // φ-nodes never appear in the tree the printer walks; this is
            // debug output for CFG snapshots only
            NodeKind::Phi { target, operands } => {
                self.emit_expr(target, 20);
                self.write(" = phi(");
                let mut first = true;
                for op in operands {
                    if !first {
                        self.write(", ");
                    }
                    first = false;
                    self.emit_expr(op.value, 2);
                }
                self.write(")");
            }
            // Statement kinds reached through expression context print
            // nothing here
            _ => {}
        }
    }

    fn emit_literal(&mut self, value: &LiteralValue) {
        match value {
            LiteralValue::Number(n) => {
                if *n < 0.0 {
                    // Negative literals only arise from folding; keep them
                    // parenthesized so unary minus reparses identically
                    self.write(&format!("(-{})", number_to_string(-n)));
                } else {
                    self.write(&number_to_string(*n));
                }
            }
            LiteralValue::String(s) => {
                self.write(&quote_string(s));
            }
            LiteralValue::Boolean(b) => self.write(if *b { "true" } else { "false" }),
            LiteralValue::Null => self.write("null"),
            LiteralValue::BigInt(digits) => {
                self.write(digits);
                self.write("n");
            }
            LiteralValue::Regex { pattern, flags } => {
                self.write("/");
                self.write(pattern);
                self.write("/");
                self.write(flags);
            }
        }
    }
}

/// Quote with single quotes, escaping as the ECMAScript grammar demands
fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for ch in s.chars() {
        match ch {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{0008}' => out.push_str("\\b"),
            '\u{000C}' => out.push_str("\\f"),
            '\u{000B}' => out.push_str("\\v"),
            '\0' => out.push_str("\\0"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::parsing::parse_source;

    fn print_of(src: &str) -> String {
        let lowered = parse_source(src, "test.js").unwrap();
        let state = IrState::new(lowered.nodes, lowered.root, lowered.factory);
        print_program(&state)
    }

    fn normalize(s: &str) -> String {
        s.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_prints_declaration() {
        assert_eq!(print_of("var a = 1;").trim(), "var a = 1;");
    }

    #[test]
    fn test_precedence_parens_preserved() {
        // (1 + 2) * 3 must keep its parentheses
        assert_eq!(print_of("x = (1 + 2) * 3;").trim(), "x = (1 + 2) * 3;");
        // 1 + 2 * 3 must not gain any
        assert_eq!(print_of("x = 1 + 2 * 3;").trim(), "x = 1 + 2 * 3;");
    }

    #[test]
    fn test_left_associativity() {
        // a - b - c parses as (a - b) - c; right nesting needs parens
        assert_eq!(print_of("x = a - (b - c);").trim(), "x = a - (b - c);");
        assert_eq!(print_of("x = a - b - c;").trim(), "x = a - b - c;");
    }

    #[test]
    fn test_xor_equality_parens() {
        // ^ binds looser than ===, the parens are load-bearing
        assert_eq!(print_of("x = (y ^ y) === 0;").trim(), "x = (y ^ y) === 0;");
    }

    #[test]
    fn test_string_quoting() {
        assert_eq!(print_of("var s = 'a\\nb';").trim(), "var s = 'a\\nb';");
        assert_eq!(print_of("var s = \"it's\";").trim(), "var s = 'it\\'s';");
    }

    #[test]
    fn test_if_else_chain() {
        let out = print_of("if (a) { f(); } else if (b) { g(); } else { h(); }");
        assert_eq!(
            normalize(&out),
            "if (a) { f(); } else if (b) { g(); } else { h(); }"
        );
    }

    #[test]
    fn test_print_parse_print_is_stable() {
        let sources = [
            "var a = 1; var b = a + 2; console.log(b);",
            "function f(x) { return x * (x + 1); }",
            "var s = 0; while (s != 3) { switch (s) { case 0: s = 1; break; default: s = 3; } }",
            "for (var i = 0; i < 10; i++) { use(i); }",
            "var o = {a: 1, 'b c': 2}; use(o.a, o['b c']);",
        ];
        for src in sources {
            let once = print_of(src);
            let twice = print_of(&once);
            assert_eq!(once, twice, "print not stable for `{src}`");
        }
    }

    #[test]
    fn test_object_statement_parenthesized() {
        let lowered = parse_source("x = 1;", "test.js").unwrap();
        let mut state = IrState::new(lowered.nodes, lowered.root, lowered.factory);
        // Replace the expression with a bare object literal statement
        let stmt = state.program_body()[0];
        let Some(NodeKind::ExpressionStatement { expression }) = state.kind(stmt).cloned()
        else {
            panic!("expected expression statement");
        };
        state.replace_kind(expression, NodeKind::ObjectLit { properties: vec![] });
        let out = print_program(&state);
        assert_eq!(out.trim(), "({});");
    }

    #[test]
    fn test_source_map_records_locations() {
        let lowered = parse_source("var abc = 1;\nuse(abc);", "in.js").unwrap();
        let state = IrState::new(lowered.nodes, lowered.root, lowered.factory);
        let (_, map) = print_with_source_map(&state, "in.js");
        assert!(!map.mappings.is_empty());
        assert!(map.mappings.iter().any(|m| m.original_line == 2));
        assert!(map.mappings.iter().all(|m| m.source == "in.js"));
    }
}
