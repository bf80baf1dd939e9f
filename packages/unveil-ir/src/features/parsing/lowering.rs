//! CST → IR lowering
//!
//! Walks the tree-sitter CST into the flat node map, preserving source
//! spans. Constructs outside the supported subset (modules, classes,
//! destructuring, `for..in`, `with`) lower to placeholders with a
//! structured warning instead of failing the whole job.

use tree_sitter::Node as TsNode;

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::pass::Warning;
use crate::shared::models::node::{
    AssignOp, BinaryOp, DeclKind, LiteralValue, LogicalOp, NodeId, NodeKind, NodeMap, UnaryOp,
    UpdateOp,
};
use crate::shared::models::{IrNode, NodeFactory, Span};

use super::ports::ParseTree;

/// Lowering result: the raw material of an `IrState`
pub struct Lowered {
    pub nodes: NodeMap,
    pub root: NodeId,
    pub factory: NodeFactory,
    pub module: bool,
    pub warnings: Vec<Warning>,
}

pub fn lower(tree: &ParseTree, source_name: &str) -> PipelineResult<Lowered> {
    let root_node = tree.tree.root_node();
    if root_node.kind() != "program" {
        return Err(PipelineError::parse(
            source_name,
            format!("unexpected root node {}", root_node.kind()),
        ));
    }

    let mut lowerer = Lowerer {
        text: &tree.text,
        factory: NodeFactory::new(),
        nodes: NodeMap::default(),
        warnings: Vec::new(),
        module: false,
    };

    let mut body = Vec::new();
    let mut cursor = root_node.walk();
    for child in root_node.named_children(&mut cursor) {
        if matches!(child.kind(), "comment" | "hash_bang_line") {
            continue;
        }
        body.push(lowerer.lower_statement(child));
    }

    let module = lowerer.module;
    let root = lowerer.add(NodeKind::Program { body, module }, root_node);

    Ok(Lowered {
        nodes: lowerer.nodes,
        root,
        factory: lowerer.factory,
        module,
        warnings: lowerer.warnings,
    })
}

struct Lowerer<'t> {
    text: &'t str,
    factory: NodeFactory,
    nodes: NodeMap,
    warnings: Vec<Warning>,
    module: bool,
}

impl<'t> Lowerer<'t> {
    /// Parser rows are 0-based; spans count lines from 1
    fn span_of(node: TsNode<'_>) -> Span {
        let start = node.start_position();
        let end = node.end_position();
        Span::new(
            (start.row as u32 + 1, start.column as u32),
            (end.row as u32 + 1, end.column as u32),
        )
    }

    fn text_of(&self, node: TsNode<'_>) -> &str {
        self.text.get(node.byte_range()).unwrap_or("")
    }

    fn add(&mut self, kind: NodeKind, at: TsNode<'_>) -> NodeId {
        self.add_spanned(kind, Self::span_of(at))
    }

    fn add_spanned(&mut self, kind: NodeKind, span: Span) -> NodeId {
        let id = self.factory.fresh_id();
        self.nodes.insert(
            id,
            IrNode {
                id,
                kind,
                span: Some(span),
            },
        );
        id
    }

    fn span_for(&self, id: NodeId) -> Span {
        self.nodes.get(&id).and_then(|n| n.span).unwrap_or_default()
    }

    fn warn(&mut self, code: &str, message: String, at: TsNode<'_>) {
        let (line, column) = Self::span_of(at).start();
        self.warnings.push(Warning::new(
            code,
            format!("{message} at {line}:{column}"),
        ));
    }

    fn named_children<'a>(&self, node: TsNode<'a>) -> Vec<TsNode<'a>> {
        let mut cursor = node.walk();
        node.named_children(&mut cursor)
            .filter(|c| c.kind() != "comment")
            .collect()
    }

    fn unsupported_statement(&mut self, node: TsNode<'_>) -> NodeId {
        self.warn(
            "lower.unsupported",
            format!("unsupported statement `{}` dropped", node.kind()),
            node,
        );
        self.add(NodeKind::EmptyStatement, node)
    }

    fn sentinel(&mut self, node: TsNode<'_>) -> NodeId {
        self.add(
            NodeKind::Literal {
                value: LiteralValue::Null,
            },
            node,
        )
    }

    /// Unwrap `(expr)` wrappers and `expression_statement` shells used by
    /// `for`/`if`/`while` headers
    fn unwrap_expression<'a>(&self, mut node: TsNode<'a>) -> Option<TsNode<'a>> {
        loop {
            match node.kind() {
                "parenthesized_expression" | "expression_statement" => {
                    node = self.named_children(node).into_iter().next()?;
                }
                "empty_statement" => return None,
                _ => return Some(node),
            }
        }
    }

    fn lower_statement(&mut self, node: TsNode<'_>) -> NodeId {
        match node.kind() {
            "expression_statement" => {
                let expr = match self.named_children(node).into_iter().next() {
                    Some(child) => self.lower_expression(child),
                    None => self.sentinel(node),
                };
                self.add(NodeKind::ExpressionStatement { expression: expr }, node)
            }
            "variable_declaration" => self.lower_declaration(node, DeclKind::Var),
            "lexical_declaration" => {
                let kind = if self.text_of(node).trim_start().starts_with("const") {
                    DeclKind::Const
                } else {
                    DeclKind::Let
                };
                self.lower_declaration(node, kind)
            }
            "statement_block" => {
                let body = self
                    .named_children(node)
                    .into_iter()
                    .map(|c| self.lower_statement(c))
                    .collect();
                self.add(NodeKind::Block { body }, node)
            }
            "if_statement" => {
                let test = self.lower_header_expr(node, "condition");
                let consequent = match node.child_by_field_name("consequence") {
                    Some(c) => self.lower_statement(c),
                    None => self.add(NodeKind::Block { body: vec![] }, node),
                };
                let alternate = node.child_by_field_name("alternative").and_then(|alt| {
                    // else_clause wraps the statement
                    self.named_children(alt)
                        .into_iter()
                        .next()
                        .map(|s| self.lower_statement(s))
                });
                self.add(
                    NodeKind::If {
                        test,
                        consequent,
                        alternate,
                    },
                    node,
                )
            }
            "while_statement" => {
                let test = self.lower_header_expr(node, "condition");
                let body = match node.child_by_field_name("body") {
                    Some(b) => self.lower_statement(b),
                    None => self.add(NodeKind::Block { body: vec![] }, node),
                };
                self.add(NodeKind::While { test, body }, node)
            }
            "do_statement" => {
                let body = match node.child_by_field_name("body") {
                    Some(b) => self.lower_statement(b),
                    None => self.add(NodeKind::Block { body: vec![] }, node),
                };
                let test = self.lower_header_expr(node, "condition");
                self.add(NodeKind::DoWhile { body, test }, node)
            }
            "for_statement" => self.lower_for(node),
            "switch_statement" => self.lower_switch(node),
            "return_statement" => {
                let argument = self
                    .named_children(node)
                    .into_iter()
                    .next()
                    .map(|c| self.lower_expression(c));
                self.add(NodeKind::Return { argument }, node)
            }
            "break_statement" => {
                let label = node
                    .child_by_field_name("label")
                    .map(|l| self.text_of(l).to_string());
                self.add(NodeKind::Break { label }, node)
            }
            "continue_statement" => {
                let label = node
                    .child_by_field_name("label")
                    .map(|l| self.text_of(l).to_string());
                self.add(NodeKind::Continue { label }, node)
            }
            "labeled_statement" => {
                let label = node
                    .child_by_field_name("label")
                    .map(|l| self.text_of(l).to_string())
                    .unwrap_or_default();
                let body = match node.child_by_field_name("body") {
                    Some(b) => self.lower_statement(b),
                    None => self.add(NodeKind::EmptyStatement, node),
                };
                self.add(NodeKind::Labeled { label, body }, node)
            }
            "throw_statement" => {
                let argument = match self.named_children(node).into_iter().next() {
                    Some(c) => self.lower_expression(c),
                    None => self.sentinel(node),
                };
                self.add(NodeKind::Throw { argument }, node)
            }
            "try_statement" => self.lower_try(node),
            "empty_statement" => self.add(NodeKind::EmptyStatement, node),
            "function_declaration" | "generator_function_declaration" => {
                self.lower_function_declaration(node)
            }
            "import_statement" | "export_statement" => {
                self.module = true;
                self.unsupported_statement(node)
            }
            "class_declaration"
            | "with_statement"
            | "debugger_statement"
            | "for_in_statement" => self.unsupported_statement(node),
            // An expression in statement position (defensive for grammar
            // versions that surface them directly)
            _ => {
                let expr = self.lower_expression(node);
                self.add(NodeKind::ExpressionStatement { expression: expr }, node)
            }
        }
    }

    fn lower_header_expr(&mut self, node: TsNode<'_>, field: &str) -> NodeId {
        match node
            .child_by_field_name(field)
            .and_then(|c| self.unwrap_expression(c))
        {
            Some(expr) => self.lower_expression(expr),
            None => self.add(
                NodeKind::Literal {
                    value: LiteralValue::Boolean(true),
                },
                node,
            ),
        }
    }

    fn lower_declaration(&mut self, node: TsNode<'_>, kind: DeclKind) -> NodeId {
        let mut declarations = Vec::new();
        for child in self.named_children(node) {
            if child.kind() != "variable_declarator" {
                continue;
            }
            let id = match child.child_by_field_name("name") {
                Some(name) if name.kind() == "identifier" => {
                    let name_text = self.text_of(name).to_string();
                    self.add(NodeKind::Identifier { name: name_text }, name)
                }
                Some(pattern) => {
                    self.warn(
                        "lower.unsupported",
                        format!("unsupported binding pattern `{}`", pattern.kind()),
                        pattern,
                    );
                    self.add(
                        NodeKind::Identifier {
                            name: format!("__pattern_{}", pattern.start_byte()),
                        },
                        pattern,
                    )
                }
                None => continue,
            };
            let init = child
                .child_by_field_name("value")
                .map(|v| self.lower_expression(v));
            declarations.push(self.add(NodeKind::VariableDeclarator { id, init }, child));
        }
        self.add(NodeKind::VariableDeclaration { kind, declarations }, node)
    }

    fn lower_for(&mut self, node: TsNode<'_>) -> NodeId {
        let init = node.child_by_field_name("initializer").and_then(|i| {
            match i.kind() {
                "variable_declaration" => Some(self.lower_declaration(i, DeclKind::Var)),
                "lexical_declaration" => {
                    let kind = if self.text_of(i).trim_start().starts_with("const") {
                        DeclKind::Const
                    } else {
                        DeclKind::Let
                    };
                    Some(self.lower_declaration(i, kind))
                }
                _ => self
                    .unwrap_expression(i)
                    .map(|expr| self.lower_expression(expr)),
            }
        });
        let test = node
            .child_by_field_name("condition")
            .and_then(|c| self.unwrap_expression(c))
            .map(|c| self.lower_expression(c));
        let update = node
            .child_by_field_name("increment")
            .map(|c| self.lower_expression(c));
        let body = match node.child_by_field_name("body") {
            Some(b) => self.lower_statement(b),
            None => self.add(NodeKind::Block { body: vec![] }, node),
        };
        self.add(
            NodeKind::For {
                init,
                test,
                update,
                body,
            },
            node,
        )
    }

    fn lower_switch(&mut self, node: TsNode<'_>) -> NodeId {
        let discriminant = self.lower_header_expr(node, "value");
        let mut cases = Vec::new();
        if let Some(body) = node.child_by_field_name("body") {
            for case in self.named_children(body) {
                match case.kind() {
                    "switch_case" => {
                        let value = case.child_by_field_name("value");
                        let test = value.map(|v| self.lower_expression(v));
                        let value_id = value.map(|v| v.id());
                        let stmts = self
                            .named_children(case)
                            .into_iter()
                            .filter(|c| Some(c.id()) != value_id)
                            .map(|c| self.lower_statement(c))
                            .collect();
                        cases.push(self.add(NodeKind::SwitchCase { test, body: stmts }, case));
                    }
                    "switch_default" => {
                        let stmts = self
                            .named_children(case)
                            .into_iter()
                            .map(|c| self.lower_statement(c))
                            .collect();
                        cases.push(self.add(
                            NodeKind::SwitchCase {
                                test: None,
                                body: stmts,
                            },
                            case,
                        ));
                    }
                    _ => {}
                }
            }
        }
        self.add(
            NodeKind::Switch {
                discriminant,
                cases,
            },
            node,
        )
    }

    fn lower_try(&mut self, node: TsNode<'_>) -> NodeId {
        let block = match node.child_by_field_name("body") {
            Some(b) => self.lower_statement(b),
            None => self.add(NodeKind::Block { body: vec![] }, node),
        };
        let (handler_param, handler) = match node.child_by_field_name("handler") {
            Some(clause) => {
                let param = clause.child_by_field_name("parameter").map(|p| {
                    let name = self.text_of(p).to_string();
                    self.add(NodeKind::Identifier { name }, p)
                });
                let body = clause
                    .child_by_field_name("body")
                    .map(|b| self.lower_statement(b));
                (param, body)
            }
            None => (None, None),
        };
        let finalizer = node
            .child_by_field_name("finalizer")
            .and_then(|f| f.child_by_field_name("body"))
            .map(|b| self.lower_statement(b));
        self.add(
            NodeKind::Try {
                block,
                handler_param,
                handler,
                finalizer,
            },
            node,
        )
    }

    fn has_keyword(&self, node: TsNode<'_>, keyword: &str) -> bool {
        let mut cursor = node.walk();
        let found = node
            .children(&mut cursor)
            .any(|c| !c.is_named() && self.text_of(c) == keyword);
        found
    }

    fn lower_params(&mut self, node: TsNode<'_>) -> Vec<NodeId> {
        let Some(params) = node.child_by_field_name("parameters") else {
            // Single-identifier arrow parameter
            if let Some(param) = node.child_by_field_name("parameter") {
                let name = self.text_of(param).to_string();
                return vec![self.add(NodeKind::Identifier { name }, param)];
            }
            return Vec::new();
        };
        let mut out = Vec::new();
        for child in self.named_children(params) {
            if child.kind() == "identifier" {
                let name = self.text_of(child).to_string();
                out.push(self.add(NodeKind::Identifier { name }, child));
            } else {
                self.warn(
                    "lower.unsupported",
                    format!("unsupported parameter `{}` skipped", child.kind()),
                    child,
                );
            }
        }
        out
    }

    fn lower_function_declaration(&mut self, node: TsNode<'_>) -> NodeId {
        let is_generator =
            node.kind() == "generator_function_declaration" || self.has_keyword(node, "*");
        let is_async = self.has_keyword(node, "async");
        let id = match node.child_by_field_name("name") {
            Some(name) => {
                let text = self.text_of(name).to_string();
                self.add(NodeKind::Identifier { name: text }, name)
            }
            None => self.add(
                NodeKind::Identifier {
                    name: format!("__fn_{}", node.start_byte()),
                },
                node,
            ),
        };
        let params = self.lower_params(node);
        let body = match node.child_by_field_name("body") {
            Some(b) => self.lower_statement(b),
            None => self.add(NodeKind::Block { body: vec![] }, node),
        };
        self.add(
            NodeKind::FunctionDeclaration {
                id,
                params,
                body,
                is_async,
                is_generator,
            },
            node,
        )
    }

    fn lower_expression(&mut self, node: TsNode<'_>) -> NodeId {
        match node.kind() {
            "identifier" | "property_identifier" | "statement_identifier"
            | "shorthand_property_identifier" => {
                let name = self.text_of(node).to_string();
                self.add(NodeKind::Identifier { name }, node)
            }
            "number" => {
                let value = parse_js_number(self.text_of(node));
                match value {
                    Some(v) => self.add(NodeKind::Literal { value: v }, node),
                    None => {
                        self.warn(
                            "lower.number",
                            format!("unparseable numeric literal `{}`", self.text_of(node)),
                            node,
                        );
                        self.sentinel(node)
                    }
                }
            }
            "string" => {
                let value = self.lower_string_contents(node);
                self.add(
                    NodeKind::Literal {
                        value: LiteralValue::String(value),
                    },
                    node,
                )
            }
            "template_string" => self.lower_template(node),
            "regex" => {
                let pattern = node
                    .child_by_field_name("pattern")
                    .map(|p| self.text_of(p).to_string())
                    .unwrap_or_default();
                let flags = node
                    .child_by_field_name("flags")
                    .map(|f| self.text_of(f).to_string())
                    .unwrap_or_default();
                self.add(
                    NodeKind::Literal {
                        value: LiteralValue::Regex { pattern, flags },
                    },
                    node,
                )
            }
            "true" => self.add(
                NodeKind::Literal {
                    value: LiteralValue::Boolean(true),
                },
                node,
            ),
            "false" => self.add(
                NodeKind::Literal {
                    value: LiteralValue::Boolean(false),
                },
                node,
            ),
            "null" => self.add(
                NodeKind::Literal {
                    value: LiteralValue::Null,
                },
                node,
            ),
            "undefined" => self.add(
                NodeKind::Identifier {
                    name: "undefined".to_string(),
                },
                node,
            ),
            "binary_expression" => self.lower_binary(node),
            "unary_expression" => {
                let op_text = node
                    .child_by_field_name("operator")
                    .map(|o| self.text_of(o).to_string())
                    .unwrap_or_default();
                let argument = match node.child_by_field_name("argument") {
                    Some(a) => self.lower_expression(a),
                    None => self.sentinel(node),
                };
                match UnaryOp::from_str(&op_text) {
                    Some(op) => self.add(NodeKind::Unary { op, argument }, node),
                    None => {
                        self.warn(
                            "lower.operator",
                            format!("unsupported unary operator `{op_text}`"),
                            node,
                        );
                        argument
                    }
                }
            }
            "update_expression" => {
                let argument = match node.child_by_field_name("argument") {
                    Some(a) => self.lower_expression(a),
                    None => self.sentinel(node),
                };
                let op = if self.has_keyword(node, "++") {
                    UpdateOp::Increment
                } else {
                    UpdateOp::Decrement
                };
                // Prefix when the operator token precedes the argument
                let prefix = node
                    .child(0)
                    .map(|c| !c.is_named())
                    .unwrap_or(false);
                self.add(
                    NodeKind::Update {
                        op,
                        argument,
                        prefix,
                    },
                    node,
                )
            }
            "ternary_expression" => {
                let test = match node.child_by_field_name("condition") {
                    Some(c) => self.lower_expression(c),
                    None => self.sentinel(node),
                };
                let consequent = match node.child_by_field_name("consequence") {
                    Some(c) => self.lower_expression(c),
                    None => self.sentinel(node),
                };
                let alternate = match node.child_by_field_name("alternative") {
                    Some(c) => self.lower_expression(c),
                    None => self.sentinel(node),
                };
                self.add(
                    NodeKind::Conditional {
                        test,
                        consequent,
                        alternate,
                    },
                    node,
                )
            }
            "assignment_expression" => {
                let target = match node.child_by_field_name("left") {
                    Some(l) => self.lower_expression(l),
                    None => self.sentinel(node),
                };
                let value = match node.child_by_field_name("right") {
                    Some(r) => self.lower_expression(r),
                    None => self.sentinel(node),
                };
                self.add(
                    NodeKind::Assignment {
                        op: AssignOp::Assign,
                        target,
                        value,
                    },
                    node,
                )
            }
            "augmented_assignment_expression" => {
                let target = match node.child_by_field_name("left") {
                    Some(l) => self.lower_expression(l),
                    None => self.sentinel(node),
                };
                let value = match node.child_by_field_name("right") {
                    Some(r) => self.lower_expression(r),
                    None => self.sentinel(node),
                };
                let op_text = node
                    .child_by_field_name("operator")
                    .map(|o| self.text_of(o).to_string())
                    .unwrap_or_default();
                match AssignOp::from_str(&op_text) {
                    Some(op) => self.add(NodeKind::Assignment { op, target, value }, node),
                    None => {
                        self.warn(
                            "lower.operator",
                            format!("unsupported assignment operator `{op_text}`"),
                            node,
                        );
                        self.add(
                            NodeKind::Assignment {
                                op: AssignOp::Assign,
                                target,
                                value,
                            },
                            node,
                        )
                    }
                }
            }
            "call_expression" => {
                let callee = match node.child_by_field_name("function") {
                    Some(f) => self.lower_expression(f),
                    None => self.sentinel(node),
                };
                let optional = node
                    .child_by_field_name("optional_chain")
                    .is_some()
                    || self.has_keyword(node, "?.");
                let arguments = self.lower_arguments(node.child_by_field_name("arguments"));
                self.add(
                    NodeKind::Call {
                        callee,
                        arguments,
                        optional,
                    },
                    node,
                )
            }
            "new_expression" => {
                let callee = match node.child_by_field_name("constructor") {
                    Some(c) => self.lower_expression(c),
                    None => self.sentinel(node),
                };
                let arguments = self.lower_arguments(node.child_by_field_name("arguments"));
                self.add(NodeKind::New { callee, arguments }, node)
            }
            "member_expression" => {
                let object = match node.child_by_field_name("object") {
                    Some(o) => self.lower_expression(o),
                    None => self.sentinel(node),
                };
                let property = match node.child_by_field_name("property") {
                    Some(p) => {
                        let name = self.text_of(p).to_string();
                        self.add(NodeKind::Identifier { name }, p)
                    }
                    None => self.sentinel(node),
                };
                let optional = self.has_keyword(node, "?.");
                self.add(
                    NodeKind::Member {
                        object,
                        property,
                        computed: false,
                        optional,
                    },
                    node,
                )
            }
            "subscript_expression" => {
                let object = match node.child_by_field_name("object") {
                    Some(o) => self.lower_expression(o),
                    None => self.sentinel(node),
                };
                let property = match node.child_by_field_name("index") {
                    Some(i) => self.lower_expression(i),
                    None => self.sentinel(node),
                };
                let optional = self.has_keyword(node, "?.");
                self.add(
                    NodeKind::Member {
                        object,
                        property,
                        computed: true,
                        optional,
                    },
                    node,
                )
            }
            "parenthesized_expression" => match self.named_children(node).into_iter().next() {
                Some(inner) => self.lower_expression(inner),
                None => self.sentinel(node),
            },
            "sequence_expression" => {
                let mut expressions = Vec::new();
                self.flatten_sequence(node, &mut expressions);
                self.add(NodeKind::Sequence { expressions }, node)
            }
            "array" => {
                let elements = self
                    .named_children(node)
                    .into_iter()
                    .map(|c| Some(self.lower_expression(c)))
                    .collect();
                self.add(NodeKind::ArrayLit { elements }, node)
            }
            "object" => self.lower_object(node),
            "function_expression" | "function" | "generator_function" => {
                let is_generator =
                    node.kind() == "generator_function" || self.has_keyword(node, "*");
                let is_async = self.has_keyword(node, "async");
                let id = node.child_by_field_name("name").map(|n| {
                    let text = self.text_of(n).to_string();
                    self.add(NodeKind::Identifier { name: text }, n)
                });
                let params = self.lower_params(node);
                let body = match node.child_by_field_name("body") {
                    Some(b) => self.lower_statement(b),
                    None => self.add(NodeKind::Block { body: vec![] }, node),
                };
                self.add(
                    NodeKind::FunctionExpression {
                        id,
                        params,
                        body,
                        is_async,
                        is_generator,
                    },
                    node,
                )
            }
            "arrow_function" => {
                let is_async = self.has_keyword(node, "async");
                let params = self.lower_params(node);
                let (body, expression) = match node.child_by_field_name("body") {
                    Some(b) if b.kind() == "statement_block" => {
                        (self.lower_statement(b), false)
                    }
                    Some(b) => (self.lower_expression(b), true),
                    None => (self.add(NodeKind::Block { body: vec![] }, node), false),
                };
                self.add(
                    NodeKind::ArrowFunction {
                        params,
                        body,
                        expression,
                        is_async,
                    },
                    node,
                )
            }
            "await_expression" | "yield_expression" => {
                self.warn(
                    "lower.unsupported",
                    format!("`{}` lowered to its operand", node.kind()),
                    node,
                );
                match self.named_children(node).into_iter().next() {
                    Some(inner) => self.lower_expression(inner),
                    None => self.sentinel(node),
                }
            }
            other => {
                self.warn(
                    "lower.unsupported",
                    format!("unsupported expression `{other}`"),
                    node,
                );
                self.sentinel(node)
            }
        }
    }

    fn lower_binary(&mut self, node: TsNode<'_>) -> NodeId {
        let left = match node.child_by_field_name("left") {
            Some(l) => self.lower_expression(l),
            None => self.sentinel(node),
        };
        let right = match node.child_by_field_name("right") {
            Some(r) => self.lower_expression(r),
            None => self.sentinel(node),
        };
        let op_text = node
            .child_by_field_name("operator")
            .map(|o| self.text_of(o).to_string())
            .unwrap_or_default();
        // The grammar folds short-circuit operators into binary_expression
        let logical = match op_text.as_str() {
            "&&" => Some(LogicalOp::And),
            "||" => Some(LogicalOp::Or),
            "??" => Some(LogicalOp::Nullish),
            _ => None,
        };
        if let Some(op) = logical {
            return self.add(NodeKind::Logical { op, left, right }, node);
        }
        match BinaryOp::from_str(&op_text) {
            Some(op) => self.add(NodeKind::Binary { op, left, right }, node),
            None => {
                self.warn(
                    "lower.operator",
                    format!("unsupported binary operator `{op_text}`"),
                    node,
                );
                left
            }
        }
    }

    fn lower_arguments(&mut self, args: Option<TsNode<'_>>) -> Vec<NodeId> {
        let Some(args) = args else { return Vec::new() };
        let mut out = Vec::new();
        for child in self.named_children(args) {
            if child.kind() == "spread_element" {
                self.warn(
                    "lower.unsupported",
                    "spread argument lowered to its operand".to_string(),
                    child,
                );
                if let Some(inner) = self.named_children(child).into_iter().next() {
                    out.push(self.lower_expression(inner));
                }
            } else {
                out.push(self.lower_expression(child));
            }
        }
        out
    }

    fn lower_object(&mut self, node: TsNode<'_>) -> NodeId {
        let mut properties = Vec::new();
        for child in self.named_children(node) {
            match child.kind() {
                "pair" => {
                    let (key, computed) = match child.child_by_field_name("key") {
                        Some(k) if k.kind() == "computed_property_name" => {
                            let inner = self
                                .named_children(k)
                                .into_iter()
                                .next()
                                .map(|i| self.lower_expression(i))
                                .unwrap_or_else(|| self.sentinel(k));
                            (inner, true)
                        }
                        Some(k) if k.kind() == "string" => {
                            let value = self.lower_string_contents(k);
                            (
                                self.add(
                                    NodeKind::Literal {
                                        value: LiteralValue::String(value),
                                    },
                                    k,
                                ),
                                false,
                            )
                        }
                        Some(k) => {
                            let name = self.text_of(k).to_string();
                            (self.add(NodeKind::Identifier { name }, k), false)
                        }
                        None => (self.sentinel(child), false),
                    };
                    let value = match child.child_by_field_name("value") {
                        Some(v) => self.lower_expression(v),
                        None => self.sentinel(child),
                    };
                    properties.push(self.add(
                        NodeKind::Property {
                            key,
                            value,
                            computed,
                            shorthand: false,
                        },
                        child,
                    ));
                }
                "shorthand_property_identifier" => {
                    let name = self.text_of(child).to_string();
                    let key = self.add(NodeKind::Identifier { name: name.clone() }, child);
                    let value = self.add(NodeKind::Identifier { name }, child);
                    properties.push(self.add(
                        NodeKind::Property {
                            key,
                            value,
                            computed: false,
                            shorthand: true,
                        },
                        child,
                    ));
                }
                other => {
                    self.warn(
                        "lower.unsupported",
                        format!("unsupported object member `{other}` skipped"),
                        child,
                    );
                }
            }
        }
        self.add(NodeKind::ObjectLit { properties }, node)
    }

    fn flatten_sequence(&mut self, node: TsNode<'_>, out: &mut Vec<NodeId>) {
        let left = node.child_by_field_name("left");
        let right = node.child_by_field_name("right");
        match (left, right) {
            (Some(l), Some(r)) => {
                if l.kind() == "sequence_expression" {
                    self.flatten_sequence(l, out);
                } else {
                    out.push(self.lower_expression(l));
                }
                if r.kind() == "sequence_expression" {
                    self.flatten_sequence(r, out);
                } else {
                    out.push(self.lower_expression(r));
                }
            }
            _ => {
                for child in self.named_children(node) {
                    if child.kind() == "sequence_expression" {
                        self.flatten_sequence(child, out);
                    } else {
                        out.push(self.lower_expression(child));
                    }
                }
            }
        }
    }

    fn lower_string_contents(&mut self, node: TsNode<'_>) -> String {
        let mut out = String::new();
        let mut cursor = node.walk();
        let mut saw_fragment = false;
        for child in node.children(&mut cursor) {
            match child.kind() {
                "string_fragment" => {
                    saw_fragment = true;
                    out.push_str(self.text_of(child));
                }
                "escape_sequence" => {
                    saw_fragment = true;
                    out.push_str(&unescape_sequence(self.text_of(child)));
                }
                _ => {}
            }
        }
        if !saw_fragment {
            // Fallback: strip the quotes from the raw text
            let raw = self.text_of(node);
            if raw.len() >= 2 {
                return unescape_raw(&raw[1..raw.len() - 1]);
            }
        }
        out
    }

    fn lower_template(&mut self, node: TsNode<'_>) -> NodeId {
        let mut parts: Vec<NodeId> = Vec::new();
        let mut cursor = node.walk();
        let children: Vec<TsNode<'_>> = node.children(&mut cursor).collect();
        for child in children {
            match child.kind() {
                "string_fragment" => {
                    let text = self.text_of(child).to_string();
                    parts.push(self.add(
                        NodeKind::Literal {
                            value: LiteralValue::String(text),
                        },
                        child,
                    ));
                }
                "escape_sequence" => {
                    let text = unescape_sequence(self.text_of(child));
                    parts.push(self.add(
                        NodeKind::Literal {
                            value: LiteralValue::String(text),
                        },
                        child,
                    ));
                }
                "template_substitution" => {
                    let inner = self
                        .named_children(child)
                        .into_iter()
                        .next()
                        .map(|i| self.lower_expression(i));
                    if let Some(inner) = inner {
                        parts.push(inner);
                    }
                }
                _ => {}
            }
        }
        match parts.len() {
            0 => self.add(
                NodeKind::Literal {
                    value: LiteralValue::String(String::new()),
                },
                node,
            ),
            1 => {
                // A lone substitution still needs string coercion
                let only = parts[0];
                if matches!(
                    self.nodes.get(&only).map(|n| &n.kind),
                    Some(NodeKind::Literal { .. })
                ) {
                    only
                } else {
                    let empty = self.add(
                        NodeKind::Literal {
                            value: LiteralValue::String(String::new()),
                        },
                        node,
                    );
                    self.add(
                        NodeKind::Binary {
                            op: BinaryOp::Add,
                            left: empty,
                            right: only,
                        },
                        node,
                    )
                }
            }
            _ => {
                // Left-fold into a concatenation chain; every chain node
                // spans the fragments it joins
                let mut iter = parts.into_iter();
                let mut acc = match iter.next() {
                    Some(first) => first,
                    None => return self.sentinel(node),
                };
                for part in iter {
                    let covered = self.span_for(acc).merge(&self.span_for(part));
                    acc = self.add_spanned(
                        NodeKind::Binary {
                            op: BinaryOp::Add,
                            left: acc,
                            right: part,
                        },
                        covered,
                    );
                }
                acc
            }
        }
    }
}

/// Parse a JavaScript numeric literal (decimal, hex, octal, binary,
/// exponent forms, bigint suffix, numeric separators)
pub fn parse_js_number(raw: &str) -> Option<LiteralValue> {
    let text: String = raw.chars().filter(|&c| c != '_').collect();
    if let Some(digits) = text.strip_suffix('n') {
        return Some(LiteralValue::BigInt(digits.to_string()));
    }
    let lower = text.to_ascii_lowercase();
    if let Some(hex) = lower.strip_prefix("0x") {
        return u128::from_str_radix(hex, 16)
            .ok()
            .map(|v| LiteralValue::Number(v as f64));
    }
    if let Some(oct) = lower.strip_prefix("0o") {
        return u128::from_str_radix(oct, 8)
            .ok()
            .map(|v| LiteralValue::Number(v as f64));
    }
    if let Some(bin) = lower.strip_prefix("0b") {
        return u128::from_str_radix(bin, 2)
            .ok()
            .map(|v| LiteralValue::Number(v as f64));
    }
    text.parse::<f64>().ok().map(LiteralValue::Number)
}

fn unescape_sequence(seq: &str) -> String {
    let mut chars = seq.chars();
    if chars.next() != Some('\\') {
        return seq.to_string();
    }
    match chars.next() {
        Some('n') => "\n".to_string(),
        Some('r') => "\r".to_string(),
        Some('t') => "\t".to_string(),
        Some('b') => "\u{0008}".to_string(),
        Some('f') => "\u{000C}".to_string(),
        Some('v') => "\u{000B}".to_string(),
        Some('0') => "\0".to_string(),
        Some('x') => {
            let hex: String = chars.by_ref().take(2).collect();
            u8::from_str_radix(&hex, 16)
                .ok()
                .map(|b| (b as char).to_string())
                .unwrap_or_default()
        }
        Some('u') => {
            let rest: String = chars.collect();
            if let Some(body) = rest.strip_prefix('{') {
                let hex: String = body.chars().take_while(|c| *c != '}').collect();
                u32::from_str_radix(&hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .map(|c| c.to_string())
                    .unwrap_or_default()
            } else {
                let hex: String = rest.chars().take(4).collect();
                u32::from_str_radix(&hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .map(|c| c.to_string())
                    .unwrap_or_default()
            }
        }
        Some('\n') => String::new(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn unescape_raw(body: &str) -> String {
    let mut out = String::new();
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let mut seq = String::from("\\");
        if let Some(&next) = chars.peek() {
            seq.push(next);
            chars.next();
            if next == 'x' {
                for _ in 0..2 {
                    if let Some(&h) = chars.peek() {
                        seq.push(h);
                        chars.next();
                    }
                }
            } else if next == 'u' {
                if chars.peek() == Some(&'{') {
                    while let Some(&h) = chars.peek() {
                        seq.push(h);
                        chars.next();
                        if h == '}' {
                            break;
                        }
                    }
                } else {
                    for _ in 0..4 {
                        if let Some(&h) = chars.peek() {
                            seq.push(h);
                            chars.next();
                        }
                    }
                }
            }
        }
        out.push_str(&unescape_sequence(&seq));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::parsing::{ParserPort, SourceType, TreeSitterParser};
    use crate::shared::models::IrState;

    fn lower_text(src: &str) -> Lowered {
        let parser = TreeSitterParser::new();
        let tree = parser.parse(src, SourceType::Script).unwrap();
        lower(&tree, "test.js").unwrap()
    }

    fn as_state(lowered: Lowered) -> IrState {
        IrState::new(lowered.nodes, lowered.root, lowered.factory)
    }

    #[test]
    fn test_lowers_declaration_chain() {
        let lowered = lower_text("var a = 1; var b = a; var c = b + 2;");
        let state = as_state(lowered);
        let body = state.program_body();
        assert_eq!(body.len(), 3);
        assert!(matches!(
            state.kind(body[0]),
            Some(NodeKind::VariableDeclaration {
                kind: DeclKind::Var,
                ..
            })
        ));
    }

    #[test]
    fn test_lowers_while_switch_dispatcher_shape() {
        let lowered = lower_text(
            "var s = 0; while (s != 3) { switch (s) { case 0: s = 1; break; default: s = 3; } }",
        );
        let state = as_state(lowered);
        let body = state.program_body();
        assert_eq!(body.len(), 2);
        let NodeKind::While { test, body: wbody } = state.kind(body[1]).unwrap() else {
            panic!("expected while");
        };
        assert!(matches!(
            state.kind(*test),
            Some(NodeKind::Binary {
                op: BinaryOp::NotEq,
                ..
            })
        ));
        let NodeKind::Block { body: inner } = state.kind(*wbody).unwrap() else {
            panic!("expected block body");
        };
        let NodeKind::Switch { cases, .. } = state.kind(inner[0]).unwrap() else {
            panic!("expected switch");
        };
        assert_eq!(cases.len(), 2);
        // Default case carries no test
        assert!(matches!(
            state.kind(cases[1]),
            Some(NodeKind::SwitchCase { test: None, .. })
        ));
    }

    #[test]
    fn test_string_escapes() {
        let lowered = lower_text(r#"var s = "a\nb\x41B";"#);
        let state = as_state(lowered);
        let found = state
            .nodes
            .values()
            .find_map(|n| match &n.kind {
                NodeKind::Literal {
                    value: LiteralValue::String(s),
                } => Some(s.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(found, "a\nbAB");
    }

    #[test]
    fn test_number_forms() {
        assert_eq!(parse_js_number("42"), Some(LiteralValue::Number(42.0)));
        assert_eq!(parse_js_number("0x1f"), Some(LiteralValue::Number(31.0)));
        assert_eq!(parse_js_number("0b101"), Some(LiteralValue::Number(5.0)));
        assert_eq!(parse_js_number("1e3"), Some(LiteralValue::Number(1000.0)));
        assert_eq!(parse_js_number("1_000"), Some(LiteralValue::Number(1000.0)));
        assert_eq!(
            parse_js_number("10n"),
            Some(LiteralValue::BigInt("10".to_string()))
        );
    }

    #[test]
    fn test_member_and_subscript() {
        let lowered = lower_text("console.log(t[0]);");
        let state = as_state(lowered);
        let mut saw_plain = false;
        let mut saw_computed = false;
        for n in state.nodes.values() {
            if let NodeKind::Member { computed, .. } = n.kind {
                if computed {
                    saw_computed = true;
                } else {
                    saw_plain = true;
                }
            }
        }
        assert!(saw_plain && saw_computed);
    }

    #[test]
    fn test_unsupported_statement_warns_not_fails() {
        let lowered = lower_text("class Foo {} var a = 1;");
        assert!(lowered
            .warnings
            .iter()
            .any(|w| w.code == "lower.unsupported"));
    }

    #[test]
    fn test_spans_preserved() {
        let lowered = lower_text("var a = 1;");
        let state = as_state(lowered);
        let root_span = state.node(state.root).unwrap().span.unwrap();
        assert_eq!(root_span.start(), (1, 0));
    }
}
