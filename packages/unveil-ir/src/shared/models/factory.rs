//! IR node factory
//!
//! One constructor per node kind. Identities are assigned monotonically per
//! factory; golden-file tests rely on that, so a fresh factory is the reset
//! hook for test isolation. Required children are enforced by the type
//! system; callers that have nothing to put in a slot use `empty_block` or
//! `sentinel_literal` instead.

use super::node::{
    AssignOp, BinaryOp, DeclKind, IrNode, LiteralValue, LogicalOp, NodeId, NodeKind, NodeMap,
    PhiOperand, UnaryOp, UpdateOp,
};

#[derive(Debug, Clone)]
pub struct NodeFactory {
    next: u64,
}

impl Default for NodeFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeFactory {
    pub fn new() -> Self {
        Self { next: 0 }
    }

    /// Resume allocation above ids already present in an existing map
    pub fn resuming_after(max_seen: u64) -> Self {
        Self { next: max_seen + 1 }
    }

    pub fn fresh_id(&mut self) -> NodeId {
        let id = NodeId(self.next);
        self.next += 1;
        id
    }

    fn node(&mut self, kind: NodeKind) -> IrNode {
        IrNode::new(self.fresh_id(), kind)
    }

    pub fn program(&mut self, body: Vec<NodeId>, module: bool) -> IrNode {
        self.node(NodeKind::Program { body, module })
    }

    pub fn block(&mut self, body: Vec<NodeId>) -> IrNode {
        self.node(NodeKind::Block { body })
    }

    /// The canonical stand-in for a missing statement slot
    pub fn empty_block(&mut self) -> IrNode {
        self.block(Vec::new())
    }

    pub fn expression_statement(&mut self, expression: NodeId) -> IrNode {
        self.node(NodeKind::ExpressionStatement { expression })
    }

    pub fn variable_declaration(&mut self, kind: DeclKind, declarations: Vec<NodeId>) -> IrNode {
        self.node(NodeKind::VariableDeclaration { kind, declarations })
    }

    pub fn variable_declarator(&mut self, id: NodeId, init: Option<NodeId>) -> IrNode {
        self.node(NodeKind::VariableDeclarator { id, init })
    }

    pub fn function_declaration(
        &mut self,
        id: NodeId,
        params: Vec<NodeId>,
        body: NodeId,
        is_async: bool,
        is_generator: bool,
    ) -> IrNode {
        self.node(NodeKind::FunctionDeclaration {
            id,
            params,
            body,
            is_async,
            is_generator,
        })
    }

    pub fn function_expression(
        &mut self,
        id: Option<NodeId>,
        params: Vec<NodeId>,
        body: NodeId,
        is_async: bool,
        is_generator: bool,
    ) -> IrNode {
        self.node(NodeKind::FunctionExpression {
            id,
            params,
            body,
            is_async,
            is_generator,
        })
    }

    pub fn arrow_function(
        &mut self,
        params: Vec<NodeId>,
        body: NodeId,
        expression: bool,
        is_async: bool,
    ) -> IrNode {
        self.node(NodeKind::ArrowFunction {
            params,
            body,
            expression,
            is_async,
        })
    }

    pub fn return_statement(&mut self, argument: Option<NodeId>) -> IrNode {
        self.node(NodeKind::Return { argument })
    }

    pub fn if_statement(
        &mut self,
        test: NodeId,
        consequent: NodeId,
        alternate: Option<NodeId>,
    ) -> IrNode {
        self.node(NodeKind::If {
            test,
            consequent,
            alternate,
        })
    }

    pub fn while_statement(&mut self, test: NodeId, body: NodeId) -> IrNode {
        self.node(NodeKind::While { test, body })
    }

    pub fn do_while_statement(&mut self, body: NodeId, test: NodeId) -> IrNode {
        self.node(NodeKind::DoWhile { body, test })
    }

    pub fn for_statement(
        &mut self,
        init: Option<NodeId>,
        test: Option<NodeId>,
        update: Option<NodeId>,
        body: NodeId,
    ) -> IrNode {
        self.node(NodeKind::For {
            init,
            test,
            update,
            body,
        })
    }

    pub fn break_statement(&mut self, label: Option<String>) -> IrNode {
        self.node(NodeKind::Break { label })
    }

    pub fn continue_statement(&mut self, label: Option<String>) -> IrNode {
        self.node(NodeKind::Continue { label })
    }

    pub fn labeled_statement(&mut self, label: String, body: NodeId) -> IrNode {
        self.node(NodeKind::Labeled { label, body })
    }

    pub fn switch_statement(&mut self, discriminant: NodeId, cases: Vec<NodeId>) -> IrNode {
        self.node(NodeKind::Switch {
            discriminant,
            cases,
        })
    }

    pub fn switch_case(&mut self, test: Option<NodeId>, body: Vec<NodeId>) -> IrNode {
        self.node(NodeKind::SwitchCase { test, body })
    }

    pub fn throw_statement(&mut self, argument: NodeId) -> IrNode {
        self.node(NodeKind::Throw { argument })
    }

    pub fn try_statement(
        &mut self,
        block: NodeId,
        handler_param: Option<NodeId>,
        handler: Option<NodeId>,
        finalizer: Option<NodeId>,
    ) -> IrNode {
        self.node(NodeKind::Try {
            block,
            handler_param,
            handler,
            finalizer,
        })
    }

    pub fn empty_statement(&mut self) -> IrNode {
        self.node(NodeKind::EmptyStatement)
    }

    pub fn identifier(&mut self, name: impl Into<String>) -> IrNode {
        self.node(NodeKind::Identifier { name: name.into() })
    }

    pub fn literal(&mut self, value: LiteralValue) -> IrNode {
        self.node(NodeKind::Literal { value })
    }

    pub fn number(&mut self, value: f64) -> IrNode {
        self.literal(LiteralValue::Number(value))
    }

    pub fn string(&mut self, value: impl Into<String>) -> IrNode {
        self.literal(LiteralValue::String(value.into()))
    }

    pub fn boolean(&mut self, value: bool) -> IrNode {
        self.literal(LiteralValue::Boolean(value))
    }

    /// Stand-in literal for a missing expression slot
    pub fn sentinel_literal(&mut self) -> IrNode {
        self.literal(LiteralValue::Null)
    }

    pub fn binary(&mut self, op: BinaryOp, left: NodeId, right: NodeId) -> IrNode {
        self.node(NodeKind::Binary { op, left, right })
    }

    pub fn unary(&mut self, op: UnaryOp, argument: NodeId) -> IrNode {
        self.node(NodeKind::Unary { op, argument })
    }

    pub fn update(&mut self, op: UpdateOp, argument: NodeId, prefix: bool) -> IrNode {
        self.node(NodeKind::Update {
            op,
            argument,
            prefix,
        })
    }

    pub fn logical(&mut self, op: LogicalOp, left: NodeId, right: NodeId) -> IrNode {
        self.node(NodeKind::Logical { op, left, right })
    }

    pub fn conditional(&mut self, test: NodeId, consequent: NodeId, alternate: NodeId) -> IrNode {
        self.node(NodeKind::Conditional {
            test,
            consequent,
            alternate,
        })
    }

    pub fn assignment(&mut self, op: AssignOp, target: NodeId, value: NodeId) -> IrNode {
        self.node(NodeKind::Assignment { op, target, value })
    }

    pub fn call(&mut self, callee: NodeId, arguments: Vec<NodeId>, optional: bool) -> IrNode {
        self.node(NodeKind::Call {
            callee,
            arguments,
            optional,
        })
    }

    pub fn new_expression(&mut self, callee: NodeId, arguments: Vec<NodeId>) -> IrNode {
        self.node(NodeKind::New { callee, arguments })
    }

    pub fn member(
        &mut self,
        object: NodeId,
        property: NodeId,
        computed: bool,
        optional: bool,
    ) -> IrNode {
        self.node(NodeKind::Member {
            object,
            property,
            computed,
            optional,
        })
    }

    pub fn array(&mut self, elements: Vec<Option<NodeId>>) -> IrNode {
        self.node(NodeKind::ArrayLit { elements })
    }

    pub fn object(&mut self, properties: Vec<NodeId>) -> IrNode {
        self.node(NodeKind::ObjectLit { properties })
    }

    pub fn property(
        &mut self,
        key: NodeId,
        value: NodeId,
        computed: bool,
        shorthand: bool,
    ) -> IrNode {
        self.node(NodeKind::Property {
            key,
            value,
            computed,
            shorthand,
        })
    }

    pub fn sequence(&mut self, expressions: Vec<NodeId>) -> IrNode {
        self.node(NodeKind::Sequence { expressions })
    }

    pub fn phi(&mut self, target: NodeId, operands: Vec<PhiOperand>) -> IrNode {
        self.node(NodeKind::Phi { target, operands })
    }

    pub fn ssa_name(&mut self, name: impl Into<String>, version: u32) -> IrNode {
        self.node(NodeKind::SsaName {
            name: name.into(),
            version,
        })
    }

    /// Deep-clone the subtree rooted at `root` into `map` with fresh ids,
    /// preserving spans. Returns the new root id.
    pub fn clone_subtree(&mut self, map: &mut NodeMap, root: NodeId) -> NodeId {
        let source = match map.get(&root) {
            Some(node) => node.clone(),
            None => return root,
        };
        let kind = map_node_children(&source.kind, |child| self.clone_subtree(map, child));
        let id = self.fresh_id();
        map.insert(
            id,
            IrNode {
                id,
                kind,
                span: source.span,
            },
        );
        id
    }
}

/// Rebuild a kind with every child id passed through `f`, preserving shape
pub fn map_node_children(kind: &NodeKind, mut f: impl FnMut(NodeId) -> NodeId) -> NodeKind {
    use NodeKind::*;
    match kind {
        Program { body, module } => Program {
            body: body.iter().map(|&c| f(c)).collect(),
            module: *module,
        },
        Block { body } => Block {
            body: body.iter().map(|&c| f(c)).collect(),
        },
        ExpressionStatement { expression } => ExpressionStatement {
            expression: f(*expression),
        },
        VariableDeclaration { kind, declarations } => VariableDeclaration {
            kind: *kind,
            declarations: declarations.iter().map(|&c| f(c)).collect(),
        },
        VariableDeclarator { id, init } => VariableDeclarator {
            id: f(*id),
            init: (*init).map(&mut f),
        },
        FunctionDeclaration {
            id,
            params,
            body,
            is_async,
            is_generator,
        } => FunctionDeclaration {
            id: f(*id),
            params: params.iter().map(|&c| f(c)).collect(),
            body: f(*body),
            is_async: *is_async,
            is_generator: *is_generator,
        },
        FunctionExpression {
            id,
            params,
            body,
            is_async,
            is_generator,
        } => FunctionExpression {
            id: (*id).map(&mut f),
            params: params.iter().map(|&c| f(c)).collect(),
            body: f(*body),
            is_async: *is_async,
            is_generator: *is_generator,
        },
        ArrowFunction {
            params,
            body,
            expression,
            is_async,
        } => ArrowFunction {
            params: params.iter().map(|&c| f(c)).collect(),
            body: f(*body),
            expression: *expression,
            is_async: *is_async,
        },
        Return { argument } => Return {
            argument: (*argument).map(&mut f),
        },
        If {
            test,
            consequent,
            alternate,
        } => If {
            test: f(*test),
            consequent: f(*consequent),
            alternate: (*alternate).map(&mut f),
        },
        While { test, body } => While {
            test: f(*test),
            body: f(*body),
        },
        DoWhile { body, test } => DoWhile {
            body: f(*body),
            test: f(*test),
        },
        For {
            init,
            test,
            update,
            body,
        } => For {
            init: (*init).map(&mut f),
            test: (*test).map(&mut f),
            update: (*update).map(&mut f),
            body: f(*body),
        },
        Break { label } => Break {
            label: label.clone(),
        },
        Continue { label } => Continue {
            label: label.clone(),
        },
        Labeled { label, body } => Labeled {
            label: label.clone(),
            body: f(*body),
        },
        Switch {
            discriminant,
            cases,
        } => Switch {
            discriminant: f(*discriminant),
            cases: cases.iter().map(|&c| f(c)).collect(),
        },
        SwitchCase { test, body } => SwitchCase {
            test: (*test).map(&mut f),
            body: body.iter().map(|&c| f(c)).collect(),
        },
        Throw { argument } => Throw {
            argument: f(*argument),
        },
        Try {
            block,
            handler_param,
            handler,
            finalizer,
        } => Try {
            block: f(*block),
            handler_param: (*handler_param).map(&mut f),
            handler: (*handler).map(&mut f),
            finalizer: (*finalizer).map(&mut f),
        },
        EmptyStatement => EmptyStatement,
        Identifier { name } => Identifier { name: name.clone() },
        Literal { value } => Literal {
            value: value.clone(),
        },
        Binary { op, left, right } => Binary {
            op: *op,
            left: f(*left),
            right: f(*right),
        },
        Unary { op, argument } => Unary {
            op: *op,
            argument: f(*argument),
        },
        Update {
            op,
            argument,
            prefix,
        } => Update {
            op: *op,
            argument: f(*argument),
            prefix: *prefix,
        },
        Logical { op, left, right } => Logical {
            op: *op,
            left: f(*left),
            right: f(*right),
        },
        Conditional {
            test,
            consequent,
            alternate,
        } => Conditional {
            test: f(*test),
            consequent: f(*consequent),
            alternate: f(*alternate),
        },
        Assignment { op, target, value } => Assignment {
            op: *op,
            target: f(*target),
            value: f(*value),
        },
        Call {
            callee,
            arguments,
            optional,
        } => Call {
            callee: f(*callee),
            arguments: arguments.iter().map(|&c| f(c)).collect(),
            optional: *optional,
        },
        New { callee, arguments } => New {
            callee: f(*callee),
            arguments: arguments.iter().map(|&c| f(c)).collect(),
        },
        Member {
            object,
            property,
            computed,
            optional,
        } => Member {
            object: f(*object),
            property: f(*property),
            computed: *computed,
            optional: *optional,
        },
        ArrayLit { elements } => ArrayLit {
            elements: elements.iter().map(|e| (*e).map(&mut f)).collect(),
        },
        ObjectLit { properties } => ObjectLit {
            properties: properties.iter().map(|&c| f(c)).collect(),
        },
        Property {
            key,
            value,
            computed,
            shorthand,
        } => Property {
            key: f(*key),
            value: f(*value),
            computed: *computed,
            shorthand: *shorthand,
        },
        Sequence { expressions } => Sequence {
            expressions: expressions.iter().map(|&c| f(c)).collect(),
        },
        Phi { target, operands } => Phi {
            target: f(*target),
            operands: operands
                .iter()
                .map(|op| super::node::PhiOperand {
                    block: op.block,
                    value: f(op.value),
                })
                .collect(),
        },
        SsaName { name, version } => SsaName {
            name: name.clone(),
            version: *version,
        },
    }
}

/// Variable name bound by a declarator's pattern, when it is a plain name
pub fn pattern_name<'m>(map: &'m NodeMap, declarator: NodeId) -> Option<&'m str> {
    match &map.get(&declarator)?.kind {
        NodeKind::VariableDeclarator { id, .. } => map.get(id)?.kind.variable_name(),
        other => other.variable_name(),
    }
}

/// Literal payload of a node, when it is a literal
pub fn literal_value(map: &NodeMap, id: NodeId) -> Option<&LiteralValue> {
    match &map.get(&id)?.kind {
        NodeKind::Literal { value } => Some(value),
        _ => None,
    }
}

/// Whether two nodes name the same variable (by name, not identity)
pub fn same_identifier(map: &NodeMap, a: NodeId, b: NodeId) -> bool {
    match (map.get(&a), map.get(&b)) {
        (Some(na), Some(nb)) => match (na.kind.variable_name(), nb.kind.variable_name()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotone_identity() {
        let mut factory = NodeFactory::new();
        let a = factory.identifier("a");
        let b = factory.identifier("b");
        assert!(a.id < b.id);

        // Fresh factory restarts the sequence
        let mut factory2 = NodeFactory::new();
        let a2 = factory2.identifier("a");
        assert_eq!(a2.id, a.id);
    }

    #[test]
    fn test_clone_subtree_fresh_ids() {
        let mut factory = NodeFactory::new();
        let mut map = NodeMap::default();

        let one = factory.number(1.0);
        let two = factory.number(2.0);
        let sum = factory.binary(BinaryOp::Add, one.id, two.id);
        let root = sum.id;
        for n in [one, two, sum] {
            map.insert(n.id, n);
        }

        let cloned = factory.clone_subtree(&mut map, root);
        assert_ne!(cloned, root);
        assert!(crate::shared::models::node::structural_eq(
            &map, root, &map, cloned
        ));
    }

    #[test]
    fn test_pattern_name() {
        let mut factory = NodeFactory::new();
        let mut map = NodeMap::default();
        let id = factory.identifier("count");
        let init = factory.number(0.0);
        let decl = factory.variable_declarator(id.id, Some(init.id));
        let decl_id = decl.id;
        for n in [id, init, decl] {
            map.insert(n.id, n);
        }
        assert_eq!(pattern_name(&map, decl_id), Some("count"));
    }
}
