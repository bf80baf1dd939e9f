//! IR node model
//!
//! The IR is a closed tagged variant covering the ECMAScript subset the
//! pipeline supports. Nodes carry a stable identity and live in a flat
//! node map; containment is derived by walking from the program root,
//! never through parent pointers. A transformation that "modifies" a node
//! replaces the map entry under the same identity.

use serde::{Deserialize, Serialize};

use super::cfg::BlockId;
use super::span::Span;

/// Stable node identity, unique within an analysis run
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// The node map is the single source of truth for IR contents
pub type NodeMap = rustc_hash::FxHashMap<NodeId, IrNode>;

/// Declaration kind discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeclKind {
    Var,
    Let,
    Const,
}

impl DeclKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeclKind::Var => "var",
            DeclKind::Let => "let",
            DeclKind::Const => "const",
        }
    }
}

/// Binary operators (arithmetic, bitwise, comparison)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    UShr,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    In,
    Instanceof,
}

impl BinaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::UShr => ">>>",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::StrictEq => "===",
            BinaryOp::StrictNotEq => "!==",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::In => "in",
            BinaryOp::Instanceof => "instanceof",
        }
    }

    pub fn from_str(op: &str) -> Option<Self> {
        Some(match op {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "%" => BinaryOp::Rem,
            "&" => BinaryOp::BitAnd,
            "|" => BinaryOp::BitOr,
            "^" => BinaryOp::BitXor,
            "<<" => BinaryOp::Shl,
            ">>" => BinaryOp::Shr,
            ">>>" => BinaryOp::UShr,
            "==" => BinaryOp::Eq,
            "!=" => BinaryOp::NotEq,
            "===" => BinaryOp::StrictEq,
            "!==" => BinaryOp::StrictNotEq,
            "<" => BinaryOp::Lt,
            "<=" => BinaryOp::LtEq,
            ">" => BinaryOp::Gt,
            ">=" => BinaryOp::GtEq,
            "in" => BinaryOp::In,
            "instanceof" => BinaryOp::Instanceof,
            _ => return None,
        })
    }

    /// Comparison operators produce booleans
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::StrictEq
                | BinaryOp::StrictNotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
        )
    }

    pub fn is_bitwise(&self) -> bool {
        matches!(
            self,
            BinaryOp::BitAnd
                | BinaryOp::BitOr
                | BinaryOp::BitXor
                | BinaryOp::Shl
                | BinaryOp::Shr
                | BinaryOp::UShr
        )
    }
}

/// Unary operators (always prefix)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Minus,
    Plus,
    Not,
    BitNot,
    Typeof,
    Void,
    Delete,
}

impl UnaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnaryOp::Minus => "-",
            UnaryOp::Plus => "+",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
            UnaryOp::Typeof => "typeof",
            UnaryOp::Void => "void",
            UnaryOp::Delete => "delete",
        }
    }

    pub fn from_str(op: &str) -> Option<Self> {
        Some(match op {
            "-" => UnaryOp::Minus,
            "+" => UnaryOp::Plus,
            "!" => UnaryOp::Not,
            "~" => UnaryOp::BitNot,
            "typeof" => UnaryOp::Typeof,
            "void" => UnaryOp::Void,
            "delete" => UnaryOp::Delete,
            _ => return None,
        })
    }
}

/// `++` / `--`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateOp {
    Increment,
    Decrement,
}

impl UpdateOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateOp::Increment => "++",
            UpdateOp::Decrement => "--",
        }
    }
}

/// Short-circuit operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

impl LogicalOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalOp::And => "&&",
            LogicalOp::Or => "||",
            LogicalOp::Nullish => "??",
        }
    }
}

/// Assignment operators, `=` plus the augmented forms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    UShr,
}

impl AssignOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignOp::Assign => "=",
            AssignOp::Add => "+=",
            AssignOp::Sub => "-=",
            AssignOp::Mul => "*=",
            AssignOp::Div => "/=",
            AssignOp::Rem => "%=",
            AssignOp::BitAnd => "&=",
            AssignOp::BitOr => "|=",
            AssignOp::BitXor => "^=",
            AssignOp::Shl => "<<=",
            AssignOp::Shr => ">>=",
            AssignOp::UShr => ">>>=",
        }
    }

    pub fn from_str(op: &str) -> Option<Self> {
        Some(match op {
            "=" => AssignOp::Assign,
            "+=" => AssignOp::Add,
            "-=" => AssignOp::Sub,
            "*=" => AssignOp::Mul,
            "/=" => AssignOp::Div,
            "%=" => AssignOp::Rem,
            "&=" => AssignOp::BitAnd,
            "|=" => AssignOp::BitOr,
            "^=" => AssignOp::BitXor,
            "<<=" => AssignOp::Shl,
            ">>=" => AssignOp::Shr,
            ">>>=" => AssignOp::UShr,
            _ => return None,
        })
    }

    /// The binary operator an augmented assignment desugars to
    pub fn binary_op(&self) -> Option<BinaryOp> {
        Some(match self {
            AssignOp::Assign => return None,
            AssignOp::Add => BinaryOp::Add,
            AssignOp::Sub => BinaryOp::Sub,
            AssignOp::Mul => BinaryOp::Mul,
            AssignOp::Div => BinaryOp::Div,
            AssignOp::Rem => BinaryOp::Rem,
            AssignOp::BitAnd => BinaryOp::BitAnd,
            AssignOp::BitOr => BinaryOp::BitOr,
            AssignOp::BitXor => BinaryOp::BitXor,
            AssignOp::Shl => BinaryOp::Shl,
            AssignOp::Shr => BinaryOp::Shr,
            AssignOp::UShr => BinaryOp::UShr,
        })
    }
}

/// Literal values, discriminated by their original kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LiteralValue {
    String(String),
    Number(f64),
    Boolean(bool),
    Null,
    BigInt(String),
    Regex { pattern: String, flags: String },
}

impl LiteralValue {
    pub fn kind_str(&self) -> &'static str {
        match self {
            LiteralValue::String(_) => "string",
            LiteralValue::Number(_) => "number",
            LiteralValue::Boolean(_) => "boolean",
            LiteralValue::Null => "null",
            LiteralValue::BigInt(_) => "bigint",
            LiteralValue::Regex { .. } => "regex",
        }
    }

    /// ECMAScript truthiness; `None` when the literal kind has no static
    /// boolean interpretation (regex objects are always truthy, so those
    /// do resolve)
    pub fn truthiness(&self) -> Option<bool> {
        Some(match self {
            LiteralValue::String(s) => !s.is_empty(),
            LiteralValue::Number(n) => *n != 0.0 && !n.is_nan(),
            LiteralValue::Boolean(b) => *b,
            LiteralValue::Null => false,
            LiteralValue::BigInt(digits) => digits.trim_start_matches('-') != "0",
            LiteralValue::Regex { .. } => true,
        })
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            LiteralValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Integer value when the literal is a number with no fractional part
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            LiteralValue::Number(n) if n.fract() == 0.0 && n.is_finite() => Some(*n as i64),
            _ => None,
        }
    }
}

/// Operand of a φ-node, tagged with the predecessor it flows from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhiOperand {
    pub block: BlockId,
    pub value: NodeId,
}

/// The closed set of IR node kinds
///
/// Children are held by `NodeId`; the flat node map owns the nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    Program {
        body: Vec<NodeId>,
        module: bool,
    },
    Block {
        body: Vec<NodeId>,
    },
    ExpressionStatement {
        expression: NodeId,
    },
    VariableDeclaration {
        kind: DeclKind,
        declarations: Vec<NodeId>,
    },
    VariableDeclarator {
        id: NodeId,
        init: Option<NodeId>,
    },
    FunctionDeclaration {
        id: NodeId,
        params: Vec<NodeId>,
        body: NodeId,
        is_async: bool,
        is_generator: bool,
    },
    FunctionExpression {
        id: Option<NodeId>,
        params: Vec<NodeId>,
        body: NodeId,
        is_async: bool,
        is_generator: bool,
    },
    ArrowFunction {
        params: Vec<NodeId>,
        body: NodeId,
        /// true when the body is an expression rather than a block
        expression: bool,
        is_async: bool,
    },
    Return {
        argument: Option<NodeId>,
    },
    If {
        test: NodeId,
        consequent: NodeId,
        alternate: Option<NodeId>,
    },
    While {
        test: NodeId,
        body: NodeId,
    },
    DoWhile {
        body: NodeId,
        test: NodeId,
    },
    For {
        init: Option<NodeId>,
        test: Option<NodeId>,
        update: Option<NodeId>,
        body: NodeId,
    },
    Break {
        label: Option<String>,
    },
    Continue {
        label: Option<String>,
    },
    Labeled {
        label: String,
        body: NodeId,
    },
    Switch {
        discriminant: NodeId,
        cases: Vec<NodeId>,
    },
    SwitchCase {
        /// `None` for the default case
        test: Option<NodeId>,
        body: Vec<NodeId>,
    },
    Throw {
        argument: NodeId,
    },
    Try {
        block: NodeId,
        handler_param: Option<NodeId>,
        handler: Option<NodeId>,
        finalizer: Option<NodeId>,
    },
    EmptyStatement,
    Identifier {
        name: String,
    },
    Literal {
        value: LiteralValue,
    },
    Binary {
        op: BinaryOp,
        left: NodeId,
        right: NodeId,
    },
    Unary {
        op: UnaryOp,
        argument: NodeId,
    },
    Update {
        op: UpdateOp,
        argument: NodeId,
        prefix: bool,
    },
    Logical {
        op: LogicalOp,
        left: NodeId,
        right: NodeId,
    },
    Conditional {
        test: NodeId,
        consequent: NodeId,
        alternate: NodeId,
    },
    Assignment {
        op: AssignOp,
        target: NodeId,
        value: NodeId,
    },
    Call {
        callee: NodeId,
        arguments: Vec<NodeId>,
        optional: bool,
    },
    New {
        callee: NodeId,
        arguments: Vec<NodeId>,
    },
    Member {
        object: NodeId,
        property: NodeId,
        computed: bool,
        optional: bool,
    },
    ArrayLit {
        /// `None` entries are elisions (`[1, , 3]`)
        elements: Vec<Option<NodeId>>,
    },
    ObjectLit {
        properties: Vec<NodeId>,
    },
    Property {
        key: NodeId,
        value: NodeId,
        computed: bool,
        shorthand: bool,
    },
    Sequence {
        expressions: Vec<NodeId>,
    },
    /// Merge-point pseudo-instruction; exists only while SSA form is live
    Phi {
        target: NodeId,
        operands: Vec<PhiOperand>,
    },
    /// Versioned identifier; exists only while SSA form is live
    SsaName {
        name: String,
        version: u32,
    },
}

impl NodeKind {
    pub fn kind_name(&self) -> &'static str {
        match self {
            NodeKind::Program { .. } => "program",
            NodeKind::Block { .. } => "block",
            NodeKind::ExpressionStatement { .. } => "expression_statement",
            NodeKind::VariableDeclaration { .. } => "variable_declaration",
            NodeKind::VariableDeclarator { .. } => "variable_declarator",
            NodeKind::FunctionDeclaration { .. } => "function_declaration",
            NodeKind::FunctionExpression { .. } => "function_expression",
            NodeKind::ArrowFunction { .. } => "arrow_function",
            NodeKind::Return { .. } => "return",
            NodeKind::If { .. } => "if",
            NodeKind::While { .. } => "while",
            NodeKind::DoWhile { .. } => "do_while",
            NodeKind::For { .. } => "for",
            NodeKind::Break { .. } => "break",
            NodeKind::Continue { .. } => "continue",
            NodeKind::Labeled { .. } => "labeled",
            NodeKind::Switch { .. } => "switch",
            NodeKind::SwitchCase { .. } => "switch_case",
            NodeKind::Throw { .. } => "throw",
            NodeKind::Try { .. } => "try",
            NodeKind::EmptyStatement => "empty_statement",
            NodeKind::Identifier { .. } => "identifier",
            NodeKind::Literal { .. } => "literal",
            NodeKind::Binary { .. } => "binary",
            NodeKind::Unary { .. } => "unary",
            NodeKind::Update { .. } => "update",
            NodeKind::Logical { .. } => "logical",
            NodeKind::Conditional { .. } => "conditional",
            NodeKind::Assignment { .. } => "assignment",
            NodeKind::Call { .. } => "call",
            NodeKind::New { .. } => "new",
            NodeKind::Member { .. } => "member",
            NodeKind::ArrayLit { .. } => "array",
            NodeKind::ObjectLit { .. } => "object",
            NodeKind::Property { .. } => "property",
            NodeKind::Sequence { .. } => "sequence",
            NodeKind::Phi { .. } => "phi",
            NodeKind::SsaName { .. } => "ssa_name",
        }
    }

    pub fn is_statement(&self) -> bool {
        matches!(
            self,
            NodeKind::Block { .. }
                | NodeKind::ExpressionStatement { .. }
                | NodeKind::VariableDeclaration { .. }
                | NodeKind::FunctionDeclaration { .. }
                | NodeKind::Return { .. }
                | NodeKind::If { .. }
                | NodeKind::While { .. }
                | NodeKind::DoWhile { .. }
                | NodeKind::For { .. }
                | NodeKind::Break { .. }
                | NodeKind::Continue { .. }
                | NodeKind::Labeled { .. }
                | NodeKind::Switch { .. }
                | NodeKind::Throw { .. }
                | NodeKind::Try { .. }
                | NodeKind::EmptyStatement
        )
    }

    pub fn is_expression(&self) -> bool {
        matches!(
            self,
            NodeKind::Identifier { .. }
                | NodeKind::Literal { .. }
                | NodeKind::Binary { .. }
                | NodeKind::Unary { .. }
                | NodeKind::Update { .. }
                | NodeKind::Logical { .. }
                | NodeKind::Conditional { .. }
                | NodeKind::Assignment { .. }
                | NodeKind::Call { .. }
                | NodeKind::New { .. }
                | NodeKind::Member { .. }
                | NodeKind::ArrayLit { .. }
                | NodeKind::ObjectLit { .. }
                | NodeKind::FunctionExpression { .. }
                | NodeKind::ArrowFunction { .. }
                | NodeKind::Sequence { .. }
                | NodeKind::SsaName { .. }
        )
    }

    /// Statements that end a basic block
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            NodeKind::Return { .. }
                | NodeKind::Break { .. }
                | NodeKind::Continue { .. }
                | NodeKind::Throw { .. }
        )
    }

    /// Identifier or SSA-identifier name, when this node names a variable
    pub fn variable_name(&self) -> Option<&str> {
        match self {
            NodeKind::Identifier { name } => Some(name),
            NodeKind::SsaName { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Ordered children in left-to-right evaluation order
    pub fn children(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.for_each_child(|id| out.push(id));
        out
    }

    pub fn for_each_child(&self, mut f: impl FnMut(NodeId)) {
        match self {
            NodeKind::Program { body, .. } | NodeKind::Block { body } => {
                body.iter().copied().for_each(&mut f)
            }
            NodeKind::ExpressionStatement { expression } => f(*expression),
            NodeKind::VariableDeclaration { declarations, .. } => {
                declarations.iter().copied().for_each(&mut f)
            }
            NodeKind::VariableDeclarator { id, init } => {
                f(*id);
                if let Some(init) = init {
                    f(*init);
                }
            }
            NodeKind::FunctionDeclaration {
                id, params, body, ..
            } => {
                f(*id);
                params.iter().copied().for_each(&mut f);
                f(*body);
            }
            NodeKind::FunctionExpression {
                id, params, body, ..
            } => {
                if let Some(id) = id {
                    f(*id);
                }
                params.iter().copied().for_each(&mut f);
                f(*body);
            }
            NodeKind::ArrowFunction { params, body, .. } => {
                params.iter().copied().for_each(&mut f);
                f(*body);
            }
            NodeKind::Return { argument } => {
                if let Some(argument) = argument {
                    f(*argument);
                }
            }
            NodeKind::If {
                test,
                consequent,
                alternate,
            } => {
                f(*test);
                f(*consequent);
                if let Some(alternate) = alternate {
                    f(*alternate);
                }
            }
            NodeKind::While { test, body } => {
                f(*test);
                f(*body);
            }
            NodeKind::DoWhile { body, test } => {
                f(*body);
                f(*test);
            }
            NodeKind::For {
                init,
                test,
                update,
                body,
            } => {
                if let Some(init) = init {
                    f(*init);
                }
                if let Some(test) = test {
                    f(*test);
                }
                if let Some(update) = update {
                    f(*update);
                }
                f(*body);
            }
            NodeKind::Break { .. } | NodeKind::Continue { .. } | NodeKind::EmptyStatement => {}
            NodeKind::Labeled { body, .. } => f(*body),
            NodeKind::Switch {
                discriminant,
                cases,
            } => {
                f(*discriminant);
                cases.iter().copied().for_each(&mut f);
            }
            NodeKind::SwitchCase { test, body } => {
                if let Some(test) = test {
                    f(*test);
                }
                body.iter().copied().for_each(&mut f);
            }
            NodeKind::Throw { argument } => f(*argument),
            NodeKind::Try {
                block,
                handler_param,
                handler,
                finalizer,
            } => {
                f(*block);
                if let Some(param) = handler_param {
                    f(*param);
                }
                if let Some(handler) = handler {
                    f(*handler);
                }
                if let Some(finalizer) = finalizer {
                    f(*finalizer);
                }
            }
            NodeKind::Identifier { .. }
            | NodeKind::Literal { .. }
            | NodeKind::SsaName { .. } => {}
            NodeKind::Binary { left, right, .. } | NodeKind::Logical { left, right, .. } => {
                f(*left);
                f(*right);
            }
            NodeKind::Unary { argument, .. } => f(*argument),
            NodeKind::Update { argument, .. } => f(*argument),
            NodeKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                f(*test);
                f(*consequent);
                f(*alternate);
            }
            NodeKind::Assignment { target, value, .. } => {
                f(*target);
                f(*value);
            }
            NodeKind::Call {
                callee, arguments, ..
            }
            | NodeKind::New { callee, arguments } => {
                f(*callee);
                arguments.iter().copied().for_each(&mut f);
            }
            NodeKind::Member {
                object, property, ..
            } => {
                f(*object);
                f(*property);
            }
            NodeKind::ArrayLit { elements } => {
                elements.iter().flatten().copied().for_each(&mut f)
            }
            NodeKind::ObjectLit { properties } => properties.iter().copied().for_each(&mut f),
            NodeKind::Property { key, value, .. } => {
                f(*key);
                f(*value);
            }
            NodeKind::Sequence { expressions } => expressions.iter().copied().for_each(&mut f),
            NodeKind::Phi { target, operands } => {
                f(*target);
                operands.iter().for_each(|op| f(op.value));
            }
        }
    }
}

/// An IR node: identity + kind + optional source location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrNode {
    pub id: NodeId,
    pub kind: NodeKind,
    pub span: Option<Span>,
}

impl IrNode {
    pub fn new(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            kind,
            span: None,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }
}

/// Identity-insensitive structural equality of two subtrees
///
/// Compares operator trees, literal values, names and shapes; ignores node
/// identities and source spans. Used by the round-trip and idempotence laws.
pub fn structural_eq(map_a: &NodeMap, a: NodeId, map_b: &NodeMap, b: NodeId) -> bool {
    let (na, nb) = match (map_a.get(&a), map_b.get(&b)) {
        (Some(na), Some(nb)) => (na, nb),
        _ => return false,
    };
    if std::mem::discriminant(&na.kind) != std::mem::discriminant(&nb.kind) {
        return false;
    }
    if !scalar_fields_eq(&na.kind, &nb.kind) {
        return false;
    }
    let (ca, cb) = (na.kind.children(), nb.kind.children());
    if ca.len() != cb.len() {
        return false;
    }
    ca.iter()
        .zip(cb.iter())
        .all(|(&x, &y)| structural_eq(map_a, x, map_b, y))
}

/// Compare the non-child payload of two same-variant kinds
fn scalar_fields_eq(a: &NodeKind, b: &NodeKind) -> bool {
    use NodeKind::*;
    match (a, b) {
        (Program { module: m1, .. }, Program { module: m2, .. }) => m1 == m2,
        (VariableDeclaration { kind: k1, .. }, VariableDeclaration { kind: k2, .. }) => k1 == k2,
        (
            FunctionDeclaration {
                is_async: a1,
                is_generator: g1,
                ..
            },
            FunctionDeclaration {
                is_async: a2,
                is_generator: g2,
                ..
            },
        ) => a1 == a2 && g1 == g2,
        (
            FunctionExpression {
                is_async: a1,
                is_generator: g1,
                ..
            },
            FunctionExpression {
                is_async: a2,
                is_generator: g2,
                ..
            },
        ) => a1 == a2 && g1 == g2,
        (
            ArrowFunction {
                expression: e1,
                is_async: a1,
                ..
            },
            ArrowFunction {
                expression: e2,
                is_async: a2,
                ..
            },
        ) => e1 == e2 && a1 == a2,
        (Break { label: l1 }, Break { label: l2 }) => l1 == l2,
        (Continue { label: l1 }, Continue { label: l2 }) => l1 == l2,
        (Labeled { label: l1, .. }, Labeled { label: l2, .. }) => l1 == l2,
        (Identifier { name: n1 }, Identifier { name: n2 }) => n1 == n2,
        (SsaName { name: n1, version: v1 }, SsaName { name: n2, version: v2 }) => {
            n1 == n2 && v1 == v2
        }
        (Literal { value: v1 }, Literal { value: v2 }) => v1 == v2,
        (Binary { op: o1, .. }, Binary { op: o2, .. }) => o1 == o2,
        (Unary { op: o1, .. }, Unary { op: o2, .. }) => o1 == o2,
        (
            Update {
                op: o1, prefix: p1, ..
            },
            Update {
                op: o2, prefix: p2, ..
            },
        ) => o1 == o2 && p1 == p2,
        (Logical { op: o1, .. }, Logical { op: o2, .. }) => o1 == o2,
        (Assignment { op: o1, .. }, Assignment { op: o2, .. }) => o1 == o2,
        (Call { optional: o1, .. }, Call { optional: o2, .. }) => o1 == o2,
        (
            Member {
                computed: c1,
                optional: o1,
                ..
            },
            Member {
                computed: c2,
                optional: o2,
                ..
            },
        ) => c1 == c2 && o1 == o2,
        (ArrayLit { elements: e1 }, ArrayLit { elements: e2 }) => {
            // Hole positions matter, not just present children
            e1.len() == e2.len()
                && e1
                    .iter()
                    .zip(e2.iter())
                    .all(|(x, y)| x.is_some() == y.is_some())
        }
        (
            Property {
                computed: c1,
                shorthand: s1,
                ..
            },
            Property {
                computed: c2,
                shorthand: s2,
                ..
            },
        ) => c1 == c2 && s1 == s2,
        (SwitchCase { test: t1, .. }, SwitchCase { test: t2, .. }) => {
            t1.is_some() == t2.is_some()
        }
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_op_round_trip() {
        for op in [
            BinaryOp::Add,
            BinaryOp::UShr,
            BinaryOp::StrictEq,
            BinaryOp::Instanceof,
        ] {
            assert_eq!(BinaryOp::from_str(op.as_str()), Some(op));
        }
    }

    #[test]
    fn test_literal_truthiness() {
        assert_eq!(LiteralValue::Number(0.0).truthiness(), Some(false));
        assert_eq!(LiteralValue::Number(3.0).truthiness(), Some(true));
        assert_eq!(LiteralValue::Number(f64::NAN).truthiness(), Some(false));
        assert_eq!(LiteralValue::String(String::new()).truthiness(), Some(false));
        assert_eq!(LiteralValue::String("x".into()).truthiness(), Some(true));
        assert_eq!(LiteralValue::Null.truthiness(), Some(false));
        assert_eq!(LiteralValue::BigInt("0".into()).truthiness(), Some(false));
    }

    #[test]
    fn test_statement_expression_split() {
        let ident = NodeKind::Identifier { name: "x".into() };
        assert!(ident.is_expression());
        assert!(!ident.is_statement());

        let ret = NodeKind::Return { argument: None };
        assert!(ret.is_statement());
        assert!(ret.is_terminator());
        assert!(!ret.is_expression());
    }

    #[test]
    fn test_children_evaluation_order() {
        let kind = NodeKind::Conditional {
            test: NodeId(1),
            consequent: NodeId(2),
            alternate: NodeId(3),
        };
        assert_eq!(kind.children(), vec![NodeId(1), NodeId(2), NodeId(3)]);
    }

    #[test]
    fn test_array_holes_skipped_in_children() {
        let kind = NodeKind::ArrayLit {
            elements: vec![Some(NodeId(1)), None, Some(NodeId(2))],
        };
        assert_eq!(kind.children(), vec![NodeId(1), NodeId(2)]);
    }
}
