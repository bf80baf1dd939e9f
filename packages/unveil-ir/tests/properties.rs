//! Property-based checks for the analysis foundations

use proptest::prelude::*;

use unveil_ir::features::dominance;
use unveil_ir::features::parsing::parse_source;
use unveil_ir::features::printing::print_program;
use unveil_ir::shared::models::node::BinaryOp;
use unveil_ir::shared::models::{Cfg, EdgeKind, IrState, NodeFactory, NodeId, NodeMap};

/// A tiny expression language the generator understands
#[derive(Debug, Clone)]
enum Expr {
    Num(u16),
    Var(u8),
    Bin(usize, Box<Expr>, Box<Expr>),
}

const OPS: [BinaryOp; 8] = [
    BinaryOp::Add,
    BinaryOp::Sub,
    BinaryOp::Mul,
    BinaryOp::BitAnd,
    BinaryOp::BitOr,
    BinaryOp::BitXor,
    BinaryOp::Lt,
    BinaryOp::StrictEq,
];

fn arb_expr() -> impl Strategy<Value = Expr> {
    let leaf = prop_oneof![
        (0u16..1000).prop_map(Expr::Num),
        (0u8..3).prop_map(Expr::Var),
    ];
    leaf.prop_recursive(4, 24, 2, |inner| {
        (0usize..OPS.len(), inner.clone(), inner)
            .prop_map(|(op, l, r)| Expr::Bin(op, Box::new(l), Box::new(r)))
    })
}

fn build(expr: &Expr, factory: &mut NodeFactory, map: &mut NodeMap) -> NodeId {
    match expr {
        Expr::Num(n) => {
            let node = factory.number(*n as f64);
            let id = node.id;
            map.insert(id, node);
            id
        }
        Expr::Var(v) => {
            let name = ["a", "b", "c"][*v as usize % 3];
            let node = factory.identifier(name);
            let id = node.id;
            map.insert(id, node);
            id
        }
        Expr::Bin(op, l, r) => {
            let left = build(l, factory, map);
            let right = build(r, factory, map);
            let node = factory.binary(OPS[*op % OPS.len()], left, right);
            let id = node.id;
            map.insert(id, node);
            id
        }
    }
}

/// Every node in the map is referenced at most once from the tree
/// reachable from the program root
#[test]
fn node_map_references_are_unique() {
    let sources = [
        "var a = 1; var b = a; console.log(b + 2);",
        "function f(x) { if (x) { return 1; } return 2; } use(f(0));",
        "var s = 0; while (s != 3) { switch (s) { case 0: s = 3; break; } }",
    ];
    for src in sources {
        let lowered = parse_source(src, "p1.js").unwrap();
        let state = IrState::new(lowered.nodes, lowered.root, lowered.factory);
        let mut counts: std::collections::HashMap<NodeId, usize> = std::collections::HashMap::new();
        let mut stack = vec![state.root];
        while let Some(id) = stack.pop() {
            if let Some(kind) = state.kind(id) {
                for child in kind.children() {
                    *counts.entry(child).or_insert(0) += 1;
                    stack.push(child);
                }
            }
        }
        for (id, n) in counts {
            assert!(n <= 1, "node {id} referenced {n} times in `{src}`");
        }
    }
}

proptest! {
    /// Printing an arbitrary expression, reparsing, and printing again is
    /// a fixed point: parenthesization is faithful
    #[test]
    fn printer_parse_print_fixed_point(expr in arb_expr()) {
        let mut factory = NodeFactory::new();
        let mut map = NodeMap::default();
        let root_expr = build(&expr, &mut factory, &mut map);
        let stmt = factory.expression_statement(root_expr);
        let stmt_id = stmt.id;
        map.insert(stmt_id, stmt);
        let program = factory.program(vec![stmt_id], false);
        let root = program.id;
        map.insert(root, program);
        let state = IrState::new(map, root, factory);

        let once = print_program(&state);
        let lowered = parse_source(&once, "prop.js").unwrap();
        let reparsed = IrState::new(lowered.nodes, lowered.root, lowered.factory);
        let twice = print_program(&reparsed);
        prop_assert_eq!(once, twice);
    }

    /// On arbitrary graphs the dominance engine keeps its invariants:
    /// entry dominates every reachable block, every block dominates
    /// itself, and immediate dominators are strict dominators
    #[test]
    fn dominance_invariants_on_random_graphs(
        n in 2usize..10,
        edges in proptest::collection::vec((0usize..10, 0usize..10), 1..25),
    ) {
        let mut cfg = Cfg::new();
        for _ in 1..n {
            cfg.new_block();
        }
        cfg.exit = unveil_ir::shared::models::BlockId((n - 1) as u32);
        for (u, v) in edges {
            let (u, v) = (u % n, v % n);
            cfg.add_edge(
                unveil_ir::shared::models::BlockId(u as u32),
                unveil_ir::shared::models::BlockId(v as u32),
                EdgeKind::Unconditional,
            );
        }
        dominance::compute(&mut cfg);

        let entry = cfg.entry;
        for block in &cfg.blocks {
            if block.reachable {
                prop_assert!(block.dominators.contains(&entry),
                    "entry must dominate reachable {}", block.id);
                prop_assert!(block.dominators.contains(&block.id));
                if let Some(idom) = block.idom {
                    prop_assert!(idom != block.id);
                    prop_assert!(block.dominators.contains(&idom));
                }
            }
        }
    }
}
