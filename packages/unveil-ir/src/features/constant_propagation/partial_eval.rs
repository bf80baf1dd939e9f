//! Bounded compile-time evaluation of pure calls
//!
//! A tiny interpreter over the IR: parameters bind to the literal
//! arguments, locals live in an environment, every statement and
//! expression costs a step. Anything outside the supported fragment, any
//! missing binding, or running out of steps answers `None` and the call
//! site stays untouched.

use rustc_hash::FxHashMap;

use crate::features::eval::js_value::{eval_binary, eval_unary, JsValue};
use crate::shared::models::node::{AssignOp, LogicalOp, NodeId, NodeKind};
use crate::shared::models::IrState;

/// Evaluate a call to `function` with literal `args`; the caller has
/// already established the function's effect summary is empty
pub fn evaluate_pure_call(
    state: &IrState,
    function: NodeId,
    args: &[JsValue],
    step_bound: usize,
) -> Option<JsValue> {
    let (params, body) = match state.kind(function) {
        Some(NodeKind::FunctionDeclaration { params, body, .. })
        | Some(NodeKind::FunctionExpression { params, body, .. }) => (params.clone(), *body),
        Some(NodeKind::ArrowFunction {
            params,
            body,
            expression,
            ..
        }) => {
            if *expression {
                // Expression-bodied arrow: evaluate directly
                let mut env = bind_params(state, params, args)?;
                let mut interp = Interpreter {
                    state,
                    steps: step_bound,
                };
                return interp.eval(*body, &mut env);
            }
            (params.clone(), *body)
        }
        _ => return None,
    };

    let mut env = bind_params(state, &params, args)?;
    let mut interp = Interpreter {
        state,
        steps: step_bound,
    };
    match interp.exec_block(body, &mut env)? {
        Flow::Return(value) => Some(value),
        Flow::Normal => Some(JsValue::Undefined),
        Flow::Break | Flow::Continue => None,
    }
}

fn bind_params(
    state: &IrState,
    params: &[NodeId],
    args: &[JsValue],
) -> Option<FxHashMap<String, JsValue>> {
    let mut env = FxHashMap::default();
    for (i, &param) in params.iter().enumerate() {
        let name = state.kind(param).and_then(NodeKind::variable_name)?;
        let value = args.get(i).cloned().unwrap_or(JsValue::Undefined);
        env.insert(name.to_string(), value);
    }
    Some(env)
}

enum Flow {
    Normal,
    Return(JsValue),
    Break,
    Continue,
}

struct Interpreter<'s> {
    state: &'s IrState,
    steps: usize,
}

impl<'s> Interpreter<'s> {
    fn step(&mut self) -> Option<()> {
        if self.steps == 0 {
            return None;
        }
        self.steps -= 1;
        Some(())
    }

    fn exec_block(&mut self, block: NodeId, env: &mut FxHashMap<String, JsValue>) -> Option<Flow> {
        let stmts = match self.state.kind(block) {
            Some(NodeKind::Block { body }) => body.clone(),
            _ => return None,
        };
        for stmt in stmts {
            match self.exec(stmt, env)? {
                Flow::Normal => {}
                other => return Some(other),
            }
        }
        Some(Flow::Normal)
    }

    fn exec(&mut self, stmt: NodeId, env: &mut FxHashMap<String, JsValue>) -> Option<Flow> {
        self.step()?;
        match self.state.kind(stmt).cloned()? {
            NodeKind::VariableDeclaration { declarations, .. } => {
                for decl in declarations {
                    if let Some(NodeKind::VariableDeclarator { id, init }) =
                        self.state.kind(decl).cloned()
                    {
                        let name = self
                            .state
                            .kind(id)
                            .and_then(NodeKind::variable_name)?
                            .to_string();
                        let value = match init {
                            Some(init) => self.eval(init, env)?,
                            None => JsValue::Undefined,
                        };
                        env.insert(name, value);
                    }
                }
                Some(Flow::Normal)
            }
            NodeKind::ExpressionStatement { expression } => {
                self.eval(expression, env)?;
                Some(Flow::Normal)
            }
            NodeKind::Return { argument } => {
                let value = match argument {
                    Some(arg) => self.eval(arg, env)?,
                    None => JsValue::Undefined,
                };
                Some(Flow::Return(value))
            }
            NodeKind::If {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, env)?.truthy() {
                    self.exec(consequent, env)
                } else if let Some(alt) = alternate {
                    self.exec(alt, env)
                } else {
                    Some(Flow::Normal)
                }
            }
            NodeKind::Block { .. } => self.exec_block(stmt, env),
            NodeKind::While { test, body } => {
                loop {
                    self.step()?;
                    if !self.eval(test, env)?.truthy() {
                        break;
                    }
                    match self.exec(body, env)? {
                        Flow::Normal | Flow::Continue => {}
                        Flow::Break => break,
                        ret @ Flow::Return(_) => return Some(ret),
                    }
                }
                Some(Flow::Normal)
            }
            NodeKind::Break { label: None } => Some(Flow::Break),
            NodeKind::Continue { label: None } => Some(Flow::Continue),
            NodeKind::EmptyStatement => Some(Flow::Normal),
            _ => None,
        }
    }

    fn eval(&mut self, expr: NodeId, env: &mut FxHashMap<String, JsValue>) -> Option<JsValue> {
        self.step()?;
        match self.state.kind(expr).cloned()? {
            NodeKind::Literal { value } => JsValue::from_literal(&value),
            NodeKind::Identifier { name } | NodeKind::SsaName { name, .. } => {
                if name == "undefined" {
                    return Some(JsValue::Undefined);
                }
                env.get(&name).cloned()
            }
            NodeKind::Binary { op, left, right } => {
                let l = self.eval(left, env)?;
                let r = self.eval(right, env)?;
                eval_binary(op, &l, &r)
            }
            NodeKind::Unary { op, argument } => {
                let v = self.eval(argument, env)?;
                eval_unary(op, &v)
            }
            NodeKind::Logical { op, left, right } => {
                let l = self.eval(left, env)?;
                match (op, l.truthy()) {
                    (LogicalOp::And, false) | (LogicalOp::Or, true) => Some(l),
                    (LogicalOp::Nullish, _)
                        if !matches!(l, JsValue::Null | JsValue::Undefined) =>
                    {
                        Some(l)
                    }
                    _ => self.eval(right, env),
                }
            }
            NodeKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, env)?.truthy() {
                    self.eval(consequent, env)
                } else {
                    self.eval(alternate, env)
                }
            }
            NodeKind::Assignment {
                op: AssignOp::Assign,
                target,
                value,
            } => {
                let name = self
                    .state
                    .kind(target)
                    .and_then(NodeKind::variable_name)?
                    .to_string();
                if !env.contains_key(&name) {
                    // Writing anything but a local would be an effect
                    return None;
                }
                let v = self.eval(value, env)?;
                env.insert(name, v.clone());
                Some(v)
            }
            NodeKind::Sequence { expressions } => {
                let mut last = JsValue::Undefined;
                for e in expressions {
                    last = self.eval(e, env)?;
                }
                Some(last)
            }
            // Calls, member access, object allocation: outside the pure
            // fragment
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::parsing::parse_source;

    fn state_with_fn(src: &str) -> (IrState, NodeId) {
        let lowered = parse_source(src, "test.js").unwrap();
        let state = IrState::new(lowered.nodes, lowered.root, lowered.factory);
        let func = state
            .program_body()
            .into_iter()
            .find(|&s| matches!(state.kind(s), Some(NodeKind::FunctionDeclaration { .. })))
            .unwrap();
        (state, func)
    }

    #[test]
    fn test_evaluates_arithmetic_function() {
        let (state, func) = state_with_fn("function add(a, b) { return a + b; }");
        let result = evaluate_pure_call(
            &state,
            func,
            &[JsValue::Number(2.0), JsValue::Number(3.0)],
            256,
        );
        assert_eq!(result, Some(JsValue::Number(5.0)));
    }

    #[test]
    fn test_evaluates_branching_function() {
        let (state, func) =
            state_with_fn("function pick(n) { if (n > 0) { return 'pos'; } return 'neg'; }");
        assert_eq!(
            evaluate_pure_call(&state, func, &[JsValue::Number(4.0)], 256),
            Some(JsValue::Str("pos".into()))
        );
        assert_eq!(
            evaluate_pure_call(&state, func, &[JsValue::Number(-4.0)], 256),
            Some(JsValue::Str("neg".into()))
        );
    }

    #[test]
    fn test_loop_respects_step_bound() {
        let (state, func) = state_with_fn(
            "function spin(n) { var t = 0; while (t < n) { t = t + 1; } return t; }",
        );
        // Small input finishes
        assert_eq!(
            evaluate_pure_call(&state, func, &[JsValue::Number(5.0)], 256),
            Some(JsValue::Number(5.0))
        );
        // A loop that cannot finish inside the bound is refused
        assert_eq!(
            evaluate_pure_call(&state, func, &[JsValue::Number(1e9)], 256),
            None
        );
    }

    #[test]
    fn test_calls_are_outside_the_fragment() {
        let (state, func) = state_with_fn("function f(x) { return g(x); }");
        assert_eq!(
            evaluate_pure_call(&state, func, &[JsValue::Number(1.0)], 256),
            None
        );
    }
}
