//! Sandbox execution trace model
//!
//! An immutable, ordered sequence of typed events produced by an external
//! sandboxed execution. Events carry IR correlation fields when the sandbox
//! could attribute them to a node. Consumed by the string-decoder lifting
//! pass; the pipeline runs fine without a trace.

use serde::{Deserialize, Serialize};

use super::node::NodeId;

/// Runtime value as observed by the sandbox
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum TraceValue {
    String(String),
    Number(f64),
    Boolean(bool),
    Null,
    Undefined,
    /// Anything the sandbox could not serialize (objects, functions)
    Opaque(String),
}

impl TraceValue {
    /// Key fragment used when grouping calls by argument tuple
    pub fn key_fragment(&self) -> String {
        match self {
            TraceValue::String(s) => format!("s:{s}"),
            TraceValue::Number(n) => format!("n:{n}"),
            TraceValue::Boolean(b) => format!("b:{b}"),
            TraceValue::Null => "null".to_string(),
            TraceValue::Undefined => "undefined".to_string(),
            TraceValue::Opaque(tag) => format!("o:{tag}"),
        }
    }

    /// Small arguments (short strings, small integers) are the signature of
    /// decoder-table lookups
    pub fn is_small(&self) -> bool {
        match self {
            TraceValue::Number(n) => n.fract() == 0.0 && n.abs() < 65536.0,
            TraceValue::String(s) => s.len() <= 64,
            TraceValue::Boolean(_) | TraceValue::Null | TraceValue::Undefined => true,
            TraceValue::Opaque(_) => false,
        }
    }
}

/// One observed event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    FunctionCall {
        /// Function name as observed at runtime
        name: String,
        args: Vec<TraceValue>,
        result: Option<TraceValue>,
        /// IR node of the function definition, when correlated
        function_node: Option<NodeId>,
        /// IR node of the call site, when correlated
        call_site: Option<NodeId>,
    },
    VariableAccess {
        name: String,
        value: TraceValue,
        node: Option<NodeId>,
    },
    StringOperation {
        method: String,
        input: String,
        output: String,
        node: Option<NodeId>,
    },
    ArrayOperation {
        method: String,
        node: Option<NodeId>,
    },
    ObjectOperation {
        method: String,
        node: Option<NodeId>,
    },
    ControlFlow {
        kind: String,
        node: Option<NodeId>,
    },
    ConstantDiscovery {
        value: TraceValue,
        node: Option<NodeId>,
    },
    SideEffect {
        kind: String,
        detail: String,
        node: Option<NodeId>,
    },
}

/// The whole trace, in observation order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionTrace {
    pub events: Vec<TraceEvent>,
}

impl ExecutionTrace {
    pub fn new(events: Vec<TraceEvent>) -> Self {
        Self { events }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// All function-call events, in order
    pub fn calls(&self) -> impl Iterator<Item = &TraceEvent> {
        self.events
            .iter()
            .filter(|e| matches!(e, TraceEvent::FunctionCall { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_round_trips_through_json() {
        let trace = ExecutionTrace::new(vec![TraceEvent::FunctionCall {
            name: "_0x2".into(),
            args: vec![TraceValue::Number(0.0)],
            result: Some(TraceValue::String("hello".into())),
            function_node: None,
            call_site: None,
        }]);
        let json = serde_json::to_string(&trace).unwrap();
        let back: ExecutionTrace = serde_json::from_str(&json).unwrap();
        assert_eq!(back.events.len(), 1);
        match &back.events[0] {
            TraceEvent::FunctionCall { name, result, .. } => {
                assert_eq!(name, "_0x2");
                assert_eq!(result, &Some(TraceValue::String("hello".into())));
            }
            _ => panic!("expected function call event"),
        }
    }

    #[test]
    fn test_small_argument_classification() {
        assert!(TraceValue::Number(3.0).is_small());
        assert!(!TraceValue::Number(1e9).is_small());
        assert!(TraceValue::String("k".into()).is_small());
        assert!(!TraceValue::Opaque("[object Object]".into()).is_small());
    }
}
