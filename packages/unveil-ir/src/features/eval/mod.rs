//! Compile-time ECMAScript evaluation
//!
//! Shared by constant propagation (expression folding, partial
//! evaluation), opaque-predicate canonicalization, and the decoder
//! lifter. Follows IEEE 754 and the ECMAScript operator semantics:
//! ToInt32/ToUint32 for bitwise and shift operators, string coercion for
//! `+`, remainder with the dividend's sign.

pub mod js_value;

pub use js_value::{
    eval_binary_literal, eval_logical_literal, eval_unary_literal, number_to_string, to_int32,
    to_uint32, JsValue, LogicalFold,
};
