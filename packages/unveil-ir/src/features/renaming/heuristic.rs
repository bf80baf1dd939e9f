//! Name classification and generation heuristics

use once_cell::sync::Lazy;
use regex::Regex;

use crate::features::scopes::Binding;
use crate::shared::models::node::{LiteralValue, NodeKind};
use crate::shared::models::IrState;

static HEX_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^_0x[0-9a-fA-F]+$").expect("static regex"));
static DOLLAR_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^_\$[A-Za-z0-9]+$").expect("static regex"));
static HEX_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z$_]+_0x[0-9a-fA-F]{2,}$").expect("static regex"));
static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("static regex"));

const RESERVED: [&str; 38] = [
    "break", "case", "catch", "class", "const", "continue", "debugger", "default", "delete",
    "do", "else", "export", "extends", "finally", "for", "function", "if", "import", "in",
    "instanceof", "let", "new", "return", "super", "switch", "this", "throw", "try", "typeof",
    "var", "void", "while", "with", "yield", "enum", "await", "static", "undefined",
];

/// How obfuscated a name looks, as a prior in [0, 1]; `None` means the
/// name is fine as it is
pub fn classify_name(binding: &Binding) -> Option<f64> {
    let name = binding.name.as_str();
    if HEX_PREFIX.is_match(name) {
        return Some(0.99);
    }
    if DOLLAR_PREFIX.is_match(name) {
        return Some(0.95);
    }
    if HEX_SUFFIX.is_match(name) {
        return Some(0.9);
    }
    // Conventional loop indices in a for-header are exempt
    if binding.loop_index {
        return None;
    }
    let mut chars = name.chars();
    match (chars.next(), chars.next(), chars.next()) {
        (Some(c), None, _) if c.is_ascii_alphabetic() => Some(0.4),
        (Some(_), Some(_), None) => Some(0.3),
        _ => None,
    }
}

/// Legal, non-reserved identifier
pub fn is_valid_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name) && !RESERVED.contains(&name)
}

/// Base name from the initializer and usage context
pub fn suggest_base_name(
    state: &IrState,
    binding: &Binding,
    initializer: Option<crate::shared::models::NodeId>,
    callee_param: Option<&str>,
) -> String {
    // A known callee parameter name beats shape guessing
    if let Some(param) = callee_param {
        if is_valid_identifier(param) && classify_like(param).is_none() {
            return param.to_string();
        }
    }

    if matches!(
        binding.kind,
        crate::features::scopes::BindingKind::Function
    ) {
        return "fnHelper".to_string();
    }

    let Some(init) = initializer else {
        return "value".to_string();
    };
    match state.kind(init) {
        Some(NodeKind::Literal { value }) => match value {
            LiteralValue::Number(_) => "numValue".to_string(),
            LiteralValue::String(_) => "strValue".to_string(),
            LiteralValue::Boolean(_) => "flag".to_string(),
            LiteralValue::Regex { .. } => "pattern".to_string(),
            LiteralValue::BigInt(_) => "numBig".to_string(),
            LiteralValue::Null => "value".to_string(),
        },
        Some(NodeKind::ArrayLit { .. }) => "arrValues".to_string(),
        Some(NodeKind::ObjectLit { .. }) => "objData".to_string(),
        Some(NodeKind::FunctionExpression { .. }) | Some(NodeKind::ArrowFunction { .. }) => {
            "fnHandler".to_string()
        }
        Some(NodeKind::Call { .. }) | Some(NodeKind::New { .. }) => "result".to_string(),
        Some(NodeKind::Binary { .. }) | Some(NodeKind::Unary { .. }) => "numValue".to_string(),
        _ => "value".to_string(),
    }
}

/// Classification over a bare string, for validating promoted names
fn classify_like(name: &str) -> Option<f64> {
    if HEX_PREFIX.is_match(name) || DOLLAR_PREFIX.is_match(name) || HEX_SUFFIX.is_match(name) {
        return Some(0.9);
    }
    if name.len() <= 2 {
        return Some(0.3);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::scopes::{BindingKind, Binding};
    use crate::shared::models::NodeId;

    fn binding(name: &str, loop_index: bool) -> Binding {
        Binding {
            name: name.to_string(),
            kind: BindingKind::Var,
            body_owner: NodeId(0),
            occurrences: Vec::new(),
            captured: false,
            loop_index,
        }
    }

    #[test]
    fn test_hex_prefix_family() {
        assert_eq!(classify_name(&binding("_0xabc", false)), Some(0.99));
        assert_eq!(classify_name(&binding("_0x1f2e", false)), Some(0.99));
    }

    #[test]
    fn test_dollar_family() {
        assert_eq!(classify_name(&binding("_$ab12", false)), Some(0.95));
    }

    #[test]
    fn test_hex_suffix_family() {
        assert_eq!(classify_name(&binding("name_0xff", false)), Some(0.9));
    }

    #[test]
    fn test_single_letter_low_prior() {
        assert_eq!(classify_name(&binding("x", false)), Some(0.4));
    }

    #[test]
    fn test_loop_index_exempt() {
        assert_eq!(classify_name(&binding("i", true)), None);
        // The same letter outside a for-header is fair game
        assert_eq!(classify_name(&binding("i", false)), Some(0.4));
    }

    #[test]
    fn test_readable_names_pass() {
        assert_eq!(classify_name(&binding("total", false)), None);
        assert_eq!(classify_name(&binding("decodeTable", false)), None);
    }

    #[test]
    fn test_identifier_validation() {
        assert!(is_valid_identifier("numValue"));
        assert!(is_valid_identifier("_private$1"));
        assert!(!is_valid_identifier("for"));
        assert!(!is_valid_identifier("1abc"));
        assert!(!is_valid_identifier("a-b"));
        assert!(!is_valid_identifier(""));
    }
}
