//! Naming-helper port
//!
//! The helper is a request/response collaborator (network, IPC, or
//! in-process). Its absence must be transparent: every answer is
//! validated and any failure falls back to the heuristic.

/// What the helper gets to look at
#[derive(Debug, Clone)]
pub struct NamingContext {
    /// Printed initializer, when the binding has one
    pub initializer: Option<String>,
    /// Role of the binding: "variable", "function", "parameter"
    pub role: &'static str,
    /// Parameter name the value flows into at a known call site
    pub callee_param: Option<String>,
}

pub trait NamingHelper {
    /// A suggested replacement for `identifier`, or an error string; the
    /// caller validates the answer either way
    fn suggest(&self, identifier: &str, context: &NamingContext) -> Result<String, String>;
}
