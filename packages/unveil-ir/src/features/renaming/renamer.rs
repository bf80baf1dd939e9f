//! The renaming pass

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::features::printing::print_expression;
use crate::features::scopes::{self, BindingKind, OccKind};
use crate::pipeline::error::PipelineResult;
use crate::pipeline::pass::{MetricsRecorder, Pass, PassContext, PassOutcome, Warning};
use crate::shared::models::node::{NodeId, NodeKind};
use crate::shared::models::IrState;

use super::heuristic::{classify_name, is_valid_identifier, suggest_base_name};
use super::ports::NamingContext;

pub struct RenamingPass;

impl Pass for RenamingPass {
    fn name(&self) -> &'static str {
        "intelligent-renaming"
    }

    fn description(&self) -> &'static str {
        "replace obfuscated-looking identifiers with descriptive names"
    }

    fn run(&self, mut state: IrState, ctx: &PassContext<'_>) -> PipelineResult<PassOutcome> {
        let mut recorder = MetricsRecorder::start();
        let mut warnings = Vec::new();
        let mut changed = false;

        let analysis = scopes::bind(&state);
        if analysis.has_eval {
            warnings.push(Warning::new(
                "rename.eval",
                "eval present; renaming skipped for safety",
            ));
            return Ok(PassOutcome::unchanged(state, recorder.finish()).with_warnings(warnings));
        }

        // Every name in sight participates in collision checks
        let mut taken: FxHashSet<String> = state
            .subtree_nodes(state.root)
            .into_iter()
            .filter_map(|n| {
                state
                    .kind(n)
                    .and_then(NodeKind::variable_name)
                    .map(str::to_string)
            })
            .collect();

        // Callee-parameter promotion: argument occurrence → parameter name
        let param_promotions = parameter_promotions(&state);

        for (index, binding) in analysis.bindings.iter().enumerate() {
            ctx.cancel.check("intelligent-renaming")?;
            let Some(confidence) = classify_name(binding) else { continue };
            if binding.occurrences.is_empty() {
                continue;
            }

            let initializer = binding_initializer(&state, &analysis, index);
            let callee_param = binding
                .occurrences
                .iter()
                .find_map(|occ| param_promotions.get(&occ.node).cloned());

            let base = resolved_name(
                &state,
                ctx,
                binding,
                initializer,
                callee_param.as_deref(),
                &taken,
            );
            let fresh = uniquify(&base, &taken);

            if confidence < ctx.config.apply_confidence_threshold {
                warnings.push(
                    Warning::suggestion(
                        "rename.low_confidence",
                        format!(
                            "`{}` looks machine-generated (confidence {confidence:.2})",
                            binding.name
                        ),
                        fresh.clone(),
                    )
                    .at(binding.occurrences[0].node),
                );
                continue;
            }

            debug!(from = %binding.name, to = %fresh, "binding renamed");
            for occ in &binding.occurrences {
                state.replace_kind(
                    occ.node,
                    NodeKind::Identifier {
                        name: fresh.clone(),
                    },
                );
                recorder.changed(1);
            }
            taken.insert(fresh);
            changed = true;
        }

        let metrics = recorder.finish();
        Ok(if changed {
            PassOutcome::changed(state, metrics).with_warnings(warnings)
        } else {
            PassOutcome::unchanged(state, metrics).with_warnings(warnings)
        })
    }
}

/// Helper answer when available and valid, heuristic otherwise
fn resolved_name(
    state: &IrState,
    ctx: &PassContext<'_>,
    binding: &scopes::Binding,
    initializer: Option<NodeId>,
    callee_param: Option<&str>,
    taken: &FxHashSet<String>,
) -> String {
    let heuristic = suggest_base_name(state, binding, initializer, callee_param);
    let Some(helper) = ctx.naming else {
        return heuristic;
    };
    let context = NamingContext {
        initializer: initializer.map(|init| print_expression(state, init)),
        role: match binding.kind {
            BindingKind::Function => "function",
            BindingKind::Param => "parameter",
            _ => "variable",
        },
        callee_param: callee_param.map(str::to_string),
    };
    match helper.suggest(&binding.name, &context) {
        // Illegal, reserved, or colliding answers are discarded
        Ok(name) if is_valid_identifier(&name) && !taken.contains(&name) => name,
        _ => heuristic,
    }
}

/// First declared initializer of the binding, when it has one
fn binding_initializer(
    state: &IrState,
    analysis: &scopes::ScopeAnalysis,
    binding_index: usize,
) -> Option<NodeId> {
    let binding = &analysis.bindings[binding_index];
    for occ in &binding.occurrences {
        if !matches!(occ.kind, OccKind::Decl) {
            continue;
        }
        // The declaration occurrence is the declarator's name node; find
        // the declarator that owns it
        for node in state.subtree_nodes(state.root) {
            if let Some(NodeKind::VariableDeclarator { id, init }) = state.kind(node) {
                if *id == occ.node {
                    return *init;
                }
            }
        }
    }
    None
}

/// Map from argument identifier occurrences to the parameter name of the
/// function they flow into
fn parameter_promotions(state: &IrState) -> FxHashMap<NodeId, String> {
    // Parameter lists of named function declarations
    let mut params_of: FxHashMap<String, Vec<String>> = FxHashMap::default();
    for node in state.subtree_nodes(state.root) {
        if let Some(NodeKind::FunctionDeclaration { id, params, .. }) = state.kind(node) {
            if let Some(name) = state.kind(*id).and_then(NodeKind::variable_name) {
                let names: Vec<String> = params
                    .iter()
                    .filter_map(|&p| {
                        state
                            .kind(p)
                            .and_then(NodeKind::variable_name)
                            .map(str::to_string)
                    })
                    .collect();
                params_of.insert(name.to_string(), names);
            }
        }
    }

    let mut promotions = FxHashMap::default();
    for node in state.subtree_nodes(state.root) {
        let Some(NodeKind::Call {
            callee, arguments, ..
        }) = state.kind(node)
        else {
            continue;
        };
        let Some(callee_name) = state.kind(*callee).and_then(NodeKind::variable_name) else {
            continue;
        };
        let Some(params) = params_of.get(callee_name) else { continue };
        for (position, &arg) in arguments.iter().enumerate() {
            if matches!(state.kind(arg), Some(NodeKind::Identifier { .. })) {
                if let Some(param) = params.get(position) {
                    promotions.insert(arg, param.clone());
                }
            }
        }
    }
    promotions
}

/// Suffix with an integer until the name is free
fn uniquify(base: &str, taken: &FxHashSet<String>) -> String {
    if !taken.contains(base) {
        return base.to_string();
    }
    let mut counter = 2;
    loop {
        let candidate = format!("{base}{counter}");
        if !taken.contains(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::parsing::parse_source;
    use crate::features::printing::print_program;
    use crate::features::renaming::ports::NamingHelper;
    use crate::pipeline::config::PipelineConfig;
    use crate::pipeline::pass::CancelToken;

    fn run_rename(src: &str, helper: Option<&dyn NamingHelper>) -> (String, Vec<Warning>) {
        let lowered = parse_source(src, "test.js").unwrap();
        let state = IrState::new(lowered.nodes, lowered.root, lowered.factory);
        let config = PipelineConfig::default();
        let cancel = CancelToken::new();
        let mut ctx = PassContext::bare(&config, &cancel);
        ctx.naming = helper;
        let outcome = RenamingPass.run(state, &ctx).unwrap();
        (print_program(&outcome.state), outcome.warnings)
    }

    fn normalized(src: &str) -> String {
        run_rename(src, None)
            .0
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_hex_name_renamed_with_num_prefix() {
        let out = normalized("var _0xabc = 42; use(_0xabc);");
        assert!(out.contains("var numValue = 42;"), "got: {out}");
        assert!(out.contains("use(numValue);"), "got: {out}");
        assert!(!out.contains("_0xabc"), "got: {out}");
    }

    #[test]
    fn test_all_occurrences_rename_together() {
        let out = normalized("var _0x1 = 'a'; f(_0x1); g(_0x1);");
        assert!(out.contains("f(strValue)"), "got: {out}");
        assert!(out.contains("g(strValue)"), "got: {out}");
    }

    #[test]
    fn test_single_letters_become_suggestions_not_renames() {
        let (out, warnings) = run_rename("var x = 10; var y = 20; console.log(x + y);", None);
        let out: String = out.split_whitespace().collect::<Vec<_>>().join(" ");
        assert!(out.contains("console.log(x + y);"), "got: {out}");
        assert!(warnings
            .iter()
            .any(|w| w.code == "rename.low_confidence"));
    }

    #[test]
    fn test_loop_index_untouched_without_warning() {
        let (out, warnings) =
            run_rename("for (var i = 0; i < 3; i++) { use(i); }", None);
        assert!(out.contains("var i = 0"), "got: {out}");
        assert!(!warnings
            .iter()
            .any(|w| w.message.contains("`i`")), "{warnings:?}");
    }

    #[test]
    fn test_collision_gets_integer_suffix() {
        let out = normalized("var numValue = 1; var _0xa = 2; use(numValue, _0xa);");
        assert!(out.contains("var numValue2 = 2;"), "got: {out}");
        assert!(out.contains("use(numValue, numValue2);"), "got: {out}");
    }

    #[test]
    fn test_callee_parameter_promotion() {
        let out = normalized(
            "function draw(width) { return width; } var _0xw = 640; draw(_0xw);",
        );
        assert!(out.contains("var width2 = 640;") || out.contains("var width = 640;"),
            "got: {out}");
    }

    struct FixedHelper(&'static str);

    impl NamingHelper for FixedHelper {
        fn suggest(&self, _identifier: &str, _context: &NamingContext) -> Result<String, String> {
            Ok(self.0.to_string())
        }
    }

    struct FailingHelper;

    impl NamingHelper for FailingHelper {
        fn suggest(&self, _identifier: &str, _context: &NamingContext) -> Result<String, String> {
            Err("helper offline".to_string())
        }
    }

    #[test]
    fn test_helper_suggestion_used() {
        let (out, _) = run_rename("var _0xabc = 42; use(_0xabc);", Some(&FixedHelper("answer")));
        assert!(out.contains("var answer = 42;"), "got: {out}");
    }

    #[test]
    fn test_invalid_helper_answer_falls_back() {
        let (out, _) = run_rename(
            "var _0xabc = 42; use(_0xabc);",
            Some(&FixedHelper("not a name")),
        );
        assert!(out.contains("var numValue = 42;"), "got: {out}");
    }

    #[test]
    fn test_reserved_helper_answer_falls_back() {
        let (out, _) = run_rename("var _0xabc = 42; use(_0xabc);", Some(&FixedHelper("while")));
        assert!(out.contains("var numValue = 42;"), "got: {out}");
    }

    #[test]
    fn test_failing_helper_is_transparent() {
        let (out, _) = run_rename("var _0xabc = 42; use(_0xabc);", Some(&FailingHelper));
        assert!(out.contains("var numValue = 42;"), "got: {out}");
    }
}
