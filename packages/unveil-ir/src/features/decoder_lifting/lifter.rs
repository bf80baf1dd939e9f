//! The decoder-lifting pass

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, warn};

use crate::features::effects::{self, Effect};
use crate::pipeline::error::PipelineResult;
use crate::pipeline::pass::{MetricsRecorder, Pass, PassContext, PassOutcome, Warning};
use crate::shared::models::node::{LiteralValue, NodeId, NodeKind};
use crate::shared::models::trace::{TraceEvent, TraceValue};
use crate::shared::models::IrState;

pub struct DecoderLiftingPass;

impl Pass for DecoderLiftingPass {
    fn name(&self) -> &'static str {
        "string-decoder-lifting"
    }

    fn description(&self) -> &'static str {
        "replace decoder calls with the strings the sandbox observed"
    }

    fn run(&self, mut state: IrState, ctx: &PassContext<'_>) -> PipelineResult<PassOutcome> {
        let mut recorder = MetricsRecorder::start();
        let mut warnings = Vec::new();

        let Some(trace) = ctx.trace else {
            return Ok(PassOutcome::unchanged(state, recorder.finish()));
        };

        let decoders = identify_decoders(&state, trace, ctx.config.decoder_min_calls, &mut warnings);
        if decoders.is_empty() {
            return Ok(PassOutcome::unchanged(state, recorder.finish()).with_warnings(warnings));
        }

        let mut changed = false;
        for node in state.subtree_nodes(state.root) {
            ctx.cancel.check("string-decoder-lifting")?;
            let Some(NodeKind::Call {
                callee, arguments, ..
            }) = state.kind(node).cloned()
            else {
                continue;
            };
            let Some(name) = state
                .kind(callee)
                .and_then(NodeKind::variable_name)
                .map(str::to_string)
            else {
                continue;
            };
            let Some(decoder) = decoders.get(&name) else { continue };

            // Every argument must be a literal the trace can be keyed on
            let mut key_parts = Vec::with_capacity(arguments.len());
            for &arg in &arguments {
                let Some(part) = literal_key(&state, arg) else {
                    key_parts.clear();
                    break;
                };
                key_parts.push(part);
            }
            if key_parts.len() != arguments.len() {
                continue;
            }
            let key = key_parts.join(",");

            // Site coverage: strict node matching when the trace carries
            // correlation ids, argument-tuple evidence otherwise
            if let Some(sites) = &decoder.observed_sites {
                if !sites.contains(&node) {
                    continue;
                }
            }
            let Some(value) = decoder.results.get(&key) else { continue };

            debug!(decoder = %name, key = %key, "decoder call lifted");
            for &arg in &arguments {
                remove_subtree(&mut state, arg, &mut recorder);
            }
            remove_subtree(&mut state, callee, &mut recorder);
            state.replace_kind(
                node,
                NodeKind::Literal {
                    value: LiteralValue::String(value.clone()),
                },
            );
            recorder.changed(1);
            changed = true;
        }

        let metrics = recorder.finish();
        Ok(if changed {
            // Lifted strings are fresh constants; the dataflow prefix can
            // profit from another round
            let mut outcome = PassOutcome::changed(state, metrics).with_warnings(warnings);
            outcome.rerun_prefix = true;
            outcome
        } else {
            PassOutcome::unchanged(state, metrics).with_warnings(warnings)
        })
    }
}

struct DecoderEvidence {
    /// Argument-tuple key → observed string
    results: FxHashMap<String, String>,
    /// Correlated call-site nodes, when the sandbox supplied them
    observed_sites: Option<FxHashSet<NodeId>>,
}

/// Group call events by function, check determinism and the decoder
/// shape, and verify the static side of the bargain: the function must
/// not write, perform io, or call out
fn identify_decoders(
    state: &IrState,
    trace: &crate::shared::models::ExecutionTrace,
    min_calls: usize,
    warnings: &mut Vec<Warning>,
) -> FxHashMap<String, DecoderEvidence> {
    #[derive(Default)]
    struct Group {
        results: FxHashMap<String, String>,
        sites: FxHashSet<NodeId>,
        any_site: bool,
        calls: usize,
        disqualified: bool,
        small_args: bool,
    }

    let mut groups: FxHashMap<String, Group> = FxHashMap::default();
    for event in &trace.events {
        let TraceEvent::FunctionCall {
            name,
            args,
            result,
            call_site,
            ..
        } = event
        else {
            continue;
        };
        let group = groups.entry(name.clone()).or_insert_with(|| Group {
            small_args: true,
            ..Group::default()
        });
        group.calls += 1;
        if let Some(site) = call_site {
            group.sites.insert(*site);
            group.any_site = true;
        }
        if !args.iter().all(TraceValue::is_small) {
            group.small_args = false;
        }
        let key = args
            .iter()
            .map(TraceValue::key_fragment)
            .collect::<Vec<_>>()
            .join(",");
        match result {
            Some(TraceValue::String(s)) => {
                if let Some(previous) = group.results.get(&key) {
                    if previous != s {
                        group.disqualified = true;
                    }
                } else {
                    group.results.insert(key, s.clone());
                }
            }
            _ => group.disqualified = true,
        }
    }

    let mut decoders = FxHashMap::default();
    for (name, group) in groups {
        if group.disqualified {
            warn!(decoder = %name, "nondeterministic decoder candidate disqualified");
            warnings.push(Warning::new(
                "decoder.nondeterministic",
                format!("`{name}` returned different values for identical arguments"),
            ));
            continue;
        }
        if group.calls < min_calls || !group.small_args || group.results.is_empty() {
            continue;
        }
        // Static check over the IR definition when one is visible
        if let Some(function) = find_function(state, &name) {
            let summary = effects::function_effects(state, function);
            let writes = summary.contains(Effect::MemoryWrite)
                || summary.contains(Effect::Io)
                || summary.contains(Effect::ExternalCall)
                || summary.contains(Effect::ConsoleOutput);
            if writes {
                warnings.push(Warning::new(
                    "decoder.effectful",
                    format!("`{name}` has observable effects; calls left intact"),
                ));
                continue;
            }
        }
        decoders.insert(
            name,
            DecoderEvidence {
                results: group.results,
                observed_sites: if group.any_site {
                    Some(group.sites)
                } else {
                    None
                },
            },
        );
    }
    decoders
}

fn find_function(state: &IrState, name: &str) -> Option<NodeId> {
    state.subtree_nodes(state.root).into_iter().find(|&n| {
        matches!(
            state.kind(n),
            Some(NodeKind::FunctionDeclaration { id, .. })
                if state.kind(*id).and_then(NodeKind::variable_name) == Some(name)
        )
    })
}

/// Key fragment for a literal argument, aligned with
/// `TraceValue::key_fragment`
fn literal_key(state: &IrState, arg: NodeId) -> Option<String> {
    match state.kind(arg)? {
        NodeKind::Literal { value } => Some(match value {
            LiteralValue::Number(n) => format!("n:{n}"),
            LiteralValue::String(s) => format!("s:{s}"),
            LiteralValue::Boolean(b) => format!("b:{b}"),
            LiteralValue::Null => "null".to_string(),
            _ => return None,
        }),
        NodeKind::Identifier { name } if name == "undefined" => Some("undefined".to_string()),
        _ => None,
    }
}

fn remove_subtree(state: &mut IrState, root: NodeId, recorder: &mut MetricsRecorder) {
    for node in state.subtree_nodes(root) {
        if state.nodes.remove(&node).is_some() {
            recorder.removed(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::parsing::parse_source;
    use crate::features::printing::print_program;
    use crate::pipeline::config::PipelineConfig;
    use crate::pipeline::pass::{CancelToken, PassContext};
    use crate::shared::models::ExecutionTrace;

    fn call_event(name: &str, arg: f64, result: &str) -> TraceEvent {
        TraceEvent::FunctionCall {
            name: name.to_string(),
            args: vec![TraceValue::Number(arg)],
            result: Some(TraceValue::String(result.to_string())),
            function_node: None,
            call_site: None,
        }
    }

    fn run_lift(src: &str, trace: ExecutionTrace) -> (String, Vec<Warning>) {
        let lowered = parse_source(src, "test.js").unwrap();
        let state = IrState::new(lowered.nodes, lowered.root, lowered.factory);
        let config = PipelineConfig::default();
        let cancel = CancelToken::new();
        let mut ctx = PassContext::bare(&config, &cancel);
        ctx.trace = Some(&trace);
        let outcome = DecoderLiftingPass.run(state, &ctx).unwrap();
        (print_program(&outcome.state), outcome.warnings)
    }

    const DECODER: &str =
        "var _0x1 = ['hello', 'world']; function _0x2(i) { return _0x1[i]; } console.log(_0x2(0));";

    #[test]
    fn test_observed_call_lifts_to_string() {
        let trace = ExecutionTrace::new(vec![call_event("_0x2", 0.0, "hello")]);
        let (out, _) = run_lift(DECODER, trace);
        assert!(out.contains("console.log('hello');"), "got: {out}");
    }

    #[test]
    fn test_unobserved_site_left_intact() {
        // The trace observed argument 1, the site passes 0
        let trace = ExecutionTrace::new(vec![call_event("_0x2", 1.0, "world")]);
        let (out, _) = run_lift(DECODER, trace);
        assert!(out.contains("_0x2(0)"), "got: {out}");
    }

    #[test]
    fn test_nondeterministic_decoder_disqualified() {
        let trace = ExecutionTrace::new(vec![
            call_event("_0x2", 0.0, "hello"),
            call_event("_0x2", 0.0, "goodbye"),
        ]);
        let (out, warnings) = run_lift(DECODER, trace);
        assert!(out.contains("_0x2(0)"), "got: {out}");
        assert!(warnings
            .iter()
            .any(|w| w.code == "decoder.nondeterministic"));
    }

    #[test]
    fn test_no_trace_means_no_change() {
        let lowered = parse_source(DECODER, "test.js").unwrap();
        let state = IrState::new(lowered.nodes, lowered.root, lowered.factory);
        let config = PipelineConfig::default();
        let cancel = CancelToken::new();
        let ctx = PassContext::bare(&config, &cancel);
        let outcome = DecoderLiftingPass.run(state, &ctx).unwrap();
        assert!(!outcome.changed);
    }

    #[test]
    fn test_effectful_function_not_lifted() {
        let src = "function log2(i) { console.log(i); return 'x'; } use(log2(0));";
        let trace = ExecutionTrace::new(vec![call_event("log2", 0.0, "x")]);
        let (out, warnings) = run_lift(src, trace);
        assert!(out.contains("log2(0)"), "got: {out}");
        assert!(warnings.iter().any(|w| w.code == "decoder.effectful"));
    }

    #[test]
    fn test_strict_site_matching_when_correlated() {
        // The trace correlates to a node id that does not exist in this
        // IR, so nothing may be replaced
        let trace = ExecutionTrace::new(vec![TraceEvent::FunctionCall {
            name: "_0x2".to_string(),
            args: vec![TraceValue::Number(0.0)],
            result: Some(TraceValue::String("hello".to_string())),
            function_node: None,
            call_site: Some(NodeId(999_999)),
        }]);
        let (out, _) = run_lift(DECODER, trace);
        assert!(out.contains("_0x2(0)"), "got: {out}");
    }
}
