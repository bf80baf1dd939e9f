//! End-to-end pipeline scenarios over the public API

use pretty_assertions::assert_eq;

use unveil_ir::features::parsing::parse_source;
use unveil_ir::features::printing::print_program;
use unveil_ir::pipeline::job::{run_job, JobInput};
use unveil_ir::pipeline::pass::CancelToken;
use unveil_ir::shared::models::trace::{TraceEvent, TraceValue};
use unveil_ir::shared::models::{ExecutionTrace, IrState};

fn analyze(src: &str) -> unveil_ir::pipeline::export::AnalysisExport {
    let cancel = CancelToken::new();
    run_job(&JobInput::new("input.js", src), &cancel).unwrap()
}

fn analyze_with_trace(src: &str, trace: ExecutionTrace) -> String {
    let cancel = CancelToken::new();
    let export = run_job(&JobInput::new("input.js", src).with_trace(trace), &cancel).unwrap();
    normalize(&export.final_source)
}

fn deobfuscate(src: &str) -> String {
    normalize(&analyze(src).final_source)
}

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[test]
fn scenario_constant_chain_folds_to_console_log() {
    assert_eq!(
        deobfuscate("var a = 1; var b = a; var c = b + 2; console.log(c);"),
        "console.log(3);"
    );
}

#[test]
fn scenario_decoder_lifting_with_trace() {
    let trace = ExecutionTrace::new(vec![TraceEvent::FunctionCall {
        name: "_0x2".into(),
        args: vec![TraceValue::Number(0.0)],
        result: Some(TraceValue::String("hello".into())),
        function_node: None,
        call_site: None,
    }]);
    let out = analyze_with_trace(
        "var _0x1 = ['hello', 'world']; function _0x2(i) { return _0x1[i]; } console.log(_0x2(0));",
        trace,
    );
    assert_eq!(out, "console.log('hello');");
}

#[test]
fn scenario_dispatcher_reconstruction() {
    let out = deobfuscate(
        "var s = 0; while (s != 3) { switch (s) { \
         case 0: var x = 10; s = 1; break; \
         case 1: var y = 20; s = 2; break; \
         case 2: console.log(x + y); s = 3; break; } }",
    );
    assert_eq!(out, "var x = 10; var y = 20; console.log(x + y);");
}

#[test]
fn scenario_opaque_predicate_collapse() {
    assert_eq!(
        deobfuscate("if ((x & 1) === (x % 2)) { f(); } else { g(); }"),
        "f();"
    );
}

#[test]
fn scenario_hex_rename() {
    assert_eq!(
        deobfuscate("var _0xabc = 42; use(_0xabc);"),
        "var numValue = 42; use(numValue);"
    );
}

#[test]
fn scenario_unreachable_removed() {
    let out = deobfuscate("f(); return; unreachable();");
    assert!(!out.contains("unreachable"), "got: {out}");
}

#[test]
fn quantified_or_zero_identity_is_true() {
    let out = deobfuscate("if ((x | 0) === x) { f(); } else { g(); }");
    assert_eq!(out, "f();");
}

#[test]
fn quantified_xor_self_is_true() {
    let out = deobfuscate("if ((y ^ y) === 0) { f(); } else { g(); }");
    assert_eq!(out, "f();");
}

#[test]
fn quantified_mask_vs_mod_is_true() {
    let out = deobfuscate("if ((x & 1) === (x % 2)) { f(); } else { g(); }");
    assert_eq!(out, "f();");
}

#[test]
fn quantified_no_unreachable_blocks_after_final_dce() {
    let export = analyze("f(); return; dead1(); dead2();");
    let cfg = export.final_cfg.expect("final cfg");
    for block in &cfg.blocks {
        assert!(
            block.reachable || block.statements.is_empty(),
            "block {} is unreachable but still holds statements",
            block.id
        );
    }
}

#[test]
fn law_print_parse_print_is_stable_on_pipeline_output() {
    let samples = [
        "var a = 1; var b = a; console.log(b + 2);",
        "var s = 0; while (s != 3) { switch (s) { case 0: var x = 10; s = 1; break; \
         case 1: var y = 20; s = 2; break; case 2: console.log(x + y); s = 3; break; } }",
        "function f(a) { if (a) { return 1; } return 2; } use(f(3));",
        "var _0xk = 'v'; use(_0xk);",
    ];
    for src in samples {
        let final_source = analyze(src).final_source;
        let lowered = parse_source(&final_source, "roundtrip.js").unwrap();
        let state = IrState::new(lowered.nodes, lowered.root, lowered.factory);
        let reprinted = print_program(&state);
        assert_eq!(
            final_source, reprinted,
            "pipeline output reparse changed for `{src}`"
        );
    }
}

#[test]
fn law_pipeline_is_idempotent_on_clean_output() {
    let samples = [
        "var a = 1; var b = a; var c = b + 2; console.log(c);",
        "if ((x & 1) === (x % 2)) { f(); } else { g(); }",
    ];
    for src in samples {
        let once = analyze(src).final_source;
        let twice = analyze(&once).final_source;
        assert_eq!(normalize(&once), normalize(&twice), "not idempotent for `{src}`");
    }
}

#[test]
fn law_deflattening_is_noop_on_flat_code() {
    let src = "var x = 10; var y = 20; console.log(x + y);";
    assert_eq!(deobfuscate(src), src);
}

#[test]
fn export_document_shape() {
    let export = analyze("var a = 1; console.log(a);");
    assert_eq!(export.original_source, "var a = 1; console.log(a);");
    assert!(export.metadata.success);
    assert_eq!(export.metadata.total_passes, export.passes.len());
    assert_eq!(export.metadata.output_size, export.final_source.len());
    assert!(export.metadata.input_size > 0);
    assert!(!export.metadata.job_id.is_empty());

    // The export serializes to JSON and back
    let json = export.to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert!(value["passes"].as_array().unwrap().len() >= 9);
    assert_eq!(value["final_cfg"]["entry"], "b0");
}

#[test]
fn cli_analyze_writes_output_and_export() {
    use std::process::Command;

    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.js");
    let output = dir.path().join("out.js");
    let export = dir.path().join("analysis.json");
    std::fs::write(&input, "var a = 1; var b = a; console.log(b + 2);").unwrap();

    let status = Command::new(env!("CARGO_BIN_EXE_unveil"))
        .arg("analyze")
        .arg(&input)
        .arg("--output")
        .arg(&output)
        .arg("--export")
        .arg(&export)
        .status()
        .unwrap();
    assert!(status.success());

    let written = std::fs::read_to_string(&output).unwrap();
    assert!(written.contains("console.log(3);"));
    let exported: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&export).unwrap()).unwrap();
    assert_eq!(exported["metadata"]["success"], true);
}

#[test]
fn cli_fails_on_broken_input() {
    use std::process::Command;

    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("bad.js");
    std::fs::write(&input, "var = = ;").unwrap();

    let status = Command::new(env!("CARGO_BIN_EXE_unveil"))
        .arg("analyze")
        .arg(&input)
        .status()
        .unwrap();
    assert!(!status.success());
}
