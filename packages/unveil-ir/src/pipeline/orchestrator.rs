//! Pipeline orchestration
//!
//! A fixed ordered pass list with the framework obligations around it:
//! SSA construction/destruction inserted around the span of passes that
//! declare the dependency, CFG and dominance rebuilt after any pass that
//! declares it mutated control flow, pass-local failures rolled back to
//! the pre-pass snapshot, and one bounded outer fixed-point round when a
//! pass reports it unlocked earlier work.

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::features::constant_propagation::ConstantPropagationPass;
use crate::features::copy_propagation::CopyPropagationPass;
use crate::features::dead_code::DeadCodePass;
use crate::features::decoder_lifting::DecoderLiftingPass;
use crate::features::deflatten::DeflattenPass;
use crate::features::dominance;
use crate::features::flow_graph;
use crate::features::opaque_predicates::OpaquePredicatePass;
use crate::features::parsing;
use crate::features::printing;
use crate::features::renaming::RenamingPass;
use crate::features::ssa::{SsaConstructPass, SsaDestructPass};
use crate::features::structuring::StructuringPass;
use crate::shared::models::IrState;

use super::config::PipelineConfig;
use super::error::{PipelineError, PipelineResult};
use super::export::{snapshot_cfg, AnalysisExport, ExportMetadata, IrSnapshot, PassRunExport};
use super::pass::{CancelToken, Pass, PassContext, Warning, WarningKind};

pub struct Pipeline {
    config: PipelineConfig,
}

/// Everything a run consults besides the source text
#[derive(Default)]
pub struct Collaborators<'a> {
    pub trace: Option<&'a crate::shared::models::ExecutionTrace>,
    pub solver: Option<&'a dyn super::pass::SolverFactory>,
    pub naming: Option<&'a dyn crate::features::renaming::ports::NamingHelper>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The prescribed pass order, with SSA construction and destruction
    /// inserted around the span of passes that require SSA
    fn schedule(&self) -> Vec<Box<dyn Pass>> {
        let mut passes: Vec<Box<dyn Pass>> = vec![
            Box::new(DeflattenPass),
            Box::new(ConstantPropagationPass),
            Box::new(CopyPropagationPass),
            Box::new(DeadCodePass::first()),
            Box::new(DecoderLiftingPass),
            Box::new(OpaquePredicatePass),
        ];
        if self.config.rename_before_structuring {
            passes.push(Box::new(RenamingPass));
            passes.push(Box::new(StructuringPass));
        } else {
            passes.push(Box::new(StructuringPass));
            passes.push(Box::new(RenamingPass));
        }
        passes.push(Box::new(DeadCodePass::second()));

        let first_ssa = passes.iter().position(|p| p.requires_ssa());
        let last_ssa = passes.iter().rposition(|p| p.requires_ssa());
        if let (Some(first), Some(last)) = (first_ssa, last_ssa) {
            passes.insert(last + 1, Box::new(SsaDestructPass));
            passes.insert(first, Box::new(SsaConstructPass));
        }
        passes
    }

    /// Run the whole pipeline over one source text
    pub fn run(
        &self,
        source: &str,
        source_name: &str,
        collaborators: Collaborators<'_>,
        cancel: &CancelToken,
    ) -> PipelineResult<AnalysisExport> {
        let started = Instant::now();
        let mut all_warnings: Vec<Warning> = Vec::new();

        // Parse and lower; failure here is fatal by definition
        let lowered = parsing::parse_source(source, source_name)?;
        all_warnings.extend(lowered.warnings.iter().cloned());
        let mut state = IrState::new(lowered.nodes, lowered.root, lowered.factory);
        rebuild_flow(&mut state)?;

        let ctx = PassContext {
            config: &self.config,
            cancel,
            trace: collaborators.trace,
            solver: collaborators.solver,
            naming: collaborators.naming,
        };

        let passes = self.schedule();
        let mut pass_runs: Vec<PassRunExport> = Vec::new();
        let mut success = true;

        let mut index = 0;
        let mut outer_rounds = 0u32;
        while index < passes.len() {
            let pass = &passes[index];
            if let Err(e) = cancel.check(pass.name()) {
                all_warnings.push(Warning::new("pipeline.cancelled", e.to_string()));
                success = false;
                break;
            }

            // Pre-pass snapshot: the rollback target for local failures
            let snapshot = state.clone();
            let input_snapshot = IrSnapshot::of(&state);
            debug!(pass = pass.name(), "running pass");

            match pass.run(state, &ctx) {
                Ok(outcome) => {
                    state = outcome.state;
                    all_warnings.extend(outcome.warnings.iter().cloned());

                    if pass.mutates_control_flow() {
                        rebuild_flow(&mut state)?;
                    }

                    pass_runs.push(PassRunExport {
                        name: pass.name().to_string(),
                        description: pass.description().to_string(),
                        changed: outcome.changed,
                        metrics: outcome.metrics,
                        input: input_snapshot,
                        output: IrSnapshot::of(&state),
                        code: printing::print_program(&state),
                        cfg: state.primary_cfg().map(|cfg| snapshot_cfg(&state, cfg)),
                        warnings: outcome.warnings,
                    });

                    if outcome.rerun_prefix && outer_rounds + 1 < self.config.max_iterations {
                        outer_rounds += 1;
                        info!(
                            pass = pass.name(),
                            round = outer_rounds,
                            "re-running pipeline prefix"
                        );
                        index = 0;
                        continue;
                    }
                    index += 1;
                }
                Err(e) if matches!(e, PipelineError::Cancelled { .. }) => {
                    // The last consistent state wins; the in-progress
                    // snapshot is discarded
                    state = snapshot;
                    all_warnings.push(Warning::new("pipeline.cancelled", e.to_string()));
                    success = false;
                    break;
                }
                Err(e) if e.is_fatal() && !self.config.best_effort => {
                    return Err(e);
                }
                Err(e) => {
                    // Pass-local failure: roll back, warn, continue
                    warn!(pass = pass.name(), error = %e, "pass failed; rolled back");
                    state = snapshot;
                    all_warnings.push(
                        Warning::new(
                            format!("pass.{}", e.category()),
                            format!("{} failed and was rolled back: {e}", pass.name()),
                        ),
                    );
                    index += 1;
                }
            }
        }

        // SSA must never leak out of the pipeline, even on early exits
        if state.ssa.is_some() {
            let destruct = SsaDestructPass;
            match destruct.run(state.clone(), &ctx) {
                Ok(outcome) => state = outcome.state,
                Err(e) => return Err(e),
            }
        }
        printing::assert_no_ssa(&state)?;

        let (final_source, source_map) = if self.config.source_maps {
            let (text, map) = printing::print_with_source_map(&state, source_name);
            (text, Some(map))
        } else {
            (printing::print_program(&state), None)
        };

        let suggestions = all_warnings
            .iter()
            .filter(|w| w.kind == WarningKind::Suggestion)
            .count();
        info!(
            passes = pass_runs.len(),
            warnings = all_warnings.len(),
            suggestions,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "analysis complete"
        );

        Ok(AnalysisExport {
            original_source: source.to_string(),
            final_source,
            passes: pass_runs,
            final_cfg: state.primary_cfg().map(|cfg| snapshot_cfg(&state, cfg)),
            source_map,
            analysis_metadata: state.metadata.clone(),
            metadata: ExportMetadata::new(
                source_name,
                source.len(),
                started.elapsed(),
                success,
                all_warnings,
            ),
        }
        .finalize())
    }
}

/// Rebuild CFGs and recompute dominance for every code body
fn rebuild_flow(state: &mut IrState) -> PipelineResult<()> {
    flow_graph::rebuild_cfgs(state)?;
    let owners: Vec<_> = state.cfgs.keys().copied().collect();
    let mut irreducible = false;
    for owner in owners {
        if let Some(mut cfg) = state.cfgs.remove(&owner) {
            dominance::compute(&mut cfg);
            irreducible |= cfg.irreducible;
            state.cfgs.insert(owner, cfg);
        }
    }
    if irreducible {
        state.set_meta("dominance.irreducible", serde_json::json!(true));
    }
    Ok(())
}
