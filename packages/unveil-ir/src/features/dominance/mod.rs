//! Dominance analysis
//!
//! Classical iterative dataflow over the CFG: dominator sets, immediate
//! dominators, dominance frontiers, post-dominators on the reverse graph,
//! then natural-loop detection from back-edges. Derived fields live on
//! the blocks and are recomputed whenever a pass declares it altered
//! control flow.

pub mod dominator;
pub mod loops;

pub use dominator::compute_dominance;
pub use loops::detect_loops;

use crate::shared::models::Cfg;

/// Populate every derived field: dominance, post-dominance, frontiers,
/// back-edges, natural loops, irreducibility
pub fn compute(cfg: &mut Cfg) {
    compute_dominance(cfg);
    detect_loops(cfg);
}
