/*! Decide which variables depend on the designated source parameters, and how.
 *
 * Each function is solved on its own CFG: control dependence comes from post-dominators, memory
 * accesses are resolved against a per-function location arena, and loops whose exit test reads a
 * source widen everything they define to full taint. Functions are visited callees first over the
 * call graph's strongly connected components, so every call site sees its callee's summary.
 */

pub mod alias;
pub mod call_graph;
pub mod cfg;
pub mod control_dependence;
pub mod dataflow;
pub mod dominator;
pub mod interprocedural;
pub mod lattice;
pub mod report;
pub mod summary;

pub use alias::{AliasAnalysis, LocId, LocProjection, LocRoot, LocationArena, Resolution};
pub use call_graph::{CallGraph, Component};
pub use cfg::{ControlFlowGraph, Loop};
pub use control_dependence::ControlDependence;
pub use dataflow::{FunctionResult, TaintEngine};
pub use dominator::DominatorTree;
pub use interprocedural::{analyze_program, summarize};
pub use lattice::{SourceId, TaintKind, TaintState, TaintValue, Tier};
pub use report::{FunctionOutcome, FunctionReport, ProgramReport, SourceTaint, VariableReport};
pub use summary::{CalleeSummary, FunctionSummary, SummaryTable};
