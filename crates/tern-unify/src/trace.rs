//! Tracing types for unifier observability.
//!
//! These types capture step-by-step traces of unification, enabling
//! downstream tools to expose the solver's reasoning process. All tracing is
//! opt-in via `Unifier::enable_tracing()`; no steps are recorded when
//! disabled.

use serde::Serialize;

/// A single step in a unification trace.
#[derive(Debug, Clone, Serialize)]
pub struct UnifyStep {
    pub step: usize,
    pub action: UnifyAction,
    pub left: String,
    pub right: String,
    pub detail: String,
}

/// What action was taken during a unification step.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnifyAction {
    /// Variable bound to the other side (e.g. t0 := Int).
    Bind,
    /// An unbound variable's level was lowered to keep generalization sound.
    AdjustLevel,
    /// A recursive link was unrolled one step.
    Unroll,
    /// An alias was replaced by its underlying expansion.
    ExpandAlias,
    /// Entered row unification.
    UnifyRows,
    /// Both rows open with distinct labels: fresh shared tail created.
    FreshTail,
    /// Constraints propagated from one variable to another.
    Propagate,
    /// A constraint was discharged against a matching instance.
    Discharge,
    /// Occurs check fired; infinite type prevented.
    OccursCheck,
    /// Unification failed.
    Error,
}
