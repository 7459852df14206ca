//! Type unification for Tern.
//!
//! This crate implements:
//! - Structural unification over the full type universe (constants, sizes,
//!   applications with transparent aliases, arrows, records, variants,
//!   equi-recursive groups)
//! - Row unification: flatten, diff label sets, absorb missing labels
//!   through open tails
//! - Level-based occurs checking that lowers bound variables' levels so
//!   let-generalization stays sound
//! - Type-class constraint propagation and discharge with subclass-first
//!   instance search
//! - Speculative unification with journaled rollback of variable cells
//!
//! The unifier is single-threaded and synchronous within a context: it owns
//! the type store, the link stash, and the speculation flag, and every
//! variable-cell mutation is routed through it. Callers that need many
//! contexts in parallel must not share variable cells between them.

use std::collections::BTreeMap;
use std::fmt;

use tern_diag::{Category, Diagnostic};
use tern_types::{
    ClassId, ClassRegistry, Label, LabelMap, RecGroupId, Ty, TypeId, TypeStore, VarCell, VarId,
    VarState,
};

pub mod trace;

use trace::{UnifyAction, UnifyStep};

// Re-export for convenience.
pub use tern_diag::DiagnosticError;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Which arity comparison failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArityKind {
    App,
    Arrow,
    RecursiveParams,
}

impl fmt::Display for ArityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArityKind::App => write!(f, "type applications"),
            ArityKind::Arrow => write!(f, "function arrows"),
            ArityKind::RecursiveParams => write!(f, "recursive type parameters"),
        }
    }
}

/// A classified unification failure.
///
/// Failures carry rendered types rather than store handles so they stay
/// meaningful after the attempt is rolled back.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnifyError {
    #[error("generic type variable was not instantiated before unification")]
    GenericInUnification,
    #[error("implicitly recursive types are not supported")]
    Recursive,
    #[error("recursive row types are not supported")]
    RecursiveRow,
    #[error("cannot unify `{left}` with `{right}`")]
    HeadMismatch { left: String, right: String },
    #[error("cannot unify {kind} with differing arity")]
    ArityMismatch { kind: ArityKind },
    #[error("cannot unify size type `{left}` with `{right}`")]
    SizeMismatch { left: String, right: String },
    #[error("no matching instance found for type class `{class}`")]
    NoInstance { class: String },
    #[error("closed row is missing labels: {}", .labels.iter().map(|l| l.as_str()).collect::<Vec<_>>().join(", "))]
    ClosedRowMissingLabels { labels: Vec<Label> },
    #[error("invalid state while unifying rows")]
    InvalidRowState,
}

impl UnifyError {
    /// The diagnostic category for this failure.
    pub fn category(&self) -> Category {
        match self {
            UnifyError::GenericInUnification => Category::GenericVariable,
            UnifyError::Recursive => Category::RecursiveType,
            UnifyError::RecursiveRow => Category::RecursiveRow,
            UnifyError::HeadMismatch { .. } => Category::TypeMismatch,
            UnifyError::ArityMismatch { .. } => Category::ArityMismatch,
            UnifyError::SizeMismatch { .. } => Category::SizeMismatch,
            UnifyError::NoInstance { .. } => Category::MissingInstance,
            UnifyError::ClosedRowMissingLabels { .. } => Category::MissingRowLabels,
            UnifyError::InvalidRowState => Category::InternalInvariant,
        }
    }

    /// Render this failure as a structured diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::error(self.category(), self.to_string())
            .with_help(self.category().example_fix())
    }
}

// ---------------------------------------------------------------------------
// Link stash: the speculation journal
// ---------------------------------------------------------------------------

/// One journal entry: a whole-cell snapshot taken before the first mutation
/// of a variable inside a speculative attempt.
#[derive(Debug, Clone)]
struct StashedVar {
    var: VarId,
    cell: VarCell,
}

/// Token for a speculation scope. Scopes compose as a stack: every
/// `begin_speculation` must be paired with exactly one `end_speculation`.
#[derive(Debug)]
#[must_use = "speculation scopes must be ended with end_speculation"]
pub struct SpeculationScope {
    mark: usize,
    was_speculating: bool,
}

// ---------------------------------------------------------------------------
// Unifier
// ---------------------------------------------------------------------------

/// A unification context.
///
/// Owns the type store (which mints variables), a read-only view of the
/// declared type classes, the link stash, and the speculation flag. `unify`
/// commits on success; `try_unify` rolls back on failure; `can_unify` never
/// commits.
#[derive(Debug, Clone)]
pub struct Unifier {
    store: TypeStore,
    classes: ClassRegistry,
    stash: Vec<StashedVar>,
    speculating: bool,
    /// When true, unification steps are recorded for observability tools.
    tracing: bool,
    trace: Vec<UnifyStep>,
}

impl Unifier {
    pub fn new() -> Self {
        Self::with_classes(ClassRegistry::new())
    }

    /// Create a context consuming a pre-built class registry.
    ///
    /// The registry's instance parameters must reference this context's
    /// store; build them through `classes_mut` when in doubt.
    pub fn with_classes(classes: ClassRegistry) -> Self {
        Self {
            store: TypeStore::new(),
            classes,
            stash: Vec::new(),
            speculating: false,
            tracing: false,
            trace: Vec::new(),
        }
    }

    pub fn store(&self) -> &TypeStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut TypeStore {
        &mut self.store
    }

    pub fn classes(&self) -> &ClassRegistry {
        &self.classes
    }

    /// Mutable registry access for declaration-time setup. The unifier
    /// itself only reads the registry.
    pub fn classes_mut(&mut self) -> &mut ClassRegistry {
        &mut self.classes
    }

    // -- Fresh variables (delegated to the store) --

    pub fn fresh_unbound(&mut self, level: u32) -> TypeId {
        self.store.fresh_unbound(level)
    }

    pub fn fresh_weak(&mut self, level: u32) -> TypeId {
        self.store.fresh_weak(level)
    }

    pub fn fresh_size_var(&mut self, level: u32) -> TypeId {
        self.store.fresh_size_var(level)
    }

    pub fn fresh_generic(&mut self) -> TypeId {
        self.store.fresh_generic()
    }

    // -- Tracing --

    /// Enable step-by-step unification tracing for observability tools.
    pub fn enable_tracing(&mut self) {
        self.tracing = true;
    }

    pub fn is_tracing(&self) -> bool {
        self.tracing
    }

    /// The recorded unification trace (empty if tracing was not enabled).
    pub fn unify_trace(&self) -> &[UnifyStep] {
        &self.trace
    }

    /// Take and clear the recorded trace.
    pub fn take_trace(&mut self) -> Vec<UnifyStep> {
        std::mem::take(&mut self.trace)
    }

    fn push_step(&mut self, action: UnifyAction, left: TypeId, right: TypeId, detail: String) {
        if !self.tracing {
            return;
        }
        let step = UnifyStep {
            step: self.trace.len(),
            action,
            left: self.store.display(left),
            right: self.store.display(right),
            detail,
        };
        self.trace.push(step);
    }

    // -- Journal --

    /// Current journal length. A later `unstash_links(snapshot() - k)`
    /// restores every cell mutated since the matching call.
    pub fn snapshot(&self) -> usize {
        self.stash.len()
    }

    /// Record a whole-cell snapshot. Append-only; idempotence not required.
    fn stash_link(&mut self, v: VarId) {
        self.stash.push(StashedVar {
            var: v,
            cell: self.store.var(v).clone(),
        });
    }

    /// Pop the last `n` journal entries, restoring each snapshot into its
    /// cell. Restoration is infallible: it only writes prior values.
    pub fn unstash_links(&mut self, n: usize) {
        for _ in 0..n {
            let Some(entry) = self.stash.pop() else {
                return;
            };
            *self.store.var_mut(entry.var) = entry.cell;
        }
    }

    /// Begin a speculative scope. Cell mutations made while any scope is
    /// open are journaled; scopes nest as a stack.
    pub fn begin_speculation(&mut self) -> SpeculationScope {
        let scope = SpeculationScope {
            mark: self.stash.len(),
            was_speculating: self.speculating,
        };
        self.speculating = true;
        scope
    }

    /// End a speculative scope.
    ///
    /// When `commit` is false, every cell mutated inside the scope is
    /// restored. When `commit` is true and an enclosing scope is still open,
    /// the journal entries are retained so the outer rollback can still
    /// restore them; with no enclosing scope they are discarded.
    pub fn end_speculation(&mut self, scope: SpeculationScope, commit: bool) {
        if !commit {
            self.unstash_links(self.stash.len() - scope.mark);
        }
        self.speculating = scope.was_speculating;
        if !scope.was_speculating {
            self.stash.truncate(scope.mark);
        }
    }

    /// Attempt a unification, rolling back all cell mutations on failure.
    pub fn try_unify(&mut self, a: TypeId, b: TypeId) -> Result<(), UnifyError> {
        let scope = self.begin_speculation();
        let outcome = self.unify(a, b);
        self.end_speculation(scope, outcome.is_ok());
        outcome
    }

    /// Test whether two types unify without committing anything.
    pub fn can_unify(&mut self, a: TypeId, b: TypeId) -> bool {
        let scope = self.begin_speculation();
        let outcome = self.unify(a, b);
        self.end_speculation(scope, false);
        outcome.is_ok()
    }

    // -- Occurs check with level adjustment --

    /// Walk the type being bound to `pivot`: reject self-reference, reject
    /// generic variables, and lower any unbound variable's level to `level`
    /// so generalization at intermediate levels cannot capture it.
    fn occurs_adjust(&mut self, pivot: VarId, level: u32, t: TypeId) -> Result<(), UnifyError> {
        match self.store.node(t).clone() {
            Ty::Var(v) => match self.store.var(v).state {
                VarState::Link(target) => self.occurs_adjust(pivot, level, target),
                VarState::Generic => Err(UnifyError::GenericInUnification),
                VarState::Unbound => {
                    if v == pivot {
                        self.push_step(
                            UnifyAction::OccursCheck,
                            self.store.var_node(pivot),
                            t,
                            format!("t{} occurs in the type it is bound to", pivot.0),
                        );
                        return Err(UnifyError::Recursive);
                    }
                    if self.store.var(v).level > level {
                        if self.speculating {
                            self.stash_link(v);
                        }
                        self.push_step(
                            UnifyAction::AdjustLevel,
                            self.store.var_node(v),
                            t,
                            format!("level {} -> {}", self.store.var(v).level, level),
                        );
                        self.store.var_mut(v).level = level;
                    }
                    Ok(())
                }
            },
            Ty::App(node) => {
                self.occurs_adjust(pivot, level, node.head)?;
                if let Some(under) = node.underlying {
                    self.occurs_adjust(pivot, level, under)?;
                }
                for arg in node.args {
                    self.occurs_adjust(pivot, level, arg)?;
                }
                Ok(())
            }
            Ty::Arrow { params, ret } => {
                for p in params {
                    self.occurs_adjust(pivot, level, p)?;
                }
                self.occurs_adjust(pivot, level, ret)
            }
            Ty::Record { row } | Ty::Variant { row } => self.occurs_adjust(pivot, level, row),
            Ty::RowExtend { labels, rest } => {
                for (_, types) in labels {
                    for ty in types {
                        self.occurs_adjust(pivot, level, ty)?;
                    }
                }
                self.occurs_adjust(pivot, level, rest)
            }
            Ty::Const(_) | Ty::Size(_) | Ty::RowEmpty | Ty::RecLink { .. } => Ok(()),
        }
    }

    // -- Constraints --

    /// Keep a constraint set minimal under the subclass relation: drop an
    /// incoming class subsumed by an existing subclass, replace an existing
    /// superclass with the incoming more specific one.
    fn merge_constraint(&self, existing: &mut Vec<ClassId>, incoming: ClassId) {
        for have in existing.iter_mut() {
            if *have == incoming || self.classes.is_subclass_of(*have, incoming) {
                return;
            }
            if self.classes.is_subclass_of(incoming, *have) {
                *have = incoming;
                return;
            }
        }
        existing.push(incoming);
    }

    /// Propagate or discharge the constraints of `a` when it is about to be
    /// linked to `b`.
    ///
    /// A size variable may only reach another variable or a size node. When
    /// `b` is a variable the constraints transfer (de-duplicated, most
    /// specific class retained); otherwise each constraint must be matched
    /// by an instance, probing subclasses before the class itself so the
    /// most specific overlapping instance wins.
    fn apply_constraints(&mut self, a: VarId, b: TypeId) -> Result<(), UnifyError> {
        let b = self.store.resolve(b);
        let b_var = self.store.as_var(b);

        if self.store.var(a).size
            && b_var.is_none()
            && !matches!(self.store.node(b), Ty::Size(_))
        {
            return Err(UnifyError::SizeMismatch {
                left: self.store.display(self.store.var_node(a)),
                right: self.store.display(b),
            });
        }

        let constraints = self.store.var(a).constraints.clone();
        if constraints.is_empty() {
            return Ok(());
        }

        if let Some(bv) = b_var {
            // Propagate to the link target.
            if self.speculating {
                self.stash_link(bv);
            }
            let mut merged = self.store.var(bv).constraints.clone();
            for c in &constraints {
                self.merge_constraint(&mut merged, *c);
            }
            self.push_step(
                UnifyAction::Propagate,
                self.store.var_node(a),
                b,
                format!("{} constraint(s) moved to t{}", constraints.len(), bv.0),
            );
            self.store.var_mut(bv).constraints = merged;
            self.store.var_mut(a).constraints.clear();
            return Ok(());
        }

        // Discharge each constraint against the class's instances. Overlap is
        // only allowed along the subclass relation and the search visits
        // subclasses first, so the first match is the most specific.
        let level = self.store.var(a).level;
        for c in constraints {
            let mut matched = false;
            for (owner, inst_param) in self.classes.instance_search(c) {
                let candidate = self.instantiate(level, inst_param);
                if self.try_unify(b, candidate).is_ok() {
                    self.push_step(
                        UnifyAction::Discharge,
                        b,
                        candidate,
                        format!(
                            "instance of `{}` satisfies constraint `{}`",
                            self.classes.name(owner),
                            self.classes.name(c)
                        ),
                    );
                    matched = true;
                    break;
                }
            }
            if !matched {
                return Err(UnifyError::NoInstance {
                    class: self.classes.name(c).to_string(),
                });
            }
        }
        Ok(())
    }

    // -- Weak marking --

    /// Mark the non-variable side of a binding weak: flag every variable and
    /// application reachable from `t` without crossing a recursive link.
    ///
    /// Every cell flipped is stashed first, so a failed speculative attempt
    /// restores the flags along with everything else. The node-level flag on
    /// applications sits outside the cell journal.
    fn mark_weak(&mut self, t: TypeId) {
        let t = self.store.resolve(t);
        match self.store.node(t).clone() {
            Ty::Var(v) => {
                if !self.store.var(v).weak {
                    if self.speculating {
                        self.stash_link(v);
                    }
                    self.store.var_mut(v).weak = true;
                }
            }
            Ty::App(node) => {
                self.store.set_app_weak(t);
                if let Some(under) = node.underlying {
                    self.mark_weak(under);
                }
                for arg in node.args {
                    self.mark_weak(arg);
                }
            }
            Ty::Arrow { params, ret } => {
                for p in params {
                    self.mark_weak(p);
                }
                self.mark_weak(ret);
            }
            Ty::Record { row } | Ty::Variant { row } => self.mark_weak(row),
            Ty::RowExtend { labels, rest } => {
                for (_, types) in labels {
                    for ty in types {
                        self.mark_weak(ty);
                    }
                }
                self.mark_weak(rest);
            }
            Ty::Const(_) | Ty::Size(_) | Ty::RowEmpty | Ty::RecLink { .. } => {}
        }
    }

    // -- Instantiation --

    /// Replace generic variables with fresh unbound variables at `level`.
    ///
    /// Shared generics map to one fresh variable; constraints and flavor
    /// flags carry over. Recursive groups whose parameters contain generics
    /// are copied under the same definition identity.
    pub fn instantiate(&mut self, level: u32, t: TypeId) -> TypeId {
        let mut vars = BTreeMap::new();
        let mut groups = BTreeMap::new();
        self.instantiate_inner(level, t, &mut vars, &mut groups)
    }

    fn instantiate_inner(
        &mut self,
        level: u32,
        t: TypeId,
        vars: &mut BTreeMap<VarId, TypeId>,
        groups: &mut BTreeMap<RecGroupId, RecGroupId>,
    ) -> TypeId {
        let t = self.store.resolve(t);
        match self.store.node(t).clone() {
            Ty::Var(v) => {
                if !self.store.var(v).is_generic() {
                    return t;
                }
                if let Some(existing) = vars.get(&v) {
                    return *existing;
                }
                let template = self.store.var(v).clone();
                let fresh = self.store.fresh_unbound(level);
                let fv = self
                    .store
                    .as_var(fresh)
                    .expect("fresh_unbound returns a var node");
                self.store.var_mut(fv).constraints = template.constraints;
                self.store.var_mut(fv).weak = template.weak;
                self.store.var_mut(fv).size = template.size;
                vars.insert(v, fresh);
                fresh
            }
            Ty::Const(_) | Ty::Size(_) | Ty::RowEmpty => t,
            Ty::App(node) => {
                let head = self.instantiate_inner(level, node.head, vars, groups);
                let underlying = match node.underlying {
                    Some(u) => Some(self.instantiate_inner(level, u, vars, groups)),
                    None => None,
                };
                let mut args = Vec::with_capacity(node.args.len());
                for arg in &node.args {
                    args.push(self.instantiate_inner(level, *arg, vars, groups));
                }
                if head == node.head && underlying == node.underlying && args == node.args {
                    return t;
                }
                match underlying {
                    Some(u) => self.store.alias(head, args, u),
                    None => self.store.app(head, args),
                }
            }
            Ty::Arrow { params, ret } => {
                let mut new_params = Vec::with_capacity(params.len());
                for p in &params {
                    new_params.push(self.instantiate_inner(level, *p, vars, groups));
                }
                let new_ret = self.instantiate_inner(level, ret, vars, groups);
                if new_params == params && new_ret == ret {
                    return t;
                }
                self.store.arrow(new_params, new_ret)
            }
            Ty::Record { row } => {
                let new_row = self.instantiate_inner(level, row, vars, groups);
                if new_row == row {
                    return t;
                }
                self.store.record(new_row)
            }
            Ty::Variant { row } => {
                let new_row = self.instantiate_inner(level, row, vars, groups);
                if new_row == row {
                    return t;
                }
                self.store.variant(new_row)
            }
            Ty::RowExtend { labels, rest } => {
                let mut new_labels = LabelMap::new();
                let mut changed = false;
                for (label, types) in &labels {
                    let mut new_types = Vec::with_capacity(types.len());
                    for ty in types {
                        let new_ty = self.instantiate_inner(level, *ty, vars, groups);
                        changed |= new_ty != *ty;
                        new_types.push(new_ty);
                    }
                    new_labels.insert(label.clone(), new_types);
                }
                let new_rest = self.instantiate_inner(level, rest, vars, groups);
                changed |= new_rest != rest;
                if !changed {
                    return t;
                }
                self.store.row_extend(new_labels, new_rest)
            }
            Ty::RecLink { group, index } => {
                if let Some(copy) = groups.get(&group) {
                    return self.store.rec_link(*copy, index);
                }
                let params = self.store.rec_group(group).params.clone();
                let needs_copy = params.iter().any(|p| {
                    let r = self.store.resolve(*p);
                    self.store
                        .as_var(r)
                        .is_some_and(|v| self.store.var(v).is_generic())
                });
                if !needs_copy {
                    return t;
                }
                let mut new_params = Vec::with_capacity(params.len());
                for p in &params {
                    new_params.push(self.instantiate_inner(level, *p, vars, groups));
                }
                let copy = self.store.copy_recursive(group, new_params);
                groups.insert(group, copy);
                let bodies = self.store.rec_group(group).bodies.clone();
                let mut new_bodies = Vec::with_capacity(bodies.len());
                for body in bodies {
                    new_bodies.push(self.instantiate_inner(level, body, vars, groups));
                }
                self.store.set_rec_bodies(copy, new_bodies);
                self.store.rec_link(copy, index)
            }
        }
    }

    // -- Core unification --

    /// Unify two types, committing on success.
    ///
    /// A sub-unification failure aborts the whole attempt; only `try_unify`
    /// and `can_unify` suppress errors, and only at their own boundary.
    pub fn unify(&mut self, a: TypeId, b: TypeId) -> Result<(), UnifyError> {
        let a = self.store.resolve(a);
        let b = self.store.resolve(b);
        if a == b {
            return Ok(());
        }

        let na = self.store.node(a).clone();
        let nb = self.store.node(b).clone();

        // Recursive links: matching links unify their group parameters; a
        // lone link is unrolled one step and retried.
        if let Ty::RecLink {
            group: ga,
            index: ia,
        } = na
        {
            if let Ty::RecLink {
                group: gb,
                index: ib,
            } = nb
            {
                let def_a = self.store.rec_group(ga).def;
                let def_b = self.store.rec_group(gb).def;
                if def_a != def_b || ia != ib {
                    return Err(UnifyError::HeadMismatch {
                        left: self.store.display(a),
                        right: self.store.display(b),
                    });
                }
                let params_a = self.store.rec_group(ga).params.clone();
                let params_b = self.store.rec_group(gb).params.clone();
                if params_a.len() != params_b.len() {
                    return Err(UnifyError::ArityMismatch {
                        kind: ArityKind::RecursiveParams,
                    });
                }
                for (x, y) in params_a.into_iter().zip(params_b) {
                    self.unify(x, y)?;
                }
                return Ok(());
            }
            self.push_step(UnifyAction::Unroll, a, b, "unroll left recursive link".into());
            let unrolled = self.store.unroll(ga, ia);
            return self.unify(unrolled, b);
        }
        if let Ty::RecLink { group, index } = nb {
            self.push_step(UnifyAction::Unroll, a, b, "unroll right recursive link".into());
            let unrolled = self.store.unroll(group, index);
            return self.unify(a, unrolled);
        }

        // A variable on either side binds to the other.
        if matches!(na, Ty::Var(_)) || matches!(nb, Ty::Var(_)) {
            return self.unify_var(a, na, b, nb);
        }

        // Transparent aliases: a lone alias against a non-application
        // unifies through its expansion; two aliases unify their expansions
        // and then their surfaces.
        let under_a = match &na {
            Ty::App(node) => node.underlying,
            _ => None,
        };
        let under_b = match &nb {
            Ty::App(node) => node.underlying,
            _ => None,
        };
        match (under_a, under_b) {
            (Some(ua), None) if !matches!(nb, Ty::App(_)) => {
                self.push_step(UnifyAction::ExpandAlias, a, b, "expand left alias".into());
                return self.unify(ua, b);
            }
            (None, Some(ub)) => {
                if !matches!(na, Ty::App(_)) {
                    self.push_step(UnifyAction::ExpandAlias, a, b, "expand right alias".into());
                    return self.unify(ub, a);
                }
                // Both are applications; swap so the alias is on the left
                // and converges below.
                return self.unify(b, a);
            }
            (Some(ua), Some(ub)) => {
                self.unify(ua, ub)?;
            }
            (None, None) => {}
            (Some(_), None) => {}
        }

        match (na, nb) {
            (Ty::Const(x), Ty::Const(y)) => {
                if x == y {
                    Ok(())
                } else {
                    Err(UnifyError::HeadMismatch { left: x, right: y })
                }
            }
            (Ty::Size(x), Ty::Size(y)) => {
                if x == y {
                    Ok(())
                } else {
                    Err(UnifyError::SizeMismatch {
                        left: x.to_string(),
                        right: y.to_string(),
                    })
                }
            }
            (Ty::App(x), Ty::App(y)) => {
                self.unify(x.head, y.head)?;
                if x.args.len() != y.args.len() {
                    return Err(UnifyError::ArityMismatch {
                        kind: ArityKind::App,
                    });
                }
                for (p, q) in x.args.into_iter().zip(y.args) {
                    self.unify(p, q)?;
                }
                // Aliases converge on the shared expansion.
                if let Some(ua) = under_a
                    && under_b.is_none()
                {
                    self.store.set_underlying(b, ua);
                }
                Ok(())
            }
            (
                Ty::Arrow {
                    params: pa,
                    ret: ra,
                },
                Ty::Arrow {
                    params: pb,
                    ret: rb,
                },
            ) => {
                if pa.len() != pb.len() {
                    return Err(UnifyError::ArityMismatch {
                        kind: ArityKind::Arrow,
                    });
                }
                for (p, q) in pa.into_iter().zip(pb) {
                    self.unify(p, q)?;
                }
                self.unify(ra, rb)
            }
            (Ty::Record { row: ra }, Ty::Record { row: rb }) => self.unify(ra, rb),
            (Ty::Variant { row: ra }, Ty::Variant { row: rb }) => self.unify(ra, rb),
            (Ty::RowExtend { .. }, Ty::RowExtend { .. }) => self.unify_rows(a, b),
            (Ty::RowEmpty, Ty::RowEmpty) => Ok(()),
            (Ty::RowEmpty, Ty::RowExtend { .. }) | (Ty::RowExtend { .. }, Ty::RowEmpty) => {
                // A closed row cannot absorb the extension's labels.
                let ext = if matches!(self.store.node(a), Ty::RowExtend { .. }) {
                    a
                } else {
                    b
                };
                let labels = match self.store.flatten_row(ext) {
                    Some((labels, _)) => labels.into_keys().collect(),
                    None => return Err(UnifyError::InvalidRowState),
                };
                Err(UnifyError::ClosedRowMissingLabels { labels })
            }
            _ => {
                self.push_step(UnifyAction::Error, a, b, "head mismatch".into());
                Err(UnifyError::HeadMismatch {
                    left: self.store.display(a),
                    right: self.store.display(b),
                })
            }
        }
    }

    /// Bind the variable side to the other side: journal, propagate flavor
    /// flags, occurs-adjust, run the constraint engine, link.
    fn unify_var(&mut self, a: TypeId, na: Ty, b: TypeId, nb: Ty) -> Result<(), UnifyError> {
        // Ensure the variable is on the left.
        let (a, b, nb) = if matches!(na, Ty::Var(_)) {
            (a, b, nb)
        } else {
            (b, a, na)
        };
        let av = self
            .store
            .as_var(a)
            .expect("left operand is a variable node");

        if self.store.var(av).is_generic() {
            return Err(UnifyError::GenericInUnification);
        }

        if self.speculating {
            self.stash_link(av);
        }

        if let Ty::Var(bv) = nb {
            if self.store.var(bv).is_unbound() && av == bv {
                return Err(UnifyError::Recursive);
            }
            if self.speculating {
                self.stash_link(bv);
            }
            // Weak and Size flavors are contagious in both directions.
            let (aw, bw) = (self.store.var(av).weak, self.store.var(bv).weak);
            if aw && !bw {
                self.store.var_mut(bv).weak = true;
            } else if !aw && bw {
                self.store.var_mut(av).weak = true;
            }
            let (asz, bsz) = (self.store.var(av).size, self.store.var(bv).size);
            if asz && !bsz {
                self.store.var_mut(bv).size = true;
            } else if !asz && bsz {
                self.store.var_mut(av).size = true;
            }
        } else if self.store.var(av).weak {
            self.mark_weak(b);
        }

        let level = self.store.var(av).level;
        self.occurs_adjust(av, level, b)?;
        self.apply_constraints(av, b)?;

        // Binding to a weak application makes the variable weak too.
        let resolved_b = self.store.resolve(b);
        let b_is_weak_app = matches!(self.store.node(resolved_b), Ty::App(node) if node.weak);
        if b_is_weak_app {
            self.store.var_mut(av).weak = true;
        }

        self.push_step(
            UnifyAction::Bind,
            a,
            b,
            format!("t{} := {}", av.0, self.store.display(b)),
        );
        self.store.var_mut(av).state = VarState::Link(b);
        Ok(())
    }

    // -- Rows --

    /// Unify the shorter common suffix pairwise from the high-index end, so
    /// extra entries live at low indices (field-shadowing order). Returns
    /// the extra prefix from each side.
    fn unify_lists(
        &mut self,
        a: &[TypeId],
        b: &[TypeId],
    ) -> Result<(Vec<TypeId>, Vec<TypeId>), UnifyError> {
        // Common case for unscoped labels.
        if a.len() == 1 && b.len() == 1 {
            self.unify(a[0], b[0])?;
            return Ok((Vec::new(), Vec::new()));
        }
        let n = a.len().min(b.len());
        for i in 0..n {
            self.unify(a[a.len() - n + i], b[b.len() - n + i])?;
        }
        Ok((a[..a.len() - n].to_vec(), b[..b.len() - n].to_vec()))
    }

    /// Row unification: flatten both rows, unify shared labels, then absorb
    /// each side's missing labels through the other's tail.
    fn unify_rows(&mut self, a: TypeId, b: TypeId) -> Result<(), UnifyError> {
        self.push_step(UnifyAction::UnifyRows, a, b, "flatten and diff labels".into());
        let (labels_a, tail_a) = self
            .store
            .flatten_row(a)
            .ok_or(UnifyError::InvalidRowState)?;
        let (labels_b, tail_b) = self
            .store
            .flatten_row(b)
            .ok_or(UnifyError::InvalidRowState)?;

        // Labels absent from each side, including per-label surplus when the
        // scoped lists have different lengths.
        let mut missing_a = LabelMap::new();
        let mut missing_b = LabelMap::new();
        for (label, types_a) in &labels_a {
            if !labels_b.contains_key(label) {
                missing_b.insert(label.clone(), types_a.clone());
            }
        }
        for (label, types_b) in &labels_b {
            match labels_a.get(label) {
                None => {
                    missing_a.insert(label.clone(), types_b.clone());
                }
                Some(types_a) => {
                    let (extra_a, extra_b) = self.unify_lists(types_a, types_b)?;
                    if !extra_a.is_empty() {
                        missing_b.insert(label.clone(), extra_a);
                    }
                    if !extra_b.is_empty() {
                        missing_a.insert(label.clone(), extra_b);
                    }
                }
            }
        }

        match (missing_a.is_empty(), missing_b.is_empty()) {
            (true, true) => self.unify(tail_a, tail_b),
            (true, false) => {
                let ext = self.store.row_extend(missing_b, tail_a);
                self.unify(tail_b, ext)
            }
            (false, true) => {
                let ext = self.store.row_extend(missing_a, tail_b);
                self.unify(tail_a, ext)
            }
            (false, false) => match self.store.node(tail_a).clone() {
                Ty::RowEmpty => Err(UnifyError::ClosedRowMissingLabels {
                    labels: missing_a.into_keys().collect(),
                }),
                Ty::Var(v) if self.store.var(v).is_unbound() => {
                    let level = self.store.var(v).level;
                    let fresh = self.store.fresh_unbound(level);
                    self.push_step(
                        UnifyAction::FreshTail,
                        a,
                        b,
                        format!("shared tail {} for both open rows", self.store.display(fresh)),
                    );
                    let ext_b = self.store.row_extend(missing_b, fresh);
                    self.unify(tail_b, ext_b)?;
                    // Absorbing b's labels must not have re-entered a's tail.
                    if !self.store.var(v).is_unbound() {
                        return Err(UnifyError::RecursiveRow);
                    }
                    let ext_a = self.store.row_extend(missing_a, fresh);
                    self.unify(tail_a, ext_a)
                }
                _ => Err(UnifyError::InvalidRowState),
            },
        }
    }
}

impl Default for Unifier {
    fn default() -> Self {
        Self::new()
    }
}


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
