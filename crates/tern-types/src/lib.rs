//! Type representations for Tern.
//!
//! This crate defines the semantic types consumed by the unifier: the tagged
//! universe of type nodes, the arena they live in (`TypeStore`), mutable
//! variable cells, row types with flattening, equi-recursive groups, and the
//! type-class registry with subclass-first instance search.
//!
//! Sharing is by id, not by pointer: every node is addressed by a `TypeId`
//! into the store, and cycles are permitted only through `RecLink`
//! indirection. Variable cells are the sole site of mutation during
//! unification; everything else is written once at construction (aliases
//! converging on a shared expansion are the one exception).

use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Handle to a type node in a [`TypeStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

/// Stable identifier for a type variable cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub u32);

/// Handle to a recursive type group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecGroupId(pub u32);

/// Handle to a type class in a [`ClassRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub u32);

/// A row label. Uses String for now; can switch to interned strings later.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub String);

impl Label {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Type nodes
// ---------------------------------------------------------------------------

/// Label map for a row extension.
///
/// A label maps to an ordered *list* of types: rows encode scoped fields, so
/// the same label may carry several entries, most recent shadow first.
pub type LabelMap = BTreeMap<Label, Vec<TypeId>>;

/// A type application, optionally carrying an alias expansion.
///
/// When `underlying` is present the node is a transparent alias: its surface
/// head and args unify structurally, and the expansion participates so the
/// alias can also unify with the aliased shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppNode {
    pub head: TypeId,
    pub args: Vec<TypeId>,
    pub underlying: Option<TypeId>,
    /// Weakness inherited from a weak variable this application was bound to.
    pub weak: bool,
}

/// A semantic type in Tern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ty {
    /// Nullary base type, e.g. `Int`.
    Const(String),
    /// Fixed numeric kind tag. Unifies only with an equal `Size`.
    Size(u32),
    /// Reference to a variable cell.
    Var(VarId),
    /// Type application / alias carrier.
    App(AppNode),
    /// Function type.
    Arrow { params: Vec<TypeId>, ret: TypeId },
    /// Row-kinded record payload.
    Record { row: TypeId },
    /// Row-kinded variant payload.
    Variant { row: TypeId },
    /// Terminal row.
    RowEmpty,
    /// Open or closed row extension. `labels` is non-empty after flattening.
    RowExtend { labels: LabelMap, rest: TypeId },
    /// Shared pointer into a mutually recursive type group.
    RecLink { group: RecGroupId, index: u32 },
}

// ---------------------------------------------------------------------------
// Variable cells
// ---------------------------------------------------------------------------

/// The single mutable state of a variable cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarState {
    Unbound,
    Link(TypeId),
    /// Generalized. Must be instantiated before reaching unification.
    Generic,
}

/// A mutable slot for a type variable.
///
/// Flags are orthogonal to state: `weak` marks a variable that must not be
/// generalized (contagious under unification), `size` restricts the variable
/// to the Size kind. The unifier journals whole-cell snapshots of these
/// during speculation, so the struct stays `PartialEq` for byte-for-byte
/// restoration checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarCell {
    pub state: VarState,
    /// Let-depth at which the variable was minted; only lowered afterwards.
    pub level: u32,
    /// Ordered type-class constraints attached to this variable.
    pub constraints: Vec<ClassId>,
    pub weak: bool,
    pub size: bool,
}

impl VarCell {
    pub fn is_unbound(&self) -> bool {
        matches!(self.state, VarState::Unbound)
    }

    pub fn is_generic(&self) -> bool {
        matches!(self.state, VarState::Generic)
    }

    pub fn link(&self) -> Option<TypeId> {
        match self.state {
            VarState::Link(t) => Some(t),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Recursive groups
// ---------------------------------------------------------------------------

/// A group of mutually recursive type bodies.
///
/// `def` is the shared definition identity: instantiated copies of a group
/// keep the originating `def`, and two `RecLink`s are unifiable only when
/// their groups share it. `params` are the variables the bodies are
/// parameterized over; `bodies` are set after the links into the group have
/// been created, closing the cycle through the arena.
#[derive(Debug, Clone)]
pub struct RecGroup {
    pub def: u32,
    pub params: Vec<TypeId>,
    pub bodies: Vec<TypeId>,
}

// ---------------------------------------------------------------------------
// The store
// ---------------------------------------------------------------------------

/// Arena for type nodes, variable cells, and recursive groups.
///
/// Also the variable tracker: variables are minted here with monotonically
/// increasing ids. Cells are mutated only by the unifier.
#[derive(Debug, Clone)]
pub struct TypeStore {
    nodes: Vec<Ty>,
    vars: Vec<VarCell>,
    /// `VarId` -> the `Ty::Var` node referencing it.
    var_nodes: Vec<TypeId>,
    groups: Vec<RecGroup>,
    next_def: u32,
    row_empty: TypeId,
}

impl TypeStore {
    pub fn new() -> Self {
        let mut store = Self {
            nodes: Vec::new(),
            vars: Vec::new(),
            var_nodes: Vec::new(),
            groups: Vec::new(),
            next_def: 0,
            row_empty: TypeId(0),
        };
        store.row_empty = store.add(Ty::RowEmpty);
        store
    }

    fn add(&mut self, node: Ty) -> TypeId {
        let id = TypeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn node(&self, t: TypeId) -> &Ty {
        &self.nodes[t.0 as usize]
    }

    /// The cell id behind a `Ty::Var` node, if this is one.
    pub fn as_var(&self, t: TypeId) -> Option<VarId> {
        match self.node(t) {
            Ty::Var(v) => Some(*v),
            _ => None,
        }
    }

    // -- Constructors --

    pub fn const_(&mut self, name: impl Into<String>) -> TypeId {
        self.add(Ty::Const(name.into()))
    }

    pub fn size(&mut self, n: u32) -> TypeId {
        self.add(Ty::Size(n))
    }

    pub fn app(&mut self, head: TypeId, args: Vec<TypeId>) -> TypeId {
        self.add(Ty::App(AppNode {
            head,
            args,
            underlying: None,
            weak: false,
        }))
    }

    /// A type application carrying an alias expansion.
    pub fn alias(&mut self, head: TypeId, args: Vec<TypeId>, underlying: TypeId) -> TypeId {
        self.add(Ty::App(AppNode {
            head,
            args,
            underlying: Some(underlying),
            weak: false,
        }))
    }

    pub fn arrow(&mut self, params: Vec<TypeId>, ret: TypeId) -> TypeId {
        self.add(Ty::Arrow { params, ret })
    }

    pub fn record(&mut self, row: TypeId) -> TypeId {
        self.add(Ty::Record { row })
    }

    pub fn variant(&mut self, row: TypeId) -> TypeId {
        self.add(Ty::Variant { row })
    }

    /// The shared terminal row.
    pub fn row_empty(&self) -> TypeId {
        self.row_empty
    }

    pub fn row_extend(&mut self, labels: LabelMap, rest: TypeId) -> TypeId {
        self.add(Ty::RowExtend { labels, rest })
    }

    /// Convenience: a row extension with one type per label.
    pub fn row(&mut self, fields: Vec<(&str, TypeId)>, rest: TypeId) -> TypeId {
        let mut labels = LabelMap::new();
        for (label, ty) in fields {
            labels.entry(Label::new(label)).or_default().push(ty);
        }
        self.row_extend(labels, rest)
    }

    // -- Variables --

    fn fresh_cell(&mut self, cell: VarCell) -> TypeId {
        let var = VarId(self.vars.len() as u32);
        self.vars.push(cell);
        let node = self.add(Ty::Var(var));
        self.var_nodes.push(node);
        node
    }

    /// Mint a fresh unbound variable at the given level.
    pub fn fresh_unbound(&mut self, level: u32) -> TypeId {
        self.fresh_cell(VarCell {
            state: VarState::Unbound,
            level,
            constraints: Vec::new(),
            weak: false,
            size: false,
        })
    }

    /// Mint a fresh weak (non-generalizable) variable.
    pub fn fresh_weak(&mut self, level: u32) -> TypeId {
        self.fresh_cell(VarCell {
            state: VarState::Unbound,
            level,
            constraints: Vec::new(),
            weak: true,
            size: false,
        })
    }

    /// Mint a fresh variable restricted to the Size kind.
    pub fn fresh_size_var(&mut self, level: u32) -> TypeId {
        self.fresh_cell(VarCell {
            state: VarState::Unbound,
            level,
            constraints: Vec::new(),
            weak: false,
            size: true,
        })
    }

    /// Mint a fresh generic (generalized) variable.
    pub fn fresh_generic(&mut self) -> TypeId {
        self.fresh_cell(VarCell {
            state: VarState::Generic,
            level: 0,
            constraints: Vec::new(),
            weak: false,
            size: false,
        })
    }

    pub fn var(&self, v: VarId) -> &VarCell {
        &self.vars[v.0 as usize]
    }

    /// Mutable access to a variable cell.
    ///
    /// Mutation is routed through the unifier so speculative changes get
    /// journaled; other callers should treat cells as read-only.
    pub fn var_mut(&mut self, v: VarId) -> &mut VarCell {
        &mut self.vars[v.0 as usize]
    }

    /// The `Ty::Var` node referencing a cell.
    pub fn var_node(&self, v: VarId) -> TypeId {
        self.var_nodes[v.0 as usize]
    }

    /// Number of variable cells minted so far.
    pub fn var_count(&self) -> usize {
        self.vars.len()
    }

    /// Snapshot of every variable cell, for whole-state comparison in tests.
    pub fn var_cells(&self) -> &[VarCell] {
        &self.vars
    }

    /// Dereference a chain of link variables to its non-link target.
    pub fn resolve(&self, t: TypeId) -> TypeId {
        let mut t = t;
        while let Ty::Var(v) = self.node(t) {
            match self.var(*v).state {
                VarState::Link(target) => t = target,
                _ => break,
            }
        }
        t
    }

    // -- Recursive groups --

    /// Create a recursive group over the given parameter variables.
    ///
    /// Bodies are attached afterwards via [`TypeStore::set_rec_bodies`], once
    /// links into the group exist.
    pub fn recursive(&mut self, params: Vec<TypeId>) -> RecGroupId {
        let id = RecGroupId(self.groups.len() as u32);
        let def = self.next_def;
        self.next_def += 1;
        self.groups.push(RecGroup {
            def,
            params,
            bodies: Vec::new(),
        });
        id
    }

    /// Copy a group under the same definition identity (for instantiation).
    pub fn copy_recursive(&mut self, group: RecGroupId, params: Vec<TypeId>) -> RecGroupId {
        let id = RecGroupId(self.groups.len() as u32);
        let def = self.groups[group.0 as usize].def;
        self.groups.push(RecGroup {
            def,
            params,
            bodies: Vec::new(),
        });
        id
    }

    /// A link into a recursive group, unrolled one step on demand.
    pub fn rec_link(&mut self, group: RecGroupId, index: u32) -> TypeId {
        self.add(Ty::RecLink { group, index })
    }

    pub fn set_rec_bodies(&mut self, group: RecGroupId, bodies: Vec<TypeId>) {
        self.groups[group.0 as usize].bodies = bodies;
    }

    pub fn rec_group(&self, group: RecGroupId) -> &RecGroup {
        &self.groups[group.0 as usize]
    }

    /// Unroll a recursive link one step.
    pub fn unroll(&self, group: RecGroupId, index: u32) -> TypeId {
        self.groups[group.0 as usize].bodies[index as usize]
    }

    // -- Alias and weakness mutation --

    /// Fill in a missing alias expansion after aliases converge.
    pub fn set_underlying(&mut self, app: TypeId, underlying: TypeId) {
        if let Ty::App(node) = &mut self.nodes[app.0 as usize] {
            node.underlying = Some(underlying);
        }
    }

    /// Flag an application node weak.
    pub fn set_app_weak(&mut self, app: TypeId) {
        if let Ty::App(node) = &mut self.nodes[app.0 as usize] {
            node.weak = true;
        }
    }

    /// Mark a type weak: flag every variable and application reachable from
    /// it without crossing a recursive link.
    ///
    /// This is a construction-time utility; during unification the unifier
    /// runs its own walk so the variable-cell flips get journaled.
    pub fn mark_weak(&mut self, t: TypeId) {
        let t = self.resolve(t);
        match self.node(t).clone() {
            Ty::Var(v) => self.var_mut(v).weak = true,
            Ty::App(node) => {
                if let Ty::App(n) = &mut self.nodes[t.0 as usize] {
                    n.weak = true;
                }
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

    // -- Rows --

    /// Flatten a row into a single label map and terminal tail.
    ///
    /// Merges nested extensions outermost-first, so shadowing entries sit at
    /// low indices of each label's list. Link variables along the spine are
    /// resolved. Returns `None` when a non-row node sits in tail position.
    pub fn flatten_row(&self, row: TypeId) -> Option<(LabelMap, TypeId)> {
        let mut labels = LabelMap::new();
        let mut rest = self.resolve(row);
        loop {
            match self.node(rest) {
                Ty::RowExtend {
                    labels: more,
                    rest: tail,
                } => {
                    for (label, types) in more {
                        labels
                            .entry(label.clone())
                            .or_default()
                            .extend(types.iter().copied());
                    }
                    rest = self.resolve(*tail);
                }
                Ty::RowEmpty => return Some((labels, rest)),
                Ty::Var(v) if self.var(*v).is_unbound() || self.var(*v).is_generic() => {
                    return Some((labels, rest));
                }
                _ => return None,
            }
        }
    }

    // -- Display --

    /// Render a type for diagnostics.
    pub fn display(&self, t: TypeId) -> String {
        let mut out = String::new();
        self.write_type(&mut out, t);
        out
    }

    fn write_type(&self, out: &mut String, t: TypeId) {
        use std::fmt::Write;

        let t = self.resolve(t);
        match self.node(t) {
            Ty::Const(name) => out.push_str(name),
            Ty::Size(n) => {
                let _ = write!(out, "{n}");
            }
            Ty::Var(v) => {
                let cell = self.var(*v);
                let prefix = if cell.is_generic() { 'g' } else { 't' };
                let _ = write!(out, "{prefix}{}", v.0);
            }
            Ty::App(node) => {
                self.write_type(out, node.head);
                out.push('(');
                for (i, arg) in node.args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.write_type(out, *arg);
                }
                out.push(')');
            }
            Ty::Arrow { params, ret } => {
                out.push('(');
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.write_type(out, *p);
                }
                out.push_str(") -> ");
                self.write_type(out, *ret);
            }
            Ty::Record { row } => {
                out.push('{');
                self.write_row(out, *row);
                out.push('}');
            }
            Ty::Variant { row } => {
                out.push('[');
                self.write_row(out, *row);
                out.push(']');
            }
            Ty::RowEmpty => out.push_str("{}"),
            Ty::RowExtend { .. } => {
                out.push('(');
                self.write_row(out, t);
                out.push(')');
            }
            Ty::RecLink { group, index } => {
                let def = self.rec_group(*group).def;
                let _ = write!(out, "rec{def}.{index}");
            }
        }
    }

    fn write_row(&self, out: &mut String, row: TypeId) {
        use std::fmt::Write;

        let Some((labels, tail)) = self.flatten_row(row) else {
            out.push_str("<invalid row>");
            return;
        };
        let mut first = true;
        for (label, types) in &labels {
            for ty in types {
                if !first {
                    out.push_str(", ");
                }
                first = false;
                let _ = write!(out, "{label}: ");
                self.write_type(out, *ty);
            }
        }
        if let Ty::Var(v) = self.node(tail) {
            if !first {
                out.push_str(" | ");
            }
            let _ = write!(out, "t{}", v.0);
        }
    }
}

impl Default for TypeStore {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Type classes
// ---------------------------------------------------------------------------

/// A parameterized type class.
///
/// Instance overlap is allowed only along the subclass relation; the
/// registry's search order makes the most specific instance win.
#[derive(Debug, Clone)]
pub struct TypeClass {
    pub name: String,
    /// Declaration parameter (a generic variable in the store).
    pub param: TypeId,
    pub supers: Vec<ClassId>,
    pub subs: Vec<ClassId>,
    pub instances: Vec<Instance>,
}

/// An instance of a type class. `param` may contain generic variables and is
/// instantiated before matching.
#[derive(Debug, Clone)]
pub struct Instance {
    pub param: TypeId,
}

/// Read-only capability consumed by the unifier: the set of declared type
/// classes, their subclass DAG, and their instances.
#[derive(Debug, Clone, Default)]
pub struct ClassRegistry {
    classes: Vec<TypeClass>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, name: impl Into<String>, param: TypeId) -> ClassId {
        let id = ClassId(self.classes.len() as u32);
        self.classes.push(TypeClass {
            name: name.into(),
            param,
            supers: Vec::new(),
            subs: Vec::new(),
            instances: Vec::new(),
        });
        id
    }

    /// Register `sub` as a subclass of `superclass`.
    pub fn add_subclass(&mut self, superclass: ClassId, sub: ClassId) {
        if self.classes[superclass.0 as usize].subs.contains(&sub) {
            return;
        }
        self.classes[superclass.0 as usize].subs.push(sub);
        self.classes[sub.0 as usize].supers.push(superclass);
    }

    pub fn add_instance(&mut self, class: ClassId, param: TypeId) {
        self.classes[class.0 as usize]
            .instances
            .push(Instance { param });
    }

    pub fn class(&self, id: ClassId) -> &TypeClass {
        &self.classes[id.0 as usize]
    }

    pub fn name(&self, id: ClassId) -> &str {
        &self.classes[id.0 as usize].name
    }

    /// Whether `sub` is a (transitive) subclass of `sup`.
    pub fn is_subclass_of(&self, sub: ClassId, sup: ClassId) -> bool {
        if sub == sup {
            return false;
        }
        let mut stack = vec![sub];
        let mut seen = std::collections::BTreeSet::new();
        while let Some(c) = stack.pop() {
            if !seen.insert(c) {
                continue;
            }
            for s in &self.classes[c.0 as usize].supers {
                if *s == sup {
                    return true;
                }
                stack.push(*s);
            }
        }
        false
    }

    /// Candidate instances for a class, subclasses first.
    ///
    /// Visits the subclass DAG depth-first with each class visited at most
    /// once (diamonds are de-duplicated), yielding a class's instances in
    /// declaration order after all of its subclasses' instances. The caller
    /// stops on the first accepted candidate.
    pub fn instance_search(&self, class: ClassId) -> InstanceSearch {
        let mut order = Vec::new();
        let mut seen = std::collections::BTreeSet::new();
        self.push_candidates(class, &mut seen, &mut order);
        InstanceSearch {
            candidates: order.into_iter(),
        }
    }

    /// Total number of declared classes.
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    fn push_candidates(
        &self,
        class: ClassId,
        seen: &mut std::collections::BTreeSet<ClassId>,
        order: &mut Vec<(ClassId, TypeId)>,
    ) {
        if !seen.insert(class) {
            return;
        }
        for sub in &self.classes[class.0 as usize].subs {
            self.push_candidates(*sub, seen, order);
        }
        for inst in &self.classes[class.0 as usize].instances {
            order.push((class, inst.param));
        }
    }
}

/// Iterator over candidate instances in subclass-first order.
pub struct InstanceSearch {
    candidates: std::vec::IntoIter<(ClassId, TypeId)>,
}

impl Iterator for InstanceSearch {
    type Item = (ClassId, TypeId);

    fn next(&mut self) -> Option<Self::Item> {
        self.candidates.next()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_follows_link_chains() {
        let mut store = TypeStore::new();
        let int = store.const_("Int");
        let a = store.fresh_unbound(0);
        let b = store.fresh_unbound(0);
        let Ty::Var(av) = *store.node(a) else {
            panic!("expected var node");
        };
        let Ty::Var(bv) = *store.node(b) else {
            panic!("expected var node");
        };
        store.var_mut(av).state = VarState::Link(b);
        store.var_mut(bv).state = VarState::Link(int);

        assert_eq!(store.resolve(a), int);
        assert_eq!(store.resolve(int), int);
    }

    #[test]
    fn flatten_merges_nested_extensions_outermost_first() {
        let mut store = TypeStore::new();
        let int = store.const_("Int");
        let string = store.const_("String");
        let empty = store.row_empty();
        let inner = store.row(vec![("x", string), ("y", int)], empty);
        let outer = store.row(vec![("x", int)], inner);

        let (labels, tail) = store.flatten_row(outer).expect("row flattens");
        assert_eq!(tail, empty);
        assert_eq!(labels[&Label::new("x")], vec![int, string]);
        assert_eq!(labels[&Label::new("y")], vec![int]);
    }

    #[test]
    fn flatten_resolves_linked_tails() {
        let mut store = TypeStore::new();
        let int = store.const_("Int");
        let string = store.const_("String");
        let tail_var = store.fresh_unbound(0);
        let outer = store.row(vec![("x", int)], tail_var);

        let empty = store.row_empty();
        let linked = store.row(vec![("y", string)], empty);
        let Ty::Var(v) = *store.node(tail_var) else {
            panic!("expected var node");
        };
        store.var_mut(v).state = VarState::Link(linked);

        let (labels, tail) = store.flatten_row(outer).expect("row flattens");
        assert_eq!(tail, empty);
        assert_eq!(labels.len(), 2);
        assert_eq!(labels[&Label::new("y")], vec![string]);
    }

    #[test]
    fn flatten_rejects_non_row_tail() {
        let mut store = TypeStore::new();
        let int = store.const_("Int");
        let bad = store.row(vec![("x", int)], int);
        assert!(store.flatten_row(bad).is_none());
    }

    #[test]
    fn mark_weak_flags_vars_and_apps_but_not_rec_links() {
        let mut store = TypeStore::new();
        let list = store.const_("List");
        let a = store.fresh_unbound(0);
        let app = store.app(list, vec![a]);

        let param = store.fresh_unbound(0);
        let group = store.recursive(vec![param]);
        let link = store.rec_link(group, 0);
        store.set_rec_bodies(group, vec![link]);

        let arrow = store.arrow(vec![app], link);
        store.mark_weak(arrow);

        let Ty::Var(av) = *store.node(a) else {
            panic!("expected var node");
        };
        assert!(store.var(av).weak);
        let Ty::App(node) = store.node(app) else {
            panic!("expected app node");
        };
        assert!(node.weak);
        // The recursive group's parameter is untouched.
        let Ty::Var(pv) = *store.node(param) else {
            panic!("expected var node");
        };
        assert!(!store.var(pv).weak);
    }

    #[test]
    fn display_renders_rows_and_arrows() {
        let mut store = TypeStore::new();
        let int = store.const_("Int");
        let string = store.const_("String");
        let tail = store.fresh_unbound(0);
        let row = store.row(vec![("age", int), ("name", string)], tail);
        let record = store.record(row);
        let arrow = store.arrow(vec![record], int);

        insta::assert_snapshot!(
            store.display(arrow),
            @"({age: Int, name: String | t0}) -> Int"
        );
    }

    #[test]
    fn subclass_first_search_order_with_diamond() {
        let mut store = TypeStore::new();
        let mut registry = ClassRegistry::new();
        let p = store.fresh_generic();
        // Diamond: Eq at the top, Ord and Hash beneath it, Both beneath each.
        let eq = registry.declare("Eq", p);
        let ord = registry.declare("Ord", p);
        let hash = registry.declare("Hash", p);
        let both = registry.declare("Both", p);
        registry.add_subclass(eq, ord);
        registry.add_subclass(eq, hash);
        registry.add_subclass(ord, both);
        registry.add_subclass(hash, both);

        let int = store.const_("Int");
        registry.add_instance(eq, int);
        registry.add_instance(ord, int);
        registry.add_instance(both, int);

        let order: Vec<ClassId> = registry.instance_search(eq).map(|(c, _)| c).collect();
        // Both's instance first (deepest subclass, visited once), then Ord's,
        // then Eq's own.
        assert_eq!(order, vec![both, ord, eq]);
    }

    #[test]
    fn is_subclass_of_is_transitive_and_irreflexive() {
        let mut store = TypeStore::new();
        let mut registry = ClassRegistry::new();
        let p = store.fresh_generic();
        let eq = registry.declare("Eq", p);
        let ord = registry.declare("Ord", p);
        let both = registry.declare("Both", p);
        registry.add_subclass(eq, ord);
        registry.add_subclass(ord, both);

        assert!(registry.is_subclass_of(both, eq));
        assert!(registry.is_subclass_of(ord, eq));
        assert!(!registry.is_subclass_of(eq, ord));
        assert!(!registry.is_subclass_of(eq, eq));
    }
}
