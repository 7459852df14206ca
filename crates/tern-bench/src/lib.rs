//! Shared workload builders for the Tern benchmarks.
//!
//! Kept in a library so benchmark bodies stay focused on the measured call.

use tern_types::TypeId;
use tern_unify::Unifier;

/// Nested applications `List(List(...(v)))` of the given depth.
pub fn deep_app(u: &mut Unifier, depth: usize, leaf: TypeId) -> TypeId {
    let head = u.store_mut().const_("List");
    let mut t = leaf;
    for _ in 0..depth {
        t = u.store_mut().app(head, vec![t]);
    }
    t
}

/// A record `{f0: Int, f1: Int, ...}` with `width` fields and the given tail.
pub fn wide_record(u: &mut Unifier, width: usize, tail: TypeId) -> TypeId {
    let int = u.store_mut().const_("Int");
    let labels: Vec<String> = (0..width).map(|i| format!("f{i}")).collect();
    let fields: Vec<(&str, TypeId)> = labels.iter().map(|l| (l.as_str(), int)).collect();
    let row = u.store_mut().row(fields, tail);
    u.store_mut().record(row)
}
