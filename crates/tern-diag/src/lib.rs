//! Error reporting and diagnostics for Tern.
//!
//! This crate provides structured diagnostics for the type unifier. The key
//! contract: failures are classified, not located. A diagnostic carries a
//! stable category and enough rendered type information to be actionable,
//! and never exposes internal solver state (variable cells, journal entries).
//!
//! Diagnostics are created by other crates (for example, `tern-unify`) and
//! rendered here for display.

use std::fmt;

// ---------------------------------------------------------------------------
// Diagnostic severity and categories
// ---------------------------------------------------------------------------

/// How severe a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// Broad category for diagnostics. Used for filtering and grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Two type heads cannot be unified.
    TypeMismatch,
    /// A type variable occurs inside the type it is being bound to.
    RecursiveType,
    /// A row tail was re-entered while absorbing missing labels.
    RecursiveRow,
    /// Type applications or arrows with differing arity.
    ArityMismatch,
    /// A size-kinded variable or node met an incompatible type.
    SizeMismatch,
    /// No type-class instance matched the constrained type.
    MissingInstance,
    /// A closed row cannot absorb the labels required of it.
    MissingRowLabels,
    /// A generic (already generalized) variable reached unification.
    GenericVariable,
    /// Internal invariant violation in the unifier.
    InternalInvariant,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::TypeMismatch,
        Category::RecursiveType,
        Category::RecursiveRow,
        Category::ArityMismatch,
        Category::SizeMismatch,
        Category::MissingInstance,
        Category::MissingRowLabels,
        Category::GenericVariable,
        Category::InternalInvariant,
    ];

    pub fn all() -> &'static [Category] {
        &Self::ALL
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::TypeMismatch => "type_mismatch",
            Category::RecursiveType => "recursive_type",
            Category::RecursiveRow => "recursive_row",
            Category::ArityMismatch => "arity_mismatch",
            Category::SizeMismatch => "size_mismatch",
            Category::MissingInstance => "missing_instance",
            Category::MissingRowLabels => "missing_row_labels",
            Category::GenericVariable => "generic_variable",
            Category::InternalInvariant => "internal_invariant",
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Category::TypeMismatch => "E0001",
            Category::RecursiveType => "E0002",
            Category::RecursiveRow => "E0003",
            Category::ArityMismatch => "E0004",
            Category::SizeMismatch => "E0005",
            Category::MissingInstance => "E0006",
            Category::MissingRowLabels => "E0007",
            Category::GenericVariable => "E0008",
            Category::InternalInvariant => "E0009",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Category::TypeMismatch => "Two types have incompatible head shapes.",
            Category::RecursiveType => {
                "A type variable would be bound to a type containing itself."
            }
            Category::RecursiveRow => "A row tail variable was bound while absorbing labels.",
            Category::ArityMismatch => {
                "Type applications or function arrows have differing arity."
            }
            Category::SizeMismatch => "A size-kinded type met a type of a different kind or size.",
            Category::MissingInstance => "No instance of the required type class matched.",
            Category::MissingRowLabels => "A closed row is missing labels required of it.",
            Category::GenericVariable => {
                "A generalized type variable reached unification without instantiation."
            }
            Category::InternalInvariant => "The unifier reached an invalid internal state.",
        }
    }

    pub fn example_fix(self) -> &'static str {
        match self {
            Category::TypeMismatch => "Adjust one side so both types share the same head shape.",
            Category::RecursiveType => {
                "Introduce an explicit recursive type group instead of a self-reference."
            }
            Category::RecursiveRow => "Avoid threading a row tail back into its own extension.",
            Category::ArityMismatch => "Apply the constructor or function to its declared arity.",
            Category::SizeMismatch => "Use a size literal or another size variable here.",
            Category::MissingInstance => {
                "Declare an instance of the class for this type, or constrain the type."
            }
            Category::MissingRowLabels => "Add the missing labels or use an open row.",
            Category::GenericVariable => "Instantiate the type scheme before unifying it.",
            Category::InternalInvariant => "Report this as a bug in the unifier.",
        }
    }
}

// ---------------------------------------------------------------------------
// Diagnostic
// ---------------------------------------------------------------------------

/// A structured diagnostic message.
///
/// Every diagnostic carries enough context to produce an actionable error
/// message without exposing internal solver state.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Stable diagnostic code (e.g. E0001).
    pub code: Option<String>,
    pub severity: Severity,
    pub category: Category,
    /// Primary message: what went wrong.
    pub message: String,
    /// Suggested fix, if any.
    pub help: Option<String>,
}

impl Diagnostic {
    pub fn error(category: Category, message: impl Into<String>) -> Self {
        Self {
            code: Some(category.code().to_string()),
            severity: Severity::Error,
            category,
            message: message.into(),
            help: None,
        }
    }

    pub fn warning(category: Category, message: impl Into<String>) -> Self {
        Self {
            code: Some(category.code().to_string()),
            severity: Severity::Warning,
            category,
            message: message.into(),
            help: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        };
        if let Some(code) = &self.code {
            write!(f, "{prefix}[{code}]: {}", self.message)?;
        } else {
            write!(f, "{prefix}: {}", self.message)?;
        }
        if let Some(help) = &self.help {
            write!(f, "\n  help: {help}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Error type for crates that produce diagnostics
// ---------------------------------------------------------------------------

/// Error type wrapping one or more diagnostics.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{}", .0.first().map(|d| d.to_string()).unwrap_or_default())]
pub struct DiagnosticError(pub Vec<Diagnostic>);

impl DiagnosticError {
    pub fn single(diag: Diagnostic) -> Self {
        Self(vec![diag])
    }

    pub fn multiple(diags: Vec<Diagnostic>) -> Self {
        Self(diags)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_builder() {
        let diag = Diagnostic::error(Category::MissingInstance, "no `Num` instance for `Bool`")
            .with_help("declare an instance of `Num` for `Bool`");

        assert_eq!(diag.severity, Severity::Error);
        assert_eq!(diag.code.as_deref(), Some("E0006"));
        assert_eq!(diag.category, Category::MissingInstance);
        assert!(diag.message.contains("Num"));
        assert!(diag.help.unwrap().contains("declare an instance"));
    }

    #[test]
    fn diagnostic_display() {
        let diag = Diagnostic::error(Category::TypeMismatch, "cannot unify `Int` with `Bool`");
        insta::assert_snapshot!(
            diag.to_string(),
            @"error[E0001]: cannot unify `Int` with `Bool`"
        );
    }

    #[test]
    fn diagnostic_display_with_help() {
        let diag = Diagnostic::error(Category::MissingRowLabels, "closed row is missing `y`")
            .with_help("add the missing labels or use an open row");
        insta::assert_snapshot!(diag.to_string(), @r"
        error[E0007]: closed row is missing `y`
          help: add the missing labels or use an open row
        ");
    }

    #[test]
    fn category_metadata_is_stable_and_unique() {
        let mut codes = std::collections::BTreeSet::new();
        for cat in Category::all() {
            assert!(!cat.as_str().is_empty());
            assert!(!cat.description().is_empty());
            assert!(!cat.example_fix().is_empty());
            assert!(
                codes.insert(cat.code()),
                "duplicate diagnostic code detected: {}",
                cat.code()
            );
        }
    }
}
