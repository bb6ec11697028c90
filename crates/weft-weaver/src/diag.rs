//! Structured diagnostics
//!
//! Validation findings are reported as [`Diagnostic`] values with a stable
//! code, a fixed domain tag, a human-readable message and the offending
//! structural element. Diagnostics accumulate across a whole validation
//! pass; any error collectively suppresses weaving for the module.

use serde::Serialize;
use std::fmt;

/// Domain tag carried by every diagnostic.
pub const DOMAIN: &str = "weft";

/// Stable diagnostic code, e.g. `WEFT1001`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ErrorCode(pub &'static str);

impl ErrorCode {
    /// The code text.
    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    /// Suppresses weaving for the affected scope
    Error,
    /// Reported, does not affect the outcome
    Warning,
}

/// A single reported finding.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    /// Stable code
    pub code: ErrorCode,
    /// Domain tag
    pub domain: &'static str,
    /// Severity
    pub severity: Severity,
    /// Human-readable message
    pub message: String,
    /// Rendered path of the offending element
    pub element: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: {} ({})",
            self.code, self.domain, self.message, self.element
        )
    }
}

/// Accumulator for a validation pass.
#[derive(Debug, Default)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Diagnostics::default()
    }

    /// Record an error.
    pub fn error(&mut self, code: ErrorCode, element: impl Into<String>, message: impl Into<String>) {
        self.items.push(Diagnostic {
            code,
            domain: DOMAIN,
            severity: Severity::Error,
            message: message.into(),
            element: element.into(),
        });
    }

    /// Record a warning.
    pub fn warn(&mut self, code: ErrorCode, element: impl Into<String>, message: impl Into<String>) {
        self.items.push(Diagnostic {
            code,
            domain: DOMAIN,
            severity: Severity::Warning,
            message: message.into(),
            element: element.into(),
        });
    }

    /// Whether any error was recorded.
    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|d| d.severity == Severity::Error)
    }

    /// All recorded findings in order.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    /// Number of recorded findings.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Move all findings from another accumulator into this one.
    pub fn extend(&mut self, other: Diagnostics) {
        self.items.extend(other.items);
    }
}

/// Stable codes, grouped by validation tier.
pub mod codes {
    use super::ErrorCode;

    /// Instance aspect has no constructor advice
    pub const ASPECT_MISSING_CTOR: ErrorCode = ErrorCode("WEFT1001");
    /// Instance aspect is abstract
    pub const ASPECT_ABSTRACT: ErrorCode = ErrorCode("WEFT1002");
    /// Instance aspect is a generic definition
    pub const ASPECT_GENERIC: ErrorCode = ErrorCode("WEFT1003");

    /// Advice has no pointcut
    pub const ADVICE_NO_POINTCUT: ErrorCode = ErrorCode("WEFT1101");
    /// Advice declared outside an aspect type
    pub const ADVICE_OUTSIDE_ASPECT: ErrorCode = ErrorCode("WEFT1102");
    /// Advice is not public
    pub const ADVICE_NOT_PUBLIC: ErrorCode = ErrorCode("WEFT1103");
    /// Advice declares an `out` parameter
    pub const ADVICE_OUT_PARAM: ErrorCode = ErrorCode("WEFT1104");
    /// Advice returns a value
    pub const ADVICE_RETURNS_VALUE: ErrorCode = ErrorCode("WEFT1105");
    /// Advice declares a by-reference parameter without unsafe injection
    pub const ADVICE_REF_PARAM: ErrorCode = ErrorCode("WEFT1106");
    /// Method accessor is not the reflective handle type
    pub const BAD_METHOD_ACCESSOR_TYPE: ErrorCode = ErrorCode("WEFT1107");
    /// Args accessor is not the argument view type
    pub const BAD_ARGS_ACCESSOR_TYPE: ErrorCode = ErrorCode("WEFT1108");
    /// Advice generic parameter is nullable
    pub const NULLABLE_GENERIC_PARAM: ErrorCode = ErrorCode("WEFT1109");
    /// Constraint references another generic parameter
    pub const CONSTRAINT_HAS_GENERIC_PARAM: ErrorCode = ErrorCode("WEFT1110");
    /// By-parameter-type binding not used by any parameter type
    pub const BINDING_UNUSED: ErrorCode = ErrorCode("WEFT1111");
    /// Pointcut pattern failed to compile
    pub const BAD_POINTCUT_PATTERN: ErrorCode = ErrorCode("WEFT1112");
    /// More than one accessor parameter of the same kind
    pub const DUPLICATE_ACCESSOR: ErrorCode = ErrorCode("WEFT1113");

    /// Before advice declares a return accessor
    pub const BEFORE_RETURNED_ACCESSOR: ErrorCode = ErrorCode("WEFT1201");
    /// Before advice declares a thrown accessor
    pub const BEFORE_THROWN_ACCESSOR: ErrorCode = ErrorCode("WEFT1202");

    /// AfterReturning advice declares a thrown accessor
    pub const AFTER_RETURNING_THROWN_ACCESSOR: ErrorCode = ErrorCode("WEFT1301");
    /// AfterReturning advice is a constructor
    pub const AFTER_RETURNING_CTOR: ErrorCode = ErrorCode("WEFT1302");

    /// AfterThrowing advice declares a return accessor
    pub const AFTER_THROWING_RETURNED_ACCESSOR: ErrorCode = ErrorCode("WEFT1401");
    /// AfterThrowing advice declares several thrown accessors
    pub const AFTER_THROWING_MULTIPLE_THROWN: ErrorCode = ErrorCode("WEFT1402");
    /// Thrown accessor type is not an exception type
    pub const AFTER_THROWING_BAD_THROWN_TYPE: ErrorCode = ErrorCode("WEFT1403");
    /// AfterThrowing advice is a constructor
    pub const AFTER_THROWING_CTOR: ErrorCode = ErrorCode("WEFT1404");

    /// After advice declares a return accessor
    pub const AFTER_RETURNED_ACCESSOR: ErrorCode = ErrorCode("WEFT1501");
    /// After advice declares a thrown accessor
    pub const AFTER_THROWN_ACCESSOR: ErrorCode = ErrorCode("WEFT1502");
    /// After advice is a constructor
    pub const AFTER_CTOR: ErrorCode = ErrorCode("WEFT1503");

    /// Around join point is not supported
    pub const AROUND_UNSUPPORTED: ErrorCode = ErrorCode("WEFT1601");

    /// Matched aspect has no constructor advice for the target
    pub const ASPECT_CTOR_NOT_MATCHED: ErrorCode = ErrorCode("WEFT2001");
    /// Matched aspect has several constructor advice for the target
    pub const ASPECT_CTOR_AMBIGUOUS: ErrorCode = ErrorCode("WEFT2002");

    /// By-name generic binding found no parameter on the target
    pub const GENERIC_NAME_NOT_FOUND: ErrorCode = ErrorCode("WEFT2101");
    /// Several distinct types bind the same generic parameter
    pub const GENERIC_BINDING_AMBIGUOUS: ErrorCode = ErrorCode("WEFT2102");
    /// By-parameter-type binding found no type
    pub const GENERIC_BINDING_NOT_FOUND: ErrorCode = ErrorCode("WEFT2103");
    /// Resolved binding violates the parameter's constraints
    pub const GENERIC_BINDING_INCOMPATIBLE: ErrorCode = ErrorCode("WEFT2104");

    /// Advice parameter has no same-named target parameter
    pub const PARAM_NOT_FOUND: ErrorCode = ErrorCode("WEFT2105");
    /// By-reference parameter types disagree
    pub const PARAM_REF_MISMATCH: ErrorCode = ErrorCode("WEFT2106");
    /// Parameter types are incompatible
    pub const PARAM_TYPE_MISMATCH: ErrorCode = ErrorCode("WEFT2107");
    /// This accessor type is incompatible with the declaring type
    pub const THIS_TYPE_MISMATCH: ErrorCode = ErrorCode("WEFT2108");
    /// This accessor against a static target
    pub const THIS_ON_STATIC: ErrorCode = ErrorCode("WEFT2109");

    /// Before advice binds an `out` target parameter
    pub const BEFORE_OUT_BINDING: ErrorCode = ErrorCode("WEFT2201");

    /// Return accessor by-reference type mismatch
    pub const RETURNED_REF_MISMATCH: ErrorCode = ErrorCode("WEFT2301");
    /// Return accessor type mismatch
    pub const RETURNED_TYPE_MISMATCH: ErrorCode = ErrorCode("WEFT2302");
    /// Return accessor against a void target
    pub const RETURNED_ON_VOID: ErrorCode = ErrorCode("WEFT2303");

    /// AfterThrowing advice binds an `out` target parameter
    pub const AFTER_THROWING_OUT_BINDING: ErrorCode = ErrorCode("WEFT2401");
    /// After advice binds an `out` target parameter
    pub const AFTER_OUT_BINDING: ErrorCode = ErrorCode("WEFT2501");
}
