//! The stable diagnostic codes the engine emits.
//!
//! Severity is part of the registration: tooling may suppress or promote
//! a class by code, but a macro cannot override the severity of a stable
//! code at the reporting site.

use typesugar_errors::{Level, Registry};

/// Every stable code with its pinned severity and long description.
pub const DIAGNOSTIC_CODES: &[(&str, Level, &str)] = &[
    ("TS0001", Level::Error, "syntax error in the surface language"),
    ("TS0101", Level::Error, "a macro callback failed or panicked"),
    (
        "TS0102",
        Level::Error,
        "attribute or derive applied to an invalid target kind",
    ),
    ("TS0103", Level::Error, "macro expansion depth ceiling exceeded"),
    (
        "TS0104",
        Level::Error,
        "per-site consecutive re-expansion limit exceeded",
    ),
    ("TS0105", Level::Error, "global per-file expansion budget exceeded"),
    ("TS0106", Level::Error, "no pattern arm matched a declarative macro invocation"),
    ("TS0107", Level::Error, "unknown derive macro"),
    ("TS0108", Level::Error, "tagged-template validation failed"),
    ("TS0201", Level::Error, "static assertion failed"),
    (
        "TS0202",
        Level::Error,
        "expression is outside the evaluable comptime subset",
    ),
    ("TS0203", Level::Error, "comptime operation budget exceeded"),
    ("TS0204", Level::Error, "comptime wall-clock timeout"),
    (
        "TS0205",
        Level::Error,
        "comptime I/O attempted without the matching capability",
    ),
    ("TS0206", Level::Error, "comptime path escapes the project root"),
    ("TS0207", Level::Error, "comptime evaluation threw"),
    ("TS0208", Level::Error, "comptime value conversion failed"),
    ("TS0301", Level::Note, "expansion cancelled"),
    ("TS0401", Level::Warning, "duplicate macro registration replaced"),
];

/// Build the registry handed to the diagnostic handler.
pub fn registry() -> Registry {
    Registry::new(DIAGNOSTIC_CODES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for (code, _, _) in DIAGNOSTIC_CODES {
            assert!(seen.insert(*code), "duplicate code {}", code);
        }
    }

    #[test]
    fn registry_round_trips() {
        let registry = registry();
        assert_eq!(registry.level_of("TS0301"), Some(Level::Note));
        assert!(registry.find_description("TS0205").is_some());
    }
}
