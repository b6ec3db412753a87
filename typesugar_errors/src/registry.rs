//! Registry of stable diagnostic codes.
//!
//! Every diagnostic the engine emits carries a stable code so tooling can
//! suppress or promote individual classes. The registry records, per code,
//! the pinned severity and a long description; the severity recorded here
//! wins over whatever the reporting site asked for.

use std::collections::HashMap;

use crate::Level;

#[derive(Clone, Copy, Debug)]
pub struct CodeInfo {
    pub level: Level,
    pub description: &'static str,
}

#[derive(Clone, Debug, Default)]
pub struct Registry {
    codes: HashMap<&'static str, CodeInfo>,
}

impl Registry {
    pub fn new(entries: &[(&'static str, Level, &'static str)]) -> Registry {
        Registry {
            codes: entries
                .iter()
                .map(|&(code, level, description)| (code, CodeInfo { level, description }))
                .collect(),
        }
    }

    pub fn find_description(&self, code: &str) -> Option<&'static str> {
        self.codes.get(code).map(|info| info.description)
    }

    pub fn level_of(&self, code: &str) -> Option<Level> {
        self.codes.get(code).map(|info| info.level)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.codes.contains_key(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup() {
        let registry = Registry::new(&[
            ("TS0001", Level::Error, "syntax error"),
            ("TS0401", Level::Warning, "duplicate macro registration"),
        ]);
        assert_eq!(registry.level_of("TS0401"), Some(Level::Warning));
        assert_eq!(registry.find_description("TS0001"), Some("syntax error"));
        assert!(!registry.contains("TS9999"));
    }
}
