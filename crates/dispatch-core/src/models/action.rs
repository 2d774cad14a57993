use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::models::SchemaMap;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub name: String,
    pub pack: String,
    #[serde(default)]
    pub description: String,
    pub enabled: bool,
    #[serde(default)]
    pub entry_point: String,
    pub runner_type: String,
    #[serde(default)]
    pub parameters: SchemaMap,
    #[serde(default)]
    pub required_parameters: BTreeSet<String>,
}

impl ActionDescriptor {
    pub fn new(
        pack: impl Into<String>,
        name: impl Into<String>,
        runner_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            pack: pack.into(),
            description: String::new(),
            enabled: true,
            entry_point: String::new(),
            runner_type: runner_type.into(),
            parameters: SchemaMap::new(),
            required_parameters: BTreeSet::new(),
        }
    }

    pub fn reference(&self) -> ActionRef {
        ActionRef {
            pack: Some(self.pack.clone()),
            name: self.name.clone(),
        }
    }
}

/// `pack.name` addresses one action exactly; a bare `name` may match the same
/// action name in several packs.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ActionRef {
    pub pack: Option<String>,
    pub name: String,
}

impl ActionRef {
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        match raw.split_once('.') {
            Some((pack, name)) if !pack.is_empty() && !name.is_empty() => Some(Self {
                pack: Some(pack.to_string()),
                name: name.to_string(),
            }),
            Some(_) => None,
            None if raw.is_empty() => None,
            None => Some(Self {
                pack: None,
                name: raw.to_string(),
            }),
        }
    }

    pub fn matches(&self, action: &ActionDescriptor) -> bool {
        self.name == action.name
            && self
                .pack
                .as_deref()
                .is_none_or(|pack| pack == action.pack)
    }
}

impl Display for ActionRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.pack {
            Some(pack) => write!(f, "{pack}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ActionDescriptor, ActionRef};

    #[test]
    fn parses_qualified_and_bare_references() {
        let qualified = ActionRef::parse("wolfpack.action-1").unwrap();
        assert_eq!(qualified.pack.as_deref(), Some("wolfpack"));
        assert_eq!(qualified.name, "action-1");
        assert_eq!(qualified.to_string(), "wolfpack.action-1");

        let bare = ActionRef::parse("action-1").unwrap();
        assert_eq!(bare.pack, None);
        assert_eq!(bare.to_string(), "action-1");

        assert!(ActionRef::parse("").is_none());
        assert!(ActionRef::parse(".action-1").is_none());
        assert!(ActionRef::parse("wolfpack.").is_none());
    }

    #[test]
    fn bare_reference_matches_any_pack() {
        let action = ActionDescriptor::new("wolfpack", "action-1", "test-runner");
        assert!(ActionRef::parse("action-1").unwrap().matches(&action));
        assert!(ActionRef::parse("wolfpack.action-1").unwrap().matches(&action));
        assert!(!ActionRef::parse("core.action-1").unwrap().matches(&action));
    }
}
