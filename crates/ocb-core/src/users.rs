//! Source-system identity -> messenger identity.

use std::{collections::HashMap, path::Path};

use serde::Deserialize;

use crate::{domain::Access, Result};

/// Static mapping table plus an optional domain suffix.
///
/// A table entry of `null` means the user has no messenger account and is
/// never notified. Users missing from the table keep their identity.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct UserMap {
    table: HashMap<String, Option<String>>,
}

impl UserMap {
    /// Load a JSON object from disk. A missing file is an empty table.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Resolves identities against one [`UserMap`] snapshot.
#[derive(Clone, Copy, Debug)]
pub struct UserMapper<'a> {
    map: &'a UserMap,
    domain: &'a str,
}

impl<'a> UserMapper<'a> {
    pub fn new(map: &'a UserMap, domain: &'a str) -> Self {
        Self { map, domain }
    }

    /// Messenger identity for `user`, or `None` if the user must be skipped.
    pub fn map(&self, user: &str) -> Option<String> {
        let mapped = match self.map.table.get(user) {
            Some(None) => return None,
            Some(Some(m)) if !m.is_empty() => m.as_str(),
            _ => user,
        };
        if mapped.is_empty() {
            return None;
        }
        if !self.domain.is_empty() && !mapped.contains('@') {
            return Some(format!("{mapped}@{}", self.domain));
        }
        Some(mapped.to_string())
    }

    /// Map a notification's `users` field, dropping unmapped users and
    /// unknown access levels. Two source users mapping to the same messenger
    /// identity keep the higher access.
    pub fn map_access(&self, users: &HashMap<String, String>) -> HashMap<String, Access> {
        let mut out: HashMap<String, Access> = HashMap::new();
        for (user, raw) in users {
            let Some(access) = Access::parse(raw) else {
                continue;
            };
            let Some(mapped) = self.map(user) else {
                continue;
            };
            let entry = out.entry(mapped).or_insert(access);
            if access == Access::ReadWrite {
                *entry = Access::ReadWrite;
            }
        }
        out
    }
}
