//! Variable store: the executor's only shared mutable state.
//!
//! Each host owns three overlays merged in precedence order — definition
//! vars (play/role/block), remote facts, then runtime vars (registered
//! results, loop items). The store is seeded from an [`Inventory`] and
//! serializes its own writes; reads hand out an owned snapshot so task
//! runner scopes never race concurrent merges from other hosts.

pub mod template;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::error::{Error, Result};

/// Group name that always selects every inventory host.
pub const ALL_GROUP: &str = "all";

/// Built-in per-host variable carrying the host's own name.
pub const INVENTORY_HOSTNAME: &str = "inventory_hostname";

/// Static description of the target hosts.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    /// All hosts, in inventory order.
    pub hosts: Vec<String>,
    /// Named groups of hosts.
    pub groups: IndexMap<String, Vec<String>>,
    /// Per-host definition variables.
    pub host_vars: IndexMap<String, IndexMap<String, JsonValue>>,
}

impl Inventory {
    /// Create an inventory from a plain host list.
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hosts: hosts.into_iter().map(Into::into).collect(),
            groups: IndexMap::new(),
            host_vars: IndexMap::new(),
        }
    }

    /// Add a named group. Members must already be inventory hosts.
    pub fn with_group<I, S>(mut self, name: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups
            .insert(name.into(), members.into_iter().map(Into::into).collect());
        self
    }

    /// Add definition variables for one host.
    pub fn with_host_vars(
        mut self,
        host: impl Into<String>,
        vars: IndexMap<String, JsonValue>,
    ) -> Self {
        self.host_vars.insert(host.into(), vars);
        self
    }
}

/// A scoped mutation applied through [`VariableStore::merge`].
#[derive(Debug, Clone)]
pub enum Update {
    /// Runtime overlay for one host: registered results, loop items,
    /// dynamically set facts. A `null` value removes the key.
    Runtime {
        /// Target host.
        host: String,
        /// Key/value pairs to apply.
        vars: IndexMap<String, JsonValue>,
    },
    /// Remote-fact overlay for one host, fed by the fact gatherer.
    RemoteFacts {
        /// Target host.
        host: String,
        /// Gathered facts.
        facts: IndexMap<String, JsonValue>,
    },
    /// Definition overlay: play/role/block vars for a set of hosts.
    Definition {
        /// Target hosts.
        hosts: Vec<String>,
        /// Key/value pairs to apply.
        vars: IndexMap<String, JsonValue>,
    },
}

#[derive(Debug, Clone, Default)]
struct HostScope {
    definition: IndexMap<String, JsonValue>,
    remote: IndexMap<String, JsonValue>,
    runtime: IndexMap<String, JsonValue>,
}

fn apply_overlay(
    scopes: &mut IndexMap<String, HostScope>,
    host: &str,
    select: fn(&mut HostScope) -> &mut IndexMap<String, JsonValue>,
    vars: &IndexMap<String, JsonValue>,
    remove_null: bool,
) -> Result<()> {
    let scope = scopes
        .get_mut(host)
        .ok_or_else(|| Error::Variable(format!("unknown host: {}", host)))?;
    let overlay = select(scope);
    for (key, value) in vars {
        if remove_null && value.is_null() {
            overlay.shift_remove(key);
        } else {
            overlay.insert(key.clone(), value.clone());
        }
    }
    Ok(())
}

/// Thread-safe variable engine shared by every host unit of work.
#[derive(Debug, Default)]
pub struct VariableStore {
    hosts: Vec<String>,
    groups: IndexMap<String, Vec<String>>,
    scopes: RwLock<IndexMap<String, HostScope>>,
}

impl VariableStore {
    /// Build a store seeded from an inventory.
    pub fn new(inventory: Inventory) -> Self {
        let mut scopes = IndexMap::new();
        for host in &inventory.hosts {
            let mut scope = HostScope::default();
            if let Some(vars) = inventory.host_vars.get(host) {
                scope.definition = vars.clone();
            }
            scopes.insert(host.clone(), scope);
        }
        Self {
            hosts: inventory.hosts,
            groups: inventory.groups,
            scopes: RwLock::new(scopes),
        }
    }

    /// Resolve host patterns (host names, group names, `all`) to an ordered,
    /// deduplicated host list. Unknown patterns are dropped.
    pub fn get_hostnames(&self, patterns: &[String]) -> Result<Vec<String>> {
        let mut resolved: Vec<String> = Vec::new();
        let mut push = |host: &str| {
            if !resolved.iter().any(|h| h == host) {
                resolved.push(host.to_string());
            }
        };
        for pattern in patterns {
            if pattern == ALL_GROUP {
                self.hosts.iter().for_each(|h| push(h));
            } else if let Some(members) = self.groups.get(pattern) {
                members.iter().for_each(|h| push(h));
            } else if self.hosts.iter().any(|h| h == pattern) {
                push(pattern);
            } else {
                debug!(pattern = %pattern, "host pattern matched nothing");
            }
        }
        Ok(resolved)
    }

    /// Snapshot the full merged scope of one host.
    ///
    /// Precedence from lowest to highest: definition vars, remote facts,
    /// runtime vars. The built-in `inventory_hostname` is always present.
    pub fn get_all(&self, host: &str) -> Result<IndexMap<String, JsonValue>> {
        let scopes = self.scopes.read();
        let scope = scopes
            .get(host)
            .ok_or_else(|| Error::Variable(format!("unknown host: {}", host)))?;
        let mut merged = IndexMap::new();
        merged.insert(
            INVENTORY_HOSTNAME.to_string(),
            JsonValue::String(host.to_string()),
        );
        for overlay in [&scope.definition, &scope.remote, &scope.runtime] {
            for (key, value) in overlay {
                merged.insert(key.clone(), value.clone());
            }
        }
        Ok(merged)
    }

    /// Apply a scoped mutation. Independent merges commute; repeating the
    /// same merge is idempotent.
    pub fn merge(&self, update: Update) -> Result<()> {
        let mut scopes = self.scopes.write();
        match update {
            Update::Runtime { host, vars } => {
                apply_overlay(&mut scopes, &host, |s| &mut s.runtime, &vars, true)
            }
            Update::RemoteFacts { host, facts } => {
                apply_overlay(&mut scopes, &host, |s| &mut s.remote, &facts, false)
            }
            Update::Definition { hosts, vars } => {
                for host in &hosts {
                    apply_overlay(&mut scopes, host, |s| &mut s.definition, &vars, false)?;
                }
                Ok(())
            }
        }
    }

    /// Evaluate templated boolean expressions against a scope.
    pub fn parse_bool(
        &self,
        scope: &IndexMap<String, JsonValue>,
        exprs: &[String],
    ) -> Result<bool> {
        template::parse_bool(scope, exprs)
    }

    /// Resolve a raw loop directive against a scope.
    pub fn extension_to_slice(
        &self,
        scope: &IndexMap<String, JsonValue>,
        raw: &JsonValue,
    ) -> Result<Vec<JsonValue>> {
        template::extension_to_slice(scope, raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> VariableStore {
        let inventory = Inventory::new(["web1", "web2", "db1"])
            .with_group("web", ["web1", "web2"])
            .with_group("db", ["db1"]);
        VariableStore::new(inventory)
    }

    fn vars(pairs: &[(&str, JsonValue)]) -> IndexMap<String, JsonValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn hostname_resolution() {
        let store = store();
        assert_eq!(
            store.get_hostnames(&["all".into()]).unwrap(),
            vec!["web1", "web2", "db1"]
        );
        assert_eq!(
            store.get_hostnames(&["web".into()]).unwrap(),
            vec!["web1", "web2"]
        );
        assert_eq!(store.get_hostnames(&["db1".into()]).unwrap(), vec!["db1"]);
        assert!(store.get_hostnames(&["missing".into()]).unwrap().is_empty());
    }

    #[test]
    fn hostname_resolution_dedupes_preserving_order() {
        let store = store();
        let resolved = store
            .get_hostnames(&["db".into(), "all".into()])
            .unwrap();
        assert_eq!(resolved, vec!["db1", "web1", "web2"]);
    }

    #[test]
    fn overlay_precedence() {
        let store = store();
        store
            .merge(Update::Definition {
                hosts: vec!["web1".into()],
                vars: vars(&[("port", json!(80)), ("tier", json!("def"))]),
            })
            .unwrap();
        store
            .merge(Update::RemoteFacts {
                host: "web1".into(),
                facts: vars(&[("tier", json!("fact"))]),
            })
            .unwrap();
        store
            .merge(Update::Runtime {
                host: "web1".into(),
                vars: vars(&[("tier", json!("runtime"))]),
            })
            .unwrap();

        let scope = store.get_all("web1").unwrap();
        assert_eq!(scope.get("port"), Some(&json!(80)));
        assert_eq!(scope.get("tier"), Some(&json!("runtime")));
        assert_eq!(scope.get(INVENTORY_HOSTNAME), Some(&json!("web1")));
    }

    #[test]
    fn runtime_null_removes_key() {
        let store = store();
        store
            .merge(Update::Runtime {
                host: "web1".into(),
                vars: vars(&[("item", json!(3))]),
            })
            .unwrap();
        assert!(store.get_all("web1").unwrap().contains_key("item"));
        store
            .merge(Update::Runtime {
                host: "web1".into(),
                vars: vars(&[("item", JsonValue::Null)]),
            })
            .unwrap();
        assert!(!store.get_all("web1").unwrap().contains_key("item"));
    }

    #[test]
    fn merges_are_per_host() {
        let store = store();
        store
            .merge(Update::Runtime {
                host: "web1".into(),
                vars: vars(&[("only_here", json!(true))]),
            })
            .unwrap();
        assert!(store.get_all("web1").unwrap().contains_key("only_here"));
        assert!(!store.get_all("web2").unwrap().contains_key("only_here"));
    }

    #[test]
    fn repeated_fact_merge_is_idempotent() {
        let store = store();
        let facts = vars(&[("os", json!("linux")), ("cpus", json!(8))]);
        store
            .merge(Update::RemoteFacts {
                host: "db1".into(),
                facts: facts.clone(),
            })
            .unwrap();
        let first = store.get_all("db1").unwrap();
        store
            .merge(Update::RemoteFacts {
                host: "db1".into(),
                facts,
            })
            .unwrap();
        assert_eq!(first, store.get_all("db1").unwrap());
    }

    #[test]
    fn unknown_host_errors() {
        let store = store();
        assert!(matches!(
            store.get_all("ghost"),
            Err(Error::Variable(_))
        ));
        assert!(matches!(
            store.merge(Update::Runtime {
                host: "ghost".into(),
                vars: IndexMap::new(),
            }),
            Err(Error::Variable(_))
        ));
    }

    #[test]
    fn host_vars_seed_definition_overlay() {
        let inventory = Inventory::new(["web1"]).with_host_vars(
            "web1",
            vars(&[("region", json!("us-east-1"))]),
        );
        let store = VariableStore::new(inventory);
        assert_eq!(
            store.get_all("web1").unwrap().get("region"),
            Some(&json!("us-east-1"))
        );
    }
}
