//! Playbook data model: plays, roles and the recursive block tree.
//!
//! A playbook is an ordered list of plays. Each play binds host patterns to
//! four ordered block lists (pre_tasks, roles, tasks, post_tasks). Blocks
//! are recursive: a block is either a composite (non-empty nested list,
//! optionally with rescue/always), an include-tasks reference (expanded
//! upstream, a no-op here), or a leaf task whose module action is carried
//! in its unrecognized fields.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{Error, Result};

/// Deserialize flexible booleans (yes/no/true/false/1/0).
fn flexible_bool<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let value = JsonValue::deserialize(deserializer)?;
    match &value {
        JsonValue::Bool(b) => Ok(*b),
        JsonValue::String(s) => match s.to_lowercase().as_str() {
            "yes" | "true" | "on" | "1" => Ok(true),
            "no" | "false" | "off" | "0" | "" => Ok(false),
            _ => Err(D::Error::custom(format!("invalid boolean string: {}", s))),
        },
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Ok(i != 0),
            None => Err(D::Error::custom("invalid boolean number")),
        },
        JsonValue::Null => Ok(false),
        _ => Err(D::Error::custom(format!(
            "invalid boolean value: {:?}",
            value
        ))),
    }
}

/// Deserialize a scalar-or-list field into a `Vec`.
fn one_or_many<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany<T> {
        One(T),
        Many(Vec<T>),
    }
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) => vec![value],
        OneOrMany::Many(values) => values,
    })
}

/// One entry of a play's serial specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SerialEntry {
    /// A fixed host count.
    Count(usize),
    /// A percentage of the full host list, e.g. `"30%"`.
    Percent(String),
}

/// Decide whether a tag set is enabled under the pipeline's filters.
///
/// Skip filters win over include filters. An empty include filter selects
/// everything, and an empty tag set is always enabled — plays and
/// composite blocks are rarely tagged themselves and must still descend
/// to their tagged children. The `always` tag defeats include filtering
/// but not an explicit skip.
pub fn tags_enabled(tags: &[String], only: &[String], skip: &[String]) -> bool {
    if tags.iter().any(|t| skip.iter().any(|s| s == t)) {
        return false;
    }
    if skip.iter().any(|s| s == "all") && !tags.iter().any(|t| t == "always") {
        return false;
    }
    if only.is_empty() || tags.is_empty() {
        return true;
    }
    if tags.iter().any(|t| t == "always") || only.iter().any(|o| o == "all") {
        return true;
    }
    tags.iter().any(|t| only.iter().any(|o| o == t))
}

/// A node in the play tree.
///
/// Fields the deserializer does not recognize land in `unknown`, preserving
/// source order; the first unknown key naming a registered module becomes
/// the leaf's action.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Block {
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Tags for include/skip filtering.
    #[serde(default, deserialize_with = "one_or_many")]
    pub tags: Vec<String>,
    /// Templated boolean conditions gating execution.
    #[serde(default, deserialize_with = "one_or_many")]
    pub when: Vec<String>,
    /// Variables merged into each host's definition overlay.
    #[serde(default)]
    pub vars: IndexMap<String, JsonValue>,
    /// Restrict this block and its descendants to the batch's first host.
    #[serde(default, deserialize_with = "flexible_bool")]
    pub run_once: bool,
    /// Nested blocks; non-empty makes this a composite.
    #[serde(default)]
    pub block: Vec<Block>,
    /// Blocks run when the nested path fails.
    #[serde(default)]
    pub rescue: Vec<Block>,
    /// Blocks run unconditionally after the nested path.
    #[serde(default)]
    pub always: Vec<Block>,
    /// Include-tasks reference, already expanded upstream.
    #[serde(default)]
    pub include_tasks: String,
    /// Downgrade host failures to Ignored.
    #[serde(
        default,
        alias = "ignore_error",
        deserialize_with = "flexible_bool"
    )]
    pub ignore_errors: bool,
    /// Variable name the task result is registered under.
    #[serde(default)]
    pub register: Option<String>,
    /// Raw loop directive.
    #[serde(default, rename = "loop")]
    pub loop_directive: Option<JsonValue>,
    /// Conditions that force a host failure after execution.
    #[serde(default, deserialize_with = "one_or_many")]
    pub failed_when: Vec<String>,
    /// Unrecognized fields in source order; carries the module action.
    #[serde(flatten)]
    pub unknown: IndexMap<String, JsonValue>,
}

impl Block {
    /// True when this block carries nested blocks.
    pub fn is_composite(&self) -> bool {
        !self.block.is_empty()
    }

    /// True when this block is an include-tasks reference.
    pub fn is_include(&self) -> bool {
        !self.include_tasks.is_empty()
    }

    /// Whether the block runs under the given tag filters.
    pub fn is_enabled(&self, only: &[String], skip: &[String]) -> bool {
        tags_enabled(&self.tags, only, skip)
    }
}

/// A named, reusable block list with its own vars and conditions.
///
/// Roles arrive pre-resolved: project-layout resolution happens upstream
/// and the role's task files are already inlined into `block`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Role {
    /// Role name, stacked onto descendant tasks.
    #[serde(alias = "name")]
    pub role: String,
    /// Role variables.
    #[serde(default)]
    pub vars: IndexMap<String, JsonValue>,
    /// Conditions stacked onto every block of the role.
    #[serde(default, deserialize_with = "one_or_many")]
    pub when: Vec<String>,
    /// The role's resolved block list.
    #[serde(default)]
    pub block: Vec<Block>,
}

/// A unit binding a set of hosts to ordered block groups.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Play {
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Tags for include/skip filtering.
    #[serde(default, deserialize_with = "one_or_many")]
    pub tags: Vec<String>,
    /// Host selector patterns: host names, group names, or `all`.
    #[serde(default, deserialize_with = "one_or_many")]
    pub hosts: Vec<String>,
    /// Probe each host for facts before running blocks.
    #[serde(default, deserialize_with = "flexible_bool")]
    pub gather_facts: bool,
    /// Run the whole play on the first resolved host only.
    #[serde(default, deserialize_with = "flexible_bool")]
    pub run_once: bool,
    /// Serial batching specification; empty runs all hosts in one batch.
    #[serde(default, deserialize_with = "one_or_many")]
    pub serial: Vec<SerialEntry>,
    /// Play variables.
    #[serde(default)]
    pub vars: IndexMap<String, JsonValue>,
    /// Blocks run before roles.
    #[serde(default)]
    pub pre_tasks: Vec<Block>,
    /// Roles, in order.
    #[serde(default)]
    pub roles: Vec<Role>,
    /// Main block list.
    #[serde(default)]
    pub tasks: Vec<Block>,
    /// Blocks run after the main list.
    #[serde(default)]
    pub post_tasks: Vec<Block>,
}

impl Play {
    /// Whether the play runs under the given tag filters.
    pub fn is_enabled(&self, only: &[String], skip: &[String]) -> bool {
        tags_enabled(&self.tags, only, skip)
    }
}

/// A finite ordered list of plays.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Playbook {
    /// The plays, in execution order.
    pub plays: Vec<Play>,
}

impl Playbook {
    /// Parse a playbook from YAML content (a top-level list of plays).
    pub fn parse(content: &str) -> Result<Self> {
        let plays: Vec<Play> = serde_yaml::from_str(content)?;
        Ok(Self { plays })
    }

    /// Load a playbook from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|err| {
            Error::Project(format!("read playbook '{}': {}", path.display(), err))
        })?;
        Self::parse(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_leaf_task_with_unknown_module_field() {
        let yaml = r#"
- name: deploy
  hosts: [web1, web2]
  tasks:
    - name: say hi
      echo:
        msg: "hi"
"#;
        let playbook = Playbook::parse(yaml).unwrap();
        assert_eq!(playbook.plays.len(), 1);
        let task = &playbook.plays[0].tasks[0];
        assert!(!task.is_composite());
        assert!(!task.is_include());
        assert_eq!(task.unknown.len(), 1);
        assert_eq!(task.unknown.get_index(0).unwrap().0, "echo");
    }

    #[test]
    fn parse_composite_with_rescue_and_always() {
        let yaml = r#"
- name: guarded
  block:
    - name: risky
      command: "false"
  rescue:
    - name: recover
      debug:
        msg: "recovering"
  always:
    - name: cleanup
      debug:
        msg: "done"
"#;
        let blocks: Vec<Block> = serde_yaml::from_str(yaml).unwrap();
        assert!(blocks[0].is_composite());
        assert_eq!(blocks[0].rescue.len(), 1);
        assert_eq!(blocks[0].always.len(), 1);
    }

    #[test]
    fn scalar_fields_accept_lists_and_scalars() {
        let yaml = r#"
- hosts: all
  serial: 2
  tasks:
    - name: one condition
      when: "ready"
      debug:
        msg: "x"
    - name: many conditions
      when: ["ready", "steady"]
      debug:
        msg: "y"
"#;
        let playbook = Playbook::parse(yaml).unwrap();
        let play = &playbook.plays[0];
        assert_eq!(play.hosts, vec!["all"]);
        assert_eq!(play.serial, vec![SerialEntry::Count(2)]);
        assert_eq!(play.tasks[0].when, vec!["ready"]);
        assert_eq!(play.tasks[1].when.len(), 2);
    }

    #[test]
    fn serial_percentages() {
        let yaml = r#"
- hosts: all
  serial: ["30%", 4]
"#;
        let playbook = Playbook::parse(yaml).unwrap();
        assert_eq!(
            playbook.plays[0].serial,
            vec![
                SerialEntry::Percent("30%".into()),
                SerialEntry::Count(4)
            ]
        );
    }

    #[test]
    fn flexible_booleans() {
        let yaml = r#"
- hosts: all
  gather_facts: "yes"
  run_once: 1
"#;
        let playbook = Playbook::parse(yaml).unwrap();
        assert!(playbook.plays[0].gather_facts);
        assert!(playbook.plays[0].run_once);
    }

    #[test]
    fn tag_filtering_rules() {
        let tagged = vec!["deploy".to_string()];
        let always = vec!["always".to_string()];
        let none: Vec<String> = vec![];

        // empty include filter selects everything
        assert!(tags_enabled(&tagged, &none, &none));
        assert!(tags_enabled(&none, &none, &none));
        // include filter selects matching tags only
        assert!(tags_enabled(&tagged, &["deploy".into()], &none));
        assert!(!tags_enabled(&tagged, &["other".into()], &none));
        // untagged containers still descend under an include filter
        assert!(tags_enabled(&none, &["other".into()], &none));
        // skip wins over include
        assert!(!tags_enabled(&tagged, &["deploy".into()], &["deploy".into()]));
        // always defeats include filtering but not explicit skip
        assert!(tags_enabled(&always, &["other".into()], &none));
        assert!(!tags_enabled(&always, &none, &["always".into()]));
    }

    #[test]
    fn ignore_error_alias() {
        let yaml = r#"
- name: tolerant
  ignore_error: true
  shell: "exit 1"
"#;
        let blocks: Vec<Block> = serde_yaml::from_str(yaml).unwrap();
        assert!(blocks[0].ignore_errors);
    }
}
