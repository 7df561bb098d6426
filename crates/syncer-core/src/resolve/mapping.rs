//! Field mapping - マッピング式の解析と評価
//!
//! A task maps a *source field* to an expression:
//!
//! ```text
//! group ; group ; ...
//! group := destination | resolver[:arg,arg,...] | resolver ...
//! ```
//!
//! Every group starts from the source field's value, runs its resolvers left
//! to right and writes the result under its own destination key, so one source
//! field can fan out into several differently-resolved output fields:
//!
//! ```text
//! "name" => "name|trim;name_raw"
//! ```

use std::collections::BTreeMap;

use crate::domain::{Row, Value};

use super::resolver::ResolverRegistry;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MappingError {
    #[error("mapping for `{field}`: group {group} has no destination field")]
    EmptyDestination { field: String, group: usize },

    #[error("mapping for `{field}`: empty resolver name in `{stage}`")]
    EmptyResolver { field: String, stage: String },
}

/// One resolver call: `name:arg,arg`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverStage {
    pub name: String,
    pub args: Vec<String>,
}

impl ResolverStage {
    fn parse(raw: &str) -> Self {
        match raw.split_once(':') {
            Some((name, args)) => Self {
                name: name.trim().to_string(),
                args: args.split(',').map(|a| a.to_string()).collect(),
            },
            None => Self {
                name: raw.trim().to_string(),
                args: Vec::new(),
            },
        }
    }
}

/// `destination|stage|stage...`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingGroup {
    pub destination: String,
    pub stages: Vec<ResolverStage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct MappingEntry {
    source: String,
    groups: Vec<MappingGroup>,
}

/// Parsed mapping of a whole task.
///
/// Parsed once per run and shared by every page worker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMapping {
    entries: Vec<MappingEntry>,
}

impl FieldMapping {
    pub fn parse(mapping: &BTreeMap<String, String>) -> Result<Self, MappingError> {
        let mut entries = Vec::with_capacity(mapping.len());
        for (source, expr) in mapping {
            entries.push(MappingEntry {
                source: source.clone(),
                groups: parse_expression(source, expr)?,
            });
        }
        Ok(Self { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Groups configured for `source`, in expression order.
    pub fn groups(&self, source: &str) -> Option<&[MappingGroup]> {
        self.entries
            .iter()
            .find(|e| e.source == source)
            .map(|e| e.groups.as_slice())
    }

    /// Destination fields, in output order.
    pub fn destinations(&self) -> Vec<&str> {
        self.entries
            .iter()
            .flat_map(|e| e.groups.iter().map(|g| g.destination.as_str()))
            .collect()
    }

    /// Map one source row to an output row.
    ///
    /// Missing source fields map to `Null`. When two groups share a
    /// destination, the later one wins.
    pub fn apply(&self, row: &Row, resolvers: &ResolverRegistry) -> Row {
        let mut out = Row::new();
        for entry in &self.entries {
            let source_value = row.get(&entry.source).cloned().unwrap_or(Value::Null);
            for group in &entry.groups {
                let value = group.stages.iter().fold(source_value.clone(), |value, stage| {
                    resolvers.resolve(value, row, &stage.name, &stage.args)
                });
                out.insert(group.destination.clone(), value);
            }
        }
        out
    }
}

fn parse_expression(source: &str, expr: &str) -> Result<Vec<MappingGroup>, MappingError> {
    let mut groups = Vec::new();
    for (index, raw_group) in expr.split(';').enumerate() {
        if raw_group.trim().is_empty() {
            // 末尾の `;` などは無視する
            continue;
        }
        let mut tokens = raw_group.split('|');
        let destination = tokens.next().unwrap_or_default().trim().to_string();
        if destination.is_empty() {
            return Err(MappingError::EmptyDestination {
                field: source.to_string(),
                group: index + 1,
            });
        }

        let mut stages = Vec::new();
        for raw_stage in tokens {
            let stage = ResolverStage::parse(raw_stage);
            if stage.name.is_empty() {
                return Err(MappingError::EmptyResolver {
                    field: source.to_string(),
                    stage: raw_stage.to_string(),
                });
            }
            stages.push(stage);
        }
        groups.push(MappingGroup {
            destination,
            stages,
        });
    }
    Ok(groups)
}
