//! Field dependency map
//!
//! For every field name, records which other fields' readonly, display,
//! mandatory or lookup state depends on it. Built once per schema and never
//! mutated afterwards.

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use super::field::FieldDescriptor;
use crate::config::DependencyConfig;
use crate::error::{Result, StateError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum DependencyType {
    ReadonlyLogic,
    DisplayLogic,
    MandatoryLogic,
    LookupValues,
}

/// A (dependent field, kind) edge target
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Dependent {
    pub field_name: String,
    pub kind: DependencyType,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct DependencyMap {
    /// source field name -> dependents, first-seen order, no duplicates
    by_source: HashMap<String, Vec<Dependent>>,
}

impl DependencyMap {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build the map from the schema's field descriptors
    pub fn build(fields: &[FieldDescriptor], config: &DependencyConfig) -> Result<Self> {
        let mut map = DependencyMap::default();

        for field in fields {
            let name = field.field_name();
            map.add(name, field.readonly_logic().parameters(), DependencyType::ReadonlyLogic);
            map.add(name, field.display_logic().parameters(), DependencyType::DisplayLogic);
            map.add(name, field.mandatory_logic().parameters(), DependencyType::MandatoryLogic);
            map.add(name, field.lookup_depends_on(), DependencyType::LookupValues);
        }

        if config.reject_cycles {
            let field_names: HashSet<&str> = fields.iter().map(|f| f.field_name()).collect();
            if let Some(cycle) = map.find_cycle(&field_names) {
                return Err(StateError::configuration(format!(
                    "field dependency cycle: {}",
                    cycle.join(" -> ")
                )));
            }
        }

        log::debug!(
            "Built dependency map: {} source fields, {} edges",
            map.by_source.len(),
            map.by_source.values().map(Vec::len).sum::<usize>()
        );
        Ok(map)
    }

    fn add(&mut self, dependent_field: &str, sources: &[String], kind: DependencyType) {
        for source in sources {
            let dependents = self.by_source.entry(source.clone()).or_default();
            let dependent = Dependent {
                field_name: dependent_field.to_string(),
                kind,
            };
            if !dependents.contains(&dependent) {
                dependents.push(dependent);
            }
        }
    }

    /// Dependents of `field_name`; empty for unknown names
    pub fn dependents_of(&self, field_name: &str) -> &[Dependent] {
        self.by_source
            .get(field_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.by_source.is_empty()
    }

    /// Depth-first search for a cycle of two or more fields. Self-references
    /// are skipped: recompute is first-order, so they cannot cascade.
    fn find_cycle(&self, field_names: &HashSet<&str>) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit<'a>(
            map: &'a DependencyMap,
            node: &'a str,
            marks: &mut HashMap<&'a str, Mark>,
            stack: &mut Vec<&'a str>,
        ) -> Option<Vec<String>> {
            marks.insert(node, Mark::Visiting);
            stack.push(node);

            for dependent in map.dependents_of(node) {
                let next = dependent.field_name.as_str();
                if next == node {
                    continue;
                }
                match marks.get(next) {
                    Some(Mark::Visiting) => {
                        let start = stack.iter().position(|n| *n == next).unwrap_or(0);
                        let mut cycle: Vec<String> =
                            stack[start..].iter().map(|n| n.to_string()).collect();
                        cycle.push(next.to_string());
                        return Some(cycle);
                    }
                    Some(Mark::Done) => {}
                    None => {
                        if let Some(cycle) = visit(map, next, marks, stack) {
                            return Some(cycle);
                        }
                    }
                }
            }

            stack.pop();
            marks.insert(node, Mark::Done);
            None
        }

        let mut sources: Vec<&str> = self
            .by_source
            .keys()
            .map(String::as_str)
            .filter(|name| field_names.contains(name))
            .collect();
        sources.sort_unstable();

        let mut marks: HashMap<&str, Mark> = HashMap::new();
        for source in sources {
            if marks.contains_key(source) {
                continue;
            }
            let mut stack = Vec::new();
            if let Some(cycle) = visit(self, source, &mut marks, &mut stack) {
                return Some(cycle);
            }
        }
        None
    }
}
