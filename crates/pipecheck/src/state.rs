use crate::StateVariable;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Per-execution variable store. Never shared between pipeline instances.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    values: BTreeMap<String, Value>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds only the variables that declare an initial value; the rest stay
    /// absent until a node binds them.
    pub fn from_schema(schema: &[StateVariable]) -> Self {
        let values = schema
            .iter()
            .filter_map(|variable| {
                variable
                    .value
                    .as_ref()
                    .map(|value| (variable.name.clone(), value.clone()))
            })
            .collect();
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// Makes `name` explicitly absent, dropping any earlier binding.
    pub fn clear(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.values.clone()
    }

    pub fn into_values(self) -> BTreeMap<String, Value> {
        self.values
    }
}
