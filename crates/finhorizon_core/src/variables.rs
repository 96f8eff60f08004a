//! Caller-supplied named variables (spec.md §4.2, §4.7) — COLA-linked
//! benefit amounts, per-simulation overrides, and the like.

use rustc_hash::FxHashMap;

use crate::model::amount::Amount;

#[derive(Debug, Clone, PartialEq)]
pub enum VariableValue {
    Amount(Amount),
    Date(jiff::civil::Date),
}

/// Resolves a named variable for a given simulation label. `simulation`
/// lets a single calculation carry per-scenario overrides (e.g. "base"
/// vs "optimistic") without the caller running separate calculations.
pub trait VariableStore: Send + Sync {
    fn lookup(&self, name: &str, simulation: &str) -> Option<VariableValue>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticVariableStore {
    values: FxHashMap<(String, String), VariableValue>,
}

impl StaticVariableStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_value(
        mut self,
        name: impl Into<String>,
        simulation: impl Into<String>,
        value: VariableValue,
    ) -> Self {
        self.values.insert((name.into(), simulation.into()), value);
        self
    }
}

impl VariableStore for StaticVariableStore {
    fn lookup(&self, name: &str, simulation: &str) -> Option<VariableValue> {
        self.values
            .get(&(name.to_string(), simulation.to_string()))
            .cloned()
    }
}
