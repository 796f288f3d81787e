//! Serde model for the workload definition file.

use serde::Deserialize;
use serde_json::Value;
use synthload_dist::{DistConfig, TimestampDistConfig};

/// Generator-mode workload: arrival cadence, emitters, and the state graph.
#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorConfig {
    /// Distribution of the gap between actor launches, in seconds.
    pub interarrival: DistConfig,

    /// Named record templates.
    pub emitters: Vec<EmitterConfig>,

    /// State graph; the first state is the initial state.
    pub states: Vec<StateConfig>,
}

/// A named, ordered list of field generators.
#[derive(Debug, Clone, Deserialize)]
pub struct EmitterConfig {
    pub name: String,
    pub dimensions: Vec<FieldConfig>,
}

/// One state in the graph.
#[derive(Debug, Clone, Deserialize)]
pub struct StateConfig {
    pub name: String,

    /// Name of the emitter producing this state's records.
    pub emitter: String,

    /// Dwell-time distribution, in seconds.
    pub delay: DistConfig,

    /// Weighted outgoing transitions. Weights need not sum to 1.
    pub transitions: Vec<TransitionConfig>,

    /// Per-visit variable bindings, re-sampled on every visit.
    #[serde(default)]
    pub variables: Vec<FieldConfig>,
}

/// A weighted transition to a named state, or to the terminal marker
/// ("stop", case-insensitive).
#[derive(Debug, Clone, Deserialize)]
pub struct TransitionConfig {
    pub next: String,
    pub probability: f64,
}

fn default_increment() -> i64 {
    1
}

/// One stochastic field. The `type` tag selects the generator; every kind
/// except `variable` supports `percent_nulls` / `percent_missing`, and the
/// value-drawing kinds support a pre-materialized value pool via
/// `cardinality` + `cardinality_distribution`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldConfig {
    Counter {
        name: String,
        #[serde(default)]
        percent_nulls: f64,
        #[serde(default)]
        percent_missing: f64,
        #[serde(default)]
        start: i64,
        #[serde(default = "default_increment")]
        increment: i64,
    },

    Enum {
        name: String,
        #[serde(default)]
        percent_nulls: f64,
        #[serde(default)]
        percent_missing: f64,
        values: Vec<Value>,
        cardinality_distribution: Option<DistConfig>,
    },

    String {
        name: String,
        #[serde(default)]
        percent_nulls: f64,
        #[serde(default)]
        percent_missing: f64,
        #[serde(default)]
        cardinality: usize,
        cardinality_distribution: Option<DistConfig>,
        length_distribution: DistConfig,
        chars: Option<String>,
    },

    Int {
        name: String,
        #[serde(default)]
        percent_nulls: f64,
        #[serde(default)]
        percent_missing: f64,
        #[serde(default)]
        cardinality: usize,
        cardinality_distribution: Option<DistConfig>,
        distribution: DistConfig,
    },

    Float {
        name: String,
        #[serde(default)]
        percent_nulls: f64,
        #[serde(default)]
        percent_missing: f64,
        #[serde(default)]
        cardinality: usize,
        cardinality_distribution: Option<DistConfig>,
        distribution: DistConfig,
        precision: Option<u32>,
    },

    Timestamp {
        name: String,
        #[serde(default)]
        percent_nulls: f64,
        #[serde(default)]
        percent_missing: f64,
        #[serde(default)]
        cardinality: usize,
        cardinality_distribution: Option<DistConfig>,
        distribution: TimestampDistConfig,
    },

    #[serde(rename = "ipaddress")]
    IpAddress {
        name: String,
        #[serde(default)]
        percent_nulls: f64,
        #[serde(default)]
        percent_missing: f64,
        #[serde(default)]
        cardinality: usize,
        cardinality_distribution: Option<DistConfig>,
        distribution: DistConfig,
    },

    Object {
        name: String,
        #[serde(default)]
        percent_nulls: f64,
        #[serde(default)]
        percent_missing: f64,
        #[serde(default)]
        cardinality: usize,
        cardinality_distribution: Option<DistConfig>,
        dimensions: Vec<FieldConfig>,
    },

    List {
        name: String,
        #[serde(default)]
        percent_nulls: f64,
        #[serde(default)]
        percent_missing: f64,
        #[serde(default)]
        cardinality: usize,
        cardinality_distribution: Option<DistConfig>,
        elements: Vec<FieldConfig>,
        length_distribution: DistConfig,
        selection_distribution: DistConfig,
    },

    /// Renders a state-local variable binding into the record.
    Variable { name: String, variable: String },
}

impl FieldConfig {
    /// The field's record key.
    pub fn name(&self) -> &str {
        match self {
            FieldConfig::Counter { name, .. }
            | FieldConfig::Enum { name, .. }
            | FieldConfig::String { name, .. }
            | FieldConfig::Int { name, .. }
            | FieldConfig::Float { name, .. }
            | FieldConfig::Timestamp { name, .. }
            | FieldConfig::IpAddress { name, .. }
            | FieldConfig::Object { name, .. }
            | FieldConfig::List { name, .. }
            | FieldConfig::Variable { name, .. } => name,
        }
    }
}
