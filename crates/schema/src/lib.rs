//! Workload schema.
//!
//! A workload is described as a set of named emitters (ordered lists of
//! stochastic field generators) and a graph of states wiring emitters to
//! dwell-time distributions and weighted transitions. The serde model in
//! [`config`] is validated once into an immutable [`graph::StateGraph`]
//! shared read-only by every actor in the run.

pub mod config;
pub mod fields;
pub mod graph;

pub use config::{EmitterConfig, FieldConfig, GeneratorConfig, StateConfig, TransitionConfig};
pub use fields::{Field, FieldValue, RecordTemplate};
pub use graph::{Next, State, StateGraph};

use thiserror::Error;

/// Invalid or inconsistent workload configuration. Fatal at construction;
/// nothing is silently defaulted.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("workload defines no states")]
    NoStates,

    #[error("duplicate state {0:?}")]
    DuplicateState(String),

    #[error("state {state:?} references unknown emitter {emitter:?}")]
    UnknownEmitter { state: String, emitter: String },

    #[error("state {state:?} has a transition to unknown state {target:?}")]
    UnknownTarget { state: String, target: String },

    #[error("state {0:?} has no outgoing transitions")]
    NoTransitions(String),

    #[error("state {state:?} has invalid transition weights: {reason}")]
    InvalidWeights { state: String, reason: String },

    #[error("field {0:?} specifies a cardinality without a cardinality distribution")]
    MissingCardinalityDistribution(String),

    #[error("field {field:?} could not produce {cardinality} distinct values")]
    CardinalityExhausted { field: String, cardinality: usize },

    #[error("variable field {0:?} is not allowed inside an object, list, or variable binding")]
    NestedVariable(String),

    #[error("invalid distribution for field {field:?}: {source}")]
    FieldDistribution {
        field: String,
        source: synthload_dist::DistError,
    },

    #[error(transparent)]
    Distribution(#[from] synthload_dist::DistError),
}
