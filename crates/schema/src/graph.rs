//! The state graph actors walk.
//!
//! Built once from configuration and shared read-only by every actor.
//! Transition targets are resolved to state indices at construction, with
//! the case-insensitive "stop" marker becoming a distinguished variant, so
//! the per-visit hot path never compares strings.

use crate::config::{EmitterConfig, GeneratorConfig, StateConfig};
use crate::fields::{Field, RecordTemplate};
use crate::ConfigError;
use chrono::{DateTime, Utc};
use rand::distributions::{Distribution as _, WeightedIndex};
use rand::Rng;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use synthload_dist::Sampler;

/// Where a transition leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    /// Continue with the state at this index.
    State(usize),
    /// Terminal marker: the actor's life ends here.
    Stop,
}

/// One state: a record template, a dwell distribution, weighted outgoing
/// transitions, and per-visit variable bindings.
#[derive(Debug)]
pub struct State {
    name: String,
    template: Arc<RecordTemplate>,
    dwell: Sampler,
    targets: Vec<Next>,
    weights: WeightedIndex<f64>,
    variables: Vec<Field>,
}

impl State {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sample this state's dwell time, in seconds.
    pub fn sample_dwell(&self, rng: &mut impl Rng) -> f64 {
        self.dwell.sample(rng)
    }

    /// Pick the next transition by weighted draw. Weights need not sum
    /// to 1; transition `i` is chosen with probability `w_i / Σw`.
    pub fn next(&self, rng: &mut impl Rng) -> Next {
        self.targets[self.weights.sample(rng)]
    }

    /// Re-sample this state's variable bindings into `vars`. Bindings are
    /// never cached across visits; bindings made by other states an actor
    /// passed through remain visible until overwritten.
    pub fn bind_variables(&self, rng: &mut impl Rng, vars: &mut HashMap<String, Value>) {
        for variable in &self.variables {
            vars.insert(variable.name().to_string(), variable.raw_value(rng));
        }
    }

    /// Render one record for a visit to this state.
    pub fn render_record(
        &self,
        now: DateTime<Utc>,
        rng: &mut impl Rng,
        vars: &HashMap<String, Value>,
    ) -> String {
        self.template.render(now, rng, vars)
    }
}

/// Immutable, validated state graph. The first declared state is initial.
#[derive(Debug)]
pub struct StateGraph {
    states: Vec<State>,
}

/// The terminal marker accepted as a transition target.
const STOP_MARKER: &str = "stop";

impl StateGraph {
    /// Validate and resolve a generator configuration into a graph.
    ///
    /// The RNG seeds cardinality pools; given the same configuration and
    /// seed the graph is identical.
    pub fn build(config: &GeneratorConfig, rng: &mut impl Rng) -> Result<Self, ConfigError> {
        Self::from_parts(&config.emitters, &config.states, rng)
    }

    fn from_parts(
        emitters: &[EmitterConfig],
        states: &[StateConfig],
        rng: &mut impl Rng,
    ) -> Result<Self, ConfigError> {
        if states.is_empty() {
            return Err(ConfigError::NoStates);
        }

        // Templates are built once per emitter and shared across the states
        // that reference them, so counters keep a single global sequence.
        let mut templates: HashMap<&str, Arc<RecordTemplate>> = HashMap::new();
        for emitter in emitters {
            let fields = emitter
                .dimensions
                .iter()
                .map(|d| Field::from_config(d, true, rng))
                .collect::<Result<Vec<_>, _>>()?;
            templates.insert(emitter.name.as_str(), Arc::new(RecordTemplate::new(fields)));
        }

        let mut indices: HashMap<&str, usize> = HashMap::new();
        for (idx, state) in states.iter().enumerate() {
            if indices.insert(state.name.as_str(), idx).is_some() {
                return Err(ConfigError::DuplicateState(state.name.clone()));
            }
        }

        let mut resolved = Vec::with_capacity(states.len());
        for state in states {
            let template = templates
                .get(state.emitter.as_str())
                .cloned()
                .ok_or_else(|| ConfigError::UnknownEmitter {
                    state: state.name.clone(),
                    emitter: state.emitter.clone(),
                })?;

            if state.transitions.is_empty() {
                return Err(ConfigError::NoTransitions(state.name.clone()));
            }
            let mut targets = Vec::with_capacity(state.transitions.len());
            for transition in &state.transitions {
                if transition.next.eq_ignore_ascii_case(STOP_MARKER) {
                    targets.push(Next::Stop);
                } else {
                    let idx = indices.get(transition.next.as_str()).copied().ok_or_else(
                        || ConfigError::UnknownTarget {
                            state: state.name.clone(),
                            target: transition.next.clone(),
                        },
                    )?;
                    targets.push(Next::State(idx));
                }
            }
            let weights =
                WeightedIndex::new(state.transitions.iter().map(|t| t.probability)).map_err(
                    |err| ConfigError::InvalidWeights {
                        state: state.name.clone(),
                        reason: err.to_string(),
                    },
                )?;

            let dwell = Sampler::from_config(&state.delay)?;

            let variables = state
                .variables
                .iter()
                .map(|v| Field::from_config(v, false, rng))
                .collect::<Result<Vec<_>, _>>()?;

            resolved.push(State {
                name: state.name.clone(),
                template,
                dwell,
                targets,
                weights,
                variables,
            });
        }

        Ok(Self { states: resolved })
    }

    /// The initial state: the first one declared.
    pub fn initial(&self) -> &State {
        &self.states[0]
    }

    /// Look up a state by index. Indices come from [`Next::State`] and are
    /// valid by construction.
    pub fn state(&self, idx: usize) -> &State {
        &self.states[idx]
    }

    /// Number of states in the graph.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(11)
    }

    fn config(json: &str) -> GeneratorConfig {
        serde_json::from_str(json).unwrap()
    }

    const TWO_STATES: &str = r#"{
        "interarrival": {"type": "constant", "value": 1},
        "emitters": [{
            "name": "basic",
            "dimensions": [{"type": "counter", "name": "seq"}]
        }],
        "states": [
            {
                "name": "browse",
                "emitter": "basic",
                "delay": {"type": "constant", "value": 1},
                "transitions": [
                    {"next": "buy", "probability": 3.0},
                    {"next": "STOP", "probability": 1.0}
                ],
                "variables": [{"type": "counter", "name": "visit"}]
            },
            {
                "name": "buy",
                "emitter": "basic",
                "delay": {"type": "constant", "value": 2},
                "transitions": [{"next": "stop", "probability": 1.0}]
            }
        ]
    }"#;

    #[test]
    fn test_builds_and_resolves_transitions() {
        let graph = StateGraph::build(&config(TWO_STATES), &mut rng()).unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.initial().name(), "browse");

        // "buy" resolves to index 1; "STOP" is the terminal marker in any
        // case mix.
        let mut rng = rng();
        let mut saw_buy = false;
        let mut saw_stop = false;
        for _ in 0..100 {
            match graph.initial().next(&mut rng) {
                Next::State(1) => saw_buy = true,
                Next::Stop => saw_stop = true,
                other => panic!("unexpected transition {other:?}"),
            }
        }
        assert!(saw_buy && saw_stop);
    }

    #[test]
    fn test_weighted_draw_respects_weights() {
        let graph = StateGraph::build(&config(TWO_STATES), &mut rng()).unwrap();
        let mut rng = rng();
        let buys = (0..10_000)
            .filter(|_| matches!(graph.initial().next(&mut rng), Next::State(_)))
            .count();
        // Weight 3 vs 1: roughly three quarters of draws continue to "buy".
        assert!((6_800..=8_200).contains(&buys), "buys = {buys}");
    }

    #[test]
    fn test_variables_resample_on_every_visit() {
        let graph = StateGraph::build(&config(TWO_STATES), &mut rng()).unwrap();
        let mut rng = rng();
        let mut vars = HashMap::new();
        graph.initial().bind_variables(&mut rng, &mut vars);
        let first = vars["visit"].clone();
        graph.initial().bind_variables(&mut rng, &mut vars);
        assert_ne!(vars["visit"], first);
    }

    #[test]
    fn test_unknown_emitter_is_rejected() {
        let cfg = config(
            r#"{
                "interarrival": {"type": "constant", "value": 1},
                "emitters": [],
                "states": [{
                    "name": "a", "emitter": "ghost",
                    "delay": {"type": "constant", "value": 0},
                    "transitions": [{"next": "stop", "probability": 1.0}]
                }]
            }"#,
        );
        assert!(matches!(
            StateGraph::build(&cfg, &mut rng()),
            Err(ConfigError::UnknownEmitter { .. })
        ));
    }

    #[test]
    fn test_unknown_target_is_rejected() {
        let cfg = config(
            r#"{
                "interarrival": {"type": "constant", "value": 1},
                "emitters": [{"name": "basic", "dimensions": []}],
                "states": [{
                    "name": "a", "emitter": "basic",
                    "delay": {"type": "constant", "value": 0},
                    "transitions": [{"next": "nowhere", "probability": 1.0}]
                }]
            }"#,
        );
        assert!(matches!(
            StateGraph::build(&cfg, &mut rng()),
            Err(ConfigError::UnknownTarget { .. })
        ));
    }

    #[test]
    fn test_state_without_transitions_is_rejected() {
        let cfg = config(
            r#"{
                "interarrival": {"type": "constant", "value": 1},
                "emitters": [{"name": "basic", "dimensions": []}],
                "states": [{
                    "name": "a", "emitter": "basic",
                    "delay": {"type": "constant", "value": 0},
                    "transitions": []
                }]
            }"#,
        );
        assert!(matches!(
            StateGraph::build(&cfg, &mut rng()),
            Err(ConfigError::NoTransitions(_))
        ));
    }

    #[test]
    fn test_negative_weight_is_rejected() {
        let cfg = config(
            r#"{
                "interarrival": {"type": "constant", "value": 1},
                "emitters": [{"name": "basic", "dimensions": []}],
                "states": [{
                    "name": "a", "emitter": "basic",
                    "delay": {"type": "constant", "value": 0},
                    "transitions": [{"next": "stop", "probability": -1.0}]
                }]
            }"#,
        );
        assert!(matches!(
            StateGraph::build(&cfg, &mut rng()),
            Err(ConfigError::InvalidWeights { .. })
        ));
    }

    #[test]
    fn test_duplicate_state_is_rejected() {
        let cfg = config(
            r#"{
                "interarrival": {"type": "constant", "value": 1},
                "emitters": [{"name": "basic", "dimensions": []}],
                "states": [
                    {"name": "a", "emitter": "basic",
                     "delay": {"type": "constant", "value": 0},
                     "transitions": [{"next": "stop", "probability": 1.0}]},
                    {"name": "a", "emitter": "basic",
                     "delay": {"type": "constant", "value": 0},
                     "transitions": [{"next": "stop", "probability": 1.0}]}
                ]
            }"#,
        );
        assert!(matches!(
            StateGraph::build(&cfg, &mut rng()),
            Err(ConfigError::DuplicateState(_))
        ));
    }
}
