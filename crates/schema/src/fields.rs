//! Stochastic field generators.
//!
//! A [`Field`] is built once from its configuration and then shared
//! read-only by every actor; the only mutable piece is the counter kind,
//! which advances through an atomic so all actors observe one sequence.
//! Generation draws null/omission chances independently per field, with
//! null taking precedence when both trigger.

use crate::config::FieldConfig;
use crate::ConfigError;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use synthload_dist::{DistConfig, Sampler};
use tracing::warn;

/// Render format for record timestamps: ISO 8601 with millisecond
/// precision, no zone suffix.
pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// Format an instant the way records carry timestamps.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIME_FORMAT).to_string()
}

/// Outcome of generating one field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// The field is omitted from the record entirely.
    Missing,
    /// The field is present (possibly as an explicit null).
    Present(Value),
}

/// A pre-materialized pool of distinct values drawn through a dedicated
/// distribution, bounding a field's effective cardinality.
#[derive(Debug)]
struct Cardinality {
    pool: Vec<Value>,
    dist: Sampler,
}

impl Cardinality {
    fn pick(&self, rng: &mut impl Rng) -> Value {
        self.pool[self.dist.sample_index(rng, self.pool.len())].clone()
    }
}

#[derive(Debug)]
enum FieldKind {
    Counter {
        next: AtomicI64,
        increment: i64,
    },
    Enum {
        values: Vec<Value>,
        dist: Sampler,
    },
    Str {
        length: Sampler,
        chars: Vec<char>,
        pool: Option<Cardinality>,
    },
    Int {
        dist: Sampler,
        pool: Option<Cardinality>,
    },
    Float {
        dist: Sampler,
        precision: Option<u32>,
        pool: Option<Cardinality>,
    },
    Timestamp {
        dist: Sampler,
        pool: Option<Cardinality>,
    },
    IpAddress {
        dist: Sampler,
        pool: Option<Cardinality>,
    },
    Object {
        fields: Vec<Field>,
        pool: Option<Cardinality>,
    },
    List {
        elements: Vec<Field>,
        length: Sampler,
        selection: Sampler,
        pool: Option<Cardinality>,
    },
    Variable {
        source: String,
    },
}

/// One stochastic field of a record template.
#[derive(Debug)]
pub struct Field {
    name: String,
    percent_nulls: f64,
    percent_missing: f64,
    kind: FieldKind,
}

impl Field {
    /// Build a field from configuration. `allow_variable` is false inside
    /// objects, lists, and variable bindings, where a variable reference
    /// has nothing to resolve against.
    pub fn from_config<R: Rng>(
        config: &FieldConfig,
        allow_variable: bool,
        rng: &mut R,
    ) -> Result<Self, ConfigError> {
        let name = config.name().to_string();
        let (percent_nulls, percent_missing) = match config {
            FieldConfig::Variable { .. } => (0.0, 0.0),
            FieldConfig::Counter {
                percent_nulls,
                percent_missing,
                ..
            }
            | FieldConfig::Enum {
                percent_nulls,
                percent_missing,
                ..
            }
            | FieldConfig::String {
                percent_nulls,
                percent_missing,
                ..
            }
            | FieldConfig::Int {
                percent_nulls,
                percent_missing,
                ..
            }
            | FieldConfig::Float {
                percent_nulls,
                percent_missing,
                ..
            }
            | FieldConfig::Timestamp {
                percent_nulls,
                percent_missing,
                ..
            }
            | FieldConfig::IpAddress {
                percent_nulls,
                percent_missing,
                ..
            }
            | FieldConfig::Object {
                percent_nulls,
                percent_missing,
                ..
            }
            | FieldConfig::List {
                percent_nulls,
                percent_missing,
                ..
            } => (percent_nulls / 100.0, percent_missing / 100.0),
        };

        let kind = match config {
            FieldConfig::Counter {
                start, increment, ..
            } => FieldKind::Counter {
                next: AtomicI64::new(*start),
                increment: *increment,
            },

            FieldConfig::Enum {
                values,
                cardinality_distribution,
                ..
            } => {
                let dist = cardinality_distribution
                    .as_ref()
                    .ok_or_else(|| ConfigError::MissingCardinalityDistribution(name.clone()))?;
                FieldKind::Enum {
                    values: values.clone(),
                    dist: field_sampler(&name, dist)?,
                }
            }

            FieldConfig::String {
                cardinality,
                cardinality_distribution,
                length_distribution,
                chars,
                ..
            } => {
                let length = field_sampler(&name, length_distribution)?;
                let chars: Vec<char> = match chars {
                    Some(set) => set.chars().collect(),
                    None => (0x20u8..=0x7e).map(char::from).collect(),
                };
                let pool = build_pool(&name, config, rng, |rng| draw_string(&length, &chars, rng))?;
                FieldKind::Str {
                    length,
                    chars,
                    pool,
                }
            }

            FieldConfig::Int { distribution, .. } => {
                let dist = field_sampler(&name, distribution)?;
                let pool = build_pool(&name, config, rng, |rng| draw_int(&dist, rng))?;
                FieldKind::Int { dist, pool }
            }

            FieldConfig::Float {
                distribution,
                precision,
                ..
            } => {
                let dist = field_sampler(&name, distribution)?;
                let pool = build_pool(&name, config, rng, |rng| draw_float(&dist, *precision, rng))?;
                FieldKind::Float {
                    dist,
                    precision: *precision,
                    pool,
                }
            }

            FieldConfig::Timestamp { distribution, .. } => {
                let dist = Sampler::from_timestamp_config(distribution).map_err(|source| {
                    ConfigError::FieldDistribution {
                        field: name.clone(),
                        source,
                    }
                })?;
                let pool = build_pool(&name, config, rng, |rng| draw_timestamp(&dist, rng))?;
                FieldKind::Timestamp { dist, pool }
            }

            FieldConfig::IpAddress { distribution, .. } => {
                let dist = field_sampler(&name, distribution)?;
                let pool = build_pool(&name, config, rng, |rng| draw_ip_address(&dist, rng))?;
                FieldKind::IpAddress { dist, pool }
            }

            FieldConfig::Object { dimensions, .. } => {
                let fields = dimensions
                    .iter()
                    .map(|d| Field::from_config(d, false, rng))
                    .collect::<Result<Vec<_>, _>>()?;
                let pool = build_pool(&name, config, rng, |rng| draw_object(&fields, rng))?;
                FieldKind::Object { fields, pool }
            }

            FieldConfig::List {
                elements,
                length_distribution,
                selection_distribution,
                ..
            } => {
                let elements = elements
                    .iter()
                    .map(|e| Field::from_config(e, false, rng))
                    .collect::<Result<Vec<_>, _>>()?;
                let length = field_sampler(&name, length_distribution)?;
                let selection = field_sampler(&name, selection_distribution)?;
                let pool = build_pool(&name, config, rng, |rng| {
                    draw_list(&elements, &length, &selection, rng)
                })?;
                FieldKind::List {
                    elements,
                    length,
                    selection,
                    pool,
                }
            }

            FieldConfig::Variable { variable, .. } => {
                if !allow_variable {
                    return Err(ConfigError::NestedVariable(name));
                }
                FieldKind::Variable {
                    source: variable.clone(),
                }
            }
        };

        Ok(Field {
            name,
            percent_nulls,
            percent_missing,
            kind,
        })
    }

    /// The field's record key.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Generate this field for one record. Null and omission are drawn
    /// independently; null wins when both trigger. Variable fields are
    /// never null or missing.
    pub fn generate(&self, rng: &mut impl Rng, vars: &HashMap<String, Value>) -> FieldValue {
        if let FieldKind::Variable { source } = &self.kind {
            return match vars.get(source) {
                Some(value) => FieldValue::Present(value.clone()),
                None => {
                    warn!(field = %self.name, variable = %source, "unbound variable");
                    FieldValue::Present(Value::Null)
                }
            };
        }

        let is_null = rng.gen::<f64>() < self.percent_nulls;
        let is_missing = rng.gen::<f64>() < self.percent_missing;
        if is_null {
            FieldValue::Present(Value::Null)
        } else if is_missing {
            FieldValue::Missing
        } else {
            FieldValue::Present(self.kind.value(rng))
        }
    }

    /// Draw a raw value, bypassing null/omission chances and any
    /// cardinality pool. This is what variable bindings are made of.
    pub fn raw_value(&self, rng: &mut impl Rng) -> Value {
        self.kind.draw(rng)
    }
}

impl FieldKind {
    /// Draw a value honoring the cardinality pool when one exists.
    fn value(&self, rng: &mut impl Rng) -> Value {
        let pool = match self {
            FieldKind::Str { pool, .. }
            | FieldKind::Int { pool, .. }
            | FieldKind::Float { pool, .. }
            | FieldKind::Timestamp { pool, .. }
            | FieldKind::IpAddress { pool, .. }
            | FieldKind::Object { pool, .. }
            | FieldKind::List { pool, .. } => pool.as_ref(),
            _ => None,
        };
        match pool {
            Some(pool) => pool.pick(rng),
            None => self.draw(rng),
        }
    }

    /// Draw a fresh value, ignoring any cardinality pool.
    fn draw(&self, rng: &mut impl Rng) -> Value {
        match self {
            FieldKind::Counter { next, increment } => {
                let value = next.fetch_add(*increment, Ordering::Relaxed);
                Value::String(value.to_string())
            }

            FieldKind::Enum { values, dist } => {
                let picked = &values[dist.sample_index(rng, values.len())];
                Value::String(stringify(picked))
            }

            FieldKind::Str { length, chars, .. } => draw_string(length, chars, rng),

            FieldKind::Int { dist, .. } => draw_int(dist, rng),

            FieldKind::Float {
                dist, precision, ..
            } => draw_float(dist, *precision, rng),

            FieldKind::Timestamp { dist, .. } => draw_timestamp(dist, rng),

            FieldKind::IpAddress { dist, .. } => draw_ip_address(dist, rng),

            FieldKind::Object { fields, .. } => draw_object(fields, rng),

            FieldKind::List {
                elements,
                length,
                selection,
                ..
            } => draw_list(elements, length, selection, rng),

            FieldKind::Variable { .. } => Value::Null,
        }
    }
}

fn draw_string(length: &Sampler, chars: &[char], rng: &mut impl Rng) -> Value {
    let n = length.sample_length(rng);
    let s: String = (0..n).map(|_| chars[rng.gen_range(0..chars.len())]).collect();
    Value::String(s)
}

fn draw_int(dist: &Sampler, rng: &mut impl Rng) -> Value {
    Value::Number(Number::from(dist.sample(rng) as i64))
}

fn draw_float(dist: &Sampler, precision: Option<u32>, rng: &mut impl Rng) -> Value {
    let mut v = dist.sample(rng);
    if let Some(p) = precision {
        let scale = 10f64.powi(p as i32);
        v = (v * scale).round() / scale;
    }
    Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
}

fn draw_timestamp(dist: &Sampler, rng: &mut impl Rng) -> Value {
    let millis = (dist.sample(rng) * 1000.0) as i64;
    let at = DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or_default();
    Value::String(format_timestamp(at))
}

fn draw_ip_address(dist: &Sampler, rng: &mut impl Rng) -> Value {
    let raw = dist.sample(rng).clamp(0.0, u32::MAX as f64) as u32;
    Value::String(format!(
        "{}.{}.{}.{}",
        (raw >> 24) & 0xff,
        (raw >> 16) & 0xff,
        (raw >> 8) & 0xff,
        raw & 0xff,
    ))
}

fn draw_object(fields: &[Field], rng: &mut impl Rng) -> Value {
    let empty = HashMap::new();
    let mut map = Map::new();
    for field in fields {
        if let FieldValue::Present(value) = field.generate(rng, &empty) {
            map.insert(field.name().to_string(), value);
        }
    }
    Value::Object(map)
}

fn draw_list(
    elements: &[Field],
    length: &Sampler,
    selection: &Sampler,
    rng: &mut impl Rng,
) -> Value {
    let empty = HashMap::new();
    let n = length.sample_length(rng);
    let mut items = Vec::with_capacity(n);
    for _ in 0..n {
        let element = &elements[selection.sample_index(rng, elements.len())];
        if let FieldValue::Present(value) = element.generate(rng, &empty) {
            items.push(value);
        }
    }
    Value::Array(items)
}

/// Render a configured enum value the way records carry it: strings stay
/// bare, everything else keeps its JSON rendering.
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn field_sampler(field: &str, config: &DistConfig) -> Result<Sampler, ConfigError> {
    Sampler::from_config(config).map_err(|source| ConfigError::FieldDistribution {
        field: field.to_string(),
        source,
    })
}

/// Bounded retries when filling a cardinality pool with distinct values.
const POOL_ATTEMPTS_PER_VALUE: usize = 1000;

/// Pre-materialize the field's cardinality pool, or `None` when it is
/// unpooled. A cardinality without a distribution is a configuration
/// error; a generator that cannot produce enough distinct values within
/// the bounded retries is too.
fn build_pool<R: Rng>(
    field: &str,
    config: &FieldConfig,
    rng: &mut R,
    mut draw: impl FnMut(&mut R) -> Value,
) -> Result<Option<Cardinality>, ConfigError> {
    let (cardinality, dist) = match config {
        FieldConfig::String {
            cardinality,
            cardinality_distribution,
            ..
        }
        | FieldConfig::Int {
            cardinality,
            cardinality_distribution,
            ..
        }
        | FieldConfig::Float {
            cardinality,
            cardinality_distribution,
            ..
        }
        | FieldConfig::Timestamp {
            cardinality,
            cardinality_distribution,
            ..
        }
        | FieldConfig::IpAddress {
            cardinality,
            cardinality_distribution,
            ..
        }
        | FieldConfig::Object {
            cardinality,
            cardinality_distribution,
            ..
        }
        | FieldConfig::List {
            cardinality,
            cardinality_distribution,
            ..
        } => (*cardinality, cardinality_distribution.as_ref()),
        _ => (0, None),
    };

    if cardinality == 0 {
        return Ok(None);
    }
    let dist = dist.ok_or_else(|| ConfigError::MissingCardinalityDistribution(field.to_string()))?;
    let dist = field_sampler(field, dist)?;

    let mut pool: Vec<Value> = Vec::with_capacity(cardinality);
    let mut attempts = 0usize;
    while pool.len() < cardinality {
        let value = draw(rng);
        if !pool.contains(&value) {
            pool.push(value);
        }
        attempts += 1;
        if attempts > cardinality * POOL_ATTEMPTS_PER_VALUE {
            return Err(ConfigError::CardinalityExhausted {
                field: field.to_string(),
                cardinality,
            });
        }
    }

    Ok(Some(Cardinality { pool, dist }))
}

/// An ordered list of fields rendered into one record per state visit,
/// always led by the `time` field carrying the logical-clock timestamp.
#[derive(Debug)]
pub struct RecordTemplate {
    fields: Vec<Field>,
}

impl RecordTemplate {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Render one record as a JSON line.
    pub fn render(
        &self,
        now: DateTime<Utc>,
        rng: &mut impl Rng,
        vars: &HashMap<String, Value>,
    ) -> String {
        let mut map = Map::new();
        map.insert("time".to_string(), Value::String(format_timestamp(now)));
        for field in &self.fields {
            if let FieldValue::Present(value) = field.generate(rng, vars) {
                map.insert(field.name().to_string(), value);
            }
        }
        Value::Object(map).to_string()
    }
}
