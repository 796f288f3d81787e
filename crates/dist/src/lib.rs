//! Sampling distributions.
//!
//! Dwell times, inter-arrival gaps, cardinality picks, string lengths, and
//! numeric field values all draw from the same four distribution shapes:
//! constant, uniform, exponential, and normal. A [`Sampler`] is built once
//! from its serde configuration (parameters validated up front, never
//! defaulted) and then sampled concurrently by any number of actors, each
//! with its own RNG.

use chrono::{DateTime, Utc};
use rand::distributions::{Distribution as _, Uniform};
use rand::Rng;
use rand_distr::{Exp, Normal};
use serde::Deserialize;
use thiserror::Error;

/// Serde model for a distribution. `{"type": "uniform", "min": 1, "max": 9}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DistConfig {
    Constant { value: f64 },
    Uniform { min: f64, max: f64 },
    Exponential { mean: f64 },
    Normal { mean: f64, stddev: f64 },
}

/// Serde model for a timestamp-valued distribution. Shaped like
/// [`DistConfig`] but with RFC 3339 strings where the original parameters
/// are instants; samples are epoch seconds. A normal's stddev stays in
/// plain seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TimestampDistConfig {
    Constant { value: String },
    Uniform { min: String, max: String },
    Exponential { mean: String },
    Normal { mean: String, stddev: f64 },
}

/// Invalid distribution parameters, rejected at construction.
#[derive(Debug, Error)]
pub enum DistError {
    #[error("uniform distribution requires min <= max (got min={min}, max={max})")]
    InvalidRange { min: f64, max: f64 },

    #[error("{param} must be finite (got {value})")]
    NonFinite { param: &'static str, value: f64 },

    #[error("exponential mean must be non-negative (got {0})")]
    NegativeMean(f64),

    #[error("normal stddev must be non-negative (got {0})")]
    NegativeStddev(f64),

    #[error("invalid timestamp {value:?}: {source}")]
    InvalidTimestamp {
        value: String,
        source: chrono::ParseError,
    },
}

/// A validated, immutable sampling distribution.
#[derive(Debug, Clone)]
pub enum Sampler {
    Constant(f64),
    Uniform(Uniform<f64>),
    Exponential(Exp<f64>),
    Normal(Normal<f64>),
}

impl Sampler {
    /// A degenerate sampler that always returns `value`.
    pub fn constant(value: f64) -> Self {
        Sampler::Constant(value)
    }

    /// Build a sampler from its configuration, validating parameters.
    pub fn from_config(config: &DistConfig) -> Result<Self, DistError> {
        match *config {
            DistConfig::Constant { value } => {
                check_finite("constant value", value)?;
                Ok(Sampler::Constant(value))
            }
            DistConfig::Uniform { min, max } => Self::uniform(min, max),
            DistConfig::Exponential { mean } => Self::exponential(mean),
            DistConfig::Normal { mean, stddev } => Self::normal(mean, stddev),
        }
    }

    /// Build a sampler over epoch seconds from a timestamp configuration.
    pub fn from_timestamp_config(config: &TimestampDistConfig) -> Result<Self, DistError> {
        match config {
            TimestampDistConfig::Constant { value } => {
                Ok(Sampler::Constant(parse_epoch_seconds(value)?))
            }
            TimestampDistConfig::Uniform { min, max } => {
                Self::uniform(parse_epoch_seconds(min)?, parse_epoch_seconds(max)?)
            }
            TimestampDistConfig::Exponential { mean } => {
                Self::exponential(parse_epoch_seconds(mean)?)
            }
            TimestampDistConfig::Normal { mean, stddev } => {
                Self::normal(parse_epoch_seconds(mean)?, *stddev)
            }
        }
    }

    /// Uniform over the inclusive range `[min, max]`.
    pub fn uniform(min: f64, max: f64) -> Result<Self, DistError> {
        check_finite("uniform min", min)?;
        check_finite("uniform max", max)?;
        if min > max {
            return Err(DistError::InvalidRange { min, max });
        }
        Ok(Sampler::Uniform(Uniform::new_inclusive(min, max)))
    }

    /// Exponential with the given mean. A zero mean degenerates to a
    /// constant zero, matching the usual "no delay" configuration.
    pub fn exponential(mean: f64) -> Result<Self, DistError> {
        check_finite("exponential mean", mean)?;
        if mean < 0.0 {
            return Err(DistError::NegativeMean(mean));
        }
        if mean == 0.0 {
            return Ok(Sampler::Constant(0.0));
        }
        let exp = Exp::new(1.0 / mean).map_err(|_| DistError::NegativeMean(mean))?;
        Ok(Sampler::Exponential(exp))
    }

    /// Normal with the given mean and standard deviation.
    pub fn normal(mean: f64, stddev: f64) -> Result<Self, DistError> {
        check_finite("normal mean", mean)?;
        check_finite("normal stddev", stddev)?;
        if stddev < 0.0 {
            return Err(DistError::NegativeStddev(stddev));
        }
        let normal = Normal::new(mean, stddev).map_err(|_| DistError::NegativeStddev(stddev))?;
        Ok(Sampler::Normal(normal))
    }

    /// Draw one sample.
    pub fn sample(&self, rng: &mut impl Rng) -> f64 {
        match self {
            Sampler::Constant(value) => *value,
            Sampler::Uniform(uniform) => uniform.sample(rng),
            Sampler::Exponential(exp) => exp.sample(rng),
            Sampler::Normal(normal) => normal.sample(rng),
        }
    }

    /// Draw an index into a collection of `len` elements: the sample is
    /// floored and clamped into `0..len`. `len` must be non-zero.
    pub fn sample_index(&self, rng: &mut impl Rng, len: usize) -> usize {
        debug_assert!(len > 0, "sample_index over an empty collection");
        let sample = self.sample(rng);
        if sample.is_nan() || sample <= 0.0 {
            return 0;
        }
        (sample.floor() as usize).min(len - 1)
    }

    /// Draw a non-negative length (floored, clamped at zero).
    pub fn sample_length(&self, rng: &mut impl Rng) -> usize {
        let sample = self.sample(rng);
        if sample.is_nan() || sample <= 0.0 {
            0
        } else {
            sample.floor() as usize
        }
    }
}

fn check_finite(param: &'static str, value: f64) -> Result<(), DistError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(DistError::NonFinite { param, value })
    }
}

fn parse_epoch_seconds(value: &str) -> Result<f64, DistError> {
    let parsed: DateTime<Utc> = DateTime::parse_from_rfc3339(value)
        .map_err(|source| DistError::InvalidTimestamp {
            value: value.to_string(),
            source,
        })?
        .with_timezone(&Utc);
    Ok(parsed.timestamp_millis() as f64 / 1000.0)
}
