//! Experiment configuration
//!
//! Three JSON documents are loaded before a session starts:
//! - options: timing windows, confederate count, distributions, endpoints
//! - strings: display text
//! - condition: per-condition overrides selecting experimental parameters
//!
//! `Settings::resolve` merges options with the condition, converts every
//! time to milliseconds and validates the result. Any failure here is fatal.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::choice::{TimeParseError, TimeSpec, make_dist};
use crate::sim::engine::{Target, ThinkTime};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse {document} document: {source}")]
    Parse {
        document: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid time for {key}: {source}")]
    Time {
        key: String,
        #[source]
        source: TimeParseError,
    },
    #[error("at least one confederate is required")]
    NoConfederates,
    #[error("expected {expected} probabilities (participant + confederates), got {got}")]
    ProbabilityCount { expected: usize, got: usize },
    #[error("probabilities must be non-negative and sum to a positive number")]
    BadProbabilities,
    #[error("participant-probability must be within [0, 1], got {0}")]
    ParticipantProbability(f64),
    #[error("framerate must be positive, got {0}")]
    Framerate(f64),
    #[error("{key}: minimum {min}ms exceeds maximum {max}ms")]
    Window { key: &'static str, min: u64, max: u64 },
    #[error("no end condition: set time-limit or throw-goal")]
    NoEndCondition,
    #[error("throw-goal must be at least 1")]
    ZeroThrowGoal,
    #[error("key input supports at most 9 confederates, got {0}")]
    TooManyForKeys(usize),
}

/// Condition identifier; documents use either numbers or names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Label {
    Number(u64),
    Text(String),
}

impl Default for Label {
    fn default() -> Self {
        Label::Text(String::new())
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Number(n) => write!(f, "{n}"),
            Label::Text(s) => f.write_str(s),
        }
    }
}

/// The options document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Options {
    pub confederates: usize,

    // === Timing ===
    pub min_connecting_time: TimeSpec,
    pub max_connecting_time: TimeSpec,
    pub min_confederate_time: TimeSpec,
    pub max_confederate_time: TimeSpec,
    /// Extra uniform noise added to each thinking time
    pub confederate_time_jitter: Option<TimeSpec>,
    /// Skew thinking times toward the low end of the window
    pub confederate_time_skew: bool,
    pub time_limit: Option<TimeSpec>,
    /// Delay before each probe, counted from start or from the previous probe closing
    pub probe_intervals: Vec<TimeSpec>,
    /// Close an unanswered probe after this long
    pub probe_timeout: Option<TimeSpec>,
    pub framerate: f64,

    // === Turn taking ===
    /// Weights aligned with participant, then confederates
    pub probabilities: Vec<f64>,
    /// Shorthand: probability of throwing to the participant
    pub participant_probability: Option<f64>,
    /// Throw schedule, e.g. "PCCPC"
    pub schedule: Option<String>,
    /// End the session after this many throws
    pub throw_goal: Option<u32>,

    // === Variants ===
    /// Digit keys throw to confederate N
    pub key_input: bool,
    /// Geometric shapes instead of humanoid sprites
    pub desocialized: bool,

    // === Data ===
    pub data_server_url: Option<String>,
    pub survey_url: Option<String>,
    /// Prefix the sent log with a summary event
    pub summary: bool,
    /// RNG seed; random if absent
    pub seed: Option<u64>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            confederates: 2,

            // Timing
            min_connecting_time: TimeSpec::from("2s"),
            max_connecting_time: TimeSpec::from("5s"),
            min_confederate_time: TimeSpec::from("500ms"),
            max_confederate_time: TimeSpec::from("3s"),
            confederate_time_jitter: None,
            confederate_time_skew: false,
            time_limit: Some(TimeSpec::from("3min")),
            probe_intervals: Vec::new(),
            probe_timeout: None,
            framerate: 30.0,

            // Turn taking
            probabilities: Vec::new(),
            participant_probability: None,
            schedule: None,
            throw_goal: None,

            // Variants
            key_input: false,
            desocialized: false,

            // Data
            data_server_url: None,
            survey_url: None,
            summary: true,
            seed: None,
        }
    }
}

impl Options {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|source| ConfigError::Parse {
            document: "options",
            source,
        })
    }
}

/// The per-condition document; every field overrides the options when set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Condition {
    pub condition: Label,
    pub probabilities: Option<Vec<f64>>,
    pub participant_probability: Option<f64>,
    pub schedule: Option<String>,
    pub throw_goal: Option<u32>,
    pub time_limit: Option<TimeSpec>,
    pub probe_intervals: Option<Vec<TimeSpec>>,
    pub desocialized: Option<bool>,
    pub key_input: Option<bool>,
}

impl Condition {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|source| ConfigError::Parse {
            document: "condition",
            source,
        })
    }
}

/// The strings document. Keys the core does not use are kept in `other`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Strings {
    pub participant_text: String,
    pub turn_text: String,
    /// Confederate names in seating order; "Player N" when missing
    pub confederate_names: Vec<String>,
    #[serde(flatten)]
    pub other: BTreeMap<String, serde_json::Value>,
}

impl Default for Strings {
    fn default() -> Self {
        Self {
            participant_text: "You".to_string(),
            turn_text: "It's your turn".to_string(),
            confederate_names: Vec::new(),
            other: BTreeMap::new(),
        }
    }
}

impl Strings {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|source| ConfigError::Parse {
            document: "strings",
            source,
        })
    }

    /// Name of confederate `index` (0-based)
    pub fn confederate_name(&self, index: usize) -> String {
        self.confederate_names
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("Player {}", index + 1))
    }

    /// A peripheral string, if present
    pub fn text(&self, key: &str) -> Option<&str> {
        self.other.get(key).and_then(|v| v.as_str())
    }

    /// A peripheral list of paragraphs; a single string counts as one
    pub fn paragraphs(&self, key: &str) -> Vec<String> {
        match self.other.get(key) {
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Some(serde_json::Value::String(s)) => vec![s.clone()],
            _ => Vec::new(),
        }
    }
}

/// Options merged with a condition, in milliseconds, validated
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub condition: String,
    pub confederates: usize,
    pub connecting: (u64, u64),
    pub think: ThinkTime,
    pub time_limit: Option<u64>,
    pub probe_intervals: Vec<u64>,
    pub probe_timeout: Option<u64>,
    /// Milliseconds between render ticks
    pub frame_ms: u64,
    pub probabilities: Vec<f64>,
    pub schedule: Vec<Target>,
    pub throw_goal: Option<u32>,
    pub key_input: bool,
    pub desocialized: bool,
    pub data_server_url: Option<String>,
    pub survey_url: Option<String>,
    pub summary: bool,
    pub seed: Option<u64>,
}

fn millis(key: &str, spec: &TimeSpec) -> Result<u64, ConfigError> {
    spec.to_millis().map_err(|source| ConfigError::Time {
        key: key.to_string(),
        source,
    })
}

fn window(key: &'static str, min: u64, max: u64) -> Result<(u64, u64), ConfigError> {
    if min > max {
        return Err(ConfigError::Window { key, min, max });
    }
    Ok((min, max))
}

impl Settings {
    pub fn resolve(options: &Options, condition: &Condition) -> Result<Self, ConfigError> {
        let confederates = options.confederates;
        if confederates == 0 {
            return Err(ConfigError::NoConfederates);
        }
        let players = confederates + 1;

        let connecting = window(
            "connecting-time",
            millis("min-connecting-time", &options.min_connecting_time)?,
            millis("max-connecting-time", &options.max_connecting_time)?,
        )?;
        let (think_min, think_max) = window(
            "confederate-time",
            millis("min-confederate-time", &options.min_confederate_time)?,
            millis("max-confederate-time", &options.max_confederate_time)?,
        )?;
        let jitter = options
            .confederate_time_jitter
            .as_ref()
            .map(|j| millis("confederate-time-jitter", j))
            .transpose()?
            .unwrap_or(0);

        let time_limit = condition
            .time_limit
            .as_ref()
            .or(options.time_limit.as_ref())
            .map(|t| millis("time-limit", t))
            .transpose()?;
        let probe_intervals = condition
            .probe_intervals
            .as_ref()
            .unwrap_or(&options.probe_intervals)
            .iter()
            .map(|t| millis("probe-intervals", t))
            .collect::<Result<Vec<_>, _>>()?;
        let probe_timeout = options
            .probe_timeout
            .as_ref()
            .map(|t| millis("probe-timeout", t))
            .transpose()?;

        if !(options.framerate > 0.0 && options.framerate.is_finite()) {
            return Err(ConfigError::Framerate(options.framerate));
        }
        let frame_ms = ((1000.0 / options.framerate).round() as u64).max(1);

        let listed = condition.probabilities.as_ref().unwrap_or(&options.probabilities);
        let participant_probability = condition
            .participant_probability
            .or(options.participant_probability);
        let probabilities = if !listed.is_empty() {
            if listed.len() != players {
                return Err(ConfigError::ProbabilityCount {
                    expected: players,
                    got: listed.len(),
                });
            }
            listed.clone()
        } else if let Some(p) = participant_probability {
            if !(0.0..=1.0).contains(&p) {
                return Err(ConfigError::ParticipantProbability(p));
            }
            make_dist(players, p)
        } else {
            vec![1.0; players]
        };
        let total: f64 = probabilities.iter().sum();
        if probabilities.iter().any(|w| !(*w >= 0.0) || !w.is_finite()) || !(total > 0.0) {
            return Err(ConfigError::BadProbabilities);
        }

        let schedule = condition
            .schedule
            .as_deref()
            .or(options.schedule.as_deref())
            .map(Target::parse_schedule)
            .unwrap_or_default();
        let throw_goal = condition.throw_goal.or(options.throw_goal);
        if time_limit.is_none() && throw_goal.is_none() {
            return Err(ConfigError::NoEndCondition);
        }
        if throw_goal == Some(0) {
            return Err(ConfigError::ZeroThrowGoal);
        }

        let key_input = condition.key_input.unwrap_or(options.key_input);
        if key_input && confederates > 9 {
            return Err(ConfigError::TooManyForKeys(confederates));
        }

        Ok(Self {
            condition: condition.condition.to_string(),
            confederates,
            connecting,
            think: ThinkTime {
                min: think_min,
                max: think_max,
                jitter,
                skewed: options.confederate_time_skew,
            },
            time_limit,
            probe_intervals,
            probe_timeout,
            frame_ms,
            probabilities,
            schedule,
            throw_goal,
            key_input,
            desocialized: condition.desocialized.unwrap_or(options.desocialized),
            data_server_url: options.data_server_url.clone(),
            survey_url: options.survey_url.clone(),
            summary: options.summary,
            seed: options.seed,
        })
    }

    /// Where the end screen sends the participant, with the page query appended
    pub fn survey_link(&self, query: &str) -> Option<String> {
        self.survey_url.as_ref().map(|url| {
            if query.is_empty() {
                url.clone()
            } else {
                format!("{url}?{query}")
            }
        })
    }
}
