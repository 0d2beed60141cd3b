//! Agent definition loading and validation for murmur.
//!
//! An agent is described by `agents/<name>.json` (or `.toml`): who it is
//! (bio, traits, style examples), how often it acts (`loop_delay`), which
//! connections it uses, and which weighted tasks it picks from. Every
//! problem in a definition is reported at startup, all at once.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use murmur_core::state::keys;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Top-level fields every agent definition must carry.
pub const REQUIRED_FIELDS: [&str; 7] = [
    "name",
    "bio",
    "traits",
    "examples",
    "loop_delay",
    "config",
    "tasks",
];

/// Default values for connection settings the agent loop also reads.
pub mod defaults {
    /// Seconds between two posted tweets.
    pub const TWEET_INTERVAL: u64 = 900;
    /// Replies fetched when the agent finds its own tweet on the timeline.
    pub const OWN_TWEET_REPLIES_COUNT: u64 = 2;
    pub const TIMELINE_READ_COUNT: u64 = 10;
    /// Seconds between two room messages.
    pub const MESSAGE_INTERVAL: u64 = 60;
    pub const HISTORY_READ_COUNT: u64 = 50;
    pub const NIGHT_MULTIPLIER: f64 = 0.4;
    pub const DAY_MULTIPLIER: f64 = 1.5;
}

/// Multiplier table key applied to posting tasks at night.
pub const NIGHT_MULTIPLIER_KEY: &str = "tweet_night_multiplier";
/// Multiplier table key applied to engagement tasks during the day.
pub const DAY_MULTIPLIER_KEY: &str = "engagement_day_multiplier";

/// The root agent definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinition {
    /// Agent name (used in prompts and logs)
    pub name: String,

    /// Lines describing who the agent is
    pub bio: Vec<String>,

    /// Personality traits
    pub traits: Vec<String>,

    /// Example posts illustrating the agent's style
    pub examples: Vec<String>,

    /// Accounts whose recent posts are added to the style examples
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub example_accounts: Vec<String>,

    /// Seconds to sleep after a successful iteration
    pub loop_delay: f64,

    /// Seconds to sleep after a non-successful iteration
    #[serde(default = "default_fallback_delay")]
    pub fallback_delay: f64,

    /// Connection entries, one per backend
    pub config: Vec<ConnectionConfig>,

    /// Weighted tasks the loop selects from
    pub tasks: Vec<TaskConfig>,

    /// Enable time-of-day weight adjustment. Defaults to on whenever a
    /// multiplier table is present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_based_weights: Option<bool>,

    /// Named multipliers for time-of-day weighting
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub time_based_multipliers: HashMap<String, f64>,

    /// Task names slowed down at night
    #[serde(default = "default_posting_tasks")]
    pub posting_tasks: Vec<String>,

    /// Task names boosted during the day
    #[serde(default = "default_engagement_tasks")]
    pub engagement_tasks: Vec<String>,

    /// Inputs the loop keeps cached in agent state
    #[serde(default = "default_data_sources")]
    pub data_sources: Vec<DataSourceConfig>,

    /// Abort startup when the agent's own username cannot be resolved
    #[serde(default)]
    pub require_identity: bool,

    /// Environment variable holding the agent's own username
    #[serde(default = "default_identity_env")]
    pub identity_env: String,
}

fn default_fallback_delay() -> f64 {
    60.0
}

/// Seconds as a `Duration`; values `validate` would reject read as the
/// default fallback delay.
fn delay(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs)
        .ok()
        .filter(|d| !d.is_zero())
        .unwrap_or_else(|| Duration::from_secs_f64(default_fallback_delay()))
}
fn default_posting_tasks() -> Vec<String> {
    vec!["post-tweet".into()]
}
fn default_engagement_tasks() -> Vec<String> {
    vec!["reply-to-tweet".into(), "like-tweet".into()]
}
fn default_identity_env() -> String {
    "TWITTER_USERNAME".into()
}
fn default_data_sources() -> Vec<DataSourceConfig> {
    vec![
        DataSourceConfig {
            state_key: keys::TIMELINE_TWEETS.into(),
            connection: "twitter".into(),
            action: "read-timeline".into(),
            args: serde_json::Map::new(),
            required_by: "tweet".into(),
        },
        DataSourceConfig {
            state_key: keys::ROOM_INFO.into(),
            connection: "echochambers".into(),
            action: "get-room-info".into(),
            args: serde_json::Map::new(),
            required_by: "echochambers".into(),
        },
    ]
}

/// One configured connection.
///
/// `kind` selects the implementation and defaults to `name`, so two
/// OpenAI-compatible endpoints can coexist as `openai` and `ollama`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Connection-specific settings (varies by backend)
    #[serde(flatten)]
    pub settings: serde_json::Map<String, Value>,
}

impl ConnectionConfig {
    pub fn kind(&self) -> &str {
        self.kind.as_deref().unwrap_or(&self.name)
    }
}

/// A weighted task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    pub name: String,

    #[serde(default)]
    pub weight: f64,

    /// Route this task straight to a connection action instead of a
    /// built-in handler
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<TaskBinding>,
}

/// A direct connection action performed by a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskBinding {
    pub connection: String,
    pub action: String,
    #[serde(default)]
    pub args: serde_json::Map<String, Value>,
}

/// An input the loop fetches into agent state whenever the entry is empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceConfig {
    pub state_key: String,
    pub connection: String,
    pub action: String,
    #[serde(default)]
    pub args: serde_json::Map<String, Value>,
    /// Fetch only when some task name contains this fragment
    pub required_by: String,
}

impl DataSourceConfig {
    /// Whether any of the given tasks needs this source.
    pub fn is_required_by<'a>(&self, mut task_names: impl Iterator<Item = &'a str>) -> bool {
        task_names.any(|name| name.contains(&self.required_by))
    }
}

impl AgentDefinition {
    /// Load a definition from a `.json` or `.toml` file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let is_toml = path.extension().is_some_and(|ext| ext == "toml");
        let document: Value = if is_toml {
            toml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
        } else {
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
        };

        let definition = Self::from_value(document)?;
        tracing::debug!(agent = %definition.name, path = %path.display(), "Loaded agent definition");
        Ok(definition)
    }

    /// Build a definition from an already-parsed document.
    pub fn from_value(document: Value) -> Result<Self, ConfigError> {
        let Some(fields) = document.as_object() else {
            return Err(ConfigError::MissingFields(
                REQUIRED_FIELDS.iter().map(|f| f.to_string()).collect(),
            ));
        };

        let missing: Vec<String> = REQUIRED_FIELDS
            .iter()
            .filter(|field| !fields.contains_key(**field))
            .map(|field| field.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::MissingFields(missing));
        }

        let definition: Self = serde_json::from_value(document)
            .map_err(|e| ConfigError::ValidationError(vec![e.to_string()]))?;
        definition.validate()?;
        Ok(definition)
    }

    /// Validate the definition, collecting every violation.
    fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.name.trim().is_empty() {
            problems.push("name must not be empty".to_string());
        }
        for (field, secs) in [
            ("loop_delay", self.loop_delay),
            ("fallback_delay", self.fallback_delay),
        ] {
            if !(secs.is_finite() && secs > 0.0) {
                problems.push(format!("{field} must be a positive number, got {secs}"));
            } else if Duration::try_from_secs_f64(secs).is_err() {
                problems.push(format!("{field} is too large, got {secs}"));
            }
        }

        let mut task_names = HashSet::new();
        for task in &self.tasks {
            if task.name.trim().is_empty() {
                problems.push("task name must not be empty".to_string());
            } else if !task_names.insert(task.name.as_str()) {
                problems.push(format!("duplicate task '{}'", task.name));
            }
            if !(task.weight.is_finite() && task.weight >= 0.0) {
                problems.push(format!(
                    "task '{}' weight must be a non-negative number, got {}",
                    task.name, task.weight
                ));
            }
        }

        for (index, connection) in self.config.iter().enumerate() {
            if connection.name.trim().is_empty() {
                problems.push(format!("config[{index}] has an empty name"));
            }
        }

        for (key, multiplier) in &self.time_based_multipliers {
            if !(multiplier.is_finite() && *multiplier >= 0.0) {
                problems.push(format!(
                    "time_based_multipliers.{key} must be a non-negative number, got {multiplier}"
                ));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationError(problems))
        }
    }

    pub fn loop_delay(&self) -> Duration {
        delay(self.loop_delay)
    }

    pub fn fallback_delay(&self) -> Duration {
        delay(self.fallback_delay)
    }

    /// Whether task weights are adjusted by time of day.
    pub fn time_weighting_enabled(&self) -> bool {
        self.time_based_weights
            .unwrap_or(!self.time_based_multipliers.is_empty())
    }

    /// Find a connection entry by name.
    pub fn connection(&self, name: &str) -> Option<&ConnectionConfig> {
        self.config.iter().find(|c| c.name == name)
    }

    /// Data sources needed by at least one configured task.
    pub fn required_data_sources(&self) -> impl Iterator<Item = &DataSourceConfig> {
        self.data_sources
            .iter()
            .filter(|source| source.is_required_by(self.tasks.iter().map(|t| t.name.as_str())))
    }
}

/// `agents/general.json`: directory-wide settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_agent: Option<String>,
}

/// A directory of agent definitions.
#[derive(Debug, Clone)]
pub struct AgentDirectory {
    root: PathBuf,
}

const GENERAL_FILE: &str = "general.json";

impl Default for AgentDirectory {
    fn default() -> Self {
        Self::new("agents")
    }
}

impl AgentDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the directory and an empty `general.json` if missing.
    pub fn ensure_exists(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.root).map_err(|e| ConfigError::ReadError {
            path: self.root.clone(),
            reason: e.to_string(),
        })?;
        let general = self.root.join(GENERAL_FILE);
        if !general.exists() {
            self.write_general(&GeneralConfig::default())?;
        }
        Ok(())
    }

    /// Names of all agent definitions, sorted.
    pub fn list_agents(&self) -> Result<Vec<String>, ConfigError> {
        let entries = std::fs::read_dir(&self.root).map_err(|e| ConfigError::ReadError {
            path: self.root.clone(),
            reason: e.to_string(),
        })?;

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .is_some_and(|ext| ext == "json" || ext == "toml")
            })
            .filter(|path| path.file_name().is_some_and(|n| n != GENERAL_FILE))
            .filter_map(|path| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Path of an agent's definition file (JSON preferred over TOML).
    pub fn path_for(&self, name: &str) -> Option<PathBuf> {
        ["json", "toml"]
            .iter()
            .map(|ext| self.root.join(format!("{name}.{ext}")))
            .find(|path| path.is_file())
    }

    /// Load an agent by name.
    pub fn load(&self, name: &str) -> Result<AgentDefinition, ConfigError> {
        let path = self.path_for(name).ok_or_else(|| ConfigError::AgentNotFound {
            name: name.to_string(),
            dir: self.root.clone(),
        })?;
        AgentDefinition::load_from(&path)
    }

    /// The default agent named in `general.json`, if any.
    pub fn default_agent(&self) -> Result<Option<String>, ConfigError> {
        Ok(self.read_general()?.default_agent)
    }

    /// Record `name` as the default agent. The agent must exist.
    pub fn set_default_agent(&self, name: &str) -> Result<(), ConfigError> {
        if self.path_for(name).is_none() {
            return Err(ConfigError::AgentNotFound {
                name: name.to_string(),
                dir: self.root.clone(),
            });
        }
        let mut general = self.read_general()?;
        general.default_agent = Some(name.to_string());
        self.write_general(&general)
    }

    /// Resolve an explicit agent name, falling back to the default agent.
    pub fn resolve(&self, name: Option<&str>) -> Result<AgentDefinition, ConfigError> {
        match name {
            Some(name) => self.load(name),
            None => {
                let name = self.default_agent()?.ok_or(ConfigError::NoDefaultAgent)?;
                self.load(&name)
            }
        }
    }

    fn read_general(&self) -> Result<GeneralConfig, ConfigError> {
        let path = self.root.join(GENERAL_FILE);
        if !path.exists() {
            return Ok(GeneralConfig::default());
        }
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::ReadError {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            reason: e.to_string(),
        })
    }

    fn write_general(&self, general: &GeneralConfig) -> Result<(), ConfigError> {
        let path = self.root.join(GENERAL_FILE);
        let content = serde_json::to_string_pretty(general).map_err(|e| ConfigError::ParseError {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        std::fs::write(&path, content).map_err(|e| ConfigError::ReadError {
            path,
            reason: e.to_string(),
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to access {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    #[error("Agent definition invalid: {}", .0.join("; "))]
    ValidationError(Vec<String>),

    #[error("Agent '{name}' not found in {dir}")]
    AgentNotFound { name: String, dir: PathBuf },

    #[error("No agent given and no default_agent set in general.json")]
    NoDefaultAgent,
}
