use crate::utils::error::{ChainError, Result};
use crate::utils::validation::{
    validate_non_empty_list, validate_non_empty_string, validate_path, validate_positive_number,
    validate_required_field, Validate,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;

/// A single pipeline run described in TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub job: JobSection,
    pub source: SourceConfig,
    #[serde(default)]
    pub steps: Vec<StepConfig>,
    pub sink: SinkConfig,
    #[serde(default)]
    pub error_handling: ErrorHandlingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSection {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    #[default]
    Jsonl,
    Csv,
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataFormat::Jsonl => write!(f, "jsonl"),
            DataFormat::Csv => write!(f, "csv"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub path: String,
    #[serde(default)]
    pub format: DataFormat,
    /// CSV only: column names for a file without a header row.
    pub fieldnames: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    pub path: String,
    #[serde(default)]
    pub format: DataFormat,
    /// CSV only: the columns to write, in order.
    pub fieldnames: Option<Vec<String>>,
    #[serde(default)]
    pub append: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    Skip,
    #[default]
    Abort,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorHandlingConfig {
    #[serde(default)]
    pub on_error: ErrorPolicy,
}

fn default_step() -> usize {
    1
}

/// One combinator applied to every record, in file order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StepConfig {
    KeepKeys {
        keys: Vec<String>,
    },
    DropKey {
        key: String,
    },
    RenameKey {
        from: String,
        to: String,
        #[serde(default)]
        strict: bool,
    },
    SetKey {
        key: String,
        value: Value,
    },
    /// Sets `key` to the current UTC time.
    StampKey {
        key: String,
    },
    FilterEq {
        key: String,
        value: Value,
    },
    OmitEq {
        key: String,
        value: Value,
    },
    Slice {
        #[serde(default)]
        start: usize,
        stop: Option<usize>,
        #[serde(default = "default_step")]
        step: usize,
    },
    Join {
        key: String,
        path: String,
        #[serde(default)]
        format: DataFormat,
    },
}

impl fmt::Display for StepConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepConfig::KeepKeys { keys } => write!(f, "keep_keys [{}]", keys.join(", ")),
            StepConfig::DropKey { key } => write!(f, "drop_key {}", key),
            StepConfig::RenameKey { from, to, strict } => {
                write!(f, "rename_key {} -> {}", from, to)?;
                if *strict {
                    write!(f, " (strict)")?;
                }
                Ok(())
            }
            StepConfig::SetKey { key, value } => write!(f, "set_key {} = {}", key, value),
            StepConfig::StampKey { key } => write!(f, "stamp_key {}", key),
            StepConfig::FilterEq { key, value } => write!(f, "filter_eq {} == {}", key, value),
            StepConfig::OmitEq { key, value } => write!(f, "omit_eq {} == {}", key, value),
            StepConfig::Slice { start, stop, step } => match stop {
                Some(stop) => write!(f, "slice {}..{} step {}", start, stop, step),
                None => write!(f, "slice {}.. step {}", start, step),
            },
            StepConfig::Join { key, path, format } => {
                write!(f, "join on {} with {} ({})", key, path, format)
            }
        }
    }
}

impl JobConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// Parses a job, substituting `${VAR}` references from the environment first.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = Self::substitute_env_vars(content)?;

        toml::from_str(&processed).map_err(|e| ChainError::config(format!("TOML parsing error: {}", e)))
    }

    /// Unset variables are left as written.
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ChainError::config(e.to_string()))?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.into_owned())
    }

    pub fn skips_failures(&self) -> bool {
        self.error_handling.on_error == ErrorPolicy::Skip
    }
}

impl Validate for JobConfig {
    fn validate(&self) -> Result<()> {
        validate_non_empty_string("job.name", &self.job.name)?;
        validate_path("source.path", &self.source.path)?;
        if let Some(fieldnames) = &self.source.fieldnames {
            validate_non_empty_list("source.fieldnames", fieldnames)?;
        }

        validate_path("sink.path", &self.sink.path)?;
        if self.sink.format == DataFormat::Csv {
            let fieldnames = validate_required_field("sink.fieldnames", &self.sink.fieldnames)?;
            validate_non_empty_list("sink.fieldnames", fieldnames)?;
        }

        for step in &self.steps {
            step.validate()?;
        }
        Ok(())
    }
}

impl Validate for StepConfig {
    fn validate(&self) -> Result<()> {
        match self {
            StepConfig::KeepKeys { keys } => validate_non_empty_list("steps.keys", keys),
            StepConfig::DropKey { key }
            | StepConfig::SetKey { key, .. }
            | StepConfig::StampKey { key }
            | StepConfig::FilterEq { key, .. }
            | StepConfig::OmitEq { key, .. } => validate_non_empty_string("steps.key", key),
            StepConfig::RenameKey { from, to, .. } => {
                validate_non_empty_string("steps.from", from)?;
                validate_non_empty_string("steps.to", to)
            }
            StepConfig::Slice { step, .. } => validate_positive_number("steps.step", *step, 1),
            StepConfig::Join { key, path, .. } => {
                validate_non_empty_string("steps.key", key)?;
                validate_path("steps.path", path)
            }
        }
    }
}
