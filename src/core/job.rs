use crate::config::job_config::{DataFormat, JobConfig, StepConfig};
use crate::core::chain::Chain;
use crate::domain::model::Record;
use crate::utils::error::{ChainError, Result};
use crate::utils::io::{read_csv_records, read_jsonl_records, write_csv_records, write_jsonl};
use crate::utils::validation::Validate;
use chrono::Utc;
use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;

type RecordSource = Box<dyn Iterator<Item = Result<Record>>>;

/// Outcome of a finished job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub written: usize,
    pub skipped: usize,
    pub output_path: String,
}

/// Runs a [`JobConfig`]: read, apply the steps in order, write.
pub struct JobEngine {
    config: JobConfig,
    stage_counts: bool,
}

impl JobEngine {
    pub fn new(config: JobConfig) -> Self {
        Self {
            config,
            stage_counts: false,
        }
    }

    /// Logs per-stage element counts at debug level when the run ends.
    pub fn with_stage_counts(mut self, enabled: bool) -> Self {
        self.stage_counts = enabled;
        self
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    /// Human-readable description of what [`JobEngine::run`] would do.
    pub fn plan(&self) -> Vec<String> {
        let source = &self.config.source;
        let sink = &self.config.sink;
        let mut plan = vec![format!("read {} records from {}", source.format, source.path)];
        plan.extend(self.config.steps.iter().map(ToString::to_string));
        plan.push(format!(
            "write {} records to {}{}",
            sink.format,
            sink.path,
            if sink.append { " (append)" } else { "" }
        ));
        if self.config.skips_failures() {
            plan.push("skip records that fail".to_string());
        }
        plan
    }

    /// Validates the job, then drives it to completion.
    pub fn run(&self) -> Result<JobReport> {
        self.config.validate()?;
        tracing::info!(job = %self.config.job.name, "Starting job");

        let source = &self.config.source;
        let mut chain = Chain::try_new(open_records(&source.path, source.format, source.fieldnames.clone())?);
        if self.stage_counts {
            chain = chain.with_stage_counts();
        }

        let skipped = Rc::new(Cell::new(0usize));
        if self.config.skips_failures() {
            let tally = Rc::clone(&skipped);
            chain = chain.on_error(move |err, origin| {
                tally.set(tally.get() + 1);
                tracing::warn!(error = %err, record = ?origin, "Skipping record");
                Ok(())
            });
        }

        for step in &self.config.steps {
            tracing::debug!(step = %step, "Adding step");
            chain = apply_step(chain, step)?;
        }

        let sink = &self.config.sink;
        let chain = match sink.format {
            DataFormat::Jsonl => chain.write_to(write_jsonl(&sink.path, sink.append)?),
            DataFormat::Csv => {
                let fieldnames = sink
                    .fieldnames
                    .clone()
                    .ok_or_else(|| ChainError::MissingConfig {
                        field: "sink.fieldnames".to_string(),
                    })?;
                chain.write_to(write_csv_records(&sink.path, fieldnames, !sink.append, sink.append)?)
            }
        };

        let written = chain.count()?;
        let report = JobReport {
            written,
            skipped: skipped.get(),
            output_path: sink.path.clone(),
        };
        tracing::info!(
            written = report.written,
            skipped = report.skipped,
            output = %report.output_path,
            "Job finished"
        );
        Ok(report)
    }
}

fn open_records(path: &str, format: DataFormat, fieldnames: Option<Vec<String>>) -> Result<RecordSource> {
    tracing::debug!(path, %format, "Opening records");
    let path = PathBuf::from(path);
    let source: RecordSource = match format {
        DataFormat::Jsonl => Box::new(read_jsonl_records(path)?),
        DataFormat::Csv => Box::new(read_csv_records(path, fieldnames)?),
    };
    Ok(source)
}

fn apply_step(chain: Chain<'static, Record>, step: &StepConfig) -> Result<Chain<'static, Record>> {
    Ok(match step {
        StepConfig::KeepKeys { keys } => chain.keep_keys(keys.clone()),
        StepConfig::DropKey { key } => chain.drop_key(key.clone()),
        StepConfig::RenameKey { from, to, strict } => chain.rename_key(from.clone(), to.clone(), *strict),
        StepConfig::SetKey { key, value } => chain.set_key(key.clone(), value.clone()),
        StepConfig::StampKey { key } => chain.set_key_with(key.clone(), |_: &Record| Utc::now().to_rfc3339()),
        StepConfig::FilterEq { key, value } => {
            let (key, value) = (key.clone(), value.clone());
            chain.filter(move |record| record.get(&key) == Some(&value))
        }
        StepConfig::OmitEq { key, value } => {
            let (key, value) = (key.clone(), value.clone());
            chain.omit(move |record| record.get(&key) == Some(&value))
        }
        StepConfig::Slice { start, stop, step } => match stop {
            Some(stop) => chain.slice_step(*start..*stop, *step),
            None => chain.slice_step(*start.., *step),
        },
        StepConfig::Join { key, path, format } => {
            let other = Chain::try_new(open_records(path, *format, None)?);
            chain.join_chain_on_key(key.clone(), other)
        }
    })
}
