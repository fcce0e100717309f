//! `dbt`: a side-effect-only operator. It runs
//! a `dbt` subcommand against an external project directory inside an
//! agent-provisioned interpreter environment and passes data through
//! unchanged. The dbt runtime itself is never linked into this crate — this
//! operator only shells out to whatever `dbt` binary `execution_context`
//! points at.

use std::process::Command;

use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::operator::{ChunkStream, Operator, OperatorError, OperatorResult};
use crate::operators::map::parse_config;
use crate::operators::util::blocking;

#[derive(Debug, Deserialize)]
struct DbtConfig {
    project_dir: String,
    #[serde(default = "default_command")]
    command: String,
    #[serde(default)]
    args: Vec<String>,
    /// Path to the `dbt` executable inside an isolated interpreter
    /// environment; defaults to resolving `dbt` off `PATH`.
    #[serde(default)]
    interpreter_path: Option<String>,
}

fn default_command() -> String {
    "run".to_string()
}

fn run_dbt(cfg: &DbtConfig) -> OperatorResult<()> {
    let binary = cfg.interpreter_path.as_deref().unwrap_or("dbt");
    info!(project_dir = %cfg.project_dir, command = %cfg.command, "running dbt subcommand");

    let output = Command::new(binary)
        .arg(&cfg.command)
        .args(&cfg.args)
        .current_dir(&cfg.project_dir)
        .output()
        .map_err(|e| OperatorError::Other(format!("failed to spawn dbt ('{binary} {}'): {e}", cfg.command)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(OperatorError::Other(format!(
            "dbt {} exited with {}: {}",
            cfg.command,
            output.status,
            stderr.trim()
        )));
    }
    Ok(())
}

pub struct DbtOperator;

impl Operator for DbtOperator {
    fn name(&self) -> &'static str {
        "dbt"
    }

    fn validate_config(&self, config: &Value) -> OperatorResult<()> {
        let cfg: DbtConfig = parse_config(self.name(), config)?;
        if cfg.project_dir.trim().is_empty() {
            return Err(OperatorError::InvalidConfig {
                operator: self.name().to_string(),
                reason: "project_dir must not be empty".to_string(),
            });
        }
        Ok(())
    }

    fn transform(&self, input: ChunkStream, config: &Value) -> OperatorResult<ChunkStream> {
        let cfg: DbtConfig = parse_config(self.name(), config).map_err(|e| OperatorError::InvalidConfig {
            operator: self.name().to_string(),
            reason: e.to_string(),
        })?;
        Ok(blocking(input, move |chunks| {
            run_dbt(&cfg)?;
            Ok(chunks)
        }))
    }
}
