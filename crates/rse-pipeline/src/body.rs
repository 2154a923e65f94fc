use std::path::{Path, PathBuf};
use std::process::Command;

use rse_core::config::StageCommand;
use rse_core::errors::{ErrorInfo, RseError};
use rse_core::Stage;
use rse_exp::ParameterTuple;
use tracing::debug;

const STDERR_TAIL_LINES: usize = 20;

/// Named command line argument with one or more values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arg {
    /// Flag name without the leading dashes.
    pub name: &'static str,
    /// Values following the flag.
    pub values: Vec<String>,
}

impl Arg {
    /// Single valued argument.
    pub fn new(name: &'static str, value: impl ToString) -> Self {
        Self {
            name,
            values: vec![value.to_string()],
        }
    }

    /// Multi valued argument, e.g. `--topn_scores 1 5 10`.
    pub fn many<T: ToString>(name: &'static str, values: &[T]) -> Self {
        Self {
            name,
            values: values.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Everything a stage body needs to produce one unit's outputs.
#[derive(Debug)]
pub struct BodyInvocation<'a> {
    /// Stage being run.
    pub stage: Stage,
    /// Tuple identifying the unit.
    pub tuple: &'a ParameterTuple,
    /// Stage specific arguments.
    pub args: &'a [Arg],
    /// Root of the artifact store, for reading inputs.
    pub data_root: &'a Path,
    /// Private directory the outputs must be written to.
    pub output_dir: &'a Path,
    /// File names the body is expected to create in `output_dir`.
    pub outputs: &'a [String],
}

impl BodyInvocation<'_> {
    /// Flat `--name value...` argument vector including the store locations.
    pub fn command_line(&self) -> Vec<String> {
        let mut line = Vec::new();
        for arg in self.args {
            line.push(format!("--{}", arg.name));
            line.extend(arg.values.iter().cloned());
        }
        line.push("--data_root".to_string());
        line.push(self.data_root.display().to_string());
        line.push("--output_dir".to_string());
        line.push(self.output_dir.display().to_string());
        line
    }
}

/// Work that turns a unit's inputs into its outputs.
pub trait StageBody: Send + Sync {
    /// Runs the body. Outputs must be written below `invocation.output_dir`.
    fn run(&self, invocation: &BodyInvocation<'_>) -> Result<(), RseError>;
}

impl<F> StageBody for F
where
    F: Fn(&BodyInvocation<'_>) -> Result<(), RseError> + Send + Sync,
{
    fn run(&self, invocation: &BodyInvocation<'_>) -> Result<(), RseError> {
        self(invocation)
    }
}

/// Runs each stage as an external process: `program script --flag value ...`.
#[derive(Debug, Clone)]
pub struct CommandBody {
    command: StageCommand,
}

impl CommandBody {
    /// Uses the interpreter, scripts and working directory from the configuration.
    pub fn new(command: StageCommand) -> Self {
        Self { command }
    }

    fn script(&self, stage: Stage) -> Result<PathBuf, RseError> {
        self.command
            .script_for(stage)
            .map(PathBuf::from)
            .ok_or_else(|| {
                RseError::Config(
                    ErrorInfo::new("no-script", format!("stage {stage} has no external body"))
                        .with_context("stage", stage.name()),
                )
            })
    }
}

impl StageBody for CommandBody {
    fn run(&self, invocation: &BodyInvocation<'_>) -> Result<(), RseError> {
        let script = self.script(invocation.stage)?;
        let args = invocation.command_line();
        debug!(
            program = %self.command.program,
            script = %script.display(),
            args = ?args,
            "spawning stage body"
        );
        let output = Command::new(&self.command.program)
            .arg(&script)
            .args(&args)
            .current_dir(&self.command.workdir)
            .output()
            .map_err(|err| {
                RseError::Stage(
                    ErrorInfo::new("spawn", err.to_string())
                        .with_context("program", self.command.program.clone())
                        .with_context("stage", invocation.stage.name()),
                )
            })?;
        if output.status.success() {
            return Ok(());
        }
        let exit_code = output
            .status
            .code()
            .map(|code| code.to_string())
            .unwrap_or_else(|| "signal".to_string());
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(RseError::Stage(
            ErrorInfo::new(
                "exit-status",
                format!("{} exited with status {exit_code}", script.display()),
            )
            .with_context("stage", invocation.stage.name())
            .with_context("exit_code", exit_code)
            .with_context("stderr", stderr_tail(&stderr)),
        ))
    }
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_is_flat() {
        let tuple = ParameterTuple::new();
        let args = [
            Arg::new("data_set_name", "WeatherData"),
            Arg::many("topn_scores", &[1, 5, 10]),
        ];
        let outputs: Vec<String> = Vec::new();
        let invocation = BodyInvocation {
            stage: Stage::Evaluate,
            tuple: &tuple,
            args: &args,
            data_root: Path::new("/data"),
            output_dir: Path::new("/data/.staging-x"),
            outputs: &outputs,
        };
        assert_eq!(
            invocation.command_line(),
            vec![
                "--data_set_name",
                "WeatherData",
                "--topn_scores",
                "1",
                "5",
                "10",
                "--data_root",
                "/data",
                "--output_dir",
                "/data/.staging-x"
            ]
        );
    }

    #[test]
    fn stderr_tail_keeps_last_lines() {
        let text = (0..30).map(|i| i.to_string()).collect::<Vec<_>>().join("\n");
        let tail = stderr_tail(&text);
        assert!(tail.starts_with("10\n"));
        assert!(tail.ends_with("29"));
    }
}
