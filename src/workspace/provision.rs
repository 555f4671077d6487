use crate::domain::ports::{CommandOutcome, CommandRunner, CommandSpec};
use crate::utils::error::{Result, SimError};
use std::path::PathBuf;
use std::process::Command;

pub const DEFAULT_ENV_DIR: &str = "venv";

/// What to provision and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionPlan {
    pub root: PathBuf,
    pub env_dir: String,
    pub build_tools: Vec<String>,
    pub runtime_packages: Vec<String>,
}

impl ProvisionPlan {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            env_dir: DEFAULT_ENV_DIR.to_string(),
            build_tools: vec!["setuptools".to_string(), "wheel".to_string()],
            runtime_packages: vec!["numpy".to_string(), "matplotlib".to_string()],
        }
    }

    pub fn env_path(&self) -> PathBuf {
        self.root.join(&self.env_dir)
    }

    fn env_bin(&self) -> PathBuf {
        if cfg!(windows) {
            self.env_path().join("Scripts")
        } else {
            self.env_path().join("bin")
        }
    }

    pub fn env_python(&self) -> PathBuf {
        if cfg!(windows) {
            self.env_bin().join("python.exe")
        } else {
            self.env_bin().join("python")
        }
    }

    pub fn env_pip(&self) -> PathBuf {
        if cfg!(windows) {
            self.env_bin().join("pip.exe")
        } else {
            self.env_bin().join("pip")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
    /// False when an existing environment was reused.
    pub created_env: bool,
    pub steps_run: Vec<String>,
}

/// Creates the isolated Python environment and installs packages into it,
/// one step after another. The first failing step stops the run.
pub struct Provisioner<R: CommandRunner> {
    runner: R,
    plan: ProvisionPlan,
}

impl<R: CommandRunner> Provisioner<R> {
    pub fn new(runner: R, plan: ProvisionPlan) -> Self {
        Self { runner, plan }
    }

    pub fn plan(&self) -> &ProvisionPlan {
        &self.plan
    }

    pub fn run(&self) -> Result<ProvisionReport> {
        let mut report = ProvisionReport {
            created_env: false,
            steps_run: Vec::new(),
        };

        if self.plan.env_python().exists() {
            tracing::info!(
                "==> Reusing existing environment at {}",
                self.plan.env_path().display()
            );
        } else {
            let step = "create environment";
            let python = self.interpreter(step)?;
            tracing::info!("==> Creating virtual environment ({})", self.plan.env_dir);
            self.execute(
                step,
                CommandSpec::new(python, &self.plan.root).args([
                    "-m",
                    "venv",
                    self.plan.env_dir.as_str(),
                ]),
            )?;
            report.created_env = true;
            report.steps_run.push(step.to_string());
        }

        let pip = self.plan.env_pip();
        let upgrade = |packages: &[String]| -> Vec<String> {
            ["install".to_string(), "--upgrade".to_string()]
                .into_iter()
                .chain(packages.iter().cloned())
                .collect()
        };
        let steps: [(&str, &str, Vec<String>); 3] = [
            (
                "upgrade pip",
                "==> Upgrading pip",
                upgrade(&["pip".to_string()]),
            ),
            (
                "install build tools",
                "==> Installing build tools",
                upgrade(&self.plan.build_tools),
            ),
            (
                "install runtime packages",
                "==> Installing runtime dependencies",
                std::iter::once("install".to_string())
                    .chain(self.plan.runtime_packages.iter().cloned())
                    .collect(),
            ),
        ];

        for (step, banner, args) in steps {
            tracing::info!("{}", banner);
            self.execute(step, CommandSpec::new(&pip, &self.plan.root).args(args))?;
            report.steps_run.push(step.to_string());
        }

        tracing::info!("Environment ready at {}", self.plan.env_path().display());
        Ok(report)
    }

    fn interpreter(&self, step: &str) -> Result<&'static str> {
        ["python3", "python"]
            .into_iter()
            .find(|candidate| self.runner.is_available(candidate))
            .ok_or_else(|| SimError::ProvisionStepFailed {
                step: step.to_string(),
                exit_code: 1,
                stderr: "python3 or python not found in PATH".to_string(),
            })
    }

    fn execute(&self, step: &str, command: CommandSpec) -> Result<CommandOutcome> {
        tracing::debug!("Running {} {:?}", command.program.display(), command.args);

        let outcome = self
            .runner
            .run(&command)
            .map_err(|e| SimError::ProvisionStepFailed {
                step: step.to_string(),
                exit_code: 1,
                stderr: e.to_string(),
            })?;

        if !outcome.success() {
            return Err(SimError::ProvisionStepFailed {
                step: step.to_string(),
                exit_code: outcome.exit_code.unwrap_or(1),
                stderr: outcome.stderr.trim().to_string(),
            });
        }
        Ok(outcome)
    }
}

/// Runs commands as real child processes, waiting for each to exit.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, command: &CommandSpec) -> Result<CommandOutcome> {
        let output = Command::new(&command.program)
            .args(&command.args)
            .current_dir(&command.current_dir)
            .output()?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        for line in stdout.lines() {
            tracing::debug!("  {}", line);
        }

        Ok(CommandOutcome {
            exit_code: output.status.code(),
            stdout,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn is_available(&self, program: &str) -> bool {
        Command::new(program)
            .arg("--version")
            .output()
            .map(|out| out.status.success())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records every command; fails the one whose args contain `fail_on`.
    struct Recorder {
        calls: Mutex<Vec<CommandSpec>>,
        fail_on: Option<&'static str>,
        python3: bool,
    }

    impl Recorder {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_on: None,
                python3: true,
            }
        }
    }

    impl CommandRunner for Recorder {
        fn run(&self, command: &CommandSpec) -> Result<CommandOutcome> {
            self.calls.lock().unwrap().push(command.clone());
            let failed = self
                .fail_on
                .is_some_and(|arg| command.args.iter().any(|a| a == arg));
            Ok(CommandOutcome {
                exit_code: Some(if failed { 4 } else { 0 }),
                stdout: String::new(),
                stderr: if failed { "boom\n".to_string() } else { String::new() },
            })
        }

        fn is_available(&self, program: &str) -> bool {
            program == "python" || (self.python3 && program == "python3")
        }
    }

    #[test]
    fn four_steps_in_order() {
        let dir = TempDir::new().unwrap();
        let plan = ProvisionPlan::new(dir.path());
        let provisioner = Provisioner::new(Recorder::new(), plan.clone());

        let report = provisioner.run().unwrap();
        assert!(report.created_env);
        assert_eq!(report.steps_run.len(), 4);

        let calls = provisioner.runner.calls.lock().unwrap();
        assert_eq!(calls[0].program, PathBuf::from("python3"));
        assert_eq!(calls[0].args, vec!["-m", "venv", "venv"]);
        assert_eq!(calls[1].program, plan.env_pip());
        assert_eq!(calls[1].args, vec!["install", "--upgrade", "pip"]);
        assert_eq!(calls[2].args, vec!["install", "--upgrade", "setuptools", "wheel"]);
        assert_eq!(calls[3].args, vec!["install", "numpy", "matplotlib"]);
    }

    #[test]
    fn falls_back_to_python() {
        let dir = TempDir::new().unwrap();
        let mut runner = Recorder::new();
        runner.python3 = false;
        let provisioner = Provisioner::new(runner, ProvisionPlan::new(dir.path()));

        provisioner.run().unwrap();
        let calls = provisioner.runner.calls.lock().unwrap();
        assert_eq!(calls[0].program, PathBuf::from("python"));
    }

    #[test]
    fn existing_environment_is_reused() {
        let dir = TempDir::new().unwrap();
        let plan = ProvisionPlan::new(dir.path());
        std::fs::create_dir_all(plan.env_python().parent().unwrap()).unwrap();
        std::fs::write(plan.env_python(), b"").unwrap();

        let provisioner = Provisioner::new(Recorder::new(), plan);
        let report = provisioner.run().unwrap();
        assert!(!report.created_env);
        assert_eq!(report.steps_run.len(), 3);
    }

    #[test]
    fn failing_step_stops_the_sequence() {
        let dir = TempDir::new().unwrap();
        let mut runner = Recorder::new();
        runner.fail_on = Some("setuptools");
        let provisioner = Provisioner::new(runner, ProvisionPlan::new(dir.path()));

        let err = provisioner.run().unwrap_err();
        match &err {
            SimError::ProvisionStepFailed {
                step,
                exit_code,
                stderr,
            } => {
                assert_eq!(step, "install build tools");
                assert_eq!(*exit_code, 4);
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(err.exit_code(), 4);
        assert_eq!(provisioner.runner.calls.lock().unwrap().len(), 3);
    }
}
