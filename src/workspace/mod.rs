pub mod provision;
pub mod scaffold;

pub use provision::{ProvisionPlan, ProvisionReport, Provisioner, SystemRunner};
pub use scaffold::{ScaffoldReport, Scaffolder, MARKER_FILE, PACKAGE_DIRS, PROJECT_DIRS};

use crate::domain::ports::CommandRunner;
use crate::utils::error::Result;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapReport {
    pub provision: ProvisionReport,
    pub scaffold: ScaffoldReport,
}

/// Prepares a working directory: runtime environment first, then the
/// project tree. Nothing is scaffolded unless provisioning succeeds.
pub struct Bootstrap<R: CommandRunner> {
    provisioner: Provisioner<R>,
    scaffolder: Scaffolder,
}

impl<R: CommandRunner> Bootstrap<R> {
    pub fn new(root: impl Into<PathBuf>, runner: R) -> Self {
        Self::with_plan(ProvisionPlan::new(root), runner)
    }

    pub fn with_plan(plan: ProvisionPlan, runner: R) -> Self {
        let scaffolder = Scaffolder::new(plan.root.clone());
        Self {
            provisioner: Provisioner::new(runner, plan),
            scaffolder,
        }
    }

    pub fn run(&self) -> Result<BootstrapReport> {
        tracing::info!(
            "[Bootstrap] Preparing {}",
            self.scaffolder.root().display()
        );
        let provision = self.provisioner.run()?;
        let scaffold = self.scaffolder.scaffold()?;
        Ok(BootstrapReport {
            provision,
            scaffold,
        })
    }
}
