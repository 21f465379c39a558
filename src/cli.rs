//! Command-line surface of the `kubectl unmount` plugin

use std::io::{self, IsTerminal};
use std::path::PathBuf;

use clap::{ArgAction, Parser};
use kube::Client;
use kube::config::{KubeConfigOptions, Kubeconfig};

use crate::api::KubeClusterApi;
use crate::config::{PodFilter, Scope, UnmountConfig};
use crate::error::{Error, Result};
use crate::executor::RunResult;
use crate::gate::ExecutionMode;
use crate::report::Reporter;

/// Scale down every workload mounting a PersistentVolumeClaim so it can be
/// detached, resized, or migrated.
#[derive(Parser, Debug, Clone)]
#[command(name = "kubectl-unmount")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Namespace to search (defaults to the kubeconfig context's namespace)
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Search every namespace in the cluster
    #[arg(short = 'A', long, conflicts_with = "namespace")]
    pub all_namespaces: bool,

    /// Only Pods mounting this PVC (default: any PVC)
    #[arg(long = "pvc", value_name = "NAME")]
    pub pvc_name: Option<String>,

    /// Only PVCs provisioned from this StorageClass
    #[arg(long, value_name = "NAME")]
    pub storage_class: Option<String>,

    /// Only print what would be scaled down
    #[arg(
        long,
        default_value_t = true,
        action = ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true",
        value_name = "BOOL"
    )]
    pub dry_run: bool,

    /// Do not ask for confirmation before modifying the cluster
    #[arg(short = 'y', long = "yes")]
    pub confirmed: bool,

    /// Kubeconfig context to use
    #[arg(long)]
    pub context: Option<String>,

    /// Path to the kubeconfig file
    #[arg(long, value_name = "PATH")]
    pub kubeconfig: Option<PathBuf>,
}

impl Cli {
    /// Build the run configuration. `default_namespace` comes from the
    /// kubeconfig and is used when neither `-n` nor `-A` is given.
    pub fn to_config(&self, default_namespace: &str) -> UnmountConfig {
        let scope = if self.all_namespaces {
            Scope::AllNamespaces
        } else {
            Scope::Namespace(
                self.namespace
                    .clone()
                    .unwrap_or_else(|| default_namespace.to_string()),
            )
        };

        UnmountConfig {
            scope,
            filter: PodFilter {
                pvc_name: self.pvc_name.clone(),
                storage_class: self.storage_class.clone(),
            },
            dry_run: self.dry_run,
            confirmed: self.confirmed,
        }
    }

    async fn kube_config(&self) -> Result<kube::Config> {
        let options = KubeConfigOptions {
            context: self.context.clone(),
            ..Default::default()
        };

        let config = match (&self.kubeconfig, &self.context) {
            (Some(path), _) => {
                let kubeconfig = Kubeconfig::read_from(path)?;
                kube::Config::from_custom_kubeconfig(kubeconfig, &options).await?
            }
            (None, Some(_)) => kube::Config::from_kubeconfig(&options).await?,
            (None, None) => kube::Config::infer().await?,
        };
        Ok(config)
    }

    /// Connect to the cluster and run.
    ///
    /// A real run without `--yes` on an interactive terminal first shows the
    /// targets (as a dry run on stderr) and asks before continuing. The plan
    /// that was shown is the one acted on, so Pods that appear in between
    /// are left alone.
    pub async fn run(self) -> Result<RunResult> {
        let kube_config = self.kube_config().await?;
        let default_namespace = kube_config.default_namespace.clone();
        let client = Client::try_from(kube_config)?;
        let api = KubeClusterApi::new(client);

        let config = self.to_config(&default_namespace);

        if !config.dry_run && !config.confirmed && io::stdin().is_terminal() {
            let mut preview = Reporter::new(io::stderr(), io::stderr());
            let plan = crate::prepare(&api, &config, &mut preview).await?;
            if plan.is_empty() {
                return Ok(RunResult::empty(ExecutionMode::Apply));
            }
            crate::execute(&api, &plan, ExecutionMode::DryRun, &mut preview).await?;

            let entries = plan.targets.len() + plan.unresolved.len();
            if !confirm(entries)? {
                return Err(Error::ConfirmationRequired);
            }
            let mut reporter = Reporter::new(io::stdout(), io::stderr());
            return crate::execute(&api, &plan, ExecutionMode::Apply, &mut reporter).await;
        }

        let mut reporter = Reporter::new(io::stdout(), io::stderr());
        crate::run(&api, &config, &mut reporter).await
    }
}

fn confirm(targets: usize) -> Result<bool> {
    inquire::Confirm::new(&format!("Scale down {} target(s) listed above?", targets))
        .with_default(false)
        .prompt()
        .map_err(|e| Error::PromptError(e.to_string()))
}
