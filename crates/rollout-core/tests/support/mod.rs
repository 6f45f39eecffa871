#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use rollout_core::error::InstallerError;
use rollout_core::retry::RetryPolicy;
use rollout_core::types::{ChartConfiguration, ChartInstallConfig, InstallationRequest, ValuesMap};
use rollout_core::values::ValuesFileCollector;
use rollout_core::workflow::{
    CertificateRegenerator, ChartInstaller, Collaborators, ConfigurationBuilder,
    ConfigurationCollector, ConfirmationPrompt, DefaultConfigBuilder, InstallationWorkflow,
    TargetSelector, WorkflowOptions,
};

/// Per-collaborator invocation counters.
#[derive(Debug, Default)]
pub struct Calls {
    pub collect: AtomicU32,
    pub load_base: AtomicU32,
    pub select: AtomicU32,
    pub confirm: AtomicU32,
    pub certs: AtomicU32,
    pub build: AtomicU32,
    pub install: AtomicU32,
    /// Values file handed to each install attempt and whether it existed then
    pub values_seen: Mutex<Vec<(PathBuf, bool)>>,
}

impl Calls {
    pub fn get(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }
}

fn bump(counter: &AtomicU32) {
    counter.fetch_add(1, Ordering::SeqCst);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmAnswer {
    Yes,
    No,
    Fail,
}

/// One scripted installer attempt.
#[derive(Debug)]
pub enum InstallStep {
    Succeed,
    Transient,
    Permanent,
    BranchNotFound,
    /// Block until the installation token is cancelled
    Hang,
    /// Deliver the notifications, then wait for the token to fire and report success
    InterruptThenSucceed(mpsc::Sender<()>, u32),
}

pub struct FakeCollector {
    calls: Arc<Calls>,
    temp_path: Option<PathBuf>,
    fail: bool,
}

impl ConfigurationCollector for FakeCollector {
    fn collect(&self) -> anyhow::Result<ChartConfiguration> {
        bump(&self.calls.collect);
        if self.fail {
            anyhow::bail!("wizard aborted");
        }
        if let Some(path) = &self.temp_path
            && path.parent().is_some_and(Path::exists)
        {
            std::fs::write(path, "generated: true\n")?;
        }
        Ok(ChartConfiguration {
            base_values_path: PathBuf::from("helm-values.yaml"),
            temp_values_path: self.temp_path.clone(),
            existing_values: ValuesMap::new(),
            modified_sections: Vec::new(),
        })
    }

    fn load_base_values(&self) -> anyhow::Result<ValuesMap> {
        bump(&self.calls.load_base);
        Ok(ValuesMap::new())
    }
}

pub struct FakeSelector {
    calls: Arc<Calls>,
    answer: Option<String>,
}

impl TargetSelector for FakeSelector {
    fn select(&self, args: &[String], _verbose: bool) -> anyhow::Result<Option<String>> {
        bump(&self.calls.select);
        Ok(args.first().cloned().or_else(|| self.answer.clone()))
    }
}

pub struct FakeConfirmation {
    calls: Arc<Calls>,
    answer: ConfirmAnswer,
}

impl ConfirmationPrompt for FakeConfirmation {
    fn confirm(&self, _target: &str) -> anyhow::Result<bool> {
        bump(&self.calls.confirm);
        match self.answer {
            ConfirmAnswer::Yes => Ok(true),
            ConfirmAnswer::No => Ok(false),
            ConfirmAnswer::Fail => anyhow::bail!("terminal closed"),
        }
    }
}

pub struct FakeCerts {
    calls: Arc<Calls>,
    fail: bool,
}

impl CertificateRegenerator for FakeCerts {
    fn regenerate(&self) -> anyhow::Result<()> {
        bump(&self.calls.certs);
        if self.fail {
            anyhow::bail!("mkcert not installed");
        }
        Ok(())
    }
}

pub struct CountingBuilder {
    calls: Arc<Calls>,
    inner: DefaultConfigBuilder,
}

impl ConfigurationBuilder for CountingBuilder {
    fn build(
        &self,
        request: &InstallationRequest,
        target: &str,
        temp_values_path: Option<&Path>,
    ) -> anyhow::Result<ChartInstallConfig> {
        bump(&self.calls.build);
        self.inner.build(request, target, temp_values_path)
    }
}

pub struct ScriptedInstaller {
    calls: Arc<Calls>,
    script: Mutex<VecDeque<InstallStep>>,
}

#[async_trait]
impl ChartInstaller for ScriptedInstaller {
    async fn install(
        &self,
        token: &CancellationToken,
        config: &ChartInstallConfig,
    ) -> Result<(), InstallerError> {
        bump(&self.calls.install);
        if let Some(path) = config.app_of_apps.as_ref().and_then(|a| a.values_file.clone()) {
            let existed = path.exists();
            self.calls.values_seen.lock().unwrap().push((path, existed));
        }
        let step = {
            let mut script = self.script.lock().unwrap();
            script.pop_front().unwrap_or(InstallStep::Succeed)
        };

        match step {
            InstallStep::Succeed => Ok(()),
            InstallStep::Transient => Err(InstallerError::Failed(anyhow::anyhow!(
                "connection reset by peer"
            ))),
            InstallStep::Permanent => Err(InstallerError::Permanent(anyhow::anyhow!(
                "authentication failed"
            ))),
            InstallStep::BranchNotFound => Err(InstallerError::BranchNotFound {
                repository: "https://github.com/acme/platform".to_string(),
                branch: "missing".to_string(),
            }),
            InstallStep::Hang => {
                token.cancelled().await;
                Err(InstallerError::Cancelled)
            }
            InstallStep::InterruptThenSucceed(tx, count) => {
                for _ in 0..count {
                    tx.send(()).await.unwrap();
                }
                token.cancelled().await;
                Ok(())
            }
        }
    }
}

/// Builds a workflow from fakes rooted in a temp directory.
pub struct Harness {
    pub calls: Arc<Calls>,
    pub dir: TempDir,
    pub target: Option<String>,
    pub confirm: ConfirmAnswer,
    pub collector_fails: bool,
    pub certs_fail: bool,
    pub register_temp: bool,
    /// Collector output path; defaults to `temp_values()`
    pub temp_override: Option<PathBuf>,
    /// Use the real values-file collector instead of the fake
    pub real_values: bool,
    pub script: Vec<InstallStep>,
    pub install_timeout: Duration,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Calls::default()),
            dir: TempDir::new().unwrap(),
            target: Some("k3d-dev".to_string()),
            confirm: ConfirmAnswer::Yes,
            collector_fails: false,
            certs_fail: false,
            register_temp: true,
            temp_override: None,
            real_values: false,
            script: Vec::new(),
            install_timeout: Duration::from_secs(60 * 60),
        }
    }

    pub fn with_script(mut self, script: Vec<InstallStep>) -> Self {
        self.script = script;
        self
    }

    pub fn temp_values(&self) -> PathBuf {
        self.dir.path().join("helm-values-tmp.yaml")
    }

    pub fn base_values(&self) -> PathBuf {
        self.dir.path().join("helm-values.yaml")
    }

    fn collector(&self) -> Box<dyn ConfigurationCollector> {
        if self.real_values {
            return Box::new(ValuesFileCollector::new(self.base_values(), self.temp_values()));
        }
        let temp_path = self
            .register_temp
            .then(|| self.temp_override.clone().unwrap_or_else(|| self.temp_values()));
        Box::new(FakeCollector {
            calls: Arc::clone(&self.calls),
            temp_path,
            fail: self.collector_fails,
        })
    }

    pub fn policy() -> RetryPolicy {
        RetryPolicy::new(
            "test",
            3,
            Duration::from_secs(5),
            Duration::from_secs(30),
            2.0,
        )
    }

    pub fn workflow(&mut self) -> InstallationWorkflow {
        let calls = &self.calls;
        let steps = Collaborators {
            collector: self.collector(),
            selector: Box::new(FakeSelector {
                calls: Arc::clone(calls),
                answer: self.target.clone(),
            }),
            confirmation: Box::new(FakeConfirmation {
                calls: Arc::clone(calls),
                answer: self.confirm,
            }),
            certificates: Box::new(FakeCerts {
                calls: Arc::clone(calls),
                fail: self.certs_fail,
            }),
            builder: Box::new(CountingBuilder {
                calls: Arc::clone(calls),
                inner: DefaultConfigBuilder::default(),
            }),
            installer: Box::new(ScriptedInstaller {
                calls: Arc::clone(calls),
                script: Mutex::new(self.script.drain(..).collect()),
            }),
        };

        let options = WorkflowOptions {
            retry_policy: Self::policy(),
            install_timeout: self.install_timeout,
            base_values_file: self.base_values(),
            temp_values_file: self.temp_values(),
        };
        InstallationWorkflow::new(steps, options)
    }
}

pub fn request() -> InstallationRequest {
    InstallationRequest::new(Vec::new())
}
