//! Shared fixtures for lifecycle BDD scenarios.

use std::net::{IpAddr, Ipv4Addr};
use std::rc::Rc;

use camino::Utf8PathBuf;
use dinghy::test_support::ScriptedRunner;
use dinghy::{
    ConnectProbe, CredentialInstaller, ExpectedEnvironment, Orchestrator, ReadinessWaiter,
    ServiceDescriptor, ShareService, VmHandle, VmService,
};
use rstest::fixture;
use tempfile::TempDir;
use thiserror::Error;

pub const DOCKER_HOST: &str = "tcp://127.0.0.1:2376";

#[derive(Clone, Debug)]
pub struct LifecycleContext {
    pub runner: ScriptedRunner,
    pub home: Utf8PathBuf,
    pub daemon_ready: bool,
    pub outcome: Option<LifecycleResult>,
    _tmp: Rc<TempDir>,
}

#[derive(Clone, Debug)]
pub enum LifecycleResult {
    Success,
    Failure(String),
}

#[derive(Debug, Error)]
pub enum LifecycleTestError {
    #[error("invalid lifecycle fixture: {0}")]
    Fixture(String),
}

pub type LifecycleContextResult = Result<LifecycleContext, LifecycleTestError>;

impl LifecycleContext {
    pub fn cert_dir(&self) -> Utf8PathBuf {
        self.home.join(".dinghy").join("certs")
    }

    pub fn definition(&self) -> Utf8PathBuf {
        self.home.join("dinghy.unfs.plist")
    }

    pub fn marker(&self) -> Utf8PathBuf {
        self.home
            .join("Library")
            .join("LaunchAgents")
            .join("dinghy.unfs.plist")
    }

    pub fn orchestrator<P: ConnectProbe>(&self, probe: P) -> Orchestrator<ScriptedRunner, P> {
        let descriptor = ServiceDescriptor::new(
            self.definition(),
            self.marker(),
            self.home.clone(),
            IpAddr::V4(Ipv4Addr::new(192, 168, 42, 1)),
            19321,
        );
        Orchestrator::new(
            VmService::new(
                VmHandle::new(self.home.join("vagrant")),
                "vagrant",
                self.runner.clone(),
            ),
            ShareService::new(
                descriptor,
                "launchctl",
                self.runner.clone(),
                ReadinessWaiter::new(probe),
            ),
            CredentialInstaller::new(self.cert_dir()),
            ExpectedEnvironment::new(DOCKER_HOST, &self.cert_dir()),
        )
    }
}

#[fixture]
pub fn lifecycle_context_result() -> LifecycleContextResult {
    build_lifecycle_context()
}

#[fixture]
pub fn lifecycle_context(lifecycle_context_result: LifecycleContextResult) -> LifecycleContext {
    lifecycle_context_result
        .unwrap_or_else(|err| panic!("lifecycle context fixture should initialise: {err}"))
}

fn build_lifecycle_context() -> LifecycleContextResult {
    let tmp = TempDir::new().map_err(|err| LifecycleTestError::Fixture(err.to_string()))?;
    let home = Utf8PathBuf::from_path_buf(tmp.path().join("home"))
        .map_err(|path| LifecycleTestError::Fixture(format!("non-UTF-8 path {}", path.display())))?;
    std::fs::create_dir_all(&home).map_err(|err| LifecycleTestError::Fixture(err.to_string()))?;

    let runner = ScriptedRunner::new();
    runner.respond_with_stdout("cat .docker/key.pem", "KEY");
    runner.respond_with_stdout("cat .docker/ca.pem", "CA");
    runner.respond_with_stdout("cat .docker/cert.pem", "CERT");

    Ok(LifecycleContext {
        runner,
        home,
        daemon_ready: true,
        outcome: None,
        _tmp: Rc::new(tmp),
    })
}
