//! Collaborators backed by external tools (`git`, `helm`, `kubectl`, `mkcert`).

pub mod certs;
pub mod command;
pub mod helm;
pub mod kube;

pub use certs::MkcertRegenerator;
pub use helm::HelmInstaller;
pub use kube::{ArgsTargetSelector, KubectlSyncWaiter, list_contexts};
