//! Platform interfaces: subprocesses, the cluster, cloud CLIs and the network.

pub mod cloud;
pub mod command;
#[cfg(any(test, feature = "testing"))]
pub mod fake;
pub mod kubectl;
pub mod network;
