//! Mock implementations for testing without a cluster.
//!
//! This module provides scripted platform fakes that simulate healthy and
//! misconfigured AKS, EKS and K3s clusters.

pub mod platform;

pub use platform::*;
