//! Validation engine module.
//!
//! Provides check orchestration, finding collection, external check
//! execution, scoped cluster provisioning and result aggregation.

pub mod external;
pub mod orchestrator;
pub mod provision;
pub mod reporter;
pub mod result;
