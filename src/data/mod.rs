//! Static reference data: tool minimums, instance type allow-lists and
//! platform requirements.

pub mod allowlists;
pub mod requirements;
pub mod versions;
