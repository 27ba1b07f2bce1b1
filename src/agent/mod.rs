//! Supervisor-routed multi-specialist agent runtime.

pub mod builtin_tools;
pub mod router;
pub mod specialist;
pub mod supervisor;
