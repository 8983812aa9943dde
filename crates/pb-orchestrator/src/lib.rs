//! pb-orchestrator: tool-group orchestration
//!
//! Drives one of start, stop, postprocess or kill across every tool
//! registered in a group. Local tools run as detached sessions on this host;
//! remote hosts are told to run the same action over ssh. After a
//! postprocess, results are gathered into a per-host directory layout.

pub mod collector;
pub mod context;
pub mod coordinator;
mod exec;
pub mod launcher;
pub mod remote;

pub use collector::ResultCollector;
pub use context::{RunContext, SubTaskOutcome, Target};
pub use coordinator::ActionCoordinator;
pub use launcher::{LocalLauncher, SessionHandle, SessionKey, SessionStore};
pub use remote::RemoteDispatcher;
