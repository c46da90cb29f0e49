//! `coderoom-engine` is the execution-context and container-lifecycle engine
//! of the coderoom platform.
//!
//! # Overview
//!
//! End users submit source code in several languages and receive execution
//! output, either through a private per-user sandbox or through a shared
//! terminal room that fans output out to every connected session. This crate
//! owns the part with real concurrency and failure-handling depth:
//!
//! - Creating, reusing, quotaing, and evicting isolated runtime sandboxes
//! - Running submitted code with hard resource limits and timeouts
//! - Idempotent per-context package installation
//! - Multiplexing one shared sandbox to many simultaneous sessions
//! - Periodic reclamation of everything idle
//!
//! Isolation itself is delegated to an external container engine reached
//! through the [`runtime::ContainerRuntime`] trait; HTTP routing,
//! authentication, and membership storage belong to the surrounding
//! platform and are consumed through the [`membership`] contracts.
//!
//! # Modules
//!
//! - [`config`] - Environment-driven engine configuration
//! - [`languages`] - The closed language catalog and its validated profiles
//! - [`runtime`] - Container runtime trait and the docker CLI implementation
//! - [`context`] - Private per-(owner, language) execution contexts
//! - [`installer`] - Package installation tracking
//! - [`room`] - Shared terminal rooms and session fan-out
//! - [`cleanup`] - Idle sweeps and graceful shutdown
//! - [`service`] - The assembled engine facade
//! - [`membership`] - Collaborator contracts of the surrounding platform

#![warn(missing_docs)]

mod error;

pub mod cleanup;
pub mod config;
pub mod context;
pub mod installer;
pub mod languages;
pub mod membership;
pub mod payload;
pub mod room;
pub mod runtime;
pub mod service;

#[cfg(test)]
mod integration_tests;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use cleanup::*;
pub use config::*;
pub use context::{ContextHandle, ContextManager, ContextState};
pub use error::*;
pub use installer::*;
pub use languages::*;
pub use membership::*;
pub use payload::*;
pub use room::{RoomManager, SessionHandle};
pub use runtime::{ContainerRuntime, DockerCli, ExecOutput, ExecRequest, SandboxId};
pub use service::*;
