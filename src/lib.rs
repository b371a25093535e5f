//! regclient
//! =========
//!
//! Pull, enumerate and remove container images wherever they live:
//!
//! - [`HttpRegistry`] speaks the OCI distribution API of a remote registry,
//!   and additionally lists repositories and tags ([`RegistryIntrospection`]).
//! - [`DaemonBackend`] delegates to a local Docker daemon.
//! - [`RuntimeBackend`] delegates to a local containerd, scoped to one namespace.
//!
//! All three implement [`ImageRegistry`] and are assembled by [`ClientBuilder`],
//! which merges explicit credentials with docker's `config.json`.
//! Every operation is blocking. The daemon and runtime backends may also be
//! called from worker threads of a multi-threaded tokio runtime.

pub mod auth;
pub mod backend;
pub mod builder;
pub mod config;
pub mod daemon;
pub mod distribution;
pub mod error;
pub mod reference;
pub mod runtime;

mod blocking;
mod digest;

pub use auth::{Credential, CredentialStore};
pub use backend::{ImageRegistry, RegistryIntrospection};
pub use builder::{BuildReport, Built, ClientBuilder};
pub use daemon::DaemonBackend;
pub use digest::Digest;
pub use distribution::HttpRegistry;
pub use error::{Error, Result};
pub use reference::ImageReference;
pub use runtime::RuntimeBackend;

