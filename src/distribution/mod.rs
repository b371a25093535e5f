//! Registry backend based on [OCI distribution specification](https://github.com/opencontainers/distribution-spec)

mod auth;
mod client;
mod descriptor;

pub use auth::AuthChallenge;
pub use client::{HttpRegistry, CATALOG_PAGE_SIZE};
pub use descriptor::*;
