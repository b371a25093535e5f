//! Capabilities shared by every backend

use crate::{distribution::ImageDescriptor, error::*};

/// Pull and remove single images
///
/// Implemented by [`crate::HttpRegistry`], [`crate::DaemonBackend`] and
/// [`crate::RuntimeBackend`]. Every call blocks until it is done.
pub trait ImageRegistry {
    /// Pull `reference` and return an identifier of the pulled image within the backend
    fn pull(&self, reference: &str) -> Result<String>;

    /// Remove the image identified by `id`
    ///
    /// Fails with [`Error::NotFound`] when there is no such image.
    fn remove(&self, id: &str) -> Result<()>;
}

/// Registry introspection, only available when talking to a registry directly
pub trait RegistryIntrospection: ImageRegistry {
    /// Manifest of `reference`
    fn get_repo(&self, reference: &str) -> Result<ImageDescriptor>;

    /// Tags of the repository `reference` belongs to, in the order the registry reports them
    fn get_repo_tags(&self, reference: &str) -> Result<Vec<String>>;

    /// Every repository of the registry at `address`
    fn get_repos(&self, address: &str) -> Result<Vec<String>>;
}
