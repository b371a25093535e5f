//! Backend delegating to containerd, scoped to one namespace

mod containerd;

pub use containerd::ContainerdRuntime;

use crate::{backend::ImageRegistry, config::ClientConfig, error::*, Digest, ImageReference};
use regex::Regex;

lazy_static::lazy_static! {
    static ref NAMESPACE_RE: Regex = Regex::new(r"^[A-Za-z0-9]+(?:[._-][A-Za-z0-9]+)*$").unwrap();
}

/// Check a containerd namespace name
pub fn validate_namespace(namespace: &str) -> Result<()> {
    if namespace.len() <= 76 && NAMESPACE_RE.is_match(namespace) {
        Ok(())
    } else {
        Err(Error::InvalidNamespace(namespace.to_string()))
    }
}

/// Image store of a container runtime, bound to one namespace
pub trait ImageRuntime {
    fn namespace(&self) -> &str;

    /// Pull and unpack `name`, returning the digest of the stored image
    fn pull_image(&self, name: &str) -> Result<Digest>;

    /// Delete the image record `name`, returning once the deletion completed
    fn remove_image(&self, name: &str) -> Result<()>;

    /// Names of the images whose target is `digest`
    fn images_by_digest(&self, digest: &Digest) -> Result<Vec<String>>;
}

/// [`ImageRegistry`] on top of an [`ImageRuntime`]
///
/// Pulls return `<namespace>/<digest>`. Both such identifiers and image
/// references are accepted by [`ImageRegistry::remove`].
///
/// Removing by identifier deletes every image record of the namespace whose
/// target is that digest, including records created by pulls of other
/// references resolving to the same content. Remove by reference to delete
/// a single record.
pub struct RuntimeBackend<R = ContainerdRuntime> {
    runtime: R,
}

impl RuntimeBackend<ContainerdRuntime> {
    /// Connect to the configured containerd socket
    pub fn new(config: &ClientConfig) -> Result<Self> {
        Ok(Self::with_runtime(ContainerdRuntime::connect(
            &config.containerd_socket,
            &config.namespace,
        )?))
    }
}

impl<R: ImageRuntime> RuntimeBackend<R> {
    pub fn with_runtime(runtime: R) -> Self {
        RuntimeBackend { runtime }
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    /// Digest part of an identifier returned by [`ImageRegistry::pull`]
    fn parse_id(&self, id: &str) -> Option<Digest> {
        let digest = id.strip_prefix(self.runtime.namespace())?.strip_prefix('/')?;
        Digest::new(digest).ok()
    }
}

/// Canonical form of `reference`, or `reference` itself when it does not parse
fn canonicalize(reference: &str) -> String {
    match ImageReference::parse(reference) {
        Ok(image) => image.to_string(),
        Err(e) => {
            log::debug!("Use `{}` as is: {}", reference, e);
            reference.to_string()
        }
    }
}

impl<R: ImageRuntime> ImageRegistry for RuntimeBackend<R> {
    fn pull(&self, reference: &str) -> Result<String> {
        let name = canonicalize(reference);
        let digest = self.runtime.pull_image(&name)?;
        Ok(format!("{}/{}", self.runtime.namespace(), digest))
    }

    /// Remove `<namespace>/<digest>`, i.e. every record targeting the digest,
    /// or the single record of an image reference
    fn remove(&self, id: &str) -> Result<()> {
        if let Some(digest) = self.parse_id(id) {
            let names = self.runtime.images_by_digest(&digest)?;
            if names.is_empty() {
                return Err(Error::NotFound(id.to_string()));
            }
            for name in names {
                self.runtime.remove_image(&name)?;
            }
            return Ok(());
        }
        self.runtime.remove_image(&canonicalize(id))
    }
}
