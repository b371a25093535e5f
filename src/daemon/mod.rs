//! Backend delegating to a local Docker daemon

mod docker;

pub use docker::DockerDaemon;

use crate::{
    auth::CredentialStore, backend::ImageRegistry, config::ClientConfig, error::*, ImageReference,
};

/// Credential forwarded to the daemon, which passes it on to the registry
#[derive(Clone, PartialEq, Eq)]
pub struct DaemonAuth {
    pub username: String,
    pub password: String,
    pub server_address: String,
}

impl std::fmt::Debug for DaemonAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonAuth")
            .field("username", &self.username)
            .field("server_address", &self.server_address)
            .finish()
    }
}

/// Image API of a container engine daemon
pub trait ImageDaemon {
    /// Pull `reference`, returning only after the daemon finished the pull
    fn pull_image(&self, reference: &str, auth: Option<&DaemonAuth>) -> Result<()>;

    /// Force-remove `id`, pruning untagged parents
    fn remove_image(&self, id: &str) -> Result<()>;
}

/// [`ImageRegistry`] on top of an [`ImageDaemon`]
///
/// Image identifiers are the canonical references images were pulled with.
pub struct DaemonBackend<D = DockerDaemon> {
    daemon: D,
    credentials: CredentialStore,
}

impl DaemonBackend<DockerDaemon> {
    /// Connect to the daemon configured by the environment (`DOCKER_HOST`, ...)
    pub fn new(config: &ClientConfig) -> Result<Self> {
        Ok(Self::with_daemon(
            DockerDaemon::connect()?,
            config.credentials.clone(),
        ))
    }
}

impl<D: ImageDaemon> DaemonBackend<D> {
    pub fn with_daemon(daemon: D, credentials: CredentialStore) -> Self {
        DaemonBackend {
            daemon,
            credentials,
        }
    }

    pub fn daemon(&self) -> &D {
        &self.daemon
    }
}

impl<D: ImageDaemon> ImageRegistry for DaemonBackend<D> {
    fn pull(&self, reference: &str) -> Result<String> {
        let image = ImageReference::parse(reference)?;
        let canonical = image.to_string();
        let auth = self.credentials.get(&image.domain).map(|c| DaemonAuth {
            username: c.username.clone(),
            password: c.password.clone(),
            server_address: image.domain.to_string(),
        });
        if auth.is_none() {
            log::debug!("Pull {} without credential", canonical);
        }
        self.daemon.pull_image(&canonical, auth.as_ref())?;
        Ok(canonical)
    }

    fn remove(&self, id: &str) -> Result<()> {
        self.daemon.remove_image(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{reference::Domain, Credential};
    use std::{cell::RefCell, collections::HashSet};

    /// Daemon keeping pulled references in memory
    #[derive(Default)]
    struct FakeDaemon {
        images: RefCell<HashSet<String>>,
        pulls: RefCell<Vec<(String, Option<DaemonAuth>)>>,
        /// References the fake registry refuses without credential
        private: Vec<String>,
    }

    impl ImageDaemon for FakeDaemon {
        fn pull_image(&self, reference: &str, auth: Option<&DaemonAuth>) -> Result<()> {
            self.pulls
                .borrow_mut()
                .push((reference.to_string(), auth.cloned()));
            if self.private.iter().any(|p| p == reference) && auth.is_none() {
                return Err(Error::Auth(reference.to_string()));
            }
            self.images.borrow_mut().insert(reference.to_string());
            Ok(())
        }

        fn remove_image(&self, id: &str) -> Result<()> {
            if self.images.borrow_mut().remove(id) {
                Ok(())
            } else {
                Err(Error::NotFound(id.to_string()))
            }
        }
    }

    fn credentials() -> CredentialStore {
        let mut store = CredentialStore::default();
        store.insert(
            Domain::new("registry.example.com").unwrap(),
            Credential::new("user", "pass"),
        );
        store
    }

    #[test]
    fn pull_then_remove() -> Result<()> {
        let backend = DaemonBackend::with_daemon(FakeDaemon::default(), credentials());
        let id = backend.pull("ubuntu")?;
        assert_eq!(id, "docker.io/library/ubuntu:latest");
        backend.remove(&id)?;
        assert!(backend.daemon().images.borrow().is_empty());
        assert!(matches!(backend.remove(&id), Err(Error::NotFound(_))));
        Ok(())
    }

    #[test]
    fn credential_by_domain() -> Result<()> {
        let backend = DaemonBackend::with_daemon(FakeDaemon::default(), credentials());
        backend.pull("registry.example.com/team/app:1.0")?;
        backend.pull("quay.io/team/app:1.0")?;

        let pulls = backend.daemon().pulls.borrow();
        let (reference, auth) = &pulls[0];
        assert_eq!(reference, "registry.example.com/team/app:1.0");
        let auth = auth.as_ref().unwrap();
        assert_eq!(auth.username, "user");
        assert_eq!(auth.password, "pass");
        assert_eq!(auth.server_address, "registry.example.com");
        assert_eq!(pulls[1].1, None);
        Ok(())
    }

    #[test]
    fn anonymous_pull_of_private_image() {
        let daemon = FakeDaemon {
            private: vec!["quay.io/private/app:latest".to_string()],
            ..Default::default()
        };
        let backend = DaemonBackend::with_daemon(daemon, credentials());
        assert!(backend.pull("quay.io/public/app").is_ok());
        assert!(matches!(
            backend.pull("quay.io/private/app"),
            Err(Error::Auth(_))
        ));
    }

    #[test]
    fn invalid_reference_is_not_sent() {
        let backend = DaemonBackend::with_daemon(FakeDaemon::default(), credentials());
        assert!(matches!(
            backend.pull("Not/A/Reference"),
            Err(Error::InvalidReference(_))
        ));
        assert!(backend.daemon().pulls.borrow().is_empty());
    }
}
