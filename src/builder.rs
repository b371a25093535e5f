//! Best-effort assembly of a [`ClientConfig`] and the backends built from it

use crate::{
    auth::{Credential, CredentialStore},
    config::ClientConfig,
    daemon::DaemonBackend,
    distribution::HttpRegistry,
    error::*,
    reference::Domain,
    runtime::{validate_namespace, RuntimeBackend},
};
use std::{path::PathBuf, time::Duration};

type ConfigOption = Box<dyn FnOnce(&mut ClientConfig) -> Result<()>>;

/// Outcome of one option passed to [`ClientBuilder`]
#[derive(Debug)]
pub struct OptionReport {
    pub name: String,
    /// `None` if the option took effect
    pub error: Option<Error>,
}

impl OptionReport {
    pub fn applied(&self) -> bool {
        self.error.is_none()
    }
}

/// What happened while a client was built
#[derive(Debug, Default)]
pub struct BuildReport {
    /// Every option in the order given to the builder
    pub options: Vec<OptionReport>,
    /// Skipped entries of the credential file
    pub diagnostics: Vec<Error>,
}

impl BuildReport {
    /// `true` if every option took effect and the credential file was clean
    pub fn is_clean(&self) -> bool {
        self.options.iter().all(OptionReport::applied) && self.diagnostics.is_empty()
    }

    pub fn failed_options(&self) -> impl Iterator<Item = &OptionReport> {
        self.options.iter().filter(|o| !o.applied())
    }
}

/// A client together with the [`BuildReport`] of its construction
#[derive(Debug)]
pub struct Built<T> {
    pub client: T,
    pub report: BuildReport,
}

impl<T> Built<T> {
    fn map<U>(self, f: impl FnOnce(T) -> Result<U>) -> Result<Built<U>> {
        Ok(Built {
            client: f(self.client)?,
            report: self.report,
        })
    }
}

/// Builder applying options in order
///
/// A failing option is logged, recorded in the [`BuildReport`], and leaves
/// the configuration as it was before the option ran. After all options the
/// credential file is loaded; explicit credentials win over its entries.
///
/// ```no_run
/// use regclient::{ClientBuilder, Credential};
///
/// let built = ClientBuilder::new()
///     .auth("registry.example.com", Credential::new("user", "pass"))
///     .build_registry()?;
/// for failed in built.report.failed_options() {
///     eprintln!("{} ignored: {:?}", failed.name, failed.error);
/// }
/// let repos = built.client.get_repos("registry.example.com")?;
/// # Ok::<(), regclient::Error>(())
/// ```
pub struct ClientBuilder {
    config: ClientConfig,
    options: Vec<(String, ConfigOption)>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    /// Start from `config` instead of the defaults
    pub fn with_config(config: ClientConfig) -> Self {
        ClientBuilder {
            config,
            options: Vec::new(),
        }
    }

    /// Add an arbitrary option
    pub fn option<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: FnOnce(&mut ClientConfig) -> Result<()> + 'static,
    {
        self.options.push((name.into(), Box::new(f)));
        self
    }

    /// Explicit credential for the registry at `address`
    ///
    /// An empty username or password is no credential and fails the option,
    /// leaving the credential file in charge of `address`.
    pub fn auth(self, address: &str, credential: Credential) -> Self {
        let address = address.to_string();
        self.option(format!("auth({})", address), move |config| {
            let domain = Domain::new(&address)?;
            if credential.is_empty() {
                return Err(Error::InvalidCredential(format!(
                    "empty username or password for {}",
                    domain
                )));
            }
            config.credentials.insert(domain, credential);
            Ok(())
        })
    }

    /// Read credentials from `path` instead of docker's `config.json`
    pub fn config_file(self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.option(format!("config_file({})", path.display()), move |config| {
            config.config_file = Some(path);
            Ok(())
        })
    }

    /// Use explicit credentials only
    pub fn no_config_file(self) -> Self {
        self.option("no_config_file", |config| {
            config.config_file = None;
            Ok(())
        })
    }

    pub fn connect_timeout(self, timeout: Duration) -> Self {
        self.option(format!("connect_timeout({:?})", timeout), move |config| {
            non_zero(timeout)?;
            config.transport.connect_timeout = timeout;
            Ok(())
        })
    }

    pub fn io_timeout(self, timeout: Duration) -> Self {
        self.option(format!("io_timeout({:?})", timeout), move |config| {
            non_zero(timeout)?;
            config.transport.io_timeout = timeout;
            Ok(())
        })
    }

    /// Accept any TLS certificate, including self-signed and expired ones
    pub fn danger_accept_invalid_certs(self) -> Self {
        self.option("danger_accept_invalid_certs", |config| {
            config.transport.accept_invalid_certs = true;
            Ok(())
        })
    }

    pub fn containerd_socket(self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.option(
            format!("containerd_socket({})", path.display()),
            move |config| {
                config.containerd_socket = path;
                Ok(())
            },
        )
    }

    pub fn namespace(self, namespace: &str) -> Self {
        let namespace = namespace.to_string();
        self.option(format!("namespace({})", namespace), move |config| {
            validate_namespace(&namespace)?;
            config.namespace = namespace;
            Ok(())
        })
    }

    /// Apply the options and load the credential file
    pub fn build(self) -> Built<ClientConfig> {
        let mut config = self.config;
        let mut report = BuildReport::default();

        for (name, option) in self.options {
            let mut scratch = config.clone();
            let error = match option(&mut scratch) {
                Ok(()) => {
                    config = scratch;
                    None
                }
                Err(e) => {
                    log::warn!("Skip option {}: {}", name, e);
                    Some(e)
                }
            };
            report.options.push(OptionReport { name, error });
        }

        if let Some(path) = &config.config_file {
            let (file, diagnostics) = CredentialStore::from_docker_config(path);
            config.credentials.merge_missing(file);
            report.diagnostics = diagnostics;
        }
        log::debug!("Credentials for {} registries", config.credentials.len());

        Built {
            client: config,
            report,
        }
    }

    pub fn build_registry(self) -> Result<Built<HttpRegistry>> {
        self.build().map(|config| HttpRegistry::new(&config))
    }

    pub fn build_daemon(self) -> Result<Built<DaemonBackend>> {
        self.build().map(|config| DaemonBackend::new(&config))
    }

    pub fn build_runtime(self) -> Result<Built<RuntimeBackend>> {
        self.build().map(|config| RuntimeBackend::new(&config))
    }
}

fn non_zero(timeout: Duration) -> Result<()> {
    if timeout.is_zero() {
        return Err(Error::Construction("timeout must be positive".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn credential_file(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    fn domain(s: &str) -> Domain {
        Domain::new(s).unwrap()
    }

    #[test]
    fn failing_option_is_skipped() {
        let built = ClientBuilder::new()
            .no_config_file()
            .auth("not a domain", Credential::new("user", "pass"))
            .namespace("has space")
            .io_timeout(Duration::from_secs(3))
            .build();

        let report = &built.report;
        let outcomes: Vec<_> = report
            .options
            .iter()
            .map(|o| (o.name.as_str(), o.applied()))
            .collect();
        assert_eq!(
            outcomes,
            vec![
                ("no_config_file", true),
                ("auth(not a domain)", false),
                ("namespace(has space)", false),
                ("io_timeout(3s)", true),
            ]
        );
        assert!(!report.is_clean());
        assert!(matches!(
            report.options[1].error,
            Some(Error::InvalidDomain(_))
        ));
        assert!(built.client.credentials.is_empty());
        assert_eq!(built.client.namespace, crate::config::DEFAULT_NAMESPACE);
        assert_eq!(built.client.transport.io_timeout, Duration::from_secs(3));
    }

    #[test]
    fn failed_option_leaves_no_partial_change() {
        let built = ClientBuilder::new()
            .no_config_file()
            .option("half done", |config| {
                config.namespace = "changed".to_string();
                Err(Error::Construction("fail after write".to_string()))
            })
            .build();
        assert_eq!(built.client.namespace, crate::config::DEFAULT_NAMESPACE);
        assert_eq!(built.report.failed_options().count(), 1);
    }

    #[test]
    fn explicit_credential_wins_over_file() {
        let f = credential_file(
            r#"{"auths": {
                "registry.example.com": {"auth": "dXNlcjpwYXNz"},
                "https://quay.io": {"auth": "cXVheTpzZWNyZXQ="},
                "broken.example.com": {"auth": "bm9jb2xvbg=="}
            }}"#,
        );
        let built = ClientBuilder::new()
            .auth("registry.example.com", Credential::new("explicit", "secret"))
            .config_file(f.path())
            .build();

        let store = &built.client.credentials;
        assert_eq!(store.len(), 2);
        assert_eq!(
            store.get(&domain("registry.example.com")),
            Some(&Credential::new("explicit", "secret"))
        );
        assert_eq!(
            store.get(&domain("quay.io")),
            Some(&Credential::new("quay", "secret"))
        );
        assert_eq!(built.report.diagnostics.len(), 1);
        assert!(matches!(
            built.report.diagnostics[0],
            Error::ConfigParse { .. }
        ));
    }

    #[test]
    fn empty_explicit_credential_keeps_file_entry() {
        let f = credential_file(r#"{"auths": {"registry.example.com": {"auth": "dXNlcjpwYXNz"}}}"#);
        let built = ClientBuilder::new()
            .auth("registry.example.com", Credential::new("", ""))
            .auth("quay.io", Credential::new("user", ""))
            .config_file(f.path())
            .build();

        let store = &built.client.credentials;
        assert_eq!(
            store.get(&domain("registry.example.com")),
            Some(&Credential::new("user", "pass"))
        );
        assert_eq!(store.get(&domain("quay.io")), None);
        assert!(!built.report.is_clean());
        let failed: Vec<_> = built
            .report
            .failed_options()
            .map(|o| o.name.as_str())
            .collect();
        assert_eq!(failed, vec!["auth(registry.example.com)", "auth(quay.io)"]);
        assert!(matches!(
            built.report.options[0].error,
            Some(Error::InvalidCredential(_))
        ));
    }

    #[test]
    fn last_explicit_credential_wins() {
        let built = ClientBuilder::new()
            .no_config_file()
            .auth("registry.example.com", Credential::new("first", "a"))
            .auth("REGISTRY.example.com", Credential::new("second", "b"))
            .build();
        let store = &built.client.credentials;
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.get(&domain("registry.example.com")),
            Some(&Credential::new("second", "b"))
        );
        assert!(built.report.is_clean());
    }

    #[test]
    fn missing_credential_file() {
        let dir = tempfile::tempdir().unwrap();
        let built = ClientBuilder::new()
            .config_file(dir.path().join("config.json"))
            .build();
        assert!(built.client.credentials.is_empty());
        assert!(built.report.is_clean());
    }

    #[test]
    fn registry_keeps_report() -> Result<()> {
        let built = ClientBuilder::new()
            .no_config_file()
            .connect_timeout(Duration::ZERO)
            .danger_accept_invalid_certs()
            .build_registry()?;
        assert_eq!(built.report.failed_options().count(), 1);
        assert!(built.client.credentials().is_empty());
        Ok(())
    }

    #[test]
    fn runtime_construction_failure() {
        let dir = tempfile::tempdir().unwrap();
        let res = ClientBuilder::new()
            .no_config_file()
            .containerd_socket(dir.path().join("containerd.sock"))
            .build_runtime();
        assert!(matches!(res, Err(Error::Construction(_))));
    }
}
