use crate::error::*;
use regex::Regex;
use std::fmt;
use url::Url;

/// Domain used for Docker Hub images without an explicit registry
pub const DOCKER_HUB: &str = "docker.io";

/// Host serving the registry API for [`DOCKER_HUB`]
const DOCKER_HUB_API: &str = "registry-1.docker.io";

/// Aliases which all denote Docker Hub
const DOCKER_HUB_ALIASES: &[&str] = &["index.docker.io", "registry-1.docker.io"];

/// Registry domain, `host[:port]`
///
/// The host is a DNS name, an IPv4 address or a bracketed IPv6 address.
/// Hosts are lower-cased and every Docker Hub alias collapses into `docker.io`,
/// so that two spellings of the same registry compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Domain(String);

lazy_static::lazy_static! {
    static ref DOMAIN_RE: Regex = Regex::new(
        r"^(?:(?:[a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9-]*[a-zA-Z0-9])(?:\.(?:[a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9-]*[a-zA-Z0-9]))*|\[[a-fA-F0-9:]+\])(?::[0-9]{1,5})?$"
    ).unwrap();
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Domain {
    pub fn new(domain: &str) -> Result<Self> {
        if !DOMAIN_RE.is_match(domain) {
            return Err(Error::InvalidDomain(domain.to_string()));
        }
        let domain = domain.to_ascii_lowercase();
        if DOCKER_HUB_ALIASES.contains(&domain.as_str()) {
            return Ok(Domain(DOCKER_HUB.to_string()));
        }
        Ok(Domain(domain))
    }

    /// Domain from a key of the `auths` table in docker's `config.json`
    ///
    /// Keys are either URLs such as `https://index.docker.io/v1/` or bare hosts.
    pub fn from_server_key(key: &str) -> Result<Self> {
        match Url::parse(key) {
            Ok(url) if url.host_str().is_some() => {
                let host = url.host_str().unwrap_or_default();
                match url.port() {
                    Some(port) => Self::new(&format!("{}:{}", host, port)),
                    None => Self::new(host),
                }
            }
            _ => Self::new(key),
        }
    }

    pub fn docker_hub() -> Self {
        Domain(DOCKER_HUB.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_docker_hub(&self) -> bool {
        self.0 == DOCKER_HUB
    }

    /// Host part without port
    pub fn host(&self) -> &str {
        if self.0.starts_with('[') {
            match self.0.find(']') {
                Some(end) => &self.0[..=end],
                None => &self.0,
            }
        } else {
            self.0.split(':').next().unwrap_or(&self.0)
        }
    }

    /// Whether the registry is expected to speak plain HTTP
    pub fn is_local(&self) -> bool {
        let host = self.host();
        host == "localhost"
            || host.ends_with(".localhost")
            || host.ends_with(".local")
            || host.starts_with("127.")
            || host == "[::1]"
    }

    /// Base URL of the registry API
    pub fn registry_url(&self) -> Result<Url> {
        let authority = if self.is_docker_hub() {
            DOCKER_HUB_API
        } else {
            self.as_str()
        };
        let scheme = if self.is_local() { "http" } else { "https" };
        Ok(Url::parse(&format!("{}://{}", scheme, authority))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain() {
        assert_eq!(Domain::new("ghcr.io").unwrap().as_str(), "ghcr.io");
        assert_eq!(Domain::new("localhost:5000").unwrap().as_str(), "localhost:5000");
        assert_eq!(Domain::new("[::1]:5000").unwrap().as_str(), "[::1]:5000");
        assert_eq!(Domain::new("Registry.Example.COM").unwrap().as_str(), "registry.example.com");
        assert!(Domain::new("").is_err());
        assert!(Domain::new("-bad.io").is_err());
        assert!(Domain::new("ghcr.io/path").is_err());
        assert!(Domain::new("https://ghcr.io").is_err());
        assert!(Domain::new("host:port").is_err());
    }

    #[test]
    fn docker_hub_aliases() {
        for alias in ["docker.io", "index.docker.io", "registry-1.docker.io"] {
            assert!(Domain::new(alias).unwrap().is_docker_hub());
        }
    }

    #[test]
    fn server_key() {
        let domain = Domain::from_server_key("https://index.docker.io/v1/").unwrap();
        assert_eq!(domain, Domain::docker_hub());

        let domain = Domain::from_server_key("registry.example.com").unwrap();
        assert_eq!(domain.as_str(), "registry.example.com");

        // `localhost:5000` parses as URL with scheme `localhost`, but has no host
        let domain = Domain::from_server_key("localhost:5000").unwrap();
        assert_eq!(domain.as_str(), "localhost:5000");

        let domain = Domain::from_server_key("http://127.0.0.1:5000").unwrap();
        assert_eq!(domain.as_str(), "127.0.0.1:5000");

        assert!(Domain::from_server_key("not a domain").is_err());
    }

    #[test]
    fn registry_url() {
        let url = Domain::docker_hub().registry_url().unwrap();
        assert_eq!(url.as_str(), "https://registry-1.docker.io/");

        let url = Domain::new("localhost:5000").unwrap().registry_url().unwrap();
        assert_eq!(url.as_str(), "http://localhost:5000/");

        let url = Domain::new("127.0.0.1:5000").unwrap().registry_url().unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:5000/");

        let url = Domain::new("ghcr.io").unwrap().registry_url().unwrap();
        assert_eq!(url.as_str(), "https://ghcr.io/");
    }
}
