//! Registry credentials, from explicit overrides and docker's `config.json`

use crate::{error::*, reference::Domain};
use serde::Deserialize;
use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::Path,
};

/// Username and password for one registry
///
/// Empty strings mean "no credential", see [`Credential::is_empty`].
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credential {
    pub fn new(username: &str, password: &str) -> Self {
        Credential {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    /// A credential is only usable when both parts are given
    pub fn is_empty(&self) -> bool {
        self.username.is_empty() || self.password.is_empty()
    }

    /// Decode `base64("user:password")` as stored in the `auth` field of docker's `config.json`
    ///
    /// The decoded string must contain exactly one `:`.
    pub fn decode(octet: &str) -> Result<Self> {
        let buf = base64::decode(octet)
            .map_err(|e| Error::InvalidCredential(format!("undecodable base64: {}", e)))?;
        let decoded = String::from_utf8(buf)
            .map_err(|_| Error::InvalidCredential("not a UTF-8 string".to_string()))?;
        let mut iter = decoded.split(':');
        match (iter.next(), iter.next(), iter.next()) {
            (Some(username), Some(password), None) => Ok(Credential::new(username, password)),
            _ => Err(Error::InvalidCredential(
                "expected exactly one `:` between username and password".to_string(),
            )),
        }
    }

    /// Inverse of [`Credential::decode`], also the payload of a `Basic` authorization header
    pub fn encode(&self) -> String {
        base64::encode(format!("{}:{}", self.username, self.password))
    }
}

/// Mapping from registry domain to credential
///
/// Filled while a client is built and read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialStore {
    auths: HashMap<Domain, Credential>,
}

impl CredentialStore {
    /// Usable credential for `domain`, if any
    pub fn get(&self, domain: &Domain) -> Option<&Credential> {
        self.auths.get(domain).filter(|c| !c.is_empty())
    }

    pub fn len(&self) -> usize {
        self.auths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.auths.is_empty()
    }

    pub fn domains(&self) -> impl Iterator<Item = &Domain> {
        self.auths.keys()
    }

    /// Last insert for a domain wins
    pub(crate) fn insert(&mut self, domain: Domain, credential: Credential) {
        self.auths.insert(domain, credential);
    }

    /// Take entries of `other` for domains without a usable credential yet
    pub(crate) fn merge_missing(&mut self, other: Self) {
        for (domain, credential) in other.auths.into_iter() {
            if self.get(&domain).is_some() {
                log::debug!("Keep explicit credential for {} over credential file", domain);
                continue;
            }
            self.auths.insert(domain, credential);
        }
    }

    /// Load the `auths` table of docker's `config.json`
    ///
    /// A missing file is an empty store. Everything else that goes wrong is
    /// reported in the returned diagnostics, and only drops the entry it concerns
    /// (or every entry, if the file itself is not valid JSON).
    pub fn from_docker_config(path: &Path) -> (Self, Vec<Error>) {
        let mut store = Self::default();
        let mut diagnostics = Vec::new();
        if !path.is_file() {
            log::debug!("No credential file at {}", path.display());
            return (store, diagnostics);
        }

        let diagnostic = |key: &str, reason: String| {
            let err = Error::ConfigParse {
                path: path.to_owned(),
                key: key.to_string(),
                reason,
            };
            log::warn!("{}", err);
            err
        };

        let config = match fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|s| serde_json::from_str::<DockerConfig>(&s).map_err(|e| e.to_string()))
        {
            Ok(config) => config,
            Err(reason) => {
                diagnostics.push(diagnostic("", reason));
                return (store, diagnostics);
            }
        };

        for (key, value) in config.auths.into_iter() {
            let domain = match Domain::from_server_key(&key) {
                Ok(domain) => domain,
                Err(e) => {
                    diagnostics.push(diagnostic(&key, e.to_string()));
                    continue;
                }
            };
            let entry = match serde_json::from_value::<AuthEntry>(value) {
                Ok(entry) => entry,
                Err(e) => {
                    diagnostics.push(diagnostic(&key, e.to_string()));
                    continue;
                }
            };
            if entry.auth.is_empty() {
                // e.g. entries managed by a credential helper
                log::debug!("No inline auth for {} in {}", key, path.display());
                continue;
            }
            match Credential::decode(&entry.auth) {
                Ok(credential) => store.insert(domain, credential),
                Err(e) => diagnostics.push(diagnostic(&key, e.to_string())),
            }
        }
        (store, diagnostics)
    }
}

/// Subset of docker's `config.json`
#[derive(Debug, Deserialize)]
struct DockerConfig {
    // Sorted, so that duplicated domains resolve the same way on every load
    #[serde(default)]
    auths: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct AuthEntry {
    #[serde(default)]
    auth: String,
}
