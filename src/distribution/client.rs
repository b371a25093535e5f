use crate::{
    auth::{Credential, CredentialStore},
    backend::{ImageRegistry, RegistryIntrospection},
    config::{ClientConfig, TransportConfig},
    distribution::*,
    error::*,
    reference::Domain,
    ImageReference,
};
use serde::Deserialize;
use std::{io::Read, sync::Arc};
use url::Url;

/// Number of repositories requested per `/v2/_catalog` page
pub const CATALOG_PAGE_SIZE: usize = 10_000;

/// Response of `/v2/<name>/tags/list`
#[derive(Debug, Deserialize)]
struct TagList {
    // `null` for a repository without tags on some registries
    #[serde(default)]
    tags: Option<Vec<String>>,
}

/// Response of `/v2/_catalog`
#[derive(Debug, Deserialize)]
struct Catalog {
    #[serde(default)]
    repositories: Option<Vec<String>>,
}

/// Backend speaking the [OCI distribution API](https://github.com/opencontainers/distribution-spec) directly
///
/// One agent, and hence one connection pool, is shared by every call.
/// Authorization tokens live only as long as a single call.
pub struct HttpRegistry {
    agent: ureq::Agent,
    credentials: CredentialStore,
}

impl HttpRegistry {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        Ok(HttpRegistry {
            agent: agent(&config.transport)?,
            credentials: config.credentials.clone(),
        })
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    fn session(&self, domain: &Domain) -> Session<'_> {
        Session::new(&self.agent, self.credentials.get(domain))
    }

    /// Get manifest for given image
    ///
    /// ```text
    /// GET /v2/<name>/manifests/<reference>
    /// ```
    ///
    /// See [corresponding OCI distribution spec document](https://github.com/opencontainers/distribution-spec/blob/main/spec.md#pulling-manifests) for detail.
    pub fn get_repo(&self, reference: &str) -> Result<ImageDescriptor> {
        let image = ImageReference::parse(reference)?;
        let url = image.domain.registry_url()?.join(&format!(
            "/v2/{}/manifests/{}",
            image.name,
            image.manifest_reference()
        ))?;
        let res = self
            .session(&image.domain)
            .get(&url, Some(&MANIFEST_ACCEPT.join(", ")))?;
        let content_type = res.header("Content-Type").map(str::to_string);
        let content_digest = res.header("Docker-Content-Digest").map(str::to_string);
        let mut manifest = Vec::new();
        res.into_reader().read_to_end(&mut manifest)?;
        ImageDescriptor::new(
            image,
            content_type.as_deref(),
            content_digest.as_deref(),
            manifest,
        )
    }

    /// Get tags of the repository `reference` belongs to
    ///
    /// ```text
    /// GET /v2/<name>/tags/list
    /// ```
    ///
    /// `Link: <...>; rel="next"` headers are followed until the last page.
    /// See [corresponding OCI distribution spec document](https://github.com/opencontainers/distribution-spec/blob/main/spec.md#content-discovery) for detail.
    pub fn get_repo_tags(&self, reference: &str) -> Result<Vec<String>> {
        let image = ImageReference::parse(reference)?;
        let base = image.domain.registry_url()?;
        let mut session = self.session(&image.domain);
        let mut url = base.join(&format!("/v2/{}/tags/list", image.name))?;
        let mut tags = Vec::new();
        loop {
            let res = session.get(&url, None)?;
            let next = match res.header("Link").and_then(next_link) {
                Some(link) => Some(base.join(link)?),
                None => None,
            };
            let list = res.into_json::<TagList>()?;
            tags.extend(list.tags.unwrap_or_default());
            match next {
                Some(next) if next != url => url = next,
                _ => break,
            }
        }
        Ok(tags)
    }

    /// Get every repository name of the registry at `address`
    ///
    /// ```text
    /// GET /v2/_catalog?n=<CATALOG_PAGE_SIZE>&last=<last repository of previous page>
    /// ```
    ///
    /// Pages are requested one after another until the registry answers with an
    /// empty page. A registry that never does so, while still moving the cursor
    /// forward, keeps this loop running; only a page ending on the cursor it was
    /// requested with is detected and reported as [`Error::PaginationStalled`].
    ///
    /// Failing after at least one page returns [`Error::CatalogInterrupted`]
    /// carrying the repositories collected so far.
    pub fn get_repos(&self, address: &str) -> Result<Vec<String>> {
        let domain = Domain::new(address)?;
        let base = domain.registry_url()?;
        let mut session = self.session(&domain);
        let mut repositories = Vec::new();
        let mut last = String::new();
        loop {
            let page = match catalog_page(&mut session, &base, &last) {
                Ok(page) => page,
                Err(e) => return Err(interrupted(repositories, e)),
            };
            let next = match page.last() {
                Some(next) => next.clone(),
                None => break,
            };
            if next == last {
                return Err(interrupted(repositories, Error::PaginationStalled(last)));
            }
            log::debug!("{} repositories in catalog page after `{}`", page.len(), last);
            repositories.extend(page);
            last = next;
        }
        Ok(repositories)
    }
}

impl ImageRegistry for HttpRegistry {
    /// Resolve the manifest and return `<domain>/<name>@<digest>`
    ///
    /// Nothing is stored locally, pulling into a local store is the job of the
    /// daemon and runtime backends.
    fn pull(&self, reference: &str) -> Result<String> {
        let descriptor = self.get_repo(reference)?;
        Ok(descriptor.pinned_reference().to_string())
    }

    fn remove(&self, _id: &str) -> Result<()> {
        Err(Error::Unsupported(
            "a remote registry does not remove images, use the daemon or runtime backend",
        ))
    }
}

impl RegistryIntrospection for HttpRegistry {
    fn get_repo(&self, reference: &str) -> Result<ImageDescriptor> {
        HttpRegistry::get_repo(self, reference)
    }

    fn get_repo_tags(&self, reference: &str) -> Result<Vec<String>> {
        HttpRegistry::get_repo_tags(self, reference)
    }

    fn get_repos(&self, address: &str) -> Result<Vec<String>> {
        HttpRegistry::get_repos(self, address)
    }
}

fn agent(transport: &TransportConfig) -> Result<ureq::Agent> {
    if transport.accept_invalid_certs {
        log::warn!("TLS certificate verification is disabled for registry access");
    }
    let tls = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(transport.accept_invalid_certs)
        .build()
        .map_err(|e| Error::Construction(e.to_string()))?;
    Ok(ureq::AgentBuilder::new()
        .timeout_connect(transport.connect_timeout)
        .timeout_read(transport.io_timeout)
        .timeout_write(transport.io_timeout)
        .max_idle_connections(transport.max_idle_connections)
        .max_idle_connections_per_host(transport.max_idle_connections_per_host)
        .user_agent(&transport.user_agent)
        .try_proxy_from_env(transport.proxy_from_env)
        .tls_connector(Arc::new(tls))
        .build())
}

fn catalog_page(session: &mut Session<'_>, base: &Url, last: &str) -> Result<Vec<String>> {
    let mut url = base.join("/v2/_catalog")?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("n", &CATALOG_PAGE_SIZE.to_string());
        if !last.is_empty() {
            query.append_pair("last", last);
        }
    }
    let catalog = session.get(&url, None)?.into_json::<Catalog>()?;
    Ok(catalog.repositories.unwrap_or_default())
}

fn interrupted(repositories: Vec<String>, e: Error) -> Error {
    if repositories.is_empty() {
        e
    } else {
        Error::CatalogInterrupted {
            repositories,
            source: Box::new(e),
        }
    }
}

/// Target of `Link: <url>; rel="next"`
fn next_link(header: &str) -> Option<&str> {
    header.split(',').find_map(|link| {
        let (target, params) = link.split_once(';')?;
        if !params.contains(r#"rel="next""#) {
            return None;
        }
        target
            .trim()
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
    })
}

/// Authorization state of one operation against one registry
struct Session<'a> {
    agent: &'a ureq::Agent,
    credential: Option<&'a Credential>,
    authorization: Option<String>,
}

impl<'a> Session<'a> {
    fn new(agent: &'a ureq::Agent, credential: Option<&'a Credential>) -> Self {
        Session {
            agent,
            credential,
            authorization: credential.map(|c| format!("Basic {}", c.encode())),
        }
    }

    fn request(&self, url: &Url, accept: Option<&str>) -> ureq::Request {
        let mut req = self.agent.get(url.as_str());
        if let Some(accept) = accept {
            req = req.set("Accept", accept);
        }
        if let Some(authorization) = &self.authorization {
            req = req.set("Authorization", authorization);
        }
        req
    }

    /// `GET url`, answering one authorization challenge if the registry asks for it
    fn get(&mut self, url: &Url, accept: Option<&str>) -> Result<ureq::Response> {
        log::info!("GET {}", url);
        let challenge = match self.request(url, accept).call() {
            Ok(res) => return Ok(res),
            Err(ureq::Error::Status(401, res)) => match res.header("WWW-Authenticate") {
                Some(header) => AuthChallenge::from_header(header)?,
                None => return Err(Error::Auth(url.to_string())),
            },
            Err(e) => return Err(e.into()),
        };
        if challenge == AuthChallenge::Basic
            && self.authorization.as_deref().map_or(false, |a| a.starts_with("Basic "))
        {
            // Credentials were sent already and rejected
            return Err(Error::Auth(url.to_string()));
        }
        self.authorization = Some(challenge.authorize(self.agent, self.credential)?);
        Ok(self.request(url, accept).call()?)
    }
}
