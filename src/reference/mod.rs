//! Image references in the normalized form the docker CLI uses

mod domain;
mod name;
mod tag;

pub use domain::{Domain, DOCKER_HUB};
pub use name::Name;
pub use tag::Tag;

use crate::{error::*, Digest};
use regex::Regex;
use std::{fmt, str::FromStr};

/// Upper bound for `<domain>/<name>`
const NAME_TOTAL_LENGTH_MAX: usize = 255;

lazy_static::lazy_static! {
    static ref IMAGE_ID_RE: Regex = Regex::new(r"^[a-f0-9]{64}$").unwrap();
}

/// Fully qualified image reference
///
/// Parsing fills in what the user is allowed to omit:
///
/// - `ubuntu` becomes `docker.io/library/ubuntu:latest`
/// - `localhost:5000/test_repo` becomes `localhost:5000/test_repo:latest`
/// - a tag next to a digest is dropped, the digest pins the image anyway
///
/// ```
/// use regclient::ImageReference;
///
/// let image = ImageReference::parse("ubuntu:20.04").unwrap();
/// assert_eq!(image.to_string(), "docker.io/library/ubuntu:20.04");
/// assert_eq!(image.domain.as_str(), "docker.io");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    pub domain: Domain,
    pub name: Name,
    /// Always `Some` unless `digest` is given
    pub tag: Option<Tag>,
    pub digest: Option<Digest>,
}

impl ImageReference {
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidReference(format!("{} ({})", input, reason));
        if input.is_empty() {
            return Err(invalid("empty"));
        }
        if IMAGE_ID_RE.is_match(input) {
            return Err(invalid("cannot specify 64-byte hexadecimal strings"));
        }

        let (remainder, digest) = match input.split_once('@') {
            Some((remainder, digest)) => {
                let digest = Digest::new(digest).map_err(|e| invalid(&e.to_string()))?;
                (remainder, Some(digest))
            }
            None => (input, None),
        };

        // A colon after the last slash starts the tag, others belong to the port
        let last_slash = remainder.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (path, tag) = match remainder[last_slash..].rfind(':') {
            Some(i) => {
                let split = last_slash + i;
                let tag = Tag::new(&remainder[split + 1..]).map_err(|e| invalid(&e.to_string()))?;
                (&remainder[..split], Some(tag))
            }
            None => (remainder, None),
        };

        let (domain, name) = match path.split_once('/') {
            Some((first, rest)) if is_domain_component(first) => {
                let domain = Domain::new(first).map_err(|e| invalid(&e.to_string()))?;
                (domain, rest.to_string())
            }
            _ => (Domain::docker_hub(), path.to_string()),
        };
        let name = if domain.is_docker_hub() && !name.contains('/') {
            format!("library/{}", name)
        } else {
            name
        };
        if name.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(invalid("repository name must be lowercase"));
        }
        if domain.as_str().len() + 1 + name.len() > NAME_TOTAL_LENGTH_MAX {
            return Err(invalid("repository name must not be more than 255 characters"));
        }
        let name = Name::new(&name).map_err(|e| invalid(&e.to_string()))?;

        let tag = match (tag, &digest) {
            (_, Some(_)) => None,
            (Some(tag), None) => Some(tag),
            (None, None) => Some(Tag::latest()),
        };
        Ok(ImageReference {
            domain,
            name,
            tag,
            digest,
        })
    }

    /// `<domain>/<name>` part without tag and digest
    pub fn repository(&self) -> String {
        format!("{}/{}", self.domain, self.name)
    }

    /// Tag or digest, in the form the registry API takes it in `/v2/<name>/manifests/<reference>`
    pub fn manifest_reference(&self) -> String {
        match (&self.digest, &self.tag) {
            (Some(digest), _) => digest.to_string(),
            (None, Some(tag)) => tag.to_string(),
            (None, None) => Tag::latest().to_string(),
        }
    }

    /// Same repository pinned to `digest`
    pub fn with_digest(&self, digest: Digest) -> Self {
        ImageReference {
            domain: self.domain.clone(),
            name: self.name.clone(),
            tag: None,
            digest: Some(digest),
        }
    }
}

/// The first path component is a registry only when it looks like a host
fn is_domain_component(component: &str) -> bool {
    component.contains('.')
        || component.contains(':')
        || component == "localhost"
        || component.chars().any(|c| c.is_ascii_uppercase())
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.domain, self.name)?;
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)
        } else if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)
        } else {
            Ok(())
        }
    }
}

impl FromStr for ImageReference {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
