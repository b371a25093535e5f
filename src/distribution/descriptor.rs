use crate::{error::*, Digest, ImageReference};
use oci_spec::image::{ImageIndex, ImageManifest};
use serde::Deserialize;

pub const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
pub const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
pub const DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const DOCKER_MANIFEST_LIST: &str = "application/vnd.docker.distribution.manifest.list.v2+json";

/// Manifest media types the client asks for, most preferred first
pub const MANIFEST_ACCEPT: &[&str] = &[OCI_INDEX, OCI_MANIFEST, DOCKER_MANIFEST_LIST, DOCKER_MANIFEST];

/// Manifest fetched from a registry, together with its raw bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDescriptor {
    /// Reference the manifest was fetched for
    pub reference: ImageReference,
    pub media_type: String,
    pub digest: Digest,
    pub manifest: Vec<u8>,
}

#[derive(Deserialize)]
struct MediaTypeField {
    #[serde(rename = "mediaType", default)]
    media_type: Option<String>,
}

impl ImageDescriptor {
    /// Assemble from a manifest response
    ///
    /// `content_type` and `content_digest` are the `Content-Type` and
    /// `Docker-Content-Digest` headers, which registries may omit.
    pub(crate) fn new(
        reference: ImageReference,
        content_type: Option<&str>,
        content_digest: Option<&str>,
        manifest: Vec<u8>,
    ) -> Result<Self> {
        let computed = Digest::from_buf_sha256(&manifest);
        let digest = match content_digest {
            Some(digest) => Digest::new(digest)?,
            None => computed.clone(),
        };
        // Manifest pinned by sha256 must match what the registry actually sent
        if let Some(expected) = &reference.digest {
            if expected.algorithm == "sha256" && expected != &computed {
                return Err(Error::InvalidDigest(format!(
                    "{} expected, registry sent {}",
                    expected, computed
                )));
            }
        }

        let media_type = match content_type
            .map(|ty| ty.split(';').next().unwrap_or(ty).trim())
            .filter(|ty| !ty.is_empty() && *ty != "application/json")
        {
            Some(ty) => ty.to_string(),
            None => serde_json::from_slice::<MediaTypeField>(&manifest)?
                .media_type
                .unwrap_or_else(|| OCI_MANIFEST.to_string()),
        };

        Ok(ImageDescriptor {
            reference,
            media_type,
            digest,
            manifest,
        })
    }

    pub fn size(&self) -> u64 {
        self.manifest.len() as u64
    }

    /// Whether this is a multi-platform index rather than a single image
    pub fn is_index(&self) -> bool {
        self.media_type == OCI_INDEX || self.media_type == DOCKER_MANIFEST_LIST
    }

    pub fn image_manifest(&self) -> Result<ImageManifest> {
        Ok(ImageManifest::from_reader(self.manifest.as_slice())?)
    }

    pub fn image_index(&self) -> Result<ImageIndex> {
        Ok(ImageIndex::from_reader(self.manifest.as_slice())?)
    }

    /// The reference pinned to the manifest digest, `<domain>/<name>@<digest>`
    pub fn pinned_reference(&self) -> ImageReference {
        self.reference.with_digest(self.digest.clone())
    }
}
