use super::{validate_namespace, ImageRuntime};
use crate::{blocking::BlockingRuntime, error::*, Digest};
use containerd_client::{
    services::v1::{
        images_client::ImagesClient, transfer_client::TransferClient, DeleteImageRequest,
        GetImageRequest, ListImagesRequest, TransferOptions, TransferRequest,
    },
    types::{
        transfer::{ImageStore, OciRegistry, UnpackConfiguration},
        Platform,
    },
};
use prost::Message;
use prost_types::Any;
use std::path::Path;
use tonic::{metadata::AsciiMetadataValue, transport::Channel, Code, Request, Status};

/// Type names containerd's transfer service resolves `Any` payloads by
const OCI_REGISTRY_TYPE: &str = "containerd.types.transfer.OCIRegistry";
const IMAGE_STORE_TYPE: &str = "containerd.types.transfer.ImageStore";

/// [`ImageRuntime`] talking to containerd over its gRPC socket
pub struct ContainerdRuntime {
    channel: Channel,
    namespace: String,
    namespace_header: AsciiMetadataValue,
    rt: BlockingRuntime,
}

impl ContainerdRuntime {
    pub fn connect(socket: &Path, namespace: &str) -> Result<Self> {
        validate_namespace(namespace)?;
        let namespace_header = namespace
            .parse::<AsciiMetadataValue>()
            .map_err(|_| Error::InvalidNamespace(namespace.to_string()))?;
        let rt = BlockingRuntime::new()?;
        let channel = rt.block_on(async {
            containerd_client::connect(socket).await.map_err(|e| {
                Error::Construction(format!("containerd at {}: {}", socket.display(), e))
            })
        })?;
        log::info!("Connected to containerd at {}", socket.display());
        Ok(ContainerdRuntime {
            channel,
            namespace: namespace.to_string(),
            namespace_header,
            rt,
        })
    }

    /// Request with metadata `{"containerd-namespace": <namespace>}`
    fn request<T>(&self, msg: T) -> Request<T> {
        let mut req = Request::new(msg);
        req.metadata_mut()
            .insert("containerd-namespace", self.namespace_header.clone());
        req
    }
}

impl ImageRuntime for ContainerdRuntime {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn pull_image(&self, name: &str) -> Result<Digest> {
        let platform = Platform {
            os: "linux".to_string(),
            architecture: host_architecture().to_string(),
            ..Default::default()
        };
        let source = OciRegistry {
            reference: name.to_string(),
            ..Default::default()
        };
        let destination = ImageStore {
            name: name.to_string(),
            platforms: vec![platform.clone()],
            unpacks: vec![UnpackConfiguration {
                platform: Some(platform),
                ..Default::default()
            }],
            ..Default::default()
        };
        let transfer = TransferRequest {
            source: Some(to_any(OCI_REGISTRY_TYPE, &source)),
            destination: Some(to_any(IMAGE_STORE_TYPE, &destination)),
            options: Some(TransferOptions::default()),
        };

        log::info!("Pull {} into containerd namespace {}", name, self.namespace);
        self.rt.block_on(async {
            TransferClient::new(self.channel.clone())
                .transfer(self.request(transfer))
                .await
                .map_err(from_status)?;
            let image = ImagesClient::new(self.channel.clone())
                .get(self.request(GetImageRequest {
                    name: name.to_string(),
                }))
                .await
                .map_err(from_status)?
                .into_inner()
                .image;
            let target = image
                .and_then(|image| image.target)
                .ok_or_else(|| Error::NotFound(name.to_string()))?;
            Digest::new(&target.digest)
        })
    }

    fn remove_image(&self, name: &str) -> Result<()> {
        log::info!("Remove {} from containerd namespace {}", name, self.namespace);
        let req = DeleteImageRequest {
            name: name.to_string(),
            sync: true,
            ..Default::default()
        };
        self.rt.block_on(async {
            ImagesClient::new(self.channel.clone())
                .delete(self.request(req))
                .await
                .map_err(from_status)?;
            Ok(())
        })
    }

    fn images_by_digest(&self, digest: &Digest) -> Result<Vec<String>> {
        let req = ListImagesRequest {
            filters: vec![format!("target.digest=={}", digest)],
        };
        self.rt.block_on(async {
            let images = ImagesClient::new(self.channel.clone())
                .list(self.request(req))
                .await
                .map_err(from_status)?
                .into_inner()
                .images;
            Ok(images.into_iter().map(|image| image.name).collect())
        })
    }
}

fn to_any<M: Message>(type_url: &str, msg: &M) -> Any {
    Any {
        type_url: type_url.to_string(),
        value: msg.encode_to_vec(),
    }
}

fn from_status(status: Status) -> Error {
    match status.code() {
        Code::NotFound => Error::NotFound(status.message().to_string()),
        Code::Unauthenticated | Code::PermissionDenied => {
            Error::Auth(status.message().to_string())
        }
        _ => Error::Runtime(status),
    }
}

/// GOARCH spelling of the host architecture
fn host_architecture() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        "powerpc64" => "ppc64le",
        arch => arch,
    }
}
