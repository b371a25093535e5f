use super::{DaemonAuth, ImageDaemon};
use crate::{blocking::BlockingRuntime, error::*};
use bollard::{
    auth::DockerCredentials,
    errors::Error as BollardError,
    image::{CreateImageOptions, RemoveImageOptions},
    models::CreateImageInfo,
    Docker,
};
use futures::{Stream, StreamExt};

/// [`ImageDaemon`] talking to dockerd through [bollard](https://docs.rs/bollard)
pub struct DockerDaemon {
    docker: Docker,
    rt: BlockingRuntime,
}

impl DockerDaemon {
    /// Connect with the settings of the environment and negotiate the API version
    pub fn connect() -> Result<Self> {
        let construction = |e: BollardError| Error::Construction(format!("docker daemon: {}", e));
        let rt = BlockingRuntime::new()?;
        let docker = {
            let _guard = rt.enter()?;
            Docker::connect_with_defaults().map_err(construction)?
        };
        let docker =
            rt.block_on(async { docker.negotiate_version().await.map_err(construction) })?;
        log::info!("Connected to docker daemon");
        Ok(DockerDaemon { docker, rt })
    }
}

impl ImageDaemon for DockerDaemon {
    fn pull_image(&self, reference: &str, auth: Option<&DaemonAuth>) -> Result<()> {
        let options = CreateImageOptions {
            from_image: reference.to_string(),
            ..Default::default()
        };
        // bollard encodes these into the base64 `X-Registry-Auth` header
        let credentials = auth.map(|auth| DockerCredentials {
            username: Some(auth.username.clone()),
            password: Some(auth.password.clone()),
            serveraddress: Some(auth.server_address.clone()),
            ..Default::default()
        });
        log::info!("Pull {} with docker daemon", reference);
        self.rt.block_on(drain(
            reference,
            self.docker.create_image(Some(options), None, credentials),
        ))
    }

    fn remove_image(&self, id: &str) -> Result<()> {
        let options = RemoveImageOptions {
            force: true,
            noprune: false,
        };
        log::info!("Remove {} with docker daemon", id);
        let deleted = self.rt.block_on(async {
            self.docker
                .remove_image(id, Some(options), None)
                .await
                .map_err(from_bollard)
        })?;
        log::debug!("{} entries removed for {}", deleted.len(), id);
        Ok(())
    }
}

/// Consume the progress stream of a pull
///
/// The pull is only complete once the stream is exhausted. An item carrying an
/// error fails the pull, and the stream is dropped with the connection under it.
async fn drain<S>(reference: &str, stream: S) -> Result<()>
where
    S: Stream<Item = std::result::Result<CreateImageInfo, BollardError>>,
{
    let mut stream = Box::pin(stream);
    while let Some(info) = stream.next().await {
        let info = info.map_err(from_bollard)?;
        if let Some(error) = info.error {
            return Err(from_bollard(BollardError::DockerStreamError { error }));
        }
        if let Some(status) = info.status {
            log::debug!("{}: {}", reference, status);
        }
    }
    Ok(())
}

fn from_bollard(e: BollardError) -> Error {
    match e {
        BollardError::DockerResponseServerError {
            status_code: 404,
            message,
        } => Error::NotFound(message),
        BollardError::DockerResponseServerError {
            status_code: 401 | 403,
            message,
        } => Error::Auth(message),
        BollardError::DockerResponseServerError { message, .. }
        | BollardError::DockerStreamError { error: message }
            if is_auth_failure(&message) =>
        {
            Error::Auth(message)
        }
        e => Error::Daemon(e),
    }
}

/// dockerd reports registry authorization failures as 500 or in-stream errors
fn is_auth_failure(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("unauthorized")
        || message.contains("pull access denied")
        || message.contains("authentication required")
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::cell::Cell;

    #[test]
    fn error_mapping() {
        let e = from_bollard(BollardError::DockerResponseServerError {
            status_code: 404,
            message: "No such image: ubuntu:latest".to_string(),
        });
        assert!(matches!(e, Error::NotFound(_)));

        let e = from_bollard(BollardError::DockerResponseServerError {
            status_code: 500,
            message: "Head \"https://registry.example.com/v2/app/manifests/latest\": unauthorized: authentication required".to_string(),
        });
        assert!(matches!(e, Error::Auth(_)));

        let e = from_bollard(BollardError::DockerStreamError {
            error: "pull access denied for private/app".to_string(),
        });
        assert!(matches!(e, Error::Auth(_)));

        let e = from_bollard(BollardError::DockerResponseServerError {
            status_code: 500,
            message: "driver failed".to_string(),
        });
        assert!(matches!(e, Error::Daemon(_)));
    }

    fn status(status: &str) -> std::result::Result<CreateImageInfo, BollardError> {
        Ok(CreateImageInfo {
            status: Some(status.to_string()),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn drain_consumes_every_item() -> Result<()> {
        let consumed = Cell::new(0);
        let items = vec![
            status("Pulling from library/busybox"),
            status("Pulling fs layer"),
            status("Download complete"),
            status("Digest: sha256:3fbc632167424a6d997e74f52b878d7cc478225cffac6bc977eedfe51c7f4e79"),
            status("Status: Downloaded newer image for busybox:latest"),
        ];
        let total = items.len();
        let stream = stream::iter(items).inspect(|_| consumed.set(consumed.get() + 1));
        drain("docker.io/library/busybox:latest", stream).await?;
        assert_eq!(consumed.get(), total);
        Ok(())
    }

    #[tokio::test]
    async fn drain_fails_on_error_item() {
        let items = vec![
            status("Pulling from private/app"),
            Ok(CreateImageInfo {
                error: Some("pull access denied for private/app, repository does not exist or may require 'docker login'".to_string()),
                ..Default::default()
            }),
            status("never read"),
        ];
        let res = drain("docker.io/private/app:latest", stream::iter(items)).await;
        assert!(matches!(res, Err(Error::Auth(_))));

        let items = vec![
            status("Pulling fs layer"),
            Ok(CreateImageInfo {
                error: Some("failed to register layer: no space left on device".to_string()),
                ..Default::default()
            }),
        ];
        let res = drain("docker.io/library/busybox:latest", stream::iter(items)).await;
        assert!(matches!(
            res,
            Err(Error::Daemon(BollardError::DockerStreamError { .. }))
        ));
    }

    #[tokio::test]
    async fn drain_propagates_transport_error() {
        let items = vec![
            status("Pulling fs layer"),
            Err(BollardError::DockerResponseServerError {
                status_code: 404,
                message: "manifest for busybox:nope not found".to_string(),
            }),
        ];
        let res = drain("docker.io/library/busybox:nope", stream::iter(items)).await;
        assert!(matches!(res, Err(Error::NotFound(_))));

        let items = vec![Err(BollardError::RequestTimeoutError)];
        let res = drain("docker.io/library/busybox:latest", stream::iter(items)).await;
        assert!(matches!(res, Err(Error::Daemon(_))));
    }

    #[tokio::test]
    async fn connect_from_current_thread_runtime() {
        assert!(matches!(DockerDaemon::connect(), Err(Error::AsyncContext)));
    }

    //
    // Following tests need a running docker daemon.
    // These tests are ignored by default.
    //

    #[test]
    #[ignore]
    fn pull_and_remove() -> Result<()> {
        let daemon = DockerDaemon::connect()?;
        daemon.pull_image("docker.io/library/busybox:latest", None)?;
        daemon.remove_image("docker.io/library/busybox:latest")?;
        assert!(matches!(
            daemon.remove_image("docker.io/library/busybox:latest"),
            Err(Error::NotFound(_))
        ));
        Ok(())
    }
}
