//! Mapping of Docker Engine API failures onto [`SkiffError`].

use bollard::errors::Error as DockerError;
use skiff_common::error::is_removal_in_progress_message;
use skiff_common::SkiffError;

/// Whether the failure happened before the engine answered.
fn is_transport(err: &DockerError) -> bool {
    matches!(
        err,
        DockerError::IOError { .. }
            | DockerError::HyperResponseError { .. }
            | DockerError::RequestTimeoutError
            | DockerError::SocketNotFoundError(_)
    )
}

/// Status and reason of an engine rejection.
fn rejection(err: &DockerError) -> Option<(u16, &str)> {
    match err {
        DockerError::DockerResponseServerError {
            status_code,
            message,
        } => Some((*status_code, message.as_str())),
        _ => None,
    }
}

/// Whether the engine answered 404.
pub(crate) fn is_not_found(err: &DockerError) -> bool {
    matches!(rejection(err), Some((404, _)))
}

/// Translate a failure without a more specific category.
pub(crate) fn engine_error(err: DockerError, endpoint: &str, operation: &str) -> SkiffError {
    if is_transport(&err) {
        return SkiffError::EngineUnreachable {
            endpoint: endpoint.to_string(),
            message: err.to_string(),
        };
    }
    match err {
        DockerError::DockerResponseServerError {
            status_code,
            message,
        } => SkiffError::Engine {
            operation: operation.to_string(),
            status: status_code,
            message,
        },
        other => SkiffError::Engine {
            operation: operation.to_string(),
            status: 0,
            message: other.to_string(),
        },
    }
}

/// Translate a failure of an operation on container `id`.
pub(crate) fn container_error(
    err: DockerError,
    endpoint: &str,
    operation: &str,
    id: &str,
) -> SkiffError {
    match rejection(&err) {
        Some((404, _)) => SkiffError::ContainerNotFound { id: id.to_string() },
        Some((409, message)) if is_removal_in_progress_message(id, message) => {
            SkiffError::RemovalInProgress { id: id.to_string() }
        }
        _ => engine_error(err, endpoint, operation),
    }
}

/// Translate a failure while creating or starting a container from `image`.
pub(crate) fn create_error(err: DockerError, endpoint: &str, image: &str) -> SkiffError {
    if is_transport(&err) {
        return engine_error(err, endpoint, "create container");
    }
    SkiffError::ContainerCreateFailed {
        image: image.to_string(),
        message: reason(err),
    }
}

/// Translate a failure while pulling or building `reference`.
pub(crate) fn image_error(err: DockerError, endpoint: &str, reference: &str) -> SkiffError {
    if is_transport(&err) {
        return engine_error(err, endpoint, "create image");
    }
    SkiffError::ImageBuildFailed {
        reference: reference.to_string(),
        message: reason(err),
    }
}

/// Translate a failure while creating or deleting `network`.
pub(crate) fn network_error(err: DockerError, endpoint: &str, network: &str) -> SkiffError {
    if is_transport(&err) {
        return engine_error(err, endpoint, "network");
    }
    SkiffError::NetworkOperationFailed {
        network: network.to_string(),
        message: reason(err),
    }
}

fn reason(err: DockerError) -> String {
    match err {
        DockerError::DockerResponseServerError { message, .. } => message,
        DockerError::DockerStreamError { error } => error,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENDPOINT: &str = "unix:///var/run/docker.sock";

    fn server(status_code: u16, message: &str) -> DockerError {
        DockerError::DockerResponseServerError {
            status_code,
            message: message.to_string(),
        }
    }

    #[test]
    fn missing_container_is_not_found() {
        let err = container_error(server(404, "No such container: abc"), ENDPOINT, "start", "abc");
        assert!(matches!(err, SkiffError::ContainerNotFound { id } if id == "abc"));
    }

    #[test]
    fn removal_race_becomes_structured() {
        let err = container_error(
            server(409, "removal of container abc is already in progress"),
            ENDPOINT,
            "remove container",
            "abc",
        );
        assert!(err.is_removal_in_progress());
    }

    #[test]
    fn other_conflicts_pass_through() {
        let err = container_error(
            server(409, "You cannot remove a running container abc"),
            ENDPOINT,
            "remove container",
            "abc",
        );
        assert!(matches!(
            err,
            SkiffError::Engine { status: 409, ref message, .. } if message.contains("running container")
        ));

        let err = container_error(
            server(409, "removal of container other is already in progress"),
            ENDPOINT,
            "remove container",
            "abc",
        );
        assert!(!err.is_removal_in_progress());
    }

    #[test]
    fn io_failures_are_unreachable() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = container_error(DockerError::IOError { err: io }, ENDPOINT, "inspect", "abc");
        assert!(matches!(err, SkiffError::EngineUnreachable { endpoint, .. } if endpoint == ENDPOINT));
    }

    #[test]
    fn category_errors_keep_engine_reason() {
        let err = image_error(server(404, "pull access denied"), ENDPOINT, "private/app:1");
        assert!(matches!(
            err,
            SkiffError::ImageBuildFailed { ref reference, ref message }
                if reference == "private/app:1" && message == "pull access denied"
        ));

        let err = create_error(server(400, "invalid mount"), ENDPOINT, "nginx:latest");
        assert!(matches!(err, SkiffError::ContainerCreateFailed { .. }));

        let err = network_error(server(409, "network exists"), ENDPOINT, "testnet");
        assert!(matches!(err, SkiffError::NetworkOperationFailed { .. }));
    }
}
