//! gRPC service implementations for volshared.

use std::pin::Pin;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use tonic::{Request, Response, Status};
use volshare::health::{HealthError, HealthReporter, ServingStatus};
use volshare::share::{ShareController, ShareError, ShareResult};

// Include generated protobuf code
#[allow(missing_docs, clippy::pedantic, clippy::nursery)]
pub mod volshare_proto {
    tonic::include_proto!("volshare.v1");
}

#[allow(missing_docs, clippy::pedantic, clippy::nursery)]
pub mod health_proto {
    tonic::include_proto!("grpc.health.v1");
}

use health_proto::health_check_response::ServingStatus as ProtoServingStatus;
use health_proto::health_server::{Health, HealthServer};
use health_proto::{HealthCheckRequest, HealthCheckResponse, HealthListRequest, HealthListResponse};
use volshare_proto::share_manager_service_server::{
    ShareManagerService, ShareManagerServiceServer,
};
use volshare_proto::{Empty, FilesystemTrimRequest};

/// Map a share operation failure to its gRPC status.
pub fn share_status(err: ShareError) -> Status {
    match err {
        ShareError::FailedPrecondition { message } => Status::failed_precondition(message),
        ShareError::InvalidArgument { message } => Status::invalid_argument(message),
        ShareError::Internal { message } => Status::internal(message),
    }
}

/// Share manager service backed by a [`ShareController`].
pub struct ShareManagerServiceImpl {
    controller: Arc<ShareController>,
}

impl ShareManagerServiceImpl {
    /// Create a new service for `controller`.
    pub const fn new(controller: Arc<ShareController>) -> Self {
        Self { controller }
    }

    /// Run a blocking controller operation off the async workers.
    async fn run<F>(&self, operation: &'static str, f: F) -> Result<Response<Empty>, Status>
    where
        F: FnOnce(&ShareController) -> ShareResult<()> + Send + 'static,
    {
        let controller = Arc::clone(&self.controller);
        tokio::task::spawn_blocking(move || f(&controller))
            .await
            .map_err(|e| Status::internal(format!("{operation} task failed: {e}")))?
            .map_err(share_status)?;

        Ok(Response::new(Empty {}))
    }
}

#[tonic::async_trait]
impl ShareManagerService for ShareManagerServiceImpl {
    async fn mount(&self, _request: Request<Empty>) -> Result<Response<Empty>, Status> {
        tracing::debug!("Mount requested via gRPC");
        self.run("mount", ShareController::mount).await
    }

    async fn unmount(&self, _request: Request<Empty>) -> Result<Response<Empty>, Status> {
        tracing::debug!("Unmount requested via gRPC");
        self.run("unmount", ShareController::unmount).await
    }

    async fn filesystem_resize(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<Empty>, Status> {
        tracing::debug!("Filesystem resize requested via gRPC");
        self.run("filesystem resize", ShareController::filesystem_resize)
            .await
    }

    async fn filesystem_trim(
        &self,
        request: Request<FilesystemTrimRequest>,
    ) -> Result<Response<Empty>, Status> {
        let encrypted_device = request.into_inner().encrypted_device;
        tracing::debug!(encrypted_device, "Filesystem trim requested via gRPC");
        self.run("filesystem trim", move |controller| {
            controller.filesystem_trim(encrypted_device)
        })
        .await
    }
}

fn health_response(status: ServingStatus) -> HealthCheckResponse {
    let status = match status {
        ServingStatus::Serving => ProtoServingStatus::Serving,
        ServingStatus::NotServing => ProtoServingStatus::NotServing,
    };
    HealthCheckResponse {
        status: status.into(),
    }
}

fn health_status(err: HealthError) -> Status {
    Status::unavailable(err.to_string())
}

/// Health service backed by a [`HealthReporter`].
pub struct HealthServiceImpl {
    reporter: HealthReporter,
}

impl HealthServiceImpl {
    /// Create a new health service.
    pub const fn new(reporter: HealthReporter) -> Self {
        Self { reporter }
    }
}

#[tonic::async_trait]
impl Health for HealthServiceImpl {
    async fn check(
        &self,
        _request: Request<HealthCheckRequest>,
    ) -> Result<Response<HealthCheckResponse>, Status> {
        let status = self.reporter.check().map_err(health_status)?;
        Ok(Response::new(health_response(status)))
    }

    async fn list(
        &self,
        _request: Request<HealthListRequest>,
    ) -> Result<Response<HealthListResponse>, Status> {
        let statuses = self
            .reporter
            .list()
            .map_err(health_status)?
            .into_iter()
            .map(|(service, status)| (service, health_response(status)))
            .collect();
        Ok(Response::new(HealthListResponse { statuses }))
    }

    type WatchStream =
        Pin<Box<dyn Stream<Item = Result<HealthCheckResponse, Status>> + Send>>;

    async fn watch(
        &self,
        _request: Request<HealthCheckRequest>,
    ) -> Result<Response<Self::WatchStream>, Status> {
        tracing::debug!("Health watch started");
        let stream = self
            .reporter
            .watch()
            .map(|status| Ok(health_response(status)));
        Ok(Response::new(Box::pin(stream)))
    }
}

/// Create the share manager gRPC server.
pub fn share_server(
    controller: Arc<ShareController>,
) -> ShareManagerServiceServer<ShareManagerServiceImpl> {
    ShareManagerServiceServer::new(ShareManagerServiceImpl::new(controller))
}

/// Create the health gRPC server.
pub fn health_server(reporter: HealthReporter) -> HealthServer<HealthServiceImpl> {
    HealthServer::new(HealthServiceImpl::new(reporter))
}
