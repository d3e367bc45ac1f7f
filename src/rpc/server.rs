use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tonic::{Request, Response, Status};

use crate::coordinator::{CallbackSink, WorkerRegistry};
use crate::proto::coordinator_service_server::{CoordinatorService, CoordinatorServiceServer};
use crate::proto::executor_service_server::{ExecutorService, ExecutorServiceServer};
use crate::proto::{
    BeatRequest, CallbackRequest, IdleBeatRequest, RegistryRequest, RpcReply, TriggerRequest,
};
use crate::rpc::client::ACCESS_TOKEN_HEADER;
use crate::rpc::convert;
use crate::worker::WorkerRuntime;

/// Reject the call unless it carries the expected access token. An empty
/// expected token disables the check.
fn check_token<T>(request: &Request<T>, expected: &str) -> Result<(), Status> {
    if expected.is_empty() {
        return Ok(());
    }
    let presented = request
        .metadata()
        .get(ACCESS_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());
    if presented == Some(expected) {
        Ok(())
    } else {
        Err(Status::unauthenticated("access token mismatch"))
    }
}

/// Worker-side gRPC surface: run, beat and idle-beat.
pub struct ExecutorRpcService {
    runtime: Arc<WorkerRuntime>,
    access_token: String,
}

impl ExecutorRpcService {
    pub fn new(runtime: Arc<WorkerRuntime>, access_token: impl Into<String>) -> Self {
        Self {
            runtime,
            access_token: access_token.into(),
        }
    }
}

#[tonic::async_trait]
impl ExecutorService for ExecutorRpcService {
    async fn run(&self, request: Request<TriggerRequest>) -> Result<Response<RpcReply>, Status> {
        check_token(&request, &self.access_token)?;
        let message = convert::message_from_trigger_request(request.into_inner());
        tracing::debug!(job_id = message.job_id, log_id = message.log_id, "Received run");

        let env = self.runtime.receive_trigger(message);
        Ok(Response::new(convert::reply_from_envelope(&env)))
    }

    async fn beat(&self, request: Request<BeatRequest>) -> Result<Response<RpcReply>, Status> {
        check_token(&request, &self.access_token)?;
        Ok(Response::new(convert::reply_from_envelope(
            &self.runtime.beat(),
        )))
    }

    async fn idle_beat(
        &self,
        request: Request<IdleBeatRequest>,
    ) -> Result<Response<RpcReply>, Status> {
        check_token(&request, &self.access_token)?;
        let req = request.into_inner();
        Ok(Response::new(convert::reply_from_envelope(
            &self.runtime.idle_beat(req.job_id),
        )))
    }
}

/// Coordinator-side gRPC surface: the callback and registry sinks.
pub struct CoordinatorRpcService {
    callback_sink: Arc<CallbackSink>,
    worker_registry: Arc<WorkerRegistry>,
    access_token: String,
}

impl CoordinatorRpcService {
    pub fn new(
        callback_sink: Arc<CallbackSink>,
        worker_registry: Arc<WorkerRegistry>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            callback_sink,
            worker_registry,
            access_token: access_token.into(),
        }
    }
}

#[tonic::async_trait]
impl CoordinatorService for CoordinatorRpcService {
    async fn callback(
        &self,
        request: Request<CallbackRequest>,
    ) -> Result<Response<RpcReply>, Status> {
        check_token(&request, &self.access_token)?;
        let items: Vec<_> = request
            .into_inner()
            .items
            .into_iter()
            .map(convert::param_from_callback_item)
            .collect();
        tracing::debug!(count = items.len(), "Received callback batch");

        let env = self.callback_sink.receive_callback(items).await;
        Ok(Response::new(convert::reply_from_envelope(&env)))
    }

    async fn registry(
        &self,
        request: Request<RegistryRequest>,
    ) -> Result<Response<RpcReply>, Status> {
        check_token(&request, &self.access_token)?;
        let req = request.into_inner();
        self.worker_registry.registry(&req.app_name, &req.address);
        Ok(Response::new(RpcReply {
            code: crate::model::SUCCESS_CODE,
            msg: String::new(),
        }))
    }

    async fn registry_remove(
        &self,
        request: Request<RegistryRequest>,
    ) -> Result<Response<RpcReply>, Status> {
        check_token(&request, &self.access_token)?;
        let req = request.into_inner();
        self.worker_registry
            .registry_remove(&req.app_name, &req.address);
        Ok(Response::new(RpcReply {
            code: crate::model::SUCCESS_CODE,
            msg: String::new(),
        }))
    }
}

/// Serves the worker's executor surface until `cancel` fires.
pub struct ExecutorRpcServer {
    addr: SocketAddr,
    service: ExecutorRpcService,
}

impl ExecutorRpcServer {
    pub fn new(addr: SocketAddr, runtime: Arc<WorkerRuntime>, access_token: &str) -> Self {
        Self {
            addr,
            service: ExecutorRpcService::new(runtime, access_token),
        }
    }

    pub async fn run(self, cancel: CancellationToken) -> Result<(), tonic::transport::Error> {
        tracing::info!(addr = %self.addr, "Starting executor gRPC server");
        Server::builder()
            .add_service(ExecutorServiceServer::new(self.service))
            .serve_with_shutdown(self.addr, cancel.cancelled_owned())
            .await
    }
}

/// Serves the coordinator's callback and registry sinks until `cancel`
/// fires.
pub struct CoordinatorRpcServer {
    addr: SocketAddr,
    service: CoordinatorRpcService,
}

impl CoordinatorRpcServer {
    pub fn new(
        addr: SocketAddr,
        callback_sink: Arc<CallbackSink>,
        worker_registry: Arc<WorkerRegistry>,
        access_token: &str,
    ) -> Self {
        Self {
            addr,
            service: CoordinatorRpcService::new(callback_sink, worker_registry, access_token),
        }
    }

    pub async fn run(self, cancel: CancellationToken) -> Result<(), tonic::transport::Error> {
        tracing::info!(addr = %self.addr, "Starting coordinator gRPC server");
        Server::builder()
            .add_service(CoordinatorServiceServer::new(self.service))
            .serve_with_shutdown(self.addr, cancel.cancelled_owned())
            .await
    }
}
