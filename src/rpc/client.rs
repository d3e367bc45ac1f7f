use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tonic::metadata::{Ascii, MetadataValue};
use tonic::transport::{Channel, Endpoint};
use tonic::Request;

use crate::coordinator::{ExecutorStubFactory, RemoteExecutor};
use crate::error::{DispatchError, Result};
use crate::model::{HandleCallbackParam, ResultEnvelope, TriggerMessage};
use crate::proto::coordinator_service_client::CoordinatorServiceClient;
use crate::proto::executor_service_client::ExecutorServiceClient;
use crate::rpc::convert;
use crate::worker::CoordinatorClient;

pub const ACCESS_TOKEN_HEADER: &str = "access-token";

fn lazy_channel(address: &str, timeout: Duration) -> Result<Channel> {
    let endpoint = Endpoint::from_shared(format!("http://{address}"))?
        .timeout(timeout)
        .connect_timeout(timeout);
    Ok(endpoint.connect_lazy())
}

fn token_value(access_token: &str) -> Option<MetadataValue<Ascii>> {
    if access_token.is_empty() {
        return None;
    }
    match access_token.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Access token is not valid header material, sending without it");
            None
        }
    }
}

fn authed<T>(message: T, token: &Option<MetadataValue<Ascii>>) -> Request<T> {
    let mut request = Request::new(message);
    if let Some(token) = token {
        request
            .metadata_mut()
            .insert(ACCESS_TOKEN_HEADER, token.clone());
    }
    request
}

/// Executor stub bound to one worker address. The channel connects lazily,
/// so construction never blocks; the per-call timeout lives on the endpoint.
pub struct GrpcExecutorStub {
    client: ExecutorServiceClient<Channel>,
    token: Option<MetadataValue<Ascii>>,
}

impl GrpcExecutorStub {
    pub fn connect_lazy(address: &str, access_token: &str, timeout: Duration) -> Result<Self> {
        let channel = lazy_channel(address, timeout)?;
        Ok(Self {
            client: ExecutorServiceClient::new(channel),
            token: token_value(access_token),
        })
    }
}

#[async_trait]
impl RemoteExecutor for GrpcExecutorStub {
    async fn run(&self, message: &TriggerMessage) -> Result<ResultEnvelope<String>> {
        let request = convert::trigger_request_from_message(message);
        let reply = self
            .client
            .clone()
            .run(authed(request, &self.token))
            .await?;
        Ok(convert::envelope_from_reply(reply.into_inner()))
    }

    async fn beat(&self) -> Result<ResultEnvelope<String>> {
        let reply = self
            .client
            .clone()
            .beat(authed(crate::proto::BeatRequest {}, &self.token))
            .await?;
        Ok(convert::envelope_from_reply(reply.into_inner()))
    }

    async fn idle_beat(&self, job_id: i32) -> Result<ResultEnvelope<String>> {
        let reply = self
            .client
            .clone()
            .idle_beat(authed(crate::proto::IdleBeatRequest { job_id }, &self.token))
            .await?;
        Ok(convert::envelope_from_reply(reply.into_inner()))
    }
}

/// Stub used when an address cannot even form an endpoint; every call fails
/// with the construction error so routing sees the address as unhealthy.
struct UnreachableStub {
    error: String,
}

#[async_trait]
impl RemoteExecutor for UnreachableStub {
    async fn run(&self, _message: &TriggerMessage) -> Result<ResultEnvelope<String>> {
        Err(DispatchError::Remote(self.error.clone()))
    }

    async fn beat(&self) -> Result<ResultEnvelope<String>> {
        Err(DispatchError::Remote(self.error.clone()))
    }

    async fn idle_beat(&self, _job_id: i32) -> Result<ResultEnvelope<String>> {
        Err(DispatchError::Remote(self.error.clone()))
    }
}

/// Default stub factory backing the coordinator's stub cache.
#[derive(Default)]
pub struct GrpcStubFactory;

impl ExecutorStubFactory for GrpcStubFactory {
    fn new_stub(
        &self,
        address: &str,
        access_token: &str,
        timeout: Duration,
    ) -> Arc<dyn RemoteExecutor> {
        match GrpcExecutorStub::connect_lazy(address, access_token, timeout) {
            Ok(stub) => Arc::new(stub),
            Err(e) => {
                tracing::warn!(address, error = %e, "Executor stub construction failed");
                Arc::new(UnreachableStub {
                    error: e.to_string(),
                })
            }
        }
    }
}

/// Worker-to-coordinator client bound to one coordinator address.
pub struct GrpcCoordinatorClient {
    client: CoordinatorServiceClient<Channel>,
    token: Option<MetadataValue<Ascii>>,
}

impl GrpcCoordinatorClient {
    pub fn connect_lazy(address: &str, access_token: &str, timeout: Duration) -> Result<Self> {
        let channel = lazy_channel(address, timeout)?;
        Ok(Self {
            client: CoordinatorServiceClient::new(channel),
            token: token_value(access_token),
        })
    }
}

#[async_trait]
impl CoordinatorClient for GrpcCoordinatorClient {
    async fn callback(&self, items: &[HandleCallbackParam]) -> Result<ResultEnvelope<()>> {
        let request = crate::proto::CallbackRequest {
            items: items.iter().map(convert::callback_item_from_param).collect(),
        };
        let reply = self
            .client
            .clone()
            .callback(authed(request, &self.token))
            .await?;
        Ok(convert::envelope_from_reply(reply.into_inner()))
    }

    async fn registry(&self, app_name: &str, address: &str) -> Result<ResultEnvelope<()>> {
        let request = crate::proto::RegistryRequest {
            app_name: app_name.to_string(),
            address: address.to_string(),
        };
        let reply = self
            .client
            .clone()
            .registry(authed(request, &self.token))
            .await?;
        Ok(convert::envelope_from_reply(reply.into_inner()))
    }

    async fn registry_remove(&self, app_name: &str, address: &str) -> Result<ResultEnvelope<()>> {
        let request = crate::proto::RegistryRequest {
            app_name: app_name.to_string(),
            address: address.to_string(),
        };
        let reply = self
            .client
            .clone()
            .registry_remove(authed(request, &self.token))
            .await?;
        Ok(convert::envelope_from_reply(reply.into_inner()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_address_is_a_transport_error() {
        let err = lazy_channel("bad address", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, DispatchError::Transport(_)));
    }

    #[test]
    fn blank_token_is_omitted() {
        assert!(token_value("").is_none());
        assert!(token_value("secret").is_some());
    }
}
