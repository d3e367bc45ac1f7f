//! gRPC transport binding the coordinator and worker halves together.

pub mod client;
pub mod convert;
pub mod server;

pub use client::{GrpcCoordinatorClient, GrpcExecutorStub, GrpcStubFactory};
pub use server::{
    CoordinatorRpcServer, CoordinatorRpcService, ExecutorRpcServer, ExecutorRpcService,
};
