pub mod checkpoint;
pub mod gateway;
pub mod pipeline;
pub mod rpc;
pub mod runtime;

pub use checkpoint::{Checkpoint, CheckpointStore, FileCheckpointStore, StoreError};
pub use gateway::{
    ChainGateway, EthGateway, EthGatewayParams, GatewayError, PendingEvent, ResponseConfirmation,
};
pub use pipeline::{BlockQueue, DriverParams, PipelineDriver, ProgressTracker};
pub use rpc::{retry_with_policy, EthRpcClient, RetryPolicy, RpcClientOptions, RpcError};
pub use runtime::config::{RelayConfig, RelayConfigBuilder, RelayConfigParams};
pub use runtime::runner::Runner;
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
