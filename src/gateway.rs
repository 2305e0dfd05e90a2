//! Chain gateway façade: the trait seam consumed by the driver plus the
//! Ethereum implementation over JSON-RPC.

pub mod eth;
pub mod types;

pub use eth::{EthGateway, EthGatewayParams};
pub use types::{ChainGateway, GatewayError, PendingEvent, ResponseConfirmation};
