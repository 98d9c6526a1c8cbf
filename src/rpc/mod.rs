mod rpc;

pub use rpc::{RateLimitConfig, RpcClient, RpcClientConfig, RpcError};
