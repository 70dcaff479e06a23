//! RPC call model and the server interceptor pipelines built over it.

pub mod call;
pub mod interceptors;
pub mod middleware;
pub mod status;

pub use call::{Call, MethodPath, RpcFuture};
pub use interceptors::{compose_interceptors, ServerInterceptorsOptions};
pub use status::{Code, Status};
