pub mod config;
pub mod decoder;
pub mod encoder;
pub mod process;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod types;
pub mod value;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports
pub use config::{BridgeConfig, CONTAINER_INCLUDES, ConfigError, KernelSpec};
pub use decoder::{DecodeError, Decoder, decode};
pub use encoder::{EncodeError, Encoded, EncodedStatement, SkipReason, encode};
pub use process::{EngineCommand, KERNEL_ENV, LANGUAGE_ENV, ProcessTransport};
pub use session::{PullReport, PushReport, Session, Skipped};
pub use transport::{
    ExecOptions, Response, ResponseKind, RetryPolicy, Transport, TransportError,
};
pub use types::{Classified, Unrepresentable, classify};
pub use value::{HostValue, LongDouble, NdArray, Scalar, ScalarKind, Table};
