//! In-process worker pool for the chat bot
//!
//! Workers are tokio tasks grouped by kind. Each kind is served by a
//! `TaskProtocol` registered in a `TaskRegistry`; callers go through the
//! typed `WorkerClient` and never see workers or correlation ids.

pub mod client;
pub mod error;
pub mod pool;
pub mod registry;
pub mod runtime;
pub mod services;
pub mod tasks;
pub mod traits;

// Re-export commonly used types
pub use client::WorkerClient;
pub use error::{PoolError, PoolResult, WorkerError, WorkerResult};
pub use pool::{PendingReply, PoolConfig, WorkerDescriptor, WorkerLease, WorkerPool, WorkerState};
pub use registry::TaskRegistry;
pub use runtime::WorkerRuntime;
pub use services::GoogleTranslator;
pub use tasks::{RateLimitProtocol, TranslateConfig, TranslateProtocol};
pub use traits::{TaskProtocol, Translator};
