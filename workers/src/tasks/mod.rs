//! Task protocols run inside workers

pub mod ratelimit;
pub mod translate;

pub use ratelimit::{partition_countdowns, process_batch, RateLimitProtocol};
pub use translate::{default_translate_timeout, TranslateConfig, TranslateProtocol};
