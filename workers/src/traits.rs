//! Trait definitions for the worker layer
//!
//! `TaskProtocol` is the seam every worker kind implements; `Translator` is
//! the network backend behind the translate protocol and carries a mockall
//! mock for tests.

use async_trait::async_trait;

use crate::error::WorkerResult;
use shared::WorkerKind;

/// Request handler run inside a worker
///
/// One instance lives inside exactly one worker, so `&mut self` state (such
/// as a cache) is private to that worker. Messages are handled strictly in
/// arrival order.
#[async_trait]
pub trait TaskProtocol: Send + 'static {
    /// Kind this protocol serves
    fn kind(&self) -> WorkerKind;

    /// Handle one task payload and produce the reply payload
    async fn handle(&mut self, payload: serde_json::Value) -> WorkerResult<serde_json::Value>;
}

/// Text translation backend
#[mockall::automock]
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `text` from language `from` into language `to`
    ///
    /// # Returns
    /// The translated text, or a `WorkerError::Translation` describing the
    /// network or decoding failure
    async fn translate(&self, text: &str, from: &str, to: &str) -> WorkerResult<String>;
}
