//! Worker kind → task protocol registry
//!
//! New worker kinds are added by registering a factory, never by editing a
//! match on kind names.

use std::collections::HashMap;
use std::sync::Arc;

use crate::tasks::{RateLimitProtocol, TranslateConfig, TranslateProtocol};
use crate::traits::{TaskProtocol, Translator};
use shared::WorkerKind;

/// Builds a fresh protocol instance for every new worker
pub type ProtocolFactory = Arc<dyn Fn() -> Box<dyn TaskProtocol> + Send + Sync>;

#[derive(Clone, Default)]
pub struct TaskRegistry {
    factories: HashMap<WorkerKind, ProtocolFactory>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the translate and rate-limit protocols
    pub fn with_defaults(translator: Arc<dyn Translator>, translate_config: TranslateConfig) -> Self {
        Self::new()
            .register(WorkerKind::TRANSLATE, move || {
                Box::new(TranslateProtocol::new(translator.clone(), translate_config.clone()))
            })
            .register(WorkerKind::RATE_LIMIT, || Box::new(RateLimitProtocol::new()))
    }

    /// Register (or replace) the protocol factory for `kind` (fluent API)
    pub fn register<F>(mut self, kind: WorkerKind, factory: F) -> Self
    where
        F: Fn() -> Box<dyn TaskProtocol> + Send + Sync + 'static,
    {
        self.factories.insert(kind, Arc::new(factory));
        self
    }

    pub fn factory(&self, kind: &WorkerKind) -> Option<ProtocolFactory> {
        self.factories.get(kind).cloned()
    }

    pub fn contains(&self, kind: &WorkerKind) -> bool {
        self.factories.contains_key(kind)
    }

    pub fn kinds(&self) -> Vec<WorkerKind> {
        let mut kinds: Vec<_> = self.factories.keys().cloned().collect();
        kinds.sort();
        kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::MockTranslator;

    #[test]
    fn test_defaults_register_both_kinds() {
        let registry = TaskRegistry::with_defaults(Arc::new(MockTranslator::new()), TranslateConfig::default());
        assert_eq!(registry.kinds(), vec![WorkerKind::RATE_LIMIT, WorkerKind::TRANSLATE]);

        let protocol = registry.factory(&WorkerKind::TRANSLATE).unwrap()();
        assert_eq!(protocol.kind(), WorkerKind::TRANSLATE);
    }

    #[test]
    fn test_unregistered_kind_has_no_factory() {
        let registry = TaskRegistry::new();
        assert!(!registry.contains(&WorkerKind::new("ocr")));
        assert!(registry.factory(&WorkerKind::new("ocr")).is_none());
    }
}
