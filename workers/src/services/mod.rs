//! External service implementations

pub mod google_translator;

pub use google_translator::GoogleTranslator;
