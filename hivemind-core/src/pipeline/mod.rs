//! Content safety pipeline
//!
//! Two gates run before any contribution is stored:
//! 1. [`injection::InjectionScanner`] — rejects prompt-injection payloads on
//!    the RAW text, before redaction can mask the patterns.
//! 2. [`pii::PiiSanitizer`] — strips PII and secrets with markdown code-block
//!    preservation, and rejects contributions that are mostly redaction.
//!
//! Both are process-wide singletons: built once at startup, immutable after.

pub mod injection;
pub mod pii;

pub use injection::InjectionScanner;
pub use pii::PiiSanitizer;
