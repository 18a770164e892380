//! Progress-callback trait for extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to follow a
//! run as it moves from text extraction through each model attempt. The CLI
//! uses it to drive its spinner.
//!
//! # Example
//!
//! ```rust
//! use edgequake_invoice2json::{ExtractionConfig, ExtractionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicU32, Ordering}};
//!
//! struct AttemptCounter(AtomicU32);
//!
//! impl ExtractionProgressCallback for AttemptCounter {
//!     fn on_attempt_start(&self, attempt: u32, max_attempts: u32) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("attempt {attempt}/{max_attempts}");
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(Arc::new(AttemptCounter(AtomicU32::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline at each stage boundary.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Text extraction finished.
    ///
    /// # Arguments
    /// * `page_count` — pages in the document
    /// * `chars`      — characters of cleaned text, before truncation
    fn on_text_extracted(&self, page_count: usize, chars: usize) {
        let _ = (page_count, chars);
    }

    /// A model attempt is about to be sent (`attempt` is 1-indexed).
    fn on_attempt_start(&self, attempt: u32, max_attempts: u32) {
        let _ = (attempt, max_attempts);
    }

    /// An attempt was rejected; `error` is the text fed into the next prompt.
    fn on_attempt_failed(&self, attempt: u32, max_attempts: u32, error: &str) {
        let _ = (attempt, max_attempts, error);
    }

    /// A record validated on `attempts`.
    fn on_extraction_complete(&self, attempts: u32, field_count: usize) {
        let _ = (attempts, field_count);
    }
}

/// A no-op implementation; the default when no callback is configured.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl ExtractionProgressCallback for Recorder {
        fn on_text_extracted(&self, page_count: usize, chars: usize) {
            self.events.lock().unwrap().push(format!("text {page_count} {chars}"));
        }

        fn on_attempt_failed(&self, attempt: u32, _max: u32, error: &str) {
            self.events.lock().unwrap().push(format!("fail {attempt} {error}"));
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_text_extracted(2, 100);
        cb.on_attempt_start(1, 3);
        cb.on_attempt_failed(1, 3, "boom");
        cb.on_extraction_complete(2, 5);
    }

    #[test]
    fn overridden_methods_receive_events() {
        let rec = Recorder::default();
        rec.on_text_extracted(1, 42);
        rec.on_attempt_start(1, 3);
        rec.on_attempt_failed(1, 3, "missing required field 'total'");
        let events = rec.events.lock().unwrap();
        assert_eq!(
            *events,
            vec!["text 1 42", "fail 1 missing required field 'total'"]
        );
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_attempt_start(1, 1);
    }
}
