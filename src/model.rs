//! Model wrapper: turns raw text into a summary string and hides the
//! inference runtime behind [`SummaryModel`].
//!
//! The runtime is loaded once at startup into a [`ModelHandle`]. A handle that
//! failed to load stays unavailable until the process restarts.

use serde_json::Value;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;

use crate::config::ModelSettings;
use crate::t5::T5Summarizer;

pub const DEFAULT_MAX_LENGTH: usize = 150;
pub const DEFAULT_MIN_LENGTH: usize = 30;

/// Field the runtime puts the generated text under.
const SUMMARY_FIELD: &str = "summary_text";

/// Decoding knobs handed to the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationParams {
    /// Upper bound on generated tokens.
    pub max_length: usize,
    /// Generation may not stop before this many tokens.
    pub min_length: usize,
    /// Greedy decoding when set; sampling otherwise.
    pub deterministic: bool,
}

/// A loaded summarization runtime.
///
/// `infer` returns one JSON record per generated sequence, each carrying a
/// `summary_text` string. Errors cover anything the runtime rejects,
/// including inputs longer than its context window.
pub trait SummaryModel: Send + Sync {
    fn infer(&self, text: &str, params: &GenerationParams) -> anyhow::Result<Vec<Value>>;
}

#[derive(Debug, Clone)]
pub struct SummarizationRequest {
    pub text: Option<String>,
    pub max_length: usize,
    pub min_length: usize,
}

impl SummarizationRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            max_length: DEFAULT_MAX_LENGTH,
            min_length: DEFAULT_MIN_LENGTH,
        }
    }

    pub fn with_lengths(mut self, max_length: usize, min_length: usize) -> Self {
        self.max_length = max_length;
        self.min_length = min_length;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ModelUnavailable,
    InvalidInput,
    MalformedModelOutput,
    InferenceFailure,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::ModelUnavailable => "model_unavailable",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::MalformedModelOutput => "malformed_model_output",
            ErrorKind::InferenceFailure => "inference_failure",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SummarizeError {
    #[error("summarization model not loaded: {0}")]
    ModelUnavailable(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("could not extract summary from model output")]
    MalformedModelOutput,
    #[error("error generating summary: {0}")]
    InferenceFailure(String),
}

impl SummarizeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SummarizeError::ModelUnavailable(_) => ErrorKind::ModelUnavailable,
            SummarizeError::InvalidInput(_) => ErrorKind::InvalidInput,
            SummarizeError::MalformedModelOutput => ErrorKind::MalformedModelOutput,
            SummarizeError::InferenceFailure(_) => ErrorKind::InferenceFailure,
        }
    }
}

pub type SummaryResult = Result<String, SummarizeError>;

/// The process-wide summarization model, built once during startup and
/// shared read-only by every request.
#[derive(Clone)]
pub enum ModelHandle {
    Available(Arc<dyn SummaryModel>),
    Unavailable { reason: Arc<str> },
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelHandle::Available(_) => f.write_str("ModelHandle::Available"),
            ModelHandle::Unavailable { reason } => f
                .debug_struct("ModelHandle::Unavailable")
                .field("reason", reason)
                .finish(),
        }
    }
}

impl ModelHandle {
    pub fn available(model: impl SummaryModel + 'static) -> Self {
        ModelHandle::Available(Arc::new(model))
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        let reason: String = reason.into();
        ModelHandle::Unavailable {
            reason: Arc::from(reason),
        }
    }

    /// Loads the configured model. A failure is logged and yields an
    /// unavailable handle instead of an error, so startup can continue.
    pub async fn initialize(settings: &ModelSettings) -> Self {
        tracing::info!(model_id = %settings.model_id, revision = %settings.revision, "loading summarization model");
        Self::from_load(&settings.model_id, T5Summarizer::load(settings).await)
    }

    /// Turns the outcome of a model load into a handle.
    pub fn from_load<M: SummaryModel + 'static>(model_id: &str, loaded: anyhow::Result<M>) -> Self {
        match loaded {
            Ok(model) => {
                tracing::info!(model_id, "summarization model loaded");
                Self::available(model)
            }
            Err(e) => {
                tracing::error!(
                    model_id,
                    error = ?e,
                    "failed to load summarization model; check network access for the first download and the local model cache"
                );
                Self::unavailable(format!("{e:#}"))
            }
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, ModelHandle::Available(_))
    }

    /// Summarizes `text` with the default length bounds.
    pub fn summarize_text(&self, text: &str) -> SummaryResult {
        self.summarize(&SummarizationRequest::new(text))
    }

    pub fn summarize(&self, request: &SummarizationRequest) -> SummaryResult {
        let model = match self {
            ModelHandle::Available(model) => model,
            ModelHandle::Unavailable { reason } => {
                return Err(SummarizeError::ModelUnavailable(reason.to_string()))
            }
        };

        let text = match request.text.as_deref() {
            Some(text) if !text.trim().is_empty() => text,
            _ => {
                return Err(SummarizeError::InvalidInput(
                    "input text cannot be empty".to_string(),
                ))
            }
        };
        if request.max_length == 0 {
            return Err(SummarizeError::InvalidInput(
                "max_length must be greater than zero".to_string(),
            ));
        }
        if request.min_length > request.max_length {
            return Err(SummarizeError::InvalidInput(format!(
                "min_length ({}) exceeds max_length ({})",
                request.min_length, request.max_length
            )));
        }

        let params = GenerationParams {
            max_length: request.max_length,
            min_length: request.min_length,
            deterministic: true,
        };
        tracing::info!(
            chars = text.chars().count(),
            preview = %preview(text, 100),
            "generating summary"
        );

        let records = match panic::catch_unwind(AssertUnwindSafe(|| model.infer(text, &params))) {
            Ok(Ok(records)) => records,
            Ok(Err(e)) => {
                tracing::error!(error = ?e, "summarization failed");
                return Err(SummarizeError::InferenceFailure(format!("{e:#}")));
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(error = %message, "summarization runtime panicked");
                return Err(SummarizeError::InferenceFailure(message));
            }
        };

        match extract_summary(&records) {
            Some(summary) => {
                tracing::info!(chars = summary.chars().count(), "summary generated");
                Ok(summary.to_string())
            }
            None => {
                tracing::warn!(records = records.len(), "unexpected output format from summarization model");
                Err(SummarizeError::MalformedModelOutput)
            }
        }
    }
}

fn extract_summary(records: &[Value]) -> Option<&str> {
    records.first()?.get(SUMMARY_FIELD)?.as_str()
}

fn preview(text: &str, max_chars: usize) -> String {
    text.trim().chars().take(max_chars).collect()
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "model runtime panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns the first `max_length` words and counts invocations.
    #[derive(Default)]
    struct FirstWords {
        calls: Arc<AtomicUsize>,
    }

    impl SummaryModel for FirstWords {
        fn infer(&self, text: &str, params: &GenerationParams) -> anyhow::Result<Vec<Value>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(params.deterministic);
            let summary = text
                .split_whitespace()
                .take(params.max_length)
                .collect::<Vec<_>>()
                .join(" ");
            Ok(vec![json!({ "summary_text": summary })])
        }
    }

    struct Canned(Vec<Value>);

    impl SummaryModel for Canned {
        fn infer(&self, _text: &str, _params: &GenerationParams) -> anyhow::Result<Vec<Value>> {
            Ok(self.0.clone())
        }
    }

    struct Failing;

    impl SummaryModel for Failing {
        fn infer(&self, _text: &str, _params: &GenerationParams) -> anyhow::Result<Vec<Value>> {
            anyhow::bail!("input of 900 tokens exceeds the context window of 512")
        }
    }

    struct Panicking;

    impl SummaryModel for Panicking {
        fn infer(&self, _text: &str, _params: &GenerationParams) -> anyhow::Result<Vec<Value>> {
            panic!("shape mismatch")
        }
    }

    fn counting() -> (ModelHandle, Arc<AtomicUsize>) {
        let model = FirstWords::default();
        let calls = model.calls.clone();
        (ModelHandle::available(model), calls)
    }

    #[test]
    fn summary_respects_max_length() {
        let (handle, _) = counting();
        let text = "one two three four five six seven eight";
        let request = SummarizationRequest::new(text).with_lengths(3, 1);
        assert_eq!(handle.summarize(&request).unwrap(), "one two three");
    }

    #[test]
    fn blank_or_missing_text_is_invalid_without_inference() {
        let (handle, calls) = counting();
        for text in [Some(""), Some("   "), None] {
            let request = SummarizationRequest {
                text: text.map(str::to_string),
                max_length: DEFAULT_MAX_LENGTH,
                min_length: DEFAULT_MIN_LENGTH,
            };
            let err = handle.summarize(&request).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidInput);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn inverted_bounds_are_invalid() {
        let (handle, calls) = counting();
        let err = handle
            .summarize(&SummarizationRequest::new("some text").with_lengths(10, 20))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        let err = handle
            .summarize(&SummarizationRequest::new("some text").with_lengths(0, 0))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unavailable_model_wins_over_input_checks() {
        let handle = ModelHandle::unavailable("offline");
        assert!(!handle.is_available());
        for text in ["a real paragraph", "", "  "] {
            let err = handle.summarize_text(text).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ModelUnavailable);
        }
    }

    #[test]
    fn repeated_calls_are_identical() {
        let (handle, calls) = counting();
        let text = "The receiving party agrees not to disclose confidential information.";
        let first = handle.summarize_text(text).unwrap();
        let second = handle.summarize_text(text).unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unexpected_output_shapes_are_malformed() {
        let shapes = [
            vec![],
            vec![json!({ "generated_text": "wrong field" })],
            vec![json!({ "summary_text": 42 })],
            vec![json!("bare string")],
        ];
        for records in shapes {
            let handle = ModelHandle::available(Canned(records));
            let err = handle.summarize_text("some text").unwrap_err();
            assert_eq!(err, SummarizeError::MalformedModelOutput);
        }
    }

    #[test]
    fn first_record_is_used() {
        let handle = ModelHandle::available(Canned(vec![
            json!({ "summary_text": "first" }),
            json!({ "summary_text": "second" }),
        ]));
        assert_eq!(handle.summarize_text("some text").unwrap(), "first");
    }

    #[test]
    fn runtime_errors_become_inference_failures() {
        let handle = ModelHandle::available(Failing);
        match handle.summarize_text("some text").unwrap_err() {
            SummarizeError::InferenceFailure(message) => {
                assert!(message.contains("context window"), "{message}")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn runtime_panics_are_contained() {
        let handle = ModelHandle::available(Panicking);
        let err = handle.summarize_text("some text").unwrap_err();
        assert_eq!(err, SummarizeError::InferenceFailure("shape mismatch".to_string()));
    }

    #[test]
    fn failed_load_leaves_model_unavailable() {
        let loaded: anyhow::Result<FirstWords> =
            Err(anyhow::anyhow!("dns error").context("failed to fetch config.json from the model hub"));
        let handle = ModelHandle::from_load("no-such-org/no-such-model", loaded);
        assert!(!handle.is_available());
        match handle.summarize_text("a real paragraph about a contract").unwrap_err() {
            SummarizeError::ModelUnavailable(reason) => {
                assert!(reason.contains("failed to fetch config.json"), "{reason}");
                assert!(reason.contains("dns error"), "{reason}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn successful_load_is_available() {
        let handle = ModelHandle::from_load("t5-small", Ok(FirstWords::default()));
        assert!(handle.is_available());
        assert_eq!(handle.summarize_text("short text").unwrap(), "short text");
    }

    #[test]
    fn new_request_uses_default_bounds() {
        let request = SummarizationRequest::new("hi");
        assert_eq!(request.text.as_deref(), Some("hi"));
        assert_eq!(request.max_length, 150);
        assert_eq!(request.min_length, 30);
    }

    #[test]
    fn error_kinds_display_snake_case() {
        assert_eq!(ErrorKind::MalformedModelOutput.to_string(), "malformed_model_output");
        assert_eq!(
            SummarizeError::ModelUnavailable("offline".into()).kind(),
            ErrorKind::ModelUnavailable
        );
    }
}
