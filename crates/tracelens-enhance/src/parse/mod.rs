//! Turns a raw trace string into frames.
//!
//! SDKs that structure traces client-side send a JSON array of frames.
//! Anything else is handed to a [`TraceStructurer`], by default
//! [`TextTraceStructurer`].

mod text;

use std::sync::Arc;

use tracing::debug;

use crate::error::{EnhanceError, EnhanceResult, StructureError};
use crate::frame::Frame;

pub use text::TextTraceStructurer;

/// Secondary strategy for traces that are not a JSON frame list.
pub trait TraceStructurer: Send + Sync {
    fn structure(&self, raw: &str) -> Result<Vec<Frame>, StructureError>;
}

/// JSON-first parser with a pluggable fallback.
#[derive(Clone)]
pub struct StackTraceParser {
    fallback: Arc<dyn TraceStructurer>,
}

impl Default for StackTraceParser {
    fn default() -> Self {
        Self::new(Arc::new(TextTraceStructurer))
    }
}

impl StackTraceParser {
    pub fn new(fallback: Arc<dyn TraceStructurer>) -> Self {
        Self { fallback }
    }

    /// Parses `raw` into frames, outermost call last.
    ///
    /// When the fallback succeeds the JSON error is only logged. When both
    /// fail, the error carries both causes and the unmodified input.
    /// Incomplete context fields on a parsed frame are cleared.
    pub fn parse(&self, raw: &str) -> EnhanceResult<Vec<Frame>> {
        let mut frames = self.structure(raw)?;
        frames.iter_mut().for_each(Frame::drop_partial_context);
        Ok(frames)
    }

    fn structure(&self, raw: &str) -> EnhanceResult<Vec<Frame>> {
        let json_error = match serde_json::from_str::<Vec<Frame>>(raw) {
            Ok(frames) => return Ok(frames),
            Err(e) => e,
        };

        match self.fallback.structure(raw) {
            Ok(frames) if !frames.is_empty() => {
                debug!(
                    json_error = %json_error,
                    frames = frames.len(),
                    "trace is not a JSON frame list, structured as text"
                );
                Ok(frames)
            }
            Ok(_) => Err(parse_error(raw, &json_error, &StructureError::NoFrames)),
            Err(e) => Err(parse_error(raw, &json_error, &e)),
        }
    }
}

fn parse_error(raw: &str, json: &serde_json::Error, fallback: &StructureError) -> EnhanceError {
    EnhanceError::Parse {
        raw: raw.to_owned(),
        message: format!("not a JSON frame list ({json}); text fallback: {fallback}"),
    }
}
