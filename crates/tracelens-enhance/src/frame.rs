//! Stack frame model shared with the error-display layer.

use serde::{Deserialize, Serialize};

use crate::window::ContextWindow;

/// One entry of a stack trace.
///
/// `line_content`, `lines_before` and `lines_after` are either all set or all
/// absent. [`Frame::with_context`] sets them together and
/// [`Frame::drop_partial_context`] clears an incomplete set from input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_number: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_number: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Opaque source-map diagnostics attached by the SDK.
    #[serde(
        default,
        alias = "sourceMappingErrorMetadata",
        skip_serializing_if = "Option::is_none"
    )]
    pub source_mapping_metadata: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_content: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lines_before: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lines_after: Option<String>,
}

impl Frame {
    /// File and line, if both are present.
    #[must_use]
    pub fn location(&self) -> Option<(&str, i64)> {
        match (&self.file_name, self.line_number) {
            (Some(file), Some(line)) => Some((file.as_str(), line)),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_enhanced(&self) -> bool {
        self.line_content.is_some()
    }

    /// Clears the context fields unless all three are present.
    pub fn drop_partial_context(&mut self) {
        let complete = self.line_content.is_some()
            && self.lines_before.is_some()
            && self.lines_after.is_some();
        if !complete {
            self.line_content = None;
            self.lines_before = None;
            self.lines_after = None;
        }
    }

    /// Builds the enhanced copy of this frame.
    ///
    /// Only the identifying fields are carried over; anything a previous
    /// enhancement attached is replaced by `context`.
    #[must_use]
    pub fn with_context(&self, context: ContextWindow) -> Self {
        Self {
            file_name: self.file_name.clone(),
            line_number: self.line_number,
            column_number: self.column_number,
            function_name: self.function_name.clone(),
            error: self.error.clone(),
            source_mapping_metadata: self.source_mapping_metadata.clone(),
            line_content: Some(context.line_content),
            lines_before: Some(context.lines_before),
            lines_after: Some(context.lines_after),
        }
    }
}
