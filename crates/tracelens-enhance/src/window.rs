//! Source lines surrounding a frame's target line.

/// Default number of lines shown on each side of the target line.
pub const DEFAULT_CONTEXT_LINES: usize = 5;

/// The lines around a 1-indexed target line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextWindow {
    pub line_content: String,
    /// Up to `radius` lines before the target, newline-joined.
    pub lines_before: String,
    /// Up to `radius` lines after the target, newline-joined.
    pub lines_after: String,
}

/// Extracts the window `[max(1, line - radius), min(len, line + radius)]`.
///
/// Returns `None` when `line` is 0 or past the end of `lines`; the frame is
/// then left as it was.
#[must_use]
pub fn extract_context(lines: &[&str], line: usize, radius: usize) -> Option<ContextWindow> {
    if line == 0 || line > lines.len() {
        return None;
    }

    let target = line - 1;
    let start = target.saturating_sub(radius);
    let end = target.saturating_add(radius).min(lines.len() - 1);

    Some(ContextWindow {
        line_content: lines[target].to_owned(),
        lines_before: lines[start..target].join("\n"),
        lines_after: lines[target + 1..=end].join("\n"),
    })
}
