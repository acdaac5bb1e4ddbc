//! Frame extraction from plain-text traces.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::TraceStructurer;
use crate::error::StructureError;
use crate::frame::Frame;

/// Compiled frame patterns.
struct FramePatterns {
    /// `File "app/main.py", line 10, in handler`
    python: Regex,
    /// `at com.acme.Server.handle(Server.java:42)`
    java: Regex,
    /// `at handler (/app/index.js:10:5)` or `at /app/index.js:10:5`
    javascript: Regex,
    /// Tab-indented `/app/main.go:42 +0x1d` under a Go function line
    go_location: Regex,
    /// Lines that introduce a trace without describing the error
    header: Regex,
}

fn build_patterns() -> Option<FramePatterns> {
    Some(FramePatterns {
        python: Regex::new(r#"^\s*File "(?P<file>[^"]+)", line (?P<line>\d+)(?:, in (?P<func>.+?))?\s*$"#)
            .ok()?,
        java: Regex::new(
            r"^\s*at (?P<func>[\w$.<>/]+)\((?P<file>[^():]*)(?::(?P<line>\d+))?\)\s*$",
        )
        .ok()?,
        javascript: Regex::new(
            r"^\s*at (?:(?P<func>.+?) \()?(?P<file>[^\s()]+?):(?P<line>\d+)(?::(?P<col>\d+))?\)?\s*$",
        )
        .ok()?,
        go_location: Regex::new(r"^\s+(?P<file>\S+\.go):(?P<line>\d+)(?:\s+\+0x[0-9a-f]+)?\s*$")
            .ok()?,
        header: Regex::new(r"^(?:Traceback \(most recent call last\):|goroutine \d+ \[.*\]:)\s*$")
            .ok()?,
    })
}

#[allow(clippy::incompatible_msrv)]
static PATTERNS: LazyLock<Option<FramePatterns>> = LazyLock::new(build_patterns);

/// Recognises JavaScript, Python, Java and Go traces.
///
/// Frames are returned innermost first; Python tracebacks, which list the
/// innermost call last, are reversed. The first unindented line that is not
/// a frame or a trace header becomes the `error` of every frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextTraceStructurer;

impl TraceStructurer for TextTraceStructurer {
    fn structure(&self, raw: &str) -> Result<Vec<Frame>, StructureError> {
        let patterns = PATTERNS.as_ref().ok_or(StructureError::Patterns)?;
        let lines: Vec<&str> = raw.lines().collect();
        let mut consumed = vec![false; lines.len()];
        let mut frames = Vec::new();
        let mut python = false;

        for (i, line) in lines.iter().enumerate() {
            if let Some(caps) = patterns.python.captures(line) {
                python = true;
                frames.push(frame_from(&caps));
                consumed[i] = true;
            } else if let Some(caps) = patterns
                .java
                .captures(line)
                .or_else(|| patterns.javascript.captures(line))
            {
                frames.push(frame_from(&caps));
                consumed[i] = true;
            } else if let Some(caps) = patterns.go_location.captures(line) {
                let mut frame = frame_from(&caps);
                if i > 0 && !consumed[i - 1] && !lines[i - 1].trim().is_empty() {
                    frame.function_name = Some(go_function(lines[i - 1]));
                    consumed[i - 1] = true;
                }
                frames.push(frame);
                consumed[i] = true;
            }
        }

        if frames.is_empty() {
            return Err(StructureError::NoFrames);
        }
        if python {
            frames.reverse();
        }

        let error = lines
            .iter()
            .zip(&consumed)
            .find(|(line, consumed)| {
                !**consumed
                    && !line.trim().is_empty()
                    && !line.starts_with(char::is_whitespace)
                    && !patterns.header.is_match(line)
            })
            .map(|(line, _)| line.trim().to_owned());

        if error.is_some() {
            for frame in &mut frames {
                frame.error.clone_from(&error);
            }
        }
        Ok(frames)
    }
}

fn frame_from(caps: &Captures<'_>) -> Frame {
    let text = |name: &str| caps.name(name).map(|m| m.as_str().to_owned());
    let number = |name: &str| caps.name(name).and_then(|m| m.as_str().parse::<i64>().ok());

    Frame {
        file_name: text("file").filter(|f| !f.is_empty()),
        line_number: number("line"),
        column_number: number("col"),
        function_name: text("func"),
        ..Frame::default()
    }
}

/// `main.(*Server).handle(0xc000010000)` -> `main.(*Server).handle`
fn go_function(line: &str) -> String {
    let name = line.trim();
    let name = name.strip_prefix("created by ").unwrap_or(name);
    let name = name.split(" in goroutine ").next().unwrap_or(name);
    match name.rsplit_once('(') {
        Some((function, args)) if args.ends_with(')') && !function.is_empty() => {
            function.to_owned()
        }
        _ => name.to_owned(),
    }
}
