//! Extraction of structured diagnostics from compiler output.
//!
//! `cascadec` prints one header line per diagnostic, e.g.
//! `error: [E0004] unexpected token! tests/parse.csc:3:7`, usually followed
//! by source-context gutter lines and an optional `note:` line, all of it
//! ANSI-colored. Only header lines carry the (code, severity) pair the
//! harness cares about; context lines are skipped. A header line the
//! grammar cannot make sense of degrades to [`Diagnostic::Raw`] instead of
//! being dropped, so no compiler output is silently lost.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

/// Sentinel code reported by [`Diagnostic::code`] for raw-text fallbacks.
pub const RAW_DIAGNOSTIC_CODE: u16 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

/// `file:line:column` position attached to a diagnostic header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

/// One compiler-emitted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Diagnostic {
    /// A header line the grammar understood.
    Parsed {
        code: u16,
        severity: Severity,
        message: String,
        location: Option<SourceLocation>,
    },

    /// A malformed diagnostic line, retained verbatim.
    Raw { text: String },
}

impl Diagnostic {
    /// Numeric code; [`RAW_DIAGNOSTIC_CODE`] for raw fallbacks.
    pub fn code(&self) -> u16 {
        match self {
            Diagnostic::Parsed { code, .. } => *code,
            Diagnostic::Raw { .. } => RAW_DIAGNOSTIC_CODE,
        }
    }

    pub fn severity(&self) -> Option<Severity> {
        match self {
            Diagnostic::Parsed { severity, .. } => Some(*severity),
            Diagnostic::Raw { .. } => None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity() == Some(Severity::Error)
    }
}

static ANSI_ESCAPE: Lazy<Regex> = Lazy::new(|| Regex::new("\x1b\\[[0-9;]*m").expect("ansi regex"));

// `error: [E0004] unexpected token! path:3:7`. The trailing location is
// optional, and so is the `!` the compiler puts after the message text.
static HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(error|warning): \[([EW])(\d{4})\] (.*?)!?(?: (\S+):(\d+):(\d+))?$")
        .expect("header regex")
});

/// Parse every diagnostic out of one output stream, preserving emission
/// order. Pure and infallible: the same input always yields the same
/// sequence.
pub fn parse_diagnostics(output: &str) -> Vec<Diagnostic> {
    output.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<Diagnostic> {
    let clean = ANSI_ESCAPE.replace_all(line, "");
    let clean = clean.trim_end();

    // Gutter lines, carets, notes and source echo are context, not
    // diagnostics.
    if !clean.starts_with("error:") && !clean.starts_with("warning:") {
        return None;
    }

    match HEADER.captures(clean).and_then(parsed_from) {
        Some(diag) => Some(diag),
        None => Some(Diagnostic::Raw {
            text: clean.to_string(),
        }),
    }
}

fn parsed_from(caps: Captures<'_>) -> Option<Diagnostic> {
    let code: u16 = caps[3].parse().ok()?;
    let severity = if &caps[1] == "error" {
        Severity::Error
    } else {
        Severity::Warning
    };
    let message = caps[4].trim().to_string();
    let location = match (caps.get(5), caps.get(6), caps.get(7)) {
        (Some(file), Some(line), Some(column)) => Some(SourceLocation {
            file: file.as_str().to_string(),
            line: line.as_str().parse().ok()?,
            column: column.as_str().parse().ok()?,
        }),
        _ => None,
    };

    Some(Diagnostic::Parsed {
        code,
        severity,
        message,
        location,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_error_header_with_location() {
        let diags = parse_diagnostics("error: [E0004] unexpected token! tests/parse.csc:3:7");
        assert_eq!(diags.len(), 1);
        assert_eq!(
            diags[0],
            Diagnostic::Parsed {
                code: 4,
                severity: Severity::Error,
                message: "unexpected token".to_string(),
                location: Some(SourceLocation {
                    file: "tests/parse.csc".to_string(),
                    line: 3,
                    column: 7,
                }),
            }
        );
    }

    #[test]
    fn test_parses_warning_without_location() {
        let diags = parse_diagnostics("warning: [W0012] unused variable!");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code(), 12);
        assert_eq!(diags[0].severity(), Some(Severity::Warning));
    }

    #[test]
    fn test_strips_ansi_colors() {
        let colored = "\x1b[1;31merror:\x1b[0m [E0001] unknown character! a.csc:1:1";
        let diags = parse_diagnostics(colored);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code(), 1);
        assert!(diags[0].is_error());
    }

    #[test]
    fn test_context_lines_are_skipped() {
        let output = "\
error: [E0010] expected a semicolon! main.csc:2:14
   |
 2 | let x = 1
   |              ^
note: All statements require a ';' after them.";
        let diags = parse_diagnostics(output);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code(), 10);
    }

    #[test]
    fn test_malformed_header_degrades_to_raw() {
        let diags = parse_diagnostics("error: something exploded without a code");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code(), RAW_DIAGNOSTIC_CODE);
        assert!(matches!(&diags[0], Diagnostic::Raw { text } if text.contains("exploded")));
    }

    #[test]
    fn test_emission_order_is_preserved() {
        let output = "\
warning: [W0002] shadowed binding! a.csc:1:1
error: [E0004] unexpected token! a.csc:2:2
warning: [W0003] unused import! a.csc:3:3";
        let codes: Vec<u16> = parse_diagnostics(output).iter().map(|d| d.code()).collect();
        assert_eq!(codes, vec![2, 4, 3]);
    }

    #[test]
    fn test_reparse_is_idempotent() {
        let output = "error: [E0101] expected a declaration! x.csc:9:1\nerror: not parseable";
        let first = parse_diagnostics(output);
        let second = parse_diagnostics(output);
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn test_empty_output_yields_no_diagnostics() {
        assert!(parse_diagnostics("").is_empty());
        assert!(parse_diagnostics("all fine here\n").is_empty());
    }
}
