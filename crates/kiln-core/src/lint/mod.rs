//! Source linting for stylesheets and scripts.
//!
//! Lint findings are advisory: they are collected into the stage report and
//! printed as a grouped "stylish" report, but never stop a stage from
//! producing output. `--strict` builds turn error-severity findings into a
//! non-zero exit code.

pub mod script;
pub mod scss;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub use script::ScriptLinter;
pub use scss::ScssLinter;

/// Severity of a lint rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Rule disabled
    Off,
    /// Reported, never fails a build
    Warn,
    /// Reported, fails `--strict` builds
    Error,
}

impl Severity {
    pub fn is_enabled(self) -> bool {
        self != Severity::Off
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Off => write!(f, "off"),
            Severity::Warn => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// A single lint finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LintMessage {
    /// File the finding belongs to
    pub file: PathBuf,
    /// 1-based line
    pub line: usize,
    /// 1-based column
    pub column: usize,
    /// Rule identifier, e.g. `no-ids`
    pub rule: String,
    pub severity: Severity,
    pub message: String,
}

impl LintMessage {
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Render findings grouped by file, one aligned row per finding, followed by
/// a problem count.
///
/// ```text
/// src/assets/scss/main.scss
///   3:1  warning  ID selectors are not allowed  no-ids
///
/// 1 problem (0 errors, 1 warning)
/// ```
pub fn format_stylish(messages: &[LintMessage]) -> String {
    if messages.is_empty() {
        return String::new();
    }

    let mut by_file: BTreeMap<&PathBuf, Vec<&LintMessage>> = BTreeMap::new();
    for msg in messages {
        by_file.entry(&msg.file).or_default().push(msg);
    }

    let mut out = String::new();
    for (file, mut msgs) in by_file {
        msgs.sort_by_key(|m| (m.line, m.column));
        out.push_str(&file.display().to_string());
        out.push('\n');

        let pos_width = msgs
            .iter()
            .map(|m| format!("{}:{}", m.line, m.column).len())
            .max()
            .unwrap_or(0);
        let msg_width = msgs.iter().map(|m| m.message.len()).max().unwrap_or(0);

        for m in msgs {
            let pos = format!("{}:{}", m.line, m.column);
            out.push_str(&format!(
                "  {:<pos_width$}  {:<7}  {:<msg_width$}  {}\n",
                pos,
                m.severity.to_string(),
                m.message,
                m.rule,
            ));
        }
        out.push('\n');
    }

    let errors = messages.iter().filter(|m| m.is_error()).count();
    let warnings = messages.len() - errors;
    out.push_str(&format!(
        "{} {} ({} {}, {} {})\n",
        messages.len(),
        plural(messages.len(), "problem"),
        errors,
        plural(errors, "error"),
        warnings,
        plural(warnings, "warning"),
    ));
    out
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        word.to_string()
    } else {
        format!("{word}s")
    }
}

/// Maps char offsets to 1-based line/column pairs.
pub(crate) struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    pub(crate) fn new(chars: &[char]) -> Self {
        let mut starts = vec![0];
        for (i, c) in chars.iter().enumerate() {
            if *c == '\n' {
                starts.push(i + 1);
            }
        }
        Self { starts }
    }

    pub(crate) fn position(&self, offset: usize) -> (usize, usize) {
        let line = match self.starts.binary_search(&offset) {
            Ok(exact) => exact,
            Err(next) => next - 1,
        };
        (line + 1, offset - self.starts[line] + 1)
    }
}

/// Which comment and string syntaxes a language uses.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Syntax {
    /// `//` line comments
    pub line_comments: bool,
    /// Backtick template literals
    pub template_literals: bool,
    /// JavaScript `/.../` regular expression literals
    pub regex_literals: bool,
}

/// Replace the contents of comments and string literals with spaces.
///
/// Newlines are kept so offsets in the masked text map to the same
/// line/column as in the original source.
pub(crate) fn mask_comments_and_strings(source: &str, syntax: Syntax) -> Vec<char> {
    let mut chars: Vec<char> = source.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        if c == '/' && next == Some('*') {
            let end = find_seq(&chars, i + 2, &['*', '/']).map_or(chars.len(), |e| e + 2);
            blank(&mut chars, i, end);
            i = end;
        } else if syntax.line_comments && c == '/' && next == Some('/') && !is_url_context(&chars, i)
        {
            let end = chars[i..]
                .iter()
                .position(|&c| c == '\n')
                .map_or(chars.len(), |p| i + p);
            blank(&mut chars, i, end);
            i = end;
        } else if syntax.regex_literals && c == '/' && starts_regex(&chars, i) {
            let end = regex_end(&chars, i + 1);
            blank(&mut chars, i + 1, end.saturating_sub(1).max(i + 1));
            i = end;
        } else if c == '"' || c == '\'' || (syntax.template_literals && c == '`') {
            let mut j = i + 1;
            while j < chars.len() && chars[j] != c {
                if chars[j] == '\\' {
                    j += 1;
                } else if chars[j] == '\n' && c != '`' {
                    break;
                }
                j += 1;
            }
            let end = (j + 1).min(chars.len());
            // keep the quotes so the masked text still reads as a literal
            blank(&mut chars, i + 1, end.saturating_sub(1).max(i + 1));
            i = end;
        } else {
            i += 1;
        }
    }
    chars
}

/// A `/` starts a regex literal rather than a division when it follows
/// punctuation or a keyword such as `return`.
fn starts_regex(chars: &[char], i: usize) -> bool {
    let Some(last) = chars[..i].iter().rposition(|c| !c.is_whitespace()) else {
        return true;
    };
    if "(,=:[!&|?{};+-*%<>~^".contains(chars[last]) {
        return true;
    }
    let start = chars[..=last]
        .iter()
        .rposition(|&c| !is_ident_char(c))
        .map_or(0, |p| p + 1);
    let word: String = chars[start..=last].iter().collect();
    matches!(
        word.as_str(),
        "return" | "typeof" | "case" | "in" | "of" | "void" | "delete" | "throw"
    )
}

/// Index just past the closing `/` (and flags) of a regex literal whose
/// body starts at `from`. Stops at the end of the line when unterminated.
fn regex_end(chars: &[char], from: usize) -> usize {
    let mut j = from;
    let mut in_class = false;
    while j < chars.len() && chars[j] != '\n' {
        match chars[j] {
            '\\' => j += 1,
            '[' => in_class = true,
            ']' => in_class = false,
            '/' if !in_class => return j + 1,
            _ => {}
        }
        j += 1;
    }
    j.min(chars.len())
}

fn find_seq(chars: &[char], from: usize, seq: &[char]) -> Option<usize> {
    (from..chars.len().saturating_sub(seq.len() - 1)).find(|&i| chars[i..].starts_with(seq))
}

fn blank(chars: &mut [char], from: usize, to: usize) {
    for c in &mut chars[from..to] {
        if *c != '\n' {
            *c = ' ';
        }
    }
}

/// `url(//cdn...)` and `http://` are not comments.
fn is_url_context(chars: &[char], i: usize) -> bool {
    i > 0 && matches!(chars[i - 1], '(' | ':')
}

pub(crate) fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-' || c == '$'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(file: &str, line: usize, severity: Severity) -> LintMessage {
        LintMessage {
            file: PathBuf::from(file),
            line,
            column: 1,
            rule: "no-ids".to_string(),
            severity,
            message: "ID selectors are not allowed".to_string(),
        }
    }

    #[test]
    fn test_line_index_positions() {
        let chars: Vec<char> = "ab\ncd\n\nef".chars().collect();
        let index = LineIndex::new(&chars);
        assert_eq!(index.position(0), (1, 1));
        assert_eq!(index.position(1), (1, 2));
        assert_eq!(index.position(3), (2, 1));
        assert_eq!(index.position(7), (4, 1));
    }

    #[test]
    fn test_mask_keeps_layout() {
        let src = "a /* x\ny */ b // c\n\"d#e\" f";
        let masked: String = mask_comments_and_strings(
            src,
            Syntax {
                line_comments: true,
                template_literals: false,
                regex_literals: false,
            },
        )
        .into_iter()
        .collect();
        assert_eq!(masked.len(), src.len());
        assert_eq!(masked.lines().count(), src.lines().count());
        assert!(!masked.contains('x'));
        assert!(!masked.contains('c'));
        assert!(!masked.contains('#'));
        assert!(masked.contains('b'));
        assert!(masked.contains('f'));
    }

    #[test]
    fn test_mask_ignores_protocol_slashes() {
        let src = "background: url(//cdn.example.com/a.png);";
        let masked: String = mask_comments_and_strings(
            src,
            Syntax {
                line_comments: true,
                template_literals: false,
                regex_literals: false,
            },
        )
        .into_iter()
        .collect();
        assert_eq!(masked, src);
    }

    #[test]
    fn test_mask_regex_literal_quotes_do_not_open_strings() {
        let src = "var q = s.split(/'/); debugger;\nvar half = a / 2; var b = c / d;";
        let masked: String = mask_comments_and_strings(
            src,
            Syntax {
                line_comments: true,
                template_literals: true,
                regex_literals: true,
            },
        )
        .into_iter()
        .collect();
        assert_eq!(masked.len(), src.len());
        assert!(!masked.contains('\''));
        assert!(masked.contains("/ /); debugger;"));
        assert!(masked.ends_with("var half = a / 2; var b = c / d;"));
    }

    #[test]
    fn test_format_stylish_groups_by_file() {
        let messages = vec![
            msg("b.scss", 2, Severity::Warn),
            msg("a.scss", 7, Severity::Error),
            msg("a.scss", 1, Severity::Warn),
        ];
        let report = format_stylish(&messages);

        let a = report.find("a.scss").unwrap();
        let b = report.find("b.scss").unwrap();
        assert!(a < b);
        assert!(report.find("1:1").unwrap() < report.find("7:1").unwrap());
        assert!(report.contains("3 problems (1 error, 2 warnings)"));
    }

    #[test]
    fn test_format_stylish_empty() {
        assert!(format_stylish(&[]).is_empty());
    }
}
