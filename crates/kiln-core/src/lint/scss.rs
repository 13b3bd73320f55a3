//! SCSS lint rules: `no-ids`, `no-mergeable-selectors`, `final-newline`,
//! `indentation`.
//!
//! The linter works on a masked copy of the source (comments and strings
//! blanked out) and tracks block scopes by brace depth. It does not parse
//! SCSS; selectors are whatever text precedes a `{` that is not an at-rule
//! or a nested property.

use std::collections::HashSet;
use std::path::Path;

use super::{is_ident_char, mask_comments_and_strings, LineIndex, LintMessage, Severity, Syntax};
use crate::config::ScssLintConfig;

const SCSS: Syntax = Syntax {
    line_comments: true,
    template_literals: false,
    regex_literals: false,
};

/// Lints SCSS sources against the configured rule severities.
pub struct ScssLinter {
    rules: ScssLintConfig,
}

/// Selectors declared directly inside one block.
type Scope = HashSet<String>;

impl ScssLinter {
    pub fn new(rules: ScssLintConfig) -> Self {
        Self { rules }
    }

    /// Lint one file's contents.
    pub fn lint(&self, path: &Path, source: &str) -> Vec<LintMessage> {
        let masked = mask_comments_and_strings(source, SCSS);
        let index = LineIndex::new(&masked);
        let mut messages = Vec::new();

        if self.rules.no_ids.is_enabled() || self.rules.no_mergeable_selectors.is_enabled() {
            self.check_selectors(path, &masked, &index, &mut messages);
        }
        if self.rules.indentation.is_enabled() {
            self.check_indentation(path, &masked, &mut messages);
        }
        if self.rules.final_newline.is_enabled() && !source.is_empty() && !source.ends_with('\n')
        {
            let (line, column) = index.position(masked.len());
            messages.push(message(
                path,
                line,
                column,
                "final-newline",
                self.rules.final_newline,
                "Files must end with a new line",
            ));
        }

        messages.sort_by_key(|m| (m.line, m.column));
        messages
    }

    fn check_selectors(
        &self,
        path: &Path,
        masked: &[char],
        index: &LineIndex,
        messages: &mut Vec<LintMessage>,
    ) {
        let mut scopes: Vec<Scope> = vec![Scope::new()];
        let mut prelude_start = 0;
        let mut i = 0;

        while i < masked.len() {
            match masked[i] {
                '#' if masked.get(i + 1) == Some(&'{') => {
                    // interpolation: skip to the matching brace
                    i = skip_interpolation(masked, i + 1);
                    continue;
                }
                '{' => {
                    let raw: String = masked[prelude_start..i].iter().collect();
                    let offset =
                        prelude_start + (raw.chars().count() - raw.trim_start().chars().count());
                    let prelude = raw.trim();

                    if is_selector(prelude) {
                        self.check_prelude(
                            path,
                            prelude,
                            offset,
                            masked,
                            index,
                            &mut scopes,
                            messages,
                        );
                    }
                    scopes.push(Scope::new());
                    prelude_start = i + 1;
                }
                '}' => {
                    if scopes.len() > 1 {
                        scopes.pop();
                    }
                    prelude_start = i + 1;
                }
                ';' => prelude_start = i + 1,
                _ => {}
            }
            i += 1;
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn check_prelude(
        &self,
        path: &Path,
        prelude: &str,
        offset: usize,
        masked: &[char],
        index: &LineIndex,
        scopes: &mut [Scope],
        messages: &mut Vec<LintMessage>,
    ) {
        if self.rules.no_ids.is_enabled() {
            for id_offset in id_selector_offsets(&masked[offset..offset + prelude.chars().count()]) {
                let (line, column) = index.position(offset + id_offset);
                messages.push(message(
                    path,
                    line,
                    column,
                    "no-ids",
                    self.rules.no_ids,
                    "ID selectors are not allowed",
                ));
            }
        }

        if self.rules.no_mergeable_selectors.is_enabled() {
            let normalized = prelude.split_whitespace().collect::<Vec<_>>().join(" ");
            if let Some(scope) = scopes.last_mut() {
                if !scope.insert(normalized.clone()) {
                    let (line, column) = index.position(offset);
                    messages.push(message(
                        path,
                        line,
                        column,
                        "no-mergeable-selectors",
                        self.rules.no_mergeable_selectors,
                        &format!("Rule `{normalized}` should be merged with its duplicate"),
                    ));
                }
            }
        }
    }

    fn check_indentation(&self, path: &Path, masked: &[char], messages: &mut Vec<LintMessage>) {
        let text: String = masked.iter().collect();
        for (n, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let indent: String = line.chars().take_while(|c| c.is_whitespace()).collect();
            let spaces = indent.chars().filter(|&c| c == ' ').count();
            if indent.contains('\t') || spaces % 2 != 0 {
                messages.push(message(
                    path,
                    n + 1,
                    1,
                    "indentation",
                    self.rules.indentation,
                    "Indentation must be a multiple of 2 spaces",
                ));
            }
        }
    }
}

fn message(
    path: &Path,
    line: usize,
    column: usize,
    rule: &str,
    severity: Severity,
    text: &str,
) -> LintMessage {
    LintMessage {
        file: path.to_path_buf(),
        line,
        column,
        rule: rule.to_string(),
        severity,
        message: text.to_string(),
    }
}

/// Whether a block prelude is a selector (as opposed to an at-rule or a
/// nested property such as `font: {`).
fn is_selector(prelude: &str) -> bool {
    !prelude.is_empty() && !prelude.starts_with('@') && !prelude.ends_with(':')
}

/// Offsets of `#id` occurrences in a selector. Interpolation (`#{`) is not an id.
fn id_selector_offsets(selector: &[char]) -> Vec<usize> {
    let mut offsets = Vec::new();
    let mut i = 0;
    while i < selector.len() {
        if selector[i] == '#' {
            if selector.get(i + 1) == Some(&'{') {
                i = skip_interpolation(selector, i + 1);
                continue;
            }
            if selector
                .get(i + 1)
                .is_some_and(|&c| is_ident_char(c) && c != '$')
            {
                offsets.push(i);
            }
        }
        i += 1;
    }
    offsets
}

/// Index just past the `}` closing the interpolation whose `{` is at `open`.
fn skip_interpolation(chars: &[char], open: usize) -> usize {
    let mut depth = 0;
    for (i, &c) in chars.iter().enumerate().skip(open) {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return i + 1;
                }
            }
            _ => {}
        }
    }
    chars.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linter() -> ScssLinter {
        ScssLinter::new(ScssLintConfig::default())
    }

    fn all_rules() -> ScssLinter {
        ScssLinter::new(ScssLintConfig {
            no_ids: Severity::Warn,
            no_mergeable_selectors: Severity::Warn,
            final_newline: Severity::Error,
            indentation: Severity::Warn,
        })
    }

    fn rules(messages: &[LintMessage]) -> Vec<&str> {
        messages.iter().map(|m| m.rule.as_str()).collect()
    }

    #[test]
    fn test_clean_source_has_no_findings() {
        let src = ".nav {\n  color: red;\n  a { color: blue; }\n}\n";
        assert!(linter().lint(Path::new("a.scss"), src).is_empty());
    }

    #[test]
    fn test_no_ids_reports_position() {
        let src = ".a { color: red; }\n\n  #header .logo {\n  margin: 0;\n}\n";
        let messages = linter().lint(Path::new("a.scss"), src);
        assert_eq!(rules(&messages), vec!["no-ids"]);
        assert_eq!((messages[0].line, messages[0].column), (3, 3));
        assert_eq!(messages[0].severity, Severity::Warn);
    }

    #[test]
    fn test_no_ids_ignores_colors_interpolation_and_strings() {
        let src = "$c: #fff;\n.a-#{$name} { color: #000; content: \"#x\"; }\n// #commented {\n";
        assert!(linter().lint(Path::new("a.scss"), src).is_empty());
    }

    #[test]
    fn test_mergeable_selectors_same_scope() {
        let src = ".a { color: red; }\n.b { color: red; }\n.a   { margin: 0; }\n";
        let messages = linter().lint(Path::new("a.scss"), src);
        assert_eq!(rules(&messages), vec!["no-mergeable-selectors"]);
        assert_eq!(messages[0].line, 3);
    }

    #[test]
    fn test_mergeable_selectors_respect_nesting() {
        let src = ".a { span { x: 1; } }\n.b { span { x: 2; } }\n@media print { .a { x: 3; } }\n";
        assert!(linter().lint(Path::new("a.scss"), src).is_empty());
    }

    #[test]
    fn test_nested_properties_are_not_selectors() {
        let src = ".a {\n  font: {\n    family: serif;\n  }\n  font: {\n    size: 1px;\n  }\n}\n";
        assert!(linter().lint(Path::new("a.scss"), src).is_empty());
    }

    #[test]
    fn test_final_newline_and_indentation() {
        let src = ".a {\n   color: red;\n}";
        let messages = all_rules().lint(Path::new("a.scss"), src);
        assert_eq!(rules(&messages), vec!["indentation", "final-newline"]);
        assert_eq!(messages[1].severity, Severity::Error);
        assert_eq!(messages[1].line, 3);
    }

    #[test]
    fn test_disabled_rules_are_silent() {
        let linter = ScssLinter::new(ScssLintConfig {
            no_ids: Severity::Off,
            no_mergeable_selectors: Severity::Off,
            final_newline: Severity::Off,
            indentation: Severity::Off,
        });
        let src = "#a { x: 1; }\n#a { x: 2; }";
        assert!(linter.lint(Path::new("a.scss"), src).is_empty());
    }
}
