//! JavaScript lint rules: `no-debugger`, `no-eval`.

use std::path::Path;

use super::{is_ident_char, mask_comments_and_strings, LineIndex, LintMessage, Syntax};
use crate::config::ScriptLintConfig;

const JS: Syntax = Syntax {
    line_comments: true,
    template_literals: true,
    regex_literals: true,
};

/// Lints JavaScript sources against the configured rule severities.
pub struct ScriptLinter {
    rules: ScriptLintConfig,
}

impl ScriptLinter {
    pub fn new(rules: ScriptLintConfig) -> Self {
        Self { rules }
    }

    /// Lint one file's contents.
    pub fn lint(&self, path: &Path, source: &str) -> Vec<LintMessage> {
        let masked = mask_comments_and_strings(source, JS);
        let index = LineIndex::new(&masked);
        let mut messages = Vec::new();

        for (offset, word) in identifiers(&masked) {
            let finding = match word.as_str() {
                "debugger" if self.rules.no_debugger.is_enabled() => Some((
                    "no-debugger",
                    self.rules.no_debugger,
                    "Forgotten 'debugger' statement",
                )),
                "eval"
                    if self.rules.no_eval.is_enabled()
                        && !preceded_by_dot(&masked, offset)
                        && followed_by_call(&masked, offset + word.len()) =>
                {
                    Some(("no-eval", self.rules.no_eval, "eval can be harmful"))
                }
                _ => None,
            };

            if let Some((rule, severity, text)) = finding {
                let (line, column) = index.position(offset);
                messages.push(LintMessage {
                    file: path.to_path_buf(),
                    line,
                    column,
                    rule: rule.to_string(),
                    severity,
                    message: text.to_string(),
                });
            }
        }
        messages
    }
}

/// Identifier tokens with their char offsets.
fn identifiers(chars: &[char]) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        if is_ident_char(chars[i]) && chars[i] != '-' {
            let start = i;
            while i < chars.len() && is_ident_char(chars[i]) && chars[i] != '-' {
                i += 1;
            }
            out.push((start, chars[start..i].iter().collect()));
        } else {
            i += 1;
        }
    }
    out
}

fn preceded_by_dot(chars: &[char], offset: usize) -> bool {
    chars[..offset]
        .iter()
        .rev()
        .find(|c| !c.is_whitespace())
        .is_some_and(|&c| c == '.')
}

fn followed_by_call(chars: &[char], end: usize) -> bool {
    chars[end..]
        .iter()
        .find(|c| !c.is_whitespace())
        .is_some_and(|&c| c == '(')
}

impl Default for ScriptLinter {
    fn default() -> Self {
        Self::new(ScriptLintConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lint::Severity;

    #[test]
    fn test_debugger_statement() {
        let src = "function f() {\n  debugger;\n}\n";
        let messages = ScriptLinter::default().lint(Path::new("app.js"), src);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].rule, "no-debugger");
        assert_eq!((messages[0].line, messages[0].column), (2, 3));
    }

    #[test]
    fn test_eval_call() {
        let src = "var x = eval ('1 + 1');\nobj.eval(code);\nvar evaluate = 1;\n";
        let messages = ScriptLinter::default().lint(Path::new("app.js"), src);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].rule, "no-eval");
        assert_eq!(messages[0].line, 1);
    }

    #[test]
    fn test_strings_and_comments_ignored() {
        let src = "// debugger\nvar s = 'debugger';\nvar t = `eval(${x})`;\n/* eval(1) */\n";
        assert!(ScriptLinter::default()
            .lint(Path::new("app.js"), src)
            .is_empty());
    }

    #[test]
    fn test_quote_inside_regex_does_not_hide_rest_of_line() {
        let src = "var parts = s.split(/'/); debugger;\nvar r = x.replace(/\"/g, ''); eval(r);\n";
        let messages = ScriptLinter::default().lint(Path::new("app.js"), src);
        let rules: Vec<_> = messages.iter().map(|m| (m.rule.as_str(), m.line)).collect();
        assert_eq!(rules, vec![("no-debugger", 1), ("no-eval", 2)]);
    }

    #[test]
    fn test_rules_can_be_disabled() {
        let linter = ScriptLinter::new(ScriptLintConfig {
            no_debugger: Severity::Off,
            no_eval: Severity::Error,
        });
        let messages = linter.lint(Path::new("app.js"), "debugger;\neval(s);\n");
        assert_eq!(messages.len(), 1);
        assert!(messages[0].is_error());
    }
}
