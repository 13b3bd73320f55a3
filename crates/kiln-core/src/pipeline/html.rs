//! HTML stage: attribute normalization with lol_html, then whitespace
//! collapsing with minify-html.

use lol_html::html_content::Element;
use lol_html::{doc_comments, element, rewrite_str, RewriteStrSettings};
use std::path::{Path, PathBuf};
use std::time::Instant;

use super::discovery::SourceDiscovery;
use super::images::write_output;
use crate::config::HtmlConfig;
use crate::error::{StageError, StageResult};
use crate::types::{Stage, StageReport};

/// Attributes that mean nothing when empty.
const DROPPABLE_WHEN_EMPTY: &[&str] = &["class", "id", "style", "title", "lang", "dir"];

#[derive(Debug, Clone, Copy)]
struct AttributeRules {
    remove_empty: bool,
    sort_attributes: bool,
    sort_class_name: bool,
}

impl AttributeRules {
    fn any(&self) -> bool {
        self.remove_empty || self.sort_attributes || self.sort_class_name
    }
}

/// Minifies single HTML documents.
pub struct HtmlMinifier {
    rules: AttributeRules,
    remove_comments: bool,
    collapse_whitespace: bool,
    cfg: minify_html::Cfg,
}

impl HtmlMinifier {
    pub fn new(config: &HtmlConfig) -> Self {
        let mut cfg = minify_html::Cfg::new();
        cfg.keep_comments = !config.remove_comments;
        cfg.minify_css = config.minify_inline;
        cfg.minify_js = config.minify_inline;
        cfg.keep_closing_tags = true;
        cfg.keep_html_and_head_opening_tags = true;

        Self {
            rules: AttributeRules {
                remove_empty: config.remove_empty_attributes,
                sort_attributes: config.sort_attributes,
                sort_class_name: config.sort_class_name,
            },
            remove_comments: config.remove_comments,
            collapse_whitespace: config.collapse_whitespace,
            cfg,
        }
    }

    /// Minify one document. `path` is only used in error messages.
    pub fn minify(&self, source: &str, path: &Path) -> StageResult<Vec<u8>> {
        let normalized = if self.rules.any() || self.remove_comments {
            self.normalize(source).map_err(|message| StageError::Html {
                path: path.to_path_buf(),
                message,
            })?
        } else {
            source.to_string()
        };

        if self.collapse_whitespace {
            Ok(minify_html::minify(normalized.as_bytes(), &self.cfg))
        } else {
            Ok(normalized.into_bytes())
        }
    }

    fn normalize(&self, source: &str) -> Result<String, String> {
        let rules = self.rules;
        let element_content_handlers = if rules.any() {
            vec![element!("*", move |el| {
                normalize_attributes(el, rules)?;
                Ok(())
            })]
        } else {
            vec![]
        };
        let document_content_handlers = if self.remove_comments {
            vec![doc_comments!(|c| {
                c.remove();
                Ok(())
            })]
        } else {
            vec![]
        };

        rewrite_str(
            source,
            RewriteStrSettings {
                element_content_handlers,
                document_content_handlers,
                ..RewriteStrSettings::default()
            },
        )
        .map_err(|e| e.to_string())
    }
}

fn normalize_attributes(
    el: &mut Element<'_, '_>,
    rules: AttributeRules,
) -> Result<(), lol_html::errors::AttributeNameError> {
    let original: Vec<(String, String)> = el
        .attributes()
        .iter()
        .map(|a| (a.name(), a.value()))
        .collect();

    let mut attrs = original.clone();
    if rules.remove_empty {
        attrs.retain(|(name, value)| !(is_droppable(name) && value.trim().is_empty()));
    }
    if rules.sort_class_name {
        for (name, value) in attrs.iter_mut() {
            if name == "class" {
                let mut classes: Vec<&str> = value.split_whitespace().collect();
                classes.sort_unstable();
                *value = classes.join(" ");
            }
        }
    }
    if rules.sort_attributes {
        attrs.sort_by(|a, b| a.0.cmp(&b.0));
    }

    if attrs == original {
        return Ok(());
    }
    for (name, _) in &original {
        el.remove_attribute(name);
    }
    for (name, value) in &attrs {
        el.set_attribute(name, value)?;
    }
    Ok(())
}

fn is_droppable(name: &str) -> bool {
    DROPPABLE_WHEN_EMPTY.contains(&name) || name.starts_with("on")
}

/// Minifies every top-level HTML page into the dist root.
pub struct HtmlStage {
    minifier: HtmlMinifier,
    discovery: SourceDiscovery,
    source_dir: PathBuf,
    output_dir: PathBuf,
}

impl HtmlStage {
    pub fn new(config: &HtmlConfig, source_dir: PathBuf, output_dir: PathBuf) -> Self {
        Self {
            minifier: HtmlMinifier::new(config),
            discovery: SourceDiscovery::new(&["html", "htm"]).non_recursive(),
            source_dir,
            output_dir,
        }
    }

    pub fn run(&self) -> StageReport {
        let start = Instant::now();
        let mut report = StageReport::new(Stage::Html);

        for file in self.discovery.discover(&self.source_dir) {
            let dest = self.output_dir.join(&file.relative);
            let result = std::fs::read_to_string(&file.path)
                .map_err(|e| StageError::Read {
                    path: file.path.clone(),
                    source: e,
                })
                .and_then(|source| self.minifier.minify(&source, &file.path))
                .and_then(|bytes| write_output(&dest, &bytes).map(|_| bytes.len() as u64));

            match result {
                Ok(written) => {
                    tracing::debug!("{:?} -> {:?}", file.relative, dest);
                    report.record_output(file.size, written);
                }
                Err(e) => report.record_failure(&e),
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minify(source: &str) -> String {
        let minifier = HtmlMinifier::new(&HtmlConfig::default());
        String::from_utf8(minifier.minify(source, Path::new("t.html")).unwrap()).unwrap()
    }

    #[test]
    fn test_collapses_whitespace_and_drops_comments() {
        let out = minify("<html>\n  <body>\n    <!-- note -->\n    <p>Hello   world</p>\n  </body>\n</html>\n");
        assert!(!out.contains("note"));
        assert!(out.contains("<p>Hello world</p>"));
        assert!(!out.contains("\n  "));
    }

    #[test]
    fn test_removes_empty_attributes() {
        let out = minify(r#"<div class="" id=" " data-x="" onclick="">x</div>"#);
        assert!(!out.contains("class"));
        assert!(!out.contains("id="));
        assert!(!out.contains("onclick"));
        assert!(out.contains("data-x"));
    }

    #[test]
    fn test_sorts_attributes_and_classes() {
        let config = HtmlConfig {
            collapse_whitespace: false,
            ..HtmlConfig::default()
        };
        let minifier = HtmlMinifier::new(&config);
        let out = minifier
            .minify(r#"<a title="t" href="/" class="zeta alpha mid">x</a>"#, Path::new("t.html"))
            .unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            r#"<a class="alpha mid zeta" href="/" title="t">x</a>"#
        );
    }

    #[test]
    fn test_everything_disabled_is_identity() {
        let config = HtmlConfig {
            enabled: false,
            collapse_whitespace: false,
            remove_comments: false,
            remove_empty_attributes: false,
            sort_attributes: false,
            sort_class_name: false,
            minify_inline: false,
        };
        let source = "<p  class=\"b a\"><!-- keep --></p>\n";
        let out = HtmlMinifier::new(&config)
            .minify(source, Path::new("t.html"))
            .unwrap();
        assert_eq!(out, source.as_bytes());
    }

    #[test]
    fn test_stage_only_top_level_pages() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(src.join("assets")).unwrap();
        std::fs::write(src.join("index.html"), "<p>  hi  </p>").unwrap();
        std::fs::write(src.join("about.html"), "<p>about</p>").unwrap();
        std::fs::write(src.join("assets/snippet.html"), "<p>no</p>").unwrap();

        let dist = dir.path().join("dist");
        let report = HtmlStage::new(&HtmlConfig::default(), src, dist.clone()).run();

        assert_eq!(report.processed, 2);
        assert!(dist.join("index.html").exists());
        assert!(dist.join("about.html").exists());
        assert!(!dist.join("assets/snippet.html").exists());
    }
}
