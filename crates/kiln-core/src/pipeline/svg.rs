//! SVG cleanup at the XML level.
//!
//! Removes what browsers never need (comments, doctype, processing
//! instructions, `<metadata>`, indentation whitespace) and optionally the
//! redundant `viewBox` and unreferenced `id`s. Geometry is never touched,
//! and whitespace inside text content (`<text>`, `<title>`, anything under
//! `xml:space="preserve"`) is kept as written.

use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::config::SvgConfig;

/// Cleans SVG documents.
pub struct SvgOptimizer {
    config: SvgConfig,
}

impl SvgOptimizer {
    pub fn new(config: SvgConfig) -> Self {
        Self { config }
    }

    /// Optimize an SVG document, returning the cleaned markup.
    pub fn optimize(&self, source: &str) -> Result<String, quick_xml::Error> {
        let mut reader = Reader::from_str(source);
        let mut writer = Writer::new(Vec::new());
        // depth inside a dropped <metadata> subtree
        let mut skip_depth = 0usize;
        // depth inside an element whose whitespace is significant
        let mut text_depth = 0usize;

        loop {
            match reader.read_event()? {
                Event::Eof => break,
                Event::Start(e) => {
                    if skip_depth > 0 || e.name().as_ref() == b"metadata" {
                        skip_depth += 1;
                        continue;
                    }
                    if text_depth > 0 || preserves_whitespace(&e) {
                        text_depth += 1;
                    }
                    writer.write_event(Event::Start(self.clean_element(&e, source)?))?;
                }
                Event::End(e) => {
                    if skip_depth > 0 {
                        skip_depth -= 1;
                        continue;
                    }
                    text_depth = text_depth.saturating_sub(1);
                    writer.write_event(Event::End(e))?;
                }
                Event::Empty(e) => {
                    if skip_depth > 0 || e.name().as_ref() == b"metadata" {
                        continue;
                    }
                    writer.write_event(Event::Empty(self.clean_element(&e, source)?))?;
                }
                Event::Text(t) => {
                    let indentation = t.iter().all(u8::is_ascii_whitespace);
                    if skip_depth == 0 && (text_depth > 0 || !indentation) {
                        writer.write_event(Event::Text(t))?;
                    }
                }
                Event::Comment(_) | Event::DocType(_) | Event::PI(_) | Event::Decl(_) => {}
                other => {
                    if skip_depth == 0 {
                        writer.write_event(other)?;
                    }
                }
            }
        }

        Ok(String::from_utf8_lossy(&writer.into_inner()).into_owned())
    }

    /// Copy an element, dropping the attributes the config asks to remove.
    fn clean_element(
        &self,
        element: &BytesStart<'_>,
        source: &str,
    ) -> Result<BytesStart<'static>, quick_xml::Error> {
        let name = String::from_utf8_lossy(element.name().as_ref()).into_owned();

        let mut attrs: Vec<(String, String)> = Vec::new();
        for attr in element.attributes() {
            let attr = attr?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            attrs.push((key, value));
        }

        if self.config.cleanup_ids {
            attrs.retain(|(k, v)| k != "id" || is_referenced(source, v));
        }
        if self.config.remove_view_box && name == "svg" && view_box_is_redundant(&attrs) {
            attrs.retain(|(k, _)| k != "viewBox");
        }

        let mut out = BytesStart::new(name);
        for (k, v) in &attrs {
            out.push_attribute((k.as_str(), v.as_str()));
        }
        Ok(out)
    }
}

/// Elements whose character data is rendered or read out.
const TEXT_CONTENT: &[&[u8]] = &[b"text", b"tspan", b"textPath", b"title", b"desc", b"style"];

fn preserves_whitespace(element: &BytesStart<'_>) -> bool {
    TEXT_CONTENT.contains(&element.local_name().as_ref())
        || element
            .attributes()
            .flatten()
            .any(|a| a.key.as_ref() == b"xml:space" && a.value.as_ref() == b"preserve")
}

/// Whether anything in the document points at `#id`.
fn is_referenced(source: &str, id: &str) -> bool {
    source.contains(&format!("#{id}"))
}

/// `viewBox="0 0 W H"` with matching `width="W"` and `height="H"` adds nothing.
fn view_box_is_redundant(attrs: &[(String, String)]) -> bool {
    let get = |name: &str| {
        attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    };
    let (Some(view_box), Some(width), Some(height)) = (get("viewBox"), get("width"), get("height"))
    else {
        return false;
    };

    let parts: Vec<f64> = view_box
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect();
    let (Some(w), Some(h)) = (parse_length(width), parse_length(height)) else {
        return false;
    };

    parts.len() == 4 && parts[0] == 0.0 && parts[1] == 0.0 && parts[2] == w && parts[3] == h
}

fn parse_length(value: &str) -> Option<f64> {
    value.trim().trim_end_matches("px").parse().ok()
}
