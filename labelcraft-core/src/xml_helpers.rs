//! Small helpers shared by the SpreadsheetML readers and writers

use anyhow::{Context, Result};
use quick_xml::Reader;
use quick_xml::events::BytesStart;
use quick_xml::name::QName;

/// Extract an attribute value by its full key, unescaped
pub fn attr_string(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == key)
        .and_then(|attr| attr.unescape_value().ok().map(|v| v.into_owned()))
}

/// Extract an attribute by local name (ignoring namespace prefix)
pub fn attr_string_local(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == key)
        .and_then(|attr| attr.unescape_value().ok().map(|v| v.into_owned()))
}

pub fn attr_u32(e: &BytesStart, key: &[u8]) -> Option<u32> {
    attr_string(e, key).and_then(|s| s.trim().parse().ok())
}

pub fn attr_f64(e: &BytesStart, key: &[u8]) -> Option<f64> {
    attr_string(e, key).and_then(|s| s.trim().parse().ok())
}

/// "1" and "true" are true, anything else is false
pub fn attr_bool(e: &BytesStart, key: &[u8]) -> Option<bool> {
    attr_string(e, key).map(|s| matches!(s.as_str(), "1" | "true"))
}

/// All attributes except the listed keys, as unescaped (key, value) pairs
pub fn attrs_except(e: &BytesStart, skip: &[&[u8]]) -> Vec<(String, String)> {
    e.attributes()
        .flatten()
        .filter(|attr| !skip.contains(&attr.key.as_ref()))
        .filter_map(|attr| {
            let key = String::from_utf8(attr.key.as_ref().to_vec()).ok()?;
            let value = attr.unescape_value().ok()?.into_owned();
            Some((key, value))
        })
        .collect()
}

/// Render attributes as ` key="value"` pairs
pub fn render_attrs(attrs: &[(String, String)]) -> String {
    let mut out = String::new();
    for (key, value) in attrs {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(&escape(value));
        out.push('"');
    }
    out
}

pub fn escape(text: &str) -> String {
    quick_xml::escape::escape(text).into_owned()
}

/// Escaped text with characters XML 1.0 cannot carry removed
pub fn escape_text(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| matches!(c, '\t' | '\n' | '\r') || *c >= ' ')
        .collect();
    escape(&cleaned)
}

/// Read the text content of the element whose start tag was just consumed
pub fn read_element_text(reader: &mut Reader<&[u8]>, start: &BytesStart) -> Result<String> {
    let name = start.name().as_ref().to_vec();
    let raw = reader
        .read_text(QName(&name))
        .context("Failed to read element text")?;
    Ok(quick_xml::escape::unescape(&raw)?.into_owned())
}

/// Skip the element whose start tag was just consumed and return its full
/// source text, start tag included. `start_pos` is the reader position
/// before the start tag was read.
pub fn capture_element(
    reader: &mut Reader<&[u8]>,
    xml: &str,
    start: &BytesStart,
    start_pos: u64,
) -> Result<String> {
    let name = start.name().as_ref().to_vec();
    reader
        .read_to_end(QName(&name))
        .context("Unterminated XML element")?;
    slice(xml, start_pos, reader.buffer_position() as u64)
}

/// Source text of a self-closing element just read
pub fn capture_empty(reader: &Reader<&[u8]>, xml: &str, start_pos: u64) -> Result<String> {
    slice(xml, start_pos, reader.buffer_position() as u64)
}

fn slice(xml: &str, start: u64, end: u64) -> Result<String> {
    let start = usize::try_from(start)?;
    let end = usize::try_from(end)?;
    xml.get(start..end)
        .map(|s| s.to_string())
        .context("XML element boundaries out of range")
}

/// Split "prefix:local" into its local part
pub fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().position(|&b| b == b':') {
        Some(idx) => &name[idx + 1..],
        None => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quick_xml::events::Event;

    #[test]
    fn test_capture_element_keeps_source_text() {
        let xml = r#"<root><a x="1"><b>t&amp;</b></a><c/></root>"#;
        let mut reader = Reader::from_str(xml);
        let mut captured = Vec::new();
        loop {
            let pos = reader.buffer_position() as u64;
            match reader.read_event().unwrap() {
                Event::Start(e) if e.name().as_ref() == b"a" => {
                    captured.push(capture_element(&mut reader, xml, &e, pos).unwrap());
                }
                Event::Empty(e) if e.name().as_ref() == b"c" => {
                    let _ = e;
                    captured.push(capture_empty(&reader, xml, pos).unwrap());
                }
                Event::Eof => break,
                _ => {}
            }
        }
        assert_eq!(captured, vec![r#"<a x="1"><b>t&amp;</b></a>"#, "<c/>"]);
    }

    #[test]
    fn test_escape_text_drops_control_characters() {
        assert_eq!(escape_text("a\u{1}b\u{1f}<c>"), "ab&lt;c&gt;");
        assert_eq!(escape_text("tab\there"), "tab\there");
    }

    #[test]
    fn test_render_attrs_escapes() {
        let attrs = vec![("name".to_string(), "a&b".to_string())];
        assert_eq!(render_attrs(&attrs), r#" name="a&amp;b""#);
    }
}
