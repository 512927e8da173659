//! Cell formats and borders from `xl/styles.xml`
//!
//! Only the `<borders>` and `<cellXfs>` sections are modelled. Everything else
//! in the part is carried through byte for byte, and the two sections are
//! spliced back in when a format was added.

use anyhow::{Result, bail};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::xml_helpers::{attr_string, attrs_except, capture_element, render_attrs};

/// One side of a cell box
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Left,
    Right,
    Top,
    Bottom,
}

impl Edge {
    fn tag(self) -> &'static str {
        match self {
            Edge::Left => "left",
            Edge::Right => "right",
            Edge::Top => "top",
            Edge::Bottom => "bottom",
        }
    }
}

/// Schema order of the children of `<border>`
const SIDE_ORDER: [&str; 9] = [
    "start", "left", "end", "right", "top", "bottom", "diagonal", "vertical", "horizontal",
];

fn side_rank(tag: &str) -> usize {
    SIDE_ORDER
        .iter()
        .position(|t| *t == tag)
        .unwrap_or(SIDE_ORDER.len())
}

/// Line style plus the inner XML (usually `<color .../>`) of a border side
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BorderSide {
    pub style: Option<String>,
    pub(crate) inner: String,
}

impl BorderSide {
    pub fn new(style: impl Into<String>) -> Self {
        Self {
            style: Some(style.into()),
            inner: String::new(),
        }
    }

    /// A side with a line style other than `none`
    pub fn is_visible(&self) -> bool {
        matches!(self.style.as_deref(), Some(s) if s != "none")
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Border {
    pub(crate) attrs: Vec<(String, String)>,
    pub(crate) sides: Vec<(String, BorderSide)>,
}

impl Border {
    /// The visible line on an edge, if any
    pub fn side(&self, edge: Edge) -> Option<&BorderSide> {
        self.sides
            .iter()
            .find(|(tag, _)| tag == edge.tag())
            .map(|(_, side)| side)
            .filter(|side| side.is_visible())
    }

    fn with_side(&self, edge: Edge, side: &BorderSide) -> Border {
        let mut border = self.clone();
        match border.sides.iter_mut().find(|(tag, _)| tag == edge.tag()) {
            Some((_, existing)) => *existing = side.clone(),
            None => {
                let rank = side_rank(edge.tag());
                let pos = border
                    .sides
                    .iter()
                    .position(|(tag, _)| side_rank(tag) > rank)
                    .unwrap_or(border.sides.len());
                border.sides.insert(pos, (edge.tag().to_string(), side.clone()));
            }
        }
        border
    }

    fn to_xml(&self) -> String {
        let mut xml = format!("<border{}>", render_attrs(&self.attrs));
        for (tag, side) in &self.sides {
            match (&side.style, side.inner.is_empty()) {
                (None, true) => xml.push_str(&format!("<{}/>", tag)),
                (style, _) => {
                    let style_attr = style
                        .as_ref()
                        .map(|s| render_attrs(&[("style".to_string(), s.clone())]))
                        .unwrap_or_default();
                    xml.push_str(&format!("<{}{}>{}</{}>", tag, style_attr, side.inner, tag));
                }
            }
        }
        xml.push_str("</border>");
        xml
    }
}

/// An entry of `<cellXfs>`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellXf {
    pub(crate) attrs: Vec<(String, String)>,
    pub(crate) inner: String,
}

impl CellXf {
    pub fn border_id(&self) -> usize {
        self.attr("borderId")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn set_attr(&mut self, key: &str, value: String) {
        match self.attrs.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value,
            None => self.attrs.push((key.to_string(), value)),
        }
    }

    fn to_xml(&self) -> String {
        if self.inner.is_empty() {
            format!("<xf{}/>", render_attrs(&self.attrs))
        } else {
            format!("<xf{}>{}</xf>", render_attrs(&self.attrs), self.inner)
        }
    }
}

/// Byte span of a section in the source XML
#[derive(Debug, Clone, Copy, PartialEq)]
struct Span {
    start: usize,
    end: usize,
}

#[derive(Debug, Clone, Default)]
pub struct StyleSheet {
    xml: String,
    pub(crate) borders: Vec<Border>,
    pub(crate) cell_xfs: Vec<CellXf>,
    borders_attrs: Vec<(String, String)>,
    cell_xfs_attrs: Vec<(String, String)>,
    borders_span: Option<Span>,
    cell_xfs_span: Option<Span>,
    dirty: bool,
}

impl StyleSheet {
    /// Parse a styles part
    pub fn parse(xml: &str) -> Result<Self> {
        let mut sheet = StyleSheet {
            xml: xml.to_string(),
            ..StyleSheet::default()
        };

        let mut reader = Reader::from_str(xml);
        loop {
            let pos = reader.buffer_position() as u64;
            match reader.read_event()? {
                Event::Start(e) if e.local_name().as_ref() == b"borders" => {
                    sheet.borders_attrs = attrs_except(&e, &[b"count"]);
                    sheet.borders = read_borders(&mut reader, xml)?;
                    sheet.borders_span = Some(span(pos, reader.buffer_position() as u64)?);
                }
                Event::Empty(e) if e.local_name().as_ref() == b"borders" => {
                    sheet.borders_attrs = attrs_except(&e, &[b"count"]);
                    sheet.borders_span = Some(span(pos, reader.buffer_position() as u64)?);
                }
                Event::Start(e) if e.local_name().as_ref() == b"cellXfs" => {
                    sheet.cell_xfs_attrs = attrs_except(&e, &[b"count"]);
                    sheet.cell_xfs = read_cell_xfs(&mut reader, xml)?;
                    sheet.cell_xfs_span = Some(span(pos, reader.buffer_position() as u64)?);
                }
                Event::Empty(e) if e.local_name().as_ref() == b"cellXfs" => {
                    sheet.cell_xfs_attrs = attrs_except(&e, &[b"count"]);
                    sheet.cell_xfs_span = Some(span(pos, reader.buffer_position() as u64)?);
                }
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(sheet)
    }

    pub fn cell_xf(&self, index: u32) -> Option<&CellXf> {
        self.cell_xfs.get(index as usize)
    }

    pub fn cell_xf_count(&self) -> usize {
        self.cell_xfs.len()
    }

    /// Border referenced by a cell format
    pub fn border_for_xf(&self, xf: u32) -> Option<&Border> {
        self.cell_xf(xf)
            .and_then(|xf| self.borders.get(xf.border_id()))
    }

    /// Index of a cell format identical to `xf` except that `edge` is drawn with
    /// `side` (an invisible side clears the edge). Borders and formats are
    /// reused when an identical one exists.
    pub fn set_border_edge(&mut self, xf: u32, edge: Edge, side: &BorderSide) -> Result<u32> {
        let Some(base) = self.cell_xf(xf).cloned() else {
            bail!("Cell format {} does not exist", xf);
        };
        if self.borders_span.is_none() || self.cell_xfs_span.is_none() {
            bail!("Style sheet has no border or cell format table");
        }

        let current = self
            .borders
            .get(base.border_id())
            .cloned()
            .unwrap_or_default();
        if current.side(edge) == Some(side).filter(|s| s.is_visible()) {
            return Ok(xf);
        }

        let border = current.with_side(edge, side);
        let border_id = match self.borders.iter().position(|b| *b == border) {
            Some(id) => id,
            None => {
                self.borders.push(border);
                self.dirty = true;
                self.borders.len() - 1
            }
        };

        let mut format = base;
        format.set_attr("borderId", border_id.to_string());
        format.set_attr("applyBorder", "1".to_string());
        let index = match self.cell_xfs.iter().position(|f| *f == format) {
            Some(index) => index,
            None => {
                self.cell_xfs.push(format);
                self.dirty = true;
                self.cell_xfs.len() - 1
            }
        };

        Ok(index as u32)
    }

    /// Serialize the part, splicing regenerated sections in when needed
    pub fn to_xml(&self) -> String {
        if !self.dirty {
            return self.xml.clone();
        }

        let mut edits = Vec::new();
        if let Some(span) = self.borders_span {
            let body: String = self.borders.iter().map(Border::to_xml).collect();
            edits.push((span, section_xml("borders", &self.borders_attrs, self.borders.len(), &body)));
        }
        if let Some(span) = self.cell_xfs_span {
            let body: String = self.cell_xfs.iter().map(CellXf::to_xml).collect();
            edits.push((span, section_xml("cellXfs", &self.cell_xfs_attrs, self.cell_xfs.len(), &body)));
        }
        edits.sort_by_key(|(span, _)| std::cmp::Reverse(span.start));

        let mut xml = self.xml.clone();
        for (span, replacement) in edits {
            xml.replace_range(span.start..span.end, &replacement);
        }
        xml
    }
}

fn section_xml(tag: &str, attrs: &[(String, String)], count: usize, body: &str) -> String {
    format!(
        "<{tag} count=\"{count}\"{}>{body}</{tag}>",
        render_attrs(attrs)
    )
}

fn span(start: u64, end: u64) -> Result<Span> {
    Ok(Span {
        start: usize::try_from(start)?,
        end: usize::try_from(end)?,
    })
}

/// Text between the end of the start tag and the closing tag
fn inner_xml(element: &str) -> String {
    let open_end = element.find('>').map(|i| i + 1).unwrap_or(0);
    let close_start = element.rfind("</").unwrap_or(element.len());
    element
        .get(open_end..close_start.max(open_end))
        .unwrap_or_default()
        .to_string()
}

fn read_borders(reader: &mut Reader<&[u8]>, xml: &str) -> Result<Vec<Border>> {
    let mut borders = Vec::new();
    let mut current: Option<Border> = None;
    loop {
        let pos = reader.buffer_position() as u64;
        match reader.read_event()? {
            Event::Start(e) if e.local_name().as_ref() == b"border" => {
                current = Some(Border {
                    attrs: attrs_except(&e, &[]),
                    sides: Vec::new(),
                });
            }
            Event::Empty(e) if e.local_name().as_ref() == b"border" => {
                borders.push(Border {
                    attrs: attrs_except(&e, &[]),
                    sides: Vec::new(),
                });
            }
            Event::Start(e) => {
                let side = BorderSide {
                    style: attr_string(&e, b"style"),
                    inner: inner_xml(&capture_element(reader, xml, &e, pos)?),
                };
                push_side(&mut current, &e, side);
            }
            Event::Empty(e) => {
                let side = BorderSide {
                    style: attr_string(&e, b"style"),
                    inner: String::new(),
                };
                push_side(&mut current, &e, side);
            }
            Event::End(e) if e.local_name().as_ref() == b"border" => {
                if let Some(border) = current.take() {
                    borders.push(border);
                }
            }
            Event::End(e) if e.local_name().as_ref() == b"borders" => break,
            Event::Eof => bail!("Unterminated <borders> in style sheet"),
            _ => {}
        }
    }
    Ok(borders)
}

fn push_side(current: &mut Option<Border>, e: &BytesStart, side: BorderSide) {
    if let Some(border) = current.as_mut() {
        let tag = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
        border.sides.push((tag, side));
    }
}

fn read_cell_xfs(reader: &mut Reader<&[u8]>, xml: &str) -> Result<Vec<CellXf>> {
    let mut xfs = Vec::new();
    loop {
        let pos = reader.buffer_position() as u64;
        match reader.read_event()? {
            Event::Start(e) if e.local_name().as_ref() == b"xf" => {
                let attrs = attrs_except(&e, &[]);
                let inner = inner_xml(&capture_element(reader, xml, &e, pos)?);
                xfs.push(CellXf { attrs, inner });
            }
            Event::Empty(e) if e.local_name().as_ref() == b"xf" => {
                xfs.push(CellXf {
                    attrs: attrs_except(&e, &[]),
                    inner: String::new(),
                });
            }
            Event::End(e) if e.local_name().as_ref() == b"cellXfs" => break,
            Event::Eof => bail!("Unterminated <cellXfs> in style sheet"),
            _ => {}
        }
    }
    Ok(xfs)
}
