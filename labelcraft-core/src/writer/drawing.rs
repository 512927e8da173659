//! Drawing parts holding the images placed on a worksheet

use anyhow::Result;
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

use crate::package::{
    ContentTypes, Package, Relationships, content_types, rel_type, rels_path_for,
    relative_target, resolve_target,
};
use crate::reader::workbook::{ImageAsset, SHEET_PART_BASE, Worksheet};
use crate::xml_helpers::{escape, escape_text};

/// English Metric Units per screen pixel at 96 dpi
pub const EMU_PER_PIXEL: u64 = 9525;

const XDR_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/spreadsheetDrawing";
const A_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const R_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

static CNVPR_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<(?:\w+:)?cNvPr\b[^>]*?\bid="(\d+)""#).expect("valid cNvPr pattern")
});

static WSDR_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</(?:\w+:)?wsDr>\s*$").expect("valid wsDr pattern"));

/// Write the images of a sheet into its drawing part, creating the part when
/// the sheet has none. Returns the relationship id the worksheet must reference.
pub fn attach_images(
    package: &mut Package,
    types: &mut ContentTypes,
    sheet: &Worksheet,
    sheet_rels: &mut Relationships,
) -> Result<Option<String>> {
    if sheet.images.is_empty() {
        return Ok(sheet.drawing_rel.clone());
    }

    let existing = sheet
        .drawing_rel
        .as_deref()
        .and_then(|id| sheet_rels.get(id))
        .map(|rel| (rel.id.clone(), resolve_target(SHEET_PART_BASE, &rel.target)))
        .filter(|(_, part)| package.contains(part));

    let (rel_id, part, xml) = match existing {
        Some((rel_id, part)) => {
            let xml = package.part_str(&part)?;
            (rel_id, part, xml)
        }
        None => {
            let part = package.next_part_name("xl/drawings", "drawing", "xml");
            let rel_id = sheet_rels.add(rel_type::DRAWING, relative_target(SHEET_PART_BASE, &part));
            types.set_override(&part, content_types::DRAWING);
            (rel_id, part, empty_drawing())
        }
    };

    let rels_part = rels_path_for(&part);
    let mut drawing_rels = match package.part(&rels_part) {
        Some(_) => Relationships::from_xml(&package.part_str(&rels_part)?)?,
        None => Relationships::default(),
    };

    let mut next_id = max_object_id(&xml) + 1;
    let mut anchors = String::new();
    for image in &sheet.images {
        let media = package.next_part_name("xl/media", "image", "png");
        package.set_part(media.clone(), image.png.clone());
        let embed = drawing_rels.add(rel_type::IMAGE, relative_target(&part, &media));
        anchors.push_str(&anchor_xml(image, next_id, &embed));
        next_id += 1;
    }
    types.ensure_default("png", content_types::PNG);

    debug!(
        sheet = %sheet.name(),
        drawing = %part,
        images = sheet.images.len(),
        "Placed images"
    );

    package.set_part(part.clone(), insert_anchors(&xml, &anchors));
    package.set_part(rels_part, drawing_rels.to_xml());
    Ok(Some(rel_id))
}

fn empty_drawing() -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<xdr:wsDr xmlns:xdr=\"{XDR_NS}\" xmlns:a=\"{A_NS}\"></xdr:wsDr>"
    )
}

/// Highest drawing object id already used in a drawing part
fn max_object_id(xml: &str) -> u32 {
    CNVPR_ID
        .captures_iter(xml)
        .filter_map(|caps| caps[1].parse().ok())
        .max()
        .unwrap_or(0)
}

fn insert_anchors(xml: &str, anchors: &str) -> String {
    match WSDR_CLOSE.find(xml) {
        Some(close) => {
            let mut out = String::with_capacity(xml.len() + anchors.len());
            out.push_str(&xml[..close.start()]);
            out.push_str(anchors);
            out.push_str(&xml[close.start()..]);
            out
        }
        None => format!("{}{}", xml, anchors),
    }
}

/// A picture anchored at the top-left corner of a cell. Namespaces are declared
/// on the anchor so it does not depend on the prefixes of an existing part.
fn anchor_xml(image: &ImageAsset, object_id: u32, embed_rel_id: &str) -> String {
    let (col, row) = image.anchor.zero_based();
    let cx = image.width_px as u64 * EMU_PER_PIXEL;
    let cy = image.height_px as u64 * EMU_PER_PIXEL;
    let descr = escape_text(&image.description);
    format!(
        concat!(
            r#"<xdr:oneCellAnchor xmlns:xdr="{xdr}" xmlns:a="{a}" xmlns:r="{r}">"#,
            r#"<xdr:from><xdr:col>{col}</xdr:col><xdr:colOff>0</xdr:colOff><xdr:row>{row}</xdr:row><xdr:rowOff>0</xdr:rowOff></xdr:from>"#,
            r#"<xdr:ext cx="{cx}" cy="{cy}"/>"#,
            r#"<xdr:pic><xdr:nvPicPr><xdr:cNvPr id="{id}" name="Picture {id}" descr="{descr}"/><xdr:cNvPicPr><a:picLocks noChangeAspect="1"/></xdr:cNvPicPr></xdr:nvPicPr>"#,
            r#"<xdr:blipFill><a:blip r:embed="{embed}"/><a:stretch><a:fillRect/></a:stretch></xdr:blipFill>"#,
            r#"<xdr:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></xdr:spPr></xdr:pic>"#,
            r#"<xdr:clientData/></xdr:oneCellAnchor>"#
        ),
        xdr = XDR_NS,
        a = A_NS,
        r = R_NS,
        col = col,
        row = row,
        cx = cx,
        cy = cy,
        id = object_id,
        descr = descr,
        embed = escape(embed_rel_id),
    )
}
