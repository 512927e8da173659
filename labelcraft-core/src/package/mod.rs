//! OPC package access: the zip part map behind an `.xlsx` file

pub mod content_types;
pub mod relationships;

pub use content_types::ContentTypes;
pub use relationships::{Relationship, Relationships, rel_type};

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::io::{Cursor, Read, Seek, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
pub const ROOT_RELS_PART: &str = "_rels/.rels";

/// Every part of a package, keyed by its zip entry name (no leading slash)
#[derive(Debug, Clone, Default)]
pub struct Package {
    parts: BTreeMap<String, Vec<u8>>,
}

impl Package {
    /// Read all parts of a zip archive into memory
    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut archive = ZipArchive::new(reader).context("Failed to open zip archive")?;
        let mut parts = BTreeMap::new();

        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            let mut buffer = Vec::with_capacity(usize::try_from(file.size()).unwrap_or(0));
            file.read_to_end(&mut buffer)
                .with_context(|| format!("Failed to read package part {}", name))?;
            parts.insert(name, buffer);
        }

        Ok(Self { parts })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_reader(Cursor::new(bytes))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.parts.contains_key(name)
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.parts.get(name).map(|v| v.as_slice())
    }

    /// Read a part as UTF-8 text
    pub fn part_str(&self, name: &str) -> Result<String> {
        let bytes = self
            .part(name)
            .with_context(|| format!("Missing package part {}", name))?;
        String::from_utf8(bytes.to_vec()).with_context(|| format!("Part {} is not UTF-8", name))
    }

    pub fn set_part(&mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.parts.insert(name.into(), data.into());
    }

    pub fn remove_part(&mut self, name: &str) -> Option<Vec<u8>> {
        self.parts.remove(name)
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.keys().map(|k| k.as_str())
    }

    /// First free part name of the form `{dir}/{stem}{n}.{ext}`, n >= 1
    pub fn next_part_name(&self, dir: &str, stem: &str, ext: &str) -> String {
        (1..)
            .map(|n| format!("{}/{}{}.{}", dir, stem, n, ext))
            .find(|name| !self.parts.contains_key(name))
            .unwrap_or_default()
    }

    /// Write the package as a zip archive. `[Content_Types].xml` and the root
    /// relationships go first, the way spreadsheet applications write them.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut zip_writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let leading = [CONTENT_TYPES_PART, ROOT_RELS_PART];
        for name in leading {
            if let Some(data) = self.parts.get(name) {
                zip_writer.start_file(name, options)?;
                zip_writer.write_all(data)?;
            }
        }

        for (name, data) in &self.parts {
            if leading.contains(&name.as_str()) {
                continue;
            }
            zip_writer.start_file(name.as_str(), options)?;
            zip_writer.write_all(data)?;
        }

        Ok(zip_writer.finish()?.into_inner())
    }
}

/// Relationship part for a given part: `xl/worksheets/sheet1.xml` ->
/// `xl/worksheets/_rels/sheet1.xml.rels`
pub fn rels_path_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", part),
    }
}

fn part_dir(part: &str) -> &str {
    part.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Resolve a relationship target relative to the part that owns the relationship
pub fn resolve_target(source_part: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }

    let mut segments: Vec<&str> = part_dir(source_part)
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Relative target from `source_part` to `target_part`, both package-absolute
pub fn relative_target(source_part: &str, target_part: &str) -> String {
    let from: Vec<&str> = part_dir(source_part)
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();
    let to: Vec<&str> = target_part.split('/').collect();

    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let mut segments: Vec<&str> = vec![".."; from.len() - common];
    segments.extend_from_slice(&to[common..]);
    segments.join("/")
}
