//! labelcraft: template sheet cloning and QR label generation for XLSX workbooks
//!
//! A template workbook holds one layout sheet. For every data row the sheet is
//! cloned with its formatting intact, mapped fields are written into the clone
//! (redirected to merge anchors), and QR codes are rendered and anchored at the
//! configured cells.

pub mod address;
pub mod clone;
pub mod config;
pub mod error;
pub mod extract;
pub mod generate;
pub mod lookup;
pub mod mapping;
pub mod package;
pub mod qr;
pub mod reader;
pub mod resolve;
pub mod stamp;
pub mod storage;
pub mod writer;

mod xml_helpers;

pub use address::{CellRange, CellRef};
pub use clone::clone_sheet;
pub use config::GeneratorConfig;
pub use error::GenerateError;
pub use extract::{ExtractedLabels, extract_mapped_values};
pub use generate::{GenerateRequest, GeneratedWorkbook, Generator, Stage};
pub use lookup::{EnrichmentLookup, EnrichmentRecord, NoLookup, TableLookup};
pub use mapping::{DataRow, FieldMappingConfig};
pub use qr::{QrImageError, QrRenderer, QrRequest};
pub use reader::{Workbook, Worksheet, read_workbook, read_workbook_bytes};
pub use resolve::{resolve_address, resolve_writable_cell};
pub use stamp::stamp_label_qr_codes;
pub use storage::TemplateStore;
pub use writer::write_workbook_bytes;
