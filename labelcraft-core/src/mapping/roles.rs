//! Recognized field vocabularies and the row attribute each one reads

use super::DataRow;
use crate::lookup::EnrichmentRecord;

/// Semantic id of a global row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalField {
    ItemCode,
    ExternalLot,
    Quantity,
    Unrecognized,
}

impl GlobalField {
    pub fn from_id(id: &str) -> Self {
        match id {
            "item" => GlobalField::ItemCode,
            "lot" => GlobalField::ExternalLot,
            "qty" => GlobalField::Quantity,
            _ => GlobalField::Unrecognized,
        }
    }

    /// Value of this field for `row`; empty for unrecognized ids
    pub fn value<'a>(&self, row: &'a DataRow) -> &'a str {
        match self {
            GlobalField::ItemCode => row.item_code(),
            GlobalField::ExternalLot => row.external_lot(),
            GlobalField::Quantity => row.qty(),
            GlobalField::Unrecognized => "",
        }
    }
}

/// Role of a flat system field, selected by its label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    ItemCode,
    Lot,
    OrderNo,
    ItemAps,
    QrCode,
    Unrecognized,
}

/// What to do with a field for one row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldAction<'a> {
    Write(&'a str),
    /// The field's cell receives the composite QR code
    QrDestination,
    Ignore,
}

impl FieldRole {
    pub fn from_label(label: &str) -> Self {
        match label {
            "ITEM CODE" => FieldRole::ItemCode,
            "LOT" => FieldRole::Lot,
            "ORDER NO." => FieldRole::OrderNo,
            "ITEM APS" => FieldRole::ItemAps,
            "QR CODE" => FieldRole::QrCode,
            _ => FieldRole::Unrecognized,
        }
    }

    pub fn action<'a>(&self, row: &'a DataRow, record: Option<&'a EnrichmentRecord>) -> FieldAction<'a> {
        match self {
            FieldRole::ItemCode => FieldAction::Write(row.item_code()),
            FieldRole::Lot => FieldAction::Write(row.external_lot()),
            FieldRole::OrderNo => FieldAction::Write(row.order_no()),
            FieldRole::ItemAps => FieldAction::Write(record.map(|r| r.item_aps()).unwrap_or_default()),
            FieldRole::QrCode => FieldAction::QrDestination,
            FieldRole::Unrecognized => FieldAction::Ignore,
        }
    }
}
