use std::collections::BTreeMap;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::DocumentRejection;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum BusinessMode {
    /// Direct distribution (OE) deliveries
    Direct,
    /// Spare-parts deliveries
    Spare,
}

impl BusinessMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Spare => "spare",
        }
    }

    /// Mode flag byte written into the spool line.
    pub fn flag(self) -> &'static str {
        match self {
            Self::Direct => "1",
            Self::Spare => "S",
        }
    }

    pub fn is_spare(self) -> bool {
        matches!(self, Self::Spare)
    }
}

/// Header fields pulled out of the invoice text. The empty string means the
/// anchor was not found in the source; downstream validation reports it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvoiceHeader {
    pub invoice_no: String,
    pub invoice_date: String,
    pub po_number: String,
    pub vendor_code: String,
    pub gst_no: String,
    pub irn: String,
    pub total_value: String,
    pub cgst_amount: String,
    pub sgst_amount: String,
    pub igst_amount: String,
    pub eway_bill: String,
}

impl InvoiceHeader {
    pub fn has_any_field(&self) -> bool {
        !self.invoice_no.is_empty()
            || !self.invoice_date.is_empty()
            || !self.po_number.is_empty()
            || !self.vendor_code.is_empty()
            || !self.gst_no.is_empty()
            || !self.irn.is_empty()
            || !self.total_value.is_empty()
            || !self.cgst_amount.is_empty()
            || !self.sgst_amount.is_empty()
            || !self.igst_amount.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub serial_no: String,
    pub material_code: String,
    /// Part code as printed on the invoice, before normalization.
    pub item_code: String,
    pub hsn_code: String,
    pub quantity: String,
    pub rate: String,
}

/// One invoice's extraction result. Line items are keyed by the normalized
/// part code; the raw text is retained for the integrity validator.
#[derive(Debug, Clone)]
pub struct ExtractedInvoice {
    pub header: InvoiceHeader,
    pub line_items: BTreeMap<String, LineItem>,
    pub is_original: bool,
    pub raw_text: String,
}

impl ExtractedInvoice {
    pub fn is_unusable(&self) -> bool {
        self.line_items.is_empty() || !self.header.has_any_field()
    }
}

/// One row of the external delivery-schedule dataset, already resolved
/// through the mode-dependent column map.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScheduleRow {
    pub invoice_no: String,
    pub part_number: String,
    pub schedule_no: String,
    pub quantity: String,
    pub packing_qty: String,
    pub batch_code: String,
}

/// Join of a schedule row with its matched line item and the invoice header's
/// shared fields; carries everything the encoder needs.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciledRow {
    pub schedule_no: String,
    pub part_number: String,
    pub quantity: String,
    pub packing_qty: String,
    pub batch_code: String,
    pub hsn_code: String,
    pub rate: String,
    pub gst_no: String,
    pub po_number: String,
    pub cgst_amount: String,
    pub sgst_amount: String,
    pub igst_amount: String,
    pub eway_bill: String,
    pub total_value: String,
    pub irn: String,
}

/// User-overridable header-level values for the encoder.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HeaderFields {
    pub vendor_code: String,
    pub challan_no: String,
    pub challan_date: String,
    pub invoice_no: String,
    pub invoice_date: String,
    pub po_number: String,
}

impl HeaderFields {
    /// Challan number and date default to the invoice number and date.
    pub fn from_header(header: &InvoiceHeader) -> Self {
        Self {
            vendor_code: header.vendor_code.clone(),
            challan_no: header.invoice_no.clone(),
            challan_date: header.invoice_date.clone(),
            invoice_no: header.invoice_no.clone(),
            invoice_date: header.invoice_date.clone(),
            po_number: header.po_number.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ExtractEntry {
    pub source: String,
    pub is_original: bool,
    pub header: InvoiceHeader,
    pub line_items: BTreeMap<String, LineItem>,
}

#[derive(Debug, Serialize)]
pub struct ExtractManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub invoice_count: usize,
    pub invoices: Vec<ExtractEntry>,
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub source: String,
    pub invoice_no: String,
    pub valid: bool,
    pub violations: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub invoice_count: usize,
    pub passed: usize,
    pub failed: usize,
    pub results: Vec<CheckResult>,
}

#[derive(Debug, Serialize)]
pub struct InvoiceOutcome {
    pub source: String,
    pub sha256: Option<String>,
    pub invoice_no: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection: Option<DocumentRejection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    pub lines_written: usize,
}

impl InvoiceOutcome {
    pub fn written(
        source: String,
        sha256: Option<String>,
        invoice_no: String,
        output_path: String,
        lines_written: usize,
    ) -> Self {
        Self {
            source,
            sha256,
            invoice_no,
            status: "written".to_string(),
            rejection: None,
            output_path: Some(output_path),
            lines_written,
        }
    }

    pub fn rejected(
        source: String,
        sha256: Option<String>,
        invoice_no: String,
        rejection: DocumentRejection,
    ) -> Self {
        Self {
            source,
            sha256,
            invoice_no,
            status: "rejected".to_string(),
            rejection: Some(rejection),
            output_path: None,
            lines_written: 0,
        }
    }

    pub fn is_written(&self) -> bool {
        self.status == "written"
    }
}

#[derive(Debug, Serialize)]
pub struct BatchReport {
    pub manifest_version: u32,
    pub generated_at: String,
    pub mode: String,
    pub schedule_path: String,
    pub dispatch_date: String,
    pub invoice_count: usize,
    pub files_written: usize,
    pub rejected_count: usize,
    pub outcomes: Vec<InvoiceOutcome>,
}
