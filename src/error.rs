use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpoolError {
    #[error("failed to extract text from {path}: {message}")]
    TextExtraction { path: String, message: String },

    #[error("failed to load schedule dataset {path}: {message}")]
    WorkbookLoad { path: String, message: String },

    #[error("invalid dispatch date {value}: expected DD-MM-YYYY")]
    InvalidDispatchDate { value: String },
}

/// Per-document rejection reasons. These are batch-report data, not process
/// failures: one rejected invoice never aborts the batch.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DocumentRejection {
    ExtractionFailed { message: String },
    ValidationFailed { violations: Vec<String> },
    NoMatchingRows { invoice_no: String },
    QuantityMismatch { mismatches: Vec<QuantityMismatch> },
    MissingFields { messages: Vec<String> },
    WriteFailed { message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct QuantityMismatch {
    pub part_number: String,
    pub invoice_qty: i64,
    pub schedule_qty: i64,
}

impl DocumentRejection {
    pub fn summary(&self) -> String {
        match self {
            Self::ExtractionFailed { message } => format!("extraction failed: {message}"),
            Self::ValidationFailed { violations } => {
                format!("integrity violations: {}", cap_join(violations, 3))
            }
            Self::NoMatchingRows { invoice_no } => {
                format!("no matching schedule rows for invoice '{invoice_no}'")
            }
            Self::QuantityMismatch { mismatches } => {
                let details: Vec<String> = mismatches
                    .iter()
                    .map(|m| {
                        format!(
                            "part {} invoice qty {} schedule qty {}",
                            m.part_number, m.invoice_qty, m.schedule_qty
                        )
                    })
                    .collect();
                format!("quantity mismatch: {}", cap_join(&details, 3))
            }
            Self::MissingFields { messages } => {
                format!("missing required fields: {}", cap_join(messages, 3))
            }
            Self::WriteFailed { message } => format!("failed to write spool file: {message}"),
        }
    }
}

fn cap_join(items: &[String], cap: usize) -> String {
    if items.len() <= cap {
        items.join("; ")
    } else {
        format!(
            "{}; ... and {} more",
            items[..cap].join("; "),
            items.len() - cap
        )
    }
}
