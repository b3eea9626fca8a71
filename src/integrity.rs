use std::path::Path;

use anyhow::{Context, Result};
use lopdf::{Dictionary, Document, Object};
use regex::Regex;
use tracing::{debug, warn};

use crate::model::{BusinessMode, ExtractedInvoice, HeaderFields, ReconciledRow};

const GSTIN_STATE_MIN: u32 = 1;
const GSTIN_STATE_MAX: u32 = 37;

const SIGNATURE_PHRASES: &[&str] = &[
    r"(?i)Digitally\s+signed\s+by\s+[A-Z\s]+",
    r"(?i)Digitally\s+signed\s+by.*Date:\d{4}\.\d{2}\.\d{2}",
    r"(?i)Digital\s+Signature.*Date:",
];

pub struct DocumentSource<'a> {
    pub path: &'a Path,
    pub text: &'a str,
}

#[derive(Debug)]
pub struct IntegrityReport {
    pub violations: Vec<String>,
}

impl IntegrityReport {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

pub struct IntegrityValidator {
    irn_hex: Regex,
    gstin: Regex,
    detectors: Vec<Box<dyn SignatureDetector>>,
}

impl IntegrityValidator {
    pub fn new() -> Result<Self> {
        let phrases = signature_phrases()?;

        Ok(Self {
            irn_hex: compile(r"(?i)^[a-f0-9]{64}$")?,
            gstin: compile(r"(?i)^\d{2}[A-Z]{5}\d{4}[A-Z][1-9A-Z]Z[0-9A-Z]$")?,
            detectors: vec![
                Box::new(ExtractedTextDetector {
                    phrases: phrases.clone(),
                }),
                Box::new(PageOverlayDetector { phrases }),
                Box::new(AnnotationDetector),
            ],
        })
    }

    /// All rules are evaluated; every violation is collected. Missing fields
    /// are violations, never errors.
    pub fn validate(&self, extracted: &ExtractedInvoice, path: &Path) -> IntegrityReport {
        let mut violations = Vec::new();

        let irn = extracted.header.irn.trim();
        if irn.is_empty() {
            violations.push("IRN number not found in invoice".to_string());
        } else if irn.len() != 64 {
            violations.push(format!(
                "IRN number has invalid length: {} chars (expected 64)",
                irn.len()
            ));
        } else if !self.irn_hex.is_match(irn) {
            violations.push("IRN number contains non-hex characters".to_string());
        }

        if !extracted.is_original {
            violations.push("invoice is not an 'Original for Recipient' copy".to_string());
        }

        let source = DocumentSource {
            path,
            text: &extracted.raw_text,
        };
        if !self.signature_present(&source) {
            violations.push(
                "digital signature marker not found (expected 'Digitally signed by ...' with signer name)"
                    .to_string(),
            );
        }

        let gst_no = extracted.header.gst_no.trim();
        if gst_no.is_empty() {
            violations.push("GSTIN number not found in invoice".to_string());
        } else {
            violations.extend(self.gstin_violations(gst_no));
        }

        IntegrityReport { violations }
    }

    /// Detector tiers are tried in order; any tier succeeding is sufficient.
    /// A tier that fails with an I/O error is logged and skipped.
    fn signature_present(&self, source: &DocumentSource) -> bool {
        for detector in &self.detectors {
            match detector.detect(source) {
                Ok(true) => {
                    debug!(tier = detector.name(), "signature marker found");
                    return true;
                }
                Ok(false) => {}
                Err(err) => {
                    warn!(tier = detector.name(), error = %err, "signature detector failed");
                }
            }
        }

        false
    }

    fn gstin_violations(&self, gst_no: &str) -> Vec<String> {
        if !self.gstin.is_match(gst_no) {
            return vec![format!("GSTIN number format invalid: {gst_no}")];
        }

        // Pattern guarantees two leading digits.
        let state_code: u32 = gst_no[..2].parse().unwrap_or(0);
        if !(GSTIN_STATE_MIN..=GSTIN_STATE_MAX).contains(&state_code) {
            return vec![format!(
                "GSTIN state code invalid: {state_code} (must be 01-37)"
            )];
        }

        Vec::new()
    }

    /// Header-level required fields, checked just before encoding.
    pub fn header_field_errors(&self, fields: &HeaderFields) -> Vec<String> {
        let required = [
            ("Vendor Code", &fields.vendor_code),
            ("Challan No", &fields.challan_no),
            ("Challan Date", &fields.challan_date),
            ("Invoice No", &fields.invoice_no),
            ("Invoice Date", &fields.invoice_date),
            ("PO Number", &fields.po_number),
        ];

        required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(label, _)| format!("header: {label}"))
            .collect()
    }

    /// Row-level required fields plus a per-row GSTIN re-check, applied to
    /// the reconciled rows just before encoding.
    pub fn row_field_errors(&self, rows: &[ReconciledRow], mode: BusinessMode) -> Vec<String> {
        let mut errors = Vec::new();

        for (index, row) in rows.iter().enumerate() {
            let mut problems = Vec::new();

            let required = [
                ("Schedule No", &row.schedule_no),
                ("Item Code", &row.part_number),
                ("Qty", &row.quantity),
                ("PO Number", &row.po_number),
                ("GST No", &row.gst_no),
                ("HSN Code", &row.hsn_code),
                ("CGST Amount", &row.cgst_amount),
                ("SGST Amount", &row.sgst_amount),
                ("Basic Price", &row.rate),
                ("Total Invoice Value", &row.total_value),
                ("Bin Qty", &row.packing_qty),
            ];
            for (label, value) in required {
                if value.trim().is_empty() {
                    problems.push(label.to_string());
                }
            }
            if mode.is_spare() && row.batch_code.trim().is_empty() {
                problems.push("Batch No".to_string());
            }

            let gst_no = row.gst_no.trim();
            if !gst_no.is_empty() {
                problems.extend(self.gstin_violations(gst_no));
            }

            if !problems.is_empty() {
                let label = if row.part_number.trim().is_empty() {
                    format!("row {}", index + 1)
                } else {
                    row.part_number.trim().to_string()
                };
                errors.push(format!("row '{}': {}", label, problems.join(", ")));
            }
        }

        errors
    }
}

trait SignatureDetector {
    fn name(&self) -> &'static str;
    fn detect(&self, source: &DocumentSource) -> Result<bool>;
}

/// Tier 1: phrase search over the already-extracted document text.
struct ExtractedTextDetector {
    phrases: Vec<Regex>,
}

impl SignatureDetector for ExtractedTextDetector {
    fn name(&self) -> &'static str {
        "extracted-text"
    }

    fn detect(&self, source: &DocumentSource) -> Result<bool> {
        Ok(self.phrases.iter().any(|p| p.is_match(source.text)))
    }
}

/// Tier 2: structure-aware re-extraction. Signature overlays are often
/// invisible to the primary text extractor, so each page is re-read through
/// the PDF object layer and checked for the phrases and for signature-type
/// form-field widgets.
struct PageOverlayDetector {
    phrases: Vec<Regex>,
}

impl SignatureDetector for PageOverlayDetector {
    fn name(&self) -> &'static str {
        "page-overlay"
    }

    fn detect(&self, source: &DocumentSource) -> Result<bool> {
        if !is_pdf(source.path) {
            return Ok(false);
        }

        let document = Document::load(source.path)
            .with_context(|| format!("failed to open {}", source.path.display()))?;

        for (&page_no, &page_id) in &document.get_pages() {
            if let Ok(page_text) = document.extract_text(&[page_no]) {
                if self.phrases.iter().any(|p| p.is_match(&page_text)) {
                    return Ok(true);
                }
            }

            for annotation in page_annotations(&document, page_id) {
                if field_type_is_signature(annotation) {
                    return Ok(true);
                }
            }
        }

        Ok(false)
    }
}

/// Tier 3: last resort, inspect annotation objects for a signature field
/// whose value carries a non-empty signer name.
struct AnnotationDetector;

impl SignatureDetector for AnnotationDetector {
    fn name(&self) -> &'static str {
        "annotation"
    }

    fn detect(&self, source: &DocumentSource) -> Result<bool> {
        if !is_pdf(source.path) {
            return Ok(false);
        }

        let document = Document::load(source.path)
            .with_context(|| format!("failed to open {}", source.path.display()))?;

        for (_, &page_id) in &document.get_pages() {
            for annotation in page_annotations(&document, page_id) {
                if !field_type_is_signature(annotation) {
                    continue;
                }

                let Ok(value) = annotation.get(b"V") else {
                    continue;
                };
                if let Ok(signature) = resolve(&document, value).as_dict() {
                    if let Ok(name) = signature.get(b"Name") {
                        if let Object::String(bytes, _) = resolve(&document, name) {
                            if !bytes.is_empty() {
                                return Ok(true);
                            }
                        }
                    }
                }
            }
        }

        Ok(false)
    }
}

fn signature_phrases() -> Result<Vec<Regex>> {
    SIGNATURE_PHRASES.iter().map(|p| compile(p)).collect()
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).with_context(|| format!("failed to compile pattern: {pattern}"))
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

fn page_annotations<'a>(document: &'a Document, page_id: lopdf::ObjectId) -> Vec<&'a Dictionary> {
    let Ok(page) = document.get_dictionary(page_id) else {
        return Vec::new();
    };
    let Ok(annots) = page.get(b"Annots") else {
        return Vec::new();
    };
    let Ok(entries) = resolve(document, annots).as_array() else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| resolve(document, entry).as_dict().ok())
        .collect()
}

fn field_type_is_signature(annotation: &Dictionary) -> bool {
    matches!(
        annotation.get(b"FT").and_then(|object| object.as_name()),
        Ok(b"Sig")
    )
}

fn resolve<'a>(document: &'a Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => document.get_object(*id).unwrap_or(object),
        _ => object,
    }
}
