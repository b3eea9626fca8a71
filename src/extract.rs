use std::collections::BTreeMap;

use anyhow::{Context, Result};
use regex::{Captures, Regex};
use tracing::{debug, warn};

use crate::model::{ExtractedInvoice, InvoiceHeader, LineItem};
use crate::util::normalize_part_code;

/// One labelled-field anchor. Rules are independent: a rule that does not
/// match leaves its target field empty instead of failing the extraction.
struct AnchorRule {
    name: &'static str,
    pattern: Regex,
    apply: fn(&mut InvoiceHeader, &Captures),
}

pub struct InvoiceExtractor {
    anchors: Vec<AnchorRule>,
    original_copy: Vec<Regex>,
    item_line: Regex,
    item_code: Regex,
}

impl InvoiceExtractor {
    pub fn new() -> Result<Self> {
        let anchors = vec![
            anchor(
                "invoice_no",
                r"(?i)Invoice\s+Number\s*:\s*([A-Z0-9/\-]+)",
                |header, caps| header.invoice_no = group(caps, 1),
            )?,
            anchor(
                "invoice_date",
                r"(?i)Invoice\s+Date\s*:\s*(\d{1,2}-[A-Za-z]{3}-\d{2,4})",
                |header, caps| header.invoice_date = group(caps, 1),
            )?,
            anchor(
                "po_number",
                r"(?i)Cust\s+PO\s+No\.?\s*:\s*(\d+)",
                |header, caps| header.po_number = group(caps, 1),
            )?,
            anchor(
                "vendor_code",
                r"(?i)Reference\s+No\.?\s*:\s*([A-Z]\d{3,})",
                |header, caps| header.vendor_code = group(caps, 1),
            )?,
            anchor(
                "gst_no",
                r"(?i)GSTIN\s+Number\s*:\s*(\d{2}[A-Z]{5}\d{4}[A-Z]\d[A-Z\d]{2})",
                |header, caps| header.gst_no = group(caps, 1),
            )?,
            anchor(
                "irn",
                r"(?i)IRN\s*(?:NO)?[:\s]*([a-f0-9]{64})",
                |header, caps| header.irn = group(caps, 1),
            )?,
            anchor(
                "total_value",
                r"(?i)Invoice\s+Amount\s*\(INR\)\s*([\d,]+\.?\d*)",
                |header, caps| header.total_value = group(caps, 1).replace(',', ""),
            )?,
            anchor(
                "tax_totals",
                r"(?m)^([\d,]{6,}\.[0-9]{2})\s+([\d,]+\.[0-9]{2})\s+([\d,]+\.[0-9]{2})\s+([\d,]+\.[0-9]{2})\s+[\d,]+\.[0-9]{2}\s*$",
                apply_tax_totals,
            )?,
        ];

        let original_copy = vec![
            compile(r"(?i)Original\s+for\s*\n?\s*Recipient")?,
            compile(r"(?i)Original\s+for\s+Recipient")?,
            compile(r"(?i)Tax\s+Invoice\s+Original")?,
        ];

        Ok(Self {
            anchors,
            original_copy,
            item_line: compile(r"(?i)(\d)\s+(\d{6}-\d{5})\s+(\d{8})\s+(\d+)\.00\s+Nos\s+([\d,]+\.\d{3})")?,
            item_code: compile(r"(?i)\(\s*([0-9A-Z]{6}-?[0-9A-Z]{5}(?:-\d+)?)\s*\)")?,
        })
    }

    pub fn extract(&self, text: &str) -> ExtractedInvoice {
        let mut header = InvoiceHeader {
            eway_bill: "0".to_string(),
            ..InvoiceHeader::default()
        };

        for rule in &self.anchors {
            if let Some(caps) = rule.pattern.captures(text) {
                (rule.apply)(&mut header, &caps);
            } else {
                debug!(rule = rule.name, "anchor not found");
            }
        }

        ExtractedInvoice {
            header,
            line_items: self.extract_line_items(text),
            is_original: self.original_copy.iter().any(|p| p.is_match(text)),
            raw_text: text.to_string(),
        }
    }

    /// Two-pass line-item scan: a structural match yields the numeric columns;
    /// the parenthesized part code is searched for in the window between that
    /// match and the next one.
    fn extract_line_items(&self, text: &str) -> BTreeMap<String, LineItem> {
        let matches: Vec<Captures> = self.item_line.captures_iter(text).collect();
        let mut items = BTreeMap::new();

        for (index, caps) in matches.iter().enumerate() {
            let window_start = caps.get(0).map_or(text.len(), |m| m.end());
            let window_end = matches
                .get(index + 1)
                .and_then(|next| next.get(0))
                .map_or(text.len(), |m| m.start());

            let Some(code_caps) = self.item_code.captures(&text[window_start..window_end]) else {
                continue;
            };

            let item_code = group(&code_caps, 1);
            let key = normalize_part_code(&item_code);
            let item = LineItem {
                serial_no: group(caps, 1),
                material_code: group(caps, 2),
                hsn_code: group(caps, 3),
                quantity: group(caps, 4),
                rate: group(caps, 5).replace(',', ""),
                item_code,
            };

            // Last write wins when two table rows normalize to the same code.
            if items.insert(key.clone(), item).is_some() {
                warn!(part = %key, "duplicate normalized part code, keeping later table row");
            }
        }

        items
    }
}

fn anchor(
    name: &'static str,
    pattern: &str,
    apply: fn(&mut InvoiceHeader, &Captures),
) -> Result<AnchorRule> {
    Ok(AnchorRule {
        name,
        pattern: compile(pattern)?,
        apply,
    })
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).with_context(|| format!("failed to compile pattern: {pattern}"))
}

fn group(caps: &Captures, index: usize) -> String {
    caps.get(index)
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

/// The totals line carries five amounts; columns 2-4 are CGST, SGST and IGST.
/// An IGST of zero collapses to empty (intra-state supply).
fn apply_tax_totals(header: &mut InvoiceHeader, caps: &Captures) {
    header.cgst_amount = group(caps, 2).replace(',', "");
    header.sgst_amount = group(caps, 3).replace(',', "");

    let igst = group(caps, 4).replace(',', "");
    header.igst_amount = match igst.parse::<f64>() {
        Ok(value) if value == 0.0 => String::new(),
        _ => igst,
    };
}
