use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{DocumentRejection, QuantityMismatch};
use crate::model::{BusinessMode, ExtractedInvoice, LineItem, ReconciledRow, ScheduleRow};
use crate::util::{coerce_quantity, format_quantity, normalize_part_code};

/// Line-item lookup: exact normalized match first, then symmetric substring
/// containment. The fallback tolerates truncated codes but can false-match
/// short codes; when it fires it is logged so the match can be audited.
pub fn find_line_item<'a>(
    part_number: &str,
    items: &'a BTreeMap<String, LineItem>,
) -> Option<&'a LineItem> {
    if part_number.trim().is_empty() {
        return None;
    }

    let normalized = normalize_part_code(part_number);
    if let Some(item) = items.get(&normalized) {
        return Some(item);
    }

    for (key, item) in items {
        if key.contains(&normalized) || normalized.contains(key.as_str()) {
            debug!(part = %part_number, matched = %key, "line item matched via containment fallback");
            return Some(item);
        }
    }

    None
}

/// Reconciles the external schedule rows against one extracted invoice.
/// Either every surviving row is returned or the whole invoice is rejected;
/// partial acceptance is not permitted.
pub fn reconcile(
    rows: &[ScheduleRow],
    extracted: &ExtractedInvoice,
    mode: BusinessMode,
) -> Result<Vec<ReconciledRow>, DocumentRejection> {
    let invoice_no = extracted.header.invoice_no.trim();

    // Invoice-number equality is exact after trimming; the mode-dependent
    // schedule identifier must be present to drop administrative rows.
    let matching: Vec<&ScheduleRow> = rows
        .iter()
        .filter(|row| row.invoice_no.trim() == invoice_no)
        .filter(|row| !row.schedule_no.trim().is_empty())
        .filter(|row| find_line_item(&row.part_number, &extracted.line_items).is_some())
        .collect();

    if matching.is_empty() {
        return Err(DocumentRejection::NoMatchingRows {
            invoice_no: invoice_no.to_string(),
        });
    }

    let mut totals: BTreeMap<String, i64> = BTreeMap::new();
    for row in &matching {
        let part = row.part_number.trim();
        if part.is_empty() {
            continue;
        }
        *totals.entry(part.to_string()).or_insert(0) += coerce_quantity(&row.quantity);
    }

    let mut mismatches = Vec::new();
    for (part, schedule_qty) in &totals {
        let Some(item) = find_line_item(part, &extracted.line_items) else {
            continue;
        };

        let invoice_qty = coerce_quantity(&item.quantity);
        if invoice_qty != *schedule_qty {
            let part_number = if item.item_code.is_empty() {
                part.clone()
            } else {
                item.item_code.clone()
            };
            mismatches.push(QuantityMismatch {
                part_number,
                invoice_qty,
                schedule_qty: *schedule_qty,
            });
        }
    }

    if !mismatches.is_empty() {
        return Err(DocumentRejection::QuantityMismatch { mismatches });
    }

    let header = &extracted.header;
    let reconciled = matching
        .iter()
        .map(|row| {
            let item = find_line_item(&row.part_number, &extracted.line_items);
            ReconciledRow {
                schedule_no: row.schedule_no.trim().to_string(),
                part_number: row.part_number.trim().to_string(),
                quantity: format_quantity(&row.quantity),
                packing_qty: format_quantity(&row.packing_qty),
                batch_code: if mode.is_spare() {
                    row.batch_code.trim().to_string()
                } else {
                    String::new()
                },
                hsn_code: item.map(|i| i.hsn_code.clone()).unwrap_or_default(),
                rate: item.map(|i| i.rate.clone()).unwrap_or_default(),
                gst_no: header.gst_no.clone(),
                po_number: header.po_number.clone(),
                cgst_amount: header.cgst_amount.clone(),
                sgst_amount: header.sgst_amount.clone(),
                igst_amount: header.igst_amount.clone(),
                eway_bill: header.eway_bill.clone(),
                total_value: header.total_value.clone(),
                irn: header.irn.clone(),
            }
        })
        .collect();

    Ok(reconciled)
}

#[cfg(test)]
mod tests {
    use crate::model::InvoiceHeader;

    use super::*;

    fn invoice(invoice_no: &str, items: &[(&str, &str)]) -> ExtractedInvoice {
        let mut line_items = BTreeMap::new();
        for (code, qty) in items {
            line_items.insert(
                normalize_part_code(code),
                LineItem {
                    serial_no: "1".to_string(),
                    material_code: "123456-78901".to_string(),
                    item_code: code.to_string(),
                    hsn_code: "84099111".to_string(),
                    quantity: qty.to_string(),
                    rate: "1234.500".to_string(),
                },
            );
        }

        ExtractedInvoice {
            header: InvoiceHeader {
                invoice_no: invoice_no.to_string(),
                gst_no: "27ABCDE1234F1Z5".to_string(),
                po_number: "4500012345".to_string(),
                cgst_amount: "9000.00".to_string(),
                sgst_amount: "9000.00".to_string(),
                eway_bill: "0".to_string(),
                total_value: "145000.00".to_string(),
                ..InvoiceHeader::default()
            },
            line_items,
            is_original: true,
            raw_text: String::new(),
        }
    }

    fn row(invoice_no: &str, part: &str, schedule_no: &str, qty: &str) -> ScheduleRow {
        ScheduleRow {
            invoice_no: invoice_no.to_string(),
            part_number: part.to_string(),
            schedule_no: schedule_no.to_string(),
            quantity: qty.to_string(),
            packing_qty: "50".to_string(),
            batch_code: "B2404".to_string(),
        }
    }

    #[test]
    fn split_schedule_rows_summing_to_the_invoice_quantity_reconcile() {
        let extracted = invoice("INV/1", &[("ABC-123", "100")]);
        let rows = vec![
            row("INV/1", "ABC123", "KB1", "60"),
            row("INV/1", "ABC123", "KB2", "40"),
            row("INV/2", "ABC123", "KB3", "10"),
        ];

        let reconciled = reconcile(&rows, &extracted, BusinessMode::Direct).unwrap();
        assert_eq!(reconciled.len(), 2);
        assert_eq!(reconciled[0].schedule_no, "KB1");
        assert_eq!(reconciled[0].quantity, "60");
        assert_eq!(reconciled[0].hsn_code, "84099111");
        assert_eq!(reconciled[0].rate, "1234.500");
        assert_eq!(reconciled[0].gst_no, "27ABCDE1234F1Z5");

        // Per-part sums equal the invoice quantity on success.
        let sum: i64 = reconciled.iter().map(|r| coerce_quantity(&r.quantity)).sum();
        assert_eq!(sum, 100);
    }

    #[test]
    fn quantity_shortfall_rejects_the_whole_invoice() {
        let extracted = invoice("INV/1", &[("ABC-123", "100")]);
        let rows = vec![
            row("INV/1", "ABC123", "KB1", "60"),
            row("INV/1", "ABC123", "KB2", "30"),
        ];

        let rejection = reconcile(&rows, &extracted, BusinessMode::Direct).unwrap_err();
        match rejection {
            DocumentRejection::QuantityMismatch { mismatches } => {
                assert_eq!(mismatches.len(), 1);
                assert_eq!(mismatches[0].part_number, "ABC-123");
                assert_eq!(mismatches[0].invoice_qty, 100);
                assert_eq!(mismatches[0].schedule_qty, 90);
            }
            other => panic!("expected quantity mismatch, got {other:?}"),
        }
    }

    #[test]
    fn one_mismatched_part_rejects_even_when_others_balance() {
        let extracted = invoice("INV/1", &[("ABC-123", "100"), ("DEF-456", "50")]);
        let rows = vec![
            row("INV/1", "ABC123", "KB1", "100"),
            row("INV/1", "DEF456", "KB2", "45"),
        ];

        let rejection = reconcile(&rows, &extracted, BusinessMode::Direct).unwrap_err();
        match rejection {
            DocumentRejection::QuantityMismatch { mismatches } => {
                assert_eq!(mismatches.len(), 1);
                assert_eq!(mismatches[0].part_number, "DEF-456");
            }
            other => panic!("expected quantity mismatch, got {other:?}"),
        }
    }

    #[test]
    fn invoice_numbers_match_exactly_after_trimming() {
        let extracted = invoice("INV/2026/001 ", &[("ABC-123", "10")]);
        let rows = vec![row("INV/2026/001", "ABC123", "KB1", "10")];

        let reconciled = reconcile(&rows, &extracted, BusinessMode::Direct).unwrap();
        assert_eq!(reconciled.len(), 1);

        // Case still matters after trimming.
        let lowercase = invoice("inv/2026/001", &[("ABC-123", "10")]);
        let rejection = reconcile(&rows, &lowercase, BusinessMode::Direct).unwrap_err();
        assert!(matches!(rejection, DocumentRejection::NoMatchingRows { .. }));
    }

    #[test]
    fn rows_without_a_schedule_identifier_are_dropped() {
        let extracted = invoice("INV/1", &[("ABC-123", "60")]);
        let rows = vec![
            row("INV/1", "ABC123", "KB1", "60"),
            row("INV/1", "ABC123", "", "40"),
        ];

        let reconciled = reconcile(&rows, &extracted, BusinessMode::Direct).unwrap();
        assert_eq!(reconciled.len(), 1);
    }

    #[test]
    fn no_surviving_rows_is_a_distinct_rejection() {
        let extracted = invoice("INV/1", &[("ABC-123", "100")]);
        let rows = vec![row("INV/9", "ABC123", "KB1", "100")];

        let rejection = reconcile(&rows, &extracted, BusinessMode::Direct).unwrap_err();
        match rejection {
            DocumentRejection::NoMatchingRows { invoice_no } => {
                assert_eq!(invoice_no, "INV/1");
            }
            other => panic!("expected no-matching-rows, got {other:?}"),
        }
    }

    #[test]
    fn containment_fallback_matches_truncated_codes() {
        let extracted = invoice("INV/1", &[("12345A-67890", "10")]);
        let rows = vec![row("INV/1", "12345A-67890-1", "KB1", "10")];

        let reconciled = reconcile(&rows, &extracted, BusinessMode::Direct).unwrap();
        assert_eq!(reconciled.len(), 1);
        assert_eq!(reconciled[0].part_number, "12345A-67890-1");
    }

    #[test]
    fn batch_code_is_carried_only_in_spare_mode() {
        let extracted = invoice("INV/1", &[("ABC-123", "10")]);
        let rows = vec![row("INV/1", "ABC123", "DI1", "10")];

        let direct = reconcile(&rows, &extracted, BusinessMode::Direct).unwrap();
        assert_eq!(direct[0].batch_code, "");

        let spare = reconcile(&rows, &extracted, BusinessMode::Spare).unwrap();
        assert_eq!(spare[0].batch_code, "B2404");
    }

    #[test]
    fn blank_quantities_coerce_to_zero_for_comparison() {
        let extracted = invoice("INV/1", &[("ABC-123", "0")]);
        let rows = vec![row("INV/1", "ABC123", "KB1", "")];

        let reconciled = reconcile(&rows, &extracted, BusinessMode::Direct).unwrap();
        assert_eq!(reconciled[0].quantity, "");
    }
}
