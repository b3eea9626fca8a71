use std::fs;
use std::path::Path;

use anyhow::{Result, bail};
use chrono::{Local, NaiveDate};
use tracing::{info, warn};

use crate::cli::GenerateArgs;
use crate::error::{DocumentRejection, SpoolError};
use crate::extract::InvoiceExtractor;
use crate::integrity::IntegrityValidator;
use crate::model::{BatchReport, ExtractedInvoice, HeaderFields, InvoiceOutcome, ScheduleRow};
use crate::pdftext;
use crate::reconcile;
use crate::schedule;
use crate::spool;
use crate::util::{ensure_directory, now_utc_string, sha256_file, write_json_pretty};

/// At most this many rejections are spelled out in the end-of-batch log;
/// the full detail always lands in the report.
const REJECTION_LOG_CAP: usize = 5;

pub fn run(args: GenerateArgs) -> Result<()> {
    let dispatch_date = resolve_dispatch_date(args.dispatch_date.as_deref())?;
    let extractor = InvoiceExtractor::new()?;
    let validator = IntegrityValidator::new()?;

    let rows = schedule::load_schedule(&args.schedule, args.mode, dispatch_date)?;
    info!(
        path = %args.schedule.display(),
        rows = rows.len(),
        mode = args.mode.as_str(),
        "loaded delivery schedule"
    );

    ensure_directory(&args.output_dir)?;

    let mut outcomes = Vec::new();
    for path in &args.invoices {
        let outcome = process_invoice(path, &args, &extractor, &validator, &rows);
        if outcome.is_written() {
            info!(
                source = %outcome.source,
                invoice_no = %outcome.invoice_no,
                lines = outcome.lines_written,
                "wrote spool file"
            );
        }
        outcomes.push(outcome);
    }

    let rejected: Vec<&InvoiceOutcome> = outcomes.iter().filter(|o| !o.is_written()).collect();
    for outcome in rejected.iter().take(REJECTION_LOG_CAP) {
        let reason = outcome
            .rejection
            .as_ref()
            .map(DocumentRejection::summary)
            .unwrap_or_default();
        warn!(source = %outcome.source, reason = %reason, "invoice rejected");
    }
    if rejected.len() > REJECTION_LOG_CAP {
        warn!(
            more = rejected.len() - REJECTION_LOG_CAP,
            "further invoices rejected, see report"
        );
    }

    let files_written = outcomes.len() - rejected.len();
    let report = BatchReport {
        manifest_version: 1,
        generated_at: now_utc_string(),
        mode: args.mode.as_str().to_string(),
        schedule_path: args.schedule.display().to_string(),
        dispatch_date: dispatch_date.format("%d-%m-%Y").to_string(),
        invoice_count: outcomes.len(),
        files_written,
        rejected_count: rejected.len(),
        outcomes,
    };

    if let Some(path) = &args.report_path {
        write_json_pretty(path, &report)?;
        info!(path = %path.display(), "wrote batch report");
    }

    info!(
        invoices = report.invoice_count,
        written = report.files_written,
        rejected = report.rejected_count,
        output_dir = %args.output_dir.display(),
        "batch complete"
    );

    if report.invoice_count > 0 && report.files_written == 0 {
        bail!("no spool files were produced");
    }

    Ok(())
}

/// The full per-invoice pipeline. Every failure is captured as an outcome so
/// one bad document never aborts the batch.
fn process_invoice(
    path: &Path,
    args: &GenerateArgs,
    extractor: &InvoiceExtractor,
    validator: &IntegrityValidator,
    rows: &[ScheduleRow],
) -> InvoiceOutcome {
    let source = path.display().to_string();
    let sha256 = sha256_file(path).ok();

    let text = match pdftext::document_text(path) {
        Ok(text) => text,
        Err(err) => {
            return InvoiceOutcome::rejected(
                source,
                sha256,
                String::new(),
                DocumentRejection::ExtractionFailed {
                    message: err.to_string(),
                },
            );
        }
    };

    let extracted = extractor.extract(&text);
    let invoice_no = extracted.header.invoice_no.clone();

    if extracted.is_unusable() {
        return InvoiceOutcome::rejected(
            source,
            sha256,
            invoice_no,
            DocumentRejection::ExtractionFailed {
                message: "no usable header fields or line items found".to_string(),
            },
        );
    }

    let integrity = validator.validate(&extracted, path);
    if !integrity.is_valid() {
        return InvoiceOutcome::rejected(
            source,
            sha256,
            invoice_no,
            DocumentRejection::ValidationFailed {
                violations: integrity.violations,
            },
        );
    }

    let reconciled = match reconcile::reconcile(rows, &extracted, args.mode) {
        Ok(reconciled) => reconciled,
        Err(rejection) => return InvoiceOutcome::rejected(source, sha256, invoice_no, rejection),
    };

    let header = header_fields(&extracted, args);
    let mut messages = validator.header_field_errors(&header);
    messages.extend(validator.row_field_errors(&reconciled, args.mode));
    if !messages.is_empty() {
        return InvoiceOutcome::rejected(
            source,
            sha256,
            invoice_no,
            DocumentRejection::MissingFields { messages },
        );
    }

    let output_path = args
        .output_dir
        .join(format!("{}.txt", file_stem(&invoice_no)));
    let mut body = String::with_capacity(reconciled.len() * (spool::LINE_LENGTH + 1));
    for row in &reconciled {
        body.push_str(&spool::encode_line(row, &header, args.mode));
        body.push('\n');
    }

    if let Err(err) = fs::write(&output_path, body) {
        return InvoiceOutcome::rejected(
            source,
            sha256,
            invoice_no,
            DocumentRejection::WriteFailed {
                message: err.to_string(),
            },
        );
    }

    InvoiceOutcome::written(
        source,
        sha256,
        invoice_no,
        output_path.display().to_string(),
        reconciled.len(),
    )
}

fn header_fields(extracted: &ExtractedInvoice, args: &GenerateArgs) -> HeaderFields {
    let mut fields = HeaderFields::from_header(&extracted.header);
    apply_override(&mut fields.vendor_code, args.vendor_code.as_deref());
    apply_override(&mut fields.challan_no, args.challan_no.as_deref());
    apply_override(&mut fields.challan_date, args.challan_date.as_deref());
    apply_override(&mut fields.po_number, args.po_number.as_deref());
    fields
}

fn apply_override(field: &mut String, value: Option<&str>) {
    if let Some(value) = value {
        if !value.trim().is_empty() {
            *field = value.trim().to_string();
        }
    }
}

fn resolve_dispatch_date(value: Option<&str>) -> Result<NaiveDate, SpoolError> {
    match value {
        Some(value) => NaiveDate::parse_from_str(value.trim(), "%d-%m-%Y").map_err(|_| {
            SpoolError::InvalidDispatchDate {
                value: value.to_string(),
            }
        }),
        None => Ok(Local::now().date_naive()),
    }
}

/// Invoice numbers can carry path separators; only the final segment names
/// the output file.
fn file_stem(invoice_no: &str) -> String {
    let trimmed = invoice_no.trim();
    trimmed
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(trimmed)
        .to_string()
}
