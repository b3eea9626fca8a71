use anyhow::{Result, bail};
use tracing::{info, warn};

use crate::cli::CheckArgs;
use crate::extract::InvoiceExtractor;
use crate::integrity::IntegrityValidator;
use crate::model::{CheckManifest, CheckResult};
use crate::pdftext;
use crate::util::{now_utc_string, write_json_pretty};

pub fn run(args: CheckArgs) -> Result<()> {
    let extractor = InvoiceExtractor::new()?;
    let validator = IntegrityValidator::new()?;

    let mut results = Vec::new();
    for path in &args.invoices {
        let result = match pdftext::document_text(path) {
            Ok(text) => {
                let extracted = extractor.extract(&text);
                let report = validator.validate(&extracted, path);
                CheckResult {
                    source: path.display().to_string(),
                    invoice_no: extracted.header.invoice_no,
                    valid: report.is_valid(),
                    violations: report.violations,
                }
            }
            Err(err) => CheckResult {
                source: path.display().to_string(),
                invoice_no: String::new(),
                valid: false,
                violations: vec![err.to_string()],
            },
        };

        if result.valid {
            info!(source = %result.source, "invoice passed integrity checks");
        } else {
            warn!(
                source = %result.source,
                violations = result.violations.len(),
                "invoice failed integrity checks"
            );
            for violation in &result.violations {
                warn!(source = %result.source, violation = %violation, "violation");
            }
        }

        results.push(result);
    }

    let failed = results.iter().filter(|r| !r.valid).count();
    let manifest = CheckManifest {
        manifest_version: 1,
        generated_at: now_utc_string(),
        invoice_count: results.len(),
        passed: results.len() - failed,
        failed,
        results,
    };

    if let Some(path) = &args.report_path {
        write_json_pretty(path, &manifest)?;
        info!(path = %path.display(), "wrote check report");
    }

    info!(
        invoices = manifest.invoice_count,
        passed = manifest.passed,
        failed = manifest.failed,
        "integrity check complete"
    );

    if failed > 0 {
        bail!("{failed} of {} invoices failed integrity checks", manifest.invoice_count);
    }

    Ok(())
}
