use anyhow::Result;
use tracing::{info, warn};

use crate::cli::ExtractArgs;
use crate::extract::InvoiceExtractor;
use crate::model::{ExtractEntry, ExtractManifest};
use crate::pdftext;
use crate::util::{now_utc_string, write_json_pretty};

pub fn run(args: ExtractArgs) -> Result<()> {
    let extractor = InvoiceExtractor::new()?;
    let mut entries = Vec::new();

    for path in &args.invoices {
        let text = match pdftext::document_text(path) {
            Ok(text) => text,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping unreadable document");
                continue;
            }
        };

        let extracted = extractor.extract(&text);
        info!(
            path = %path.display(),
            invoice_no = %extracted.header.invoice_no,
            line_items = extracted.line_items.len(),
            "extracted invoice"
        );

        entries.push(ExtractEntry {
            source: path.display().to_string(),
            is_original: extracted.is_original,
            header: extracted.header,
            line_items: extracted.line_items,
        });
    }

    let manifest = ExtractManifest {
        manifest_version: 1,
        generated_at: now_utc_string(),
        invoice_count: entries.len(),
        invoices: entries,
    };

    match &args.output {
        Some(path) => {
            write_json_pretty(path, &manifest)?;
            info!(path = %path.display(), "wrote extraction manifest");
        }
        None => {
            println!("{}", serde_json::to_string_pretty(&manifest)?);
        }
    }

    Ok(())
}
