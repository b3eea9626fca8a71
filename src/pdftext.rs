use std::fs;
use std::path::Path;
use std::process::Command;

use tracing::debug;

use crate::error::SpoolError;

/// Full document text for one invoice. PDFs go through a `pdftotext`
/// shell-out; plain-text files are read as-is.
pub fn document_text(path: &Path) -> Result<String, SpoolError> {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    if ext == "txt" {
        return fs::read_to_string(path).map_err(|err| SpoolError::TextExtraction {
            path: path.display().to_string(),
            message: err.to_string(),
        });
    }

    extract_with_pdftotext(path)
}

fn extract_with_pdftotext(path: &Path) -> Result<String, SpoolError> {
    let output = Command::new("pdftotext")
        .arg("-enc")
        .arg("UTF-8")
        .arg(path)
        .arg("-")
        .output()
        .map_err(|err| SpoolError::TextExtraction {
            path: path.display().to_string(),
            message: format!("failed to execute pdftotext: {err}"),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SpoolError::TextExtraction {
            path: path.display().to_string(),
            message: format!("pdftotext returned non-zero exit status: {}", stderr.trim()),
        });
    }

    let raw = String::from_utf8_lossy(&output.stdout);
    let text = raw.replace('\u{0000}', "").replace('\u{000C}', "\n");
    debug!(path = %path.display(), chars = text.len(), "extracted document text");

    Ok(text)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn txt_documents_are_read_directly() {
        let mut file = NamedTempFile::with_suffix(".txt").unwrap();
        writeln!(file, "Invoice Number : INV/1").unwrap();

        let text = document_text(file.path()).unwrap();
        assert!(text.contains("INV/1"));
    }

    #[test]
    fn missing_txt_document_is_an_extraction_error() {
        let err = document_text(Path::new("no-such-invoice.txt")).unwrap_err();
        assert!(matches!(err, SpoolError::TextExtraction { .. }));
    }
}
