use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::Path;

use calamine::{Data, Reader, open_workbook_auto};
use chrono::NaiveDate;
use csv::ReaderBuilder;
use tracing::{info, warn};

use crate::error::SpoolError;
use crate::model::{BusinessMode, ScheduleRow};

/// Mode-dependent dataset column names. Headers are matched after trimming
/// and uppercasing. "PACKING STANDERD" is spelled the way the upstream
/// dataset spells it.
pub struct ColumnMap {
    pub invoice_no: &'static str,
    pub part_number: &'static str,
    pub schedule_no: &'static str,
    pub quantity: &'static str,
    pub packing_qty: &'static str,
    pub batch_code: Option<&'static str>,
}

impl ColumnMap {
    pub fn for_mode(mode: BusinessMode) -> Self {
        match mode {
            BusinessMode::Direct => Self {
                invoice_no: "INVOICE NO",
                part_number: "PART NUMBER",
                schedule_no: "KANBAN NO",
                quantity: "QTY REQ",
                packing_qty: "PACKING STANDERD",
                batch_code: None,
            },
            BusinessMode::Spare => Self {
                invoice_no: "INVOICE NO",
                part_number: "PART NUMBER",
                schedule_no: "DI NUMBER",
                quantity: "SCHEDULED QUANTITY",
                packing_qty: "PACKING STANDERD",
                batch_code: Some("LATEST BATCH CODE"),
            },
        }
    }

    fn required(&self) -> Vec<&'static str> {
        let mut columns = vec![
            self.invoice_no,
            self.part_number,
            self.schedule_no,
            self.quantity,
            self.packing_qty,
        ];
        if let Some(batch) = self.batch_code {
            columns.push(batch);
        }
        columns
    }
}

/// Direct-mode exports carry two banner rows above the header row.
const DIRECT_HEADER_SKIP: usize = 2;
/// Sheet tag used for spare-parts partitions.
const SPARE_SHEET_TAG: &str = "RPDC";

const SHEET_DATE_FORMATS: &[&str] = &["%d-%m-%Y", "%d/%m/%Y", "%d-%b-%Y", "%d-%b-%y", "%d-%m-%y"];

pub fn load_schedule(
    path: &Path,
    mode: BusinessMode,
    dispatch_date: NaiveDate,
) -> Result<Vec<ScheduleRow>, SpoolError> {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let records = match ext.as_str() {
        "csv" => load_csv(path, mode)?,
        "xlsx" | "xls" => load_workbook(path, mode, dispatch_date)?,
        other => {
            return Err(SpoolError::WorkbookLoad {
                path: path.display().to_string(),
                message: format!("unsupported schedule format: .{other}"),
            });
        }
    };

    Ok(map_records(&records, mode))
}

fn load_csv(path: &Path, mode: BusinessMode) -> Result<Vec<HashMap<String, String>>, SpoolError> {
    let file = File::open(path).map_err(|err| workbook_error(path, err.to_string()))?;
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(file);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| workbook_error(path, err.to_string()))?;
        rows.push(record.iter().map(|cell| cell.to_string()).collect::<Vec<_>>());
    }

    let skip = header_skip(mode).min(rows.len());
    Ok(records_from_rows(&rows[skip..]))
}

fn load_workbook(
    path: &Path,
    mode: BusinessMode,
    dispatch_date: NaiveDate,
) -> Result<Vec<HashMap<String, String>>, SpoolError> {
    let mut workbook =
        open_workbook_auto(path).map_err(|err| workbook_error(path, err.to_string()))?;

    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
    if sheet_names.is_empty() {
        return Err(workbook_error(path, "workbook has no sheets".to_string()));
    }

    let selected = select_sheets(&sheet_names, mode, dispatch_date);
    info!(
        path = %path.display(),
        sheets = ?selected,
        dispatch_date = %dispatch_date.format("%d-%m-%Y"),
        "selected schedule sheets"
    );

    let mut records = Vec::new();
    for name in &selected {
        let range = workbook
            .worksheet_range(name)
            .map_err(|err| workbook_error(path, err.to_string()))?;

        let rows: Vec<Vec<String>> = range
            .rows()
            .map(|row| row.iter().map(cell_to_string).collect())
            .collect();

        let skip = header_skip(mode).min(rows.len());
        records.extend(records_from_rows(&rows[skip..]));
    }

    Ok(records)
}

/// Sheet selection: any sheet whose name contains a rendering of the
/// dispatch date. Direct mode excludes spare-tagged sheets; spare mode falls
/// back to a spare-tagged sheet, then to the first sheet.
fn select_sheets(names: &[String], mode: BusinessMode, dispatch_date: NaiveDate) -> Vec<String> {
    let tokens: Vec<String> = SHEET_DATE_FORMATS
        .iter()
        .map(|format| dispatch_date.format(format).to_string().to_uppercase())
        .collect();

    let mut selected: Vec<String> = names
        .iter()
        .filter(|name| {
            let upper = name.trim().to_uppercase();
            let dated = tokens.iter().any(|token| upper.contains(token));
            match mode {
                BusinessMode::Direct => dated && !upper.contains(SPARE_SHEET_TAG),
                BusinessMode::Spare => dated,
            }
        })
        .cloned()
        .collect();

    if selected.is_empty() && mode.is_spare() {
        if let Some(name) = names
            .iter()
            .find(|name| name.trim().to_uppercase().contains(SPARE_SHEET_TAG))
        {
            selected.push(name.clone());
        }
    }

    if selected.is_empty() {
        if let Some(first) = names.first() {
            selected.push(first.clone());
        }
    }

    selected
}

fn header_skip(mode: BusinessMode) -> usize {
    match mode {
        BusinessMode::Direct => DIRECT_HEADER_SKIP,
        BusinessMode::Spare => 0,
    }
}

/// First row is the header; keys are trimmed and uppercased. Fully blank
/// rows are dropped.
fn records_from_rows(rows: &[Vec<String>]) -> Vec<HashMap<String, String>> {
    let Some((header_row, data_rows)) = rows.split_first() else {
        return Vec::new();
    };

    let headers: Vec<String> = header_row
        .iter()
        .map(|header| header.trim().to_uppercase())
        .collect();

    data_rows
        .iter()
        .filter_map(|row| {
            let mut record = HashMap::new();
            for (index, value) in row.iter().enumerate() {
                if let Some(header) = headers.get(index) {
                    if !header.is_empty() {
                        record.insert(header.clone(), value.trim().to_string());
                    }
                }
            }

            if record.values().all(|value| value.is_empty()) {
                None
            } else {
                Some(record)
            }
        })
        .collect()
}

fn map_records(records: &[HashMap<String, String>], mode: BusinessMode) -> Vec<ScheduleRow> {
    let columns = ColumnMap::for_mode(mode);

    let known: HashSet<&str> = records
        .iter()
        .flat_map(|record| record.keys().map(String::as_str))
        .collect();
    for required in columns.required() {
        if !records.is_empty() && !known.contains(required) {
            warn!(column = required, "schedule dataset is missing a required column");
        }
    }

    records
        .iter()
        .map(|record| {
            let get = |key: &str| record.get(key).cloned().unwrap_or_default();
            ScheduleRow {
                invoice_no: get(columns.invoice_no),
                part_number: get(columns.part_number),
                schedule_no: get(columns.schedule_no),
                quantity: get(columns.quantity),
                packing_qty: get(columns.packing_qty),
                batch_code: columns.batch_code.map(get).unwrap_or_default(),
            }
        })
        .collect()
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        other => other.to_string().trim().to_string(),
    }
}

fn workbook_error(path: &Path, message: String) -> SpoolError {
    SpoolError::WorkbookLoad {
        path: path.display().to_string(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, day).unwrap()
    }

    #[test]
    fn direct_csv_skips_the_banner_rows() {
        let mut file = NamedTempFile::with_suffix(".csv").unwrap();
        writeln!(file, "DELIVERY SCHEDULE,,,,").unwrap();
        writeln!(file, "PLANT 1,,,,").unwrap();
        writeln!(file, "INVOICE NO,PART NUMBER,KANBAN NO,QTY REQ,PACKING STANDERD").unwrap();
        writeln!(file, "INV/2025/0042,12345A-67890,KB1001,60,50").unwrap();
        writeln!(file, "INV/2025/0042,12345A-67890,KB1002,40,50").unwrap();

        let rows = load_schedule(file.path(), BusinessMode::Direct, date(4)).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].invoice_no, "INV/2025/0042");
        assert_eq!(rows[0].schedule_no, "KB1001");
        assert_eq!(rows[0].quantity, "60");
        assert_eq!(rows[0].packing_qty, "50");
        assert_eq!(rows[0].batch_code, "");
    }

    #[test]
    fn spare_csv_reads_headers_from_the_first_row() {
        let mut file = NamedTempFile::with_suffix(".csv").unwrap();
        writeln!(
            file,
            "INVOICE NO,PART NUMBER,DI NUMBER,SCHEDULED QUANTITY,PACKING STANDERD,LATEST BATCH CODE"
        )
        .unwrap();
        writeln!(file, "INV/9,22345B-67890,DI77,100,25,B2404").unwrap();

        let rows = load_schedule(file.path(), BusinessMode::Spare, date(4)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].schedule_no, "DI77");
        assert_eq!(rows[0].quantity, "100");
        assert_eq!(rows[0].batch_code, "B2404");
    }

    #[test]
    fn header_matching_is_case_insensitive_after_trimming() {
        let mut file = NamedTempFile::with_suffix(".csv").unwrap();
        writeln!(file, ",,,,").unwrap();
        writeln!(file, ",,,,").unwrap();
        writeln!(
            file,
            " invoice no , Part Number ,kanban no,Qty Req, packing standerd "
        )
        .unwrap();
        writeln!(file, "INV/1,P1,KB1,10,5").unwrap();

        let rows = load_schedule(file.path(), BusinessMode::Direct, date(4)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].invoice_no, "INV/1");
        assert_eq!(rows[0].quantity, "10");
    }

    #[test]
    fn blank_rows_are_dropped() {
        let mut file = NamedTempFile::with_suffix(".csv").unwrap();
        writeln!(file, "INVOICE NO,PART NUMBER,DI NUMBER,SCHEDULED QUANTITY,PACKING STANDERD,LATEST BATCH CODE").unwrap();
        writeln!(file, "INV/1,P1,DI1,10,5,B1").unwrap();
        writeln!(file, ",,,,,").unwrap();
        writeln!(file, "INV/1,P2,DI2,20,5,B1").unwrap();

        let rows = load_schedule(file.path(), BusinessMode::Spare, date(4)).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn unsupported_extension_is_a_workbook_error() {
        let err = load_schedule(Path::new("schedule.ods"), BusinessMode::Direct, date(4))
            .unwrap_err();
        assert!(matches!(err, SpoolError::WorkbookLoad { .. }));
    }

    #[test]
    fn direct_mode_selects_dated_sheets_and_excludes_spare_tagged_ones() {
        let names = vec![
            "04-04-2025".to_string(),
            "04-04-2025 RPDC".to_string(),
            "Summary".to_string(),
        ];

        let selected = select_sheets(&names, BusinessMode::Direct, date(4));
        assert_eq!(selected, vec!["04-04-2025".to_string()]);
    }

    #[test]
    fn spare_mode_includes_the_tagged_partition() {
        let names = vec![
            "04-04-2025".to_string(),
            "04-Apr-25 RPDC".to_string(),
            "Summary".to_string(),
        ];

        let selected = select_sheets(&names, BusinessMode::Spare, date(4));
        assert_eq!(
            selected,
            vec!["04-04-2025".to_string(), "04-Apr-25 RPDC".to_string()]
        );
    }

    #[test]
    fn spare_mode_falls_back_to_the_tagged_sheet_then_the_first_sheet() {
        let names = vec!["Summary".to_string(), "RPDC dump".to_string()];
        let selected = select_sheets(&names, BusinessMode::Spare, date(11));
        assert_eq!(selected, vec!["RPDC dump".to_string()]);

        let names = vec!["Summary".to_string()];
        let selected = select_sheets(&names, BusinessMode::Direct, date(11));
        assert_eq!(selected, vec!["Summary".to_string()]);
    }
}
