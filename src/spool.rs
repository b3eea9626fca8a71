use crate::model::{BusinessMode, HeaderFields, ReconciledRow};
use crate::util::reformat_date;

pub const LINE_LENGTH: usize = 390;

const DEFAULT_VENDOR_CODE: &str = "X539";

/// Fixed-width output buffer, space-filled. Writes are left-justified and
/// truncated to the field width; offsets are character positions.
struct LineBuffer {
    chars: Vec<char>,
}

impl LineBuffer {
    fn new() -> Self {
        Self {
            chars: vec![' '; LINE_LENGTH],
        }
    }

    fn put(&mut self, start: usize, end: usize, value: &str) {
        let width = end - start;
        for (i, ch) in value.chars().take(width).enumerate() {
            self.chars[start + i] = ch;
        }
    }

    fn finish(self) -> String {
        self.chars.into_iter().collect()
    }
}

/// Merges one reconciled row with the header-level fields into a single
/// fixed-offset spool line for the downstream interchange system.
pub fn encode_line(row: &ReconciledRow, header: &HeaderFields, mode: BusinessMode) -> String {
    let mut buf = LineBuffer::new();

    let vendor = if header.vendor_code.trim().is_empty() {
        DEFAULT_VENDOR_CODE
    } else {
        header.vendor_code.trim()
    };
    buf.put(0, 4, vendor);
    buf.put(4, 20, &header.challan_no);
    buf.put(20, 31, &reformat_date(&header.challan_date, "%d-%b-%Y", false));
    buf.put(31, 47, &header.invoice_no);
    buf.put(47, 71, &reformat_date(&header.invoice_date, "%d-%b-%Y", true));

    buf.put(82, 83, mode.flag());
    buf.put(83, 98, &row.schedule_no);
    buf.put(98, 113, &row.part_number);
    buf.put(113, 125, &row.quantity);
    buf.put(125, 138, &header.po_number);

    if !row.packing_qty.is_empty() {
        buf.put(138, 150, &format!("    {}", row.packing_qty));
    }

    buf.put(194, 204, &row.batch_code);
    buf.put(204, 219, &row.gst_no);
    buf.put(219, 227, &row.hsn_code);

    // CGST occupies 16 columns, then the SGST amount continues straight
    // through the 245 boundary.
    let cgst: String = row.cgst_amount.chars().take(16).collect();
    let sgst_head: String = row.sgst_amount.chars().take(2).collect();
    let sgst_tail: String = row.sgst_amount.chars().skip(2).collect();
    buf.put(227, 245, &format!("{cgst:<16}{sgst_head}"));
    buf.put(245, 265, &sgst_tail);

    buf.put(275, 276, &row.eway_bill);
    buf.put(276, 290, &row.igst_amount);
    buf.put(290, 354, &row.irn);
    buf.put(354, 366, &row.rate);
    buf.put(366, 390, &row.total_value);

    buf.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row() -> ReconciledRow {
        ReconciledRow {
            schedule_no: "KB1001".to_string(),
            part_number: "ABC-123".to_string(),
            quantity: "60".to_string(),
            packing_qty: "50".to_string(),
            batch_code: String::new(),
            hsn_code: "84099111".to_string(),
            rate: "1234.500".to_string(),
            gst_no: "27ABCDE1234F1Z5".to_string(),
            po_number: "4500012345".to_string(),
            cgst_amount: "9000.00".to_string(),
            sgst_amount: "9000.00".to_string(),
            igst_amount: String::new(),
            eway_bill: "0".to_string(),
            total_value: "145000.00".to_string(),
            irn: "a3f9".repeat(16),
        }
    }

    fn sample_header() -> HeaderFields {
        HeaderFields {
            vendor_code: String::new(),
            challan_no: "INV/2026/001".to_string(),
            challan_date: "04-Apr-25".to_string(),
            invoice_no: "INV/2026/001".to_string(),
            invoice_date: "04-Apr-25".to_string(),
            po_number: "4500012345".to_string(),
        }
    }

    #[test]
    fn every_line_is_exactly_390_characters() {
        let line = encode_line(&sample_row(), &sample_header(), BusinessMode::Direct);
        assert_eq!(line.chars().count(), LINE_LENGTH);

        let mut row = sample_row();
        row.irn = "x".repeat(200);
        let line = encode_line(&row, &sample_header(), BusinessMode::Spare);
        assert_eq!(line.chars().count(), LINE_LENGTH);
    }

    #[test]
    fn fields_land_at_their_offsets() {
        let line = encode_line(&sample_row(), &sample_header(), BusinessMode::Direct);

        assert_eq!(&line[0..4], "X539");
        assert_eq!(&line[4..16], "INV/2026/001");
        assert_eq!(&line[20..31], "04-Apr-2025");
        assert_eq!(&line[31..43], "INV/2026/001");
        assert_eq!(&line[47..58], "04-APR-2025");
        assert_eq!(&line[82..83], "1");
        assert_eq!(&line[83..89], "KB1001");
        assert_eq!(&line[98..105], "ABC-123");
        assert_eq!(&line[113..115], "60");
        assert_eq!(&line[125..135], "4500012345");
        assert_eq!(&line[204..219], "27ABCDE1234F1Z5");
        assert_eq!(&line[219..227], "84099111");
        assert_eq!(&line[275..276], "0");
        assert_eq!(&line[290..354], "a3f9".repeat(16));
        assert_eq!(&line[354..362], "1234.500");
        assert_eq!(&line[366..375], "145000.00");
    }

    #[test]
    fn vendor_code_defaults_when_blank() {
        let mut header = sample_header();
        header.vendor_code = "V123".to_string();
        let line = encode_line(&sample_row(), &header, BusinessMode::Direct);
        assert_eq!(&line[0..4], "V123");

        header.vendor_code = "  ".to_string();
        let line = encode_line(&sample_row(), &header, BusinessMode::Direct);
        assert_eq!(&line[0..4], "X539");
    }

    #[test]
    fn packing_quantity_gets_a_four_space_prefix() {
        let line = encode_line(&sample_row(), &sample_header(), BusinessMode::Direct);
        assert_eq!(&line[138..150], "    50      ");

        let mut row = sample_row();
        row.packing_qty = String::new();
        let line = encode_line(&row, &sample_header(), BusinessMode::Direct);
        assert_eq!(&line[138..150], "            ");
    }

    #[test]
    fn cgst_and_sgst_share_the_composite_field() {
        let line = encode_line(&sample_row(), &sample_header(), BusinessMode::Direct);
        // CGST padded to 16, then SGST runs across the boundary.
        assert_eq!(&line[227..245], "9000.00         90");
        assert_eq!(&line[245..265], "00.00               ");
    }

    #[test]
    fn batch_code_appears_in_spare_mode() {
        let mut row = sample_row();
        row.batch_code = "B2404".to_string();
        let line = encode_line(&row, &sample_header(), BusinessMode::Spare);
        assert_eq!(&line[82..83], "S");
        assert_eq!(&line[194..199], "B2404");
    }

    #[test]
    fn overlong_values_truncate_to_their_field_width() {
        let mut row = sample_row();
        row.schedule_no = "K".repeat(40);
        let line = encode_line(&row, &sample_header(), BusinessMode::Direct);
        assert_eq!(&line[83..98], "K".repeat(15));
        assert_eq!(&line[98..105], "ABC-123");
        assert_eq!(line.chars().count(), LINE_LENGTH);
    }

    #[test]
    fn unparseable_dates_pass_through_verbatim() {
        let mut header = sample_header();
        header.invoice_date = "sometime soon".to_string();
        let line = encode_line(&sample_row(), &header, BusinessMode::Direct);
        assert_eq!(&line[47..60], "sometime soon");
    }
}
