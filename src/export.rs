use crate::table::Table;

/// Convert the practice log to CSV
///
/// The header row comes first, then every data row in storage order.
/// Fields containing commas, quotes or newlines are quoted with inner quotes
/// doubled.
///
/// # Examples
/// ```
/// use band_log::export::to_csv;
/// use band_log::table::Table;
///
/// let grid = vec![
///     vec!["song".to_string(), "comment".to_string()],
///     vec!["Moanin'".to_string(), "slow, then fast".to_string()],
/// ];
/// let table = Table::from_grid(grid, &[]);
/// assert_eq!(to_csv(&table), "song,comment\nMoanin',\"slow, then fast\"\n");
/// ```
pub fn to_csv(table: &Table) -> String {
    let mut csv_content = String::new();

    for line in table.grid() {
        for (c, value) in line.iter().enumerate() {
            if c > 0 {
                csv_content.push(',');
            }
            if value.contains(',') || value.contains('"') || value.contains('\n') {
                let escaped = value.replace('"', "\"\"");
                csv_content.push_str(&format!("\"{}\"", escaped));
            } else {
                csv_content.push_str(value);
            }
        }
        csv_content.push('\n');
    }

    csv_content
}

/// Convert the practice log to XLSX format
///
/// Cells that parse as numbers (durations, percentages) are written as
/// numbers so they can be summed in a spreadsheet, everything else as text.
#[cfg(feature = "web")]
pub fn to_xlsx(table: &Table) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    use rust_xlsxwriter::{Workbook, Worksheet};

    let mut workbook = Workbook::new();
    let mut worksheet = Worksheet::new();

    for (r, line) in table.grid().iter().enumerate() {
        for (c, value) in line.iter().enumerate() {
            let (row, col) = (r as u32, c as u16);
            match value.trim().parse::<f64>() {
                Ok(number) if r > 0 && number.is_finite() => {
                    worksheet.write_number(row, col, number)?;
                }
                _ => {
                    worksheet.write_string(row, col, value)?;
                }
            }
        }
    }

    workbook.push_worksheet(worksheet);

    let buffer = workbook.save_to_buffer()?;

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::header;

    #[test]
    fn empty_table_exports_header_only() {
        let csv = to_csv(&Table::empty(header(false)));
        assert_eq!(
            csv,
            "date,member,song,section,duration_minutes,completion_percent,comment\n"
        );
    }

    #[test]
    fn quotes_and_newlines_are_escaped() {
        let grid = vec![
            vec!["comment".to_string()],
            vec!["said \"again\"\nlater".to_string()],
        ];
        let csv = to_csv(&Table::from_grid(grid, &[]));
        assert_eq!(csv, "comment\n\"said \"\"again\"\"\nlater\"\n");
    }

    #[cfg(feature = "web")]
    #[test]
    fn xlsx_is_a_zip_container() {
        let grid = vec![
            vec!["song".to_string(), "duration_minutes".to_string()],
            vec!["Take Five".to_string(), "30".to_string()],
        ];
        let bytes = to_xlsx(&Table::from_grid(grid, &[])).unwrap();
        assert_eq!(&bytes[..2], b"PK");
    }
}
