//! Excel workbooks: the default per-version manifest sheet, flat export and
//! import parsing.

use std::io::Cursor;

use calamine::{open_workbook_from_rs, DataType, Reader, Xlsx};
use rust_decimal::{prelude::ToPrimitive, Decimal};
use rust_xlsxwriter::{Format, Workbook, Worksheet};

use super::expand::BomNode;
use super::flatten::outline_level;
use super::import::{prefilter_rows, ImportRow};
use super::tabular::{ImportRecord, SheetRenderer, SheetRow};
use crate::{entities::bom_version, errors::ServiceError};

const SHEET_HEADERS: [&str; 8] = [
    "position_code",
    "component_code",
    "component_name",
    "component_spec",
    "unit",
    "quantity",
    "process_info",
    "remark",
];

const EXPORT_HEADERS: [&str; 12] = [
    "outline_level",
    "level",
    "display_position_code",
    "component_code",
    "component_name",
    "component_spec",
    "unit",
    "attribute",
    "quantity",
    "process_info",
    "remark",
    "nested",
];

/// Excel's limit on worksheet names.
const MAX_SHEET_NAME_LEN: usize = 31;

#[derive(Debug, Clone, Copy, Default)]
pub struct XlsxSheetRenderer;

impl SheetRenderer for XlsxSheetRenderer {
    fn extension(&self) -> &str {
        "xlsx"
    }

    fn render(
        &self,
        version: &bom_version::Model,
        rows: &[SheetRow],
    ) -> Result<Vec<u8>, ServiceError> {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.set_name(sheet_name(&version.version_code))?;
        write_headers(sheet, &SHEET_HEADERS)?;

        for (idx, row) in rows.iter().enumerate() {
            let r = row_index(idx)?;
            sheet.write_string(r, 0, &row.position_code)?;
            sheet.write_string(r, 1, &row.component_code)?;
            sheet.write_string(r, 2, &row.component_name)?;
            write_optional(sheet, r, 3, row.component_spec.as_deref())?;
            write_optional(sheet, r, 4, row.unit.as_deref())?;
            write_quantity(sheet, r, 5, row.quantity)?;
            write_optional(sheet, r, 6, row.process_info.as_deref())?;
            write_optional(sheet, r, 7, row.remark.as_deref())?;
        }

        Ok(workbook.save_to_buffer()?)
    }
}

/// Writes a flattened tree as a workbook with the same columns as the CSV
/// export. The output parses back with [`parse_import_xlsx`].
pub fn export_xlsx(flat: &[BomNode]) -> Result<Vec<u8>, ServiceError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("BOM")?;
    write_headers(sheet, &EXPORT_HEADERS)?;

    for (idx, node) in flat.iter().enumerate() {
        let r = row_index(idx)?;
        sheet.write_number(r, 0, outline_level(node))?;
        sheet.write_number(r, 1, node.level)?;
        sheet.write_string(r, 2, &node.display_position_code)?;
        sheet.write_string(r, 3, &node.component_code)?;
        sheet.write_string(r, 4, &node.component_name)?;
        write_optional(sheet, r, 5, node.component_spec.as_deref())?;
        write_optional(sheet, r, 6, node.component_unit.as_deref())?;
        sheet.write_string(r, 7, node.component_attribute.to_string())?;
        write_quantity(sheet, r, 8, node.quantity)?;
        write_optional(sheet, r, 9, node.process_info.as_deref())?;
        write_optional(sheet, r, 10, node.remark.as_deref())?;
        sheet.write_boolean(r, 11, node.parent_line_id.is_some())?;
    }

    Ok(workbook.save_to_buffer()?)
}

/// Reads the first worksheet of an xlsx workbook into import rows.
///
/// The first row holds the headers, matched by name like the CSV import.
pub fn parse_import_xlsx(bytes: &[u8]) -> Result<Vec<ImportRow>, ServiceError> {
    let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes))
        .map_err(|e| ServiceError::ValidationError(format!("unreadable workbook: {}", e)))?;

    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| ServiceError::ValidationError("workbook has no sheets".to_string()))?;
    let range = workbook
        .worksheet_range(&sheet)
        .ok_or_else(|| ServiceError::ValidationError(format!("sheet '{}' is missing", sheet)))?
        .map_err(|e| ServiceError::ValidationError(format!("unreadable sheet '{}': {}", sheet, e)))?;

    let mut sheet_rows = range.rows();
    let headers: Vec<String> = match sheet_rows.next() {
        Some(header) => header
            .iter()
            .map(|cell| cell_text(cell).to_ascii_lowercase())
            .collect(),
        None => return Ok(Vec::new()),
    };
    let column = |names: &[&str]| headers.iter().position(|h| names.contains(&h.as_str()));
    let level_col = column(&["level"]);
    let position_col = column(&["display_position_code", "position"]);
    let code_col = column(&["component_code", "code"]);
    let quantity_col = column(&["quantity"]);
    let process_col = column(&["process_info"]);
    let remark_col = column(&["remark"]);
    let nested_col = column(&["nested"]);

    let mut rows = Vec::new();
    for (idx, cells) in sheet_rows.enumerate() {
        let text = |col: Option<usize>| {
            col.and_then(|c| cells.get(c))
                .map(cell_text)
                .filter(|s| !s.is_empty())
        };
        let record = ImportRecord {
            level: text(level_col).and_then(|s| s.parse().ok()),
            display_position_code: text(position_col),
            component_code: text(code_col),
            quantity: text(quantity_col),
            process_info: text(process_col),
            remark: text(remark_col),
            nested: text(nested_col),
        };
        // header is row 1
        if let Some(row) = record.into_row(idx + 2)? {
            rows.push(row);
        }
    }

    Ok(prefilter_rows(rows))
}

fn cell_text(cell: &DataType) -> String {
    match cell {
        DataType::Empty => String::new(),
        DataType::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

/// Worksheet name derived from a version code, within Excel's rules.
fn sheet_name(version_code: &str) -> String {
    let name: String = version_code
        .chars()
        .map(|c| match c {
            '[' | ']' | ':' | '*' | '?' | '/' | '\\' => '_',
            c => c,
        })
        .take(MAX_SHEET_NAME_LEN)
        .collect();
    if name.trim().is_empty() {
        "BOM".to_string()
    } else {
        name
    }
}

/// Data rows start below the header row.
fn row_index(idx: usize) -> Result<u32, ServiceError> {
    u32::try_from(idx + 1)
        .map_err(|_| ServiceError::SerializationError("too many rows for a worksheet".to_string()))
}

fn write_headers(sheet: &mut Worksheet, headers: &[&str]) -> Result<(), ServiceError> {
    let bold = Format::new().set_bold();
    for (col, header) in (0u16..).zip(headers) {
        sheet.write_string_with_format(0, col, *header, &bold)?;
    }
    Ok(())
}

fn write_optional(
    sheet: &mut Worksheet,
    row: u32,
    col: u16,
    value: Option<&str>,
) -> Result<(), ServiceError> {
    if let Some(value) = value {
        sheet.write_string(row, col, value)?;
    }
    Ok(())
}

/// Quantities go in as numbers; one that does not fit an `f64` is kept as
/// text so it still parses back exactly.
fn write_quantity(
    sheet: &mut Worksheet,
    row: u32,
    col: u16,
    quantity: Decimal,
) -> Result<(), ServiceError> {
    match quantity.to_f64() {
        Some(value) => sheet.write_number(row, col, value)?,
        None => sheet.write_string(row, col, quantity.to_string())?,
    };
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::bom_tree::expand::expand;
    use crate::services::bom_tree::flatten::flatten;
    use crate::services::bom_tree::graph::fixtures::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn first_sheet(bytes: Vec<u8>) -> Vec<Vec<String>> {
        let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes)).unwrap();
        let name = workbook.sheet_names().first().cloned().unwrap();
        let range = workbook.worksheet_range(&name).unwrap().unwrap();
        range
            .rows()
            .map(|row| row.iter().map(cell_text).collect())
            .collect()
    }

    #[test]
    fn sheet_lists_direct_lines_under_a_header() {
        let graph = scenario();
        let rows = SheetRow::for_version(&graph, 10).unwrap();
        let version = graph.version(10).unwrap();
        let body = XlsxSheetRenderer.render(version, &rows).unwrap();

        assert_eq!(XlsxSheetRenderer.extension(), "xlsx");
        let cells = first_sheet(body);
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0][0], "position_code");
        assert_eq!(cells[1][0], "1");
        assert_eq!(cells[1][1], "M2");
        assert_eq!(cells[1][5], "2");
    }

    #[test]
    fn exported_workbook_parses_back_into_rows() {
        let mut graph = scenario();
        graph.insert_material(material(4, "M4"));
        let mut nested = line(103, 10, "X", 4, 7);
        nested.parent_line_id = Some(100);
        nested.level = 2;
        graph.insert_line(nested);

        let flat = flatten(expand(&graph, 10).unwrap());
        let rows = parse_import_xlsx(&export_xlsx(&flat).unwrap()).unwrap();

        let shape: Vec<(&str, &str, Decimal, bool)> = rows
            .iter()
            .map(|r| {
                (
                    r.display_position_code.as_str(),
                    r.component_code.as_str(),
                    r.quantity,
                    r.nested,
                )
            })
            .collect();
        assert_eq!(
            shape,
            vec![
                ("1", "M2", dec!(2), false),
                ("1.X", "M4", dec!(7), true),
                ("1.A", "M3", dec!(5), false),
            ]
        );
        assert_eq!(rows[2].level, Some(2));
    }

    #[test]
    fn rows_without_codes_are_skipped() {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        write_headers(sheet, &["position", "code", "quantity"]).unwrap();
        sheet.write_string(1, 0, "1").unwrap();
        sheet.write_string(1, 1, "M2").unwrap();
        sheet.write_number(1, 2, 2.5).unwrap();
        sheet.write_string(2, 0, "2").unwrap();
        sheet.write_number(2, 2, 1).unwrap();

        let rows = parse_import_xlsx(&workbook.save_to_buffer().unwrap()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].quantity, dec!(2.5));
    }

    #[test]
    fn garbage_bytes_are_a_validation_error() {
        assert_matches!(
            parse_import_xlsx(b"not a workbook"),
            Err(ServiceError::ValidationError(_))
        );
    }

    #[test]
    fn sheet_names_follow_excel_rules() {
        assert_eq!(sheet_name("M1_V1.0"), "M1_V1.0");
        assert_eq!(sheet_name("A/B:C"), "A_B_C");
        assert_eq!(sheet_name(&"X".repeat(40)).len(), MAX_SHEET_NAME_LEN);
        assert_eq!(sheet_name(""), "BOM");
    }
}
