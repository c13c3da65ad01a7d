//! CSV adapters: flat export with an outline column, import parsing and a
//! CSV flavour of the per-version sheets written into export manifests.

use std::io::Read;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::expand::BomNode;
use super::flatten::outline_level;
use super::graph::BomGraph;
use super::import::{prefilter_rows, ImportRow};
use crate::{entities::bom_version, errors::ServiceError};

/// One row of a generated per-version sheet: a direct line of that version.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetRow {
    pub position_code: String,
    pub component_code: String,
    pub component_name: String,
    pub component_spec: Option<String>,
    pub unit: Option<String>,
    pub quantity: Decimal,
    pub process_info: Option<String>,
    pub remark: Option<String>,
}

impl SheetRow {
    /// Direct lines of a version of the snapshot, in sibling order.
    pub fn for_version(graph: &BomGraph, version_id: i64) -> Result<Vec<Self>, ServiceError> {
        graph
            .direct_lines(version_id)
            .into_iter()
            .map(|line| {
                let record = graph.material(line.component_material_id).ok_or_else(|| {
                    ServiceError::ReferenceError(format!(
                        "line {} (position '{}') references material {} which does not exist",
                        line.id, line.position_code, line.component_material_id
                    ))
                })?;
                Ok(Self {
                    position_code: line.position_code.clone(),
                    component_code: record.material.code.clone(),
                    component_name: record.material.name.clone(),
                    component_spec: record.material.spec.clone(),
                    unit: record.unit_name.clone(),
                    quantity: line.quantity,
                    process_info: line.process_info.clone(),
                    remark: line.remark.clone(),
                })
            })
            .collect()
    }
}

/// Produces the body of a generated sheet; the extension decides the
/// manifest file name.
pub trait SheetRenderer: Send + Sync {
    fn extension(&self) -> &str;

    fn render(
        &self,
        version: &bom_version::Model,
        rows: &[SheetRow],
    ) -> Result<Vec<u8>, ServiceError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CsvSheetRenderer;

impl SheetRenderer for CsvSheetRenderer {
    fn extension(&self) -> &str {
        "csv"
    }

    fn render(
        &self,
        _version: &bom_version::Model,
        rows: &[SheetRow],
    ) -> Result<Vec<u8>, ServiceError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        if rows.is_empty() {
            writer.write_record([
                "position_code",
                "component_code",
                "component_name",
                "component_spec",
                "unit",
                "quantity",
                "process_info",
                "remark",
            ])?;
        }
        for row in rows {
            writer.serialize(row)?;
        }
        into_bytes(writer)
    }
}

#[derive(Debug, Serialize)]
struct ExportRecord<'a> {
    outline_level: u8,
    level: i32,
    display_position_code: &'a str,
    component_code: &'a str,
    component_name: &'a str,
    component_spec: Option<&'a str>,
    unit: Option<&'a str>,
    attribute: String,
    quantity: Decimal,
    process_info: Option<&'a str>,
    remark: Option<&'a str>,
    nested: bool,
}

impl<'a> From<&'a BomNode> for ExportRecord<'a> {
    fn from(node: &'a BomNode) -> Self {
        Self {
            outline_level: outline_level(node),
            level: node.level,
            display_position_code: &node.display_position_code,
            component_code: &node.component_code,
            component_name: &node.component_name,
            component_spec: node.component_spec.as_deref(),
            unit: node.component_unit.as_deref(),
            attribute: node.component_attribute.to_string(),
            quantity: node.quantity,
            process_info: node.process_info.as_deref(),
            remark: node.remark.as_deref(),
            nested: node.parent_line_id.is_some(),
        }
    }
}

/// Writes a flattened tree as CSV. The output parses back with
/// [`parse_import_csv`].
pub fn export_csv(flat: &[BomNode]) -> Result<Vec<u8>, ServiceError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for node in flat {
        writer.serialize(ExportRecord::from(node))?;
    }
    into_bytes(writer)
}

fn into_bytes(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>, ServiceError> {
    writer
        .into_inner()
        .map_err(|e| ServiceError::SerializationError(e.to_string()))
}

/// Import columns matched by header name. Every field is optional so sheets
/// with extra or missing columns still parse.
#[derive(Debug, Deserialize)]
pub(super) struct ImportRecord {
    #[serde(default)]
    pub level: Option<i32>,
    #[serde(default, alias = "position")]
    pub display_position_code: Option<String>,
    #[serde(default, alias = "code")]
    pub component_code: Option<String>,
    #[serde(default)]
    pub quantity: Option<String>,
    #[serde(default)]
    pub process_info: Option<String>,
    #[serde(default)]
    pub remark: Option<String>,
    #[serde(default)]
    pub nested: Option<String>,
}

impl ImportRecord {
    /// Turns a record into a row. Records missing a position code or a
    /// component code yield `None` before the quantity is looked at.
    pub(super) fn into_row(self, line_no: usize) -> Result<Option<ImportRow>, ServiceError> {
        let position = self.display_position_code.unwrap_or_default();
        let code = self.component_code.unwrap_or_default();
        if position.trim().is_empty() || code.trim().is_empty() {
            return Ok(None);
        }

        let raw_quantity = self.quantity.unwrap_or_default();
        let quantity = Decimal::from_str(raw_quantity.trim()).map_err(|_| {
            ServiceError::ValidationError(format!(
                "line {}: quantity '{}' of '{}' is not a number",
                line_no, raw_quantity, position
            ))
        })?;

        Ok(Some(ImportRow {
            level: self.level,
            display_position_code: position,
            component_code: code,
            quantity,
            process_info: self.process_info.filter(|s| !s.is_empty()),
            remark: self.remark.filter(|s| !s.is_empty()),
            nested: self.nested.as_deref().map_or(false, is_truthy),
        }))
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "y"
    )
}

/// Parses CSV with a header row into import rows.
///
/// Columns are matched by name and unknown columns (such as the ones
/// [`export_csv`] adds) are ignored. Rows missing a position code or a
/// component code are dropped before quantities are parsed.
pub fn parse_import_csv<R: Read>(reader: R) -> Result<Vec<ImportRow>, ServiceError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let mut rows = Vec::new();
    for (idx, record) in csv_reader.deserialize::<ImportRecord>().enumerate() {
        // header is line 1
        if let Some(row) = record?.into_row(idx + 2)? {
            rows.push(row);
        }
    }

    Ok(prefilter_rows(rows))
}
