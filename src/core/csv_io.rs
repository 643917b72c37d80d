use crate::domain::requisition::{Requisition, RequisitionItem};
use crate::utils::error::{ErpError, Result};
use serde::{Deserialize, Serialize};
use std::io::Read;

#[derive(Debug, Serialize)]
struct RequisitionRow<'a> {
    id: &'a str,
    title: &'a str,
    department: &'a str,
    status: String,
    current_stage: u32,
    item_count: usize,
    total_amount: String,
}

#[derive(Debug, Deserialize)]
struct ItemRow {
    description: String,
    quantity: String,
    unit_price: String,
}

pub fn export_requisitions(requisitions: &[Requisition]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for r in requisitions {
        writer.serialize(RequisitionRow {
            id: &r.id,
            title: &r.title,
            department: &r.department,
            status: r.status.to_string(),
            current_stage: r.current_stage,
            item_count: r.items.len(),
            total_amount: format!("{:.2}", r.total_amount()),
        })?;
    }
    // no rows means serialize never wrote the header
    if requisitions.is_empty() {
        writer.write_record([
            "id",
            "title",
            "department",
            "status",
            "current_stage",
            "item_count",
            "total_amount",
        ])?;
    }
    let bytes = writer.into_inner().map_err(|e| {
        ErpError::IoError(std::io::Error::new(e.error().kind(), e.error().to_string()))
    })?;
    String::from_utf8(bytes).map_err(|e| ErpError::validation(format!("export is not UTF-8: {}", e)))
}

/// Reads `description,quantity,unit_price` rows. Errors name the 1-based line.
pub fn import_requisition_items<R: Read>(reader: R) -> Result<Vec<RequisitionItem>> {
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = csv_reader.headers()?.clone();
    let mut record = csv::StringRecord::new();
    let mut items = Vec::new();

    while csv_reader.read_record(&mut record)? {
        // first line of the record; quoted fields can span several
        let line = record.position().map_or(0, |p| p.line());
        let row: ItemRow = record.deserialize(Some(&headers))?;

        if row.description.is_empty() {
            return Err(ErpError::validation(format!(
                "line {}: description is empty",
                line
            )));
        }
        let quantity: u32 = row
            .quantity
            .parse::<u32>()
            .ok()
            .filter(|q| *q > 0)
            .ok_or_else(|| {
                ErpError::validation(format!(
                    "line {}: quantity must be a positive whole number, got '{}'",
                    line, row.quantity
                ))
            })?;
        let unit_price: f64 = row
            .unit_price
            .parse::<f64>()
            .ok()
            .filter(|p| p.is_finite() && *p >= 0.0)
            .ok_or_else(|| {
                ErpError::validation(format!(
                    "line {}: unit price must be a non-negative number, got '{}'",
                    line, row.unit_price
                ))
            })?;

        items.push(RequisitionItem::new(row.description, quantity, unit_price));
    }

    tracing::debug!(count = items.len(), "imported requisition items");
    Ok(items)
}
