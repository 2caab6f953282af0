//! Caller input parsing and validation: CSV batch uploads and single
//! transaction request bodies.

use crate::error::ValidationError;
use crate::features::normalizer::AMOUNT_FIELD;
use crate::types::transaction::{RawTransaction, RawValue};
use csv::{ReaderBuilder, StringRecord, Trim};

/// Columns a batch upload must carry.
pub const REQUIRED_COLUMNS: [&str; 2] = [AMOUNT_FIELD, "ProductCD"];

/// Cell spellings read as missing values.
const NA_VALUES: [&str; 13] = [
    "", "NA", "N/A", "n/a", "#N/A", "NaN", "nan", "-NaN", "-nan", "null", "NULL", "None", "<NA>",
];

/// Parse and validate a CSV upload into raw transactions, one per row.
pub fn parse_upload(bytes: &[u8]) -> Result<Vec<RawTransaction>, ValidationError> {
    let records = parse_csv(bytes)?;
    validate_batch(&records)?;
    Ok(records)
}

/// Parse CSV text into raw transactions.
///
/// A column is numeric when every non-missing cell parses as a number;
/// otherwise all of its cells stay textual. Cells absent from a short row
/// are missing.
pub fn parse_csv(bytes: &[u8]) -> Result<Vec<RawTransaction>, ValidationError> {
    let text = std::str::from_utf8(bytes).map_err(|_| ValidationError::NotUtf8)?;

    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let rows: Vec<StringRecord> = reader.records().collect::<Result<_, _>>()?;

    if rows.is_empty() {
        return Err(ValidationError::Empty);
    }

    // Short rows are padded with missing cells; long rows cannot be aligned.
    if let Some((row, record)) = rows
        .iter()
        .enumerate()
        .find(|(_, record)| record.len() > headers.len())
    {
        return Err(ValidationError::RaggedRow {
            row,
            fields: record.len(),
            expected: headers.len(),
        });
    }

    let numeric_columns: Vec<bool> = (0..headers.len())
        .map(|col| {
            rows.iter()
                .filter_map(|row| row.get(col))
                .filter(|cell| !is_na(cell))
                .all(|cell| cell.parse::<f64>().is_ok())
        })
        .collect();

    let transactions = rows
        .iter()
        .map(|row| {
            headers
                .iter()
                .enumerate()
                .map(|(col, name)| {
                    let cell = row.get(col).unwrap_or("");
                    let value = if is_na(cell) {
                        RawValue::Missing
                    } else if numeric_columns[col] {
                        cell.parse::<f64>()
                            .map(RawValue::Number)
                            .unwrap_or(RawValue::Missing)
                    } else {
                        RawValue::Text(cell.to_string())
                    };
                    (name.clone(), value)
                })
                .collect()
        })
        .collect();

    Ok(transactions)
}

/// Batch-level checks: required columns present, amounts numeric and
/// non-negative.
pub fn validate_batch(records: &[RawTransaction]) -> Result<(), ValidationError> {
    let Some(first) = records.first() else {
        return Err(ValidationError::Empty);
    };

    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|col| !first.contains(col))
        .map(|col| col.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ValidationError::MissingColumns(missing));
    }

    // One bad cell makes the whole amount column textual; check every cell.
    for (row, record) in records.iter().enumerate() {
        let amount = match record.get(AMOUNT_FIELD) {
            Some(RawValue::Number(amt)) => *amt,
            Some(RawValue::Text(cell)) => cell.parse::<f64>().map_err(|_| {
                ValidationError::NonNumericAmount {
                    row,
                    value: cell.clone(),
                }
            })?,
            _ => continue,
        };
        if amount < 0.0 {
            return Err(ValidationError::NegativeAmount { row });
        }
    }

    Ok(())
}

/// Optional fields of a single prediction request. Absent ones are carried
/// as missing so that presence-dependent features still run.
pub const OPTIONAL_REQUEST_FIELDS: [&str; 9] = [
    "card2",
    "card3",
    "card4",
    "card5",
    "card6",
    "addr1",
    "addr2",
    "P_emaildomain",
    "R_emaildomain",
];

/// Validate a request body and fill in its absent optional fields.
pub fn prepare_transaction(mut record: RawTransaction) -> Result<RawTransaction, ValidationError> {
    validate_transaction(&record)?;
    for field in OPTIONAL_REQUEST_FIELDS {
        if !record.contains(field) {
            record.insert(field, RawValue::Missing);
        }
    }
    Ok(record)
}

/// Request-body checks for single predictions: `TransactionAmt` must be a
/// non-negative number, `ProductCD` text and `card1` a number. Other fields
/// are optional.
pub fn validate_transaction(record: &RawTransaction) -> Result<(), ValidationError> {
    match record.get(AMOUNT_FIELD) {
        Some(RawValue::Number(amt)) if *amt >= 0.0 => {}
        Some(RawValue::Number(_)) => return Err(field_error(AMOUNT_FIELD, "must be >= 0")),
        _ => return Err(field_error(AMOUNT_FIELD, "a number is required")),
    }

    if !matches!(record.get("ProductCD"), Some(RawValue::Text(_))) {
        return Err(field_error("ProductCD", "a product code is required"));
    }

    match record.get("card1") {
        Some(RawValue::Number(n)) if n.fract() == 0.0 => {}
        _ => return Err(field_error("card1", "an integer is required")),
    }

    Ok(())
}

fn field_error(field: &str, reason: &str) -> ValidationError {
    ValidationError::Field {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn is_na(cell: &str) -> bool {
    NA_VALUES.contains(&cell)
}
