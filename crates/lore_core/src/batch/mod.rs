use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::domain::ClassificationResult;
use crate::error::AppError;

/// One row of a claim CSV (`id,book_name,char,content`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClaimRow {
    pub id: String,
    pub book_name: String,
    /// Character the claim is about. Informational only.
    pub character: Option<String>,
    pub content: String,
}

impl ClaimRow {
    pub fn story_id(&self) -> &str {
        self.book_name.trim()
    }

    pub fn query_text(&self) -> String {
        claim_query_text(&self.content)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Prediction {
    pub id: String,
    pub prediction: u8,
}

pub fn claim_query_text(content: &str) -> String {
    format!("Verify claim: {}", content.trim())
}

/// Binary label for a result: only an accepted claim counts as consistent.
pub fn predict_label(result: &ClassificationResult) -> u8 {
    u8::from(result.is_success())
}

fn column(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h.trim().eq_ignore_ascii_case(name))
}

fn required_column(headers: &csv::StringRecord, name: &str) -> Result<usize, AppError> {
    column(headers, name).ok_or_else(|| {
        AppError::new("BATCH_CSV_INVALID", "Claim CSV is missing a required column")
            .with_details(format!("column={name}"))
    })
}

pub fn read_claims<R: Read>(reader: R) -> Result<Vec<ClaimRow>, AppError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr
        .headers()
        .map_err(|e| {
            AppError::new("BATCH_CSV_INVALID", "Failed to read claim CSV headers")
                .with_details(e.to_string())
        })?
        .clone();

    let id_col = required_column(&headers, "id")?;
    let book_col = required_column(&headers, "book_name")?;
    let content_col = required_column(&headers, "content")?;
    let char_col = column(&headers, "char");

    let mut out = Vec::new();
    for (idx, rec) in rdr.records().enumerate() {
        // Header is line 1.
        let line = idx + 2;
        let rec = rec.map_err(|e| {
            AppError::new("BATCH_CSV_INVALID", "Failed to read claim CSV row")
                .with_details(format!("line={line}; err={e}"))
        })?;
        let field = |i: usize| rec.get(i).map(str::trim).unwrap_or("");

        let id = field(id_col);
        if id.is_empty() {
            return Err(AppError::new("BATCH_CSV_INVALID", "Claim row has an empty id")
                .with_details(format!("line={line}")));
        }
        out.push(ClaimRow {
            id: id.to_string(),
            book_name: field(book_col).to_string(),
            character: char_col
                .map(field)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            content: field(content_col).to_string(),
        });
    }
    Ok(out)
}

pub fn write_predictions<W: Write>(writer: W, predictions: &[Prediction]) -> Result<(), AppError> {
    let mut wtr = csv::Writer::from_writer(writer);
    let write_err = |e: csv::Error| {
        AppError::new("BATCH_WRITE_FAILED", "Failed to write predictions CSV").with_details(e.to_string())
    };
    wtr.write_record(["id", "prediction"]).map_err(write_err)?;
    for p in predictions {
        wtr.write_record([p.id.as_str(), p.prediction.to_string().as_str()])
            .map_err(write_err)?;
    }
    wtr.flush().map_err(|e| {
        AppError::new("BATCH_WRITE_FAILED", "Failed to flush predictions CSV").with_details(e.to_string())
    })
}
