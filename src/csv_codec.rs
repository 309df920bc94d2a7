use chrono::NaiveDate;
use csv::{ReaderBuilder, Terminator, WriterBuilder};
use indexmap::IndexMap;

/// One CSV data line keyed by (trimmed) header name.
pub type RawRow = IndexMap<String, String>;

#[derive(Debug, thiserror::Error)]
pub enum CsvError {
    #[error("CSV parsing errors: {}", .0.join(", "))]
    Malformed(Vec<String>),
    #[error("CSV write failed: {0}")]
    Write(String),
}

/// Parses header-first CSV text into rows.
///
/// Every structural problem found in the text is collected before failing, so the
/// caller gets one message covering the whole file instead of just the first bad line.
pub fn parse(text: &str) -> Result<Vec<RawRow>, CsvError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut problems = Vec::new();
    if let Some(line) = unterminated_quote_line(text) {
        problems.push(format!("Quoted field unterminated (line {})", line));
    }

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers = match reader.headers() {
        Ok(h) => h.iter().map(|s| s.trim().to_string()).collect::<Vec<_>>(),
        Err(e) => {
            problems.push(e.to_string());
            return Err(CsvError::Malformed(problems));
        }
    };

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                problems.push(e.to_string());
                continue;
            }
        };
        // Whitespace-only line.
        if record.len() == 1 && record[0].trim().is_empty() {
            continue;
        }
        let row_no = rows.len() + 1;
        if record.len() < headers.len() {
            problems.push(format!(
                "Row {}: Too few fields: expected {} fields but parsed {}",
                row_no,
                headers.len(),
                record.len()
            ));
        } else if record.len() > headers.len() {
            problems.push(format!(
                "Row {}: Too many fields: expected {} fields but parsed {}",
                row_no,
                headers.len(),
                record.len()
            ));
        }
        let row = headers
            .iter()
            .cloned()
            .zip(record.iter().map(|s| s.to_string()))
            .collect::<RawRow>();
        rows.push(row);
    }

    if problems.is_empty() {
        Ok(rows)
    } else {
        Err(CsvError::Malformed(problems))
    }
}

/// 1-based line where a quoted field opens without ever closing.
///
/// A `"` only opens a quoted field at the start of a field; elsewhere it is data.
/// Inside a quoted field `""` is an escaped quote and a lone `"` closes it.
fn unterminated_quote_line(text: &str) -> Option<usize> {
    let mut chars = text.chars().peekable();
    let mut line = 1usize;
    let mut field_start = true;
    let mut opened_at: Option<usize> = None;
    while let Some(ch) = chars.next() {
        if opened_at.is_some() {
            match ch {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                }
                '"' => opened_at = None,
                '\n' => line += 1,
                _ => {}
            }
            continue;
        }
        match ch {
            ',' => field_start = true,
            '\n' => {
                line += 1;
                field_start = true;
            }
            '\r' => {}
            '"' if field_start => {
                opened_at = Some(line);
                field_start = false;
            }
            _ => field_start = false,
        }
    }
    opened_at
}

/// Renders rows as CSV using the first row's key order as the header.
///
/// Returns `None` for an empty slice: there is nothing to export.
pub fn serialize(records: &[RawRow]) -> Result<Option<String>, CsvError> {
    let Some(first) = records.first() else {
        return Ok(None);
    };
    let header = first.keys().cloned().collect::<Vec<_>>();

    let mut wtr = WriterBuilder::new()
        .terminator(Terminator::Any(b'\n'))
        .from_writer(vec![]);
    wtr.write_record(&header)
        .map_err(|e| CsvError::Write(e.to_string()))?;
    for rec in records {
        let fields = header
            .iter()
            .map(|k| rec.get(k).map(String::as_str).unwrap_or(""));
        wtr.write_record(fields)
            .map_err(|e| CsvError::Write(e.to_string()))?;
    }
    let data = wtr
        .into_inner()
        .map_err(|e| CsvError::Write(e.to_string()))?;
    String::from_utf8(data)
        .map(Some)
        .map_err(|e| CsvError::Write(e.to_string()))
}

pub fn export_filename(entity: &str, date: NaiveDate) -> String {
    format!("{}-export-{}.csv", entity, date.format("%Y-%m-%d"))
}
