//! Extract reader with encoding and delimiter auto-detection.
//!
//! Produces raw string rows with a header. No typing happens here; see
//! [`crate::normalize`].

use std::collections::HashMap;
use std::path::Path;

use crate::error::{SchemaError, SchemaResult};

/// A raw extract: header row plus string rows, all padded to header width.
#[derive(Debug, Clone, PartialEq)]
pub struct Extract {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Detected or used encoding
    pub encoding: String,
    /// Detected or used delimiter
    pub delimiter: char,
}

impl Extract {
    pub fn column_of(&self, header: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == header)
    }
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to string using the specified encoding
pub fn decode_content(bytes: &[u8], encoding: &str) -> SchemaResult<String> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF".as_slice()).unwrap_or(bytes);
    let decoded = match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => match std::str::from_utf8(bytes) {
            Ok(s) => s.to_string(),
            Err(_) => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        },
        "iso-8859-1" | "latin-1" | "latin1" => encoding_rs::ISO_8859_15.decode(bytes).0.into_owned(),
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        other => {
            let label = encoding_rs::Encoding::for_label(other.as_bytes())
                .ok_or_else(|| SchemaError::Encoding(format!("unsupported encoding '{}'", other)))?;
            label.decode(bytes).0.into_owned()
        }
    };
    Ok(decoded)
}

/// Detect the delimiter by counting occurrences in the first line.
/// Ties go to the earlier candidate; comma when nothing matches.
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [',', ';', '\t', '|'];
    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Make header names unique: repeats become `Name.1`, `Name.2`, ...
/// Blank headers are left blank.
pub fn dedupe_headers(headers: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut taken: std::collections::HashSet<String> = headers.iter().cloned().collect();
    let mut out = Vec::with_capacity(headers.len());

    for header in headers {
        if header.is_empty() {
            out.push(header);
            continue;
        }
        let count = seen.entry(header.clone()).or_insert(0);
        if *count == 0 {
            *count = 1;
            out.push(header);
            continue;
        }
        let mut candidate = format!("{}.{}", header, count);
        while taken.contains(&candidate) {
            *count += 1;
            candidate = format!("{}.{}", header, count);
        }
        *count += 1;
        taken.insert(candidate.clone());
        out.push(candidate);
    }
    out
}

/// Parse extract text with an explicit delimiter.
pub fn parse_str(content: &str, delimiter: char, encoding: String) -> SchemaResult<Extract> {
    if content.trim().is_empty() {
        return Err(SchemaError::EmptyFile);
    }
    let delimiter_byte = u8::try_from(delimiter)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| SchemaError::Format {
            line: 0,
            message: format!("delimiter '{}' is not a single ASCII character", delimiter),
        })?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter_byte)
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let mut records = reader.records();

    let header_record = records
        .next()
        .ok_or(SchemaError::EmptyFile)?
        .map_err(|e| format_error(&e))?;
    let headers: Vec<String> = header_record.iter().map(str::to_string).collect();
    if headers.iter().all(|h| h.is_empty()) {
        return Err(SchemaError::NoHeaders);
    }
    let headers = dedupe_headers(headers);
    let width = headers.len();

    let mut rows = Vec::new();
    for record in records {
        let record = record.map_err(|e| format_error(&e))?;
        if record.iter().all(|field| field.is_empty()) {
            continue;
        }
        let mut row: Vec<String> = record.iter().take(width).map(str::to_string).collect();
        row.resize(width, String::new());
        rows.push(row);
    }

    Ok(Extract {
        headers,
        rows,
        encoding,
        delimiter,
    })
}

fn format_error(err: &csv::Error) -> SchemaError {
    let line = err
        .position()
        .map(|p| p.line() as usize)
        .unwrap_or(0);
    SchemaError::Format {
        line,
        message: err.to_string(),
    }
}

/// Parse extract bytes with auto-detection of encoding and delimiter.
pub fn parse_bytes_auto(bytes: &[u8]) -> SchemaResult<Extract> {
    if bytes.is_empty() {
        return Err(SchemaError::EmptyFile);
    }
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding)?;
    let delimiter = detect_delimiter(&content);
    parse_str(&content, delimiter, encoding)
}

/// Parse an extract file with auto-detection of encoding and delimiter.
pub fn parse_file_auto<P: AsRef<Path>>(path: P) -> SchemaResult<Extract> {
    let bytes = std::fs::read(path.as_ref())?;
    parse_bytes_auto(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(csv: &str, delimiter: char) -> Extract {
        parse_str(csv, delimiter, "utf-8".into()).unwrap()
    }

    #[test]
    fn test_simple_extract() {
        let extract = parse("PartNum;Source\nP-1;Job: MRP\nP-2;PO: 123", ';');
        assert_eq!(extract.headers, vec!["PartNum", "Source"]);
        assert_eq!(extract.rows.len(), 2);
        assert_eq!(extract.rows[0], vec!["P-1", "Job: MRP"]);
    }

    #[test]
    fn test_quoted_values_keep_delimiters() {
        let extract = parse("a,b\n\"x, y\",2", ',');
        assert_eq!(extract.rows[0][0], "x, y");
        assert_eq!(extract.rows[0][1], "2");
    }

    #[test]
    fn test_blank_lines_skipped_and_short_rows_padded() {
        let extract = parse("a,b,c\n1,2,3\n\n,,\n4\n", ',');
        assert_eq!(extract.rows.len(), 2);
        assert_eq!(extract.rows[1], vec!["4", "", ""]);
    }

    #[test]
    fn test_extra_fields_dropped() {
        let extract = parse("a,b\n1,2,3,4", ',');
        assert_eq!(extract.rows[0], vec!["1", "2"]);
    }

    #[test]
    fn test_duplicate_headers_suffixed() {
        let extract = parse("Qty,Qty,Name,Qty\n1,2,x,3", ',');
        assert_eq!(extract.headers, vec!["Qty", "Qty.1", "Name", "Qty.2"]);
    }

    #[test]
    fn test_dedupe_avoids_existing_suffix() {
        let headers = dedupe_headers(vec!["A".into(), "A.1".into(), "A".into()]);
        assert_eq!(headers, vec!["A", "A.1", "A.2"]);
    }

    #[test]
    fn test_empty_extract_error() {
        assert!(matches!(parse_str("", ',', "utf-8".into()), Err(SchemaError::EmptyFile)));
        assert!(matches!(parse_bytes_auto(b""), Err(SchemaError::EmptyFile)));
    }

    #[test]
    fn test_blank_header_row_error() {
        assert!(matches!(parse_str(",,\n1,2,3", ',', "utf-8".into()), Err(SchemaError::NoHeaders)));
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3"), ';');
        assert_eq!(detect_delimiter("a,b,c\n1,2,3"), ',');
        assert_eq!(detect_delimiter("a\tb\tc"), '\t');
        assert_eq!(detect_delimiter("a|b|c"), '|');
        assert_eq!(detect_delimiter("single"), ',');
    }

    #[test]
    fn test_auto_parse() {
        let result = parse_bytes_auto("PartNum;txtDueDate\nP-1;01/02/2025".as_bytes()).unwrap();
        assert_eq!(result.delimiter, ';');
        assert_eq!(result.encoding, "utf-8");
        assert_eq!(result.rows.len(), 1);
    }

    #[test]
    fn test_latin1_decoding() {
        // "Société" in ISO-8859-1
        let bytes: &[u8] = &[0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9];
        let decoded = decode_content(bytes, "iso-8859-1").unwrap();
        assert_eq!(decoded, "Société");
    }

    #[test]
    fn test_bom_stripped() {
        let decoded = decode_content(b"\xEF\xBB\xBFPartNum", "utf-8").unwrap();
        assert_eq!(decoded, "PartNum");
    }
}
