//! Generic record ↔ row codec for the delimited-text files.
//!
//! Every entity describes its on-disk layout once, as a [`Schema`] (file name
//! plus ordered column names), and implements [`CsvRecord`] by pushing typed
//! values into a [`RowWriter`] and pulling them back out of a [`RowReader`]
//! in the same column order. Quoting follows RFC 4180: a field containing the
//! delimiter, a quote, CR or LF is wrapped in double quotes with inner quotes
//! doubled, so one record may span several physical lines.

use std::borrow::Cow;
use std::fmt::Display;
use std::str::FromStr;

use super::DatabaseError;

const DELIMITER: char = ',';
const QUOTE: char = '"';

// ═══════════════════════════════════════════════════════════
// Schema
// ═══════════════════════════════════════════════════════════

/// Column layout of one entity file.
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    /// Entity name used in error messages and logs.
    pub entity: &'static str,
    /// File name inside the storage backend.
    pub file_name: &'static str,
    /// Column names, in on-disk order.
    pub columns: &'static [&'static str],
}

impl Schema {
    /// The fixed first line of the file.
    pub fn header(&self) -> String {
        self.columns.join(",")
    }

    fn matches_header(&self, fields: &[String]) -> bool {
        fields.len() == self.columns.len()
            && fields
                .iter()
                .zip(self.columns)
                .all(|(f, c)| f.trim().eq_ignore_ascii_case(c))
    }
}

/// An entity that can be written to and read from one CSV row.
pub trait CsvRecord: Sized {
    const SCHEMA: Schema;

    fn write_row(&self, row: &mut RowWriter);

    fn read_row(row: &mut RowReader<'_>) -> Result<Self, DatabaseError>;

    /// Reject values `write_row` cannot encode so that `read_row` gives them back.
    fn check(&self) -> Result<(), DatabaseError> {
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════
// Row writer / reader
// ═══════════════════════════════════════════════════════════

/// Collects the typed fields of one record, in column order.
#[derive(Debug, Default)]
pub struct RowWriter {
    fields: Vec<String>,
}

impl RowWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&mut self, value: &str) -> &mut Self {
        self.fields.push(value.to_string());
        self
    }

    pub fn opt_text(&mut self, value: Option<&str>) -> &mut Self {
        self.text(value.unwrap_or(""))
    }

    pub fn value<T: Display>(&mut self, value: T) -> &mut Self {
        self.fields.push(value.to_string());
        self
    }

    pub fn opt_id(&mut self, value: Option<u32>) -> &mut Self {
        match value {
            Some(id) => self.value(id),
            None => self.text(""),
        }
    }

    pub fn flag(&mut self, value: bool) -> &mut Self {
        self.text(if value { "true" } else { "false" })
    }

    pub fn into_fields(self) -> Vec<String> {
        self.fields
    }
}

/// Pulls typed fields out of one parsed row, in column order.
pub struct RowReader<'a> {
    schema: Schema,
    fields: &'a [String],
    line: usize,
    pos: usize,
}

impl<'a> RowReader<'a> {
    pub fn new(schema: Schema, fields: &'a [String], line: usize) -> Self {
        Self {
            schema,
            fields,
            line,
            pos: 0,
        }
    }

    fn malformed(&self, column: &str, detail: impl Display) -> DatabaseError {
        DatabaseError::MalformedInput(format!(
            "{} line {}, column {column}: {detail}",
            self.schema.file_name, self.line
        ))
    }

    fn next_raw(&mut self) -> Result<(&'static str, &'a str), DatabaseError> {
        let column = self.schema.columns.get(self.pos).copied().unwrap_or("?");
        let fields = self.fields;
        let raw = fields
            .get(self.pos)
            .ok_or_else(|| self.malformed(column, "missing field"))?;
        self.pos += 1;
        Ok((column, raw.as_str()))
    }

    pub fn text(&mut self) -> Result<String, DatabaseError> {
        Ok(self.next_raw()?.1.to_string())
    }

    pub fn opt_text(&mut self) -> Result<Option<String>, DatabaseError> {
        let (_, raw) = self.next_raw()?;
        Ok((!raw.is_empty()).then(|| raw.to_string()))
    }

    pub fn parse<T>(&mut self) -> Result<T, DatabaseError>
    where
        T: FromStr,
        T::Err: Display,
    {
        let (column, raw) = self.next_raw()?;
        raw.trim()
            .parse::<T>()
            .map_err(|e| self.malformed(column, format!("'{raw}': {e}")))
    }

    /// Optional id column. Empty and `-1` both mean "none".
    pub fn opt_id(&mut self) -> Result<Option<u32>, DatabaseError> {
        let (column, raw) = self.next_raw()?;
        match raw.trim() {
            "" | "-1" => Ok(None),
            s => s
                .parse::<u32>()
                .map(Some)
                .map_err(|e| self.malformed(column, format!("'{raw}': {e}"))),
        }
    }

    pub fn flag(&mut self) -> Result<bool, DatabaseError> {
        let (column, raw) = self.next_raw()?;
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" | "" => Ok(false),
            _ => Err(self.malformed(column, format!("'{raw}' is not a boolean"))),
        }
    }

    /// Fails unless every column has been consumed.
    pub fn finish(&self) -> Result<(), DatabaseError> {
        if self.pos == self.fields.len() {
            Ok(())
        } else {
            Err(DatabaseError::MalformedInput(format!(
                "{} line {}: expected {} fields, found {}",
                self.schema.file_name,
                self.line,
                self.schema.columns.len(),
                self.fields.len()
            )))
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Field-level quoting
// ═══════════════════════════════════════════════════════════

/// Quote a field if it would otherwise be ambiguous on disk.
pub fn escape_field(field: &str) -> Cow<'_, str> {
    let needs_quotes = field.contains([DELIMITER, QUOTE, '\n', '\r'])
        || field.starts_with([' ', '\t'])
        || field.ends_with([' ', '\t']);
    if needs_quotes {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

/// Join already-typed fields into one line (no trailing newline).
pub fn format_line<S: AsRef<str>>(fields: &[S]) -> String {
    fields
        .iter()
        .map(|f| escape_field(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",")
}

/// A parsed physical record and the line it started on (1-based).
pub type ParsedRow = (usize, Vec<String>);

/// Split CSV text into rows of fields.
///
/// Blank lines are skipped. CRLF line endings are accepted. A quoted field may
/// contain newlines; an unterminated quote is a `MalformedInput` error.
pub fn parse_rows(text: &str) -> Result<Vec<ParsedRow>, DatabaseError> {
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut has_content = false;
    let mut line = 1usize;
    let mut row_line = 1usize;

    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                QUOTE if chars.peek() == Some(&QUOTE) => {
                    chars.next();
                    field.push(QUOTE);
                }
                QUOTE => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push('\n');
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            QUOTE => {
                in_quotes = true;
                has_content = true;
            }
            DELIMITER => {
                row.push(std::mem::take(&mut field));
                has_content = true;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                if has_content {
                    row.push(std::mem::take(&mut field));
                    rows.push((row_line, std::mem::take(&mut row)));
                } else {
                    field.clear();
                }
                has_content = false;
                line += 1;
                row_line = line;
            }
            _ => {
                if !c.is_whitespace() {
                    has_content = true;
                }
                field.push(c);
            }
        }
    }

    if in_quotes {
        return Err(DatabaseError::MalformedInput(format!(
            "unterminated quoted field starting on line {row_line}"
        )));
    }
    if has_content {
        row.push(field);
        rows.push((row_line, row));
    }
    Ok(rows)
}

// ═══════════════════════════════════════════════════════════
// Table-level codec
// ═══════════════════════════════════════════════════════════

/// Serialize a whole collection: header line, then one line per record.
pub fn encode_table<T: CsvRecord>(records: &[T]) -> String {
    let mut out = T::SCHEMA.header();
    out.push('\n');
    for record in records {
        let mut writer = RowWriter::new();
        record.write_row(&mut writer);
        out.push_str(&format_line(&writer.into_fields()));
        out.push('\n');
    }
    out
}

/// Result of a lenient decode: the rows that parsed, and why the rest did not.
#[derive(Debug)]
pub struct DecodedTable<T> {
    pub records: Vec<T>,
    pub rejected: Vec<DatabaseError>,
}

/// Decode a collection, collecting bad rows instead of failing on them.
///
/// The header must match the schema and quoting must be balanced; otherwise
/// the file as a whole is rejected. Empty text decodes to an empty table.
pub fn decode_table_lenient<T: CsvRecord>(text: &str) -> Result<DecodedTable<T>, DatabaseError> {
    let schema = T::SCHEMA;
    let mut rows = parse_rows(text)?.into_iter();

    let mut decoded = DecodedTable {
        records: Vec::new(),
        rejected: Vec::new(),
    };

    let Some((_, header)) = rows.next() else {
        return Ok(decoded);
    };
    if !schema.matches_header(&header) {
        return Err(DatabaseError::MalformedInput(format!(
            "{}: unexpected header '{}' (expected '{}')",
            schema.file_name,
            header.join(","),
            schema.header()
        )));
    }

    for (line, fields) in rows {
        let mut reader = RowReader::new(schema, &fields, line);
        let parsed = T::read_row(&mut reader).and_then(|record| {
            reader.finish()?;
            Ok(record)
        });
        match parsed {
            Ok(record) => decoded.records.push(record),
            Err(e) => decoded.rejected.push(e),
        }
    }
    Ok(decoded)
}

/// Decode a collection, failing on the first bad row.
pub fn decode_table<T: CsvRecord>(text: &str) -> Result<Vec<T>, DatabaseError> {
    let decoded = decode_table_lenient::<T>(text)?;
    match decoded.rejected.into_iter().next() {
        Some(err) => Err(err),
        None => Ok(decoded.records),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Pair {
        id: u32,
        label: String,
        parent: Option<u32>,
        active: bool,
    }

    impl CsvRecord for Pair {
        const SCHEMA: Schema = Schema {
            entity: "Pair",
            file_name: "pairs.csv",
            columns: &["PairID", "Label", "ParentID", "Active"],
        };

        fn write_row(&self, row: &mut RowWriter) {
            row.value(self.id)
                .text(&self.label)
                .opt_id(self.parent)
                .flag(self.active);
        }

        fn read_row(row: &mut RowReader<'_>) -> Result<Self, DatabaseError> {
            Ok(Self {
                id: row.parse()?,
                label: row.text()?,
                parent: row.opt_id()?,
                active: row.flag()?,
            })
        }
    }

    fn pair(id: u32, label: &str) -> Pair {
        Pair {
            id,
            label: label.into(),
            parent: None,
            active: true,
        }
    }

    #[test]
    fn plain_fields_are_not_quoted() {
        assert_eq!(escape_field("Ward-A-12"), "Ward-A-12");
        assert!(matches!(escape_field("plain"), Cow::Borrowed(_)));
    }

    #[test]
    fn special_fields_are_quoted() {
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_field("two\nlines"), "\"two\nlines\"");
        assert_eq!(escape_field(" padded"), "\" padded\"");
    }

    #[test]
    fn parse_handles_quotes_and_embedded_newlines() {
        let rows = parse_rows("a,\"b,c\",\"d\"\"e\"\n\"multi\nline\",x,y\n").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].1, vec!["a", "b,c", "d\"e"]);
        assert_eq!(rows[1].0, 2);
        assert_eq!(rows[1].1, vec!["multi\nline", "x", "y"]);
    }

    #[test]
    fn parse_skips_blank_lines_and_accepts_crlf() {
        let rows = parse_rows("h1,h2\r\n\r\n1,2\r\n   \n3,4").unwrap();
        let fields: Vec<_> = rows.into_iter().map(|(_, f)| f).collect();
        assert_eq!(fields, vec![vec!["h1", "h2"], vec!["1", "2"], vec!["3", "4"]]);
    }

    #[test]
    fn parse_keeps_trailing_empty_field() {
        let rows = parse_rows("a,b,\n").unwrap();
        assert_eq!(rows[0].1, vec!["a", "b", ""]);
    }

    #[test]
    fn unterminated_quote_is_malformed() {
        let err = parse_rows("a,\"never closed\nb,c\n").unwrap_err();
        assert!(matches!(err, DatabaseError::MalformedInput(_)));
    }

    #[test]
    fn table_round_trip_preserves_order_and_awkward_text() {
        let records = vec![
            pair(3, "comma, separated"),
            Pair {
                id: 1,
                label: "quote \"inside\"\nand a newline".into(),
                parent: Some(3),
                active: false,
            },
            pair(2, ""),
        ];
        let text = encode_table(&records);
        assert!(text.starts_with("PairID,Label,ParentID,Active\n"));
        let decoded: Vec<Pair> = decode_table(&text).unwrap();
        assert_eq!(decoded, records);
    }

    #[test]
    fn header_mismatch_rejects_file() {
        let err = decode_table::<Pair>("Id,Name\n1,x\n").unwrap_err();
        assert!(matches!(err, DatabaseError::MalformedInput(_)));
    }

    #[test]
    fn header_is_case_insensitive() {
        let decoded: Vec<Pair> = decode_table("pairid,label,parentid,active\n1,x,,true\n").unwrap();
        assert_eq!(decoded, vec![pair(1, "x")]);
    }

    #[test]
    fn lenient_decode_collects_bad_rows() {
        let text = "PairID,Label,ParentID,Active\n\
                    1,ok,,true\n\
                    not-a-number,x,,true\n\
                    2,short\n\
                    3,fine,-1,0\n";
        let decoded = decode_table_lenient::<Pair>(text).unwrap();
        assert_eq!(decoded.records.len(), 2);
        assert_eq!(decoded.records[1].id, 3);
        assert_eq!(decoded.records[1].parent, None);
        assert!(!decoded.records[1].active);
        assert_eq!(decoded.rejected.len(), 2);
    }

    #[test]
    fn strict_decode_fails_on_extra_columns() {
        let err =
            decode_table::<Pair>("PairID,Label,ParentID,Active\n1,x,,true,extra\n").unwrap_err();
        assert!(err.to_string().contains("expected 4 fields"));
    }

    #[test]
    fn strict_decode_reports_first_bad_row() {
        let text = "PairID,Label,ParentID,Active\n1,ok,,true\n2,x,,maybe\nnope,y,,true\n";
        let err = decode_table::<Pair>(text).unwrap_err();
        assert!(err.to_string().contains("'maybe' is not a boolean"));
    }

    #[test]
    fn empty_text_is_empty_table() {
        assert!(decode_table::<Pair>("").unwrap().is_empty());
        assert!(decode_table::<Pair>("PairID,Label,ParentID,Active\n").unwrap().is_empty());
    }
}
