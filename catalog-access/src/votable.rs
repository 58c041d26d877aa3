//! VOTable codec for TAP responses and uploads.
//!
//! Only the TABLEDATA serialization is handled; services are asked for it
//! through each catalog's `FORMAT` parameter. The first TABLE of the document
//! is read. A `QUERY_STATUS` of `ERROR` is reported as a service error even
//! when it arrives with a success status.

use std::fmt::Write as _;

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::table::{Column, DataType, ResultTable, TableError, Value};

/// Errors raised while decoding a VOTable document.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum VoTableError {
    #[error("XML parse error: {0}")]
    Xml(String),
    #[error("No TABLE element in VOTable")]
    MissingTable,
    #[error("Unsupported VOTable serialization: {0}")]
    UnsupportedSerialization(String),
    #[error("Service reported an error: {0}")]
    QueryStatus(String),
    #[error("Invalid {datatype} value '{value}' in column {column}")]
    InvalidValue {
        column: String,
        datatype: &'static str,
        value: String,
    },
    #[error(transparent)]
    Table(#[from] TableError),
}

fn attribute(element: &BytesStart, name: &[u8]) -> Result<Option<String>, VoTableError> {
    for attr in element.attributes() {
        let attr = attr.map_err(|e| VoTableError::Xml(e.to_string()))?;
        if attr.key.local_name().as_ref() == name {
            let value = attr
                .unescape_value()
                .map_err(|e| VoTableError::Xml(e.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn parse_cell(column: &Column, text: &str) -> Result<Value, VoTableError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(Value::Null);
    }
    let invalid = || VoTableError::InvalidValue {
        column: column.name.clone(),
        datatype: column.datatype.votable_name(),
        value: text.to_string(),
    };
    match column.datatype {
        DataType::Char => Ok(Value::Text(text.to_string())),
        DataType::Long => text.parse::<i64>().map(Value::Int).map_err(|_| invalid()),
        DataType::Double => match text {
            "NaN" | "nan" => Ok(Value::Null),
            _ => text.parse::<f64>().map(Value::Float).map_err(|_| invalid()),
        },
        DataType::Boolean => match text {
            "T" | "t" | "true" | "TRUE" | "1" => Ok(Value::Bool(true)),
            "F" | "f" | "false" | "FALSE" | "0" => Ok(Value::Bool(false)),
            "?" | " " => Ok(Value::Null),
            _ => Err(invalid()),
        },
    }
}

/// State of the single-pass reader.
#[derive(Default)]
struct Decoder {
    columns: Vec<Column>,
    table: Option<ResultTable>,
    in_table: bool,
    table_done: bool,
    row: Option<Vec<String>>,
    cell: Option<String>,
    error_info: Option<String>,
    in_error_info: bool,
}

impl Decoder {
    fn open(&mut self, element: &BytesStart, empty: bool) -> Result<(), VoTableError> {
        match element.local_name().as_ref() {
            b"INFO" => {
                let is_status = attribute(element, b"name")?.as_deref() == Some("QUERY_STATUS");
                if is_status && attribute(element, b"value")?.as_deref() == Some("ERROR") {
                    self.error_info = Some(String::new());
                    self.in_error_info = !empty;
                }
            }
            b"TABLE" if !self.table_done => {
                self.in_table = true;
                self.columns.clear();
            }
            b"FIELD" if self.in_table => {
                let name = attribute(element, b"name")?
                    .or(attribute(element, b"ID")?)
                    .unwrap_or_else(|| format!("col{}", self.columns.len()));
                let datatype = attribute(element, b"datatype")?.unwrap_or_default();
                let mut column = Column::new(name, DataType::from_votable(&datatype));
                column.unit = attribute(element, b"unit")?;
                self.columns.push(column);
            }
            b"TABLEDATA" if self.in_table => {
                self.table = Some(ResultTable::new(std::mem::take(&mut self.columns))?);
            }
            name @ (b"BINARY" | b"BINARY2" | b"FITS") if self.in_table => {
                return Err(VoTableError::UnsupportedSerialization(
                    String::from_utf8_lossy(name).into_owned(),
                ));
            }
            b"TR" if self.table.is_some() && self.in_table => self.row = Some(Vec::new()),
            b"TD" if self.row.is_some() => {
                if empty {
                    if let Some(row) = self.row.as_mut() {
                        row.push(String::new());
                    }
                } else {
                    self.cell = Some(String::new());
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn text(&mut self, text: &str) {
        if let Some(cell) = self.cell.as_mut() {
            cell.push_str(text);
        } else if self.in_error_info {
            if let Some(info) = self.error_info.as_mut() {
                info.push_str(text);
            }
        }
    }

    fn close(&mut self, name: &[u8]) -> Result<(), VoTableError> {
        match name {
            b"INFO" => self.in_error_info = false,
            b"TD" => {
                if let (Some(cell), Some(row)) = (self.cell.take(), self.row.as_mut()) {
                    row.push(cell);
                }
            }
            b"TR" => {
                if let (Some(cells), Some(table)) = (self.row.take(), self.table.as_mut()) {
                    let values = table
                        .columns()
                        .iter()
                        .zip(cells.iter())
                        .map(|(column, text)| parse_cell(column, text))
                        .collect::<Result<Vec<_>, _>>()?;
                    table.push_row(values)?;
                }
            }
            b"TABLE" if self.in_table => {
                self.in_table = false;
                self.table_done = true;
                if self.table.is_none() {
                    // Metadata-only table: columns but no data section.
                    self.table = Some(ResultTable::new(std::mem::take(&mut self.columns))?);
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Decode the first table of a VOTable document.
pub fn parse(document: &[u8]) -> Result<ResultTable, VoTableError> {
    let mut reader = Reader::from_reader(document);
    let mut decoder = Decoder::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => decoder.open(e, false)?,
            Ok(Event::Empty(ref e)) => {
                decoder.open(e, true)?;
                if e.local_name().as_ref() == b"TD" || e.local_name().as_ref() == b"INFO" {
                    decoder.close(e.local_name().as_ref())?;
                }
            }
            Ok(Event::Text(ref e)) => {
                let text = e.unescape().map_err(|e| VoTableError::Xml(e.to_string()))?;
                decoder.text(&text);
            }
            Ok(Event::CData(ref e)) => decoder.text(&String::from_utf8_lossy(e.as_ref())),
            Ok(Event::End(ref e)) => decoder.close(e.local_name().as_ref())?,
            Ok(Event::Eof) => break,
            Err(e) => return Err(VoTableError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    if let Some(info) = decoder.error_info {
        return Err(VoTableError::QueryStatus(info.trim().to_string()));
    }
    decoder.table.ok_or(VoTableError::MissingTable)
}

/// Column type for writing: declared type, or inferred from the first
/// non-null value when the declared type is free text.
fn output_datatype(table: &ResultTable, index: usize) -> DataType {
    let declared = table.columns()[index].datatype;
    if declared != DataType::Char {
        return declared;
    }
    table
        .rows()
        .iter()
        .find_map(|row| row[index].datatype())
        .unwrap_or(DataType::Char)
}

/// Encode `table` as a TABLEDATA VOTable named `name`, for TAP uploads.
pub fn write(table: &ResultTable, name: &str) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str("<VOTABLE version=\"1.3\" xmlns=\"http://www.ivoa.net/xml/VOTable/v1.3\">\n");
    out.push_str("<RESOURCE type=\"results\">\n");
    let _ = writeln!(out, "<TABLE name=\"{}\">", escape(name));

    for (index, column) in table.columns().iter().enumerate() {
        let datatype = output_datatype(table, index);
        let _ = write!(
            out,
            "<FIELD name=\"{}\" datatype=\"{}\"",
            escape(column.name.as_str()),
            datatype.votable_name()
        );
        if datatype == DataType::Char {
            out.push_str(" arraysize=\"*\"");
        }
        if let Some(unit) = &column.unit {
            let _ = write!(out, " unit=\"{}\"", escape(unit.as_str()));
        }
        out.push_str("/>\n");
    }

    out.push_str("<DATA><TABLEDATA>\n");
    for row in table.rows() {
        out.push_str("<TR>");
        for value in row {
            let text = match value {
                Value::Bool(true) => "T".to_string(),
                Value::Bool(false) => "F".to_string(),
                Value::Float(v) if !v.is_finite() => String::new(),
                other => other.to_string(),
            };
            let _ = write!(out, "<TD>{}</TD>", escape(text.as_str()));
        }
        out.push_str("</TR>\n");
    }
    out.push_str("</TABLEDATA></DATA>\n</TABLE>\n</RESOURCE>\n</VOTABLE>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const GAIA_RESPONSE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<VOTABLE version="1.4" xmlns="http://www.ivoa.net/xml/VOTable/v1.3">
  <RESOURCE type="results">
    <INFO name="QUERY_STATUS" value="OK"/>
    <TABLE>
      <FIELD name="gaia_id" datatype="long" ucd="meta.id"/>
      <FIELD name="RA" datatype="double" unit="deg"/>
      <FIELD name="Dec" datatype="double" unit="deg"/>
      <FIELD name="GMagnitude" datatype="float" unit="mag"/>
      <FIELD name="phot_variable_flag" datatype="char" arraysize="*"/>
      <DATA>
        <TABLEDATA>
          <TR><TD>4295806720</TD><TD>44.996</TD><TD>0.0053</TD><TD>17.64</TD><TD>NOT_AVAILABLE</TD></TR>
          <TR><TD>34361129088</TD><TD>45.004</TD><TD>0.0198</TD><TD/><TD>A &amp; B</TD></TR>
        </TABLEDATA>
      </DATA>
    </TABLE>
  </RESOURCE>
</VOTABLE>"#;

    #[test]
    fn test_parse_tabledata() {
        let table = parse(GAIA_RESPONSE.as_bytes()).unwrap();
        assert_eq!(
            table.column_names(),
            vec!["gaia_id", "RA", "Dec", "GMagnitude", "phot_variable_flag"]
        );
        assert_eq!(table.column("RA").unwrap().unit.as_deref(), Some("deg"));
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.value(0, "gaia_id"), Some(&Value::Int(4295806720)));
        assert_eq!(table.value(1, "GMagnitude"), Some(&Value::Null));
        assert_eq!(
            table.value(1, "phot_variable_flag"),
            Some(&Value::from("A & B"))
        );
    }

    #[test]
    fn test_query_status_error() {
        let doc = r#"<VOTABLE><RESOURCE type="results">
            <INFO name="QUERY_STATUS" value="ERROR">Unknown column "foo"</INFO>
        </RESOURCE></VOTABLE>"#;
        assert_eq!(
            parse(doc.as_bytes()).unwrap_err(),
            VoTableError::QueryStatus("Unknown column \"foo\"".to_string())
        );
    }

    #[test]
    fn test_binary_serialization_rejected() {
        let doc = r#"<VOTABLE><RESOURCE><TABLE><FIELD name="a" datatype="int"/>
            <DATA><BINARY2><STREAM encoding="base64">AAAA</STREAM></BINARY2></DATA>
        </TABLE></RESOURCE></VOTABLE>"#;
        assert_eq!(
            parse(doc.as_bytes()).unwrap_err(),
            VoTableError::UnsupportedSerialization("BINARY2".to_string())
        );
    }

    #[test]
    fn test_not_a_votable() {
        assert_eq!(
            parse(b"<html><body>Service down</body></html>").unwrap_err(),
            VoTableError::MissingTable
        );
        assert!(matches!(
            parse(b"<VOTABLE><TABLE></VOTABLE>").unwrap_err(),
            VoTableError::Xml(_)
        ));
    }

    #[test]
    fn test_written_upload_parses_back() {
        let mut table = ResultTable::new(vec![
            Column::new("gaia_id", DataType::Char),
            Column::new("adjusted_ra", DataType::Double).with_unit("deg"),
            Column::new("adjusted_dec", DataType::Double).with_unit("deg"),
        ])
        .unwrap();
        table
            .push_row(vec![Value::Int(42), 10.25.into(), (-3.5).into()])
            .unwrap();
        table
            .push_row(vec![Value::Int(43), Value::Null, Value::Null])
            .unwrap();

        let document = write(&table, "tmp_table");
        assert!(document.contains("<TABLE name=\"tmp_table\">"));
        assert!(document.contains("<FIELD name=\"gaia_id\" datatype=\"long\"/>"));

        let parsed = parse(document.as_bytes()).unwrap();
        assert_eq!(parsed.value(0, "gaia_id"), Some(&Value::Int(42)));
        assert_eq!(parsed.value(0, "adjusted_dec"), Some(&Value::Float(-3.5)));
        assert_eq!(parsed.value(1, "adjusted_ra"), Some(&Value::Null));
    }
}
