//! Streaming reader for one partition file
//!
//! Validates the header width on open, then yields one [`Record`] per
//! non-blank line. Malformed lines come back as `Err(IngestError::Parse)` and
//! the reader carries on with the next line; an I/O error ends the sequence.

use encoding_rs::Encoding;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::types::{PartitionDescriptor, Record};
use crate::error::{IngestError, Result};
use crate::schema::TableSchema;

/// Resolve a WHATWG encoding label such as `euc-kr` or `utf-8`
pub fn resolve_encoding(label: &str) -> Option<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes())
}

/// Split one line on commas, honouring double-quoted fields
///
/// Quoted fields may contain commas and `""` escapes. An odd number of quote
/// characters means a quoted field was never closed.
pub fn tokenize(line: &str) -> std::result::Result<Vec<String>, String> {
    if line.bytes().filter(|&b| b == b'"').count() % 2 == 1 {
        return Err("unterminated quoted field".to_string());
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes());
    let mut record = csv::StringRecord::new();

    match reader.read_record(&mut record) {
        Ok(true) => Ok(record.iter().map(str::to_string).collect()),
        Ok(false) => Ok(Vec::new()),
        Err(e) => Err(e.to_string()),
    }
}

pub struct PartitionReader {
    descriptor: PartitionDescriptor,
    lines: BufReader<File>,
    encoding: &'static Encoding,
    width: usize,
    key_column: usize,
    line: usize,
    buf: Vec<u8>,
    exhausted: bool,
}

impl PartitionReader {
    /// Open a partition and check its header against the schema
    pub async fn open(
        descriptor: &PartitionDescriptor,
        schema: &TableSchema,
        encoding: &'static Encoding,
    ) -> Result<Self> {
        let path = &descriptor.path;
        let file = File::open(path)
            .await
            .map_err(|e| IngestError::io(path, e))?;

        let mut reader = Self {
            descriptor: descriptor.clone(),
            lines: BufReader::new(file),
            encoding,
            width: schema.width(),
            key_column: schema.key_column,
            line: 0,
            buf: Vec::new(),
            exhausted: false,
        };

        let found = match reader.read_raw_line().await? {
            Some(()) => {
                let (header, _) = encoding.decode_with_bom_removal(&reader.buf);
                tokenize(&header).map(|cols| cols.len()).unwrap_or(0)
            },
            None => 0,
        };

        if found != reader.width {
            return Err(IngestError::SchemaMismatch {
                path: path.clone(),
                expected: reader.width,
                found,
            });
        }

        Ok(reader)
    }

    pub fn descriptor(&self) -> &PartitionDescriptor {
        &self.descriptor
    }

    /// Next record, `None` once the file is exhausted
    pub async fn next_record(&mut self) -> Option<Result<Record>> {
        loop {
            if self.exhausted {
                return None;
            }

            match self.read_raw_line().await {
                Ok(Some(())) => {},
                Ok(None) => {
                    self.exhausted = true;
                    return None;
                },
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e));
                },
            }

            let (text, _) = self.encoding.decode_without_bom_handling(&self.buf);
            if text.trim().is_empty() {
                continue;
            }

            let values = match tokenize(&text) {
                Ok(values) => values,
                Err(reason) => {
                    return Some(Err(IngestError::Parse {
                        line: self.line,
                        raw: text.into_owned(),
                        reason,
                    }))
                },
            };

            if values.len() != self.width {
                return Some(Err(IngestError::Parse {
                    line: self.line,
                    raw: text.into_owned(),
                    reason: format!("expected {} columns, found {}", self.width, values.len()),
                }));
            }

            return Some(Ok(Record::new(
                self.descriptor.index,
                self.line,
                values,
                self.key_column,
            )));
        }
    }

    /// Fill `buf` with the next line minus its terminator
    async fn read_raw_line(&mut self) -> Result<Option<()>> {
        self.buf.clear();
        let n = self
            .lines
            .read_until(b'\n', &mut self.buf)
            .await
            .map_err(|e| IngestError::io(&self.descriptor.path, e))?;
        if n == 0 {
            return Ok(None);
        }

        self.line += 1;
        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
        }
        if self.buf.last() == Some(&b'\r') {
            self.buf.pop();
        }
        Ok(Some(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::schema::{Column, ColumnKind};
    use std::path::Path;
    use tempfile::TempDir;

    fn schema() -> TableSchema {
        TableSchema {
            table: "t",
            key_column: 0,
            columns: vec![
                Column {
                    name: "id",
                    label: "id",
                    kind: ColumnKind::Integer,
                },
                Column {
                    name: "name",
                    label: "name",
                    kind: ColumnKind::Text,
                },
                Column {
                    name: "opened",
                    label: "opened",
                    kind: ColumnKind::Date,
                },
            ],
        }
    }

    fn descriptor(dir: &Path, content: &[u8]) -> PartitionDescriptor {
        let path = dir.join("part-000.csv");
        std::fs::write(&path, content).unwrap();
        PartitionDescriptor {
            index: 0,
            path,
            line_bound: 100,
        }
    }

    async fn drain(reader: &mut PartitionReader) -> Vec<Result<Record>> {
        let mut out = Vec::new();
        while let Some(item) = reader.next_record().await {
            out.push(item);
        }
        out
    }

    #[test]
    fn test_tokenize_quotes_and_escapes() {
        assert_eq!(tokenize("a,b,c").unwrap(), vec!["a", "b", "c"]);
        assert_eq!(
            tokenize(r#"1,"Seoul, Jung-gu","say ""hi""""#).unwrap(),
            vec!["1", "Seoul, Jung-gu", r#"say "hi""#]
        );
        assert_eq!(tokenize("a,,").unwrap(), vec!["a", "", ""]);
        assert!(tokenize(r#"1,"open,2"#).is_err());
    }

    #[tokio::test]
    async fn test_reads_records_and_skips_blank_lines() {
        let dir = TempDir::new().unwrap();
        let desc = descriptor(
            dir.path(),
            b"id,name,opened\n1,alpha,2024-01-01\n\n   \n2,\"b,eta\",\n",
        );

        let mut reader = PartitionReader::open(&desc, &schema(), encoding_rs::UTF_8)
            .await
            .unwrap();
        let records: Vec<Record> = drain(&mut reader)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].key(), "1");
        assert_eq!(records[0].line(), 2);
        assert_eq!(records[1].values(), &["2", "b,eta", ""]);
        assert_eq!(records[1].line(), 5);
    }

    #[tokio::test]
    async fn test_malformed_lines_do_not_stop_the_reader() {
        let dir = TempDir::new().unwrap();
        let desc = descriptor(
            dir.path(),
            b"id,name,opened\n1,a\n2,\"unterminated,x\n3,c,2024-02-02\n",
        );

        let mut reader = PartitionReader::open(&desc, &schema(), encoding_rs::UTF_8)
            .await
            .unwrap();
        let items = drain(&mut reader).await;

        assert_eq!(items.len(), 3);
        match &items[0] {
            Err(IngestError::Parse { line, raw, .. }) => {
                assert_eq!(*line, 2);
                assert_eq!(raw, "1,a");
            },
            other => panic!("expected parse error, got {:?}", other),
        }
        assert_eq!(items[1].as_ref().unwrap_err().kind(), ErrorKind::Parse);
        assert_eq!(items[2].as_ref().unwrap().key(), "3");
    }

    #[tokio::test]
    async fn test_header_width_mismatch_is_schema_error() {
        let dir = TempDir::new().unwrap();
        let desc = descriptor(dir.path(), b"id,name\n1,a\n");

        let err = PartitionReader::open(&desc, &schema(), encoding_rs::UTF_8)
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            IngestError::SchemaMismatch {
                expected: 3,
                found: 2,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_empty_partition_is_schema_error() {
        let dir = TempDir::new().unwrap();
        let desc = descriptor(dir.path(), b"");
        let err = PartitionReader::open(&desc, &schema(), encoding_rs::UTF_8)
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::SchemaMismatch);
    }

    #[tokio::test]
    async fn test_decodes_legacy_korean_encoding() {
        let dir = TempDir::new().unwrap();
        let encoding = resolve_encoding("euc-kr").unwrap();
        let (bytes, _, _) = encoding.encode("id,name,opened\n7,한식당,\n");
        let desc = descriptor(dir.path(), &bytes);

        let mut reader = PartitionReader::open(&desc, &schema(), encoding).await.unwrap();
        let record = reader.next_record().await.unwrap().unwrap();
        assert_eq!(record.values()[1], "한식당");
        assert!(reader.next_record().await.is_none());
    }
}
