//! File-backed sources and write-through sinks for chains.
//!
//! Sources open their file up front (an unreadable path fails immediately
//! with [`ChainError::Io`]) and then read lazily; every per-line or per-row
//! failure becomes an upstream item the error handler can skip. Writers also
//! open eagerly and are plugged in with [`Chain::transform`] or
//! [`Chain::write_to`]; they write each element as it passes and yield it
//! unchanged.

use crate::core::chain::{Chain, Stream};
use crate::domain::model::Record;
use crate::utils::error::{ChainError, Result};
use serde::Serialize;
use serde_json::Value;
use std::fmt::Display;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::iter;
use std::path::Path;

pub fn read_lines<P: AsRef<Path>>(path: P) -> Result<impl Iterator<Item = Result<String>>> {
    let file = File::open(path)?;
    Ok(BufReader::new(file).lines().map(|line| line.map_err(ChainError::upstream)))
}

/// One JSON value per line. Blank lines are skipped.
pub fn read_jsonl<P: AsRef<Path>>(path: P) -> Result<impl Iterator<Item = Result<Value>>> {
    let lines = read_lines(path)?;
    Ok(lines.enumerate().filter_map(|(index, line)| {
        let line = match line {
            Ok(line) => line,
            Err(err) => return Some(Err(err)),
        };
        if line.trim().is_empty() {
            return None;
        }
        Some(
            serde_json::from_str::<Value>(&line)
                .map_err(|err| ChainError::upstream(format!("line {}: {}", index + 1, err))),
        )
    }))
}

/// Like [`read_jsonl`], but every line has to hold a JSON object.
pub fn read_jsonl_records<P: AsRef<Path>>(path: P) -> Result<impl Iterator<Item = Result<Record>>> {
    let values = read_jsonl(path)?;
    Ok(values.map(|value| {
        value.and_then(|value| {
            Record::from_value(value).ok_or_else(|| ChainError::upstream("line is not a JSON object"))
        })
    }))
}

/// Raw CSV rows. The first row is data like any other.
pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<impl Iterator<Item = Result<Vec<String>>>> {
    let file = File::open(path)?;
    let reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(file);
    Ok(reader.into_records().map(|row| {
        row.map(|row| row.iter().map(String::from).collect::<Vec<String>>())
            .map_err(ChainError::upstream)
    }))
}

/// CSV rows as records keyed by the header row.
///
/// With explicit `fieldnames` the file has no header and its first row is
/// data. A row whose width does not match the field names is an upstream
/// failure.
pub fn read_csv_records<P: AsRef<Path>>(
    path: P,
    fieldnames: Option<Vec<String>>,
) -> Result<impl Iterator<Item = Result<Record>>> {
    let file = File::open(path.as_ref())?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(fieldnames.is_none())
        .flexible(true)
        .from_reader(file);

    let fieldnames = match fieldnames {
        Some(names) => names,
        None => reader
            .headers()
            .map_err(|err| {
                ChainError::config(format!(
                    "cannot read CSV header from {}: {}",
                    path.as_ref().display(),
                    err
                ))
            })?
            .iter()
            .map(String::from)
            .collect(),
    };

    Ok(reader.into_records().map(move |row| -> Result<Record> {
        let row = row.map_err(ChainError::upstream)?;
        if row.len() != fieldnames.len() {
            return Err(ChainError::upstream(format!(
                "row has {} fields, expected {}",
                row.len(),
                fieldnames.len()
            )));
        }
        Ok(fieldnames
            .iter()
            .zip(row.iter())
            .map(|(name, cell)| (name.clone(), Value::String(cell.to_string())))
            .collect())
    }))
}

/// An endless source calling `f` for every element.
pub fn call_repeatedly<T, F: FnMut() -> T>(f: F) -> impl Iterator<Item = T> {
    iter::repeat_with(f)
}

/// Destination for elements passing through a [`WriteThrough`] stage.
pub trait RecordWriter<T> {
    fn write(&mut self, value: &T) -> Result<()>;

    fn flush(&mut self) -> Result<()>;

    /// Puts this writer behind `upstream`, e.g. from within [`Chain::transform`].
    fn wrap<'a>(self, upstream: Stream<'a, T>) -> WriteThrough<'a, T, Self>
    where
        Self: Sized,
    {
        WriteThrough {
            upstream,
            writer: self,
            flushed: false,
        }
    }
}

/// Writes every value it passes along and flushes once its input ends.
pub struct WriteThrough<'a, T, W> {
    upstream: Stream<'a, T>,
    writer: W,
    flushed: bool,
}

impl<'a, T, W: RecordWriter<T>> Iterator for WriteThrough<'a, T, W> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Result<T>> {
        match self.upstream.next() {
            Some(Ok(value)) => Some(self.writer.write(&value).map(|()| value)),
            Some(Err(err)) => Some(Err(err)),
            None if self.flushed => None,
            None => {
                self.flushed = true;
                self.writer.flush().err().map(Err)
            }
        }
    }
}

fn open_for_write(path: &Path, append: bool) -> Result<File> {
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .append(append)
        .truncate(!append)
        .open(path)?;
    Ok(file)
}

fn csv_error(err: csv::Error) -> ChainError {
    ChainError::from(io::Error::from(err))
}

pub struct LineWriter {
    out: BufWriter<File>,
}

/// Writes each element's `Display` form on its own line.
pub fn write_lines<P: AsRef<Path>>(path: P, append: bool) -> Result<LineWriter> {
    Ok(LineWriter {
        out: BufWriter::new(open_for_write(path.as_ref(), append)?),
    })
}

impl<T: Display> RecordWriter<T> for LineWriter {
    fn write(&mut self, value: &T) -> Result<()> {
        writeln!(self.out, "{}", value)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

pub struct JsonlWriter {
    out: BufWriter<File>,
}

/// Writes each element as one line of JSON.
pub fn write_jsonl<P: AsRef<Path>>(path: P, append: bool) -> Result<JsonlWriter> {
    Ok(JsonlWriter {
        out: BufWriter::new(open_for_write(path.as_ref(), append)?),
    })
}

impl<T: Serialize> RecordWriter<T> for JsonlWriter {
    fn write(&mut self, value: &T) -> Result<()> {
        serde_json::to_writer(&mut self.out, value).map_err(io::Error::from)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

fn reject_header_on_append(has_header: bool, append: bool) -> Result<()> {
    if has_header && append {
        return Err(ChainError::config(
            "a CSV header cannot be written when appending to an existing file",
        ));
    }
    Ok(())
}

pub struct CsvWriter {
    out: csv::Writer<File>,
}

/// Writes `Vec<String>` rows, starting with `header` when given.
pub fn write_csv<P: AsRef<Path>>(path: P, header: Option<Vec<String>>, append: bool) -> Result<CsvWriter> {
    reject_header_on_append(header.is_some(), append)?;
    let mut out = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(open_for_write(path.as_ref(), append)?);
    if let Some(header) = header {
        out.write_record(&header).map_err(csv_error)?;
    }
    Ok(CsvWriter { out })
}

impl RecordWriter<Vec<String>> for CsvWriter {
    fn write(&mut self, value: &Vec<String>) -> Result<()> {
        self.out.write_record(value).map_err(csv_error)
    }

    fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

pub struct CsvRecordWriter {
    out: csv::Writer<File>,
    fieldnames: Vec<String>,
}

/// Writes records as CSV rows in `fieldnames` order; absent fields are empty cells.
pub fn write_csv_records<P: AsRef<Path>>(
    path: P,
    fieldnames: Vec<String>,
    include_header: bool,
    append: bool,
) -> Result<CsvRecordWriter> {
    reject_header_on_append(include_header, append)?;
    let mut out = csv::Writer::from_writer(open_for_write(path.as_ref(), append)?);
    if include_header {
        out.write_record(&fieldnames).map_err(csv_error)?;
    }
    Ok(CsvRecordWriter { out, fieldnames })
}

impl RecordWriter<Record> for CsvRecordWriter {
    fn write(&mut self, value: &Record) -> Result<()> {
        let row = self.fieldnames.iter().map(|name| value.cell(name));
        self.out.write_record(row).map_err(csv_error)
    }

    fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// Counts elements on their way through and reports the total once the
/// input is exhausted.
pub struct Counter<'a, T, F> {
    upstream: Stream<'a, T>,
    count: usize,
    callback: Option<F>,
}

impl<'a, T, F: FnOnce(usize)> Iterator for Counter<'a, T, F> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Result<T>> {
        match self.upstream.next() {
            Some(item) => {
                if item.is_ok() {
                    self.count += 1;
                }
                Some(item)
            }
            None => {
                if let Some(callback) = self.callback.take() {
                    callback(self.count);
                }
                None
            }
        }
    }
}

/// A transform for [`Chain::transform`] that hands the element count to `callback`.
pub fn counter<'a, T, F>(callback: F) -> impl FnOnce(Stream<'a, T>) -> Counter<'a, T, F>
where
    F: FnOnce(usize),
{
    move |upstream| Counter {
        upstream,
        count: 0,
        callback: Some(callback),
    }
}

impl<'a, S: 'a, T: 'a> Chain<'a, S, T> {
    /// Writes every element to `writer` as it passes.
    pub fn write_to<W>(self, writer: W) -> Self
    where
        W: RecordWriter<T> + 'a,
    {
        self.stage("write", move |stream| writer.wrap(stream))
    }
}
