use crate::error::{AnalyticsError, AnalyticsResult};
use crate::model::{parse_timestamp, Event, Item};
use csv::StringRecord;
use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

pub const EVENTS_SOURCE: &str = "listening_logs";
pub const ITEMS_SOURCE: &str = "songs_metadata";

const EVENT_COLUMNS: [&str; 4] = ["user_id", "song_id", "timestamp", "duration_sec"];
const ITEM_COLUMNS: [&str; 5] = ["song_id", "title", "artist", "genre", "mood"];

pub fn load_events(path: &Path) -> AnalyticsResult<Vec<Event>> {
    let started = Instant::now();
    let source = SourceText::read(EVENTS_SOURCE, path)?;
    let mut reader = source.reader();
    let Some(cols) = resolve_columns(EVENTS_SOURCE, path, &source, &mut reader, &EVENT_COLUMNS)? else {
        return Ok(vec![]);
    };

    let mut out = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| map_csv_error(EVENTS_SOURCE, path, &source, err))?;
        let line = source.line_of(record.position());
        out.push(parse_event(&record, &cols, line)?);
    }

    tracing::info!(
        phase = "load",
        source = EVENTS_SOURCE,
        rows = out.len(),
        duration_ms = started.elapsed().as_millis() as u64,
        "source loaded"
    );
    Ok(out)
}

pub fn load_items(path: &Path) -> AnalyticsResult<Vec<Item>> {
    let started = Instant::now();
    let source = SourceText::read(ITEMS_SOURCE, path)?;
    let mut reader = source.reader();
    let Some(cols) = resolve_columns(ITEMS_SOURCE, path, &source, &mut reader, &ITEM_COLUMNS)? else {
        return Ok(vec![]);
    };

    let mut out = Vec::new();
    let mut first_seen: HashMap<String, u64> = HashMap::new();
    for record in reader.records() {
        let record = record.map_err(|err| map_csv_error(ITEMS_SOURCE, path, &source, err))?;
        let line = source.line_of(record.position());
        let item = parse_item(&record, &cols, line)?;
        if let Some(first) = first_seen.get(&item.song_id) {
            return Err(AnalyticsError::schema(
                ITEMS_SOURCE,
                line,
                "song_id",
                format!("duplicates key {:?} first seen at line {first}", item.song_id),
            ));
        }
        first_seen.insert(item.song_id.clone(), line);
        out.push(item);
    }

    tracing::info!(
        phase = "load",
        source = ITEMS_SOURCE,
        rows = out.len(),
        duration_ms = started.elapsed().as_millis() as u64,
        "source loaded"
    );
    Ok(out)
}

/// A source held in memory together with its line breaks, so errors can name
/// the physical line. The csv reader does not count the blank lines it skips.
struct SourceText {
    contents: Vec<u8>,
    newlines: Vec<u64>,
}

impl SourceText {
    fn read(source_name: &str, path: &Path) -> AnalyticsResult<Self> {
        if path.is_dir() {
            return Err(AnalyticsError::missing(
                source_name,
                path,
                "expected a file, found a directory",
            ));
        }
        let contents = std::fs::read(path)
            .map_err(|err| AnalyticsError::missing(source_name, path, err.to_string()))?;
        let newlines = contents
            .iter()
            .enumerate()
            .filter(|(_, b)| **b == b'\n')
            .map(|(idx, _)| idx as u64)
            .collect();
        Ok(Self { contents, newlines })
    }

    fn reader(&self) -> csv::Reader<&[u8]> {
        csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(self.contents.as_slice())
    }

    /// 1-based physical line of the record whose read started at `pos`.
    /// A record's position points at the end of the previous record, before
    /// any skipped blank lines.
    fn line_of(&self, pos: Option<&csv::Position>) -> u64 {
        let Some(pos) = pos else {
            return 0;
        };
        let mut byte = pos.byte() as usize;
        while matches!(self.contents.get(byte), Some(b'\n' | b'\r')) {
            byte += 1;
        }
        self.newlines.partition_point(|nl| *nl < byte as u64) as u64 + 1
    }
}

/// Maps each required column to its position in the header row. `None` means
/// the source is completely empty (no header either), which is a valid zero-row input.
fn resolve_columns<const N: usize>(
    source_name: &str,
    path: &Path,
    source: &SourceText,
    reader: &mut csv::Reader<&[u8]>,
    required: &[&str; N],
) -> AnalyticsResult<Option<[usize; N]>> {
    let headers = reader
        .headers()
        .map_err(|err| map_csv_error(source_name, path, source, err))?
        .clone();
    if headers.is_empty() || (headers.len() == 1 && headers[0].is_empty()) {
        return Ok(None);
    }

    let mut cols = [0usize; N];
    for (slot, name) in cols.iter_mut().zip(required.iter()) {
        *slot = headers
            .iter()
            .position(|header| header == *name)
            .ok_or_else(|| {
                AnalyticsError::schema(
                    source_name,
                    1,
                    name,
                    format!(
                        "is missing from the header row (found: {})",
                        headers.iter().collect::<Vec<_>>().join(",")
                    ),
                )
            })?;
    }
    Ok(Some(cols))
}

fn parse_event(record: &StringRecord, cols: &[usize; 4], line: u64) -> AnalyticsResult<Event> {
    let user_id = required_text(EVENTS_SOURCE, record, cols[0], "user_id", line)?;
    let song_id = required_text(EVENTS_SOURCE, record, cols[1], "song_id", line)?;

    let raw_ts = field(record, cols[2]);
    let timestamp = parse_timestamp(raw_ts).ok_or_else(|| {
        AnalyticsError::schema(
            EVENTS_SOURCE,
            line,
            "timestamp",
            format!("expected YYYY-MM-DD HH:MM:SS, got {raw_ts:?}"),
        )
    })?;

    let raw_duration = field(record, cols[3]);
    let duration_sec = parse_duration(raw_duration).ok_or_else(|| {
        AnalyticsError::schema(
            EVENTS_SOURCE,
            line,
            "duration_sec",
            format!("expected a non-negative integer, got {raw_duration:?}"),
        )
    })?;

    Ok(Event {
        user_id,
        song_id,
        timestamp,
        duration_sec,
    })
}

fn parse_item(record: &StringRecord, cols: &[usize; 5], line: u64) -> AnalyticsResult<Item> {
    Ok(Item {
        song_id: required_text(ITEMS_SOURCE, record, cols[0], "song_id", line)?,
        title: field(record, cols[1]).to_string(),
        artist: field(record, cols[2]).to_string(),
        genre: required_text(ITEMS_SOURCE, record, cols[3], "genre", line)?,
        mood: required_text(ITEMS_SOURCE, record, cols[4], "mood", line)?,
    })
}

fn parse_duration(raw: &str) -> Option<u32> {
    // u32::from_str accepts a leading '+'; the declared schema does not.
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse::<u32>().ok()
}

fn field(record: &StringRecord, idx: usize) -> &str {
    record.get(idx).unwrap_or("")
}

fn required_text(
    source_name: &str,
    record: &StringRecord,
    idx: usize,
    name: &str,
    line: u64,
) -> AnalyticsResult<String> {
    let value = field(record, idx);
    if value.is_empty() {
        return Err(AnalyticsError::schema(source_name, line, name, "must not be empty"));
    }
    Ok(value.to_string())
}

fn map_csv_error(source_name: &str, path: &Path, source: &SourceText, err: csv::Error) -> AnalyticsError {
    let line = source.line_of(err.position());
    match err.kind() {
        csv::ErrorKind::Io(io) => AnalyticsError::missing(source_name, path, io.to_string()),
        csv::ErrorKind::UnequalLengths {
            expected_len, len, ..
        } => AnalyticsError::schema(
            source_name,
            line,
            "<row>",
            format!("has {len} fields, header declares {expected_len}"),
        ),
        csv::ErrorKind::Utf8 { err, .. } => AnalyticsError::schema(
            source_name,
            line,
            "<row>",
            format!("is not valid UTF-8 ({err})"),
        ),
        _ => AnalyticsError::schema(source_name, line, "<row>", err.to_string()),
    }
}
