//! MBO file reader
//!
//! Loads order events from CSV (`timestamp,type,order_id,symbol,side,price,size`)
//! or NDJSON (one `FeedEvent` per line). Malformed records are skipped and
//! counted; a load only fails when the file cannot be read.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use types::event::{FeedEvent, OrderEvent};
use types::ids::{OrderId, Symbol};
use types::order::{EventKind, Side};

pub const EXPECTED_HEADER: [&str; 7] = ["timestamp", "type", "order_id", "symbol", "side", "price", "size"];

/// Default file-level rejection threshold.
pub const DEFAULT_MAX_ERROR_RATE: f64 = 0.10;

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("no messages loaded")]
    Empty,

    #[error("error rate too high: {errors} errors for {messages} messages (limit {max_rate})")]
    ErrorRate { errors: u64, messages: u64, max_rate: f64 },
}

/// Why a single record was skipped.
#[derive(Debug, Error, PartialEq)]
enum RecordError {
    #[error("expected 7 fields, found {0}")]
    FieldCount(usize),
    #[error("bad {field}: {value:?}")]
    Field { field: &'static str, value: String },
    #[error("NEW needs positive price and size")]
    NonPositiveNew,
}

/// Summary of one load.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadStats {
    pub total_messages: u64,
    pub errors: u64,
    pub message_types: BTreeMap<String, u64>,
    pub symbols: BTreeSet<Symbol>,
    pub time_range: Option<(i64, i64)>,
}

impl LoadStats {
    fn record(&mut self, event: &FeedEvent) {
        self.total_messages += 1;
        self.symbols.insert(event.symbol().clone());
        if let FeedEvent::Order(e) = event {
            *self.message_types.entry(e.kind.to_string()).or_insert(0) += 1;
            self.time_range = Some(match self.time_range {
                Some((lo, hi)) => (lo.min(e.timestamp), hi.max(e.timestamp)),
                None => (e.timestamp, e.timestamp),
            });
        } else {
            *self.message_types.entry("LEVEL".to_string()).or_insert(0) += 1;
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.total_messages == 0 {
            return if self.errors > 0 { 1.0 } else { 0.0 };
        }
        self.errors as f64 / self.total_messages as f64
    }

    /// Reject empty loads and loads whose errors exceed
    /// `messages * max_error_rate`.
    pub fn validate(&self, max_error_rate: f64) -> Result<(), ReaderError> {
        if self.total_messages == 0 {
            return Err(ReaderError::Empty);
        }
        if self.errors as f64 > self.total_messages as f64 * max_error_rate {
            return Err(ReaderError::ErrorRate {
                errors: self.errors,
                messages: self.total_messages,
                max_rate: max_error_rate,
            });
        }
        Ok(())
    }
}

/// Loaded events plus statistics.
#[derive(Debug, Clone, Default)]
pub struct Loaded {
    pub events: Vec<FeedEvent>,
    pub stats: LoadStats,
}

/// Load a file, choosing NDJSON for `.ndjson`/`.jsonl` and CSV otherwise.
pub fn load(path: &Path) -> Result<Loaded, ReaderError> {
    let file = File::open(path).map_err(|source| ReaderError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), "Loading MBO file");

    let is_ndjson = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("ndjson") | Some("jsonl")
    );
    let loaded = if is_ndjson {
        read_ndjson(BufReader::new(file))?
    } else {
        read_csv(file)?
    };

    info!(
        path = %path.display(),
        messages = loaded.stats.total_messages,
        errors = loaded.stats.errors,
        symbols = loaded.stats.symbols.len(),
        "Loaded MBO file"
    );
    Ok(loaded)
}

/// Parse CSV records. The header row is checked but a mismatch only warns.
pub fn read_csv<R: Read>(input: R) -> Result<Loaded, ReaderError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_reader(input);

    let mut loaded = Loaded::default();
    let mut first = true;

    for record in reader.records() {
        let record = match record {
            Ok(r) => r,
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable record");
                loaded.stats.errors += 1;
                continue;
            }
        };
        let line = record.position().map(|p| p.line()).unwrap_or_default();

        if std::mem::take(&mut first) {
            let looks_like_header = record
                .get(0)
                .is_some_and(|f| f.parse::<i64>().is_err());
            if looks_like_header {
                let actual: Vec<String> = record.iter().map(|f| f.to_ascii_lowercase()).collect();
                if actual != EXPECTED_HEADER {
                    warn!(?actual, expected = ?EXPECTED_HEADER, "Unexpected header format");
                }
                continue;
            }
            warn!("No header row, treating first line as data");
        }

        match parse_record(&record) {
            Ok(event) => {
                let event = FeedEvent::Order(event);
                loaded.stats.record(&event);
                loaded.events.push(event);
            }
            Err(e) => {
                debug!(line, error = %e, "Skipping malformed record");
                loaded.stats.errors += 1;
            }
        }
    }

    Ok(loaded)
}

fn parse_record(record: &csv::StringRecord) -> Result<OrderEvent, RecordError> {
    if record.len() != 7 {
        return Err(RecordError::FieldCount(record.len()));
    }
    let field = |i: usize| record.get(i).unwrap_or_default();
    let bad = |field: &'static str, value: &str| RecordError::Field {
        field,
        value: value.to_string(),
    };

    let timestamp = field(0)
        .parse::<i64>()
        .map_err(|_| bad("timestamp", field(0)))?;
    let kind = field(1)
        .parse::<EventKind>()
        .map_err(|_| bad("type", field(1)))?;
    let order_id = OrderId::try_new(field(2)).map_err(|_| bad("order_id", field(2)))?;
    let symbol = Symbol::try_new(field(3)).map_err(|_| bad("symbol", field(3)))?;
    let side = field(4).parse::<Side>().map_err(|_| bad("side", field(4)))?;
    let price = match field(5) {
        "" => Decimal::ZERO,
        raw => raw.parse::<Decimal>().map_err(|_| bad("price", raw))?,
    };
    let size = match field(6) {
        "" => 0,
        raw => raw.parse::<i64>().map_err(|_| bad("size", raw))?,
    };

    if kind == EventKind::New && (price <= Decimal::ZERO || size <= 0) {
        return Err(RecordError::NonPositiveNew);
    }

    Ok(OrderEvent {
        timestamp,
        kind,
        order_id,
        symbol,
        side,
        price,
        size,
    })
}

/// Parse one JSON `FeedEvent` per line. Blank and `#` lines are skipped.
pub fn read_ndjson<R: BufRead>(input: R) -> Result<Loaded, ReaderError> {
    let mut loaded = Loaded::default();

    for (index, line) in input.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match serde_json::from_str::<FeedEvent>(trimmed) {
            Ok(event) => {
                loaded.stats.record(&event);
                loaded.events.push(event);
            }
            Err(e) => {
                debug!(line = index + 1, error = %e, "Skipping malformed JSON line");
                loaded.stats.errors += 1;
            }
        }
    }

    Ok(loaded)
}

/// Write order events in the CSV layout `read_csv` accepts.
pub fn write_csv<W: std::io::Write>(output: W, events: &[OrderEvent]) -> Result<(), ReaderError> {
    let mut writer = csv::Writer::from_writer(output);
    writer.write_record(EXPECTED_HEADER)?;
    for e in events {
        writer.write_record([
            e.timestamp.to_string(),
            e.kind.to_string(),
            e.order_id.to_string(),
            e.symbol.to_string(),
            e.side.to_string(),
            e.price.to_string(),
            e.size.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = "\
timestamp,type,order_id,symbol,side,price,size
# comment line
1000,NEW,A1,aapl,buy,180.25,100

1001,new,A2,AAPL,S,180.50,50
1002,CANCEL,A1,AAPL,bid,,
1003,EXECUTE,A2,AAPL,ask,180.50,20
1004,NEW,A3,AAPL,bid,0,10
1005,TRADE,A4,AAPL,bid,1,1
1006,NEW,A5,AAPL,mid,1,1
1007,NEW,A6,AAPL,bid,1
";

    #[test]
    fn test_parses_and_counts() {
        let loaded = read_csv(SAMPLE.as_bytes()).unwrap();
        let stats = &loaded.stats;

        assert_eq!(stats.total_messages, 4);
        assert_eq!(stats.errors, 4);
        assert_eq!(stats.message_types["NEW"], 2);
        assert_eq!(stats.message_types["CANCEL"], 1);
        assert_eq!(stats.time_range, Some((1000, 1003)));
        assert!(stats.symbols.contains("AAPL"));

        match &loaded.events[0] {
            FeedEvent::Order(e) => {
                assert_eq!(e.symbol.as_str(), "AAPL");
                assert_eq!(e.side, Side::Bid);
                assert_eq!(e.price, Decimal::new(18025, 2));
            }
            other => panic!("unexpected {:?}", other),
        }
        match &loaded.events[2] {
            FeedEvent::Order(e) => {
                assert_eq!(e.kind, EventKind::Cancel);
                assert_eq!(e.price, Decimal::ZERO);
                assert_eq!(e.size, 0);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_validate_error_rate() {
        let loaded = read_csv(SAMPLE.as_bytes()).unwrap();
        assert!(matches!(
            loaded.stats.validate(DEFAULT_MAX_ERROR_RATE),
            Err(ReaderError::ErrorRate { .. })
        ));
        assert!(loaded.stats.validate(1.0).is_ok());
        assert!(matches!(LoadStats::default().validate(0.1), Err(ReaderError::Empty)));
    }

    #[test]
    fn test_missing_header_still_loads() {
        let loaded = read_csv("1,NEW,A,MSFT,bid,10,1\n".as_bytes()).unwrap();
        assert_eq!(loaded.stats.total_messages, 1);
    }

    #[test]
    fn test_ndjson_both_shapes() {
        let input = r#"{"timestamp":1,"type":"NEW","order_id":"X","symbol":"TSLA","side":"bid","price":250.0,"size":3}
{"symbol":"TSLA","side":"ask","price":251.0,"size":7}
not json
"#;
        let loaded = read_ndjson(input.as_bytes()).unwrap();
        assert_eq!(loaded.stats.total_messages, 2);
        assert_eq!(loaded.stats.errors, 1);
        assert!(matches!(loaded.events[1], FeedEvent::Level(_)));
    }

    #[test]
    fn test_ndjson_malformed_order_counted_not_applied() {
        let input = r#"{"timestamp":1,"type":"NEW","order_id":"A","symbol":"AAPL","side":"bid","price":100.0,"size":5}
{"timestamp":2,"type":"NEW","order_id":"B","symbol":"AAPL","side":"bid","price":100.0,"size":7}
{"type":"CANCEL","order_id":"A","symbol":"AAPL","side":"bid","price":100.0,"size":0}
"#;
        let loaded = read_ndjson(input.as_bytes()).unwrap();
        assert_eq!(loaded.stats.total_messages, 2);
        assert_eq!(loaded.stats.errors, 1);
        assert!(loaded.events.iter().all(|e| matches!(e, FeedEvent::Order(_))));

        let mut book = crate::order_book::SymbolBook::new(Symbol::new("AAPL"));
        for event in &loaded.events {
            book.apply(event).unwrap();
        }
        assert_eq!(book.order_count(), 2);
        assert!(book.order(&OrderId::new("B")).is_some());
    }

    #[test]
    fn test_ndjson_symbols_normalised() {
        let input = r#"{"timestamp":1,"type":"NEW","order_id":"A","symbol":"aapl","side":"bid","price":100.0,"size":5}
{"symbol":" msft","side":"ask","price":251.0,"size":7}
"#;
        let loaded = read_ndjson(input.as_bytes()).unwrap();
        let symbols: Vec<&str> = loaded.stats.symbols.iter().map(Symbol::as_str).collect();
        assert_eq!(symbols, vec!["AAPL", "MSFT"]);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let loaded = load(file.path()).unwrap();
        assert_eq!(loaded.events.len(), 4);
    }

    #[test]
    fn test_missing_file() {
        let err = load(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(matches!(err, ReaderError::Open { .. }));
    }

    #[test]
    fn test_write_then_read_csv() {
        let events = vec![OrderEvent::new(
            5,
            EventKind::Modify,
            "ORD0000000001",
            "GOOGL",
            Side::Ask,
            Decimal::new(14210, 2),
            12,
        )];
        let mut buf = Vec::new();
        write_csv(&mut buf, &events).unwrap();
        let loaded = read_csv(buf.as_slice()).unwrap();
        assert_eq!(loaded.events, vec![FeedEvent::Order(events[0].clone())]);
    }
}
