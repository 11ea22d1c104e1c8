// Output records and sinks
//
// One record per resolved fact-of-interest. Sinks append and flush per
// record so partial progress survives a worker crash; resumability itself
// is the caller's concern.
use crate::contexts::Period;
use crate::Result;
use compact_str::CompactString;
use serde::Serialize;
use std::io::Write;

/// Decoded fact value: an integer for numeric facts, verbatim stripped text
/// for textual ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Number(i64),
    Text(CompactString),
}

/// The engine's output unit, ordered as the downstream CSV expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountRecord {
    pub registered_number: CompactString,
    /// Account tag local name, namespace prefix stripped.
    pub account_name: CompactString,
    pub segment: Option<CompactString>,
    pub value: Option<Value>,
    pub unit: Option<CompactString>,
    pub start_date: Option<CompactString>,
    pub end_date: Option<CompactString>,
    pub instant: Option<CompactString>,
    pub forever: bool,
}

impl AccountRecord {
    /// Spread a resolved period over the record's four period fields.
    pub fn set_period(&mut self, period: &Period) {
        match period {
            Period::Duration { start, end } => {
                self.start_date = Some(start.clone());
                self.end_date = Some(end.clone());
            }
            Period::Instant { date } => self.instant = Some(date.clone()),
            Period::Forever => self.forever = true,
            Period::Unknown => {}
        }
    }
}

pub trait RecordSink {
    fn emit(&mut self, record: &AccountRecord) -> Result<()>;
}

const CSV_HEADER: [&str; 9] = [
    "registered_number",
    "account_name",
    "segment",
    "number",
    "unit",
    "startDate",
    "endDate",
    "instant",
    "forever",
];

/// CSV rows, header written up front, flushed after every record.
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> CsvSink<W> {
    pub fn new(writer: W) -> Result<Self> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(CSV_HEADER)?;
        writer.flush()?;
        Ok(CsvSink { writer })
    }
}

impl<W: Write> RecordSink for CsvSink<W> {
    fn emit(&mut self, record: &AccountRecord) -> Result<()> {
        let value = match &record.value {
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Text(t)) => t.to_string(),
            None => String::new(),
        };
        self.writer.write_record([
            record.registered_number.as_str(),
            record.account_name.as_str(),
            record.segment.as_deref().unwrap_or(""),
            value.as_str(),
            record.unit.as_deref().unwrap_or(""),
            record.start_date.as_deref().unwrap_or(""),
            record.end_date.as_deref().unwrap_or(""),
            record.instant.as_deref().unwrap_or(""),
            if record.forever { "true" } else { "" },
        ])?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Line-delimited JSON, one object per record, flushed after every record.
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        JsonLinesSink { writer }
    }
}

impl<W: Write> RecordSink for JsonLinesSink<W> {
    fn emit(&mut self, record: &AccountRecord) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Collects records in memory, for tests.
#[derive(Debug, Default)]
pub struct MemoryRecordSink {
    pub records: Vec<AccountRecord>,
}

impl MemoryRecordSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordSink for MemoryRecordSink {
    fn emit(&mut self, record: &AccountRecord) -> Result<()> {
        self.records.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> AccountRecord {
        let mut record = AccountRecord {
            registered_number: "01234567".into(),
            account_name: "DividendsPaid".into(),
            segment: Some("Director A".into()),
            value: Some(Value::Number(5000)),
            unit: Some("GBP".into()),
            start_date: None,
            end_date: None,
            instant: None,
            forever: false,
        };
        record.set_period(&Period::Duration {
            start: "2017-01-01".into(),
            end: "2017-12-31".into(),
        });
        record
    }

    #[test]
    fn csv_rows_follow_header_order() {
        let mut buf = Vec::new();
        {
            let mut sink = CsvSink::new(&mut buf).unwrap();
            sink.emit(&sample()).unwrap();
        }
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "registered_number,account_name,segment,number,unit,startDate,endDate,instant,forever"
        );
        assert_eq!(
            lines.next().unwrap(),
            "01234567,DividendsPaid,Director A,5000,GBP,2017-01-01,2017-12-31,,"
        );
    }

    #[test]
    fn json_lines_serialise_value_untagged() {
        let mut buf = Vec::new();
        {
            let mut sink = JsonLinesSink::new(&mut buf);
            sink.emit(&sample()).unwrap();
            let mut textual = sample();
            textual.value = Some(Value::Text("n/a".into()));
            textual.forever = true;
            sink.emit(&textual).unwrap();
        }
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        let first: serde_json::Value = serde_json::from_str(lines.next().unwrap()).unwrap();
        assert_eq!(first["value"], 5000);
        assert_eq!(first["unit"], "GBP");
        assert_eq!(first["start_date"], "2017-01-01");
        let second: serde_json::Value = serde_json::from_str(lines.next().unwrap()).unwrap();
        assert_eq!(second["value"], "n/a");
        assert_eq!(second["forever"], true);
    }

    #[test]
    fn period_spread_covers_all_variants() {
        let mut record = sample();
        record.start_date = None;
        record.end_date = None;
        record.set_period(&Period::Instant {
            date: "2017-12-31".into(),
        });
        assert_eq!(record.instant.as_deref(), Some("2017-12-31"));

        record.set_period(&Period::Forever);
        assert!(record.forever);
    }
}
