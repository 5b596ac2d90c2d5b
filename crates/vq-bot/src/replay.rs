//! JSONL feed replay.
//!
//! One record per line, tagged by `type`:
//!
//! ```text
//! {"type":"trade","symbol":"BTC/USDT:USDT","price":"100.5","time_ms":1000}
//! {"type":"book_ticker","symbol":"BTC/USDT:USDT","bid":"100.5","ask":"100.6","time_ms":1001}
//! {"type":"position","symbol":"BTC/USDT:USDT","side":"LONG","quantity":"0.5","time_ms":1002}
//! {"type":"order","symbol":"BTC/USDT:USDT","position_side":"LONG","order_id":"1","kind":"closed","status":"CANCELED","time_ms":1003}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

use std::path::Path;

use serde::Deserialize;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use vq_core::{BookTicker, MarketEvent, OrderEvent, Trade};
use vq_executor::PositionReport;

use crate::error::{AppError, AppResult};

/// One replayed line.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplayRecord {
    Trade(Trade),
    BookTicker(BookTicker),
    Position {
        #[serde(flatten)]
        report: PositionReport,
        #[serde(default)]
        time_ms: Option<u64>,
    },
    Order(OrderEvent),
}

impl ReplayRecord {
    pub fn time_ms(&self) -> Option<u64> {
        match self {
            Self::Trade(t) => Some(t.time_ms),
            Self::BookTicker(b) => Some(b.time_ms),
            Self::Position { time_ms, .. } => *time_ms,
            Self::Order(o) => Some(o.time_ms),
        }
    }

    /// The feed event carried by market lines.
    pub fn market_event(&self) -> Option<MarketEvent> {
        match self {
            Self::Trade(t) => Some(MarketEvent::Trade(t.clone())),
            Self::BookTicker(b) => Some(MarketEvent::BookTicker(b.clone())),
            _ => None,
        }
    }
}

/// Parse one line; `None` for blanks and comments.
pub fn parse_line(line: &str, line_no: usize) -> AppResult<Option<ReplayRecord>> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|e| AppError::Replay {
            line: line_no,
            message: e.to_string(),
        })
}

/// Streaming reader over a replay file.
pub struct ReplayReader {
    lines: Lines<BufReader<File>>,
    line_no: usize,
}

impl ReplayReader {
    pub async fn open(path: impl AsRef<Path>) -> AppResult<Self> {
        let file = File::open(path.as_ref()).await?;
        Ok(Self {
            lines: BufReader::new(file).lines(),
            line_no: 0,
        })
    }

    /// Next record, `None` at end of file.
    pub async fn next_record(&mut self) -> AppResult<Option<ReplayRecord>> {
        while let Some(line) = self.lines.next_line().await? {
            self.line_no += 1;
            if let Some(record) = parse_line(&line, self.line_no)? {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Lines consumed so far.
    pub fn line_no(&self) -> usize {
        self.line_no
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use vq_core::{OrderEventKind, OrderStatus, PositionSide, Size};

    #[test]
    fn test_parse_market_lines() {
        let trade = parse_line(
            r#"{"type":"trade","symbol":"BTC/USDT:USDT","price":"100.5","time_ms":1000}"#,
            1,
        )
        .unwrap()
        .unwrap();
        assert_eq!(trade.time_ms(), Some(1_000));
        assert!(matches!(trade.market_event(), Some(MarketEvent::Trade(_))));

        let book = parse_line(
            r#"{"type":"book_ticker","symbol":"BTC/USDT:USDT","bid":"100.5","ask":"100.6","time_ms":1001}"#,
            2,
        )
        .unwrap()
        .unwrap();
        assert!(matches!(book.market_event(), Some(MarketEvent::BookTicker(b)) if b.ask.inner() == dec!(100.6)));
    }

    #[test]
    fn test_parse_position_line() {
        let record = parse_line(
            r#"{"type":"position","symbol":"BTC/USDT:USDT","side":"SHORT","quantity":"0.25","liquidation_price":"120"}"#,
            1,
        )
        .unwrap()
        .unwrap();
        let ReplayRecord::Position { report, time_ms } = record else {
            panic!("expected position");
        };
        assert_eq!(report.side, PositionSide::Short);
        assert_eq!(report.quantity, Size::new(dec!(0.25)));
        assert!(report.liquidation_price.is_some());
        assert!(report.entry_price.is_none());
        assert_eq!(time_ms, None);
    }

    #[test]
    fn test_parse_order_line() {
        let record = parse_line(
            r#"{"type":"order","symbol":"BTC/USDT:USDT","position_side":"LONG","order_id":"7","kind":"closed","status":"CANCELED","time_ms":5}"#,
            1,
        )
        .unwrap()
        .unwrap();
        let ReplayRecord::Order(event) = record else {
            panic!("expected order");
        };
        assert_eq!(event.order_id, "7");
        assert_eq!(
            event.kind,
            OrderEventKind::Closed {
                status: OrderStatus::Canceled
            }
        );
    }

    #[test]
    fn test_skips_blanks_and_comments() {
        assert!(parse_line("", 1).unwrap().is_none());
        assert!(parse_line("   ", 2).unwrap().is_none());
        assert!(parse_line("# header", 3).unwrap().is_none());
    }

    #[test]
    fn test_bad_line_reports_number() {
        let err = parse_line(r#"{"type":"nope"}"#, 42).unwrap_err();
        assert!(matches!(err, AppError::Replay { line: 42, .. }));
    }

    #[tokio::test]
    async fn test_reader_streams_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.jsonl");
        std::fs::write(
            &path,
            "# sample\n{\"type\":\"trade\",\"symbol\":\"X\",\"price\":\"1\",\"time_ms\":1}\n\n{\"type\":\"trade\",\"symbol\":\"X\",\"price\":\"2\",\"time_ms\":2}\n",
        )
        .unwrap();

        let mut reader = ReplayReader::open(&path).await.unwrap();
        assert_eq!(reader.next_record().await.unwrap().unwrap().time_ms(), Some(1));
        assert_eq!(reader.next_record().await.unwrap().unwrap().time_ms(), Some(2));
        assert!(reader.next_record().await.unwrap().is_none());
        assert_eq!(reader.line_no(), 4);
    }
}
