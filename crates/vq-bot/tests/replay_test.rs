//! End-to-end replay through the supervisor and the paper exchange.

use rust_decimal_macros::dec;
use vq_bot::{parse_line, AppConfig, Application, ReplayRecord};
use vq_core::{PositionSide, Size, Symbol};

const SYM: &str = "BTC/USDT:USDT";

const CONFIG: &str = r#"
tick_interval_ms = 50
position_refresh_ms = 1000

[global.execution]
base_slice_qty = "0.05"
retry_backoff_ms = 0

[paper.instruments."BTC/USDT:USDT"]
step_size = "0.001"
min_qty = "0.001"
tick_size = "0.1"
"#;

/// Two maker slices: the first rests and fills on the next quote, the
/// second fills on a trade through its price.
const FEED: &str = r#"
# position appears
{"type":"position","symbol":"BTC/USDT:USDT","side":"LONG","quantity":"0.1","time_ms":1000}
{"type":"trade","symbol":"BTC/USDT:USDT","price":"100","time_ms":1001}
{"type":"trade","symbol":"BTC/USDT:USDT","price":"100.5","time_ms":1002}
{"type":"book_ticker","symbol":"BTC/USDT:USDT","bid":"100.5","ask":"100.6","time_ms":1003}
{"type":"book_ticker","symbol":"BTC/USDT:USDT","bid":"100.6","ask":"100.7","time_ms":1004}
{"type":"trade","symbol":"BTC/USDT:USDT","price":"100.6","time_ms":1300}
{"type":"trade","symbol":"BTC/USDT:USDT","price":"100.8","time_ms":1301}
{"type":"book_ticker","symbol":"BTC/USDT:USDT","bid":"100.8","ask":"100.9","time_ms":1302}
"#;

fn records() -> Vec<ReplayRecord> {
    FEED.lines()
        .enumerate()
        .filter_map(|(i, line)| parse_line(line, i + 1).unwrap())
        .collect()
}

/// Let controller workers drain their queues.
async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_replay_exits_position_in_slices() {
    let config = AppConfig::from_toml_str(CONFIG).unwrap();
    let mut app = Application::new(config).await.unwrap();
    let sym = Symbol::from(SYM);

    for record in records() {
        app.apply_record(record).await.unwrap();
        settle().await;
    }
    app.on_tick().await;
    settle().await;
    app.on_tick().await;

    assert_eq!(app.paper().position(&sym, PositionSide::Long), Size::ZERO);
    assert!(app.supervisor().is_empty());

    let stop = app.shutdown().await;
    assert!(stop.is_clean());
    let summary = app.summary(stop);
    assert_eq!(summary.fills, 2);
    assert_eq!(summary.records, 8);
}

#[tokio::test]
async fn test_partial_exit_leaves_controller_running() {
    let config = AppConfig::from_toml_str(CONFIG).unwrap();
    let mut app = Application::new(config).await.unwrap();
    let sym = Symbol::from(SYM);

    // stop after the first slice fills
    for record in records().into_iter().take(5) {
        app.apply_record(record).await.unwrap();
        settle().await;
    }

    assert_eq!(
        app.paper().position(&sym, PositionSide::Long),
        Size::new(dec!(0.05))
    );
    let status = app
        .supervisor()
        .status(&vq_core::ControllerKey::new(sym, PositionSide::Long))
        .unwrap();
    assert_eq!(status.remaining, Size::new(dec!(0.05)));
    assert!(status.active_order_id.is_none());

    let stop = app.shutdown().await;
    assert!(stop.is_clean());
}

#[tokio::test]
async fn test_unknown_instrument_position_is_skipped() {
    let config = AppConfig::from_toml_str(CONFIG).unwrap();
    let mut app = Application::new(config).await.unwrap();
    let record = parse_line(
        r#"{"type":"position","symbol":"DOGE/USDT:USDT","side":"SHORT","quantity":"100","time_ms":1}"#,
        1,
    )
    .unwrap()
    .unwrap();
    app.apply_record(record).await.unwrap();
    assert!(app.supervisor().is_empty());
}

#[tokio::test]
async fn test_run_replays_file_and_drains() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("vq.toml");
    let feed_path = dir.path().join("feed.jsonl");
    std::fs::write(&config_path, CONFIG).unwrap();
    std::fs::write(&feed_path, FEED).unwrap();

    let config = AppConfig::from_file(&config_path).unwrap();
    let app = Application::new(config).await.unwrap();
    let summary = app.run(&feed_path).await.unwrap();

    assert_eq!(summary.records, 8);
    assert!(summary.stop.is_clean());
}
