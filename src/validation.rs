//! Quote validation
//!
//! Turns a loosely-typed [`QuoteRecord`] into a normalized [`Quote`] or
//! rejects it with a `Validation` error naming the field and the violated
//! constraint. Validation is all-or-nothing per record and performs no
//! cross-field checks (e.g. `low <= high` is not enforced).

use crate::error::{Result, StorageError};
use crate::quote::{
    normalize_symbol, Prices, Quote, QuoteRecord, MAX_SOURCE_LEN, MAX_SYMBOL_LEN, PRICE_SCALE,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::{Number, Value};
use std::str::FromStr;

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const OFFSET_DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"];

/// Epoch numbers with a larger magnitude are milliseconds, not seconds
const MAX_EPOCH_SECONDS: i64 = 20_000_000_000;

/// Validate a single record
pub fn validate_quote(record: &QuoteRecord) -> Result<Quote> {
    let symbol = parse_symbol(record.get("symbol"))?;
    let timestamp = parse_timestamp(record.get("timestamp"))?;

    let prices = Prices {
        open: parse_price("open", record.get("open"))?,
        high: parse_price("high", record.get("high"))?,
        low: parse_price("low", record.get("low"))?,
        close: parse_price("close", record.get("close"))?,
        bid: parse_price("bid", record.get("bid"))?,
        ask: parse_price("ask", record.get("ask"))?,
    };

    let volume = parse_volume(record.get("volume"))?;
    let source = parse_source(record.get("source"))?;

    Ok(Quote::from_parts(symbol, timestamp, prices, volume, source))
}

/// Validate every record before anything is written.
///
/// The first failure aborts the whole batch; the error carries the index of
/// the offending record.
pub fn validate_quotes(records: &[QuoteRecord]) -> Result<Vec<Quote>> {
    records
        .iter()
        .enumerate()
        .map(|(i, record)| validate_quote(record).map_err(|e| e.at_index(i)))
        .collect()
}

fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

fn parse_symbol(value: Option<&Value>) -> Result<String> {
    let raw = match present(value) {
        Some(Value::String(s)) => s,
        Some(_) => return Err(StorageError::validation("symbol", "must be a string")),
        None => return Err(StorageError::validation("symbol", "field required")),
    };

    let len = raw.trim().chars().count();

    if len == 0 {
        return Err(StorageError::validation(
            "symbol",
            "must have at least 1 character",
        ));
    }
    if len > MAX_SYMBOL_LEN {
        return Err(StorageError::validation(
            "symbol",
            format!("must have at most {} characters, got {}", MAX_SYMBOL_LEN, len),
        ));
    }

    Ok(normalize_symbol(raw))
}

fn parse_timestamp(value: Option<&Value>) -> Result<DateTime<Utc>> {
    match present(value) {
        Some(Value::String(s)) => parse_timestamp_str(s.trim()).ok_or_else(|| {
            StorageError::validation("timestamp", format!("'{}' is not a valid datetime", s))
        }),
        Some(Value::Number(n)) => parse_epoch(n).ok_or_else(|| {
            StorageError::validation("timestamp", format!("{} is out of range", n))
        }),
        Some(_) => Err(StorageError::validation(
            "timestamp",
            "must be a datetime string or a unix epoch number",
        )),
        None => Err(StorageError::validation("timestamp", "field required")),
    }
}

fn parse_epoch(n: &Number) -> Option<DateTime<Utc>> {
    if let Some(v) = n.as_i64() {
        return if v.unsigned_abs() > MAX_EPOCH_SECONDS.unsigned_abs() {
            DateTime::from_timestamp_millis(v)
        } else {
            Utc.timestamp_opt(v, 0).single()
        };
    }

    let f = n.as_f64().filter(|f| f.is_finite())?;
    let micros = if f.abs() > MAX_EPOCH_SECONDS as f64 {
        f * 1_000.0
    } else {
        f * 1_000_000.0
    };
    DateTime::from_timestamp_micros(micros.round() as i64)
}

/// Parse a point in time; values without an offset are taken as UTC
pub fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in OFFSET_DATETIME_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn parse_price(field: &str, value: Option<&Value>) -> Result<Option<Decimal>> {
    let text = match present(value) {
        None => return Ok(None),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(_) => return Err(StorageError::validation(field, "must be a decimal number")),
    };

    // Go through the decimal text so binary floating point never touches the value
    let price = Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| {
            StorageError::validation(field, format!("'{}' is not a valid decimal", text))
        })?;

    if price.is_sign_negative() && !price.is_zero() {
        return Err(StorageError::validation(
            field,
            format!("must be greater than or equal to 0, got {}", price),
        ));
    }

    Ok(Some(
        price.round_dp_with_strategy(PRICE_SCALE, RoundingStrategy::MidpointAwayFromZero),
    ))
}

fn parse_volume(value: Option<&Value>) -> Result<Option<i64>> {
    let volume = match present(value) {
        None => return Ok(None),
        Some(Value::Number(n)) => {
            if let Some(v) = n.as_i64() {
                v
            } else if n.is_u64() {
                return Err(StorageError::validation("volume", "is out of range"));
            } else {
                match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => f as i64,
                    _ => {
                        return Err(StorageError::validation(
                            "volume",
                            format!("must be an integer, got {}", n),
                        ))
                    }
                }
            }
        }
        Some(Value::String(s)) => s.trim().parse::<i64>().map_err(|_| {
            StorageError::validation("volume", format!("'{}' is not a valid integer", s))
        })?,
        Some(_) => return Err(StorageError::validation("volume", "must be an integer")),
    };

    if volume < 0 {
        return Err(StorageError::validation(
            "volume",
            format!("must be greater than or equal to 0, got {}", volume),
        ));
    }

    Ok(Some(volume))
}

fn parse_source(value: Option<&Value>) -> Result<Option<String>> {
    match present(value) {
        None => Ok(None),
        Some(Value::String(s)) => {
            let source = s.trim();
            let len = source.chars().count();
            if len > MAX_SOURCE_LEN {
                return Err(StorageError::validation(
                    "source",
                    format!("must have at most {} characters, got {}", MAX_SOURCE_LEN, len),
                ));
            }
            Ok(Some(source.to_string()))
        }
        Some(_) => Err(StorageError::validation("source", "must be a string")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> QuoteRecord {
        value.as_object().cloned().unwrap()
    }

    fn field_of(err: StorageError) -> String {
        match err {
            StorageError::Validation { field, .. } => field,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_quote_is_normalized() {
        let quote = validate_quote(&record(json!({
            "symbol": " aapl ",
            "timestamp": "2025-12-22T10:00:00Z",
            "close": 180.50,
        })))
        .unwrap();

        assert_eq!(quote.symbol(), "AAPL");
        assert_eq!(
            quote.timestamp(),
            Utc.with_ymd_and_hms(2025, 12, 22, 10, 0, 0).unwrap()
        );
        assert_eq!(quote.close(), Some(Decimal::from_str("180.50").unwrap()));
        assert_eq!(quote.open(), None);
        assert_eq!(quote.volume(), None);
    }

    #[test]
    fn test_all_fields() {
        let quote = validate_quote(&record(json!({
            "symbol": "MSFT",
            "timestamp": "2025-12-22T10:00:00+00:00",
            "open": 420.10,
            "high": "422.50",
            "low": 419,
            "close": 421.75,
            "volume": 1234567,
            "bid": 421.70,
            "ask": 421.80,
            "source": "yfinance",
        })))
        .unwrap();

        assert_eq!(quote.open(), Some(Decimal::from_str("420.10").unwrap()));
        assert_eq!(quote.high(), Some(Decimal::from_str("422.5").unwrap()));
        assert_eq!(quote.low(), Some(Decimal::from(419)));
        assert_eq!(quote.bid(), Some(Decimal::from_str("421.70").unwrap()));
        assert_eq!(quote.ask(), Some(Decimal::from_str("421.80").unwrap()));
        assert_eq!(quote.volume(), Some(1_234_567));
        assert_eq!(quote.source(), Some("yfinance"));
    }

    #[test]
    fn test_symbol_empty_rejected() {
        let err = validate_quote(&record(json!({"symbol": "   ", "timestamp": "2025-12-22"})))
            .unwrap_err();
        assert_eq!(field_of(err), "symbol");
    }

    #[test]
    fn test_symbol_too_long_rejected() {
        let err = validate_quote(&record(json!({
            "symbol": "VERYLONGSYMBOL",
            "timestamp": "2025-12-22T10:00:00Z",
        })))
        .unwrap_err();
        assert!(err.to_string().contains("at most 10"));
        assert_eq!(field_of(err), "symbol");
    }

    #[test]
    fn test_symbol_length_counted_after_trim() {
        let quote = validate_quote(&record(json!({
            "symbol": "  ABCDEFGHIJ  ",
            "timestamp": "2025-12-22T10:00:00Z",
        })))
        .unwrap();
        assert_eq!(quote.symbol(), "ABCDEFGHIJ");
    }

    #[test]
    fn test_symbol_length_counted_before_uppercasing() {
        // Six characters in, twelve once uppercased
        let quote = validate_quote(&record(json!({
            "symbol": "ßßßßßß",
            "timestamp": "2025-12-22T10:00:00Z",
        })))
        .unwrap();
        assert_eq!(quote.symbol(), "SSSSSSSSSSSS");
    }

    #[test]
    fn test_missing_required_fields() {
        let err = validate_quote(&record(json!({"timestamp": "2025-12-22T10:00:00Z"})))
            .unwrap_err();
        assert_eq!(field_of(err), "symbol");

        let err = validate_quote(&record(json!({"symbol": "AAPL", "timestamp": null})))
            .unwrap_err();
        assert_eq!(field_of(err), "timestamp");
    }

    #[test]
    fn test_naive_timestamp_is_utc_with_same_wall_clock() {
        let quote = validate_quote(&record(json!({
            "symbol": "AAPL",
            "timestamp": "2025-12-22T10:30:15.250",
        })))
        .unwrap();

        let naive = NaiveDateTime::parse_from_str("2025-12-22 10:30:15.250", "%Y-%m-%d %H:%M:%S%.f")
            .unwrap();
        assert_eq!(quote.timestamp().naive_utc(), naive);
    }

    #[test]
    fn test_offset_timestamp_converted_to_utc() {
        let quote = validate_quote(&record(json!({
            "symbol": "AAPL",
            "timestamp": "2025-12-22T10:00:00-05:00",
        })))
        .unwrap();
        assert_eq!(
            quote.timestamp(),
            Utc.with_ymd_and_hms(2025, 12, 22, 15, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_timestamp_variants() {
        let midnight = Utc.with_ymd_and_hms(2025, 12, 22, 0, 0, 0).unwrap();
        assert_eq!(parse_timestamp_str("2025-12-22"), Some(midnight));
        assert_eq!(parse_timestamp_str("2025-12-22 00:00:00"), Some(midnight));
        assert_eq!(parse_timestamp_str("2025-12-22 00:00"), Some(midnight));
        assert_eq!(parse_timestamp_str("2025-12-22 01:00:00+01:00"), Some(midnight));
        assert_eq!(parse_timestamp_str("yesterday"), None);

        let quote = validate_quote(&record(json!({"symbol": "AAPL", "timestamp": 1766361600})))
            .unwrap();
        assert_eq!(quote.timestamp(), midnight);
    }

    #[test]
    fn test_epoch_milliseconds_timestamp() {
        let midnight = Utc.with_ymd_and_hms(2025, 12, 22, 0, 0, 0).unwrap();

        let quote = validate_quote(&record(json!({"symbol": "AAPL", "timestamp": 1766361600000i64})))
            .unwrap();
        assert_eq!(quote.timestamp(), midnight);

        let quote = validate_quote(&record(json!({"symbol": "AAPL", "timestamp": 1766361600250.0})))
            .unwrap();
        assert_eq!(quote.timestamp(), midnight + chrono::Duration::milliseconds(250));

        let quote = validate_quote(&record(json!({"symbol": "AAPL", "timestamp": 1766361600.5})))
            .unwrap();
        assert_eq!(quote.timestamp(), midnight + chrono::Duration::milliseconds(500));

        // 2e10 itself is still seconds
        let quote = validate_quote(&record(json!({"symbol": "AAPL", "timestamp": 20_000_000_000i64})))
            .unwrap();
        assert_eq!(quote.timestamp().timestamp(), 20_000_000_000);
    }

    #[test]
    fn test_epoch_out_of_range_rejected() {
        let err = validate_quote(&record(json!({"symbol": "AAPL", "timestamp": i64::MAX})))
            .unwrap_err();
        assert!(err.to_string().contains("out of range"));
        assert_eq!(field_of(err), "timestamp");
    }

    #[test]
    fn test_unparseable_timestamp_rejected() {
        let err = validate_quote(&record(json!({"symbol": "AAPL", "timestamp": "not a date"})))
            .unwrap_err();
        assert_eq!(field_of(err), "timestamp");

        let err = validate_quote(&record(json!({"symbol": "AAPL", "timestamp": true})))
            .unwrap_err();
        assert_eq!(field_of(err), "timestamp");
    }

    #[test]
    fn test_negative_prices_rejected() {
        for field in ["open", "high", "low", "close", "bid", "ask"] {
            let mut raw = record(json!({"symbol": "AAPL", "timestamp": "2025-12-22T10:00:00Z"}));
            raw.insert(field.to_string(), json!(-10.50));
            let err = validate_quote(&raw).unwrap_err();
            assert!(err.to_string().contains("greater than or equal to 0"));
            assert_eq!(field_of(err), field);
        }
    }

    #[test]
    fn test_tiny_negative_price_rejected_before_rounding() {
        let err = validate_quote(&record(json!({
            "symbol": "AAPL",
            "timestamp": "2025-12-22T10:00:00Z",
            "close": "-0.001",
        })))
        .unwrap_err();
        assert_eq!(field_of(err), "close");
    }

    #[test]
    fn test_zero_price_accepted() {
        let quote = validate_quote(&record(json!({
            "symbol": "AAPL",
            "timestamp": "2025-12-22T10:00:00Z",
            "close": 0,
            "volume": 0,
        })))
        .unwrap();
        assert_eq!(quote.close(), Some(Decimal::ZERO));
        assert_eq!(quote.volume(), Some(0));
    }

    #[test]
    fn test_price_rounded_to_column_scale() {
        let quote = validate_quote(&record(json!({
            "symbol": "AAPL",
            "timestamp": "2025-12-22T10:00:00Z",
            "open": "1.005",
            "close": 0.1,
            "high": 1e-7,
        })))
        .unwrap();
        assert_eq!(quote.open(), Some(Decimal::from_str("1.01").unwrap()));
        assert_eq!(quote.close(), Some(Decimal::from_str("0.10").unwrap()));
        assert_eq!(quote.high(), Some(Decimal::ZERO));
    }

    #[test]
    fn test_invalid_price_text_rejected() {
        let err = validate_quote(&record(json!({
            "symbol": "AAPL",
            "timestamp": "2025-12-22T10:00:00Z",
            "bid": "abc",
        })))
        .unwrap_err();
        assert_eq!(field_of(err), "bid");
    }

    #[test]
    fn test_volume_rules() {
        let base = json!({"symbol": "AAPL", "timestamp": "2025-12-22T10:00:00Z"});

        let mut raw = record(base.clone());
        raw.insert("volume".to_string(), json!(-1));
        assert_eq!(field_of(validate_quote(&raw).unwrap_err()), "volume");

        let mut raw = record(base.clone());
        raw.insert("volume".to_string(), json!(10.5));
        assert_eq!(field_of(validate_quote(&raw).unwrap_err()), "volume");

        let mut raw = record(base.clone());
        raw.insert("volume".to_string(), json!(1000.0));
        assert_eq!(validate_quote(&raw).unwrap().volume(), Some(1000));

        let mut raw = record(base);
        raw.insert("volume".to_string(), json!("250"));
        assert_eq!(validate_quote(&raw).unwrap().volume(), Some(250));
    }

    #[test]
    fn test_source_length() {
        let mut raw = record(json!({"symbol": "AAPL", "timestamp": "2025-12-22T10:00:00Z"}));
        raw.insert("source".to_string(), json!("x".repeat(50)));
        assert!(validate_quote(&raw).is_ok());

        raw.insert("source".to_string(), json!("x".repeat(51)));
        assert_eq!(field_of(validate_quote(&raw).unwrap_err()), "source");
    }

    #[test]
    fn test_null_optional_fields_are_absent() {
        let quote = validate_quote(&record(json!({
            "symbol": "AAPL",
            "timestamp": "2025-12-22T10:00:00Z",
            "open": null,
            "volume": null,
            "source": null,
            "unknown": "ignored",
        })))
        .unwrap();
        assert_eq!(quote.open(), None);
        assert_eq!(quote.volume(), None);
        assert_eq!(quote.source(), None);
    }

    #[test]
    fn test_validate_quotes_reports_index() {
        let records = vec![
            record(json!({"symbol": "AAPL", "timestamp": "2025-12-22T10:00:00Z"})),
            record(json!({"symbol": "MSFT", "timestamp": "2025-12-22T10:00:00Z", "close": -1})),
        ];
        match validate_quotes(&records).unwrap_err() {
            StorageError::Validation { index, field, .. } => {
                assert_eq!(index, Some(1));
                assert_eq!(field, "close");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
