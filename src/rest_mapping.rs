// =============================================================================
// REST field-mapping engine (spec §4.2)
// =============================================================================
//
// Turns an opaque JSON response body plus a mapping descriptor into zero or
// more DataPoints (or, in calendar mode, NewsItems). Grounded in
// `original_source/backend/src/fetch_rest.c`'s `json_navigate`/`json_resolve`/
// `json_get_double`/`json_get_string`/`parse_generic_response`, translated
// from raw-pointer cJSON traversal into `serde_json::Value` indexing.
// =============================================================================

use chrono::Utc;
use serde_json::Value;

use crate::config::{FieldMapping, RestSourceConfig};
use crate::error::CoreError;
use crate::models::{Category, DataPoint, NewsItem, SourceKind};

/// Ticker → human-readable index name, ported verbatim from the original
/// daemon's static lookup table.
const INDEX_NAMES: &[(&str, &str)] = &[
    ("^GSPC", "S&P 500"),
    ("^DJI", "Dow Jones"),
    ("^IXIC", "NASDAQ"),
    ("^NDX", "NASDAQ-100"),
    ("^NYA", "NYSE Comp."),
    ("^RUT", "Russell 2000"),
    ("^SP400", "S&P MidCap 400"),
    ("^SP600", "S&P SmallCap"),
    ("^VIX", "CBOE VIX"),
    ("^SOX", "PHLX Semi."),
    ("^OEX", "S&P 100"),
    ("^RUI", "Russell 1000"),
    ("^RUA", "Russell 3000"),
    ("^DJT", "DJ Transport"),
    ("^DJU", "DJ Utilities"),
    ("^W1DOW", "DJ Global"),
    ("^GSPTSE", "S&P/TSX"),
    ("^BVSP", "Bovespa"),
    ("^MXX", "IPC Mexico"),
    ("^MERV", "MERVAL"),
    ("^IPSA", "IPSA Chile"),
    ("^SPCOSLCP", "Colombia"),
    ("^FTSE", "FTSE 100"),
    ("^FTAS", "FTSE All-Share"),
    ("^FTMC", "FTSE 250"),
    ("^GDAXI", "DAX"),
    ("^FCHI", "CAC 40"),
    ("^STOXX50E", "Euro Stoxx 50"),
    ("^AEX", "AEX"),
    ("^IBEX", "IBEX 35"),
    ("^SSMI", "SMI"),
    ("FTSEMIB.MI", "FTSE MIB"),
    ("^STOXX", "STOXX 600"),
    ("^N100", "Euronext 100"),
    ("^BFX", "BEL 20"),
    ("PSI20.LS", "PSI"),
    ("^ISEQ", "ISEQ"),
    ("^ATX", "ATX"),
    ("^OMXS30", "OMX Stockh."),
    ("^OMXC25", "OMX Copenh."),
    ("^OMXH25", "OMX Helsinki"),
    ("^OMXN40", "OMX Nordic"),
    ("XU100.IS", "BIST 100"),
    ("WIG20.WA", "WIG 20"),
    ("^BUX.BD", "BUX"),
    ("FPXAA.PR", "PX Prague"),
    ("^BET.RO", "BET"),
    ("GD.AT", "Athens Gen."),
    ("^MDAXI", "MDAX"),
    ("^TECDAX", "TecDAX"),
    ("^CN20", "CAC Next 20"),
    ("OSEBX.OL", "Oslo Bors"),
    ("^OMXI15", "OMX Iceland"),
    ("^OMXRGI", "OMX Riga"),
    ("^OMXVGI", "OMX Vilnius"),
    ("^N225", "Nikkei 225"),
    ("^HSI", "Hang Seng"),
    ("^HSCE", "HS China Ent."),
    ("HSTECH.HK", "HS TECH"),
    ("000001.SS", "Shanghai"),
    ("000300.SS", "CSI 300"),
    ("399001.SZ", "Shenzhen"),
    ("399006.SZ", "ChiNext"),
    ("^KS11", "KOSPI"),
    ("^TWII", "TAIEX"),
    ("^KQ11", "KOSDAQ"),
    ("^BSESN", "Sensex"),
    ("^NSEI", "Nifty 50"),
    ("^NSEBANK", "Nifty Bank"),
    ("^STI", "STI"),
    ("^JKSE", "IDX Comp."),
    ("^KLSE", "KLCI"),
    ("^SET.BK", "SET"),
    ("PSEI.PS", "PSEi"),
    ("^AXJO", "ASX 200"),
    ("^AORD", "All Ords"),
    ("^NZ50", "NZX 50"),
    ("^TA125.TA", "TA-125"),
    ("^TASI.SR", "Tadawul"),
    ("FADGI.FGI", "ADX Abu Dhabi"),
    ("DFMGI.AE", "DFM Dubai"),
    ("^BKA.KW", "Kuwait"),
    ("^GNRI.QA", "QE Qatar"),
    ("^J203.JO", "JSE All Share"),
    ("^J200.JO", "JSE Top 40"),
    ("^CASE30", "EGX 30"),
    ("^NQMA", "Morocco"),
    ("^VNINDEX.VN", "VN-Index"),
    ("^SPBLPGPT", "Peru General"),
    ("^DJBH", "DJ Bahrain"),
    ("^DWJOD", "DJ Jordan"),
    ("IMOEX.ME", "MOEX Russia"),
];

fn lookup_index_name(symbol: &str) -> Option<&'static str> {
    INDEX_NAMES
        .iter()
        .find(|(sym, _)| *sym == symbol)
        .map(|(_, name)| *name)
}

/// Navigate a dot-separated path from `root`. Numeric segments index arrays;
/// other segments index object keys. An empty path returns `root` itself.
fn navigate<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(root);
    }
    let mut cur = root;
    for segment in path.split('.') {
        if let Ok(idx) = segment.parse::<usize>() {
            cur = cur.as_array()?.get(idx)?;
        } else {
            cur = cur.as_object()?.get(segment)?;
        }
    }
    Some(cur)
}

/// Extract a numeric value from a JSON leaf: number, string (parsed as
/// float; empty/unparsable ⇒ NaN), or array (first element, recursively).
fn get_double(root: &Value, path: &str) -> f64 {
    let Some(leaf) = navigate(root, path) else {
        return f64::NAN;
    };
    value_as_double(leaf)
}

fn value_as_double(v: &Value) -> f64 {
    match v {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
        Value::Array(arr) => arr.first().map(value_as_double).unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

fn get_string(root: &Value, path: &str) -> String {
    match navigate(root, path) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

struct ResolvedMapping<'a> {
    field_symbol: &'a str,
    field_price: &'a str,
    field_change: &'a str,
    field_volume: &'a str,
    field_name: &'a str,
    field_prev_close: &'a str,
}

fn resolve_mapping<'a>(m: &'a FieldMapping, object_of_objects: bool) -> ResolvedMapping<'a> {
    let default_price = if object_of_objects { "usd" } else { "price" };
    let default_change = if object_of_objects {
        "usd_24h_change"
    } else {
        "change_percent"
    };
    let default_volume = if object_of_objects {
        "usd_24h_vol"
    } else {
        "volume"
    };
    ResolvedMapping {
        field_symbol: if m.field_symbol.is_empty() {
            "symbol"
        } else {
            &m.field_symbol
        },
        field_price: if m.field_price.is_empty() {
            default_price
        } else {
            &m.field_price
        },
        field_change: if m.field_change.is_empty() {
            default_change
        } else {
            &m.field_change
        },
        field_volume: if m.field_volume.is_empty() {
            default_volume
        } else {
            &m.field_volume
        },
        field_name: &m.field_name,
        field_prev_close: &m.field_prev_close,
    }
}

fn maybe_derive_change(value: f64, change_pct: f64, prev: f64) -> f64 {
    if change_pct.is_finite() || !value.is_finite() || prev.is_nan() || prev <= 0.0 {
        return change_pct;
    }
    (value - prev) / prev * 100.0
}

fn build_point(
    cfg: &RestSourceConfig,
    symbol: String,
    display_name: String,
    value: f64,
    change_pct: f64,
    volume: f64,
    now: chrono::DateTime<Utc>,
) -> DataPoint {
    DataPoint {
        id: 0,
        source_name: cfg.name.clone(),
        source_kind: SourceKind::Rest,
        category: cfg.category,
        symbol,
        display_name,
        value,
        currency: cfg.currency.clone().unwrap_or_else(|| "USD".to_string()),
        change_pct,
        volume,
        timestamp: now,
        ingested_at: now,
    }
}

/// Parse a fetched REST response body into zero or more DataPoints.
pub fn map_response(cfg: &RestSourceConfig, body: &str) -> Result<Vec<DataPoint>, CoreError> {
    let root: Value =
        serde_json::from_str(body).map_err(|e| CoreError::Parse(format!("invalid json: {e}")))?;
    let navigated = navigate(&root, &cfg.mapping.data_path)
        .ok_or_else(|| CoreError::Parse("data_path not found".to_string()))?;
    let now = Utc::now();

    let mut points = match navigated {
        Value::Array(items) => {
            let m = resolve_mapping(&cfg.mapping, false);
            let mut out = Vec::new();
            for item in items {
                let symbol = get_string(item, m.field_symbol);
                if !cfg.mapping.symbol_filter.is_empty()
                    && !cfg.mapping.symbol_filter.iter().any(|s| s == &symbol)
                {
                    continue;
                }
                let display_name = if m.field_name.is_empty() {
                    String::new()
                } else {
                    get_string(item, m.field_name)
                };
                let value = get_double(item, m.field_price);
                let mut change_pct = get_double(item, m.field_change);
                if !m.field_prev_close.is_empty() {
                    let prev = get_double(item, m.field_prev_close);
                    change_pct = maybe_derive_change(value, change_pct, prev);
                }
                let volume = get_double(item, m.field_volume);
                if (!symbol.is_empty() || !display_name.is_empty()) && value.is_finite() {
                    out.push(build_point(
                        cfg,
                        symbol,
                        display_name,
                        value,
                        change_pct,
                        volume,
                        now,
                    ));
                }
            }
            out
        }
        Value::Object(map) => {
            let m = resolve_mapping(&cfg.mapping, false);
            if map.contains_key(m.field_price) {
                // Single flat object.
                let symbol = if !cfg.mapping.symbol_filter.is_empty() {
                    cfg.mapping.symbol_filter[0].clone()
                } else {
                    cfg.name.clone()
                };
                let display_name = if m.field_name.is_empty() {
                    String::new()
                } else {
                    get_string(navigated, m.field_name)
                };
                let value = get_double(navigated, m.field_price);
                let mut change_pct = get_double(navigated, m.field_change);
                if !m.field_prev_close.is_empty() {
                    let prev = get_double(navigated, m.field_prev_close);
                    change_pct = maybe_derive_change(value, change_pct, prev);
                }
                let volume = get_double(navigated, m.field_volume);
                if value.is_finite() {
                    vec![build_point(
                        cfg,
                        symbol,
                        display_name,
                        value,
                        change_pct,
                        volume,
                        now,
                    )]
                } else {
                    Vec::new()
                }
            } else {
                // Object of objects keyed by symbol.
                let m = resolve_mapping(&cfg.mapping, true);
                let mut out = Vec::new();
                for (key, entry) in map {
                    let symbol = if m.field_symbol != "symbol" {
                        get_string(entry, m.field_symbol)
                    } else {
                        String::new()
                    };
                    let symbol = if symbol.is_empty() {
                        key.clone()
                    } else {
                        symbol
                    };
                    if !cfg.mapping.symbol_filter.is_empty()
                        && !cfg.mapping.symbol_filter.iter().any(|s| s == &symbol)
                    {
                        continue;
                    }
                    let (value, change_pct, volume) = if entry.is_object() {
                        let value = get_double(entry, m.field_price);
                        let mut change_pct = get_double(entry, m.field_change);
                        if !m.field_prev_close.is_empty() {
                            let prev = get_double(entry, m.field_prev_close);
                            change_pct = maybe_derive_change(value, change_pct, prev);
                        }
                        let volume = get_double(entry, m.field_volume);
                        (value, change_pct, volume)
                    } else {
                        (value_as_double(entry), f64::NAN, f64::NAN)
                    };
                    if value.is_finite() {
                        out.push(build_point(
                            cfg,
                            symbol,
                            String::new(),
                            value,
                            change_pct,
                            volume,
                            now,
                        ));
                    }
                }
                out
            }
        }
        _ => Vec::new(),
    };

    if cfg.category == Category::StockIndex {
        for p in &mut points {
            if p.display_name.is_empty() {
                if let Some(name) = lookup_index_name(&p.symbol) {
                    p.display_name = name.to_string();
                }
            }
        }
    }

    if points.is_empty() {
        return Err(CoreError::Parse("zero records decoded".to_string()));
    }
    Ok(points)
}

/// Calendar mode: the same engine, emitting NewsItems instead of DataPoints.
pub fn map_response_news(cfg: &RestSourceConfig, body: &str) -> Result<Vec<NewsItem>, CoreError> {
    let root: Value =
        serde_json::from_str(body).map_err(|e| CoreError::Parse(format!("invalid json: {e}")))?;
    let navigated = navigate(&root, &cfg.mapping.data_path)
        .ok_or_else(|| CoreError::Parse("data_path not found".to_string()))?;
    let items = navigated
        .as_array()
        .ok_or_else(|| CoreError::Parse("expected an array for calendar mode".to_string()))?;
    let now = Utc::now();
    let mut out = Vec::new();
    for item in items {
        let title = get_string(item, "title");
        let url = get_string(item, "url");
        if title.is_empty() || url.is_empty() {
            continue;
        }
        let mut news = NewsItem {
            id: 0,
            title,
            source: cfg.name.clone(),
            url,
            summary: get_string(item, "summary"),
            category: cfg.category,
            published_at: None,
            ingested_at: now,
            score: 50.0,
            region: String::new(),
            country: String::new(),
        };
        news.truncate_summary();
        out.push(news);
    }
    if out.is_empty() {
        return Err(CoreError::Parse("zero records decoded".to_string()));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FieldMapping;

    fn cfg(category: Category, mapping: FieldMapping) -> RestSourceConfig {
        RestSourceConfig {
            name: "test-src".to_string(),
            base_url: "https://example.com".to_string(),
            endpoint: String::new(),
            method: "GET".to_string(),
            category,
            api_key_header: String::new(),
            api_key: String::new(),
            params: String::new(),
            post_body: String::new(),
            currency: None,
            refresh_interval_sec: 30,
            mapping,
        }
    }

    #[test]
    fn object_of_objects_shape() {
        let mapping = FieldMapping {
            data_path: "data".to_string(),
            field_price: "u".to_string(),
            field_change: "c".to_string(),
            ..Default::default()
        };
        let body = r#"{"data":{"BTC":{"u":50000,"c":2.5},"ETH":{"u":3000,"c":-1.0}}}"#;
        let points = map_response(&cfg(Category::Crypto, mapping), body).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].symbol, "BTC");
        assert_eq!(points[0].value, 50000.0);
        assert_eq!(points[0].change_pct, 2.5);
        assert_eq!(points[1].symbol, "ETH");
        assert_eq!(points[1].change_pct, -1.0);
        assert_eq!(points[0].currency, "USD");
    }

    #[test]
    fn auto_derived_change_from_prev_close() {
        let mapping = FieldMapping {
            field_symbol: "s".to_string(),
            field_price: "p".to_string(),
            field_prev_close: "prev".to_string(),
            ..Default::default()
        };
        let body = r#"[{"s":"SPY","p":"420.00","prev":"400.00"}]"#;
        let points = map_response(&cfg(Category::StockIndex, mapping), body).unwrap();
        assert_eq!(points.len(), 1);
        assert!((points[0].change_pct - 5.00).abs() < 1e-9);
    }

    #[test]
    fn stock_index_display_name_filled_from_lookup() {
        let mapping = FieldMapping {
            field_symbol: "symbol".to_string(),
            field_price: "price".to_string(),
            ..Default::default()
        };
        let body = r#"[{"symbol":"^GSPC","price":5000}]"#;
        let points = map_response(&cfg(Category::StockIndex, mapping), body).unwrap();
        assert_eq!(points[0].display_name, "S&P 500");
    }

    #[test]
    fn empty_array_is_parse_error() {
        let mapping = FieldMapping::default();
        let err = map_response(&cfg(Category::Crypto, mapping), "[]").unwrap_err();
        assert!(matches!(err, CoreError::Parse(_)));
    }

    #[test]
    fn symbol_filter_discards_unlisted_symbols() {
        let mapping = FieldMapping {
            field_symbol: "symbol".to_string(),
            field_price: "price".to_string(),
            symbol_filter: vec!["BTC".to_string()],
            ..Default::default()
        };
        let body = r#"[{"symbol":"BTC","price":1},{"symbol":"ETH","price":2}]"#;
        let points = map_response(&cfg(Category::Crypto, mapping), body).unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].symbol, "BTC");
    }
}
