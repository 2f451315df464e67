use crate::feed::{PriceTick, TickSource};
use anyhow::{anyhow, Context, Result};
use chrono::{TimeZone, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

// Data structures that mirror the JSONL price dump
#[derive(Debug, Clone, Deserialize)]
struct DumpedSymbolSnapshot {
    price: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
struct DumpedDataEntry {
    timestamp: i64,
    prices: HashMap<String, DumpedSymbolSnapshot>,
}

#[derive(Debug)]
pub struct ReplayFeed {
    symbol_0: String,
    symbol_1: String,
    data: Vec<DumpedDataEntry>,
    cursor: usize,
}

impl ReplayFeed {
    pub fn new<P: AsRef<Path>>(path: P, symbol_0: &str, symbol_1: &str) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("failed to open replay file {}", path.display()))?;
        let data = Self::parse(BufReader::new(file))?;
        if data.is_empty() {
            return Err(anyhow!("replay file {} is empty", path.display()));
        }
        log::info!(
            "[REPLAY] loaded {} entries from {} for {}/{}",
            data.len(),
            path.display(),
            symbol_0,
            symbol_1
        );
        Ok(Self {
            symbol_0: symbol_0.to_string(),
            symbol_1: symbol_1.to_string(),
            data,
            cursor: 0,
        })
    }

    fn parse<R: BufRead>(reader: R) -> Result<Vec<DumpedDataEntry>> {
        let mut data = Vec::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line.context("failed to read replay line")?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: DumpedDataEntry = serde_json::from_str(&line).with_context(|| {
                format!("failed to parse replay entry at line {}: '{}'", lineno + 1, line)
            })?;
            data.push(entry);
        }
        Ok(data)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn price(entry: &DumpedDataEntry, symbol: &str) -> Option<f64> {
        entry.prices.get(symbol).and_then(|s| s.price.to_f64())
    }
}

impl TickSource for ReplayFeed {
    fn name(&self) -> &'static str {
        "replay"
    }

    fn next_tick(&mut self) -> Option<PriceTick> {
        let entry = self.data.get(self.cursor)?;
        self.cursor += 1;
        let timestamp = match Utc.timestamp_millis_opt(entry.timestamp).single() {
            Some(ts) => ts,
            None => {
                log::warn!("[REPLAY] invalid timestamp {} at entry {}", entry.timestamp, self.cursor);
                return Some(PriceTick {
                    timestamp: Utc::now(),
                    p0: None,
                    p1: None,
                });
            }
        };
        Some(PriceTick {
            timestamp,
            p0: Self::price(entry, &self.symbol_0),
            p1: Self::price(entry, &self.symbol_1),
        })
    }
}
