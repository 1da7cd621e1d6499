//! Technical screener.
//!
//! Pure indicator math over close/volume series plus the candidate
//! classification that decides which symbols are worth an oracle call.
//! No I/O here; everything operates on an already-fetched snapshot.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::market::StockSnapshot;

/// Bars required before a symbol can be screened at all.
pub const MIN_HISTORY_BARS: usize = 50;

/// RSI averaging window.
pub const RSI_PERIOD: usize = 14;

/// SMA window used for trend classification.
pub const SMA_PERIOD: usize = 50;

/// Bars averaged for the volume baseline.
pub const VOLUME_AVG_PERIOD: usize = 20;

/// Latest volume must exceed this multiple of the average to count as
/// a spike.
pub const VOLUME_SPIKE_RATIO: f64 = 1.5;

// ---------------------------------------------------------------------------
// Indicators
// ---------------------------------------------------------------------------

/// RSI over the last `period` deltas, simple-mean averaging.
///
/// Returns `None` when there are fewer than `period + 1` closes. An
/// all-gains window yields 100.0, an all-losses window 0.0.
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }

    let deltas: Vec<f64> = closes
        .windows(2)
        .map(|w| w[1] - w[0])
        .collect();
    let recent = &deltas[deltas.len() - period..];

    let gain: f64 = recent.iter().filter(|d| **d > 0.0).sum::<f64>() / period as f64;
    let loss: f64 = -recent.iter().filter(|d| **d < 0.0).sum::<f64>() / period as f64;

    if loss == 0.0 {
        return Some(100.0);
    }
    let rs = gain / loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// Simple moving average of the last `period` closes.
pub fn sma(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period {
        return None;
    }
    let tail = &closes[closes.len() - period..];
    Some(tail.iter().sum::<f64>() / period as f64)
}

/// Latest volume as a multiple of the 20-bar average (or of the whole
/// series when shorter).
pub fn volume_ratio(volumes: &[u64]) -> Option<f64> {
    let latest = *volumes.last()? as f64;
    let window = &volumes[volumes.len().saturating_sub(VOLUME_AVG_PERIOD)..];
    let avg = window.iter().sum::<u64>() as f64 / window.len() as f64;
    if avg == 0.0 {
        return None;
    }
    Some(latest / avg)
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Why a symbol made the candidate list. Ordering is priority: a held
/// symbol is always re-evaluated regardless of its technicals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScreenReason {
    /// Already in the portfolio, always a candidate.
    ExistingHolding,
    /// RSI below 30, potential mean-reversion entry.
    Oversold,
    /// Price above SMA(50) on a volume spike.
    MomentumBreakout,
    /// RSI between 50 and 70 with price above SMA(50).
    StrongUptrend,
}

impl fmt::Display for ScreenReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScreenReason::ExistingHolding => write!(f, "existing holding"),
            ScreenReason::Oversold => write!(f, "oversold"),
            ScreenReason::MomentumBreakout => write!(f, "momentum breakout"),
            ScreenReason::StrongUptrend => write!(f, "strong uptrend"),
        }
    }
}

/// Indicator readings computed once per screened symbol.
#[derive(Debug, Clone, Copy)]
pub struct Indicators {
    pub rsi: f64,
    pub sma_50: f64,
    pub volume_ratio: f64,
    pub latest_close: f64,
}

/// A screened symbol worth spending an oracle call on.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub symbol: String,
    pub reason: ScreenReason,
    pub indicators: Indicators,
}

/// Screen one snapshot. Returns `None` for symbols that are neither
/// held nor technically interesting, or that lack enough history.
pub fn screen(snapshot: &StockSnapshot, is_held: bool) -> Option<Candidate> {
    let closes = snapshot.closes();
    if closes.len() < MIN_HISTORY_BARS {
        return None;
    }
    let volumes: Vec<u64> = snapshot.history.iter().map(|b| b.volume).collect();

    let rsi_val = rsi(&closes, RSI_PERIOD)?;
    let sma_val = sma(&closes, SMA_PERIOD)?;
    // A halted book has no volume baseline; that only rules out the
    // spike signal, never the symbol (holdings must still screen).
    let vol_ratio = volume_ratio(&volumes).unwrap_or(0.0);
    let latest_close = *closes.last()?;

    let indicators = Indicators {
        rsi: rsi_val,
        sma_50: sma_val,
        volume_ratio: vol_ratio,
        latest_close,
    };

    let reason = if is_held {
        ScreenReason::ExistingHolding
    } else if rsi_val < 30.0 {
        ScreenReason::Oversold
    } else if latest_close > sma_val && vol_ratio > VOLUME_SPIKE_RATIO {
        ScreenReason::MomentumBreakout
    } else if rsi_val > 50.0 && rsi_val < 70.0 && latest_close > sma_val {
        ScreenReason::StrongUptrend
    } else {
        return None;
    };

    Some(Candidate {
        symbol: snapshot.symbol.clone(),
        reason,
        indicators,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
