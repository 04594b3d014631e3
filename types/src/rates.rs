//! Pricing snapshot types: exchange rates, fee rates and historical series.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::amount::Amount;
use crate::currency::CurrencyCode;
use crate::time::Timestamp;

/// One exchange-rate snapshot with an explicit validity window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub from_currency: CurrencyCode,
    pub to_currency: CurrencyCode,
    /// Units of `to_currency` per one unit of `from_currency`.
    pub value: Amount,
    pub valid_to: Timestamp,
    pub timestamp: Timestamp,
}

impl ExchangeRate {
    /// Expired entries must be treated as absent by consumers.
    pub fn has_expired(&self, now: Timestamp) -> bool {
        now >= self.valid_to
    }
}

/// Fee-rate snapshot for one crypto currency.
///
/// Rates are in the network's native fee unit (gwei for account-nonce
/// chains, sat/vbyte for UTXO chains); the `*_time` fields are expected
/// confirmation times in seconds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeRates {
    pub slow: Amount,
    pub average: Amount,
    pub fast: Amount,
    pub slow_time: u64,
    pub average_time: u64,
    pub fast_time: u64,
    pub source: String,
}

/// Time interval for historical rate series.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TimeInterval {
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl TimeInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Quarter => "quarter",
            Self::Year => "year",
        }
    }
}

/// Historical exchange rates: interval → from-currency → to-currency →
/// ordered sequence of rate points.
pub type HistoricalRates =
    BTreeMap<TimeInterval, BTreeMap<CurrencyCode, BTreeMap<CurrencyCode, Vec<ExchangeRate>>>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_expiry_boundary() {
        let rate = ExchangeRate {
            from_currency: CurrencyCode::Btc,
            to_currency: CurrencyCode::Usd,
            value: Amount::parse("30000").unwrap(),
            valid_to: Timestamp::new(500),
            timestamp: Timestamp::new(400),
        };
        assert!(!rate.has_expired(Timestamp::new(499)));
        assert!(rate.has_expired(Timestamp::new(500)));
    }

    #[test]
    fn historical_map_nests_by_interval() {
        let rate = ExchangeRate {
            from_currency: CurrencyCode::Eth,
            to_currency: CurrencyCode::Gbp,
            value: Amount::parse("1500.25").unwrap(),
            valid_to: Timestamp::new(100),
            timestamp: Timestamp::new(90),
        };
        let mut historical: HistoricalRates = BTreeMap::new();
        historical
            .entry(TimeInterval::Day)
            .or_default()
            .entry(CurrencyCode::Eth)
            .or_default()
            .entry(CurrencyCode::Gbp)
            .or_default()
            .push(rate);

        let series = &historical[&TimeInterval::Day][&CurrencyCode::Eth][&CurrencyCode::Gbp];
        assert_eq!(series.len(), 1);
    }
}
