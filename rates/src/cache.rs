//! In-memory pricing cache with expiry-aware reads.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

use lumo_types::{
    Amount, CurrencyCode, ExchangeRate, FeeRates, HistoricalRates, TimeInterval, Timestamp,
};

#[derive(Default)]
struct CacheState {
    /// from → to → latest snapshot.
    exchange_rates: BTreeMap<CurrencyCode, BTreeMap<CurrencyCode, ExchangeRate>>,
    fee_rates: BTreeMap<CurrencyCode, FeeRates>,
    historical: HistoricalRates,
}

/// Latest pricing data, shared across the engine.
///
/// Reads take `now` explicitly: an entry whose validity window has passed is
/// reported as absent rather than served stale. Updates replace whole
/// entries; there is no partial merge.
#[derive(Default)]
pub struct RateCache {
    state: Mutex<CacheState>,
    /// Invoked after every update, outside the cache lock.
    on_update: Mutex<Option<Arc<dyn Fn() + Send + Sync>>>,
}

impl RateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback fired after every cache update.
    pub fn set_update_hook(&self, hook: Arc<dyn Fn() + Send + Sync>) {
        *self.on_update.lock().expect("rate cache lock poisoned") = Some(hook);
    }

    /// Replace the stored snapshot for each (from, to) pair present in
    /// `rates`. Pairs not mentioned keep their previous entry.
    pub fn update_exchange_rates(&self, rates: Vec<ExchangeRate>) {
        {
            let mut state = self.state.lock().expect("rate cache lock poisoned");
            for rate in rates {
                state
                    .exchange_rates
                    .entry(rate.from_currency)
                    .or_default()
                    .insert(rate.to_currency, rate);
            }
        }
        self.fire_update_hook();
    }

    pub fn update_fee_rates(&self, fee_rates: BTreeMap<CurrencyCode, FeeRates>) {
        {
            let mut state = self.state.lock().expect("rate cache lock poisoned");
            for (currency, rates) in fee_rates {
                state.fee_rates.insert(currency, rates);
            }
        }
        self.fire_update_hook();
    }

    pub fn update_historical(&self, historical: HistoricalRates) {
        {
            let mut state = self.state.lock().expect("rate cache lock poisoned");
            state.historical = historical;
        }
        self.fire_update_hook();
    }

    /// Current rate for the pair, or `None` if missing or expired.
    pub fn exchange_rate(
        &self,
        from: CurrencyCode,
        to: CurrencyCode,
        now: Timestamp,
    ) -> Option<ExchangeRate> {
        let state = self.state.lock().expect("rate cache lock poisoned");
        let rate = state.exchange_rates.get(&from)?.get(&to)?;
        if rate.has_expired(now) {
            debug!(%from, %to, "exchange rate expired, treated as absent");
            return None;
        }
        Some(rate.clone())
    }

    /// All currently-valid rates, expired entries filtered out.
    pub fn exchange_rates(
        &self,
        now: Timestamp,
    ) -> BTreeMap<CurrencyCode, BTreeMap<CurrencyCode, ExchangeRate>> {
        let state = self.state.lock().expect("rate cache lock poisoned");
        let mut out: BTreeMap<CurrencyCode, BTreeMap<CurrencyCode, ExchangeRate>> =
            BTreeMap::new();
        for (from, inner) in &state.exchange_rates {
            for (to, rate) in inner {
                if !rate.has_expired(now) {
                    out.entry(*from).or_default().insert(*to, rate.clone());
                }
            }
        }
        out
    }

    pub fn fee_rates(&self, currency: CurrencyCode) -> Option<FeeRates> {
        let state = self.state.lock().expect("rate cache lock poisoned");
        state.fee_rates.get(&currency).cloned()
    }

    pub fn historical(
        &self,
        interval: TimeInterval,
        from: CurrencyCode,
        to: CurrencyCode,
    ) -> Option<Vec<ExchangeRate>> {
        let state = self.state.lock().expect("rate cache lock poisoned");
        state
            .historical
            .get(&interval)?
            .get(&from)?
            .get(&to)
            .cloned()
    }

    /// Convert `amount` of `from` into `to` at the current rate, or `None`
    /// when no valid rate exists or the product overflows.
    pub fn convert(
        &self,
        amount: Amount,
        from: CurrencyCode,
        to: CurrencyCode,
        now: Timestamp,
    ) -> Option<Amount> {
        let rate = self.exchange_rate(from, to, now)?;
        amount.checked_mul(rate.value)
    }

    /// Drop all cached pricing data. Called on sign-out.
    pub fn clear(&self) {
        let mut state = self.state.lock().expect("rate cache lock poisoned");
        *state = CacheState::default();
    }

    fn fire_update_hook(&self) {
        let hook = {
            let guard = self.on_update.lock().expect("rate cache lock poisoned");
            guard.clone()
        };
        if let Some(hook) = hook {
            hook();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn rate(from: CurrencyCode, to: CurrencyCode, value: &str, valid_to: u64) -> ExchangeRate {
        ExchangeRate {
            from_currency: from,
            to_currency: to,
            value: Amount::parse(value).unwrap(),
            valid_to: Timestamp::new(valid_to),
            timestamp: Timestamp::new(0),
        }
    }

    #[test]
    fn expired_rate_reported_absent() {
        let cache = RateCache::new();
        cache.update_exchange_rates(vec![rate(
            CurrencyCode::Btc,
            CurrencyCode::Usd,
            "30000",
            100,
        )]);

        assert!(cache
            .exchange_rate(CurrencyCode::Btc, CurrencyCode::Usd, Timestamp::new(99))
            .is_some());
        // Boundary is inclusive: at valid_to the rate is already expired
        assert!(cache
            .exchange_rate(CurrencyCode::Btc, CurrencyCode::Usd, Timestamp::new(100))
            .is_none());
    }

    #[test]
    fn update_replaces_pair_keeps_others() {
        let cache = RateCache::new();
        cache.update_exchange_rates(vec![
            rate(CurrencyCode::Btc, CurrencyCode::Usd, "30000", 1000),
            rate(CurrencyCode::Eth, CurrencyCode::Usd, "2000", 1000),
        ]);
        cache.update_exchange_rates(vec![rate(
            CurrencyCode::Btc,
            CurrencyCode::Usd,
            "31000",
            2000,
        )]);

        let btc = cache
            .exchange_rate(CurrencyCode::Btc, CurrencyCode::Usd, Timestamp::new(0))
            .unwrap();
        assert_eq!(btc.value, Amount::parse("31000").unwrap());
        assert!(cache
            .exchange_rate(CurrencyCode::Eth, CurrencyCode::Usd, Timestamp::new(0))
            .is_some());
    }

    #[test]
    fn convert_uses_current_rate() {
        let cache = RateCache::new();
        cache.update_exchange_rates(vec![rate(
            CurrencyCode::Eth,
            CurrencyCode::Usd,
            "2000",
            1000,
        )]);

        let fiat = cache
            .convert(
                Amount::parse("1.5").unwrap(),
                CurrencyCode::Eth,
                CurrencyCode::Usd,
                Timestamp::new(10),
            )
            .unwrap();
        assert_eq!(fiat, Amount::parse("3000").unwrap());
    }

    #[test]
    fn update_hook_fires_after_each_update() {
        let cache = RateCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        cache.set_update_hook(Arc::new(move || {
            calls2.fetch_add(1, Ordering::SeqCst);
        }));

        cache.update_exchange_rates(vec![]);
        cache.update_fee_rates(BTreeMap::new());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn fee_rates_round_trip() {
        let cache = RateCache::new();
        let mut rates = BTreeMap::new();
        rates.insert(
            CurrencyCode::Eth,
            FeeRates {
                slow: Amount::parse("10").unwrap(),
                average: Amount::parse("20").unwrap(),
                fast: Amount::parse("40").unwrap(),
                slow_time: 600,
                average_time: 120,
                fast_time: 30,
                source: "feed".into(),
            },
        );
        cache.update_fee_rates(rates);

        assert!(cache.fee_rates(CurrencyCode::Eth).is_some());
        assert!(cache.fee_rates(CurrencyCode::Btc).is_none());
    }
}
