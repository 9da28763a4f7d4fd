use crate::series::RateSeries;

use enum_map::EnumMap;
use exchange::{AdapterError, Bar, RateRequest, RateSource, Timeframe};
use rustc_hash::{FxHashMap, FxHashSet};

use std::fmt;

/// Bars requested when topping up a series that is already cached.
pub const REFRESH_COUNT: usize = 100;
pub const DEFAULT_MAX_BARS: usize = 5_000;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub symbol: String,
    pub timeframe: Timeframe,
}

impl CacheKey {
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.symbol, self.timeframe)
    }
}

impl From<&RateRequest> for CacheKey {
    fn from(request: &RateRequest) -> Self {
        Self::new(request.symbol.clone(), request.timeframe)
    }
}

#[derive(thiserror::Error, Debug, Clone)]
pub enum CacheError {
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error("A fetch for {0} is already in flight")]
    InFlight(CacheKey),
    #[error("Nothing cached for {0}")]
    NotCached(CacheKey),
}

/// Process-lifetime store of bar series keyed by symbol and timeframe.
///
/// A fetch is split in two phases so it can run as a separate task:
/// [`RateCache::begin`] marks the key as in flight and describes what to ask
/// for, [`RateCache::complete`] merges the outcome and clears the mark. A
/// failed fetch never touches cached bars.
pub struct RateCache {
    series: FxHashMap<String, EnumMap<Timeframe, Option<RateSeries>>>,
    in_flight: FxHashSet<CacheKey>,
    /// Largest full fetch that succeeded per key. Upstream history may be
    /// shorter than that, so a short series alone does not trigger a refetch.
    depth: FxHashMap<CacheKey, usize>,
    max_bars: usize,
}

impl Default for RateCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BARS)
    }
}

impl RateCache {
    pub fn new(max_bars: usize) -> Self {
        Self {
            series: FxHashMap::default(),
            in_flight: FxHashSet::default(),
            depth: FxHashMap::default(),
            max_bars: max_bars.max(1),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<&RateSeries> {
        self.series
            .get(&key.symbol)
            .and_then(|by_tf| by_tf[key.timeframe].as_ref())
            .filter(|series| !series.is_empty())
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.get(key).is_some()
    }

    pub fn is_in_flight(&self, key: &CacheKey) -> bool {
        self.in_flight.contains(key)
    }

    pub fn len(&self) -> usize {
        self.series
            .values()
            .map(|by_tf| by_tf.values().filter(|s| s.is_some()).count())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `count` bars for `key` need a full fetch: nothing is cached,
    /// or the series is shorter and no fetch that deep has succeeded yet.
    pub fn needs_backfill(&self, key: &CacheKey, count: usize) -> bool {
        match self.get(key) {
            None => true,
            Some(series) => {
                series.len() < count.min(self.max_bars)
                    && self.depth.get(key).is_none_or(|&depth| depth < count)
            }
        }
    }

    /// Full fetch of `count` bars when the cache cannot cover them, otherwise
    /// a differential request starting at the cached last bar.
    pub fn begin(&mut self, key: &CacheKey, count: usize) -> Result<RateRequest, CacheError> {
        if self.needs_backfill(key, count) {
            self.begin_fetch(key, count)
        } else {
            self.begin_refresh(key)
        }
    }

    pub fn begin_fetch(&mut self, key: &CacheKey, count: usize) -> Result<RateRequest, CacheError> {
        self.mark_in_flight(key)?;
        Ok(RateRequest::latest(key.symbol.clone(), key.timeframe, count))
    }

    pub fn begin_refresh(&mut self, key: &CacheKey) -> Result<RateRequest, CacheError> {
        let last_time = self
            .get(key)
            .and_then(RateSeries::last_time)
            .ok_or_else(|| CacheError::NotCached(key.clone()))?;

        self.mark_in_flight(key)?;
        Ok(RateRequest::since(
            key.symbol.clone(),
            key.timeframe,
            REFRESH_COUNT,
            last_time,
        ))
    }

    fn mark_in_flight(&mut self, key: &CacheKey) -> Result<(), CacheError> {
        if !self.in_flight.insert(key.clone()) {
            return Err(CacheError::InFlight(key.clone()));
        }
        Ok(())
    }

    /// Drops the in-flight mark of an abandoned request.
    pub fn cancel(&mut self, request: &RateRequest) {
        self.in_flight.remove(&CacheKey::from(request));
    }

    pub fn complete(
        &mut self,
        request: &RateRequest,
        fetched: Result<Vec<Bar>, AdapterError>,
    ) -> Result<&RateSeries, CacheError> {
        let key = CacheKey::from(request);
        self.in_flight.remove(&key);

        let bars = fetched?;
        if request.from_time.is_none() {
            let depth = self.depth.entry(key.clone()).or_default();
            *depth = (*depth).max(request.count);
        }

        let max_bars = self.max_bars;
        let series = self
            .series
            .entry(key.symbol.clone())
            .or_default()[key.timeframe]
            .get_or_insert_with(RateSeries::default);

        match request.from_time {
            None => {
                log::debug!("Fetched {} bars for {key}", bars.len());
                series.merge(&bars);
            }
            Some(last_time) => {
                let updated: Vec<Bar> = bars.into_iter().filter(|b| b.time >= last_time).collect();

                match updated.first() {
                    None => {
                        log::debug!("No new bars for {key} since {last_time}");
                    }
                    Some(first) => {
                        if first.time != last_time && series.last_time() == Some(last_time) {
                            log::warn!(
                                "Refresh for {key} skipped the forming bar at {last_time}, next bar is {}",
                                first.time
                            );
                        }
                        // overwrites the forming bar and appends anything after it
                        series.merge(&updated);
                    }
                }
            }
        }

        series.truncate_front(max_bars);
        Ok(series)
    }

    /// Returns the cached tail, fetching `count` bars first if the key is
    /// unknown or cached too shallow.
    pub async fn get_or_fetch<S: RateSource>(
        &mut self,
        source: &S,
        key: &CacheKey,
        count: usize,
    ) -> Result<&[Bar], CacheError> {
        if self.needs_backfill(key, count) {
            self.fetch(source, key, count).await?;
        }

        Ok(self.get(key).map_or(&[][..], |series| series.tail(count)))
    }

    /// Full fetch of the latest `count` bars, merged over whatever is cached.
    pub async fn fetch<S: RateSource>(
        &mut self,
        source: &S,
        key: &CacheKey,
        count: usize,
    ) -> Result<&RateSeries, CacheError> {
        let request = self.begin_fetch(key, count)?;
        let fetched = self.await_source(source, &request).await;
        self.complete(&request, fetched)
    }

    /// Tops up an already cached series with bars from its last bar onwards.
    pub async fn refresh<S: RateSource>(
        &mut self,
        source: &S,
        key: &CacheKey,
    ) -> Result<&RateSeries, CacheError> {
        let request = self.begin_refresh(key)?;
        let fetched = self.await_source(source, &request).await;
        self.complete(&request, fetched)
    }

    /// Fetches when absent and refreshes when present, returning the tail.
    pub async fn fetch_or_refresh<S: RateSource>(
        &mut self,
        source: &S,
        key: &CacheKey,
        count: usize,
    ) -> Result<&[Bar], CacheError> {
        let request = self.begin(key, count)?;
        let fetched = self.await_source(source, &request).await;
        let series = self.complete(&request, fetched)?;
        Ok(series.tail(count))
    }

    async fn await_source<S: RateSource>(
        &mut self,
        source: &S,
        request: &RateRequest,
    ) -> Result<Vec<Bar>, AdapterError> {
        let guard = InFlightGuard {
            set: &mut self.in_flight,
            key: Some(CacheKey::from(request)),
        };
        let fetched = source.fetch_rates(request).await;
        guard.disarm();
        fetched
    }
}

/// Clears the in-flight mark if the awaiting future is dropped mid-fetch.
struct InFlightGuard<'a> {
    set: &'a mut FxHashSet<CacheKey>,
    key: Option<CacheKey>,
}

impl InFlightGuard<'_> {
    fn disarm(mut self) {
        self.key = None;
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            log::debug!("Fetch for {key} abandoned");
            self.set.remove(&key);
        }
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use exchange::{AdapterError, Bar, RateRequest, RateSource};

    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays scripted replies and records every request it sees.
    #[derive(Default)]
    pub struct ScriptedSource {
        replies: Mutex<VecDeque<Result<Vec<Bar>, AdapterError>>>,
        requests: Mutex<Vec<RateRequest>>,
    }

    impl ScriptedSource {
        pub fn reply(self, reply: Result<Vec<Bar>, AdapterError>) -> Self {
            self.push(reply);
            self
        }

        pub fn push(&self, reply: Result<Vec<Bar>, AdapterError>) {
            self.replies.lock().unwrap().push_back(reply);
        }

        pub fn requests(&self) -> Vec<RateRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl RateSource for ScriptedSource {
        async fn fetch_rates(&self, request: &RateRequest) -> Result<Vec<Bar>, AdapterError> {
            self.requests.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    pub fn bars(start: u64, step: u64, count: usize) -> Vec<Bar> {
        (0..count as u64)
            .map(|i| crate::series::bar_at(start + i * step, 150.0 + i as f64 * 0.01))
            .collect()
    }
}
