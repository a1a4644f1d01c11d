//! Deterministic fine-to-coarse bar aggregation.
//!
//! `BarResampler` is single-owner and stateful: one instance per pane per
//! distinct interval mismatch. It is never shared across panes. It only
//! reads timestamps from incoming bars; the source interval is never
//! supplied or inferred.

use core_interval::Interval;
use core_model::{Bar, OakViewError};

/// The bar currently being built for the in-flight bucket.
struct InFlight {
    bucket_start: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl InFlight {
    fn seed(bucket_start: i64, bar: &Bar) -> Self {
        Self {
            bucket_start,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
        }
    }

    fn absorb(&mut self, bar: &Bar) {
        self.high = self.high.max(bar.high);
        self.low = self.low.min(bar.low);
        self.close = bar.close;
        self.volume += bar.volume;
    }

    fn into_bar(self) -> Bar {
        Bar {
            time: self.bucket_start,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        }
    }
}

/// Stateful aggregator turning a stream of fine-interval bars into a stream
/// of `target`-interval bars.
pub struct BarResampler {
    target: Interval,
    in_flight: Option<InFlight>,
}

impl BarResampler {
    /// Construct a resampler for `target`. Fails at construction if `target`
    /// is a tick/range token (those have no fixed bucket boundaries).
    pub fn new(target: Interval) -> Result<Self, OakViewError> {
        if !target.is_resamplable() {
            return Err(OakViewError::UnsupportedInterval {
                token: target.token().to_string(),
            });
        }
        Ok(Self {
            target,
            in_flight: None,
        })
    }

    pub fn target(&self) -> &Interval {
        &self.target
    }

    /// Offer a source bar. Returns a just-completed coarse bar when the
    /// incoming bar's bucket differs from the in-flight one; otherwise
    /// absorbs it into the in-flight bar and returns `None`.
    pub fn add_bar(&mut self, bar: Bar) -> Result<Option<Bar>, OakViewError> {
        let bucket = core_interval::bucket_start(bar.time, &self.target).map_err(|_| {
            OakViewError::UnsupportedInterval {
                token: self.target.token().to_string(),
            }
        })?;

        match &mut self.in_flight {
            None => {
                self.in_flight = Some(InFlight::seed(bucket, &bar));
                Ok(None)
            }
            Some(current) if bucket == current.bucket_start => {
                current.absorb(&bar);
                Ok(None)
            }
            Some(current) if bucket < current.bucket_start => Err(OakViewError::OutOfOrder {
                got: bar.time,
                bucket_start: current.bucket_start,
            }),
            Some(_) => {
                let completed = self.in_flight.take().unwrap().into_bar();
                self.in_flight = Some(InFlight::seed(bucket, &bar));
                Ok(Some(completed))
            }
        }
    }

    /// Return and clear the in-flight bar, if any. Used at end-of-history or
    /// on teardown.
    pub fn flush(&mut self) -> Option<Bar> {
        self.in_flight.take().map(InFlight::into_bar)
    }

    /// Read-only view of the in-flight partial bar, for live legend updates.
    pub fn current_bar(&self) -> Option<Bar> {
        self.in_flight.as_ref().map(|f| Bar {
            time: f.bucket_start,
            open: f.open,
            high: f.high,
            low: f.low,
            close: f.close,
            volume: f.volume,
        })
    }
}

/// Bulk convenience: fold `add_bar` over `bars` then `flush`. Used both by
/// historical resample-on-load and by callers asserting idempotence.
pub fn resample(bars: &[Bar], target: Interval) -> Result<Vec<Bar>, OakViewError> {
    let mut resampler = BarResampler::new(target)?;
    let mut out = Vec::new();
    for &bar in bars {
        if let Some(completed) = resampler.add_bar(bar)? {
            out.push(completed);
        }
    }
    if let Some(last) = resampler.flush() {
        out.push(last);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(time: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Bar {
        Bar { time, open, high, low, close, volume }
    }

    fn daily_week() -> Vec<Bar> {
        (0..7)
            .map(|i| {
                let open = 100.0 + i as f64;
                bar(i * 86_400, open, open + 2.0, open - 1.0, open, 10.0)
            })
            .collect()
    }

    #[test]
    fn s1_daily_to_weekly_fixed_duration() {
        let bars = daily_week();
        let out = resample(&bars, core_interval::parse("1W").unwrap()).unwrap();
        assert_eq!(out.len(), 1);
        let b = out[0];
        assert_eq!(b.time, 0);
        assert_eq!(b.open, 100.0);
        assert_eq!(b.high, 108.0);
        assert_eq!(b.low, 99.0);
        assert_eq!(b.close, 106.0);
        assert_eq!(b.volume, 70.0);
    }

    #[test]
    fn s2_minute_to_hour_crossing_boundary() {
        let t0 = 3_600 + 1_800; // T % 3600 == 1800
        let bars: Vec<Bar> = (0..60)
            .map(|i| bar(t0 + i * 60, 1.0, 1.5, 0.5, 1.0, 1.0))
            .collect();
        let out = resample(&bars, core_interval::parse("60").unwrap()).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].time, (t0 / 3_600) * 3_600);
        assert_eq!(out[1].time, out[0].time + 3_600);
        assert_eq!(out[0].volume, 30.0);
        assert_eq!(out[1].volume, 30.0);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let out = resample(&[], core_interval::parse("1D").unwrap()).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn single_bar_input_shifts_to_bucket_start() {
        let b = bar(61, 1.0, 2.0, 0.5, 1.5, 3.0);
        let out = resample(&[b], core_interval::parse("60").unwrap()).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].time, 0);
        assert_eq!(out[0].open, b.open);
        assert_eq!(out[0].close, b.close);
    }

    #[test]
    fn tick_and_range_targets_fail_at_construction() {
        assert!(matches!(
            BarResampler::new(core_interval::parse("1T").unwrap()),
            Err(OakViewError::UnsupportedInterval { .. })
        ));
        assert!(matches!(
            BarResampler::new(core_interval::parse("1R").unwrap()),
            Err(OakViewError::UnsupportedInterval { .. })
        ));
    }

    #[test]
    fn out_of_order_bar_is_rejected() {
        let mut r = BarResampler::new(core_interval::parse("60").unwrap()).unwrap();
        r.add_bar(bar(3_600, 1.0, 1.0, 1.0, 1.0, 1.0)).unwrap();
        let err = r.add_bar(bar(0, 1.0, 1.0, 1.0, 1.0, 1.0)).unwrap_err();
        assert!(matches!(err, OakViewError::OutOfOrder { .. }));
    }

    #[test]
    fn bulk_path_matches_incremental_path() {
        let bars = daily_week();
        let target = core_interval::parse("1W").unwrap();

        let bulk = resample(&bars, target.clone()).unwrap();

        let mut incremental = Vec::new();
        let mut r = BarResampler::new(target).unwrap();
        for &b in &bars {
            if let Some(done) = r.add_bar(b).unwrap() {
                incremental.push(done);
            }
        }
        if let Some(last) = r.flush() {
            incremental.push(last);
        }

        assert_eq!(bulk.len(), incremental.len());
        for (a, b) in bulk.iter().zip(incremental.iter()) {
            assert_eq!(a.time, b.time);
            assert_eq!(a.open, b.open);
            assert_eq!(a.high, b.high);
            assert_eq!(a.low, b.low);
            assert_eq!(a.close, b.close);
            assert_eq!(a.volume, b.volume);
        }
    }

    #[test]
    fn current_bar_reflects_in_flight_partial() {
        let mut r = BarResampler::new(core_interval::parse("60").unwrap()).unwrap();
        assert!(r.current_bar().is_none());
        r.add_bar(bar(10, 1.0, 1.0, 1.0, 1.0, 5.0)).unwrap();
        let partial = r.current_bar().unwrap();
        assert_eq!(partial.volume, 5.0);
        r.add_bar(bar(20, 1.0, 1.0, 1.0, 1.0, 5.0)).unwrap();
        assert_eq!(r.current_bar().unwrap().volume, 10.0);
    }

    #[test]
    fn output_timestamps_are_strictly_ascending() {
        let bars: Vec<Bar> = (0..10)
            .map(|i| bar(i * 3_600, 1.0, 1.0, 1.0, 1.0, 1.0))
            .collect();
        let out = resample(&bars, core_interval::parse("60").unwrap()).unwrap();
        for pair in out.windows(2) {
            assert!(pair[1].time > pair[0].time);
        }
    }
}
