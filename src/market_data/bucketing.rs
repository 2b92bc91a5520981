// =============================================================================
// Session Bucketing — collapses irregular upstream bars into session candles
// =============================================================================
//
// The session calendar is fixed: trading runs 08:30–15:00 in the reference
// timezone (US Central). The opening half hour 08:30–09:00 is one bucket,
// after that every clock hour 09:00–10:00 … 14:00–15:00 is one bucket.
// Anything outside the session is dropped.
//
// Bucket assignment happens on the local wall clock, but every label is
// reported back as the equivalent UTC instant, so daylight-saving shifts in
// the reference timezone never produce an ambiguous label.
// =============================================================================

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;

use crate::types::{Bar, Candle};

/// Timezone the session calendar is defined in.
pub const REFERENCE_TZ: Tz = chrono_tz::America::Chicago;

const SESSION_OPEN: (u32, u32) = (8, 30);
const FIRST_HOUR: (u32, u32) = (9, 0);
const SESSION_CLOSE: (u32, u32) = (15, 0);

fn hm(pair: (u32, u32)) -> NaiveTime {
    NaiveTime::from_hms_opt(pair.0, pair.1, 0).unwrap_or(NaiveTime::MIN)
}

/// Bucket label (as a UTC instant) for `ts`, or `None` when the instant
/// falls outside the trading session.
///
/// Bounds: 08:30 inclusive, 09:00 inclusive for the first hourly bucket,
/// 15:00 exclusive.
pub fn bucket_for(ts: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let local = ts.with_timezone(&REFERENCE_TZ).naive_local();
    let clock = local.time();

    if clock < hm(SESSION_OPEN) || clock >= hm(SESSION_CLOSE) {
        return None;
    }

    let label_time = if clock < hm(FIRST_HOUR) {
        hm(SESSION_OPEN)
    } else {
        NaiveTime::from_hms_opt(local.hour(), 0, 0)?
    };
    let label = NaiveDateTime::new(local.date(), label_time);

    // No DST transition ever happens inside the session window, so the local
    // offset from the label to the bar maps 1:1 onto UTC.
    Some(ts - (local - label))
}

/// Aggregate `bars` into one candle per non-empty session bucket, sorted by
/// bucket start.
///
/// Pure: no state survives between calls. Bars are expected in
/// non-decreasing timestamp order; ties keep their input order, so `open` and
/// `close` always come from the first and last constituent.
pub fn aggregate(bars: &[Bar]) -> Vec<Candle> {
    let mut ordered: Vec<&Bar> = bars.iter().collect();
    ordered.sort_by_key(|bar| bar.timestamp);

    let mut buckets: BTreeMap<DateTime<Utc>, Candle> = BTreeMap::new();

    for bar in ordered {
        let Some(start) = bucket_for(bar.timestamp) else {
            continue;
        };

        buckets
            .entry(start)
            .and_modify(|candle| {
                candle.high = candle.high.max(bar.high);
                candle.low = candle.low.min(bar.low);
                candle.close = bar.close;
                if let Some(v) = bar.volume {
                    candle.volume = Some(candle.volume.unwrap_or(0) + v);
                }
            })
            .or_insert_with(|| Candle {
                bucket_start: start,
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                volume: bar.volume,
            });
    }

    buckets.into_values().collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    /// UTC instant for a wall-clock time in the reference timezone.
    fn central(y: i32, m: u32, d: u32, hh: u32, mm: u32) -> DateTime<Utc> {
        REFERENCE_TZ
            .with_ymd_and_hms(y, m, d, hh, mm, 0)
            .single()
            .expect("unambiguous local time")
            .with_timezone(&Utc)
    }

    fn bar(ts: DateTime<Utc>, o: f64, h: f64, l: f64, c: f64, v: Option<u64>) -> Bar {
        Bar {
            timestamp: ts,
            open: o,
            high: h,
            low: l,
            close: c,
            volume: v,
        }
    }

    #[test]
    fn scenario_half_hour_then_hourly() {
        let bars = vec![
            bar(central(2024, 3, 5, 8, 31), 10.0, 11.0, 9.0, 10.5, None),
            bar(central(2024, 3, 5, 8, 45), 10.5, 10.5, 10.0, 10.2, None),
            bar(central(2024, 3, 5, 9, 10), 10.2, 10.8, 10.0, 10.6, None),
            bar(central(2024, 3, 5, 9, 50), 10.6, 10.9, 10.3, 10.7, None),
            bar(central(2024, 3, 5, 10, 5), 10.7, 11.0, 10.5, 10.9, None),
        ];

        let candles = aggregate(&bars);
        assert_eq!(candles.len(), 3);

        assert_eq!(candles[0].bucket_start, central(2024, 3, 5, 8, 30));
        assert_eq!(
            (candles[0].open, candles[0].high, candles[0].low, candles[0].close),
            (10.0, 11.0, 9.0, 10.2)
        );

        assert_eq!(candles[1].bucket_start, central(2024, 3, 5, 9, 0));
        assert_eq!(
            (candles[1].open, candles[1].high, candles[1].low, candles[1].close),
            (10.2, 10.9, 10.0, 10.7)
        );

        assert_eq!(candles[2].bucket_start, central(2024, 3, 5, 10, 0));
        assert_eq!(
            (candles[2].open, candles[2].high, candles[2].low, candles[2].close),
            (10.7, 11.0, 10.5, 10.9)
        );
        assert!(candles.iter().all(|c| c.volume.is_none()));
    }

    #[test]
    fn session_bounds_are_inclusive_open_exclusive_close() {
        assert_eq!(
            bucket_for(central(2024, 3, 5, 8, 30)),
            Some(central(2024, 3, 5, 8, 30))
        );
        assert_eq!(
            bucket_for(central(2024, 3, 5, 9, 0)),
            Some(central(2024, 3, 5, 9, 0))
        );
        assert_eq!(
            bucket_for(central(2024, 3, 5, 14, 59)),
            Some(central(2024, 3, 5, 14, 0))
        );
        assert_eq!(bucket_for(central(2024, 3, 5, 15, 0)), None);
        assert_eq!(bucket_for(central(2024, 3, 5, 8, 29)), None);
    }

    #[test]
    fn bar_at_close_is_dropped_and_bar_at_open_is_kept() {
        let bars = vec![
            bar(central(2024, 3, 5, 8, 30), 1.0, 1.0, 1.0, 1.0, Some(5)),
            bar(central(2024, 3, 5, 15, 0), 2.0, 2.0, 2.0, 2.0, Some(7)),
        ];
        let candles = aggregate(&bars);
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].bucket_start, central(2024, 3, 5, 8, 30));
        assert_eq!(candles[0].volume, Some(5));
    }

    #[test]
    fn empty_and_all_dropped_inputs_give_empty_output() {
        assert!(aggregate(&[]).is_empty());
        let night = vec![
            bar(central(2024, 3, 5, 3, 0), 1.0, 1.0, 1.0, 1.0, None),
            bar(central(2024, 3, 5, 19, 0), 1.0, 1.0, 1.0, 1.0, None),
        ];
        assert!(aggregate(&night).is_empty());
    }

    #[test]
    fn missing_volume_counts_as_zero_only_when_a_sibling_has_volume() {
        let bars = vec![
            bar(central(2024, 3, 5, 11, 0), 1.0, 1.0, 1.0, 1.0, None),
            bar(central(2024, 3, 5, 11, 5), 1.0, 1.0, 1.0, 1.0, Some(40)),
            bar(central(2024, 3, 5, 11, 10), 1.0, 1.0, 1.0, 1.0, None),
            bar(central(2024, 3, 5, 12, 0), 1.0, 1.0, 1.0, 1.0, None),
        ];
        let candles = aggregate(&bars);
        assert_eq!(candles[0].volume, Some(40));
        assert_eq!(candles[1].volume, None);
    }

    #[test]
    fn labels_follow_daylight_saving_in_utc() {
        // Winter (CST, UTC-6) and summer (CDT, UTC-5) opens.
        let winter = bucket_for(central(2024, 1, 10, 8, 40)).unwrap();
        let summer = bucket_for(central(2024, 7, 10, 8, 40)).unwrap();
        assert_eq!(winter, Utc.with_ymd_and_hms(2024, 1, 10, 14, 30, 0).unwrap());
        assert_eq!(summer, Utc.with_ymd_and_hms(2024, 7, 10, 13, 30, 0).unwrap());
    }

    #[test]
    fn trailing_partial_bucket_is_emitted() {
        let bars = vec![
            bar(central(2024, 11, 29, 11, 0), 5.0, 6.0, 4.0, 5.5, Some(1)),
            bar(central(2024, 11, 29, 12, 5), 5.5, 5.6, 5.4, 5.45, Some(2)),
        ];
        let candles = aggregate(&bars);
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[1].bucket_start, central(2024, 11, 29, 12, 0));
        assert_eq!(candles[1].close, 5.45);
    }

    #[test]
    fn separate_days_never_share_a_bucket() {
        let bars = vec![
            bar(central(2024, 3, 4, 10, 15), 1.0, 1.0, 1.0, 1.0, None),
            bar(central(2024, 3, 5, 10, 15), 2.0, 2.0, 2.0, 2.0, None),
        ];
        let candles = aggregate(&bars);
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].open, 1.0);
        assert_eq!(candles[1].open, 2.0);
    }

    // -----------------------------------------------------------------------
    // Properties
    // -----------------------------------------------------------------------

    fn arb_bars() -> impl Strategy<Value = Vec<Bar>> {
        // Five-minute bars across a whole calendar day (00:00–23:55 local),
        // with an optional volume.
        prop::collection::vec((0u32..288, 1.0f64..500.0, prop::option::of(0u64..10_000)), 0..120)
            .prop_map(|mut rows| {
                rows.sort_by_key(|row| row.0);
                rows.into_iter()
                    .map(|(slot, price, volume)| {
                        let ts = central(2024, 3, 5, 0, 0) + chrono::Duration::minutes(i64::from(slot) * 5);
                        bar(ts, price, price + 1.0, price - 1.0, price + 0.5, volume)
                    })
                    .collect()
            })
    }

    proptest! {
        #[test]
        fn out_of_session_bars_never_contribute(bars in arb_bars()) {
            let kept: Vec<Bar> = bars.iter().filter(|b| bucket_for(b.timestamp).is_some()).cloned().collect();
            prop_assert_eq!(aggregate(&bars), aggregate(&kept));
        }

        #[test]
        fn aggregate_is_idempotent(bars in arb_bars()) {
            prop_assert_eq!(aggregate(&bars), aggregate(&bars));
        }

        #[test]
        fn volume_is_conserved_for_assigned_bars(bars in arb_bars()) {
            let expected: u64 = bars
                .iter()
                .filter(|b| bucket_for(b.timestamp).is_some())
                .filter_map(|b| b.volume)
                .sum();
            let actual: u64 = aggregate(&bars).iter().filter_map(|c| c.volume).sum();
            prop_assert_eq!(expected, actual);
        }

        #[test]
        fn candles_are_sorted_and_at_most_seven_per_day(bars in arb_bars()) {
            let candles = aggregate(&bars);
            prop_assert!(candles.len() <= 7);
            prop_assert!(candles.windows(2).all(|w| w[0].bucket_start < w[1].bucket_start));
        }
    }
}
