//! Tests for tumbling window assignment

use proptest::prelude::*;
use rstest::*;
use technical_indicators::window::checked_assign;
use technical_indicators::{ConfigError, Window, WindowAssigner, assign};

#[rstest]
#[case(0, 0, 60_000)]
#[case(59_999, 0, 60_000)]
#[case(60_000, 60_000, 120_000)]
#[case(90_000, 60_000, 120_000)]
#[case(-1, -60_000, 0)]
#[case(-60_000, -60_000, 0)]
#[case(-60_001, -120_000, -60_000)]
fn test_minute_windows(#[case] ts: i64, #[case] start: i64, #[case] end: i64) {
    assert_eq!(
        assign(ts, 60_000),
        Window {
            start_ms: start,
            end_ms: end
        }
    );
}

#[test]
fn test_assigner_rejects_zero_duration() {
    assert!(matches!(
        WindowAssigner::new(0),
        Err(ConfigError::NonPositiveDuration(0))
    ));
}

#[rstest]
#[case(i64::MIN)]
#[case(i64::MIN + 1)]
#[case(i64::MAX)]
fn test_range_edges_are_unrepresentable(#[case] ts: i64) {
    let assigner = WindowAssigner::new(60).expect("valid duration");
    assert_eq!(assigner.checked_assign(ts), None);
    // The total form still returns a window holding the timestamp's start edge
    assert!(assign(ts, 60_000).start_ms <= ts);
}

#[test]
fn test_assigner_uses_candle_seconds() {
    let assigner = WindowAssigner::new(300).expect("valid duration");
    assert_eq!(assigner.duration_ms(), 300_000);
    assert_eq!(assigner.assign(299_999).start_ms, 0);
    assert_eq!(assigner.assign(300_000).start_ms, 300_000);
}

proptest! {
    #[test]
    fn prop_window_contains_timestamp(ts in any::<i64>(), seconds in 1u64..86_400) {
        let duration = seconds as i64 * 1000;
        let window = assign(ts, duration);
        prop_assert!(window.contains(ts) || window.end_ms == i64::MAX);
        match checked_assign(ts, duration) {
            Some(checked) => {
                prop_assert_eq!(checked, window);
                prop_assert!(checked.contains(ts));
                prop_assert_eq!(checked.end_ms - checked.start_ms, duration);
                prop_assert_eq!(checked.start_ms.rem_euclid(duration), 0);
            }
            // Only the outermost partial windows of the i64 range are unrepresentable
            None => prop_assert!(
                ts < i64::MIN + duration || ts > i64::MAX - duration
            ),
        }
    }

    #[test]
    fn prop_same_window_is_stable(ts in 0i64..1_000_000_000, offset in 0i64..60_000) {
        let window = assign(ts, 60_000);
        let inner = window.start_ms + offset;
        prop_assert_eq!(assign(inner, 60_000), window);
    }
}
