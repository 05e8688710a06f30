use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use switchboard_core::rate::{day_start, minute_start, today};

fn at(epoch: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(epoch, 0).unwrap()
}

#[test]
fn minute_window_truncates_to_the_minute() {
    assert_eq!(minute_start(at(0)), 0);
    assert_eq!(minute_start(at(59)), 0);
    assert_eq!(minute_start(at(60)), 60);
    assert_eq!(minute_start(at(119)), 60);
    assert_eq!(minute_start(at(1_700_000_035)), 1_700_000_035 / 60 * 60);
}

#[test]
fn day_window_starts_at_local_midnight() {
    // 2024-03-01 12:00:00 UTC.
    let noon_utc = at(1_709_294_400);

    assert_eq!(day_start(noon_utc, Tz::UTC), 1_709_251_200);

    // Shanghai is UTC+8 year-round: local midnight is 16:00 UTC the day
    // before.
    let shanghai = day_start(noon_utc, Tz::Asia__Shanghai);
    assert_eq!(shanghai, 1_709_251_200 - 8 * 3600);

    // New York is UTC-5 on that date.
    let new_york = day_start(noon_utc, Tz::America__New_York);
    assert_eq!(new_york, 1_709_251_200 + 5 * 3600);
}

#[test]
fn day_window_is_fixed_not_sliding() {
    // One second before local midnight and one second after land in
    // different windows.
    let before = at(1_709_251_199);
    let after = at(1_709_251_201);
    assert_ne!(day_start(before, Tz::UTC), day_start(after, Tz::UTC));
    assert_eq!(day_start(after, Tz::UTC), 1_709_251_200);
}

#[test]
fn today_formats_in_the_local_zone() {
    // 2024-02-29 23:30:00 UTC is already March 1st in Shanghai.
    let late = at(1_709_249_400);
    assert_eq!(today(late, Tz::UTC), "2024-02-29");
    assert_eq!(today(late, Tz::Asia__Shanghai), "2024-03-01");
}
