//! Time and Timezone Utilities Module
//!
//! Resolves the civil timezone of a coordinate and anchors the daily
//! integration grid to local midnight, tolerating DST gaps.

use chrono::{DateTime, NaiveDate, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use std::sync::OnceLock;
use tzf_rs::DefaultFinder;

// tzf-rs DefaultFinder is pre-compiled and very fast
static TZF_FINDER: OnceLock<DefaultFinder> = OnceLock::new();

use crate::geo::Coordinate;

// ===================== TIMEZONE RESOLUTION =====================

/// Resolve the civil timezone for a coordinate.
///
/// Falls back to UTC when the lookup or the IANA parse fails (open ocean,
/// disputed areas).
pub fn timezone_at(coord: Coordinate) -> Tz {
    let finder = TZF_FINDER.get_or_init(DefaultFinder::new);
    finder.get_tz_name(coord.lng, coord.lat).parse::<Tz>().unwrap_or(Tz::UTC)
}

// ===================== CIVIL DAY ANCHORING =====================

/// First valid instant of a calendar day in a timezone.
///
/// Normally 00:00 local; on a DST gap the next representable hour is used,
/// and in the pathological double-gap case we fall back to interpreting
/// midnight as UTC.
pub fn local_midnight(tz: Tz, date: NaiveDate) -> DateTime<Tz> {
    for hour in 0..3u32 {
        if let Some(naive) = date.and_hms_opt(hour, 0, 0) {
            match tz.from_local_datetime(&naive) {
                chrono::LocalResult::Single(t) => return t,
                chrono::LocalResult::Ambiguous(t, _) => return t,
                chrono::LocalResult::None => continue,
            }
        }
    }
    let naive = date.and_hms_opt(0, 0, 0).expect("midnight is always representable");
    DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc).with_timezone(&tz)
}

/// Fractional UTC hour of an instant, in [0, 24).
pub fn utc_fractional_hour(instant: &DateTime<Utc>) -> f64 {
    f64::from(instant.hour())
        + f64::from(instant.minute()) / 60.0
        + f64::from(instant.second()) / 3600.0
}

/// The representative analysis date: the June 21 summer solstice.
pub fn representative_date(year: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, 6, 21).expect("June 21 exists in every year")
}

// ===================== TESTS =====================
