use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::error::{ReplayError, Result};

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).expect("epoch")
}

pub fn ts_to_date(ts_local_us: i64) -> Result<NaiveDate> {
    let seconds = ts_local_us.div_euclid(1_000_000);
    let micros = ts_local_us.rem_euclid(1_000_000);
    let nanos = (micros * 1_000) as u32;
    let dt = NaiveDateTime::from_timestamp_opt(seconds, nanos)
        .ok_or_else(|| ReplayError::Schema(format!("invalid ts_local_us: {}", ts_local_us)))?;
    Ok(dt.date())
}

/// Days since the unix epoch, the Arrow `Date32` representation.
pub fn date_to_days(date: NaiveDate) -> i32 {
    (date - epoch()).num_days() as i32
}

pub fn days_to_date(days: i32) -> Result<NaiveDate> {
    epoch()
        .checked_add_signed(Duration::days(i64::from(days)))
        .ok_or_else(|| ReplayError::Schema(format!("invalid date days: {}", days)))
}

pub fn date_to_ts_local_us(date: NaiveDate, end_of_day: bool) -> i64 {
    let dt = if end_of_day {
        date.and_hms_micro_opt(23, 59, 59, 999_999)
    } else {
        date.and_hms_micro_opt(0, 0, 0, 0)
    }
    .expect("valid date time");
    dt.timestamp_micros()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ts_to_date_handles_day_edges() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 1).expect("date");
        let start = date_to_ts_local_us(date, false);
        let end = date_to_ts_local_us(date, true);

        assert_eq!(ts_to_date(start).unwrap(), date);
        assert_eq!(ts_to_date(end).unwrap(), date);
        assert_eq!(ts_to_date(end + 1).unwrap(), date.succ_opt().unwrap());
        assert_eq!(ts_to_date(start - 1).unwrap(), date.pred_opt().unwrap());
    }

    #[test]
    fn days_convert_both_ways() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).expect("date");
        let days = date_to_days(date);
        assert_eq!(days_to_date(days).unwrap(), date);
        assert_eq!(date_to_days(epoch()), 0);
        assert_eq!(days_to_date(-1).unwrap(), NaiveDate::from_ymd_opt(1969, 12, 31).unwrap());
    }
}
