//! 重复规则 - 计算重复通知的下次触发时间
//!
//! 固定单位规则（`minute`、`hour`、`day`、`week`、`time`）在上次触发时间上加固定时长。
//! `month` 按日历月计算：保留原触发时间的日、时、分，落在计算时所在月份的下一个月。

use chrono::{DateTime, Datelike, Local, NaiveDate, TimeZone, Timelike, Utc};
use std::fmt;
use std::str::FromStr;

use crate::error::{NotifyError, Result};

/// 一分钟（毫秒）
pub const ONE_MINUTE_MS: i64 = 60 * 1000;
/// 一小时（毫秒）
pub const ONE_HOUR_MS: i64 = 60 * ONE_MINUTE_MS;
/// 一天（毫秒）
pub const ONE_DAY_MS: i64 = 24 * ONE_HOUR_MS;

/// 重复类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatType {
    /// 不重复
    None,
    /// 自定义间隔（`repeatTime` 毫秒）
    Time,
    /// 每个日历月
    Month,
    Week,
    Day,
    Hour,
    Minute,
}

impl RepeatType {
    /// 存储格式中的字符串
    pub fn as_str(&self) -> &'static str {
        match self {
            RepeatType::None => "none",
            RepeatType::Time => "time",
            RepeatType::Month => "month",
            RepeatType::Week => "week",
            RepeatType::Day => "day",
            RepeatType::Hour => "hour",
            RepeatType::Minute => "minute",
        }
    }
}

impl fmt::Display for RepeatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RepeatType {
    type Err = NotifyError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(RepeatType::None),
            "time" => Ok(RepeatType::Time),
            "month" => Ok(RepeatType::Month),
            "week" => Ok(RepeatType::Week),
            "day" => Ok(RepeatType::Day),
            "hour" => Ok(RepeatType::Hour),
            "minute" => Ok(RepeatType::Minute),
            other => Err(NotifyError::InvalidRepeatType(other.to_string())),
        }
    }
}

/// 按本地日历计算下次触发时间，一次性规则返回 `None`
pub fn compute_next(fire_date: i64, repeat_type: RepeatType, repeat_time: Option<i64>) -> Result<Option<i64>> {
    compute_next_at(fire_date, repeat_type, repeat_time, Local::now())
}

/// 同 [`compute_next`]，但使用显式的 `now`，其时区决定 `month` 使用的日历
///
/// 时间计算溢出时返回 `InvalidField`
pub fn compute_next_at<Tz: TimeZone>(
    fire_date: i64,
    repeat_type: RepeatType,
    repeat_time: Option<i64>,
    now: DateTime<Tz>,
) -> Result<Option<i64>> {
    let step = match repeat_type {
        RepeatType::None => return Ok(None),
        RepeatType::Time => match repeat_time {
            Some(interval) if interval > 0 => interval,
            _ => return Err(NotifyError::MissingRepeatTime),
        },
        RepeatType::Month => return next_month(fire_date, now).map(Some),
        RepeatType::Week => 7 * ONE_DAY_MS,
        RepeatType::Day => ONE_DAY_MS,
        RepeatType::Hour => ONE_HOUR_MS,
        RepeatType::Minute => ONE_MINUTE_MS,
    };

    let next = fire_date.checked_add(step).ok_or_else(|| {
        let field = if repeat_type == RepeatType::Time { "repeatTime" } else { "fireDate" };
        let value = if repeat_type == RepeatType::Time { step } else { fire_date };
        NotifyError::InvalidField {
            field,
            value: value.to_string(),
        }
    })?;
    Ok(Some(next))
}

/// 下一个日历月的同一天同一时刻，日期超过月末时取月末
fn next_month<Tz: TimeZone>(fire_date: i64, now: DateTime<Tz>) -> Result<i64> {
    let tz = now.timezone();
    let original = Utc
        .timestamp_millis_opt(fire_date)
        .single()
        .ok_or_else(|| NotifyError::InvalidField {
            field: "fireDate",
            value: fire_date.to_string(),
        })?
        .with_timezone(&tz);

    let (year, month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };
    let day = original.day().min(days_in_month(year, month));

    let naive = NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(original.hour(), original.minute(), 0))
        .ok_or_else(|| NotifyError::InvalidField {
            field: "fireDate",
            value: fire_date.to_string(),
        })?;

    // 夏令时跳过的本地时间按 UTC 偏移解析
    let local = tz
        .from_local_datetime(&naive)
        .earliest()
        .unwrap_or_else(|| tz.from_utc_datetime(&naive));
    Ok(local.timestamp_millis())
}

/// 指定月份的天数
fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> i64 {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap().timestamp_millis()
    }

    fn now(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_rejects_unknown_repeat_type() {
        assert_eq!("week".parse::<RepeatType>().unwrap(), RepeatType::Week);
        assert!(matches!(
            "fortnight".parse::<RepeatType>(),
            Err(NotifyError::InvalidRepeatType(t)) if t == "fortnight"
        ));
    }

    #[test]
    fn test_fixed_units() {
        let fire = ms(2025, 3, 10, 8, 30, 0);
        let at = now(2025, 3, 10);
        assert_eq!(compute_next_at(fire, RepeatType::Minute, None, at).unwrap(), Some(fire + 60_000));
        assert_eq!(compute_next_at(fire, RepeatType::Hour, None, at).unwrap(), Some(fire + 3_600_000));
        assert_eq!(compute_next_at(fire, RepeatType::Day, None, at).unwrap(), Some(ms(2025, 3, 11, 8, 30, 0)));
        assert_eq!(compute_next_at(fire, RepeatType::Week, None, at).unwrap(), Some(ms(2025, 3, 17, 8, 30, 0)));
        assert_eq!(compute_next_at(fire, RepeatType::None, None, at).unwrap(), None);
    }

    #[test]
    fn test_time_requires_positive_interval() {
        let fire = ms(2025, 3, 10, 8, 30, 0);
        let at = now(2025, 3, 10);
        assert_eq!(compute_next_at(fire, RepeatType::Time, Some(5_000), at).unwrap(), Some(fire + 5_000));
        assert!(matches!(
            compute_next_at(fire, RepeatType::Time, None, at),
            Err(NotifyError::MissingRepeatTime)
        ));
        assert!(matches!(
            compute_next_at(fire, RepeatType::Time, Some(0), at),
            Err(NotifyError::MissingRepeatTime)
        ));
    }

    #[test]
    fn test_month_clamps_to_short_february() {
        let fire = ms(2025, 1, 31, 9, 15, 42);
        let next = compute_next_at(fire, RepeatType::Month, None, now(2025, 1, 31)).unwrap();
        assert_eq!(next, Some(ms(2025, 2, 28, 9, 15, 0)));
    }

    #[test]
    fn test_month_clamps_to_leap_february() {
        let fire = ms(2024, 1, 31, 9, 15, 0);
        let next = compute_next_at(fire, RepeatType::Month, None, now(2024, 1, 31)).unwrap();
        assert_eq!(next, Some(ms(2024, 2, 29, 9, 15, 0)));
    }

    #[test]
    fn test_month_rolls_december_into_next_year() {
        let fire = ms(2024, 12, 15, 18, 0, 0);
        let next = compute_next_at(fire, RepeatType::Month, None, now(2024, 12, 15)).unwrap();
        assert_eq!(next, Some(ms(2025, 1, 15, 18, 0, 0)));
    }

    #[test]
    fn test_month_is_relative_to_now_not_previous_fire() {
        // 延迟触发：原时间在三月，计算时已是五月
        let fire = ms(2025, 3, 20, 7, 0, 0);
        let next = compute_next_at(fire, RepeatType::Month, None, now(2025, 5, 2)).unwrap();
        assert_eq!(next, Some(ms(2025, 6, 20, 7, 0, 0)));
    }

    #[test]
    fn test_overflowing_fire_date_is_an_error() {
        let at = now(2025, 3, 10);
        for rule in [RepeatType::Minute, RepeatType::Hour, RepeatType::Day, RepeatType::Week] {
            assert!(matches!(
                compute_next_at(i64::MAX, rule, None, at),
                Err(NotifyError::InvalidField { field: "fireDate", .. })
            ));
        }
        assert!(matches!(
            compute_next_at(i64::MAX, RepeatType::Month, None, at),
            Err(NotifyError::InvalidField { field: "fireDate", .. })
        ));
    }

    #[test]
    fn test_overflowing_interval_is_an_error() {
        assert!(matches!(
            compute_next_at(1_000, RepeatType::Time, Some(i64::MAX), now(2025, 3, 10)),
            Err(NotifyError::InvalidField { field: "repeatTime", .. })
        ));
    }

    #[test]
    fn test_days_in_month() {
        assert_eq!(days_in_month(2023, 2), 28);
        assert_eq!(days_in_month(2024, 2), 29);
        assert_eq!(days_in_month(2024, 4), 30);
        assert_eq!(days_in_month(2024, 12), 31);
    }
}
