//! 五字段 cron 表达式（分 时 日 月 周）
//!
//! 每个字段只支持 `*` 或整数；周字段 0 和 7 都表示周日。求值只看"今天"：
//! 枚举当天满足约束的所有 (时, 分)，取不晚于当前时刻的最大值，不会回溯到前一天。

use crate::constants::cron::CRON_FIELDS_COUNT;
use crate::{DataSecError, Result};
use chrono::{Datelike, Local, LocalResult, NaiveDateTime, NaiveTime, TimeZone, Timelike};
use tracing::warn;

/// 单个字段：通配或固定值
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Any,
    Value(u32),
}

impl Field {
    fn parse(raw: &str, name: &str, min: u32, max: u32) -> Result<Self> {
        if raw == "*" {
            return Ok(Field::Any);
        }
        let value: u32 = raw
            .parse()
            .map_err(|_| DataSecError::config(format!("cron 字段 {name} 无效: {raw}")))?;
        if value < min || value > max {
            return Err(DataSecError::config(format!(
                "cron 字段 {name} 超出范围 {min}-{max}: {value}"
            )));
        }
        Ok(Field::Value(value))
    }

    fn matches(&self, value: u32) -> bool {
        match self {
            Field::Any => true,
            Field::Value(v) => *v == value,
        }
    }
}

/// 解析后的 cron 表达式
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpr {
    minute: Field,
    hour: Field,
    day: Field,
    month: Field,
    weekday: Field,
}

impl CronExpr {
    pub fn parse(expr: &str) -> Result<Self> {
        let parts: Vec<&str> = expr.split_whitespace().collect();
        if parts.len() != CRON_FIELDS_COUNT {
            return Err(DataSecError::config(format!(
                "cron 表达式需要 {CRON_FIELDS_COUNT} 个字段: {expr}"
            )));
        }

        let weekday = match Field::parse(parts[4], "weekday", 0, 7)? {
            Field::Value(7) => Field::Value(0),
            other => other,
        };

        Ok(Self {
            minute: Field::parse(parts[0], "minute", 0, 59)?,
            hour: Field::parse(parts[1], "hour", 0, 23)?,
            day: Field::parse(parts[2], "day", 1, 31)?,
            month: Field::parse(parts[3], "month", 1, 12)?,
            weekday,
        })
    }

    /// 当天不晚于 `now` 的最近一次触发时刻
    pub fn latest_fire_at_or_before(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        let date = now.date();
        if !self.day.matches(date.day())
            || !self.month.matches(date.month())
            || !self.weekday.matches(date.weekday().num_days_from_sunday())
        {
            return None;
        }

        let mut latest = None;
        for hour in 0..24 {
            if !self.hour.matches(hour) {
                continue;
            }
            for minute in 0..60 {
                if !self.minute.matches(minute) {
                    continue;
                }
                let candidate = date.and_time(NaiveTime::from_hms_opt(hour, minute, 0)?);
                if candidate <= now {
                    latest = Some(candidate);
                }
            }
        }
        latest
    }
}

/// 以本地时间求值，输入输出均为毫秒时间戳；表达式无效时返回 `None`
pub fn latest_scheduled_time_ms(expr: &str, now_ms: i64) -> Option<i64> {
    let cron = match CronExpr::parse(expr) {
        Ok(cron) => cron,
        Err(e) => {
            warn!(expression = %expr, error = %e, "忽略无效的 cron 表达式");
            return None;
        }
    };

    let now = Local.timestamp_millis_opt(now_ms).single()?;
    // 本地时间舍去秒内的小数部分不影响分钟粒度的比较
    let fire = cron.latest_fire_at_or_before(now.naive_local().with_nanosecond(0)?)?;
    match Local.from_local_datetime(&fire) {
        LocalResult::Single(dt) => Some(dt.timestamp_millis()),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.timestamp_millis()),
        // 夏令时跳过的时刻在本地不存在
        LocalResult::None => None,
    }
}
