use crate::utils::format_ms;
use chrono::{Local, NaiveDateTime, TimeZone};
use datasec_core::cron::{CronExpr, latest_scheduled_time_ms};
use datasec_core::{DataSecError, Result};
use tracing::info;

const AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 输出表达式在 `at`（默认现在）之前最近一次触发时间
pub fn run_cron(expression: &str, at: Option<&str>) -> Result<()> {
    CronExpr::parse(expression)?;
    let now_ms = parse_at(at)?;

    match latest_scheduled_time_ms(expression, now_ms) {
        Some(fire_ms) => {
            info!("⏰ '{}' 最近一次触发: {}", expression, format_ms(fire_ms));
            println!("{}", format_ms(fire_ms));
        }
        None => {
            info!("⏰ '{}' 在 {} 当天及之前没有触发时间", expression, format_ms(now_ms));
            println!("none");
        }
    }
    Ok(())
}

fn parse_at(at: Option<&str>) -> Result<i64> {
    let Some(at) = at else {
        return Ok(Local::now().timestamp_millis());
    };
    let naive = NaiveDateTime::parse_from_str(at.trim(), AT_FORMAT)
        .map_err(|e| DataSecError::config(format!("无效的时间 '{at}'（格式 {AT_FORMAT}）: {e}")))?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp_millis())
        .ok_or_else(|| DataSecError::config(format!("本地时间不存在: {at}")))
}
