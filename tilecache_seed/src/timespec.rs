//! TIMESPEC parsing for `--older-than` (spec §6.3): either the literal `now`
//! or `YYYY/MM/DD HH:MM`. Hand-rolled since no other part of the workspace
//! needs a date/time crate.

use std::time::{Duration, SystemTime};

const DAYS_PER_400_YEARS: i64 = 146097;

fn is_leap_year(year: i64) -> bool {
	(year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn days_in_month(year: i64, month: u32) -> i64 {
	const LENGTHS: [i64; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
	if month == 2 && is_leap_year(year) { 29 } else { LENGTHS[month as usize - 1] }
}

/// Days since the Unix epoch (1970-01-01) for a given calendar date.
fn days_from_civil(year: i64, month: u32, day: u32) -> anyhow::Result<i64> {
	anyhow::ensure!((1..=12).contains(&month), "month {month} out of range");
	anyhow::ensure!((1..=31).contains(&day) && day as i64 <= days_in_month(year, month), "day {day} out of range for {year}-{month:02}");

	// Howard Hinnant's days_from_civil algorithm, adapted for readability.
	let y = if month <= 2 { year - 1 } else { year };
	let era = if y >= 0 { y } else { y - 399 } / 400;
	let yoe = (y - era * 400) as i64;
	let mp = (month as i64 + 9) % 12;
	let doy = (153 * mp + 2) / 5 + day as i64 - 1;
	let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
	Ok(era * DAYS_PER_400_YEARS + doe - 719468)
}

/// Parses `"now"` or `"YYYY/MM/DD HH:MM"` into an absolute instant.
pub fn parse_timespec(input: &str) -> anyhow::Result<SystemTime> {
	let input = input.trim();
	if input.eq_ignore_ascii_case("now") {
		return Ok(SystemTime::now());
	}

	let (date_part, time_part) = input
		.split_once(' ')
		.ok_or_else(|| anyhow::anyhow!("TIMESPEC '{input}' must be 'YYYY/MM/DD HH:MM' or 'now'"))?;

	let mut date_fields = date_part.splitn(3, '/');
	let year: i64 = date_fields.next().ok_or_else(|| anyhow::anyhow!("missing year in '{input}'"))?.parse()?;
	let month: u32 = date_fields.next().ok_or_else(|| anyhow::anyhow!("missing month in '{input}'"))?.parse()?;
	let day: u32 = date_fields.next().ok_or_else(|| anyhow::anyhow!("missing day in '{input}'"))?.parse()?;

	let mut time_fields = time_part.splitn(2, ':');
	let hour: u32 = time_fields.next().ok_or_else(|| anyhow::anyhow!("missing hour in '{input}'"))?.parse()?;
	let minute: u32 = time_fields.next().ok_or_else(|| anyhow::anyhow!("missing minute in '{input}'"))?.parse()?;
	anyhow::ensure!(hour < 24, "hour {hour} out of range");
	anyhow::ensure!(minute < 60, "minute {minute} out of range");

	let days = days_from_civil(year, month, day)?;
	let seconds = days * 86400 + hour as i64 * 3600 + minute as i64 * 60;
	if seconds >= 0 {
		Ok(SystemTime::UNIX_EPOCH + Duration::from_secs(seconds as u64))
	} else {
		Ok(SystemTime::UNIX_EPOCH - Duration::from_secs((-seconds) as u64))
	}
}
