//! Weekly fire times for automatic videos (Tuesday and Friday at noon by default).

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveTime, Offset, TimeZone, Utc, Weekday};

use crate::config;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeeklySchedule {
    days: Vec<Weekday>,
    time: NaiveTime,
    offset: FixedOffset,
}

/// Parses "+03:00", "-0530" or "+3" into a fixed UTC offset.
pub fn parse_utc_offset(raw: &str) -> Option<FixedOffset> {
    let raw = raw.trim();
    let (sign, rest) = match raw.chars().next()? {
        '+' => (1, &raw[1..]),
        '-' => (-1, &raw[1..]),
        _ => (1, raw),
    };
    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?),
        None if rest.len() == 4 && rest.is_ascii() => (rest[..2].parse().ok()?, rest[2..].parse().ok()?),
        None => (rest.parse().ok()?, 0),
    };
    if !(0..=14).contains(&hours) || !(0..60).contains(&minutes) {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

impl WeeklySchedule {
    /// Returns `None` for an invalid time or an empty day list.
    pub fn new(days: Vec<Weekday>, hour: u32, minute: u32, offset: FixedOffset) -> Option<Self> {
        if days.is_empty() {
            return None;
        }
        Some(Self {
            days,
            time: NaiveTime::from_hms_opt(hour, minute, 0)?,
            offset,
        })
    }

    /// Tue and Fri at 12:00 in `SCHEDULE_UTC_OFFSET`.
    pub fn from_env() -> Self {
        let offset = parse_utc_offset(&config::schedule::UTC_OFFSET).unwrap_or_else(|| {
            log::warn!("Invalid SCHEDULE_UTC_OFFSET '{}', using +03:00", config::schedule::UTC_OFFSET.as_str());
            moscow()
        });
        Self::new(
            vec![Weekday::Tue, Weekday::Fri],
            config::schedule::HOUR,
            config::schedule::MINUTE,
            offset,
        )
        .unwrap_or_else(|| Self::default_with(offset))
    }

    fn default_with(offset: FixedOffset) -> Self {
        Self {
            days: vec![Weekday::Tue, Weekday::Fri],
            time: NaiveTime::from_hms_opt(12, 0, 0).unwrap_or_default(),
            offset,
        }
    }

    pub fn days(&self) -> &[Weekday] {
        &self.days
    }

    /// First fire time strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local = now.with_timezone(&self.offset);
        (0..=7)
            .filter_map(|days_ahead| {
                let date = local.date_naive() + Duration::days(days_ahead);
                if !self.days.contains(&date.weekday()) {
                    return None;
                }
                self.offset
                    .from_local_datetime(&date.and_time(self.time))
                    .single()
                    .map(|dt| dt.with_timezone(&Utc))
            })
            .find(|candidate| *candidate > now)
            .unwrap_or_else(|| now + Duration::weeks(1))
    }

    /// Time left until the next fire, never negative.
    pub fn until_next(&self, now: DateTime<Utc>) -> std::time::Duration {
        (self.next_after(now) - now).to_std().unwrap_or_default()
    }
}

fn moscow() -> FixedOffset {
    FixedOffset::east_opt(3 * 3600).unwrap_or_else(|| Utc.fix())
}
