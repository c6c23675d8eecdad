use chrono::{NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

/// One block of opening hours, e.g. `{"day":"mon","open":"09:00","close":"17:00"}`.
/// A weekday may list several blocks for a split shift.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DayHours {
    pub day: String,
    pub open: String,
    pub close: String,
}

/// Weekly working-hours map used for both business hours and stylist schedules.
/// A weekday without an entry is closed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WeeklyHours {
    pub days: Vec<DayHours>,
}

/// A half-open `[open, close)` interval of local wall-clock time within one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenInterval {
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl OpenInterval {
    pub fn new(open: NaiveTime, close: NaiveTime) -> Option<Self> {
        (close > open).then_some(Self { open, close })
    }

    pub fn intersect(&self, other: &OpenInterval) -> Option<OpenInterval> {
        OpenInterval::new(self.open.max(other.open), self.close.min(other.close))
    }

    pub fn open_minute(&self) -> i64 {
        i64::from(self.open.num_seconds_from_midnight() / 60)
    }

    pub fn close_minute(&self) -> i64 {
        i64::from(self.close.num_seconds_from_midnight() / 60)
    }
}

impl WeeklyHours {
    pub fn from_json(s: &str) -> anyhow::Result<Self> {
        let hours: WeeklyHours = serde_json::from_str(s)?;
        hours.validate()?;
        Ok(hours)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"days":[]}"#.to_string())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for entry in &self.days {
            parse_weekday(&entry.day)?;
            let open = parse_time(&entry.open)?;
            let close = parse_time(&entry.close)?;
            if close <= open {
                anyhow::bail!(
                    "closing time {} must be after opening time {} on {}",
                    entry.close,
                    entry.open,
                    entry.day
                );
            }
        }

        for weekday in WEEKDAYS {
            let blocks = self.hours_for(weekday);
            if let Some(pair) = blocks.windows(2).find(|pair| pair[1].open < pair[0].close) {
                anyhow::bail!(
                    "overlapping hours on {weekday}: {}-{} and {}-{}",
                    format_time(pair[0].open),
                    format_time(pair[0].close),
                    format_time(pair[1].open),
                    format_time(pair[1].close)
                );
            }
        }
        Ok(())
    }

    /// Every block listed for a weekday, ordered by opening time. Missing or malformed
    /// entries are treated as closed, never as open all day.
    pub fn hours_for(&self, weekday: Weekday) -> Vec<OpenInterval> {
        let mut blocks: Vec<OpenInterval> = self
            .days
            .iter()
            .filter_map(|entry| {
                if parse_weekday(&entry.day).ok()? != weekday {
                    return None;
                }
                let open = parse_time(&entry.open).ok()?;
                let close = parse_time(&entry.close).ok()?;
                OpenInterval::new(open, close)
            })
            .collect();
        blocks.sort_by_key(|b| b.open);
        blocks
    }
}

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

pub fn parse_weekday(s: &str) -> anyhow::Result<Weekday> {
    match s.to_lowercase().as_str() {
        "mon" => Ok(Weekday::Mon),
        "tue" => Ok(Weekday::Tue),
        "wed" => Ok(Weekday::Wed),
        "thu" => Ok(Weekday::Thu),
        "fri" => Ok(Weekday::Fri),
        "sat" => Ok(Weekday::Sat),
        "sun" => Ok(Weekday::Sun),
        _ => Err(anyhow::anyhow!("invalid weekday: {s}")),
    }
}

pub fn parse_time(s: &str) -> anyhow::Result<NaiveTime> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 2 {
        return Err(anyhow::anyhow!("invalid time format: {s}"));
    }
    let hour: u32 = parts[0]
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid hour in: {s}"))?;
    let minute: u32 = parts[1]
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid minute in: {s}"))?;
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| anyhow::anyhow!("time out of range: {s}"))
}

pub fn format_time(t: NaiveTime) -> String {
    t.format("%H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> NaiveTime {
        parse_time(s).unwrap()
    }

    #[test]
    fn test_parse_valid_json() {
        let json = r#"{"days":[{"day":"mon","open":"09:00","close":"17:00"},{"day":"tue","open":"10:00","close":"18:00"}]}"#;
        let hours = WeeklyHours::from_json(json).unwrap();
        assert_eq!(hours.days.len(), 2);
        assert_eq!(hours.days[1].day, "tue");
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(WeeklyHours::from_json("not json").is_err());
        assert!(WeeklyHours::from_json(r#"{"days":[{"day":"xyz","open":"09:00","close":"17:00"}]}"#).is_err());
        assert!(WeeklyHours::from_json(r#"{"days":[{"day":"mon","open":"25:00","close":"17:00"}]}"#).is_err());
        // close before open
        assert!(WeeklyHours::from_json(r#"{"days":[{"day":"mon","open":"17:00","close":"09:00"}]}"#).is_err());
    }

    #[test]
    fn test_hours_for_weekday() {
        let hours = WeeklyHours::from_json(r#"{"days":[{"day":"Mon","open":"09:00","close":"17:00"}]}"#).unwrap();
        let blocks = hours.hours_for(Weekday::Mon);
        assert_eq!(blocks.len(), 1);
        let mon = blocks[0];
        assert_eq!(mon.open, t("09:00"));
        assert_eq!(mon.close, t("17:00"));
        assert_eq!(mon.open_minute(), 540);
        assert_eq!(mon.close_minute(), 1020);
    }

    #[test]
    fn test_missing_weekday_is_closed() {
        let hours = WeeklyHours::from_json(r#"{"days":[{"day":"mon","open":"09:00","close":"17:00"}]}"#).unwrap();
        assert!(hours.hours_for(Weekday::Sun).is_empty());
        assert!(WeeklyHours::default().hours_for(Weekday::Mon).is_empty());
    }

    #[test]
    fn test_split_shift_keeps_every_block() {
        let hours = WeeklyHours::from_json(
            r#"{"days":[{"day":"mon","open":"13:00","close":"17:00"},{"day":"mon","open":"09:00","close":"12:00"}]}"#,
        )
        .unwrap();
        assert_eq!(
            hours.hours_for(Weekday::Mon),
            vec![
                OpenInterval::new(t("09:00"), t("12:00")).unwrap(),
                OpenInterval::new(t("13:00"), t("17:00")).unwrap(),
            ]
        );
    }

    #[test]
    fn test_overlapping_blocks_rejected() {
        let json = r#"{"days":[{"day":"mon","open":"09:00","close":"13:00"},{"day":"mon","open":"12:00","close":"17:00"}]}"#;
        assert!(WeeklyHours::from_json(json).is_err());

        // Touching blocks are fine
        let json = r#"{"days":[{"day":"mon","open":"09:00","close":"12:00"},{"day":"mon","open":"12:00","close":"17:00"}]}"#;
        assert!(WeeklyHours::from_json(json).is_ok());
    }

    #[test]
    fn test_intersect() {
        let a = OpenInterval::new(t("09:00"), t("17:00")).unwrap();
        let b = OpenInterval::new(t("12:00"), t("20:00")).unwrap();
        assert_eq!(a.intersect(&b), OpenInterval::new(t("12:00"), t("17:00")));

        let c = OpenInterval::new(t("17:00"), t("19:00")).unwrap();
        assert!(a.intersect(&c).is_none());
    }
}
