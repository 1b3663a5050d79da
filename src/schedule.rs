//! Cron expression parsing and matching for the recurring trigger
//!
//! Supports the classic five-field form (minute, hour, day-of-month, month,
//! day-of-week) with `*`, lists, ranges, and `/step` modifiers. Expressions
//! are validated when parsed, so a bad schedule is rejected when the trigger
//! starts instead of silently never firing.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Local, Timelike};

use crate::error::Error;

/// A parsed five-field cron expression, evaluated in local time
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CronExpr {
    minute: CronField,
    hour: CronField,
    day_of_month: CronField,
    month: CronField,
    day_of_week: CronField,
}

/// One field of a cron expression
///
/// `None` means the field was `*` (unrestricted); otherwise the set holds
/// every value the field accepts. The distinction matters for the standard
/// day-of-month/day-of-week rule: when both are restricted, a date matches
/// if *either* does.
#[derive(Clone, Debug, PartialEq, Eq)]
struct CronField(Option<BTreeSet<u8>>);

impl CronField {
    fn is_restricted(&self) -> bool {
        self.0.is_some()
    }

    fn contains(&self, value: u8) -> bool {
        match &self.0 {
            None => true,
            Some(values) => values.contains(&value),
        }
    }
}

impl CronExpr {
    /// Parse a five-field cron expression
    pub fn parse(expression: &str) -> Result<Self, Error> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(Error::InvalidSchedule(format!(
                "expected 5 fields, got {}: '{}'",
                fields.len(),
                expression
            )));
        }

        let mut day_of_week = parse_field(fields[4], 0, 7)?;
        // Both 0 and 7 mean Sunday; normalize to 0.
        if let Some(values) = &mut day_of_week.0 {
            if values.remove(&7) {
                values.insert(0);
            }
        }

        Ok(Self {
            minute: parse_field(fields[0], 0, 59)?,
            hour: parse_field(fields[1], 0, 23)?,
            day_of_month: parse_field(fields[2], 1, 31)?,
            month: parse_field(fields[3], 1, 12)?,
            day_of_week,
        })
    }

    /// Whether the expression fires at the given instant (minute resolution)
    pub fn matches(&self, at: &DateTime<Local>) -> bool {
        if !self.minute.contains(at.minute() as u8)
            || !self.hour.contains(at.hour() as u8)
            || !self.month.contains(at.month() as u8)
        {
            return false;
        }

        let dom = self.day_of_month.contains(at.day() as u8);
        let dow = self
            .day_of_week
            .contains(at.weekday().num_days_from_sunday() as u8);

        // Standard cron rule: when both day fields are restricted, either
        // may satisfy the expression.
        if self.day_of_month.is_restricted() && self.day_of_week.is_restricted() {
            dom || dow
        } else {
            dom && dow
        }
    }
}

impl FromStr for CronExpr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CronExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let field = |field: &CronField| match &field.0 {
            None => "*".to_string(),
            Some(values) => values
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(","),
        };
        write!(
            f,
            "{} {} {} {} {}",
            field(&self.minute),
            field(&self.hour),
            field(&self.day_of_month),
            field(&self.month),
            field(&self.day_of_week)
        )
    }
}

fn parse_field(text: &str, min: u8, max: u8) -> Result<CronField, Error> {
    if text == "*" {
        return Ok(CronField(None));
    }

    let mut values = BTreeSet::new();
    for part in text.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u8 = step
                    .parse()
                    .map_err(|_| Error::InvalidSchedule(format!("bad step in '{part}'")))?;
                if step == 0 {
                    return Err(Error::InvalidSchedule(format!("zero step in '{part}'")));
                }
                (range, step)
            }
            None => (part, 1),
        };

        let (start, end) = if range == "*" {
            (min, max)
        } else if let Some((a, b)) = range.split_once('-') {
            let start = parse_value(a, min, max)?;
            let end = parse_value(b, min, max)?;
            if start > end {
                return Err(Error::InvalidSchedule(format!(
                    "inverted range '{range}'"
                )));
            }
            (start, end)
        } else {
            let value = parse_value(range, min, max)?;
            (value, value)
        };

        let mut v = start;
        while v <= end {
            values.insert(v);
            match v.checked_add(step) {
                Some(next) => v = next,
                None => break,
            }
        }
    }

    if values.is_empty() {
        return Err(Error::InvalidSchedule(format!("empty field '{text}'")));
    }
    Ok(CronField(Some(values)))
}

fn parse_value(text: &str, min: u8, max: u8) -> Result<u8, Error> {
    let value: u8 = text
        .parse()
        .map_err(|_| Error::InvalidSchedule(format!("not a number: '{text}'")))?;
    if value < min || value > max {
        return Err(Error::InvalidSchedule(format!(
            "value {value} out of range {min}-{max}"
        )));
    }
    Ok(value)
}
