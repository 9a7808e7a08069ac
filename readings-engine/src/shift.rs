use std::{fmt, str::FromStr};

use time::{util::days_in_year_month, Date, Duration, Month};

use crate::{
    error::EngineError,
    interval::{Span, Timestamp},
};

const SECONDS_PER_DAY: i64 = 86_400;

/// Calendar offset parsed from an ISO-8601 duration (`P7D`, `P1M`, `PT12H`, ...).
///
/// Years and months move along the calendar; everything else is exact seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CalendarShift {
    months: i64,
    seconds: i64,
}

impl CalendarShift {
    pub fn days(days: i64) -> Self {
        Self {
            months: 0,
            seconds: days * SECONDS_PER_DAY,
        }
    }

    pub fn months(months: i64) -> Self {
        Self { months, seconds: 0 }
    }

    pub fn is_zero(&self) -> bool {
        self.months == 0 && self.seconds == 0
    }

    /// `ts` moved back by this shift. Day-of-month is clamped when the target
    /// month is shorter (2022-03-31 minus one month is 2022-02-28).
    pub fn subtract_from(&self, ts: Timestamp) -> Result<Timestamp, EngineError> {
        let out_of_range = || {
            EngineError::InvalidDuration(format!("shift {self} moves {ts} out of range"))
        };

        let date = ts.date();
        let month_index = i64::from(date.year()) * 12 + i64::from(u8::from(date.month())) - 1
            - self.months;
        let year = i32::try_from(month_index.div_euclid(12)).map_err(|_| out_of_range())?;
        let month_number = (month_index.rem_euclid(12) + 1) as u8;
        let month = Month::try_from(month_number).map_err(|_| out_of_range())?;
        let day = date.day().min(days_in_year_month(year, month));
        let shifted_date = Date::from_calendar_date(year, month, day).map_err(|_| out_of_range())?;

        ts.replace_date(shifted_date)
            .checked_sub(Duration::seconds(self.seconds))
            .ok_or_else(out_of_range)
    }

    pub fn shift_span_back(&self, span: &Span) -> Result<Span, EngineError> {
        Span::new(self.subtract_from(span.start)?, self.subtract_from(span.end)?)
    }
}

impl FromStr for CalendarShift {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |why: &str| EngineError::InvalidDuration(format!("'{s}': {why}"));

        let text = s.trim().to_ascii_uppercase();
        let body = text
            .strip_prefix('P')
            .ok_or_else(|| invalid("must start with 'P'"))?;

        let mut months: i64 = 0;
        let mut seconds: i64 = 0;
        let mut in_time = false;
        let mut saw_component = false;
        let mut saw_time_component = false;
        let mut digits = String::new();

        for ch in body.chars() {
            match ch {
                '0'..='9' => digits.push(ch),
                'T' if !in_time && digits.is_empty() => in_time = true,
                unit => {
                    if digits.is_empty() {
                        return Err(invalid("designator without a number"));
                    }
                    let n: i64 = digits.parse().map_err(|_| invalid("number too large"))?;
                    digits.clear();
                    let add = match (in_time, unit) {
                        (false, 'Y') => {
                            months = months.checked_add(n.checked_mul(12).ok_or_else(|| invalid("overflow"))?)
                                .ok_or_else(|| invalid("overflow"))?;
                            Some(0)
                        }
                        (false, 'M') => {
                            months = months.checked_add(n).ok_or_else(|| invalid("overflow"))?;
                            Some(0)
                        }
                        (false, 'W') => n.checked_mul(7 * SECONDS_PER_DAY),
                        (false, 'D') => n.checked_mul(SECONDS_PER_DAY),
                        (true, 'H') => n.checked_mul(3600),
                        (true, 'M') => n.checked_mul(60),
                        (true, 'S') => Some(n),
                        _ => return Err(invalid("unexpected designator")),
                    }
                    .ok_or_else(|| invalid("overflow"))?;
                    seconds = seconds.checked_add(add).ok_or_else(|| invalid("overflow"))?;
                    saw_component = true;
                    saw_time_component |= in_time;
                }
            }
        }

        if !digits.is_empty() {
            return Err(invalid("number without a designator"));
        }
        if !saw_component || (in_time && !saw_time_component) {
            return Err(invalid("no duration components"));
        }

        Ok(Self { months, seconds })
    }
}

impl fmt::Display for CalendarShift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return f.write_str("PT0S");
        }
        f.write_str("P")?;
        let (years, months) = (self.months / 12, self.months % 12);
        if years != 0 {
            write!(f, "{years}Y")?;
        }
        if months != 0 {
            write!(f, "{months}M")?;
        }
        let days = self.seconds / SECONDS_PER_DAY;
        let rest = self.seconds % SECONDS_PER_DAY;
        if days != 0 {
            write!(f, "{days}D")?;
        }
        if rest != 0 {
            f.write_str("T")?;
            let (h, m, s) = (rest / 3600, (rest % 3600) / 60, rest % 60);
            if h != 0 {
                write!(f, "{h}H")?;
            }
            if m != 0 {
                write!(f, "{m}M")?;
            }
            if s != 0 {
                write!(f, "{s}S")?;
            }
        }
        Ok(())
    }
}
