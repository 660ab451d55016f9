use chrono::{Datelike, Days, Months, NaiveDate};
use thiserror::Error;

/// Errors that can occur while expanding a series.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpansionError {
    /// Adding a month would land on a day that does not exist (e.g. Jan 31 -> Feb).
    #[error("Cannot advance {from} by one month: day {day} does not exist in the following month")]
    InvalidMonthlyShift { from: NaiveDate, day: u32 },

    #[error("Date out of range when advancing {0}")]
    DateOutOfRange(NaiveDate),
}

/// Recurrence rule of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recurrence {
    Daily,
    Weekly,
    Monthly,
}

impl Recurrence {
    /// Parse a rule name as stored on events and job payloads.
    ///
    /// Names are matched exactly; anything else is not a recurrence.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Daily" => Some(Recurrence::Daily),
            "Weekly" => Some(Recurrence::Weekly),
            "Monthly" => Some(Recurrence::Monthly),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Recurrence::Daily => "Daily",
            Recurrence::Weekly => "Weekly",
            Recurrence::Monthly => "Monthly",
        }
    }

    /// The date one step after `date`.
    ///
    /// Monthly steps keep the day of month and fail rather than clamp or roll
    /// over when the next month is too short.
    pub fn step(&self, date: NaiveDate) -> Result<NaiveDate, ExpansionError> {
        match self {
            Recurrence::Daily => date
                .checked_add_days(Days::new(1))
                .ok_or(ExpansionError::DateOutOfRange(date)),
            Recurrence::Weekly => date
                .checked_add_days(Days::new(7))
                .ok_or(ExpansionError::DateOutOfRange(date)),
            Recurrence::Monthly => {
                let next = date
                    .checked_add_months(Months::new(1))
                    .ok_or(ExpansionError::DateOutOfRange(date))?;
                if next.day() != date.day() {
                    return Err(ExpansionError::InvalidMonthlyShift {
                        from: date,
                        day: date.day(),
                    });
                }
                Ok(next)
            }
        }
    }
}

impl std::fmt::Display for Recurrence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
