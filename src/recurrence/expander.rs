use super::rule::{ExpansionError, Recurrence};
use crate::occurrence_store::Occurrence;
use chrono::{DateTime, NaiveDate, Utc};

/// Expand `base` into the additional occurrences of a series.
///
/// Starting from the base event's date, the rule is applied repeatedly and an
/// occurrence is emitted for every stepped date on or before `until`. The base
/// event itself is not part of the output. Occurrence indices start at 1.
///
/// An unknown `repeats` value yields no occurrences.
pub fn expand_series(
    base: &Occurrence,
    repeats: &str,
    until: NaiveDate,
    series_id: &str,
) -> Result<Vec<Occurrence>, ExpansionError> {
    let Some(rule) = Recurrence::parse(repeats) else {
        return Ok(Vec::new());
    };

    let mut occurrences = Vec::new();
    let mut current = base.date;
    loop {
        let next = rule.step(current)?;
        if next > until {
            break;
        }
        let index = occurrences.len() as u32 + 1;
        occurrences.push(occurrence_on(base, next, series_id, index));
        current = next;
    }

    Ok(occurrences)
}

fn occurrence_on(base: &Occurrence, date: NaiveDate, series_id: &str, index: u32) -> Occurrence {
    Occurrence {
        id: uuid::Uuid::new_v4().to_string(),
        date,
        start_time: reanchor(base.start_time, date),
        end_time: reanchor(base.end_time, date),
        series_id: Some(series_id.to_string()),
        occurrence_index: Some(index),
        ..base.clone()
    }
}

/// Move `timestamp` onto `date`, keeping its time of day.
fn reanchor(timestamp: DateTime<Utc>, date: NaiveDate) -> DateTime<Utc> {
    date.and_time(timestamp.time()).and_utc()
}
