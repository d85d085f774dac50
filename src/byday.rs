//! "On this day" lookup: the documents captured on a calendar day of any
//! year, plus the nearest earlier and later days that have documents.
//!
//! Days are numbered on the fixed leap-year calendar of
//! [`day_of_year`](crate::metadata::datetime::day_of_year), so neighbours wrap
//! around the year: the day after the last available day is the first
//! available day, and the other way round.

use serde::Serialize;

use crate::metadata::datetime::{day_of_year, month_day};
use crate::store::{DocumentStore, Predicate, Query, SortOrder, StoreError};
use crate::types::Media;

/// A calendar day without a year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MonthDay {
    pub month: u32,
    pub day: u32,
}

impl MonthDay {
    fn of(day_of_year: u16) -> Self {
        let (month, day) = month_day(day_of_year);
        Self { month, day }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ByDay {
    pub month: u32,
    pub day: u32,
    /// Newest first.
    pub matches: Vec<Media>,
    pub previous: Option<MonthDay>,
    pub next: Option<MonthDay>,
}

pub fn by_day(store: &dyn DocumentStore, month: u32, day: u32) -> Result<ByDay, StoreError> {
    let target = day_of_year(month, day);

    let matches = store.query(
        &Query::new()
            .filter(Predicate::DayOfYearEquals(target))
            .sort(SortOrder::DateTimeDescending),
    )?;

    Ok(ByDay {
        month,
        day,
        matches,
        previous: previous_day(store, target)?,
        next: next_day(store, target)?,
    })
}

fn first_day(store: &dyn DocumentStore, predicate: Predicate, order: SortOrder) -> Result<Option<u16>, StoreError> {
    Ok(store
        .query(&Query::new().filter(predicate).sort(order).limit(1))?
        .first()
        .map(|m| m.dayofyear))
}

/// The first day strictly after `target`, wrapping to the start of the year.
fn next_day(store: &dyn DocumentStore, target: u16) -> Result<Option<MonthDay>, StoreError> {
    let day = match first_day(store, Predicate::DayOfYearAfter(target), SortOrder::DayOfYearAscending)? {
        Some(day) => Some(day),
        None => first_day(store, Predicate::DayOfYearAfter(0), SortOrder::DayOfYearAscending)?,
    };
    Ok(day.map(MonthDay::of))
}

/// The last day strictly before `target`, wrapping to the end of the year.
fn previous_day(store: &dyn DocumentStore, target: u16) -> Result<Option<MonthDay>, StoreError> {
    let day = match first_day(store, Predicate::DayOfYearBefore(target), SortOrder::DayOfYearDescending)? {
        Some(day) => Some(day),
        None => first_day(store, Predicate::DayOfYearBefore(367), SortOrder::DayOfYearDescending)?,
    };
    Ok(day.map(MonthDay::of))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::JsonDocumentStore;
    use crate::test_helpers::media_at;

    fn store_with_days(days: &[u16]) -> JsonDocumentStore {
        let store = JsonDocumentStore::in_memory();
        for (i, day) in days.iter().enumerate() {
            store
                .put(&media_at(&format!("1\\{i}.jpg"), &format!("s{i}"), *day))
                .unwrap();
        }
        store
    }

    fn md(month: u32, day: u32) -> Option<MonthDay> {
        Some(MonthDay { month, day })
    }

    #[test]
    fn neighbours_inside_the_year() {
        let store = store_with_days(&[10, 60, 61, 200]);
        let result = by_day(&store, 3, 1).unwrap();
        assert_eq!(result.matches.len(), 1);
        assert_eq!(result.previous, md(2, 29));
        assert_eq!(result.next, md(7, 18));
    }

    #[test]
    fn after_last_day_wraps_to_first() {
        let store = store_with_days(&[10, 366]);
        let result = by_day(&store, 12, 31).unwrap();
        assert_eq!(result.next, md(1, 10));
        assert_eq!(result.previous, md(1, 10));
    }

    #[test]
    fn before_first_day_wraps_to_last() {
        let store = store_with_days(&[1, 366]);
        let result = by_day(&store, 1, 1).unwrap();
        assert_eq!(result.previous, md(12, 31));
        assert_eq!(result.next, md(12, 31));
    }

    #[test]
    fn only_day_is_its_own_neighbour() {
        let store = store_with_days(&[100]);
        let (month, day) = month_day(100);
        let result = by_day(&store, month, day).unwrap();
        assert_eq!(result.previous, md(month, day));
        assert_eq!(result.next, md(month, day));
    }

    #[test]
    fn empty_store_has_no_neighbours() {
        let result = by_day(&JsonDocumentStore::in_memory(), 5, 5).unwrap();
        assert!(result.matches.is_empty());
        assert_eq!(result.previous, None);
        assert_eq!(result.next, None);
    }

    #[test]
    fn matches_are_newest_first() {
        let store = JsonDocumentStore::in_memory();
        let mut old = media_at("1\\old.jpg", "a", 50);
        old.datetime = chrono::DateTime::parse_from_rfc3339("2001-02-19T10:00:00+00:00").unwrap();
        let mut new = media_at("1\\new.jpg", "b", 50);
        new.datetime = chrono::DateTime::parse_from_rfc3339("2019-02-19T10:00:00+00:00").unwrap();
        store.put(&old).unwrap();
        store.put(&new).unwrap();

        let result = by_day(&store, 2, 19).unwrap();
        let paths: Vec<&str> = result.matches.iter().map(|m| m.path.as_str()).collect();
        assert_eq!(paths, vec!["1\\new.jpg", "1\\old.jpg"]);
    }
}
