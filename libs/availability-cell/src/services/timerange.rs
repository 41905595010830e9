use chrono::{Datelike, Duration, NaiveDate};

use crate::error::AvailabilityError;
use crate::models::{DayOfWeek, TimeRange, TimeSlot, MINUTES_PER_DAY};

/// Sorts one day's slots by start and rejects malformed or overlapping
/// entries. The returned list is sorted ascending and pairwise disjoint.
pub fn normalize_slots(slots: &[TimeSlot]) -> Result<Vec<TimeSlot>, AvailabilityError> {
    let mut sorted = slots.to_vec();
    sorted.sort_by_key(|slot| (slot.start_minute, slot.end_minute));

    for slot in &sorted {
        if slot.start_minute >= slot.end_minute {
            return Err(AvailabilityError::InvalidSlot(format!(
                "slot start {} must be before end {}",
                slot.start_minute, slot.end_minute
            )));
        }
        if slot.end_minute > MINUTES_PER_DAY {
            return Err(AvailabilityError::InvalidSlot(format!(
                "slot end {} exceeds minutes in a day",
                slot.end_minute
            )));
        }
    }

    for pair in sorted.windows(2) {
        if pair[1].start_minute < pair[0].end_minute {
            return Err(AvailabilityError::InvalidSlot(format!(
                "slots {}-{} and {}-{} overlap",
                pair[0].start_minute, pair[0].end_minute, pair[1].start_minute, pair[1].end_minute
            )));
        }
    }

    Ok(sorted)
}

/// Coalesces possibly-overlapping absolute ranges into the minimal sorted
/// set of disjoint ranges with the same union. Touching ranges are merged.
pub fn merge_ranges(mut ranges: Vec<TimeRange>) -> Vec<TimeRange> {
    if ranges.is_empty() {
        return ranges;
    }

    ranges.sort_by_key(|range| range.start);

    let mut merged: Vec<TimeRange> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(last) if range.start <= last.end => {
                if range.end > last.end {
                    last.end = range.end;
                }
            }
            _ => merged.push(range),
        }
    }

    merged
}

/// Interval difference: removes every portion of `busy` from `base`. Both
/// inputs must be sorted and disjoint (use `merge_ranges` first). The output
/// is sorted, disjoint, a subset of the extent of `base`, and never contains
/// zero-length ranges.
pub fn subtract_ranges(base: &[TimeRange], busy: &[TimeRange]) -> Vec<TimeRange> {
    let mut free = Vec::new();
    let mut i = 0;

    for range in base {
        let mut cursor = range.start;

        // Busy intervals that ended before this range can never matter again.
        while i < busy.len() && busy[i].end <= cursor {
            i += 1;
        }

        let mut j = i;
        while j < busy.len() && busy[j].start < range.end {
            let block = &busy[j];
            if block.start > cursor {
                free.push(TimeRange::new(cursor, block.start));
            }
            if block.end >= range.end {
                cursor = range.end;
                break;
            }
            if block.end > cursor {
                cursor = block.end;
            }
            j += 1;
        }

        if cursor < range.end {
            free.push(TimeRange::new(cursor, range.end));
        }
    }

    free
}

/// Normalizes a date to the start of its week: the greatest date `<= date`
/// whose weekday equals `week_start_day`. Every date within one calendar
/// week maps to the same result.
pub fn week_start_for(date: NaiveDate, week_start_day: DayOfWeek) -> NaiveDate {
    let offset = (date.weekday().num_days_from_monday() + 7
        - week_start_day.to_weekday().num_days_from_monday())
        % 7;
    date - Duration::days(offset as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, hour, minute, 0).unwrap()
    }

    fn range(start_h: u32, start_m: u32, end_h: u32, end_m: u32) -> TimeRange {
        TimeRange::new(at(start_h, start_m), at(end_h, end_m))
    }

    fn total_minutes(ranges: &[TimeRange]) -> i64 {
        ranges.iter().map(|r| r.duration().num_minutes()).sum()
    }

    #[test]
    fn normalize_sorts_slots() {
        let slots = vec![TimeSlot::new(840, 1020), TimeSlot::new(540, 720)];
        let normalized = normalize_slots(&slots).unwrap();
        assert_eq!(
            normalized,
            vec![TimeSlot::new(540, 720), TimeSlot::new(840, 1020)]
        );
    }

    #[test]
    fn normalize_rejects_reversed_slot() {
        let result = normalize_slots(&[TimeSlot::new(720, 540)]);
        assert_matches!(result, Err(AvailabilityError::InvalidSlot(_)));
    }

    #[test]
    fn normalize_rejects_out_of_bounds_end() {
        let result = normalize_slots(&[TimeSlot::new(1200, 1500)]);
        assert_matches!(result, Err(AvailabilityError::InvalidSlot(_)));
    }

    #[test]
    fn normalize_rejects_overlapping_slots() {
        let result = normalize_slots(&[TimeSlot::new(540, 720), TimeSlot::new(700, 800)]);
        assert_matches!(result, Err(AvailabilityError::InvalidSlot(_)));
    }

    #[test]
    fn normalize_accepts_touching_slots() {
        let slots = vec![TimeSlot::new(540, 720), TimeSlot::new(720, 900)];
        assert_eq!(normalize_slots(&slots).unwrap(), slots);
    }

    #[test]
    fn normalize_accepts_full_day_slot() {
        let slots = vec![TimeSlot::new(0, MINUTES_PER_DAY)];
        assert_eq!(normalize_slots(&slots).unwrap(), slots);
    }

    #[test]
    fn merge_coalesces_overlapping_ranges() {
        let merged = merge_ranges(vec![range(9, 0, 12, 0), range(11, 0, 14, 0)]);
        assert_eq!(merged, vec![range(9, 0, 14, 0)]);
    }

    #[test]
    fn merge_coalesces_touching_ranges() {
        let merged = merge_ranges(vec![range(9, 0, 12, 0), range(12, 0, 13, 0)]);
        assert_eq!(merged, vec![range(9, 0, 13, 0)]);
    }

    #[test]
    fn merge_swallows_contained_and_duplicate_ranges() {
        let merged = merge_ranges(vec![
            range(9, 0, 17, 0),
            range(10, 0, 11, 0),
            range(9, 0, 17, 0),
        ]);
        assert_eq!(merged, vec![range(9, 0, 17, 0)]);
    }

    #[test]
    fn merge_keeps_disjoint_ranges_sorted() {
        let merged = merge_ranges(vec![range(14, 0, 15, 0), range(9, 0, 10, 0)]);
        assert_eq!(merged, vec![range(9, 0, 10, 0), range(14, 0, 15, 0)]);
    }

    #[test]
    fn merge_preserves_union_duration() {
        let inputs = vec![range(9, 0, 12, 0), range(11, 0, 14, 0), range(16, 0, 17, 0)];
        let merged = merge_ranges(inputs);
        assert_eq!(total_minutes(&merged), 5 * 60 + 60);
    }

    #[test]
    fn subtract_interior_block_splits_range() {
        let free = subtract_ranges(&[range(9, 0, 17, 0)], &[range(12, 0, 13, 0)]);
        assert_eq!(free, vec![range(9, 0, 12, 0), range(13, 0, 17, 0)]);
    }

    #[test]
    fn subtract_full_cover_removes_range_entirely() {
        let free = subtract_ranges(&[range(9, 0, 17, 0)], &[range(9, 0, 17, 0)]);
        assert!(free.is_empty());
    }

    #[test]
    fn subtract_disjoint_busy_leaves_base_untouched() {
        let base = vec![range(9, 0, 12, 0)];
        let free = subtract_ranges(&base, &[range(13, 0, 14, 0)]);
        assert_eq!(free, base);
        assert_eq!(total_minutes(&free), total_minutes(&base));
    }

    #[test]
    fn subtract_trims_leading_and_trailing_overlap() {
        let free = subtract_ranges(
            &[range(9, 0, 17, 0)],
            &[range(8, 0, 10, 0), range(16, 0, 18, 0)],
        );
        assert_eq!(free, vec![range(10, 0, 16, 0)]);
    }

    #[test]
    fn subtract_busy_spanning_two_base_ranges() {
        let free = subtract_ranges(
            &[range(9, 0, 12, 0), range(13, 0, 17, 0)],
            &[range(11, 0, 14, 0)],
        );
        assert_eq!(free, vec![range(9, 0, 11, 0), range(14, 0, 17, 0)]);
    }

    #[test]
    fn subtract_never_increases_duration() {
        let base = vec![range(9, 0, 12, 0), range(13, 0, 17, 0)];
        let busy = vec![range(10, 0, 10, 30), range(11, 0, 15, 0)];
        let free = subtract_ranges(&base, &busy);
        assert!(total_minutes(&free) <= total_minutes(&base));
    }

    #[test]
    fn subtract_emits_no_zero_length_artifacts() {
        // Busy exactly matching the tail of the base range.
        let free = subtract_ranges(&[range(9, 0, 17, 0)], &[range(15, 0, 17, 0)]);
        assert_eq!(free, vec![range(9, 0, 15, 0)]);
        assert!(free.iter().all(|r| r.start < r.end));
    }

    #[test]
    fn week_start_monday_convention() {
        // 2025-03-13 is a Thursday.
        let date = NaiveDate::from_ymd_opt(2025, 3, 13).unwrap();
        let expected = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        assert_eq!(week_start_for(date, DayOfWeek::Monday), expected);
    }

    #[test]
    fn week_start_non_monday_convention() {
        // Sunday-start weeks: Thursday 2025-03-13 belongs to the week of Sunday 2025-03-09.
        let date = NaiveDate::from_ymd_opt(2025, 3, 13).unwrap();
        let expected = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        assert_eq!(week_start_for(date, DayOfWeek::Sunday), expected);
    }

    #[test]
    fn week_start_is_stable_across_the_week() {
        let monday = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        for offset in 0..7 {
            let date = monday + Duration::days(offset);
            assert_eq!(week_start_for(date, DayOfWeek::Monday), monday);
        }
    }

    #[test]
    fn week_start_is_idempotent() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 13).unwrap();
        let start = week_start_for(date, DayOfWeek::Wednesday);
        assert_eq!(week_start_for(start, DayOfWeek::Wednesday), start);
    }
}
