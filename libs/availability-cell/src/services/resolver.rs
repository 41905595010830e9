use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;

use crate::error::AvailabilityError;
use crate::models::{
    BaseAvailability, CurrentStatus, DayOfWeek, OrganisationSchedule, TimeRange, TimeSlot,
    WeeklyOverride,
};
use crate::services::base_availability::BaseAvailabilityService;
use crate::services::occupancy::OccupancyService;
use crate::services::schedule_settings::ScheduleSettingsService;
use crate::services::timerange::{merge_ranges, subtract_ranges, week_start_for};
use crate::services::weekly_override::WeeklyOverrideService;

/// Read-side composition of the three availability sources. Stateless:
/// every call is a fresh read of the stores followed by in-memory interval
/// arithmetic, so concurrent requests never contend.
pub struct AvailabilityResolver {
    settings: ScheduleSettingsService,
    base: BaseAvailabilityService,
    overrides: WeeklyOverrideService,
    occupancy: OccupancyService,
}

struct DayResolution {
    effective: Vec<TimeRange>,
    free: Vec<TimeRange>,
}

impl AvailabilityResolver {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            settings: ScheduleSettingsService::new(config),
            base: BaseAvailabilityService::new(config),
            overrides: WeeklyOverrideService::new(config),
            occupancy: OccupancyService::new(config),
        }
    }

    /// Open-and-unoccupied ranges for one date, sorted ascending. An empty
    /// list is a valid result meaning "no open time that day".
    pub async fn final_availability_for_date(
        &self,
        organisation_id: Uuid,
        user_id: Uuid,
        reference_date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<TimeRange>, AvailabilityError> {
        let schedule = self.settings.get(organisation_id, auth_token).await?;
        let resolution = self
            .resolve_day(&schedule, organisation_id, user_id, reference_date, auth_token)
            .await?;
        Ok(resolution.free)
    }

    /// Status of the staff member at this instant: inside a free range is
    /// AVAILABLE, inside an effective slot but occupied is BUSY, outside
    /// every effective slot is OFF.
    pub async fn current_status(
        &self,
        organisation_id: Uuid,
        user_id: Uuid,
        auth_token: &str,
    ) -> Result<CurrentStatus, AvailabilityError> {
        let schedule = self.settings.get(organisation_id, auth_token).await?;
        let tz = schedule.tz()?;

        let now = Utc::now();
        let today = now.with_timezone(&tz).date_naive();

        let resolution = self
            .resolve_day(&schedule, organisation_id, user_id, today, auth_token)
            .await?;

        Ok(classify_instant(now, &resolution.effective, &resolution.free))
    }

    async fn resolve_day(
        &self,
        schedule: &OrganisationSchedule,
        organisation_id: Uuid,
        user_id: Uuid,
        reference_date: NaiveDate,
        auth_token: &str,
    ) -> Result<DayResolution, AvailabilityError> {
        let tz = schedule.tz()?;
        let day = DayOfWeek::from_weekday(reference_date.weekday());
        let week_start = week_start_for(reference_date, schedule.week_start_day);

        let base = self
            .base
            .get(organisation_id, user_id, auth_token)
            .await?;
        let override_doc = self
            .overrides
            .get_normalized(organisation_id, user_id, week_start, auth_token)
            .await?;

        let slots = effective_slots(&base, override_doc.as_ref(), day);
        let effective = slots_to_ranges(reference_date, &slots, tz);

        let day_start = local_instant(reference_date, 0, tz);
        let day_end = local_instant(reference_date + Duration::days(1), 0, tz);

        let occupancies = self
            .occupancy
            .get_in_range(organisation_id, user_id, day_start, day_end, auth_token)
            .await?;
        let busy = merge_ranges(occupancies.iter().map(|o| o.time_range()).collect());

        let free = clip_to_window(subtract_ranges(&effective, &busy), day_start, day_end);

        debug!(
            "Resolved {} free range(s) for user {} on {} ({} effective slot(s), {} busy interval(s))",
            free.len(),
            user_id,
            reference_date,
            slots.len(),
            busy.len()
        );

        Ok(DayResolution { effective, free })
    }
}

/// Effective slots for one day: an override entry for the day, even an
/// empty one, completely replaces base; only an absent entry falls back.
fn effective_slots(
    base: &BaseAvailability,
    override_doc: Option<&WeeklyOverride>,
    day: DayOfWeek,
) -> Vec<TimeSlot> {
    if let Some(doc) = override_doc {
        if let Some(slots) = doc.days.get(&day) {
            return slots.clone();
        }
    }
    base.slots_for(day)
}

/// Maps a local minute-of-day on `date` to a UTC instant. Minutes at or past
/// 1440 roll into the next calendar day. Ambiguous local times (clock rolled
/// back) take the earlier instant; times inside a spring-forward gap shift
/// forward onto the valid side of the transition.
fn local_instant(date: NaiveDate, minute: u16, tz: Tz) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::MIN) + Duration::minutes(minute as i64);
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(instant) => instant.with_timezone(&Utc),
        LocalResult::Ambiguous(earlier, _) => earlier.with_timezone(&Utc),
        LocalResult::None => {
            let shifted = naive + Duration::hours(1);
            match tz.from_local_datetime(&shifted) {
                LocalResult::Single(instant) => instant.with_timezone(&Utc),
                LocalResult::Ambiguous(earlier, _) => earlier.with_timezone(&Utc),
                LocalResult::None => Utc.from_utc_datetime(&naive),
            }
        }
    }
}

/// Converts a day's effective slots into absolute UTC ranges anchored on
/// `date` in the organisation timezone. Slots collapsed by a DST gap are
/// dropped rather than emitted as empty ranges.
fn slots_to_ranges(date: NaiveDate, slots: &[TimeSlot], tz: Tz) -> Vec<TimeRange> {
    slots
        .iter()
        .filter_map(|slot| {
            let start = local_instant(date, slot.start_minute, tz);
            let end = local_instant(date, slot.end_minute, tz);
            (start < end).then_some(TimeRange::new(start, end))
        })
        .collect()
}

fn clip_to_window(
    ranges: Vec<TimeRange>,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Vec<TimeRange> {
    ranges
        .into_iter()
        .filter_map(|range| {
            let start = range.start.max(window_start);
            let end = range.end.min(window_end);
            (start < end).then_some(TimeRange::new(start, end))
        })
        .collect()
}

fn classify_instant(
    now: DateTime<Utc>,
    effective: &[TimeRange],
    free: &[TimeRange],
) -> CurrentStatus {
    if free.iter().any(|range| range.contains(now)) {
        CurrentStatus::Available
    } else if effective.iter().any(|range| range.contains(now)) {
        CurrentStatus::Busy
    } else {
        CurrentStatus::Off
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use chrono::TimeZone;

    fn base_with(day: DayOfWeek, slots: Vec<TimeSlot>) -> BaseAvailability {
        let mut base = BaseAvailability::empty(Uuid::new_v4(), Uuid::new_v4());
        base.days.insert(day, slots);
        base
    }

    fn override_with(days: BTreeMap<DayOfWeek, Vec<TimeSlot>>) -> WeeklyOverride {
        WeeklyOverride {
            organisation_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            week_start_date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            days,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn effective_slots_fall_back_to_base_without_override() {
        let base = base_with(DayOfWeek::Monday, vec![TimeSlot::new(540, 1020)]);
        let slots = effective_slots(&base, None, DayOfWeek::Monday);
        assert_eq!(slots, vec![TimeSlot::new(540, 1020)]);
    }

    #[test]
    fn effective_slots_override_day_replaces_base() {
        let base = base_with(DayOfWeek::Monday, vec![TimeSlot::new(540, 1020)]);
        let mut days = BTreeMap::new();
        days.insert(DayOfWeek::Monday, vec![TimeSlot::new(600, 720)]);
        let doc = override_with(days);

        let slots = effective_slots(&base, Some(&doc), DayOfWeek::Monday);
        assert_eq!(slots, vec![TimeSlot::new(600, 720)]);
    }

    #[test]
    fn effective_slots_empty_override_day_means_closed() {
        let base = base_with(DayOfWeek::Monday, vec![TimeSlot::new(540, 1020)]);
        let mut days = BTreeMap::new();
        days.insert(DayOfWeek::Monday, vec![]);
        let doc = override_with(days);

        let slots = effective_slots(&base, Some(&doc), DayOfWeek::Monday);
        assert!(slots.is_empty());
    }

    #[test]
    fn effective_slots_day_absent_from_override_uses_base() {
        let base = base_with(DayOfWeek::Tuesday, vec![TimeSlot::new(480, 960)]);
        let mut days = BTreeMap::new();
        days.insert(DayOfWeek::Monday, vec![]);
        let doc = override_with(days);

        let slots = effective_slots(&base, Some(&doc), DayOfWeek::Tuesday);
        assert_eq!(slots, vec![TimeSlot::new(480, 960)]);
    }

    #[test]
    fn slots_to_ranges_anchors_on_date_in_utc() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let ranges = slots_to_ranges(date, &[TimeSlot::new(540, 1020)], chrono_tz::UTC);
        assert_eq!(
            ranges,
            vec![TimeRange::new(
                Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2025, 3, 10, 17, 0, 0).unwrap(),
            )]
        );
    }

    #[test]
    fn slots_to_ranges_converts_local_wall_time() {
        // Berlin is UTC+1 in winter.
        let date = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
        let ranges = slots_to_ranges(date, &[TimeSlot::new(540, 600)], chrono_tz::Europe::Berlin);
        assert_eq!(
            ranges,
            vec![TimeRange::new(
                Utc.with_ymd_and_hms(2025, 1, 6, 8, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2025, 1, 6, 9, 0, 0).unwrap(),
            )]
        );
    }

    #[test]
    fn slots_to_ranges_full_day_slot_ends_at_next_midnight() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let ranges = slots_to_ranges(date, &[TimeSlot::new(0, 1440)], chrono_tz::UTC);
        assert_eq!(
            ranges,
            vec![TimeRange::new(
                Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2025, 3, 11, 0, 0, 0).unwrap(),
            )]
        );
    }

    #[test]
    fn slots_to_ranges_drops_slot_swallowed_by_dst_gap() {
        // Berlin springs forward on 2025-03-30: 02:00-03:00 local does not exist.
        let date = NaiveDate::from_ymd_opt(2025, 3, 30).unwrap();
        let ranges = slots_to_ranges(date, &[TimeSlot::new(120, 180)], chrono_tz::Europe::Berlin);
        assert!(ranges.is_empty());
    }

    #[test]
    fn classify_available_inside_free_range() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 10, 0, 0).unwrap();
        let effective = vec![TimeRange::new(
            Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 10, 17, 0, 0).unwrap(),
        )];
        let free = effective.clone();
        assert_eq!(classify_instant(now, &effective, &free), CurrentStatus::Available);
    }

    #[test]
    fn classify_busy_inside_slot_but_occupied() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 12, 30, 0).unwrap();
        let effective = vec![TimeRange::new(
            Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 10, 17, 0, 0).unwrap(),
        )];
        let free = vec![
            TimeRange::new(
                Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap(),
            ),
            TimeRange::new(
                Utc.with_ymd_and_hms(2025, 3, 10, 13, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2025, 3, 10, 17, 0, 0).unwrap(),
            ),
        ];
        assert_eq!(classify_instant(now, &effective, &free), CurrentStatus::Busy);
    }

    #[test]
    fn classify_off_outside_every_slot() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 20, 0, 0).unwrap();
        let effective = vec![TimeRange::new(
            Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 10, 17, 0, 0).unwrap(),
        )];
        assert_eq!(classify_instant(now, &effective, &[]), CurrentStatus::Off);
    }

    #[test]
    fn classify_off_when_no_slots_at_all() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
        assert_eq!(classify_instant(now, &[], &[]), CurrentStatus::Off);
    }

    #[test]
    fn clip_trims_to_window() {
        let window_start = Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap();
        let window_end = Utc.with_ymd_and_hms(2025, 3, 11, 0, 0, 0).unwrap();
        let clipped = clip_to_window(
            vec![TimeRange::new(
                Utc.with_ymd_and_hms(2025, 3, 9, 23, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2025, 3, 10, 1, 0, 0).unwrap(),
            )],
            window_start,
            window_end,
        );
        assert_eq!(
            clipped,
            vec![TimeRange::new(
                window_start,
                Utc.with_ymd_and_hms(2025, 3, 10, 1, 0, 0).unwrap(),
            )]
        );
    }

    #[test]
    fn clip_drops_range_outside_window() {
        let window_start = Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap();
        let window_end = Utc.with_ymd_and_hms(2025, 3, 11, 0, 0, 0).unwrap();
        let clipped = clip_to_window(
            vec![TimeRange::new(
                Utc.with_ymd_and_hms(2025, 3, 11, 9, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2025, 3, 11, 10, 0, 0).unwrap(),
            )],
            window_start,
            window_end,
        );
        assert!(clipped.is_empty());
    }
}
