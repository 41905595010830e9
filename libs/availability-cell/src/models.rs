use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AvailabilityError;

/// Minutes in one local calendar day; slot end is allowed to equal this.
pub const MINUTES_PER_DAY: u16 = 1440;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    pub const ALL: [DayOfWeek; 7] = [
        DayOfWeek::Monday,
        DayOfWeek::Tuesday,
        DayOfWeek::Wednesday,
        DayOfWeek::Thursday,
        DayOfWeek::Friday,
        DayOfWeek::Saturday,
        DayOfWeek::Sunday,
    ];

    pub fn from_weekday(weekday: Weekday) -> Self {
        match weekday {
            Weekday::Mon => DayOfWeek::Monday,
            Weekday::Tue => DayOfWeek::Tuesday,
            Weekday::Wed => DayOfWeek::Wednesday,
            Weekday::Thu => DayOfWeek::Thursday,
            Weekday::Fri => DayOfWeek::Friday,
            Weekday::Sat => DayOfWeek::Saturday,
            Weekday::Sun => DayOfWeek::Sunday,
        }
    }

    pub fn to_weekday(self) -> Weekday {
        match self {
            DayOfWeek::Monday => Weekday::Mon,
            DayOfWeek::Tuesday => Weekday::Tue,
            DayOfWeek::Wednesday => Weekday::Wed,
            DayOfWeek::Thursday => Weekday::Thu,
            DayOfWeek::Friday => Weekday::Fri,
            DayOfWeek::Saturday => Weekday::Sat,
            DayOfWeek::Sunday => Weekday::Sun,
        }
    }
}

/// An open interval within one local day, in minutes since local midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start_minute: u16,
    pub end_minute: u16,
}

impl TimeSlot {
    pub fn new(start_minute: u16, end_minute: u16) -> Self {
        Self {
            start_minute,
            end_minute,
        }
    }
}

/// An absolute half-open interval `[start, end)` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// Recurring weekly template for one staff member in one organisation.
/// Days absent from `days` are closed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseAvailability {
    pub organisation_id: Uuid,
    pub user_id: Uuid,
    pub days: BTreeMap<DayOfWeek, Vec<TimeSlot>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BaseAvailability {
    /// Template with every day closed, used when no row exists yet.
    pub fn empty(organisation_id: Uuid, user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            organisation_id,
            user_id,
            days: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn slots_for(&self, day: DayOfWeek) -> Vec<TimeSlot> {
        self.days.get(&day).cloned().unwrap_or_default()
    }

    /// All seven days in order, absent days reported as empty slot lists.
    pub fn day_templates(&self) -> Vec<DayTemplate> {
        DayOfWeek::ALL
            .iter()
            .map(|&day| DayTemplate {
                day_of_week: day,
                slots: self.slots_for(day),
            })
            .collect()
    }
}

/// Sparse week-specific exceptions to the base template. A day present with
/// an empty slot list is explicitly closed; a day absent from `days` falls
/// back to base.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyOverride {
    pub organisation_id: Uuid,
    pub user_id: Uuid,
    pub week_start_date: NaiveDate,
    pub days: BTreeMap<DayOfWeek, Vec<TimeSlot>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OccupancySource {
    Appointment,
    Block,
    Leave,
    Other,
}

/// One concrete busy interval in absolute time. Records for the same user
/// may overlap; the resolver treats the set as a union.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Occupancy {
    pub id: Uuid,
    pub organisation_id: Uuid,
    pub user_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub source_type: OccupancySource,
    pub reference_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Occupancy {
    pub fn time_range(&self) -> TimeRange {
        TimeRange::new(self.start_time, self.end_time)
    }
}

/// Per-organisation scheduling prerequisites: which weekday a week starts on
/// and the IANA timezone slot minutes are anchored in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganisationSchedule {
    pub organisation_id: Uuid,
    pub week_start_day: DayOfWeek,
    pub timezone: String,
}

impl OrganisationSchedule {
    pub fn tz(&self) -> Result<chrono_tz::Tz, AvailabilityError> {
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| AvailabilityError::UnknownTimezone(self.timezone.clone()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CurrentStatus {
    Available,
    Busy,
    Off,
}

// ==============================================================================
// REQUEST DTOS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayTemplate {
    pub day_of_week: DayOfWeek,
    pub slots: Vec<TimeSlot>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetBaseAvailabilityRequest {
    pub user_id: Option<Uuid>,
    pub availabilities: Vec<DayTemplate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateWeeklyOverrideRequest {
    pub user_id: Option<Uuid>,
    pub week_start_date: NaiveDate,
    pub overrides: BTreeMap<DayOfWeek, Vec<TimeSlot>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OccupancyInput {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub source_type: OccupancySource,
    pub reference_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOccupancyRequest {
    pub user_id: Option<Uuid>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub source_type: OccupancySource,
    pub reference_id: Option<String>,
}

impl CreateOccupancyRequest {
    pub fn into_input(self) -> OccupancyInput {
        OccupancyInput {
            start_time: self.start_time,
            end_time: self.end_time,
            source_type: self.source_type,
            reference_id: self.reference_id,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BulkOccupancyRequest {
    pub organisation_id: Uuid,
    pub user_id: Uuid,
    pub occupancies: Vec<OccupancyInput>,
}
