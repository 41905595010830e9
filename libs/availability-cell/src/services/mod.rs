pub mod base_availability;
pub mod occupancy;
pub mod resolver;
pub mod schedule_settings;
pub mod timerange;
pub mod weekly_override;

pub use base_availability::BaseAvailabilityService;
pub use occupancy::OccupancyService;
pub use resolver::AvailabilityResolver;
pub use schedule_settings::ScheduleSettingsService;
pub use weekly_override::WeeklyOverrideService;
