//! Gender access policies for locations, with weekly time-based schedules.

use std::sync::Arc;

use chrono::{Datelike, NaiveDateTime, NaiveTime, Weekday};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use liyaqa_core::error::ensure;
use liyaqa_core::{Gender, LiyaqaError, LiyaqaResult, LocalizedText};

use crate::organization::{Location, OrganizationService};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GenderPolicy {
    Mixed,
    MaleOnly,
    FemaleOnly,
    /// Gender alternates by weekly schedule; closed outside it.
    TimeBased,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenderSchedule {
    pub id: Uuid,
    pub location_id: Uuid,
    pub day_of_week: Weekday,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub gender: Gender,
}

impl GenderSchedule {
    fn covers(&self, day: Weekday, time: NaiveTime) -> bool {
        self.day_of_week == day && self.start_time <= time && time < self.end_time
    }

    fn overlaps(&self, other: &ScheduleInput) -> bool {
        self.day_of_week == other.day_of_week
            && self.start_time < other.end_time
            && other.start_time < self.end_time
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ScheduleInput {
    pub day_of_week: Weekday,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub gender: Gender,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccessDecision {
    pub allowed: bool,
    pub policy: GenderPolicy,
    pub current_gender: Option<Gender>,
    pub reason: Option<String>,
    pub schedule_end: Option<NaiveTime>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenderStatus {
    pub location_id: Uuid,
    pub policy: GenderPolicy,
    /// Gender admitted right now; `None` means mixed or closed.
    pub current_gender: Option<Gender>,
    pub schedule_end: Option<NaiveTime>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PolicyInfo {
    pub policy: GenderPolicy,
    pub name: LocalizedText,
}

#[derive(Clone)]
pub struct GenderPolicyService {
    organizations: OrganizationService,
    schedules: Arc<DashMap<Uuid, GenderSchedule>>,
}

impl std::fmt::Debug for GenderPolicyService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenderPolicyService")
            .field("schedules", &self.schedules.len())
            .finish()
    }
}

impl GenderPolicyService {
    pub fn new(organizations: OrganizationService) -> Self {
        Self {
            organizations,
            schedules: Arc::new(DashMap::new()),
        }
    }

    pub fn supported_policies() -> Vec<PolicyInfo> {
        vec![
            PolicyInfo {
                policy: GenderPolicy::Mixed,
                name: LocalizedText::new("Mixed", "مختلط"),
            },
            PolicyInfo {
                policy: GenderPolicy::MaleOnly,
                name: LocalizedText::new("Men only", "رجال فقط"),
            },
            PolicyInfo {
                policy: GenderPolicy::FemaleOnly,
                name: LocalizedText::new("Women only", "نساء فقط"),
            },
            PolicyInfo {
                policy: GenderPolicy::TimeBased,
                name: LocalizedText::new("Time-based", "حسب الجدول"),
            },
        ]
    }

    pub fn update_location_policy(&self, tenant_id: Uuid, location_id: Uuid, policy: GenderPolicy) -> LiyaqaResult<Location> {
        let location = self.organizations.set_gender_policy(tenant_id, location_id, policy)?;
        info!(location_id = %location_id, policy = ?policy, "Gender policy updated");
        Ok(location)
    }

    /// A location's schedules ordered by weekday (Monday first), then start.
    pub fn schedules(&self, tenant_id: Uuid, location_id: Uuid) -> LiyaqaResult<Vec<GenderSchedule>> {
        self.organizations.get_location(tenant_id, location_id)?;
        Ok(self.schedules_for(location_id))
    }

    pub fn add_schedule(&self, tenant_id: Uuid, location_id: Uuid, input: ScheduleInput) -> LiyaqaResult<GenderSchedule> {
        self.organizations.get_location(tenant_id, location_id)?;
        self.validate(location_id, &input, None)?;
        let schedule = GenderSchedule {
            id: Uuid::new_v4(),
            location_id,
            day_of_week: input.day_of_week,
            start_time: input.start_time,
            end_time: input.end_time,
            gender: input.gender,
        };
        self.schedules.insert(schedule.id, schedule.clone());
        Ok(schedule)
    }

    pub fn update_schedule(&self, tenant_id: Uuid, schedule_id: Uuid, input: ScheduleInput) -> LiyaqaResult<GenderSchedule> {
        let location_id = self.owned_schedule(tenant_id, schedule_id)?.location_id;
        self.validate(location_id, &input, Some(schedule_id))?;
        let mut schedule = self
            .schedules
            .get_mut(&schedule_id)
            .ok_or_else(|| LiyaqaError::not_found("Gender schedule", schedule_id))?;
        schedule.day_of_week = input.day_of_week;
        schedule.start_time = input.start_time;
        schedule.end_time = input.end_time;
        schedule.gender = input.gender;
        Ok(schedule.clone())
    }

    pub fn delete_schedule(&self, tenant_id: Uuid, schedule_id: Uuid) -> LiyaqaResult<()> {
        self.owned_schedule(tenant_id, schedule_id)?;
        self.schedules.remove(&schedule_id);
        Ok(())
    }

    /// Removes every schedule of a location, returning how many.
    pub fn delete_all(&self, tenant_id: Uuid, location_id: Uuid) -> LiyaqaResult<usize> {
        self.organizations.get_location(tenant_id, location_id)?;
        let before = self.schedules.len();
        self.schedules.retain(|_, s| s.location_id != location_id);
        Ok(before - self.schedules.len())
    }

    /// Whether a member of `gender` may enter at local time `at`.
    pub fn can_access_location(
        &self,
        tenant_id: Uuid,
        location_id: Uuid,
        gender: Gender,
        at: NaiveDateTime,
    ) -> LiyaqaResult<AccessDecision> {
        let status = self.current_status(tenant_id, location_id, at)?;
        let (allowed, reason) = match (status.policy, status.current_gender) {
            (GenderPolicy::Mixed, _) => (true, None),
            (GenderPolicy::TimeBased, None) => (
                false,
                Some("No gender session is scheduled at this time".to_string()),
            ),
            (_, Some(admitted)) if admitted == gender => (true, None),
            (_, Some(admitted)) => (
                false,
                Some(format!("Location is reserved for {admitted:?} members now")),
            ),
            (_, None) => (false, None),
        };
        Ok(AccessDecision {
            allowed,
            policy: status.policy,
            current_gender: status.current_gender,
            reason,
            schedule_end: status.schedule_end,
        })
    }

    pub fn current_status(&self, tenant_id: Uuid, location_id: Uuid, at: NaiveDateTime) -> LiyaqaResult<GenderStatus> {
        let location = self.organizations.get_location(tenant_id, location_id)?;
        let (current_gender, schedule_end) = match location.gender_policy {
            GenderPolicy::Mixed => (None, None),
            GenderPolicy::MaleOnly => (Some(Gender::Male), None),
            GenderPolicy::FemaleOnly => (Some(Gender::Female), None),
            GenderPolicy::TimeBased => {
                let day = at.date().weekday();
                let time = at.time();
                self.schedules
                    .iter()
                    .find(|s| s.location_id == location_id && s.covers(day, time))
                    .map_or((None, None), |s| (Some(s.gender), Some(s.end_time)))
            }
        };
        Ok(GenderStatus {
            location_id,
            policy: location.gender_policy,
            current_gender,
            schedule_end,
        })
    }

    fn schedules_for(&self, location_id: Uuid) -> Vec<GenderSchedule> {
        let mut found: Vec<GenderSchedule> = self
            .schedules
            .iter()
            .filter(|s| s.location_id == location_id)
            .map(|s| s.value().clone())
            .collect();
        found.sort_by_key(|s| (s.day_of_week.num_days_from_monday(), s.start_time));
        found
    }

    fn owned_schedule(&self, tenant_id: Uuid, schedule_id: Uuid) -> LiyaqaResult<GenderSchedule> {
        let schedule = self
            .schedules
            .get(&schedule_id)
            .map(|s| s.clone())
            .ok_or_else(|| LiyaqaError::not_found("Gender schedule", schedule_id))?;
        self.organizations
            .get_location(tenant_id, schedule.location_id)
            .map_err(|_| LiyaqaError::not_found("Gender schedule", schedule_id))?;
        Ok(schedule)
    }

    fn validate(&self, location_id: Uuid, input: &ScheduleInput, except: Option<Uuid>) -> LiyaqaResult<()> {
        ensure(input.start_time < input.end_time, "Start time must be before end time")?;
        let clash = self
            .schedules_for(location_id)
            .into_iter()
            .find(|s| Some(s.id) != except && s.overlaps(input));
        if let Some(existing) = clash {
            return Err(LiyaqaError::Conflict(format!(
                "Overlaps the {:?} {}-{} schedule",
                existing.day_of_week, existing.start_time, existing.end_time
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::organization::tests::location;
    use chrono::NaiveDate;

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    /// 2024-03-04 is a Monday.
    fn monday_at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap().and_time(time(h, m))
    }

    fn slot(day: Weekday, start: u32, end: u32, gender: Gender) -> ScheduleInput {
        ScheduleInput {
            day_of_week: day,
            start_time: time(start, 0),
            end_time: time(end, 0),
            gender,
        }
    }

    fn setup() -> (GenderPolicyService, Uuid, Uuid) {
        let orgs = OrganizationService::new();
        let tenant = Uuid::new_v4();
        let loc = location(&orgs, tenant);
        (GenderPolicyService::new(orgs), tenant, loc.id)
    }

    #[test]
    fn test_fixed_policies() {
        let (service, tenant, loc) = setup();
        let at = monday_at(10, 0);
        assert!(service.can_access_location(tenant, loc, Gender::Female, at).unwrap().allowed);

        service.update_location_policy(tenant, loc, GenderPolicy::MaleOnly).unwrap();
        assert!(service.can_access_location(tenant, loc, Gender::Male, at).unwrap().allowed);
        let denied = service.can_access_location(tenant, loc, Gender::Female, at).unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.current_gender, Some(Gender::Male));
        assert!(denied.reason.is_some());
    }

    #[test]
    fn test_time_based_schedule() {
        let (service, tenant, loc) = setup();
        service.update_location_policy(tenant, loc, GenderPolicy::TimeBased).unwrap();
        service.add_schedule(tenant, loc, slot(Weekday::Mon, 6, 12, Gender::Male)).unwrap();
        service.add_schedule(tenant, loc, slot(Weekday::Mon, 12, 18, Gender::Female)).unwrap();

        let morning = service.can_access_location(tenant, loc, Gender::Male, monday_at(9, 30)).unwrap();
        assert!(morning.allowed);
        assert_eq!(morning.schedule_end, Some(time(12, 0)));

        let noon = service.current_status(tenant, loc, monday_at(12, 0)).unwrap();
        assert_eq!(noon.current_gender, Some(Gender::Female));

        let night = service.can_access_location(tenant, loc, Gender::Female, monday_at(22, 0)).unwrap();
        assert!(!night.allowed);
        assert!(night.current_gender.is_none());
    }

    #[test]
    fn test_schedule_validation() {
        let (service, tenant, loc) = setup();
        assert!(matches!(
            service.add_schedule(tenant, loc, slot(Weekday::Tue, 12, 8, Gender::Male)).unwrap_err(),
            LiyaqaError::Validation(_)
        ));
        let first = service.add_schedule(tenant, loc, slot(Weekday::Tue, 8, 12, Gender::Male)).unwrap();
        assert!(matches!(
            service.add_schedule(tenant, loc, slot(Weekday::Tue, 11, 14, Gender::Female)).unwrap_err(),
            LiyaqaError::Conflict(_)
        ));
        assert!(service.add_schedule(tenant, loc, slot(Weekday::Wed, 11, 14, Gender::Female)).is_ok());
        // Moving a schedule within its own slot does not clash with itself.
        assert!(service.update_schedule(tenant, first.id, slot(Weekday::Tue, 9, 12, Gender::Male)).is_ok());
        assert!(service.update_schedule(Uuid::new_v4(), first.id, slot(Weekday::Tue, 9, 12, Gender::Male)).is_err());
    }

    #[test]
    fn test_listing_and_delete_all() {
        let (service, tenant, loc) = setup();
        service.add_schedule(tenant, loc, slot(Weekday::Wed, 8, 10, Gender::Male)).unwrap();
        service.add_schedule(tenant, loc, slot(Weekday::Mon, 14, 16, Gender::Female)).unwrap();
        service.add_schedule(tenant, loc, slot(Weekday::Mon, 8, 10, Gender::Male)).unwrap();
        let listed = service.schedules(tenant, loc).unwrap();
        assert_eq!(listed[0].day_of_week, Weekday::Mon);
        assert_eq!(listed[0].start_time, time(8, 0));
        assert_eq!(listed[2].day_of_week, Weekday::Wed);

        assert_eq!(service.delete_all(tenant, loc).unwrap(), 3);
        assert!(service.schedules(tenant, loc).unwrap().is_empty());
        assert_eq!(GenderPolicyService::supported_policies().len(), 4);
    }
}
