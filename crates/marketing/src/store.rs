use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::types::{
    Campaign, CampaignEnrollment, CampaignStep, EnrollmentStatus, MessageLog, TrackingPixel,
};

/// Shared in-memory tables for campaigns, steps, enrollments, message logs,
/// and tracking pixels. Cloning shares the underlying maps.
#[derive(Clone, Default)]
pub struct MarketingStore {
    pub(crate) campaigns: Arc<DashMap<Uuid, Campaign>>,
    pub(crate) steps: Arc<DashMap<Uuid, CampaignStep>>,
    pub(crate) enrollments: Arc<DashMap<Uuid, CampaignEnrollment>>,
    /// `(campaign_id, member_id)` of every Active enrollment.
    active_index: Arc<DashMap<(Uuid, Uuid), Uuid>>,
    pub(crate) message_logs: Arc<DashMap<Uuid, MessageLog>>,
    pub(crate) pixels: Arc<DashMap<String, TrackingPixel>>,
}

impl std::fmt::Debug for MarketingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketingStore")
            .field("campaigns", &self.campaigns.len())
            .field("steps", &self.steps.len())
            .field("enrollments", &self.enrollments.len())
            .field("message_logs", &self.message_logs.len())
            .finish()
    }
}

impl MarketingStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ─── Campaigns ──────────────────────────────────────────────────────

    pub fn campaign(&self, id: Uuid) -> Option<Campaign> {
        self.campaigns.get(&id).map(|c| c.clone())
    }

    pub fn campaigns_where(&self, pred: impl Fn(&Campaign) -> bool) -> Vec<Campaign> {
        let mut list: Vec<Campaign> = self
            .campaigns
            .iter()
            .filter(|c| pred(c.value()))
            .map(|c| c.clone())
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        list
    }

    // ─── Steps ──────────────────────────────────────────────────────────

    pub fn step(&self, id: Uuid) -> Option<CampaignStep> {
        self.steps.get(&id).map(|s| s.clone())
    }

    /// All steps of a campaign ordered by step number then variant.
    pub fn steps_for(&self, campaign_id: Uuid) -> Vec<CampaignStep> {
        let mut steps: Vec<CampaignStep> = self
            .steps
            .iter()
            .filter(|s| s.campaign_id == campaign_id)
            .map(|s| s.clone())
            .collect();
        steps.sort_by_key(|s| (s.step_number, s.ab_variant));
        steps
    }

    pub fn active_steps_for(&self, campaign_id: Uuid) -> Vec<CampaignStep> {
        self.steps_for(campaign_id)
            .into_iter()
            .filter(|s| s.is_active)
            .collect()
    }

    // ─── Enrollments ────────────────────────────────────────────────────

    pub fn enrollment(&self, id: Uuid) -> Option<CampaignEnrollment> {
        self.enrollments.get(&id).map(|e| e.clone())
    }

    /// Inserts `enrollment` unless the member already holds an Active
    /// enrollment in the same campaign. Returns `false` on conflict.
    pub(crate) fn insert_active_enrollment(&self, enrollment: CampaignEnrollment) -> bool {
        match self
            .active_index
            .entry((enrollment.campaign_id, enrollment.member_id))
        {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(enrollment.id);
                self.enrollments.insert(enrollment.id, enrollment);
                true
            }
        }
    }

    /// Writes back a transition of an Active enrollment, keeping the
    /// active index in sync. Returns `false` without writing when the
    /// stored enrollment is missing or has already left Active.
    pub(crate) fn save_enrollment(&self, enrollment: CampaignEnrollment) -> bool {
        let key = (enrollment.campaign_id, enrollment.member_id);
        let id = enrollment.id;
        let still_active = enrollment.status == EnrollmentStatus::Active;
        {
            let Some(mut stored) = self.enrollments.get_mut(&id) else {
                return false;
            };
            if stored.status != EnrollmentStatus::Active {
                return false;
            }
            *stored = enrollment;
        }
        // Index is touched only after the enrollment guard is released.
        if !still_active {
            self.active_index.remove_if(&key, |_, indexed| *indexed == id);
        }
        true
    }

    pub fn has_active_enrollment(&self, campaign_id: Uuid, member_id: Uuid) -> bool {
        self.active_index.contains_key(&(campaign_id, member_id))
    }

    pub fn enrollments_for(&self, campaign_id: Uuid) -> Vec<CampaignEnrollment> {
        let mut list: Vec<CampaignEnrollment> = self
            .enrollments
            .iter()
            .filter(|e| e.campaign_id == campaign_id)
            .map(|e| e.clone())
            .collect();
        list.sort_by(|a, b| b.enrolled_at.cmp(&a.enrolled_at));
        list
    }

    /// Active enrollments due at or before `now`, oldest due first.
    pub fn due_enrollments(&self, now: DateTime<Utc>, limit: usize) -> Vec<CampaignEnrollment> {
        let mut due: Vec<CampaignEnrollment> = self
            .enrollments
            .iter()
            .filter(|e| {
                e.status == EnrollmentStatus::Active
                    && e.next_step_due_at.map_or(false, |at| at <= now)
            })
            .map(|e| e.clone())
            .collect();
        due.sort_by_key(|e| e.next_step_due_at);
        due.truncate(limit);
        due
    }

    // ─── Message logs ───────────────────────────────────────────────────

    pub fn message_log(&self, id: Uuid) -> Option<MessageLog> {
        self.message_logs.get(&id).map(|l| l.clone())
    }

    pub fn logs_for_campaign(&self, campaign_id: Uuid) -> Vec<MessageLog> {
        self.message_logs
            .iter()
            .filter(|l| l.campaign_id == campaign_id)
            .map(|l| l.clone())
            .collect()
    }

    pub fn logs_for_enrollment(&self, enrollment_id: Uuid) -> Vec<MessageLog> {
        let mut logs: Vec<MessageLog> = self
            .message_logs
            .iter()
            .filter(|l| l.enrollment_id == enrollment_id)
            .map(|l| l.clone())
            .collect();
        logs.sort_by_key(|l| l.created_at);
        logs
    }

    pub fn pixels_for_log(&self, message_log_id: Uuid) -> Vec<TrackingPixel> {
        self.pixels
            .iter()
            .filter(|p| p.message_log_id == message_log_id)
            .map(|p| p.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn enrollment(campaign_id: Uuid, member_id: Uuid, due: DateTime<Utc>) -> CampaignEnrollment {
        CampaignEnrollment {
            id: Uuid::new_v4(),
            campaign_id,
            member_id,
            status: EnrollmentStatus::Active,
            current_step: 0,
            enrolled_at: Utc::now(),
            completed_at: None,
            cancelled_at: None,
            next_step_due_at: Some(due),
            ab_group: None,
            trigger_reference_id: None,
            trigger_reference_type: None,
        }
    }

    #[test]
    fn test_single_active_enrollment_per_member() {
        let store = MarketingStore::new();
        let campaign = Uuid::new_v4();
        let member = Uuid::new_v4();
        let first = enrollment(campaign, member, Utc::now());
        assert!(store.insert_active_enrollment(first.clone()));
        assert!(!store.insert_active_enrollment(enrollment(campaign, member, Utc::now())));

        let mut done = first;
        done.cancel(Utc::now());
        assert!(store.save_enrollment(done));
        assert!(!store.has_active_enrollment(campaign, member));
        assert!(store.insert_active_enrollment(enrollment(campaign, member, Utc::now())));
    }

    #[test]
    fn test_stale_write_back_does_not_revive_ended_enrollment() {
        let store = MarketingStore::new();
        let campaign = Uuid::new_v4();
        let member = Uuid::new_v4();
        let original = enrollment(campaign, member, Utc::now());
        assert!(store.insert_active_enrollment(original.clone()));

        // A worker read the enrollment before it was cancelled elsewhere.
        let mut stale = original.clone();
        let mut cancelled = original;
        cancelled.cancel(Utc::now());
        assert!(store.save_enrollment(cancelled));

        stale.advance_to(1, Utc::now() + Duration::days(1));
        assert!(!store.save_enrollment(stale.clone()));
        assert_eq!(store.enrollment(stale.id).unwrap().status, EnrollmentStatus::Cancelled);

        // The member can enroll again and keeps exactly one Active enrollment.
        assert!(store.insert_active_enrollment(enrollment(campaign, member, Utc::now())));
        assert!(!store.save_enrollment(stale));
        let active = store
            .enrollments_for(campaign)
            .into_iter()
            .filter(|e| e.status == EnrollmentStatus::Active)
            .count();
        assert_eq!(active, 1);
    }

    #[test]
    fn test_due_enrollments_oldest_first() {
        let store = MarketingStore::new();
        let campaign = Uuid::new_v4();
        let now = Utc::now();
        let late = enrollment(campaign, Uuid::new_v4(), now - Duration::hours(1));
        let early = enrollment(campaign, Uuid::new_v4(), now - Duration::hours(5));
        let future = enrollment(campaign, Uuid::new_v4(), now + Duration::hours(5));
        store.insert_active_enrollment(late.clone());
        store.insert_active_enrollment(early.clone());
        store.insert_active_enrollment(future);

        let due = store.due_enrollments(now, 10);
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].id, early.id);
        assert_eq!(due[1].id, late.id);
        assert_eq!(store.due_enrollments(now, 1).len(), 1);
    }
}
