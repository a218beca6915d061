//! Fluent builder for segment criteria.

use liyaqa_core::{Gender, MemberStatus, SubscriptionStatus};
use uuid::Uuid;

use crate::criteria::SegmentCriteria;

#[derive(Debug, Default)]
pub struct CriteriaBuilder {
    criteria: SegmentCriteria,
}

impl CriteriaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn member_status(mut self, status: MemberStatus) -> Self {
        if !self.criteria.member_statuses.contains(&status) {
            self.criteria.member_statuses.push(status);
        }
        self
    }

    pub fn subscription_status(mut self, status: SubscriptionStatus) -> Self {
        if !self.criteria.subscription_statuses.contains(&status) {
            self.criteria.subscription_statuses.push(status);
        }
        self
    }

    pub fn on_plan(mut self, plan_id: Uuid) -> Self {
        self.criteria.plan_ids.push(plan_id);
        self
    }

    pub fn inactive_for(mut self, days: u32) -> Self {
        self.criteria.inactive_days = Some(days);
        self
    }

    pub fn joined_within(mut self, days: u32) -> Self {
        self.criteria.joined_after_days = Some(days);
        self
    }

    pub fn expiring_within(mut self, days: u32) -> Self {
        self.criteria.expiring_within_days = Some(days);
        self
    }

    pub fn expired_within(mut self, days: u32) -> Self {
        self.criteria.expired_within_days = Some(days);
        self
    }

    pub fn with_active_subscription(mut self) -> Self {
        self.criteria.has_active_subscription = Some(true);
        self
    }

    pub fn without_active_subscription(mut self) -> Self {
        self.criteria.has_active_subscription = Some(false);
        self
    }

    pub fn gender(mut self, gender: Gender) -> Self {
        self.criteria.gender = Some(gender);
        self
    }

    pub fn age_between(mut self, min: u32, max: u32) -> Self {
        self.criteria.min_age = Some(min);
        self.criteria.max_age = Some(max);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.criteria.tags.push(tag.into());
        self
    }

    pub fn exclude(mut self, member_id: Uuid) -> Self {
        self.criteria.exclude_member_ids.push(member_id);
        self
    }

    pub fn build(self) -> SegmentCriteria {
        self.criteria
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_fields() {
        let plan = Uuid::new_v4();
        let criteria = CriteriaBuilder::new()
            .member_status(MemberStatus::Active)
            .member_status(MemberStatus::Active)
            .on_plan(plan)
            .expiring_within(7)
            .gender(Gender::Female)
            .age_between(18, 40)
            .tag("vip")
            .build();

        assert_eq!(criteria.member_statuses, vec![MemberStatus::Active]);
        assert_eq!(criteria.plan_ids, vec![plan]);
        assert_eq!(criteria.expiring_within_days, Some(7));
        assert_eq!(criteria.gender, Some(Gender::Female));
        assert_eq!((criteria.min_age, criteria.max_age), (Some(18), Some(40)));
        assert_eq!(criteria.tags, vec!["vip".to_string()]);
        assert!(!criteria.is_empty());
    }

    #[test]
    fn test_empty_builder() {
        assert!(CriteriaBuilder::new().build().is_empty());
    }
}
