//! Segment criteria and their evaluation against a member profile.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use liyaqa_core::{Gender, Member, MemberStatus, SubscriptionRecord, SubscriptionStatus};

/// Filter set for dynamic segments. Every populated field must match;
/// empty lists and `None` fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentCriteria {
    pub member_statuses: Vec<MemberStatus>,
    pub subscription_statuses: Vec<SubscriptionStatus>,
    pub plan_ids: Vec<Uuid>,
    /// No check-in within this many days (never checked in counts).
    pub inactive_days: Option<u32>,
    /// Joined within the last this many days.
    pub joined_after_days: Option<u32>,
    /// An active subscription ends within this many days.
    pub expiring_within_days: Option<u32>,
    /// A subscription ended within the last this many days.
    pub expired_within_days: Option<u32>,
    pub has_active_subscription: Option<bool>,
    pub gender: Option<Gender>,
    pub min_age: Option<u32>,
    pub max_age: Option<u32>,
    /// Member must carry all of these tags (case-insensitive).
    pub tags: Vec<String>,
    pub exclude_member_ids: Vec<Uuid>,
}

/// What criteria evaluation needs to know about a member.
#[derive(Debug, Clone)]
pub struct MemberProfile {
    pub member: Member,
    pub subscriptions: Vec<SubscriptionRecord>,
    pub last_check_in: Option<DateTime<Utc>>,
}

impl SegmentCriteria {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn matches(&self, profile: &MemberProfile, now: DateTime<Utc>) -> bool {
        let member = &profile.member;
        let today = now.date_naive();

        if self.exclude_member_ids.contains(&member.id) {
            return false;
        }
        if !self.member_statuses.is_empty() && !self.member_statuses.contains(&member.status) {
            return false;
        }
        if !self.subscription_statuses.is_empty()
            && !profile
                .subscriptions
                .iter()
                .any(|s| self.subscription_statuses.contains(&s.status))
        {
            return false;
        }
        if !self.plan_ids.is_empty()
            && !profile
                .subscriptions
                .iter()
                .any(|s| self.plan_ids.contains(&s.plan_id))
        {
            return false;
        }
        if let Some(days) = self.inactive_days {
            let cutoff = now - Duration::days(i64::from(days));
            if profile.last_check_in.is_some_and(|at| at >= cutoff) {
                return false;
            }
        }
        if let Some(days) = self.joined_after_days {
            if member.joined_at < now - Duration::days(i64::from(days)) {
                return false;
            }
        }
        if let Some(days) = self.expiring_within_days {
            let horizon = today + Duration::days(i64::from(days));
            let expiring = profile.subscriptions.iter().any(|s| {
                s.status == SubscriptionStatus::Active && within(s.end_date, today, horizon)
            });
            if !expiring {
                return false;
            }
        }
        if let Some(days) = self.expired_within_days {
            let since = today - Duration::days(i64::from(days));
            let expired = profile.subscriptions.iter().any(|s| {
                s.status != SubscriptionStatus::Active
                    && s.end_date < today
                    && s.end_date >= since
            });
            if !expired {
                return false;
            }
        }
        if let Some(wanted) = self.has_active_subscription {
            let has_active = profile
                .subscriptions
                .iter()
                .any(|s| s.status == SubscriptionStatus::Active);
            if has_active != wanted {
                return false;
            }
        }
        if let Some(gender) = self.gender {
            if member.gender != Some(gender) {
                return false;
            }
        }
        if self.min_age.is_some() || self.max_age.is_some() {
            let Some(age) = member.age_on(today) else {
                return false;
            };
            if self.min_age.is_some_and(|min| age < min) || self.max_age.is_some_and(|max| age > max) {
                return false;
            }
        }
        self.tags.iter().all(|wanted| {
            member
                .tags
                .iter()
                .any(|t| t.eq_ignore_ascii_case(wanted))
        })
    }
}

fn within(date: NaiveDate, from: NaiveDate, to: NaiveDate) -> bool {
    date >= from && date <= to
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    fn profile() -> MemberProfile {
        MemberProfile {
            member: Member::new(Uuid::new_v4(), "Sara", "Ali"),
            subscriptions: Vec::new(),
            last_check_in: None,
        }
    }

    fn subscription(member_id: Uuid, status: SubscriptionStatus, end_date: NaiveDate) -> SubscriptionRecord {
        SubscriptionRecord {
            id: Uuid::new_v4(),
            member_id,
            plan_id: Uuid::new_v4(),
            status,
            end_date,
        }
    }

    #[test]
    fn test_empty_criteria_matches_everyone() {
        let criteria = SegmentCriteria::default();
        assert!(criteria.is_empty());
        assert!(criteria.matches(&profile(), Utc::now()));
    }

    #[test]
    fn test_member_status_filter() {
        let criteria = SegmentCriteria {
            member_statuses: vec![MemberStatus::Frozen],
            ..Default::default()
        };
        let mut p = profile();
        assert!(!criteria.matches(&p, Utc::now()));
        p.member.status = MemberStatus::Frozen;
        assert!(criteria.matches(&p, Utc::now()));
    }

    #[test]
    fn test_inactive_days_counts_never_checked_in() {
        let now = Utc::now();
        let criteria = SegmentCriteria {
            inactive_days: Some(14),
            ..Default::default()
        };
        let mut p = profile();
        assert!(criteria.matches(&p, now));
        p.last_check_in = Some(now - Duration::days(3));
        assert!(!criteria.matches(&p, now));
        p.last_check_in = Some(now - Duration::days(20));
        assert!(criteria.matches(&p, now));
    }

    #[test]
    fn test_expiring_and_expired_windows() {
        let now = Utc::now();
        let today = now.date_naive();
        let mut p = profile();
        p.subscriptions.push(subscription(
            p.member.id,
            SubscriptionStatus::Active,
            today + Duration::days(5),
        ));

        let expiring = SegmentCriteria {
            expiring_within_days: Some(7),
            ..Default::default()
        };
        assert!(expiring.matches(&p, now));
        let narrow = SegmentCriteria {
            expiring_within_days: Some(2),
            ..Default::default()
        };
        assert!(!narrow.matches(&p, now));

        let expired = SegmentCriteria {
            expired_within_days: Some(30),
            ..Default::default()
        };
        assert!(!expired.matches(&p, now));
        p.subscriptions.push(subscription(
            p.member.id,
            SubscriptionStatus::Expired,
            today - Duration::days(10),
        ));
        assert!(expired.matches(&p, now));
    }

    #[test]
    fn test_age_requires_birth_date() {
        let now = Utc::now();
        let criteria = SegmentCriteria {
            min_age: Some(18),
            max_age: Some(30),
            ..Default::default()
        };
        let mut p = profile();
        assert!(!criteria.matches(&p, now));
        p.member.date_of_birth = NaiveDate::from_ymd_opt(now.date_naive().year() - 25, 1, 1);
        assert!(criteria.matches(&p, now));
    }

    #[test]
    fn test_tags_and_exclusions() {
        let now = Utc::now();
        let mut p = profile();
        p.member.tags = vec!["VIP".into(), "morning".into()];
        let criteria = SegmentCriteria {
            tags: vec!["vip".into()],
            ..Default::default()
        };
        assert!(criteria.matches(&p, now));

        let excluded = SegmentCriteria {
            tags: vec!["vip".into()],
            exclude_member_ids: vec![p.member.id],
            ..Default::default()
        };
        assert!(!excluded.matches(&p, now));
    }
}
