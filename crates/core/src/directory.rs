//! Member directory port: the slice of member, subscription, and attendance
//! data that marketing triggers and segments read.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::types::Gender;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    Pending,
    Active,
    Frozen,
    Suspended,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub gender: Option<Gender>,
    pub date_of_birth: Option<NaiveDate>,
    pub status: MemberStatus,
    pub joined_at: DateTime<Utc>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Member {
    pub fn new(tenant_id: Uuid, first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: None,
            phone: None,
            gender: None,
            date_of_birth: None,
            status: MemberStatus::Active,
            joined_at: Utc::now(),
            tags: Vec::new(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// Age in whole years on `today`.
    pub fn age_on(&self, today: NaiveDate) -> Option<u32> {
        let dob = self.date_of_birth?;
        let mut years = today.year() - dob.year();
        if (today.month(), today.day()) < (dob.month(), dob.day()) {
            years -= 1;
        }
        u32::try_from(years).ok()
    }

    pub fn has_birthday_on(&self, day: NaiveDate) -> bool {
        self.date_of_birth
            .map(|dob| dob.month() == day.month() && dob.day() == day.day())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    PendingPayment,
    Active,
    Frozen,
    Cancelled,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub id: Uuid,
    pub member_id: Uuid,
    pub plan_id: Uuid,
    pub status: SubscriptionStatus,
    pub end_date: NaiveDate,
}

/// Read access to members and their subscriptions.
pub trait MemberDirectory: Send + Sync {
    fn get_member(&self, id: Uuid) -> Option<Member>;

    fn members_for_tenant(&self, tenant_id: Uuid) -> Vec<Member>;

    fn subscriptions_for_member(&self, member_id: Uuid) -> Vec<SubscriptionRecord>;

    /// All subscriptions of members belonging to `tenant_id`.
    fn subscriptions_for_tenant(&self, tenant_id: Uuid) -> Vec<SubscriptionRecord>;

    fn last_check_in(&self, member_id: Uuid) -> Option<DateTime<Utc>>;
}

/// Source of unpaid, past-due invoices as `(invoice_id, member_id)` pairs.
pub trait OverdueInvoiceSource: Send + Sync {
    fn overdue_invoices(&self, tenant_id: Uuid) -> Vec<(Uuid, Uuid)>;
}

/// DashMap-backed directory used by the server and by tests.
#[derive(Clone, Default)]
pub struct InMemoryDirectory {
    members: Arc<DashMap<Uuid, Member>>,
    subscriptions: Arc<DashMap<Uuid, SubscriptionRecord>>,
    check_ins: Arc<DashMap<Uuid, Vec<DateTime<Utc>>>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_member(&self, member: Member) -> Member {
        self.members.insert(member.id, member.clone());
        member
    }

    pub fn remove_member(&self, id: Uuid) -> Option<Member> {
        self.subscriptions.retain(|_, s| s.member_id != id);
        self.check_ins.remove(&id);
        self.members.remove(&id).map(|(_, m)| m)
    }

    pub fn add_subscription(&self, subscription: SubscriptionRecord) -> SubscriptionRecord {
        self.subscriptions
            .insert(subscription.id, subscription.clone());
        subscription
    }

    pub fn record_check_in(&self, member_id: Uuid, at: DateTime<Utc>) {
        self.check_ins.entry(member_id).or_default().push(at);
    }

    pub fn check_ins(&self, member_id: Uuid) -> Vec<DateTime<Utc>> {
        let mut list = self
            .check_ins
            .get(&member_id)
            .map(|c| c.clone())
            .unwrap_or_default();
        list.sort();
        list
    }
}

impl MemberDirectory for InMemoryDirectory {
    fn get_member(&self, id: Uuid) -> Option<Member> {
        self.members.get(&id).map(|m| m.clone())
    }

    fn members_for_tenant(&self, tenant_id: Uuid) -> Vec<Member> {
        let mut members: Vec<Member> = self
            .members
            .iter()
            .filter(|m| m.tenant_id == tenant_id)
            .map(|m| m.clone())
            .collect();
        members.sort_by_key(|m| m.joined_at);
        members
    }

    fn subscriptions_for_member(&self, member_id: Uuid) -> Vec<SubscriptionRecord> {
        let mut subs: Vec<SubscriptionRecord> = self
            .subscriptions
            .iter()
            .filter(|s| s.member_id == member_id)
            .map(|s| s.clone())
            .collect();
        subs.sort_by_key(|s| s.end_date);
        subs
    }

    fn subscriptions_for_tenant(&self, tenant_id: Uuid) -> Vec<SubscriptionRecord> {
        self.subscriptions
            .iter()
            .filter(|s| {
                self.members
                    .get(&s.member_id)
                    .map(|m| m.tenant_id == tenant_id)
                    .unwrap_or(false)
            })
            .map(|s| s.clone())
            .collect()
    }

    fn last_check_in(&self, member_id: Uuid) -> Option<DateTime<Utc>> {
        self.check_ins
            .get(&member_id)
            .and_then(|c| c.iter().max().copied())
    }
}
