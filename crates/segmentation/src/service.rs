//! Segment registry: static member lists and dynamic segments evaluated
//! against the member directory on demand.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use liyaqa_core::error::ensure;
use liyaqa_core::{LiyaqaError, LiyaqaResult, Member, MemberDirectory, Page, PageRequest};

use crate::criteria::{MemberProfile, SegmentCriteria};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentType {
    /// Explicit member list.
    Static,
    /// Membership computed from criteria.
    Dynamic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub segment_type: SegmentType,
    pub criteria: Option<SegmentCriteria>,
    pub member_count: usize,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Segment {
    pub fn is_static(&self) -> bool {
        self.segment_type == SegmentType::Static
    }

    pub fn is_dynamic(&self) -> bool {
        self.segment_type == SegmentType::Dynamic
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSegment {
    /// Filled from the caller's tenant context by the API.
    #[serde(default = "Uuid::nil")]
    pub tenant_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub segment_type: SegmentType,
    #[serde(default)]
    pub criteria: Option<SegmentCriteria>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSegment {
    pub name: Option<String>,
    pub description: Option<String>,
    pub criteria: Option<SegmentCriteria>,
    pub is_active: Option<bool>,
}

#[derive(Clone)]
pub struct SegmentService {
    segments: Arc<DashMap<Uuid, Segment>>,
    static_members: Arc<DashMap<Uuid, Vec<Uuid>>>,
    directory: Arc<dyn MemberDirectory>,
}

impl std::fmt::Debug for SegmentService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentService")
            .field("segments", &self.segments.len())
            .finish()
    }
}

impl SegmentService {
    pub fn new(directory: Arc<dyn MemberDirectory>) -> Self {
        Self {
            segments: Arc::new(DashMap::new()),
            static_members: Arc::new(DashMap::new()),
            directory,
        }
    }

    pub fn create_segment(&self, cmd: CreateSegment) -> LiyaqaResult<Segment> {
        ensure(!cmd.name.trim().is_empty(), "Segment name is required")?;
        if cmd.segment_type == SegmentType::Dynamic {
            ensure(cmd.criteria.is_some(), "Dynamic segments require criteria")?;
        }
        let now = Utc::now();
        let mut segment = Segment {
            id: Uuid::new_v4(),
            tenant_id: cmd.tenant_id,
            name: cmd.name.trim().to_string(),
            description: cmd.description,
            segment_type: cmd.segment_type,
            criteria: match cmd.segment_type {
                SegmentType::Dynamic => cmd.criteria,
                SegmentType::Static => None,
            },
            member_count: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        if segment.is_dynamic() {
            segment.member_count = self.evaluate(&segment, now).len();
        }
        self.segments.insert(segment.id, segment.clone());
        info!(
            segment_id = %segment.id,
            tenant_id = %segment.tenant_id,
            segment_type = ?segment.segment_type,
            member_count = segment.member_count,
            "Segment created"
        );
        Ok(segment)
    }

    pub fn get_segment(&self, id: Uuid) -> LiyaqaResult<Segment> {
        self.segments
            .get(&id)
            .map(|s| s.clone())
            .ok_or_else(|| LiyaqaError::not_found("Segment", id))
    }

    /// Segments of a tenant, newest first.
    pub fn list_segments(&self, tenant_id: Uuid, page: PageRequest) -> Page<Segment> {
        Page::from_vec(self.collect(|s| s.tenant_id == tenant_id), page)
    }

    /// Case-insensitive match on name or description.
    pub fn search_segments(&self, tenant_id: Uuid, term: &str, page: PageRequest) -> Page<Segment> {
        let needle = term.trim().to_lowercase();
        let found = self.collect(|s| {
            s.tenant_id == tenant_id
                && (s.name.to_lowercase().contains(&needle)
                    || s
                        .description
                        .as_deref()
                        .is_some_and(|d| d.to_lowercase().contains(&needle)))
        });
        Page::from_vec(found, page)
    }

    pub fn update_segment(&self, id: Uuid, cmd: UpdateSegment) -> LiyaqaResult<Segment> {
        if let Some(name) = &cmd.name {
            ensure(!name.trim().is_empty(), "Segment name is required")?;
        }
        let segment = self.get_segment(id)?;
        if cmd.criteria.is_some() && segment.is_static() {
            return Err(LiyaqaError::Validation(
                "Static segments do not take criteria".into(),
            ));
        }
        let updated = {
            let mut entry = self
                .segments
                .get_mut(&id)
                .ok_or_else(|| LiyaqaError::not_found("Segment", id))?;
            if let Some(name) = cmd.name {
                entry.name = name.trim().to_string();
            }
            if cmd.description.is_some() {
                entry.description = cmd.description;
            }
            if cmd.criteria.is_some() {
                entry.criteria = cmd.criteria;
            }
            if let Some(active) = cmd.is_active {
                entry.is_active = active;
            }
            entry.updated_at = Utc::now();
            entry.clone()
        };
        if updated.is_dynamic() {
            return self.recalculate_count(id);
        }
        Ok(updated)
    }

    pub fn delete_segment(&self, id: Uuid) -> LiyaqaResult<()> {
        self.segments
            .remove(&id)
            .ok_or_else(|| LiyaqaError::not_found("Segment", id))?;
        self.static_members.remove(&id);
        info!(segment_id = %id, "Segment deleted");
        Ok(())
    }

    // ─── Static membership ──────────────────────────────────────────────

    /// Adds members to a static segment, skipping ones already present.
    /// Returns how many were added.
    pub fn add_members(&self, id: Uuid, member_ids: &[Uuid]) -> LiyaqaResult<usize> {
        let segment = self.get_segment(id)?;
        ensure_static(&segment)?;
        let added = {
            let mut members = self.static_members.entry(id).or_default();
            let before = members.len();
            for member_id in member_ids {
                if !members.contains(member_id) {
                    members.push(*member_id);
                }
            }
            members.len() - before
        };
        self.recalculate_count(id)?;
        debug!(segment_id = %id, added, "Members added to segment");
        Ok(added)
    }

    pub fn remove_member(&self, id: Uuid, member_id: Uuid) -> LiyaqaResult<()> {
        let segment = self.get_segment(id)?;
        ensure_static(&segment)?;
        let removed = self
            .static_members
            .get_mut(&id)
            .map(|mut members| {
                let before = members.len();
                members.retain(|m| *m != member_id);
                before != members.len()
            })
            .unwrap_or(false);
        if !removed {
            return Err(LiyaqaError::NotFound(format!(
                "Member {member_id} is not in segment {id}"
            )));
        }
        self.recalculate_count(id)?;
        Ok(())
    }

    // ─── Evaluation ─────────────────────────────────────────────────────

    /// Current member ids of a segment. Inactive segments are empty.
    pub fn member_ids(&self, id: Uuid) -> LiyaqaResult<Vec<Uuid>> {
        self.member_ids_at(id, Utc::now())
    }

    pub fn member_ids_at(&self, id: Uuid, now: DateTime<Utc>) -> LiyaqaResult<Vec<Uuid>> {
        let segment = self.get_segment(id)?;
        if !segment.is_active {
            return Ok(Vec::new());
        }
        Ok(match segment.segment_type {
            SegmentType::Static => self.static_ids(id),
            SegmentType::Dynamic => self.evaluate(&segment, now).into_iter().map(|m| m.id).collect(),
        })
    }

    /// Members a dynamic segment currently matches, sorted by name.
    pub fn preview_members(&self, id: Uuid, page: PageRequest) -> LiyaqaResult<Page<Member>> {
        let segment = self.get_segment(id)?;
        if !segment.is_dynamic() {
            return Err(LiyaqaError::Validation(
                "Preview is only available for dynamic segments".into(),
            ));
        }
        let mut members = self.evaluate(&segment, Utc::now());
        members.sort_by(|a, b| a.full_name().cmp(&b.full_name()));
        Ok(Page::from_vec(members, page))
    }

    pub fn recalculate_count(&self, id: Uuid) -> LiyaqaResult<Segment> {
        self.recalculate_count_at(id, Utc::now())
    }

    pub fn recalculate_count_at(&self, id: Uuid, now: DateTime<Utc>) -> LiyaqaResult<Segment> {
        let segment = self.get_segment(id)?;
        let count = match segment.segment_type {
            SegmentType::Static => self.static_ids(id).len(),
            SegmentType::Dynamic => self.evaluate(&segment, now).len(),
        };
        let mut entry = self
            .segments
            .get_mut(&id)
            .ok_or_else(|| LiyaqaError::not_found("Segment", id))?;
        entry.member_count = count;
        entry.updated_at = now;
        Ok(entry.clone())
    }

    /// Refreshes the count of every active dynamic segment. Returns how
    /// many segments were recalculated.
    pub fn recalculate_all_dynamic(&self, now: DateTime<Utc>) -> usize {
        let ids: Vec<Uuid> = self
            .segments
            .iter()
            .filter(|s| s.is_dynamic() && s.is_active)
            .map(|s| s.id)
            .collect();
        let refreshed = ids
            .into_iter()
            .filter(|id| self.recalculate_count_at(*id, now).is_ok())
            .count();
        info!(refreshed, "Dynamic segment counts recalculated");
        refreshed
    }

    fn evaluate(&self, segment: &Segment, now: DateTime<Utc>) -> Vec<Member> {
        let Some(criteria) = &segment.criteria else {
            return Vec::new();
        };
        self.directory
            .members_for_tenant(segment.tenant_id)
            .into_iter()
            .filter(|member| {
                let profile = MemberProfile {
                    member: member.clone(),
                    subscriptions: self.directory.subscriptions_for_member(member.id),
                    last_check_in: self.directory.last_check_in(member.id),
                };
                criteria.matches(&profile, now)
            })
            .collect()
    }

    fn static_ids(&self, id: Uuid) -> Vec<Uuid> {
        self.static_members
            .get(&id)
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    fn collect(&self, pred: impl Fn(&Segment) -> bool) -> Vec<Segment> {
        let mut found: Vec<Segment> = self
            .segments
            .iter()
            .filter(|s| pred(s.value()))
            .map(|s| s.value().clone())
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        found
    }
}

fn ensure_static(segment: &Segment) -> LiyaqaResult<()> {
    if segment.is_static() {
        Ok(())
    } else {
        Err(LiyaqaError::Validation(format!(
            "Segment {} is dynamic; membership is computed from criteria",
            segment.id
        )))
    }
}
