//! Organizations, their clubs, and club locations.
//!
//! An organization is the legal entity (VAT and commercial registration);
//! a club is a brand under it; a location is a physical branch of a club
//! and carries the gender access policy.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use liyaqa_billing::zatca::is_valid_vat_number;
use liyaqa_core::error::ensure;
use liyaqa_core::{LiyaqaError, LiyaqaResult, LocalizedText, Page, PageRequest};

use crate::gender::GenderPolicy;
use crate::invites::is_valid_email;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    Pending,
    Active,
    Suspended,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusAction {
    Activate,
    Suspend,
    Close,
}

impl StatusAction {
    fn apply(self, current: EntityStatus) -> Option<EntityStatus> {
        use EntityStatus::*;
        match (self, current) {
            (Self::Activate, Pending | Suspended) => Some(Active),
            (Self::Suspend, Active) => Some(Suspended),
            (Self::Close, Pending | Active | Suspended) => Some(Closed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: LocalizedText,
    pub vat_number: Option<String>,
    /// Commercial registration number.
    pub cr_number: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: EntityStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Club {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub organization_id: Uuid,
    pub name: LocalizedText,
    pub description: Option<LocalizedText>,
    pub status: EntityStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub club_id: Uuid,
    pub name: LocalizedText,
    pub address: Option<String>,
    pub city: Option<String>,
    pub gender_policy: GenderPolicy,
    pub status: EntityStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrganization {
    pub name: LocalizedText,
    #[serde(default)]
    pub vat_number: Option<String>,
    #[serde(default)]
    pub cr_number: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateOrganization {
    pub name: Option<LocalizedText>,
    pub vat_number: Option<String>,
    pub cr_number: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateClub {
    pub organization_id: Uuid,
    pub name: LocalizedText,
    #[serde(default)]
    pub description: Option<LocalizedText>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateClub {
    pub name: Option<LocalizedText>,
    pub description: Option<LocalizedText>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateLocation {
    pub club_id: Uuid,
    pub name: LocalizedText,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub gender_policy: Option<GenderPolicy>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateLocation {
    pub name: Option<LocalizedText>,
    pub address: Option<String>,
    pub city: Option<String>,
}

/// Saudi commercial registration numbers are 10 digits.
pub fn is_valid_cr_number(cr: &str) -> bool {
    cr.len() == 10 && cr.chars().all(|c| c.is_ascii_digit())
}

trait Scoped {
    const ENTITY: &'static str;
    fn tenant_id(&self) -> Uuid;
    fn status_mut(&mut self) -> &mut EntityStatus;
    fn touch(&mut self, now: DateTime<Utc>);
}

macro_rules! scoped {
    ($ty:ty, $name:literal) => {
        impl Scoped for $ty {
            const ENTITY: &'static str = $name;
            fn tenant_id(&self) -> Uuid {
                self.tenant_id
            }
            fn status_mut(&mut self) -> &mut EntityStatus {
                &mut self.status
            }
            fn touch(&mut self, now: DateTime<Utc>) {
                self.updated_at = now;
            }
        }
    };
}

scoped!(Organization, "Organization");
scoped!(Club, "Club");
scoped!(Location, "Location");

fn get_scoped<T: Scoped + Clone>(map: &DashMap<Uuid, T>, tenant_id: Uuid, id: Uuid) -> LiyaqaResult<T> {
    match map.get(&id) {
        Some(entry) if entry.tenant_id() == tenant_id => Ok(entry.clone()),
        _ => Err(LiyaqaError::not_found(T::ENTITY, id)),
    }
}

fn apply_action<T: Scoped + Clone>(
    map: &DashMap<Uuid, T>,
    tenant_id: Uuid,
    id: Uuid,
    action: StatusAction,
) -> LiyaqaResult<T> {
    let mut entry = match map.get_mut(&id) {
        Some(entry) if entry.tenant_id() == tenant_id => entry,
        _ => return Err(LiyaqaError::not_found(T::ENTITY, id)),
    };
    let current = *entry.status_mut();
    let next = action.apply(current).ok_or_else(|| {
        LiyaqaError::InvalidState(format!(
            "{} {id} cannot {action:?} while {current:?}",
            T::ENTITY
        ))
    })?;
    *entry.status_mut() = next;
    entry.touch(Utc::now());
    info!(entity = T::ENTITY, id = %id, from = ?current, to = ?next, "Status changed");
    Ok(entry.clone())
}

fn validate_registration(vat_number: Option<&str>, cr_number: Option<&str>, email: Option<&str>) -> LiyaqaResult<()> {
    if let Some(vat) = vat_number {
        ensure(
            is_valid_vat_number(vat),
            "VAT number must be 15 digits starting and ending with 3",
        )?;
    }
    if let Some(cr) = cr_number {
        ensure(is_valid_cr_number(cr), "CR number must be 10 digits")?;
    }
    if let Some(email) = email {
        ensure(is_valid_email(email), format!("Invalid email: {email}"))?;
    }
    Ok(())
}

#[derive(Clone, Default)]
pub struct OrganizationService {
    organizations: Arc<DashMap<Uuid, Organization>>,
    clubs: Arc<DashMap<Uuid, Club>>,
    locations: Arc<DashMap<Uuid, Location>>,
}

impl std::fmt::Debug for OrganizationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrganizationService")
            .field("organizations", &self.organizations.len())
            .field("clubs", &self.clubs.len())
            .field("locations", &self.locations.len())
            .finish()
    }
}

impl OrganizationService {
    pub fn new() -> Self {
        Self::default()
    }

    // ─── Organizations ──────────────────────────────────────────────────

    pub fn create_organization(&self, tenant_id: Uuid, cmd: CreateOrganization) -> LiyaqaResult<Organization> {
        ensure(!cmd.name.en.trim().is_empty(), "Organization name is required")?;
        validate_registration(cmd.vat_number.as_deref(), cmd.cr_number.as_deref(), cmd.email.as_deref())?;
        if let Some(cr) = &cmd.cr_number {
            if self
                .organizations
                .iter()
                .any(|o| o.tenant_id == tenant_id && o.cr_number.as_deref() == Some(cr))
            {
                return Err(LiyaqaError::Conflict(format!("CR number already registered: {cr}")));
            }
        }
        let now = Utc::now();
        let org = Organization {
            id: Uuid::new_v4(),
            tenant_id,
            name: cmd.name,
            vat_number: cmd.vat_number,
            cr_number: cmd.cr_number,
            email: cmd.email,
            phone: cmd.phone,
            status: EntityStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        self.organizations.insert(org.id, org.clone());
        info!(organization_id = %org.id, tenant_id = %tenant_id, "Organization created");
        Ok(org)
    }

    pub fn get_organization(&self, tenant_id: Uuid, id: Uuid) -> LiyaqaResult<Organization> {
        get_scoped(&self.organizations, tenant_id, id)
    }

    pub fn list_organizations(&self, tenant_id: Uuid, page: PageRequest) -> Page<Organization> {
        let mut found: Vec<Organization> = self
            .organizations
            .iter()
            .filter(|o| o.tenant_id == tenant_id)
            .map(|o| o.value().clone())
            .collect();
        found.sort_by(|a, b| a.name.en.cmp(&b.name.en));
        Page::from_vec(found, page)
    }

    pub fn update_organization(&self, tenant_id: Uuid, id: Uuid, cmd: UpdateOrganization) -> LiyaqaResult<Organization> {
        validate_registration(cmd.vat_number.as_deref(), cmd.cr_number.as_deref(), cmd.email.as_deref())?;
        let mut org = match self.organizations.get_mut(&id) {
            Some(org) if org.tenant_id == tenant_id => org,
            _ => return Err(LiyaqaError::not_found("Organization", id)),
        };
        if let Some(name) = cmd.name {
            ensure(!name.en.trim().is_empty(), "Organization name is required")?;
            org.name = name;
        }
        if cmd.vat_number.is_some() {
            org.vat_number = cmd.vat_number;
        }
        if cmd.cr_number.is_some() {
            org.cr_number = cmd.cr_number;
        }
        if cmd.email.is_some() {
            org.email = cmd.email;
        }
        if cmd.phone.is_some() {
            org.phone = cmd.phone;
        }
        org.updated_at = Utc::now();
        Ok(org.clone())
    }

    pub fn organization_status(&self, tenant_id: Uuid, id: Uuid, action: StatusAction) -> LiyaqaResult<Organization> {
        apply_action(&self.organizations, tenant_id, id, action)
    }

    // ─── Clubs ──────────────────────────────────────────────────────────

    pub fn create_club(&self, tenant_id: Uuid, cmd: CreateClub) -> LiyaqaResult<Club> {
        ensure(!cmd.name.en.trim().is_empty(), "Club name is required")?;
        let org = self.get_organization(tenant_id, cmd.organization_id)?;
        if org.status == EntityStatus::Closed {
            return Err(LiyaqaError::InvalidState(format!(
                "Organization {} is closed",
                org.id
            )));
        }
        let now = Utc::now();
        let club = Club {
            id: Uuid::new_v4(),
            tenant_id,
            organization_id: org.id,
            name: cmd.name,
            description: cmd.description,
            status: EntityStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        self.clubs.insert(club.id, club.clone());
        info!(club_id = %club.id, organization_id = %org.id, "Club created");
        Ok(club)
    }

    pub fn get_club(&self, tenant_id: Uuid, id: Uuid) -> LiyaqaResult<Club> {
        get_scoped(&self.clubs, tenant_id, id)
    }

    pub fn list_clubs(&self, tenant_id: Uuid, organization_id: Option<Uuid>, page: PageRequest) -> Page<Club> {
        let mut found: Vec<Club> = self
            .clubs
            .iter()
            .filter(|c| c.tenant_id == tenant_id && organization_id.map_or(true, |o| c.organization_id == o))
            .map(|c| c.value().clone())
            .collect();
        found.sort_by(|a, b| a.name.en.cmp(&b.name.en));
        Page::from_vec(found, page)
    }

    pub fn update_club(&self, tenant_id: Uuid, id: Uuid, cmd: UpdateClub) -> LiyaqaResult<Club> {
        let mut club = match self.clubs.get_mut(&id) {
            Some(club) if club.tenant_id == tenant_id => club,
            _ => return Err(LiyaqaError::not_found("Club", id)),
        };
        if let Some(name) = cmd.name {
            ensure(!name.en.trim().is_empty(), "Club name is required")?;
            club.name = name;
        }
        if cmd.description.is_some() {
            club.description = cmd.description;
        }
        club.updated_at = Utc::now();
        Ok(club.clone())
    }

    pub fn club_status(&self, tenant_id: Uuid, id: Uuid, action: StatusAction) -> LiyaqaResult<Club> {
        apply_action(&self.clubs, tenant_id, id, action)
    }

    // ─── Locations ──────────────────────────────────────────────────────

    pub fn create_location(&self, tenant_id: Uuid, cmd: CreateLocation) -> LiyaqaResult<Location> {
        ensure(!cmd.name.en.trim().is_empty(), "Location name is required")?;
        let club = self.get_club(tenant_id, cmd.club_id)?;
        if club.status == EntityStatus::Closed {
            return Err(LiyaqaError::InvalidState(format!("Club {} is closed", club.id)));
        }
        let now = Utc::now();
        let location = Location {
            id: Uuid::new_v4(),
            tenant_id,
            club_id: club.id,
            name: cmd.name,
            address: cmd.address,
            city: cmd.city,
            gender_policy: cmd.gender_policy.unwrap_or(GenderPolicy::Mixed),
            status: EntityStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        self.locations.insert(location.id, location.clone());
        info!(location_id = %location.id, club_id = %club.id, "Location created");
        Ok(location)
    }

    pub fn get_location(&self, tenant_id: Uuid, id: Uuid) -> LiyaqaResult<Location> {
        get_scoped(&self.locations, tenant_id, id)
    }

    pub fn list_locations(&self, tenant_id: Uuid, club_id: Option<Uuid>, page: PageRequest) -> Page<Location> {
        let mut found: Vec<Location> = self
            .locations
            .iter()
            .filter(|l| l.tenant_id == tenant_id && club_id.map_or(true, |c| l.club_id == c))
            .map(|l| l.value().clone())
            .collect();
        found.sort_by(|a, b| a.name.en.cmp(&b.name.en));
        Page::from_vec(found, page)
    }

    pub fn update_location(&self, tenant_id: Uuid, id: Uuid, cmd: UpdateLocation) -> LiyaqaResult<Location> {
        let mut location = match self.locations.get_mut(&id) {
            Some(location) if location.tenant_id == tenant_id => location,
            _ => return Err(LiyaqaError::not_found("Location", id)),
        };
        if let Some(name) = cmd.name {
            ensure(!name.en.trim().is_empty(), "Location name is required")?;
            location.name = name;
        }
        if cmd.address.is_some() {
            location.address = cmd.address;
        }
        if cmd.city.is_some() {
            location.city = cmd.city;
        }
        location.updated_at = Utc::now();
        Ok(location.clone())
    }

    pub fn location_status(&self, tenant_id: Uuid, id: Uuid, action: StatusAction) -> LiyaqaResult<Location> {
        apply_action(&self.locations, tenant_id, id, action)
    }

    pub(crate) fn set_gender_policy(&self, tenant_id: Uuid, id: Uuid, policy: GenderPolicy) -> LiyaqaResult<Location> {
        let mut location = match self.locations.get_mut(&id) {
            Some(location) if location.tenant_id == tenant_id => location,
            _ => return Err(LiyaqaError::not_found("Location", id)),
        };
        location.gender_policy = policy;
        location.updated_at = Utc::now();
        Ok(location.clone())
    }
}
