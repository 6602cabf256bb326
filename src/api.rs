//! Interfaces to the remote localvan API
//!
//! The controllers only ever talk to the backend through these traits. The
//! production implementation is [`crate::client::HttpApi`]; tests plug in
//! in-memory fakes.
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::booking::{Booking, BookingStatus};
use crate::error::ApiError;
use crate::kyc::{KycDecision, KycFilter, KycPatch, KycRecord};
use crate::permission::{Actor, NewSubAdmin, Permission, Role, SubAdmin};
use crate::types::TimeStamp;

/// Which dashboard's listing endpoint to read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingScope {
    Admin,
    Owner,
    Driver,
}

impl BookingScope {
    pub fn for_role(role: Role) -> Option<Self> {
        match role {
            Role::Admin => Some(BookingScope::Admin),
            Role::Owner => Some(BookingScope::Owner),
            Role::Driver => Some(BookingScope::Driver),
            Role::User => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingScope::Admin => "admin",
            BookingScope::Owner => "owner",
            BookingScope::Driver => "driver",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 1, limit: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingQuery {
    pub scope: BookingScope,
    pub status: Option<BookingStatus>,
    pub pagination: Pagination,
}

impl BookingQuery {
    pub fn new(scope: BookingScope) -> Self {
        Self {
            scope,
            status: None,
            pagination: Pagination::default(),
        }
    }
    pub fn with_status(mut self, status: BookingStatus) -> Self {
        self.status = Some(status);
        self
    }
    pub fn with_page(mut self, page: u32, limit: u32) -> Self {
        self.pagination = Pagination { page, limit };
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: u64,
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            total: 0,
        }
    }
}

/// Server acknowledgement of a mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteAck {
    pub message: Option<String>,
}

impl RemoteAck {
    pub fn with_message(message: &str) -> Self {
        Self {
            message: Some(message.to_string()),
        }
    }
}

/// The record version a mutation was decided against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Precondition {
    pub updated_at: TimeStamp<Utc>,
}

impl From<&Booking> for Precondition {
    fn from(value: &Booking) -> Self {
        Self {
            updated_at: value.updated_at.clone(),
        }
    }
}

#[async_trait]
pub trait BookingApi: Send + Sync {
    async fn list_bookings(&self, query: &BookingQuery) -> Result<Page<Booking>, ApiError>;
    async fn accept_booking(
        &self,
        id: &str,
        precondition: Option<&Precondition>,
    ) -> Result<RemoteAck, ApiError>;
    async fn reject_booking(
        &self,
        id: &str,
        precondition: Option<&Precondition>,
    ) -> Result<RemoteAck, ApiError>;
    async fn mark_booking_completed(
        &self,
        id: &str,
        precondition: Option<&Precondition>,
    ) -> Result<RemoteAck, ApiError>;
    async fn admin_set_booking_status(
        &self,
        id: &str,
        status: BookingStatus,
        precondition: Option<&Precondition>,
    ) -> Result<RemoteAck, ApiError>;
    async fn admin_delete_booking(&self, id: &str) -> Result<RemoteAck, ApiError>;
}

#[async_trait]
pub trait KycApi: Send + Sync {
    async fn list_kyc(
        &self,
        filter: KycFilter,
        pagination: Pagination,
    ) -> Result<Page<KycRecord>, ApiError>;
    async fn verify_kyc(
        &self,
        id: &str,
        decision: KycDecision,
        reason: Option<&str>,
    ) -> Result<RemoteAck, ApiError>;
    /// `None` when the owner has not started KYC yet.
    async fn get_my_kyc(&self) -> Result<Option<KycRecord>, ApiError>;
    async fn update_kyc(&self, patch: &KycPatch) -> Result<KycRecord, ApiError>;
}

#[async_trait]
pub trait SubAdminApi: Send + Sync {
    async fn list_permissions(&self) -> Result<Vec<Permission>, ApiError>;
    async fn list_sub_admins(&self, pagination: Pagination) -> Result<Page<SubAdmin>, ApiError>;
    async fn create_sub_admin(&self, sub_admin: &NewSubAdmin) -> Result<SubAdmin, ApiError>;
    async fn update_sub_admin_permissions(
        &self,
        id: &str,
        permission_ids: &[String],
    ) -> Result<SubAdmin, ApiError>;
    async fn delete_sub_admin(&self, id: &str) -> Result<RemoteAck, ApiError>;
}

/// Who the dashboard is signed in as. Treated as trustworthy for the local,
/// non-authoritative checks.
#[async_trait]
pub trait ActorSource: Send + Sync {
    async fn current_actor(&self) -> Result<Actor, ApiError>;
}
