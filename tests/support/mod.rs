//! In-memory stand-in for the localvan backend used by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

use localvan_lifecycle::api::{
    BookingApi, BookingQuery, KycApi, Page, Pagination, Precondition, RemoteAck, SubAdminApi,
};
use localvan_lifecycle::booking::{Booking, BookingStatus, PaymentStatus};
use localvan_lifecycle::error::ApiError;
use localvan_lifecycle::kyc::{KycDecision, KycFilter, KycPatch, KycRecord, KycStatus};
use localvan_lifecycle::permission::{NewSubAdmin, Permission, SubAdmin};
use localvan_lifecycle::types::TimeStamp;

#[derive(Debug, Default)]
pub struct State {
    pub bookings: Vec<Booking>,
    pub kyc: Vec<KycRecord>,
    pub my_kyc: Option<KycRecord>,
    pub permissions: Vec<Permission>,
    pub sub_admins: Vec<SubAdmin>,
    pub mutation_calls: usize,
    pub list_calls: usize,
    pub preconditions: Vec<Option<Precondition>>,
    /// Refuse the next mutation with this status and message.
    pub reject_next: Option<(u16, String)>,
    pub fail_lists: bool,
    /// Message the sub-admin delete endpoint acknowledges with.
    pub delete_ack: Option<String>,
}

#[derive(Clone, Default)]
pub struct FakeApi {
    state: Arc<Mutex<State>>,
    // when set, mutations wait here until released
    gate: Option<Arc<Notify>>,
}

impl FakeApi {
    pub fn with_bookings(bookings: Vec<Booking>) -> Self {
        let api = Self::default();
        api.state().bookings = bookings;
        api
    }

    pub fn with_kyc(records: Vec<KycRecord>) -> Self {
        let api = Self::default();
        api.state().kyc = records;
        api
    }

    /// Holds every mutation until the returned handle is notified.
    pub fn gated(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    pub fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn mutation_calls(&self) -> usize {
        self.state().mutation_calls
    }

    pub fn reject_next(&self, status: u16, message: &str) {
        self.state().reject_next = Some((status, message.to_string()));
    }

    pub fn fail_lists(&self, fail: bool) {
        self.state().fail_lists = fail;
    }

    async fn begin_mutation(&self) -> Result<(), ApiError> {
        let refused = {
            let mut state = self.state();
            state.mutation_calls += 1;
            state.reject_next.take()
        };
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        match refused {
            Some((status, message)) => Err(ApiError::Status {
                status,
                message: Some(message),
            }),
            None => Ok(()),
        }
    }

    fn set_booking_status(
        &self,
        id: &str,
        status: BookingStatus,
        precondition: Option<&Precondition>,
    ) -> Result<RemoteAck, ApiError> {
        let mut state = self.state();
        state.preconditions.push(precondition.cloned());
        let booking = state
            .bookings
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| not_found("Booking not found"))?;
        if precondition.is_some_and(|p| p.updated_at != booking.updated_at) {
            return Err(ApiError::Status {
                status: 412,
                message: Some("Booking was modified by someone else".into()),
            });
        }
        booking.booking_status = status;
        booking.updated_at = TimeStamp::new();
        Ok(RemoteAck::default())
    }

    fn check_lists(&self) -> Result<(), ApiError> {
        let mut state = self.state();
        state.list_calls += 1;
        if state.fail_lists {
            return Err(ApiError::Status {
                status: 503,
                message: Some("Service unavailable".into()),
            });
        }
        Ok(())
    }
}

fn not_found(message: &str) -> ApiError {
    ApiError::Status {
        status: 404,
        message: Some(message.to_string()),
    }
}

fn page_of<T: Clone>(items: Vec<T>, pagination: Pagination) -> Page<T> {
    let total = items.len() as u64;
    let start = (pagination.page.saturating_sub(1) * pagination.limit) as usize;
    Page {
        data: items
            .into_iter()
            .skip(start)
            .take(pagination.limit as usize)
            .collect(),
        total,
    }
}

#[async_trait]
impl BookingApi for FakeApi {
    async fn list_bookings(&self, query: &BookingQuery) -> Result<Page<Booking>, ApiError> {
        self.check_lists()?;
        let bookings: Vec<Booking> = self
            .state()
            .bookings
            .iter()
            .filter(|b| query.status.is_none_or(|s| b.booking_status == s))
            .cloned()
            .collect();
        Ok(page_of(bookings, query.pagination))
    }

    async fn accept_booking(&self, id: &str, precondition: Option<&Precondition>) -> Result<RemoteAck, ApiError> {
        self.begin_mutation().await?;
        self.set_booking_status(id, BookingStatus::Confirmed, precondition)
    }

    async fn reject_booking(&self, id: &str, precondition: Option<&Precondition>) -> Result<RemoteAck, ApiError> {
        self.begin_mutation().await?;
        self.set_booking_status(id, BookingStatus::Rejected, precondition)
    }

    async fn mark_booking_completed(
        &self,
        id: &str,
        precondition: Option<&Precondition>,
    ) -> Result<RemoteAck, ApiError> {
        self.begin_mutation().await?;
        self.set_booking_status(id, BookingStatus::Completed, precondition)
    }

    async fn admin_set_booking_status(
        &self,
        id: &str,
        status: BookingStatus,
        precondition: Option<&Precondition>,
    ) -> Result<RemoteAck, ApiError> {
        self.begin_mutation().await?;
        self.set_booking_status(id, status, precondition)
            .map(|_| RemoteAck::with_message(&format!("Booking status updated to {status}")))
    }

    async fn admin_delete_booking(&self, id: &str) -> Result<RemoteAck, ApiError> {
        self.begin_mutation().await?;
        let mut state = self.state();
        let before = state.bookings.len();
        state.bookings.retain(|b| b.id != id);
        if state.bookings.len() == before {
            return Err(not_found("Booking not found"));
        }
        Ok(RemoteAck::with_message("Booking deleted successfully"))
    }
}

#[async_trait]
impl KycApi for FakeApi {
    async fn list_kyc(&self, filter: KycFilter, pagination: Pagination) -> Result<Page<KycRecord>, ApiError> {
        self.check_lists()?;
        let records: Vec<KycRecord> = self
            .state()
            .kyc
            .iter()
            .filter(|r| filter == KycFilter::All || r.status == KycStatus::Pending)
            .cloned()
            .collect();
        Ok(page_of(records, pagination))
    }

    async fn verify_kyc(
        &self,
        id: &str,
        decision: KycDecision,
        reason: Option<&str>,
    ) -> Result<RemoteAck, ApiError> {
        self.begin_mutation().await?;
        let mut state = self.state();
        let record = state
            .kyc
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| not_found("KYC not found"))?;
        record.status = decision.status();
        record.rejected_reason = reason.map(str::to_string);
        Ok(RemoteAck::default())
    }

    async fn get_my_kyc(&self) -> Result<Option<KycRecord>, ApiError> {
        Ok(self.state().my_kyc.clone())
    }

    async fn update_kyc(&self, patch: &KycPatch) -> Result<KycRecord, ApiError> {
        self.begin_mutation().await?;
        let mut state = self.state();
        let record = state
            .my_kyc
            .as_mut()
            .ok_or_else(|| not_found("KYC not found"))?;
        record.apply_patch(patch).map_err(|e| ApiError::Status {
            status: 422,
            message: Some(e.to_string()),
        })?;
        Ok(record.clone())
    }
}

#[async_trait]
impl SubAdminApi for FakeApi {
    async fn list_permissions(&self) -> Result<Vec<Permission>, ApiError> {
        Ok(self.state().permissions.clone())
    }

    async fn list_sub_admins(&self, pagination: Pagination) -> Result<Page<SubAdmin>, ApiError> {
        self.check_lists()?;
        Ok(page_of(self.state().sub_admins.clone(), pagination))
    }

    async fn create_sub_admin(&self, sub_admin: &NewSubAdmin) -> Result<SubAdmin, ApiError> {
        self.begin_mutation().await?;
        let mut state = self.state();
        let created = SubAdmin {
            id: format!("sa{}", state.sub_admins.len() + 1),
            name: sub_admin.name.clone(),
            email: sub_admin.email.clone(),
            permission_ids: sub_admin.permission_ids.clone(),
        };
        state.sub_admins.push(created.clone());
        Ok(created)
    }

    async fn update_sub_admin_permissions(
        &self,
        id: &str,
        permission_ids: &[String],
    ) -> Result<SubAdmin, ApiError> {
        self.begin_mutation().await?;
        let mut state = self.state();
        let sub_admin = state
            .sub_admins
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| not_found("Sub-admin not found"))?;
        sub_admin.permission_ids = permission_ids.to_vec();
        Ok(sub_admin.clone())
    }

    async fn delete_sub_admin(&self, id: &str) -> Result<RemoteAck, ApiError> {
        self.begin_mutation().await?;
        let mut state = self.state();
        state.sub_admins.retain(|s| s.id != id);
        Ok(RemoteAck {
            message: state.delete_ack.clone(),
        })
    }
}

// FIXTURES

/// A booking scheduled for 2025-03-01 10:30 IST (05:00 UTC).
pub fn booking(id: &str, status: BookingStatus) -> Booking {
    Booking::builder(id)
        .set_user("u1")
        .set_owner("o1")
        .set_vehicle(&format!("v-{id}"))
        .set_driver("d1")
        .set_source(28.6139, 77.2090, Some("Connaught Place"))
        .set_destination(28.5562, 77.1000, Some("IGI Airport T3"))
        .set_distance_km(16.4)
        .set_schedule("2025-03-01", "10:30")
        .set_payment(145_000, PaymentStatus::Pending)
        .set_status(status)
        .set_updated_at(TimeStamp::new_with(2025, 2, 20, 9, 0, 0))
        .build()
        .unwrap()
}

pub fn kyc_record(id: &str, status: KycStatus) -> KycRecord {
    KycRecord {
        id: id.to_string(),
        owner_id: format!("owner-{id}"),
        status,
        rejected_reason: None,
        name: "Ravi Kumar".into(),
        mobile: "9876543210".into(),
        email: "ravi@example.com".into(),
        company_name: "Kumar Travels".into(),
        address: "12 MG Road".into(),
        city: "Bengaluru".into(),
        state: "Karnataka".into(),
        pincode: "560001".into(),
        pan_number: "ABCDE1234F".into(),
        gst_number: None,
        account_number: "123456789012".into(),
        bank_name: "State Bank of India".into(),
        ifsc_code: "SBIN0001234".into(),
    }
}
