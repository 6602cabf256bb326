//! Booking lifecycle controller
//!
//! The single path through which any dashboard requests a booking mutation:
//! authorize, check the transition table, call the API, then reconcile the
//! locally held list. Local state is only touched after the server commits.
use chrono::{DateTime, FixedOffset, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::api::{BookingApi, BookingQuery, Page, Precondition};
use crate::booking::{Booking, BookingStatus};
use crate::config::ClientConfig;
use crate::error::{LifecycleError, TransitionDenial};
use crate::inflight::InFlight;
use crate::journal::{Journal, SubjectKind, note_committed};
use crate::permission::Actor;
use crate::policy::{Action, BookingCapabilities, authorize, booking_capabilities, permits};
use crate::transition::{self, TimeContext, check_delete, check_transition};
use crate::types::{TimeStamp, ist};
use crate::utils::is_blank;

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingCommand {
    Accept,
    Reject,
    Complete,
    Cancel,
}

impl BookingCommand {
    pub const ALL: [BookingCommand; 4] = [
        BookingCommand::Accept,
        BookingCommand::Reject,
        BookingCommand::Complete,
        BookingCommand::Cancel,
    ];

    pub fn for_target(target: BookingStatus) -> Option<Self> {
        match target {
            BookingStatus::Confirmed => Some(BookingCommand::Accept),
            BookingStatus::Rejected => Some(BookingCommand::Reject),
            BookingStatus::Completed => Some(BookingCommand::Complete),
            BookingStatus::Cancelled => Some(BookingCommand::Cancel),
            BookingStatus::Pending => None,
        }
    }

    pub fn target(&self) -> BookingStatus {
        match self {
            BookingCommand::Accept => BookingStatus::Confirmed,
            BookingCommand::Reject => BookingStatus::Rejected,
            BookingCommand::Complete => BookingStatus::Completed,
            BookingCommand::Cancel => BookingStatus::Cancelled,
        }
    }

    pub fn action(&self) -> Action {
        match self {
            BookingCommand::Accept => Action::AcceptBooking,
            BookingCommand::Reject => Action::RejectBooking,
            BookingCommand::Complete => Action::CompleteBooking,
            BookingCommand::Cancel => Action::CancelBooking,
        }
    }

    fn success_message(&self) -> &'static str {
        match self {
            BookingCommand::Accept => "Booking accepted successfully",
            BookingCommand::Reject => "Booking rejected",
            BookingCommand::Complete => "Trip marked as completed",
            BookingCommand::Cancel => "Booking cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransitionOutcome {
    pub booking: Booking,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionOutcome {
    pub booking_id: String,
    pub message: String,
}

/// First half of a delete. Nothing is sent until it is passed to
/// [`LifecycleController::confirm_delete`]; dropping it abandons the delete.
#[must_use = "the booking is only deleted once the intent is confirmed"]
#[derive(Debug, Clone)]
pub struct DeleteIntent {
    booking_id: String,
    actor: Actor,
}

impl DeleteIntent {
    pub fn booking_id(&self) -> &str {
        &self.booking_id
    }

    pub fn prompt(&self) -> String {
        format!(
            "Delete booking {}? This cannot be undone.",
            self.booking_id
        )
    }
}

/// Another confirmed booking for the same vehicle at the same slot, if the
/// list holds one.
pub fn find_overlap<'a>(bookings: &'a [Booking], booking: &Booking) -> Option<&'a Booking> {
    bookings.iter().find(|other| {
        other.id != booking.id
            && other.vehicle_id == booking.vehicle_id
            && other.booking_status == BookingStatus::Confirmed
            && other.booking_date.trim() == booking.booking_date.trim()
            && other.booking_time.trim() == booking.booking_time.trim()
    })
}

fn illegal(booking_id: &str, from: &str, to: &str, reason: TransitionDenial) -> LifecycleError {
    LifecycleError::IllegalTransition {
        subject: format!("booking {booking_id}"),
        from: from.to_string(),
        to: to.to_string(),
        reason,
    }
}

fn patched(mut booking: Booking, status: BookingStatus) -> Booking {
    booking.booking_status = status;
    booking.updated_at = TimeStamp::new();
    booking
}

pub struct LifecycleController<A> {
    api: A,
    query: BookingQuery,
    list: Mutex<Page<Booking>>,
    in_flight: InFlight,
    journal: Option<Journal>,
    offset: FixedOffset,
    clock: Clock,
}

impl<A: BookingApi> LifecycleController<A> {
    pub fn new(api: A, query: BookingQuery) -> Self {
        Self {
            api,
            query,
            list: Mutex::new(Page::default()),
            in_flight: InFlight::new(),
            journal: None,
            offset: ist(),
            clock: Arc::new(Utc::now),
        }
    }

    /// Reads schedules in the configured offset and journals to the
    /// configured path, if any.
    pub fn from_config(api: A, query: BookingQuery, config: &ClientConfig) -> anyhow::Result<Self> {
        let controller = Self::new(api, query).with_offset(config.utc_offset);
        Ok(match &config.journal_path {
            Some(path) => controller.with_journal(Journal::open(path)?),
            None => controller,
        })
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn with_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn query(&self) -> &BookingQuery {
        &self.query
    }

    pub fn journal(&self) -> Option<&Journal> {
        self.journal.as_ref()
    }

    fn lock_list(&self) -> MutexGuard<'_, Page<Booking>> {
        self.list.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn time_context(&self) -> TimeContext {
        TimeContext::at((self.clock)(), self.offset)
    }

    pub fn snapshot(&self) -> Vec<Booking> {
        self.lock_list().data.clone()
    }

    pub fn total(&self) -> u64 {
        self.lock_list().total
    }

    pub fn booking(&self, booking_id: &str) -> Option<Booking> {
        self.lock_list()
            .data
            .iter()
            .find(|b| b.id == booking_id)
            .cloned()
    }

    /// True while a mutation for this booking is outstanding; controls for it
    /// should be disabled.
    pub fn is_processing(&self, booking_id: &str) -> bool {
        self.in_flight.contains(booking_id)
    }

    pub fn capabilities(&self, booking_id: &str, actor: &Actor) -> Option<BookingCapabilities> {
        let booking = self.booking(booking_id)?;
        if self.is_processing(booking_id) {
            return Some(BookingCapabilities::none());
        }
        Some(booking_capabilities(actor, &booking, &self.time_context()))
    }

    pub fn legal_targets(&self, booking_id: &str, actor: &Actor) -> Vec<BookingStatus> {
        match self.booking(booking_id) {
            Some(booking) => transition::legal_targets(&booking, actor.role, &self.time_context())
                .into_iter()
                .filter(|target| {
                    Action::for_target(*target)
                        .is_some_and(|action| permits(actor, action))
                })
                .collect(),
            None => Vec::new(),
        }
    }

    /// Loads the list this controller manages.
    #[tracing::instrument(skip(self, actor), fields(scope = self.query.scope.as_str(), role = %actor.role))]
    pub async fn refresh(&self, actor: &Actor) -> Result<usize, LifecycleError> {
        authorize(actor, Action::ListBookings)?;

        let page = self.api.list_bookings(&self.query).await.map_err(|e| {
            warn!(error = %e, "failed to load bookings");
            LifecycleError::from(e)
        })?;
        let count = page.data.len();
        *self.lock_list() = page;

        debug!(count, "bookings loaded");
        Ok(count)
    }

    #[tracing::instrument(skip(self, actor), fields(role = %actor.role))]
    pub async fn request_transition(
        &self,
        booking_id: &str,
        target: BookingStatus,
        actor: &Actor,
    ) -> Result<TransitionOutcome, LifecycleError> {
        let command = BookingCommand::for_target(target);
        // no command moves a booking back to pending; actors holding no booking
        // mutation at all are refused by policy before the table is consulted
        let action = match command {
            Some(command) => command.action(),
            None => BookingCommand::ALL
                .iter()
                .map(BookingCommand::action)
                .find(|action| permits(actor, *action))
                .unwrap_or(Action::AcceptBooking),
        };
        authorize(actor, action).inspect_err(|e| debug!(%e, "denied by policy"))?;

        let Some(command) = command else {
            let from = self
                .booking(booking_id)
                .map(|b| b.booking_status.to_string())
                .unwrap_or_else(|| "unknown".into());
            return Err(illegal(booking_id, &from, target.as_str(), TransitionDenial::NotInTable));
        };

        let booking = self
            .booking(booking_id)
            .ok_or_else(|| LifecycleError::NotFound(booking_id.to_string()))?;
        let from = booking.booking_status;

        check_transition(&booking, target, actor.role, &self.time_context())
            .map_err(|reason| illegal(booking_id, from.as_str(), target.as_str(), reason))
            .inspect_err(|e| debug!(%e, "denied by transition rules"))?;

        let _guard = self.in_flight.try_acquire(booking_id).ok_or_else(|| {
            illegal(booking_id, from.as_str(), target.as_str(), TransitionDenial::InFlight)
        })?;

        if command == BookingCommand::Accept {
            if let Some(other) = find_overlap(&self.lock_list().data, &booking) {
                warn!(
                    vehicle_id = %booking.vehicle_id,
                    conflicting = %other.id,
                    "vehicle already has a confirmed booking in this slot"
                );
            }
        }

        let precondition = Precondition::from(&booking);
        let result = match command {
            BookingCommand::Accept => self.api.accept_booking(booking_id, Some(&precondition)).await,
            BookingCommand::Reject => self.api.reject_booking(booking_id, Some(&precondition)).await,
            BookingCommand::Complete => {
                self.api
                    .mark_booking_completed(booking_id, Some(&precondition))
                    .await
            }
            BookingCommand::Cancel => {
                self.api
                    .admin_set_booking_status(booking_id, target, Some(&precondition))
                    .await
            }
        };
        let ack = result.map_err(|e| {
            warn!(error = %e, "booking mutation rejected by server");
            LifecycleError::from(e)
        })?;

        let updated = self.reconcile(booking, target).await;
        let message = ack
            .message
            .filter(|m| !is_blank(m))
            .unwrap_or_else(|| command.success_message().to_string());

        note_committed(
            self.journal.as_ref(),
            SubjectKind::Booking,
            booking_id,
            actor,
            from.as_str(),
            target.as_str(),
            &message,
        );
        info!(from = %from, to = %target, "booking transition committed");

        Ok(TransitionOutcome {
            booking: updated,
            message,
        })
    }

    pub async fn accept(&self, booking_id: &str, actor: &Actor) -> Result<TransitionOutcome, LifecycleError> {
        self.request_transition(booking_id, BookingStatus::Confirmed, actor).await
    }

    pub async fn reject(&self, booking_id: &str, actor: &Actor) -> Result<TransitionOutcome, LifecycleError> {
        self.request_transition(booking_id, BookingStatus::Rejected, actor).await
    }

    pub async fn complete(&self, booking_id: &str, actor: &Actor) -> Result<TransitionOutcome, LifecycleError> {
        self.request_transition(booking_id, BookingStatus::Completed, actor).await
    }

    pub async fn cancel(&self, booking_id: &str, actor: &Actor) -> Result<TransitionOutcome, LifecycleError> {
        self.request_transition(booking_id, BookingStatus::Cancelled, actor).await
    }

    // refetch so the list reflects the server; fall back to patching the
    // local copy when the refetch itself fails
    async fn reconcile(&self, previous: Booking, target: BookingStatus) -> Booking {
        match self.api.list_bookings(&self.query).await {
            Ok(page) => {
                let updated = page.data.iter().find(|b| b.id == previous.id).cloned();
                *self.lock_list() = page;
                updated.unwrap_or_else(|| patched(previous, target))
            }
            Err(e) => {
                warn!(error = %e, "refetch after mutation failed, patching local copy");
                let updated = patched(previous, target);
                if let Some(slot) = self
                    .lock_list()
                    .data
                    .iter_mut()
                    .find(|b| b.id == updated.id)
                {
                    *slot = updated.clone();
                }
                updated
            }
        }
    }

    pub fn prepare_delete(&self, booking_id: &str, actor: &Actor) -> Result<DeleteIntent, LifecycleError> {
        authorize(actor, Action::DeleteBooking)?;
        let booking = self
            .booking(booking_id)
            .ok_or_else(|| LifecycleError::NotFound(booking_id.to_string()))?;
        check_delete(&booking, actor.role).map_err(|reason| {
            illegal(booking_id, booking.booking_status.as_str(), "deleted", reason)
        })?;

        Ok(DeleteIntent {
            booking_id: booking_id.to_string(),
            actor: actor.clone(),
        })
    }

    /// Second half of a delete. Rules are checked again against the list as it
    /// is now, since it may have changed while the prompt was open.
    #[tracing::instrument(skip(self, intent), fields(booking_id = %intent.booking_id))]
    pub async fn confirm_delete(&self, intent: DeleteIntent) -> Result<DeletionOutcome, LifecycleError> {
        let DeleteIntent { booking_id, actor } = intent;
        authorize(&actor, Action::DeleteBooking)?;
        let booking = self
            .booking(&booking_id)
            .ok_or_else(|| LifecycleError::NotFound(booking_id.clone()))?;
        let from = booking.booking_status;
        check_delete(&booking, actor.role)
            .map_err(|reason| illegal(&booking_id, from.as_str(), "deleted", reason))?;

        let _guard = self
            .in_flight
            .try_acquire(&booking_id)
            .ok_or_else(|| illegal(&booking_id, from.as_str(), "deleted", TransitionDenial::InFlight))?;

        let ack = self.api.admin_delete_booking(&booking_id).await.map_err(|e| {
            warn!(error = %e, "booking delete rejected by server");
            LifecycleError::from(e)
        })?;

        match self.api.list_bookings(&self.query).await {
            Ok(page) => *self.lock_list() = page,
            Err(e) => {
                warn!(error = %e, "refetch after delete failed, removing local copy");
                let mut list = self.lock_list();
                let before = list.data.len();
                list.data.retain(|b| b.id != booking_id);
                if list.data.len() < before {
                    list.total = list.total.saturating_sub(1);
                }
            }
        }

        let message = ack
            .message
            .filter(|m| !is_blank(m))
            .unwrap_or_else(|| "Booking deleted".to_string());
        note_committed(
            self.journal.as_ref(),
            SubjectKind::Booking,
            &booking_id,
            &actor,
            from.as_str(),
            "deleted",
            &message,
        );
        info!(from = %from, "booking deleted");

        Ok(DeletionOutcome { booking_id, message })
    }
}
