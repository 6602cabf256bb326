//! Authorization policy
//!
//! Decides whether an actor may invoke an action at all, independent of the
//! record's current status. The decision is local and synchronous; the server
//! repeats it authoritatively.
use std::fmt;

use crate::booking::{Booking, BookingStatus};
use crate::error::{LifecycleError, TransitionDenial};
use crate::permission::{Actor, Role};
use crate::transition::{TimeContext, check_delete, check_transition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    AcceptBooking,
    RejectBooking,
    CompleteBooking,
    CancelBooking,
    DeleteBooking,
    ListBookings,
    ListKyc,
    VerifyKyc,
    ManageOwnKyc,
    ManageSubAdmins,
}

impl Action {
    pub const ALL: [Action; 10] = [
        Action::AcceptBooking,
        Action::RejectBooking,
        Action::CompleteBooking,
        Action::CancelBooking,
        Action::DeleteBooking,
        Action::ListBookings,
        Action::ListKyc,
        Action::VerifyKyc,
        Action::ManageOwnKyc,
        Action::ManageSubAdmins,
    ];

    /// The action a move to `target` is requested through.
    pub fn for_target(target: BookingStatus) -> Option<Action> {
        match target {
            BookingStatus::Confirmed => Some(Action::AcceptBooking),
            BookingStatus::Rejected => Some(Action::RejectBooking),
            BookingStatus::Completed => Some(Action::CompleteBooking),
            BookingStatus::Cancelled => Some(Action::CancelBooking),
            BookingStatus::Pending => None,
        }
    }

    /// `resource:action` tuple a sub-admin must hold.
    pub fn required_grant(&self) -> Option<(&'static str, &'static str)> {
        match self {
            Action::AcceptBooking
            | Action::RejectBooking
            | Action::CompleteBooking
            | Action::CancelBooking => Some(("bookings", "update")),
            Action::DeleteBooking => Some(("bookings", "delete")),
            Action::ListBookings => Some(("bookings", "read")),
            Action::ListKyc => Some(("kyc", "read")),
            Action::VerifyKyc => Some(("kyc", "verify")),
            Action::ManageOwnKyc | Action::ManageSubAdmins => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::AcceptBooking => "accept bookings",
            Action::RejectBooking => "reject bookings",
            Action::CompleteBooking => "complete bookings",
            Action::CancelBooking => "cancel bookings",
            Action::DeleteBooking => "delete bookings",
            Action::ListBookings => "view bookings",
            Action::ListKyc => "view KYC records",
            Action::VerifyKyc => "verify KYC records",
            Action::ManageOwnKyc => "edit own KYC",
            Action::ManageSubAdmins => "manage sub-admins",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn permits(actor: &Actor, action: Action) -> bool {
    match actor.role {
        Role::Admin if !actor.sub_admin => action != Action::ManageOwnKyc,
        Role::Admin => action
            .required_grant()
            .is_some_and(|(resource, verb)| actor.permissions.allows(resource, verb)),
        // owners and drivers only ever see lists the server already scoped to them
        Role::Owner => matches!(
            action,
            Action::AcceptBooking
                | Action::RejectBooking
                | Action::CompleteBooking
                | Action::ListBookings
                | Action::ManageOwnKyc
        ),
        Role::Driver => matches!(
            action,
            Action::AcceptBooking
                | Action::RejectBooking
                | Action::CompleteBooking
                | Action::ListBookings
        ),
        Role::User => false,
    }
}

pub fn authorize(actor: &Actor, action: Action) -> Result<(), LifecycleError> {
    if permits(actor, action) {
        Ok(())
    } else {
        Err(LifecycleError::Unauthorized {
            role: actor.role,
            action,
        })
    }
}

/// How a control is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Allowed,
    // shown, not clickable
    Disabled,
    Hidden,
}

impl Capability {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Capability::Allowed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingCapabilities {
    pub accept: Capability,
    pub reject: Capability,
    pub complete: Capability,
    pub cancel: Capability,
    pub delete: Capability,
}

impl BookingCapabilities {
    pub fn none() -> Self {
        Self {
            accept: Capability::Hidden,
            reject: Capability::Hidden,
            complete: Capability::Hidden,
            cancel: Capability::Hidden,
            delete: Capability::Hidden,
        }
    }

    pub fn any_visible(&self) -> bool {
        [self.accept, self.reject, self.complete, self.cancel, self.delete]
            .iter()
            .any(|c| *c != Capability::Hidden)
    }
}

fn transition_capability(
    actor: &Actor,
    booking: &Booking,
    target: BookingStatus,
    time: &TimeContext,
) -> Capability {
    let Some(action) = Action::for_target(target) else {
        return Capability::Hidden;
    };
    if !permits(actor, action) {
        return Capability::Hidden;
    }
    match check_transition(booking, target, actor.role, time) {
        Ok(()) => Capability::Allowed,
        Err(TransitionDenial::NotYetDue { .. } | TransitionDenial::UnparseableSchedule) => {
            Capability::Disabled
        }
        Err(_) => Capability::Hidden,
    }
}

/// Combines policy and transition rules into per-control rendering hints.
pub fn booking_capabilities(
    actor: &Actor,
    booking: &Booking,
    time: &TimeContext,
) -> BookingCapabilities {
    let delete = if permits(actor, Action::DeleteBooking)
        && check_delete(booking, actor.role).is_ok()
    {
        Capability::Allowed
    } else {
        Capability::Hidden
    };

    BookingCapabilities {
        accept: transition_capability(actor, booking, BookingStatus::Confirmed, time),
        reject: transition_capability(actor, booking, BookingStatus::Rejected, time),
        complete: transition_capability(actor, booking, BookingStatus::Completed, time),
        cancel: transition_capability(actor, booking, BookingStatus::Cancelled, time),
        delete,
    }
}
