//! Booking status transition table
//!
//! Pure functions only: given where a booking is, who is asking and what the
//! clock says, decide which statuses it may move to. Nothing here touches the
//! network or the local list.
use chrono::{DateTime, FixedOffset, Utc};

use crate::booking::{Booking, BookingStatus};
use crate::error::TransitionDenial;
use crate::permission::Role;
use crate::types::ist;

struct Rule {
    from: BookingStatus,
    to: BookingStatus,
    actors: &'static [Role],
    // drivers may only take this edge once the trip is due
    driver_time_gated: bool,
}

const TABLE: &[Rule] = &[
    Rule {
        from: BookingStatus::Pending,
        to: BookingStatus::Confirmed,
        actors: &[Role::Owner, Role::Driver],
        driver_time_gated: false,
    },
    Rule {
        from: BookingStatus::Pending,
        to: BookingStatus::Rejected,
        actors: &[Role::Owner, Role::Driver],
        driver_time_gated: false,
    },
    Rule {
        from: BookingStatus::Confirmed,
        to: BookingStatus::Completed,
        actors: &[Role::Owner, Role::Driver],
        driver_time_gated: true,
    },
    Rule {
        from: BookingStatus::Pending,
        to: BookingStatus::Cancelled,
        actors: &[Role::Admin],
        driver_time_gated: false,
    },
    Rule {
        from: BookingStatus::Confirmed,
        to: BookingStatus::Cancelled,
        actors: &[Role::Admin],
        driver_time_gated: false,
    },
];

/// The clock a decision is taken against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeContext {
    pub now: DateTime<Utc>,
    pub offset: FixedOffset,
}

impl TimeContext {
    pub fn at(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self { now, offset }
    }
    pub fn now() -> Self {
        Self::at(Utc::now(), ist())
    }
}

fn rule(from: BookingStatus, to: BookingStatus, role: Role) -> Option<&'static Rule> {
    TABLE
        .iter()
        .find(|r| r.from == from && r.to == to && r.actors.contains(&role))
}

pub fn check_transition(
    booking: &Booking,
    to: BookingStatus,
    role: Role,
    time: &TimeContext,
) -> Result<(), TransitionDenial> {
    let from = booking.booking_status;
    if from.is_terminal() {
        return Err(TransitionDenial::Terminal);
    }
    let rule = rule(from, to, role).ok_or(TransitionDenial::NotInTable)?;

    if rule.driver_time_gated && role == Role::Driver {
        // fail closed: an unreadable schedule never opens the guard
        let scheduled = booking
            .scheduled_at(time.offset)
            .map_err(|_| TransitionDenial::UnparseableSchedule)?;
        if time.now < scheduled {
            return Err(TransitionDenial::NotYetDue { scheduled });
        }
    }

    Ok(())
}

/// Targets to render as actions, in table order. Time-gated targets that are
/// not yet open are left out; see [`crate::policy::booking_capabilities`] for
/// the disabled-but-visible rendering.
pub fn legal_targets(booking: &Booking, role: Role, time: &TimeContext) -> Vec<BookingStatus> {
    TABLE
        .iter()
        .filter(|r| r.from == booking.booking_status)
        .map(|r| r.to)
        .filter(|to| check_transition(booking, *to, role, time).is_ok())
        .collect()
}

/// Deleting is an admin override available on any non-terminal booking.
pub fn check_delete(booking: &Booking, role: Role) -> Result<(), TransitionDenial> {
    if booking.is_terminal() {
        return Err(TransitionDenial::Terminal);
    }
    if role != Role::Admin {
        return Err(TransitionDenial::NotInTable);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn booking(status: BookingStatus) -> Booking {
        Booking::builder("B1")
            .set_user("u1")
            .set_owner("o1")
            .set_vehicle("v1")
            .set_driver("d1")
            .set_schedule("2025-03-01", "10:30")
            .set_status(status)
            .build()
            .unwrap()
    }

    fn due() -> DateTime<Utc> {
        // 10:30 IST
        Utc.with_ymd_and_hms(2025, 3, 1, 5, 0, 0).unwrap()
    }

    #[test]
    fn owner_accepts_pending() {
        let time = TimeContext::at(due(), ist());
        let b = booking(BookingStatus::Pending);

        assert!(check_transition(&b, BookingStatus::Confirmed, Role::Owner, &time).is_ok());
        assert_eq!(
            legal_targets(&b, Role::Owner, &time),
            vec![BookingStatus::Confirmed, BookingStatus::Rejected]
        );
    }

    #[test]
    fn admin_only_cancels() {
        let time = TimeContext::at(due(), ist());
        let b = booking(BookingStatus::Confirmed);

        assert_eq!(
            legal_targets(&b, Role::Admin, &time),
            vec![BookingStatus::Cancelled]
        );
        assert_eq!(
            check_transition(&b, BookingStatus::Cancelled, Role::Owner, &time),
            Err(TransitionDenial::NotInTable)
        );
    }

    #[test]
    fn confirmed_to_confirmed_is_not_a_transition() {
        let time = TimeContext::at(due(), ist());
        let b = booking(BookingStatus::Confirmed);
        assert_eq!(
            check_transition(&b, BookingStatus::Confirmed, Role::Owner, &time),
            Err(TransitionDenial::NotInTable)
        );
    }

    #[test]
    fn driver_completion_is_time_gated() {
        let b = booking(BookingStatus::Confirmed);

        let early = TimeContext::at(due() - Duration::seconds(1), ist());
        assert_eq!(
            check_transition(&b, BookingStatus::Completed, Role::Driver, &early),
            Err(TransitionDenial::NotYetDue { scheduled: due() })
        );
        assert!(legal_targets(&b, Role::Driver, &early).is_empty());

        let on_time = TimeContext::at(due(), ist());
        assert!(check_transition(&b, BookingStatus::Completed, Role::Driver, &on_time).is_ok());

        // the owner is not gated
        assert!(check_transition(&b, BookingStatus::Completed, Role::Owner, &early).is_ok());
    }

    #[test]
    fn malformed_schedule_fails_closed() {
        let mut b = booking(BookingStatus::Confirmed);
        b.booking_time = "half past ten".into();

        let far_future = TimeContext::at(due() + Duration::days(365), ist());
        assert_eq!(
            check_transition(&b, BookingStatus::Completed, Role::Driver, &far_future),
            Err(TransitionDenial::UnparseableSchedule)
        );
    }

    #[test]
    fn terminal_statuses_offer_nothing() {
        let time = TimeContext::at(due(), ist());
        for status in [
            BookingStatus::Completed,
            BookingStatus::Cancelled,
            BookingStatus::Rejected,
        ] {
            let b = booking(status);
            for role in Role::ALL {
                assert!(legal_targets(&b, role, &time).is_empty());
                assert_eq!(check_delete(&b, role), Err(TransitionDenial::Terminal));
            }
        }
    }

    #[test]
    fn delete_is_admin_only() {
        let b = booking(BookingStatus::Pending);
        assert!(check_delete(&b, Role::Admin).is_ok());
        assert_eq!(
            check_delete(&b, Role::Owner),
            Err(TransitionDenial::NotInTable)
        );
    }
}
