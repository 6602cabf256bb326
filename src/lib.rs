//! Booking lifecycle, KYC review and authorization policy shared by the
//! localvan admin, owner and driver dashboards.
//!
//! Every mutation goes through a controller which checks, in order, the
//! [`policy`] for the acting role, the [`transition`] table for the record's
//! current status, and the per-record in-flight guard before calling the
//! remote API. Local state only changes after the server accepts.

pub mod api;
pub mod booking;
pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod inflight;
pub mod journal;
pub mod kyc;
pub mod kyc_controller;
pub mod permission;
pub mod policy;
pub mod subadmin;
pub mod telemetry;
pub mod transition;
pub mod types;
pub mod utils;

pub use api::{BookingApi, BookingQuery, BookingScope, KycApi, Page, Pagination, SubAdminApi};
pub use booking::{Booking, BookingStatus, PaymentStatus};
pub use controller::{BookingCommand, LifecycleController, TransitionOutcome};
pub use error::{ApiError, LifecycleError, TransitionDenial};
pub use kyc::{KycDecision, KycRecord, KycStatus};
pub use kyc_controller::{KycReviewController, KycSelfService};
pub use permission::{Actor, PermissionSet, Role};
pub use policy::{Action, authorize};
pub use subadmin::SubAdminDirectory;
