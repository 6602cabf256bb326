//! Booking entity and its derived display fields
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::LifecycleError;
use crate::types::TimeStamp;
use crate::utils::is_blank;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Initiated,
    Success,
    Failed,
    Refunded,
}

/// Colour family a badge is drawn with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTone {
    Warning,
    Info,
    Success,
    Neutral,
    Danger,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 5] = [
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        BookingStatus::Completed,
        BookingStatus::Cancelled,
        BookingStatus::Rejected,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Completed | BookingStatus::Cancelled | BookingStatus::Rejected
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Rejected => "rejected",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "Pending",
            BookingStatus::Confirmed => "Confirmed",
            BookingStatus::Completed => "Completed",
            BookingStatus::Cancelled => "Cancelled",
            BookingStatus::Rejected => "Rejected",
        }
    }

    pub fn tone(&self) -> StatusTone {
        match self {
            BookingStatus::Pending => StatusTone::Warning,
            BookingStatus::Confirmed => StatusTone::Info,
            BookingStatus::Completed => StatusTone::Success,
            BookingStatus::Cancelled => StatusTone::Neutral,
            BookingStatus::Rejected => StatusTone::Danger,
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Initiated => "initiated",
            PaymentStatus::Success => "success",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Initiated => "Initiated",
            PaymentStatus::Success => "Paid",
            PaymentStatus::Failed => "Failed",
            PaymentStatus::Refunded => "Refunded",
        }
    }

    pub fn tone(&self) -> StatusTone {
        match self {
            PaymentStatus::Pending | PaymentStatus::Initiated => StatusTone::Warning,
            PaymentStatus::Success => StatusTone::Success,
            PaymentStatus::Failed => StatusTone::Danger,
            PaymentStatus::Refunded => StatusTone::Neutral,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.5},{:.5}", self.lat, self.lng)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("unreadable booking date {0:?}")]
    Date(String),
    #[error("unreadable booking time {0:?}")]
    Time(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub user_id: String,
    pub owner_id: String,
    pub vehicle_id: String,
    #[serde(default)]
    pub driver_id: Option<String>,
    pub source: Coordinates,
    #[serde(default)]
    pub source_address: Option<String>,
    pub destination: Coordinates,
    #[serde(default)]
    pub destination_address: Option<String>,
    #[serde(default)]
    pub distance_km: Option<f64>,
    pub booking_date: String, // YYYY-MM-DD as entered
    pub booking_time: String, // HH:MM as entered
    pub payment_amount: u64,  // paise
    pub payment_status: PaymentStatus,
    pub booking_status: BookingStatus,
    pub created_at: TimeStamp<Utc>,
    pub updated_at: TimeStamp<Utc>,
}

impl Booking {
    pub fn builder(id: &str) -> BookingBuilder {
        BookingBuilder::new(id)
    }

    pub fn is_terminal(&self) -> bool {
        self.booking_status.is_terminal()
    }

    /// The instant the trip is due to start, read in the dashboard's offset.
    pub fn scheduled_at(&self, offset: FixedOffset) -> Result<DateTime<Utc>, ScheduleError> {
        let date = parse_booking_date(&self.booking_date, offset)?;
        let time = parse_booking_time(&self.booking_time)?;

        offset
            .from_local_datetime(&date.and_time(time))
            .single()
            .map(|local| local.with_timezone(&Utc))
            .ok_or_else(|| ScheduleError::Time(self.booking_time.clone()))
    }

    /// Flags the payment/booking pairs that should not normally occur.
    pub fn is_payment_consistent(&self) -> bool {
        !matches!(
            (self.booking_status, self.payment_status),
            (BookingStatus::Completed, PaymentStatus::Failed)
                | (BookingStatus::Pending, PaymentStatus::Refunded)
        )
    }

    pub fn route_summary(&self) -> String {
        let from = self
            .source_address
            .as_deref()
            .filter(|a| !is_blank(a))
            .map(str::to_string)
            .unwrap_or_else(|| self.source.to_string());
        let to = self
            .destination_address
            .as_deref()
            .filter(|a| !is_blank(a))
            .map(str::to_string)
            .unwrap_or_else(|| self.destination.to_string());

        match self.distance_km {
            Some(km) => format!("{from} → {to} ({km:.1} km)"),
            None => format!("{from} → {to}"),
        }
    }

    /// Amount in rupees for display, e.g. `₹1,250.00`.
    pub fn amount_label(&self) -> String {
        let rupees = self.payment_amount / 100;
        let paise = self.payment_amount % 100;
        let digits = rupees.to_string();
        let mut grouped = String::new();
        for (i, c) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(c);
        }
        format!("₹{grouped}.{paise:02}")
    }
}

fn parse_booking_date(raw: &str, offset: FixedOffset) -> Result<NaiveDate, ScheduleError> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date);
    }
    // some records carry a full ISO timestamp in the date column
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&offset).date_naive())
        .map_err(|_| ScheduleError::Date(raw.to_string()))
}

fn parse_booking_time(raw: &str) -> Result<NaiveTime, ScheduleError> {
    let raw = raw.trim();
    ["%H:%M:%S", "%H:%M", "%I:%M %p"]
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(raw, fmt).ok())
        .ok_or_else(|| ScheduleError::Time(raw.to_string()))
}

// used for assembling bookings in fakes and fixtures
#[derive(Debug, Clone)]
pub struct BookingBuilder {
    id: String,
    user_id: Option<String>,
    owner_id: Option<String>,
    vehicle_id: Option<String>,
    driver_id: Option<String>,
    source: Coordinates,
    source_address: Option<String>,
    destination: Coordinates,
    destination_address: Option<String>,
    distance_km: Option<f64>,
    booking_date: Option<String>,
    booking_time: Option<String>,
    payment_amount: u64,
    payment_status: PaymentStatus,
    booking_status: BookingStatus,
    updated_at: Option<TimeStamp<Utc>>,
}

impl BookingBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            user_id: None,
            owner_id: None,
            vehicle_id: None,
            driver_id: None,
            source: Coordinates::default(),
            source_address: None,
            destination: Coordinates::default(),
            destination_address: None,
            distance_km: None,
            booking_date: None,
            booking_time: None,
            payment_amount: 0,
            payment_status: PaymentStatus::Pending,
            booking_status: BookingStatus::Pending,
            updated_at: None,
        }
    }
    pub fn set_user(mut self, user_id: &str) -> Self {
        self.user_id = Some(user_id.to_string());
        self
    }
    pub fn set_owner(mut self, owner_id: &str) -> Self {
        self.owner_id = Some(owner_id.to_string());
        self
    }
    pub fn set_vehicle(mut self, vehicle_id: &str) -> Self {
        self.vehicle_id = Some(vehicle_id.to_string());
        self
    }
    pub fn set_driver(mut self, driver_id: &str) -> Self {
        self.driver_id = Some(driver_id.to_string());
        self
    }
    pub fn set_source(mut self, lat: f64, lng: f64, address: Option<&str>) -> Self {
        self.source = Coordinates { lat, lng };
        self.source_address = address.map(str::to_string);
        self
    }
    pub fn set_destination(mut self, lat: f64, lng: f64, address: Option<&str>) -> Self {
        self.destination = Coordinates { lat, lng };
        self.destination_address = address.map(str::to_string);
        self
    }
    pub fn set_distance_km(mut self, km: f64) -> Self {
        self.distance_km = Some(km);
        self
    }
    pub fn set_schedule(mut self, date: &str, time: &str) -> Self {
        self.booking_date = Some(date.to_string());
        self.booking_time = Some(time.to_string());
        self
    }
    pub fn set_payment(mut self, amount: u64, status: PaymentStatus) -> Self {
        self.payment_amount = amount;
        self.payment_status = status;
        self
    }
    pub fn set_status(mut self, status: BookingStatus) -> Self {
        self.booking_status = status;
        self
    }
    pub fn set_updated_at(mut self, at: TimeStamp<Utc>) -> Self {
        self.updated_at = Some(at);
        self
    }

    pub fn build(self) -> Result<Booking, LifecycleError> {
        if is_blank(&self.id) {
            return Err(LifecycleError::malformed("id", "booking id is required"));
        }
        let user_id = self
            .user_id
            .ok_or_else(|| LifecycleError::malformed("user_id", "customer is required"))?;
        let owner_id = self
            .owner_id
            .ok_or_else(|| LifecycleError::malformed("owner_id", "owner is required"))?;
        let vehicle_id = self
            .vehicle_id
            .ok_or_else(|| LifecycleError::malformed("vehicle_id", "vehicle is required"))?;
        let booking_date = self
            .booking_date
            .ok_or_else(|| LifecycleError::malformed("booking_date", "date is required"))?;
        let booking_time = self
            .booking_time
            .ok_or_else(|| LifecycleError::malformed("booking_time", "time is required"))?;

        let created_at = TimeStamp::new();
        let updated_at = self.updated_at.unwrap_or_else(|| created_at.clone());

        Ok(Booking {
            id: self.id,
            user_id,
            owner_id,
            vehicle_id,
            driver_id: self.driver_id,
            source: self.source,
            source_address: self.source_address,
            destination: self.destination,
            destination_address: self.destination_address,
            distance_km: self.distance_km,
            booking_date,
            booking_time,
            payment_amount: self.payment_amount,
            payment_status: self.payment_status,
            booking_status: self.booking_status,
            created_at,
            updated_at,
        })
    }
}
