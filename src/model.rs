// Booking aggregate and its sub-payloads

use crate::error::{BookingError, BookingResult};
use crate::money::Money;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Hotel,
    Vehicle,
    Package,
}

impl ResourceKind {
    pub fn prefix(self) -> &'static str {
        match self {
            ResourceKind::Hotel => "HTL",
            ResourceKind::Vehicle => "VEH",
            ResourceKind::Package => "PKG",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Hotel => "hotel",
            ResourceKind::Vehicle => "vehicle",
            ResourceKind::Package => "package",
        };
        f.write_str(name)
    }
}

// Ambiguous glyphs (0/O, 1/I) are left out so references can be read over the phone
const REFERENCE_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

// Human-readable booking identity, e.g. `PKG-20261018-K7QZ2M4X`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookingReference(String);

impl BookingReference {
    pub fn generate<R: Rng + ?Sized>(
        kind: ResourceKind,
        at: DateTime<Utc>,
        suffix_len: usize,
        rng: &mut R,
    ) -> Self {
        let suffix: String = (0..suffix_len)
            .map(|_| REFERENCE_CHARSET[rng.gen_range(0..REFERENCE_CHARSET.len())] as char)
            .collect();
        Self(format!("{}-{}-{}", kind.prefix(), at.format("%Y%m%d"), suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for BookingReference {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for BookingReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookingStatus {
    Draft,
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    // Draft -> Pending -> Confirmed -> InProgress -> Completed, Cancelled from the first three
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Draft, Pending)
                | (Pending, Confirmed)
                | (Confirmed, InProgress)
                | (InProgress, Completed)
                | (Draft, Cancelled)
                | (Pending, Cancelled)
                | (Confirmed, Cancelled)
        )
    }

    // Statuses whose inventory is held in the reservation ledger
    pub fn holds_inventory(self) -> bool {
        matches!(
            self,
            BookingStatus::Pending | BookingStatus::Confirmed | BookingStatus::InProgress
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Half-open instant range `[start, end)` a reservation occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Span {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    // Whole days from `start` midnight to `end` midnight
    pub fn from_dates(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start: midnight(start),
            end: midnight(end),
        }
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

pub fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

// Sub-payloads

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotelBooking {
    pub hotel_id: String,
    pub room_ids: BTreeSet<String>,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests: u32,
}

impl HotelBooking {
    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }

    pub fn span(&self) -> Span {
        Span::from_dates(self.check_in, self.check_out)
    }

    pub fn validate(&self) -> BookingResult<()> {
        if self.hotel_id.trim().is_empty() {
            return Err(BookingError::validation("hotelBooking.hotelId", "must not be empty"));
        }
        if self.room_ids.is_empty() {
            return Err(BookingError::validation(
                "hotelBooking.roomIds",
                "at least one room is required",
            ));
        }
        if self.check_in >= self.check_out {
            return Err(BookingError::validation(
                "hotelBooking.checkOut",
                format!("must be after check-in {}", self.check_in),
            ));
        }
        if self.guests == 0 {
            return Err(BookingError::validation("hotelBooking.guests", "must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverDetails {
    pub name: String,
    pub license_number: String,
    pub age: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleBooking {
    pub vehicle_id: String,
    pub pickup_at: DateTime<Utc>,
    pub return_at: DateTime<Utc>,
    pub pickup_location: String,
    pub return_location: String,
    #[serde(default)]
    pub insurance: Option<String>,
    #[serde(default)]
    pub driver: Option<DriverDetails>,
}

impl VehicleBooking {
    // Rental days, any started day counts in full
    pub fn days(&self) -> i64 {
        let minutes = (self.return_at - self.pickup_at).num_minutes().max(0);
        let per_day = Duration::days(1).num_minutes();
        ((minutes + per_day - 1) / per_day).max(1)
    }

    pub fn span(&self) -> Span {
        Span::new(self.pickup_at, self.return_at)
    }

    pub fn validate(&self) -> BookingResult<()> {
        if self.vehicle_id.trim().is_empty() {
            return Err(BookingError::validation("vehicleBooking.vehicleId", "must not be empty"));
        }
        if self.pickup_at >= self.return_at {
            return Err(BookingError::validation(
                "vehicleBooking.returnAt",
                "must be after pickup",
            ));
        }
        if self.pickup_location.trim().is_empty() {
            return Err(BookingError::validation(
                "vehicleBooking.pickupLocation",
                "must not be empty",
            ));
        }
        if self.return_location.trim().is_empty() {
            return Err(BookingError::validation(
                "vehicleBooking.returnLocation",
                "must not be empty",
            ));
        }
        if let Some(driver) = &self.driver {
            if driver.name.trim().is_empty() || driver.license_number.trim().is_empty() {
                return Err(BookingError::validation(
                    "vehicleBooking.driver",
                    "name and license number are required",
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participants {
    #[serde(default)]
    pub adults: Option<u32>,
    #[serde(default)]
    pub children: Option<u32>,
    #[serde(default)]
    pub infants: Option<u32>,
}

impl Participants {
    pub fn adults(count: u32) -> Self {
        Self {
            adults: Some(count),
            ..Default::default()
        }
    }

    // Saturates; `validate` rejects the counts that would overflow
    pub fn total(&self) -> u32 {
        self.checked_total().unwrap_or(u32::MAX)
    }

    pub fn checked_total(&self) -> Option<u32> {
        self.adults
            .unwrap_or(0)
            .checked_add(self.children.unwrap_or(0))?
            .checked_add(self.infants.unwrap_or(0))
    }

    pub fn validate(&self) -> BookingResult<()> {
        let groups = [
            ("adults", self.adults),
            ("children", self.children),
            ("infants", self.infants),
        ];
        for (name, count) in groups {
            if count == Some(0) {
                return Err(BookingError::validation(
                    format!("packageBooking.participants.{}", name),
                    "must be at least 1 when present",
                ));
            }
        }
        let total = self.checked_total().ok_or_else(|| {
            BookingError::validation("packageBooking.participants", "participant count is too large")
        })?;
        if total == 0 {
            return Err(BookingError::validation(
                "packageBooking.participants",
                "at least one participant is required",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomizationKind {
    Accommodation,
    Activity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customization {
    pub kind: CustomizationKind,
    pub option_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ItineraryStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItineraryProgress {
    pub completed_activities: Vec<String>,
    pub next_activity: Option<String>,
    pub status: ItineraryStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Itinerary {
    pub progress: ItineraryProgress,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageBooking {
    pub package_id: String,
    pub start_date: NaiveDate,
    pub participants: Participants,
    #[serde(default)]
    pub customizations: Vec<Customization>,
    #[serde(default)]
    pub itinerary: Itinerary,
}

impl PackageBooking {
    pub fn span(&self) -> Span {
        Span::from_dates(self.start_date, self.start_date + Duration::days(1))
    }

    pub fn validate(&self) -> BookingResult<()> {
        if self.package_id.trim().is_empty() {
            return Err(BookingError::validation("packageBooking.packageId", "must not be empty"));
        }
        for (index, entry) in self.customizations.iter().enumerate() {
            if self.customizations[..index]
                .iter()
                .any(|earlier| earlier.option_id == entry.option_id)
            {
                return Err(BookingError::validation(
                    format!("packageBooking.customizations[{}].optionId", index),
                    format!("'{}' is listed more than once", entry.option_id),
                ));
            }
        }
        self.participants.validate()
    }
}

// Exactly one sub-payload per booking; the enum makes the other two unrepresentable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BookingDetails {
    Hotel(HotelBooking),
    Vehicle(VehicleBooking),
    Package(PackageBooking),
}

impl BookingDetails {
    pub fn kind(&self) -> ResourceKind {
        match self {
            BookingDetails::Hotel(_) => ResourceKind::Hotel,
            BookingDetails::Vehicle(_) => ResourceKind::Vehicle,
            BookingDetails::Package(_) => ResourceKind::Package,
        }
    }

    pub fn resource_id(&self) -> &str {
        match self {
            BookingDetails::Hotel(h) => &h.hotel_id,
            BookingDetails::Vehicle(v) => &v.vehicle_id,
            BookingDetails::Package(p) => &p.package_id,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            BookingDetails::Hotel(h) => h.span(),
            BookingDetails::Vehicle(v) => v.span(),
            BookingDetails::Package(p) => p.span(),
        }
    }

    // Instant the booked service begins, used for refund tiers
    pub fn starts_at(&self) -> DateTime<Utc> {
        match self {
            BookingDetails::Hotel(h) => midnight(h.check_in),
            BookingDetails::Vehicle(v) => midnight(v.pickup_at.date_naive()),
            BookingDetails::Package(p) => midnight(p.start_date),
        }
    }

    pub fn validate(&self) -> BookingResult<()> {
        match self {
            BookingDetails::Hotel(h) => h.validate(),
            BookingDetails::Vehicle(v) => v.validate(),
            BookingDetails::Package(p) => p.validate(),
        }
    }
}

// Payment

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentStatus {
    Pending,
    Paid,
    PartiallyPaid,
    Failed,
    Refunded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    Charge,
    Refund,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentTransaction {
    pub transaction_id: String,
    pub kind: TransactionKind,
    pub amount: Money,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub amount: Money,
    pub currency: String,
    pub status: PaymentStatus,
    transactions: Vec<PaymentTransaction>,
}

impl Payment {
    pub fn new(amount: Money, currency: impl Into<String>) -> Self {
        Self {
            amount,
            currency: currency.into(),
            status: PaymentStatus::Pending,
            transactions: Vec::new(),
        }
    }

    pub fn transactions(&self) -> &[PaymentTransaction] {
        &self.transactions
    }

    pub fn net_charged(&self) -> Money {
        self.transactions
            .iter()
            .map(|tx| match tx.kind {
                TransactionKind::Charge => tx.amount,
                TransactionKind::Refund => -tx.amount,
                TransactionKind::Failure => Money::ZERO,
            })
            .sum()
    }

    // Append-only; the status follows from the full history
    pub fn record(&mut self, transaction: PaymentTransaction) {
        let kind = transaction.kind;
        self.transactions.push(transaction);

        let net = self.net_charged();
        let any_charge = self
            .transactions
            .iter()
            .any(|tx| tx.kind == TransactionKind::Charge);

        self.status = match kind {
            TransactionKind::Failure if net.is_zero() => PaymentStatus::Failed,
            TransactionKind::Refund if net <= Money::ZERO => PaymentStatus::Refunded,
            _ if net >= self.amount && any_charge => PaymentStatus::Paid,
            _ if net > Money::ZERO => PaymentStatus::PartiallyPaid,
            _ => self.status,
        };
    }
}

// Pricing

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLine {
    pub label: String,
    pub amount: Money,
}

impl PriceLine {
    pub fn new(label: impl Into<String>, amount: Money) -> Self {
        Self {
            label: label.into(),
            amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pricing {
    pub base_price: Money,
    pub taxes: Money,
    pub fees: Vec<PriceLine>,
    pub discounts: Vec<PriceLine>,
    pub total_price: Money,
}

impl Pricing {
    pub fn new(
        base_price: Money,
        taxes: Money,
        fees: Vec<PriceLine>,
        discounts: Vec<PriceLine>,
    ) -> Self {
        let mut pricing = Self {
            base_price,
            taxes,
            fees,
            discounts,
            total_price: Money::ZERO,
        };
        pricing.total_price = pricing.expected_total();
        pricing
    }

    pub fn expected_total(&self) -> Money {
        self.base_price + self.taxes + self.fees.iter().map(|f| f.amount).sum::<Money>()
            - self.discounts.iter().map(|d| d.amount).sum::<Money>()
    }

    // totalPrice == basePrice + taxes + fees - discounts, checked before every write
    pub fn check(&self) -> BookingResult<()> {
        let expected = self.expected_total();
        if self.total_price != expected {
            return Err(BookingError::Server(format!(
                "pricing invariant violated: total {} != {}",
                self.total_price, expected
            )));
        }
        if self.total_price.is_negative() {
            return Err(BookingError::validation("pricing.totalPrice", "must not be negative"));
        }
        Ok(())
    }
}

// Cancellation

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefundStatus {
    NotApplicable,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cancellation {
    pub cancelled_at: DateTime<Utc>,
    pub reason: Option<String>,
    pub refund_amount: Money,
    pub refund_status: RefundStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub reference: BookingReference,
    pub user_id: String,
    pub details: BookingDetails,
    pub status: BookingStatus,
    pub payment: Payment,
    pub pricing: Pricing,
    pub cancellation: Option<Cancellation>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    // Optimistic concurrency token, bumped by the store on every write
    pub version: u64,
}

impl Booking {
    pub fn booking_type(&self) -> ResourceKind {
        self.details.kind()
    }

    pub fn package(&self) -> Option<&PackageBooking> {
        match &self.details {
            BookingDetails::Package(p) => Some(p),
            _ => None,
        }
    }

    pub(crate) fn package_mut(&mut self) -> Option<&mut PackageBooking> {
        match &mut self.details {
            BookingDetails::Package(p) => Some(p),
            _ => None,
        }
    }

    pub fn state_conflict(&self, operation: &'static str) -> BookingError {
        BookingError::StateConflict {
            reference: self.reference.clone(),
            status: self.status,
            operation,
        }
    }

    // Cancellation is present exactly when the status is Cancelled
    pub fn check_invariants(&self) -> BookingResult<()> {
        self.pricing.check()?;
        let cancelled = self.status == BookingStatus::Cancelled;
        if cancelled != self.cancellation.is_some() {
            return Err(BookingError::Server(format!(
                "booking {} has status {} but cancellation record present = {}",
                self.reference,
                self.status,
                self.cancellation.is_some()
            )));
        }
        Ok(())
    }
}
