// Booking lifecycle controller
// Orchestrates validation, pricing and the reservation ledger around the booking
// state machine. A write that fails never leaves inventory held for a booking the
// store does not know about.

use crate::availability::AvailabilityValidator;
use crate::clock::Clock;
use crate::config::BookingConfig;
use crate::error::{BookingError, BookingResult};
use crate::inventory::{unit_keys, InventoryReservationManager};
use crate::itinerary::{ActivityUpdate, ItineraryProgressTracker};
use crate::model::{
    Booking, BookingDetails, BookingReference, BookingStatus, Cancellation, Customization,
    DriverDetails, HotelBooking, ItineraryProgress, PackageBooking, Participants, Payment,
    PaymentTransaction, ResourceKind, TransactionKind, VehicleBooking,
};
use crate::money::Money;
use crate::notify::{BookingEvent, Notifier};
use crate::pricing::{PricingEngine, Quote};
use crate::refund::CancellationRefundCalculator;
use crate::resources::{Resource, ResourceCatalog};
use crate::store::{BookingQuery, BookingStore, Page, StoreError};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub user_id: String,
    pub booking_type: ResourceKind,
    #[serde(default)]
    pub hotel_booking: Option<HotelBooking>,
    #[serde(default)]
    pub vehicle_booking: Option<VehicleBooking>,
    #[serde(default)]
    pub package_booking: Option<PackageBooking>,
}

impl CreateBookingRequest {
    pub fn hotel(user_id: impl Into<String>, booking: HotelBooking) -> Self {
        Self {
            hotel_booking: Some(booking),
            ..Self::empty(user_id, ResourceKind::Hotel)
        }
    }

    pub fn vehicle(user_id: impl Into<String>, booking: VehicleBooking) -> Self {
        Self {
            vehicle_booking: Some(booking),
            ..Self::empty(user_id, ResourceKind::Vehicle)
        }
    }

    pub fn package(user_id: impl Into<String>, booking: PackageBooking) -> Self {
        Self {
            package_booking: Some(booking),
            ..Self::empty(user_id, ResourceKind::Package)
        }
    }

    fn empty(user_id: impl Into<String>, booking_type: ResourceKind) -> Self {
        Self {
            user_id: user_id.into(),
            booking_type,
            hotel_booking: None,
            vehicle_booking: None,
            package_booking: None,
        }
    }

    // Exactly one sub-payload, and it must match bookingType
    pub fn into_parts(self) -> BookingResult<(String, BookingDetails)> {
        if self.user_id.trim().is_empty() {
            return Err(BookingError::validation("userId", "must not be empty"));
        }
        let provided = [
            self.hotel_booking.is_some(),
            self.vehicle_booking.is_some(),
            self.package_booking.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count();
        if provided != 1 {
            return Err(BookingError::validation(
                "bookingType",
                format!("exactly one sub-payload is required, got {}", provided),
            ));
        }

        let details = match (
            self.booking_type,
            self.hotel_booking,
            self.vehicle_booking,
            self.package_booking,
        ) {
            (ResourceKind::Hotel, Some(h), None, None) => BookingDetails::Hotel(h),
            (ResourceKind::Vehicle, None, Some(v), None) => BookingDetails::Vehicle(v),
            (ResourceKind::Package, None, None, Some(p)) => BookingDetails::Package(p),
            (kind, ..) => {
                return Err(BookingError::validation(
                    format!("{}Booking", kind),
                    format!("is required when bookingType is {}", kind),
                ))
            }
        };
        Ok((self.user_id, details))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HotelPatch {
    pub hotel_id: Option<String>,
    pub room_ids: Option<BTreeSet<String>>,
    pub check_in: Option<NaiveDate>,
    pub check_out: Option<NaiveDate>,
    pub guests: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VehiclePatch {
    pub vehicle_id: Option<String>,
    pub pickup_at: Option<DateTime<Utc>>,
    pub return_at: Option<DateTime<Utc>>,
    pub pickup_location: Option<String>,
    pub return_location: Option<String>,
    pub insurance: Option<String>,
    pub driver: Option<DriverDetails>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PackagePatch {
    pub package_id: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub participants: Option<Participants>,
    pub customizations: Option<Vec<Customization>>,
}

// Partial sub-payload; unset fields keep their current value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BookingPatch {
    #[serde(rename = "hotelBooking")]
    Hotel(HotelPatch),
    #[serde(rename = "vehicleBooking")]
    Vehicle(VehiclePatch),
    #[serde(rename = "packageBooking")]
    Package(PackagePatch),
}

impl BookingPatch {
    fn kind(&self) -> ResourceKind {
        match self {
            BookingPatch::Hotel(_) => ResourceKind::Hotel,
            BookingPatch::Vehicle(_) => ResourceKind::Vehicle,
            BookingPatch::Package(_) => ResourceKind::Package,
        }
    }

    pub fn apply(&self, current: &BookingDetails) -> BookingResult<BookingDetails> {
        match (self, current) {
            (BookingPatch::Hotel(patch), BookingDetails::Hotel(h)) => {
                let mut next = h.clone();
                if let Some(id) = &patch.hotel_id {
                    next.hotel_id = id.clone();
                }
                if let Some(rooms) = &patch.room_ids {
                    next.room_ids = rooms.clone();
                }
                next.check_in = patch.check_in.unwrap_or(next.check_in);
                next.check_out = patch.check_out.unwrap_or(next.check_out);
                next.guests = patch.guests.unwrap_or(next.guests);
                Ok(BookingDetails::Hotel(next))
            }
            (BookingPatch::Vehicle(patch), BookingDetails::Vehicle(v)) => {
                let mut next = v.clone();
                if let Some(id) = &patch.vehicle_id {
                    next.vehicle_id = id.clone();
                }
                next.pickup_at = patch.pickup_at.unwrap_or(next.pickup_at);
                next.return_at = patch.return_at.unwrap_or(next.return_at);
                if let Some(location) = &patch.pickup_location {
                    next.pickup_location = location.clone();
                }
                if let Some(location) = &patch.return_location {
                    next.return_location = location.clone();
                }
                if patch.insurance.is_some() {
                    next.insurance = patch.insurance.clone();
                }
                if patch.driver.is_some() {
                    next.driver = patch.driver.clone();
                }
                Ok(BookingDetails::Vehicle(next))
            }
            (BookingPatch::Package(patch), BookingDetails::Package(p)) => {
                let mut next = p.clone();
                if let Some(id) = &patch.package_id {
                    next.package_id = id.clone();
                }
                next.start_date = patch.start_date.unwrap_or(next.start_date);
                next.participants = patch.participants.unwrap_or(next.participants);
                if let Some(customizations) = &patch.customizations {
                    next.customizations = customizations.clone();
                    ItineraryProgressTracker::reconcile(&mut next)?;
                }
                Ok(BookingDetails::Package(next))
            }
            _ => Err(BookingError::validation(
                "bookingType",
                format!(
                    "cannot apply a {} change to a {} booking",
                    self.kind(),
                    current.kind()
                ),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBookingRequest {
    pub reference: BookingReference,
    #[serde(default)]
    pub user_id: Option<String>,
    pub patch: BookingPatch,
}

pub struct Collaborators {
    pub catalog: Arc<dyn ResourceCatalog>,
    pub store: Arc<dyn BookingStore>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
    pub inventory: Arc<InventoryReservationManager>,
}

pub struct BookingLifecycleController {
    config: BookingConfig,
    catalog: Arc<dyn ResourceCatalog>,
    store: Arc<dyn BookingStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    inventory: Arc<InventoryReservationManager>,
    availability: AvailabilityValidator,
    pricing: PricingEngine,
    refunds: CancellationRefundCalculator,
}

impl BookingLifecycleController {
    pub fn new(config: BookingConfig, collaborators: Collaborators) -> Self {
        let Collaborators {
            catalog,
            store,
            notifier,
            clock,
            inventory,
        } = collaborators;

        Self {
            availability: AvailabilityValidator::new(Arc::clone(&catalog), Arc::clone(&inventory)),
            pricing: PricingEngine::new(config.tax_rate, config.service_fee),
            refunds: CancellationRefundCalculator::new(config.refund_policy.clone()),
            config,
            catalog,
            store,
            notifier,
            clock,
            inventory,
        }
    }

    pub fn inventory(&self) -> &InventoryReservationManager {
        &self.inventory
    }

    /// Validates, prices, reserves and persists a new `Pending` booking.
    ///
    /// The booking is stored only after its inventory is held, and the hold is
    /// released again if the store rejects the write.
    pub async fn create(&self, request: CreateBookingRequest) -> BookingResult<Booking> {
        let (user_id, details) = request.into_parts()?;
        let (booking, resource) = self.prepare(user_id, details, BookingStatus::Pending).await?;
        let stored = self.insert_with_fresh_reference(booking, Some(&resource)).await?;

        info!(
            reference = %stored.reference,
            kind = %stored.booking_type(),
            total = %stored.pricing.total_price,
            "Booking created"
        );
        self.emit(BookingEvent::created(&stored)).await;
        Ok(stored)
    }

    // Priced but holds no inventory until `submit`
    pub async fn create_draft(&self, request: CreateBookingRequest) -> BookingResult<Booking> {
        let (user_id, details) = request.into_parts()?;
        let (booking, _) = self.prepare(user_id, details, BookingStatus::Draft).await?;
        let stored = self.insert_with_fresh_reference(booking, None).await?;

        info!(reference = %stored.reference, kind = %stored.booking_type(), "Draft booking created");
        Ok(stored)
    }

    pub async fn submit(&self, reference: &BookingReference, user_id: Option<&str>) -> BookingResult<Booking> {
        let mut booking = self.load(reference, user_id).await?;
        if !booking.status.can_transition_to(BookingStatus::Pending) {
            return Err(booking.state_conflict("submit"));
        }
        self.ensure_not_past(&booking.details)?;

        let resource = self.availability.check(&booking.reference, &booking.details).await?;
        let quote = self.pricing.compute_total(&booking.details, &resource)?;
        apply_quote(&mut booking, &quote);
        booking.status = BookingStatus::Pending;
        booking.updated_at = self.clock.now();
        booking.check_invariants()?;

        self.inventory.reserve(&booking, &resource)?;
        let stored = match self.store.update(booking.clone()).await {
            Ok(stored) => stored,
            Err(err) => {
                warn!(reference = %booking.reference, error = %err, "Submit failed to persist");
                // A concurrent submit may have won with this same hold
                self.restore_reservation(&booking.reference, &booking.details, None)
                    .await;
                return Err(err.into());
            }
        };

        info!(reference = %stored.reference, "Booking submitted");
        self.emit(BookingEvent::StatusChanged {
            reference: stored.reference.clone(),
            from: BookingStatus::Draft,
            to: BookingStatus::Pending,
        })
        .await;
        Ok(stored)
    }

    /// Applies a partial change to a booking that has not started yet.
    ///
    /// When the change moves the booking to other units or dates, the old hold is
    /// swapped for the new one atomically. If the new units are taken the booking
    /// keeps the inventory it had; if the write fails the ledger is brought back
    /// in line with the stored booking.
    pub async fn update(&self, request: UpdateBookingRequest) -> BookingResult<Booking> {
        let mut booking = self.load(&request.reference, request.user_id.as_deref()).await?;
        if matches!(
            booking.status,
            BookingStatus::InProgress | BookingStatus::Completed | BookingStatus::Cancelled
        ) {
            return Err(booking.state_conflict("update"));
        }

        let next = request.patch.apply(&booking.details)?;
        self.ensure_not_past(&next)?;
        let resource = self.availability.check(&booking.reference, &next).await?;
        let quote = self.pricing.compute_total(&next, &resource)?;

        let previous = booking.details.clone();
        let moved = booking.status.holds_inventory() && reservation_changed(&previous, &next);
        if moved {
            self.inventory.rebook(&booking.reference, &previous, &next, &resource)?;
        }

        booking.details = next;
        apply_quote(&mut booking, &quote);
        booking.updated_at = self.clock.now();

        let written = match booking.check_invariants() {
            Ok(()) => self.store.update(booking.clone()).await.map_err(BookingError::from),
            Err(err) => Err(err),
        };
        match written {
            Ok(stored) => {
                info!(reference = %stored.reference, moved, total = %stored.pricing.total_price, "Booking updated");
                Ok(stored)
            }
            Err(err) => {
                if moved {
                    self.restore_reservation(&booking.reference, &booking.details, Some(&previous))
                        .await;
                }
                Err(err)
            }
        }
    }

    // Cancels a booking that has not started, attaching the refund owed.
    pub async fn cancel(
        &self,
        reference: &BookingReference,
        user_id: Option<&str>,
        reason: Option<String>,
    ) -> BookingResult<Booking> {
        let mut booking = self.load(reference, user_id).await?;
        if !booking.status.can_transition_to(BookingStatus::Cancelled) {
            return Err(booking.state_conflict("cancel"));
        }

        let now = self.clock.now();
        let refund = self
            .refunds
            .compute(booking.details.starts_at(), now, booking.payment.amount);
        let held = booking.status.holds_inventory();

        booking.status = BookingStatus::Cancelled;
        booking.cancellation = Some(Cancellation {
            cancelled_at: now,
            reason,
            refund_amount: refund.amount,
            refund_status: refund.status,
        });
        if let Some(package) = booking.package_mut() {
            ItineraryProgressTracker::cancel(package);
        }
        booking.updated_at = now;
        booking.check_invariants()?;

        // Persist first: a failed write leaves the booking and its hold untouched
        let stored = self.store.update(booking).await?;
        let released = if held { self.inventory.release(&stored) } else { 0 };

        info!(
            reference = %stored.reference,
            days_until_start = refund.days_until_start,
            refund_percentage = refund.percentage,
            refund = %refund.amount,
            released,
            "Booking cancelled"
        );
        if let Some(event) = BookingEvent::cancelled(&stored) {
            self.emit(event).await;
        }
        Ok(stored)
    }

    pub async fn confirm(&self, reference: &BookingReference) -> BookingResult<Booking> {
        self.transition(reference, BookingStatus::Confirmed, "confirm").await
    }

    pub async fn start(&self, reference: &BookingReference) -> BookingResult<Booking> {
        self.transition(reference, BookingStatus::InProgress, "start").await
    }

    pub async fn complete(&self, reference: &BookingReference) -> BookingResult<Booking> {
        self.transition(reference, BookingStatus::Completed, "complete").await
    }

    pub async fn record_payment(
        &self,
        reference: &BookingReference,
        kind: TransactionKind,
        amount: Money,
    ) -> BookingResult<Booking> {
        if kind != TransactionKind::Failure && (amount.is_zero() || amount.is_negative()) {
            return Err(BookingError::validation("amount", "must be positive"));
        }
        let mut booking = self.load(reference, None).await?;
        if booking.status.is_terminal() {
            return Err(booking.state_conflict("record payment for"));
        }

        let now = self.clock.now();
        let sequence = booking.payment.transactions().len() + 1;
        booking.payment.record(PaymentTransaction {
            transaction_id: format!("{}-TX{:03}", booking.reference, sequence),
            kind,
            amount,
            recorded_at: now,
        });
        booking.updated_at = now;

        let stored = self.store.update(booking).await?;
        info!(
            reference = %stored.reference,
            kind = ?kind,
            amount = %amount,
            status = ?stored.payment.status,
            "Payment recorded"
        );
        Ok(stored)
    }

    pub async fn advance_itinerary(
        &self,
        reference: &BookingReference,
        activity_id: &str,
        update: ActivityUpdate,
        user_id: Option<&str>,
    ) -> BookingResult<ItineraryProgress> {
        let mut booking = self.load(reference, user_id).await?;
        ItineraryProgressTracker::apply(&mut booking, activity_id, update)?;
        booking.updated_at = self.clock.now();

        let stored = self.store.update(booking).await?;
        let progress = stored
            .package()
            .map(|p| p.itinerary.progress.clone())
            .ok_or_else(|| BookingError::Server(format!("booking {} lost its package payload", stored.reference)))?;

        debug!(
            reference = %stored.reference,
            activity = activity_id,
            update = ?update,
            completed = progress.completed_activities.len(),
            "Itinerary advanced"
        );
        Ok(progress)
    }

    pub async fn get(&self, reference: &BookingReference) -> BookingResult<Booking> {
        Ok(self.store.get(reference).await?)
    }

    pub async fn query(&self, query: &BookingQuery) -> BookingResult<Page<Booking>> {
        Ok(self.store.query(query).await?)
    }

    async fn transition(
        &self,
        reference: &BookingReference,
        target: BookingStatus,
        operation: &'static str,
    ) -> BookingResult<Booking> {
        let mut booking = self.load(reference, None).await?;
        let from = booking.status;
        if !from.can_transition_to(target) {
            return Err(booking.state_conflict(operation));
        }
        booking.status = target;
        booking.updated_at = self.clock.now();
        booking.check_invariants()?;

        let stored = self.store.update(booking).await?;
        let released = if from.holds_inventory() && !target.holds_inventory() {
            self.inventory.release(&stored)
        } else {
            0
        };

        info!(reference = %stored.reference, from = %from, to = %target, released, "Booking status changed");
        self.emit(BookingEvent::StatusChanged {
            reference: stored.reference.clone(),
            from,
            to: target,
        })
        .await;
        Ok(stored)
    }

    async fn prepare(
        &self,
        user_id: String,
        mut details: BookingDetails,
        status: BookingStatus,
    ) -> BookingResult<(Booking, Resource)> {
        self.ensure_not_past(&details)?;
        if let BookingDetails::Package(package) = &mut details {
            ItineraryProgressTracker::initialize(package);
        }

        let reference = self.new_reference(details.kind());
        let resource = self.availability.check(&reference, &details).await?;
        let quote = self.pricing.compute_total(&details, &resource)?;
        debug!(
            reference = %reference,
            base = %quote.base_price,
            adjustments = %quote.adjustments.total,
            taxes = %quote.taxes,
            total = %quote.total(),
            "Booking priced"
        );

        let now = self.clock.now();
        let booking = Booking {
            reference,
            user_id,
            details,
            status,
            payment: Payment::new(quote.total(), self.config.currency.clone()),
            pricing: quote.pricing,
            cancellation: None,
            created_at: now,
            updated_at: now,
            version: 0,
        };
        booking.check_invariants()?;
        Ok((booking, resource))
    }

    // Reserves (when `resource` is given) and inserts, drawing a new reference on collision
    async fn insert_with_fresh_reference(
        &self,
        mut booking: Booking,
        resource: Option<&Resource>,
    ) -> BookingResult<Booking> {
        let attempts = self.config.max_reference_attempts.max(1);
        for attempt in 1..=attempts {
            if attempt > 1 {
                booking.reference = self.new_reference(booking.booking_type());
            }
            // A reference already in the store would share that booking's ledger entries
            match self.store.get(&booking.reference).await {
                Ok(_) => {
                    warn!(reference = %booking.reference, attempt, "Booking reference already taken, regenerating");
                    continue;
                }
                Err(StoreError::NotFound(_)) => {}
                Err(err) => return Err(err.into()),
            }

            if let Some(resource) = resource {
                self.inventory.reserve(&booking, resource)?;
            }
            match self.store.insert(booking.clone()).await {
                Ok(stored) => return Ok(stored),
                Err(StoreError::Duplicate(taken)) => {
                    self.inventory.release(&booking);
                    warn!(reference = %taken, attempt, "Booking reference collided on insert, regenerating");
                }
                Err(err) => {
                    let released = self.inventory.release(&booking);
                    warn!(
                        reference = %booking.reference,
                        released,
                        error = %err,
                        "Persisting booking failed, reservation rolled back"
                    );
                    return Err(err.into());
                }
            }
        }
        Err(BookingError::Server(format!(
            "no unique booking reference after {} attempts",
            attempts
        )))
    }

    // Puts the ledger back in line with whatever the store now holds for the booking.
    // `fallback` is what it held before the attempt, used when the store cannot be read.
    async fn restore_reservation(
        &self,
        reference: &BookingReference,
        attempted: &BookingDetails,
        fallback: Option<&BookingDetails>,
    ) {
        let target = match self.store.get(reference).await {
            Ok(current) if current.status.holds_inventory() => Some(current.details),
            Ok(current) => {
                let released = self.inventory.release_details(reference, attempted)
                    + self.inventory.release_details(reference, &current.details);
                warn!(reference = %reference, released, status = %current.status, "Lost to a concurrent change, hold released");
                return;
            }
            Err(err) => {
                warn!(reference = %reference, error = %err, "Could not re-read booking after a failed write");
                fallback.cloned()
            }
        };

        let Some(target) = target else {
            let released = self.inventory.release_details(reference, attempted);
            warn!(reference = %reference, released, "Failed write rolled back, hold released");
            return;
        };
        let restored = match self.catalog.resolve(&target).await {
            Ok(resource) => self.inventory.rebook(reference, attempted, &target, &resource),
            Err(err) => Err(err),
        };
        match restored {
            Ok(()) => warn!(reference = %reference, "Failed write rolled back to the stored reservation"),
            Err(err) => warn!(reference = %reference, error = %err, "Stored reservation could not be restored after a failed write"),
        }
    }

    async fn load(&self, reference: &BookingReference, user_id: Option<&str>) -> BookingResult<Booking> {
        let booking = self.store.get(reference).await?;
        match user_id {
            // Someone else's booking looks the same as a missing one
            Some(user) if booking.user_id != user => Err(BookingError::NotFound {
                entity: "booking",
                id: reference.to_string(),
            }),
            _ => Ok(booking),
        }
    }

    fn ensure_not_past(&self, details: &BookingDetails) -> BookingResult<()> {
        let today = self.clock.now().date_naive();
        if details.starts_at().date_naive() >= today {
            return Ok(());
        }
        let field = match details {
            BookingDetails::Hotel(_) => "hotelBooking.checkIn",
            BookingDetails::Vehicle(_) => "vehicleBooking.pickupAt",
            BookingDetails::Package(_) => "packageBooking.startDate",
        };
        Err(BookingError::validation(field, "must not be in the past"))
    }

    fn new_reference(&self, kind: ResourceKind) -> BookingReference {
        let mut rng = rand::thread_rng();
        BookingReference::generate(kind, self.clock.now(), self.config.reference_suffix_len, &mut rng)
    }

    async fn emit(&self, event: BookingEvent) {
        if let Err(err) = self.notifier.notify(&event).await {
            warn!(
                event = event.name(),
                reference = %event.reference(),
                error = %err,
                "Booking notification failed"
            );
        }
    }
}

fn apply_quote(booking: &mut Booking, quote: &Quote) {
    booking.pricing = quote.pricing.clone();
    booking.payment.amount = quote.total();
}

// Whether two sub-payloads occupy different ledger entries
fn reservation_changed(previous: &BookingDetails, next: &BookingDetails) -> bool {
    let quantity = |details: &BookingDetails| match details {
        BookingDetails::Package(p) => p.participants.total(),
        _ => 1,
    };
    unit_keys(previous) != unit_keys(next)
        || previous.span() != next.span()
        || quantity(previous) != quantity(next)
}
