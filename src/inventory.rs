// Inventory reservation ledger
// Check and decrement happen under the same per-unit lock, so the last unit of
// capacity can only ever be taken once. Unrelated units never share a lock.

use crate::error::{BookingError, BookingResult};
use crate::model::{Booking, BookingDetails, BookingReference, ResourceKind, Span};
use crate::resources::Resource;
use chrono::NaiveDate;
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

// One independently bookable unit of capacity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UnitKey {
    Room { hotel_id: String, room_id: String },
    Vehicle { vehicle_id: String },
    PackageSlot { package_id: String, date: NaiveDate },
}

impl UnitKey {
    pub fn kind(&self) -> ResourceKind {
        match self {
            UnitKey::Room { .. } => ResourceKind::Hotel,
            UnitKey::Vehicle { .. } => ResourceKind::Vehicle,
            UnitKey::PackageSlot { .. } => ResourceKind::Package,
        }
    }
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitKey::Room { hotel_id, room_id } => write!(f, "{}/room {}", hotel_id, room_id),
            UnitKey::Vehicle { vehicle_id } => write!(f, "{}", vehicle_id),
            UnitKey::PackageSlot { package_id, date } => write!(f, "{}@{}", package_id, date),
        }
    }
}

// What a booking needs from one unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub unit: UnitKey,
    pub span: Span,
    pub quantity: u32,
    pub capacity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Holding {
    pub booking: BookingReference,
    pub span: Span,
    pub quantity: u32,
}

#[derive(Debug, Default)]
struct UnitCalendar {
    holdings: Vec<Holding>,
}

impl UnitCalendar {
    // Capacity used by other bookings during `span`
    fn used_by_others(&self, span: &Span, booking: &BookingReference) -> u32 {
        self.holdings
            .iter()
            .filter(|h| &h.booking != booking && h.span.overlaps(span))
            .map(|h| h.quantity)
            .sum()
    }

    fn fits(&self, claim: &Claim, booking: &BookingReference) -> bool {
        self.used_by_others(&claim.span, booking).saturating_add(claim.quantity) <= claim.capacity
    }

    fn remove_booking(&mut self, booking: &BookingReference) -> usize {
        let before = self.holdings.len();
        self.holdings.retain(|h| &h.booking != booking);
        before - self.holdings.len()
    }
}

// Capacity units a booking occupies, derived from its sub-payload alone.
pub fn unit_keys(details: &BookingDetails) -> Vec<UnitKey> {
    match details {
        BookingDetails::Hotel(h) => h
            .room_ids
            .iter()
            .map(|room_id| UnitKey::Room {
                hotel_id: h.hotel_id.clone(),
                room_id: room_id.clone(),
            })
            .collect(),
        BookingDetails::Vehicle(v) => vec![UnitKey::Vehicle {
            vehicle_id: v.vehicle_id.clone(),
        }],
        BookingDetails::Package(p) => vec![UnitKey::PackageSlot {
            package_id: p.package_id.clone(),
            date: p.start_date,
        }],
    }
}

// Claims a sub-payload makes against the resource's capacity.
pub fn claims_for(details: &BookingDetails, resource: &Resource) -> BookingResult<Vec<Claim>> {
    match (details, resource) {
        (BookingDetails::Hotel(h), Resource::Hotel(_)) => Ok(unit_keys(details)
            .into_iter()
            .map(|unit| Claim {
                unit,
                span: h.span(),
                quantity: 1,
                capacity: 1,
            })
            .collect()),
        (BookingDetails::Vehicle(v), Resource::Vehicle(_)) => Ok(unit_keys(details)
            .into_iter()
            .map(|unit| Claim {
                unit,
                span: v.span(),
                quantity: 1,
                capacity: 1,
            })
            .collect()),
        (BookingDetails::Package(p), Resource::Package(pkg)) => Ok(unit_keys(details)
            .into_iter()
            .map(|unit| Claim {
                unit,
                span: p.span(),
                quantity: p.participants.total(),
                capacity: pkg.capacity_per_date,
            })
            .collect()),
        _ => Err(BookingError::Server(format!(
            "{} booking resolved against a {} record",
            details.kind(),
            resource.kind()
        ))),
    }
}

#[derive(Default)]
pub struct InventoryReservationManager {
    units: DashMap<UnitKey, Arc<Mutex<UnitCalendar>>>,
}

impl InventoryReservationManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves every unit the booking needs, all or nothing.
    ///
    /// Reserving again for the same booking replaces its own holdings instead
    /// of consuming more capacity.
    pub fn reserve(&self, booking: &Booking, resource: &Resource) -> BookingResult<()> {
        let claims = claims_for(&booking.details, resource)?;
        self.commit(&booking.reference, &[], &claims)
    }

    // Releases whatever the booking holds; returns how many holdings were dropped.
    pub fn release(&self, booking: &Booking) -> usize {
        self.release_details(&booking.reference, &booking.details)
    }

    // Release keyed by an arbitrary sub-payload, for rolling back an attempted change
    pub fn release_details(&self, reference: &BookingReference, details: &BookingDetails) -> usize {
        self.release_units(reference, &unit_keys(details))
    }

    /// Moves a booking from its previous claims to new ones in one locked scope.
    ///
    /// On failure the previous holdings are left exactly as they were.
    pub fn rebook(
        &self,
        reference: &BookingReference,
        previous: &BookingDetails,
        next: &BookingDetails,
        resource: &Resource,
    ) -> BookingResult<()> {
        let claims = claims_for(next, resource)?;
        self.commit(reference, &unit_keys(previous), &claims)
    }

    // Advisory read used before reserving; returns the first unit that cannot fit.
    pub fn first_conflict(&self, reference: &BookingReference, claims: &[Claim]) -> Option<UnitKey> {
        claims.iter().find_map(|claim| {
            let fits = match self.units.get(&claim.unit).map(|c| Arc::clone(c.value())) {
                Some(calendar) => {
                    let calendar = calendar.lock();
                    calendar.fits(claim, reference)
                }
                None => claim.quantity <= claim.capacity,
            };
            (!fits).then(|| claim.unit.clone())
        })
    }

    pub fn remaining(&self, unit: &UnitKey, span: &Span, capacity: u32) -> u32 {
        let used = self
            .units
            .get(unit)
            .map(|c| Arc::clone(c.value()))
            .map(|calendar| {
                let calendar = calendar.lock();
                calendar
                    .holdings
                    .iter()
                    .filter(|h| h.span.overlaps(span))
                    .map(|h| h.quantity)
                    .sum::<u32>()
            })
            .unwrap_or(0);
        capacity.saturating_sub(used)
    }

    pub fn held_by(&self, reference: &BookingReference) -> Vec<(UnitKey, Holding)> {
        let calendars: Vec<(UnitKey, Arc<Mutex<UnitCalendar>>)> = self
            .units
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        let mut held = Vec::new();
        for (unit, calendar) in calendars {
            for holding in calendar.lock().holdings.iter() {
                if &holding.booking == reference {
                    held.push((unit.clone(), holding.clone()));
                }
            }
        }
        held.sort_by(|a, b| a.0.cmp(&b.0));
        held
    }

    fn calendar(&self, unit: &UnitKey) -> Arc<Mutex<UnitCalendar>> {
        // Clone the Arc so no map shard lock is held while the unit is locked
        Arc::clone(self.units.entry(unit.clone()).or_default().value())
    }

    fn commit(
        &self,
        reference: &BookingReference,
        releasing: &[UnitKey],
        claims: &[Claim],
    ) -> BookingResult<()> {
        // Sorted acquisition order keeps multi-unit claims deadlock free
        let involved: BTreeSet<&UnitKey> = releasing.iter().chain(claims.iter().map(|c| &c.unit)).collect();
        let calendars: Vec<(&UnitKey, Arc<Mutex<UnitCalendar>>)> =
            involved.into_iter().map(|unit| (unit, self.calendar(unit))).collect();
        let mut guards: Vec<(&UnitKey, MutexGuard<'_, UnitCalendar>)> = calendars
            .iter()
            .map(|(unit, calendar)| (*unit, calendar.lock()))
            .collect();

        let rejected = claims.iter().find(|claim| {
            let calendar = guards
                .iter()
                .find(|(unit, _)| **unit == claim.unit)
                .map(|(_, guard)| guard);
            !calendar.map_or(false, |calendar| calendar.fits(claim, reference))
        });
        if let Some(claim) = rejected {
            warn!(
                reference = %reference,
                unit = %claim.unit,
                quantity = claim.quantity,
                capacity = claim.capacity,
                "Reservation rejected, insufficient capacity"
            );
            let err = BookingError::ReservationConflict {
                kind: claim.unit.kind(),
                resource: claim.unit.to_string(),
                details: format!(
                    "{} unit(s) requested, not enough capacity left for {} .. {}",
                    claim.quantity, claim.span.start, claim.span.end
                ),
            };
            drop(guards);
            drop(calendars);
            // Calendars created for this attempt may be empty
            let attempted: Vec<UnitKey> = claims.iter().map(|c| c.unit.clone()).collect();
            self.prune(&attempted);
            return Err(err);
        }

        for (_, guard) in guards.iter_mut() {
            guard.remove_booking(reference);
        }
        for claim in claims {
            if let Some((_, guard)) = guards.iter_mut().find(|(unit, _)| **unit == claim.unit) {
                guard.holdings.push(Holding {
                    booking: reference.clone(),
                    span: claim.span,
                    quantity: claim.quantity,
                });
            }
        }
        drop(guards);
        drop(calendars);

        debug!(
            reference = %reference,
            units = claims.len(),
            released = releasing.len(),
            "Reservation committed"
        );
        self.prune(releasing);
        Ok(())
    }

    fn release_units(&self, reference: &BookingReference, units: &[UnitKey]) -> usize {
        let unique: HashSet<&UnitKey> = units.iter().collect();
        let mut released = 0;
        for unit in unique {
            let Some(calendar) = self.units.get(unit).map(|c| Arc::clone(c.value())) else {
                continue;
            };
            released += calendar.lock().remove_booking(reference);
        }
        if released > 0 {
            debug!(reference = %reference, released, "Reservation released");
        }
        self.prune(units);
        released
    }

    // Drops empty calendars nobody else is holding on to
    fn prune(&self, units: &[UnitKey]) {
        for unit in units {
            self.units.remove_if(unit, |_, calendar| {
                Arc::strong_count(calendar) == 1
                    && calendar
                        .try_lock()
                        .map_or(false, |c| c.holdings.is_empty())
            });
        }
    }
}
