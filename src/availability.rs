// Availability validation
// Record-level rules first, then an advisory look at the ledger. The ledger's
// own locked check in `reserve` is the authoritative one.

use crate::error::{BookingError, BookingResult};
use crate::inventory::{claims_for, InventoryReservationManager, UnitKey};
use crate::model::{BookingDetails, BookingReference, HotelBooking, PackageBooking, ResourceKind, VehicleBooking};
use crate::resources::{Hotel, Package, PackageStatus, Resource, ResourceCatalog, Vehicle};
use chrono::Datelike;
use std::sync::Arc;
use tracing::debug;

pub struct AvailabilityValidator {
    catalog: Arc<dyn ResourceCatalog>,
    inventory: Arc<InventoryReservationManager>,
}

impl AvailabilityValidator {
    pub fn new(catalog: Arc<dyn ResourceCatalog>, inventory: Arc<InventoryReservationManager>) -> Self {
        Self { catalog, inventory }
    }

    /// Confirms the sub-payload is bookable and returns the resolved resource record.
    ///
    /// `reference` identifies the booking asking, so an update is not blocked by
    /// the inventory it already holds.
    pub async fn check(
        &self,
        reference: &BookingReference,
        details: &BookingDetails,
    ) -> BookingResult<Resource> {
        details.validate()?;
        let resource = self.catalog.resolve(details).await?;
        check_resource(details, &resource)?;

        let claims = claims_for(details, &resource)?;
        if let Some(unit) = self.inventory.first_conflict(reference, &claims) {
            return Err(BookingError::unavailable(unit.kind(), describe_conflict(&unit)));
        }

        debug!(
            reference = %reference,
            kind = %details.kind(),
            resource = details.resource_id(),
            "Availability confirmed"
        );
        Ok(resource)
    }
}

fn describe_conflict(unit: &UnitKey) -> String {
    match unit {
        UnitKey::Room { room_id, .. } => {
            format!("room {} is already booked for the requested dates", room_id)
        }
        UnitKey::Vehicle { vehicle_id } => {
            format!("vehicle {} is already booked for the requested period", vehicle_id)
        }
        UnitKey::PackageSlot { date, .. } => {
            format!("not enough seats left on the {} departure", date)
        }
    }
}

// Record-level rules that need no ledger access.
pub fn check_resource(details: &BookingDetails, resource: &Resource) -> BookingResult<()> {
    match (details, resource) {
        (BookingDetails::Hotel(booking), Resource::Hotel(hotel)) => check_hotel(booking, hotel),
        (BookingDetails::Vehicle(booking), Resource::Vehicle(vehicle)) => {
            check_vehicle(booking, vehicle)
        }
        (BookingDetails::Package(booking), Resource::Package(package)) => {
            check_package(booking, package)
        }
        _ => Err(BookingError::Server(format!(
            "{} booking resolved against a {} record",
            details.kind(),
            resource.kind()
        ))),
    }
}

fn check_hotel(booking: &HotelBooking, hotel: &Hotel) -> BookingResult<()> {
    let mut occupancy = 0;
    for room_id in &booking.room_ids {
        let room = hotel.room(room_id).ok_or_else(|| BookingError::NotFound {
            entity: "room",
            id: format!("{}/{}", hotel.id, room_id),
        })?;
        if !room.available {
            return Err(BookingError::unavailable(
                ResourceKind::Hotel,
                format!("room {} is out of service", room_id),
            ));
        }
        occupancy += room.max_occupancy;
    }

    if booking.guests > occupancy {
        return Err(BookingError::unavailable(
            ResourceKind::Hotel,
            format!(
                "{} guests exceed the selected rooms' occupancy of {}",
                booking.guests, occupancy
            ),
        ));
    }
    Ok(())
}

fn check_vehicle(booking: &VehicleBooking, vehicle: &Vehicle) -> BookingResult<()> {
    if !vehicle.available {
        return Err(BookingError::unavailable(
            ResourceKind::Vehicle,
            format!("vehicle {} is not available for rental", vehicle.id),
        ));
    }

    let span = booking.span();
    if let Some(window) = vehicle
        .maintenance
        .iter()
        .find(|w| w.mandatory && w.start < span.end && span.start < w.end)
    {
        return Err(BookingError::unavailable(
            ResourceKind::Vehicle,
            format!(
                "vehicle {} is in mandatory maintenance from {} to {}",
                vehicle.id, window.start, window.end
            ),
        ));
    }

    if let Some(name) = &booking.insurance {
        if !vehicle.insurance_options.iter().any(|o| &o.name == name) {
            return Err(BookingError::validation(
                "vehicleBooking.insurance",
                format!("unknown insurance option '{}'", name),
            ));
        }
    }
    Ok(())
}

fn check_package(booking: &PackageBooking, package: &Package) -> BookingResult<()> {
    let unavailable = |reason: String| BookingError::unavailable(ResourceKind::Package, reason);

    if package.status != PackageStatus::Active {
        return Err(unavailable(format!(
            "package {} is not active ({:?})",
            package.id, package.status
        )));
    }

    let window = &package.availability;
    let date = booking.start_date;
    if date < window.start_date || date > window.end_date {
        return Err(unavailable(format!(
            "{} is outside the bookable window {} .. {}",
            date, window.start_date, window.end_date
        )));
    }
    if window.blackout_dates.contains(&date) {
        return Err(unavailable(format!("{} is a blackout date", date)));
    }
    if !window.available_weekdays.is_empty() && !window.available_weekdays.contains(&date.weekday()) {
        return Err(unavailable(format!("departures do not run on {}", date.weekday())));
    }

    let participants = booking.participants.total();
    if participants < package.min_participants || participants > package.max_participants {
        return Err(unavailable(format!(
            "{} participants requested, package allows {} to {}",
            participants, package.min_participants, package.max_participants
        )));
    }
    Ok(())
}
