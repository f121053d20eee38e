// Shared test data: one hotel, one vehicle and one package, anchored to a fixed "now"

use crate::model::{
    Booking, BookingDetails, BookingReference, BookingStatus, Customization, CustomizationKind,
    HotelBooking, Itinerary, PackageBooking, Participants, Payment, Pricing, ResourceKind,
    VehicleBooking,
};
use crate::money::{Money, Multiplier};
use crate::resources::{
    AddOn, Hotel, InMemoryCatalog, Package, PackageAvailability, PackageStatus, Room, Vehicle,
};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc, Weekday};

pub const HOTEL_ID: &str = "htl-harbour";
pub const VEHICLE_ID: &str = "veh-1";
pub const PACKAGE_ID: &str = "pkg-fjords";

// Sunday 2026-10-18, 10:00 UTC
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 18, 10, 0, 0).unwrap()
}

pub fn in_days(days: i64) -> NaiveDate {
    now().date_naive() + Duration::days(days)
}

pub fn saturday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 11, 21).unwrap()
}

fn room(id: &str, room_type: &str, per_night: i64, max_occupancy: u32) -> Room {
    Room {
        id: id.to_string(),
        room_type: room_type.to_string(),
        price_per_night: Money::from_major(per_night),
        max_occupancy,
        available: true,
    }
}

pub fn hotel() -> Hotel {
    Hotel {
        id: HOTEL_ID.to_string(),
        name: "Harbour View".to_string(),
        rooms: vec![
            room("101", "double", 120, 2),
            room("102", "family", 150, 3),
            room("103", "double", 130, 2),
        ],
        seasonal_rates: vec![],
    }
}

pub fn vehicle() -> Vehicle {
    Vehicle {
        id: VEHICLE_ID.to_string(),
        name: "Compact hatchback".to_string(),
        price_per_day: Money::from_major(55),
        available: true,
        maintenance: vec![],
        insurance_options: vec![],
    }
}

fn add_on(id: &str, name: &str, price: i64) -> AddOn {
    AddOn {
        id: id.to_string(),
        name: name.to_string(),
        price: Money::from_major(price),
    }
}

pub fn package() -> Package {
    Package {
        id: PACKAGE_ID.to_string(),
        name: "Fjord weekend".to_string(),
        status: PackageStatus::Active,
        base_price: Money::from_major(100),
        availability: PackageAvailability {
            start_date: now().date_naive(),
            end_date: NaiveDate::from_ymd_opt(2027, 12, 31).unwrap(),
            blackout_dates: vec![],
            available_weekdays: vec![],
        },
        min_participants: 1,
        max_participants: 4,
        capacity_per_date: 6,
        seasonal_rates: vec![],
        weekend_multiplier: Multiplier::from_basis_points(12_000),
        weekend_days: vec![Weekday::Sat],
        accommodation_options: vec![add_on("acc-lodge", "Mountain lodge", 80)],
        activity_options: vec![
            add_on("act-kayak", "Kayak tour", 45),
            add_on("act-hike", "Glacier hike", 30),
        ],
    }
}

pub fn catalog() -> InMemoryCatalog {
    let catalog = InMemoryCatalog::new();
    catalog.upsert_hotel(hotel());
    catalog.upsert_vehicle(vehicle());
    catalog.upsert_package(package());
    catalog
}

pub fn hotel_booking(rooms: &[&str], check_in: NaiveDate, nights: i64) -> HotelBooking {
    HotelBooking {
        hotel_id: HOTEL_ID.to_string(),
        room_ids: rooms.iter().map(|r| r.to_string()).collect(),
        check_in,
        check_out: check_in + Duration::days(nights),
        guests: 2,
    }
}

pub fn vehicle_booking(pickup: NaiveDate, days: i64) -> VehicleBooking {
    let pickup_at = Utc.from_utc_datetime(&pickup.and_hms_opt(10, 0, 0).unwrap());
    VehicleBooking {
        vehicle_id: VEHICLE_ID.to_string(),
        pickup_at,
        return_at: pickup_at + Duration::days(days),
        pickup_location: "Airport".to_string(),
        return_location: "Central station".to_string(),
        insurance: None,
        driver: None,
    }
}

pub fn package_booking(start_date: NaiveDate, participants: u32) -> PackageBooking {
    PackageBooking {
        package_id: PACKAGE_ID.to_string(),
        start_date,
        participants: Participants::adults(participants),
        customizations: vec![],
        itinerary: Itinerary::default(),
    }
}

pub fn itinerary_customizations() -> Vec<Customization> {
    vec![
        Customization {
            kind: CustomizationKind::Accommodation,
            option_id: "acc-lodge".to_string(),
        },
        Customization {
            kind: CustomizationKind::Activity,
            option_id: "act-kayak".to_string(),
        },
        Customization {
            kind: CustomizationKind::Activity,
            option_id: "act-hike".to_string(),
        },
    ]
}

pub fn reference(kind: ResourceKind) -> BookingReference {
    BookingReference::generate(kind, now(), 8, &mut rand::thread_rng())
}

// A Pending booking priced at a flat 100.00, not yet stored
pub fn booking(details: BookingDetails) -> Booking {
    let total = Money::from_major(100);
    Booking {
        reference: reference(details.kind()),
        user_id: "user-1".to_string(),
        details,
        status: BookingStatus::Pending,
        payment: Payment::new(total, "USD"),
        pricing: Pricing::new(total, Money::ZERO, vec![], vec![]),
        cancellation: None,
        created_at: now(),
        updated_at: now(),
        version: 0,
    }
}
