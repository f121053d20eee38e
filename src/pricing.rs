// Pricing engine
// Pure: the same sub-payload and resource record always produce the same quote.

use crate::error::{BookingError, BookingResult};
use crate::model::{
    BookingDetails, CustomizationKind, HotelBooking, PackageBooking, PriceLine, Pricing,
    VehicleBooking,
};
use crate::money::{scale, Money, Multiplier};
use crate::resources::{Hotel, Package, Resource, Vehicle};
use chrono::Datelike;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct PriceAdjustments {
    pub total: Money,
    pub breakdown: Vec<PriceLine>,
}

impl PriceAdjustments {
    fn push(&mut self, line: PriceLine) {
        self.total += line.amount;
        self.breakdown.push(line);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quote {
    pub base_price: Money,
    pub multipliers: Vec<(String, Multiplier)>,
    pub adjustments: PriceAdjustments,
    pub taxes: Money,
    pub pricing: Pricing,
}

impl Quote {
    pub fn total(&self) -> Money {
        self.pricing.total_price
    }
}

#[derive(Debug, Clone)]
pub struct PricingEngine {
    tax_rate: Multiplier,
    service_fee: Option<Money>,
}

impl Default for PricingEngine {
    fn default() -> Self {
        Self::new(Multiplier::ZERO, None)
    }
}

impl PricingEngine {
    pub fn new(tax_rate: Multiplier, service_fee: Option<Money>) -> Self {
        Self {
            tax_rate,
            service_fee,
        }
    }

    pub fn compute_total(&self, details: &BookingDetails, resource: &Resource) -> BookingResult<Quote> {
        let (base_price, multipliers, adjustments) = match (details, resource) {
            (BookingDetails::Hotel(booking), Resource::Hotel(hotel)) => price_hotel(booking, hotel)?,
            (BookingDetails::Vehicle(booking), Resource::Vehicle(vehicle)) => {
                price_vehicle(booking, vehicle)?
            }
            (BookingDetails::Package(booking), Resource::Package(package)) => {
                price_package(booking, package)?
            }
            _ => {
                return Err(BookingError::Server(format!(
                    "cannot price a {} booking against a {} record",
                    details.kind(),
                    resource.kind()
                )))
            }
        };

        let taxes = self.tax_rate.apply(base_price + adjustments.total);

        let mut fees = adjustments.breakdown.clone();
        if let Some(fee) = self.service_fee {
            fees.push(PriceLine::new("service fee", fee));
        }

        let pricing = Pricing::new(base_price, taxes, fees, Vec::new());
        pricing.check()?;

        Ok(Quote {
            base_price,
            multipliers,
            adjustments,
            taxes,
            pricing,
        })
    }
}

type Priced = (Money, Vec<(String, Multiplier)>, PriceAdjustments);

fn price_hotel(booking: &HotelBooking, hotel: &Hotel) -> BookingResult<Priced> {
    let mut nightly = Money::ZERO;
    for room_id in &booking.room_ids {
        let room = hotel.room(room_id).ok_or_else(|| BookingError::NotFound {
            entity: "room",
            id: format!("{}/{}", hotel.id, room_id),
        })?;
        nightly += room.price_per_night;
    }

    // Overlapping windows are the hotel owner's problem; the first match wins
    let seasonal = hotel
        .seasonal_rates
        .iter()
        .find(|r| r.overlaps_stay(booking.check_in, booking.check_out));

    let mut multipliers = Vec::new();
    if let Some(rate) = seasonal {
        multipliers.push((format!("seasonal: {}", rate.name), rate.multiplier));
    }

    let factors: Vec<Multiplier> = multipliers.iter().map(|(_, m)| *m).collect();
    let base = scale(nightly, &factors, booking.nights());
    Ok((base, multipliers, PriceAdjustments::default()))
}

fn price_vehicle(booking: &VehicleBooking, vehicle: &Vehicle) -> BookingResult<Priced> {
    let days = booking.days();
    let base = vehicle.price_per_day * days;

    let mut adjustments = PriceAdjustments::default();
    if let Some(name) = &booking.insurance {
        let option = vehicle
            .insurance_options
            .iter()
            .find(|o| &o.name == name)
            .ok_or_else(|| {
                BookingError::validation(
                    "vehicleBooking.insurance",
                    format!("unknown insurance option '{}'", name),
                )
            })?;
        adjustments.push(PriceLine::new(
            format!("insurance: {}", option.name),
            option.price_per_day * days,
        ));
    }
    Ok((base, Vec::new(), adjustments))
}

fn price_package(booking: &PackageBooking, package: &Package) -> BookingResult<Priced> {
    let date = booking.start_date;
    let mut multipliers = Vec::new();

    // Seasonal first, weekend second; both scale the per-person base price
    if let Some(rate) = package.seasonal_rates.iter().find(|r| r.contains(date)) {
        multipliers.push((format!("seasonal: {}", rate.name), rate.multiplier));
    }
    if package.weekend_days.contains(&date.weekday()) {
        multipliers.push(("weekend".to_string(), package.weekend_multiplier));
    }

    let factors: Vec<Multiplier> = multipliers.iter().map(|(_, m)| *m).collect();
    let participants = booking.participants.total() as i64;
    let base = scale(package.base_price, &factors, participants);

    let mut adjustments = PriceAdjustments::default();
    for (index, customization) in booking.customizations.iter().enumerate() {
        let options = match customization.kind {
            CustomizationKind::Accommodation => &package.accommodation_options,
            CustomizationKind::Activity => &package.activity_options,
        };
        let option = options
            .iter()
            .find(|o| o.id == customization.option_id)
            .ok_or_else(|| {
                BookingError::validation(
                    format!("packageBooking.customizations[{}].optionId", index),
                    format!("unknown option '{}'", customization.option_id),
                )
            })?;
        let label = match customization.kind {
            CustomizationKind::Accommodation => format!("accommodation: {}", option.name),
            CustomizationKind::Activity => format!("activity: {}", option.name),
        };
        adjustments.push(PriceLine::new(label, option.price));
    }

    Ok((base, multipliers, adjustments))
}
