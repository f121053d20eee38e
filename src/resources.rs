// Resource records owned by the hotel, fleet and package subsystems
// The reservation core only reads these; capacity state lives in the inventory ledger.

use crate::error::{BookingError, BookingResult};
use crate::model::{BookingDetails, ResourceKind};
use crate::money::{Money, Multiplier};
use crate::store::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc, Weekday};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

// Inclusive date window with a price multiplier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonalRate {
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub multiplier: Multiplier,
}

impl SeasonalRate {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }

    // Overlap with a half-open stay [from, until)
    pub fn overlaps_stay(&self, from: NaiveDate, until: NaiveDate) -> bool {
        self.start_date < until && from <= self.end_date
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    pub room_type: String,
    pub price_per_night: Money,
    pub max_occupancy: u32,
    // Cleared by the hotel subsystem for rooms taken out of service
    pub available: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hotel {
    pub id: String,
    pub name: String,
    pub rooms: Vec<Room>,
    #[serde(default)]
    pub seasonal_rates: Vec<SeasonalRate>,
}

impl Hotel {
    pub fn room(&self, room_id: &str) -> Option<&Room> {
        self.rooms.iter().find(|r| r.id == room_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub mandatory: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsuranceOption {
    pub name: String,
    pub price_per_day: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    pub id: String,
    pub name: String,
    pub price_per_day: Money,
    pub available: bool,
    #[serde(default)]
    pub maintenance: Vec<MaintenanceWindow>,
    #[serde(default)]
    pub insurance_options: Vec<InsuranceOption>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackageStatus {
    Draft,
    Active,
    Inactive,
    Archived,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageAvailability {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub blackout_dates: Vec<NaiveDate>,
    // Empty means every weekday is bookable
    #[serde(default)]
    pub available_weekdays: Vec<Weekday>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddOn {
    pub id: String,
    pub name: String,
    pub price: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    pub id: String,
    pub name: String,
    pub status: PackageStatus,
    pub base_price: Money,
    pub availability: PackageAvailability,
    pub min_participants: u32,
    pub max_participants: u32,
    // Participant seats sold per departure date
    pub capacity_per_date: u32,
    #[serde(default)]
    pub seasonal_rates: Vec<SeasonalRate>,
    pub weekend_multiplier: Multiplier,
    #[serde(default)]
    pub weekend_days: Vec<Weekday>,
    #[serde(default)]
    pub accommodation_options: Vec<AddOn>,
    #[serde(default)]
    pub activity_options: Vec<AddOn>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
    Hotel(Hotel),
    Vehicle(Vehicle),
    Package(Package),
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::Hotel(_) => ResourceKind::Hotel,
            Resource::Vehicle(_) => ResourceKind::Vehicle,
            Resource::Package(_) => ResourceKind::Package,
        }
    }
}

// Lookup service exposed by the resource-owning subsystems
#[async_trait]
pub trait ResourceCatalog: Send + Sync + 'static {
    async fn hotel(&self, id: &str) -> Result<Option<Hotel>, StoreError>;

    async fn vehicle(&self, id: &str) -> Result<Option<Vehicle>, StoreError>;

    async fn package(&self, id: &str) -> Result<Option<Package>, StoreError>;

    // Resolves the record a sub-payload points at
    async fn resolve(&self, details: &BookingDetails) -> BookingResult<Resource> {
        let id = details.resource_id();
        let found = match details {
            BookingDetails::Hotel(_) => self.hotel(id).await?.map(Resource::Hotel),
            BookingDetails::Vehicle(_) => self.vehicle(id).await?.map(Resource::Vehicle),
            BookingDetails::Package(_) => self.package(id).await?.map(Resource::Package),
        };
        found.ok_or_else(|| BookingError::NotFound {
            entity: match details.kind() {
                ResourceKind::Hotel => "hotel",
                ResourceKind::Vehicle => "vehicle",
                ResourceKind::Package => "package",
            },
            id: id.to_string(),
        })
    }
}

#[derive(Default)]
pub struct InMemoryCatalog {
    hotels: DashMap<String, Hotel>,
    vehicles: DashMap<String, Vehicle>,
    packages: DashMap<String, Package>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_hotel(&self, hotel: Hotel) {
        self.hotels.insert(hotel.id.clone(), hotel);
    }

    pub fn upsert_vehicle(&self, vehicle: Vehicle) {
        self.vehicles.insert(vehicle.id.clone(), vehicle);
    }

    pub fn upsert_package(&self, package: Package) {
        self.packages.insert(package.id.clone(), package);
    }

    pub fn set_vehicle_available(&self, id: &str, available: bool) -> bool {
        match self.vehicles.get_mut(id) {
            Some(mut vehicle) => {
                vehicle.available = available;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl ResourceCatalog for InMemoryCatalog {
    async fn hotel(&self, id: &str) -> Result<Option<Hotel>, StoreError> {
        Ok(self.hotels.get(id).map(|h| h.clone()))
    }

    async fn vehicle(&self, id: &str) -> Result<Option<Vehicle>, StoreError> {
        Ok(self.vehicles.get(id).map(|v| v.clone()))
    }

    async fn package(&self, id: &str) -> Result<Option<Package>, StoreError> {
        Ok(self.packages.get(id).map(|p| p.clone()))
    }
}
