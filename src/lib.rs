// Main library file for the travel booking reservation core

// One module per component, leaf-first
pub mod availability;
pub mod clock;
pub mod config;
pub mod error;
pub mod inventory;
pub mod itinerary;
pub mod lifecycle;
pub mod model;
pub mod money;
pub mod notify;
pub mod pricing;
pub mod refund;
pub mod resources;
pub mod store;

#[cfg(test)]
pub(crate) mod fixtures;

// Re-export key types for convenience
pub use availability::AvailabilityValidator;
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::BookingConfig;
pub use error::{BookingError, BookingResult, ErrorKind};
pub use inventory::{Claim, Holding, InventoryReservationManager, UnitKey};
pub use itinerary::{ActivityUpdate, ItineraryProgressTracker};
pub use lifecycle::{
    BookingLifecycleController, BookingPatch, Collaborators, CreateBookingRequest, HotelPatch,
    PackagePatch, UpdateBookingRequest, VehiclePatch,
};
pub use model::{
    Booking, BookingDetails, BookingReference, BookingStatus, HotelBooking, PackageBooking,
    PaymentStatus, ResourceKind, VehicleBooking,
};
pub use money::{Money, Multiplier};
pub use notify::{BookingEvent, LogNotifier, Notifier, NotifyError, WebhookNotifier};
pub use pricing::{PricingEngine, Quote};
pub use refund::{CancellationRefundCalculator, RefundPolicy, RefundQuote, RefundTier};
pub use resources::{InMemoryCatalog, Resource, ResourceCatalog};
pub use store::{BookingQuery, BookingStore, InMemoryBookingStore, Page, StoreError};
