// Booking persistence
// Every write is version-checked; a stale copy never overwrites a newer one.

use crate::model::{Booking, BookingReference, BookingStatus, PaymentStatus, ResourceKind};
use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Booking not found: {0}")]
    NotFound(String),

    #[error("Booking reference already taken: {0}")]
    Duplicate(BookingReference),

    #[error("Stale write for {reference}: expected version {expected}, found {found}")]
    VersionMismatch {
        reference: BookingReference,
        status: BookingStatus,
        expected: u64,
        found: u64,
    },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    #[default]
    CreatedAt,
    StartDate,
    TotalPrice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BookingQuery {
    pub status: Option<BookingStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub booking_type: Option<ResourceKind>,
    pub user_id: Option<String>,
    // Inclusive bounds on the service start date
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub sort: SortField,
    pub direction: SortDirection,
    // 1-based
    pub page: usize,
    pub per_page: usize,
}

impl Default for BookingQuery {
    fn default() -> Self {
        Self {
            status: None,
            payment_status: None,
            booking_type: None,
            user_id: None,
            date_from: None,
            date_to: None,
            sort: SortField::default(),
            direction: SortDirection::default(),
            page: 1,
            per_page: 20,
        }
    }
}

impl BookingQuery {
    pub fn matches(&self, booking: &Booking) -> bool {
        let start = booking.details.starts_at().date_naive();
        self.status.map_or(true, |s| booking.status == s)
            && self.payment_status.map_or(true, |s| booking.payment.status == s)
            && self.booking_type.map_or(true, |k| booking.booking_type() == k)
            && self.user_id.as_deref().map_or(true, |u| booking.user_id == u)
            && self.date_from.map_or(true, |from| start >= from)
            && self.date_to.map_or(true, |to| start <= to)
    }

    fn compare(&self, a: &Booking, b: &Booking) -> Ordering {
        let ordering = match self.sort {
            SortField::CreatedAt => a.created_at.cmp(&b.created_at),
            SortField::StartDate => a.details.starts_at().cmp(&b.details.starts_at()),
            SortField::TotalPrice => a.pricing.total_price.cmp(&b.pricing.total_price),
        }
        // Stable across pages when the sort key ties
        .then_with(|| a.reference.cmp(&b.reference));

        match self.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
}

#[async_trait]
pub trait BookingStore: Send + Sync + 'static {
    // Persists a new booking at version 1; an existing reference is a Duplicate
    async fn insert(&self, booking: Booking) -> Result<Booking, StoreError>;

    // Replaces the stored copy when `booking.version` still matches, bumping it
    async fn update(&self, booking: Booking) -> Result<Booking, StoreError>;

    async fn get(&self, reference: &BookingReference) -> Result<Booking, StoreError>;

    async fn query(&self, query: &BookingQuery) -> Result<Page<Booking>, StoreError>;
}

#[derive(Default)]
pub struct InMemoryBookingStore {
    bookings: DashMap<BookingReference, Booking>,
    offline: AtomicBool,
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bookings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookings.is_empty()
    }

    // Makes every write fail with Unavailable, for outage drills
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, AtomicOrdering::SeqCst);
    }

    fn ensure_online(&self) -> Result<(), StoreError> {
        if self.offline.load(AtomicOrdering::SeqCst) {
            Err(StoreError::Unavailable("in-memory store is offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn insert(&self, mut booking: Booking) -> Result<Booking, StoreError> {
        self.ensure_online()?;
        match self.bookings.entry(booking.reference.clone()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(booking.reference)),
            Entry::Vacant(slot) => {
                booking.version = 1;
                slot.insert(booking.clone());
                Ok(booking)
            }
        }
    }

    async fn update(&self, mut booking: Booking) -> Result<Booking, StoreError> {
        self.ensure_online()?;
        let mut stored = self
            .bookings
            .get_mut(&booking.reference)
            .ok_or_else(|| StoreError::NotFound(booking.reference.to_string()))?;

        if stored.version != booking.version {
            return Err(StoreError::VersionMismatch {
                reference: booking.reference.clone(),
                status: stored.status,
                expected: booking.version,
                found: stored.version,
            });
        }

        booking.version += 1;
        *stored = booking.clone();
        Ok(booking)
    }

    async fn get(&self, reference: &BookingReference) -> Result<Booking, StoreError> {
        self.bookings
            .get(reference)
            .map(|b| b.clone())
            .ok_or_else(|| StoreError::NotFound(reference.to_string()))
    }

    async fn query(&self, query: &BookingQuery) -> Result<Page<Booking>, StoreError> {
        let mut matching: Vec<Booking> = self
            .bookings
            .iter()
            .filter(|entry| query.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        matching.sort_by(|a, b| query.compare(a, b));

        let page = query.page.max(1);
        let per_page = query.per_page.max(1);
        let total = matching.len();
        let items = matching
            .into_iter()
            .skip((page - 1) * per_page)
            .take(per_page)
            .collect();

        Ok(Page {
            items,
            total,
            page,
            per_page,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::model::BookingDetails;
    use crate::money::Money;

    fn hotel(days_ahead: i64) -> Booking {
        fixtures::booking(BookingDetails::Hotel(fixtures::hotel_booking(
            &["101"],
            fixtures::in_days(days_ahead),
            2,
        )))
    }

    #[tokio::test]
    async fn test_insert_assigns_first_version() {
        let store = InMemoryBookingStore::new();
        let stored = store.insert(hotel(10)).await.unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(store.get(&stored.reference).await.unwrap(), stored);
    }

    #[tokio::test]
    async fn test_duplicate_reference_is_rejected() {
        let store = InMemoryBookingStore::new();
        let booking = hotel(10);
        store.insert(booking.clone()).await.unwrap();

        let err = store.insert(booking.clone()).await.unwrap_err();
        assert_eq!(err, StoreError::Duplicate(booking.reference));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_stale_update_is_rejected() {
        let store = InMemoryBookingStore::new();
        let stored = store.insert(hotel(10)).await.unwrap();

        let mut first = stored.clone();
        first.status = BookingStatus::Confirmed;
        let first = store.update(first).await.unwrap();
        assert_eq!(first.version, 2);

        let mut stale = stored;
        stale.status = BookingStatus::Cancelled;
        match store.update(stale).await.unwrap_err() {
            StoreError::VersionMismatch { expected, found, status, .. } => {
                assert_eq!((expected, found), (1, 2));
                assert_eq!(status, BookingStatus::Confirmed);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(store.get(&first.reference).await.unwrap().status, BookingStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_offline_store_fails_writes() {
        let store = InMemoryBookingStore::new();
        store.set_offline(true);
        let err = store.insert(hotel(10)).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_query_filters_and_paginates() {
        let store = InMemoryBookingStore::new();
        for days in [5, 15, 25, 35] {
            store.insert(hotel(days)).await.unwrap();
        }
        let mut vehicle = fixtures::booking(BookingDetails::Vehicle(fixtures::vehicle_booking(
            fixtures::in_days(20),
            3,
        )));
        vehicle.user_id = "user-2".to_string();
        store.insert(vehicle).await.unwrap();

        let query = BookingQuery {
            booking_type: Some(ResourceKind::Hotel),
            date_from: Some(fixtures::in_days(10)),
            sort: SortField::StartDate,
            direction: SortDirection::Asc,
            per_page: 2,
            ..BookingQuery::default()
        };
        let first = store.query(&query).await.unwrap();
        assert_eq!(first.total, 3);
        assert_eq!(first.items.len(), 2);
        assert!(first.items[0].details.starts_at() < first.items[1].details.starts_at());

        let second = store.query(&BookingQuery { page: 2, ..query }).await.unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(
            second.items[0].details.starts_at().date_naive(),
            fixtures::in_days(35)
        );

        let by_user = store
            .query(&BookingQuery {
                user_id: Some("user-2".to_string()),
                ..BookingQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(by_user.total, 1);
        assert_eq!(by_user.items[0].booking_type(), ResourceKind::Vehicle);
    }

    #[tokio::test]
    async fn test_query_sorts_by_total_descending() {
        let store = InMemoryBookingStore::new();
        for (days, total) in [(5, 300), (6, 100), (7, 200)] {
            let mut booking = hotel(days);
            booking.pricing = crate::model::Pricing::new(Money::from_major(total), Money::ZERO, vec![], vec![]);
            store.insert(booking).await.unwrap();
        }

        let page = store
            .query(&BookingQuery {
                sort: SortField::TotalPrice,
                ..BookingQuery::default()
            })
            .await
            .unwrap();
        let totals: Vec<Money> = page.items.iter().map(|b| b.pricing.total_price).collect();
        assert_eq!(
            totals,
            vec![Money::from_major(300), Money::from_major(200), Money::from_major(100)]
        );
    }
}
