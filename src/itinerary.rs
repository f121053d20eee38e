// Itinerary progress for package bookings
// completedActivities only ever grows, and never holds the same activity twice.

use crate::error::{BookingError, BookingResult};
use crate::model::{Booking, BookingStatus, ItineraryProgress, ItineraryStatus, PackageBooking};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityUpdate {
    Completed,
    Upcoming,
}

pub struct ItineraryProgressTracker;

impl ItineraryProgressTracker {
    /// Records `activity_id` as done and moves the next-activity pointer.
    ///
    /// Returns `false` when the activity was already recorded; the list is left untouched.
    pub fn mark_activity_completed(booking: &mut Booking, activity_id: &str) -> BookingResult<bool> {
        let package = Self::editable(booking, "update itinerary of")?;
        Self::ensure_known(package, activity_id)?;

        let progress = &mut package.itinerary.progress;
        let added = !progress.completed_activities.iter().any(|a| a == activity_id);
        if added {
            progress.completed_activities.push(activity_id.to_string());
        }
        Self::recompute(package);
        Ok(added)
    }

    // Pins the pointer without touching the completed list
    pub fn mark_upcoming(booking: &mut Booking, activity_id: &str) -> BookingResult<()> {
        let package = Self::editable(booking, "update itinerary of")?;
        Self::ensure_known(package, activity_id)?;

        let progress = &mut package.itinerary.progress;
        if progress.completed_activities.iter().any(|a| a == activity_id) {
            return Err(BookingError::validation(
                "activityId",
                format!("activity '{}' is already completed", activity_id),
            ));
        }
        progress.next_activity = Some(activity_id.to_string());
        if progress.status == ItineraryStatus::Completed {
            progress.status = ItineraryStatus::InProgress;
        }
        Ok(())
    }

    pub fn apply(booking: &mut Booking, activity_id: &str, update: ActivityUpdate) -> BookingResult<()> {
        match update {
            ActivityUpdate::Completed => Self::mark_activity_completed(booking, activity_id).map(|_| ()),
            ActivityUpdate::Upcoming => Self::mark_upcoming(booking, activity_id),
        }
    }

    pub(crate) fn cancel(package: &mut PackageBooking) {
        package.itinerary.progress.status = ItineraryStatus::Cancelled;
    }

    // Seeds the pointer for a freshly created booking
    pub(crate) fn initialize(package: &mut PackageBooking) {
        package.itinerary.progress = ItineraryProgress::default();
        Self::recompute(package);
    }

    // Customizations changed: completed activities must survive the edit
    pub(crate) fn reconcile(package: &mut PackageBooking) -> BookingResult<()> {
        if package.itinerary.progress.status == ItineraryStatus::Cancelled {
            return Ok(());
        }
        let customizations = &package.customizations;
        if let Some(dropped) = package
            .itinerary
            .progress
            .completed_activities
            .iter()
            .find(|done| !customizations.iter().any(|c| &c.option_id == *done))
        {
            return Err(BookingError::validation(
                "packageBooking.customizations",
                format!("completed activity '{}' cannot be removed", dropped),
            ));
        }
        Self::recompute(package);
        Ok(())
    }

    fn recompute(package: &mut PackageBooking) {
        let progress = &mut package.itinerary.progress;
        let done = progress.completed_activities.len();

        progress.next_activity = package
            .customizations
            .get(done)
            .map(|entry| entry.option_id.clone());

        let all_done = package
            .customizations
            .iter()
            .all(|entry| progress.completed_activities.contains(&entry.option_id));

        progress.status = if done == 0 {
            ItineraryStatus::NotStarted
        } else if all_done {
            ItineraryStatus::Completed
        } else {
            ItineraryStatus::InProgress
        };
    }

    fn editable<'a>(booking: &'a mut Booking, operation: &'static str) -> BookingResult<&'a mut PackageBooking> {
        if matches!(
            booking.status,
            BookingStatus::Draft | BookingStatus::Completed | BookingStatus::Cancelled
        ) {
            return Err(booking.state_conflict(operation));
        }
        let kind = booking.booking_type();
        booking.package_mut().ok_or_else(|| {
            BookingError::validation(
                "bookingType",
                format!("{} bookings have no itinerary", kind),
            )
        })
    }

    fn ensure_known(package: &PackageBooking, activity_id: &str) -> BookingResult<()> {
        if package.customizations.iter().any(|c| c.option_id == activity_id) {
            Ok(())
        } else {
            Err(BookingError::validation(
                "activityId",
                format!("'{}' is not part of this itinerary", activity_id),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::fixtures;
    use crate::model::BookingDetails;

    fn package_booking() -> Booking {
        let mut details = fixtures::package_booking(fixtures::saturday(), 2);
        details.customizations = fixtures::itinerary_customizations();
        ItineraryProgressTracker::initialize(&mut details);
        let mut booking = fixtures::booking(BookingDetails::Package(details));
        booking.status = BookingStatus::Confirmed;
        booking
    }

    fn progress(booking: &Booking) -> &ItineraryProgress {
        &booking.package().unwrap().itinerary.progress
    }

    #[test]
    fn test_initial_pointer_is_first_entry() {
        let booking = package_booking();
        assert_eq!(progress(&booking).next_activity.as_deref(), Some("acc-lodge"));
        assert_eq!(progress(&booking).status, ItineraryStatus::NotStarted);
    }

    #[test]
    fn test_completion_advances_pointer() {
        let mut booking = package_booking();
        assert!(ItineraryProgressTracker::mark_activity_completed(&mut booking, "acc-lodge").unwrap());

        assert_eq!(progress(&booking).completed_activities, vec!["acc-lodge"]);
        assert_eq!(progress(&booking).next_activity.as_deref(), Some("act-kayak"));
        assert_eq!(progress(&booking).status, ItineraryStatus::InProgress);
    }

    #[test]
    fn test_repeated_completion_is_idempotent() {
        let mut booking = package_booking();
        for _ in 0..3 {
            ItineraryProgressTracker::mark_activity_completed(&mut booking, "acc-lodge").unwrap();
        }
        assert!(!ItineraryProgressTracker::mark_activity_completed(&mut booking, "acc-lodge").unwrap());
        assert_eq!(progress(&booking).completed_activities.len(), 1);
        assert_eq!(progress(&booking).next_activity.as_deref(), Some("act-kayak"));
    }

    #[test]
    fn test_completed_list_never_shrinks() {
        let mut booking = package_booking();
        let ids: Vec<String> = fixtures::itinerary_customizations()
            .into_iter()
            .map(|c| c.option_id)
            .collect();

        let mut previous_len = 0;
        for id in ids.iter().chain(ids.iter()) {
            ItineraryProgressTracker::mark_activity_completed(&mut booking, id).unwrap();
            let len = progress(&booking).completed_activities.len();
            assert!(len >= previous_len);
            previous_len = len;
        }
        assert_eq!(previous_len, ids.len());
        assert_eq!(progress(&booking).next_activity, None);
        assert_eq!(progress(&booking).status, ItineraryStatus::Completed);
    }

    #[test]
    fn test_unknown_activity_is_rejected() {
        let mut booking = package_booking();
        let err = ItineraryProgressTracker::mark_activity_completed(&mut booking, "act-skydive").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(progress(&booking).completed_activities.is_empty());
    }

    #[test]
    fn test_upcoming_pins_pointer() {
        let mut booking = package_booking();
        ItineraryProgressTracker::apply(&mut booking, "act-hike", ActivityUpdate::Upcoming).unwrap();
        assert_eq!(progress(&booking).next_activity.as_deref(), Some("act-hike"));
        assert!(progress(&booking).completed_activities.is_empty());

        ItineraryProgressTracker::apply(&mut booking, "act-hike", ActivityUpdate::Completed).unwrap();
        let err = ItineraryProgressTracker::apply(&mut booking, "act-hike", ActivityUpdate::Upcoming).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_cancelled_booking_is_frozen() {
        let mut booking = package_booking();
        booking.status = BookingStatus::Cancelled;
        let err = ItineraryProgressTracker::mark_activity_completed(&mut booking, "acc-lodge").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateConflict);
    }

    #[test]
    fn test_customization_edit_keeps_completed_activities() {
        let mut booking = package_booking();
        ItineraryProgressTracker::mark_activity_completed(&mut booking, "act-kayak").unwrap();
        let package = booking.package_mut().unwrap();

        // Dropping an untouched entry is fine; the pointer follows the new list
        package.customizations.retain(|c| c.option_id != "acc-lodge");
        ItineraryProgressTracker::reconcile(package).unwrap();
        assert_eq!(package.itinerary.progress.completed_activities, vec!["act-kayak"]);
        assert_eq!(package.itinerary.progress.next_activity.as_deref(), Some("act-hike"));

        let mut emptied = package.clone();
        emptied.customizations.clear();
        let err = ItineraryProgressTracker::reconcile(&mut emptied).unwrap_err();
        assert!(matches!(err, BookingError::Validation { ref field, .. } if field == "packageBooking.customizations"));
        assert_eq!(emptied.itinerary.progress.completed_activities, vec!["act-kayak"]);
    }

    #[test]
    fn test_hotel_booking_has_no_itinerary() {
        let mut booking = fixtures::booking(BookingDetails::Hotel(fixtures::hotel_booking(
            &["101"],
            fixtures::in_days(40),
            2,
        )));
        let err = ItineraryProgressTracker::mark_activity_completed(&mut booking, "acc-lodge").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
