use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;
use uuid::Uuid;

use mentora_availability::{AvailabilityWindow, Recurrence};
use mentora_booking::{
    BookingError, BookingManager, BookingStatus, PaymentMethod, PaymentReconciler,
    ReconcileError, TransactionStatus,
};
use mentora_core::{BusinessRules, EngineEvent, EventBus, ManualClock, MockPaymentGateway};
use mentora_shared::TimeRange;

fn engine() -> (Arc<BookingManager>, PaymentReconciler, Arc<ManualClock>, EventBus) {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap(),
    ));
    let events = EventBus::default();
    let manager = Arc::new(BookingManager::new(
        clock.clone(),
        BusinessRules::default(),
        Arc::new(MockPaymentGateway),
        events.clone(),
    ));
    let reconciler = PaymentReconciler::new(manager.clone());
    (manager, reconciler, clock, events)
}

/// Monday 2025-06-02 09:00-10:00, repeating weekly
fn monday_window(mentor_id: Uuid) -> AvailabilityWindow {
    AvailabilityWindow::new(
        mentor_id,
        Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap(),
        Recurrence::Weekly,
        None,
    )
    .unwrap()
}

fn monday(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, h, m, 0).unwrap()
}

async fn request(
    manager: &BookingManager,
    learner_id: Uuid,
    mentor_id: Uuid,
    windows: &[AvailabilityWindow],
    range: TimeRange,
) -> Result<mentora_booking::BookingReceipt, BookingError> {
    manager
        .request_booking(
            learner_id,
            mentor_id,
            windows,
            range,
            500_000,
            "VND",
            PaymentMethod::Payos,
        )
        .await
}

#[tokio::test]
async fn test_booking_confirmed_end_to_end() {
    let (manager, reconciler, _clock, events) = engine();
    let mut rx = events.subscribe();
    let mentor_id = Uuid::new_v4();
    let learner_id = Uuid::new_v4();
    let windows = [monday_window(mentor_id)];

    let receipt = request(
        &manager,
        learner_id,
        mentor_id,
        &windows,
        TimeRange::new(monday(9, 0), monday(9, 30)),
    )
    .await
    .unwrap();
    assert!(!receipt.checkout_url.is_empty());

    let booking = manager.get_booking(receipt.booking_id).unwrap();
    assert_eq!(booking.status, BookingStatus::PendingPayment);
    let gateway_ref = booking.payment_reference.unwrap();

    reconciler.on_payment_succeeded(&gateway_ref).unwrap();

    let booking = manager.get_booking(receipt.booking_id).unwrap();
    assert_eq!(booking.status, BookingStatus::Confirmed);
    assert!(booking.meeting_link.unwrap().contains("Mentora-"));

    let tx = manager.get_transaction(&gateway_ref).unwrap();
    assert_eq!(tx.status, TransactionStatus::Completed);

    match rx.try_recv().unwrap() {
        EngineEvent::BookingConfirmed(event) => {
            assert_eq!(event.booking_id, receipt.booking_id);
            assert_eq!(event.mentor_id, mentor_id);
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn test_overlapping_request_names_colliding_range() {
    let (manager, _reconciler, _clock, _events) = engine();
    let mentor_id = Uuid::new_v4();
    let windows = [monday_window(mentor_id)];

    let first = TimeRange::new(monday(9, 0), monday(9, 30));
    request(&manager, Uuid::new_v4(), mentor_id, &windows, first)
        .await
        .unwrap();

    let second = TimeRange::new(monday(9, 15), monday(9, 45));
    let err = request(&manager, Uuid::new_v4(), mentor_id, &windows, second)
        .await
        .unwrap_err();

    match err {
        BookingError::SlotConflict(conflict) => {
            assert_eq!(conflict.conflicting, first);
            assert_eq!(conflict.requested, second);
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_single_winner() {
    let (manager, _reconciler, _clock, _events) = engine();
    let mentor_id = Uuid::new_v4();
    let range = TimeRange::new(monday(9, 0), monday(9, 30));

    let mut handles = Vec::new();
    for _ in 0..6 {
        let manager = manager.clone();
        let windows = [monday_window(mentor_id)];
        handles.push(tokio::spawn(async move {
            request(&manager, Uuid::new_v4(), mentor_id, &windows, range)
                .await
                .is_ok()
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn test_payment_failure_cancels_and_frees_the_slot() {
    let (manager, reconciler, _clock, _events) = engine();
    let mentor_id = Uuid::new_v4();
    let windows = [monday_window(mentor_id)];
    let range = TimeRange::new(monday(9, 0), monday(9, 30));

    let receipt = request(&manager, Uuid::new_v4(), mentor_id, &windows, range)
        .await
        .unwrap();
    let gateway_ref = manager
        .get_booking(receipt.booking_id)
        .unwrap()
        .payment_reference
        .unwrap();

    reconciler.on_payment_failed_or_expired(&gateway_ref).unwrap();

    let booking = manager.get_booking(receipt.booking_id).unwrap();
    assert_eq!(booking.status, BookingStatus::Cancelled);
    assert_eq!(
        manager.get_transaction(&gateway_ref).unwrap().status,
        TransactionStatus::Failed
    );

    // The slot is bookable again
    request(&manager, Uuid::new_v4(), mentor_id, &windows, range)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_late_success_after_hold_expiry_stays_cancelled() {
    let (manager, reconciler, clock, _events) = engine();
    let mentor_id = Uuid::new_v4();
    let windows = [monday_window(mentor_id)];

    let receipt = request(
        &manager,
        Uuid::new_v4(),
        mentor_id,
        &windows,
        TimeRange::new(monday(9, 0), monday(9, 30)),
    )
    .await
    .unwrap();
    let gateway_ref = manager
        .get_booking(receipt.booking_id)
        .unwrap()
        .payment_reference
        .unwrap();

    // Hold TTL is 900 seconds; the success signal arrives too late
    clock.advance(Duration::minutes(16));

    let err = reconciler.on_payment_succeeded(&gateway_ref).unwrap_err();
    match err {
        ReconcileError::HoldExpired(expired) => {
            assert_eq!(expired.booking_id, receipt.booking_id);
        }
        other => panic!("unexpected error: {:?}", other),
    }

    let booking = manager.get_booking(receipt.booking_id).unwrap();
    assert_eq!(booking.status, BookingStatus::Cancelled);
    assert_eq!(
        manager.get_transaction(&gateway_ref).unwrap().status,
        TransactionStatus::Expired
    );

    // A replay of the same late signal reports the same outcome
    assert!(matches!(
        reconciler.on_payment_succeeded(&gateway_ref),
        Err(ReconcileError::HoldExpired(_))
    ));
}

#[tokio::test]
async fn test_replayed_success_signal_commits_once() {
    let (manager, reconciler, _clock, events) = engine();
    let mut rx = events.subscribe();
    let mentor_id = Uuid::new_v4();
    let windows = [monday_window(mentor_id)];

    let receipt = request(
        &manager,
        Uuid::new_v4(),
        mentor_id,
        &windows,
        TimeRange::new(monday(9, 0), monday(9, 30)),
    )
    .await
    .unwrap();
    let gateway_ref = manager
        .get_booking(receipt.booking_id)
        .unwrap()
        .payment_reference
        .unwrap();

    reconciler.on_payment_succeeded(&gateway_ref).unwrap();
    reconciler.on_payment_succeeded(&gateway_ref).unwrap();

    assert_eq!(
        manager.get_booking(receipt.booking_id).unwrap().status,
        BookingStatus::Confirmed
    );

    let mut confirmations = 0;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, EngineEvent::BookingConfirmed(_)) {
            confirmations += 1;
        }
    }
    assert_eq!(confirmations, 1);
}

#[tokio::test]
async fn test_unknown_reference_is_surfaced() {
    let (_manager, reconciler, _clock, _events) = engine();

    assert!(matches!(
        reconciler.on_payment_succeeded("pi_does_not_exist"),
        Err(ReconcileError::UnknownTransaction(_))
    ));
    assert!(matches!(
        reconciler.on_payment_failed_or_expired("pi_does_not_exist"),
        Err(ReconcileError::UnknownTransaction(_))
    ));
}

#[tokio::test]
async fn test_learner_cancellation_respects_cutoff() {
    let (manager, reconciler, clock, _events) = engine();
    let mentor_id = Uuid::new_v4();
    let learner_id = Uuid::new_v4();
    let windows = [monday_window(mentor_id)];

    let receipt = request(
        &manager,
        learner_id,
        mentor_id,
        &windows,
        TimeRange::new(monday(9, 0), monday(9, 30)),
    )
    .await
    .unwrap();
    let gateway_ref = manager
        .get_booking(receipt.booking_id)
        .unwrap()
        .payment_reference
        .unwrap();
    reconciler.on_payment_succeeded(&gateway_ref).unwrap();

    // Inside the 24h cutoff (session starts 2025-06-02 09:00)
    clock.set(Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap());
    let err = manager
        .cancel_booking(learner_id, receipt.booking_id, "change of plans")
        .unwrap_err();
    assert!(matches!(err, BookingError::CancellationTooLate { .. }));
    assert_eq!(
        manager.get_booking(receipt.booking_id).unwrap().status,
        BookingStatus::Confirmed
    );

    // Ahead of the cutoff the cancellation goes through and frees the slot
    clock.set(Utc.with_ymd_and_hms(2025, 6, 1, 8, 30, 0).unwrap());
    let cancelled = manager
        .cancel_booking(learner_id, receipt.booking_id, "change of plans")
        .unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);

    request(
        &manager,
        Uuid::new_v4(),
        mentor_id,
        &windows,
        TimeRange::new(monday(9, 0), monday(9, 30)),
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn test_stale_pending_bookings_are_swept() {
    let (manager, _reconciler, clock, events) = engine();
    let mut rx = events.subscribe();
    let mentor_id = Uuid::new_v4();
    let windows = [monday_window(mentor_id)];

    let receipt = request(
        &manager,
        Uuid::new_v4(),
        mentor_id,
        &windows,
        TimeRange::new(monday(9, 0), monday(9, 30)),
    )
    .await
    .unwrap();
    let gateway_ref = manager
        .get_booking(receipt.booking_id)
        .unwrap()
        .payment_reference
        .unwrap();

    clock.advance(Duration::hours(25));
    assert_eq!(manager.cancel_stale_pending(), 1);
    // Idempotent on a second run
    assert_eq!(manager.cancel_stale_pending(), 0);

    let booking = manager.get_booking(receipt.booking_id).unwrap();
    assert_eq!(booking.status, BookingStatus::Cancelled);
    assert_eq!(
        manager.get_transaction(&gateway_ref).unwrap().status,
        TransactionStatus::Expired
    );
    assert!(matches!(
        rx.try_recv().unwrap(),
        EngineEvent::BookingCancelled(_)
    ));
}

#[tokio::test]
async fn test_request_outside_availability_is_rejected() {
    let (manager, _reconciler, _clock, _events) = engine();
    let mentor_id = Uuid::new_v4();
    let windows = [monday_window(mentor_id)];

    // Tuesday is not in the mentor's calendar
    let tuesday = TimeRange::new(
        Utc.with_ymd_and_hms(2025, 6, 3, 9, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2025, 6, 3, 9, 30, 0).unwrap(),
    );
    let err = request(&manager, Uuid::new_v4(), mentor_id, &windows, tuesday)
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::OutsideAvailability { .. }));
}

#[tokio::test]
async fn test_session_elapses_into_completed() {
    let (manager, reconciler, _clock, _events) = engine();
    let mentor_id = Uuid::new_v4();
    let windows = [monday_window(mentor_id)];

    let receipt = request(
        &manager,
        Uuid::new_v4(),
        mentor_id,
        &windows,
        TimeRange::new(monday(9, 0), monday(9, 30)),
    )
    .await
    .unwrap();
    let gateway_ref = manager
        .get_booking(receipt.booking_id)
        .unwrap()
        .payment_reference
        .unwrap();
    reconciler.on_payment_succeeded(&gateway_ref).unwrap();

    let completed = manager.complete_booking(receipt.booking_id).unwrap();
    assert_eq!(completed.status, BookingStatus::Completed);

    // Terminal: a further failure signal is an integration defect
    assert!(matches!(
        reconciler.on_payment_failed_or_expired(&gateway_ref),
        Err(ReconcileError::InvalidTransition(_))
    ));
}

#[tokio::test]
async fn test_quota_gate_composes_with_booking_flow() {
    use mentora_quota::{FeatureKind, QuotaPolicy, ResetPeriod, UsageQuotaGate};
    use std::collections::HashMap;

    let (manager, _reconciler, clock, events) = engine();
    let gate = UsageQuotaGate::new(
        clock.clone(),
        HashMap::from([(
            FeatureKind::MentorBooking,
            QuotaPolicy {
                ceiling: 1,
                reset: ResetPeriod::Monthly,
            },
        )]),
        events.clone(),
        Duration::minutes(15),
    );

    let mentor_id = Uuid::new_v4();
    let learner_id = Uuid::new_v4();
    let windows = [monday_window(mentor_id)];

    // Quota is consulted before the quota-limited action
    let grant = gate.try_consume(learner_id, FeatureKind::MentorBooking).unwrap();
    let outcome = request(
        &manager,
        learner_id,
        mentor_id,
        &windows,
        TimeRange::new(monday(9, 0), monday(9, 30)),
    )
    .await;
    assert!(outcome.is_ok());
    gate.commit(&grant);

    // Ceiling reached for the rest of the month
    gate.try_consume(learner_id, FeatureKind::MentorBooking)
        .unwrap_err();

    // A conflicting attempt compensates its reservation
    let other_learner = Uuid::new_v4();
    let grant = gate
        .try_consume(other_learner, FeatureKind::MentorBooking)
        .unwrap();
    let outcome = request(
        &manager,
        other_learner,
        mentor_id,
        &windows,
        TimeRange::new(monday(9, 0), monday(9, 30)),
    )
    .await;
    assert!(matches!(outcome, Err(BookingError::SlotConflict(_))));
    gate.release(&grant);
    assert_eq!(gate.current_usage(other_learner, FeatureKind::MentorBooking), 0);
}
