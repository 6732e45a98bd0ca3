use super::common::*;
use crate::config::AdmissionConfig;
use crate::workflows::enrollment::memory::{InMemoryCourseStore, InMemoryNotificationStore};
use crate::workflows::enrollment::notifications::{NotificationConsolidator, NotificationKind};
use crate::workflows::enrollment::{AdmissionOutcome, CourseAdmissionService};
use chrono::{Duration, Utc};
use std::sync::Arc;

#[test]
fn enrollment_summary_refresh_is_idempotent() {
    let store = Arc::new(InMemoryNotificationStore::default());
    let consolidator = NotificationConsolidator::new(store.clone());
    let mut course = course(Some(10));
    course.enrolled_students.insert(user("ada"));
    course.enrolled_students.insert(user("brian"));

    let earlier = Utc::now() - Duration::minutes(5);
    let first = consolidator
        .refresh_enrollment_summary(&course, earlier)
        .expect("summary created");
    let second = consolidator
        .refresh_enrollment_summary(&course, Utc::now())
        .expect("summary refreshed");

    assert_eq!(first, second);
    assert_eq!(second.count, 2);
    assert_eq!(second.updated_at, earlier);
    assert_eq!(store.all().expect("readable").len(), 1);
}

#[test]
fn count_changes_update_in_place() {
    let store = Arc::new(InMemoryNotificationStore::default());
    let consolidator = NotificationConsolidator::new(store.clone());
    let mut course = course(Some(10));

    let empty = consolidator
        .refresh_enrollment_summary(&course, Utc::now())
        .expect("zero summary is legitimate");
    assert_eq!(empty.count, 0);

    for id in ["ada", "brian", "cleo"] {
        course.enrolled_students.insert(user(id));
        consolidator
            .refresh_enrollment_summary(&course, Utc::now())
            .expect("refresh");
    }

    let records = store.all().expect("readable");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, empty.id);
    assert_eq!(records[0].count, 3);
    assert!(records[0].message().contains("3 student(s) enrolled"));
}

#[test]
fn empty_waitlist_removes_pending_notice() {
    let store = Arc::new(InMemoryNotificationStore::default());
    let consolidator = NotificationConsolidator::new(store.clone());
    let mut course = course(Some(0));

    assert!(consolidator
        .refresh_waitlist_pending(&course, Utc::now())
        .expect("refresh")
        .is_none());
    assert!(notification(&store, NotificationKind::WaitlistPending).is_none());

    course.enqueue_waitlist(user("ada"), Utc::now());
    course.enqueue_waitlist(user("brian"), Utc::now());
    let pending = consolidator
        .refresh_waitlist_pending(&course, Utc::now())
        .expect("refresh")
        .expect("pending notice exists");
    assert_eq!(pending.count, 2);

    course.remove_from_waitlist(&user("ada"));
    course.remove_from_waitlist(&user("brian"));
    assert!(consolidator
        .refresh_waitlist_pending(&course, Utc::now())
        .expect("refresh")
        .is_none());
    assert!(notification(&store, NotificationKind::WaitlistPending).is_none());
}

#[test]
fn promotions_accumulate_on_one_instructor_record() {
    let store = Arc::new(InMemoryNotificationStore::default());
    let consolidator = NotificationConsolidator::new(store.clone());
    let course = course(Some(1));

    let first = consolidator
        .record_promotion(&course, &user("cleo"), Utc::now())
        .expect("recorded");
    let second = consolidator
        .record_promotion(&course, &user("dev"), Utc::now())
        .expect("recorded");

    assert_eq!(first.id, second.id);
    assert_eq!(second.count, 2);
    assert_eq!(second.recipient, instructor());
    assert_eq!(second.subject, Some(user("dev")));
    assert!(second.message().contains("dev was promoted"));
}

#[test]
fn service_keeps_notifications_in_step_with_state() {
    let (service, _, notifications) = build_service(Some(1));
    let course = course_id();

    service.request_enrollment(&course, &user("ada"), &user("ada")).unwrap();
    assert_eq!(
        notification(&notifications, NotificationKind::EnrollmentSummary).map(|n| n.count),
        Some(1)
    );
    assert!(notification(&notifications, NotificationKind::WaitlistPending).is_none());

    service.request_enrollment(&course, &user("brian"), &user("brian")).unwrap();
    assert_eq!(
        notification(&notifications, NotificationKind::WaitlistPending).map(|n| n.count),
        Some(1)
    );

    service
        .cancel_enrollment(&course, &user("ada"), &user("ada"))
        .expect("ada leaves");
    assert_eq!(
        notification(&notifications, NotificationKind::EnrollmentSummary).map(|n| n.count),
        Some(1)
    );
    assert!(notification(&notifications, NotificationKind::WaitlistPending).is_none());
    let promotion = notification(&notifications, NotificationKind::WaitlistPromotion)
        .expect("instructor told about promotion");
    assert_eq!(promotion.subject, Some(user("brian")));

    let listed = service
        .notifications_for(&instructor())
        .expect("instructor notifications");
    assert_eq!(listed.len(), 2);
}

#[test]
fn notification_outages_do_not_undo_admissions() {
    let store = Arc::new(InMemoryCourseStore::default());
    store.put_course(course(Some(2))).expect("seed");
    let service = CourseAdmissionService::new(
        store.clone(),
        Arc::new(directory()),
        Arc::new(OfflineNotifications),
        AdmissionConfig::default(),
    );

    let outcome = service
        .request_enrollment(&course_id(), &user("ada"), &user("ada"))
        .expect("admission succeeds despite notification outage");
    assert_eq!(outcome, AdmissionOutcome::Enrolled);
    assert!(stored_course(&store).is_enrolled(&user("ada")));

    assert!(service.reconcile_notifications(&course_id()).is_err());
}

#[test]
fn reconcile_heals_stale_counts() {
    let (service, store, notifications) = build_service(Some(5));
    let mut seeded = stored_course(&store);
    seeded.enrolled_students.insert(user("ada"));
    seeded.enrolled_students.insert(user("brian"));
    store.put_course(seeded).expect("external writer");

    assert!(notification(&notifications, NotificationKind::EnrollmentSummary).is_none());
    service
        .reconcile_notifications(&course_id())
        .expect("reconciled");
    assert_eq!(
        notification(&notifications, NotificationKind::EnrollmentSummary).map(|n| n.count),
        Some(2)
    );
}

#[test]
fn reconcile_rebuilds_counts_but_not_lost_promotion_notices() {
    let (service, store, notifications) = build_service(Some(1));
    let course = course_id();
    service.request_enrollment(&course, &user("ada"), &user("ada")).unwrap();
    service.request_enrollment(&course, &user("brian"), &user("brian")).unwrap();

    let mut promoted = stored_course(&store);
    promoted.enrolled_students.remove(&user("ada"));
    promoted.promote_waitlist_head(Utc::now());
    store.put_course(promoted).expect("promotion written without its notice");

    service
        .reconcile_notifications(&course)
        .expect("reconciled");
    assert_eq!(
        notification(&notifications, NotificationKind::EnrollmentSummary).map(|n| n.count),
        Some(1)
    );
    assert!(notification(&notifications, NotificationKind::WaitlistPending).is_none());
    assert!(notification(&notifications, NotificationKind::WaitlistPromotion).is_none());
}
