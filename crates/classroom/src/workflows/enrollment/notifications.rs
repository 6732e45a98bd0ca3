//! Consolidated instructor notifications.
//!
//! Enrollment and waitlist events are collapsed into a single record per
//! `(course, recipient, kind)` that is updated in place, so an instructor sees "37 enrolled"
//! rather than 37 separate notices.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{Course, CourseId, InstructorId, StudentId};

/// Stable identity of a consolidated notification across in-place updates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    EnrollmentSummary,
    WaitlistPending,
    WaitlistPromotion,
}

impl NotificationKind {
    pub const fn label(self) -> &'static str {
        match self {
            NotificationKind::EnrollmentSummary => "enrollment_summary",
            NotificationKind::WaitlistPending => "waitlist_pending",
            NotificationKind::WaitlistPromotion => "waitlist_promotion",
        }
    }
}

/// Aggregate notice addressed to a course instructor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidatedNotification {
    pub id: NotificationId,
    pub course: CourseId,
    pub recipient: InstructorId,
    pub kind: NotificationKind,
    pub count: u32,
    /// Most recently promoted student, for `WaitlistPromotion` notices.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<StudentId>,
    pub updated_at: DateTime<Utc>,
}

impl ConsolidatedNotification {
    pub fn message(&self) -> String {
        match self.kind {
            NotificationKind::EnrollmentSummary => {
                format!("{} student(s) enrolled in {}", self.count, self.course)
            }
            NotificationKind::WaitlistPending => {
                format!("{} student(s) waiting for a seat in {}", self.count, self.course)
            }
            NotificationKind::WaitlistPromotion => match &self.subject {
                Some(student) => format!(
                    "{student} was promoted from the waitlist of {} ({} promotion(s) so far)",
                    self.course, self.count
                ),
                None => format!(
                    "{} student(s) promoted from the waitlist of {}",
                    self.count, self.course
                ),
            },
        }
    }
}

/// Persistence for consolidated notifications, keyed by `(course, recipient, kind)`.
pub trait NotificationStore: Send + Sync {
    fn find_notification(
        &self,
        course: &CourseId,
        recipient: &InstructorId,
        kind: NotificationKind,
    ) -> Result<Option<ConsolidatedNotification>, NotificationStoreError>;

    /// Insert or replace the record sharing this notification's key.
    fn upsert_notification(
        &self,
        notification: ConsolidatedNotification,
    ) -> Result<ConsolidatedNotification, NotificationStoreError>;

    fn remove_notification(
        &self,
        course: &CourseId,
        recipient: &InstructorId,
        kind: NotificationKind,
    ) -> Result<Option<ConsolidatedNotification>, NotificationStoreError>;

    fn notifications_for(
        &self,
        recipient: &InstructorId,
    ) -> Result<Vec<ConsolidatedNotification>, NotificationStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationStoreError {
    #[error("notification store unavailable: {0}")]
    Unavailable(String),
}

static NOTIFICATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_notification_id() -> NotificationId {
    let id = NOTIFICATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    NotificationId(format!("ntf-{id:06}"))
}

/// Keeps notification records in step with a course's committed admission state.
pub struct NotificationConsolidator<N> {
    store: Arc<N>,
}

impl<N> Clone for NotificationConsolidator<N> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<N> NotificationConsolidator<N>
where
    N: NotificationStore,
{
    pub fn new(store: Arc<N>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<N> {
        &self.store
    }

    /// Set the enrollment summary count to the roster size. Unchanged counts are not rewritten.
    pub fn refresh_enrollment_summary(
        &self,
        course: &Course,
        now: DateTime<Utc>,
    ) -> Result<ConsolidatedNotification, NotificationStoreError> {
        self.set_count(
            course,
            NotificationKind::EnrollmentSummary,
            count_of(course.enrolled_count()),
            now,
        )
    }

    /// Track the waitlist length; an empty waitlist removes the record instead of storing zero.
    pub fn refresh_waitlist_pending(
        &self,
        course: &Course,
        now: DateTime<Utc>,
    ) -> Result<Option<ConsolidatedNotification>, NotificationStoreError> {
        if course.waitlist.is_empty() {
            self.store.remove_notification(
                &course.id,
                &course.instructor,
                NotificationKind::WaitlistPending,
            )?;
            return Ok(None);
        }

        self.set_count(
            course,
            NotificationKind::WaitlistPending,
            count_of(course.waitlist.len()),
            now,
        )
        .map(Some)
    }

    /// Tell the instructor that `promoted` moved from the waitlist onto the roster.
    pub fn record_promotion(
        &self,
        course: &Course,
        promoted: &StudentId,
        now: DateTime<Utc>,
    ) -> Result<ConsolidatedNotification, NotificationStoreError> {
        let existing = self.store.find_notification(
            &course.id,
            &course.instructor,
            NotificationKind::WaitlistPromotion,
        )?;

        let (id, count) = match existing {
            Some(existing) => (existing.id, existing.count.saturating_add(1)),
            None => (next_notification_id(), 1),
        };

        self.store.upsert_notification(ConsolidatedNotification {
            id,
            course: course.id.clone(),
            recipient: course.instructor.clone(),
            kind: NotificationKind::WaitlistPromotion,
            count,
            subject: Some(promoted.clone()),
            updated_at: now,
        })
    }

    /// Re-derive both count-based notifications from the given course state.
    pub fn reconcile(
        &self,
        course: &Course,
        now: DateTime<Utc>,
    ) -> Result<(), NotificationStoreError> {
        self.refresh_enrollment_summary(course, now)?;
        self.refresh_waitlist_pending(course, now)?;
        Ok(())
    }

    fn set_count(
        &self,
        course: &Course,
        kind: NotificationKind,
        count: u32,
        now: DateTime<Utc>,
    ) -> Result<ConsolidatedNotification, NotificationStoreError> {
        let existing = self
            .store
            .find_notification(&course.id, &course.instructor, kind)?;

        let id = match existing {
            Some(existing) if existing.count == count => return Ok(existing),
            Some(existing) => existing.id,
            None => next_notification_id(),
        };

        self.store.upsert_notification(ConsolidatedNotification {
            id,
            course: course.id.clone(),
            recipient: course.instructor.clone(),
            kind,
            count,
            subject: None,
            updated_at: now,
        })
    }
}

fn count_of(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}
