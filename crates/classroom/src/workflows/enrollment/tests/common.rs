use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use axum::response::Response;
use serde_json::Value;

use crate::config::AdmissionConfig;
use crate::workflows::enrollment::domain::{
    Course, CourseId, EnrollmentChange, InstructorId, RequesterRole, StudentId,
};
use crate::workflows::enrollment::memory::{
    InMemoryCourseStore, InMemoryDirectory, InMemoryNotificationStore,
};
use crate::workflows::enrollment::notifications::{
    ConsolidatedNotification, NotificationKind, NotificationStore, NotificationStoreError,
};
use crate::workflows::enrollment::repository::{CourseStore, StoreError};
use crate::workflows::enrollment::{enrollment_router, CourseAdmissionService};

pub(super) type MemoryService =
    CourseAdmissionService<InMemoryCourseStore, InMemoryNotificationStore, InMemoryDirectory>;

pub(super) fn course_id() -> CourseId {
    CourseId("cs-101".to_string())
}

pub(super) fn instructor() -> InstructorId {
    InstructorId("prof-hopper".to_string())
}

pub(super) fn user(id: &str) -> StudentId {
    StudentId(id.to_string())
}

pub(super) fn prof() -> StudentId {
    user("prof-hopper")
}

pub(super) fn registrar() -> StudentId {
    user("registrar")
}

pub(super) fn directory() -> InMemoryDirectory {
    let mut users: Vec<(String, RequesterRole)> = ["ada", "brian", "cleo", "dev", "eve", "finn"]
        .into_iter()
        .map(|id| (id.to_string(), RequesterRole::Student))
        .collect();
    users.push(("prof-hopper".to_string(), RequesterRole::Instructor));
    users.push(("registrar".to_string(), RequesterRole::Admin));
    InMemoryDirectory::with_users(users)
}

pub(super) fn course(capacity: Option<u32>) -> Course {
    Course::new(course_id(), "Operating Systems", instructor(), capacity)
}

pub(super) fn build_service(
    capacity: Option<u32>,
) -> (
    MemoryService,
    Arc<InMemoryCourseStore>,
    Arc<InMemoryNotificationStore>,
) {
    build_service_with(course(capacity))
}

pub(super) fn build_service_with(
    course: Course,
) -> (
    MemoryService,
    Arc<InMemoryCourseStore>,
    Arc<InMemoryNotificationStore>,
) {
    let store = Arc::new(InMemoryCourseStore::default());
    store.put_course(course).expect("seed course");
    let notifications = Arc::new(InMemoryNotificationStore::default());
    let service = CourseAdmissionService::new(
        store.clone(),
        Arc::new(directory()),
        notifications.clone(),
        AdmissionConfig::default(),
    );
    (service, store, notifications)
}

pub(super) fn stored_course(store: &InMemoryCourseStore) -> Course {
    store
        .get_course(&course_id())
        .expect("store readable")
        .expect("course present")
}

pub(super) fn notification(
    notifications: &InMemoryNotificationStore,
    kind: NotificationKind,
) -> Option<ConsolidatedNotification> {
    notifications
        .find_notification(&course_id(), &instructor(), kind)
        .expect("notification store readable")
}

pub(super) fn waitlist_order(course: &Course) -> Vec<(String, u32)> {
    course
        .waitlist
        .iter()
        .map(|entry| (entry.student.0.clone(), entry.position))
        .collect()
}

/// Course store where another writer sneaks in a seat-taking commit before the next `races`
/// commits from the service.
pub(super) struct RacingStore {
    pub(super) inner: InMemoryCourseStore,
    races: AtomicU32,
    intruders: Vec<StudentId>,
}

impl RacingStore {
    pub(super) fn new(course: Course, intruders: Vec<StudentId>) -> Self {
        let inner = InMemoryCourseStore::default();
        inner.put_course(course).expect("seed course");
        let races = AtomicU32::new(intruders.len() as u32);
        Self {
            inner,
            races,
            intruders,
        }
    }
}

impl CourseStore for RacingStore {
    fn get_course(&self, id: &CourseId) -> Result<Option<Course>, StoreError> {
        self.inner.get_course(id)
    }

    fn commit_enrollment(
        &self,
        id: &CourseId,
        expected_version: u64,
        change: EnrollmentChange,
    ) -> Result<Course, StoreError> {
        let remaining = self.races.load(Ordering::SeqCst);
        if remaining > 0 {
            self.races.store(remaining - 1, Ordering::SeqCst);
            let index = self.intruders.len() - remaining as usize;
            let mut current = self.inner.get_course(id)?.expect("course present");
            current
                .enrolled_students
                .insert(self.intruders[index].clone());
            self.inner
                .commit_enrollment(id, current.version, current.admission_change())?;
        }
        self.inner.commit_enrollment(id, expected_version, change)
    }
}

pub(super) struct UnavailableStore;

impl CourseStore for UnavailableStore {
    fn get_course(&self, _id: &CourseId) -> Result<Option<Course>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn commit_enrollment(
        &self,
        _id: &CourseId,
        _expected_version: u64,
        _change: EnrollmentChange,
    ) -> Result<Course, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }
}

pub(super) struct OfflineNotifications;

impl NotificationStore for OfflineNotifications {
    fn find_notification(
        &self,
        _course: &CourseId,
        _recipient: &InstructorId,
        _kind: NotificationKind,
    ) -> Result<Option<ConsolidatedNotification>, NotificationStoreError> {
        Err(NotificationStoreError::Unavailable("queue offline".to_string()))
    }

    fn upsert_notification(
        &self,
        _notification: ConsolidatedNotification,
    ) -> Result<ConsolidatedNotification, NotificationStoreError> {
        Err(NotificationStoreError::Unavailable("queue offline".to_string()))
    }

    fn remove_notification(
        &self,
        _course: &CourseId,
        _recipient: &InstructorId,
        _kind: NotificationKind,
    ) -> Result<Option<ConsolidatedNotification>, NotificationStoreError> {
        Err(NotificationStoreError::Unavailable("queue offline".to_string()))
    }

    fn notifications_for(
        &self,
        _recipient: &InstructorId,
    ) -> Result<Vec<ConsolidatedNotification>, NotificationStoreError> {
        Err(NotificationStoreError::Unavailable("queue offline".to_string()))
    }
}

pub(super) fn router_with_service(service: MemoryService) -> axum::Router {
    enrollment_router(Arc::new(service))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 16 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
