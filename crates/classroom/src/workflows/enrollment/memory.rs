//! Process-local implementations of the course, notification, and identity collaborators.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use super::domain::{Course, CourseId, EnrollmentChange, InstructorId, RequesterRole, StudentId};
use super::notifications::{
    ConsolidatedNotification, NotificationKind, NotificationStore, NotificationStoreError,
};
use super::repository::{CourseStore, IdentityDirectory, IdentityError, StoreError};

/// Versioned course records behind a mutex; commits are compare-and-swap on `Course::version`.
#[derive(Default, Clone)]
pub struct InMemoryCourseStore {
    courses: Arc<Mutex<HashMap<CourseId, Course>>>,
}

impl InMemoryCourseStore {
    /// Insert or replace a course, as the external course CRUD would.
    pub fn put_course(&self, course: Course) -> Result<(), StoreError> {
        let mut guard = self.courses.lock().map_err(|_| poisoned())?;
        guard.insert(course.id.clone(), course);
        Ok(())
    }

    pub fn course_ids(&self) -> Result<Vec<CourseId>, StoreError> {
        let guard = self.courses.lock().map_err(|_| poisoned())?;
        let mut ids: Vec<CourseId> = guard.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("course store mutex poisoned".to_string())
}

impl CourseStore for InMemoryCourseStore {
    fn get_course(&self, id: &CourseId) -> Result<Option<Course>, StoreError> {
        let guard = self.courses.lock().map_err(|_| poisoned())?;
        Ok(guard.get(id).cloned())
    }

    fn commit_enrollment(
        &self,
        id: &CourseId,
        expected_version: u64,
        change: EnrollmentChange,
    ) -> Result<Course, StoreError> {
        let mut guard = self.courses.lock().map_err(|_| poisoned())?;
        let course = guard
            .get_mut(id)
            .ok_or_else(|| StoreError::CourseNotFound(id.clone()))?;

        if course.version != expected_version {
            return Err(StoreError::ConcurrentModification {
                course: id.clone(),
                expected: expected_version,
                found: course.version,
            });
        }

        change.apply_to(course);
        course.version += 1;
        Ok(course.clone())
    }
}

type NotificationKey = (CourseId, InstructorId, NotificationKind);

/// Notification records keyed so that at most one live record exists per key.
#[derive(Default, Clone)]
pub struct InMemoryNotificationStore {
    records: Arc<Mutex<BTreeMap<NotificationKey, ConsolidatedNotification>>>,
}

impl InMemoryNotificationStore {
    pub fn all(&self) -> Result<Vec<ConsolidatedNotification>, NotificationStoreError> {
        let guard = self.records.lock().map_err(|_| notifications_poisoned())?;
        Ok(guard.values().cloned().collect())
    }
}

fn notifications_poisoned() -> NotificationStoreError {
    NotificationStoreError::Unavailable("notification store mutex poisoned".to_string())
}

impl NotificationStore for InMemoryNotificationStore {
    fn find_notification(
        &self,
        course: &CourseId,
        recipient: &InstructorId,
        kind: NotificationKind,
    ) -> Result<Option<ConsolidatedNotification>, NotificationStoreError> {
        let guard = self.records.lock().map_err(|_| notifications_poisoned())?;
        Ok(guard
            .get(&(course.clone(), recipient.clone(), kind))
            .cloned())
    }

    fn upsert_notification(
        &self,
        notification: ConsolidatedNotification,
    ) -> Result<ConsolidatedNotification, NotificationStoreError> {
        let mut guard = self.records.lock().map_err(|_| notifications_poisoned())?;
        let key = (
            notification.course.clone(),
            notification.recipient.clone(),
            notification.kind,
        );
        guard.insert(key, notification.clone());
        Ok(notification)
    }

    fn remove_notification(
        &self,
        course: &CourseId,
        recipient: &InstructorId,
        kind: NotificationKind,
    ) -> Result<Option<ConsolidatedNotification>, NotificationStoreError> {
        let mut guard = self.records.lock().map_err(|_| notifications_poisoned())?;
        Ok(guard.remove(&(course.clone(), recipient.clone(), kind)))
    }

    fn notifications_for(
        &self,
        recipient: &InstructorId,
    ) -> Result<Vec<ConsolidatedNotification>, NotificationStoreError> {
        let guard = self.records.lock().map_err(|_| notifications_poisoned())?;
        Ok(guard
            .values()
            .filter(|notification| &notification.recipient == recipient)
            .cloned()
            .collect())
    }
}

/// Fixed user-to-role table.
#[derive(Default, Clone)]
pub struct InMemoryDirectory {
    roles: Arc<Mutex<HashMap<StudentId, RequesterRole>>>,
}

impl InMemoryDirectory {
    pub fn with_users<I, S>(users: I) -> Self
    where
        I: IntoIterator<Item = (S, RequesterRole)>,
        S: Into<String>,
    {
        let roles = users
            .into_iter()
            .map(|(id, role)| (StudentId(id.into()), role))
            .collect();
        Self {
            roles: Arc::new(Mutex::new(roles)),
        }
    }

    pub fn register(&self, user: StudentId, role: RequesterRole) -> Result<(), IdentityError> {
        let mut guard = self
            .roles
            .lock()
            .map_err(|_| IdentityError::Unavailable("directory mutex poisoned".to_string()))?;
        guard.insert(user, role);
        Ok(())
    }
}

impl IdentityDirectory for InMemoryDirectory {
    fn role_of(&self, user: &StudentId) -> Result<Option<RequesterRole>, IdentityError> {
        let guard = self
            .roles
            .lock()
            .map_err(|_| IdentityError::Unavailable("directory mutex poisoned".to_string()))?;
        Ok(guard.get(user).copied())
    }
}
