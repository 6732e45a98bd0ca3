use super::domain::{
    Course, CourseId, EnrollmentChange, EnrollmentRequest, RequesterRole, StudentId,
};

/// Storage abstraction over course admission state so the service can be exercised in isolation.
pub trait CourseStore: Send + Sync {
    fn get_course(&self, id: &CourseId) -> Result<Option<Course>, StoreError>;

    /// Replace the admission state of a course in one conditional write.
    ///
    /// Implementations must reject the write with [`StoreError::ConcurrentModification`] when the
    /// stored version differs from `expected_version`, and bump the version on success.
    fn commit_enrollment(
        &self,
        id: &CourseId,
        expected_version: u64,
        change: EnrollmentChange,
    ) -> Result<Course, StoreError>;

    /// Latest open (pending or waitlisted) request for `student`. Backs the service's
    /// read-only `pending_request`; admission decisions read the request history from the
    /// course snapshot they commit against instead.
    fn find_pending_request(
        &self,
        course: &CourseId,
        student: &StudentId,
    ) -> Result<Option<EnrollmentRequest>, StoreError> {
        let course = self
            .get_course(course)?
            .ok_or_else(|| StoreError::CourseNotFound(course.clone()))?;
        Ok(course.open_request(student).cloned())
    }
}

/// Error enumeration for course store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("course {0} not found")]
    CourseNotFound(CourseId),
    #[error("course {course} changed concurrently (expected version {expected}, found {found})")]
    ConcurrentModification {
        course: CourseId,
        expected: u64,
        found: u64,
    },
    #[error("course store unavailable: {0}")]
    Unavailable(String),
}

/// Identity collaborator resolving who a user is and what they may do.
pub trait IdentityDirectory: Send + Sync {
    fn role_of(&self, user: &StudentId) -> Result<Option<RequesterRole>, IdentityError>;
}

/// Identity lookup failure.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("identity directory unavailable: {0}")]
    Unavailable(String),
}
