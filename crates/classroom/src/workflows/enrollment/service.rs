use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::config::AdmissionConfig;

use super::domain::{
    AdmissionOutcome, ApprovalOutcome, CancellationOutcome, Course, CourseId, DenialOutcome,
    EnrollmentRequest, EnrollmentStatus, InstructorId, RequesterRole, RosterView, StudentId,
};
use super::locks::CourseLocks;
use super::notifications::{
    ConsolidatedNotification, NotificationConsolidator, NotificationStore, NotificationStoreError,
};
use super::repository::{CourseStore, IdentityDirectory, IdentityError, StoreError};

/// Service composing the course store, identity directory, and notification consolidator.
///
/// Every mutating operation holds the course's lock for the whole read, decide, commit, and
/// notification cycle, and commits through the store's versioned write so that writers outside
/// this process are detected and the decision is retried from a fresh read.
pub struct CourseAdmissionService<S, N, D> {
    store: Arc<S>,
    directory: Arc<D>,
    notifications: NotificationConsolidator<N>,
    locks: CourseLocks,
    config: AdmissionConfig,
}

/// Whether a decision changed the course and needs committing.
enum Step<T> {
    Unchanged(T),
    Commit(T),
}

struct Committed<T> {
    outcome: T,
    course: Course,
    now: DateTime<Utc>,
}

impl<S, N, D> CourseAdmissionService<S, N, D>
where
    S: CourseStore + 'static,
    N: NotificationStore + 'static,
    D: IdentityDirectory + 'static,
{
    pub fn new(
        store: Arc<S>,
        directory: Arc<D>,
        notifications: Arc<N>,
        config: AdmissionConfig,
    ) -> Self {
        Self {
            store,
            directory,
            notifications: NotificationConsolidator::new(notifications),
            locks: CourseLocks::default(),
            config,
        }
    }

    /// Admit `student` directly, via instructor override, or onto the waitlist.
    pub fn request_enrollment(
        &self,
        course_id: &CourseId,
        student: &StudentId,
        requester: &StudentId,
    ) -> Result<AdmissionOutcome, AdmissionError> {
        let role = self.authorize_self_service(student, requester, "request enrollment")?;

        self.locks.with_course(course_id, || {
            let committed = self.commit_with_retry(course_id, |course, now| {
                decide_admission(course, student, role, now)
            })?;
            self.sync_notifications(&committed.course, committed.now, None);

            match committed.outcome {
                AdmissionOutcome::EnrolledViaOverride => warn!(
                    course = %course_id,
                    student = %student,
                    requester = %requester,
                    capacity_override = true,
                    "instructor admitted student beyond capacity"
                ),
                outcome => info!(
                    course = %course_id,
                    student = %student,
                    outcome = outcome.label(),
                    "enrollment request handled"
                ),
            }
            Ok(committed.outcome)
        })
    }

    /// Leave the roster, promoting the waitlist head into a freed seat, or withdraw an open request.
    pub fn cancel_enrollment(
        &self,
        course_id: &CourseId,
        student: &StudentId,
        requester: &StudentId,
    ) -> Result<CancellationOutcome, AdmissionError> {
        self.authorize_self_service(student, requester, "cancel enrollment")?;

        self.locks.with_course(course_id, || {
            let committed = self.commit_with_retry(course_id, |course, now| {
                decide_cancellation(course, student, now)
            })?;

            let promoted = match &committed.outcome {
                CancellationOutcome::Unenrolled { promoted } => promoted.as_ref(),
                CancellationOutcome::Withdrawn => None,
            };
            self.sync_notifications(&committed.course, committed.now, promoted);

            info!(
                course = %course_id,
                student = %student,
                promoted = promoted.map(|id| id.0.as_str()),
                "enrollment cancelled"
            );
            Ok(committed.outcome)
        })
    }

    /// Approve an open request, or force-add the student when none exists. Capacity is not checked.
    pub fn approve_enrollment(
        &self,
        course_id: &CourseId,
        student: &StudentId,
        requester: &StudentId,
    ) -> Result<ApprovalOutcome, AdmissionError> {
        self.authorize_review(student, requester, "approve enrollment")?;

        self.locks.with_course(course_id, || {
            let committed = self.commit_with_retry(course_id, |course, now| {
                decide_approval(course, student, now)
            })?;
            self.sync_notifications(&committed.course, committed.now, None);

            if let ApprovalOutcome::Approved { via_override: true } = committed.outcome {
                warn!(
                    course = %course_id,
                    student = %student,
                    requester = %requester,
                    capacity_override = true,
                    "approval admitted student beyond capacity"
                );
            }
            Ok(committed.outcome)
        })
    }

    /// Deny an open request and drop the student from the waitlist if queued.
    pub fn deny_enrollment(
        &self,
        course_id: &CourseId,
        student: &StudentId,
        requester: &StudentId,
    ) -> Result<DenialOutcome, AdmissionError> {
        self.authorize_review(student, requester, "deny enrollment")?;

        self.locks.with_course(course_id, || {
            let committed = self.commit_with_retry(course_id, |course, now| {
                decide_denial(course, student, now)
            })?;
            self.sync_notifications(&committed.course, committed.now, None);
            Ok(committed.outcome)
        })
    }

    /// Re-derive the course's count notifications from its current state.
    pub fn reconcile_notifications(&self, course_id: &CourseId) -> Result<(), AdmissionError> {
        self.locks.with_course(course_id, || {
            let course = self.load(course_id)?;
            self.notifications.reconcile(&course, Utc::now())?;
            Ok(())
        })
    }

    pub fn roster(&self, course_id: &CourseId) -> Result<RosterView, AdmissionError> {
        let course = self.load(course_id)?;
        Ok(RosterView::from(&course))
    }

    /// Open request a student is waiting on, if any. Does not take the course lock.
    pub fn pending_request(
        &self,
        course_id: &CourseId,
        student: &StudentId,
    ) -> Result<Option<EnrollmentRequest>, AdmissionError> {
        Ok(self.store.find_pending_request(course_id, student)?)
    }

    pub fn notifications_for(
        &self,
        instructor: &InstructorId,
    ) -> Result<Vec<ConsolidatedNotification>, AdmissionError> {
        Ok(self.notifications.store().notifications_for(instructor)?)
    }

    #[cfg(test)]
    pub(crate) fn lock_slots(&self) -> usize {
        self.locks.slot_count()
    }

    fn load(&self, course_id: &CourseId) -> Result<Course, AdmissionError> {
        self.store
            .get_course(course_id)?
            .ok_or_else(|| AdmissionError::CourseNotFound(course_id.clone()))
    }

    /// Read, decide, and conditionally commit; a lost race re-runs the decision on a fresh read.
    fn commit_with_retry<T, F>(
        &self,
        course_id: &CourseId,
        mut decide: F,
    ) -> Result<Committed<T>, AdmissionError>
    where
        F: FnMut(&mut Course, DateTime<Utc>) -> Result<Step<T>, AdmissionError>,
    {
        let attempts = self.config.max_commit_attempts.max(1);

        for attempt in 1..=attempts {
            let mut course = self.load(course_id)?;
            let expected_version = course.version;
            let now = Utc::now();

            let outcome = match decide(&mut course, now)? {
                Step::Unchanged(outcome) => {
                    return Ok(Committed {
                        outcome,
                        course,
                        now,
                    })
                }
                Step::Commit(outcome) => outcome,
            };

            match self
                .store
                .commit_enrollment(course_id, expected_version, course.admission_change())
            {
                Ok(course) => {
                    return Ok(Committed {
                        outcome,
                        course,
                        now,
                    })
                }
                Err(StoreError::ConcurrentModification {
                    expected, found, ..
                }) => {
                    warn!(
                        course = %course_id,
                        attempt,
                        expected,
                        found,
                        "course changed during admission decision; retrying"
                    );
                }
                Err(other) => return Err(other.into()),
            }
        }

        Err(AdmissionError::ConcurrentModification {
            course: course_id.clone(),
            attempts,
        })
    }

    /// Enrollment state is authoritative; notification failures are logged. Count notices are
    /// rebuilt by the next refresh or `reconcile_notifications`. A lost promotion notice is not
    /// recoverable from course state and stays lost.
    fn sync_notifications(
        &self,
        course: &Course,
        now: DateTime<Utc>,
        promoted: Option<&StudentId>,
    ) {
        if let Some(student) = promoted {
            if let Err(err) = self.notifications.record_promotion(course, student, now) {
                warn!(
                    course = %course.id,
                    student = %student,
                    error = %err,
                    "promotion notice not recorded"
                );
            }
        }
        if let Err(err) = self.notifications.reconcile(course, now) {
            warn!(course = %course.id, error = %err, "notification counts not refreshed");
        }
    }

    fn resolve(&self, user: &StudentId) -> Result<Option<RequesterRole>, AdmissionError> {
        Ok(self.directory.role_of(user)?)
    }

    /// Students act for themselves; instructors and admins may act for anyone.
    fn authorize_self_service(
        &self,
        student: &StudentId,
        requester: &StudentId,
        action: &'static str,
    ) -> Result<RequesterRole, AdmissionError> {
        let role = self.resolve(requester)?.ok_or_else(|| AdmissionError::NotAuthorized {
            requester: requester.clone(),
            action,
        })?;
        if self.resolve(student)?.is_none() {
            return Err(AdmissionError::StudentNotFound(student.clone()));
        }
        if role == RequesterRole::Student && student != requester {
            return Err(AdmissionError::NotAuthorized {
                requester: requester.clone(),
                action,
            });
        }
        Ok(role)
    }

    fn authorize_review(
        &self,
        student: &StudentId,
        requester: &StudentId,
        action: &'static str,
    ) -> Result<(), AdmissionError> {
        match self.resolve(requester)? {
            Some(role) if role.may_review() => {}
            _ => {
                return Err(AdmissionError::NotAuthorized {
                    requester: requester.clone(),
                    action,
                })
            }
        }
        if self.resolve(student)?.is_none() {
            return Err(AdmissionError::StudentNotFound(student.clone()));
        }
        Ok(())
    }
}

fn decide_admission(
    course: &mut Course,
    student: &StudentId,
    role: RequesterRole,
    now: DateTime<Utc>,
) -> Result<Step<AdmissionOutcome>, AdmissionError> {
    if course.is_enrolled(student) {
        return Err(AdmissionError::AlreadyEnrolled {
            course: course.id.clone(),
            student: student.clone(),
        });
    }
    if course.open_request(student).is_some() || course.waitlist.contains(student) {
        return Err(AdmissionError::AlreadyRequested {
            course: course.id.clone(),
            student: student.clone(),
        });
    }

    if course.has_free_seat() {
        if course.approval_required && role == RequesterRole::Student {
            course.enrollment_requests.push(EnrollmentRequest::open(
                student.clone(),
                EnrollmentStatus::Pending,
                now,
            ));
            return Ok(Step::Commit(AdmissionOutcome::PendingApproval));
        }
        course.enrolled_students.insert(student.clone());
        course
            .enrollment_requests
            .push(EnrollmentRequest::approved(student.clone(), now, false));
        return Ok(Step::Commit(AdmissionOutcome::Enrolled));
    }

    if role == RequesterRole::Instructor {
        course.enrolled_students.insert(student.clone());
        course
            .enrollment_requests
            .push(EnrollmentRequest::approved(student.clone(), now, true));
        return Ok(Step::Commit(AdmissionOutcome::EnrolledViaOverride));
    }

    let position = course.enqueue_waitlist(student.clone(), now);
    course.enrollment_requests.push(EnrollmentRequest::open(
        student.clone(),
        EnrollmentStatus::Waitlisted,
        now,
    ));
    Ok(Step::Commit(AdmissionOutcome::Waitlisted { position }))
}

fn decide_approval(
    course: &mut Course,
    student: &StudentId,
    now: DateTime<Utc>,
) -> Result<Step<ApprovalOutcome>, AdmissionError> {
    if course.is_enrolled(student) {
        let closed_stale = course
            .open_request_mut(student)
            .map(|request| request.respond(EnrollmentStatus::Approved, now))
            .unwrap_or(false);
        let dequeued = course.remove_from_waitlist(student).is_some();
        return Ok(if closed_stale || dequeued {
            Step::Commit(ApprovalOutcome::AlreadyEnrolled)
        } else {
            Step::Unchanged(ApprovalOutcome::AlreadyEnrolled)
        });
    }

    let via_override = !course.has_free_seat();
    match course.open_request_mut(student) {
        Some(request) => {
            request.respond(EnrollmentStatus::Approved, now);
            request.via_override = via_override;
        }
        None => course
            .enrollment_requests
            .push(EnrollmentRequest::approved(student.clone(), now, via_override)),
    }
    course.remove_from_waitlist(student);
    course.enrolled_students.insert(student.clone());

    Ok(Step::Commit(ApprovalOutcome::Approved { via_override }))
}

fn decide_denial(
    course: &mut Course,
    student: &StudentId,
    now: DateTime<Utc>,
) -> Result<Step<DenialOutcome>, AdmissionError> {
    let Some(request) = course.open_request_mut(student) else {
        return Ok(Step::Unchanged(DenialOutcome::NoOpenRequest));
    };
    request.respond(EnrollmentStatus::Denied, now);
    course.remove_from_waitlist(student);
    Ok(Step::Commit(DenialOutcome::Denied))
}

fn decide_cancellation(
    course: &mut Course,
    student: &StudentId,
    now: DateTime<Utc>,
) -> Result<Step<CancellationOutcome>, AdmissionError> {
    if course.enrolled_students.remove(student) {
        let promoted = if course.has_free_seat() {
            course.promote_waitlist_head(now)
        } else {
            None
        };
        return Ok(Step::Commit(CancellationOutcome::Unenrolled { promoted }));
    }

    match course.open_request_mut(student) {
        Some(request) => {
            request.respond(EnrollmentStatus::Denied, now);
            course.remove_from_waitlist(student);
            Ok(Step::Commit(CancellationOutcome::Withdrawn))
        }
        None => Err(AdmissionError::NotEnrolled {
            course: course.id.clone(),
            student: student.clone(),
        }),
    }
}

/// Error raised by the admission service.
#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error("course {0} not found")]
    CourseNotFound(CourseId),
    #[error("student {0} not found")]
    StudentNotFound(StudentId),
    #[error("{student} is already enrolled in {course}")]
    AlreadyEnrolled { course: CourseId, student: StudentId },
    #[error("{student} already has an open enrollment request for {course}")]
    AlreadyRequested { course: CourseId, student: StudentId },
    #[error("{student} is neither enrolled in nor waiting for {course}")]
    NotEnrolled { course: CourseId, student: StudentId },
    #[error("{requester} is not authorized to {action}")]
    NotAuthorized {
        requester: StudentId,
        action: &'static str,
    },
    #[error("course {course} kept changing concurrently; gave up after {attempts} attempt(s)")]
    ConcurrentModification { course: CourseId, attempts: u32 },
    #[error(transparent)]
    Store(StoreError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Notifications(#[from] NotificationStoreError),
}

impl From<StoreError> for AdmissionError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::CourseNotFound(course) => Self::CourseNotFound(course),
            other => Self::Store(other),
        }
    }
}
