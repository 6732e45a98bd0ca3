use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::waitlist::Waitlist;

/// Identifier wrapper for courses held by the course store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CourseId(pub String);

/// Identifier for any user known to the identity directory; students are enrolled by this id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StudentId(pub String);

/// Identifier for the instructor who owns a course and receives its notifications.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstructorId(pub String);

impl fmt::Display for CourseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for StudentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for InstructorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role resolved by the identity directory for the user making a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequesterRole {
    Student,
    Instructor,
    Admin,
}

impl RequesterRole {
    pub const fn may_review(self) -> bool {
        matches!(self, RequesterRole::Instructor | RequesterRole::Admin)
    }
}

/// Lifecycle of a single admission attempt. Only moves forward to `Approved` or `Denied`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Pending,
    Approved,
    Denied,
    Waitlisted,
}

impl EnrollmentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            EnrollmentStatus::Pending => "pending",
            EnrollmentStatus::Approved => "approved",
            EnrollmentStatus::Denied => "denied",
            EnrollmentStatus::Waitlisted => "waitlisted",
        }
    }

    pub const fn is_open(self) -> bool {
        matches!(self, EnrollmentStatus::Pending | EnrollmentStatus::Waitlisted)
    }
}

/// History entry for one admission attempt by a student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentRequest {
    pub student: StudentId,
    pub status: EnrollmentStatus,
    pub requested_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub via_override: bool,
}

impl EnrollmentRequest {
    pub fn approved(student: StudentId, now: DateTime<Utc>, via_override: bool) -> Self {
        Self {
            student,
            status: EnrollmentStatus::Approved,
            requested_at: now,
            responded_at: Some(now),
            via_override,
        }
    }

    pub fn open(student: StudentId, status: EnrollmentStatus, now: DateTime<Utc>) -> Self {
        Self {
            student,
            status,
            requested_at: now,
            responded_at: None,
            via_override: false,
        }
    }

    /// Close an open request. Closed requests are left untouched.
    pub fn respond(&mut self, status: EnrollmentStatus, now: DateTime<Utc>) -> bool {
        if !self.status.is_open() {
            return false;
        }
        self.status = status;
        self.responded_at = Some(now);
        true
    }
}

/// Admission-relevant slice of a course record owned by the course store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    pub title: String,
    pub instructor: InstructorId,
    pub capacity: Option<u32>,
    #[serde(default)]
    pub approval_required: bool,
    #[serde(default)]
    pub enrolled_students: BTreeSet<StudentId>,
    #[serde(default)]
    pub enrollment_requests: Vec<EnrollmentRequest>,
    #[serde(default)]
    pub waitlist: Waitlist,
    #[serde(default)]
    pub version: u64,
}

impl Course {
    pub fn new(
        id: CourseId,
        title: impl Into<String>,
        instructor: InstructorId,
        capacity: Option<u32>,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            instructor,
            capacity,
            approval_required: false,
            enrolled_students: BTreeSet::new(),
            enrollment_requests: Vec::new(),
            waitlist: Waitlist::default(),
            version: 0,
        }
    }

    pub fn is_enrolled(&self, student: &StudentId) -> bool {
        self.enrolled_students.contains(student)
    }

    pub fn enrolled_count(&self) -> usize {
        self.enrolled_students.len()
    }

    /// `true` when another direct admission fits without an override.
    pub fn has_free_seat(&self) -> bool {
        match self.capacity {
            Some(capacity) => self.enrolled_students.len() < capacity as usize,
            None => true,
        }
    }

    pub fn open_request(&self, student: &StudentId) -> Option<&EnrollmentRequest> {
        self.enrollment_requests
            .iter()
            .rev()
            .find(|request| &request.student == student && request.status.is_open())
    }

    pub(crate) fn open_request_mut(
        &mut self,
        student: &StudentId,
    ) -> Option<&mut EnrollmentRequest> {
        self.enrollment_requests
            .iter_mut()
            .rev()
            .find(|request| &request.student == student && request.status.is_open())
    }

    /// Snapshot of the mutable admission state handed to the store on commit.
    pub fn admission_change(&self) -> EnrollmentChange {
        EnrollmentChange {
            enrolled_students: self.enrolled_students.clone(),
            waitlist: self.waitlist.clone(),
            enrollment_requests: self.enrollment_requests.clone(),
        }
    }
}

/// Admission state written back to the course store in a single conditional commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentChange {
    pub enrolled_students: BTreeSet<StudentId>,
    pub waitlist: Waitlist,
    pub enrollment_requests: Vec<EnrollmentRequest>,
}

impl EnrollmentChange {
    pub fn apply_to(self, course: &mut Course) {
        course.enrolled_students = self.enrolled_students;
        course.waitlist = self.waitlist;
        course.enrollment_requests = self.enrollment_requests;
    }
}

/// Result of a successful `request_enrollment` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AdmissionOutcome {
    Enrolled,
    EnrolledViaOverride,
    Waitlisted { position: u32 },
    PendingApproval,
}

impl AdmissionOutcome {
    pub const fn label(self) -> &'static str {
        match self {
            AdmissionOutcome::Enrolled => "enrolled",
            AdmissionOutcome::EnrolledViaOverride => "enrolled_via_override",
            AdmissionOutcome::Waitlisted { .. } => "waitlisted",
            AdmissionOutcome::PendingApproval => "pending_approval",
        }
    }
}

/// Result of an instructor approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ApprovalOutcome {
    Approved { via_override: bool },
    AlreadyEnrolled,
}

/// Result of an instructor denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DenialOutcome {
    Denied,
    NoOpenRequest,
}

/// Result of a student leaving a course or withdrawing a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CancellationOutcome {
    Unenrolled { promoted: Option<StudentId> },
    Withdrawn,
}

/// Public view of a course's admission state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterView {
    pub course_id: CourseId,
    pub title: String,
    pub capacity: Option<u32>,
    pub enrolled: Vec<StudentId>,
    pub waitlist: Vec<WaitlistPositionView>,
    pub pending: Vec<StudentId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WaitlistPositionView {
    pub student: StudentId,
    pub position: u32,
}

impl From<&Course> for RosterView {
    fn from(course: &Course) -> Self {
        Self {
            course_id: course.id.clone(),
            title: course.title.clone(),
            capacity: course.capacity,
            enrolled: course.enrolled_students.iter().cloned().collect(),
            waitlist: course
                .waitlist
                .iter()
                .map(|entry| WaitlistPositionView {
                    student: entry.student.clone(),
                    position: entry.position,
                })
                .collect(),
            pending: course
                .enrollment_requests
                .iter()
                .filter(|request| request.status == EnrollmentStatus::Pending)
                .map(|request| request.student.clone())
                .collect(),
        }
    }
}
