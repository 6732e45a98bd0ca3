//! Course admission and waitlist management.
//!
//! An enrollment attempt flows through [`CourseAdmissionService`], which reads the course from a
//! [`CourseStore`], decides between direct admission, instructor override, pending approval, or
//! the FIFO waitlist, commits the new state in one conditional write, and then brings the
//! instructor's consolidated notifications in line with the committed counts.

pub mod domain;
mod locks;
pub mod memory;
pub mod notifications;
pub mod repository;
pub mod router;
pub mod service;
pub mod waitlist;

#[cfg(test)]
mod tests;

pub use domain::{
    AdmissionOutcome, ApprovalOutcome, CancellationOutcome, Course, CourseId, DenialOutcome,
    EnrollmentChange, EnrollmentRequest, EnrollmentStatus, InstructorId, RequesterRole,
    RosterView, StudentId, WaitlistPositionView,
};
pub use memory::{InMemoryCourseStore, InMemoryDirectory, InMemoryNotificationStore};
pub use notifications::{
    ConsolidatedNotification, NotificationConsolidator, NotificationId, NotificationKind,
    NotificationStore, NotificationStoreError,
};
pub use repository::{CourseStore, IdentityDirectory, IdentityError, StoreError};
pub use router::{enrollment_router, EnrollmentAction, EnrollmentAttempt};
pub use service::{AdmissionError, CourseAdmissionService};
pub use waitlist::{Waitlist, WaitlistEntry};
