use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{Course, EnrollmentStatus, StudentId};

/// A queued student. `position` is always the 1-based index in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitlistEntry {
    pub student: StudentId,
    pub position: u32,
    pub added_at: DateTime<Utc>,
}

/// FIFO waitlist whose positions are derived from queue order and renumbered after every mutation.
///
/// Entries are private so positions cannot be set independently; deserialized waitlists are
/// renumbered in the order they arrive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<WaitlistEntry>", into = "Vec<WaitlistEntry>")]
pub struct Waitlist {
    entries: Vec<WaitlistEntry>,
}

impl Waitlist {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WaitlistEntry> {
        self.entries.iter()
    }

    pub fn contains(&self, student: &StudentId) -> bool {
        self.entries.iter().any(|entry| &entry.student == student)
    }

    pub fn position_of(&self, student: &StudentId) -> Option<u32> {
        self.entries
            .iter()
            .find(|entry| &entry.student == student)
            .map(|entry| entry.position)
    }

    /// Append `student` to the tail, returning the assigned position.
    pub fn enqueue(&mut self, student: StudentId, now: DateTime<Utc>) -> u32 {
        let position = next_position(self.entries.len());
        self.entries.push(WaitlistEntry {
            student,
            position,
            added_at: now,
        });
        position
    }

    /// Remove `student` wherever they sit in the queue. Missing entries are a no-op.
    pub fn remove(&mut self, student: &StudentId) -> Option<WaitlistEntry> {
        let index = self
            .entries
            .iter()
            .position(|entry| &entry.student == student)?;
        let removed = self.entries.remove(index);
        self.renumber();
        Some(removed)
    }

    /// Pop the earliest arrival.
    pub fn pop_head(&mut self) -> Option<WaitlistEntry> {
        if self.entries.is_empty() {
            return None;
        }
        let head = self.entries.remove(0);
        self.renumber();
        Some(head)
    }

    fn renumber(&mut self) {
        for (index, entry) in self.entries.iter_mut().enumerate() {
            entry.position = next_position(index);
        }
    }
}

fn next_position(index: usize) -> u32 {
    u32::try_from(index + 1).unwrap_or(u32::MAX)
}

impl From<Vec<WaitlistEntry>> for Waitlist {
    fn from(entries: Vec<WaitlistEntry>) -> Self {
        let mut waitlist = Self { entries };
        waitlist.renumber();
        waitlist
    }
}

impl From<Waitlist> for Vec<WaitlistEntry> {
    fn from(waitlist: Waitlist) -> Self {
        waitlist.entries
    }
}

/// Waitlist management over a course's admission state.
///
/// These run on a course snapshot that the admission service holds under the course lock and
/// commits atomically, so enqueue and renumbering never interleave for the same course.
impl Course {
    pub fn enqueue_waitlist(&mut self, student: StudentId, now: DateTime<Utc>) -> u32 {
        self.waitlist.enqueue(student, now)
    }

    pub fn remove_from_waitlist(&mut self, student: &StudentId) -> Option<WaitlistEntry> {
        self.waitlist.remove(student)
    }

    /// Move the head of the waitlist into the enrolled set and approve their open request.
    pub fn promote_waitlist_head(&mut self, now: DateTime<Utc>) -> Option<StudentId> {
        let head = self.waitlist.pop_head()?;
        if let Some(request) = self.open_request_mut(&head.student) {
            request.respond(EnrollmentStatus::Approved, now);
        }
        self.enrolled_students.insert(head.student.clone());
        Some(head.student)
    }
}
