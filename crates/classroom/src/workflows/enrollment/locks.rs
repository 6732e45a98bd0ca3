use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use super::domain::CourseId;

/// One mutex per course so admission decisions for the same course run one at a time while
/// different courses proceed independently. A course's slot lives only while someone holds or
/// waits on it.
#[derive(Default)]
pub(crate) struct CourseLocks {
    slots: Mutex<HashMap<CourseId, Arc<Mutex<()>>>>,
}

impl CourseLocks {
    /// Run `critical` while holding the lock for `course`.
    ///
    /// A panic in a previous holder leaves no partial state behind (commits are single writes),
    /// so poisoned locks are recovered rather than propagated.
    pub(crate) fn with_course<T>(&self, course: &CourseId, critical: impl FnOnce() -> T) -> T {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(course.clone()).or_default())
        };
        let _release = SlotRelease {
            locks: self,
            course,
            slot: &slot,
        };
        let _held = slot.lock().unwrap_or_else(PoisonError::into_inner);
        critical()
    }

    #[cfg(test)]
    pub(crate) fn slot_count(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Drops the map entry once the last holder is done, including when `critical` panics.
struct SlotRelease<'a> {
    locks: &'a CourseLocks,
    course: &'a CourseId,
    slot: &'a Arc<Mutex<()>>,
}

impl Drop for SlotRelease<'_> {
    fn drop(&mut self) {
        let mut slots = self
            .locks
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // The map and this holder are the only references left.
        if Arc::strong_count(self.slot) == 2 {
            slots.remove(self.course);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn same_course_sections_never_overlap() {
        let locks = CourseLocks::default();
        let course = CourseId("cs-101".to_string());
        let inside = AtomicUsize::new(0);
        let max_seen = AtomicUsize::new(0);

        thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    locks.with_course(&course, || {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(2));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    });
                });
            }
        });

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn returns_the_critical_section_value() {
        let locks = CourseLocks::default();
        let value = locks.with_course(&CourseId("x".to_string()), || 42);
        assert_eq!(value, 42);
    }

    #[test]
    fn slots_are_released_after_use() {
        let locks = CourseLocks::default();
        for n in 0..100 {
            locks.with_course(&CourseId(format!("course-{n}")), || ());
        }
        assert_eq!(locks.slot_count(), 0);
    }

    #[test]
    fn contended_slot_survives_until_last_holder() {
        let locks = CourseLocks::default();
        let course = CourseId("cs-101".to_string());

        thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    locks.with_course(&course, || thread::sleep(Duration::from_millis(1)));
                });
            }
        });

        assert_eq!(locks.slot_count(), 0);
    }

    #[test]
    fn panicking_holder_still_releases_its_slot() {
        let locks = CourseLocks::default();
        let course = CourseId("cs-101".to_string());
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            locks.with_course(&course, || panic!("decision failed"))
        }));
        assert!(outcome.is_err());
        assert_eq!(locks.slot_count(), 0);
        assert_eq!(locks.with_course(&course, || 7), 7);
    }
}
