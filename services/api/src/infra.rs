use classroom::config::AdmissionConfig;
use classroom::error::AppError;
use classroom::workflows::enrollment::{
    AdmissionError, Course, CourseAdmissionService, CourseId, InMemoryCourseStore,
    InMemoryDirectory, InMemoryNotificationStore, InstructorId, RequesterRole, StudentId,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub(crate) type InMemoryAdmissionService =
    CourseAdmissionService<InMemoryCourseStore, InMemoryNotificationStore, InMemoryDirectory>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// In-memory stand-ins for the course store, notification store, and identity directory.
#[derive(Default, Clone)]
pub(crate) struct Infrastructure {
    pub(crate) courses: Arc<InMemoryCourseStore>,
    pub(crate) notifications: Arc<InMemoryNotificationStore>,
    pub(crate) directory: Arc<InMemoryDirectory>,
}

impl Infrastructure {
    pub(crate) fn admission_service(&self, config: AdmissionConfig) -> InMemoryAdmissionService {
        CourseAdmissionService::new(
            self.courses.clone(),
            self.directory.clone(),
            self.notifications.clone(),
            config,
        )
    }
}

pub(crate) const DEMO_INSTRUCTOR: &str = "prof-hopper";
pub(crate) const DEMO_STUDENTS: [&str; 6] = ["ada", "brian", "cleo", "dev", "eve", "finn"];

/// Populate the stores with a small catalogue so the HTTP surface is usable without the
/// course CRUD service.
pub(crate) fn seeded_infrastructure(capacity: u32) -> Result<Infrastructure, AppError> {
    let infra = Infrastructure::default();

    infra
        .directory
        .register(StudentId(DEMO_INSTRUCTOR.to_string()), RequesterRole::Instructor)
        .map_err(AdmissionError::from)?;
    infra
        .directory
        .register(StudentId("registrar".to_string()), RequesterRole::Admin)
        .map_err(AdmissionError::from)?;
    for student in DEMO_STUDENTS {
        infra
            .directory
            .register(StudentId(student.to_string()), RequesterRole::Student)
            .map_err(AdmissionError::from)?;
    }

    let instructor = InstructorId(DEMO_INSTRUCTOR.to_string());
    let catalogue = [
        Course::new(
            CourseId("cs-101".to_string()),
            "Operating Systems",
            instructor.clone(),
            Some(capacity),
        ),
        Course {
            approval_required: true,
            ..Course::new(
                CourseId("cs-240".to_string()),
                "Compilers Seminar",
                instructor.clone(),
                Some(capacity),
            )
        },
        Course::new(
            CourseId("cs-050".to_string()),
            "Open Lecture Series",
            instructor,
            None,
        ),
    ];
    for course in catalogue {
        infra.courses.put_course(course).map_err(AdmissionError::from)?;
    }

    Ok(infra)
}

#[cfg(test)]
mod tests {
    use super::*;
    use classroom::workflows::enrollment::CourseStore;

    #[test]
    fn seeds_catalogue_and_directory() {
        let infra = seeded_infrastructure(2).expect("seed succeeds");
        let ids = infra.courses.course_ids().expect("ids readable");
        assert_eq!(ids.len(), 3);

        let seminar = infra
            .courses
            .get_course(&CourseId("cs-240".to_string()))
            .expect("readable")
            .expect("seminar seeded");
        assert!(seminar.approval_required);
        assert_eq!(seminar.capacity, Some(2));
    }
}
