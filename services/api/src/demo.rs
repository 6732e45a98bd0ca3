use crate::infra::{
    seeded_infrastructure, InMemoryAdmissionService, DEMO_INSTRUCTOR, DEMO_STUDENTS,
};
use clap::Args;
use classroom::config::AdmissionConfig;
use classroom::error::AppError;
use classroom::workflows::enrollment::{AdmissionOutcome, CourseId, InstructorId, StudentId};

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Seats in the demo course.
    #[arg(long, default_value_t = 2)]
    pub(crate) capacity: u32,
    /// Skip the instructor override and denial portion of the demo.
    #[arg(long)]
    pub(crate) skip_instructor_actions: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        capacity,
        skip_instructor_actions,
    } = args;

    let infra = seeded_infrastructure(capacity)?;
    let service = infra.admission_service(AdmissionConfig::default());
    let course = CourseId("cs-101".to_string());
    let prof = StudentId(DEMO_INSTRUCTOR.to_string());

    println!("Course admission demo ({} seats in {})", capacity, course);
    for name in DEMO_STUDENTS.iter().take(capacity as usize + 2) {
        let student = StudentId(name.to_string());
        match service.request_enrollment(&course, &student, &student) {
            Ok(outcome) => println!("- {student} requests a seat -> {}", describe(outcome)),
            Err(err) => println!("- {student} rejected: {err}"),
        }
    }
    render_state(&service, &course)?;

    let leaver = StudentId(DEMO_STUDENTS[0].to_string());
    println!("\n{leaver} drops the course");
    let outcome = service.cancel_enrollment(&course, &leaver, &leaver)?;
    println!("  {}", serde_json::to_string(&outcome).unwrap_or_default());
    render_state(&service, &course)?;

    if skip_instructor_actions {
        return Ok(());
    }

    if let Some(queued) = service.roster(&course)?.waitlist.first().cloned() {
        println!("\n{DEMO_INSTRUCTOR} denies {}", queued.student);
        let outcome = service.deny_enrollment(&course, &queued.student, &prof)?;
        println!("  {}", serde_json::to_string(&outcome).unwrap_or_default());
    }

    println!("\n{DEMO_INSTRUCTOR} enrolls themselves despite the cap");
    let outcome = service.request_enrollment(&course, &prof, &prof)?;
    println!("  -> {}", describe(outcome));
    render_state(&service, &course)?;

    Ok(())
}

fn describe(outcome: AdmissionOutcome) -> String {
    match outcome {
        AdmissionOutcome::Waitlisted { position } => format!("waitlisted at position {position}"),
        other => other.label().replace('_', " "),
    }
}

fn render_state(service: &InMemoryAdmissionService, course: &CourseId) -> Result<(), AppError> {
    let roster = service.roster(course)?;
    let enrolled: Vec<&str> = roster.enrolled.iter().map(|id| id.0.as_str()).collect();
    println!(
        "Roster: {}/{} enrolled [{}]",
        roster.enrolled.len(),
        roster
            .capacity
            .map(|capacity| capacity.to_string())
            .unwrap_or_else(|| "unbounded".to_string()),
        enrolled.join(", ")
    );
    if roster.waitlist.is_empty() {
        println!("Waitlist: empty");
    } else {
        println!("Waitlist:");
        for entry in &roster.waitlist {
            println!("  {}. {}", entry.position, entry.student);
        }
    }

    let notices = service.notifications_for(&InstructorId(DEMO_INSTRUCTOR.to_string()))?;
    println!("Instructor notifications ({}):", notices.len());
    for notice in notices {
        println!("  [{}] {}", notice.kind.label(), notice.message());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_runs_against_seeded_stores() {
        run_demo(DemoArgs {
            capacity: 2,
            skip_instructor_actions: false,
        })
        .expect("demo completes");
    }

    #[test]
    fn describe_includes_waitlist_position() {
        assert_eq!(
            describe(AdmissionOutcome::Waitlisted { position: 3 }),
            "waitlisted at position 3"
        );
        assert_eq!(
            describe(AdmissionOutcome::EnrolledViaOverride),
            "enrolled via override"
        );
    }
}
