use crate::infra::{ChannelEscalationPublisher, InMemoryCatalog, InMemoryPreferenceSets};
use chrono::{Datelike, Utc};
use clap::Args;
use course_allocation::error::AppError;
use course_allocation::workflows::allocation::{
    AllocationPolicy, AllocationServices, CatalogImporter, Course, CourseId, EscalationEvent,
    Faculty, FacultyAssignment, LlmResolution, NewCourse, NewFaculty, Season,
};
use std::path::PathBuf;
use std::sync::Arc;

type DemoServices = AllocationServices<InMemoryCatalog, InMemoryPreferenceSets, ChannelEscalationPublisher>;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Faculty CSV to seed the catalog. Defaults to a built-in sample department.
    #[arg(long)]
    pub(crate) faculty_csv: Option<PathBuf>,
    /// Course CSV to seed the catalog. Defaults to a built-in sample department.
    #[arg(long)]
    pub(crate) course_csv: Option<PathBuf>,
    /// Academic year of the demo term (defaults to the current year).
    #[arg(long)]
    pub(crate) year: Option<i32>,
    /// Season of the demo term: SPRING, SUMMER, FALL or WINTER.
    #[arg(long, value_parser = parse_season)]
    pub(crate) season: Option<Season>,
    /// Number of courses each faculty member ranks.
    #[arg(long, default_value_t = 2)]
    pub(crate) ranked: usize,
}

fn parse_season(raw: &str) -> Result<Season, String> {
    Season::parse(raw).ok_or_else(|| format!("unknown season '{raw}'"))
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        faculty_csv,
        course_csv,
        year,
        season,
        ranked,
    } = args;

    let (escalations, mut receiver) = ChannelEscalationPublisher::channel();
    let services = AllocationServices::new(
        Arc::new(InMemoryCatalog::default()),
        Arc::new(InMemoryPreferenceSets::default()),
        Arc::new(escalations),
        AllocationPolicy::default(),
    );

    println!("Course allocation demo");
    let imported = seed_catalog(&services, faculty_csv, course_csv)?;
    if imported {
        println!("Data source: CSV import");
    } else {
        println!("Data source: Sample department (no CSV provided)");
    }

    let term = services.catalog.create_term(
        year.unwrap_or_else(|| Utc::now().year()),
        season.unwrap_or(Season::Fall),
    )?;
    let faculty = services.catalog.faculty()?;
    let courses = services.catalog.courses()?;
    println!(
        "Term {} {} | {} faculty | {} courses | limit {} courses per faculty",
        term.season.label(),
        term.year,
        faculty.len(),
        courses.len(),
        services.engine.policy().max_courses_per_faculty()
    );

    let candidates: Vec<CourseId> = courses.iter().map(|course| course.id.clone()).collect();
    println!("\nPreference submissions");
    for (index, member) in faculty.iter().enumerate() {
        let ranking = rotated_ranking(&candidates, index, ranked);
        let set_id = services.preferences.create(&member.id, &term.id, &candidates)?;
        services.preferences.open(&set_id)?;
        services
            .preferences
            .submit_preferences(&set_id, &member.id, &ranking)?;
        services.preferences.close(&set_id)?;
        println!(
            "- {} (seniority {}, rating {:.1}, {}h max): {}",
            member.name,
            member.seniority_score,
            member.rating,
            member.max_hours_per_week,
            codes(&courses, &ranking)
        );
    }

    let results = services.engine.run(&term.id)?;
    render_results(&results);

    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    render_escalations(&events, &faculty, &courses);

    let unassigned = services.engine.unassigned_courses(&term.id)?;
    if unassigned.is_empty() {
        println!("\nRecommender follow-up: nothing left to place");
        return Ok(());
    }

    println!("\nRecommender follow-up");
    for course in &unassigned {
        let Some(pick) = most_available(&services)? else {
            println!("  {}: no faculty available", course.code);
            continue;
        };
        let resolution = services
            .engine
            .process_llm_result(&pick.id, &course.id, true)?;
        println!(
            "  {} -> {}: {}",
            course.code,
            pick.name,
            describe(&resolution)
        );
    }

    println!(
        "\nCourses still unassigned: {}",
        services.engine.unassigned_courses(&term.id)?.len()
    );

    Ok(())
}

fn seed_catalog(
    services: &DemoServices,
    faculty_csv: Option<PathBuf>,
    course_csv: Option<PathBuf>,
) -> Result<bool, AppError> {
    if let (Some(faculty_path), Some(course_path)) = (&faculty_csv, &course_csv) {
        CatalogImporter::faculty_from_path(&services.catalog, faculty_path)?;
        CatalogImporter::courses_from_path(&services.catalog, course_path)?;
        return Ok(true);
    }

    let department = [
        ("Dr. Kaur", 1, 2, 4.8, 8),
        ("Dr. Singh", 2, 1, 4.6, 12),
        ("Dr. Rao", 3, 3, 3.9, 20),
        ("Dr. Iyer", 2, 2, 4.1, 20),
        ("Dr. Mehta", 3, 1, 4.4, 30),
    ];
    for (name, seniority, mobility, rating, hours) in department {
        services.catalog.create_faculty(NewFaculty {
            name: name.to_string(),
            seniority_score: Some(seniority),
            mobility_score: Some(mobility),
            rating: Some(rating),
            max_hours_per_week: Some(hours),
        })?;
    }

    let offerings = [
        ("UCS301", "Data Structures", 4),
        ("UCS405", "Operating Systems", 4),
        ("UCS520", "Machine Learning", 6),
        ("UCS599", "Capstone Studio", 24),
    ];
    for (code, name, hours) in offerings {
        services.catalog.create_course(NewCourse {
            code: code.to_string(),
            name: name.to_string(),
            hours_required_per_week: Some(hours),
            taught_by: Vec::new(),
        })?;
    }

    Ok(false)
}

fn rotated_ranking(candidates: &[CourseId], offset: usize, ranked: usize) -> Vec<CourseId> {
    if candidates.is_empty() {
        return Vec::new();
    }
    (0..ranked.clamp(1, candidates.len()))
        .map(|step| candidates[(offset + step) % candidates.len()].clone())
        .collect()
}

// Stands in for the external recommender: the faculty member with the most free hours.
fn most_available(services: &DemoServices) -> Result<Option<Faculty>, AppError> {
    let courses = services.catalog.courses()?;
    let free_hours = |member: &Faculty| -> u32 {
        let taught: u32 = courses
            .iter()
            .filter(|course| course.is_taught_by(&member.id))
            .map(|course| course.hours_required_per_week)
            .sum();
        member.max_hours_per_week.saturating_sub(taught)
    };

    Ok(services
        .catalog
        .faculty()?
        .into_iter()
        .max_by_key(|member| free_hours(member)))
}

fn render_results(results: &[FacultyAssignment]) {
    println!("\nAllocation results");
    for result in results {
        if result.assigned_courses.is_empty() {
            println!("- {}: no courses", result.faculty_name);
            continue;
        }
        let hours: u32 = result
            .assigned_courses
            .iter()
            .map(|course| course.hours_required_per_week)
            .sum();
        let assigned: Vec<&str> = result
            .assigned_courses
            .iter()
            .map(|course| course.course_code.as_str())
            .collect();
        println!(
            "- {}: {} ({}h/week)",
            result.faculty_name,
            assigned.join(", "),
            hours
        );
    }

    let unassigned = results
        .first()
        .map(|result| result.unassigned_course_ids.len())
        .unwrap_or(0);
    println!("Unassigned after the pass: {unassigned}");
}

fn render_escalations(events: &[EscalationEvent], faculty: &[Faculty], courses: &[Course]) {
    if events.is_empty() {
        println!("\nEscalations: none published");
        return;
    }

    println!("\nEscalations published");
    for event in events {
        let name = faculty
            .iter()
            .find(|member| member.id == event.faculty_id)
            .map(|member| member.name.as_str())
            .unwrap_or("unknown faculty");
        println!(
            "  - {} for {} (rank {})",
            codes(courses, std::slice::from_ref(&event.course_id)),
            name,
            event.preference_rank
        );
    }
}

fn codes(courses: &[Course], ids: &[CourseId]) -> String {
    ids.iter()
        .map(|id| {
            courses
                .iter()
                .find(|course| &course.id == id)
                .map(|course| course.code.clone())
                .unwrap_or_else(|| id.to_string())
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe(resolution: &LlmResolution) -> String {
    match resolution {
        LlmResolution::NotRecommended => "not recommended".to_string(),
        LlmResolution::AlreadyAssigned => "already assigned".to_string(),
        LlmResolution::Assigned => "assigned".to_string(),
        LlmResolution::Declined { reason } => format!("declined ({reason})"),
    }
}
