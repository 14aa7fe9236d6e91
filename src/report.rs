use std::fmt::Write;

use serde::Serialize;

use crate::coordinator::{AttendanceView, DataOrigin};
use crate::models::{CacheKey, ProjectionResult, ProjectionStatus, SubjectAttendance};
use crate::projection::{self, ProjectionPolicy};

/// One subject's projection, flattened for tables and CSV export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectionRow {
    pub subject_code: String,
    pub subject_name: String,
    pub lectures_delivered: u32,
    pub lectures_attended: u32,
    pub reported_percentage: f64,
    pub current_percentage: f64,
    pub projected_percentage: f64,
    pub medical_leave_credit_applied: u32,
    pub status: String,
    pub safe_misses: Option<u32>,
    pub classes_to_recover: Option<u32>,
}

impl ProjectionRow {
    fn new(subject: &SubjectAttendance, result: &ProjectionResult, policy: &ProjectionPolicy) -> Self {
        Self {
            subject_code: subject.subject_code.clone(),
            subject_name: subject.subject_name.clone(),
            lectures_delivered: subject.lectures_delivered,
            lectures_attended: subject.lectures_attended,
            reported_percentage: subject.reported_percentage,
            current_percentage: round2(result.current_percentage),
            projected_percentage: round2(result.projected_percentage),
            medical_leave_credit_applied: result.medical_leave_credit_applied,
            status: result.status.label().to_string(),
            safe_misses: projection::max_safe_misses(subject, policy),
            classes_to_recover: projection::classes_to_recover(subject, policy),
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn status_rank(status: ProjectionStatus) -> u8 {
    match status {
        ProjectionStatus::DontMiss => 0,
        ProjectionStatus::Risky => 1,
        ProjectionStatus::GoodToGo => 2,
        ProjectionStatus::NotApplicable => 3,
    }
}

/// Project every subject, most at risk first.
pub fn project_subjects(
    subjects: &[SubjectAttendance],
    classes_to_miss: i64,
    policy: &ProjectionPolicy,
) -> Vec<(ProjectionStatus, ProjectionRow)> {
    let mut rows: Vec<(ProjectionStatus, ProjectionRow)> = subjects
        .iter()
        .map(|subject| {
            let result = projection::project(subject, classes_to_miss, policy);
            (result.status, ProjectionRow::new(subject, &result, policy))
        })
        .collect();

    rows.sort_by(|a, b| {
        status_rank(a.0)
            .cmp(&status_rank(b.0))
            .then(a.1.projected_percentage.total_cmp(&b.1.projected_percentage))
            .then_with(|| a.1.subject_code.cmp(&b.1.subject_code))
    });
    rows
}

pub fn write_csv<W: std::io::Write>(rows: &[ProjectionRow], writer: W) -> csv::Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn source_label(view: &AttendanceView) -> String {
    let origin = match view.origin {
        Some(DataOrigin::Live) => "live portal",
        Some(DataOrigin::Cache) if view.stale => "stale cache",
        Some(DataOrigin::Cache) => "cache",
        None => "no data",
    };
    match view.age_description() {
        Some(age) if view.offline => format!("{origin}, offline, fetched {age}"),
        Some(age) => format!("{origin}, fetched {age}"),
        None => origin.to_string(),
    }
}

pub fn build_report(
    key: &CacheKey,
    view: &AttendanceView,
    classes_to_miss: i64,
    policy: &ProjectionPolicy,
) -> String {
    let rows = project_subjects(&view.subjects, classes_to_miss, policy);
    let n = policy.clamp_classes(classes_to_miss);

    let mut output = String::new();
    let _ = writeln!(output, "# Attendance Forecast");
    let _ = writeln!(
        output,
        "Generated for {} ({}); target {:.0}%, medical floor {:.0}%",
        key,
        source_label(view),
        policy.target_percentage,
        policy.medical_floor_percentage
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Current Attendance");

    if view.subjects.is_empty() {
        let _ = writeln!(output, "No subjects available.");
    } else {
        for subject in view.subjects.iter() {
            let _ = writeln!(
                output,
                "- {} ({}): {}/{} attended, {} duty leave, {} medical leave, portal shows {:.2}%",
                subject.subject_name,
                subject.subject_code,
                subject.lectures_attended,
                subject.lectures_delivered,
                subject.duty_leave_used,
                subject.medical_leave_used,
                subject.reported_percentage
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## If You Miss {n} More");

    if rows.is_empty() {
        let _ = writeln!(output, "Nothing to project.");
    } else {
        for (status, row) in rows.iter() {
            if *status == ProjectionStatus::NotApplicable {
                let _ = writeln!(output, "- {}: no lectures delivered yet", row.subject_code);
                continue;
            }
            let credit = if row.medical_leave_credit_applied > 0 {
                format!(" using {} medical leave", row.medical_leave_credit_applied)
            } else {
                String::new()
            };
            let _ = writeln!(
                output,
                "- {}: {:.2}% -> {:.2}%{} ({})",
                row.subject_code, row.current_percentage, row.projected_percentage, credit, row.status
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Headroom");

    let mut any = false;
    for (_, row) in rows.iter() {
        match (row.safe_misses, row.classes_to_recover) {
            (Some(safe), _) if safe > 0 => {
                let _ = writeln!(output, "- {}: can miss {} and stay on target", row.subject_code, safe);
            }
            (_, Some(recover)) if recover > 0 => {
                let _ = writeln!(
                    output,
                    "- {}: attend the next {} to get back on target",
                    row.subject_code, recover
                );
            }
            (_, None) => {
                let _ = writeln!(output, "- {}: target can no longer be reached", row.subject_code);
            }
            _ => continue,
        }
        any = true;
    }
    if !any {
        let _ = writeln!(output, "No headroom to report.");
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::LoadPhase;
    use chrono::Utc;

    fn subject(code: &str, delivered: u32, attended: u32, aml: u32) -> SubjectAttendance {
        SubjectAttendance {
            subject_name: format!("Subject {code}"),
            subject_code: code.to_string(),
            teacher: "Jane Doe".to_string(),
            session_start: None,
            session_end: None,
            lectures_delivered: delivered,
            lectures_attended: attended,
            lectures_absent: delivered.saturating_sub(attended),
            duty_leave_used: 0,
            medical_leave_used: 0,
            approved_duty_leave: 0,
            approved_medical_leave_quota: aml,
            reported_percentage: if delivered == 0 {
                0.0
            } else {
                attended as f64 / delivered as f64 * 100.0
            },
        }
    }

    fn view(subjects: Vec<SubjectAttendance>) -> AttendanceView {
        AttendanceView {
            subjects,
            fetched_at: Some(Utc::now()),
            origin: Some(DataOrigin::Live),
            phase: LoadPhase::Ready,
            ..AttendanceView::default()
        }
    }

    #[test]
    fn riskiest_subjects_come_first() {
        let subjects = vec![
            subject("CS1", 20, 20, 0),
            subject("CS2", 20, 10, 0),
            subject("CS3", 0, 0, 0),
            subject("CS4", 20, 14, 0),
        ];
        let rows = project_subjects(&subjects, 1, &ProjectionPolicy::default());
        let order: Vec<&str> = rows.iter().map(|(_, r)| r.subject_code.as_str()).collect();
        assert_eq!(order, vec!["CS2", "CS4", "CS1", "CS3"]);
        assert_eq!(rows[0].1.status, "don't miss");
        assert_eq!(rows[3].1.safe_misses, None);
    }

    #[test]
    fn report_lists_projection_and_headroom() {
        let key = CacheKey::new("kiara.patel", "GSU", "2025-ODD");
        let report = build_report(
            &key,
            &view(vec![subject("CS1", 20, 20, 0), subject("CS2", 20, 12, 0)]),
            1,
            &ProjectionPolicy::default(),
        );

        assert!(report.starts_with("# Attendance Forecast"));
        assert!(report.contains("kiara.patel@GSU/2025-ODD (live portal, fetched Just now)"));
        assert!(report.contains("## If You Miss 1 More"));
        assert!(report.contains("- CS2: 60.00% -> 57.14% (don't miss)"));
        assert!(report.contains("- CS1: can miss 6 and stay on target"));
        assert!(report.contains("- CS2: attend the next 12 to get back on target"));
    }

    #[test]
    fn empty_view_renders_placeholders() {
        let key = CacheKey::new("u", "i", "s");
        let report = build_report(&key, &AttendanceView::default(), 3, &ProjectionPolicy::default());
        assert!(report.contains("(no data)"));
        assert!(report.contains("No subjects available."));
        assert!(report.contains("Nothing to project."));
        assert!(report.contains("No headroom to report."));
    }

    #[test]
    fn csv_has_header_and_blank_optionals() {
        let rows: Vec<ProjectionRow> = project_subjects(
            &[subject("CS3", 0, 0, 0)],
            1,
            &ProjectionPolicy::default(),
        )
        .into_iter()
        .map(|(_, row)| row)
        .collect();

        let mut buf = Vec::new();
        write_csv(&rows, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("subject_code,subject_name,"));
        assert!(lines.next().unwrap().ends_with("n/a,,0"));
    }
}
