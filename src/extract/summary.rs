use crate::extract::fields::{self, Field, FieldValue};
use crate::extract::{Extraction, MarkupLayout, MarkupStructureError};
use crate::markup;
use crate::models::SubjectAttendance;

#[derive(Debug, Clone, Default)]
pub struct SummaryExtractor {
    layout: MarkupLayout,
}

#[derive(Debug, Default)]
struct Details {
    teacher: Option<String>,
    session: Option<(Option<chrono::NaiveDate>, Option<chrono::NaiveDate>)>,
    delivered: Option<u32>,
    attended: Option<u32>,
    absent: Option<u32>,
    leave_pair: Option<(u32, u32)>,
    percentage: Option<f64>,
    approved_duty: Option<u32>,
    approved_medical: Option<u32>,
}

impl Details {
    // First occurrence of a field wins.
    fn absorb(&mut self, field: Field, value: FieldValue) {
        match (field, value) {
            (Field::Teacher, FieldValue::Text(t)) => {
                self.teacher.get_or_insert(t);
            }
            (Field::SessionRange, FieldValue::Dates(start, end)) => {
                self.session.get_or_insert((start, end));
            }
            (Field::Delivered, FieldValue::Count(n)) => {
                self.delivered.get_or_insert(n);
            }
            (Field::Attended, FieldValue::Count(n)) => {
                self.attended.get_or_insert(n);
            }
            (Field::Absent, FieldValue::Count(n)) => {
                self.absent.get_or_insert(n);
            }
            (Field::CombinedLeave, FieldValue::Pair(dl, ml)) => {
                self.leave_pair.get_or_insert((dl, ml));
            }
            (Field::Percentage, FieldValue::Percent(p)) => {
                self.percentage.get_or_insert(p);
            }
            (Field::ApprovedDutyLeave, FieldValue::Count(n)) => {
                self.approved_duty.get_or_insert(n);
            }
            (Field::ApprovedMedicalLeave, FieldValue::Count(n)) => {
                self.approved_medical.get_or_insert(n);
            }
            _ => {}
        }
    }
}

impl SummaryExtractor {
    pub fn new(layout: MarkupLayout) -> Self {
        Self { layout }
    }

    #[tracing::instrument(level = "debug", skip_all, fields(bytes = html.len()))]
    pub fn extract(&self, html: &str) -> Extraction<SubjectAttendance> {
        let containers = markup::elements(html, None, Some(&self.layout.subject_container));
        let mut out = Extraction::default();

        for (position, container) in containers.iter().enumerate() {
            match self.extract_subject(position, container.inner) {
                Ok(subject) => out.records.push(subject),
                Err(err) => {
                    tracing::warn!(
                        position,
                        missing = %err.missing,
                        subject = ?err.subject,
                        "skipping unreadable subject"
                    );
                    out.skipped.push(err);
                }
            }
        }

        tracing::debug!(
            containers = containers.len(),
            extracted = out.records.len(),
            skipped = out.skipped.len(),
            "summary extracted"
        );
        out
    }

    fn extract_subject(
        &self,
        position: usize,
        container: &str,
    ) -> Result<SubjectAttendance, MarkupStructureError> {
        let subject_name = markup::first_element(container, None, Some(&self.layout.subject_name))
            .map(|e| markup::text(e.inner))
            .filter(|s| !s.is_empty())
            .ok_or_else(|| MarkupStructureError::new(position, None, "subject name"))?;
        let subject_code = markup::first_element(container, None, Some(&self.layout.subject_code))
            .map(|e| markup::text(e.inner))
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                MarkupStructureError::new(position, Some(&subject_name), "subject code")
            })?;

        let heading = format!("{subject_name} {subject_code}");
        let mut details = Details::default();
        for line in markup::text_lines(container) {
            if line == subject_name || line == subject_code || line == heading {
                continue;
            }
            if let Some(classified) = fields::classify(&line) {
                details.absorb(classified.field, classified.value);
            }
        }

        let delivered = details.delivered.ok_or_else(|| {
            MarkupStructureError::new(position, Some(&subject_name), "lectures delivered")
        })?;
        let attended = details.attended.ok_or_else(|| {
            MarkupStructureError::new(position, Some(&subject_name), "lectures attended")
        })?;
        let (duty_leave_used, medical_leave_used) = details.leave_pair.unwrap_or((0, 0));
        let (session_start, session_end) = details.session.unwrap_or((None, None));

        Ok(SubjectAttendance {
            subject_name,
            subject_code,
            teacher: details.teacher.unwrap_or_default(),
            session_start,
            session_end,
            lectures_delivered: delivered,
            lectures_attended: attended,
            lectures_absent: details
                .absent
                .unwrap_or_else(|| delivered.saturating_sub(attended)),
            duty_leave_used,
            medical_leave_used,
            approved_duty_leave: details.approved_duty.unwrap_or(0),
            approved_medical_leave_quota: details.approved_medical.unwrap_or(0),
            reported_percentage: details.percentage.unwrap_or(0.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const SUMMARY: &str = r#"
<div class="container">
  <div class="subject-card">
    <div class="head"><span class="subject-name">Data&nbsp;Structures</span> <span class="subject-code">CS201</span></div>
    <ul>
      <li>Teacher : Jane   Doe</li>
      <li>Duration : 01/08/2024 to 30/11/2024</li>
      <li>Lectures Delivered : 20</li>
      <li>Lectures Attended : 14</li>
      <li>Absent : 3</li>
      <li>Leaves (DL/ML) : 2/1</li>
      <li>Attendance % : 85.00%</li>
      <li>Approved DL : 2</li>
      <li>Approved ML : 3</li>
    </ul>
  </div>
  <div class="subject-card">
    <div class="head"><span class="subject-name">Discrete Maths</span></div>
    <ul><li>Lectures Delivered : 18</li><li>Lectures Attended : 17</li></ul>
  </div>
  <div class="subject-card">
    <span class="subject-name">Operating Systems</span><span class="subject-code">CS301</span><br>
    TEACHER:&nbsp;&nbsp;Jane Doe<br>
    delivered 12<br>
    present   9<br>
  </div>
</div>
"#;

    #[test]
    fn extracts_every_labeled_field() {
        let out = SummaryExtractor::default().extract(SUMMARY);
        let ds = &out.records[0];
        assert_eq!(ds.subject_name, "Data Structures");
        assert_eq!(ds.subject_code, "CS201");
        assert_eq!(ds.teacher, "Jane Doe");
        assert_eq!(ds.session_start, NaiveDate::from_ymd_opt(2024, 8, 1));
        assert_eq!(ds.session_end, NaiveDate::from_ymd_opt(2024, 11, 30));
        assert_eq!(ds.lectures_delivered, 20);
        assert_eq!(ds.lectures_attended, 14);
        assert_eq!(ds.lectures_absent, 3);
        assert_eq!(ds.duty_leave_used, 2);
        assert_eq!(ds.medical_leave_used, 1);
        assert_eq!(ds.approved_duty_leave, 2);
        assert_eq!(ds.approved_medical_leave_quota, 3);
        assert_eq!(ds.reported_percentage, 85.0);
    }

    #[test]
    fn broken_subject_is_skipped_without_losing_the_rest() {
        let out = SummaryExtractor::default().extract(SUMMARY);
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.skipped.len(), 1);
        assert_eq!(out.skipped[0].position, 1);
        assert_eq!(out.skipped[0].subject.as_deref(), Some("Discrete Maths"));
        assert_eq!(out.skipped[0].missing, "subject code");
        assert!(!out.all_failed());
    }

    #[test]
    fn label_variants_yield_identical_teacher() {
        let out = SummaryExtractor::default().extract(SUMMARY);
        assert_eq!(out.records[0].teacher, out.records[1].teacher);

        let os = &out.records[1];
        assert_eq!(os.lectures_delivered, 12);
        assert_eq!(os.lectures_attended, 9);
        assert_eq!(os.lectures_absent, 3);
        assert_eq!(os.reported_percentage, 0.0);
    }

    #[test]
    fn extraction_is_deterministic() {
        let extractor = SummaryExtractor::default();
        assert_eq!(extractor.extract(SUMMARY), extractor.extract(SUMMARY));
    }

    #[test]
    fn missing_counts_skip_the_subject() {
        let html = r#"<div class="subject-card"><b class="subject-name">Chemistry</b><b class="subject-code">CH1</b>
            <p>Teacher: R. Rao</p><p>Lectures Attended: 4</p></div>"#;
        let out = SummaryExtractor::default().extract(html);
        assert!(out.all_failed());
        assert_eq!(out.skipped[0].missing, "lectures delivered");
    }

    #[test]
    fn total_lectures_labels_fill_both_counts() {
        let html = r#"<div class="subject-card"><b class="subject-name">Physics</b><b class="subject-code">PH1</b>
            <p>Total Lectures : 20</p><p>Total Lectures Attended : 14</p><p>Attended %: 70.0</p></div>"#;
        let out = SummaryExtractor::default().extract(html);
        assert!(out.skipped.is_empty());
        let physics = &out.records[0];
        assert_eq!(physics.lectures_delivered, 20);
        assert_eq!(physics.lectures_attended, 14);
        assert_eq!(physics.lectures_absent, 6);
        assert_eq!(physics.reported_percentage, 70.0);
    }

    #[test]
    fn custom_layout_classes_are_honoured() {
        let layout = MarkupLayout {
            subject_container: "course".to_string(),
            subject_name: "title".to_string(),
            subject_code: "code".to_string(),
            ..MarkupLayout::default()
        };
        let html = r#"<section class=course><h3 class=title>Biology</h3><em class=code>BI2</em>
            <p>Delivered: 10</p><p>Attended: 10</p></section>"#;
        let out = SummaryExtractor::new(layout).extract(html);
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].subject_code, "BI2");
        assert_eq!(out.records[0].lectures_absent, 0);
    }

    #[test]
    fn page_without_containers_is_empty_not_failed() {
        let out = SummaryExtractor::default().extract("<html><body>No subjects</body></html>");
        assert!(out.records.is_empty());
        assert!(!out.all_failed());
    }
}
