use crate::extract::fields::parse_date;
use crate::extract::{Extraction, MarkupLayout, MarkupStructureError};
use crate::markup::{self, Element};
use crate::models::{LectureStatus, RegisterEntry, SubjectRegister};

#[derive(Debug, Clone, Default)]
pub struct RegisterExtractor {
    layout: MarkupLayout,
}

enum Row<'a> {
    Header(Vec<Element<'a>>),
    Body(Vec<Element<'a>>),
}

fn classify_row(row: &str) -> Option<Row<'_>> {
    let headers = markup::elements(row, Some("th"), None);
    if !headers.is_empty() {
        return Some(Row::Header(headers));
    }
    let cells = markup::elements(row, Some("td"), None);
    (!cells.is_empty()).then_some(Row::Body(cells))
}

impl RegisterExtractor {
    pub fn new(layout: MarkupLayout) -> Self {
        Self { layout }
    }

    #[tracing::instrument(level = "debug", skip_all, fields(bytes = html.len()))]
    pub fn extract(&self, html: &str) -> Extraction<SubjectRegister> {
        let mut out = Extraction::default();
        let table = markup::first_element(html, Some("table"), Some(&self.layout.register_table))
            .or_else(|| markup::first_element(html, Some("table"), None));
        let Some(table) = table else {
            tracing::debug!("no register table in markup");
            return out;
        };

        let rows: Vec<Row<'_>> = markup::elements(table.inner, Some("tr"), None)
            .into_iter()
            .filter_map(|tr| classify_row(tr.inner))
            .collect();

        let mut position = 0usize;
        let mut iter = rows.into_iter().peekable();
        while let Some(row) = iter.next() {
            let Row::Header(headers) = row else {
                continue;
            };
            let body = match iter.next_if(|r| matches!(r, Row::Body(_))) {
                Some(Row::Body(cells)) => Some(cells),
                _ => None,
            };

            match subject_register(position, &headers, body.as_deref()) {
                Ok(register) => out.records.push(register),
                Err(err) => {
                    tracing::warn!(
                        position,
                        missing = %err.missing,
                        subject = ?err.subject,
                        "skipping unreadable register"
                    );
                    out.skipped.push(err);
                }
            }
            position += 1;
        }

        tracing::debug!(
            extracted = out.records.len(),
            skipped = out.skipped.len(),
            "register extracted"
        );
        out
    }
}

fn subject_register(
    position: usize,
    headers: &[Element<'_>],
    body: Option<&[Element<'_>]>,
) -> Result<SubjectRegister, MarkupStructureError> {
    let (subject_cell, lecture_cells) = headers
        .split_first()
        .ok_or_else(|| MarkupStructureError::new(position, None, "subject header"))?;

    let mut parts = markup::split_on_breaks(subject_cell.inner)
        .into_iter()
        .filter(|p| !p.is_empty());
    let subject_name = parts
        .next()
        .ok_or_else(|| MarkupStructureError::new(position, None, "subject name"))?;
    let subject_code = parts.next().unwrap_or_default();

    let cells = body.ok_or_else(|| {
        MarkupStructureError::new(position, Some(&subject_name), "status row")
    })?;

    if lecture_cells.len() != cells.len() {
        tracing::debug!(
            subject = %subject_name,
            lectures = lecture_cells.len(),
            statuses = cells.len(),
            "register header and status counts differ; pairing the shorter run"
        );
    }

    let entries = lecture_cells
        .iter()
        .zip(cells.iter())
        .enumerate()
        .map(|(idx, (header, cell))| lecture_entry(idx, header.inner, cell.inner))
        .collect();

    Ok(SubjectRegister {
        subject_name,
        subject_code,
        entries,
    })
}

fn first_number(s: &str) -> Option<u32> {
    let digits: String = s
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

fn lecture_entry(idx: usize, header: &str, status: &str) -> RegisterEntry {
    let parts = markup::split_on_breaks(header);
    let lecture_number = parts
        .first()
        .and_then(|p| first_number(p))
        .unwrap_or(idx as u32 + 1);
    let date = parts.get(1).and_then(|d| parse_date(d));
    let period = parts.get(2).cloned().unwrap_or_default();

    RegisterEntry {
        lecture_number,
        date,
        period,
        status: LectureStatus::from_code(&markup::text(status)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn header_cells(n: usize) -> String {
        (1..=n)
            .map(|i| format!("<th>{i}<br>{i:02}/08/2024<br>P{}</th>", (i % 6) + 1))
            .collect()
    }

    fn status_cells(codes: &[&str]) -> String {
        codes.iter().map(|c| format!("<td> {c} </td>")).collect()
    }

    #[test]
    fn pairs_only_the_shorter_run() {
        let html = format!(
            r#"<table class="register"><thead><tr><th>Data Structures<br>CS201</th>{}</tr></thead>
               <tbody><tr>{}</tr></tbody></table>"#,
            header_cells(9),
            status_cells(&["P", "A", "DL", "ML", "P", "P", "x", "p"])
        );
        let out = RegisterExtractor::default().extract(&html);
        assert!(out.skipped.is_empty());
        let register = &out.records[0];
        assert_eq!(register.subject_name, "Data Structures");
        assert_eq!(register.subject_code, "CS201");
        assert_eq!(register.entries.len(), 8);

        let first = &register.entries[0];
        assert_eq!(first.lecture_number, 1);
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2024, 8, 1));
        assert_eq!(first.period, "P2");
        assert_eq!(first.status, LectureStatus::Present);
        assert_eq!(register.entries[2].status, LectureStatus::DutyLeave);
        assert_eq!(register.entries[3].status, LectureStatus::MedicalLeave);
        assert_eq!(register.entries[6].status, LectureStatus::Unknown);
        assert_eq!(register.entries[7].status, LectureStatus::Present);
    }

    #[test]
    fn more_statuses_than_headers_is_also_truncated() {
        let html = format!(
            "<table><tr><th>Physics<br>PH1</th>{}</tr><tr>{}</tr></table>",
            header_cells(2),
            status_cells(&["P", "A", "P"])
        );
        let out = RegisterExtractor::default().extract(&html);
        assert_eq!(out.records[0].entries.len(), 2);
    }

    #[test]
    fn subject_without_status_row_is_isolated() {
        let html = format!(
            "<table class=register>\
             <tr><th>Physics<br>PH1</th>{h}</tr>\
             <tr><th>Chemistry<br>CH1</th>{h}</tr><tr>{s}</tr>\
             <tr><th><br></th>{h}</tr><tr>{s}</tr>\
             </table>",
            h = header_cells(2),
            s = status_cells(&["A", "A"])
        );
        let out = RegisterExtractor::default().extract(&html);
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].subject_name, "Chemistry");
        assert_eq!(out.records[0].tally().absent, 2);
        assert_eq!(out.skipped.len(), 2);
        assert_eq!(out.skipped[0].missing, "status row");
        assert_eq!(out.skipped[1].position, 2);
        assert_eq!(out.skipped[1].missing, "subject name");
    }

    #[test]
    fn unparseable_lecture_header_falls_back_to_position() {
        let html = "<table><tr><th>Maths</th><th>L-7<br>??</th><th>--</th></tr>\
                    <tr><td>P</td><td>A</td></tr></table>";
        let out = RegisterExtractor::default().extract(html);
        let entries = &out.records[0].entries;
        assert_eq!(out.records[0].subject_code, "");
        assert_eq!(entries[0].lecture_number, 7);
        assert_eq!(entries[0].date, None);
        assert_eq!(entries[1].lecture_number, 2);
        assert_eq!(entries[1].period, "");
    }

    #[test]
    fn no_table_means_nothing_extracted() {
        let out = RegisterExtractor::default().extract("<p>maintenance</p>");
        assert!(out.records.is_empty());
        assert!(out.skipped.is_empty());
    }
}
