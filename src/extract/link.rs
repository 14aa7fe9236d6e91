use crate::models::{LinkRule, SubjectAttendance, SubjectLink, SubjectRegister};

/// Find the summary record a register belongs to.
///
/// Rules run in order and the first one with any hit wins: code
/// (case-insensitive), exact name, then name containment in either direction.
pub fn find_summary(
    register: &SubjectRegister,
    summaries: &[SubjectAttendance],
) -> Option<(usize, LinkRule)> {
    let code = register.subject_code.trim();
    if !code.is_empty() {
        if let Some(idx) = summaries
            .iter()
            .position(|s| s.subject_code.trim().to_lowercase() == code.to_lowercase())
        {
            return Some((idx, LinkRule::Code));
        }
    }

    let name = register.subject_name.trim();
    if name.is_empty() {
        return None;
    }
    if let Some(idx) = summaries.iter().position(|s| s.subject_name.trim() == name) {
        return Some((idx, LinkRule::Name));
    }

    let name = name.to_lowercase();
    summaries
        .iter()
        .position(|s| {
            let other = s.subject_name.trim().to_lowercase();
            !other.is_empty() && (other.contains(&name) || name.contains(&other))
        })
        .map(|idx| (idx, LinkRule::Containment))
}

pub fn link_registers(
    summaries: &[SubjectAttendance],
    registers: Vec<SubjectRegister>,
) -> Vec<SubjectLink> {
    registers
        .into_iter()
        .map(|register| {
            let found = find_summary(&register, summaries);
            if found.is_none() {
                tracing::debug!(subject = %register.subject_name, "register has no summary counterpart");
            }
            SubjectLink {
                summary_index: found.map(|(idx, _)| idx),
                rule: found.map(|(_, rule)| rule),
                register,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(name: &str, code: &str) -> SubjectAttendance {
        SubjectAttendance {
            subject_name: name.to_string(),
            subject_code: code.to_string(),
            teacher: String::new(),
            session_start: None,
            session_end: None,
            lectures_delivered: 10,
            lectures_attended: 8,
            lectures_absent: 2,
            duty_leave_used: 0,
            medical_leave_used: 0,
            approved_duty_leave: 0,
            approved_medical_leave_quota: 0,
            reported_percentage: 80.0,
        }
    }

    fn register(name: &str, code: &str) -> SubjectRegister {
        SubjectRegister {
            subject_name: name.to_string(),
            subject_code: code.to_string(),
            entries: Vec::new(),
        }
    }

    #[test]
    fn code_match_beats_an_earlier_name_match() {
        let summaries = vec![summary("Physics", "PH9"), summary("Physics Lab", "ph101")];
        assert_eq!(
            find_summary(&register("Physics", "PH101"), &summaries),
            Some((1, LinkRule::Code))
        );
    }

    #[test]
    fn exact_name_beats_containment() {
        let summaries = vec![summary("Physics Lab", "A"), summary("Physics", "B")];
        assert_eq!(
            find_summary(&register("Physics", "ZZ"), &summaries),
            Some((1, LinkRule::Name))
        );
    }

    #[test]
    fn containment_works_both_ways() {
        let summaries = vec![summary("Engineering Mathematics II", "M2")];
        assert_eq!(
            find_summary(&register("mathematics ii", ""), &summaries),
            Some((0, LinkRule::Containment))
        );
        let summaries = vec![summary("Maths", "M1")];
        assert_eq!(
            find_summary(&register("Applied Maths (Theory)", ""), &summaries),
            Some((0, LinkRule::Containment))
        );
    }

    #[test]
    fn unmatched_registers_stay_unlinked() {
        let summaries = vec![summary("Chemistry", "CH1")];
        let links = link_registers(
            &summaries,
            vec![register("History", "HI1"), register("Chemistry", "")],
        );
        assert_eq!(links[0].summary_index, None);
        assert_eq!(links[0].rule, None);
        assert_eq!(links[1].summary_index, Some(0));
        assert_eq!(links[1].rule, Some(LinkRule::Name));
    }
}
