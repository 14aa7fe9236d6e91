use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectAttendance {
    pub subject_name: String,
    pub subject_code: String,
    pub teacher: String,
    pub session_start: Option<NaiveDate>,
    pub session_end: Option<NaiveDate>,
    pub lectures_delivered: u32,
    pub lectures_attended: u32,
    pub lectures_absent: u32,
    pub duty_leave_used: u32,
    pub medical_leave_used: u32,
    pub approved_duty_leave: u32,
    pub approved_medical_leave_quota: u32,
    /// Percentage exactly as the portal displays it.
    pub reported_percentage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LectureStatus {
    Present,
    Absent,
    DutyLeave,
    MedicalLeave,
    Unknown,
}

impl LectureStatus {
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_uppercase().as_str() {
            "P" | "PR" | "PRESENT" => LectureStatus::Present,
            "A" | "AB" | "ABSENT" => LectureStatus::Absent,
            "DL" | "OD" | "D" => LectureStatus::DutyLeave,
            "ML" | "M" => LectureStatus::MedicalLeave,
            _ => LectureStatus::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LectureStatus::Present => "present",
            LectureStatus::Absent => "absent",
            LectureStatus::DutyLeave => "duty leave",
            LectureStatus::MedicalLeave => "medical leave",
            LectureStatus::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterEntry {
    pub lecture_number: u32,
    pub date: Option<NaiveDate>,
    pub period: String,
    pub status: LectureStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectRegister {
    pub subject_name: String,
    pub subject_code: String,
    pub entries: Vec<RegisterEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterTally {
    pub present: usize,
    pub absent: usize,
    pub duty_leave: usize,
    pub medical_leave: usize,
    pub unknown: usize,
}

impl SubjectRegister {
    pub fn tally(&self) -> RegisterTally {
        let mut tally = RegisterTally::default();
        for entry in &self.entries {
            match entry.status {
                LectureStatus::Present => tally.present += 1,
                LectureStatus::Absent => tally.absent += 1,
                LectureStatus::DutyLeave => tally.duty_leave += 1,
                LectureStatus::MedicalLeave => tally.medical_leave += 1,
                LectureStatus::Unknown => tally.unknown += 1,
            }
        }
        tally
    }
}

/// Which lookup joined a register to its summary counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRule {
    Code,
    Name,
    Containment,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubjectLink {
    pub register: SubjectRegister,
    pub summary_index: Option<usize>,
    pub rule: Option<LinkRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub user_id: String,
    pub institution: String,
    pub session_id: String,
}

impl CacheKey {
    pub fn new(
        user_id: impl Into<String>,
        institution: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            institution: institution.into(),
            session_id: session_id.into(),
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}/{}", self.user_id, self.institution, self.session_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub payload: T,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    pub id: String,
    pub posted_at: DateTime<Utc>,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedPage {
    pub items: Vec<FeedItem>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProjectionStatus {
    GoodToGo,
    Risky,
    DontMiss,
    NotApplicable,
}

impl ProjectionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ProjectionStatus::GoodToGo => "good to go",
            ProjectionStatus::Risky => "risky",
            ProjectionStatus::DontMiss => "don't miss",
            ProjectionStatus::NotApplicable => "n/a",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectionResult {
    pub classes_to_miss: u32,
    pub current_percentage: f64,
    pub percentage_without_medical: f64,
    pub projected_percentage: f64,
    pub medical_leave_credit_applied: u32,
    pub status: ProjectionStatus,
}
