use serde::{Deserialize, Serialize};

use crate::models::{ProjectionResult, ProjectionStatus, SubjectAttendance};

/// Thresholds of the compliance projection.
///
/// `target_percentage` must stay above `medical_floor_percentage`: medical
/// leave credit is only considered between the two.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionPolicy {
    #[serde(default = "default_target")]
    pub target_percentage: f64,
    #[serde(default = "default_medical_floor")]
    pub medical_floor_percentage: f64,
    #[serde(default = "default_min_classes")]
    pub min_classes_to_miss: u32,
    #[serde(default = "default_max_classes")]
    pub max_classes_to_miss: u32,
}

impl Default for ProjectionPolicy {
    fn default() -> Self {
        Self {
            target_percentage: default_target(),
            medical_floor_percentage: default_medical_floor(),
            min_classes_to_miss: default_min_classes(),
            max_classes_to_miss: default_max_classes(),
        }
    }
}

fn default_target() -> f64 {
    75.0
}

fn default_medical_floor() -> f64 {
    65.0
}

fn default_min_classes() -> u32 {
    1
}

fn default_max_classes() -> u32 {
    100
}

impl ProjectionPolicy {
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=100.0).contains(&self.target_percentage) {
            return Err(format!(
                "target percentage {} is outside 0..=100",
                self.target_percentage
            ));
        }
        if self.medical_floor_percentage > self.target_percentage {
            return Err(format!(
                "medical floor {} is above target {}",
                self.medical_floor_percentage, self.target_percentage
            ));
        }
        if self.min_classes_to_miss == 0 || self.min_classes_to_miss > self.max_classes_to_miss {
            return Err(format!(
                "classes-to-miss range {}..={} is empty or starts at zero",
                self.min_classes_to_miss, self.max_classes_to_miss
            ));
        }
        Ok(())
    }

    pub fn clamp_classes(&self, classes_to_miss: i64) -> u32 {
        classes_to_miss.clamp(
            self.min_classes_to_miss as i64,
            self.max_classes_to_miss as i64,
        ) as u32
    }
}

fn percent(part: u64, whole: u64) -> f64 {
    part as f64 / whole as f64 * 100.0
}

/// Project attendance after missing `classes_to_miss` more lectures.
///
/// Duty leave always counts as attendance. Medical leave counts toward the
/// current percentage (the portal counts it) but is left out of the projection
/// unless a minimal credit from the approved quota lifts a subject sitting
/// between the medical floor and the target.
pub fn project(
    subject: &SubjectAttendance,
    classes_to_miss: i64,
    policy: &ProjectionPolicy,
) -> ProjectionResult {
    let n = policy.clamp_classes(classes_to_miss);
    // Widened so portal counts near u32::MAX cannot overflow.
    let delivered = u64::from(subject.lectures_delivered);

    if delivered == 0 {
        return ProjectionResult {
            classes_to_miss: n,
            current_percentage: 0.0,
            percentage_without_medical: 0.0,
            projected_percentage: 0.0,
            medical_leave_credit_applied: 0,
            status: ProjectionStatus::NotApplicable,
        };
    }

    let base_attended = u64::from(subject.lectures_attended) + u64::from(subject.duty_leave_used);
    let current = percent(base_attended + u64::from(subject.medical_leave_used), delivered);
    let new_delivered = delivered + u64::from(n);
    let without_medical = percent(base_attended, new_delivered);
    let quota = subject.approved_medical_leave_quota;

    let (projected, credit, status) = if without_medical >= policy.target_percentage {
        (without_medical, 0, ProjectionStatus::GoodToGo)
    } else if without_medical >= policy.medical_floor_percentage && quota > 0 {
        let needed = policy.target_percentage / 100.0 * new_delivered as f64 - base_attended as f64;
        // Guard the ceiling against representation noise on exact targets.
        let credit = ((needed - 1e-9).ceil().max(0.0) as u32).min(quota);
        let projected = percent(base_attended + u64::from(credit), new_delivered);
        let status = if projected >= policy.target_percentage {
            ProjectionStatus::GoodToGo
        } else {
            ProjectionStatus::Risky
        };
        (projected, credit, status)
    } else if without_medical < policy.medical_floor_percentage {
        (without_medical, 0, ProjectionStatus::DontMiss)
    } else {
        (without_medical, 0, ProjectionStatus::Risky)
    };

    ProjectionResult {
        classes_to_miss: n,
        current_percentage: current,
        percentage_without_medical: without_medical,
        projected_percentage: projected,
        medical_leave_credit_applied: credit,
        status,
    }
}

/// Largest number of misses within the policy range that still projects as
/// good to go. `Some(0)` when even the smallest miss does not; `None` when
/// nothing has been delivered yet.
pub fn max_safe_misses(subject: &SubjectAttendance, policy: &ProjectionPolicy) -> Option<u32> {
    if subject.lectures_delivered == 0 {
        return None;
    }
    let mut safe = 0;
    for n in policy.min_classes_to_miss..=policy.max_classes_to_miss {
        if project(subject, n as i64, policy).status != ProjectionStatus::GoodToGo {
            break;
        }
        safe = n;
    }
    Some(safe)
}

/// Consecutive lectures that must be attended before the conservative
/// percentage (attended plus duty leave) reaches the target again.
pub fn classes_to_recover(subject: &SubjectAttendance, policy: &ProjectionPolicy) -> Option<u32> {
    let delivered = subject.lectures_delivered as f64;
    let base = subject.lectures_attended as f64 + subject.duty_leave_used as f64;
    let target = policy.target_percentage / 100.0;
    if target >= 1.0 && base < delivered {
        return None;
    }
    if delivered == 0.0 || base / delivered >= target {
        return Some(0);
    }
    let needed = (target * delivered - base) / (1.0 - target);
    Some((needed - 1e-9).ceil().max(0.0) as u32)
}
