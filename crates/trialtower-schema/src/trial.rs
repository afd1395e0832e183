use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Enrollment health of a single trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrialStatus {
    #[serde(rename = "On Track")]
    OnTrack,
    #[serde(rename = "At Risk")]
    AtRisk,
    #[serde(rename = "Off Track")]
    OffTrack,
}

impl TrialStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnTrack => "On Track",
            Self::AtRisk => "At Risk",
            Self::OffTrack => "Off Track",
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim() {
            "On Track" => Ok(Self::OnTrack),
            "At Risk" => Ok(Self::AtRisk),
            "Off Track" => Ok(Self::OffTrack),
            other => Err(anyhow!("unknown trial status: {other}")),
        }
    }
}

/// One row of the trial performance view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialSummary {
    pub study_id: String,
    pub drug_name: String,
    pub study_name: String,
    pub status: TrialStatus,
    pub phase: String,
    pub start_date: NaiveDate,
    pub forecast_completion_date: NaiveDate,
    /// Subjects that should have been enrolled by today per the plan.
    pub planned_enrollment: i64,
    /// Ultimate enrollment target.
    pub planned_enrollment_total: i64,
    pub actual_enrollment: i64,
    /// Actual over planned-to-date, as a percentage.
    pub attainment_percent: f64,
    pub projected_delay_weeks: i64,
}

/// One enrollment increment for a single trial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentPoint {
    pub date: NaiveDate,
    pub planned: i64,
    pub actual: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CumulativePoint {
    pub date: NaiveDate,
    pub planned_cumulative: i64,
    pub actual_cumulative: i64,
}

/// Sort increments by date and accumulate planned/actual running totals.
pub fn build_cumulative(mut points: Vec<EnrollmentPoint>) -> Vec<CumulativePoint> {
    points.sort_by_key(|p| p.date);
    let mut planned = 0;
    let mut actual = 0;
    points
        .into_iter()
        .map(|p| {
            planned += p.planned;
            actual += p.actual;
            CumulativePoint {
                date: p.date,
                planned_cumulative: planned,
                actual_cumulative: actual,
            }
        })
        .collect()
}

/// Portfolio-level rollup across all trials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub total_trials: usize,
    pub total_enrolled: i64,
    pub on_track: usize,
    pub at_risk: usize,
    pub off_track: usize,
}

impl PortfolioSummary {
    pub fn from_trials(trials: &[TrialSummary]) -> Self {
        let mut summary = Self {
            total_trials: trials.len(),
            total_enrolled: trials.iter().map(|t| t.actual_enrollment).sum(),
            on_track: 0,
            at_risk: 0,
            off_track: 0,
        };
        for trial in trials {
            match trial.status {
                TrialStatus::OnTrack => summary.on_track += 1,
                TrialStatus::AtRisk => summary.at_risk += 1,
                TrialStatus::OffTrack => summary.off_track += 1,
            }
        }
        summary
    }
}

/// Derived enrollment metrics for one trial's detail view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrollmentMetrics {
    pub planned_to_date: i64,
    pub actual_enrolled: i64,
    pub total_target: i64,
    pub remaining_to_target: i64,
    pub overall_completion_percent: f64,
    /// Average subjects/month over the most recent (up to 3) elapsed increments.
    pub avg_monthly_recent: Option<f64>,
    pub est_months_to_complete: Option<f64>,
}

impl EnrollmentMetrics {
    pub fn compute(summary: &TrialSummary, points: &[EnrollmentPoint], as_of: NaiveDate) -> Self {
        let remaining = summary.planned_enrollment_total - summary.actual_enrollment;
        let overall = if summary.planned_enrollment_total > 0 {
            summary.actual_enrollment as f64 / summary.planned_enrollment_total as f64 * 100.0
        } else {
            0.0
        };

        let mut elapsed: Vec<&EnrollmentPoint> =
            points.iter().filter(|p| p.date <= as_of).collect();
        elapsed.sort_by_key(|p| p.date);

        let (avg_monthly, est_months) = if elapsed.len() > 1 {
            let window = elapsed.len().min(3);
            let recent: i64 = elapsed[elapsed.len() - window..]
                .iter()
                .map(|p| p.actual)
                .sum();
            let avg = recent as f64 / window as f64;
            let est = if avg > 0.0 {
                Some(remaining as f64 / avg)
            } else {
                None
            };
            (Some(avg), est)
        } else {
            (None, None)
        };

        Self {
            planned_to_date: summary.planned_enrollment,
            actual_enrolled: summary.actual_enrollment,
            total_target: summary.planned_enrollment_total,
            remaining_to_target: remaining,
            overall_completion_percent: overall,
            avg_monthly_recent: avg_monthly,
            est_months_to_complete: est_months,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentTool {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Tools and example questions advertised by the remote agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub tools: Vec<AgentTool>,
    pub examples: Vec<String>,
}

impl AgentInfo {
    /// Extract tool names/descriptions and sample questions from an agent
    /// spec document. Tolerates missing sections.
    pub fn from_spec(spec: &serde_json::Value) -> Self {
        let mut info = Self::default();

        if let Some(tools) = spec.get("tools").and_then(|t| t.as_array()) {
            for tool in tools {
                let Some(tool_spec) = tool.get("tool_spec") else {
                    continue;
                };
                let name = tool_spec
                    .get("name")
                    .and_then(|n| n.as_str())
                    .unwrap_or_default();
                if name.is_empty() {
                    continue;
                }
                info.tools.push(AgentTool {
                    name: name.to_string(),
                    description: tool_spec
                        .get("description")
                        .and_then(|d| d.as_str())
                        .unwrap_or_default()
                        .to_string(),
                });
            }
        }

        if let Some(questions) = spec
            .get("instructions")
            .and_then(|i| i.get("sample_questions"))
            .and_then(|q| q.as_array())
        {
            for question in questions {
                match question {
                    serde_json::Value::String(s) => info.examples.push(s.clone()),
                    serde_json::Value::Object(map) => {
                        if let Some(text) = map.get("question").and_then(|q| q.as_str()) {
                            info.examples.push(text.to_string());
                        }
                    }
                    _ => {}
                }
            }
        }

        info
    }
}
