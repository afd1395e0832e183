use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use trialtower_schema::{AgentInfo, EnrollmentPoint, TrialStatus, TrialSummary};

use crate::cache::TtlCache;
use crate::client::{QueryResult, WarehouseClient};

pub const TRIAL_SUMMARY_TTL: Duration = Duration::from_secs(300);
pub const ENROLLMENT_SERIES_TTL: Duration = Duration::from_secs(300);
pub const AGENT_INFO_TTL: Duration = Duration::from_secs(3600);

const TRIAL_SUMMARY_SQL: &str = "\
SELECT
    study_id,
    product_name AS drug_name,
    study_name,
    trial_status,
    phase,
    enrollment_start_date AS start_date,
    target_enrollment_end_date AS forecast_completion_date,
    planned_enrollment_to_date AS planned_enrollment,
    planned_enrollment_total,
    actual_enrollment_total AS actual_enrollment,
    enrollment_percent_complete AS attainment_percent,
    trial_projected_delay_weeks
FROM vw_trial_performance
ORDER BY study_id";

const ENROLLMENT_SERIES_SQL: &str = "\
SELECT
    date,
    SUM(planned_enrollment) AS planned,
    SUM(actual_enrollment) AS actual
FROM fct_enrollment
WHERE study_id = ?
GROUP BY date
ORDER BY date";

/// The three read-only loaders, each memoized by argument for a fixed
/// window. `invalidate_all` is the manual refresh action and clears every
/// cache at once; there is no partial invalidation.
pub struct Loaders {
    client: WarehouseClient,
    trial_summary: TtlCache<(), Vec<TrialSummary>>,
    enrollment_series: TtlCache<String, Vec<EnrollmentPoint>>,
    agent_info: TtlCache<String, AgentInfo>,
}

impl Loaders {
    pub fn new(client: WarehouseClient) -> Self {
        Self {
            client,
            trial_summary: TtlCache::new(TRIAL_SUMMARY_TTL),
            enrollment_series: TtlCache::new(ENROLLMENT_SERIES_TTL),
            agent_info: TtlCache::new(AGENT_INFO_TTL),
        }
    }

    pub async fn trial_summary(&self) -> Result<Vec<TrialSummary>> {
        if let Some(cached) = self.trial_summary.get(&()) {
            return Ok(cached);
        }
        let result = self
            .client
            .query(TRIAL_SUMMARY_SQL, &[])
            .await
            .context("loading trial summary")?;
        let trials = decode_trial_summaries(&result)?;
        self.trial_summary.insert((), trials.clone());
        Ok(trials)
    }

    pub async fn enrollment_series(&self, study_id: &str) -> Result<Vec<EnrollmentPoint>> {
        let key = study_id.to_string();
        if let Some(cached) = self.enrollment_series.get(&key) {
            return Ok(cached);
        }
        let result = self
            .client
            .query(ENROLLMENT_SERIES_SQL, &[study_id])
            .await
            .with_context(|| format!("loading enrollment series for {study_id}"))?;
        let points = decode_enrollment_points(&result)?;
        self.enrollment_series.insert(key, points.clone());
        Ok(points)
    }

    /// Agent metadata is advisory: failures degrade to an empty result
    /// rather than erroring the caller.
    pub async fn agent_info(&self, agent_name: &str) -> Result<AgentInfo> {
        let key = agent_name.to_string();
        if let Some(cached) = self.agent_info.get(&key) {
            return Ok(cached);
        }
        let info = match self.describe_agent(agent_name).await {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!(agent = agent_name, error = %e, "agent metadata unavailable");
                AgentInfo::default()
            }
        };
        self.agent_info.insert(key, info.clone());
        Ok(info)
    }

    pub fn invalidate_all(&self) {
        self.trial_summary.invalidate_all();
        self.enrollment_series.invalidate_all();
        self.agent_info.invalidate_all();
        tracing::info!("warehouse caches invalidated");
    }

    async fn describe_agent(&self, agent_name: &str) -> Result<AgentInfo> {
        // DESCRIBE does not take bindings, so the identifier is validated
        // before interpolation.
        if agent_name.is_empty()
            || !agent_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(anyhow!("invalid agent identifier: {agent_name}"));
        }
        let result = self
            .client
            .query(&format!("DESCRIBE AGENT {agent_name}"), &[])
            .await?;
        let row = result
            .rows
            .first()
            .ok_or_else(|| anyhow!("DESCRIBE AGENT returned no rows"))?;
        let raw_spec = result.get(row, "agent_spec")?;
        let spec: serde_json::Value =
            serde_json::from_str(raw_spec).context("agent_spec is not valid json")?;
        Ok(AgentInfo::from_spec(&spec))
    }
}

fn decode_trial_summaries(result: &QueryResult) -> Result<Vec<TrialSummary>> {
    result
        .rows
        .iter()
        .map(|row| {
            Ok(TrialSummary {
                study_id: result.get(row, "study_id")?.to_string(),
                drug_name: result.get(row, "drug_name")?.to_string(),
                study_name: result.get_opt(row, "study_name").unwrap_or("").to_string(),
                status: TrialStatus::parse(result.get(row, "trial_status")?)?,
                phase: result.get(row, "phase")?.to_string(),
                start_date: result.get_date(row, "start_date")?,
                forecast_completion_date: result.get_date(row, "forecast_completion_date")?,
                planned_enrollment: result.get_i64(row, "planned_enrollment")?,
                planned_enrollment_total: result.get_i64(row, "planned_enrollment_total")?,
                actual_enrollment: result.get_i64(row, "actual_enrollment")?,
                attainment_percent: result.get_f64(row, "attainment_percent")?,
                projected_delay_weeks: result.get_i64(row, "trial_projected_delay_weeks")?,
            })
        })
        .collect()
}

fn decode_enrollment_points(result: &QueryResult) -> Result<Vec<EnrollmentPoint>> {
    result
        .rows
        .iter()
        .map(|row| {
            Ok(EnrollmentPoint {
                date: result.get_date(row, "date")?,
                planned: result.get_i64(row, "planned")?,
                actual: result.get_i64(row, "actual")?,
            })
        })
        .collect()
}
