use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// Connection parameters for the warehouse SQL endpoint. All fields are
/// required; validation reports the first missing one by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseSettings {
    pub account: String,
    pub user: String,
    /// Programmatic access token, sent as a bearer credential.
    pub password: String,
    pub role: String,
    pub warehouse: String,
    pub database: String,
    pub schema: String,
}

impl WarehouseSettings {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("warehouse.account", &self.account),
            ("warehouse.user", &self.user),
            ("warehouse.password", &self.password),
            ("warehouse.role", &self.role),
            ("warehouse.warehouse", &self.warehouse),
            ("warehouse.database", &self.database),
            ("warehouse.schema", &self.schema),
        ] {
            if value.trim().is_empty() {
                return Err(anyhow!("missing required config field: {name}"));
            }
        }
        Ok(())
    }

    pub fn base_url(&self) -> String {
        format!("https://{}.snowflakecomputing.com", self.account.to_lowercase())
    }
}

/// Read-only SQL-over-HTTP client for the warehouse statements endpoint.
#[derive(Debug, Clone)]
pub struct WarehouseClient {
    client: reqwest::Client,
    settings: WarehouseSettings,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct StatementRequest<'a> {
    statement: &'a str,
    database: &'a str,
    schema: &'a str,
    warehouse: &'a str,
    role: &'a str,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    bindings: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct StatementResponse {
    #[serde(rename = "resultSetMetaData", default)]
    meta: StatementMeta,
    #[serde(default)]
    data: Vec<Vec<Option<String>>>,
}

#[derive(Debug, Default, Deserialize)]
struct StatementMeta {
    #[serde(rename = "rowType", default)]
    row_type: Vec<StatementColumn>,
}

#[derive(Debug, Deserialize)]
struct StatementColumn {
    name: String,
}

#[derive(Debug, Deserialize)]
struct StatementError {
    #[serde(default)]
    message: String,
}

/// A decoded tabular result: column names plus positional string rows.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl QueryResult {
    fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .ok_or_else(|| anyhow!("column not in result set: {name}"))
    }

    pub fn get<'a>(&self, row: &'a [Option<String>], name: &str) -> Result<&'a str> {
        let idx = self.column_index(name)?;
        row.get(idx)
            .and_then(|v| v.as_deref())
            .ok_or_else(|| anyhow!("null value in column {name}"))
    }

    pub fn get_opt<'a>(&self, row: &'a [Option<String>], name: &str) -> Option<&'a str> {
        let idx = self.column_index(name).ok()?;
        row.get(idx).and_then(|v| v.as_deref())
    }

    pub fn get_i64(&self, row: &[Option<String>], name: &str) -> Result<i64> {
        let raw = self.get(row, name)?;
        // Counts can come back with a fractional part from aggregate views.
        if let Ok(n) = raw.parse::<i64>() {
            return Ok(n);
        }
        raw.parse::<f64>()
            .map(|f| f.round() as i64)
            .with_context(|| format!("column {name} is not numeric: {raw}"))
    }

    pub fn get_f64(&self, row: &[Option<String>], name: &str) -> Result<f64> {
        let raw = self.get(row, name)?;
        raw.parse::<f64>()
            .with_context(|| format!("column {name} is not numeric: {raw}"))
    }

    /// Dates arrive either in ISO form or as days since the Unix epoch,
    /// depending on the result serialization the endpoint picked.
    pub fn get_date(&self, row: &[Option<String>], name: &str) -> Result<NaiveDate> {
        let raw = self.get(row, name)?;
        if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            return Ok(date);
        }
        let epoch_days: i64 = raw
            .parse()
            .with_context(|| format!("column {name} is not a date: {raw}"))?;
        NaiveDate::from_num_days_from_ce_opt(719_163 + epoch_days as i32)
            .ok_or_else(|| anyhow!("column {name} is out of date range: {raw}"))
    }
}

impl WarehouseClient {
    pub fn new(settings: WarehouseSettings) -> Result<Self> {
        let base_url = settings.base_url();
        Self::with_base_url(settings, base_url)
    }

    /// Point the client at an explicit endpoint (tests).
    pub fn with_base_url(settings: WarehouseSettings, base_url: impl Into<String>) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            settings,
        })
    }

    pub fn settings(&self) -> &WarehouseSettings {
        &self.settings
    }

    /// Run one read-only statement. Positional bindings are passed as text.
    pub async fn query(&self, statement: &str, bindings: &[&str]) -> Result<QueryResult> {
        let url = format!("{}/api/v2/statements", self.base_url);

        let mut bound = serde_json::Map::new();
        for (i, value) in bindings.iter().enumerate() {
            bound.insert(
                (i + 1).to_string(),
                serde_json::json!({ "type": "TEXT", "value": value }),
            );
        }

        let payload = StatementRequest {
            statement,
            database: &self.settings.database,
            schema: &self.settings.schema,
            warehouse: &self.settings.warehouse,
            role: &self.settings.role,
            bindings: bound,
        };

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.settings.password)
            .header("content-type", "application/json")
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("warehouse request failed: {url}"))?;

        let status = resp.status();
        if status != StatusCode::OK {
            let text = resp.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<StatementError>(&text)
                .map(|e| e.message)
                .unwrap_or(text);
            return Err(anyhow!("warehouse statement failed ({status}): {detail}"));
        }

        let body: StatementResponse = resp
            .json()
            .await
            .context("warehouse response was not valid json")?;

        Ok(QueryResult {
            columns: body.meta.row_type.into_iter().map(|c| c.name).collect(),
            rows: body.data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> WarehouseSettings {
        WarehouseSettings {
            account: "ORG-ACCT".into(),
            user: "svc_dashboard".into(),
            password: "pat-token".into(),
            role: "ANALYST".into(),
            warehouse: "WH_XS".into(),
            database: "CLINICAL".into(),
            schema: "COMBINED".into(),
        }
    }

    fn result(columns: &[&str], rows: Vec<Vec<Option<String>>>) -> QueryResult {
        QueryResult {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        }
    }

    #[test]
    fn validate_reports_missing_field_by_name() {
        let mut s = settings();
        s.role = "  ".into();
        let err = s.validate().err().unwrap();
        assert!(err.to_string().contains("warehouse.role"));
    }

    #[test]
    fn base_url_lowercases_account() {
        assert_eq!(
            settings().base_url(),
            "https://org-acct.snowflakecomputing.com"
        );
    }

    #[test]
    fn column_lookup_is_case_insensitive() {
        let result = result(&["STUDY_ID"], vec![vec![Some("S1".into())]]);
        let row = &result.rows[0];
        assert_eq!(result.get(row, "study_id").unwrap(), "S1");
    }

    #[test]
    fn get_reports_null_and_missing_columns() {
        let result = result(&["A"], vec![vec![None]]);
        let row = &result.rows[0];
        assert!(result.get(row, "A").unwrap_err().to_string().contains("null"));
        assert!(result
            .get(row, "B")
            .unwrap_err()
            .to_string()
            .contains("column not in result set"));
        assert_eq!(result.get_opt(row, "A"), None);
    }

    #[test]
    fn numeric_decoding_accepts_fractions() {
        let result = result(&["N", "PCT"], vec![vec![Some("42.0".into()), Some("87.5".into())]]);
        let row = &result.rows[0];
        assert_eq!(result.get_i64(row, "N").unwrap(), 42);
        assert!((result.get_f64(row, "PCT").unwrap() - 87.5).abs() < 1e-9);
    }

    #[test]
    fn date_decoding_accepts_iso_and_epoch_days() {
        let result = result(
            &["D1", "D2"],
            vec![vec![Some("2025-03-01".into()), Some("0".into())]],
        );
        let row = &result.rows[0];
        assert_eq!(
            result.get_date(row, "D1").unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
        );
        assert_eq!(
            result.get_date(row, "D2").unwrap(),
            NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()
        );
    }
}
