//! Tenant-table query: aggregated energy and water consumption for one unit.

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::ApiError;
use crate::graphql::GraphQlRequest;
use crate::metrics::Kind;

pub const TENANT_TABLE_QUERY: &str = r#"
    query TenantTable($table: TenantTableInput!) {
        tenantTable(table: $table) {
            rows { values comparisonValues }
        }
    }
"#;

const OPERATION_NAME: &str = "TenantTable";

/// Timestamp layout expected by `periodBegin` / `periodEnd`.
const PERIOD_FORMAT: &str = "%Y-%m-%dT00:00:00";

/// Period covered by a tenant-table fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodKind {
    /// January 1st up to `today - offset`, compared with the previous year
    Yearly,
    /// The seven days ending `today - offset`, compared with the previous period
    Weekly,
}

impl PeriodKind {
    fn compare_with(self) -> &'static str {
        match self {
            PeriodKind::Yearly => "previous-year",
            PeriodKind::Weekly => "previous-period",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PeriodKind::Yearly => "yearly",
            PeriodKind::Weekly => "weekly",
        }
    }
}

/// Column of a consumption row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    Energy,
    Water,
}

impl Quantity {
    /// Position in `values` / `comparisonValues`.
    pub fn index(self) -> usize {
        match self {
            Quantity::Energy => 0,
            Quantity::Water => 1,
        }
    }

    pub fn kind(self) -> Kind {
        match self {
            Quantity::Energy => Kind::Energy,
            Quantity::Water => Kind::Water,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Quantity::Energy => "energy",
            Quantity::Water => "water",
        }
    }
}

/// Variables of the tenant-table query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantTableInput {
    pub aggregation_level: &'static str,
    pub object_id: String,
    pub period_begin: String,
    pub period_end: String,
    pub compare_with: &'static str,
}

impl TenantTableInput {
    /// Build the variables for `kind` as seen on `today`.
    ///
    /// # Errors
    /// Returns `ApiError::DateOutOfRange` if `day_offset` reaches past the
    /// calendar's lower bound.
    pub fn for_period(
        kind: PeriodKind,
        object_id: &str,
        today: NaiveDate,
        day_offset: u32,
    ) -> Result<Self, ApiError> {
        let days_before = |days: u64| {
            today
                .checked_sub_days(Days::new(days))
                .ok_or(ApiError::DateOutOfRange(day_offset))
        };

        let end = days_before(u64::from(day_offset))?;
        let begin = match kind {
            PeriodKind::Yearly => NaiveDate::from_yo_opt(today.year(), 1).unwrap_or(today),
            PeriodKind::Weekly => days_before(u64::from(day_offset) + 7)?,
        };

        Ok(Self {
            aggregation_level: "UNIT",
            object_id: object_id.to_string(),
            period_begin: begin.format(PERIOD_FORMAT).to_string(),
            period_end: end.format(PERIOD_FORMAT).to_string(),
            compare_with: kind.compare_with(),
        })
    }

    pub fn to_request(&self) -> GraphQlRequest {
        GraphQlRequest::new(TENANT_TABLE_QUERY, json!({ "table": self })).operation(OPERATION_NAME)
    }
}

/// One tenant-table row. Index 0 is energy (kWh), index 1 is water (m³).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionRow {
    #[serde(default)]
    pub values: Vec<Option<f64>>,
    #[serde(default)]
    pub comparison_values: Vec<Option<f64>>,
}

impl ConsumptionRow {
    /// Current-period value for `quantity`.
    pub fn current(&self, quantity: Quantity) -> Option<f64> {
        self.values.get(quantity.index()).copied().flatten()
    }

    /// Comparison-period value for `quantity`.
    pub fn comparison(&self, quantity: Quantity) -> Option<f64> {
        self.comparison_values
            .get(quantity.index())
            .copied()
            .flatten()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TenantTableData {
    pub tenant_table: Option<TenantTable>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TenantTable {
    #[serde(default)]
    pub rows: Vec<ConsumptionRow>,
}

impl TenantTableData {
    /// First row; later rows are ignored.
    pub fn first_row(self) -> Option<ConsumptionRow> {
        self.tenant_table?.rows.into_iter().next()
    }
}
