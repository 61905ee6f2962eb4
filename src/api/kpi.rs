//! Unit quantity KPI query: heat consumption broken down by room and meter.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::ApiError;
use crate::graphql::GraphQlRequest;

pub const KPI_QUERY: &str = r#"
    query UnitQuantityKPIs($input: UnitQuantityKPIsInput!) {
        unitQuantityKpis(input: $input) {
            total
            previousPeriod
            previousYear
            propertyComparison
            rooms {
                label
                value
            }
            meters {
                object {
                    id
                    group {
                        id
                        quantity
                        meter {
                            id
                            number
                            roomName
                        }
                    }
                }
                value
            }
        }
    }
"#;

const OPERATION_NAME: &str = "UnitQuantityKPIs";

/// Heat-cost-allocation units.
pub const HCA_QUANTITY: &str = "hca";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Variables of the KPI query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiInput {
    pub object_id: String,
    pub quantity: &'static str,
    pub period_begin: String,
    pub period_end: String,
}

impl KpiInput {
    /// `today - days_back` up to yesterday.
    pub fn last_days(
        object_id: &str,
        today: NaiveDate,
        days_back: u32,
    ) -> Result<Self, ApiError> {
        let begin = today
            .checked_sub_days(Days::new(u64::from(days_back)))
            .ok_or(ApiError::DateOutOfRange(days_back))?;
        let end = today
            .checked_sub_days(Days::new(1))
            .ok_or(ApiError::DateOutOfRange(1))?;

        Ok(Self {
            object_id: object_id.to_string(),
            quantity: HCA_QUANTITY,
            period_begin: begin.format(DATE_FORMAT).to_string(),
            period_end: end.format(DATE_FORMAT).to_string(),
        })
    }

    pub fn to_request(&self) -> GraphQlRequest {
        GraphQlRequest::new(KPI_QUERY, json!({ "input": self })).operation(OPERATION_NAME)
    }
}

/// Per-room consumption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub label: String,
    pub value: Option<f64>,
}

/// Per-meter consumption, flattened from the nested wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "WireMeter")]
pub struct Meter {
    pub id: Option<String>,
    pub meter_number: Option<String>,
    pub room_name: Option<String>,
    pub quantity: Option<String>,
    pub value: Option<f64>,
}

/// KPI breakdown for one unit over one period.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiSnapshot {
    pub total: Option<f64>,
    pub previous_period: Option<f64>,
    pub previous_year: Option<f64>,
    pub property_comparison: Option<f64>,
    #[serde(default)]
    pub rooms: Vec<Room>,
    #[serde(default)]
    pub meters: Vec<Meter>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct KpiData {
    pub unit_quantity_kpis: Option<KpiSnapshot>,
}

#[derive(Debug, Deserialize)]
struct WireMeter {
    object: Option<WireMeterObject>,
    value: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct WireMeterObject {
    group: Option<WireMeterGroup>,
}

#[derive(Debug, Deserialize)]
struct WireMeterGroup {
    quantity: Option<String>,
    meter: Option<WireMeterDevice>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMeterDevice {
    id: Option<String>,
    number: Option<String>,
    room_name: Option<String>,
}

impl From<WireMeter> for Meter {
    fn from(wire: WireMeter) -> Self {
        let group = wire.object.and_then(|o| o.group);
        let quantity = group.as_ref().and_then(|g| g.quantity.clone());
        let device = group.and_then(|g| g.meter);

        Meter {
            id: device.as_ref().and_then(|d| d.id.clone()),
            meter_number: device.as_ref().and_then(|d| d.number.clone()),
            room_name: device.and_then(|d| d.room_name),
            quantity,
            value: wire.value,
        }
    }
}
