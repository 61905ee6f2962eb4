//! Dashboard readings derived from fetched rows and KPI snapshots.

use serde::{Deserialize, Serialize};

use crate::api::{ConsumptionRow, KpiSnapshot, PeriodKind, Quantity};
use crate::metrics::{daily_average, percent_change, round_for_kind, Kind};

/// Unit of a published reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    #[serde(rename = "kWh")]
    KilowattHour,
    #[serde(rename = "m³")]
    CubicMeter,
    #[serde(rename = "%")]
    Percent,
    #[serde(rename = "HCA")]
    HeatCostUnit,
}

impl Unit {
    fn for_quantity(quantity: Quantity) -> Self {
        match quantity {
            Quantity::Energy => Unit::KilowattHour,
            Quantity::Water => Unit::CubicMeter,
        }
    }
}

/// One named value for the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub unique_id: String,
    pub name: String,
    pub unit: Unit,
    /// `None` when the provider had no value
    pub value: Option<f64>,
    /// Comparison-period value, for totals
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparison: Option<f64>,
}

const QUANTITIES: [Quantity; 2] = [Quantity::Energy, Quantity::Water];

fn title(quantity: Quantity) -> &'static str {
    match quantity {
        Quantity::Energy => "Energy",
        Quantity::Water => "Water",
    }
}

/// Readings for a yearly or weekly tenant-table row.
pub fn period_readings(
    object_id: &str,
    period: PeriodKind,
    row: &ConsumptionRow,
) -> Vec<Reading> {
    let mut readings = Vec::new();

    for quantity in QUANTITIES {
        let kind = quantity.kind();
        let current = row.current(quantity);
        let (total_label, comparison_label) = match period {
            PeriodKind::Yearly => ("This Year", "Compared to Last Year"),
            PeriodKind::Weekly => ("This Week", "Compared to Previous Week"),
        };

        readings.push(Reading {
            unique_id: format!("techem_{}_{}_{}", object_id, quantity.as_str(), period.as_str()),
            name: format!("Techem {} {}", title(quantity), total_label),
            unit: Unit::for_quantity(quantity),
            value: current.map(|v| round_for_kind(v, kind)),
            comparison: row.comparison(quantity).map(|v| round_for_kind(v, kind)),
        });

        if period == PeriodKind::Weekly {
            readings.push(Reading {
                unique_id: format!("techem_{}_{}_daily_average", object_id, quantity.as_str()),
                name: format!("Techem {} Daily Average Last 7 Days", title(quantity)),
                unit: Unit::for_quantity(quantity),
                value: current.map(|v| daily_average(v, kind)),
                comparison: None,
            });
        }

        readings.push(Reading {
            unique_id: format!(
                "techem_{}_{}_comparison_{}",
                object_id,
                quantity.as_str(),
                period.as_str()
            ),
            name: format!("Techem {} {}", title(quantity), comparison_label),
            unit: Unit::Percent,
            value: current.and_then(|v| percent_change(v, row.comparison(quantity))),
            comparison: None,
        });
    }

    readings
}

/// Readings for a KPI snapshot covering the last `days_back` days: totals,
/// comparisons, rooms and meters.
pub fn kpi_readings(object_id: &str, days_back: u32, snapshot: &KpiSnapshot) -> Vec<Reading> {
    let heat = |v: f64| round_for_kind(v, Kind::Heat);
    let compared =
        |reference: Option<f64>| snapshot.total.and_then(|t| percent_change(t, reference));

    let mut readings = vec![
        Reading {
            unique_id: format!("techem_{}_heat_total", object_id),
            name: format!("Techem Heat Last {} Days", days_back),
            unit: Unit::HeatCostUnit,
            value: snapshot.total.map(heat),
            comparison: snapshot.previous_period.map(heat),
        },
        Reading {
            unique_id: format!("techem_{}_heat_comparison_previous_period", object_id),
            name: "Techem Heat Compared to Previous Period".to_string(),
            unit: Unit::Percent,
            value: compared(snapshot.previous_period),
            comparison: None,
        },
        Reading {
            unique_id: format!("techem_{}_heat_comparison_previous_year", object_id),
            name: "Techem Heat Compared to Last Year".to_string(),
            unit: Unit::Percent,
            value: compared(snapshot.previous_year),
            comparison: None,
        },
        Reading {
            unique_id: format!("techem_{}_heat_comparison_property", object_id),
            name: "Techem Heat Compared to Property".to_string(),
            unit: Unit::Percent,
            value: compared(snapshot.property_comparison),
            comparison: None,
        },
    ];

    readings.extend(snapshot.rooms.iter().enumerate().map(|(i, room)| Reading {
        unique_id: format!("techem_{}_heat_room_{}", object_id, i),
        name: format!("Techem Heat Room {}", room.label),
        unit: Unit::HeatCostUnit,
        value: room.value.map(heat),
        comparison: None,
    }));

    readings.extend(snapshot.meters.iter().enumerate().map(|(i, meter)| {
        let number = meter
            .meter_number
            .clone()
            .unwrap_or_else(|| format!("unknown_{}", i));
        let name = match &meter.room_name {
            Some(room) => format!("Techem Heat Meter {} ({})", number, room),
            None => format!("Techem Heat Meter {}", number),
        };

        // meter numbers are not unique across a unit
        let key = match &meter.id {
            Some(id) => id.clone(),
            None => format!("{}_{}", number, i),
        };

        Reading {
            unique_id: format!("techem_{}_heat_meter_{}", object_id, key),
            name,
            unit: Unit::HeatCostUnit,
            value: meter.value.map(heat),
            comparison: None,
        }
    }));

    readings
}
