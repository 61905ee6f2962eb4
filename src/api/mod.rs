//! Techem analytics query documents and response types.

pub mod kpi;
pub mod tenant_table;

// Re-export commonly used types
pub use kpi::{KpiInput, KpiSnapshot, Meter, Room};
pub use tenant_table::{ConsumptionRow, PeriodKind, Quantity, TenantTableInput};
