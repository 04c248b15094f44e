use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::model::LabMessage;

/// Downstream EMR schema to export into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationFormat {
    Epic,
    Cerner,
}

impl DestinationFormat {
    /// Exporter implementation for this destination. Adding a destination
    /// means adding a variant and an impl; existing exporters stay untouched.
    pub fn exporter(self) -> &'static dyn Exporter {
        match self {
            DestinationFormat::Epic => &EpicExporter,
            DestinationFormat::Cerner => &CernerExporter,
        }
    }
}

impl FromStr for DestinationFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "epic" => Ok(Self::Epic),
            "cerner" => Ok(Self::Cerner),
            other => Err(format!("unknown destination format: {}", other)),
        }
    }
}

impl fmt::Display for DestinationFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Epic => write!(f, "epic"),
            Self::Cerner => write!(f, "cerner"),
        }
    }
}

/// Destination-specific transformation of the message model.
///
/// Exporters are pure and total: every structurally valid message exports,
/// since all model fields already carry defaults. The two shapes differ in
/// nesting and naming only; the data set transferred is identical.
pub trait Exporter {
    fn export(&self, message: &LabMessage) -> ExportedRecord;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExportedRecord {
    Epic(EpicRecord),
    Cerner(CernerRecord),
}

/// Epic Beaker shape: hierarchical, orders nested, PascalCase names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpicRecord {
    #[serde(rename = "PatientID")]
    pub patient_id: String,
    #[serde(rename = "PatientName")]
    pub patient_name: String,
    #[serde(rename = "MessageID")]
    pub message_id: String,
    #[serde(rename = "Orders")]
    pub orders: Vec<EpicOrder>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpicOrder {
    #[serde(rename = "OrderID")]
    pub order_id: String,
    #[serde(rename = "TestName")]
    pub test_name: String,
    #[serde(rename = "Results")]
    pub results: Vec<EpicResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpicResult {
    #[serde(rename = "ComponentID")]
    pub component_id: String,
    #[serde(rename = "ComponentName")]
    pub component_name: String,
    #[serde(rename = "Value")]
    pub value: String,
    #[serde(rename = "Units")]
    pub units: String,
    #[serde(rename = "ReferenceRange")]
    pub reference_range: String,
    #[serde(rename = "AbnormalFlag")]
    pub abnormal_flag: String,
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "ResultDate")]
    pub result_date: NaiveDateTime,
    #[serde(rename = "IsCritical")]
    pub is_critical: bool,
}

/// Cerner shape: a flat clinical-event list with 0/1 indicator fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CernerRecord {
    pub person_id: String,
    pub person_name: String,
    pub message_id: String,
    pub clinical_events: Vec<CernerEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CernerEvent {
    pub order_id: String,
    pub event_code: String,
    pub event_title: String,
    pub result_val: String,
    pub result_units: String,
    pub normal_range: String,
    pub abnormal_ind: u8,
    pub critical_ind: u8,
    pub result_status: String,
    pub event_end_dt_tm: NaiveDateTime,
}

pub struct EpicExporter;

impl Exporter for EpicExporter {
    fn export(&self, message: &LabMessage) -> ExportedRecord {
        let orders = message
            .orders
            .iter()
            .map(|order| EpicOrder {
                order_id: order.order_id.clone(),
                test_name: order.panel_name.clone(),
                results: order
                    .observations
                    .iter()
                    .map(|obs| EpicResult {
                        component_id: obs.test_code.clone(),
                        component_name: obs.test_name.clone(),
                        value: obs.value.clone(),
                        units: obs.unit.clone(),
                        reference_range: obs.reference_range.clone(),
                        abnormal_flag: obs.abnormal_flag.clone(),
                        status: obs.result_status.clone(),
                        result_date: obs.observed_at,
                        is_critical: obs.is_critical,
                    })
                    .collect(),
            })
            .collect();

        ExportedRecord::Epic(EpicRecord {
            patient_id: message.patient.id.clone(),
            patient_name: message.patient.name.clone(),
            message_id: message.message_id.clone(),
            orders,
        })
    }
}

pub struct CernerExporter;

impl Exporter for CernerExporter {
    fn export(&self, message: &LabMessage) -> ExportedRecord {
        let mut clinical_events = Vec::new();
        for order in &message.orders {
            for obs in &order.observations {
                clinical_events.push(CernerEvent {
                    order_id: order.order_id.clone(),
                    event_code: obs.test_code.clone(),
                    event_title: obs.test_name.clone(),
                    result_val: obs.value.clone(),
                    result_units: obs.unit.clone(),
                    normal_range: obs.reference_range.clone(),
                    abnormal_ind: u8::from(!obs.abnormal_flag.is_empty()),
                    critical_ind: u8::from(obs.is_critical),
                    result_status: obs.result_status.clone(),
                    event_end_dt_tm: obs.observed_at,
                });
            }
        }

        ExportedRecord::Cerner(CernerRecord {
            person_id: message.patient.id.clone(),
            person_name: message.patient.name.clone(),
            message_id: message.message_id.clone(),
            clinical_events,
        })
    }
}
