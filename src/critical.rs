use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::model::{LabMessage, Observation};

/// Abnormal flag codes that mark a result critical on their own
const FATAL_FLAGS: [&str; 4] = ["HH", "LL", "H*", "L*"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticalRange {
    pub low: f64,
    pub high: f64,
    pub name: String,
}

/// Mapping from test code to its critical range. Built once at startup,
/// read-only afterwards.
#[derive(Debug, Clone)]
pub struct ThresholdTable {
    ranges: HashMap<String, CriticalRange>,
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self::from_ranges([
            ("GLU", 50.0, 400.0, "Glucose"),
            ("K", 2.5, 6.5, "Potassium"),
            ("NA", 120.0, 160.0, "Sodium"),
            ("HGB", 7.0, 20.0, "Hemoglobin"),
            ("PLT", 50.0, 1000.0, "Platelets"),
            ("WBC", 2.0, 50.0, "White Blood Cells"),
            ("PH", 7.2, 7.6, "pH"),
            ("PCO2", 20.0, 60.0, "pCO2"),
            ("PO2", 60.0, 100.0, "pO2"),
        ])
    }
}

impl ThresholdTable {
    pub fn from_ranges<I, C, N>(ranges: I) -> Self
    where
        I: IntoIterator<Item = (C, f64, f64, N)>,
        C: Into<String>,
        N: Into<String>,
    {
        let ranges = ranges
            .into_iter()
            .map(|(code, low, high, name)| {
                (
                    code.into().to_uppercase(),
                    CriticalRange {
                        low,
                        high,
                        name: name.into(),
                    },
                )
            })
            .collect();
        Self { ranges }
    }

    pub fn get(&self, test_code: &str) -> Option<&CriticalRange> {
        self.ranges.get(&test_code.to_uppercase())
    }

    /// Two-tier critical check: numeric threshold comparison when the test
    /// code has a configured range, abnormal-flag fallback when it does not
    /// or when the result is non-numeric. Comparison is strict, so a value
    /// exactly at a bound is not critical.
    pub fn is_critical(&self, observation: &Observation) -> bool {
        match self.get(&observation.test_code) {
            None => has_fatal_flag(&observation.abnormal_flag),
            Some(range) => match clean_numeric(&observation.value).parse::<f64>() {
                Ok(value) => value < range.low || value > range.high,
                Err(_) => has_fatal_flag(&observation.abnormal_flag),
            },
        }
    }
}

/// Strip comparison operators and whitespace so values like "<2.0"
/// compare numerically
pub fn clean_numeric(value: &str) -> &str {
    value.trim().trim_start_matches(['<', '>']).trim()
}

fn has_fatal_flag(flag: &str) -> bool {
    FATAL_FLAGS.iter().any(|f| flag.eq_ignore_ascii_case(f))
}

/// Diagnostic record produced for each critical observation. Delivery
/// (paging, alert files) is the caller's concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticalAlert {
    pub test_name: String,
    pub value: String,
    pub unit: String,
    pub reference_range: String,
}

impl From<&Observation> for CriticalAlert {
    fn from(observation: &Observation) -> Self {
        Self {
            test_name: observation.test_name.clone(),
            value: observation.value.clone(),
            unit: observation.unit.clone(),
            reference_range: observation.reference_range.clone(),
        }
    }
}

/// Flag every observation in the message and collect alert records for
/// the critical ones. This is the one place `is_critical` is mutated.
pub fn evaluate_message(
    thresholds: &ThresholdTable,
    message: &mut LabMessage,
) -> Vec<CriticalAlert> {
    let mut alerts = Vec::new();
    for order in &mut message.orders {
        for observation in &mut order.observations {
            observation.is_critical = thresholds.is_critical(observation);
            if observation.is_critical {
                warn!(
                    "Critical value for patient {}: {} = {} {} (Ref: {})",
                    message.patient.id,
                    observation.test_name,
                    observation.value,
                    observation.unit,
                    observation.reference_range
                );
                alerts.push(CriticalAlert::from(&*observation));
            }
        }
    }
    alerts
}
