use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::tokenizer::{Delimiters, Segment, TokenizedMessage};
use crate::ParseError;

/// A parsed ORU message: header fields, patient identity, and orders
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabMessage {
    pub message_id: String,
    pub sending_facility: String,
    pub receiving_facility: String,
    pub message_datetime: NaiveDateTime,
    pub patient: Patient,
    pub orders: Vec<Order>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub panel_name: String,
    pub observations: Vec<Observation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub test_code: String,
    pub test_name: String,
    pub value: String,
    pub unit: String,
    pub reference_range: String,
    pub abnormal_flag: String,
    pub result_status: String,
    pub observed_at: NaiveDateTime,
    /// Set once by the critical value evaluator, after parsing
    pub is_critical: bool,
}

/// Assemble the message model from a tokenized segment sequence.
///
/// MSH and PID are the only required segments; every other field access
/// degrades to a declared default instead of failing the message.
pub fn build(tokens: &TokenizedMessage) -> Result<LabMessage, ParseError> {
    let delimiters = &tokens.delimiters;
    let msh = require_segment(tokens, "MSH")?;
    let pid = require_segment(tokens, "PID")?;

    Ok(LabMessage {
        message_id: field_text(msh, 10, "Unknown"),
        sending_facility: field_text(msh, 4, "Unknown"),
        receiving_facility: field_text(msh, 6, "Unknown"),
        message_datetime: parse_hl7_datetime(msh.field(7).map(|f| f.raw())),
        patient: Patient {
            id: extract_patient_id(pid, delimiters),
            name: extract_patient_name(pid, delimiters),
        },
        orders: collect_orders(tokens),
    })
}

fn require_segment<'a>(
    tokens: &'a TokenizedMessage,
    name: &'static str,
) -> Result<&'a Segment, ParseError> {
    tokens
        .segments
        .iter()
        .find(|s| s.id == name)
        .ok_or(ParseError::MissingRequiredSegment { name })
}

/// Raw text of a field, or the caller's default when absent or empty
fn field_text(segment: &Segment, n: usize, default: &str) -> String {
    match segment.field(n) {
        Some(field) if field.is_present() => field.raw().to_string(),
        _ => {
            debug!("{}-{} absent, defaulting to {:?}", segment.id, n, default);
            default.to_string()
        }
    }
}

/// Text of a single component, or the caller's default when absent
fn component_text(
    segment: &Segment,
    n: usize,
    c: usize,
    delimiters: &Delimiters,
    default: &str,
) -> String {
    match segment.field(n).and_then(|f| f.component(c, delimiters)) {
        Some(text) => text.to_string(),
        None => {
            debug!(
                "{}-{}.{} absent, defaulting to {:?}",
                segment.id, n, c, default
            );
            default.to_string()
        }
    }
}

fn extract_patient_id(pid: &Segment, delimiters: &Delimiters) -> String {
    if let Some(id) = pid.field(3).and_then(|f| f.component(1, delimiters)) {
        return id.to_string();
    }

    // Fall back to the alternate identifier slot
    match pid.field(2) {
        Some(field) if field.is_present() => field.raw().to_string(),
        _ => {
            debug!("PID-3 and PID-2 both absent, patient id unknown");
            "Unknown".to_string()
        }
    }
}

fn extract_patient_name(pid: &Segment, delimiters: &Delimiters) -> String {
    let name = pid.field(5);
    // Wire order is family^given^middle; display order is given middle family
    let family = name.and_then(|f| f.component(1, delimiters));
    let given = name.and_then(|f| f.component(2, delimiters));
    let middle = name.and_then(|f| f.component(3, delimiters));

    let parts: Vec<&str> = [given, middle, family].into_iter().flatten().collect();
    if parts.is_empty() {
        "Unknown Patient".to_string()
    } else {
        parts.join(" ")
    }
}

/// Segment types that end the association between an order and the
/// observations that follow it
pub fn terminates_association(segment_id: &str) -> bool {
    matches!(segment_id, "OBR" | "PID" | "MSH")
}

/// Single pass over the segment sequence with an explicit current-order
/// cursor. An OBX belongs to the OBR that most recently preceded it; the
/// next OBR, PID, or MSH segment ends that association.
fn collect_orders(tokens: &TokenizedMessage) -> Vec<Order> {
    let delimiters = &tokens.delimiters;
    let mut orders = Vec::new();
    let mut current: Option<Order> = None;

    for segment in &tokens.segments {
        if terminates_association(&segment.id) {
            if let Some(order) = current.take() {
                orders.push(order);
            }
        }
        match segment.id.as_str() {
            "OBR" => current = Some(order_from_obr(segment, delimiters)),
            "OBX" => match current.as_mut() {
                Some(order) => order
                    .observations
                    .push(observation_from_obx(segment, delimiters)),
                None => debug!("OBX segment outside any order, dropping"),
            },
            _ => {}
        }
    }
    if let Some(order) = current.take() {
        orders.push(order);
    }

    orders
}

fn order_from_obr(obr: &Segment, delimiters: &Delimiters) -> Order {
    // OBR-4 is code^text; prefer the text component
    let panel_name = obr
        .field(4)
        .and_then(|f| f.component(2, delimiters).or_else(|| f.component(1, delimiters)))
        .unwrap_or("Unknown Test")
        .to_string();

    Order {
        order_id: field_text(obr, 2, "Unknown"),
        panel_name,
        observations: Vec::new(),
    }
}

fn observation_from_obx(obx: &Segment, delimiters: &Delimiters) -> Observation {
    let test_code = component_text(obx, 3, 1, delimiters, "Unknown");
    let test_name = component_text(obx, 3, 2, delimiters, &test_code);

    let value_type = field_text(obx, 2, "ST");
    let mut value = field_text(obx, 5, "");
    if value_type == "NM" {
        value = crate::critical::clean_numeric(&value).to_string();
    }

    Observation {
        test_code,
        test_name,
        value,
        unit: component_text(obx, 6, 1, delimiters, ""),
        reference_range: field_text(obx, 7, ""),
        abnormal_flag: field_text(obx, 8, ""),
        result_status: field_text(obx, 11, "F"),
        observed_at: parse_hl7_datetime(obx.field(14).map(|f| f.raw())),
        is_critical: false,
    }
}

const DATETIME_FORMATS: &[(&str, usize)] = &[
    ("%Y%m%d%H%M%S", 14),
    ("%Y%m%d%H%M", 12),
    ("%Y%m%d", 8),
    ("%Y-%m-%d %H:%M:%S", 19),
    ("%Y-%m-%d", 10),
];

/// Parse an HL7 timestamp, trying each supported format in order.
///
/// When no format matches, the current local time is substituted so that a
/// bad timestamp degrades one attribute instead of failing the message.
/// That substitution loses the original observation time; the warning here
/// is the only record of it.
pub fn parse_hl7_datetime(raw: Option<&str>) -> NaiveDateTime {
    let raw = match raw.map(str::trim) {
        Some(s) if !s.is_empty() => s,
        _ => return Local::now().naive_local(),
    };

    for (format, width) in DATETIME_FORMATS {
        // HL7 timestamps carry trailing precision (fractions, offsets) that
        // the patterns do not cover; match on the leading width only
        let candidate = raw.get(..*width).unwrap_or(raw);
        if format.contains("%H") {
            if let Ok(datetime) = NaiveDateTime::parse_from_str(candidate, format) {
                return datetime;
            }
        } else if let Ok(date) = NaiveDate::parse_from_str(candidate, format) {
            return date.and_time(NaiveTime::MIN);
        }
    }

    warn!("Could not parse datetime: {}", raw);
    Local::now().naive_local()
}
