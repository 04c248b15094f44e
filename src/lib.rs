use thiserror::Error;


pub mod critical;
pub mod export;
pub mod model;
pub mod pipeline;
pub mod tokenizer;

pub use critical::{CriticalAlert, CriticalRange, ThresholdTable};
pub use export::{DestinationFormat, ExportedRecord, Exporter};
pub use model::{LabMessage, Observation, Order, Patient};
pub use pipeline::{Outcome, Pipeline, Statistics};
pub use tokenizer::{Delimiters, Segment, TokenizedMessage};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Empty message")]
    EmptyInput,

    #[error("Malformed MSH header: {0}")]
    MalformedHeader(String),

    #[error("Required segment {name} not found")]
    MissingRequiredSegment { name: &'static str },
}

/// Parse a raw HL7 ORU message into the internal message model.
pub fn parse(input: &str) -> Result<LabMessage, ParseError> {
    let tokens = tokenizer::tokenize(input)?;
    model::build(&tokens)
}

/// Check a single observation against a critical threshold table.
pub fn evaluate(observation: &Observation, thresholds: &ThresholdTable) -> bool {
    thresholds.is_critical(observation)
}

/// Transform a parsed message into a destination-specific record.
pub fn export(message: &LabMessage, destination: DestinationFormat) -> ExportedRecord {
    destination.exporter().export(message)
}
