use serde::{Deserialize, Serialize};

use crate::ParseError;

/// HL7 message delimiters, declared by the MSH segment itself
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delimiters {
    pub field: char,
    pub component: char,
    pub repetition: char,
    pub escape: char,
    pub subcomponent: char,
}

impl Default for Delimiters {
    fn default() -> Self {
        Self {
            field: '|',
            component: '^',
            repetition: '~',
            escape: '\\',
            subcomponent: '&',
        }
    }
}

impl Delimiters {
    /// Read the delimiter set declared at the front of the MSH segment:
    /// the character after "MSH" is the field separator, the next four
    /// (MSH-2) are component, repetition, escape, and sub-component.
    pub fn from_msh(line: &str) -> Result<Self, ParseError> {
        let mut chars = line.chars();
        for expected in ['M', 'S', 'H'] {
            if chars.next() != Some(expected) {
                return Err(ParseError::MalformedHeader(
                    "first segment must be MSH".to_string(),
                ));
            }
        }

        let field = chars.next().ok_or_else(|| {
            ParseError::MalformedHeader("missing field separator".to_string())
        })?;

        let encoding: Vec<char> = chars.take_while(|&c| c != field).collect();
        if encoding.len() < 4 {
            return Err(ParseError::MalformedHeader(format!(
                "expected 4 encoding characters, found {}",
                encoding.len()
            )));
        }

        Ok(Self {
            field,
            component: encoding[0],
            repetition: encoding[1],
            escape: encoding[2],
            subcomponent: encoding[3],
        })
    }
}

/// A single field as it appeared on the wire.
///
/// Only segment- and field-level splitting happens up front; components,
/// repetitions, and sub-components are split on demand because segment
/// types differ in how deep they are addressed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field(String);

impl Field {
    pub fn raw(&self) -> &str {
        &self.0
    }

    pub fn is_present(&self) -> bool {
        !self.0.trim().is_empty()
    }

    /// Repetitions of this field, in wire order
    pub fn repetitions<'a>(&'a self, delimiters: &Delimiters) -> Vec<&'a str> {
        self.0.split(delimiters.repetition).collect()
    }

    /// Components of the first repetition, in wire order
    pub fn components<'a>(&'a self, delimiters: &Delimiters) -> Vec<&'a str> {
        let first = self.0.split(delimiters.repetition).next().unwrap_or("");
        first.split(delimiters.component).collect()
    }

    /// A single component, 1-based. Absent and empty components both read
    /// as `None`.
    pub fn component<'a>(&'a self, n: usize, delimiters: &Delimiters) -> Option<&'a str> {
        if n == 0 {
            return None;
        }
        self.components(delimiters)
            .get(n - 1)
            .copied()
            .filter(|c| !c.trim().is_empty())
    }

    /// Sub-components of a component, 1-based component index
    pub fn subcomponents<'a>(&'a self, n: usize, delimiters: &Delimiters) -> Vec<&'a str> {
        match self.component(n, delimiters) {
            Some(component) => component.split(delimiters.subcomponent).collect(),
            None => Vec::new(),
        }
    }
}

/// One segment of the message: a 3-letter type id plus its fields
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub id: String,
    fields: Vec<Field>,
}

impl Segment {
    /// Field access by HL7 position, 1-based. Trailing fields that were
    /// never sent are absent (`None`), not empty strings.
    pub fn field(&self, n: usize) -> Option<&Field> {
        if n == 0 {
            return None;
        }
        self.fields.get(n - 1)
    }
}

/// A tokenized message: the declared delimiter set plus the segment
/// sequence in wire order
#[derive(Debug, Clone)]
pub struct TokenizedMessage {
    pub delimiters: Delimiters,
    pub segments: Vec<Segment>,
}

/// Split raw message text into segments and fields.
///
/// Pure function of its input: the delimiter set comes from the MSH
/// segment, which must come first.
pub fn tokenize(input: &str) -> Result<TokenizedMessage, ParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ParseError::EmptyInput);
    }

    // Segment terminators vary by sender: \r per the standard, but \n and
    // \r\n show up in practice
    let lines: Vec<&str> = trimmed
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    let first = lines.first().ok_or(ParseError::EmptyInput)?;
    let delimiters = Delimiters::from_msh(first)?;

    let segments = lines
        .iter()
        .map(|line| tokenize_segment(line, &delimiters))
        .collect();

    Ok(TokenizedMessage {
        delimiters,
        segments,
    })
}

fn tokenize_segment(line: &str, delimiters: &Delimiters) -> Segment {
    let parts: Vec<&str> = line.split(delimiters.field).collect();
    let id = parts.first().copied().unwrap_or("").to_string();

    let mut fields: Vec<Field> = Vec::with_capacity(parts.len());
    if id == "MSH" {
        // MSH-1 is the field separator itself, so the encoding characters
        // that follow land at MSH-2 and numbering stays 1-based like any
        // other segment
        fields.push(Field(delimiters.field.to_string()));
    }
    fields.extend(parts.iter().skip(1).map(|p| Field((*p).to_string())));

    Segment { id, fields }
}
