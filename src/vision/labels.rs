//! Closed label set and the index → label table for the model's output.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::VisionError;

/// Every subject the classifier can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    Crow,
    Squirrel,
    Magpie,
    Bird,
    Rat,
    Other,
    Unknown,
}

impl Label {
    pub const COUNT: usize = 7;

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Crow => "CROW",
            Self::Squirrel => "SQUIRREL",
            Self::Magpie => "MAGPIE",
            Self::Bird => "BIRD",
            Self::Rat => "RAT",
            Self::Other => "OTHER",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One classifier verdict: a label and the dequantized score of its output.
///
/// The score is whatever the output tensor dequantizes to. It is only a
/// probability when the model ends in a softmax.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: Label,
    pub confidence: f32,
}

impl Classification {
    /// Result reported when no model is loaded.
    pub const UNKNOWN: Self = Self {
        label: Label::Unknown,
        confidence: 0.0,
    };
}

/// Ordered mapping from model output index to [`Label`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTable {
    labels: heapless::Vec<Label, { Label::COUNT }>,
}

impl LabelTable {
    /// Output order the shipped model was trained with.
    pub const DEFAULT_ORDER: [Label; Label::COUNT] = [
        Label::Crow,
        Label::Squirrel,
        Label::Rat,
        Label::Magpie,
        Label::Bird,
        Label::Other,
        Label::Unknown,
    ];

    pub fn new(labels: &[Label]) -> Result<Self, VisionError> {
        if labels.is_empty() {
            return Err(VisionError::ModelInvalid("empty label table"));
        }
        let labels = heapless::Vec::from_slice(labels)
            .map_err(|()| VisionError::ModelInvalid("label table longer than label set"))?;
        Ok(Self { labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Fail fast when the model's output vector and the table disagree.
    pub fn validate_outputs(&self, output_len: usize) -> Result<(), VisionError> {
        if output_len != self.labels.len() {
            log::error!(
                "label table has {} entries but model emits {} scores",
                self.labels.len(),
                output_len
            );
            return Err(VisionError::ModelInvalid("output length does not match label table"));
        }
        Ok(())
    }

    /// Label for an output index; out-of-range indices map to UNKNOWN.
    pub fn label(&self, index: usize) -> Label {
        self.labels.get(index).copied().unwrap_or(Label::Unknown)
    }
}

impl Default for LabelTable {
    fn default() -> Self {
        Self {
            labels: heapless::Vec::from_slice(&Self::DEFAULT_ORDER).unwrap_or_default(),
        }
    }
}
