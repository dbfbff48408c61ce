// THEORY:
// A `Defect` is a "dumb" data container for one flagged anomalous region. The
// detectors create them in discovery order and number them from 1; the label text
// is part of the contract with downstream UI consumers and must not change shape:
//
//     Defect #<n>: anomaly at position (<x>, <y>)
//
// Only `index`, `label`, `x` and `y` are serialized; the full region and the
// detecting method stay available to Rust callers for drawing and diagnostics.

use crate::core_modules::region::Region;
use serde::Serialize;

/// Which detector produced a defect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    /// Region-wise comparison of binarized reference and test LEDs.
    PatternComparison,
    /// Grid cell whose colour histogram decorrelated from the reference.
    HistogramCorrelation,
    /// Difference contour between reference and test lit-pixel masks.
    ContourDiff,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Defect {
    /// 1-based sequence number in discovery order.
    pub index: usize,
    pub label: String,
    pub x: u32,
    pub y: u32,
    /// The un-expanded region that was flagged.
    #[serde(skip)]
    pub region: Region,
    #[serde(skip)]
    pub source_method: DetectionMethod,
}

impl Defect {
    pub fn new(index: usize, region: Region, source_method: DetectionMethod) -> Self {
        Self {
            index,
            label: format!("Defect #{index}: anomaly at position ({}, {})", region.x, region.y),
            x: region.x,
            y: region.y,
            region,
            source_method,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_matches_consumer_format() {
        let defect = Defect::new(3, Region::new(41, 7, 10, 10), DetectionMethod::PatternComparison);
        assert_eq!(defect.label, "Defect #3: anomaly at position (41, 7)");
    }

    #[test]
    fn serialization_exposes_contract_fields_only() {
        let defect = Defect::new(1, Region::new(20, 20, 10, 10), DetectionMethod::PatternComparison);
        let json = serde_json::to_value(&defect).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "index": 1,
                "label": "Defect #1: anomaly at position (20, 20)",
                "x": 20,
                "y": 20
            })
        );
    }
}
