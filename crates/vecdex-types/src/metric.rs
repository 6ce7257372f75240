//! Distance metric and scalar precision.
//!
//! Both are fixed when an index is created and never change afterwards.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypesError;

/// Distance metric used to rank candidates.
///
/// Distances are always "lower is nearer", whichever metric is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// `1 - cos(a, b)`
    #[default]
    Cosine,
    /// `sum((a[i] - b[i])^2)`
    L2Squared,
    /// `1 - sum(a[i] * b[i])`
    InnerProduct,
    /// Number of differing components after binarization.
    Hamming,
    /// `1 - |A ∩ B| / |A ∪ B|` over binarized components.
    Jaccard,
}

impl Metric {
    /// Short name used by the host boundary and in stats.
    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Cosine => "cos",
            Metric::L2Squared => "l2sq",
            Metric::InnerProduct => "ip",
            Metric::Hamming => "hamming",
            Metric::Jaccard => "jaccard",
        }
    }

    /// Whether the metric compares binarized (set-like) vectors.
    pub fn is_binary(self) -> bool {
        matches!(self, Metric::Hamming | Metric::Jaccard)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cos" | "cosine" => Ok(Metric::Cosine),
            "l2sq" | "l2_squared" | "l2" => Ok(Metric::L2Squared),
            "ip" | "inner_product" => Ok(Metric::InnerProduct),
            "hamming" => Ok(Metric::Hamming),
            "jaccard" => Ok(Metric::Jaccard),
            other => Err(TypesError::InvalidInput(format!(
                "unknown metric '{}', expected one of: cos, l2sq, ip, hamming, jaccard",
                other
            ))),
        }
    }
}

/// Scalar precision of stored vector components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    /// 32-bit floats
    #[default]
    Full,
    /// 8-bit integers
    Quantized,
}

impl Precision {
    /// Bytes used per stored component.
    pub fn bytes_per_scalar(self) -> usize {
        match self {
            Precision::Full => 4,
            Precision::Quantized => 1,
        }
    }

    /// Short name used by the host boundary (`"f32"` / `"i8"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Precision::Full => "f32",
            Precision::Quantized => "i8",
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Precision {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "f32" | "full" => Ok(Precision::Full),
            "i8" | "quantized" => Ok(Precision::Quantized),
            other => Err(TypesError::InvalidInput(format!(
                "unknown quantization '{}', expected f32 or i8",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_parse_host_names() {
        assert_eq!("cos".parse::<Metric>().unwrap(), Metric::Cosine);
        assert_eq!("l2sq".parse::<Metric>().unwrap(), Metric::L2Squared);
        assert_eq!("ip".parse::<Metric>().unwrap(), Metric::InnerProduct);
        assert_eq!("hamming".parse::<Metric>().unwrap(), Metric::Hamming);
        assert_eq!("Jaccard".parse::<Metric>().unwrap(), Metric::Jaccard);
    }

    #[test]
    fn test_metric_parse_unknown() {
        let err = "manhattan".parse::<Metric>().unwrap_err();
        assert!(err.to_string().contains("unknown metric"));
    }

    #[test]
    fn test_metric_roundtrip_display() {
        for metric in [
            Metric::Cosine,
            Metric::L2Squared,
            Metric::InnerProduct,
            Metric::Hamming,
            Metric::Jaccard,
        ] {
            assert_eq!(metric.to_string().parse::<Metric>().unwrap(), metric);
        }
    }

    #[test]
    fn test_binary_metrics() {
        assert!(Metric::Hamming.is_binary());
        assert!(Metric::Jaccard.is_binary());
        assert!(!Metric::Cosine.is_binary());
    }

    #[test]
    fn test_precision_widths() {
        assert_eq!(Precision::Full.bytes_per_scalar(), 4);
        assert_eq!(Precision::Quantized.bytes_per_scalar(), 1);
        assert_eq!("i8".parse::<Precision>().unwrap(), Precision::Quantized);
        assert!("f16".parse::<Precision>().is_err());
    }
}
