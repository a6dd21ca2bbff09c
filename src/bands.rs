//! Valuation bands: fixed multiplier tables applied to the regression
//! baseline.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandSet {
    /// Nine bands, the full rainbow.
    Classic,
    /// Five coarser bands.
    Compact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandLayout {
    /// Floor series plus per-band heights, for stacking renderers.
    Stacked,
    /// Explicit `[lower, upper]` per band.
    Interval,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandSpec {
    pub label: &'static str,
    pub color: &'static str,
}

const CLASSIC_BOUNDS: [f64; 10] = [0.3, 0.45, 0.65, 0.9, 1.25, 1.75, 2.5, 3.5, 5.0, 7.0];
const CLASSIC_SPECS: [BandSpec; 9] = [
    BandSpec { label: "Basically a Fire Sale", color: "#1f4e9c" },
    BandSpec { label: "BUY!", color: "#3d8bd9" },
    BandSpec { label: "Accumulate", color: "#2ca25f" },
    BandSpec { label: "Still cheap", color: "#a1d99b" },
    BandSpec { label: "HODL!", color: "#ffff99" },
    BandSpec { label: "Is this a bubble?", color: "#fdbf6f" },
    BandSpec { label: "FOMO intensifies", color: "#ff7f00" },
    BandSpec { label: "Sell. Seriously, SELL!", color: "#f4511e" },
    BandSpec { label: "Maximum Bubble Territory", color: "#e31a1c" },
];

const COMPACT_BOUNDS: [f64; 6] = [0.4, 0.7, 1.2, 2.0, 3.5, 6.0];
const COMPACT_SPECS: [BandSpec; 5] = [
    BandSpec { label: "Fire Sale", color: "#1f78b4" },
    BandSpec { label: "Accumulate", color: "#33a02c" },
    BandSpec { label: "HODL", color: "#ffff99" },
    BandSpec { label: "Overheated", color: "#ff7f00" },
    BandSpec { label: "Bubble", color: "#e31a1c" },
];

impl BandSet {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "classic" | "9" | "full" => Some(Self::Classic),
            "compact" | "5" => Some(Self::Compact),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classic => "classic",
            Self::Compact => "compact",
        }
    }

    /// Band boundaries as multiples of the baseline, strictly increasing.
    /// Band `i` spans `bounds[i]..bounds[i + 1]`.
    pub fn bounds(&self) -> &'static [f64] {
        match self {
            Self::Classic => &CLASSIC_BOUNDS,
            Self::Compact => &COMPACT_BOUNDS,
        }
    }

    pub fn specs(&self) -> &'static [BandSpec] {
        match self {
            Self::Classic => &CLASSIC_SPECS,
            Self::Compact => &COMPACT_SPECS,
        }
    }

    pub fn len(&self) -> usize {
        self.specs().len()
    }
}

impl BandLayout {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stacked" | "stack" => Some(Self::Stacked),
            "interval" | "range" | "bands" => Some(Self::Interval),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stacked => "stacked",
            Self::Interval => "interval",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Band {
    pub index: usize,
    pub label: &'static str,
    pub color: &'static str,
    pub lower_mult: f64,
    pub upper_mult: f64,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

/// Bands for every baseline value.
pub fn derive_bands(baseline: &[f64], set: BandSet) -> Vec<Band> {
    let bounds = set.bounds();
    set.specs()
        .iter()
        .enumerate()
        .map(|(i, spec)| {
            let (lo, hi) = (bounds[i], bounds[i + 1]);
            Band {
                index: i,
                label: spec.label,
                color: spec.color,
                lower_mult: lo,
                upper_mult: hi,
                lower: baseline.iter().map(|b| b * lo).collect(),
                upper: baseline.iter().map(|b| b * hi).collect(),
            }
        })
        .collect()
}

/// Band series shaped for a renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "layout", rename_all = "snake_case")]
pub enum BandSeries {
    Stacked {
        floor: Vec<f64>,
        heights: Vec<Vec<f64>>,
    },
    Interval {
        ranges: Vec<Vec<[f64; 2]>>,
    },
}

pub fn layout_bands(bands: &[Band], layout: BandLayout) -> BandSeries {
    match layout {
        BandLayout::Stacked => BandSeries::Stacked {
            floor: bands.first().map(|b| b.lower.clone()).unwrap_or_default(),
            heights: bands
                .iter()
                .map(|b| b.upper.iter().zip(&b.lower).map(|(u, l)| u - l).collect())
                .collect(),
        },
        BandLayout::Interval => BandSeries::Interval {
            ranges: bands
                .iter()
                .map(|b| b.lower.iter().zip(&b.upper).map(|(l, u)| [*l, *u]).collect())
                .collect(),
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "position", content = "band", rename_all = "snake_case")]
pub enum BandPosition {
    Below,
    Inside(usize),
    Above,
}

/// Which band `price` falls into given the baseline at the same instant.
/// Lower boundaries are inclusive.
pub fn classify(price: f64, baseline: f64, set: BandSet) -> BandPosition {
    let ratio = price / baseline;
    let bounds = set.bounds();
    if !(ratio >= bounds[0]) {
        return BandPosition::Below;
    }
    match bounds[1..].iter().position(|hi| ratio < *hi) {
        Some(i) => BandPosition::Inside(i),
        None => BandPosition::Above,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_strictly_increase_and_match_specs() {
        for set in [BandSet::Classic, BandSet::Compact] {
            let b = set.bounds();
            assert_eq!(b.len(), set.len() + 1);
            assert!(b.windows(2).all(|w| w[0] < w[1]), "{:?}", set);
        }
        assert_eq!(BandSet::Classic.len(), 9);
        assert_eq!(BandSet::Compact.len(), 5);
    }

    fn rgb(hex: &str) -> (u8, u8, u8) {
        let c = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).unwrap();
        (c(1), c(3), c(5))
    }

    #[test]
    fn colours_run_blue_to_red() {
        for set in [BandSet::Classic, BandSet::Compact] {
            let specs = set.specs();
            let (r, _, b) = rgb(specs[0].color);
            assert!(b > r, "{:?} lowest band {}", set, specs[0].color);
            let (r, _, b) = rgb(specs[specs.len() - 1].color);
            assert!(r > b, "{:?} top band", set);
        }
    }

    #[test]
    fn bands_are_contiguous() {
        let baseline = vec![100.0, 200.0];
        let bands = derive_bands(&baseline, BandSet::Classic);
        for w in bands.windows(2) {
            assert_eq!(w[0].upper, w[1].lower);
        }
        assert_eq!(bands[0].lower, vec![30.0, 60.0]);
        assert_eq!(bands[8].upper, vec![700.0, 1400.0]);
    }

    #[test]
    fn stacked_heights_sum_to_top() {
        let baseline = vec![10.0, 20.0, 40.0];
        let bands = derive_bands(&baseline, BandSet::Compact);
        let BandSeries::Stacked { floor, heights } = layout_bands(&bands, BandLayout::Stacked) else {
            panic!("expected stacked");
        };
        for (i, b) in baseline.iter().enumerate() {
            let top: f64 = floor[i] + heights.iter().map(|h| h[i]).sum::<f64>();
            assert!((top - b * 6.0).abs() < 1e-9);
        }
    }

    #[test]
    fn interval_layout_pairs_bounds() {
        let bands = derive_bands(&[100.0], BandSet::Compact);
        let BandSeries::Interval { ranges } = layout_bands(&bands, BandLayout::Interval) else {
            panic!("expected interval");
        };
        assert_eq!(ranges.len(), 5);
        let [lo, hi] = ranges[2][0];
        assert!((lo - 120.0).abs() < 1e-9 && (hi - 200.0).abs() < 1e-9);
    }

    #[test]
    fn classify_edges() {
        let set = BandSet::Classic;
        assert_eq!(classify(0.1, 1.0, set), BandPosition::Below);
        assert_eq!(classify(0.3, 1.0, set), BandPosition::Inside(0));
        assert_eq!(classify(1.0, 1.0, set), BandPosition::Inside(3));
        assert_eq!(classify(6.99, 1.0, set), BandPosition::Inside(8));
        assert_eq!(classify(7.0, 1.0, set), BandPosition::Above);
        assert_eq!(classify(1.0, f64::NAN, set), BandPosition::Below);
    }

    #[test]
    fn parse_names() {
        assert_eq!(BandSet::parse("Compact"), Some(BandSet::Compact));
        assert_eq!(BandLayout::parse("interval"), Some(BandLayout::Interval));
        assert_eq!(BandLayout::parse("pie"), None);
    }
}
