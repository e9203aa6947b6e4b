//! Per-image colour metadata handed to the present shader.
//!
//! The viewer never converts between these; it only labels images so the
//! renderer can pick the right decoding.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorPrimaries {
    /// Rec.709, which sRGB shares.
    #[default]
    Bt709,
    DciP3D65,
    Bt2020,
    AcesAp0,
    AcesAp1,
}

impl ColorPrimaries {
    pub const ALL: [Self; 5] = [
        Self::Bt709,
        Self::DciP3D65,
        Self::Bt2020,
        Self::AcesAp0,
        Self::AcesAp1,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Bt709 => "BT.709 / sRGB",
            Self::DciP3D65 => "DCI-P3 D65",
            Self::Bt2020 => "BT.2020",
            Self::AcesAp0 => "ACES AP0",
            Self::AcesAp1 => "ACES AP1",
        }
    }
}

impl fmt::Display for ColorPrimaries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Transfer encoding of the stored values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorEncoding {
    Linear,
    Bt2020,
    Bt2100Hlg,
    Bt2100Pq,
    Bt709,
    #[default]
    Srgb,
}

impl ColorEncoding {
    pub const ALL: [Self; 6] = [
        Self::Linear,
        Self::Bt2020,
        Self::Bt2100Hlg,
        Self::Bt2100Pq,
        Self::Bt709,
        Self::Srgb,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Linear => "Linear",
            Self::Bt2020 => "BT.2020",
            Self::Bt2100Hlg => "BT.2100 HLG",
            Self::Bt2100Pq => "BT.2100 PQ",
            Self::Bt709 => "BT.709",
            Self::Srgb => "sRGB",
        }
    }
}

impl fmt::Display for ColorEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
