//! Mitigation messages for a risk band.
//!
//! Output order is fixed and never depends on input values: the base set
//! first, then one message per raised situational flag in declaration order.

use serde::{Deserialize, Serialize};

use crate::risk::RiskBand;

// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendationCode {
    Maintain,
    LowerNightRh,
    IncreaseAirflow,
    SlowTempRamp,
    IrrigationTiming,
    FanContinuity,
    DehumidifierCapacity,
}

impl RecommendationCode {
    pub fn message(&self) -> &'static str {
        match self {
            RecommendationCode::Maintain => {
                "Condensation risk is low. Maintain current night-time climate settings."
            }
            RecommendationCode::LowerNightRh => {
                "Lower night relative humidity: raise the dehumidifier setpoint or add dehumidification capacity before lights-off."
            }
            RecommendationCode::IncreaseAirflow => {
                "Increase canopy air movement at lights-off so leaf surfaces stay closer to air temperature."
            }
            RecommendationCode::SlowTempRamp => {
                "Slow the lights-off temperature ramp so the room cools gradually instead of dropping sharply."
            }
            RecommendationCode::IrrigationTiming => {
                "Move the last irrigation earlier so the substrate is not releasing moisture at lights-off."
            }
            RecommendationCode::FanContinuity => {
                "Keep circulation and exhaust fans running through the night; a fan-off period lets humid air settle on leaves."
            }
            RecommendationCode::DehumidifierCapacity => {
                "The dehumidifier is at capacity; add a unit or reduce the moisture load for the dark period."
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub code: RecommendationCode,
    pub message: String,
}

impl From<RecommendationCode> for Recommendation {
    fn from(code: RecommendationCode) -> Self {
        Recommendation {
            code,
            message: code.message().to_string(),
        }
    }
}

/// Situational flags reported alongside a manual estimate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SituationalFlags {
    /// Irrigation happened close to lights-off.
    pub late_irrigation: bool,
    /// Fans or exhaust were off for part of the night.
    pub fan_off_incident: bool,
    /// The dehumidifier ran flat out.
    pub dehumidifier_at_capacity: bool,
}

const BASE_MITIGATIONS: [RecommendationCode; 3] = [
    RecommendationCode::LowerNightRh,
    RecommendationCode::IncreaseAirflow,
    RecommendationCode::SlowTempRamp,
];

/// Recommendations for a band with no situational context.
pub fn recommendations_for(band: RiskBand) -> Vec<Recommendation> {
    // ---
    match band {
        RiskBand::Low => vec![RecommendationCode::Maintain.into()],
        RiskBand::Medium | RiskBand::High => {
            BASE_MITIGATIONS.iter().copied().map(Recommendation::from).collect()
        }
    }
}

/// Base recommendations for `band`, then one targeted message per true flag.
/// Flags only append; they never remove a base message.
pub fn recommendations_with_flags(band: RiskBand, flags: &SituationalFlags) -> Vec<Recommendation> {
    // ---
    let mut out = recommendations_for(band);

    let targeted = [
        (flags.late_irrigation, RecommendationCode::IrrigationTiming),
        (flags.fan_off_incident, RecommendationCode::FanContinuity),
        (
            flags.dehumidifier_at_capacity,
            RecommendationCode::DehumidifierCapacity,
        ),
    ];
    out.extend(
        targeted
            .into_iter()
            .filter(|(raised, _)| *raised)
            .map(|(_, code)| Recommendation::from(code)),
    );
    out
}
