use serde::{Deserialize, Serialize};

/// Mobility profile of an evacuee.
///
/// Base speeds are multipliers of the reference walking speed; the impaired
/// values are the averages reported in the field studies the model was
/// calibrated against.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MobilityClass {
    Unimpaired,
    MotorImpaired,
    VisuallyImpaired,
    IntellectuallyImpaired,
}

impl MobilityClass {
    pub const ALL: [MobilityClass; 4] = [
        MobilityClass::Unimpaired,
        MobilityClass::MotorImpaired,
        MobilityClass::VisuallyImpaired,
        MobilityClass::IntellectuallyImpaired,
    ];

    /// Classes drawn for the impaired share of the population.
    pub const IMPAIRED: [MobilityClass; 3] = [
        MobilityClass::MotorImpaired,
        MobilityClass::VisuallyImpaired,
        MobilityClass::IntellectuallyImpaired,
    ];

    pub fn base_speed(self) -> f64 {
        match self {
            MobilityClass::Unimpaired => 1.0,
            // weighted over wheelchair, amputee and crutch users
            MobilityClass::MotorImpaired => 0.55,
            MobilityClass::VisuallyImpaired => 0.4,
            MobilityClass::IntellectuallyImpaired => 0.65,
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            MobilityClass::Unimpaired => "blue",
            MobilityClass::MotorImpaired => "orange",
            MobilityClass::VisuallyImpaired => "red",
            MobilityClass::IntellectuallyImpaired => "purple",
        }
    }

    /// Stable label used in reports.
    pub fn label(self) -> &'static str {
        match self {
            MobilityClass::Unimpaired => "NON_PWD",
            MobilityClass::MotorImpaired => "MOTOR",
            MobilityClass::VisuallyImpaired => "VISUAL",
            MobilityClass::IntellectuallyImpaired => "INTELLECTUAL",
        }
    }

    pub fn is_impaired(self) -> bool {
        self != MobilityClass::Unimpaired
    }
}
