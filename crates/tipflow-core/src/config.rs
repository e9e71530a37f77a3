//! Run configuration (`run.toml`) parser.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::catalog::LabwareDefinition;
use crate::types::{CapacityClass, Mount, ReplacePolicy, TipChangePolicy};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("no pipettes configured")]
    NoPipettes,

    #[error("two pipettes configured on the {0} mount")]
    DuplicateMount(Mount),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: String, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub run: RunSection,
    pub pipettes: Vec<PipetteConfig>,
    #[serde(default)]
    pub tips: TipsConfig,
    #[serde(default)]
    pub deck: DeckConfig,
    pub reagent: ReagentConfig,
    pub destination: DestinationConfig,
    pub samples: Option<SamplesConfig>,
    /// Labware definitions not in the built-in catalog.
    #[serde(default)]
    pub labware: Vec<LabwareDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSection {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipetteConfig {
    pub mount: Mount,
    pub min_volume: f64,
    pub max_volume: f64,
    pub tip_rack: String,
    /// Defaults to `max_volume`.
    pub tip_capacity: Option<f64>,
    /// First tip to use in the first rack, e.g. `"C4"`.
    pub starting_tip: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TipsConfig {
    #[serde(default)]
    pub replace: ReplacePolicy,
    /// Both pipettes draw from the same racks.
    #[serde(default)]
    pub shared_rack: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeckConfig {
    #[serde(default)]
    pub equipment: Vec<EquipmentConfig>,
}

/// A module bolted to the deck. Its footprint slots are unavailable and its
/// clearance slots only take labware up to a given height.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquipmentConfig {
    pub name: String,
    pub slots: Vec<u8>,
    #[serde(default)]
    pub clearance_slots: Vec<u8>,
    pub max_neighbor_height_mm: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReagentConfig {
    pub name: String,
    pub volume_per_reaction: f64,
    pub capacity_class: CapacityClass,
    pub tube_rack: String,
    /// Fraction of the nominal tube capacity that may be filled.
    #[serde(default = "default_fill_fraction")]
    pub fill_fraction: f64,
    /// Extra volume loaded per tube that is never aspirated.
    #[serde(default)]
    pub dead_volume: f64,
    #[serde(default)]
    pub tip_policy: TipChangePolicy,
    #[serde(default)]
    pub touch_tip: bool,
}

fn default_fill_fraction() -> f64 {
    0.9
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    pub plate: String,
    pub reactions: u32,
    #[serde(default = "default_destination_label")]
    pub label: String,
}

fn default_destination_label() -> String {
    "destination".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplesConfig {
    pub plate: String,
    /// Source wells, transferred in order into the first reaction wells.
    pub wells: Vec<String>,
    pub volume: f64,
    #[serde(default = "default_sample_policy")]
    pub tip_policy: TipChangePolicy,
    #[serde(default)]
    pub touch_tip: bool,
}

fn default_sample_policy() -> TipChangePolicy {
    TipChangePolicy::PerWell
}

impl RunConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: RunConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Structural checks the planner relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipettes.is_empty() {
            return Err(ConfigError::NoPipettes);
        }
        let mut seen = Vec::new();
        for p in &self.pipettes {
            if seen.contains(&p.mount) {
                return Err(ConfigError::DuplicateMount(p.mount));
            }
            seen.push(p.mount);
            if !(p.min_volume > 0.0 && p.min_volume <= p.max_volume) {
                return Err(invalid(
                    &format!("pipettes.{}.min_volume", p.mount),
                    "must be positive and not above max_volume",
                ));
            }
            if p.tip_capacity.is_some_and(|c| c < p.min_volume) {
                return Err(invalid(
                    &format!("pipettes.{}.tip_capacity", p.mount),
                    "smaller than the pipette minimum",
                ));
            }
        }

        let reagent = &self.reagent;
        if reagent.volume_per_reaction <= 0.0 {
            return Err(invalid("reagent.volume_per_reaction", "must be positive"));
        }
        if !(reagent.fill_fraction > 0.0 && reagent.fill_fraction <= 1.0) {
            return Err(invalid("reagent.fill_fraction", "must be in (0, 1]"));
        }
        if reagent.dead_volume < 0.0 {
            return Err(invalid("reagent.dead_volume", "must not be negative"));
        }
        if self.destination.reactions == 0 {
            return Err(invalid("destination.reactions", "must be at least 1"));
        }
        if let Some(samples) = &self.samples {
            if samples.volume <= 0.0 {
                return Err(invalid("samples.volume", "must be positive"));
            }
            if samples.wells.len() > self.destination.reactions as usize {
                return Err(invalid("samples.wells", "more samples than reactions"));
            }
        }
        Ok(())
    }

    /// Scaffold a minimal run.toml.
    pub fn scaffold(name: &str) -> Self {
        RunConfig {
            run: RunSection {
                name: name.to_string(),
                description: None,
            },
            pipettes: vec![
                PipetteConfig {
                    mount: Mount::Right,
                    min_volume: 1.0,
                    max_volume: 20.0,
                    tip_rack: "opentrons_96_filtertiprack_20ul".to_string(),
                    tip_capacity: None,
                    starting_tip: None,
                },
                PipetteConfig {
                    mount: Mount::Left,
                    min_volume: 100.0,
                    max_volume: 1000.0,
                    tip_rack: "opentrons_96_filtertiprack_1000ul".to_string(),
                    tip_capacity: None,
                    starting_tip: None,
                },
            ],
            tips: TipsConfig::default(),
            deck: DeckConfig::default(),
            reagent: ReagentConfig {
                name: "master mix".to_string(),
                volume_per_reaction: 15.0,
                capacity_class: CapacityClass::Tube15ml,
                tube_rack: "opentrons_15_tuberack_falcon_15ml_conical".to_string(),
                fill_fraction: default_fill_fraction(),
                dead_volume: 0.0,
                tip_policy: TipChangePolicy::Never,
                touch_tip: false,
            },
            destination: DestinationConfig {
                plate: "biorad_96_wellplate_200ul_pcr".to_string(),
                reactions: 96,
                label: default_destination_label(),
            },
            samples: None,
            labware: Vec::new(),
        }
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
