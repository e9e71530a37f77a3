//! Labware catalog: well layout and capacity per labware kind.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("labware not found: {0}")]
    NotFound(String),
}

/// Geometry and capacity of one labware kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabwareDefinition {
    pub kind: String,
    /// Wells in pipetting order (column-major: A1, B1, ..., A2, ...).
    pub well_positions: Vec<String>,
    /// Wells grouped by column.
    pub groups: Vec<Vec<String>>,
    /// Working volume of one well in µL.
    pub capacity_per_well: f64,
    /// Overall height, used for clearance checks next to equipment.
    #[serde(default)]
    pub height_mm: f64,
    #[serde(default)]
    pub is_tiprack: bool,
}

impl LabwareDefinition {
    /// A rectangular grid labware with `rows` × `columns` wells.
    pub fn grid(kind: &str, rows: usize, columns: usize, capacity_per_well: f64, height_mm: f64) -> Self {
        let row_names: Vec<char> = ('A'..='Z').take(rows).collect();
        let groups: Vec<Vec<String>> = (1..=columns)
            .map(|col| row_names.iter().map(|row| format!("{row}{col}")).collect())
            .collect();
        Self {
            kind: kind.to_string(),
            well_positions: groups.iter().flatten().cloned().collect(),
            groups,
            capacity_per_well,
            height_mm,
            is_tiprack: false,
        }
    }

    fn tiprack(kind: &str, tip_volume: f64) -> Self {
        let mut def = Self::grid(kind, 8, 12, tip_volume, 64.5);
        def.is_tiprack = true;
        def
    }

    pub fn well_count(&self) -> usize {
        self.well_positions.len()
    }

    pub fn index_of(&self, well: &str) -> Option<usize> {
        self.well_positions.iter().position(|w| w == well)
    }
}

/// Lookup of labware definitions by kind name.
pub trait LabwareCatalog {
    fn lookup(&self, kind: &str) -> Result<LabwareDefinition, CatalogError>;
}

/// In-memory catalog seeded with common labware.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    definitions: BTreeMap<String, LabwareDefinition>,
}

impl StaticCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Tip racks, tube racks, and PCR plates in common use.
    pub fn builtin() -> Self {
        let definitions = [
            LabwareDefinition::tiprack("opentrons_96_tiprack_20ul", 20.0),
            LabwareDefinition::tiprack("opentrons_96_tiprack_300ul", 300.0),
            LabwareDefinition::tiprack("opentrons_96_tiprack_1000ul", 1000.0),
            LabwareDefinition::tiprack("opentrons_96_filtertiprack_20ul", 20.0),
            LabwareDefinition::tiprack("opentrons_96_filtertiprack_200ul", 200.0),
            LabwareDefinition::tiprack("opentrons_96_filtertiprack_1000ul", 1000.0),
            LabwareDefinition::grid("opentrons_15_tuberack_falcon_15ml_conical", 3, 5, 15_000.0, 124.35),
            LabwareDefinition::grid("opentrons_6_tuberack_falcon_50ml_conical", 2, 3, 50_000.0, 113.0),
            LabwareDefinition::grid(
                "opentrons_24_tuberack_eppendorf_1.5ml_safelock_snapcap",
                4,
                6,
                1_500.0,
                79.85,
            ),
            LabwareDefinition::grid("nest_96_wellplate_100ul_pcr_full_skirt", 8, 12, 100.0, 15.7),
            LabwareDefinition::grid("biorad_96_wellplate_200ul_pcr", 8, 12, 200.0, 16.06),
            LabwareDefinition::grid("corning_384_wellplate_112ul_flat", 16, 24, 112.0, 14.22),
        ];
        let mut catalog = Self::empty();
        for def in definitions {
            catalog.insert(def);
        }
        catalog
    }

    /// Add or replace a definition.
    pub fn insert(&mut self, definition: LabwareDefinition) {
        self.definitions.insert(definition.kind.clone(), definition);
    }

    pub fn with_definitions(mut self, definitions: impl IntoIterator<Item = LabwareDefinition>) -> Self {
        for def in definitions {
            self.insert(def);
        }
        self
    }

    pub fn kinds(&self) -> impl Iterator<Item = &LabwareDefinition> {
        self.definitions.values()
    }
}

impl LabwareCatalog for StaticCatalog {
    fn lookup(&self, kind: &str) -> Result<LabwareDefinition, CatalogError> {
        self.definitions
            .get(kind)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(kind.to_string()))
    }
}
