//! Navigation scenarios for deterministic testing.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// NAV-001: Single bending street, walked end to end
    StreetWalk,

    /// NAV-002: Dense plazas plus far-away outliers
    PlazaCluster,

    /// NAV-003: Hub with a ring of neighbours in every direction
    CompassRing,

    /// NAV-004: Nothing within clustering distance of anything else
    ScatteredNoise,

    /// NAV-005: Regular block grid, large enough to exercise the index
    CityGrid,

    /// NAV-006: NaN, out-of-range and duplicate records mixed in
    DirtyFeed,

    /// NAV-007: Street crossing the antimeridian
    Antimeridian,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::StreetWalk,
            ScenarioId::PlazaCluster,
            ScenarioId::CompassRing,
            ScenarioId::ScatteredNoise,
            ScenarioId::CityGrid,
            ScenarioId::DirtyFeed,
            ScenarioId::Antimeridian,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::StreetWalk => "street_walk",
            ScenarioId::PlazaCluster => "plaza_cluster",
            ScenarioId::CompassRing => "compass_ring",
            ScenarioId::ScatteredNoise => "scattered_noise",
            ScenarioId::CityGrid => "city_grid",
            ScenarioId::DirtyFeed => "dirty_feed",
            ScenarioId::Antimeridian => "antimeridian",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::StreetWalk => "Bending street of captures, next/prev walk covers every panorama",
            ScenarioId::PlazaCluster => "Three dense plazas and distant outliers, clusters before noise",
            ScenarioId::CompassRing => "Hub with a ring of 8 neighbours, all four compass lookups resolve",
            ScenarioId::ScatteredNoise => "Isolated captures only, sequence is built from the noise cluster",
            ScenarioId::CityGrid => "Block grid, radius queries agree with a brute-force scan",
            ScenarioId::DirtyFeed => "30% corrupted records, ingestion rejects them and the rest navigates",
            ScenarioId::Antimeridian => "Street crossing 180°, neighbours found across the seam",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "street_walk" | "streetwalk" | "nav-001" => Ok(ScenarioId::StreetWalk),
            "plaza_cluster" | "plazacluster" | "nav-002" => Ok(ScenarioId::PlazaCluster),
            "compass_ring" | "compassring" | "nav-003" => Ok(ScenarioId::CompassRing),
            "scattered_noise" | "scatterednoise" | "nav-004" => Ok(ScenarioId::ScatteredNoise),
            "city_grid" | "citygrid" | "nav-005" => Ok(ScenarioId::CityGrid),
            "dirty_feed" | "dirtyfeed" | "nav-006" => Ok(ScenarioId::DirtyFeed),
            "antimeridian" | "nav-007" => Ok(ScenarioId::Antimeridian),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
