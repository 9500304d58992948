//! The maps runs can be submitted on.
//!
//! Map management lives elsewhere, the service only gets a read only catalog
//! of approved maps together with their zone files.

use common::zones::MapZones;
use common::MapId;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapInfo {
    pub id: MapId,
    pub name: String,
    /// SHA-1 of the map file in hex.
    pub hash: String,
    /// Difficulty tier, 1 to 10.
    #[serde(default = "default_tier")]
    pub tier: u8,
    #[serde(default)]
    pub is_linear: bool,
    pub zones: MapZones,
}

fn default_tier() -> u8 {
    1
}

#[derive(Debug, thiserror::Error)]
pub enum MapCatalogError {
    #[error("reading map catalog: {0}")]
    Io(#[from] std::io::Error),
    #[error("parsing map catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("map {0} is listed twice")]
    DuplicateMap(MapId),
}

#[derive(Debug, Default)]
pub struct MapCatalog {
    maps: std::collections::HashMap<MapId, std::sync::Arc<MapInfo>>,
}

impl MapCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON array of maps.
    ///
    /// Maps with broken zones are kept so runs on them get rejected instead
    /// of the whole catalog failing to load.
    pub fn from_json(data: &str) -> Result<Self, MapCatalogError> {
        let maps: Vec<MapInfo> = serde_json::from_str(data)?;

        let mut catalog = Self::new();
        for map in maps {
            if let Err(e) = map.zones.validate() {
                tracing::warn!("Map {} ({}) has invalid zones: {}", map.id, map.name, e);
            }

            let id = map.id;
            if catalog.maps.insert(id, std::sync::Arc::new(map)).is_some() {
                return Err(MapCatalogError::DuplicateMap(id));
            }
        }

        Ok(catalog)
    }

    #[tracing::instrument]
    pub async fn load(path: &std::path::Path) -> Result<Self, MapCatalogError> {
        let data = tokio::fs::read_to_string(path).await?;
        let catalog = Self::from_json(&data)?;

        tracing::info!("Loaded {} maps", catalog.maps.len());

        Ok(catalog)
    }

    pub fn insert(&mut self, map: MapInfo) {
        self.maps.insert(map.id, std::sync::Arc::new(map));
    }

    pub fn get(&self, id: MapId) -> Option<std::sync::Arc<MapInfo>> {
        self.maps.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}
