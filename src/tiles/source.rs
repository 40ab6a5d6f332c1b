use crate::core::constants::TILE_SIZE;
use crate::core::geo::TileCoord;
use crate::{MapError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Trait representing anything that can produce tile URLs for a given coordinate.
pub trait TileSource: Send + Sync {
    /// Build a URL for the requested `coord`.
    fn url(&self, coord: TileCoord) -> String;
}

/// Registry-assigned identity of a tile server, part of every cache key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServerId(pub u32);

/// A raster tile server and how its tiles are stored offline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileServer {
    #[serde(skip)]
    pub id: ServerId,
    /// Display name, also used to select the server
    pub name: String,
    /// URL with literal `{x}`, `{y}` and `{z}` placeholders
    pub url_template: String,
    #[serde(default = "default_tile_size")]
    pub tile_size: u32,
    /// Directory (filesystem store) or file stem (database store)
    pub dir_name: String,
    pub max_zoom: u8,
}

fn default_tile_size() -> u32 {
    TILE_SIZE
}

impl TileServer {
    pub fn new(
        name: impl Into<String>,
        url_template: impl Into<String>,
        dir_name: impl Into<String>,
        max_zoom: u8,
    ) -> Self {
        Self {
            id: ServerId::default(),
            name: name.into(),
            url_template: url_template.into(),
            tile_size: TILE_SIZE,
            dir_name: dir_name.into(),
            max_zoom,
        }
    }

    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size;
        self
    }

    pub fn openstreetmap() -> Self {
        Self::new(
            "Open Street Map",
            "https://a.tile.openstreetmap.org/{z}/{x}/{y}.png",
            "OpenStreetMap",
            19,
        )
    }

    pub fn google_satellite() -> Self {
        Self::new(
            "Google satellite",
            "https://mt0.google.com/vt/lyrs=s&hl=en&x={x}&y={y}&z={z}&s=Ga",
            "GoogleSatellite",
            22,
        )
    }

    pub fn google_normal() -> Self {
        Self::new(
            "Google normal",
            "https://mt0.google.com/vt/lyrs=m&hl=en&x={x}&y={y}&z={z}&s=Ga",
            "GoogleNormal",
            22,
        )
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(MapError::Config("tile server needs a name".into()));
        }
        if self.tile_size == 0 {
            return Err(MapError::Config(format!("tile server '{}' has zero tile size", self.name)));
        }
        if !["{x}", "{y}", "{z}"].iter().all(|p| self.url_template.contains(p)) {
            return Err(MapError::Config(format!(
                "url template of '{}' must contain {{x}}, {{y}} and {{z}}",
                self.name
            )));
        }
        Ok(())
    }
}

impl TileSource for TileServer {
    fn url(&self, coord: TileCoord) -> String {
        self.url_template
            .replace("{x}", &coord.x.to_string())
            .replace("{y}", &coord.y.to_string())
            .replace("{z}", &coord.z.to_string())
    }
}

/// The ordered set of known tile servers and the one currently displayed.
#[derive(Debug, Clone)]
pub struct TileServerRegistry {
    servers: Vec<Arc<TileServer>>,
    active: usize,
    next_id: u32,
}

impl TileServerRegistry {
    /// Builds a registry; the first server starts out active
    pub fn new(servers: Vec<TileServer>) -> Result<Self> {
        if servers.is_empty() {
            return Err(MapError::Config("at least one tile server is required".into()));
        }
        let mut registry = Self {
            servers: Vec::with_capacity(servers.len()),
            active: 0,
            next_id: 0,
        };
        for server in servers {
            registry.add(server)?;
        }
        Ok(registry)
    }

    /// OpenStreetMap plus the two Google layers
    pub fn with_defaults() -> Self {
        let servers = Self::default_servers()
            .into_iter()
            .enumerate()
            .map(|(i, mut server)| {
                server.id = ServerId(i as u32);
                Arc::new(server)
            })
            .collect::<Vec<_>>();
        let next_id = servers.len() as u32;
        Self {
            servers,
            active: 0,
            next_id,
        }
    }

    pub fn default_servers() -> Vec<TileServer> {
        vec![
            TileServer::openstreetmap(),
            TileServer::google_satellite(),
            TileServer::google_normal(),
        ]
    }

    /// Registers a server, replacing any server with the same name
    pub fn add(&mut self, mut server: TileServer) -> Result<ServerId> {
        server.validate()?;
        server.id = ServerId(self.next_id);
        self.next_id += 1;
        let id = server.id;

        match self.position(&server.name) {
            Some(i) => self.servers[i] = Arc::new(server),
            None => self.servers.push(Arc::new(server)),
        }
        Ok(id)
    }

    /// Removes a server by name. Removing the active server activates its
    /// successor (or predecessor when it was last). The only remaining server
    /// cannot be removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let Some(i) = self.position(name) else {
            return false;
        };
        if self.servers.len() == 1 {
            log::warn!("refusing to remove '{}', the only tile server", name);
            return false;
        }

        self.servers.remove(i);
        if i < self.active || self.active == self.servers.len() {
            self.active -= 1;
        }
        true
    }

    /// Makes the named server active
    pub fn set_active(&mut self, name: &str) -> Result<Arc<TileServer>> {
        let i = self
            .position(name)
            .ok_or_else(|| MapError::UnknownTileServer(name.to_string()))?;
        self.active = i;
        Ok(self.active())
    }

    pub fn active(&self) -> Arc<TileServer> {
        Arc::clone(&self.servers[self.active])
    }

    pub fn get(&self, name: &str) -> Option<Arc<TileServer>> {
        self.position(name).map(|i| Arc::clone(&self.servers[i]))
    }

    pub fn names(&self) -> Vec<&str> {
        self.servers.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.servers.iter().position(|s| s.name == name)
    }
}

impl Default for TileServerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
