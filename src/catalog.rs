use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::Deserialize;

use crate::config::ConfigError;
use crate::error::BookingError;
use crate::limits::*;
use crate::model::{ResourceId, Slot};

/// Bookable slots and capacity of one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Sorted, deduplicated.
    pub slots: Vec<Slot>,
    pub capacity: u32,
}

impl CatalogEntry {
    pub fn offers(&self, slot: Slot) -> bool {
        self.slots.binary_search(&slot).is_ok()
    }
}

/// Per-resource slot grid and capacity bound, supplied by configuration.
/// Read-only once built; share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct SlotCatalog {
    default_capacity: u32,
    entries: HashMap<ResourceId, CatalogEntry>,
}

impl Default for SlotCatalog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl SlotCatalog {
    pub fn new(default_capacity: u32) -> Self {
        Self {
            default_capacity,
            entries: HashMap::new(),
        }
    }

    /// Register a resource. `None` slots means the standard lunch/dinner grid;
    /// `None` capacity means the catalog default.
    pub fn insert(
        &mut self,
        resource_id: ResourceId,
        slots: Option<Vec<Slot>>,
        capacity: Option<u32>,
    ) -> Result<(), ConfigError> {
        if resource_id.as_str().is_empty() || resource_id.as_str().len() > MAX_ID_LEN {
            return Err(ConfigError::Invalid(format!(
                "resource id length must be 1..={MAX_ID_LEN}"
            )));
        }
        if self.entries.len() >= MAX_RESOURCES && !self.entries.contains_key(&resource_id) {
            return Err(ConfigError::Invalid("too many resources".into()));
        }

        let mut slots = slots.unwrap_or_else(|| STANDARD_SLOTS.to_vec());
        slots.sort();
        slots.dedup();
        if slots.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "resource {resource_id}: empty slot list"
            )));
        }
        if slots.len() > MAX_SLOTS_PER_RESOURCE {
            return Err(ConfigError::Invalid(format!(
                "resource {resource_id}: more than {MAX_SLOTS_PER_RESOURCE} slots"
            )));
        }

        let capacity = capacity.unwrap_or(self.default_capacity);
        validate_capacity(capacity).map_err(|msg| {
            ConfigError::Invalid(format!("resource {resource_id}: {msg}"))
        })?;

        self.entries.insert(resource_id, CatalogEntry { slots, capacity });
        Ok(())
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with_resource(
        mut self,
        resource_id: impl Into<String>,
        slots: &[&str],
        capacity: Option<u32>,
    ) -> Result<Self, ConfigError> {
        let parsed = slots
            .iter()
            .map(|s| s.parse::<Slot>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.insert(ResourceId::new(resource_id), Some(parsed), capacity)?;
        Ok(self)
    }

    /// Parse a catalog document:
    /// `{"default_capacity": 3, "resources": {"R1": {"slots": ["18:00"], "capacity": 2}}}`
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let file: CatalogFile =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        validate_capacity(file.default_capacity)
            .map_err(|msg| ConfigError::Invalid(format!("default_capacity: {msg}")))?;

        let mut catalog = Self::new(file.default_capacity);
        for (id, entry) in file.resources {
            catalog.insert(ResourceId::new(id), entry.slots, entry.capacity)?;
        }
        Ok(catalog)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    pub fn entry(&self, resource_id: &ResourceId) -> Result<&CatalogEntry, BookingError> {
        self.entries
            .get(resource_id)
            .ok_or_else(|| BookingError::UnknownResource(resource_id.clone()))
    }

    /// Ordered slots of a resource. An unconfigured resource is an error, never
    /// an empty list, so "no catalog" stays distinguishable from "no slots open".
    pub fn slots_for(&self, resource_id: &ResourceId) -> Result<&[Slot], BookingError> {
        self.entry(resource_id).map(|e| e.slots.as_slice())
    }

    pub fn capacity_for(&self, resource_id: &ResourceId) -> Result<u32, BookingError> {
        self.entry(resource_id).map(|e| e.capacity)
    }

    pub fn default_capacity(&self) -> u32 {
        self.default_capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn resource_ids(&self) -> impl Iterator<Item = &ResourceId> {
        self.entries.keys()
    }
}

fn validate_capacity(capacity: u32) -> Result<(), String> {
    if capacity == 0 {
        return Err("capacity must be at least 1".into());
    }
    if capacity > MAX_CAPACITY {
        return Err(format!("capacity {capacity} above {MAX_CAPACITY}"));
    }
    Ok(())
}

fn default_capacity() -> u32 {
    DEFAULT_CAPACITY
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogFile {
    #[serde(default = "default_capacity")]
    default_capacity: u32,
    #[serde(default)]
    resources: BTreeMap<String, ResourceFile>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ResourceFile {
    #[serde(default)]
    slots: Option<Vec<Slot>>,
    #[serde(default)]
    capacity: Option<u32>,
}
