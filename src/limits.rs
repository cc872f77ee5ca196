use crate::model::Slot;

/// Capacity used when the catalog gives a resource no override.
pub const DEFAULT_CAPACITY: u32 = 3;

/// Largest party accepted when the host does not configure one.
pub const DEFAULT_MAX_PARTY_SIZE: u32 = 8;

pub const MAX_CAPACITY: u32 = 10_000;
pub const MAX_SLOTS_PER_RESOURCE: usize = 96;
pub const MAX_RESOURCES: usize = 100_000;
pub const MAX_ID_LEN: usize = 256;

/// Ledger rows per (resource, date, slot), cancelled ones included.
pub const MAX_RESERVATIONS_PER_SLOT: usize = 50_000;

/// The lunch and dinner grid offered when a catalog entry lists no slots.
pub const STANDARD_SLOTS: [Slot; 14] = [
    Slot::at(11, 0),
    Slot::at(11, 30),
    Slot::at(12, 0),
    Slot::at(12, 30),
    Slot::at(13, 0),
    Slot::at(13, 30),
    Slot::at(17, 30),
    Slot::at(18, 0),
    Slot::at(18, 30),
    Slot::at(19, 0),
    Slot::at(19, 30),
    Slot::at(20, 0),
    Slot::at(20, 30),
    Slot::at(21, 0),
];
