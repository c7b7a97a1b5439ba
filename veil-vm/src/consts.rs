//! Front-end constants.

/// Register slots the back-end processor provides per function.
pub const DEFAULT_REGISTER_LIMIT: usize = 10;

/// Ledger clock value at genesis. The timestamping mechanism is driven
/// externally; tests advance it manually.
pub const DEFAULT_INITIAL_TIME: u64 = 5555;
