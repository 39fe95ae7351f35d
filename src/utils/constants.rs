use bitcoin::Sequence;

/// Smallest output value, in satoshis, the builder will create or accept as a payment total.
pub const DUST_FLOOR: u64 = 600;

/// Hard ceiling on any computed network fee, in satoshis.
pub const MAX_FEE_CEILING: u64 = 5_000_000;

/// Sequence number for inputs when replace-by-fee is signalled.
pub const RBF_ENABLED_SEQUENCE: Sequence = Sequence::ENABLE_RBF_NO_LOCKTIME;

/// Sequence number for inputs when replace-by-fee is not signalled.
pub const RBF_DISABLED_SEQUENCE: Sequence = Sequence::MAX;

/// Input index reserved for the counterparty leg of an instant trade.
pub const INSTANT_TRADE_RESERVED_INDEX: usize = 2;

/// Number of fee recomputation passes run once the inputs cover the outputs.
pub const MAX_FEE_PASSES: usize = 2;

/// Witness marker and flag overhead, in weight units.
pub const WITNESS_MARKER_WEIGHT: u64 = 2;
