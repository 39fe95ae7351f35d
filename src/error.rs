use thiserror::Error;

/// PSBT building error
#[derive(Error, Debug)]
pub enum PsbtError {
    #[error("invalid fee rate: {rate} (must be a non-negative integer)")]
    InvalidFeeRate { rate: f64 },
    #[error("malformed transaction: {0}")]
    MalformedTransaction(String),
    #[error("input {index} has no resolvable previous output script")]
    InvalidScript { index: usize },
    #[error("output amount {amount} sats is below the dust floor")]
    DustOutput { amount: u64 },
    #[error("computed fee {fee} sats exceeds the hard fee ceiling")]
    FeeCalculationError { fee: u64 },
    #[error("insufficient funds: short by {shortfall} sats")]
    InsufficientFunds { shortfall: u64 },
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("no datasource configured")]
    MissingDatasource,
    #[error("psbt is not prepared")]
    NotPrepared,
    #[error("datasource error: {0}")]
    Datasource(String),
    #[error("PSBT error: {0}")]
    Psbt(#[from] bitcoin::psbt::Error),
    #[error("consensus decoding error: {0}")]
    Consensus(#[from] bitcoin::consensus::encode::Error),
    #[error("hex decoding error: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("base64 decoding error: {0}")]
    Base64(#[from] base64::DecodeError),
}
