use crate::PsbtError;

pub type PsbtResult<T> = std::result::Result<T, PsbtError>;
