//! # ord-psbt
//!
//! Assembles unsigned Bitcoin transactions in PSBT form: UTXOs are selected
//! from a [`Datasource`], every input and output is classified by spending
//! format, the exact fee of the resulting transaction is computed and the
//! change amount converges before any signature exists.
//!
//! Legs prepared by another party, such as the signed seller input and
//! payment output of an instant trade, can be spliced in at fixed positions.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use bitcoin::{Amount, FeeRate, Network, PublicKey};
//! use ord_psbt::{Datasource, PsbtBuilder, PsbtBuilderArgs, TargetOutput};
//!
//! async fn pay(
//!     datasource: Arc<dyn Datasource>,
//!     public_key: PublicKey,
//! ) -> Result<String, Box<dyn std::error::Error>> {
//!     let mut args = PsbtBuilderArgs::new(
//!         "tb1qzc8dhpkg5e4t6xyn4zmexxljc4nkje59dg3ark",
//!         public_key,
//!         Network::Testnet,
//!         FeeRate::from_sat_per_vb(2).unwrap(),
//!         vec![TargetOutput {
//!             address: "tb1qax89amll2uas5k92tmuc8rdccmqddqw94vrr86".to_string(),
//!             value: Amount::from_sat(10_000),
//!         }],
//!     );
//!     args.datasource = Some(datasource);
//!
//!     let mut builder = PsbtBuilder::new(args)?;
//!     builder.prepare().await?;
//!
//!     Ok(builder.to_base64()?)
//! }
//! ```
//!

#[macro_use]
extern crate log;

mod error;
mod result;
pub mod utils;
pub mod wallet;

pub use bitcoin;
pub use error::PsbtError;
pub use result::PsbtResult;
pub use utils::constants;
pub use utils::encoding::{decode_psbt_base64, decode_psbt_hex, psbt_to_base64, psbt_to_hex};
pub use utils::fees::{fee_rate_from_sat_per_vb, FeeEstimator};
pub use wallet::{
    is_valid_address, parse_address, BuilderState, BuiltInput, Datasource, GetSpendablesArgs,
    InjectedInput, InjectedOutput, InputsToSign, PsbtBuilder, PsbtBuilderArgs, ScriptFormat,
    ScriptOrAddress, TargetOutput, Utxo,
};
