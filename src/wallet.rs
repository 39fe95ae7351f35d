pub mod builder;
mod datasource;
mod script_format;

pub use builder::{
    BuilderState, BuiltInput, InjectedInput, InjectedOutput, InputsToSign, PsbtBuilder,
    PsbtBuilderArgs, TargetOutput,
};
pub use datasource::{Datasource, GetSpendablesArgs, Utxo};
pub use script_format::{is_valid_address, parse_address, ScriptFormat, ScriptOrAddress};
