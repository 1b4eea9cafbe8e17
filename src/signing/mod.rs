pub mod signer;

pub use signer::{encode_params, ApiCredentials, QuerySigner};
