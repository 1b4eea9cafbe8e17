pub mod factory;
pub mod simulated;
mod traits;

pub use factory::build_exchange_client;
pub use simulated::SimulatedExchange;
pub use traits::{parse_exchange_kind, ExchangeClient, ExchangeKind};

#[cfg(test)]
pub use traits::MockExchangeClient;
