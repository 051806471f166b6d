//! Order gateway and account introspection port traits.
//!
//! Every call is side-effecting and fallible; the engine routes each state
//! transition through exactly one of these calls and never retries a failed
//! entry placement (a failed cancel is retried opportunistically on the next
//! bar).

use crate::domain::breakout::Side;
use crate::domain::error::EngineError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderId(pub String);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrderKind {
    Market,
    Limit { price: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub quantity: i64,
    pub kind: OrderKind,
    /// Protective stop distance from the fill, in price points.
    pub stop_offset: f64,
    /// Take-profit distance from the fill, in price points.
    pub take_profit_offset: f64,
    pub tag: String,
}

/// Open exposure snapshot for one symbol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Exposure {
    pub position_quantity: i64,
    pub working_orders: usize,
}

pub trait BrokerPort {
    fn place_order(&self, request: &OrderRequest) -> Result<OrderId, EngineError>;
    fn cancel_order(&self, id: &OrderId) -> Result<(), EngineError>;
    /// Cancel all working orders and close any open position for `symbol`.
    fn flatten_all(&self, symbol: &str) -> Result<(), EngineError>;
    fn open_exposure(&self, symbol: &str) -> Result<Exposure, EngineError>;
}

pub trait AccountPort {
    fn balance(&self) -> Result<f64, EngineError>;
    fn minimum_balance(&self) -> Result<f64, EngineError>;
}
