//! In-memory order gateway for replay runs and tests.
//!
//! Records every placement, cancellation and flatten instead of routing
//! anywhere. Interior mutability keeps the [`BrokerPort`] surface `&self`,
//! matching real gateway clients.

use std::cell::RefCell;
use tracing::info;

use crate::domain::error::EngineError;
use crate::ports::broker_port::{BrokerPort, Exposure, OrderId, OrderRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaperOrderStatus {
    Working,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct PaperOrder {
    pub id: OrderId,
    pub request: OrderRequest,
    pub status: PaperOrderStatus,
}

#[derive(Debug, Default)]
struct Ledger {
    orders: Vec<PaperOrder>,
    flattens: Vec<String>,
    next_id: u64,
}

#[derive(Debug, Default)]
pub struct PaperBroker {
    ledger: RefCell<Ledger>,
}

impl PaperBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn orders(&self) -> Vec<PaperOrder> {
        self.ledger.borrow().orders.clone()
    }

    pub fn working_orders(&self) -> usize {
        self.ledger
            .borrow()
            .orders
            .iter()
            .filter(|o| o.status == PaperOrderStatus::Working)
            .count()
    }

    pub fn cancelled_orders(&self) -> usize {
        self.ledger
            .borrow()
            .orders
            .iter()
            .filter(|o| o.status == PaperOrderStatus::Cancelled)
            .count()
    }

    pub fn flatten_count(&self) -> usize {
        self.ledger.borrow().flattens.len()
    }
}

impl BrokerPort for PaperBroker {
    fn place_order(&self, request: &OrderRequest) -> Result<OrderId, EngineError> {
        let mut ledger = self.ledger.borrow_mut();
        ledger.next_id += 1;
        let id = OrderId(format!("paper-{}", ledger.next_id));
        info!(
            order = %id.0,
            side = %request.side,
            quantity = request.quantity,
            tag = %request.tag,
            "paper order placed"
        );
        ledger.orders.push(PaperOrder {
            id: id.clone(),
            request: request.clone(),
            status: PaperOrderStatus::Working,
        });
        Ok(id)
    }

    fn cancel_order(&self, id: &OrderId) -> Result<(), EngineError> {
        let mut ledger = self.ledger.borrow_mut();
        match ledger.orders.iter_mut().find(|o| &o.id == id) {
            Some(order) => {
                order.status = PaperOrderStatus::Cancelled;
                info!(order = %id.0, "paper order cancelled");
                Ok(())
            }
            None => Err(EngineError::Broker {
                reason: format!("unknown order {}", id.0),
            }),
        }
    }

    fn flatten_all(&self, symbol: &str) -> Result<(), EngineError> {
        let mut ledger = self.ledger.borrow_mut();
        for order in ledger.orders.iter_mut() {
            if order.request.symbol == symbol && order.status == PaperOrderStatus::Working {
                order.status = PaperOrderStatus::Cancelled;
            }
        }
        ledger.flattens.push(symbol.to_string());
        info!(symbol, "paper flatten");
        Ok(())
    }

    fn open_exposure(&self, symbol: &str) -> Result<Exposure, EngineError> {
        let ledger = self.ledger.borrow();
        let working = ledger
            .orders
            .iter()
            .filter(|o| o.request.symbol == symbol && o.status == PaperOrderStatus::Working)
            .count();
        Ok(Exposure {
            position_quantity: 0,
            working_orders: working,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::breakout::Side;
    use crate::ports::broker_port::OrderKind;

    fn request() -> OrderRequest {
        OrderRequest {
            symbol: "MNQ".into(),
            side: Side::Long,
            quantity: 2,
            kind: OrderKind::Limit { price: 101.0 },
            stop_offset: 0.5,
            take_profit_offset: 1.0,
            tag: "opr-2024-03-15".into(),
        }
    }

    #[test]
    fn place_assigns_sequential_ids() {
        let broker = PaperBroker::new();
        let a = broker.place_order(&request()).unwrap();
        let b = broker.place_order(&request()).unwrap();
        assert_ne!(a, b);
        assert_eq!(broker.working_orders(), 2);
    }

    #[test]
    fn cancel_marks_order() {
        let broker = PaperBroker::new();
        let id = broker.place_order(&request()).unwrap();
        broker.cancel_order(&id).unwrap();
        assert_eq!(broker.working_orders(), 0);
        assert_eq!(broker.cancelled_orders(), 1);
    }

    #[test]
    fn cancel_unknown_order_errors() {
        let broker = PaperBroker::new();
        let err = broker.cancel_order(&OrderId("ghost".into())).unwrap_err();
        assert!(matches!(err, EngineError::Broker { .. }));
    }

    #[test]
    fn flatten_cancels_working_orders_for_symbol() {
        let broker = PaperBroker::new();
        broker.place_order(&request()).unwrap();
        let mut other = request();
        other.symbol = "YM".into();
        broker.place_order(&other).unwrap();

        broker.flatten_all("MNQ").unwrap();
        assert_eq!(broker.flatten_count(), 1);
        assert_eq!(broker.working_orders(), 1);
        assert_eq!(broker.open_exposure("YM").unwrap().working_orders, 1);
        assert_eq!(broker.open_exposure("MNQ").unwrap().working_orders, 0);
    }
}
