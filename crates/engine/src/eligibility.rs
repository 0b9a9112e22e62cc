//! Eligibility rules re-checked against the live order before a reminder is sent.
//!
//! Rules are evaluated in order and the first cancellation wins. Adding a business
//! rule means appending an [`EligibilityRule`] to [`default_rules`]; the delivery
//! loop does not change.

use relay_common::types::Order;

/// Order statuses after which a collection reminder is pointless.
pub const TERMINAL_ORDER_STATUSES: &[&str] = &["collected", "disposed", "cancelled"];

/// Return method of orders fulfilled by delivery rather than customer pickup.
pub const DELIVERY_RETURN_METHOD: &str = "delivery";

/// Why a reminder was cancelled instead of sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelReason {
    OrderNotFound,
    OrderTerminal(String),
    DeliveryFulfilled,
}

impl CancelReason {
    /// Stable code stored in `cancel_reason`.
    pub fn code(&self) -> &'static str {
        match self {
            CancelReason::OrderNotFound => "order_not_found",
            CancelReason::OrderTerminal(_) => "order_terminal",
            CancelReason::DeliveryFulfilled => "delivery_fulfilled",
        }
    }
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelReason::OrderNotFound => write!(f, "Order no longer exists"),
            CancelReason::OrderTerminal(status) => write!(f, "Order already {}", status),
            CancelReason::DeliveryFulfilled => {
                write!(f, "Order is fulfilled by delivery, no collection needed")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Proceed,
    Cancel(CancelReason),
}

/// A named predicate over the (possibly missing) order.
#[derive(Clone, Copy)]
pub struct EligibilityRule {
    pub name: &'static str,
    pub check: fn(Option<&Order>) -> Verdict,
}

impl std::fmt::Debug for EligibilityRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EligibilityRule")
            .field("name", &self.name)
            .finish()
    }
}

fn order_exists(order: Option<&Order>) -> Verdict {
    match order {
        Some(_) => Verdict::Proceed,
        None => Verdict::Cancel(CancelReason::OrderNotFound),
    }
}

fn order_not_terminal(order: Option<&Order>) -> Verdict {
    match order {
        Some(o) if TERMINAL_ORDER_STATUSES.contains(&o.status.as_str()) => {
            Verdict::Cancel(CancelReason::OrderTerminal(o.status.clone()))
        }
        _ => Verdict::Proceed,
    }
}

fn not_delivery_fulfilled(order: Option<&Order>) -> Verdict {
    match order.and_then(|o| o.return_method.as_deref()) {
        Some(DELIVERY_RETURN_METHOD) => Verdict::Cancel(CancelReason::DeliveryFulfilled),
        _ => Verdict::Proceed,
    }
}

/// The collection reminder rules, in evaluation order.
pub fn default_rules() -> Vec<EligibilityRule> {
    vec![
        EligibilityRule {
            name: "order_exists",
            check: order_exists,
        },
        EligibilityRule {
            name: "order_not_terminal",
            check: order_not_terminal,
        },
        EligibilityRule {
            name: "not_delivery_fulfilled",
            check: not_delivery_fulfilled,
        },
    ]
}

/// Run `rules` in order; returns the first failing rule's name and reason.
pub fn evaluate(
    rules: &[EligibilityRule],
    order: Option<&Order>,
) -> Result<(), (&'static str, CancelReason)> {
    for rule in rules {
        if let Verdict::Cancel(reason) = (rule.check)(order) {
            return Err((rule.name, reason));
        }
    }
    Ok(())
}
