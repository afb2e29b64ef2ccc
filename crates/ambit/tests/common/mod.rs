//! Helpers shared by the behavioural tests.

use std::any::Any;

use ambit_pump::{Fault, Outcome};

/// Unwraps a successful outcome carrying a `T`.
pub fn value_of<T: Any>(outcome: Outcome) -> T {
    outcome
        .unwrap_or_else(|fault| panic!("unexpected fault: {fault}"))
        .and_then(|value| value.downcast::<T>().ok())
        .map_or_else(|| panic!("outcome did not carry the expected type"), |value| *value)
}

/// Unwraps a failed outcome.
pub fn fault_of(outcome: Outcome) -> Fault {
    outcome
        .err()
        .unwrap_or_else(|| panic!("expected the outcome to be a fault"))
}
