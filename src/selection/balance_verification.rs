use crate::amount::{Balance, Value};
use crate::error::SendError;
use crate::tx::{UTxOBuilder, UTxODetails};
use itertools::Itertools;

/// Checks `sum(inputs) = sum(outputs) + fee` and that no output is spent
/// twice.
pub fn verify_io_balance(
    inputs: &[UTxODetails],
    outputs: &[UTxOBuilder],
    fee: &Value,
) -> Result<(), SendError> {
    if !inputs.iter().map(|input| &input.pointer).all_unique() {
        return Err(SendError::Ledger(format!(
            "found non unique input in transaction: {:?}",
            inputs.iter().map(|input| input.pointer.to_string()).collect::<Vec<_>>()
        )));
    }

    let mut balance = Balance::zero();
    for input in inputs.iter() {
        balance += &input.value;
    }
    for output in outputs.iter() {
        balance -= &output.value;
    }
    balance -= fee;

    if !balance.balanced() {
        return Err(SendError::Ledger(format!(
            "transaction is not balanced: balance {}",
            balance
        )));
    }

    Ok(())
}
