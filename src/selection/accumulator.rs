use crate::amount::Value;
use crate::error::SendError;
use crate::fee::TransactionFeeEstimator;
use crate::selection::{InputOutputSetup, InputSelectionAlgorithm, InputSelectionResult};
use crate::tx::{UTxOBuilder, UTxODetails};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionOrder {
    /// Smallest outputs first; superfluous small inputs are dropped again
    /// once the target is reached.
    SmallestFirst,
    /// Outputs are taken exactly in the order they were handed in.
    Declared,
}

/// Adds candidates one by one, re-estimating the fee after each one, until
/// the fixed outputs and the fee are covered.
pub struct AccumulatingSelection {
    available_inputs: Vec<UTxODetails>,
    order: SelectionOrder,
}

impl AccumulatingSelection {
    pub fn new(order: SelectionOrder) -> Self {
        Self {
            available_inputs: vec![],
            order,
        }
    }

    fn ordered_candidates(&self) -> Vec<UTxODetails> {
        let mut candidates = self.available_inputs.clone();
        if self.order == SelectionOrder::SmallestFirst {
            candidates.sort_by(|left, right| {
                left.value
                    .cmp(&right.value)
                    .then_with(|| left.pointer.cmp(&right.pointer))
            });
        }
        candidates
    }
}

impl InputSelectionAlgorithm for AccumulatingSelection {
    fn set_available_inputs(&mut self, available_inputs: Vec<UTxODetails>) {
        self.available_inputs = available_inputs;
    }

    fn available_inputs(&self) -> Vec<UTxODetails> {
        self.available_inputs.clone()
    }

    fn select_inputs(
        &mut self,
        estimator: &dyn TransactionFeeEstimator,
        setup: InputOutputSetup,
    ) -> Result<InputSelectionResult, SendError> {
        let candidates = self.ordered_candidates();
        let fixed_outputs = setup.fixed_outputs.len();
        let fee_for = |inputs: usize, outputs: usize| {
            estimator.estimate_fee(inputs, outputs, setup.plugin_payloads, setup.fee_rate)
        };
        // `None` when outputs plus fee don't fit in a `Value`, nothing covers that
        let required = |inputs: usize, outputs: usize| -> Result<Option<Value>, SendError> {
            Ok(setup
                .output_balance
                .checked_add(fee_for(inputs, outputs)?))
        };
        let covers = |total: Value, inputs: usize| -> Result<bool, SendError> {
            Ok(required(inputs, fixed_outputs)?.map_or(false, |required| total >= required))
        };

        let mut total = Value::zero();
        let mut end = None;
        for (position, candidate) in candidates.iter().enumerate() {
            total = total.saturating_add(candidate.value);
            if covers(total, position + 1)? {
                end = Some(position + 1);
                break;
            }
        }
        let end = match end {
            Some(end) => end,
            None => {
                return Err(SendError::InsufficientFunds {
                    required: required(candidates.len(), fixed_outputs)?.unwrap_or(Value::MAX),
                    available: total,
                })
            }
        };

        let mut start = 0;
        if self.order == SelectionOrder::SmallestFirst {
            while start + 1 < end {
                let without = total - candidates[start].value;
                if !covers(without, end - start - 1)? {
                    break;
                }
                total = without;
                start += 1;
            }
        }

        let chosen_inputs = candidates[start..end].to_vec();
        let inputs = chosen_inputs.len();

        let mut changes = vec![];
        let fee_with_change = fee_for(inputs, fixed_outputs + 1)?;
        let leftover = required(inputs, fixed_outputs + 1)?
            .and_then(|required| total.checked_sub(required))
            .unwrap_or_default();
        let fee = if leftover > setup.dust_threshold {
            changes.push(UTxOBuilder::change(setup.change_address.clone(), leftover));
            fee_with_change
        } else {
            // not worth an output, goes to the miner
            total - setup.output_balance
        };

        tracing::debug!(
            "selected {} of {} inputs, total {}, fee {}, change {}",
            inputs,
            candidates.len(),
            total,
            fee,
            leftover
        );

        self.available_inputs = candidates
            .into_iter()
            .enumerate()
            .filter(|(position, _)| *position < start || *position >= end)
            .map(|(_, candidate)| candidate)
            .collect();

        Ok(InputSelectionResult {
            chosen_inputs,
            fixed_outputs: setup.fixed_outputs,
            changes,
            fee,
        })
    }
}
