use crate::amount::Value;
use crate::config::FeeWeights;
use crate::error::SendError;

/// Turns a transaction shape and a fee rate into a concrete fee.
pub trait TransactionFeeEstimator: Send + Sync {
    /// Size in bytes, `None` when it doesn't fit in a `u64`.
    fn transaction_size(
        &self,
        inputs: usize,
        outputs: usize,
        plugin_payloads: usize,
    ) -> Option<u64>;

    fn estimate_fee(
        &self,
        inputs: usize,
        outputs: usize,
        plugin_payloads: usize,
        fee_rate: i64,
    ) -> Result<Value, SendError> {
        if fee_rate < 0 {
            return Err(SendError::FeeRateInvalid(fee_rate));
        }
        self.transaction_size(inputs, outputs, plugin_payloads)
            .and_then(|size| size.checked_mul(fee_rate as u64))
            .map(Value::new)
            .ok_or(SendError::FeeRateInvalid(fee_rate))
    }
}

/// Linear size model: a fixed base plus a per-item weight for every input,
/// output and plugin payload.
#[derive(Clone, Debug)]
pub struct LinearFeeEstimator {
    weights: FeeWeights,
}

impl LinearFeeEstimator {
    pub fn new(weights: FeeWeights) -> Self {
        Self { weights }
    }
}

impl TransactionFeeEstimator for LinearFeeEstimator {
    fn transaction_size(
        &self,
        inputs: usize,
        outputs: usize,
        plugin_payloads: usize,
    ) -> Option<u64> {
        let weighted = |count: usize, weight: u64| (count as u64).checked_mul(weight);
        self.weights
            .base
            .checked_add(weighted(inputs, self.weights.per_input)?)?
            .checked_add(weighted(outputs, self.weights.per_output)?)?
            .checked_add(weighted(plugin_payloads, self.weights.per_plugin)?)
    }
}
