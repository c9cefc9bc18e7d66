pub mod accumulator;
pub mod balance_verification;

use crate::amount::Value;
use crate::config::ChainParams;
use crate::error::SendError;
use crate::fee::{LinearFeeEstimator, TransactionFeeEstimator};
use crate::selection::accumulator::{AccumulatingSelection, SelectionOrder};
use crate::selection::balance_verification::verify_io_balance;
use crate::tx::{CandidateTransaction, UTxOBuilder, UTxODetails};
use crate::validator::{AddressValidator, Base58AddressValidator, PluginData};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Ordering applied to inputs and outputs of a built transaction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortPolicy {
    /// Spend the smallest outputs first to keep the wallet from fragmenting.
    #[default]
    AscendingValue,
    /// Spend outputs in ledger order.
    DeclaredOrder,
    /// Smallest-first selection, then BIP-69 ordering of inputs (by outpoint)
    /// and outputs (by value, then address).
    Bip69,
}

impl SortPolicy {
    fn selection_order(&self) -> SelectionOrder {
        match self {
            SortPolicy::AscendingValue | SortPolicy::Bip69 => SelectionOrder::SmallestFirst,
            SortPolicy::DeclaredOrder => SelectionOrder::Declared,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendRequest {
    pub address: String,
    pub amount: Decimal,
    #[serde(default)]
    pub plugin_data: Vec<PluginData>,
    pub fee_rate: i64,
    #[serde(default)]
    pub sort_policy: SortPolicy,
}

impl SendRequest {
    pub fn new(address: impl Into<String>, amount: Decimal, fee_rate: i64) -> Self {
        Self {
            address: address.into(),
            amount,
            plugin_data: vec![],
            fee_rate,
            sort_policy: SortPolicy::default(),
        }
    }

    pub fn with_plugin_data(mut self, plugin_data: Vec<PluginData>) -> Self {
        self.plugin_data = plugin_data;
        self
    }

    pub fn with_sort_policy(mut self, sort_policy: SortPolicy) -> Self {
        self.sort_policy = sort_policy;
        self
    }
}

pub struct InputOutputSetup {
    pub output_balance: Value,
    pub fixed_outputs: Vec<UTxOBuilder>,
    pub change_address: String,
    pub plugin_payloads: usize,
    pub fee_rate: i64,
    pub dust_threshold: Value,
}

#[derive(Clone, Debug)]
pub struct InputSelectionResult {
    pub chosen_inputs: Vec<UTxODetails>,
    pub fixed_outputs: Vec<UTxOBuilder>,
    pub changes: Vec<UTxOBuilder>,
    pub fee: Value,
}

impl InputSelectionResult {
    pub fn is_balanced(&self) -> bool {
        let outputs: Vec<_> = self
            .fixed_outputs
            .iter()
            .chain(self.changes.iter())
            .cloned()
            .collect();
        verify_io_balance(&self.chosen_inputs, &outputs, &self.fee).is_ok()
    }
}

pub trait InputSelectionAlgorithm {
    fn set_available_inputs(&mut self, available_inputs: Vec<UTxODetails>);

    /// Inputs that were not chosen by the last selection.
    fn available_inputs(&self) -> Vec<UTxODetails>;

    fn select_inputs(
        &mut self,
        estimator: &dyn TransactionFeeEstimator,
        setup: InputOutputSetup,
    ) -> Result<InputSelectionResult, SendError>;
}

/// Validates a send request and turns it into a balanced candidate
/// transaction over a ledger snapshot.
pub struct TransactionBuilder {
    params: ChainParams,
    validator: Arc<dyn AddressValidator>,
    estimator: Arc<dyn TransactionFeeEstimator>,
}

impl TransactionBuilder {
    pub fn new(
        params: ChainParams,
        validator: Arc<dyn AddressValidator>,
        estimator: Arc<dyn TransactionFeeEstimator>,
    ) -> Self {
        Self {
            params,
            validator,
            estimator,
        }
    }

    pub fn for_chain(params: ChainParams) -> Self {
        let validator = Arc::new(Base58AddressValidator::new(&params));
        let estimator = Arc::new(LinearFeeEstimator::new(params.fee_weights));
        Self::new(params, validator, estimator)
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    pub fn validator(&self) -> &dyn AddressValidator {
        self.validator.as_ref()
    }

    pub fn estimator(&self) -> &dyn TransactionFeeEstimator {
        self.estimator.as_ref()
    }

    fn check_rate_and_amount(&self, fee_rate: i64, amount: Decimal) -> Result<Value, SendError> {
        if fee_rate <= 0 {
            return Err(SendError::FeeRateInvalid(fee_rate));
        }
        let dust = self.params.dust_threshold;
        let value = Value::from_decimal(amount, self.params.decimals, dust)?;
        if value.is_zero() || value < dust {
            return Err(SendError::AmountBelowDust { amount, dust });
        }
        Ok(value)
    }

    #[allow(clippy::too_many_arguments)]
    fn run_selection(
        &self,
        destination: &str,
        amount: Value,
        plugin_payloads: usize,
        fee_rate: i64,
        sort_policy: SortPolicy,
        available: Vec<UTxODetails>,
        change_address: &str,
    ) -> Result<InputSelectionResult, SendError> {
        let mut algorithm = AccumulatingSelection::new(sort_policy.selection_order());
        algorithm.set_available_inputs(available);
        let result = algorithm.select_inputs(
            self.estimator.as_ref(),
            InputOutputSetup {
                output_balance: amount,
                fixed_outputs: vec![UTxOBuilder::destination(destination, amount)],
                change_address: change_address.to_string(),
                plugin_payloads,
                fee_rate,
                dust_threshold: self.params.dust_threshold,
            },
        )?;

        let untouched: Value = algorithm
            .available_inputs()
            .iter()
            .map(|utxo| utxo.value)
            .sum();
        tracing::debug!(
            "{} outputs worth {} left for later sends",
            algorithm.available_inputs().len(),
            untouched
        );
        Ok(result)
    }

    /// Builds the transaction for `request` from `available`, which must be
    /// a snapshot taken once for this send.
    pub fn build(
        &self,
        request: &SendRequest,
        available: Vec<UTxODetails>,
        change_address: &str,
    ) -> Result<CandidateTransaction, SendError> {
        self.validator
            .validate(&request.address, &request.plugin_data)?;
        let amount = self.check_rate_and_amount(request.fee_rate, request.amount)?;

        let result = self.run_selection(
            &request.address,
            amount,
            request.plugin_data.len(),
            request.fee_rate,
            request.sort_policy,
            available,
            change_address,
        )?;

        let mut inputs = result.chosen_inputs;
        let mut outputs: Vec<_> = result
            .fixed_outputs
            .into_iter()
            .chain(result.changes.into_iter())
            .collect();
        if request.sort_policy == SortPolicy::Bip69 {
            inputs.sort_by(|left, right| left.pointer.cmp(&right.pointer));
            outputs.sort_by(|left, right| {
                left.value
                    .cmp(&right.value)
                    .then_with(|| left.address.cmp(&right.address))
            });
        }

        verify_io_balance(&inputs, &outputs, &result.fee)?;

        Ok(CandidateTransaction {
            inputs,
            outputs,
            fee: result.fee,
        })
    }

    /// Fee shown before sending `amount`. When the funds don't cover it, the
    /// fee of sending everything is returned instead.
    pub fn fee(
        &self,
        amount: Decimal,
        address: Option<&str>,
        plugin_data: &[PluginData],
        fee_rate: i64,
        available: Vec<UTxODetails>,
    ) -> Result<Value, SendError> {
        if let Some(address) = address {
            self.validator.validate(address, plugin_data)?;
        }
        let amount = self.check_rate_and_amount(fee_rate, amount)?;
        let inputs = available.len();

        // the size model does not depend on the destination
        match self.run_selection(
            address.unwrap_or_default(),
            amount,
            plugin_data.len(),
            fee_rate,
            SortPolicy::default(),
            available,
            address.unwrap_or_default(),
        ) {
            Ok(result) => Ok(result.fee),
            Err(SendError::InsufficientFunds { .. }) => {
                self.estimator
                    .estimate_fee(inputs, 1, plugin_data.len(), fee_rate)
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::amount::Value;
    use crate::error::{SendError, SendErrorKind};
    use crate::ledger::tests::{ledger_with, params, OWN_ADDRESS};
    use crate::selection::{SendRequest, SortPolicy, TransactionBuilder};
    use crate::tx::OutputKind;
    use crate::validator::tests::MAINNET_ADDRESS;
    use crate::validator::PluginData;
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn duffs(value: u64) -> Decimal {
        Value::from(value).to_decimal(8)
    }

    fn builder() -> TransactionBuilder {
        TransactionBuilder::for_chain(params())
    }

    #[test]
    fn builds_smallest_first_with_change() {
        let ledger = ledger_with(&[50000, 30000, 20000]);
        let request = SendRequest::new(MAINNET_ADDRESS, Decimal::from_str("0.0007").unwrap(), 1);

        let candidate = builder()
            .build(&request, ledger.snapshot(None).unwrap(), OWN_ADDRESS)
            .unwrap();

        let inputs: Vec<u64> = candidate.inputs.iter().map(|i| i.value.into()).collect();
        assert_eq!(inputs, vec![30000, 50000]);
        assert_eq!(candidate.fee, Value::from(700));
        assert_eq!(candidate.outputs.len(), 2);
        assert_eq!(candidate.outputs[0].address, MAINNET_ADDRESS);
        assert_eq!(candidate.outputs[0].value, Value::from(70000));
        let change = candidate.change().unwrap();
        assert_eq!(change.value, Value::from(9300));
        assert_eq!(change.address, OWN_ADDRESS);
        assert_eq!(
            candidate.input_value(),
            candidate.output_value() + candidate.fee
        );
    }

    #[test]
    fn whole_balance_boundary() {
        let ledger = ledger_with(&[50000, 30000, 20000]);
        let builder = builder();

        let request = SendRequest::new(MAINNET_ADDRESS, duffs(99250), 1);
        let candidate = builder
            .build(&request, ledger.snapshot(None).unwrap(), OWN_ADDRESS)
            .unwrap();
        assert_eq!(candidate.inputs.len(), 3);
        assert!(candidate.change().is_none());
        assert_eq!(candidate.fee, Value::from(750));

        let request = SendRequest::new(MAINNET_ADDRESS, duffs(99251), 1);
        let err = builder
            .build(&request, ledger.snapshot(None).unwrap(), OWN_ADDRESS)
            .unwrap_err();
        assert_eq!(err.kind(), SendErrorKind::InsufficientFunds);
    }

    #[test]
    fn send_just_under_balance_succeeds() {
        let ledger = ledger_with(&[50000, 30000, 20000]);
        let request = SendRequest::new(MAINNET_ADDRESS, duffs(95000), 1);
        let candidate = builder()
            .build(&request, ledger.snapshot(None).unwrap(), OWN_ADDRESS)
            .unwrap();
        assert_eq!(candidate.inputs.len(), 3);
        assert_eq!(candidate.fee, Value::from(850));
        assert_eq!(candidate.change().unwrap().value, Value::from(4150));
    }

    #[test]
    fn amounts_past_any_balance_are_insufficient() {
        let ledger = ledger_with(&[50000, 30000, 20000]);
        let builder = builder();
        let expected = SendError::InsufficientFunds {
            required: Value::MAX,
            available: Value::from(100000),
        };

        // just below u64::MAX duffs, and beyond it
        for amount in ["184467440737.09551000", "1000000000000"] {
            let request = SendRequest::new(MAINNET_ADDRESS, Decimal::from_str(amount).unwrap(), 1);
            let err = builder
                .build(&request, ledger.snapshot(None).unwrap(), OWN_ADDRESS)
                .unwrap_err();
            assert_eq!(err, expected, "{}", amount);

            assert_eq!(
                builder
                    .fee(
                        Decimal::from_str(amount).unwrap(),
                        Some(MAINNET_ADDRESS),
                        &[],
                        1,
                        ledger.snapshot(None).unwrap()
                    )
                    .unwrap(),
                Value::from(750)
            );
        }
    }

    #[test]
    fn zero_and_dust_amounts_are_rejected() {
        let ledger = ledger_with(&[50000]);
        for amount in [Decimal::ZERO, duffs(545), Decimal::from_str("0.000000001").unwrap()] {
            let request = SendRequest::new(MAINNET_ADDRESS, amount, 1);
            let err = builder()
                .build(&request, ledger.snapshot(None).unwrap(), OWN_ADDRESS)
                .unwrap_err();
            assert_eq!(err.kind(), SendErrorKind::AmountBelowDust, "{}", amount);
        }
        let request = SendRequest::new(MAINNET_ADDRESS, duffs(546), 1);
        assert!(builder()
            .build(&request, ledger.snapshot(None).unwrap(), OWN_ADDRESS)
            .is_ok());
    }

    #[test]
    fn validation_comes_first() {
        // invalid address wins over an empty ledger and a zero amount
        let request = SendRequest::new("yLKU4EJxjbv8peagVRM3UykZDJoaUUrXSn", Decimal::ZERO, 0);
        let err = builder().build(&request, vec![], OWN_ADDRESS).unwrap_err();
        assert_eq!(err.kind(), SendErrorKind::InvalidAddress);

        let request = SendRequest::new(MAINNET_ADDRESS, duffs(1000), 0);
        let err = builder().build(&request, vec![], OWN_ADDRESS).unwrap_err();
        assert_eq!(err.kind(), SendErrorKind::FeeRateInvalid);

        let request = SendRequest::new(MAINNET_ADDRESS, duffs(1000), 1).with_plugin_data(vec![
            PluginData::Raw {
                id: 9,
                payload: vec![1],
            },
        ]);
        let err = builder().build(&request, vec![], OWN_ADDRESS).unwrap_err();
        assert_eq!(err.kind(), SendErrorKind::UnsupportedPluginData);
    }

    #[test]
    fn plugin_payload_costs_extra() {
        let mut params = params();
        params.supported_plugins = vec![PluginData::TIME_LOCK_ID];
        let builder = TransactionBuilder::for_chain(params);
        let ledger = ledger_with(&[50000, 30000, 20000]);
        let request = SendRequest::new(MAINNET_ADDRESS, duffs(70000), 1).with_plugin_data(vec![
            PluginData::TimeLock {
                lock_time_interval: 3600,
            },
        ]);

        let candidate = builder
            .build(&request, ledger.snapshot(None).unwrap(), OWN_ADDRESS)
            .unwrap();
        assert_eq!(candidate.fee, Value::from(750));
        assert_eq!(candidate.change().unwrap().value, Value::from(9250));
    }

    #[test]
    fn bip69_orders_inputs_and_outputs() {
        let ledger = ledger_with(&[50000, 30000, 20000]);
        let request = SendRequest::new(MAINNET_ADDRESS, duffs(70000), 1)
            .with_sort_policy(SortPolicy::Bip69);

        let candidate = builder()
            .build(&request, ledger.snapshot(None).unwrap(), OWN_ADDRESS)
            .unwrap();
        let indices: Vec<u32> = candidate
            .inputs
            .iter()
            .map(|input| input.pointer.output_index)
            .collect();
        assert_eq!(indices, vec![0, 1]);
        assert_eq!(candidate.outputs[0].kind, OutputKind::Change);
        assert_eq!(candidate.outputs[1].kind, OutputKind::Destination);
    }

    #[test]
    fn build_is_deterministic() {
        let ledger = ledger_with(&[1000, 7000, 7000, 3000, 90000, 546]);
        let request = SendRequest::new(MAINNET_ADDRESS, duffs(15000), 1);
        let first = builder()
            .build(&request, ledger.snapshot(None).unwrap(), OWN_ADDRESS)
            .unwrap();
        let second = builder()
            .build(&request, ledger.snapshot(None).unwrap(), OWN_ADDRESS)
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn fee_preview() {
        let ledger = ledger_with(&[50000, 30000, 20000]);
        let builder = builder();
        assert_eq!(
            builder
                .fee(duffs(70000), Some(MAINNET_ADDRESS), &[], 1, ledger.snapshot(None).unwrap())
                .unwrap(),
            Value::from(700)
        );
        assert_eq!(
            builder
                .fee(duffs(70000), None, &[], 1, ledger.snapshot(None).unwrap())
                .unwrap(),
            Value::from(700)
        );
        // more than the wallet holds: fee of sending everything
        assert_eq!(
            builder
                .fee(Decimal::ONE, None, &[], 1, ledger.snapshot(None).unwrap())
                .unwrap(),
            Value::from(750)
        );
    }

    proptest! {
        #[test]
        fn built_transactions_balance_exactly(
            values in proptest::collection::vec(1u64..200_000, 1..20),
            amount in 546u64..500_000,
            rate in 1i64..20,
        ) {
            let ledger = ledger_with(&values);
            let request = SendRequest::new(MAINNET_ADDRESS, duffs(amount), rate);
            if let Ok(candidate) = builder().build(&request, ledger.snapshot(None).unwrap(), OWN_ADDRESS) {
                prop_assert_eq!(
                    u64::from(candidate.input_value()),
                    u64::from(candidate.output_value()) + u64::from(candidate.fee)
                );
                prop_assert_eq!(candidate.outputs[0].value, Value::from(amount));
            }
        }
    }
}
