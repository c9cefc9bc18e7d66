use crate::amount::Value;
use crate::config::ChainParams;
use crate::error::SendError;
use crate::fee::TransactionFeeEstimator;
use crate::notification::{LedgerNotification, TransactionInfo, TransactionRecord};
use crate::tx::{UTxODetails, UtxoPointer};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::{broadcast, mpsc};
use tracing::Span;

pub type TicketId = u64;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Balances {
    pub confirmed: Value,
    pub unconfirmed: Value,
}

#[derive(Default)]
struct LedgerState {
    // insertion order is the "declared" order used by the builder
    utxos: Vec<UTxODetails>,
    index: HashMap<UtxoPointer, usize>,
    // spends seen before the output itself was reported
    spent: HashSet<UtxoPointer>,
    reservations: HashMap<TicketId, Vec<UtxoPointer>>,
    reserved: HashSet<UtxoPointer>,
}

impl LedgerState {
    fn upsert(&mut self, utxo: UTxODetails) {
        match self.index.get(&utxo.pointer) {
            Some(&position) => {
                let existing = &mut self.utxos[position];
                existing.confirmations = utxo.confirmations;
                // spendability only ever goes from true to false
                existing.spendable &= utxo.spendable;
            }
            None => {
                let mut utxo = utxo;
                if self.spent.contains(&utxo.pointer) {
                    utxo.spendable = false;
                }
                self.index.insert(utxo.pointer.clone(), self.utxos.len());
                self.utxos.push(utxo);
            }
        }
    }

    fn mark_spent(&mut self, pointer: &UtxoPointer) {
        if let Some(&position) = self.index.get(pointer) {
            self.utxos[position].spendable = false;
        }
        self.spent.insert(pointer.clone());
        if self.reserved.remove(pointer) {
            self.reservations.retain(|_, pointers| {
                pointers.retain(|reserved| reserved != pointer);
                !pointers.is_empty()
            });
        }
    }

    fn apply_transaction(&mut self, info: &TransactionInfo) {
        for input in info.inputs.iter() {
            self.mark_spent(&input.pointer);
        }
        for output in info.outputs.iter().filter(|output| output.mine) {
            self.upsert(UTxODetails {
                pointer: UtxoPointer {
                    transaction_id: info.transaction_id.clone(),
                    output_index: output.index,
                },
                address: output.address.clone(),
                value: output.value,
                confirmations: info.confirmations,
                spendable: true,
            });
        }
    }
}

/// Spendable outputs of one account, fed by wallet engine notifications.
///
/// Every mutation (notification apply, reservation, release) takes the same
/// write lock, so readers never see a half-applied update.
pub struct LedgerView {
    state: RwLock<LedgerState>,
    records: broadcast::Sender<Vec<TransactionRecord>>,
    confirmations_threshold: u32,
    min_spend_confirmations: u32,
    span: Span,
}

impl LedgerView {
    const RECORDS_CAPACITY: usize = 64;

    pub fn new(params: &ChainParams, span: Span) -> Self {
        let (records, _) = broadcast::channel(Self::RECORDS_CAPACITY);
        Self {
            state: RwLock::new(LedgerState::default()),
            records,
            confirmations_threshold: params.confirmations_threshold,
            min_spend_confirmations: params.min_spend_confirmations,
            span,
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, LedgerState>, SendError> {
        self.state
            .read()
            .map_err(|_| SendError::Ledger("ledger lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, LedgerState>, SendError> {
        self.state
            .write()
            .map_err(|_| SendError::Ledger("ledger lock poisoned".to_string()))
    }

    pub fn subscribe_records(&self) -> broadcast::Receiver<Vec<TransactionRecord>> {
        self.records.subscribe()
    }

    pub fn apply(&self, notification: LedgerNotification) -> Result<(), SendError> {
        let _entered = self.span.enter();
        let records = {
            let mut state = self.write()?;
            match &notification {
                LedgerNotification::TransactionsUpdated { inserted, updated } => {
                    for info in inserted.iter().chain(updated.iter()) {
                        state.apply_transaction(info);
                    }
                    tracing::debug!(
                        "applied {} inserted and {} updated transactions, {} outputs tracked",
                        inserted.len(),
                        updated.len(),
                        state.utxos.len()
                    );
                    inserted
                        .iter()
                        .chain(updated.iter())
                        .map(|info| TransactionRecord::from_info(info, self.confirmations_threshold))
                        .collect::<Vec<_>>()
                }
                LedgerNotification::OutputsSpent { pointers } => {
                    for pointer in pointers.iter() {
                        state.mark_spent(pointer);
                    }
                    tracing::debug!("marked {} outputs as spent", pointers.len());
                    vec![]
                }
            }
        };

        if !records.is_empty() {
            // nobody listening is fine
            let _ = self.records.send(records);
        }
        Ok(())
    }

    /// Applies notifications until the sending side is dropped.
    pub async fn listen(self: Arc<Self>, mut receiver: mpsc::Receiver<LedgerNotification>) {
        while let Some(notification) = receiver.recv().await {
            if let Err(err) = self.apply(notification) {
                let _entered = self.span.enter();
                tracing::warn!("can't apply ledger notification: {}", err);
            }
        }
        let _entered = self.span.enter();
        tracing::debug!("ledger notification channel closed");
    }

    fn is_available(&self, state: &LedgerState, utxo: &UTxODetails) -> bool {
        utxo.spendable
            && utxo.confirmations >= self.min_spend_confirmations
            && !state.reserved.contains(&utxo.pointer)
    }

    /// Consistent copy of the outputs a new send may use, in ledger order.
    pub fn snapshot(&self, address: Option<&str>) -> Result<Vec<UTxODetails>, SendError> {
        let state = self.read()?;
        Ok(state
            .utxos
            .iter()
            .filter(|utxo| self.is_available(&state, utxo))
            .filter(|utxo| address.map_or(true, |address| utxo.address == address))
            .cloned()
            .collect())
    }

    /// What could be sent right now in a single-output transaction.
    pub fn available_balance(
        &self,
        address: Option<&str>,
        estimator: &dyn TransactionFeeEstimator,
        fee_rate: i64,
    ) -> Result<Value, SendError> {
        let utxos = self.snapshot(address)?;
        if utxos.is_empty() {
            return Ok(Value::zero());
        }
        let total: Value = utxos.iter().map(|utxo| utxo.value).sum();
        let fee = estimator.estimate_fee(utxos.len(), 1, 0, fee_rate)?;
        Ok(total.saturating_sub(fee))
    }

    pub fn balance(&self) -> Result<Balances, SendError> {
        let state = self.read()?;
        let mut balances = Balances::default();
        for utxo in state.utxos.iter().filter(|utxo| utxo.spendable) {
            if utxo.confirmations >= self.confirmations_threshold {
                balances.confirmed += &utxo.value;
            } else {
                balances.unconfirmed += &utxo.value;
            }
        }
        Ok(balances)
    }

    /// Holds the given outputs for `ticket`. Either all of them are reserved
    /// or none is.
    pub fn reserve(&self, ticket: TicketId, pointers: &[UtxoPointer]) -> Result<(), SendError> {
        let mut state = self.write()?;
        for pointer in pointers.iter() {
            let available = state
                .index
                .get(pointer)
                .map(|&position| &state.utxos[position])
                .map_or(false, |utxo| self.is_available(&state, utxo));
            if !available {
                return Err(SendError::Ledger(format!(
                    "output {} is not available for spending",
                    pointer
                )));
            }
        }
        for pointer in pointers.iter() {
            state.reserved.insert(pointer.clone());
        }
        state
            .reservations
            .entry(ticket)
            .or_default()
            .extend(pointers.iter().cloned());
        Ok(())
    }

    /// Drops the reservation of `ticket` and returns the freed outputs.
    pub fn release(&self, ticket: TicketId) -> Result<Vec<UtxoPointer>, SendError> {
        let mut state = self.write()?;
        let released = state.reservations.remove(&ticket).unwrap_or_default();
        for pointer in released.iter() {
            state.reserved.remove(pointer);
        }
        Ok(released)
    }

    pub fn is_reserved(&self, pointer: &UtxoPointer) -> Result<bool, SendError> {
        Ok(self.read()?.reserved.contains(pointer))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use crate::amount::Value;
    use crate::config::{ChainParams, FeeWeights, Network};
    use crate::error::SendErrorKind;
    use crate::fee::LinearFeeEstimator;
    use crate::ledger::{Balances, LedgerView};
    use crate::notification::{LedgerNotification, TransactionInfo, TxInput, TxOutput};
    use crate::tx::{TransactionId, UtxoPointer};
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use tracing::Span;

    pub const OWN_ADDRESS: &str = "XbKzysY6LYGbsGwNG8B7K1BRoA1ffLodAT";

    pub fn params() -> ChainParams {
        let mut params = ChainParams::dash(Network::Mainnet);
        params.fee_weights = FeeWeights {
            base: 200,
            per_input: 150,
            per_output: 100,
            per_plugin: 50,
        };
        params
    }

    pub fn estimator() -> LinearFeeEstimator {
        LinearFeeEstimator::new(params().fee_weights)
    }

    pub fn receive(txid: &str, values: &[u64], confirmations: u32) -> LedgerNotification {
        LedgerNotification::TransactionsUpdated {
            inserted: vec![TransactionInfo {
                transaction_id: TransactionId::new(txid),
                block_height: None,
                confirmations,
                fee: None,
                inputs: vec![],
                outputs: values
                    .iter()
                    .enumerate()
                    .map(|(index, value)| TxOutput {
                        index: index as u32,
                        address: OWN_ADDRESS.to_string(),
                        value: Value::from(*value),
                        mine: true,
                    })
                    .collect(),
            }],
            updated: vec![],
        }
    }

    pub fn pointer(txid: &str, index: u32) -> UtxoPointer {
        UtxoPointer {
            transaction_id: TransactionId::new(txid),
            output_index: index,
        }
    }

    pub fn ledger_with(values: &[u64]) -> LedgerView {
        let ledger = LedgerView::new(&params(), Span::none());
        ledger.apply(receive("aa", values, 6)).unwrap();
        ledger
    }

    #[test]
    fn available_balance_subtracts_spend_all_fee() {
        let ledger = ledger_with(&[50000, 30000, 20000]);
        // 100000 - (200 + 3 * 150 + 100)
        assert_eq!(
            ledger.available_balance(None, &estimator(), 1).unwrap(),
            Value::from(99250)
        );
        assert_eq!(
            ledger
                .available_balance(Some("Xsomeone"), &estimator(), 1)
                .unwrap(),
            Value::zero()
        );
    }

    #[test]
    fn available_balance_floors_at_zero() {
        let ledger = ledger_with(&[300]);
        assert_eq!(
            ledger.available_balance(None, &estimator(), 1).unwrap(),
            Value::zero()
        );
    }

    #[test]
    fn reservations_hide_outputs() {
        let ledger = ledger_with(&[50000, 30000, 20000]);
        ledger.reserve(1, &[pointer("aa", 0)]).unwrap();
        assert_eq!(ledger.snapshot(None).unwrap().len(), 2);
        assert_eq!(
            ledger.available_balance(None, &estimator(), 1).unwrap(),
            Value::from(50000 - 600)
        );

        let err = ledger
            .reserve(2, &[pointer("aa", 1), pointer("aa", 0)])
            .unwrap_err();
        assert_eq!(err.kind(), SendErrorKind::Ledger);
        // all or nothing
        assert!(!ledger.is_reserved(&pointer("aa", 1)).unwrap());

        assert_eq!(ledger.release(1).unwrap(), vec![pointer("aa", 0)]);
        assert_eq!(ledger.snapshot(None).unwrap().len(), 3);
        assert!(ledger.release(1).unwrap().is_empty());
    }

    #[test]
    fn observed_spend_drops_reservation() {
        let ledger = ledger_with(&[50000, 30000]);
        ledger
            .reserve(7, &[pointer("aa", 0), pointer("aa", 1)])
            .unwrap();
        ledger
            .apply(LedgerNotification::OutputsSpent {
                pointers: vec![pointer("aa", 0)],
            })
            .unwrap();
        assert!(!ledger.is_reserved(&pointer("aa", 0)).unwrap());
        assert!(ledger.is_reserved(&pointer("aa", 1)).unwrap());
        assert!(ledger.snapshot(None).unwrap().is_empty());
        assert_eq!(ledger.release(7).unwrap(), vec![pointer("aa", 1)]);
        assert_eq!(ledger.snapshot(None).unwrap().len(), 1);
    }

    #[test]
    fn updates_never_resurrect_spent_outputs() {
        let ledger = ledger_with(&[50000]);
        ledger
            .apply(LedgerNotification::TransactionsUpdated {
                inserted: vec![TransactionInfo {
                    transaction_id: TransactionId::new("bb"),
                    block_height: Some(10),
                    confirmations: 0,
                    fee: Some(Value::from(226)),
                    inputs: vec![TxInput {
                        pointer: pointer("aa", 0),
                        value: Value::from(50000),
                        mine: true,
                    }],
                    outputs: vec![],
                }],
                updated: vec![],
            })
            .unwrap();
        assert!(ledger.snapshot(None).unwrap().is_empty());

        // same output reported again with more confirmations
        ledger.apply(receive("aa", &[50000], 12)).unwrap();
        assert!(ledger.snapshot(None).unwrap().is_empty());
        assert_eq!(ledger.balance().unwrap(), Balances::default());
    }

    #[test]
    fn spend_seen_before_output() {
        let ledger = LedgerView::new(&params(), Span::none());
        ledger
            .apply(LedgerNotification::OutputsSpent {
                pointers: vec![pointer("cc", 0)],
            })
            .unwrap();
        ledger.apply(receive("cc", &[1000], 1)).unwrap();
        assert!(ledger.snapshot(None).unwrap().is_empty());
    }

    #[test]
    fn confirmed_and_unconfirmed_balance() {
        let ledger = ledger_with(&[50000]);
        ledger.apply(receive("bb", &[7000], 1)).unwrap();
        assert_eq!(
            ledger.balance().unwrap(),
            Balances {
                confirmed: Value::from(50000),
                unconfirmed: Value::from(7000),
            }
        );
        ledger.apply(receive("bb", &[7000], 3)).unwrap();
        assert_eq!(ledger.balance().unwrap().confirmed, Value::from(57000));
    }

    #[test]
    fn min_spend_confirmations_filter() {
        let mut params = params();
        params.min_spend_confirmations = 1;
        let ledger = LedgerView::new(&params, Span::none());
        ledger.apply(receive("aa", &[1000], 0)).unwrap();
        assert!(ledger.snapshot(None).unwrap().is_empty());
        ledger.apply(receive("aa", &[1000], 1)).unwrap();
        assert_eq!(ledger.snapshot(None).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn listener_applies_pushed_notifications() {
        let ledger = Arc::new(LedgerView::new(&params(), Span::none()));
        let mut records = ledger.subscribe_records();
        let (sender, receiver) = mpsc::channel(8);
        let handle = tokio::spawn(ledger.clone().listen(receiver));

        sender.send(receive("dd", &[1000, 2000], 0)).await.unwrap();
        let received = records.recv().await.unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].transaction_id, TransactionId::new("dd"));

        drop(sender);
        handle.await.unwrap();
        assert_eq!(ledger.snapshot(None).unwrap().len(), 2);
    }
}
