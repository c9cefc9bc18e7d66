use crate::account::{Account, AccountId};
use crate::config::{AdapterConfig, ChainParams, SyncMode};
use crate::error::{AdapterError, SendError};
use crate::ledger::{Balances, LedgerView};
use crate::notification::{LedgerNotification, TransactionRecord};
use crate::selection::{SendRequest, SortPolicy, TransactionBuilder};
use crate::submission::{
    CancelToken, SendContext, SubmissionCoordinator, SubmissionEvent, TransactionBroadcaster,
    TransactionSigner,
};
use crate::tx::TransactionId;
use crate::validator::PluginData;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::Span;

const MNEMONIC_WORDS: usize = 12;

/// Dash binding for a single account: ledger, builder and the shared
/// submission coordinator behind the operations the send screen needs.
pub struct DashAdapter {
    account: Account,
    sync_mode: SyncMode,
    ledger: Arc<LedgerView>,
    builder: TransactionBuilder,
    coordinator: Arc<SubmissionCoordinator>,
    signer: Arc<dyn TransactionSigner>,
    broadcaster: Arc<dyn TransactionBroadcaster>,
    listener: Option<JoinHandle<()>>,
    span: Span,
}

impl DashAdapter {
    pub fn new(
        account: Account,
        config: &AdapterConfig,
        coordinator: Arc<SubmissionCoordinator>,
        signer: Arc<dyn TransactionSigner>,
        broadcaster: Arc<dyn TransactionBroadcaster>,
    ) -> Result<Self, AdapterError> {
        if account.mnemonic_word_count() != Some(MNEMONIC_WORDS) {
            return Err(AdapterError::UnsupportedAccount);
        }
        let sync_mode = config
            .sync_mode
            .ok_or_else(|| AdapterError::WrongParameters("sync mode is required".to_string()))?;

        let params = config.chain_params();
        let span = tracing::info_span!("dash_adapter", account = %account.id, network = ?params.network);
        let ledger = Arc::new(LedgerView::new(
            &params,
            tracing::debug_span!(parent: &span, "ledger"),
        ));
        {
            let _entered = span.enter();
            tracing::info!(
                "adapter created, sync mode {:?}, fee rate {}",
                sync_mode,
                params.fee_rate
            );
        }

        Ok(Self {
            account,
            sync_mode,
            ledger,
            builder: TransactionBuilder::for_chain(params),
            coordinator,
            signer,
            broadcaster,
            listener: None,
            span,
        })
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn sync_mode(&self) -> SyncMode {
        self.sync_mode
    }

    pub fn params(&self) -> &ChainParams {
        self.builder.params()
    }

    pub fn ledger(&self) -> &Arc<LedgerView> {
        &self.ledger
    }

    /// Starts applying notifications from `receiver` on the current tokio
    /// runtime. A previous listener is stopped.
    pub fn spawn_listener(&mut self, receiver: mpsc::Receiver<LedgerNotification>) {
        let handle = tokio::spawn(self.ledger.clone().listen(receiver));
        if let Some(previous) = self.listener.replace(handle) {
            previous.abort();
        }
    }

    fn decimals(&self) -> u32 {
        self.params().decimals
    }

    pub fn validate_address(
        &self,
        address: &str,
        plugin_data: &[PluginData],
    ) -> Result<(), SendError> {
        self.builder.validator().validate(address, plugin_data)
    }

    /// Largest amount a single send could carry right now.
    pub fn available_balance(&self, address: Option<&str>) -> Result<Decimal, SendError> {
        let value = self.ledger.available_balance(
            address,
            self.builder.estimator(),
            self.params().fee_rate,
        )?;
        Ok(value.to_decimal(self.decimals()))
    }

    pub fn estimate_fee(
        &self,
        inputs: usize,
        outputs: usize,
        plugin_payloads: usize,
    ) -> Result<Decimal, SendError> {
        let fee = self.builder.estimator().estimate_fee(
            inputs,
            outputs,
            plugin_payloads,
            self.params().fee_rate,
        )?;
        Ok(fee.to_decimal(self.decimals()))
    }

    /// Fee to display while the user edits the amount.
    pub fn fee(
        &self,
        amount: Decimal,
        address: Option<&str>,
        plugin_data: &[PluginData],
    ) -> Result<Decimal, SendError> {
        let fee = self.builder.fee(
            amount,
            address,
            plugin_data,
            self.params().fee_rate,
            self.ledger.snapshot(None)?,
        )?;
        Ok(fee.to_decimal(self.decimals()))
    }

    pub async fn send(
        &self,
        amount: Decimal,
        address: &str,
        plugin_data: Vec<PluginData>,
        sort_policy: SortPolicy,
        cancel: CancelToken,
    ) -> Result<TransactionId, SendError> {
        let request = SendRequest::new(address, amount, self.params().fee_rate)
            .with_plugin_data(plugin_data)
            .with_sort_policy(sort_policy);
        {
            let _entered = self.span.enter();
            tracing::debug!("sending {} to {}", amount, address);
        }
        self.coordinator
            .submit(
                SendContext {
                    account: &self.account.id,
                    ledger: &self.ledger,
                    builder: &self.builder,
                    signer: self.signer.as_ref(),
                    broadcaster: self.broadcaster.as_ref(),
                },
                request,
                cancel,
            )
            .await
    }

    pub fn balance(&self) -> Result<Balances, SendError> {
        self.ledger.balance()
    }

    pub fn subscribe_records(&self) -> broadcast::Receiver<Vec<TransactionRecord>> {
        self.ledger.subscribe_records()
    }

    /// Stage changes of sends made through the coordinator, for every account
    /// sharing it.
    pub fn subscribe_submissions(&self) -> broadcast::Receiver<SubmissionEvent> {
        self.coordinator.subscribe()
    }
}

impl Drop for DashAdapter {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

/// Live adapters by account.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<AccountId, Arc<DashAdapter>>,
}

impl AdapterRegistry {
    pub fn insert(&mut self, adapter: DashAdapter) -> Option<Arc<DashAdapter>> {
        self.adapters
            .insert(adapter.account().id.clone(), Arc::new(adapter))
    }

    pub fn get(&self, account: &AccountId) -> Option<Arc<DashAdapter>> {
        self.adapters.get(account).cloned()
    }

    pub fn remove(&mut self, account: &AccountId) -> Option<Arc<DashAdapter>> {
        self.adapters.remove(account)
    }

    /// Drops every adapter whose account is not listed in `keep`.
    pub fn clear_except(&mut self, keep: &[AccountId]) {
        self.adapters.retain(|account, _| keep.contains(account));
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
