use crate::account::AccountId;
use crate::error::SendError;
use crate::ledger::{LedgerView, TicketId};
use crate::selection::{SendRequest, TransactionBuilder};
use crate::tx::{CandidateTransaction, SignedTransaction, TransactionId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, Notify};
use tracing::{Instrument, Span};

/// Key service of the account.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    /// Address receiving the change of the next send.
    fn change_address(&self) -> String;

    async fn sign(&self, candidate: &CandidateTransaction) -> anyhow::Result<SignedTransaction>;
}

/// Network side of the wallet engine.
#[async_trait]
pub trait TransactionBroadcaster: Send + Sync {
    async fn broadcast(&self, transaction: &SignedTransaction) -> anyhow::Result<TransactionId>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmissionStage {
    Idle,
    Building,
    Signing,
    Broadcasting,
    Confirmed(TransactionId),
    Failed(SendError),
}

impl SubmissionStage {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SubmissionStage::Confirmed(_) | SubmissionStage::Failed(_)
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmissionEvent {
    pub ticket: TicketId,
    pub account: AccountId,
    pub stage: SubmissionStage,
}

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Best-effort cancellation of a send. Only honored before broadcasting.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    inner: Arc<CancelState>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Everything a single send needs from the account it is made for.
pub struct SendContext<'a> {
    pub account: &'a AccountId,
    pub ledger: &'a LedgerView,
    pub builder: &'a TransactionBuilder,
    pub signer: &'a dyn TransactionSigner,
    pub broadcaster: &'a dyn TransactionBroadcaster,
}

struct Ticket {
    id: TicketId,
    stage: SubmissionStage,
}

/// Runs sends to completion, at most one per account at a time.
pub struct SubmissionCoordinator {
    tickets: Mutex<HashMap<AccountId, Ticket>>,
    next_ticket: AtomicU64,
    events: broadcast::Sender<SubmissionEvent>,
    span: Span,
}

impl SubmissionCoordinator {
    const EVENTS_CAPACITY: usize = 128;

    pub fn new(span: Span) -> Self {
        let (events, _) = broadcast::channel(Self::EVENTS_CAPACITY);
        Self {
            tickets: Mutex::new(HashMap::new()),
            next_ticket: AtomicU64::new(1),
            events,
            span,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SubmissionEvent> {
        self.events.subscribe()
    }

    // the table is consistent after every statement, a panic elsewhere
    // can't leave it half-updated
    fn tickets(&self) -> MutexGuard<'_, HashMap<AccountId, Ticket>> {
        self.tickets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn stage(&self, account: &AccountId) -> SubmissionStage {
        self.tickets()
            .get(account)
            .map(|ticket| ticket.stage.clone())
            .unwrap_or(SubmissionStage::Idle)
    }

    fn publish(&self, ticket: TicketId, account: &AccountId, stage: SubmissionStage) {
        let _ = self.events.send(SubmissionEvent {
            ticket,
            account: account.clone(),
            stage,
        });
    }

    fn open_ticket(&self, account: &AccountId) -> Result<TicketId, SendError> {
        let id = {
            let mut tickets = self.tickets();
            if tickets.contains_key(account) {
                return Err(SendError::SendInFlight(account.clone()));
            }
            let id = self.next_ticket.fetch_add(1, Ordering::Relaxed);
            tickets.insert(
                account.clone(),
                Ticket {
                    id,
                    stage: SubmissionStage::Building,
                },
            );
            id
        };
        self.publish(id, account, SubmissionStage::Building);
        Ok(id)
    }

    fn advance(&self, account: &AccountId, ticket: TicketId, stage: SubmissionStage) {
        if let Some(current) = self.tickets().get_mut(account) {
            if current.id == ticket {
                current.stage = stage.clone();
            }
        }
        self.publish(ticket, account, stage);
    }

    fn close_ticket(&self, account: &AccountId, ticket: TicketId, stage: SubmissionStage) {
        self.publish(ticket, account, stage);
        {
            let mut tickets = self.tickets();
            if tickets.get(account).map(|current| current.id) == Some(ticket) {
                tickets.remove(account);
            }
        }
        self.publish(ticket, account, SubmissionStage::Idle);
    }

    /// Builds, signs and broadcasts `request`. Completes exactly once; a
    /// second send for the same account fails with `SendInFlight` while this
    /// one is running.
    pub async fn submit(
        &self,
        context: SendContext<'_>,
        request: SendRequest,
        cancel: CancelToken,
    ) -> Result<TransactionId, SendError> {
        let ticket = match self.open_ticket(context.account) {
            Ok(ticket) => ticket,
            Err(err) => {
                let _entered = self.span.enter();
                tracing::debug!("rejected send for {}: {}", context.account, err);
                return Err(err);
            }
        };
        let span = tracing::info_span!(parent: &self.span, "send", ticket, account = %context.account);

        let mut guard = TicketGuard {
            coordinator: self,
            ledger: context.ledger,
            account: context.account.clone(),
            ticket,
            broadcasting: false,
            finished: false,
        };
        let result = self
            .drive(&context, ticket, &request, &cancel, &mut guard)
            .instrument(span.clone())
            .await;

        let _entered = span.enter();
        guard.finish(&result);
        result
    }

    async fn drive(
        &self,
        context: &SendContext<'_>,
        ticket: TicketId,
        request: &SendRequest,
        cancel: &CancelToken,
        guard: &mut TicketGuard<'_>,
    ) -> Result<TransactionId, SendError> {
        let snapshot = context.ledger.snapshot(None)?;
        let candidate =
            context
                .builder
                .build(request, snapshot, &context.signer.change_address())?;
        if cancel.is_cancelled() {
            return Err(SendError::Cancelled);
        }
        context.ledger.reserve(ticket, &candidate.pointers())?;
        tracing::info!(
            "built transaction with {} inputs, fee {}",
            candidate.inputs.len(),
            candidate.fee
        );

        self.advance(context.account, ticket, SubmissionStage::Signing);
        let signed = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SendError::Cancelled),
            signed = context.signer.sign(&candidate) => {
                signed.map_err(|err| SendError::SigningFailed(format!("{err:#}")))?
            }
        };
        if cancel.is_cancelled() {
            return Err(SendError::Cancelled);
        }

        // from here on the transaction may reach the network
        guard.broadcasting = true;
        self.advance(context.account, ticket, SubmissionStage::Broadcasting);
        context
            .broadcaster
            .broadcast(&signed)
            .await
            .map_err(|err| SendError::BroadcastFailed(format!("{err:#}")))
    }
}

/// Closes the ticket of a send, including when the send future is dropped
/// half-way.
struct TicketGuard<'a> {
    coordinator: &'a SubmissionCoordinator,
    ledger: &'a LedgerView,
    account: AccountId,
    ticket: TicketId,
    broadcasting: bool,
    finished: bool,
}

impl TicketGuard<'_> {
    fn release(&self) {
        match self.ledger.release(self.ticket) {
            Ok(released) if !released.is_empty() => {
                tracing::debug!("released {} reserved inputs", released.len());
            }
            Ok(_) => {}
            Err(err) => tracing::warn!("can't release reserved inputs: {}", err),
        }
    }

    fn finish(&mut self, result: &Result<TransactionId, SendError>) {
        self.finished = true;
        let stage = match result {
            Ok(transaction_id) => {
                tracing::info!("transaction {} sent", transaction_id);
                SubmissionStage::Confirmed(transaction_id.clone())
            }
            Err(err) => {
                tracing::warn!("not sending due to {}", err);
                self.release();
                SubmissionStage::Failed(err.clone())
            }
        };
        self.coordinator
            .close_ticket(&self.account, self.ticket, stage);
    }
}

impl Drop for TicketGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        // an abandoned broadcast may still reach the network, its inputs stay
        // reserved until the spend is observed
        if !self.broadcasting {
            self.release();
        }
        tracing::warn!("send {} abandoned by the caller", self.ticket);
        self.coordinator.close_ticket(
            &self.account,
            self.ticket,
            SubmissionStage::Failed(SendError::Cancelled),
        );
    }
}
