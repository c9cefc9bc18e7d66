use crate::amount::{Balance, Value};
use crate::tx::{TransactionId, UtxoPointer};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    #[serde(rename = "idx")]
    pub index: u32,
    #[serde(rename = "addr")]
    pub address: String,
    #[serde(rename = "val")]
    pub value: Value,
    /// Whether the output pays to one of the account's addresses.
    #[serde(default)]
    pub mine: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    #[serde(flatten)]
    pub pointer: UtxoPointer,
    #[serde(rename = "val")]
    pub value: Value,
    #[serde(default)]
    pub mine: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInfo {
    #[serde(rename = "txid")]
    pub transaction_id: TransactionId,
    #[serde(default)]
    pub block_height: Option<u32>,
    #[serde(default)]
    pub confirmations: u32,
    #[serde(default)]
    pub fee: Option<Value>,
    #[serde(rename = "from")]
    pub inputs: Vec<TxInput>,
    #[serde(rename = "to")]
    pub outputs: Vec<TxOutput>,
}

impl TransactionInfo {
    /// Net effect of the transaction on the account.
    pub fn net_amount(&self) -> Balance {
        let mut balance = Balance::zero();
        for output in self.outputs.iter().filter(|output| output.mine) {
            balance += &output.value;
        }
        for input in self.inputs.iter().filter(|input| input.mine) {
            balance -= &input.value;
        }
        balance
    }
}

/// Push message from the wallet engine to the ledger view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
pub enum LedgerNotification {
    TransactionsUpdated {
        #[serde(default)]
        inserted: Vec<TransactionInfo>,
        #[serde(default)]
        updated: Vec<TransactionInfo>,
    },
    /// Spends seen without full transaction data, e.g. from the mempool.
    OutputsSpent { pointers: Vec<UtxoPointer> },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Processing { confirmations: u32 },
    Completed,
}

/// What the UI shows for a wallet transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub transaction_id: TransactionId,
    pub amount: Balance,
    pub fee: Option<Value>,
    pub block_height: Option<u32>,
    pub status: TransactionStatus,
}

impl TransactionRecord {
    pub fn from_info(info: &TransactionInfo, confirmations_threshold: u32) -> Self {
        let status = match info.confirmations {
            0 => TransactionStatus::Pending,
            c if c >= confirmations_threshold => TransactionStatus::Completed,
            c => TransactionStatus::Processing { confirmations: c },
        };
        Self {
            transaction_id: info.transaction_id.clone(),
            amount: info.net_amount(),
            fee: info.fee,
            block_height: info.block_height,
            status,
        }
    }
}
