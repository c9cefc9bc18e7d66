use crate::amount::Value;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Transaction hash in display (hex) form.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct TransactionId(String);

impl TransactionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().to_lowercase())
    }

    /// Builds the display form from the internal (little-endian) hash bytes.
    pub fn from_hash_bytes(bytes: &[u8; 32]) -> Self {
        let mut reversed = *bytes;
        reversed.reverse();
        Self(hex::encode(reversed))
    }
}

impl From<String> for TransactionId {
    fn from(id: String) -> Self {
        TransactionId::new(id)
    }
}

impl From<TransactionId> for String {
    fn from(id: TransactionId) -> Self {
        id.0
    }
}

impl AsRef<str> for TransactionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UtxoPointer {
    #[serde(rename = "txid")]
    pub transaction_id: TransactionId,
    #[serde(rename = "idx")]
    pub output_index: u32,
}

impl fmt::Display for UtxoPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.transaction_id, self.output_index)
    }
}

/// An output owned by the account, as tracked by the ledger view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UTxODetails {
    pub pointer: UtxoPointer,
    pub address: String,
    pub value: Value,
    pub confirmations: u32,
    pub spendable: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    Destination,
    Change,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UTxOBuilder {
    pub address: String,
    pub value: Value,
    pub kind: OutputKind,
}

impl UTxOBuilder {
    pub fn destination(address: impl Into<String>, value: Value) -> Self {
        Self {
            address: address.into(),
            value,
            kind: OutputKind::Destination,
        }
    }

    pub fn change(address: impl Into<String>, value: Value) -> Self {
        Self {
            address: address.into(),
            value,
            kind: OutputKind::Change,
        }
    }
}

/// Unsigned transaction ready to be handed to the signer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateTransaction {
    pub inputs: Vec<UTxODetails>,
    pub outputs: Vec<UTxOBuilder>,
    pub fee: Value,
}

impl CandidateTransaction {
    pub fn input_value(&self) -> Value {
        self.inputs.iter().map(|input| input.value).sum()
    }

    pub fn output_value(&self) -> Value {
        self.outputs.iter().map(|output| output.value).sum()
    }

    pub fn change(&self) -> Option<&UTxOBuilder> {
        self.outputs
            .iter()
            .find(|output| output.kind == OutputKind::Change)
    }

    pub fn pointers(&self) -> Vec<UtxoPointer> {
        self.inputs
            .iter()
            .map(|input| input.pointer.clone())
            .collect()
    }
}

impl fmt::Display for CandidateTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "inputs: [{}], outputs: [{}], fee: {}",
            self.inputs
                .iter()
                .map(|input| format!("{} ({})", input.pointer, input.value))
                .join(", "),
            self.outputs
                .iter()
                .map(|output| format!("{} -> {:?} {}", output.value, output.kind, output.address))
                .join(", "),
            self.fee
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedTransaction {
    pub transaction_id: TransactionId,
    pub candidate: CandidateTransaction,
    pub raw: Vec<u8>,
}

impl SignedTransaction {
    pub fn raw_hex(&self) -> String {
        hex::encode(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use crate::amount::Value;
    use crate::tx::{CandidateTransaction, OutputKind, TransactionId, UTxOBuilder, UTxODetails, UtxoPointer};

    #[test]
    fn transaction_id_display_is_reversed() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0xab;
        let id = TransactionId::from_hash_bytes(&bytes);
        assert!(id.as_ref().ends_with("ab"));
        assert_eq!(TransactionId::new("ABCD").as_ref(), "abcd");
    }

    #[test]
    fn candidate_totals() {
        let candidate = CandidateTransaction {
            inputs: vec![UTxODetails {
                pointer: UtxoPointer {
                    transaction_id: TransactionId::new("00"),
                    output_index: 1,
                },
                address: "a".to_string(),
                value: Value::from(1000),
                confirmations: 1,
                spendable: true,
            }],
            outputs: vec![
                UTxOBuilder::destination("b", Value::from(600)),
                UTxOBuilder::change("a", Value::from(300)),
            ],
            fee: Value::from(100),
        };
        assert_eq!(candidate.input_value(), Value::from(1000));
        assert_eq!(candidate.output_value(), Value::from(900));
        assert_eq!(candidate.change().map(|c| c.kind), Some(OutputKind::Change));
        assert_eq!(candidate.pointers().len(), 1);
        assert!(candidate.to_string().contains("00:1"));
    }
}
