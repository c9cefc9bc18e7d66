use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl AsRef<str> for AccountId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, PartialEq, Eq)]
pub enum AccountKind {
    Mnemonic {
        words: Vec<String>,
        passphrase: String,
    },
    PrivateKey(Vec<u8>),
}

// secrets never end up in logs
impl fmt::Debug for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountKind::Mnemonic { words, .. } => f
                .debug_struct("Mnemonic")
                .field("words", &words.len())
                .finish_non_exhaustive(),
            AccountKind::PrivateKey(_) => f.write_str("PrivateKey(..)"),
        }
    }
}

/// Wallet identity. Immutable once created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub id: AccountId,
    pub kind: AccountKind,
}

impl Account {
    pub fn mnemonic(id: impl Into<String>, words: Vec<String>) -> Self {
        Self {
            id: AccountId::new(id),
            kind: AccountKind::Mnemonic {
                words,
                passphrase: String::new(),
            },
        }
    }

    pub fn mnemonic_word_count(&self) -> Option<usize> {
        match &self.kind {
            AccountKind::Mnemonic { words, .. } => Some(words.len()),
            AccountKind::PrivateKey(_) => None,
        }
    }
}
