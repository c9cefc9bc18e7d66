pub mod account;
pub mod adapter;
pub mod amount;
pub mod config;
pub mod error;
pub mod fee;
pub mod ledger;
pub mod notification;
pub mod selection;
pub mod submission;
pub mod tx;
pub mod validator;
