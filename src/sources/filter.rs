//! Sender/recipient allow-list for resolved node transactions

use crate::types::NodeTx;
use alloy::primitives::Address;
use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct AllowList {
    pub senders: HashSet<Address>,
    pub recipients: HashSet<Address>,
}

impl AllowList {
    pub fn new(
        senders: impl IntoIterator<Item = Address>,
        recipients: impl IntoIterator<Item = Address>,
    ) -> Self {
        Self {
            senders: senders.into_iter().collect(),
            recipients: recipients.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty() && self.recipients.is_empty()
    }

    /// Only contract interactions pass. With both lists empty that is the only
    /// condition; otherwise recipient or recovered sender must be listed.
    pub fn admits(&self, tx: &NodeTx) -> bool {
        if !tx.interacts_with_contract() {
            return false;
        }
        if self.is_empty() {
            return true;
        }
        if tx.to.is_some_and(|to| self.recipients.contains(&to)) {
            return true;
        }
        // unrecovered sender never matches
        tx.from.is_some_and(|from| self.senders.contains(&from))
    }
}
