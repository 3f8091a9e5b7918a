use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_rlp::{Encodable, RlpEncodable};

/// A contract event emitted during clause execution.
#[derive(Debug, Default, Clone, PartialEq, Eq, RlpEncodable)]
pub struct Event {
    /// Address of the emitting contract.
    pub address: Address,
    /// Indexed topics.
    pub topics: Vec<B256>,
    /// Non-indexed payload.
    pub data: Bytes,
}

/// A VET movement recorded during clause execution.
#[derive(Debug, Default, Clone, PartialEq, Eq, RlpEncodable)]
pub struct Transfer {
    pub sender: Address,
    pub recipient: Address,
    pub amount: U256,
}

/// Side effects of one clause.
#[derive(Debug, Default, Clone, PartialEq, Eq, RlpEncodable)]
pub struct Output {
    pub events: Vec<Event>,
    pub transfers: Vec<Transfer>,
}

/// Execution result of one transaction.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// Gas consumed by the transaction.
    pub gas_used: u64,
    /// Account that paid for the gas.
    pub gas_payer: Address,
    /// Energy paid for the consumed gas.
    pub paid: U256,
    /// Share of `paid` credited as block reward.
    pub reward: U256,
    /// Whether execution was reverted. A reverted transaction produces no
    /// outputs.
    pub reverted: bool,
    /// Per-clause side effects, in clause order.
    pub outputs: Vec<Output>,
}

impl Receipt {
    /// Iterates over all events across outputs.
    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.outputs.iter().flat_map(|output| output.events.iter())
    }

    /// Iterates over all transfers across outputs.
    pub fn transfers(&self) -> impl Iterator<Item = &Transfer> {
        self.outputs.iter().flat_map(|output| output.transfers.iter())
    }
}

impl Encodable for Receipt {
    fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
        let payload_length = self.gas_used.length() +
            self.gas_payer.length() +
            self.paid.length() +
            self.reward.length() +
            self.reverted.length() +
            self.outputs.length();
        alloy_rlp::Header { list: true, payload_length }.encode(out);
        self.gas_used.encode(out);
        self.gas_payer.encode(out);
        self.paid.encode(out);
        self.reward.encode(out);
        self.reverted.encode(out);
        self.outputs.encode(out);
    }
}
