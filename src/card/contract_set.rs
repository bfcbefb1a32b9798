//! The contracts held by a card, indexed by slot.

use std::slice;

use crate::error::{ParseError, ValidationError};
use crate::records::{is_blank, Contract, Record};

/// Contracts ordered by ascending slot, at most one per slot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContractSet {
    contracts: Vec<Contract>,
}

impl ContractSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode raw contract records; index `i` is slot `i + 1`. Blank
    /// records are empty slots.
    pub fn from_records(records: &[Vec<u8>]) -> Result<Self, ParseError> {
        let mut set = Self::new();
        for (index, bytes) in records.iter().enumerate() {
            if is_blank(bytes) {
                continue;
            }
            set.upsert(Contract::unpack(index as u8 + 1, bytes)?);
        }
        Ok(set)
    }

    /// Every contract matching `pred`, in slot order.
    pub fn find<P>(&self, pred: P) -> Vec<&Contract>
    where
        P: Fn(&Contract) -> bool,
    {
        self.contracts.iter().filter(|c| pred(c)).collect()
    }

    pub fn find_first<P>(&self, pred: P) -> Option<&Contract>
    where
        P: Fn(&Contract) -> bool,
    {
        self.contracts.iter().find(|c| pred(c))
    }

    /// Lowest-slot contract whose status is accepted.
    pub fn first_valid(&self) -> Result<&Contract, ValidationError> {
        self.find_first(Contract::is_accepted)
            .ok_or(ValidationError::NoValidContract)
    }

    pub fn get(&self, slot: u8) -> Option<&Contract> {
        self.contracts.iter().find(|c| c.slot == slot)
    }

    /// Like [`get`](Self::get) but a missing slot is a validation failure.
    pub fn require(&self, slot: u8) -> Result<&Contract, ValidationError> {
        self.get(slot).ok_or(ValidationError::ContractNotFound(slot))
    }

    /// Replace the contract in the same slot, or insert keeping slot order.
    pub fn upsert(&mut self, contract: Contract) {
        match self.contracts.binary_search_by_key(&contract.slot, |c| c.slot) {
            Ok(index) => self.contracts[index] = contract,
            Err(index) => self.contracts.insert(index, contract),
        }
    }

    pub fn iter(&self) -> slice::Iter<'_, Contract> {
        self.contracts.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}

impl<'a> IntoIterator for &'a ContractSet {
    type Item = &'a Contract;
    type IntoIter = slice::Iter<'a, Contract>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::ContractStatus;

    fn contract(slot: u8, status: ContractStatus) -> Contract {
        let mut c = Contract::new(slot);
        c.version = 1;
        c.status.set(status);
        c
    }

    #[test]
    fn test_upsert_keeps_slot_order() {
        let mut set = ContractSet::new();
        set.upsert(contract(3, ContractStatus::PartlyUsed));
        set.upsert(contract(1, ContractStatus::Suspended));
        set.upsert(contract(2, ContractStatus::NeverUsed));

        let slots: Vec<u8> = set.iter().map(|c| c.slot).collect();
        assert_eq!(slots, vec![1, 2, 3]);
    }

    #[test]
    fn test_upsert_replaces() {
        let mut set = ContractSet::new();
        set.upsert(contract(2, ContractStatus::Suspended));
        set.upsert(contract(2, ContractStatus::PartlyUsed));

        assert_eq!(set.len(), 1);
        assert_eq!(set.get(2).unwrap().status(), ContractStatus::PartlyUsed);
    }

    #[test]
    fn test_first_valid() {
        let mut set = ContractSet::new();
        assert_eq!(set.first_valid(), Err(ValidationError::NoValidContract));

        set.upsert(contract(1, ContractStatus::Suspended));
        set.upsert(contract(4, ContractStatus::ToBeRenewed));
        set.upsert(contract(6, ContractStatus::PartlyUsed));
        assert_eq!(set.first_valid().unwrap().slot, 4);
    }

    #[test]
    fn test_find() {
        let mut set = ContractSet::new();
        for slot in 1..=4 {
            set.upsert(contract(slot, ContractStatus::PartlyUsed));
        }
        let even = set.find(|c| c.slot % 2 == 0);
        assert_eq!(even.len(), 2);
        assert_eq!(set.find_first(|c| c.slot > 2).unwrap().slot, 3);
        assert!(set.find_first(|c| c.slot > 8).is_none());
    }

    #[test]
    fn test_require_missing_slot() {
        let set = ContractSet::new();
        assert_eq!(set.require(5), Err(ValidationError::ContractNotFound(5)));
    }

    #[test]
    fn test_from_records() {
        let records = vec![
            vec![0u8; 29],
            contract(2, ContractStatus::PartlyUsed).pack().unwrap(),
            vec![0u8; 29],
        ];
        let set = ContractSet::from_records(&records).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(2).unwrap().status(), ContractStatus::PartlyUsed);
    }
}
