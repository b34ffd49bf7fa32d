//! Per-customer grouping of eligible items

use std::collections::HashMap;

use core_kernel::{Currency, CustomerId, Money, MoneyError, RecordId};
use tracing::warn;

use crate::config::AggregationMode;
use crate::validation::NormalizedItem;

/// Everything one customer owes in this pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerGroup {
    pub customer_id: CustomerId,
    pub currency: Currency,
    /// In fetch order for lump-sum, by service date for itemized
    pub items: Vec<NormalizedItem>,
}

impl CustomerGroup {
    fn new(first: NormalizedItem) -> Self {
        Self {
            customer_id: first.customer_id.clone(),
            currency: first.currency(),
            items: vec![first],
        }
    }

    /// Sum of all item amounts
    pub fn total(&self) -> Result<Money, MoneyError> {
        self.items
            .iter()
            .try_fold(Money::zero(self.currency), |acc, item| acc.checked_add(&item.amount))
    }

    /// Every ledger record that contributed to this group
    pub fn record_ids(&self) -> Vec<RecordId> {
        self.items
            .iter()
            .map(|item| item.source_record_id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Groups items by customer, preserving first-appearance order
#[derive(Debug, Clone, Copy)]
pub struct CustomerAggregator {
    mode: AggregationMode,
}

impl CustomerAggregator {
    pub fn new(mode: AggregationMode) -> Self {
        Self { mode }
    }

    pub fn aggregate(&self, items: Vec<NormalizedItem>) -> Vec<CustomerGroup> {
        let mut groups: Vec<CustomerGroup> = Vec::new();
        let mut index: HashMap<CustomerId, usize> = HashMap::new();

        for item in items {
            match index.get(&item.customer_id) {
                Some(&i) => {
                    let group = &mut groups[i];
                    if group.currency != item.currency() {
                        warn!(
                            record_id = %item.source_record_id,
                            customer_id = %item.customer_id,
                            expected = %group.currency,
                            found = %item.currency(),
                            "currency differs from customer's group, leaving record for a later pass"
                        );
                        continue;
                    }
                    group.items.push(item);
                }
                None => {
                    index.insert(item.customer_id.clone(), groups.len());
                    groups.push(CustomerGroup::new(item));
                }
            }
        }

        if self.mode == AggregationMode::Itemized {
            for group in &mut groups {
                // sort_by_key is stable, so same-day items keep fetch order
                group.items.sort_by_key(|item| item.service_date());
            }
        }

        groups
    }
}
