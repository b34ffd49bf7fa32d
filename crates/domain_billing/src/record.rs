//! Raw billing records as read from the ledger

use core_kernel::RecordId;

use crate::field::{FieldExtractor, FieldMap, FieldValue};

/// One ledger row: an opaque id plus its loosely-typed cells
///
/// Records are read-only inside the pipeline. Changes are expressed as
/// [`crate::outcome::LedgerUpdate`] requests.
#[derive(Debug, Clone, PartialEq)]
pub struct BillingRecord {
    pub id: RecordId,
    pub fields: FieldMap,
}

impl BillingRecord {
    pub fn new(id: impl Into<RecordId>, fields: FieldMap) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Adds or replaces a cell
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn extractor(&self) -> FieldExtractor<'_> {
        FieldExtractor::new(&self.fields)
    }
}

/// One page of a ledger listing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPage {
    pub records: Vec<BillingRecord>,
    /// Continuation cursor; `None` or empty means this was the last page
    pub next_cursor: Option<String>,
}

impl RecordPage {
    pub fn last(records: Vec<BillingRecord>) -> Self {
        Self {
            records,
            next_cursor: None,
        }
    }

    /// The cursor for the next request, if more pages remain
    pub fn continuation(&self) -> Option<&str> {
        self.next_cursor.as_deref().filter(|c| !c.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_cursor_ends_pagination() {
        let page = RecordPage {
            records: vec![],
            next_cursor: Some(String::new()),
        };
        assert!(page.continuation().is_none());

        let page = RecordPage {
            records: vec![],
            next_cursor: Some("itr123/rec456".to_string()),
        };
        assert_eq!(page.continuation(), Some("itr123/rec456"));
    }

    #[test]
    fn test_with_field_overwrites() {
        let record = BillingRecord::new("rec1", FieldMap::new())
            .with_field("Paid", "false")
            .with_field("Paid", "true");
        assert_eq!(record.fields.get("Paid"), Some(&FieldValue::text("true")));
    }
}
