//! Lazy page-by-page walk over the ledger.
//!
//! Holds no server-side cursor: each step is an independent `find` for the
//! next page, so the walk can be dropped or restarted at any point.

use super::r#trait::{Page, SortOrder, StoreError, TransactionFilter, TransactionLedger};
use garrison_inventory::Transaction;

pub struct TransactionPages<'a, L: ?Sized> {
    ledger: &'a L,
    filter: TransactionFilter,
    order: SortOrder,
    next: Option<Page>,
}

impl<'a, L> TransactionPages<'a, L>
where
    L: TransactionLedger + ?Sized,
{
    pub fn new(ledger: &'a L, filter: TransactionFilter, order: SortOrder, limit: u32) -> Self {
        Self {
            ledger,
            filter,
            order,
            next: Some(Page::first(limit)),
        }
    }
}

impl<L> Iterator for TransactionPages<'_, L>
where
    L: TransactionLedger + ?Sized,
{
    type Item = Result<Vec<Transaction>, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        let page = self.next.take()?;
        match self.ledger.find(&self.filter, page, self.order) {
            Ok(result) => {
                if result.items.is_empty() {
                    return None;
                }
                if result.has_more() {
                    self.next = Some(page.next());
                }
                Some(Ok(result.items))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

/// Collect every matching row by walking pages of `limit`.
pub fn collect_all<L>(
    ledger: &L,
    filter: TransactionFilter,
    order: SortOrder,
    limit: u32,
) -> Result<Vec<Transaction>, StoreError>
where
    L: TransactionLedger + ?Sized,
{
    let mut out = Vec::new();
    for page in TransactionPages::new(ledger, filter, order, limit) {
        out.extend(page?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use garrison_core::{AssetId, BaseId, UserId};
    use garrison_inventory::{BalanceKey, NewTransaction, Vendor};

    use super::*;
    use crate::store::{CommitBatch, InMemoryInventoryStore, InventoryStore};

    fn ledger_with(rows: usize) -> InMemoryInventoryStore {
        let store = InMemoryInventoryStore::new();
        let key = BalanceKey::new(AssetId::new(), BaseId::new());
        for _ in 0..rows {
            let row = NewTransaction::purchase(key, 1, 10, Vendor::new("Acme"), UserId::new(), Utc::now()).unwrap();
            store.commit(CommitBatch::new(vec![row])).unwrap();
        }
        store
    }

    #[test]
    fn walks_every_page_once() {
        let store = ledger_with(7);

        let sizes: Vec<usize> = TransactionPages::new(&store, TransactionFilter::all(), SortOrder::SequenceAsc, 3)
            .map(|page| page.unwrap().len())
            .collect();
        assert_eq!(sizes, vec![3, 3, 1]);

        let all = collect_all(&store, TransactionFilter::all(), SortOrder::SequenceAsc, 3).unwrap();
        let sequences: Vec<u64> = all.iter().map(|t| t.sequence).collect();
        assert_eq!(sequences, (1..=7).collect::<Vec<u64>>());
    }

    #[test]
    fn empty_ledger_yields_nothing() {
        let store = ledger_with(0);
        assert_eq!(
            TransactionPages::new(&store, TransactionFilter::all(), SortOrder::SequenceDesc, 5).count(),
            0
        );
    }
}
