//! Shared state helpers and the engine's item table.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::models::{ContainerInfo, ContainerMetrics, ContainerRecord};

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// Ordered table of tracked containers, at most one entry per id.
///
/// Order follows the most recent list poll that changed membership.
#[derive(Debug, Default, Clone)]
pub struct ItemTable {
    items: Vec<ContainerInfo>,
}

impl ItemTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[ContainerInfo] {
        &self.items
    }

    pub fn snapshot(&self) -> Vec<ContainerInfo> {
        self.items.clone()
    }

    pub fn get(&self, id: &str) -> Option<&ContainerInfo> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut ContainerInfo> {
        self.items.iter_mut().find(|item| item.id == id)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ContainerInfo> {
        self.items.iter_mut()
    }

    /// True when `records` lists exactly the held ids, in the same order.
    pub fn same_membership(&self, records: &[ContainerRecord]) -> bool {
        self.items.len() == records.len()
            && self
                .items
                .iter()
                .zip(records)
                .all(|(item, record)| item.id == record.id)
    }

    /// Ids of items whose raw state says running, in table order.
    pub fn running_ids(&self) -> Vec<String> {
        self.items
            .iter()
            .filter(|item| item.is_running())
            .map(|item| item.id.clone())
            .collect()
    }

    /// Replace the contents with `items`, keeping the latest snapshot of
    /// every id that survives.
    pub fn replace(&mut self, items: Vec<ContainerInfo>) {
        let mut previous = std::mem::take(&mut self.items);
        self.items = items
            .into_iter()
            .map(|mut item| {
                if item.metrics.is_none() {
                    item.metrics = take_metrics(&mut previous, &item.id);
                }
                item
            })
            .collect();
    }
}

fn take_metrics(items: &mut [ContainerInfo], id: &str) -> Option<ContainerMetrics> {
    items
        .iter_mut()
        .find(|item| item.id == id)
        .and_then(|item| item.metrics.take())
}
