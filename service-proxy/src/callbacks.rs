//! Ordered listener lists

use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies a registered listener. Ids are never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    fn next() -> Self {
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Listeners in registration order.
///
/// Dispatch goes through [`CallbackList::snapshot`] so listeners may add or
/// remove listeners while being called.
pub(crate) struct CallbackList<F: ?Sized> {
    entries: Vec<(ListenerId, Rc<F>)>,
}

impl<F: ?Sized> CallbackList<F> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub(crate) fn add(&mut self, callback: Rc<F>) -> ListenerId {
        let id = ListenerId::next();
        self.entries.push((id, callback));
        id
    }

    /// Returns `false` if `id` is not in the list
    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn snapshot(&self) -> Vec<Rc<F>> {
        self.entries.iter().map(|(_, cb)| Rc::clone(cb)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn test_snapshot_keeps_registration_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut list: CallbackList<dyn Fn(&RefCell<Vec<u32>>)> = CallbackList::new();

        list.add(Rc::new(|log: &RefCell<Vec<u32>>| log.borrow_mut().push(1)));
        let second = list.add(Rc::new(|log: &RefCell<Vec<u32>>| log.borrow_mut().push(2)));
        list.add(Rc::new(|log: &RefCell<Vec<u32>>| log.borrow_mut().push(3)));

        for cb in list.snapshot() {
            cb(&log);
        }
        assert_eq!(*log.borrow(), vec![1, 2, 3]);

        assert!(list.remove(second));
        assert!(!list.remove(second));

        log.borrow_mut().clear();
        for cb in list.snapshot() {
            cb(&log);
        }
        assert_eq!(*log.borrow(), vec![1, 3]);
    }

    #[test]
    fn test_ids_are_unique_across_lists() {
        let mut first: CallbackList<dyn Fn()> = CallbackList::new();
        let mut second: CallbackList<dyn Fn()> = CallbackList::new();

        let a = first.add(Rc::new(|| {}));
        let b = second.add(Rc::new(|| {}));
        assert_ne!(a, b);
        assert!(!second.remove(a));
        assert!(!first.is_empty());
    }
}
