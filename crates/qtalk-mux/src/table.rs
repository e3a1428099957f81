/// Dense channel table: a growable arena plus a stack of free slot indices.
///
/// A slot is only released when its channel shuts down, which happens after
/// both sides exchanged Close, so a freed id is never still in use by the peer.
#[derive(Debug)]
pub(crate) struct ChannelTable<T> {
    slots: Vec<Option<T>>,
    free: Vec<u32>,
}

impl<T> ChannelTable<T> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    /// Allocate a slot and fill it with the value built from its id.
    pub(crate) fn insert_with(&mut self, build: impl FnOnce(u32) -> T) -> &T {
        let id = match self.free.pop() {
            Some(id) => id,
            None => {
                self.slots.push(None);
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[id as usize];
        slot.insert(build(id))
    }

    pub(crate) fn get(&self, id: u32) -> Option<&T> {
        self.slots.get(id as usize).and_then(Option::as_ref)
    }

    /// Remove the value at `id` if `matches` accepts it.
    pub(crate) fn remove_if(&mut self, id: u32, matches: impl FnOnce(&T) -> bool) -> Option<T> {
        let slot = self.slots.get_mut(id as usize)?;
        if !slot.as_ref().is_some_and(matches) {
            return None;
        }
        let value = slot.take();
        self.free.push(id);
        value
    }

    /// Remove and return every live value, leaving the table empty.
    pub(crate) fn drain(&mut self) -> Vec<T> {
        self.free.clear();
        self.slots.drain(..).flatten().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_dense_and_reused_after_removal() {
        let mut table = ChannelTable::new();
        assert_eq!(*table.insert_with(|id| id), 0);
        assert_eq!(*table.insert_with(|id| id), 1);
        assert_eq!(*table.insert_with(|id| id), 2);

        assert_eq!(table.remove_if(1, |_| true), Some(1));
        assert!(table.get(1).is_none());
        assert_eq!(table.len(), 2);

        assert_eq!(*table.insert_with(|id| id + 100), 101);
        assert_eq!(*table.insert_with(|id| id), 3);
    }

    #[test]
    fn remove_if_respects_predicate() {
        let mut table = ChannelTable::new();
        table.insert_with(|_| "a");
        assert_eq!(table.remove_if(0, |v| *v == "b"), None);
        assert_eq!(table.get(0), Some(&"a"));
        assert_eq!(table.remove_if(5, |_| true), None);
    }

    #[test]
    fn drain_empties_the_table() {
        let mut table = ChannelTable::new();
        table.insert_with(|id| id);
        table.insert_with(|id| id);
        table.remove_if(0, |_| true);

        let drained = table.drain();
        assert_eq!(drained, vec![1]);
        assert_eq!(table.len(), 0);
        assert_eq!(*table.insert_with(|id| id), 0);
    }
}
