//! Local view of the co-processor's links.

use crate::config::MAX_LINKS;

use super::types::{Link, LinkId};

/// Up to [`MAX_LINKS`] open links, indexed by id.
#[derive(Debug, Default)]
pub struct LinkTable {
    slots: [Option<Link>; MAX_LINKS],
}

impl LinkTable {
    /// An empty table.
    pub const fn new() -> Self {
        Self {
            slots: [None, None, None, None, None],
        }
    }

    /// Records an open link, replacing whatever used its id.
    pub fn insert(&mut self, link: Link) {
        let i = link.id.index();
        self.slots[i] = Some(link);
    }

    /// Forgets a link, returning it if it was open.
    pub fn remove(&mut self, id: LinkId) -> Option<Link> {
        self.slots[id.index()].take()
    }

    pub fn get(&self, id: LinkId) -> Option<&Link> {
        self.slots[id.index()].as_ref()
    }

    /// Whether `id` is open.
    pub fn is_active(&self, id: LinkId) -> bool {
        self.get(id).is_some()
    }

    /// Lowest id without an open link.
    pub fn free_id(&self) -> Option<LinkId> {
        self.slots
            .iter()
            .position(Option::is_none)
            .and_then(|i| LinkId::new(i as u8).ok())
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = None);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Link> {
        self.slots.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::types::{ConnType, Role};

    fn link(id: u8) -> Link {
        Link {
            id: LinkId::new(id).unwrap(),
            kind: ConnType::Tcp,
            role: Role::Client,
            remote: "10.0.0.1".try_into().unwrap(),
            remote_port: 80,
            local_port: 0,
        }
    }

    #[test]
    fn hands_out_lowest_free_id() {
        let mut table = LinkTable::new();
        assert_eq!(table.free_id(), LinkId::new(0).ok());
        table.insert(link(0));
        table.insert(link(1));
        assert_eq!(table.free_id(), LinkId::new(2).ok());
        table.remove(LinkId::new(0).unwrap());
        assert_eq!(table.free_id(), LinkId::new(0).ok());
    }

    #[test]
    fn full_table_has_no_free_id() {
        let mut table = LinkTable::new();
        for id in 0..MAX_LINKS as u8 {
            table.insert(link(id));
        }
        assert_eq!(table.len(), MAX_LINKS);
        assert_eq!(table.free_id(), None);
        table.clear();
        assert!(table.is_empty());
    }
}
