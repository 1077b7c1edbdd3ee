use std::collections::VecDeque;
use std::time::Duration;

use super::contact::Contact;
use super::node_id::NodeId;

pub const K: usize = 20; // K-bucket size
const BUCKET_COUNT: usize = 160;

/// Up to K contacts, least recently seen at the front.
#[derive(Clone, Default)]
struct KBucket {
    contacts: VecDeque<Contact>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Insert {
    Added,
    Refreshed,
    /// A stale contact was dropped to make room.
    Replaced(Contact),
    BucketFull,
}

impl KBucket {
    fn insert(&mut self, mut contact: Contact, stale_after: Duration) -> Insert {
        if let Some(pos) = self
            .contacts
            .iter()
            .position(|c| c.node_id == contact.node_id)
        {
            self.contacts.remove(pos);
            contact.touch();
            self.contacts.push_back(contact);
            return Insert::Refreshed;
        }

        if self.contacts.len() < K {
            self.contacts.push_back(contact);
            return Insert::Added;
        }

        // Full: only the oldest entry may give way, and only if it went quiet.
        let oldest_is_stale = self
            .contacts
            .front()
            .is_some_and(|c| c.is_stale(stale_after));
        if oldest_is_stale {
            if let Some(evicted) = self.contacts.pop_front() {
                self.contacts.push_back(contact);
                return Insert::Replaced(evicted);
            }
        }
        Insert::BucketFull
    }

    fn remove(&mut self, node_id: &NodeId) -> bool {
        if let Some(pos) = self.contacts.iter().position(|c| &c.node_id == node_id) {
            self.contacts.remove(pos);
            return true;
        }
        false
    }
}

pub struct RoutingTable {
    local_id: NodeId,
    buckets: Vec<KBucket>,
    stale_after: Duration,
}

impl RoutingTable {
    /// Create an empty table around `local_id`
    pub fn new(local_id: NodeId, stale_after: Duration) -> Self {
        Self {
            local_id,
            buckets: vec![KBucket::default(); BUCKET_COUNT],
            stale_after,
        }
    }

    /// Add or refresh a contact. `None` for our own id.
    pub fn insert(&mut self, contact: Contact) -> Option<Insert> {
        let bucket_idx = self.local_id.bucket_index(&contact.node_id)?;
        Some(self.buckets[bucket_idx].insert(contact, self.stale_after))
    }

    /// Remove a contact; false if it was unknown
    pub fn remove(&mut self, node_id: &NodeId) -> bool {
        match self.local_id.bucket_index(node_id) {
            Some(bucket_idx) => self.buckets[bucket_idx].remove(node_id),
            None => false,
        }
    }

    /// Up to `count` contacts nearest to `target`, closest first
    pub fn closest(&self, target: &NodeId, count: usize) -> Vec<Contact> {
        let mut all_contacts = self.contacts();
        all_contacts.sort_by_key(|c| c.node_id.distance(target));
        all_contacts.truncate(count);
        all_contacts
    }

    /// Drops contacts that have been silent for longer than the stale age.
    pub fn prune_stale(&mut self) -> usize {
        let stale_after = self.stale_after;
        let mut removed = 0;
        for bucket in &mut self.buckets {
            let before = bucket.contacts.len();
            bucket.contacts.retain(|c| !c.is_stale(stale_after));
            removed += before - bucket.contacts.len();
        }
        removed
    }

    /// Number of known contacts
    pub fn contact_count(&self) -> usize {
        self.buckets.iter().map(|b| b.contacts.len()).sum()
    }

    /// All known contacts
    pub fn contacts(&self) -> Vec<Contact> {
        self.buckets
            .iter()
            .flat_map(|bucket| bucket.contacts.iter().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    const HOUR: Duration = Duration::from_secs(3600);

    fn contact(port: u16) -> Contact {
        let addr: SocketAddr = format!("127.0.0.1:{}", port).parse().unwrap();
        Contact::new(NodeId::random(), addr)
    }

    #[test]
    fn test_insert_and_refresh() {
        let mut table = RoutingTable::new(NodeId::random(), HOUR);
        let c = contact(4001);
        assert_eq!(table.insert(c.clone()), Some(Insert::Added));
        assert_eq!(table.insert(c.clone()), Some(Insert::Refreshed));
        assert_eq!(table.contact_count(), 1);
        assert!(table.remove(&c.node_id));
        assert_eq!(table.contact_count(), 0);
    }

    #[test]
    fn test_ignores_self() {
        let local = NodeId::random();
        let mut table = RoutingTable::new(local, HOUR);
        let me = Contact::new(local, "127.0.0.1:1".parse().unwrap());
        assert_eq!(table.insert(me), None);
    }

    #[test]
    fn test_closest_is_sorted() {
        let mut table = RoutingTable::new(NodeId::random(), HOUR);
        for i in 0..10 {
            table.insert(contact(5000 + i));
        }

        let target = NodeId::random();
        let closest = table.closest(&target, 3);
        assert_eq!(closest.len(), 3);
        assert!(closest[0].node_id.distance(&target) <= closest[1].node_id.distance(&target));
        assert!(closest[1].node_id.distance(&target) <= closest[2].node_id.distance(&target));
    }

    #[test]
    fn test_full_bucket_evicts_only_stale() {
        let local = NodeId::new([0u8; 20]);
        let mut table = RoutingTable::new(local, HOUR);

        // All ids with the top bit set land in bucket 159.
        let far = |n: u8| {
            let mut bytes = [0u8; 20];
            bytes[0] = 0x80;
            bytes[19] = n;
            Contact::new(NodeId::new(bytes), "127.0.0.1:1".parse().unwrap())
        };
        for n in 0..K as u8 {
            assert_eq!(table.insert(far(n)), Some(Insert::Added));
        }
        assert_eq!(table.insert(far(200)), Some(Insert::BucketFull));

        table.buckets[159].contacts[0].last_seen = None;
        assert!(matches!(table.insert(far(201)), Some(Insert::Replaced(_))));
        assert_eq!(table.contact_count(), K);
    }

    #[test]
    fn test_prune_stale() {
        let mut table = RoutingTable::new(NodeId::random(), HOUR);
        table.insert(contact(1));
        table.insert(contact(2));
        for bucket in &mut table.buckets {
            if let Some(c) = bucket.contacts.front_mut() {
                c.last_seen = None;
                break;
            }
        }
        assert_eq!(table.prune_stale(), 1);
        assert_eq!(table.contact_count(), 1);
    }
}
