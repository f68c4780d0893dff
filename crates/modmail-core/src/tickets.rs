use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex, OnceLock},
};

use regex::Regex;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::{
    domain::{ChannelId, UserId},
    messaging::types::ChannelInfo,
};

pub const TICKET_PREFIX: &str = "ticket-";
pub const TOPIC_PREFIX: &str = "Modmail ID: ";

// ============== Naming ==============

fn non_alnum() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("[^a-zA-Z0-9]+").expect("valid regex"))
}

/// `ticket-<name>` with everything outside `[A-Za-z0-9]` removed and the rest lower-cased.
///
/// No uniqueness suffix: two users can share a channel name, discovery never keys on it.
pub fn channel_name_for(display_name: &str) -> String {
    let cleaned = non_alnum().replace_all(display_name, "").to_lowercase();
    format!("{TICKET_PREFIX}{cleaned}")
}

pub fn topic_for(user: UserId) -> String {
    format!("{TOPIC_PREFIX}{user}")
}

/// Owner id embedded in a ticket topic.
///
/// Only the leading token after the prefix is read, so staff can append notes to a topic.
pub fn owner_from_topic(topic: &str) -> Option<UserId> {
    let rest = topic.strip_prefix(TOPIC_PREFIX)?;
    let token = rest.split_whitespace().next()?;
    token.parse::<u64>().ok().map(UserId)
}

pub fn topic_names_user(topic: &str, user: UserId) -> bool {
    owner_from_topic(topic) == Some(user)
}

pub fn is_ticket_channel(channel: &ChannelInfo, category: ChannelId) -> bool {
    channel.parent_id == Some(category) && channel.name.starts_with(TICKET_PREFIX)
}

/// First channel (in the order given) whose topic names `user`.
pub fn find_ticket_channel(channels: &[ChannelInfo], user: UserId) -> Option<&ChannelInfo> {
    channels.iter().find(|ch| {
        ch.topic
            .as_deref()
            .map(|t| topic_names_user(t, user))
            .unwrap_or(false)
    })
}

// ============== Registry ==============

/// In-process `owner -> ticket channel` map.
///
/// Authoritative while the process runs; channel topics rebuild it after a restart.
#[derive(Default)]
pub struct TicketRegistry {
    inner: RwLock<HashMap<UserId, ChannelId>>,
}

impl TicketRegistry {
    pub async fn get(&self, user: UserId) -> Option<ChannelId> {
        self.inner.read().await.get(&user).copied()
    }

    pub async fn insert(&self, user: UserId, channel: ChannelId) {
        self.inner.write().await.insert(user, channel);
    }

    /// Drop the entry for `user`, but only if it still points at `channel`.
    pub async fn remove_if(&self, user: UserId, channel: ChannelId) -> bool {
        let mut map = self.inner.write().await;
        if map.get(&user) == Some(&channel) {
            map.remove(&user);
            return true;
        }
        false
    }

    /// Populate from the staff guild's channels. Existing entries win.
    pub async fn hydrate(&self, channels: &[ChannelInfo], category: ChannelId) -> usize {
        let mut map = self.inner.write().await;
        let mut added = 0;
        for ch in channels.iter().filter(|ch| is_ticket_channel(ch, category)) {
            let Some(owner) = ch.topic.as_deref().and_then(owner_from_topic) else {
                continue;
            };
            if let std::collections::hash_map::Entry::Vacant(e) = map.entry(owner) {
                e.insert(ch.id);
                added += 1;
            }
        }
        added
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

// ============== Per-user locks ==============

type LockMap = HashMap<UserId, Arc<Mutex<()>>>;

/// Keyed async mutexes serializing the find-or-create sequence per user.
///
/// An entry lives only while someone holds or waits on it, so the map stays
/// as small as the set of users with a message in flight.
#[derive(Default)]
pub struct UserLocks {
    inner: Arc<StdMutex<LockMap>>,
}

/// Held for the duration of one per-user critical section.
pub struct UserLockGuard {
    user: UserId,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<StdMutex<LockMap>>,
}

impl UserLocks {
    pub async fn lock_user(&self, user: UserId) -> UserLockGuard {
        let lock = {
            let mut map = lock_map(&self.inner);
            map.entry(user)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let guard = lock.lock_owned().await;
        UserLockGuard {
            user,
            guard: Some(guard),
            locks: self.inner.clone(),
        }
    }

    pub fn len(&self) -> usize {
        lock_map(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        lock_map(&self.inner).is_empty()
    }
}

impl Drop for UserLockGuard {
    fn drop(&mut self) {
        self.guard.take();
        let mut map = lock_map(&self.locks);
        // Only the map still references the mutex: nobody holds or waits on it.
        if map
            .get(&self.user)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            map.remove(&self.user);
        }
    }
}

fn lock_map(locks: &StdMutex<LockMap>) -> std::sync::MutexGuard<'_, LockMap> {
    locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn channel(id: u64, name: &str, parent: Option<u64>, topic: Option<&str>) -> ChannelInfo {
        ChannelInfo {
            id: ChannelId(id),
            name: name.to_string(),
            parent_id: parent.map(ChannelId),
            topic: topic.map(|t| t.to_string()),
        }
    }

    #[test]
    fn cleans_display_names() {
        assert_eq!(channel_name_for("Bob!"), "ticket-bob");
        assert_eq!(channel_name_for("Ünïcode_Fan 42"), "ticket-ncodefan42");
        assert_eq!(channel_name_for("!!!"), "ticket-");
        assert_eq!(channel_name_for(""), "ticket-");
    }

    #[test]
    fn topic_round_trips_owner() {
        let topic = topic_for(UserId(42));
        assert_eq!(topic, "Modmail ID: 42");
        assert_eq!(owner_from_topic(&topic), Some(UserId(42)));
        assert_eq!(owner_from_topic("Modmail ID: 42 (vip)"), Some(UserId(42)));
        assert_eq!(owner_from_topic("modmail id: 42"), None);
        assert_eq!(owner_from_topic("Modmail ID: "), None);
        assert_eq!(owner_from_topic("Modmail ID: abc"), None);
        assert_eq!(owner_from_topic("general chat"), None);
    }

    #[test]
    fn discovery_matches_whole_ids_only() {
        let channels = vec![
            channel(1, "ticket-a", Some(9), Some("Modmail ID: 1234")),
            channel(2, "ticket-b", Some(9), Some("Modmail ID: 123")),
        ];
        assert_eq!(
            find_ticket_channel(&channels, UserId(123)).map(|c| c.id),
            Some(ChannelId(2))
        );
        assert_eq!(
            find_ticket_channel(&channels, UserId(1234)).map(|c| c.id),
            Some(ChannelId(1))
        );
        assert!(find_ticket_channel(&channels, UserId(12)).is_none());
    }

    #[test]
    fn ticket_channel_requires_category_and_prefix() {
        let cat = ChannelId(9);
        assert!(is_ticket_channel(&channel(1, "ticket-bob", Some(9), None), cat));
        assert!(!is_ticket_channel(&channel(1, "ticket-bob", Some(8), None), cat));
        assert!(!is_ticket_channel(&channel(1, "ticket-bob", None, None), cat));
        assert!(!is_ticket_channel(&channel(1, "support-bob", Some(9), None), cat));
    }

    #[tokio::test]
    async fn registry_hydrates_from_ticket_channels() {
        let reg = TicketRegistry::default();
        let channels = vec![
            channel(1, "ticket-a", Some(9), Some("Modmail ID: 10")),
            channel(2, "general", Some(9), Some("Modmail ID: 11")),
            channel(3, "ticket-c", Some(7), Some("Modmail ID: 12")),
            channel(4, "ticket-d", Some(9), Some("not a ticket")),
            channel(5, "ticket-e", Some(9), Some("Modmail ID: 10")),
        ];
        assert_eq!(reg.hydrate(&channels, ChannelId(9)).await, 1);
        assert_eq!(reg.get(UserId(10)).await, Some(ChannelId(1)));
        assert_eq!(reg.get(UserId(11)).await, None);
        assert_eq!(reg.get(UserId(12)).await, None);
    }

    #[tokio::test]
    async fn remove_if_ignores_replaced_entries() {
        let reg = TicketRegistry::default();
        reg.insert(UserId(1), ChannelId(5)).await;
        assert!(!reg.remove_if(UserId(1), ChannelId(6)).await);
        assert_eq!(reg.get(UserId(1)).await, Some(ChannelId(5)));
        assert!(reg.remove_if(UserId(1), ChannelId(5)).await);
        assert!(reg.is_empty().await);
    }

    #[tokio::test]
    async fn user_locks_serialize_same_user() {
        let locks = Arc::new(UserLocks::default());
        let guard = locks.lock_user(UserId(1)).await;

        // Another user is not blocked.
        let other = tokio::time::timeout(Duration::from_millis(50), locks.lock_user(UserId(2))).await;
        assert!(other.is_ok());

        // Same user waits until the first guard drops.
        let l2 = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = l2.lock_user(UserId(1)).await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn user_locks_forget_released_users() {
        let locks = UserLocks::default();
        for id in 0..1_000 {
            let _guard = locks.lock_user(UserId(id)).await;
            assert_eq!(locks.len(), 1);
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn user_lock_entry_survives_while_someone_waits() {
        let locks = Arc::new(UserLocks::default());
        let guard = locks.lock_user(UserId(1)).await;

        let l2 = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = l2.lock_user(UserId(1)).await;
            l2.len()
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(guard);

        // The waiter still found the entry after the first holder released it.
        let seen = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(seen, 1);
        assert!(locks.is_empty());
    }
}
