//! Per-room message sequences with optimistic sends.
//!
//! Each room keeps a confirmed prefix and an unconfirmed tail. Locally
//! authored messages enter the tail as [`MessageState::Provisional`] and leave
//! it when the server echoes them back as confirmed. Confirmed messages are
//! inserted at the boundary between the two, so:
//!
//! - confirmed messages are never reordered after insertion
//! - unconfirmed messages only ever occupy the tail
//!
//! Reconciliation matches an echo to its provisional entry by the client
//! token when the server echoes one, and otherwise by sender and body
//! (oldest first). Content matching is best effort: two identical rapid sends
//! may be matched in either order, but both entries are still replaced.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    fmt,
};

use huddle_core::{Identity, RoomId, UserId};

/// Locally generated key for a message the server has not confirmed yet.
///
/// Rendered as `local:<session>:<seq>`. Server ids never carry the `local:`
/// prefix, and [`MessageKey`] keeps the two apart by type as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalToken {
    session: u64,
    seq: u64,
}

impl LocalToken {
    const PREFIX: &'static str = "local:";

    /// Parse a rendered token. `None` if `raw` is not one of ours.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let (session, seq) = raw.strip_prefix(Self::PREFIX)?.split_once(':')?;
        Some(Self {
            session: u64::from_str_radix(session, 16).ok()?,
            seq: seq.parse().ok()?,
        })
    }

    /// Per-client session the token was minted in.
    #[must_use]
    pub fn session(&self) -> u64 {
        self.session
    }
}

impl fmt::Display for LocalToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:016x}:{}", Self::PREFIX, self.session, self.seq)
    }
}

/// Identity of a message within a room.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageKey {
    /// Temporary key of an unconfirmed message.
    Local(LocalToken),
    /// Permanent server-assigned id.
    Server(String),
}

/// Lifecycle of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageState {
    /// Sent, waiting for the server echo.
    Provisional,
    /// Echoed by the server.
    Confirmed,
    /// The transport rejected the send `attempts` times.
    Failed {
        /// Number of failed send attempts so far.
        attempts: u32,
    },
}

/// A message as displayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Local token or server id.
    pub key: MessageKey,
    /// Room the message belongs to.
    pub room_id: RoomId,
    /// Author.
    pub sender: Identity,
    /// Message body.
    pub body: String,
    /// Creation time, milliseconds since the Unix epoch.
    pub created_at: u64,
    /// Lifecycle state.
    pub state: MessageState,
}

/// A server-confirmed message, either echoed live or from history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedMessage {
    /// Permanent server id.
    pub id: String,
    /// Room the message belongs to.
    pub room_id: RoomId,
    /// Author.
    pub sender: Identity,
    /// Message body.
    pub body: String,
    /// Creation time, milliseconds since the Unix epoch.
    pub created_at: u64,
    /// Echoed client token, if the server supports correlation.
    pub client_token: Option<LocalToken>,
}

impl From<ConfirmedMessage> for Message {
    fn from(confirmed: ConfirmedMessage) -> Self {
        Self {
            key: MessageKey::Server(confirmed.id),
            room_id: confirmed.room_id,
            sender: confirmed.sender,
            body: confirmed.body,
            created_at: confirmed.created_at,
            state: MessageState::Confirmed,
        }
    }
}

/// What [`MessageStore::reconcile`] did with an incoming message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// Already seen; nothing changed.
    Duplicate,
    /// Replaced the unconfirmed entry carrying the echoed token.
    ByToken(LocalToken),
    /// Replaced the oldest unconfirmed entry with the same body.
    ByContent(LocalToken),
    /// No unconfirmed entry matched; appended.
    Appended,
}

#[derive(Debug, Default)]
struct RoomLog {
    confirmed: Vec<Message>,
    seen: HashSet<String>,
    unconfirmed: VecDeque<Message>,
}

impl RoomLog {
    fn take_unconfirmed(&mut self, pred: impl Fn(&Message) -> bool) -> Option<LocalToken> {
        let index = self.unconfirmed.iter().position(pred)?;
        match self.unconfirmed.remove(index)?.key {
            MessageKey::Local(token) => Some(token),
            MessageKey::Server(_) => None,
        }
    }

    fn unconfirmed_mut(&mut self, token: LocalToken) -> Option<&mut Message> {
        self.unconfirmed.iter_mut().find(|m| m.key == MessageKey::Local(token))
    }
}

/// Ordered message sequences for every room of a workspace.
#[derive(Debug)]
pub struct MessageStore {
    session: u64,
    next_seq: u64,
    rooms: HashMap<RoomId, RoomLog>,
    /// Send failures per unconfirmed entry, kept across resends.
    failures: HashMap<LocalToken, u32>,
}

impl MessageStore {
    /// Create an empty store minting tokens for `session`.
    pub fn new(session: u64) -> Self {
        Self { session, next_seq: 0, rooms: HashMap::new(), failures: HashMap::new() }
    }

    /// Append a provisional message to the tail of `room_id`.
    ///
    /// Returns the temporary key that identifies it until confirmation.
    pub fn append_provisional(
        &mut self,
        room_id: &RoomId,
        body: impl Into<String>,
        sender: &Identity,
        created_at: u64,
    ) -> LocalToken {
        self.next_seq += 1;
        let token = LocalToken { session: self.session, seq: self.next_seq };

        let log = self.rooms.entry(room_id.clone()).or_default();
        log.unconfirmed.push_back(Message {
            key: MessageKey::Local(token),
            room_id: room_id.clone(),
            sender: sender.clone(),
            body: body.into(),
            created_at,
            state: MessageState::Provisional,
        });

        token
    }

    /// Merge a confirmed message into its room.
    ///
    /// At most one unconfirmed entry is removed. A message whose server id
    /// was already seen is ignored, since the transport may deliver twice.
    pub fn reconcile(&mut self, local_user: &UserId, incoming: ConfirmedMessage) -> Reconciled {
        let log = self.rooms.entry(incoming.room_id.clone()).or_default();

        if log.seen.contains(&incoming.id) {
            return Reconciled::Duplicate;
        }

        let by_token = incoming.client_token.and_then(|token| {
            log.take_unconfirmed(|m| m.key == MessageKey::Local(token)).map(Reconciled::ByToken)
        });

        // A token minted by another session (another device) never matches
        // by content.
        let content_match = &incoming.sender.user_id == local_user
            && incoming.client_token.is_none_or(|token| token.session() == self.session);

        let outcome = by_token
            .or_else(|| {
                if !content_match {
                    return None;
                }
                log.take_unconfirmed(|m| m.body == incoming.body).map(Reconciled::ByContent)
            })
            .unwrap_or(Reconciled::Appended);

        if let Reconciled::ByToken(token) | Reconciled::ByContent(token) = outcome {
            self.failures.remove(&token);
        }

        log.seen.insert(incoming.id.clone());
        log.confirmed.push(incoming.into());
        outcome
    }

    /// Prepend history for `room_id`, skipping messages already present.
    ///
    /// Returns the number of messages inserted.
    pub fn seed(&mut self, room_id: &RoomId, history: Vec<ConfirmedMessage>) -> usize {
        let log = self.rooms.entry(room_id.clone()).or_default();

        let mut backlog = Vec::with_capacity(history.len());
        for message in history {
            if message.room_id == *room_id && log.seen.insert(message.id.clone()) {
                backlog.push(Message::from(message));
            }
        }

        let inserted = backlog.len();
        backlog.append(&mut log.confirmed);
        log.confirmed = backlog;
        inserted
    }

    /// Ordered sequence for `room_id`: confirmed messages, then the
    /// unconfirmed tail.
    pub fn sequence_for<'a>(
        &'a self,
        room_id: &RoomId,
    ) -> impl Iterator<Item = &'a Message> + use<'a> {
        self.rooms
            .get(room_id)
            .into_iter()
            .flat_map(|log| log.confirmed.iter().chain(log.unconfirmed.iter()))
    }

    /// Unconfirmed (provisional or failed) entries in `room_id`.
    pub fn unconfirmed_len(&self, room_id: &RoomId) -> usize {
        self.rooms.get(room_id).map_or(0, |log| log.unconfirmed.len())
    }

    /// Rooms that hold at least one message.
    pub fn rooms(&self) -> impl Iterator<Item = &RoomId> {
        self.rooms
            .iter()
            .filter(|(_, log)| !log.confirmed.is_empty() || !log.unconfirmed.is_empty())
            .map(|(room_id, _)| room_id)
    }

    /// Record a failed send. Returns the failure count, or `None` if the
    /// entry is no longer unconfirmed.
    pub fn mark_failed(&mut self, room_id: &RoomId, token: LocalToken) -> Option<u32> {
        let message = self.rooms.get_mut(room_id)?.unconfirmed_mut(token)?;
        let attempts = self.failures.entry(token).or_insert(0);
        *attempts += 1;
        message.state = MessageState::Failed { attempts: *attempts };
        Some(*attempts)
    }

    /// Return a failed entry to provisional before re-sending it.
    ///
    /// The failure count carries over to the next [`Self::mark_failed`].
    pub fn mark_resent(&mut self, room_id: &RoomId, token: LocalToken) -> bool {
        let Some(message) = self.rooms.get_mut(room_id).and_then(|log| log.unconfirmed_mut(token))
        else {
            return false;
        };
        message.state = MessageState::Provisional;
        true
    }

    /// Look up an unconfirmed entry by token.
    pub fn find_unconfirmed(&self, room_id: &RoomId, token: LocalToken) -> Option<&Message> {
        self.rooms
            .get(room_id)?
            .unconfirmed
            .iter()
            .find(|m| m.key == MessageKey::Local(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str, name: &str) -> Identity {
        Identity::new(UserId::new(id).unwrap(), name)
    }

    fn room() -> RoomId {
        RoomId::new("general").unwrap()
    }

    fn echo(id: &str, sender: &Identity, body: &str) -> ConfirmedMessage {
        ConfirmedMessage {
            id: id.to_string(),
            room_id: room(),
            sender: sender.clone(),
            body: body.to_string(),
            created_at: 0,
            client_token: None,
        }
    }

    fn bodies(store: &MessageStore) -> Vec<(String, MessageState)> {
        store.sequence_for(&room()).map(|m| (m.body.clone(), m.state)).collect()
    }

    #[test]
    fn token_round_trips_through_display() {
        let mut store = MessageStore::new(0xdead_beef);
        let alice = user("alice", "Alice");
        let token = store.append_provisional(&room(), "hi", &alice, 0);

        let rendered = token.to_string();
        assert!(rendered.starts_with("local:"));
        assert_eq!(LocalToken::parse(&rendered), Some(token));
        assert_eq!(LocalToken::parse("msg-1"), None);
        assert_eq!(LocalToken::parse("local:zz:1"), None);
    }

    #[test]
    fn echo_replaces_provisional() {
        let mut store = MessageStore::new(1);
        let alice = user("alice", "Alice");
        store.append_provisional(&room(), "hello", &alice, 0);

        let outcome = store.reconcile(&alice.user_id, echo("m1", &alice, "hello"));

        assert!(matches!(outcome, Reconciled::ByContent(_)));
        assert_eq!(bodies(&store), vec![("hello".to_string(), MessageState::Confirmed)]);
    }

    #[test]
    fn token_match_beats_content_match() {
        let mut store = MessageStore::new(1);
        let alice = user("alice", "Alice");
        store.append_provisional(&room(), "ok", &alice, 0);
        let second = store.append_provisional(&room(), "ok", &alice, 1);

        let mut incoming = echo("m1", &alice, "ok");
        incoming.client_token = Some(second);

        assert_eq!(store.reconcile(&alice.user_id, incoming), Reconciled::ByToken(second));
        assert_eq!(store.unconfirmed_len(&room()), 1);
        assert!(store.find_unconfirmed(&room(), second).is_none());
    }

    #[test]
    fn other_senders_never_consume_provisional() {
        let mut store = MessageStore::new(1);
        let alice = user("alice", "Alice");
        let bob = user("bob", "Bob");
        store.append_provisional(&room(), "hello", &alice, 0);

        assert_eq!(store.reconcile(&alice.user_id, echo("m1", &bob, "hello")), Reconciled::Appended);
        assert_eq!(
            bodies(&store),
            vec![
                ("hello".to_string(), MessageState::Confirmed),
                ("hello".to_string(), MessageState::Provisional),
            ]
        );
    }

    #[test]
    fn echo_from_another_session_appends() {
        let mut store = MessageStore::new(1);
        let alice = user("alice", "Alice");
        let ours = store.append_provisional(&room(), "hi", &alice, 0);

        let mut incoming = echo("m1", &alice, "hi");
        incoming.client_token = LocalToken::parse("local:00000000000000ff:1");

        assert_eq!(store.reconcile(&alice.user_id, incoming), Reconciled::Appended);
        assert!(store.find_unconfirmed(&room(), ours).is_some());
        assert_eq!(
            bodies(&store),
            vec![
                ("hi".to_string(), MessageState::Confirmed),
                ("hi".to_string(), MessageState::Provisional),
            ]
        );
    }

    #[test]
    fn duplicate_delivery_ignored() {
        let mut store = MessageStore::new(1);
        let bob = user("bob", "Bob");
        let me = UserId::new("alice").unwrap();

        store.reconcile(&me, echo("m1", &bob, "hey"));
        assert_eq!(store.reconcile(&me, echo("m1", &bob, "hey")), Reconciled::Duplicate);
        assert_eq!(store.sequence_for(&room()).count(), 1);
    }

    #[test]
    fn confirmed_inserted_before_unconfirmed_tail() {
        let mut store = MessageStore::new(1);
        let alice = user("alice", "Alice");
        let bob = user("bob", "Bob");
        store.append_provisional(&room(), "mine", &alice, 0);

        store.reconcile(&alice.user_id, echo("m1", &bob, "first"));
        store.reconcile(&alice.user_id, echo("m2", &bob, "second"));

        let order: Vec<_> = bodies(&store).into_iter().map(|(body, _)| body).collect();
        assert_eq!(order, ["first", "second", "mine"]);
    }

    #[test]
    fn seed_prepends_unseen_history() {
        let mut store = MessageStore::new(1);
        let bob = user("bob", "Bob");
        let me = UserId::new("alice").unwrap();
        store.reconcile(&me, echo("m3", &bob, "live"));

        let inserted = store.seed(
            &room(),
            vec![echo("m1", &bob, "old"), echo("m2", &bob, "older"), echo("m3", &bob, "live")],
        );

        assert_eq!(inserted, 2);
        let order: Vec<_> = bodies(&store).into_iter().map(|(body, _)| body).collect();
        assert_eq!(order, ["old", "older", "live"]);
    }

    #[test]
    fn failures_accumulate_across_resends() {
        let mut store = MessageStore::new(1);
        let alice = user("alice", "Alice");
        let token = store.append_provisional(&room(), "hi", &alice, 0);

        assert_eq!(store.mark_failed(&room(), token), Some(1));
        assert!(store.mark_resent(&room(), token));
        assert_eq!(
            store.find_unconfirmed(&room(), token).map(|m| m.state),
            Some(MessageState::Provisional)
        );
        assert_eq!(store.mark_failed(&room(), token), Some(2));

        // A late echo still replaces the failed entry.
        store.reconcile(&alice.user_id, echo("m1", &alice, "hi"));
        assert_eq!(bodies(&store), vec![("hi".to_string(), MessageState::Confirmed)]);
        assert_eq!(store.mark_failed(&room(), token), None);
    }

    #[test]
    fn sequence_is_stable_without_mutation() {
        let mut store = MessageStore::new(1);
        let alice = user("alice", "Alice");
        store.append_provisional(&room(), "a", &alice, 0);
        store.append_provisional(&room(), "b", &alice, 1);

        let first: Vec<_> = store.sequence_for(&room()).cloned().collect();
        let second: Vec<_> = store.sequence_for(&room()).cloned().collect();
        assert_eq!(first, second);
        assert_eq!(store.sequence_for(&RoomId::new("empty").unwrap()).count(), 0);
    }
}
