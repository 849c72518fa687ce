use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::events::CallKind;

use super::registry::UserId;

/// Session key: the unordered user pair. A pair is busy in either direction,
/// so user A calling B while B is calling A collides on the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PairKey(UserId, UserId);

impl PairKey {
    fn new(a: UserId, b: UserId) -> Self {
        if a <= b { Self(a, b) } else { Self(b, a) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallState {
    /// Offer forwarded to the callee, waiting for answer or reject.
    Ringing,
    /// Answer forwarded back; media is the peers' business from here.
    Connected,
}

#[derive(Debug)]
struct CallSession {
    caller: UserId,
    callee: UserId,
    #[allow(dead_code)]
    kind: CallKind,
    state: CallState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitiateOutcome {
    Ringing,
    /// The pair already has a pending or active session.
    Busy,
}

/// Signaling state for in-progress calls, one session per user pair.
///
/// Every transition runs under the single session-table mutex; callers send
/// the forwarded event only after the transition committed, so once a session
/// is torn down no further signals can be emitted for it. Concurrent events
/// racing on the same pair resolve last-writer-wins.
#[derive(Default)]
pub struct CallBroker {
    sessions: Mutex<HashMap<PairKey, CallSession>>,
}

impl CallBroker {
    /// Start ringing, unless the pair is already in a call.
    pub async fn begin(&self, caller: UserId, callee: UserId, kind: CallKind) -> InitiateOutcome {
        let mut sessions = self.sessions.lock().await;
        let key = PairKey::new(caller, callee);
        if sessions.contains_key(&key) {
            return InitiateOutcome::Busy;
        }
        sessions.insert(
            key,
            CallSession {
                caller,
                callee,
                kind,
                state: CallState::Ringing,
            },
        );
        InitiateOutcome::Ringing
    }

    /// `RINGING -> CONNECTED`, only for the callee of that session. Returns
    /// whether the transition happened; anything else is a stale event.
    pub async fn answer(&self, callee: UserId, caller: UserId) -> bool {
        let mut sessions = self.sessions.lock().await;
        let Some(session) = sessions.get_mut(&PairKey::new(caller, callee)) else {
            return false;
        };
        if session.state != CallState::Ringing
            || session.caller != caller
            || session.callee != callee
        {
            return false;
        }
        session.state = CallState::Connected;
        true
    }

    /// `RINGING -> ENDED` via the callee declining. The session is removed.
    pub async fn reject(&self, callee: UserId, caller: UserId) -> bool {
        let mut sessions = self.sessions.lock().await;
        let key = PairKey::new(caller, callee);
        let Some(session) = sessions.get(&key) else {
            return false;
        };
        if session.state != CallState::Ringing
            || session.caller != caller
            || session.callee != callee
        {
            return false;
        }
        sessions.remove(&key);
        true
    }

    /// ICE relay is allowed while a session between the two users exists, in
    /// either state. No transition.
    pub async fn can_relay(&self, a: UserId, b: UserId) -> bool {
        self.sessions.lock().await.contains_key(&PairKey::new(a, b))
    }

    /// Hang up from either side, valid while ringing (caller gives up early)
    /// or connected. The session is removed.
    pub async fn end(&self, from: UserId, to: UserId) -> bool {
        let mut sessions = self.sessions.lock().await;
        let key = PairKey::new(from, to);
        let Some(session) = sessions.get(&key) else {
            return false;
        };
        let participants = [session.caller, session.callee];
        if !participants.contains(&from) || !participants.contains(&to) {
            return false;
        }
        sessions.remove(&key);
        true
    }

    /// A participant disconnected: tear down every session they were part of
    /// and report the peers that should receive a synthesized `call:ended`.
    pub async fn drop_user(&self, user_id: UserId) -> Vec<UserId> {
        let mut sessions = self.sessions.lock().await;
        let mut peers = Vec::new();
        sessions.retain(|_, session| {
            if session.caller == user_id {
                peers.push(session.callee);
                false
            } else if session.callee == user_id {
                peers.push(session.caller);
                false
            } else {
                true
            }
        });
        peers
    }
}
