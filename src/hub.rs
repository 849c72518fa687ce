pub mod calls;
pub mod registry;
pub mod rooms;
pub mod typing;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::events::{CallFailure, ClientEvent, MessageKind, ServerEvent};
use crate::store::MessageStore;

use self::calls::{CallBroker, InitiateOutcome};
use self::registry::{ConnId, Registry, UserId};
use self::rooms::{RoomId, RoomIndex};
use self::typing::TypingTracker;

/// The real-time core: connection registry, room index, call broker and
/// typing tracker behind one explicitly constructed instance. No module-level
/// state; everything a connection needs is reachable from here.
///
/// Each shared table carries its own lock, so unrelated traffic (two
/// different rooms, a call and a broadcast) never serializes. Persistence
/// awaits only suspend the sending connection's dispatch.
pub struct Hub {
    store: Arc<dyn MessageStore>,
    registry: Registry,
    rooms: RoomIndex,
    calls: CallBroker,
    typing: TypingTracker,
    typing_ttl: Duration,
}

impl Hub {
    pub fn new(store: Arc<dyn MessageStore>, typing_ttl: Duration) -> Self {
        Self {
            store,
            registry: Registry::default(),
            rooms: RoomIndex::default(),
            calls: CallBroker::default(),
            typing: TypingTracker::default(),
            typing_ttl,
        }
    }

    /// Register a freshly upgraded connection. `tx` is the queue its writer
    /// task drains into the socket.
    pub async fn connect(&self, tx: UnboundedSender<ServerEvent>) -> ConnId {
        let conn_id = self.registry.register(tx).await;
        debug!(%conn_id, "connection registered");
        conn_id
    }

    /// The sole cleanup hook: unregister, leave every room, clear typing
    /// indicators and force-end any call the user was in. Runs on every
    /// dispatch-loop exit, whatever the connection was doing last. Call
    /// teardown only happens when this connection was still the user's
    /// active route; a stale connection superseded by a reconnect must not
    /// end the call running on the newer one.
    pub async fn disconnect(&self, conn_id: ConnId) {
        let user_id = self.registry.unregister(conn_id).await;
        self.rooms.leave_all(conn_id).await;

        for (room_id, typer) in self.typing.drop_conn(conn_id).await {
            self.broadcast_room(
                room_id,
                ServerEvent::StopTyping {
                    conversation_id: room_id,
                    user_id: typer,
                },
                Some(conn_id),
            )
            .await;
        }

        if let Some(user_id) = user_id {
            for peer in self.calls.drop_user(user_id).await {
                self.send_to_user(peer, ServerEvent::CallEnded { from_user_id: user_id })
                    .await;
            }
        }
        debug!(%conn_id, ?user_id, "connection cleaned up");
    }

    /// Route one validated inbound event to the owning component. Handlers
    /// log their own failures; nothing here can take down the serving loop.
    pub async fn dispatch(self: Arc<Self>, conn_id: ConnId, event: ClientEvent) {
        match event {
            ClientEvent::Identify { user_id } => {
                self.registry.identify(conn_id, user_id).await;
                debug!(%conn_id, user_id, "connection identified");
                self.send_to_conn(conn_id, ServerEvent::Identified { user_id })
                    .await;
            }

            ClientEvent::JoinConversation { conversation_id } => {
                self.rooms.join(conversation_id, conn_id).await;
                debug!(%conn_id, room = conversation_id, "joined conversation");
            }

            ClientEvent::LeaveConversation { conversation_id } => {
                self.rooms.leave(conversation_id, conn_id).await;
                debug!(%conn_id, room = conversation_id, "left conversation");
            }

            ClientEvent::SendMessage {
                conversation_id,
                sender_id,
                message,
                kind,
                message_id,
            } => {
                self.handle_send(conn_id, conversation_id, sender_id, message, kind, message_id)
                    .await;
            }

            ClientEvent::Typing {
                conversation_id,
                user_id,
            } => {
                self.broadcast_room(
                    conversation_id,
                    ServerEvent::Typing {
                        conversation_id,
                        user_id,
                    },
                    Some(conn_id),
                )
                .await;

                let generation = self.typing.arm(conversation_id, user_id, conn_id).await;
                let hub = Arc::clone(&self);
                tokio::spawn(async move {
                    tokio::time::sleep(hub.typing_ttl).await;
                    if let Some(origin) = hub.typing.expire(conversation_id, user_id, generation).await
                    {
                        debug!(room = conversation_id, user_id, "typing indicator expired");
                        hub.broadcast_room(
                            conversation_id,
                            ServerEvent::StopTyping {
                                conversation_id,
                                user_id,
                            },
                            Some(origin),
                        )
                        .await;
                    }
                });
            }

            ClientEvent::StopTyping {
                conversation_id,
                user_id,
            } => {
                self.typing.disarm(conversation_id, user_id).await;
                self.broadcast_room(
                    conversation_id,
                    ServerEvent::StopTyping {
                        conversation_id,
                        user_id,
                    },
                    Some(conn_id),
                )
                .await;
            }

            ClientEvent::CallInitiate {
                to_user_id,
                from_user_id,
                call_type,
                offer,
            } => {
                let Some(caller) = self.authenticated_user(conn_id, from_user_id, "call:initiate").await
                else {
                    return;
                };

                let Some(callee_tx) = self.sender_to_user(to_user_id).await else {
                    debug!(caller, callee = to_user_id, "call target offline");
                    self.send_to_conn(
                        conn_id,
                        ServerEvent::CallFailed {
                            to_user_id,
                            reason: CallFailure::Offline,
                        },
                    )
                    .await;
                    return;
                };

                match self.calls.begin(caller, to_user_id, call_type).await {
                    InitiateOutcome::Busy => {
                        debug!(caller, callee = to_user_id, "call target busy");
                        self.send_to_conn(
                            conn_id,
                            ServerEvent::CallFailed {
                                to_user_id,
                                reason: CallFailure::Busy,
                            },
                        )
                        .await;
                    }
                    InitiateOutcome::Ringing => {
                        let delivered = callee_tx
                            .send(ServerEvent::CallIncoming {
                                from_user_id: caller,
                                call_type,
                                offer,
                            })
                            .is_ok();
                        if !delivered {
                            // The callee's writer went away between lookup and
                            // send; undo the session and report offline.
                            self.calls.end(caller, to_user_id).await;
                            self.send_to_conn(
                                conn_id,
                                ServerEvent::CallFailed {
                                    to_user_id,
                                    reason: CallFailure::Offline,
                                },
                            )
                            .await;
                        }
                    }
                }
            }

            ClientEvent::CallAnswer {
                to_user_id,
                from_user_id,
                answer,
            } => {
                let Some(callee) = self.authenticated_user(conn_id, from_user_id, "call:answer").await
                else {
                    return;
                };
                if self.calls.answer(callee, to_user_id).await {
                    self.send_to_user(to_user_id, ServerEvent::CallAnswered { answer })
                        .await;
                } else {
                    debug!(callee, caller = to_user_id, "stale call:answer ignored");
                }
            }

            ClientEvent::CallReject {
                to_user_id,
                from_user_id,
            } => {
                let Some(callee) = self.authenticated_user(conn_id, from_user_id, "call:reject").await
                else {
                    return;
                };
                if self.calls.reject(callee, to_user_id).await {
                    self.send_to_user(
                        to_user_id,
                        ServerEvent::CallRejected { from_user_id: callee },
                    )
                    .await;
                } else {
                    debug!(callee, caller = to_user_id, "stale call:reject ignored");
                }
            }

            ClientEvent::CallIceCandidate {
                to_user_id,
                from_user_id,
                candidate,
            } => {
                let Some(from) = self
                    .authenticated_user(conn_id, from_user_id, "call:ice-candidate")
                    .await
                else {
                    return;
                };
                // Pure relay; silently dropped without a session or target.
                if self.calls.can_relay(from, to_user_id).await {
                    self.send_to_user(
                        to_user_id,
                        ServerEvent::CallIceCandidate {
                            from_user_id: from,
                            candidate,
                        },
                    )
                    .await;
                }
            }

            ClientEvent::CallEnd {
                to_user_id,
                from_user_id,
            } => {
                let Some(from) = self.authenticated_user(conn_id, from_user_id, "call:end").await
                else {
                    return;
                };
                if self.calls.end(from, to_user_id).await {
                    self.send_to_user(to_user_id, ServerEvent::CallEnded { from_user_id: from })
                        .await;
                } else {
                    debug!(from, to = to_user_id, "stale call:end ignored");
                }
            }
        }
    }

    /// Persist (or look up) a message and fan it out to the room, sender
    /// included -- the echo is how the sender's UI learns the assigned id and
    /// timestamp. Failures go back to the sender alone.
    async fn handle_send(
        &self,
        conn_id: ConnId,
        conversation_id: RoomId,
        claimed_sender: UserId,
        message: String,
        kind: MessageKind,
        message_id: Option<i64>,
    ) {
        let Some(sender_id) = self.registry.user_of(conn_id).await else {
            warn!(%conn_id, "send_message from unidentified connection dropped");
            return;
        };
        if claimed_sender != sender_id {
            warn!(
                claimed = claimed_sender,
                actual = sender_id,
                "senderId in payload disagrees with connection identity; using the latter"
            );
        }

        let looked_up = match kind {
            MessageKind::Text => self
                .store
                .create_message(sender_id, conversation_id, &message)
                .await
                .map(Some),
            MessageKind::File => match message_id {
                Some(message_id) => self.store.message_by_id(message_id).await,
                None => {
                    self.send_to_conn(
                        conn_id,
                        ServerEvent::SendMessageError {
                            message: "file message is missing messageId".to_owned(),
                        },
                    )
                    .await;
                    return;
                }
            },
        };

        let record = match looked_up {
            Ok(Some(record)) => record,
            Ok(None) => {
                self.send_to_conn(
                    conn_id,
                    ServerEvent::SendMessageError {
                        message: format!("message {} does not exist", message_id.unwrap_or(-1)),
                    },
                )
                .await;
                return;
            }
            Err(err) => {
                warn!(%conn_id, sender_id, room = conversation_id, %err, "persistence failed");
                self.send_to_conn(
                    conn_id,
                    ServerEvent::SendMessageError {
                        message: err.to_string(),
                    },
                )
                .await;
                return;
            }
        };

        if record.sender_id != sender_id || record.conversation_id != conversation_id {
            warn!(
                %conn_id,
                sender_id,
                record_id = record.id,
                "file message record does not belong to this sender and conversation"
            );
            self.send_to_conn(
                conn_id,
                ServerEvent::SendMessageError {
                    message: format!("message {} does not exist", record.id),
                },
            )
            .await;
            return;
        }

        self.broadcast_room(conversation_id, ServerEvent::NewMessage(record), None)
            .await;
    }

    /// Fan one event out to the room's subscribers. The subscriber set is
    /// snapshotted under its lock, the sends happen after release. A room
    /// with no subscribers is a silent no-op.
    async fn broadcast_room(&self, room_id: RoomId, event: ServerEvent, except: Option<ConnId>) {
        let mut subscribers = self.rooms.subscribers_of(room_id).await;
        if let Some(except) = except {
            subscribers.retain(|conn_id| *conn_id != except);
        }
        let senders = self.registry.senders_for(&subscribers).await;
        debug!(room = room_id, recipients = senders.len(), "room fan-out");
        for tx in senders {
            let _ = tx.send(event.clone());
        }
    }

    /// Protocol errors: answer a single bad frame, keep the connection.
    pub async fn send_error(&self, conn_id: ConnId, message: String) {
        self.send_to_conn(conn_id, ServerEvent::Error { message })
            .await;
    }

    async fn send_to_conn(&self, conn_id: ConnId, event: ServerEvent) {
        if let Some(tx) = self.registry.sender_of(conn_id).await {
            let _ = tx.send(event);
        }
    }

    /// Deliver to the user's current connection, if any.
    async fn send_to_user(&self, user_id: UserId, event: ServerEvent) -> bool {
        match self.sender_to_user(user_id).await {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    async fn sender_to_user(&self, user_id: UserId) -> Option<UnboundedSender<ServerEvent>> {
        let conn_id = self.registry.lookup_by_user(user_id).await?;
        self.registry.sender_of(conn_id).await
    }

    /// Resolve the connection's identity for a call event. The payload's
    /// `fromUserId` is not trusted; a mismatch is logged and the registry
    /// identity wins. Unidentified connections are dropped with a log line.
    async fn authenticated_user(
        &self,
        conn_id: ConnId,
        claimed: UserId,
        event: &'static str,
    ) -> Option<UserId> {
        let Some(user_id) = self.registry.user_of(conn_id).await else {
            warn!(%conn_id, event, "event from unidentified connection dropped");
            return None;
        };
        if user_id != claimed {
            warn!(
                event,
                claimed,
                actual = user_id,
                "fromUserId in payload disagrees with connection identity; using the latter"
            );
        }
        Some(user_id)
    }
}
