//! Typed command dispatcher for socket events. Each command is handled to
//! completion before the next one from the same connection; effects go out
//! through the [`Dispatcher`] channels, so this runs without a transport.

use tracing::{debug, warn};

use medora_types::error::ConsultError;
use medora_types::events::{ClientCommand, ServerEvent};
use medora_types::models::Role;

use crate::ConnId;
use crate::dispatcher::Dispatcher;
use crate::presence::ParticipantKey;
use crate::rooms::RoomMember;
use crate::service::ConsultationService;

#[derive(Clone)]
pub struct CommandHandler {
    service: ConsultationService,
    dispatcher: Dispatcher,
}

impl CommandHandler {
    pub fn new(service: ConsultationService, dispatcher: Dispatcher) -> Self {
        Self {
            service,
            dispatcher,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Handle a command; failures go back to the calling connection only.
    pub async fn dispatch(&self, conn_id: ConnId, command: ClientCommand) {
        let name = command.name();
        if let Err(err) = self.handle(conn_id, command).await {
            warn!("{} from connection {} failed: {}", name, conn_id, err);
            self.dispatcher
                .send_to(
                    conn_id,
                    ServerEvent::OperationError {
                        reason: err.reason().to_string(),
                        message: err.to_string(),
                    },
                )
                .await;
        }
    }

    pub async fn handle(&self, conn_id: ConnId, command: ClientCommand) -> Result<(), ConsultError> {
        match command {
            ClientCommand::PresenceAnnounce { participant_id, role } => {
                let key = ParticipantKey::new(participant_id.clone(), role);
                if !self.dispatcher.announce(conn_id, key).await {
                    return Err(ConsultError::Unauthorized);
                }
                self.dispatcher
                    .send_to(conn_id, ServerEvent::PresenceAck { participant_id, role })
                    .await;
            }

            ClientCommand::JoinRoom {
                appointment_id,
                participant_id,
                role,
            } => {
                self.check_identity(conn_id, &participant_id, Some(role)).await?;

                // Room membership only after authorization and persistence succeeded
                let outcome = self.service.join(&appointment_id, &participant_id, role).await?;
                let member = RoomMember {
                    participant_id: participant_id.clone(),
                    role,
                };
                let Some(newly_joined) = self.dispatcher.join_room(&appointment_id, conn_id, member).await
                else {
                    debug!("Connection {} closed before joining {}", conn_id, appointment_id);
                    return Ok(());
                };

                self.dispatcher
                    .send_to(
                        conn_id,
                        ServerEvent::RoomJoined {
                            appointment_id: appointment_id.clone(),
                            history: outcome.session.messages,
                            is_active: outcome.session.is_active,
                        },
                    )
                    .await;

                if newly_joined {
                    self.dispatcher
                        .broadcast_to_room_except(
                            &appointment_id,
                            conn_id,
                            ServerEvent::PeerJoined {
                                appointment_id: appointment_id.clone(),
                                role,
                                participant_id,
                            },
                        )
                        .await;
                }
            }

            ClientCommand::SendMessage {
                appointment_id,
                sender_id,
                role,
                payload,
            } => {
                self.check_identity(conn_id, &sender_id, Some(role)).await?;
                let message = self
                    .service
                    .send_message(&appointment_id, &sender_id, role, payload)
                    .await?;

                // Room-wide, sender included: clients render the server copy
                self.dispatcher
                    .broadcast_to_room(
                        &appointment_id,
                        ServerEvent::MessageBroadcast {
                            appointment_id: appointment_id.clone(),
                            message,
                        },
                    )
                    .await;
            }

            ClientCommand::Typing {
                appointment_id,
                participant_id,
                role,
            } => {
                self.relay_typing(conn_id, appointment_id, participant_id, role, true)
                    .await?;
            }

            ClientCommand::StopTyping {
                appointment_id,
                participant_id,
                role,
            } => {
                self.relay_typing(conn_id, appointment_id, participant_id, role, false)
                    .await?;
            }

            ClientCommand::MarkRead {
                appointment_id,
                reader_id,
            } => {
                let reader = self.check_identity(conn_id, &reader_id, None).await?;
                let changed = self
                    .service
                    .mark_read(&appointment_id, &reader_id, reader.role)
                    .await?;
                if changed > 0 {
                    self.dispatcher
                        .broadcast_to_room_except(
                            &appointment_id,
                            conn_id,
                            ServerEvent::ReadStateChanged {
                                appointment_id: appointment_id.clone(),
                                reader_id,
                            },
                        )
                        .await;
                }
            }

            ClientCommand::LeaveRoom {
                appointment_id,
                participant_id,
                role,
            } => {
                self.check_identity(conn_id, &participant_id, Some(role)).await?;
                if let Some(member) = self.dispatcher.leave_room(&appointment_id, conn_id).await {
                    self.dispatcher
                        .broadcast_to_room(
                            &appointment_id,
                            ServerEvent::PeerLeft {
                                appointment_id: appointment_id.clone(),
                                role: member.role,
                                participant_id: member.participant_id,
                            },
                        )
                        .await;
                }
            }

            ClientCommand::EndSession { appointment_id } => {
                if self.dispatcher.room_member(&appointment_id, conn_id).await.is_none() {
                    return Err(ConsultError::Unauthorized);
                }
                self.service.end(&appointment_id).await?;
                self.dispatcher
                    .broadcast_to_room(
                        &appointment_id,
                        ServerEvent::SessionEnded {
                            appointment_id: appointment_id.clone(),
                        },
                    )
                    .await;
            }
        }

        Ok(())
    }

    /// Transport reported the socket closed.
    pub async fn disconnect(&self, conn_id: ConnId) {
        let left = self.dispatcher.disconnect(conn_id).await;
        debug!("Connection {} closed, left {} room(s)", conn_id, left.len());
    }

    async fn relay_typing(
        &self,
        conn_id: ConnId,
        appointment_id: String,
        participant_id: String,
        role: Role,
        is_typing: bool,
    ) -> Result<(), ConsultError> {
        self.check_identity(conn_id, &participant_id, Some(role)).await?;

        // Best effort: typing from outside the room is dropped
        if self.dispatcher.room_member(&appointment_id, conn_id).await.is_none() {
            debug!("Dropping typing event from {} outside room {}", conn_id, appointment_id);
            return Ok(());
        }

        self.dispatcher
            .broadcast_to_room_except(
                &appointment_id,
                conn_id,
                ServerEvent::TypingChanged {
                    appointment_id: appointment_id.clone(),
                    participant_id,
                    role,
                    is_typing,
                },
            )
            .await;
        Ok(())
    }

    /// A connection may only act as the participant bound to it. Unbound
    /// connections may not act at all.
    async fn check_identity(
        &self,
        conn_id: ConnId,
        participant_id: &str,
        role: Option<Role>,
    ) -> Result<ParticipantKey, ConsultError> {
        let identity = self
            .dispatcher
            .identity_of(conn_id)
            .await
            .ok_or(ConsultError::Unauthorized)?;
        let role_matches = role.is_none_or(|r| r == identity.role);
        if identity.participant_id != participant_id || !role_matches {
            return Err(ConsultError::Unauthorized);
        }
        Ok(identity)
    }
}
