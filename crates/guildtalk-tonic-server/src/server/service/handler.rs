//! gRPC service implementation for the chat gateway.
//!
//! [`GatewayService`] implements the [`ChatGateway`] service from
//! `guildtalk.proto`. Each `Invoke` call runs one command on a spawned task
//! and streams its replies back in order; `Membership` forwards the
//! transport's ready/join/leave events to the coordinator.

use crate::server::{
    config::ServerConfig,
    telemetry::{
        decrement_generation_requests_inflight, increment_busy_rejections, increment_chunks_sent,
        increment_commands, increment_generation_failures, increment_generation_requests_inflight,
        record_generation_duration,
    },
};
use core::pin::Pin;
use guildtalk_tonic_core::{
    IntoStatus,
    guildtalk::{Bot, CommandKind, Engine, Error, Invocation, Outcome, Reply, ReplySink},
    proto::{
        self, InvokeRequest, MembershipAck, MembershipEvent, Ready,
        chat_gateway_server::ChatGateway, membership_event::Event,
    },
};
use std::sync::Arc;
use std::time::Instant;
use tokio_stream::{Stream, StreamExt, wrappers::ReceiverStream};
use tonic::{Request, Response, Status};

/// gRPC front of a [`Bot`].
///
/// Cloning is cheap; every clone drives the same bot and coordinator.
pub struct GatewayService<E: Engine> {
    bot: Arc<Bot<E>>,
    config: ServerConfig,
}

impl<E: Engine> Clone for GatewayService<E> {
    fn clone(&self) -> Self {
        Self {
            bot: Arc::clone(&self.bot),
            config: self.config.clone(),
        }
    }
}

impl<E: Engine> GatewayService<E> {
    pub fn new(bot: Bot<E>, config: ServerConfig) -> Self {
        Self {
            bot: Arc::new(bot),
            config,
        }
    }

    /// Stops accepting work, releases every session and stops the generation
    /// worker.
    pub async fn shutdown(&self) -> Result<(), Error> {
        self.bot.coordinator().shutdown().await
    }
}

/// Commands counted as generation requests, busy rejections included.
fn is_generation(command: &str) -> bool {
    matches!(
        command.parse::<CommandKind>(),
        Ok(CommandKind::Talk | CommandKind::DebugTalk)
    )
}

#[tonic::async_trait]
impl<E: Engine> ChatGateway for GatewayService<E> {
    type InvokeStream = Pin<Box<dyn Stream<Item = Result<proto::Reply, Status>> + Send>>;

    /// Runs one chat command and streams its replies.
    ///
    /// Command failures are part of the stream as text replies, the same way
    /// the author sees them in chat. The call itself only fails if the
    /// request cannot be started.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(command = %req.get_ref().command, guild = ?req.get_ref().guild_id)))]
    async fn invoke(
        &self,
        req: Request<InvokeRequest>,
    ) -> Result<Response<Self::InvokeStream>, Status> {
        let invocation = Invocation::from(req.into_inner());
        increment_commands();

        let (replies, rx) = ReplySink::channel(self.config.stream_buffer_size);
        let bot = Arc::clone(&self.bot);
        let generation = is_generation(&invocation.command);

        let fut = async move {
            let start = Instant::now();
            if generation {
                increment_generation_requests_inflight();
            }

            match bot.dispatch(invocation, &replies).await {
                Ok(Outcome::Completed) => {
                    if generation {
                        record_generation_duration(start.elapsed().as_millis() as f64);
                    }
                }
                Ok(Outcome::Reported(Error::Busy)) => increment_busy_rejections(),
                Ok(Outcome::Reported(Error::GenerationFailed(_))) => {
                    increment_generation_failures();
                }
                Ok(Outcome::Reported(_)) => {}
                Err(_e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Reply stream dropped by the client: {}", _e);
                }
            }

            if generation {
                decrement_generation_requests_inflight();
            }
        };
        #[cfg(feature = "tracing")]
        let fut = {
            use tracing::Instrument;
            let span = tracing::info_span!("command");
            fut.instrument(span)
        };

        tokio::spawn(fut);

        let stream = ReceiverStream::new(rx).map(|reply| {
            if matches!(reply, Reply::Text(_)) {
                increment_chunks_sent();
            }
            Ok::<_, Status>(proto::Reply::from(reply))
        });

        Ok(Response::new(Box::pin(stream)))
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn membership(
        &self,
        req: Request<MembershipEvent>,
    ) -> Result<Response<MembershipAck>, Status> {
        let coordinator = self.bot.coordinator();
        let populated = match req.into_inner().event {
            Some(Event::Ready(Ready { guild_ids })) => coordinator
                .on_ready(guild_ids)
                .await
                .map_err(IntoStatus::into_status)?,
            Some(Event::Joined(guild_id)) => {
                coordinator.on_guild_joined(guild_id);
                false
            }
            Some(Event::Left(guild_id)) => {
                coordinator
                    .on_guild_left(guild_id)
                    .await
                    .map_err(IntoStatus::into_status)?;
                false
            }
            None => return Err(Status::invalid_argument("membership event is empty")),
        };

        let guilds = u32::try_from(coordinator.registry().len()).unwrap_or(u32::MAX);
        Ok(Response::new(MembershipAck { guilds, populated }))
    }
}
