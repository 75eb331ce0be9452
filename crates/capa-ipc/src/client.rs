//! Minimal RPC client.
//!
//! Calls are issued one at a time over a single connection; the response id
//! must match the request id.

use capa_core::MetadataMap;
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::error::RpcError;
use crate::frame;
use crate::messages::{
    ActorReminder, GetActorReminderRequest, GetActorStateRequest, InvokeActorReply,
    InvokeActorRequest, MetadataReply, RpcCall, RpcReply, RpcRequest, RpcResponse,
    SetMetadataRequest,
};

pub struct RpcClient {
    stream: TcpStream,
    next_id: u64,
}

impl RpcClient {
    pub async fn connect(addr: impl ToSocketAddrs) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self { stream, next_id: 1 })
    }

    pub async fn call(&mut self, call: RpcCall) -> Result<RpcReply, RpcError> {
        self.call_with_metadata(call, MetadataMap::new()).await
    }

    pub async fn call_with_metadata(
        &mut self,
        call: RpcCall,
        metadata: MetadataMap,
    ) -> Result<RpcReply, RpcError> {
        let id = self.next_id;
        self.next_id += 1;

        let request = RpcRequest { id, metadata, call };
        frame::write_frame(&mut self.stream, &request).await?;

        let response: RpcResponse = frame::read_frame(&mut self.stream)
            .await?
            .ok_or(RpcError::ConnectionClosed)?;
        if response.id != id {
            return Err(RpcError::IdMismatch {
                expected: id,
                actual: response.id,
            });
        }
        response.outcome.map_err(RpcError::Status)
    }

    /// Send a call that must succeed with an empty reply.
    pub async fn call_empty(&mut self, call: RpcCall) -> Result<(), RpcError> {
        let name = call.name();
        match self.call(call).await? {
            RpcReply::Empty => Ok(()),
            _ => Err(RpcError::UnexpectedReply { call: name }),
        }
    }

    pub async fn get_actor_state(
        &mut self,
        request: GetActorStateRequest,
    ) -> Result<Vec<u8>, RpcError> {
        match self.call(RpcCall::GetActorState(request)).await? {
            RpcReply::ActorState { data } => Ok(data),
            _ => Err(RpcError::UnexpectedReply {
                call: "GetActorState",
            }),
        }
    }

    pub async fn get_actor_reminder(
        &mut self,
        request: GetActorReminderRequest,
    ) -> Result<Option<ActorReminder>, RpcError> {
        match self.call(RpcCall::GetActorReminder(request)).await? {
            RpcReply::ActorReminder(reminder) => Ok(reminder),
            _ => Err(RpcError::UnexpectedReply {
                call: "GetActorReminder",
            }),
        }
    }

    pub async fn invoke_actor(
        &mut self,
        request: InvokeActorRequest,
        metadata: MetadataMap,
    ) -> Result<InvokeActorReply, RpcError> {
        match self
            .call_with_metadata(RpcCall::InvokeActor(request), metadata)
            .await?
        {
            RpcReply::InvokeActor(reply) => Ok(reply),
            _ => Err(RpcError::UnexpectedReply {
                call: "InvokeActor",
            }),
        }
    }

    pub async fn get_metadata(&mut self) -> Result<MetadataReply, RpcError> {
        match self.call(RpcCall::GetMetadata).await? {
            RpcReply::Metadata(reply) => Ok(reply),
            _ => Err(RpcError::UnexpectedReply {
                call: "GetMetadata",
            }),
        }
    }

    pub async fn set_metadata(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), RpcError> {
        self.call_empty(RpcCall::SetMetadata(SetMetadataRequest {
            key: key.into(),
            value: value.into(),
        }))
        .await
    }

    pub async fn shutdown(&mut self) -> Result<(), RpcError> {
        self.call_empty(RpcCall::Shutdown).await
    }
}
