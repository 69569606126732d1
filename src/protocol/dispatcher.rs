use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::config::PROTOCOL_VERSION;
use crate::core::request::{
    PublicKeyRequest, RegisterRequest, Request, RequestBody, RequestCode, SendMessageRequest,
};
use crate::core::response::{
    MessageSent, PolledMessage, PolledMessages, PublicKeyReply, RegistrationOk, Response,
    UserEntry, UserList,
};
use crate::error::{ErrorClass, Result, ServerError};
use crate::model::ClientId;
use crate::service::{ClientService, MessageService};
use crate::store::MailboxStore;
use crate::utils::metrics::{Metrics, Timer};

/// Per-request facts handed to every handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext {
    /// Requester as claimed in the header; unverified
    pub client_id: ClientId,
    pub version: u8,
    pub code: RequestCode,
}

/// What the connection should do after writing the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    KeepOpen,
    Close,
}

/// Outcome of dispatching one frame: always exactly one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatched {
    pub response: Response,
    pub disposition: Disposition,
}

impl Dispatched {
    fn ok(response: Response) -> Self {
        Self {
            response,
            disposition: Disposition::KeepOpen,
        }
    }

    fn error(disposition: Disposition) -> Self {
        Self {
            response: Response::error(),
            disposition,
        }
    }
}

/// Routes decoded requests to the services.
///
/// Routing is an exhaustive match over [`RequestBody`], so every opcode the
/// codec accepts has a handler. This is the only place where domain and store
/// failures turn into ERROR responses.
#[derive(Clone)]
pub struct Dispatcher {
    clients: ClientService,
    messages: MessageService,
    close_on_error: bool,
    metrics: Arc<Metrics>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn MailboxStore>) -> Self {
        Self {
            clients: ClientService::new(Arc::clone(&store)),
            messages: MessageService::new(store),
            close_on_error: true,
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Whether domain and store failures close the connection. Protocol
    /// failures always do.
    pub fn with_close_on_error(mut self, close_on_error: bool) -> Self {
        self.close_on_error = close_on_error;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Decode one complete frame, run its handler and produce the response.
    pub fn dispatch(&self, frame: &[u8]) -> Dispatched {
        let request = match Request::decode(frame) {
            Ok(request) => request,
            Err(err) => {
                warn!(error = %err, frame_len = frame.len(), "Rejecting malformed request");
                self.metrics.error(ErrorClass::Protocol);
                return Dispatched::error(Disposition::Close);
            }
        };

        let ctx = RequestContext {
            client_id: request.header.client_id,
            version: request.header.version,
            code: request.body.code(),
        };
        if ctx.version != PROTOCOL_VERSION {
            debug!(version = ctx.version, "Request carries a different protocol version");
        }
        debug!(client_id = %ctx.client_id, code = ctx.code.name(), "Dispatching request");

        let _timer = Timer::start(ctx.code.name());
        match self.handle(&ctx, request.body) {
            Ok(response) => Dispatched::ok(response),
            Err(err) => self.fail(&ctx, err),
        }
    }

    fn handle(&self, ctx: &RequestContext, body: RequestBody) -> Result<Response> {
        if ctx.code != RequestCode::Register {
            self.clients.touch(ctx.client_id)?;
        }

        match body {
            RequestBody::Register(register) => self.register(register),
            RequestBody::ListUsers => self.list_users(ctx),
            RequestBody::GetPublicKey(lookup) => self.public_key(lookup),
            RequestBody::SendMessage(send) => self.send_message(ctx, send),
            RequestBody::PollMessages => self.poll_messages(ctx),
        }
    }

    fn register(&self, register: RegisterRequest) -> Result<Response> {
        let client = self
            .clients
            .register(&register.username, register.public_key)?;
        self.metrics.client_registered();
        Ok(Response::registered(RegistrationOk {
            client_id: client.id,
        }))
    }

    fn list_users(&self, ctx: &RequestContext) -> Result<Response> {
        let users = self
            .clients
            .list_all(ctx.client_id)?
            .into_iter()
            .map(|client| UserEntry {
                client_id: client.id,
                username: client.username,
            })
            .collect();
        Ok(Response::user_list(UserList { users }))
    }

    fn public_key(&self, lookup: PublicKeyRequest) -> Result<Response> {
        let client = self.clients.find_by_id(lookup.client_id)?;
        Ok(Response::public_key(PublicKeyReply {
            client_id: client.id,
            public_key: client.public_key,
        }))
    }

    fn send_message(&self, ctx: &RequestContext, send: SendMessageRequest) -> Result<Response> {
        let message = self
            .messages
            .send(ctx.client_id, send.to_client, send.kind, send.content)?;
        self.metrics.message_queued();
        Ok(Response::message_sent(MessageSent {
            to_client: message.to_client,
            message_id: message.id,
        }))
    }

    fn poll_messages(&self, ctx: &RequestContext) -> Result<Response> {
        let messages: Vec<PolledMessage> = self
            .messages
            .poll(ctx.client_id)?
            .into_iter()
            .map(|message| PolledMessage {
                from_client: message.from_client,
                message_id: message.id,
                kind: message.kind,
                content: message.content,
            })
            .collect();
        self.metrics.messages_delivered(messages.len() as u64);
        Ok(Response::polled_messages(PolledMessages { messages }))
    }

    fn fail(&self, ctx: &RequestContext, err: ServerError) -> Dispatched {
        let class = err.class();
        self.metrics.error(class);

        match class {
            ErrorClass::Store | ErrorClass::Config | ErrorClass::Transport => error!(
                client_id = %ctx.client_id,
                code = ctx.code.name(),
                error = %err,
                "Request failed"
            ),
            ErrorClass::Domain | ErrorClass::Protocol => warn!(
                client_id = %ctx.client_id,
                code = ctx.code.name(),
                error = %err,
                "Request rejected"
            ),
        }

        let disposition = if class == ErrorClass::Protocol || self.close_on_error {
            Disposition::Close
        } else {
            Disposition::KeepOpen
        };
        Dispatched::error(disposition)
    }
}
