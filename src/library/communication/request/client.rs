use super::{Callback, CompletionGuard, ResponseFuture};
use crate::library::communication::expiry::{ExpireService, ExpireWorker, WaiterKey};
use crate::library::communication::message::{
    Message, MessageBuilder, MessageType, Payload, PayloadFormat, Priority, Uri,
};
use crate::library::communication::transport::{Listener, Transport};
use crate::library::communication::{ClientError, RpcError, RpcResult};
use log::{debug, trace, warn};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Progress of handing a request over to the expiration worker
///
/// Shared between the response listener and the invoking thread as the response may arrive
/// before the waiter has been armed.
enum Arming {
    Pending,
    Armed(WaiterKey),
    Retired,
}

/// Client for invoking a single remote method
///
/// Each invocation sends one request built from the client's template and resolves exactly once,
/// either with the matching response or with an [`RpcError`]. Responses are correlated by the
/// identifier of the request they reply to, anything else arriving at the client's address is ignored.
///
/// Requests which are still outstanding when the client is dropped resolve with [`RpcError::Discarded`].
///
/// ```no_run
/// # use pubsub_rpc::library::communication::{implementation::loopback::LoopbackTransport, message::*, request::RpcClient};
/// # use std::{sync::Arc, time::Duration};
/// # async fn run() -> anyhow::Result<()> {
/// let transport = Arc::new(LoopbackTransport::new(Uri::new("client", 0x10, 1, 0)));
/// let method = Uri::new("server", 0x20, 1, 0x1);
/// let client = RpcClient::new(transport, method, Priority::CS4, Duration::from_millis(500))?;
///
/// let response = client.invoke(Payload::text("ping")).await?;
/// println!("{:?}", response.payload());
/// # Ok(())
/// # }
/// ```
pub struct RpcClient {
    transport: Arc<dyn Transport>,
    ttl: Duration,
    builder: MessageBuilder,
    expire_service: ExpireService,
}

impl RpcClient {
    /// Creates a client for `method` which is served by the process-wide expiration worker
    pub fn new(
        transport: Arc<dyn Transport>,
        method: Uri,
        priority: Priority,
        ttl: Duration,
    ) -> Result<Self, ClientError> {
        let expire_service = ExpireService::shared().map_err(ClientError::WorkerUnavailable)?;
        Self::assemble(transport, method, priority, ttl, expire_service)
    }

    /// Creates a client for `method` which is served by the given expiration worker
    pub fn with_expire_worker(
        transport: Arc<dyn Transport>,
        method: Uri,
        priority: Priority,
        ttl: Duration,
        worker: Arc<ExpireWorker>,
    ) -> Result<Self, ClientError> {
        Self::assemble(transport, method, priority, ttl, ExpireService::new(worker))
    }

    fn assemble(
        transport: Arc<dyn Transport>,
        method: Uri,
        priority: Priority,
        ttl: Duration,
        expire_service: ExpireService,
    ) -> Result<Self, ClientError> {
        if !method.is_rpc_method() {
            return Err(ClientError::InvalidMethod(method));
        }

        let source = transport.default_source().clone();
        let builder = MessageBuilder::request(method, source, priority, ttl)?;

        Ok(Self {
            transport,
            ttl,
            builder,
            expire_service,
        })
    }

    /// Sets the payload format of requests sent without an explicit [`Payload`]
    pub fn with_payload_format(mut self, format: PayloadFormat) -> Self {
        self.builder.with_payload_format(format);
        self
    }

    /// Sets the permission level claimed by requests
    pub fn with_permission_level(mut self, level: u32) -> Self {
        self.builder.with_permission_level(level);
        self
    }

    /// Sets the access token passed along with requests
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.builder.with_token(token);
        self
    }

    /// Time-to-live of each request
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Sends a request carrying `payload` and passes its outcome to `callback`
    ///
    /// The callback is invoked exactly once. It may run on the calling thread if the request fails
    /// right away, on a transport thread once the response arrives, or on the expiration worker.
    pub fn invoke_with(
        &self,
        payload: Payload,
        callback: impl FnOnce(RpcResult) + Send + 'static,
    ) {
        let request = self.builder.build_with_payload(payload);
        self.invoke_message(request, Box::new(callback));
    }

    /// Sends a request without payload and passes its outcome to `callback`, see [`invoke_with`](RpcClient::invoke_with)
    pub fn invoke_empty_with(&self, callback: impl FnOnce(RpcResult) + Send + 'static) {
        let request = self.builder.build();
        self.invoke_message(request, Box::new(callback));
    }

    /// Sends a request carrying `payload` and returns a future resolving with its outcome
    pub fn invoke(&self, payload: Payload) -> ResponseFuture {
        let (producer, future) = ResponseFuture::channel();
        self.invoke_with(payload, producer);
        future
    }

    /// Sends a request without payload and returns a future resolving with its outcome
    pub fn invoke_empty(&self) -> ResponseFuture {
        let (producer, future) = ResponseFuture::channel();
        self.invoke_empty_with(producer);
        future
    }

    fn invoke_message(&self, request: Message, callback: Callback) {
        let deadline = Instant::now() + self.ttl;
        let request_id = request.id();
        let attributes = request.attributes();

        let guard = Arc::new(CompletionGuard::new(callback));
        let arming = Arc::new(Mutex::new(Arming::Pending));

        let listener = response_listener(
            request_id,
            guard.clone(),
            arming.clone(),
            Arc::downgrade(self.expire_service.worker()),
        );

        let handle = match self.transport.register_listener(
            &attributes.source,
            listener,
            attributes.sink.as_ref(),
        ) {
            Ok(handle) => handle,
            Err(status) => {
                warn!("Unable to listen for response to {}: {}", request_id, status);
                guard.deliver(Err(RpcError::RegistrationFailed(status)));
                return;
            }
        };

        if let Err(status) = self.transport.send(&request) {
            warn!("Unable to send request {}: {}", request_id, status);
            handle.release();
            guard.deliver(Err(RpcError::SendFailed(status)));
            return;
        }

        trace!("Sent request {}, expiring in {:?}", request_id, self.ttl);

        let expiring_guard = guard.clone();
        let key = self
            .expire_service
            .enqueue(deadline, handle, move |reason| {
                expiring_guard.deliver(Err(reason));
            });

        if let Some(key) = key {
            let mut state = arming.lock().unwrap_or_else(PoisonError::into_inner);

            if let Arming::Retired = *state {
                drop(state);
                debug!("Response to {} arrived before arming", request_id);
                self.expire_service.retire(key);
            } else {
                *state = Arming::Armed(key);
            }
        }
    }
}

/// Builds the listener which resolves a request once its response arrives
fn response_listener(
    request_id: Uuid,
    guard: Arc<CompletionGuard>,
    arming: Arc<Mutex<Arming>>,
    worker: Weak<ExpireWorker>,
) -> Listener {
    Arc::new(move |message: &Message| {
        let attributes = message.attributes();

        if attributes.kind != MessageType::Response || attributes.reqid != Some(request_id) {
            return;
        }

        let result = match attributes.commstatus {
            Some(code) if !code.is_ok() => Err(RpcError::Remote(code)),
            _ => Ok(message.clone()),
        };

        if !guard.deliver(result) {
            trace!("Ignoring late response to {}", request_id);
            return;
        }

        let previous = std::mem::replace(
            &mut *arming.lock().unwrap_or_else(PoisonError::into_inner),
            Arming::Retired,
        );

        if let Arming::Armed(key) = previous {
            if let Some(worker) = worker.upgrade() {
                worker.retire(key);
            }
        }
    })
}

#[cfg(test)]
mod does {
    use super::*;
    use crate::library::communication::implementation::loopback::LoopbackTransport;
    use crate::library::communication::transport::ListenHandle;
    use crate::library::communication::{Code, Status};
    use pretty_assertions::assert_eq;
    use std::sync::mpsc::{channel, Receiver, Sender};
    use std::thread;

    const PATIENCE: Duration = Duration::from_secs(5);

    fn method() -> Uri {
        Uri::new("server", 0x20, 1, 0x1)
    }

    fn transport() -> LoopbackTransport {
        LoopbackTransport::new(Uri::new("client", 0x10, 1, 0))
    }

    fn client(
        transport: &LoopbackTransport,
        ttl: Duration,
        worker: &Arc<ExpireWorker>,
    ) -> RpcClient {
        RpcClient::with_expire_worker(
            Arc::new(transport.clone()),
            method(),
            Priority::CS4,
            ttl,
            worker.clone(),
        )
        .unwrap()
    }

    fn recorder() -> (impl Fn() -> Callback, Receiver<RpcResult>) {
        let (tx, rx): (Sender<RpcResult>, _) = channel();
        let make = move || -> Callback {
            let tx = tx.clone();
            Box::new(move |result| {
                tx.send(result).ok();
            })
        };

        (make, rx)
    }

    /// Answers every request to the method after `delay`, repeating the answer `copies` times
    fn responder(
        transport: &LoopbackTransport,
        delay: Duration,
        commstatus: Option<Code>,
        copies: usize,
    ) -> ListenHandle {
        let replying_transport = transport.clone();
        let listener: Listener = Arc::new(move |request: &Message| {
            if request.attributes().kind != MessageType::Request {
                return;
            }

            let mut builder = MessageBuilder::response_to(request);
            if let Some(code) = commstatus {
                builder.with_commstatus(code);
            }

            let transport = replying_transport.clone();
            thread::spawn(move || {
                thread::sleep(delay);
                for _ in 0..copies {
                    transport
                        .send(&builder.build_with_payload(Payload::text("pong")))
                        .unwrap();
                }
            });
        });

        transport
            .register_listener(&method(), listener, None)
            .unwrap()
    }

    fn eventually(condition: impl Fn() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < PATIENCE {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        condition()
    }

    #[test]
    fn deliver_matching_response() {
        let transport = transport();
        let worker = ExpireWorker::spawn().unwrap();
        let client = client(&transport, Duration::from_millis(500), &worker);
        let responder = responder(&transport, Duration::from_millis(10), None, 1);
        let (make, rx) = recorder();

        client.invoke_with(Payload::text("ping"), make());

        let response = rx.recv_timeout(PATIENCE).unwrap().unwrap();
        assert_eq!(response.attributes().kind, MessageType::Response);
        assert_eq!(response.payload(), Some(&b"pong"[..]));
        assert_eq!(response.attributes().reqid, Some(transport.sent()[0].id()));
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

        // Only the responder remains registered once the waiter is retired
        assert!(eventually(|| transport.listener_count() == 1));
        assert!(eventually(|| worker.pending() == 0));
        drop(responder);
    }

    #[test]
    fn expire_unanswered_requests() {
        let transport = transport();
        let worker = ExpireWorker::spawn().unwrap();
        let ttl = Duration::from_millis(50);
        let client = client(&transport, ttl, &worker);
        let (make, rx) = recorder();

        let start = Instant::now();
        client.invoke_empty_with(make());

        assert_eq!(
            rx.recv_timeout(PATIENCE).unwrap(),
            Err(RpcError::DeadlineExceeded)
        );
        assert!(start.elapsed() >= ttl);
        assert_eq!(transport.listener_count(), 0);
        assert_eq!(worker.pending(), 0);
    }

    #[test]
    fn report_remote_failures() {
        let transport = transport();
        let worker = ExpireWorker::spawn().unwrap();
        let client = client(&transport, Duration::from_millis(500), &worker);
        let _responder = responder(&transport, Duration::ZERO, Some(Code::NotFound), 1);
        let (make, rx) = recorder();

        client.invoke_empty_with(make());

        assert_eq!(
            rx.recv_timeout(PATIENCE).unwrap(),
            Err(RpcError::Remote(Code::NotFound))
        );
    }

    #[test]
    fn send_nothing_when_registration_fails() {
        let transport = transport();
        let worker = ExpireWorker::spawn().unwrap();
        let client = client(&transport, Duration::from_millis(500), &worker);
        let status = Status::new(Code::ResourceExhausted, "too many listeners");
        let (make, rx) = recorder();

        transport.fail_next_registration(status.clone());
        client.invoke_empty_with(make());

        assert_eq!(rx.try_recv().unwrap(), Err(RpcError::RegistrationFailed(status)));
        assert!(transport.sent().is_empty());
        assert_eq!(worker.pending(), 0);
    }

    #[test]
    fn release_listener_when_sending_fails() {
        let transport = transport();
        let worker = ExpireWorker::spawn().unwrap();
        let client = client(&transport, Duration::from_millis(500), &worker);
        let status = Status::new(Code::Unavailable, "link down");
        let (make, rx) = recorder();

        transport.fail_next_send(status.clone());
        client.invoke_empty_with(make());

        assert_eq!(rx.try_recv().unwrap(), Err(RpcError::SendFailed(status)));
        assert_eq!(transport.listener_count(), 0);
        assert_eq!(worker.pending(), 0);
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn ignore_uncorrelated_responses() {
        let transport = transport();
        let worker = ExpireWorker::spawn().unwrap();
        let client = client(&transport, Duration::from_millis(100), &worker);
        let (make, rx) = recorder();

        client.invoke_empty_with(make());

        // Reply to a request that was never sent by the client
        let stranger = MessageBuilder::request(
            method(),
            transport.default_source().clone(),
            Priority::CS4,
            Duration::from_secs(1),
        )
        .unwrap()
        .build();
        transport
            .send(&MessageBuilder::response_to(&stranger).build())
            .unwrap();

        assert_eq!(
            rx.recv_timeout(PATIENCE).unwrap(),
            Err(RpcError::DeadlineExceeded)
        );
    }

    #[test]
    fn resolve_responses_arriving_before_arming() {
        let transport = transport();
        let worker = ExpireWorker::spawn().unwrap();
        let client = client(&transport, Duration::from_secs(60), &worker);
        let (make, rx) = recorder();

        // Answers synchronously from within `send`
        let replying_transport = transport.clone();
        let listener: Listener = Arc::new(move |request: &Message| {
            if request.attributes().kind == MessageType::Request {
                let response = MessageBuilder::response_to(request).build();
                replying_transport.send(&response).unwrap();
            }
        });
        let _responder = transport
            .register_listener(&method(), listener, None)
            .unwrap();

        client.invoke_empty_with(make());

        assert!(rx.try_recv().unwrap().is_ok());
        assert_eq!(worker.pending(), 0);
        assert_eq!(transport.listener_count(), 1);
    }

    #[test]
    fn deliver_duplicate_responses_once() {
        let transport = transport();
        let worker = ExpireWorker::spawn().unwrap();
        let client = client(&transport, Duration::from_millis(500), &worker);
        let _responder = responder(&transport, Duration::from_millis(5), None, 3);
        let (make, rx) = recorder();

        client.invoke_empty_with(make());

        assert!(rx.recv_timeout(PATIENCE).unwrap().is_ok());
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn discard_only_requests_of_dropped_client() {
        let transport = transport();
        let worker = ExpireWorker::spawn().unwrap();
        let first = client(&transport, Duration::from_secs(60), &worker);
        let second = client(&transport, Duration::from_secs(60), &worker);
        let (make_first, rx_first) = recorder();
        let (make_second, rx_second) = recorder();

        first.invoke_empty_with(make_first());
        first.invoke_empty_with(make_first());
        second.invoke_empty_with(make_second());
        assert_eq!(worker.pending(), 3);

        drop(first);

        let discarded: Vec<RpcResult> = rx_first.try_iter().collect();
        assert_eq!(
            discarded,
            vec![Err(RpcError::Discarded), Err(RpcError::Discarded)]
        );
        assert!(rx_second.try_recv().is_err());
        assert_eq!(worker.pending(), 1);
        assert_eq!(transport.listener_count(), 1);

        drop(second);
        assert_eq!(rx_second.try_recv().unwrap(), Err(RpcError::Discarded));
    }

    #[test]
    fn resolve_all_requests_on_shutdown() {
        let transport = transport();
        let worker = ExpireWorker::spawn().unwrap();
        let first = client(&transport, Duration::from_secs(60), &worker);
        let second = client(&transport, Duration::from_secs(30), &worker);
        let (make, rx) = recorder();

        for _ in 0..3 {
            first.invoke_empty_with(make());
            second.invoke_empty_with(make());
        }

        worker.stop();

        let outcomes: Vec<RpcResult> = rx.try_iter().collect();
        assert_eq!(outcomes, vec![Err(RpcError::ShuttingDown); 6]);
        assert_eq!(transport.listener_count(), 0);

        first.invoke_empty_with(make());
        assert_eq!(rx.try_recv().unwrap(), Err(RpcError::ShuttingDown));
    }

    #[test]
    fn resolve_exactly_once_at_the_deadline() {
        let transport = transport();
        let worker = ExpireWorker::spawn().unwrap();
        let client = client(&transport, Duration::from_millis(1), &worker);
        let _responder = responder(&transport, Duration::from_millis(1), None, 1);
        let (make, rx) = recorder();

        for _ in 0..50 {
            client.invoke_empty_with(make());
        }

        let outcomes: Vec<RpcResult> = (0..50)
            .map(|_| rx.recv_timeout(PATIENCE).unwrap())
            .collect();

        assert!(outcomes
            .iter()
            .all(|outcome| matches!(outcome, Ok(_) | Err(RpcError::DeadlineExceeded))));
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert!(eventually(|| worker.pending() == 0));
    }

    #[test]
    fn reject_non_method_targets() {
        let worker = ExpireWorker::spawn().unwrap();
        let topic = Uri::new("server", 0x20, 1, 0x8001);

        let result = RpcClient::with_expire_worker(
            Arc::new(transport()),
            topic.clone(),
            Priority::CS4,
            Duration::from_secs(1),
            worker,
        );

        assert!(matches!(result, Err(ClientError::InvalidMethod(uri)) if uri == topic));
    }

    #[test]
    fn reject_invalid_templates() {
        let worker = ExpireWorker::spawn().unwrap();

        let result = RpcClient::with_expire_worker(
            Arc::new(transport()),
            method(),
            Priority::CS1,
            Duration::from_secs(1),
            worker,
        );

        assert!(matches!(result, Err(ClientError::InvalidTemplate(_))));
    }

    #[test]
    fn wait_for_response_future() {
        let transport = transport();
        let worker = ExpireWorker::spawn().unwrap();
        let client = client(&transport, Duration::from_millis(500), &worker);
        let _responder = responder(&transport, Duration::from_millis(10), None, 1);

        let response = client.invoke(Payload::text("ping")).wait().unwrap();

        assert_eq!(response.payload(), Some(&b"pong"[..]));
    }

    #[tokio::test]
    async fn await_response_future() {
        let transport = transport();
        let worker = ExpireWorker::spawn().unwrap();
        let client = client(&transport, Duration::from_millis(500), &worker)
            .with_token("secret")
            .with_permission_level(3);
        let _responder = responder(&transport, Duration::from_millis(10), None, 1);

        let response = client.invoke_empty().await.unwrap();

        assert!(response.is_success());
        assert_eq!(transport.sent()[0].attributes().token.as_deref(), Some("secret"));
        assert_eq!(transport.sent()[0].attributes().permission_level, Some(3));
    }

    #[test]
    fn stamp_payload_format_onto_empty_requests() {
        let transport = transport();
        let worker = ExpireWorker::spawn().unwrap();
        let client = client(&transport, Duration::from_millis(250), &worker)
            .with_payload_format(PayloadFormat::Protobuf);

        assert_eq!(client.ttl(), Duration::from_millis(250));

        let _ = client.invoke_empty();
        let _ = client.invoke(Payload::text("ping"));

        let sent = transport.sent();
        assert_eq!(sent[0].attributes().payload_format, PayloadFormat::Protobuf);
        assert_eq!(sent[0].attributes().ttl, Some(Duration::from_millis(250)));
        assert_eq!(sent[1].attributes().payload_format, PayloadFormat::Text);
    }

    #[test]
    fn start_fresh_shared_worker_once_released() {
        let transport = transport();
        let shared_client = || {
            RpcClient::new(
                Arc::new(transport.clone()),
                method(),
                Priority::CS4,
                Duration::from_millis(20),
            )
            .unwrap()
        };

        let client = shared_client();
        let released = Arc::downgrade(client.expire_service.worker());
        drop(client);
        assert!(released.upgrade().is_none());

        let client = shared_client();
        let (make, rx) = recorder();
        client.invoke_empty_with(make());

        assert_eq!(
            rx.recv_timeout(PATIENCE).unwrap(),
            Err(RpcError::DeadlineExceeded)
        );
    }

    #[tokio::test]
    async fn discard_future_of_dropped_client() {
        let transport = transport();
        let worker = ExpireWorker::spawn().unwrap();
        let client = client(&transport, Duration::from_secs(60), &worker);

        let future = client.invoke_empty();
        drop(client);

        assert_eq!(future.await, Err(RpcError::Discarded));
    }
}
