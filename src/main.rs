use anyhow::Result;
use futures::future::join_all;
use log::{debug, info, warn};
use pubsub_rpc::library::communication::implementation::loopback::LoopbackTransport;
use pubsub_rpc::library::communication::message::{
    Message, MessageBuilder, MessageType, Payload, Priority, Uri,
};
use pubsub_rpc::library::communication::request::RpcClient;
use pubsub_rpc::library::communication::transport::{ListenHandle, Listener, Transport};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use structopt::StructOpt;
use tokio::runtime::Handle;

#[derive(Debug, StructOpt)]
#[structopt(about = "Sends requests to a simulated remote method over an in-process transport.")]
struct Options {
    /// Log level, scopable to different modules
    ///
    /// Levels: trace, debug, info, warn, error
    #[structopt(
        short,
        long,
        env = "RUST_LOG",
        default_value = "info",
        value_name = "level"
    )]
    log: String,

    /// Time-to-live of each request in milliseconds
    #[structopt(long, env, default_value = "500", value_name = "ms")]
    ttl: u64,

    /// Time the simulated method takes to respond in milliseconds
    #[structopt(long, env, default_value = "10", value_name = "ms")]
    delay: u64,

    /// Number of requests to send
    #[structopt(short, long, env, default_value = "3")]
    requests: usize,

    /// Leave every n-th request unanswered, zero answers all of them
    #[structopt(long, env, default_value = "0", value_name = "n")]
    unanswered_every: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct Ping {
    sequence: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct Pong {
    sequence: usize,
}

/// Registers a listener which answers requests to `method` the way a remote service would
fn serve(
    transport: &LoopbackTransport,
    method: &Uri,
    delay: Duration,
    unanswered_every: usize,
) -> Result<ListenHandle> {
    let runtime = Handle::current();
    let replying_transport = transport.clone();
    let received = AtomicUsize::new(0);

    let listener: Listener = Arc::new(move |request: &Message| {
        if request.attributes().kind != MessageType::Request {
            return;
        }

        let count = received.fetch_add(1, Ordering::SeqCst) + 1;
        if unanswered_every > 0 && count % unanswered_every == 0 {
            debug!("Ignoring request {}", request.id());
            return;
        }

        let response = match request
            .parse_json::<Ping>()
            .and_then(|ping| Payload::json(&Pong { sequence: ping.sequence }))
        {
            Ok(payload) => MessageBuilder::response_to(request).build_with_payload(payload),
            Err(e) => {
                warn!("Received malformed request {}: {}", request.id(), e);
                return;
            }
        };

        let transport = replying_transport.clone();
        runtime.spawn(async move {
            tokio::time::sleep(delay).await;

            if let Err(status) = transport.send(&response) {
                warn!("Unable to respond: {}", status);
            }
        });
    });

    Ok(transport.register_listener(method, listener, None)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let options = Options::from_args();

    pretty_env_logger::formatted_timed_builder()
        .parse_filters(&options.log)
        .init();

    let transport = LoopbackTransport::new(Uri::new("demo-client", 0x1000, 1, 0));
    let method = Uri::new("demo-service", 0x2000, 1, 0x1);

    let _service = serve(
        &transport,
        &method,
        Duration::from_millis(options.delay),
        options.unanswered_every,
    )?;

    let client = RpcClient::new(
        Arc::new(transport.clone()),
        method,
        Priority::CS4,
        Duration::from_millis(options.ttl),
    )?;

    let mut pending = Vec::with_capacity(options.requests);
    for sequence in 0..options.requests {
        pending.push(client.invoke(Payload::json(&Ping { sequence })?));
    }

    let mut answered = 0;
    for (sequence, outcome) in join_all(pending).await.into_iter().enumerate() {
        match outcome.map_err(anyhow::Error::from).and_then(|response| {
            let pong: Pong = response.parse_json()?;
            Ok(pong)
        }) {
            Ok(pong) => {
                answered += 1;
                info!("Request {} answered with {:?}", sequence, pong);
            }
            Err(e) => warn!("Request {} failed: {:#}", sequence, e),
        }
    }

    info!("{} of {} requests answered", answered, options.requests);

    Ok(())
}
