use qtalk_peer::{Peer, PeerListener};
use qtalk_rpc::{async_trait, unary, Call, Handler, Responder, Result as RpcResult, RpcError};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cmd::ServeArgs;
use crate::exit::{io_error, peer_error, CliResult, SUCCESS};

/// Values streamed by `count` when called without arguments.
const DEFAULT_COUNT: u64 = 3;

pub async fn run(args: ServeArgs) -> CliResult<i32> {
    let listener = PeerListener::bind(&args.path).map_err(|err| peer_error("bind failed", err))?;
    info!(path = %args.path.display(), "serving ping, echo, count");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            signal = &mut shutdown => {
                signal.map_err(|err| io_error("signal handler setup failed", err))?;
                info!("shutting down");
                return Ok(SUCCESS);
            }
            accepted = listener.accept() => {
                let peer = accepted.map_err(|err| peer_error("accept failed", err))?;
                register_builtins(&peer);
                tokio::spawn(serve_peer(peer));
            }
        }
    }
}

async fn serve_peer(peer: Peer) {
    info!(peer = %peer.id(), "peer connected");
    peer.respond().await;
    match peer.wait().await {
        Ok(()) => debug!(peer = %peer.id(), "peer disconnected"),
        Err(err) => warn!(peer = %peer.id(), error = %err, "peer session failed"),
    }
}

fn register_builtins(peer: &Peer) {
    peer.handle(
        "ping",
        unary(|_: Value| async move { Ok::<_, RpcError>("pong") }),
    );
    peer.handle(
        "echo",
        unary(|args: Value| async move { Ok::<_, RpcError>(args) }),
    );
    peer.handle("count", Count);
}

/// Streams `0..=n`: 0 as the continued response, then 1 through n.
struct Count;

#[async_trait]
impl Handler for Count {
    async fn respond_rpc(&self, responder: &mut Responder, call: &mut Call) -> RpcResult<()> {
        let n = match call.receive::<Value>().await? {
            Some(Value::Null) | None => DEFAULT_COUNT,
            Some(value) => value
                .as_u64()
                .ok_or_else(|| RpcError::handler(format!("count expects a number, got {value}")))?,
        };
        responder.continue_value(&0u64).await?;
        for i in 1..=n {
            responder.send(&i).await?;
        }
        Ok(())
    }
}
