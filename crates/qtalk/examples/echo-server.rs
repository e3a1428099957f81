//! Minimal echo server: accepts one peer and answers `echo` calls.
//!
//! Run with:
//!   cargo run --example echo-server --features peer
//!
//! In another terminal:
//!   cargo run --features cli -- call /tmp/qtalk-echo-<pid>/echo.sock \
//!     echo --json '{"hello":"world"}'

use std::fs;

use qtalk::peer::PeerListener;
use qtalk::rpc::{unary, RpcError};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let sock_dir = std::env::temp_dir().join(format!("qtalk-echo-{}", std::process::id()));
    fs::create_dir_all(&sock_dir)?;
    let sock_path = sock_dir.join("echo.sock");

    let listener = PeerListener::bind(&sock_path)?;
    eprintln!("Listening on {}", sock_path.display());

    // Accept one peer and answer calls until it disconnects.
    let peer = listener.accept().await?;
    eprintln!("Peer connected: {}", peer.id());

    peer.handle(
        "echo",
        unary(|args: serde_json::Value| async move {
            eprintln!("Echoing {args}");
            Ok::<_, RpcError>(args)
        }),
    );
    peer.respond().await;
    eprintln!("Peer disconnected");

    let _ = fs::remove_dir_all(&sock_dir);
    Ok(())
}
