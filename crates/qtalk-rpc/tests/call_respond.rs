use std::sync::Arc;

use qtalk_mux::Session;
use qtalk_rpc::{
    async_trait, respond, unary, Call, Client, FrameCodec, Handler, JsonCodec, RespondMux,
    Responder, Result, RpcError,
};
use qtalk_transport::pipe;
use tokio::task::JoinHandle;

fn serve(session: Session, mux: Arc<RespondMux>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let client = Client::new(session.clone(), FrameCodec::new(JsonCodec));
        while let Some(channel) = session.accept().await {
            let mux = Arc::clone(&mux);
            let client = client.clone();
            tokio::spawn(async move {
                let _ = respond(&*mux, channel, client).await;
            });
        }
    })
}

fn connect(mux: RespondMux) -> (Client, Session) {
    let (left, right) = pipe();
    let caller = Session::new(left);
    let server = Session::new(right);
    serve(server.clone(), Arc::new(mux));
    (Client::new(caller.clone(), FrameCodec::new(JsonCodec)), caller)
}

struct Count;

#[async_trait]
impl Handler for Count {
    async fn respond_rpc(&self, responder: &mut Responder, call: &mut Call) -> Result<()> {
        let n: u32 = call.receive().await?.unwrap_or(0);
        responder.continue_value(&0u32).await?;
        for i in 1..=n {
            responder.send(&i).await?;
        }
        Ok(())
    }
}

struct Upper;

#[async_trait]
impl Handler for Upper {
    async fn respond_rpc(&self, responder: &mut Responder, call: &mut Call) -> Result<()> {
        let _args: Option<()> = call.receive().await?;
        responder.continue_value("ready").await?;
        while let Some(text) = call.receive::<String>().await? {
            responder.send(&text.to_uppercase()).await?;
        }
        Ok(())
    }
}

struct Silent;

#[async_trait]
impl Handler for Silent {
    async fn respond_rpc(&self, _responder: &mut Responder, _call: &mut Call) -> Result<()> {
        Ok(())
    }
}

struct Failing;

#[async_trait]
impl Handler for Failing {
    async fn respond_rpc(&self, _responder: &mut Responder, _call: &mut Call) -> Result<()> {
        Err(RpcError::handler("disk on fire"))
    }
}

struct Panicking;

#[async_trait]
impl Handler for Panicking {
    async fn respond_rpc(&self, _responder: &mut Responder, _call: &mut Call) -> Result<()> {
        panic!("boom");
    }
}

fn mux() -> RespondMux {
    let mux = RespondMux::new();
    mux.handle(
        "math/add",
        unary(|args: Vec<i64>| async move { Ok::<_, RpcError>(args.iter().sum::<i64>()) }),
    );
    mux.handle("count", Count);
    mux.handle("upper", Upper);
    mux.handle("silent", Silent);
    mux.handle("failing", Failing);
    mux.handle("panicking", Panicking);
    mux
}

#[tokio::test]
async fn unary_call_returns_value_and_closes_channel() {
    let (client, caller) = connect(mux());

    let response = client.call::<_, i64>("math/add", &[2, 3]).await.unwrap();
    assert_eq!(response.value, 5);
    assert!(!response.continues);
    assert!(response.channel().is_closed());
    assert_eq!(caller.channel_count(), 0);
}

#[tokio::test]
async fn selectors_are_normalized_before_routing() {
    let (client, _caller) = connect(mux());

    let response = client.call::<_, i64>("Math.Add", &[4, 5]).await.unwrap();
    assert_eq!(response.value, 9);

    let via_namespace = client
        .namespace("math")
        .call::<_, i64>("add", &[1, 1])
        .await
        .unwrap();
    assert_eq!(via_namespace.value, 2);
}

#[tokio::test]
async fn streaming_call_keeps_channel_open_until_done() {
    let (client, _caller) = connect(mux());

    let response = client.call::<_, u32>("count", &3u32).await.unwrap();
    assert!(response.continues);
    assert_eq!(response.value, 0);

    let mut rest = Vec::new();
    while let Some(value) = response.receive::<u32>().await.unwrap() {
        rest.push(value);
    }
    assert_eq!(rest, vec![1, 2, 3]);
}

#[tokio::test]
async fn continued_channel_carries_values_both_ways() {
    let (client, _caller) = connect(mux());

    let response = client.call::<_, String>("upper", &()).await.unwrap();
    assert_eq!(response.value, "ready");

    response.send("abc").await.unwrap();
    assert_eq!(
        response.receive::<String>().await.unwrap().as_deref(),
        Some("ABC")
    );
    response.channel().close_write().await.unwrap();
    assert_eq!(response.receive::<String>().await.unwrap(), None);
}

#[tokio::test]
async fn unknown_selector_is_not_found() {
    let (client, _caller) = connect(mux());

    let err = client.call::<_, ()>("x", &()).await.unwrap_err();
    assert!(matches!(err, RpcError::Remote(ref message) if message == "not found: x"));
}

#[tokio::test]
async fn handler_without_response_returns_null() {
    let (client, _caller) = connect(mux());

    let response = client.call::<_, Option<i32>>("silent", &()).await.unwrap();
    assert_eq!(response.value, None);
    assert!(!response.continues);
}

#[tokio::test]
async fn handler_error_becomes_remote_error() {
    let (client, _caller) = connect(mux());

    let err = client.call::<_, ()>("failing", &()).await.unwrap_err();
    assert!(matches!(err, RpcError::Remote(ref message) if message == "disk on fire"));
}

#[tokio::test]
async fn handler_panic_becomes_remote_error() {
    let (client, caller) = connect(mux());

    let err = client.call::<_, ()>("panicking", &()).await.unwrap_err();
    assert!(matches!(err, RpcError::Remote(ref message) if message.contains("boom")));

    // The server keeps serving after a panic.
    let response = client.call::<_, i64>("math/add", &[1, 2]).await.unwrap();
    assert_eq!(response.value, 3);
    assert!(!caller.is_closed());
}

#[tokio::test]
async fn concurrent_calls_are_independent() {
    let (client, _caller) = connect(mux());

    let mut calls = Vec::new();
    for i in 0..8i64 {
        let client = client.clone();
        calls.push(tokio::spawn(async move {
            client.call::<_, i64>("math/add", &[i, i]).await
        }));
    }
    for (i, call) in calls.into_iter().enumerate() {
        assert_eq!(call.await.unwrap().unwrap().value, 2 * i as i64);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn repeated_unary_calls_succeed_across_threads() {
    let (client, caller) = connect(mux());

    for i in 0..500i64 {
        let response = client.call::<_, i64>("math/add", &[i, 1]).await.unwrap();
        assert_eq!(response.value, i + 1);
    }
    assert_eq!(caller.channel_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_unary_calls_succeed_across_threads() {
    let (client, _caller) = connect(mux());

    let mut workers = Vec::new();
    for w in 0..4i64 {
        let client = client.clone();
        workers.push(tokio::spawn(async move {
            for i in 0..100i64 {
                let response = client.call::<_, i64>("math/add", &[w, i]).await?;
                assert_eq!(response.value, w + i);
            }
            Ok::<_, RpcError>(())
        }));
    }
    for worker in workers {
        worker.await.unwrap().unwrap();
    }
}
