//! Two peers over an in-memory pipe: unary calls, a streamed call and a
//! callback from a handler to its caller.
//!
//! Run with:
//!   cargo run --example peer-pair --features peer

use qtalk::peer::Peer;
use qtalk::rpc::{async_trait, unary, Call, Handler, Responder, Result, RpcError};

/// Streams the words of its argument, one value per word.
struct Words;

#[async_trait]
impl Handler for Words {
    async fn respond_rpc(&self, responder: &mut Responder, call: &mut Call) -> Result<()> {
        let text: String = call.receive().await?.unwrap_or_default();
        let mut words = text.split_whitespace();
        responder.continue_value(&words.next()).await?;
        for word in words {
            responder.send(&Some(word)).await?;
        }
        Ok(())
    }
}

/// Asks the caller who it is before greeting it.
struct Greet;

#[async_trait]
impl Handler for Greet {
    async fn respond_rpc(&self, responder: &mut Responder, call: &mut Call) -> Result<()> {
        let name: String = call.caller().call("whoami", &()).await?.into_value();
        responder.return_value(&format!("hello, {name}")).await
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let (client, server) = Peer::pair();

    server.handle(
        "math/add",
        unary(|args: Vec<i64>| async move { Ok::<_, RpcError>(args.iter().sum::<i64>()) }),
    );
    server.handle("words", Words);
    server.handle("greet", Greet);
    client.handle(
        "whoami",
        unary(|_: ()| async move { Ok::<_, RpcError>("the example") }),
    );
    server.spawn_respond();
    client.spawn_respond();

    let sum = client.call::<_, i64>("math/add", &[2, 3]).await?;
    println!("math/add [2,3] = {}", sum.value);

    let math = client.client().namespace("math");
    let sum = math.call::<_, i64>("add", &[4, 5]).await?;
    println!("math/add [4,5] = {}", sum.value);

    let words = client
        .call::<_, Option<String>>("words", "streams arrive one frame at a time")
        .await?;
    let mut all = vec![words.value.clone().unwrap_or_default()];
    while let Some(Some(word)) = words.receive::<Option<String>>().await? {
        all.push(word);
    }
    println!("words = {all:?}");

    let greeting = client.call::<_, String>("greet", &()).await?;
    println!("greet = {}", greeting.value);

    client.close().await?;
    Ok(())
}
