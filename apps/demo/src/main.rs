//! Demo entrypoint: wires one `rpc_bus::Server` and one `task_executor::Executor`
//! into a single event loop, the composition pattern described in
//! `SPEC_FULL.md` §2 — a `tokio::select!` over the server's call channel,
//! the executor's callback channel, and a client's async-return channel.

use anyhow::Result;
use rpc_bus::{CoreError, Server, Value};
use task_executor::Executor;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    if let Ok(bytes) = std::env::var("STACK_BUFFER_SIZE") {
        match bytes.parse::<usize>() {
            Ok(n) => rpc_bus::set_stack_buffer_size(n),
            Err(e) => tracing::warn!("STACK_BUFFER_SIZE={bytes:?} is not a usize: {e}"),
        }
    }

    let call_capacity: usize = std::env::var("CALL_CHANNEL_CAPACITY")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(64);
    let callback_capacity: usize = std::env::var("CALLBACK_CHANNEL_CAPACITY")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(64);

    let mut server: Server<&'static str> = Server::new(call_capacity);
    server.register(
        "add",
        rpc_bus::Procedure::one(|args| {
            let a = args.first().and_then(Value::as_i64).unwrap_or(0);
            let b = args.get(1).and_then(Value::as_i64).unwrap_or(0);
            Ok(Value::from(a + b))
        }),
    );
    server.register(
        "greet",
        rpc_bus::Procedure::one(|args| {
            let name = args.first().and_then(Value::as_str).unwrap_or("world");
            Ok(Value::from(format!("hello, {name}")))
        }),
    );

    let mut client = server.open(16);
    let mut executor = Executor::new(callback_capacity);

    let linear = executor.new_linear_context();
    for i in 0..5 {
        linear.go_(
            move || {
                tracing::info!(i, "linear job running");
                i
            },
            move |result: Result<i32, CoreError>| {
                tracing::info!(?result, "linear job completed");
            },
        );
    }

    client
        .async_call_one("add", vec![Value::from(19), Value::from(23)], |result| {
            tracing::info!(?result, "async add completed");
        })
        .await;

    tracing::info!("demo event loop starting; press ctrl-c to stop");

    loop {
        tokio::select! {
            ci = server.recv() => {
                match ci {
                    Some(ci) => server.exec(ci),
                    None => break,
                }
            }
            callback = executor.recv() => {
                if let Some(callback) = callback {
                    executor.cb(callback);
                }
            }
            ri = client.async_return_channel().recv() => {
                if let Some(ri) = ri {
                    client.cb(ri);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
                break;
            }
        }
    }

    server.close().await;
    executor.close().await;
    client.close().await;

    Ok(())
}
