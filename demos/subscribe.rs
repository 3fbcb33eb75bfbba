//! Subscribe - print every message the server pushes.
//!
//! Works against a tickerplant (`.u.sub`) or any q process that calls
//! `neg[.z.w]` on the connection.
//!
//! ```sh
//! cargo run --example subscribe -- localhost:5010 ".u.sub[`trade;`]"
//! ```

use qwire_client::{Connection, Message};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "qwire_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args = std::env::args().skip(1);
    let addr = args.next().unwrap_or_else(|| "localhost:5010".to_string());
    let subscription = args.next().unwrap_or_else(|| ".u.sub[`;`]".to_string());

    let conn = Connection::builder()
        .on_async(|msg: Message| async move {
            println!("[{}] {:?}", msg.message_type, msg.value);
        })
        .connect(addr.as_str())
        .await?;

    let reply = conn.query(&subscription).await?;
    tracing::info!("Subscribed: {:?}", reply);

    tokio::signal::ctrl_c().await?;
    conn.close();
    Ok(())
}
