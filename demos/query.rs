//! Query - run one expression and print the result.
//!
//! # Running
//!
//! Start a q process with `q -p 5000`, then:
//!
//! ```sh
//! cargo run --example query -- "([] sym:`a`b; px:1.5 2.5)"
//! cargo run --example query -- "til 5" localhost:5001 user:password
//! ```
//!
//! Set `RUST_LOG=qwire_client=debug` to see the handshake and frames.

use std::time::Duration;

use qwire_client::{Connection, QwireError, Value};
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
    let expr = args.next().unwrap_or_else(|| "til 10".to_string());
    let addr = args.next().unwrap_or_else(|| "localhost:5000".to_string());
    let auth = args.next().unwrap_or_default();

    let conn = Connection::builder()
        .auth(auth)
        .connect_timeout(Duration::from_secs(5))
        .call_timeout(Duration::from_secs(30))
        .connect(addr.as_str())
        .await?;

    tracing::info!(capacity = %conn.capacity(), "Connected to {}", addr);

    match conn.query(&expr).await {
        Ok(value) => print_value(&value),
        // A q error such as 'type is an answer, not a failure of the demo.
        Err(QwireError::Remote(msg)) => println!("'{}", msg),
        Err(e) => return Err(e.into()),
    }

    conn.close();
    Ok(())
}

fn print_value(value: &Value) {
    if let Some(table) = value.as_table() {
        println!("{}", table.column_names().join("\t"));
        for row in 0..table.num_rows() {
            let cells: Vec<String> = table
                .columns()
                .map(|column| {
                    let cell = column.data.get(row);
                    cell.map_or_else(String::new, |cell| format!("{:?}", cell))
                })
                .collect();
            println!("{}", cells.join("\t"));
        }
    } else if let Some(text) = value.as_str() {
        println!("{}", text);
    } else {
        println!("{:?}", value);
    }
}
