//! Publish to or subscribe on a Mercury channel from the command line.
//!
//! ```sh
//! BASE_URL=https://pubsub.example.com/ MERCURY_TOKEN=... \
//!     cargo run -p mercury-subscriber --example pubsub -- subscribe <CHANNEL>
//! BASE_URL=https://pubsub.example.com/ MERCURY_TOKEN=... \
//!     cargo run -p mercury-subscriber --example pubsub -- publish <CHANNEL> '<JSON>'
//! ```
//!
//! `MERCURY_REGION` and `MERCURY_PROJECT_ID` select the tenancy shape.
//! Without `MERCURY_TOKEN`, subscribe connects anonymously and publish fails.
//! Received message data is printed to stdout (pipe to `jq` for formatting).

use mercury_subscriber::{BoxError, Subscriber, SubscriberConfig};

const USAGE: &str = "usage: pubsub subscribe <CHANNEL> | pubsub publish <CHANNEL> <JSON>";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().ok_or(USAGE)?;
    let channel = args.get(1).ok_or(USAGE)?;

    let mut config = SubscriberConfig::from_env()?;
    if let Ok(token) = std::env::var("MERCURY_TOKEN") {
        config = config.with_token_provider(move |action, channel| {
            let token = token.clone();
            async move {
                eprintln!("[token] action={action} channel={channel}");
                Ok::<_, BoxError>(token)
            }
        });
    }
    let subscriber = Subscriber::new(config)?;

    match command.as_str() {
        "publish" => {
            let body = args.get(2).ok_or(USAGE)?;
            let body: serde_json::Value = serde_json::from_str(body)?;
            subscriber.publish(channel, &body).await?;
            eprintln!("[published] {}", subscriber.address(channel)?);
        }
        "subscribe" => {
            eprintln!("subscribing to '{channel}' ...");
            let mut session = subscriber
                .subscribe_with_errors(
                    channel,
                    |data: serde_json::Value| println!("{data}"),
                    |err| eprintln!("[error] {err}"),
                )
                .await?;
            eprintln!("[connected] {}", subscriber.address(channel)?);

            let interrupted = tokio::select! {
                result = session.join() => {
                    result?;
                    false
                }
                _ = tokio::signal::ctrl_c() => true,
            };
            if interrupted {
                eprintln!("[closing]");
                session.close();
            }
        }
        _ => return Err(USAGE.into()),
    }

    Ok(())
}
