use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use execlink::args::CommonArgs;
use execlink::logging;
use execlink::{Connector, ConnectorConfig, Event};

// ── CLI ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(
    name = "execlink",
    version,
    about = "Stream job-execution events from a remote execution service"
)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Connect and print every event until Ctrl-C
    Watch(WatchArgs),
    /// Print the derived streaming address and exit
    Url,
}

#[derive(Debug, clap::Args)]
struct WatchArgs {
    /// Dials per reconnect burst
    #[arg(long, value_name = "N")]
    max_retry: Option<u32>,
    /// Seconds to wait between bursts
    #[arg(long = "retry-interval", value_name = "SECS")]
    retry_interval_secs: Option<u64>,
    /// Print each event as a JSON frame, one per line
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.common.log_config());

    let mut config = ConnectorConfig::load(cli.common.config.clone())?;
    cli.common.apply_overrides(&mut config);

    match cli.command {
        Command::Url => {
            let session = config
                .session_config()
                .context("invalid server address")?;
            println!("{}", session.url);
            Ok(())
        }
        Command::Watch(args) => {
            if let Some(max_retry) = args.max_retry {
                config.max_retry = max_retry;
            }
            if let Some(secs) = args.retry_interval_secs {
                config.retry_interval_secs = secs;
            }
            watch(&config, args.json).await
        }
    }
}

async fn watch(config: &ConnectorConfig, json: bool) -> Result<()> {
    let (connector, mut events) = Connector::new(config).context("invalid server address")?;
    eprintln!("Watching {}", connector.stream_url());
    connector.start()?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Some(event) => print_event(&event, json)?,
                None => break,
            },
        }
    }

    connector.close().await?;
    Ok(())
}

fn print_event(event: &Event, json: bool) -> Result<()> {
    if json {
        let frame = event.to_frame().context("serializing event")?;
        println!("{frame}");
    } else {
        match event {
            Event::Progress(p) => println!("progress    {}/{}", p.value, p.max),
            Event::Status(s) => println!("status      queue_remaining={}", s.queue_remaining()),
            Event::Executed(e) => {
                for file in e.files() {
                    println!("executed    node={} file={}", e.node, file.filename);
                }
            }
            other => println!("{:<11} {}", other.tag(), other.prompt_id().unwrap_or("-")),
        }
    }
    Ok(())
}
