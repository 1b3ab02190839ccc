//! qcc: operator interface to the queue control connector.

use clap::{Parser, Subcommand};
use queue_connector::broker::{BrokerEndpoint, Connection, InMemoryBroker, Subscriber};
use queue_connector::config::Config;
use queue_connector::config::secrets::redacted;
use queue_connector::connector::{FixedHostResolver, HostResolver, SystemHostResolver};
use queue_connector::model::{ConsumerCommand, QueueBean, Queueable};
use queue_connector::telemetry::{TelemetryConfig, init_telemetry};
use queue_connector::{ConnectorConfig, QueueConnector};

#[derive(Parser)]
#[command(name = "qcc", about = "Queue control connector")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load configuration and report what the connector would use
    Check,
    /// Run the connector against an in-process broker and print each step
    Demo {
        /// Submission queue name
        #[arg(long, default_value = "scan.submit")]
        queue: String,
        /// Command topic name
        #[arg(long, default_value = "scan.command")]
        command_topic: String,
        /// Host name to stamp instead of resolving the local one
        #[arg(long)]
        host: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Check => cmd_check(),
        Command::Demo {
            queue,
            command_topic,
            host,
        } => cmd_demo(&queue, &command_topic, host),
    }
}

fn cmd_check() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let _guard = init_telemetry(TelemetryConfig::from_config(&config, "qcc"))?;

    let endpoint = config.endpoint()?;
    println!("Broker:     {endpoint}");
    println!("Scheme:     {}", endpoint.scheme());
    println!("Token:      {}", redacted(endpoint.credentials()));
    println!(
        "OTLP:       {}",
        config.otel_endpoint.as_deref().unwrap_or("-")
    );
    println!("Log level:  {}", config.log_level);

    match SystemHostResolver.local_host_name() {
        Ok(host) => println!("Local host: {host}"),
        Err(e) => anyhow::bail!("{e}"),
    }
    Ok(())
}

fn cmd_demo(queue: &str, command_topic: &str, host: Option<String>) -> anyhow::Result<()> {
    const URI: &str = "memory://qcc-demo";

    let broker = InMemoryBroker::new(URI);
    let config = ConnectorConfig::new(BrokerEndpoint::new(URI)?);
    let connector = match host {
        Some(host) => QueueConnector::new(broker.clone(), config)
            .with_host_resolver(FixedHostResolver::new(host)),
        None => QueueConnector::new(broker.clone(), config),
    };

    let mut beans: Vec<QueueBean> = ["I1", "I2", "I3"].into_iter().map(QueueBean::new).collect();
    for bean in &mut beans {
        connector.submit(bean, queue)?;
        println!(
            "Submitted:  {} {} (status: {}, host: {})",
            bean.name,
            bean.id,
            bean.status(),
            bean.host_name().unwrap_or("-")
        );
    }
    print_queue(&broker, queue, &beans);

    let moved = connector.reorder(&beans[2], -2, queue)?;
    println!("Reorder:    {} by -2 → {moved}", beans[2].name);
    print_queue(&broker, queue, &beans);

    let first = connector.remove(&beans[0], queue)?;
    let second = connector.remove(&beans[0], queue)?;
    println!("Remove:     {} → {first}, again → {second}", beans[0].name);
    print_queue(&broker, queue, &beans);

    let mut listeners: Vec<Box<dyn Subscriber<ConsumerCommand>>> = (0..2)
        .map(|_| connector.create_queue_subscriber::<ConsumerCommand>(command_topic))
        .collect::<Result<_, _>>()?;
    connector.publish_command_bean(&ConsumerCommand::pause().for_queue(queue), command_topic)?;
    for (n, listener) in listeners.iter_mut().enumerate() {
        let received = listener.drain()?;
        println!("Listener {n}: received {} command(s)", received.len());
        listener.disconnect()?;
    }

    let stats = broker.connection_stats();
    println!(
        "Handles:    submitters {}/{} publishers {}/{} (opened/closed), balanced: {}",
        stats.submitters_opened,
        stats.submitters_closed,
        stats.publishers_opened,
        stats.publishers_closed,
        stats.is_balanced()
    );
    Ok(())
}

fn print_queue(broker: &InMemoryBroker, queue: &str, beans: &[QueueBean]) {
    let names: Vec<&str> = broker
        .queue_ids(queue)
        .into_iter()
        .map(|id| {
            beans
                .iter()
                .find(|b| b.id == id)
                .map_or("?", |b| b.name.as_str())
        })
        .collect();
    println!("Queue:      [{}]", names.join(", "));
}
