/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Line-oriented front end for the thought graph.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use bpaf::Bpaf;
use thoughtweaver::VERSION;
use thoughtweaver::app::{GraphEvent, GraphIntent, ThoughtWeaverApp};
use thoughtweaver::config::AppConfig;
use thoughtweaver::services::embedding::{EmbeddingProvider, HashedBagOfWords, OpenAiEmbeddingClient};
use thoughtweaver::services::explanation::{
    ExplanationProvider, OpenAiExplanationClient, TemplatedExplanations,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

const HELP: &str = "\
commands:
  add <text>       add a thought and link it to similar ones
  show <thought>   degree, neighbours, category and keywords
  explain <thought> why each neighbour is linked
  positions        current layout positions
  theme            toggle dark/light
  save             save the graph to the snapshot slot
  load             replace the graph with the saved snapshot
  help             this text
  quit             exit";

#[derive(Debug, Clone, Bpaf)]
#[bpaf(options, version)]
/// Thought graph engine with similarity-driven auto-linking
struct Cli {
    /// Path to the TOML configuration file
    #[bpaf(long, argument("PATH"))]
    config: Option<PathBuf>,
    /// Log filter, e.g. `debug` or `thoughtweaver=trace` (overrides RUST_LOG)
    #[bpaf(long("log-filter"), argument("FILTER"))]
    log_filter: Option<String>,
    /// Embed locally with a bag-of-words model instead of calling the API
    #[bpaf(long)]
    offline: bool,
}

fn init_logging(filter: Option<&str>) -> Result<(), String> {
    let filter = match filter {
        Some(directives) => EnvFilter::try_new(directives).map_err(|e| format!("{e}"))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| format!("{e}"))
}

fn providers(
    config: &AppConfig,
    offline: bool,
) -> Result<(Arc<dyn EmbeddingProvider>, Arc<dyn ExplanationProvider>), String> {
    if offline {
        return Ok((Arc::new(HashedBagOfWords), Arc::new(TemplatedExplanations)));
    }
    let embedder = OpenAiEmbeddingClient::from_config(&config.embedding).map_err(|e| format!("{e}"))?;
    let explainer =
        OpenAiExplanationClient::from_config(&config.explanation).map_err(|e| format!("{e}"))?;
    Ok((Arc::new(embedder), Arc::new(explainer)))
}

fn print_status(app: &ThoughtWeaverApp) {
    if let Some(status) = app.status() {
        println!("[{status}]");
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = cli().run();

    if let Err(e) = init_logging(cli.log_filter.as_deref()) {
        eprintln!("Invalid log filter: {e}");
        return ExitCode::FAILURE;
    }
    tracing::info!(version = VERSION, offline = cli.offline, "thoughtweaver starting");

    let config = match cli.config.clone().or_else(AppConfig::default_path) {
        Some(path) => match AppConfig::load(&path) {
            Ok(config) => config,
            Err(e) => {
                log::error!("{e}");
                return ExitCode::FAILURE;
            },
        },
        None => AppConfig::default(),
    };

    let (embedder, explainer) = match providers(&config, cli.offline) {
        Ok(providers) => providers,
        Err(e) => {
            log::error!("Failed to set up services: {e}");
            return ExitCode::FAILURE;
        },
    };
    let mut app = match ThoughtWeaverApp::from_config(&config, embedder, explainer) {
        Ok(app) => app,
        Err(e) => {
            log::error!("Failed to open snapshot store: {e}");
            return ExitCode::FAILURE;
        },
    };
    app.attach_layout(
        config.layout.params(),
        Duration::from_millis(config.layout.tick_interval_ms),
    );

    println!("thoughtweaver {VERSION}. Type `help` for commands.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                log::error!("Failed to read stdin: {e}");
                break;
            },
        };
        let (command, rest) = line.trim().split_once(' ').unwrap_or((line.trim(), ""));
        let rest = rest.trim();

        match command {
            "" => continue,
            "add" => {
                match app.add_thought_and_link(rest).await {
                    Ok(links) => println!("linked to {links} thought(s)"),
                    Err(e) => println!("{e}"),
                }
                print_status(&app);
            },
            "show" => match app.node_details(rest) {
                Some(details) => {
                    println!("{}", details.id);
                    println!("  degree:    {}", details.degree);
                    println!("  neighbors: {}", details.neighbors.join(", "));
                    println!("  category:  {}", details.category);
                    println!("  keywords:  {}", details.keywords.join(", "));
                },
                None => println!("no such thought"),
            },
            "explain" => match app.explain(rest).await {
                Some(explanations) if explanations.is_empty() => println!("no links yet"),
                Some(explanations) => {
                    for explanation in explanations {
                        println!("{}: {}", explanation.neighbor, explanation.reason);
                    }
                },
                None => println!("no such thought"),
            },
            "positions" => {
                for node in app.positions().unwrap_or_default().nodes {
                    let pin = if node.pinned { " (pinned)" } else { "" };
                    println!("{:>8.1} {:>8.1}  {}{pin}", node.x, node.y, node.id);
                }
            },
            "theme" => {
                app.apply_intents([GraphIntent::ToggleTheme]);
                println!("theme: {}", app.theme());
            },
            "save" => {
                app.apply_intents([GraphIntent::SaveSnapshot]);
                print_status(&app);
            },
            "load" => {
                app.apply_intents([GraphIntent::LoadSnapshot]);
                print_status(&app);
            },
            "help" => println!("{HELP}"),
            "quit" | "exit" => break,
            other => println!("unknown command {other:?}; try `help`"),
        }

        for event in app.take_events() {
            match event {
                GraphEvent::NodeAdded { id } => log::debug!("event: node added {id:?}"),
                GraphEvent::EdgesAdded { node_id, count } => {
                    log::debug!("event: {count} edges added for {node_id:?}")
                },
                GraphEvent::GraphLoaded { nodes, edges } => {
                    println!("loaded {nodes} thoughts, {edges} links")
                },
                GraphEvent::RedrawRequested => log::debug!("event: redraw requested"),
            }
        }
    }

    app.shutdown().await;
    ExitCode::SUCCESS
}
