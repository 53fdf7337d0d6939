use clap::Parser;
use colored::Colorize;
use dotenv::dotenv;
use log::info;
use recipe_assistant::api;
use recipe_assistant::config::AppConfig;
use recipe_assistant::pipeline::LazyPipeline;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Recipe question answering over a local corpus", long_about = None)]
struct Args {
    /// Serve the HTTP API instead of the interactive prompt
    #[arg(long)]
    api: bool,

    /// Overrides PORT
    #[arg(long)]
    port: Option<u16>,

    /// Overrides RECIPES_PATH
    #[arg(long)]
    recipes: Option<PathBuf>,

    /// Answer a single question and exit
    #[arg(long)]
    ask: Option<String>,

    #[arg(long)]
    top_k: Option<i64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv().ok();

    let args = Args::parse();

    let mut config = AppConfig::from_env()?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(path) = &args.recipes {
        config.recipes_path = path.clone();
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.log_level.as_str())).init();

    if args.api {
        run_api_server(config).await
    } else if let Some(question) = &args.ask {
        let pipeline = LazyPipeline::from_config(config);
        let answer = pipeline.ask(question, args.top_k).await?;
        print_answer(&answer.text, &answer.sources);
        Ok(())
    } else {
        run_cli_mode(config, args.top_k).await
    }
}

fn print_answer(text: &str, sources: &[String]) {
    println!("{} {}", "🍳".bold(), text.bright_white());
    for (i, source) in sources.iter().enumerate() {
        let title = source.lines().next().unwrap_or_default();
        println!("   {} {}", format!("[{}]", i + 1).dimmed(), title.dimmed());
    }
}

async fn run_cli_mode(config: AppConfig, top_k: Option<i64>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    println!("{}", "Recipe assistant. Ask a cooking question, or type 'exit' to quit.".green());
    let pipeline = LazyPipeline::from_config(config);

    let mut rl = Editor::<(), DefaultHistory>::new()?;

    loop {
        match rl.readline("👤 ") {
            Ok(line) => {
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }
                if matches!(input, "exit" | "quit") {
                    break;
                }
                let _ = rl.add_history_entry(input);

                match pipeline.ask(input, top_k).await {
                    Ok(answer) => print_answer(&answer.text, &answer.sources),
                    Err(e) => println!("{}", e.to_string().red()),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }
    Ok(())
}

async fn run_api_server(config: AppConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    let pipeline = Arc::new(LazyPipeline::from_config(config.clone()));
    let app = api::create_api(pipeline, &config);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| format!("Failed to bind to {}: {}", addr, e))?;

    info!("Recipe assistant API listening on {}", addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| format!("Server error: {}", e))?;

    Ok(())
}
