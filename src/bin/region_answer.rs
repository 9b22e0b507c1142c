//! Region-answer command line client
//!
//! Drives the selection pipeline against a real Chrome page, or sends text and
//! image files straight to a running analysis server.

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use region_answer::agent::MenuChoice;
use region_answer::capture::encode_data_url;
use region_answer::{
    AnswerService, BrowserSession, ConnectionOptions, HttpAnswerService, LaunchOptions, Pipeline, PipelineConfig, Point,
    SessionOutcome,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Multiple choice: answer with a letter
    Mcq,
    /// Short free-form answer
    Short,
    /// Short answer from Gemini
    Gemini,
}

impl From<Mode> for MenuChoice {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Mcq => MenuChoice::Mcq,
            Mode::Short => MenuChoice::ShortAnswer,
            Mode::Gemini => MenuChoice::Gemini,
        }
    }
}

#[derive(Parser)]
#[command(name = "region-answer")]
#[command(version)]
#[command(about = "Answer questions from a selected page region", long_about = None)]
struct Cli {
    /// Analysis server base URL
    #[arg(long, short = 's', env = "REGION_ANSWER_SERVER", default_value = "http://127.0.0.1:3001")]
    server: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Open a page, select a region and render the answer into it
    Capture {
        /// Page to open
        #[arg(long)]
        url: String,

        /// Selection left edge in CSS pixels
        #[arg(long)]
        x: f64,

        /// Selection top edge in CSS pixels
        #[arg(long)]
        y: f64,

        #[arg(long)]
        width: f64,

        #[arg(long)]
        height: f64,

        /// Launch browser in headed mode (default: headless)
        #[arg(long, short = 'H')]
        headed: bool,

        /// Path to custom browser executable
        #[arg(long, value_name = "PATH")]
        executable_path: Option<PathBuf>,

        /// WebSocket endpoint URL for remote browser connection
        #[arg(long, value_name = "URL")]
        ws_endpoint: Option<String>,
    },

    /// Answer a question given as text
    Ask {
        text: String,

        #[arg(long, short = 'm', value_enum, default_value = "mcq")]
        mode: Mode,
    },

    /// Answer the question in an image file
    Image { path: PathBuf },

    /// Check the analysis server
    Health,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let answers = HttpAnswerService::new(&cli.server);

    match cli.command {
        Command::Capture { url, x, y, width, height, headed, executable_path, ws_endpoint } => {
            let session = match ws_endpoint {
                Some(ws) => {
                    eprintln!("Connecting to {}", ws);
                    BrowserSession::connect(ConnectionOptions::new(ws))?
                }
                None => {
                    let mut options = LaunchOptions::new().headless(!headed);
                    if let Some(path) = executable_path {
                        options = options.chrome_path(path);
                    }
                    eprintln!("Browser mode: {}", if headed { "headed" } else { "headless" });
                    BrowserSession::launch(options)?
                }
            };

            session.navigate(&url)?;
            session.wait_for_navigation()?;
            eprintln!("Loaded {}", url);

            let page = session.page()?;
            let pipeline = Pipeline::connect(page.clone(), page, Arc::new(answers), &PipelineConfig::default());

            let start = Point::new(x, y);
            let end = Point::new(x + width, y + height);
            pipeline.page.activate();
            pipeline.page.pointer_down(start);
            pipeline.page.pointer_move(end);

            match pipeline.page.pointer_up(end).await {
                SessionOutcome::Answered(answer) => println!("{}", answer),
                SessionOutcome::Failed(message) => bail!("{}", message),
                SessionOutcome::Rejected => bail!("Selection area too small"),
                SessionOutcome::Ignored => bail!("Selection was not started"),
            }
        }
        Command::Ask { text, mode } => {
            let choice = MenuChoice::from(mode);
            let answer = answers.analyze_text(&text, choice.mode(), choice.provider()).await?;
            println!("{}", answer);
        }
        Command::Image { path } => {
            let bytes = tokio::fs::read(&path).await.with_context(|| format!("failed to read {}", path.display()))?;
            let answer = answers.analyze_image(&encode_data_url(&bytes)).await?;
            println!("{}", answer);
        }
        Command::Health => {
            let health = answers.health().await?;
            println!("status: {}", health.status);
            println!("vision: {}", health.vision);
            println!("timestamp: {}", health.timestamp);
        }
    }

    Ok(())
}
