//! VerseCard CLI - daily verse card runner
//!
//! Commands: run, fallback, prompt
//! Outputs JSON / markup to stdout, logs to stderr.
//! Pipeline failures are reported, not turned into exit codes.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use versecard_core::{
    config::{Credentials, Endpoints, ModelSettings, Settings},
    config::{DEFAULT_ANTHROPIC_URL, DEFAULT_GRAPH_URL, DEFAULT_GRAPH_VERSION, DEFAULT_MODEL, DEFAULT_VERSE_API_URL},
    telemetry::{self, LogFormat},
    templates::build_fallback,
    GenerationRequest, PublishPipeline, VersePayload,
};

#[derive(Parser)]
#[command(name = "versecard-cli")]
#[command(about = "VerseCard CLI - generate, render and post the daily verse card")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Compact, global = true)]
    log_format: LogFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline once
    Run(RunArgs),

    /// Print the fallback card markup for a verse
    Fallback(VerseArgs),

    /// Print the generation prompt for a verse
    Prompt {
        #[command(flatten)]
        verse: VerseArgs,

        /// Section selector; random when omitted
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=1000))]
        salt: Option<u32>,
    },
}

#[derive(Args)]
struct VerseArgs {
    /// Verse text
    #[arg(long)]
    text: String,

    /// Verse reference, e.g. "John 3:16"
    #[arg(long)]
    reference: String,
}

impl VerseArgs {
    fn payload(&self) -> VersePayload {
        VersePayload::new(&self.text, &self.reference)
    }
}

#[derive(Args)]
struct RunArgs {
    /// Render and validate the card without posting it
    #[arg(long)]
    dry_run: bool,

    #[arg(long, env = "PAGE_ACCESS_TOKEN", hide_env_values = true)]
    page_access_token: Option<String>,

    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    anthropic_api_key: Option<String>,

    #[arg(long, env = "PAGE_ID")]
    page_id: Option<String>,

    /// Directory for rendered cards
    #[arg(short, long, default_value = "images")]
    output_dir: PathBuf,

    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    #[arg(long, default_value = DEFAULT_VERSE_API_URL)]
    verse_api_url: String,

    #[arg(long, default_value = DEFAULT_ANTHROPIC_URL)]
    anthropic_url: String,

    #[arg(long, default_value = DEFAULT_GRAPH_URL)]
    graph_url: String,

    #[arg(long, default_value = DEFAULT_GRAPH_VERSION)]
    graph_version: String,

    /// Timeout for each HTTP call, in seconds
    #[arg(long, default_value_t = 30)]
    http_timeout_secs: u64,

    /// Timeout for page load and network idle, in seconds
    #[arg(long, default_value_t = 30)]
    render_timeout_secs: u64,
}

impl RunArgs {
    fn into_settings(self) -> Settings {
        Settings {
            credentials: Credentials {
                page_access_token: self.page_access_token,
                anthropic_api_key: self.anthropic_api_key,
                page_id: self.page_id,
            },
            output_dir: self.output_dir,
            model: ModelSettings {
                model: self.model,
                ..ModelSettings::default()
            },
            endpoints: Endpoints {
                verse_api: self.verse_api_url,
                anthropic: self.anthropic_url,
                graph: self.graph_url,
                graph_version: self.graph_version,
            },
            http_timeout: Duration::from_secs(self.http_timeout_secs),
            render_timeout: Duration::from_secs(self.render_timeout_secs),
            dry_run: self.dry_run,
        }
    }
}

fn main() -> ExitCode {
    // Local runs keep credentials in .env; CI sets real env vars.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    if let Err(e) = telemetry::init(cli.log_format) {
        eprintln!("{}", e);
    }

    match cli.command {
        Commands::Run(args) => {
            let settings = args.into_settings();
            let report = PublishPipeline::from_settings(&settings).run_guarded();
            match serde_json::to_string_pretty(&report) {
                Ok(json) => println!("{}", json),
                Err(e) => tracing::error!(error = %e, "Could not serialize run report"),
            }
            ExitCode::SUCCESS
        }

        Commands::Fallback(verse) => {
            print!("{}", build_fallback(&verse.text, &verse.reference));
            ExitCode::SUCCESS
        }

        Commands::Prompt { verse, salt } => {
            let request = match salt {
                Some(salt) => GenerationRequest::with_salt(verse.payload(), salt),
                None => GenerationRequest::new(verse.payload()),
            };
            println!("{}", request.prompt());
            ExitCode::SUCCESS
        }
    }
}
