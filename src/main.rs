//! Unified CLI for the stream resolver
//!
//! # Usage
//!
//! ## Server Mode
//! ```bash
//! stream-resolver server --port 8787 --host 0.0.0.0
//! ```
//!
//! ## One-shot Mode
//! ```bash
//! stream-resolver --video-id dQw4w9WgXcQ --url-only --max-height 720
//! ```

use clap::{Parser, Subcommand};

use ytdlp_stream_resolver::cli::{
    resolve::{ResolveArgs, run_resolve_mode},
    server::{ServerArgs, run_server_mode},
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "stream-resolver")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    // One-shot options (when no subcommand is provided)
    /// Video identifier to resolve
    #[arg(long, value_name = "ID", allow_hyphen_values = true)]
    video_id: Option<String>,

    /// Comma-separated client profiles, overriding the configured list
    #[arg(long, value_name = "CLIENTS")]
    clients: Option<String>,

    /// Height ceiling for --url-only (clamped to 144..=4320)
    #[arg(long, value_name = "PIXELS")]
    max_height: Option<u32>,

    /// Print the best direct URL instead of the formats listing
    #[arg(long)]
    url_only: bool,

    /// Resolve without the credential jar
    #[arg(long)]
    no_cookies: bool,

    /// Configuration file path
    #[arg(long)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start HTTP server mode
    Server {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Configuration file path
        #[arg(long)]
        config: Option<String>,

        /// Enable verbose logging
        #[arg(short, long)]
        verbose: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Server {
            port,
            host,
            config,
            verbose,
        }) => {
            let args = ServerArgs {
                port,
                host,
                config,
                verbose,
            };
            run_server_mode(args).await
        }
        None => {
            let args = ResolveArgs {
                video_id: cli.video_id,
                clients: cli.clients,
                max_height: cli.max_height,
                url_only: cli.url_only,
                no_cookies: cli.no_cookies,
                config: cli.config,
                verbose: cli.verbose,
            };
            run_resolve_mode(args).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_server_subcommand() {
        let cli = Cli::parse_from([
            "stream-resolver",
            "server",
            "--port",
            "8080",
            "--host",
            "0.0.0.0",
        ]);

        match cli.command {
            Some(Commands::Server {
                port,
                host,
                config,
                verbose,
            }) => {
                assert_eq!(port, Some(8080));
                assert_eq!(host, Some("0.0.0.0".to_string()));
                assert_eq!(config, None);
                assert!(!verbose);
            }
            _ => panic!("Expected server subcommand"),
        }
    }

    #[test]
    fn test_one_shot_mode() {
        let cli = Cli::parse_from([
            "stream-resolver",
            "--video-id",
            "dQw4w9WgXcQ",
            "--clients",
            "tv,ios",
            "--max-height",
            "1080",
            "--url-only",
            "--no-cookies",
        ]);

        assert!(cli.command.is_none());
        assert_eq!(cli.video_id.as_deref(), Some("dQw4w9WgXcQ"));
        assert_eq!(cli.clients.as_deref(), Some("tv,ios"));
        assert_eq!(cli.max_height, Some(1080));
        assert!(cli.url_only);
        assert!(cli.no_cookies);
        assert!(!cli.verbose);
    }

    #[test]
    fn test_video_id_with_dash_prefix() {
        let cli = Cli::parse_from(["stream-resolver", "--video-id", "-6OjhRWNLfk"]);
        assert_eq!(cli.video_id.as_deref(), Some("-6OjhRWNLfk"));
    }

    #[test]
    fn test_server_rejects_one_shot_arguments() {
        let result = Cli::try_parse_from(["stream-resolver", "server", "--video-id", "x"]);
        assert!(result.is_err());
    }
}
