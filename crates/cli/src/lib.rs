pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;
use stonequote_core::{LoginPortal, Role};

#[derive(Debug, Parser)]
#[command(
    name = "stonequote",
    about = "Stonequote operator CLI",
    long_about = "Inspect configuration and the route table, preview access decisions, and manage the locally persisted session.",
    after_help = "Examples:\n  stonequote routes\n  stonequote access --role admin /super-admin\n  STONEQUOTE_PASSWORD=... stonequote login --portal admin --email ops@example.com"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "List every route with its access requirement")]
    Routes,
    #[command(about = "Show where a navigation lands for a role or an anonymous visitor")]
    Access {
        #[arg(long, conflicts_with = "anonymous", required_unless_present = "anonymous")]
        role: Option<Role>,
        #[arg(long, help = "Evaluate without a session")]
        anonymous: bool,
        path: String,
    },
    #[command(about = "Sign in through a login portal; the password is read from STONEQUOTE_PASSWORD")]
    Login {
        #[arg(long, default_value = "user")]
        portal: LoginPortal,
        #[arg(long)]
        email: String,
    },
    #[command(about = "Show the persisted session, if any")]
    Whoami,
    #[command(about = "Clear the persisted session")]
    Logout,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Routes => commands::routes::run(),
        Command::Access { role, anonymous: _, path } => commands::access::run(role, &path),
        Command::Login { portal, email } => commands::login::run(portal, &email),
        Command::Whoami => commands::whoami::run(),
        Command::Logout => commands::logout::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
