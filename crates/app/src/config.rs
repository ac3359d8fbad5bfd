use std::fmt;

use assess_core::model::{SessionConfig, SessionId, SessionMode};

const DEFAULT_API_URL: &str = "http://localhost:8000/api";
const DEFAULT_LOG: &str = "info";

#[derive(Debug, PartialEq, Eq)]
pub enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidMode { raw: String },
    InvalidNumber { flag: &'static str, raw: String },
    InvalidApiUrl { raw: String },
    MissingSessionId,
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidMode { raw } => {
                write!(f, "invalid --mode value: {raw} (expected quiz, text, voice or bot)")
            }
            ArgsError::InvalidNumber { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidApiUrl { raw } => write!(f, "invalid --api value: {raw}"),
            ArgsError::MissingSessionId => write!(f, "results requires a session id"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn parse_number(flag: &'static str, raw: String) -> Result<u32, ArgsError> {
    raw.trim()
        .parse()
        .map_err(|_| ArgsError::InvalidNumber { flag, raw })
}

fn parse_mode(raw: String) -> Result<SessionMode, ArgsError> {
    SessionMode::parse(&raw).ok_or(ArgsError::InvalidMode { raw })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Take a session interactively.
    Run(SessionConfig),
    /// Print the result of an already submitted session.
    Results {
        session_id: SessionId,
        mode: SessionMode,
    },
}

/// Everything the binary needs, resolved from the environment and then argv.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub api_url: String,
    pub token: Option<String>,
    pub log_filter: String,
    pub command: Command,
}

impl AppConfig {
    /// Resolve against the process environment.
    pub fn from_env(args: impl IntoIterator<Item = String>) -> Result<Self, ArgsError> {
        Self::resolve(|key| std::env::var(key).ok(), args)
    }

    /// `lookup` reads `ASSESS_API_URL`, `ASSESS_TOKEN` and `ASSESS_LOG`; flags win.
    pub fn resolve(
        lookup: impl Fn(&str) -> Option<String>,
        args: impl IntoIterator<Item = String>,
    ) -> Result<Self, ArgsError> {
        let mut api_url = lookup("ASSESS_API_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.into());
        let mut token = lookup("ASSESS_TOKEN");
        let log_filter = lookup("ASSESS_LOG")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOG.into());

        let mut args = args.into_iter().peekable();
        let results = match args.peek().map(String::as_str) {
            Some("results") => {
                args.next();
                true
            }
            Some("run") => {
                args.next();
                false
            }
            _ => false,
        };

        let mut mode = SessionMode::Quiz;
        let mut time_limit = None;
        let mut topic = None;
        let mut count = None;
        let mut session_id = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--api" => {
                    let value = require_value(&mut args, "--api")?;
                    if !(value.starts_with("http://") || value.starts_with("https://")) {
                        return Err(ArgsError::InvalidApiUrl { raw: value });
                    }
                    api_url = value;
                }
                "--token" => token = Some(require_value(&mut args, "--token")?),
                "--mode" => mode = parse_mode(require_value(&mut args, "--mode")?)?,
                "--time-limit" if !results => {
                    let value = require_value(&mut args, "--time-limit")?;
                    time_limit = Some(parse_number("--time-limit", value)?);
                }
                "--topic" if !results => topic = Some(require_value(&mut args, "--topic")?),
                "--count" if !results => {
                    let value = require_value(&mut args, "--count")?;
                    count = Some(parse_number("--count", value)?);
                }
                raw if results && session_id.is_none() && !raw.starts_with("--") => {
                    session_id = Some(
                        raw.parse::<SessionId>()
                            .map_err(|_| ArgsError::MissingSessionId)?,
                    );
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        let command = if results {
            Command::Results {
                session_id: session_id.ok_or(ArgsError::MissingSessionId)?,
                mode,
            }
        } else {
            let mut config = match time_limit {
                Some(minutes) => SessionConfig::timed(mode, minutes),
                None => SessionConfig::untimed(mode),
            };
            if let Some(topic) = topic {
                config = config.with_topic(topic);
            }
            if let Some(count) = count {
                config = config.with_question_count(count);
            }
            Command::Run(config)
        };

        Ok(Self {
            api_url,
            token,
            log_filter,
            command,
        })
    }
}

pub fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  app run     [--mode <quiz|text|voice|bot>] [--time-limit <minutes>]");
    eprintln!("              [--topic <name>] [--count <n>] [--api <url>] [--token <token>]");
    eprintln!("  app results <session-id> [--mode <mode>] [--api <url>] [--token <token>]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --mode quiz, untimed, --api {DEFAULT_API_URL}");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  ASSESS_API_URL, ASSESS_TOKEN, ASSESS_LOG (tracing filter, default {DEFAULT_LOG})");
}
