use anyhow::Context;
use clap::{Parser, ValueEnum};
use std::io::{self, BufRead, IsTerminal, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::thread;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::config::{
    self, ColorMode, FileConfig, IpFamily, ProbeConfig, DEFAULT_ATTEMPTS, DEFAULT_INTERVAL_SECONDS,
    DEFAULT_TIMEOUT_SECONDS,
};
use crate::error::ConfigError;
use crate::util::parse_host_port;

/// Repeatedly opens a TCP connection to a host and reports per-attempt
/// latency and a summary.
#[derive(Parser, Debug)]
#[command(name = "tcp-probe", version, about, long_about = None)]
pub struct Args {
    /// Host name or IP address, optionally with `:port`. Prompted for when omitted.
    pub host: Option<String>,

    /// Port to connect to (1-65535)
    #[arg(short, long)]
    pub port: Option<u32>,

    /// Number of connection attempts
    #[arg(short = 'c', long)]
    pub attempts: Option<u32>,

    /// Per-attempt timeout in seconds
    #[arg(short, long)]
    pub timeout: Option<f64>,

    /// Pause between attempts in seconds
    #[arg(short, long)]
    pub interval: Option<f64>,

    /// Only use an IPv4 address
    #[arg(short = '4', long = "ipv4", conflicts_with = "ipv6")]
    pub ipv4: bool,

    /// Only use an IPv6 address
    #[arg(short = '6', long = "ipv6")]
    pub ipv6: bool,

    /// JSON settings file
    #[arg(long, env = "TCP_PROBE_CONFIG")]
    pub config: Option<PathBuf>,

    /// When to colour the output
    #[arg(long, value_enum)]
    pub color: Option<ColorArg>,

    /// Print the report as JSON instead of text
    #[arg(long)]
    pub json: bool,

    /// Serve Prometheus metrics on this address while the run is in progress
    #[arg(long, value_name = "ADDR")]
    pub metrics_listen: Option<SocketAddr>,

    /// Log level: trace, debug, info, warn, error
    #[arg(long, env = "TCP_PROBE_LOG")]
    pub log_level: Option<String>,

    /// Never prompt; fail when host or port is missing
    #[arg(long)]
    pub no_input: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorArg {
    Auto,
    Always,
    Never,
}

impl From<ColorArg> for ColorMode {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => ColorMode::Auto,
            ColorArg::Always => ColorMode::Always,
            ColorArg::Never => ColorMode::Never,
        }
    }
}

/// Everything needed to start a run, after flags, file and prompts are merged.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub probe: ProbeConfig,
    pub family: IpFamily,
    pub log_level: String,
    pub json: bool,
    pub metrics_listen: Option<SocketAddr>,
}

/// Values still undecided after flags and file, to be asked for interactively.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Partial {
    pub host: Option<String>,
    pub port: Option<u32>,
    pub attempts: Option<u32>,
    pub timeout_seconds: Option<f64>,
}

/// Merges flags over the file contents. Flags win; a port embedded in the
/// host argument counts as a flag.
pub fn merge(args: &Args, file: &FileConfig) -> Partial {
    let (host, embedded_port) = match args.host.as_deref().or(file.host.as_deref()) {
        Some(raw) => {
            let (h, p) = parse_host_port(raw);
            (Some(h), p.map(u32::from))
        }
        None => (None, None),
    };

    Partial {
        host,
        port: args.port.or(embedded_port).or(file.port),
        attempts: args.attempts.or(file.attempts),
        timeout_seconds: args.timeout.or(file.timeout_seconds),
    }
}

pub fn color_mode(args: &Args, file: &FileConfig) -> ColorMode {
    args.color.map(ColorMode::from).unwrap_or(file.color)
}

pub fn family(args: &Args, file: &FileConfig) -> IpFamily {
    if args.ipv4 {
        IpFamily::V4
    } else if args.ipv6 {
        IpFamily::V6
    } else {
        file.family
    }
}

/// Turns merged values into settings, prompting for missing host/port (and
/// for attempts/timeout too, when nothing was given on the command line at
/// all) through `prompter`.
pub fn resolve_settings<P: Prompter>(
    args: &Args,
    file: &FileConfig,
    prompter: &mut P,
) -> anyhow::Result<Settings> {
    let partial = merge(args, file);
    let interactive = partial.host.is_none();

    let host = match partial.host {
        Some(h) => validate_host(&h)?,
        None => prompter.ask("🌐 Enter host/domain: ", "Please enter a valid hostname or IP address", |s| {
            validate_host(s)
        })?,
    };

    let port = match partial.port {
        Some(p) => config::validate_port(p)?,
        None => prompter.ask("🔌 Enter port (1-65535): ", "Invalid port number (1-65535)", |s| {
            s.trim()
                .parse::<u32>()
                .map_err(|_| ConfigError::InvalidPort(0))
                .and_then(config::validate_port)
        })?,
    };

    let attempts = match partial.attempts {
        Some(a) => config::validate_attempts(a)?,
        None if interactive => prompter.ask("🔁 Enter number of attempts: ", "Please enter a positive integer", |s| {
            s.trim()
                .parse::<u32>()
                .map_err(|_| ConfigError::InvalidAttempts(0))
                .and_then(config::validate_attempts)
        })?,
        None => DEFAULT_ATTEMPTS,
    };

    let timeout_seconds = match partial.timeout_seconds {
        Some(t) => config::validate_timeout(t)?,
        None if interactive => prompter.ask("⏳ Enter timeout (seconds): ", "Please enter a positive number", |s| {
            s.trim()
                .parse::<f64>()
                .map_err(|_| ConfigError::InvalidTimeout(0.0))
                .and_then(config::validate_timeout)
        })?,
        None => DEFAULT_TIMEOUT_SECONDS,
    };

    let probe = ProbeConfig {
        attempts,
        timeout_seconds,
        interval_seconds: args
            .interval
            .or(file.interval_seconds)
            .unwrap_or(DEFAULT_INTERVAL_SECONDS),
    };
    probe.validate()?;

    let log_level = args.log_level.clone().unwrap_or_else(|| file.log_level.clone());
    config::get_tracing_level(&log_level)?;

    Ok(Settings {
        host,
        port,
        probe,
        family: family(args, file),
        log_level,
        json: args.json,
        metrics_listen: args.metrics_listen,
    })
}

/// Runs [`resolve_settings`] on its own thread so that an interrupt does not
/// have to wait for a blocked read on stdin.
///
/// Returns `Ok(None)` once `cancel` fires. The thread is left behind in that
/// case and goes away with the process.
pub async fn read_settings<P>(
    args: Args,
    file: FileConfig,
    mut prompter: P,
    cancel: &CancellationToken,
) -> anyhow::Result<Option<Settings>>
where
    P: Prompter + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    thread::Builder::new()
        .name("settings-prompt".into())
        .spawn(move || {
            let _ = tx.send(resolve_settings(&args, &file, &mut prompter));
        })
        .context("failed to start the prompt thread")?;

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Ok(None),
        settings = rx => settings.context("prompt thread ended without settings")?.map(Some),
    }
}

fn validate_host(s: &str) -> Result<String, ConfigError> {
    let host = s.trim();
    if host.is_empty() {
        Err(ConfigError::EmptyHost)
    } else {
        Ok(host.to_string())
    }
}

/// Source of interactively supplied values.
pub trait Prompter {
    fn ask<T>(
        &mut self,
        prompt: &str,
        error_msg: &str,
        validate: impl Fn(&str) -> Result<T, ConfigError>,
    ) -> anyhow::Result<T>;
}

/// Asks on stdin/stdout until the answer validates.
pub struct StdinPrompter {
    color: bool,
}

impl StdinPrompter {
    pub fn new(color: bool) -> Self {
        Self { color }
    }
}

impl Prompter for StdinPrompter {
    fn ask<T>(
        &mut self,
        prompt: &str,
        error_msg: &str,
        validate: impl Fn(&str) -> Result<T, ConfigError>,
    ) -> anyhow::Result<T> {
        use colored::Colorize;

        let stdin = io::stdin();
        let mut stdout = io::stdout();
        loop {
            let prompt_text = if self.color { prompt.yellow().to_string() } else { prompt.to_string() };
            write!(stdout, "{}", prompt_text)?;
            stdout.flush()?;

            let mut line = String::new();
            if stdin.lock().read_line(&mut line)? == 0 {
                anyhow::bail!("input closed before a value was entered");
            }
            match validate(line.trim_end_matches(['\r', '\n'])) {
                Ok(value) => return Ok(value),
                Err(_) => {
                    let msg = format!("⚠ {}", error_msg);
                    let msg = if self.color { msg.red().to_string() } else { msg };
                    writeln!(stdout, "{}", msg)?;
                }
            }
        }
    }
}

/// Refuses to ask; used when stdin is not a terminal or `--no-input` is set.
pub struct NoPrompter;

impl Prompter for NoPrompter {
    fn ask<T>(
        &mut self,
        prompt: &str,
        _error_msg: &str,
        _validate: impl Fn(&str) -> Result<T, ConfigError>,
    ) -> anyhow::Result<T> {
        let what = prompt
            .trim()
            .trim_start_matches(|c: char| !c.is_ascii_alphabetic())
            .trim_end_matches(':');
        anyhow::bail!("missing value and prompting is disabled: {}", what)
    }
}

pub fn can_prompt(args: &Args) -> bool {
    !args.no_input && io::stdin().is_terminal()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct Scripted {
        answers: VecDeque<&'static str>,
        asked: Vec<String>,
    }

    impl Scripted {
        fn new(answers: &[&'static str]) -> Self {
            Self {
                answers: answers.iter().copied().collect(),
                asked: Vec::new(),
            }
        }
    }

    impl Prompter for Scripted {
        fn ask<T>(
            &mut self,
            prompt: &str,
            _error_msg: &str,
            validate: impl Fn(&str) -> Result<T, ConfigError>,
        ) -> anyhow::Result<T> {
            loop {
                self.asked.push(prompt.to_string());
                let answer = self
                    .answers
                    .pop_front()
                    .ok_or_else(|| anyhow::anyhow!("script exhausted"))?;
                if let Ok(v) = validate(answer) {
                    return Ok(v);
                }
            }
        }
    }

    #[test]
    fn test_flags_override_file() {
        let args = Args::parse_from(["tcp-probe", "example.com:8443", "-c", "3", "--color", "never"]);
        let file = FileConfig {
            host: Some("ignored.example".into()),
            port: Some(22),
            attempts: Some(9),
            timeout_seconds: Some(4.0),
            ..Default::default()
        };

        let settings = resolve_settings(&args, &file, &mut NoPrompter).unwrap();
        assert_eq!(settings.host, "example.com");
        assert_eq!(settings.port, 8443);
        assert_eq!(settings.probe.attempts, 3);
        assert_eq!(settings.probe.timeout_seconds, 4.0);
        assert_eq!(settings.probe.interval_seconds, DEFAULT_INTERVAL_SECONDS);
        assert_eq!(color_mode(&args, &file), ColorMode::Never);
        assert_eq!(settings.log_level, "warn");
    }

    #[test]
    fn test_port_flag_beats_embedded_port() {
        let args = Args::parse_from(["tcp-probe", "example.com:8443", "-p", "443"]);
        let settings = resolve_settings(&args, &FileConfig::default(), &mut NoPrompter).unwrap();
        assert_eq!(settings.port, 443);
        assert_eq!(settings.probe.attempts, DEFAULT_ATTEMPTS);
    }

    #[test]
    fn test_missing_port_without_prompt_fails() {
        let args = Args::parse_from(["tcp-probe", "example.com"]);
        let err = resolve_settings(&args, &FileConfig::default(), &mut NoPrompter).unwrap_err();
        assert!(err.to_string().contains("prompting is disabled"));
    }

    #[test]
    fn test_invalid_flag_values_are_rejected() {
        let args = Args::parse_from(["tcp-probe", "example.com", "-p", "70000"]);
        assert!(resolve_settings(&args, &FileConfig::default(), &mut NoPrompter).is_err());

        let args = Args::parse_from(["tcp-probe", "example.com", "-p", "80", "-t", "0"]);
        assert!(resolve_settings(&args, &FileConfig::default(), &mut NoPrompter).is_err());

        let args = Args::parse_from(["tcp-probe", "example.com", "-p", "80", "--log-level", "loud"]);
        assert!(resolve_settings(&args, &FileConfig::default(), &mut NoPrompter).is_err());
    }

    #[test]
    fn test_interactive_prompts_retry_until_valid() {
        let args = Args::parse_from(["tcp-probe"]);
        let mut prompter = Scripted::new(&["  ", "localhost", "0", "abc", "8080", "-1", "3", "0", "1.5"]);

        let settings = resolve_settings(&args, &FileConfig::default(), &mut prompter).unwrap();
        assert_eq!(settings.host, "localhost");
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.probe.attempts, 3);
        assert_eq!(settings.probe.timeout_seconds, 1.5);
        assert_eq!(prompter.asked.len(), 9);
    }

    /// Blocks in `ask` until its sender is dropped, like a terminal nobody types into.
    struct Stalled(std::sync::mpsc::Receiver<&'static str>);

    impl Prompter for Stalled {
        fn ask<T>(
            &mut self,
            _prompt: &str,
            _error_msg: &str,
            validate: impl Fn(&str) -> Result<T, ConfigError>,
        ) -> anyhow::Result<T> {
            let answer = self.0.recv()?;
            Ok(validate(answer)?)
        }
    }

    #[tokio::test]
    async fn test_read_settings_returns_prompted_values() {
        let args = Args::parse_from(["tcp-probe", "example.com", "-p", "22"]);
        let token = CancellationToken::new();

        let settings = read_settings(args, FileConfig::default(), NoPrompter, &token)
            .await
            .unwrap()
            .expect("not cancelled");
        assert_eq!(settings.host, "example.com");
        assert_eq!(settings.port, 22);
    }

    #[tokio::test]
    async fn test_read_settings_propagates_prompt_errors() {
        let args = Args::parse_from(["tcp-probe", "example.com"]);
        let token = CancellationToken::new();

        let err = read_settings(args, FileConfig::default(), NoPrompter, &token)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("prompting is disabled"));
    }

    #[tokio::test]
    async fn test_interrupt_abandons_pending_prompt() {
        let (tx, rx) = std::sync::mpsc::channel();
        let args = Args::parse_from(["tcp-probe"]);
        let token = CancellationToken::new();
        let interrupt = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            interrupt.cancel();
        });

        let settings = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            read_settings(args, FileConfig::default(), Stalled(rx), &token),
        )
        .await
        .expect("interrupt should end the wait")
        .unwrap();
        assert!(settings.is_none());
        drop(tx);
    }

    #[test]
    fn test_family_flags() {
        let file = FileConfig {
            family: IpFamily::V6,
            ..Default::default()
        };
        assert_eq!(family(&Args::parse_from(["tcp-probe", "-4"]), &file), IpFamily::V4);
        assert_eq!(family(&Args::parse_from(["tcp-probe"]), &file), IpFamily::V6);
        assert!(Args::try_parse_from(["tcp-probe", "-4", "-6"]).is_err());
    }
}
