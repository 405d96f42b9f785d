use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use runboard_api::{parse_base_url, DEFAULT_SERVER};
use url::Url;

const LIVE_PATH: [&str; 3] = ["api", "v1", "runs-live"];

#[derive(Parser, Debug)]
#[command(name = "runboard-dashboard", about = "Terminal dashboard for scheduler runs")]
pub struct Args {
    /// Scheduler base url; falls back to RUNBOARD_SERVER.
    #[arg(long, default_value = "")]
    server: String,
    /// Runs-live websocket url; derived from the server when empty.
    #[arg(long, default_value = "")]
    live_url: String,
    /// Directory for the log file; falls back to RUNBOARD_LOG_DIR.
    #[arg(long, default_value = "")]
    log_dir: String,
    #[arg(long, value_enum, default_value_t = StartScreen::Runs)]
    screen: StartScreen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StartScreen {
    Runs,
    Jobs,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: String,
    pub live_url: String,
    pub log_dir: String,
    pub start: StartScreen,
}

pub fn load_config() -> Result<Config> {
    let args = Args::parse();
    build_config(args, |key| std::env::var(key).ok())
}

fn build_config(args: Args, env: impl Fn(&str) -> Option<String>) -> Result<Config> {
    let server = resolve_value(&args.server, env("RUNBOARD_SERVER"))
        .unwrap_or_else(|| DEFAULT_SERVER.to_string());
    let server_url = parse_base_url(&server).context("invalid server")?;
    let live_url = match resolve_value(&args.live_url, env("RUNBOARD_LIVE_URL")) {
        Some(value) => value,
        None => derive_live_url(&server_url)?,
    };
    let log_dir = resolve_value(&args.log_dir, env("RUNBOARD_LOG_DIR")).unwrap_or_default();
    Ok(Config {
        server,
        live_url,
        log_dir,
        start: args.screen,
    })
}

/// Flag first, then environment; blank values count as unset.
fn resolve_value(arg: &str, env_value: Option<String>) -> Option<String> {
    if !arg.trim().is_empty() {
        return Some(arg.trim().to_string());
    }
    env_value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// `http(s)://host[/prefix]` becomes `ws(s)://host[/prefix]/api/v1/runs-live`.
pub fn derive_live_url(server: &Url) -> Result<String> {
    let mut url = server.clone();
    let scheme = if server.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme)
        .map_err(|_| anyhow!("cannot derive live url from {server}"))?;
    url.set_query(None);
    url.set_fragment(None);
    url.path_segments_mut()
        .map_err(|_| anyhow!("cannot derive live url from {server}"))?
        .pop_if_empty()
        .extend(LIVE_PATH);
    Ok(url.to_string())
}

pub fn parse_bool_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn args(list: &[&str]) -> Args {
        let mut argv = vec!["runboard-dashboard"];
        argv.extend_from_slice(list);
        Args::parse_from(argv)
    }

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_point_at_local_scheduler() {
        let config = build_config(args(&[]), env_of(&[])).expect("config");
        assert_eq!(config.server, "http://localhost:5000");
        assert_eq!(config.live_url, "ws://localhost:5000/api/v1/runs-live");
        assert_eq!(config.log_dir, "");
        assert_eq!(config.start, StartScreen::Runs);
    }

    #[test]
    fn flags_win_over_environment() {
        let env = env_of(&[
            ("RUNBOARD_SERVER", "http://env-host:5000"),
            ("RUNBOARD_LOG_DIR", "/var/log/runboard"),
        ]);
        let config = build_config(
            args(&["--server", "https://sched.example/apsis", "--screen", "jobs"]),
            env,
        )
        .expect("config");
        assert_eq!(config.server, "https://sched.example/apsis");
        assert_eq!(config.live_url, "wss://sched.example/apsis/api/v1/runs-live");
        assert_eq!(config.log_dir, "/var/log/runboard");
        assert_eq!(config.start, StartScreen::Jobs);
    }

    #[test]
    fn explicit_live_url_is_kept_verbatim() {
        let env = env_of(&[("RUNBOARD_LIVE_URL", "ws://relay:9000/runs")]);
        let config = build_config(args(&[]), env).expect("config");
        assert_eq!(config.live_url, "ws://relay:9000/runs");
    }

    #[test]
    fn blank_values_fall_through() {
        let env = env_of(&[("RUNBOARD_SERVER", "   ")]);
        let config = build_config(args(&["--server", " "]), env).expect("config");
        assert_eq!(config.server, DEFAULT_SERVER);
    }

    #[test]
    fn rejects_unusable_server() {
        assert!(build_config(args(&["--server", "ftp://files"]), env_of(&[])).is_err());
    }

    #[test]
    fn parse_bool_flag_accepts_common_spellings() {
        assert_eq!(parse_bool_flag("YES"), Some(true));
        assert_eq!(parse_bool_flag(" off "), Some(false));
        assert_eq!(parse_bool_flag("maybe"), None);
    }
}
