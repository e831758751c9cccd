use log::{error, info};
use serde_json::Value;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tado_client::models::tado::{HomePresence, Termination, ZoneId};
use tado_client::{Config, Home};

const USAGE: &str = "usage: tado-client [--env-file PATH] <command>

commands:
  me                              profile of the logged-in user
  home                            home details
  zones                           one line per zone with temperature and humidity
  state <zone>                    current zone state
  set <zone> <temp> [termination] manual overlay; termination is MANUAL, AUTO or seconds
  resume <zone>                   end manual control
  early-start <zone> [on|off]     show or change early start
  presence [HOME|AWAY]            show or change presence
  weather                         weather at the home";

#[derive(Debug, PartialEq)]
enum Command {
    Me,
    Home,
    Zones,
    State(ZoneId),
    Set {
        zone: ZoneId,
        temperature: f64,
        termination: Termination,
    },
    Resume(ZoneId),
    EarlyStart(ZoneId, Option<bool>),
    Presence(Option<HomePresence>),
    Weather,
}

#[derive(Debug, PartialEq)]
struct Cli {
    env_file: Option<PathBuf>,
    command: Command,
}

fn parse_args(args: impl IntoIterator<Item = OsString>) -> Result<Cli, String> {
    let mut env_file: Option<PathBuf> = None;
    let mut words = Vec::new();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let arg = arg
            .into_string()
            .map_err(|_| "argument contains invalid UTF-8".to_string())?;
        let path = if arg == "--env-file" {
            Some(PathBuf::from(args.next().ok_or("`--env-file` requires a path argument")?))
        } else if let Some(p) = arg.strip_prefix("--env-file=") {
            Some(PathBuf::from(p))
        } else {
            words.push(arg);
            None
        };
        if let Some(path) = path {
            if env_file.is_some() {
                return Err("`--env-file` provided more than once".to_string());
            }
            if path.as_os_str().is_empty() {
                return Err("`--env-file` requires a path argument".to_string());
            }
            env_file = Some(path);
        }
    }

    fn zone_arg(w: &str) -> Result<ZoneId, String> {
        w.parse::<i64>()
            .map(ZoneId)
            .map_err(|_| format!("zone id must be an integer, got {:?}", w))
    }

    let words: Vec<&str> = words.iter().map(String::as_str).collect();
    let command = match words.as_slice() {
        ["me"] => Command::Me,
        ["home"] => Command::Home,
        ["zones"] => Command::Zones,
        ["weather"] => Command::Weather,
        ["state", zone] => Command::State(zone_arg(zone)?),
        ["resume", zone] => Command::Resume(zone_arg(zone)?),
        ["early-start", zone] => Command::EarlyStart(zone_arg(zone)?, None),
        ["early-start", zone, "on"] => Command::EarlyStart(zone_arg(zone)?, Some(true)),
        ["early-start", zone, "off"] => Command::EarlyStart(zone_arg(zone)?, Some(false)),
        ["presence"] => Command::Presence(None),
        ["presence", p] => Command::Presence(Some(p.parse::<HomePresence>().map_err(|e| e.to_string())?)),
        ["set", zone, temp, rest @ ..] if rest.len() <= 1 => {
            let temperature = temp
                .parse::<f64>()
                .ok()
                .filter(|t| t.is_finite())
                .ok_or_else(|| format!("temperature must be a number, got {:?}", temp))?;
            let termination = match rest.first() {
                Some(t) => t.parse::<Termination>().map_err(|e| e.to_string())?,
                None => Termination::Manual,
            };
            Command::Set {
                zone: zone_arg(zone)?,
                temperature,
                termination,
            }
        }
        _ => return Err(USAGE.to_string()),
    };

    Ok(Cli { env_file, command })
}

fn print_json(value: &Value) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value).map_err(|e| format!("encoding output failed: {}", e))?;
    println!("{}", text);
    Ok(())
}

fn print_zones(home: &Home) -> Result<(), String> {
    let zones = home.zones().map_err(|e| format!("zones failed: {}", e))?;
    for (id, zone) in &zones {
        let temp = zone
            .inside_temperature()
            .map(|t| format!("{:.1}", t))
            .unwrap_or_else(|_| "-".to_string());
        let humidity = zone
            .humidity()
            .map(|h| format!("{:.0}%", h))
            .unwrap_or_else(|_| "-".to_string());
        let created = zone
            .info()
            .date_created
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{:>4}  {:<20} {:>6} {:>5}  since {}", id, zone.name(), temp, humidity, created);
    }
    Ok(())
}

fn run(command: Command) -> Result<(), String> {
    let cfg = Config::from_env()?;
    let home = tado_client::login_with(cfg.client.clone(), &cfg.username, &cfg.password, &cfg.client_secret)
        .map_err(|e| format!("Tado login failed: {}", e))?;
    info!("Using home {}", home.id());

    let fail = |what: &str| {
        let what = what.to_string();
        move |e: tado_client::TadoError| format!("{} failed: {}", what, e)
    };

    match command {
        Command::Me => print_json(&home.me().map_err(fail("me"))?),
        Command::Home => print_json(&home.home().map_err(fail("home"))?),
        Command::Weather => print_json(&home.weather().map_err(fail("weather"))?),
        Command::Zones => print_zones(&home),
        Command::State(zone) => print_json(&home.get_state(zone).map_err(fail("state"))?),
        Command::Set {
            zone,
            temperature,
            termination,
        } => print_json(
            &home
                .set_temperature(zone, temperature, termination)
                .map_err(fail("set_temperature"))?,
        ),
        Command::Resume(zone) => print_json(&home.end_manual_control(zone).map_err(fail("end_manual_control"))?),
        Command::EarlyStart(zone, None) => {
            let enabled = home.get_early_start(zone).map_err(fail("early_start"))?;
            println!("{}", if enabled { "on" } else { "off" });
            Ok(())
        }
        Command::EarlyStart(zone, Some(enabled)) => {
            print_json(&home.set_early_start(zone, enabled).map_err(fail("set_early_start"))?)
        }
        Command::Presence(None) => print_json(&home.presence().map_err(fail("presence"))?),
        Command::Presence(Some(p)) => print_json(&home.set_presence(p).map_err(fail("set_presence"))?),
    }
}

/// Load `path`, or `./.env` when no path was given and the file exists.
/// Returns the file that was read, if any.
fn load_env(path: Option<&Path>) -> Result<Option<PathBuf>, String> {
    let path = match path {
        Some(p) if p.is_file() => p.to_path_buf(),
        Some(p) => return Err(format!("env file not found: {}", p.display())),
        None => {
            let cwd = std::env::current_dir().map_err(|e| format!("unable to read current directory: {}", e))?;
            let default_path = cwd.join(".env");
            if !default_path.is_file() {
                return Ok(None);
            }
            default_path
        }
    };

    let content = std::fs::read_to_string(&path).map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    for (key, value) in parse_env_file(&content).map_err(|e| format!("{}:{}", path.display(), e))? {
        // Values already present in the process environment win.
        if std::env::var_os(&key).is_none() {
            // Updating process-level environment variables is unsafe on some targets.
            unsafe {
                std::env::set_var(key, value);
            }
        }
    }
    Ok(Some(path))
}

fn parse_env_file(content: &str) -> Result<Vec<(String, String)>, String> {
    let mut vars = Vec::new();
    for (index, line) in content.lines().enumerate() {
        if let Some(pair) = parse_env_line(line).map_err(|e| format!("{}: {}", index + 1, e))? {
            vars.push(pair);
        }
    }
    Ok(vars)
}

fn parse_env_line(line: &str) -> Result<Option<(String, String)>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let line = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);
    let (key, raw) = line.split_once('=').ok_or("missing '=' in assignment")?;
    let key = key.trim();
    if key.is_empty() || key.contains(char::is_whitespace) {
        return Err(format!("invalid variable name {:?}", key));
    }
    Ok(Some((key.to_string(), unquote(raw.trim())?)))
}

fn unquote(raw: &str) -> Result<String, String> {
    let Some(quote) = raw.chars().next().filter(|c| *c == '"' || *c == '\'') else {
        let value = raw.split(" #").next().unwrap_or_default();
        return Ok(value.trim_end().to_string());
    };

    let mut out = String::new();
    let mut chars = raw[1..].chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' if quote == '"' => match chars.next() {
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => return Err("unterminated escape sequence".to_string()),
            },
            c if c == quote => {
                let rest = chars.as_str().trim();
                return if rest.is_empty() || rest.starts_with('#') {
                    Ok(out)
                } else {
                    Err(format!("unexpected characters after closing {}", quote))
                };
            }
            c => out.push(c),
        }
    }
    Err(format!("unterminated {}-quoted value", quote))
}

fn main() {
    let cli = match parse_args(std::env::args_os().skip(1)) {
        Ok(cli) => cli,
        Err(msg) => {
            eprintln!("{}", msg);
            std::process::exit(2);
        }
    };

    let loaded_env = match load_env(cli.env_file.as_deref()) {
        Ok(path) => path,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(path) = loaded_env.as_ref() {
        info!("Environment loaded from {}", path.display());
    }
    info!(
        "tado-client {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );

    if let Err(e) = run(cli.command) {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}
