//! Command-line probe for rte-client
//!
//! Connects to a host, optionally signs on by field label, waits for the host
//! to settle and prints the resulting screen.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use log::info;

use rte_client::config::{default_config_path, load_config, load_default_config};
use rte_client::{
    Area, AttentionKey, Input, Protocol, RteClient, SecurityMode, SyncWaitCondition,
    TextWaitCondition, WaitCondition,
};

struct Options {
    config: Option<PathBuf>,
    server: Option<String>,
    port: Option<u16>,
    protocol: Option<Protocol>,
    terminal_type: Option<String>,
    ssl: Option<bool>,
    ca_bundle: Option<PathBuf>,
    user: Option<String>,
    password: Option<String>,
    user_label: String,
    password_label: String,
    key: AttentionKey,
    wait_text: Option<String>,
    timeout_millis: Option<u64>,
    stable_millis: Option<u64>,
}

fn print_help() {
    println!("rte-client - IBM 5250/3270 terminal probe");
    println!();
    println!("Usage: rte-client [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --config <path>                  Configuration file (default: {})", default_config_path().display());
    println!("  --server <host> or -s <host>     Host to connect to");
    println!("  --port <port> or -p <port>       Port to connect to");
    println!("  --protocol <tn5250|tn3270>       Protocol dialect");
    println!("  --terminal-type <id>             Terminal model, e.g. IBM-3477-FC");
    println!("  --ssl | --no-ssl                 Force TLS on/off for this run");
    println!("  --ca-bundle <path>               Extra CA certificates (PEM or DER)");
    println!("  --user <name> or -u <name>       Sign on with this user");
    println!("  --password <password>            Password for --user");
    println!("  --user-label <label>             Label of the user field (default: User)");
    println!("  --password-label <label>         Label of the password field (default: Password)");
    println!("  --key <key>                      Attention key to send (default: ENTER)");
    println!("  --wait-text <regex>              After sending, also wait for this text");
    println!("  --timeout <ms>                   Connect and wait timeout");
    println!("  --stable <ms>                    Stable period for every wait");
    println!("  --help or -h                     Show this help message");
    println!();
    println!("Example:");
    println!("  rte-client --server 10.100.200.1 --user dave3 --password dave3 --wait-text 'Main Menu'");
}

fn parse_args(args: &[String]) -> Result<Options> {
    let mut options = Options {
        config: None,
        server: None,
        port: None,
        protocol: None,
        terminal_type: None,
        ssl: None,
        ca_bundle: None,
        user: None,
        password: None,
        user_label: "User".to_string(),
        password_label: "Password".to_string(),
        key: AttentionKey::Enter,
        wait_text: None,
        timeout_millis: None,
        stable_millis: None,
    };

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        let mut value = || -> Result<String> {
            i += 1;
            match args.get(i) {
                Some(value) => Ok(value.clone()),
                None => bail!("{} requires a value", flag),
            }
        };
        match flag {
            "--config" => options.config = Some(PathBuf::from(value()?)),
            "--server" | "-s" => options.server = Some(value()?),
            "--port" | "-p" => {
                options.port = Some(value()?.parse().context("--port requires a numeric value")?)
            }
            "--protocol" => {
                options.protocol = Some(value()?.parse().map_err(anyhow::Error::msg)?)
            }
            "--terminal-type" => options.terminal_type = Some(value()?),
            "--ssl" => options.ssl = Some(true),
            "--no-ssl" => options.ssl = Some(false),
            "--ca-bundle" => options.ca_bundle = Some(PathBuf::from(value()?)),
            "--user" | "-u" => options.user = Some(value()?),
            "--password" | "--pass" => options.password = Some(value()?),
            "--user-label" => options.user_label = value()?,
            "--password-label" => options.password_label = value()?,
            "--key" => options.key = value()?.parse().map_err(anyhow::Error::msg)?,
            "--wait-text" => options.wait_text = Some(value()?),
            "--timeout" => {
                options.timeout_millis = Some(value()?.parse().context("--timeout requires milliseconds")?)
            }
            "--stable" => {
                options.stable_millis = Some(value()?.parse().context("--stable requires milliseconds")?)
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            other => bail!("Unknown option '{}'", other),
        }
        i += 1;
    }
    Ok(options)
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let options = parse_args(&args)?;

    let mut config = match &options.config {
        Some(path) => load_config(path)?,
        None => load_default_config(),
    };
    if let Some(server) = options.server {
        config.host = server;
    }
    if let Some(port) = options.port {
        config.port = port;
    }
    if let Some(protocol) = options.protocol {
        config.protocol = protocol;
    }
    if let Some(terminal_type) = options.terminal_type {
        config.terminal_type = Some(terminal_type);
    }
    if let Some(ssl) = options.ssl {
        config.security = if ssl { SecurityMode::Tls } else { SecurityMode::None };
    }
    if let Some(path) = options.ca_bundle {
        config.ca_bundle = Some(path);
    }
    if let Some(timeout) = options.timeout_millis {
        config.connect_timeout_millis = timeout;
        config.wait_timeout_millis = timeout;
    }
    if let Some(stable) = options.stable_millis {
        config.stable_timeout_millis = stable;
    }
    config.validate()?;

    let client = RteClient::from_config(&config)?;
    client
        .connect_with_config(&config)
        .with_context(|| format!("connecting to {}:{}", config.host, config.port))?;
    println!("{}", client.screen());

    if let Some(user) = options.user {
        let mut inputs = vec![Input::label(options.user_label, user)];
        if let Some(password) = options.password {
            inputs.push(Input::label(options.password_label, password));
        }
        client.send(&inputs, options.key)?;

        let mut conditions: Vec<WaitCondition> =
            vec![SyncWaitCondition::new(config.wait_timeout_millis, config.stable_timeout_millis).into()];
        if let Some(pattern) = options.wait_text {
            let text = TextWaitCondition::from_pattern(
                &pattern,
                Area::full_screen(),
                config.wait_timeout_millis,
                config.stable_timeout_millis,
            )
            .context("--wait-text is not a valid regular expression")?;
            conditions.push(text.into());
        }
        client.await_conditions(&conditions)?;
        println!("{}", client.screen());
        if client.sound_alarm() {
            info!("host sounded the alarm");
        }
    }

    client.disconnect();
    Ok(())
}
