//! VRF sync example: push a VRF only when the device lacks it
//!
//! Reads the VRF configuration over NETCONF, checks whether the desired
//! VRF is already present and applies it through the candidate datastore
//! when it is not.
//!
//! # Prerequisites
//!
//! - A device with NETCONF over SSH enabled (port 830)
//! - Candidate datastore support
//!
//! # Usage
//!
//! ```bash
//! cargo run --example vrf_sync -- --host 192.0.2.1 --user admin --password secret --vrf BLUE
//! ```
//!
//! Use `--replace` to check and apply with replace semantics, which removes
//! every VRF not named on the command line.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use ferrisconf::reconcile::document::{in_sync_xml, parse_xml};
use ferrisconf::{DecodeOptions, DefaultOperation, HostKeyVerification, Mode, SessionBuilder, diff_paths};

const VRF_NS: &str = "http://cisco.com/ns/yang/Cisco-IOS-XR-infra-rsi-cfg";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging (set RUST_LOG=debug for verbose output)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut builder = SessionBuilder::new(&args.host)
        .port(args.port)
        .username(&args.user)
        .timeout(Duration::from_secs(args.timeout));

    if args.insecure {
        builder = builder.host_key_verification(HostKeyVerification::Disabled);
    }

    if let Some(password) = &args.password {
        builder = builder.password(password);
    } else if let Some(key_path) = &args.key {
        builder = builder.private_key(key_path);
    } else {
        eprintln!("Error: Must provide either --password or --key");
        std::process::exit(1);
    }

    println!("Connecting to {}:{}...", args.host, args.port);
    let session = builder.connect().await?;
    if let Some(capabilities) = session.peer_capabilities().await {
        println!("Peer announced {} capabilities", capabilities.len());
    }

    let vrfs: String = args
        .vrfs
        .iter()
        .map(|name| format!("<vrf><vrf-name>{}</vrf-name><create/></vrf>", name))
        .collect();
    let desired = format!("<vrfs xmlns=\"{}\">{}</vrfs>", VRF_NS, vrfs);
    let filter = format!("<vrfs xmlns=\"{}\"/>", VRF_NS);

    let (mode, operation) = if args.replace {
        (Mode::Replace, DefaultOperation::Replace)
    } else {
        (Mode::Merge, DefaultOperation::Merge)
    };

    let reply = session.get_config(Some(&filter)).await?;
    let current = reply.config_as_string();
    let options = DecodeOptions::default();

    if in_sync_xml(mode, &desired, &current, &options)? {
        println!("Device already in sync ({}), nothing to do", mode);
    } else {
        let target = parse_xml(&desired, &options)?;
        for path in diff_paths(mode, &target, reply.data()) {
            println!("  differs at {}", path);
        }

        println!("Applying with {} ...", mode);
        session.apply_config(operation, &desired).await?;

        let current = session.get_config(Some(&filter)).await?.config_as_string();
        println!(
            "In sync after apply: {}",
            in_sync_xml(mode, &desired, &current, &options)?
        );
    }

    session.close().await?;
    println!("Done!");
    Ok(())
}

/// Simple argument parser (avoiding external dependencies)
struct Args {
    host: String,
    port: u16,
    user: String,
    password: Option<String>,
    key: Option<PathBuf>,
    timeout: u64,
    vrfs: Vec<String>,
    replace: bool,
    insecure: bool,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = env::args().collect();
        let mut parsed = Self {
            host: "localhost".to_string(),
            port: 830,
            user: env::var("USER").unwrap_or_else(|_| "admin".to_string()),
            password: None,
            key: None,
            timeout: 30,
            vrfs: Vec::new(),
            replace: false,
            insecure: false,
        };

        let mut i = 1;
        while i < args.len() {
            let value = args.get(i + 1).cloned();
            match args[i].as_str() {
                "--host" | "-h" => {
                    parsed.host = value.unwrap_or(parsed.host);
                    i += 1;
                }
                "--port" | "-p" => {
                    parsed.port = value.and_then(|v| v.parse().ok()).unwrap_or(830);
                    i += 1;
                }
                "--user" | "-u" => {
                    parsed.user = value.unwrap_or(parsed.user);
                    i += 1;
                }
                "--password" | "-P" => {
                    parsed.password = value;
                    i += 1;
                }
                "--key" | "-k" => {
                    parsed.key = value.map(PathBuf::from);
                    i += 1;
                }
                "--timeout" | "-t" => {
                    parsed.timeout = value.and_then(|v| v.parse().ok()).unwrap_or(30);
                    i += 1;
                }
                "--vrf" => {
                    parsed.vrfs.extend(value);
                    i += 1;
                }
                "--replace" => parsed.replace = true,
                "--insecure" => parsed.insecure = true,
                "--help" => {
                    Self::print_help();
                    std::process::exit(0);
                }
                other => eprintln!("Unknown argument: {}", other),
            }
            i += 1;
        }

        if parsed.vrfs.is_empty() {
            parsed.vrfs.push("BLUE".to_string());
        }
        parsed
    }

    fn print_help() {
        println!(
            r#"ferrisconf vrf_sync example

USAGE:
    cargo run --example vrf_sync -- [OPTIONS]

OPTIONS:
    -h, --host <HOST>        Target host [default: localhost]
    -p, --port <PORT>        NETCONF port [default: 830]
    -u, --user <USER>        Username [default: $USER]
    -P, --password <PASS>    Password for authentication
    -k, --key <PATH>         Path to SSH private key
    -t, --timeout <SECS>     Connection timeout [default: 30]
    --vrf <NAME>             VRF to ensure, repeatable [default: BLUE]
    --replace                Use replace semantics
    --insecure               Skip host key verification
    --help                   Print this help message
"#
        );
    }
}
