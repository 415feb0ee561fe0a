// MIT License - Copyright (c) 2026 Peter Wright

//! Command-line front-end for the ATS ACE 2 client.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use ats_ace_client::state::door_is_locked;
use ats_ace_client::{
    ArmType, AtsPanel, ControlOutcome, EntityKind, EntityState, PanelConfig, Result,
};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "ats-ace")]
#[command(about = "Talk to an ATS alarm panel over TCP/IP (ACE 2 v6 protocol)")]
struct Cli {
    /// Optional TOML configuration file; flags override its values
    #[arg(long)]
    config: Option<String>,

    /// Panel host name or IP address
    #[arg(long)]
    host: Option<String>,

    /// Panel TCP port
    #[arg(long)]
    port: Option<u16>,

    /// The 24/36/48-character encryption password
    #[arg(long = "encryption-key", alias = "encryptionKey")]
    encryption_key: Option<String>,

    /// Login PIN (simple panels)
    #[arg(long, conflicts_with_all = ["username", "password"])]
    pin: Option<String>,

    /// Login account name (extended family)
    #[arg(long, requires = "password")]
    username: Option<String>,

    /// Login account password (extended family)
    #[arg(long, requires = "username")]
    password: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show panel identity and capacity
    Info,
    /// Follow change-of-state events until interrupted
    Monitor,
    /// Arm an area (or all areas)
    Arm {
        /// Area number; all valid areas when omitted
        area: Option<u16>,
        /// Set type
        #[arg(value_enum, default_value_t = ArmSet::Full)]
        set: ArmSet,
        /// Force past faulted/active/inhibited zones
        #[arg(long)]
        force: bool,
    },
    /// Disarm an area (or all areas)
    Disarm { area: Option<u16> },
    /// List zones with their status
    Zones,
    /// List areas with their status
    Areas,
    /// List outputs with their status
    Outputs,
    /// List triggers with their status
    Triggers,
    /// List doors with their status
    Doors,
    /// Inhibit a zone for one arming cycle
    Inhibit { zone: u16 },
    /// Remove a zone inhibit
    Uninhibit { zone: u16 },
    /// Activate an output
    Activate { output: u16 },
    /// Deactivate an output
    Deactivate { output: u16 },
    /// Activate a trigger
    TriggerActivate { trigger: u16 },
    /// Deactivate a trigger
    TriggerDeactivate { trigger: u16 },
    /// Lock a door
    DoorLock { door: u16 },
    /// Unlock a door
    DoorUnlock { door: u16 },
    /// Unlock a door for the standard time
    DoorUnlockStandard { door: u16 },
    /// Unlock a door for a number of seconds
    DoorUnlockTimed { door: u16, seconds: u16 },
    /// Disable a door
    DoorDisable { door: u16 },
    /// Enable a door
    DoorEnable { door: u16 },
    /// Print recent event-log entries
    #[command(alias = "eventLog")]
    EventLog {
        #[arg(default_value_t = 25)]
        count: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum ArmSet {
    Full,
    Part1,
    Part2,
}

impl From<ArmSet> for ArmType {
    fn from(set: ArmSet) -> Self {
        match set {
            ArmSet::Full => ArmType::Full,
            ArmSet::Part1 => ArmType::Part1,
            ArmSet::Part2 => ArmType::Part2,
        }
    }
}

// ---------------------------------------------------------------------------
// Config file
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    host: Option<String>,
    port: Option<u16>,
    encryption_key: Option<String>,
    pin: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

fn build_config(cli: &Cli) -> std::result::Result<PanelConfig, String> {
    let file: FileConfig = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| format!("cannot read {}: {}", path, e))?;
            toml::from_str(&text).map_err(|e| format!("cannot parse {}: {}", path, e))?
        }
        None => FileConfig::default(),
    };

    let host = cli
        .host
        .clone()
        .or(file.host)
        .ok_or("no panel host given (--host or config file)")?;
    let encryption_key = cli
        .encryption_key
        .clone()
        .or(file.encryption_key)
        .ok_or("no encryption key given (--encryption-key or config file)")?;

    let mut builder = PanelConfig::builder().host(host).encryption_key(encryption_key);
    if let Some(port) = cli.port.or(file.port) {
        builder = builder.port(port);
    }

    let username = cli.username.clone().or(file.username);
    let password = cli.password.clone().or(file.password);
    let pin = cli.pin.clone().or(file.pin);
    match (pin, username, password) {
        (Some(pin), None, None) => builder = builder.pin(pin),
        (None, Some(user), Some(pass)) => builder = builder.account(user, pass),
        (None, None, None) => return Err("no credentials given (--pin or --username/--password)".into()),
        _ => return Err("give either --pin or --username/--password, not both".into()),
    }

    Ok(builder.build())
}

// ---------------------------------------------------------------------------
// Output helpers
// ---------------------------------------------------------------------------

fn flag_summary(state: &Option<EntityState>) -> String {
    match state {
        Some(state) => {
            let set: Vec<&str> = state
                .flags
                .iter()
                .filter(|(_, &v)| v)
                .map(|(&k, _)| k)
                .collect();
            if set.is_empty() {
                "-".to_string()
            } else {
                set.join(",")
            }
        }
        None => "?".to_string(),
    }
}

async fn print_listing(panel: &AtsPanel, kind: EntityKind) -> Result<()> {
    let rows = panel.snapshot(kind).await?;
    if rows.is_empty() {
        println!("No {}s known", kind.label());
        return Ok(());
    }
    for (id, name, state) in rows {
        let mut summary = flag_summary(&state);
        if kind == EntityKind::Door {
            if let Some(ref s) = state {
                if door_is_locked(s) {
                    summary = if summary == "-" {
                        "locked".to_string()
                    } else {
                        format!("locked,{}", summary)
                    };
                }
            }
        }
        println!("{:>4}  {:<30}  {}", id, name, summary);
    }
    Ok(())
}

fn print_outcome(what: &str, outcome: ControlOutcome) {
    match outcome {
        ControlOutcome::Done => println!("{} done", what),
        ControlOutcome::Skipped { reason } => println!("{} skipped: {}", what, reason),
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

async fn run(command: Command, config: PanelConfig) -> Result<()> {
    let mut panel = AtsPanel::connect(config).await?;
    let result = dispatch(&mut panel, command).await;
    panel.disconnect().await;
    result
}

async fn dispatch(panel: &mut AtsPanel, command: Command) -> Result<()> {
    match command {
        Command::Info => {
            let d = panel.descriptor();
            println!("Model:     {}", d.model);
            println!("Product:   {}", d.product);
            println!("Firmware:  {}", d.firmware);
            match d.protocol {
                Some(p) => println!("Protocol:  {}", p),
                None => println!("Protocol:  unknown"),
            }
            println!("Serial:    {}", d.serial_text);
            println!("Capacity:  {} areas, {} zones", d.max_areas, d.max_zones);
            if let Some(user) = panel.user_name() {
                println!("User:      {}", user);
            }
        }
        Command::Monitor => {
            let mut events = panel.subscribe();
            panel.start_monitor()?;
            println!("Monitoring; press Ctrl-C to stop");
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    event = events.recv() => match event {
                        Ok(event) => println!("{:?}", event),
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                        Err(e) => warn!("Event stream lagged: {}", e),
                    }
                }
            }
        }
        Command::Arm { area, set, force } => {
            let areas: Vec<u16> = area.into_iter().collect();
            panel.arm(&areas, set.into(), force).await?;
            println!("Armed");
        }
        Command::Disarm { area } => {
            let areas: Vec<u16> = area.into_iter().collect();
            panel.disarm(&areas).await?;
            println!("Disarmed");
        }
        Command::Zones => print_listing(panel, EntityKind::Zone).await?,
        Command::Areas => print_listing(panel, EntityKind::Area).await?,
        Command::Outputs => print_listing(panel, EntityKind::Output).await?,
        Command::Triggers => print_listing(panel, EntityKind::Trigger).await?,
        Command::Doors => print_listing(panel, EntityKind::Door).await?,
        Command::Inhibit { zone } => {
            panel.inhibit_zone(zone).await?;
            println!("Zone {} inhibited", zone);
        }
        Command::Uninhibit { zone } => {
            panel.uninhibit_zone(zone).await?;
            println!("Zone {} uninhibited", zone);
        }
        Command::Activate { output } => {
            panel.set_output(output, true).await?;
            println!("Output {} activated", output);
        }
        Command::Deactivate { output } => {
            panel.set_output(output, false).await?;
            println!("Output {} deactivated", output);
        }
        Command::TriggerActivate { trigger } => {
            let outcome = panel.set_trigger(trigger, true).await?;
            print_outcome(&format!("Trigger {} activation", trigger), outcome);
        }
        Command::TriggerDeactivate { trigger } => {
            let outcome = panel.set_trigger(trigger, false).await?;
            print_outcome(&format!("Trigger {} deactivation", trigger), outcome);
        }
        Command::DoorLock { door } => {
            print_outcome(&format!("Door {} lock", door), panel.lock_door(door).await?);
        }
        Command::DoorUnlock { door } => {
            print_outcome(&format!("Door {} unlock", door), panel.unlock_door(door).await?);
        }
        Command::DoorUnlockStandard { door } => {
            print_outcome(
                &format!("Door {} standard unlock", door),
                panel.unlock_door_standard(door).await?,
            );
        }
        Command::DoorUnlockTimed { door, seconds } => {
            print_outcome(
                &format!("Door {} timed unlock ({}s)", door, seconds),
                panel.unlock_door_timed(door, seconds).await?,
            );
        }
        Command::DoorDisable { door } => {
            print_outcome(
                &format!("Door {} disable", door),
                panel.set_door_enabled(door, false).await?,
            );
        }
        Command::DoorEnable { door } => {
            print_outcome(
                &format!("Door {} enable", door),
                panel.set_door_enabled(door, true).await?,
            );
        }
        Command::EventLog { count } => {
            let records = panel.event_log(count).await?;
            for record in records {
                let when = record
                    .timestamp
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "????-??-?? ??:??:??".to_string());
                println!(
                    "{}  [{}] event {:#06x} entity {} area {}  {}",
                    when, record.category, record.event_id, record.entity_id, record.area,
                    record.description
                );
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::from(1);
        }
    };

    match run(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(2)
        }
    }
}
