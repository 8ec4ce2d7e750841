use clap::Subcommand;
use diesel::sqlite::SqliteConnection;
use sensorhub_api::gateway::{GatewayClient, GatewayConfig};
use sensorhub_api::orm::power_sensor::{
    apply_power_state, get_all_power_sensors, get_audit_log, get_power_sensor_by_id,
    get_power_sensors_by_company, with_status,
};

use super::utils::{filter_by_term, resolve_company_id};

fn parse_state(s: &str) -> Result<bool, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "on" | "1" | "true" => Ok(true),
        "off" | "0" | "false" => Ok(false),
        other => Err(format!("'{}' is not a power state (use on or off)", other)),
    }
}

#[derive(Subcommand)]
pub enum PowerAction {
    #[command(about = "List power sensors with their current state")]
    Ls {
        #[arg(help = "Search term on name or IMEI (regex by default, use -F for fixed string)")]
        search_term: Option<String>,
        #[arg(
            short = 'F',
            long = "fixed-string",
            help = "Treat search term as fixed string instead of regex"
        )]
        fixed_string: bool,
        #[arg(short, long, help = "Only power sensors of this company (ID or name)")]
        company: Option<String>,
    },
    #[command(about = "Switch a power sensor and relay the command to the gateway")]
    Toggle {
        #[arg(short, long, help = "Power sensor ID")]
        id: i32,
        #[arg(short, long, value_parser = parse_state, help = "on or off")]
        state: bool,
        #[arg(long, help = "Record the state without contacting the gateway")]
        no_relay: bool,
        #[arg(long, env = "SENSORHUB_GATEWAY_HOST", default_value = "127.0.0.1", help = "Gateway host")]
        gateway_host: String,
        #[arg(long, env = "SENSORHUB_GATEWAY_PORT", default_value_t = 1880, help = "Gateway port")]
        gateway_port: u16,
        #[arg(long, default_value_t = 5, help = "Seconds allowed for the HTTP attempt and HTTPS retry together")]
        timeout_secs: u64,
    },
    #[command(about = "Show the switch history of a power sensor")]
    Log {
        #[arg(short, long, help = "Power sensor ID")]
        id: i32,
        #[arg(short = 'n', long, default_value_t = 20, help = "Number of entries")]
        limit: i64,
    },
}

pub fn handle_power_command_with_conn(
    conn: &mut SqliteConnection,
    action: PowerAction,
) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        PowerAction::Ls {
            search_term,
            fixed_string,
            company,
        } => {
            power_ls_impl(conn, search_term, fixed_string, company)?;
        }
        PowerAction::Toggle {
            id,
            state,
            no_relay,
            gateway_host,
            gateway_port,
            timeout_secs,
        } => {
            let gateway = (!no_relay).then(|| GatewayConfig {
                host: gateway_host,
                port: gateway_port,
                timeout_secs,
                https_fallback: true,
            });
            power_toggle_impl(conn, id, state, gateway)?;
        }
        PowerAction::Log { id, limit } => {
            power_log_impl(conn, id, limit)?;
        }
    }
    Ok(())
}

fn on_off(state: bool) -> &'static str {
    if state { "on" } else { "off" }
}

pub fn power_ls_impl(
    conn: &mut SqliteConnection,
    search_term: Option<String>,
    fixed_string: bool,
    company: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let plugs = match company {
        Some(c) => {
            let company_id = resolve_company_id(conn, &c)?;
            get_power_sensors_by_company(conn, company_id)?
        }
        None => get_all_power_sensors(conn)?,
    };
    let plugs = filter_by_term(plugs, search_term.as_deref(), fixed_string, |p| {
        format!("{} {}", p.name, p.imei)
    })?;
    let plugs = with_status(conn, plugs)?;

    if plugs.is_empty() {
        println!("No power sensors found.");
        return Ok(());
    }
    println!("Power sensors:");
    for p in plugs {
        println!(
            "  ID: {}, Name: {}, IMEI: {}, Company ID: {}, State: {}",
            p.sensor.id,
            p.sensor.name,
            p.sensor.imei,
            p.sensor.company_id,
            on_off(p.power_state)
        );
    }
    Ok(())
}

/// Records the state first; a relay failure is reported but does not undo it.
pub fn power_toggle_impl(
    conn: &mut SqliteConnection,
    sensor_id: i32,
    state: bool,
    gateway: Option<GatewayConfig>,
) -> Result<(), Box<dyn std::error::Error>> {
    let plug = get_power_sensor_by_id(conn, sensor_id)?
        .ok_or_else(|| format!("Power sensor with ID {} does not exist", sensor_id))?;

    let change = apply_power_state(conn, sensor_id, state, None)?;
    println!(
        "Power sensor {} ({}) switched {} -> {}",
        plug.id,
        plug.name,
        on_off(change.audit.previous_state),
        on_off(change.status.power_state)
    );

    let Some(config) = gateway else {
        println!("Gateway relay skipped.");
        return Ok(());
    };
    let runtime = tokio::runtime::Runtime::new()?;
    let outcome = runtime.block_on(async {
        let client = GatewayClient::new(config)?;
        Ok::<_, Box<dyn std::error::Error>>(client.send_power_command(&plug.imei, state).await)
    })?;
    if outcome.delivered {
        println!(
            "Gateway accepted the command over {} after {} attempt(s).",
            outcome.protocol.as_deref().unwrap_or("?"),
            outcome.attempts
        );
    } else {
        println!(
            "Gateway not reached after {} attempt(s): {}",
            outcome.attempts,
            outcome.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

pub fn power_log_impl(
    conn: &mut SqliteConnection,
    sensor_id: i32,
    limit: i64,
) -> Result<(), Box<dyn std::error::Error>> {
    let plug = get_power_sensor_by_id(conn, sensor_id)?
        .ok_or_else(|| format!("Power sensor with ID {} does not exist", sensor_id))?;
    let entries = get_audit_log(conn, sensor_id, Some(limit.max(1)))?;

    if entries.is_empty() {
        println!("No switch history for {} (ID: {}).", plug.name, plug.id);
        return Ok(());
    }
    println!("Switch history for {} (ID: {}):", plug.name, plug.id);
    for e in entries {
        println!(
            "  {} {} -> {} by {}",
            e.created_at.format("%Y-%m-%d %H:%M:%S"),
            on_off(e.previous_state),
            on_off(e.new_state),
            e.user_id.map(|u| format!("user {}", u)).unwrap_or_else(|| "console".to_string())
        );
    }
    Ok(())
}
