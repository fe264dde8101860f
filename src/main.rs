use anyhow::Result;
use structopt::StructOpt;
use tracing_subscriber::EnvFilter;

use feetech_scan::probe::{find_motor, inspect_motor, probe_baud_rates, scan_bus};
use feetech_scan::scanner::{enumerate_ports, PortDescriptor};

#[derive(StructOpt)]
#[structopt(
    name = "feetech-scan",
    about = "Diagnostics for Feetech SCS/STS serial bus servos"
)]
enum Command {
    /// List serial ports attached to this machine
    Ports {
        /// Also try opening every port at each common baud rate
        #[structopt(long)]
        probe: bool,
    },
    /// Try opening a port at every common baud rate
    Probe {
        /// Serial port to use
        port: String,
    },
    /// Sweep baud rates until a servo answers and report its configuration
    Find {
        /// Serial port to use
        port: String,
        /// Bus ID of the servo
        #[structopt(long, default_value = "1")]
        id: u8,
    },
    /// Ping every bus ID at every baud rate
    Scan {
        /// Serial port to use
        port: String,
    },
    /// Dump the configuration registers of one servo
    Inspect {
        /// Serial port to use
        port: String,
        /// Bus ID of the servo
        #[structopt(long, default_value = "1")]
        id: u8,
    },
    /// Run scan, find and inspect back to back
    Check {
        /// Serial port to use
        port: String,
        /// Bus ID of the servo
        #[structopt(long, default_value = "1")]
        id: u8,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("feetech_scan=info")),
        )
        .init();

    match Command::from_args() {
        Command::Ports { probe } => list_ports(probe)?,
        Command::Probe { port } => run_probe(&port),
        Command::Find { port, id } => run_find(&port, id).await,
        Command::Scan { port } => run_scan(&port).await,
        Command::Inspect { port, id } => run_inspect(&port, id).await,
        Command::Check { port, id } => {
            let rule = "=".repeat(70);
            println!("{}", rule);
            run_scan(&port).await;
            println!("{}", rule);
            run_find(&port, id).await;
            println!("{}", rule);
            run_inspect(&port, id).await;
            println!("{}", rule);
        }
    }
    Ok(())
}

fn list_ports(probe: bool) -> Result<()> {
    let ports = enumerate_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
        return Ok(());
    }
    for descriptor in &ports {
        print_descriptor(descriptor);
        if probe {
            let working: Vec<u32> = probe_baud_rates(&descriptor.device)
                .into_iter()
                .filter(|p| p.outcome.is_ok())
                .map(|p| p.baud_rate)
                .collect();
            println!("  Working baud rates: {:?}", working);
        }
        println!();
    }
    Ok(())
}

fn print_descriptor(descriptor: &PortDescriptor) {
    println!("Port: {}", descriptor.device);
    println!("  Description:   {}", field(&descriptor.description));
    println!("  Hardware ID:   {}", field(&descriptor.hardware_id));
    println!("  Manufacturer:  {}", field(&descriptor.manufacturer));
    println!("  Product:       {}", field(&descriptor.product));
    println!("  Serial number: {}", field(&descriptor.serial_number));
}

fn field(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("n/a")
}

fn run_probe(port: &str) {
    println!("Testing baud rates for port: {}", port);
    for probe in probe_baud_rates(port) {
        match probe.outcome {
            Ok(()) => println!("  ✓ {:>9} baud: port opened", probe.baud_rate),
            Err(reason) => println!("  ✗ {:>9} baud: {}", probe.baud_rate, reason),
        }
    }
}

async fn run_find(port: &str, id: u8) {
    println!("Checking baud rate of servo {} on port: {}", id, port);
    let checks = find_motor(port, id).await;
    if checks.is_empty() {
        println!("✗ Servo {} not found at any baud rate", id);
        print_hint();
        return;
    }
    println!("✓ Servo {} responds at {} baud rate(s):", id, checks.len());
    for check in &checks {
        let configured = match check.configured_baud_rate {
            Some(rate) => rate.to_string(),
            None => "unknown".to_owned(),
        };
        println!(
            "  communication {:>9} | configured {:>9} | {}",
            check.communication_baud_rate,
            configured,
            if check.matches_configured() {
                "match"
            } else {
                "differs"
            }
        );
    }
    let best = &checks[0];
    println!(
        "Best result: {} (model #{}) at {} baud",
        best.model_name.unwrap_or("unknown model"),
        best.model_number,
        best.communication_baud_rate
    );
}

async fn run_scan(port: &str) {
    println!("Scanning for servos on port: {}", port);
    let found = scan_bus(port).await;
    if found.is_empty() {
        println!("✗ No servos found at any baud rate");
        print_hint();
        return;
    }
    for (baud_rate, motors) in found.iter().rev() {
        println!("At {} baud:", baud_rate);
        for motor in motors {
            println!(
                "  ✓ ID {:>2}: {} (model #{})",
                motor.id,
                motor.model_name.unwrap_or("unknown model"),
                motor.model_number
            );
        }
    }
    let total: usize = found.values().map(Vec::len).sum();
    println!("Scan complete, found {} servo(s)", total);
}

async fn run_inspect(port: &str, id: u8) {
    println!("Inspecting servo {} on port: {}", id, port);
    let inspection = match inspect_motor(port, id).await {
        Some(inspection) => inspection,
        None => {
            println!("✗ Servo {} not found at any baud rate", id);
            print_hint();
            return;
        }
    };
    println!("✓ Servo found at {} baud", inspection.baud_rate);
    println!(
        "Model: {} (#{})",
        inspection.model_name.unwrap_or("unknown model"),
        inspection.model_number
    );
    let registers = match inspection.registers {
        Some(registers) => registers,
        None => {
            println!("✗ Register dump failed, see log output");
            return;
        }
    };
    match registers.configured_baud_rate() {
        Some(rate) => println!(
            "Configured baud rate: {} (register value {})",
            rate, registers.baud_rate_register
        ),
        None => println!(
            "Configured baud rate: unknown (register value {})",
            registers.baud_rate_register
        ),
    }
    println!("Servo ID: {}", registers.id);
    println!(
        "Firmware version: {}.{}",
        registers.firmware_major, registers.firmware_minor
    );
    println!(
        "Position limits: {} - {}",
        registers.min_position_limit, registers.max_position_limit
    );
    println!("Current position: {}", registers.present_position);
    println!(
        "Torque enabled: {}",
        if registers.torque_enabled { "yes" } else { "no" }
    );
}

fn print_hint() {
    println!("Troubleshooting:");
    println!("  - check that the adapter and the servo power supply are plugged in");
    println!("  - check the port path ('feetech-scan ports' lists candidates)");
    println!("  - on Linux, make sure your user may open serial devices (dialout group)");
}
