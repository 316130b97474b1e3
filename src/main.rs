use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use mercury_rs::config::{load_or_default, ConfigStore};
use mercury_rs::logging::init_logger_with_verbosity;
use mercury_rs::mercury::frame::{
    build_request, decode_current_values, decode_energy, parse_response,
};
use mercury_rs::mercury::{open_serial, SerialConfig};
use mercury_rs::report::ReportSink;
use mercury_rs::util::hex::{format_hex_compact, parse_hex_lenient};
use mercury_rs::{
    log_info, AppConfig, AuxSensor, JsonFileStore, JsonLinesSink, LogSink, MeterAddress,
    MeterApp, MeterCommand, MeterDriver, Poller, TokioScheduler, W1TemperatureSensor,
};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "mercury-cli")]
#[command(about = "CLI tool for Mercury 200 electricity meters")]
struct Cli {
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one poll cycle and print the readings
    Read {
        #[arg(short, long)]
        port: String,
        #[arg(short, long)]
        address: MeterAddress,
        #[arg(short, long, default_value = "9600")]
        baudrate: u32,
        #[arg(long, default_value = "500")]
        timeout_ms: u64,
    },
    /// Poll and report periodically until interrupted
    Run {
        #[arg(short, long)]
        port: String,
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long, default_value = "9600")]
        baudrate: u32,
        /// 1-Wire temperature file, or a w1 devices directory to search
        #[arg(long)]
        aux_sensor: Option<PathBuf>,
        /// Write reports to stdout as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Print the request frame for a meter and command
    Frame {
        #[arg(short, long)]
        address: MeterAddress,
        #[arg(short, long, value_enum)]
        command: CommandArg,
    },
    /// Decode a captured 14- or 23-byte response
    Decode { hex: String },
    /// Inspect or change the stored configuration
    Config {
        #[arg(short, long)]
        config: PathBuf,
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Show,
    Reset,
    SetAddress { address: MeterAddress },
    SetPeriod { seconds: u16 },
}

#[derive(Clone, Copy, ValueEnum)]
enum CommandArg {
    Current,
    Energy,
}

impl From<CommandArg> for MeterCommand {
    fn from(arg: CommandArg) -> Self {
        match arg {
            CommandArg::Current => MeterCommand::CurrentValues,
            CommandArg::Energy => MeterCommand::Energy,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logger_with_verbosity(cli.verbose);

    match cli.command {
        Commands::Read {
            port,
            address,
            baudrate,
            timeout_ms,
        } => {
            let serial = SerialConfig {
                baudrate,
                read_timeout: Duration::from_millis(timeout_ms),
            };
            let driver = open_serial(&port, &serial).with_context(|| format!("opening {port}"))?;
            let mut poller = Poller::new(driver, address);
            let reading = poller.run_cycle(&mut LogSink).await?;
            print_reading(&AppConfig::default(), reading);
        }
        Commands::Run {
            port,
            config,
            baudrate,
            aux_sensor,
            json,
        } => {
            let serial = SerialConfig {
                baudrate,
                ..SerialConfig::default()
            };
            let driver = open_serial(&port, &serial).with_context(|| format!("opening {port}"))?;
            let mut poller = Poller::new(driver, MeterAddress::from(0));
            if let Some(path) = aux_sensor {
                poller = poller.with_aux_sensor(open_aux_sensor(&path)?);
            }
            let store = JsonFileStore::new(config);

            if json {
                run_app(poller, JsonLinesSink::new(std::io::stdout()), store).await?;
            } else {
                run_app(poller, LogSink, store).await?;
            }
        }
        Commands::Frame { address, command } => {
            let frame = build_request(address.0, MeterCommand::from(command).code());
            println!("{}", format_hex_compact(&frame));
        }
        Commands::Decode { hex } => decode(&hex)?,
        Commands::Config { config, action } => {
            let mut store = JsonFileStore::new(config);
            let mut current = load_or_default(&store)?;
            match action {
                ConfigAction::Show => {}
                ConfigAction::Reset => current = AppConfig::default(),
                ConfigAction::SetAddress { address } => current.device_address = address,
                ConfigAction::SetPeriod { seconds } => current.measurement_period = seconds,
            }
            if !matches!(action, ConfigAction::Show) {
                store.save(&current)?;
            }
            println!("{}", serde_json::to_string_pretty(&current)?);
        }
    }

    Ok(())
}

fn open_aux_sensor(path: &Path) -> anyhow::Result<Box<dyn AuxSensor>> {
    let sensor = if path.is_dir() {
        W1TemperatureSensor::discover(path)?
    } else {
        W1TemperatureSensor::new(path)
    };
    log_info(&format!("Temperature sensor at {}", sensor.path().display()));
    Ok(Box::new(sensor))
}

async fn run_app<D, R>(poller: Poller<D>, sink: R, store: JsonFileStore) -> anyhow::Result<()>
where
    D: MeterDriver,
    R: ReportSink,
{
    let mut app = MeterApp::new(poller, TokioScheduler::new(), sink, store);
    app.init().context("restoring configuration")?;
    app.key_press()?;
    log_info(&format!(
        "Polling meter {} every {}s",
        app.config().device_address,
        app.config().measurement_period
    ));

    tokio::select! {
        result = app.run() => result?,
        _ = tokio::signal::ctrl_c() => log_info("Interrupted, shutting down"),
    }
    Ok(())
}

fn decode(hex: &str) -> anyhow::Result<()> {
    let frame = parse_hex_lenient(hex)?;
    let config = AppConfig::default();

    match frame.len() {
        14 => {
            let (header, _) = parse_response(&frame, 14)?;
            let values = decode_current_values(&frame)?;
            println!("meter   {}", MeterAddress(header.address));
            println!("voltage {:.1} V", config.voltage_volts(values.voltage));
            println!("current {:.2} A", config.current_amps(values.current));
            println!("power   {:.0} W", config.power_watts(values.power));
        }
        23 => {
            let (header, _) = parse_response(&frame, 23)?;
            let energy = decode_energy(&frame)?;
            println!("meter   {}", MeterAddress(header.address));
            for (i, tariff) in energy.tariffs.iter().enumerate() {
                println!("T{}      {:.2} kWh", i + 1, AppConfig::energy_kwh(*tariff));
            }
        }
        n => bail!("expected a 14- or 23-byte response, got {n} bytes"),
    }
    Ok(())
}

fn print_reading(config: &AppConfig, reading: &mercury_rs::CachedReading) {
    match reading.current_updated {
        Some(at) => {
            println!("read at {}", at.to_rfc3339());
            println!("voltage {:.1} V", config.voltage_volts(reading.current.voltage));
            println!("current {:.2} A", config.current_amps(reading.current.current));
            println!("power   {:.0} W", config.power_watts(reading.current.power));
        }
        None => println!("no valid current values"),
    }
    match reading.energy_updated {
        Some(_) => {
            for (i, tariff) in reading.energy.tariffs.iter().enumerate() {
                println!("T{}      {:.2} kWh", i + 1, AppConfig::energy_kwh(*tariff));
            }
            println!("total   {:.2} kWh", AppConfig::energy_kwh(reading.energy.total()));
        }
        None => println!("no valid energy reading"),
    }
}
