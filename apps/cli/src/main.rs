use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use edl_core::{DeviceSession, PartitionTarget, PortScanner, SerialScanner, ToolboxConfig};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "edl")]
#[command(author, version, about = "Qualcomm EDL flashing toolbox", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Never drive the device over ADB; transitions are done by hand
    #[arg(long, global = true)]
    skip_adb: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Put the device into EDL mode and load the Firehose programmer
    Setup,

    /// Dump a partition range into a file
    Dump {
        /// Output image path
        output: PathBuf,

        /// Logical unit number of the partition
        #[arg(long)]
        lun: u32,

        /// First sector of the range
        #[arg(long)]
        start_sector: String,

        /// Sector count; 0 reads to the end of the partition
        #[arg(long, default_value = "0")]
        num_sectors: String,

        /// Memory type reported to the programmer
        #[arg(long, default_value = "UFS")]
        memory: String,
    },

    /// Flash an image into a partition range
    Flash {
        /// Image file to send
        image: PathBuf,

        /// Logical unit number of the partition
        #[arg(long)]
        lun: u32,

        /// First sector of the range
        #[arg(long)]
        start_sector: String,

        /// Memory type reported to the programmer
        #[arg(long, default_value = "UFS")]
        memory: String,
    },

    /// Flash a firmware package from its rawprogram/patch descriptors
    ///
    /// fh_loader resolves the descriptor names and the filename= image
    /// references inside them against the loader's directory, so the
    /// XMLs and the images they reference must be staged in the
    /// configured image directory next to the loader.
    Rawprogram {
        /// Directory holding rawprogram*.xml and patch*.xml
        firmware_dir: PathBuf,

        /// Memory type reported to the programmer
        #[arg(long, default_value = "UFS")]
        memory: String,

        /// Reset the device once flashing finishes
        #[arg(long)]
        reset: bool,
    },

    /// Reset a device out of EDL mode
    Reset,

    /// Read all fastboot variables for rollback-index auditing
    Rollback,

    /// Show the device model and active A/B slot
    Slot,

    /// List serial ports and flag EDL (9008) ones
    Scan,
}

fn main() {
    let cli = Cli::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if cli.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(e) = run(cli) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => ToolboxConfig::load_from_file(path)?,
        None => ToolboxConfig::default(),
    };
    if cli.skip_adb {
        config.skip_adb = true;
    }

    let mut session = DeviceSession::new(config);

    // Ctrl+C aborts the current wait instead of killing the process
    // mid-command.
    let cancel = session.cancel_token();
    ctrlc::set_handler(move || cancel.cancel())?;

    match cli.command {
        Commands::Setup => {
            let handle = session.setup_edl_connection()?;
            session
                .sahara()
                .load_programmer(&session.config().loader_file(), &handle)?;
            info!(port = %handle, "Programmer loaded, device is ready for Firehose commands");
        }

        Commands::Dump {
            output,
            lun,
            start_sector,
            num_sectors,
            memory,
        } => {
            let target = PartitionTarget::new(lun, start_sector, num_sectors).with_memory(memory);
            session.dump_partition(&output, &target)?;
            println!("Dumped to {}", output.display());
        }

        Commands::Flash {
            image,
            lun,
            start_sector,
            memory,
        } => {
            let target = PartitionTarget::new(lun, start_sector, "0").with_memory(memory);
            session.flash_partition(&image, &target)?;
            println!("Flashed {}", image.display());
        }

        Commands::Rawprogram {
            firmware_dir,
            memory,
            reset,
        } => {
            session.run_flash_plan(&firmware_dir, &memory)?;
            if reset {
                session.reset_device()?;
            }
        }

        Commands::Reset => {
            session.reset_device()?;
        }

        Commands::Rollback => {
            let vars = session.fastboot_vars()?;
            println!("{vars}");
        }

        Commands::Slot => {
            if let Some(model) = session.device_model() {
                println!("Device: {model}");
            }
            match session.active_slot() {
                Some(slot) => println!("Active slot: {slot}"),
                None => println!("Active slot: none (not an A/B device, or the query failed)"),
            }
        }

        Commands::Scan => scan()?,
    }

    Ok(())
}

fn scan() -> Result<()> {
    let ports = SerialScanner::new().list_ports();
    if ports.is_empty() {
        println!("No serial ports found");
        return Ok(());
    }
    for port in ports {
        let marker = if port.is_edl() { "  [EDL 9008]" } else { "" };
        println!(
            "{}  {} ({}){}",
            port.device_path, port.description, port.hardware_id, marker
        );
    }
    Ok(())
}
